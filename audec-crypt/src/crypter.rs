use std::{
    fs::File,
    io::{self, ErrorKind, Read, Seek, SeekFrom},
};

/// Encryption scheme family detected for a source file.
///
/// The variant also selects the tag completion strategy applied after
/// decryption, so this is a closed set rather than an open registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Ncm,
    NeteaseCache,
    QmcV1,
}

impl Scheme {
    pub fn name(&self) -> &'static str {
        match self {
            Scheme::Ncm => "NCM",
            Scheme::NeteaseCache => "NeteaseCache",
            Scheme::QmcV1 => "QMCv1",
        }
    }

    pub fn cipher_name(&self) -> &'static str {
        match self {
            Scheme::Ncm => "rc4-like stream",
            Scheme::NeteaseCache => "xor 0xa3",
            Scheme::QmcV1 => "static map xor",
        }
    }
}

/// An opened per-file decryption session.
///
/// Reading yields decrypted payload bytes, position `0` being the first byte
/// of the decrypted audio stream. The underlying source file is released when
/// the session is dropped, on every exit path.
pub trait Crypter: Read + Seek + Send {
    /// Detected encryption scheme of the source file.
    fn scheme(&self) -> Scheme;

    /// Embedded tag metadata blob (JSON), if the scheme carries one.
    fn tag_data(&self) -> Option<&[u8]> {
        None
    }

    /// Embedded cover image, if the scheme carries one.
    fn cover_data(&self) -> Option<&[u8]> {
        None
    }
}

/// Position keyed xor transform. All supported schemes decrypt a byte at
/// payload offset `n` independently of every other byte, which is what makes
/// sessions cheaply seekable.
pub(crate) trait ByteCipher: Send {
    fn mask(&self, offset: u64) -> u8;
}

/// Decrypting view over a source file, starting at `start` (the first payload
/// byte inside the container).
pub(crate) struct CipherStream<C> {
    inner: File,
    start: u64,
    len: u64,
    pos: u64,
    cipher: C,
}

impl<C: ByteCipher> CipherStream<C> {
    pub(crate) fn new(mut inner: File, start: u64, cipher: C) -> io::Result<Self> {
        let end = inner.seek(SeekFrom::End(0))?;
        let len = end.saturating_sub(start);
        inner.seek(SeekFrom::Start(start))?;

        Ok(Self {
            inner,
            start,
            len,
            pos: 0,
            cipher,
        })
    }
}

impl<C: ByteCipher> Read for CipherStream<C> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;

        for (i, byte) in buf[..n].iter_mut().enumerate() {
            *byte ^= self.cipher.mask(self.pos + i as u64);
        }

        self.pos += n as u64;
        Ok(n)
    }
}

impl<C: ByteCipher> Seek for CipherStream<C> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(x) => x as i128,
            SeekFrom::Current(x) => self.pos as i128 + x as i128,
            SeekFrom::End(x) => self.len as i128 + x as i128,
        };

        if target < 0 {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                "seek before start of decrypted stream",
            ));
        }

        self.pos = target as u64;
        self.inner.seek(SeekFrom::Start(self.start + self.pos))?;
        Ok(self.pos)
    }
}
