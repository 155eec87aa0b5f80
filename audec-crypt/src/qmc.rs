use crate::{
    Result,
    crypter::{ByteCipher, CipherStream, Crypter, Scheme},
};
use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::Path,
};

/// Static key table of the QMCv1 map cipher. Byte at payload offset `n` is
/// xored with an entry picked by [`Qmc::mask_at`].
const KEY_TABLE: [u8; 128] = [
    0xc3, 0x4a, 0xd6, 0xca, 0x90, 0x67, 0xf7, 0x52, 0xd8, 0xa1, 0x66, 0x62, 0x9f, 0x5b, 0x09, 0x00,
    0xc3, 0x5e, 0x95, 0x23, 0x9f, 0x13, 0x11, 0x7e, 0xd8, 0x92, 0x3f, 0xbc, 0x90, 0xbb, 0x74, 0x0e,
    0xc3, 0x47, 0x74, 0x3d, 0x90, 0xaa, 0x3f, 0x51, 0xd8, 0xf4, 0x11, 0x84, 0x9f, 0xde, 0x95, 0x1d,
    0xc3, 0xc6, 0x09, 0xd5, 0x9f, 0xfa, 0x66, 0xf9, 0xd8, 0xf0, 0xf7, 0xa0, 0x90, 0xa1, 0xd6, 0xf3,
    0xc3, 0xf3, 0xd6, 0xa1, 0x90, 0xa0, 0xf7, 0xf0, 0xd8, 0xf9, 0x66, 0xfa, 0x9f, 0xd5, 0x09, 0xc6,
    0xc3, 0x1d, 0x95, 0xde, 0x9f, 0x84, 0x11, 0xf4, 0xd8, 0x51, 0x3f, 0xaa, 0x90, 0x3d, 0x74, 0x47,
    0xc3, 0x0e, 0x74, 0xbb, 0x90, 0xbc, 0x3f, 0x92, 0xd8, 0x7e, 0x11, 0x13, 0x9f, 0x23, 0x95, 0x5e,
    0xc3, 0x00, 0x09, 0x5b, 0x9f, 0x62, 0x66, 0xa1, 0xd8, 0x52, 0xf7, 0x67, 0x90, 0xca, 0xd6, 0x4a,
];

/// An opened QMCv1 file (`.qmc0`, `.qmc2`, `.qmc3`, `.qmcflac`, `.qmcogg`).
///
/// The whole file is ciphered payload, there is no container header.
pub struct Qmc {
    stream: CipherStream<QmcCipher>,
}

impl Qmc {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            stream: CipherStream::new(File::open(path)?, 0, QmcCipher)?,
        })
    }

    fn mask_at(offset: u64) -> u8 {
        let x = if offset > 0x7fff {
            (offset % 0x7fff) as usize
        } else {
            offset as usize
        };

        KEY_TABLE[(x * x + 27) & 0x7f]
    }

    /// Apply the map cipher to `data` located at payload offset `offset`.
    ///
    /// The transform is a xor and therefore its own inverse, which is also
    /// how test fixtures are produced.
    pub fn transform(offset: u64, data: &mut [u8]) {
        for (i, byte) in data.iter_mut().enumerate() {
            *byte ^= Self::mask_at(offset + i as u64);
        }
    }
}

impl Read for Qmc {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Seek for Qmc {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.stream.seek(pos)
    }
}

impl Crypter for Qmc {
    fn scheme(&self) -> Scheme {
        Scheme::QmcV1
    }
}

pub(crate) struct QmcCipher;

impl ByteCipher for QmcCipher {
    fn mask(&self, offset: u64) -> u8 {
        Qmc::mask_at(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_transform_is_an_involution() {
        let payload = b"fLaC some pretend audio".repeat(3000);
        let mut data = payload.clone();

        Qmc::transform(0, &mut data);
        assert_ne!(data, payload);

        Qmc::transform(0, &mut data);
        assert_eq!(data, payload);
    }

    #[test]
    fn test_mask_wraps_past_first_window() {
        // offsets beyond 0x7fff reuse the table through a modulo
        assert_eq!(Qmc::mask_at(0x8000), Qmc::mask_at(1));
        assert_eq!(Qmc::mask_at(0xfffe), Qmc::mask_at(0));
    }

    #[test]
    fn test_open_decrypts_file() {
        let payload = b"OggS pretend vorbis".repeat(10);
        let mut ciphered = payload.clone();
        Qmc::transform(0, &mut ciphered);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.qmcogg");
        File::create(&path).unwrap().write_all(&ciphered).unwrap();

        let mut qmc = Qmc::open(&path).unwrap();
        let mut out = Vec::new();
        qmc.read_to_end(&mut out).unwrap();
        assert_eq!(out, payload);
    }
}
