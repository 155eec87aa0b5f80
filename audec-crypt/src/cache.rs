use crate::{
    Result,
    crypter::{ByteCipher, CipherStream, Crypter, Scheme},
};
use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::Path,
};

const MASK: u8 = 0xa3;

/// An opened Netease player cache file (`.uc!`), a plain xor of the audio
/// stream with a constant byte.
pub struct NeteaseCache {
    stream: CipherStream<CacheCipher>,
}

impl NeteaseCache {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            stream: CipherStream::new(File::open(path)?, 0, CacheCipher)?,
        })
    }

    /// Apply the cache xor to `data`. Its own inverse.
    pub fn transform(data: &mut [u8]) {
        for byte in data.iter_mut() {
            *byte ^= MASK;
        }
    }
}

impl Read for NeteaseCache {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Seek for NeteaseCache {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.stream.seek(pos)
    }
}

impl Crypter for NeteaseCache {
    fn scheme(&self) -> Scheme {
        Scheme::NeteaseCache
    }
}

pub(crate) struct CacheCipher;

impl ByteCipher for CacheCipher {
    fn mask(&self, _offset: u64) -> u8 {
        MASK
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_open_decrypts_file() {
        let payload = b"ID3\x04\x00\x00 pretend mp3".repeat(5);
        let mut ciphered = payload.clone();
        NeteaseCache::transform(&mut ciphered);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.uc!");
        File::create(&path).unwrap().write_all(&ciphered).unwrap();

        let mut cache = NeteaseCache::open(&path).unwrap();
        let mut out = Vec::new();
        cache.read_to_end(&mut out).unwrap();
        assert_eq!(out, payload);
        assert_eq!(cache.scheme(), Scheme::NeteaseCache);
    }
}
