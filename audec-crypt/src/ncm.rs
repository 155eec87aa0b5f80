use crate::{
    Error, Result,
    crypter::{ByteCipher, CipherStream, Crypter, Scheme},
};
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit, block_padding::Pkcs7};
use base64::Engine;
use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::Path,
};

type Aes128EcbDec = ecb::Decryptor<aes::Aes128>;
type Aes128EcbEnc = ecb::Encryptor<aes::Aes128>;

const MAGIC: &[u8] = b"CTENFDAM";
const CORE_KEY: [u8; 16] = *b"hzHRAmso5kInbaxW";
const META_KEY: [u8; 16] = *b"#14ljk_!\\]&0U<'(";

/// Chunk lengths beyond this are treated as corruption rather than allocated.
const MAX_CHUNK: usize = 1 << 24;

/// An opened `.ncm` container.
///
/// The container wraps an audio payload in an rc4-like stream cipher whose
/// key is itself wrapped with AES-128-ECB, and carries a tag metadata JSON
/// blob plus a cover image alongside the payload.
pub struct Ncm {
    stream: CipherStream<NcmCipher>,
    tag_data: Option<Vec<u8>>,
    cover_data: Option<Vec<u8>>,
}

impl Ncm {
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;

        let mut magic = [0u8; 10];
        file.read_exact(&mut magic)
            .map_err(|_| Error::Truncated("NCM"))?;

        if &magic[..8] != MAGIC {
            return Err(Error::Malformed("NCM", "magic"));
        }

        let mut key_chunk = read_chunk(&mut file, "audio key")?;

        for byte in key_chunk.iter_mut() {
            *byte ^= 0x64;
        }

        let key = aes128_ecb_decrypt(&CORE_KEY, key_chunk, "audio key")?;
        let stream_key = key
            .strip_prefix(b"neteasecloudmusic")
            .filter(|x| !x.is_empty())
            .ok_or(Error::Malformed("NCM", "audio key"))?;
        let cipher = NcmCipher::new(stream_key);

        let meta_chunk = read_chunk(&mut file, "metadata")?;
        let tag_data = if meta_chunk.is_empty() {
            None
        } else {
            Some(decode_metadata(meta_chunk)?)
        };

        // crc of the metadata chunk plus a 5 byte gap, both unused
        file.seek(SeekFrom::Current(9))?;

        let cover_chunk = read_chunk(&mut file, "cover")?;
        let cover_data = (!cover_chunk.is_empty()).then_some(cover_chunk);

        let start = file.stream_position()?;

        Ok(Self {
            stream: CipherStream::new(file, start, cipher)?,
            tag_data,
            cover_data,
        })
    }
}

impl Read for Ncm {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Seek for Ncm {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.stream.seek(pos)
    }
}

impl Crypter for Ncm {
    fn scheme(&self) -> Scheme {
        Scheme::Ncm
    }

    fn tag_data(&self) -> Option<&[u8]> {
        self.tag_data.as_deref()
    }

    fn cover_data(&self) -> Option<&[u8]> {
        self.cover_data.as_deref()
    }
}

struct NcmCipher {
    key_box: [u8; 256],
}

impl NcmCipher {
    fn new(key: &[u8]) -> Self {
        let mut s = [0u8; 256];

        for (i, x) in s.iter_mut().enumerate() {
            *x = i as u8;
        }

        // rc4 key scheduling, the keystream derivation below is what deviates
        let mut j = 0usize;

        for i in 0..256 {
            j = (j + s[i] as usize + key[i % key.len()] as usize) & 0xff;
            s.swap(i, j);
        }

        Self { key_box: s }
    }
}

impl ByteCipher for NcmCipher {
    fn mask(&self, offset: u64) -> u8 {
        let s = &self.key_box;
        let i = ((offset + 1) & 0xff) as usize;
        let j = (s[i] as usize + i) & 0xff;
        s[(s[i] as usize + s[j] as usize) & 0xff]
    }
}

fn read_chunk(file: &mut File, field: &'static str) -> Result<Vec<u8>> {
    let mut len = [0u8; 4];
    file.read_exact(&mut len)
        .map_err(|_| Error::Truncated("NCM"))?;
    let len = u32::from_le_bytes(len) as usize;

    if len > MAX_CHUNK {
        return Err(Error::Malformed("NCM", field));
    }

    let mut data = vec![0u8; len];
    file.read_exact(&mut data)
        .map_err(|_| Error::Truncated("NCM"))?;
    Ok(data)
}

fn decode_metadata(mut chunk: Vec<u8>) -> Result<Vec<u8>> {
    for byte in chunk.iter_mut() {
        *byte ^= 0x63;
    }

    let encoded = chunk
        .strip_prefix(b"163 key(Don't modify):")
        .ok_or(Error::Malformed("NCM", "metadata"))?;
    let encrypted = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| Error::Malformed("NCM", "metadata"))?;
    let decrypted = aes128_ecb_decrypt(&META_KEY, encrypted, "metadata")?;

    decrypted
        .strip_prefix(b"music:")
        .map(|x| x.to_vec())
        .ok_or(Error::Malformed("NCM", "metadata"))
}

fn aes128_ecb_decrypt(key: &[u8; 16], mut data: Vec<u8>, field: &'static str) -> Result<Vec<u8>> {
    Aes128EcbDec::new(key.into())
        .decrypt_padded_mut::<Pkcs7>(&mut data)
        .map(|x| x.to_vec())
        .map_err(|_| Error::Malformed("NCM", field))
}

/// Assemble an NCM container around `payload`, ciphered with a fixed stream
/// key. Fixture producer for tests across the workspace, built with the same
/// primitives [`Ncm::open`] undoes.
#[doc(hidden)]
pub fn build_ncm(payload: &[u8], meta_json: Option<&[u8]>, cover: Option<&[u8]>) -> Vec<u8> {
    const STREAM_KEY: &[u8] = b"0123456789abcdefDEADBEEF";

    fn aes128_ecb_encrypt(key: &[u8; 16], data: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; (data.len() / 16 + 1) * 16];
        buf[..data.len()].copy_from_slice(data);

        // the buffer always holds one spare block for the padding
        match Aes128EcbEnc::new(key.into()).encrypt_padded_mut::<Pkcs7>(&mut buf, data.len()) {
            Ok(x) => x.to_vec(),
            Err(_) => unreachable!(),
        }
    }

    fn chunk(data: &[u8]) -> Vec<u8> {
        let mut out = (data.len() as u32).to_le_bytes().to_vec();
        out.extend_from_slice(data);
        out
    }

    let mut key_plain = b"neteasecloudmusic".to_vec();
    key_plain.extend_from_slice(STREAM_KEY);
    let mut key_chunk = aes128_ecb_encrypt(&CORE_KEY, &key_plain);

    for byte in key_chunk.iter_mut() {
        *byte ^= 0x64;
    }

    let meta_chunk = meta_json.map(|json| {
        let mut plain = b"music:".to_vec();
        plain.extend_from_slice(json);
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(aes128_ecb_encrypt(&META_KEY, &plain));

        let mut chunk = b"163 key(Don't modify):".to_vec();
        chunk.extend_from_slice(encoded.as_bytes());

        for byte in chunk.iter_mut() {
            *byte ^= 0x63;
        }

        chunk
    });

    let cipher = NcmCipher::new(STREAM_KEY);
    let mut ciphered = payload.to_vec();

    for (i, byte) in ciphered.iter_mut().enumerate() {
        *byte ^= cipher.mask(i as u64);
    }

    let mut out = MAGIC.to_vec();
    out.extend_from_slice(&[0x00, 0x00]);
    out.extend_from_slice(&chunk(&key_chunk));
    out.extend_from_slice(&chunk(meta_chunk.as_deref().unwrap_or_default()));
    out.extend_from_slice(&[0x00; 9]);
    out.extend_from_slice(&chunk(cover.unwrap_or_default()));
    out.extend_from_slice(&ciphered);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn open_bytes(data: &[u8]) -> Result<Ncm> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.ncm");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(data)
            .unwrap();
        Ncm::open(&path)
    }

    #[test]
    fn test_open_decrypts_payload() {
        let payload = b"fLaC pretend audio payload".repeat(40);
        let mut ncm = open_bytes(&build_ncm(&payload, None, None)).unwrap();

        let mut out = Vec::new();
        ncm.read_to_end(&mut out).unwrap();
        assert_eq!(out, payload);
        assert_eq!(ncm.scheme(), Scheme::Ncm);
        assert!(ncm.tag_data().is_none());
        assert!(ncm.cover_data().is_none());
    }

    #[test]
    fn test_open_extracts_tag_and_cover() {
        let json = br#"{"musicName":"Song","album":"Album"}"#;
        let cover = [0xff, 0xd8, 0xff, 0xe0];
        let ncm = open_bytes(&build_ncm(b"payload", Some(json), Some(&cover))).unwrap();

        assert_eq!(ncm.tag_data(), Some(&json[..]));
        assert_eq!(ncm.cover_data(), Some(&cover[..]));
    }

    #[test]
    fn test_rewind_rereads_from_offset_zero() {
        let payload = b"OggS first bytes matter".repeat(10);
        let mut ncm = open_bytes(&build_ncm(&payload, None, None)).unwrap();

        let mut first = [0u8; 8];
        ncm.read_exact(&mut first).unwrap();
        ncm.rewind().unwrap();

        let mut again = Vec::new();
        ncm.read_to_end(&mut again).unwrap();
        assert_eq!(again, payload);
    }

    #[test]
    fn test_open_rejects_bad_magic() {
        assert!(matches!(
            open_bytes(b"MADFNETC rest doesn't matter"),
            Err(Error::Malformed("NCM", "magic"))
        ));
    }

    #[test]
    fn test_open_rejects_truncated_container() {
        let data = build_ncm(b"payload", None, None);
        assert!(matches!(
            open_bytes(&data[..24]),
            Err(Error::Truncated("NCM"))
        ));
    }

    #[test]
    fn test_open_rejects_oversized_chunk() {
        let mut data = MAGIC.to_vec();
        data.extend_from_slice(&[0x00, 0x00]);
        data.extend_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            open_bytes(&data),
            Err(Error::Malformed("NCM", "audio key"))
        ));
    }
}
