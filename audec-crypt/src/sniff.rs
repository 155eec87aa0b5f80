//! Audio container sniffing over a decrypted byte stream.

use std::io::Read;

/// Leading bytes inspected by the sniffer. Consumed from the reader, so
/// callers that continue reading the stream must seek back themselves.
pub const HEADER_LEN: usize = 16;

/// Sniff the audio container of `reader` from its leading bytes and return
/// the matching file extension, or `None` when no known magic is found.
pub fn sniff_audio<R: Read + ?Sized>(reader: &mut R) -> std::io::Result<Option<&'static str>> {
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;

    // read() on a decrypting stream may return short counts
    while filled < HEADER_LEN {
        let n = reader.read(&mut header[filled..])?;

        if n == 0 {
            break;
        }

        filled += n;
    }

    Ok(sniff_bytes(&header[..filled]))
}

/// Same as [`sniff_audio`] but over an in-memory header.
pub fn sniff_bytes(header: &[u8]) -> Option<&'static str> {
    match header {
        [b'f', b'L', b'a', b'C', ..] => Some("flac"),
        [b'I', b'D', b'3', ..] => Some("mp3"),
        [0xff, x, ..] if x & 0xe0 == 0xe0 => Some("mp3"),
        [b'O', b'g', b'g', b'S', ..] => Some("ogg"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => Some("wav"),
        [_, _, _, _, b'f', b't', b'y', b'p', ..] => Some("m4a"),
        [b'M', b'A', b'C', b' ', ..] => Some("ape"),
        [b'F', b'R', b'M', b'8', ..] => Some("dff"),
        [0x30, 0x26, 0xb2, 0x75, 0x8e, 0x66, 0xcf, 0x11, ..] => Some("wma"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_flac() {
        assert_eq!(sniff_bytes(b"fLaC\x00\x00\x00\x22"), Some("flac"));
    }

    #[test]
    fn test_sniff_mp3_id3() {
        assert_eq!(sniff_bytes(b"ID3\x04\x00\x00\x00\x00\x00\x00"), Some("mp3"));
    }

    #[test]
    fn test_sniff_mp3_frame_sync() {
        assert_eq!(sniff_bytes(&[0xff, 0xfb, 0x90, 0x00]), Some("mp3"));
        assert_eq!(sniff_bytes(&[0xff, 0x10, 0x90, 0x00]), None);
    }

    #[test]
    fn test_sniff_wav_requires_wave_tag() {
        assert_eq!(sniff_bytes(b"RIFF\x24\x00\x00\x00WAVEfmt "), Some("wav"));
        assert_eq!(sniff_bytes(b"RIFF\x24\x00\x00\x00AVI LIST"), None);
    }

    #[test]
    fn test_sniff_m4a() {
        assert_eq!(sniff_bytes(b"\x00\x00\x00\x20ftypM4A "), Some("m4a"));
    }

    #[test]
    fn test_sniff_unknown() {
        assert_eq!(sniff_bytes(b"not an audio stream"), None);
        assert_eq!(sniff_bytes(b""), None);
    }

    #[test]
    fn test_sniff_audio_reads_from_stream() {
        let mut reader = &b"OggS\x00\x02"[..];
        assert_eq!(sniff_audio(&mut reader).unwrap(), Some("ogg"));
    }
}
