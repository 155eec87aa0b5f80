//! Minimal ID3v2.4 writer, just enough to carry title, artist, album and a
//! front cover picture frame.

use super::TagInfo;
use std::{
    fs::File,
    io::{self, Read, Seek, Write},
};

pub(super) fn is_tagged(file: &mut File) -> io::Result<bool> {
    file.rewind()?;
    let mut magic = [0u8; 3];
    let tagged = match file.read_exact(&mut magic) {
        Ok(()) => &magic == b"ID3",
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => false,
        Err(e) => return Err(e),
    };
    file.rewind()?;
    Ok(tagged)
}

/// Prepend an ID3v2.4 tag to the audio stream in `file`, replacing any tag
/// already present.
pub(super) fn embed(file: &mut File, tags: &TagInfo, cover: Option<&[u8]>) -> io::Result<()> {
    file.rewind()?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    let audio = strip_existing_tag(&data);

    let mut frames = Vec::new();

    if let Some(x) = &tags.title {
        frames.extend_from_slice(&text_frame(b"TIT2", x));
    }

    if let Some(x) = &tags.artist {
        frames.extend_from_slice(&text_frame(b"TPE1", x));
    }

    if let Some(x) = &tags.album {
        frames.extend_from_slice(&text_frame(b"TALB", x));
    }

    if let Some(x) = cover {
        frames.extend_from_slice(&picture_frame(x));
    }

    let mut out = Vec::with_capacity(10 + frames.len() + audio.len());
    out.extend_from_slice(b"ID3\x04\x00\x00");
    out.extend_from_slice(&syncsafe(frames.len() as u32));
    out.extend_from_slice(&frames);
    out.extend_from_slice(audio);

    file.rewind()?;
    file.set_len(0)?;
    file.write_all(&out)?;
    file.flush()?;
    file.rewind()
}

fn strip_existing_tag(data: &[u8]) -> &[u8] {
    if data.len() >= 10 && data.starts_with(b"ID3") {
        let size = unsyncsafe(&data[6..10]) as usize;

        if let Some(rest) = data.get(10 + size..) {
            return rest;
        }
    }

    data
}

fn text_frame(id: &[u8; 4], value: &str) -> Vec<u8> {
    // 0x03 is the utf-8 text encoding marker
    let mut body = vec![0x03];
    body.extend_from_slice(value.as_bytes());
    frame(id, &body)
}

fn picture_frame(image: &[u8]) -> Vec<u8> {
    let mime: &[u8] = if image.starts_with(&[0x89, b'P', b'N', b'G']) {
        b"image/png"
    } else {
        b"image/jpeg"
    };

    let mut body = vec![0x03];
    body.extend_from_slice(mime);
    body.push(0x00);
    body.push(0x03); // picture type: front cover
    body.push(0x00); // empty description
    body.extend_from_slice(image);
    frame(b"APIC", &body)
}

fn frame(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(10 + body.len());
    out.extend_from_slice(id);
    out.extend_from_slice(&syncsafe(body.len() as u32));
    out.extend_from_slice(&[0x00, 0x00]);
    out.extend_from_slice(body);
    out
}

fn syncsafe(value: u32) -> [u8; 4] {
    [
        (value >> 21) as u8 & 0x7f,
        (value >> 14) as u8 & 0x7f,
        (value >> 7) as u8 & 0x7f,
        value as u8 & 0x7f,
    ]
}

fn unsyncsafe(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0, |acc, x| (acc << 7) | (x & 0x7f) as u32)
}
