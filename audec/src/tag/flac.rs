//! Minimal FLAC metadata writer: rewrites the metadata block chain with a
//! VORBIS_COMMENT and optionally a PICTURE block, leaving the audio frames
//! untouched.

use super::TagInfo;
use anyhow::{Result, bail};
use std::{
    fs::File,
    io::{Read, Seek, Write},
};

const VORBIS_COMMENT: u8 = 4;
const PICTURE: u8 = 6;

/// Metadata block bodies are length prefixed with 24 bits.
const MAX_BLOCK: usize = (1 << 24) - 1;

pub(super) fn is_tagged(file: &mut File) -> Result<bool> {
    file.rewind()?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    file.rewind()?;

    let (blocks, _) = parse(&data)?;

    for (block_type, body) in &blocks {
        if *block_type == VORBIS_COMMENT && comment_count(body) > 0 {
            return Ok(true);
        }
    }

    Ok(false)
}

pub(super) fn embed(file: &mut File, tags: &TagInfo, cover: Option<&[u8]>) -> Result<()> {
    file.rewind()?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;

    let (blocks, audio_at) = parse(&data)?;
    let mut blocks = blocks
        .into_iter()
        .filter(|(x, _)| *x != VORBIS_COMMENT && *x != PICTURE)
        .collect::<Vec<_>>();

    blocks.push((VORBIS_COMMENT, vorbis_comment(tags)));

    if let Some(x) = cover {
        blocks.push((PICTURE, picture(x)));
    }

    let mut out = b"fLaC".to_vec();
    let last = blocks.len() - 1;

    for (i, (block_type, body)) in blocks.iter().enumerate() {
        if body.len() > MAX_BLOCK {
            bail!("flac metadata block too large");
        }

        let mut header = *block_type;

        if i == last {
            header |= 0x80;
        }

        out.push(header);
        out.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
        out.extend_from_slice(body);
    }

    out.extend_from_slice(&data[audio_at..]);

    file.rewind()?;
    file.set_len(0)?;
    file.write_all(&out)?;
    file.flush()?;
    file.rewind()?;
    Ok(())
}

/// Split the metadata block chain off the audio frames. Returns the blocks
/// as `(type, body)` pairs and the offset at which audio begins.
fn parse(data: &[u8]) -> Result<(Vec<(u8, Vec<u8>)>, usize)> {
    if !data.starts_with(b"fLaC") {
        bail!("not a flac stream");
    }

    let mut pos = 4;
    let mut blocks = Vec::new();

    loop {
        if pos + 4 > data.len() {
            bail!("truncated flac metadata");
        }

        let header = data[pos];
        let len = u32::from_be_bytes([0, data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
        pos += 4;

        if pos + len > data.len() {
            bail!("truncated flac metadata");
        }

        blocks.push((header & 0x7f, data[pos..pos + len].to_vec()));
        pos += len;

        if header & 0x80 != 0 {
            break;
        }
    }

    Ok((blocks, pos))
}

fn comment_count(body: &[u8]) -> u32 {
    let Some(vendor_len) = body
        .get(..4)
        .map(|x| u32::from_le_bytes(x.try_into().unwrap()) as usize)
    else {
        return 0;
    };

    body.get(4 + vendor_len..4 + vendor_len + 4)
        .map(|x| u32::from_le_bytes(x.try_into().unwrap()))
        .unwrap_or(0)
}

fn vorbis_comment(tags: &TagInfo) -> Vec<u8> {
    let vendor = b"audec";
    let mut comments = Vec::new();

    for (key, value) in [
        ("TITLE", &tags.title),
        ("ARTIST", &tags.artist),
        ("ALBUM", &tags.album),
    ] {
        if let Some(x) = value {
            comments.push(format!("{}={}", key, x));
        }
    }

    let mut out = (vendor.len() as u32).to_le_bytes().to_vec();
    out.extend_from_slice(vendor);
    out.extend_from_slice(&(comments.len() as u32).to_le_bytes());

    for comment in comments {
        out.extend_from_slice(&(comment.len() as u32).to_le_bytes());
        out.extend_from_slice(comment.as_bytes());
    }

    out
}

fn picture(image: &[u8]) -> Vec<u8> {
    let mime: &[u8] = if image.starts_with(&[0x89, b'P', b'N', b'G']) {
        b"image/png"
    } else {
        b"image/jpeg"
    };

    let mut out = 3u32.to_be_bytes().to_vec(); // picture type: front cover
    out.extend_from_slice(&(mime.len() as u32).to_be_bytes());
    out.extend_from_slice(mime);
    out.extend_from_slice(&0u32.to_be_bytes()); // empty description
    out.extend_from_slice(&[0u8; 16]); // width, height, depth, colors
    out.extend_from_slice(&(image.len() as u32).to_be_bytes());
    out.extend_from_slice(image);
    out
}
