//! Tag and cover completion for freshly decrypted outputs.
//!
//! The strategy is selected by the detected encryption scheme: NCM files
//! carry their metadata and cover inside the container, the QMC family gets
//! a best effort completion from the file name. Online lookups are out of
//! scope, the `search_tag` switch is accepted and reported as unavailable.

mod flac;
mod id3;

use anyhow::Result;
use audec_crypt::Scheme;
use log::debug;
use serde::Deserialize;
use std::{fs::File, path::Path};

/// How tags are completed for a given scheme variant.
pub enum Strategy {
    /// Metadata and cover travel inside the source container.
    Embedded,
    /// Nothing embedded, derive what we can from the output itself.
    Service,
    /// No completion available for this scheme.
    Unsupported,
}

pub fn strategy_for(scheme: Scheme) -> Strategy {
    match scheme {
        Scheme::Ncm => Strategy::Embedded,
        Scheme::QmcV1 => Strategy::Service,
        Scheme::NeteaseCache => Strategy::Unsupported,
    }
}

#[derive(Debug, Default)]
pub struct TagInfo {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
}

impl TagInfo {
    fn is_empty(&self) -> bool {
        self.title.is_none() && self.artist.is_none() && self.album.is_none()
    }
}

/// Embedded NCM metadata blob. Artists are `[name, id]` pairs.
#[derive(Debug, Deserialize)]
struct EmbeddedMeta {
    #[serde(rename = "musicName")]
    music_name: Option<String>,
    artist: Option<Vec<(String, serde_json::Value)>>,
    album: Option<String>,
}

impl From<EmbeddedMeta> for TagInfo {
    fn from(meta: EmbeddedMeta) -> Self {
        Self {
            title: meta.music_name,
            artist: meta.artist.and_then(|x| {
                let names = x.into_iter().map(|(name, _)| name).collect::<Vec<_>>();
                (!names.is_empty()).then(|| names.join("/"))
            }),
            album: meta.album,
        }
    }
}

/// Complete tags from metadata embedded in the source container.
/// Returns whether anything was written.
pub fn complete_from_embedded(
    file: &mut File,
    extension: &str,
    tag_data: Option<&[u8]>,
    cover: Option<&[u8]>,
    search_tag: bool,
) -> Result<bool> {
    if search_tag {
        debug!("online tag lookup is not supported, completing from embedded metadata only");
    }

    let info = match tag_data {
        Some(x) => serde_json::from_slice::<EmbeddedMeta>(x)?.into(),
        None => TagInfo::default(),
    };

    if info.is_empty() && cover.is_none() {
        return Ok(false);
    }

    match extension {
        "mp3" => {
            id3::embed(file, &info, cover)?;
            Ok(true)
        }
        "flac" => {
            flac::embed(file, &info, cover)?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Complete tags by inspecting the output alone, deriving artist and title
/// from an `Artist - Title` file name. Outputs that already carry tags are
/// left untouched. Returns whether anything was written.
pub fn complete_from_service(
    file: &mut File,
    dest: &Path,
    extension: &str,
    search_tag: bool,
) -> Result<bool> {
    if search_tag {
        debug!("online tag lookup is not supported, completing from the file name only");
    }

    let already_tagged = match extension {
        "mp3" => id3::is_tagged(file)?,
        "flac" => flac::is_tagged(file)?,
        _ => return Ok(false),
    };

    if already_tagged {
        return Ok(false);
    }

    let stem = dest
        .file_stem()
        .map(|x| x.to_string_lossy().into_owned())
        .unwrap_or_default();

    let info = match stem.split_once(" - ") {
        Some((artist, title)) => TagInfo {
            title: Some(title.trim().to_owned()),
            artist: Some(artist.trim().to_owned()),
            album: None,
        },
        None if !stem.is_empty() => TagInfo {
            title: Some(stem),
            artist: None,
            album: None,
        },
        None => return Ok(false),
    };

    match extension {
        "mp3" => id3::embed(file, &info, None)?,
        "flac" => flac::embed(file, &info, None)?,
        _ => unreachable!(),
    }

    Ok(true)
}
