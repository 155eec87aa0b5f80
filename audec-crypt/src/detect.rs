use crate::{
    Crypter, Error, Result, cache::NeteaseCache, ncm::Ncm, qmc::Qmc, sniff,
};
use std::{
    fs::File,
    io::Read,
    path::Path,
};

/// Input file extensions accepted by batch intake.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mflac", "mgg", "ncm", "qmc0", "qmc2", "qmc3", "qmcflac", "qmcogg", "uc!",
];

/// Whether `path` carries one of the recognized encrypted audio extensions.
pub fn is_supported_path(path: &Path) -> bool {
    path.extension()
        .map(|x| x.to_string_lossy().to_lowercase())
        .is_some_and(|x| SUPPORTED_EXTENSIONS.contains(&x.as_str()))
}

/// Open a decryption session for `path`.
///
/// With `probe_content` the scheme is detected from the file contents: a
/// container magic, or a leading block that sniffs as a known audio format
/// once a candidate cipher is applied. When content detection fails and
/// `try_fallback` is set, the file extension is trusted instead, which
/// decrypts garbage for mislabeled files but matches what the extension
/// promises.
pub fn open_path(path: &Path, probe_content: bool, try_fallback: bool) -> Result<Box<dyn Crypter>> {
    if probe_content {
        if let Some(crypter) = probe_by_content(path)? {
            return Ok(crypter);
        }

        if !try_fallback {
            return Err(Error::UndetectedScheme);
        }
    }

    open_by_extension(path)
}

fn probe_by_content(path: &Path) -> Result<Option<Box<dyn Crypter>>> {
    let mut file = File::open(path)?;
    let mut header = [0u8; sniff::HEADER_LEN];
    let mut filled = 0;

    while filled < header.len() {
        let n = file.read(&mut header[filled..])?;

        if n == 0 {
            break;
        }

        filled += n;
    }

    let header = &header[..filled];

    if header.starts_with(b"CTENFDAM") {
        return Ncm::open(path).map(|x| Some(Box::new(x) as Box<dyn Crypter>));
    }

    let mut probe = header.to_vec();
    Qmc::transform(0, &mut probe);

    if sniff::sniff_bytes(&probe).is_some() {
        return Qmc::open(path).map(|x| Some(Box::new(x) as Box<dyn Crypter>));
    }

    let mut probe = header.to_vec();
    NeteaseCache::transform(&mut probe);

    if sniff::sniff_bytes(&probe).is_some() {
        return NeteaseCache::open(path).map(|x| Some(Box::new(x) as Box<dyn Crypter>));
    }

    Ok(None)
}

fn open_by_extension(path: &Path) -> Result<Box<dyn Crypter>> {
    let extension = path
        .extension()
        .map(|x| x.to_string_lossy().to_lowercase())
        .ok_or(Error::UndetectedScheme)?;

    match extension.as_str() {
        "ncm" => Ok(Box::new(Ncm::open(path)?)),
        "qmc0" | "qmc2" | "qmc3" | "qmcflac" | "qmcogg" => Ok(Box::new(Qmc::open(path)?)),
        "uc!" => Ok(Box::new(NeteaseCache::open(path)?)),
        "mflac" | "mgg" => Err(Error::Unsupported("QMCv2")),
        _ => Err(Error::UndetectedScheme),
    }
}
