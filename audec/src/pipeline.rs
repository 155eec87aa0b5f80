//! The per-file unlock pipeline: probe, decrypt, tag.
//!
//! Every stage converts its failures into notifications plus an early
//! return, so a pipeline run always resolves to a [`TaskResult`] and never
//! raises past its own boundary.

use crate::{
    batch::{Job, JobOptions, TaskResult},
    notify::Notifier,
    tag,
};
use audec_crypt::{Crypter, sniff};
use std::{
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Read, Seek, Write},
    path::Path,
};

/// Sentinel extension used when the decrypted stream sniffs as no known
/// audio container. The file is still written, tagging is skipped.
pub const UNKNOWN_EXTENSION: &str = "unknown";

fn encryption_name(crypter: &dyn Crypter) -> String {
    let scheme = crypter.scheme();
    format!("{} ({})", scheme.name(), scheme.cipher_name())
}

/// Detect the encryption scheme of `path` and the output container of its
/// decrypted stream.
///
/// The sniffer consumes bytes from the same session the decryptor will later
/// read in full, so the session is rewound both before and after sniffing.
pub fn probe_file(
    path: &Path,
    probe_content: bool,
    try_fallback: bool,
    notifier: &Notifier,
) -> Option<(Box<dyn Crypter>, &'static str)> {
    let mut crypter = match audec_crypt::open_path(path, probe_content, try_fallback) {
        Ok(x) => x,
        Err(e) => {
            let hint = if try_fallback {
                ""
            } else {
                ". Maybe retry with --try-fallback?"
            };

            notifier.error(format!(
                "Failed to detect encryption scheme of '{}': {}{}",
                path.display(),
                e,
                hint
            ));
            return None;
        }
    };

    if let Err(e) = crypter.rewind() {
        notifier.error(format!("Failed to read '{}': {}", path.display(), e));
        return None;
    }

    let extension = match sniff::sniff_audio(&mut crypter) {
        Ok(Some(x)) => x,
        Ok(None) => {
            notifier.warning(format!(
                "Output format of '{}' is unknown",
                path.display()
            ));
            UNKNOWN_EXTENSION
        }
        Err(e) => {
            notifier.error(format!(
                "Failed to sniff output format of '{}': {}",
                path.display(),
                e
            ));
            return None;
        }
    };

    if let Err(e) = crypter.rewind() {
        notifier.error(format!("Failed to read '{}': {}", path.display(), e));
        return None;
    }

    Some((crypter, extension))
}

/// Decrypt the whole session into `dest` and return the still open output
/// handle, rewound to its start for the tagging stage.
///
/// The session is consumed and therefore released on every path out of
/// here. On any write failure the partial output is removed, an existing
/// destination is only ever touched when `overwrite` asked for it.
pub fn decrypt_file(
    src: &Path,
    dest: &Path,
    mut crypter: Box<dyn Crypter>,
    overwrite: bool,
    notifier: &Notifier,
) -> Option<File> {
    if overwrite && dest.exists() {
        if let Err(e) = fs::remove_file(dest) {
            notifier.error(format!("Failed to replace '{}': {}", dest.display(), e));
            return None;
        }
    }

    let mut destfile = match OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(dest)
    {
        Ok(x) => x,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            notifier.error(format!(
                "Destination already exists: '{}'. Maybe retry with --overwrite?",
                dest.display()
            ));
            return None;
        }
        Err(e) => {
            notifier.error(format!("Failed to create '{}': {}", dest.display(), e));
            return None;
        }
    };

    let written = crypter.rewind().and_then(|_| {
        let mut payload = Vec::new();
        crypter.read_to_end(&mut payload)?;
        destfile.write_all(&payload)
    });
    drop(crypter);

    let result = written.and_then(|_| destfile.rewind());

    if let Err(e) = result {
        notifier.error(format!(
            "Failed to decrypt '{}' to '{}': {}",
            src.display(),
            dest.display(),
            e
        ));
        drop(destfile);
        let _ = fs::remove_file(dest);
        return None;
    }

    Some(destfile)
}

/// Run the whole pipeline for one job.
pub fn run_job(job: &Job, options: &JobOptions, notifier: &Notifier) -> TaskResult {
    let Some((crypter, extension)) = probe_file(&job.source, true, options.try_fallback, notifier)
    else {
        return TaskResult::Failed("unsupported or undetectable input".to_owned());
    };

    let name = encryption_name(crypter.as_ref());

    if options.probe_only {
        notifier.info(format!(
            "Input '{}' [{}], output format {}",
            job.source.display(),
            name,
            extension.to_uppercase()
        ));
        return TaskResult::Success;
    }

    let stem = job
        .source
        .file_stem()
        .map(|x| x.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_owned());
    let dest = job.dest_dir.join(format!("{}.{}", stem, extension));

    notifier.info(format!(
        "Input '{}' [{}], output '{}'",
        job.source.display(),
        name,
        dest.display()
    ));

    // the tagging stage runs after the session is released, so the scheme
    // and its embedded blobs are lifted off beforehand
    let scheme = crypter.scheme();
    let tag_data = crypter.tag_data().map(|x| x.to_vec());
    let cover_data = crypter.cover_data().map(|x| x.to_vec());

    let Some(mut destfile) = decrypt_file(&job.source, &dest, crypter, options.overwrite, notifier)
    else {
        return TaskResult::Failed("decryption failed".to_owned());
    };

    notifier.info(format!(
        "Decrypted '{}' -> '{}'",
        job.source.display(),
        dest.display()
    ));

    let mut tag_failed = false;

    if options.with_tag {
        if extension == UNKNOWN_EXTENSION {
            notifier.warning(format!(
                "Skipping tag and cover completion for '{}', output format is unknown",
                job.source.display()
            ));
            tag_failed = true;
        } else {
            match tag::strategy_for(scheme) {
                tag::Strategy::Embedded => {
                    match tag::complete_from_embedded(
                        &mut destfile,
                        extension,
                        tag_data.as_deref(),
                        cover_data.as_deref(),
                        options.search_tag,
                    ) {
                        Ok(true) => notifier.info(format!(
                            "Completed tags and cover for '{}' from embedded metadata",
                            dest.display()
                        )),
                        Ok(false) => (),
                        Err(e) => {
                            notifier.warning(format!(
                                "Couldn't complete tags for '{}': {}",
                                dest.display(),
                                e
                            ));
                            tag_failed = true;
                        }
                    }
                }
                tag::Strategy::Service => {
                    match tag::complete_from_service(&mut destfile, &dest, extension, options.search_tag)
                    {
                        Ok(true) => notifier.info(format!(
                            "Completed tags for '{}' from its file name",
                            dest.display()
                        )),
                        Ok(false) => (),
                        Err(e) => {
                            notifier.warning(format!(
                                "Couldn't complete tags for '{}': {}",
                                dest.display(),
                                e
                            ));
                            tag_failed = true;
                        }
                    }
                }
                tag::Strategy::Unsupported => notifier.info(format!(
                    "Tag completion isn't supported for {}, complete '{}' manually",
                    scheme.name(),
                    dest.display()
                )),
            }
        }
    }

    if tag_failed {
        TaskResult::SucceededWithTagFailure
    } else {
        TaskResult::Success
    }
}
