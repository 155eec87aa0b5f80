use crate::{
    batch::{self, BatchOptions, Job, JobOptions},
    notify::{LogObserver, Notifier},
};
use anyhow::{Result, bail};
use clap::Args;
use log::{info, warn};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Decrypt encrypted audio files to a plain audio container.
#[derive(Debug, Clone, Args)]
pub struct Unlock {
    /// Encrypted input files, directories or glob patterns.
    /// Directories are walked recursively, keeping only recognized
    /// encrypted audio extensions.
    #[arg(required = true)]
    pub input: Vec<String>,

    /// Directory where decrypted files are written.
    /// It is created when missing.
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Write each decrypted file next to its source file instead of
    /// into one output directory.
    #[arg(long, conflicts_with = "output_dir")]
    pub in_place: bool,

    /// Only detect and report the encryption scheme and output format,
    /// write nothing.
    #[arg(long, help_heading = "Probe Options")]
    pub probe_only: bool,

    /// Fall back to extension based detection when content probing fails.
    #[arg(long, help_heading = "Probe Options")]
    pub try_fallback: bool,

    /// Skip the tag and cover completion phase.
    #[arg(long, help_heading = "Tag Options")]
    pub no_tag: bool,

    /// Do not attempt online metadata lookups during tag completion.
    #[arg(long, help_heading = "Tag Options")]
    pub no_search_tag: bool,

    /// Replace existing destination files instead of failing.
    #[arg(long)]
    pub overwrite: bool,

    /// Maximum number of files decrypted in parallel (1 = strictly serial).
    #[arg(short, long, default_value_t = 4, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub threads: u8,

    /// Open every distinct output folder when the batch completes.
    #[arg(long)]
    pub open_folders: bool,
}

impl Unlock {
    pub fn execute(self) -> Result<()> {
        let files = self.collect_inputs()?;

        if files.is_empty() {
            bail!("no supported input files found.");
        }

        if !self.in_place && !self.probe_only && !self.output_dir.exists() {
            fs::create_dir_all(&self.output_dir)?;
        }

        let jobs = files
            .into_iter()
            .map(|source| {
                let dest_dir = if self.in_place {
                    source
                        .parent()
                        .filter(|x| !x.as_os_str().is_empty())
                        .unwrap_or(Path::new("."))
                        .to_path_buf()
                } else {
                    self.output_dir.clone()
                };

                Job { source, dest_dir }
            })
            .collect::<Vec<_>>();

        let options = JobOptions {
            probe_only: self.probe_only,
            with_tag: !self.no_tag,
            search_tag: !self.no_search_tag,
            try_fallback: self.try_fallback,
            overwrite: self.overwrite,
        };
        let batch_options = BatchOptions {
            threads: self.threads as usize,
            open_folders: self.open_folders && !self.probe_only,
        };

        info!(
            "Unlocking {} file(s) with {} thread(s)",
            jobs.len(),
            self.threads
        );
        batch::run(jobs, options, batch_options, Notifier::new(Arc::new(LogObserver)));
        Ok(())
    }

    fn collect_inputs(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut seen = HashSet::new();

        for input in &self.input {
            let path = Path::new(input);

            if path.is_dir() {
                collect_dir(path, &mut files, &mut seen)?;
            } else if path.is_file() {
                collect_file(path, &mut files, &mut seen);
            } else {
                let mut matched = false;

                for entry in glob::glob(input)? {
                    let entry = entry?;
                    matched = true;

                    if entry.is_dir() {
                        collect_dir(&entry, &mut files, &mut seen)?;
                    } else {
                        collect_file(&entry, &mut files, &mut seen);
                    }
                }

                if !matched {
                    bail!("'{}' matched no existing file or directory.", input);
                }
            }
        }

        Ok(files)
    }
}

fn collect_file(path: &Path, files: &mut Vec<PathBuf>, seen: &mut HashSet<PathBuf>) {
    if !audec_crypt::is_supported_path(path) {
        warn!(
            "Skipping '{}', not a recognized encrypted audio extension",
            path.display()
        );
        return;
    }

    if seen.insert(path.to_path_buf()) {
        files.push(path.to_path_buf());
    }
}

fn collect_dir(dir: &Path, files: &mut Vec<PathBuf>, seen: &mut HashSet<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();

        if path.is_dir() {
            collect_dir(&path, files, seen)?;
        } else if audec_crypt::is_supported_path(&path) && seen.insert(path.clone()) {
            files.push(path);
        }
    }

    Ok(())
}
