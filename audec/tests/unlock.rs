//! End to end batch runs over real fixture files on disk.

use audec::{
    batch::{self, BatchOptions, Job, JobOptions, TaskResult},
    notify::{Notifier, Observer},
    pipeline,
};
use audec_crypt::{NeteaseCache, Qmc};
use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tempfile::TempDir;

/// Keeps every notification for later inspection.
#[derive(Default)]
struct Collector {
    messages: Mutex<Vec<(&'static str, String)>>,
}

impl Collector {
    fn contains(&self, level: &str, needle: &str) -> bool {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }
}

impl Observer for Collector {
    fn on_info(&self, message: &str) {
        self.messages
            .lock()
            .unwrap()
            .push(("info", message.to_owned()));
    }

    fn on_warning(&self, message: &str) {
        self.messages
            .lock()
            .unwrap()
            .push(("warning", message.to_owned()));
    }

    fn on_error(&self, message: &str) {
        self.messages
            .lock()
            .unwrap()
            .push(("error", message.to_owned()));
    }
}

fn collector() -> (Arc<Collector>, Notifier) {
    let collector = Arc::new(Collector::default());
    (collector.clone(), Notifier::new(collector))
}

fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    File::create(&path).unwrap().write_all(data).unwrap();
    path
}

fn mp3_payload() -> Vec<u8> {
    let mut payload = vec![0xff, 0xfb, 0x90, 0x00];
    payload.extend_from_slice(&[0x11; 600]);
    payload
}

fn ogg_payload() -> Vec<u8> {
    b"OggS pretend vorbis stream".repeat(20)
}

/// A `.qmc0` fixture whose decrypted stream sniffs as mp3.
fn qmc_fixture(dir: &Path, name: &str) -> (PathBuf, Vec<u8>) {
    let payload = mp3_payload();
    let mut ciphered = payload.clone();
    Qmc::transform(0, &mut ciphered);
    (write_file(dir, name, &ciphered), payload)
}

/// A `.uc!` fixture whose decrypted stream sniffs as ogg.
fn cache_fixture(dir: &Path, name: &str) -> (PathBuf, Vec<u8>) {
    let payload = ogg_payload();
    let mut ciphered = payload.clone();
    NeteaseCache::transform(&mut ciphered);
    (write_file(dir, name, &ciphered), payload)
}

/// An `.ncm` fixture with embedded metadata and cover, mp3 payload.
fn ncm_fixture(dir: &Path, name: &str) -> (PathBuf, Vec<u8>) {
    let payload = mp3_payload();
    let json = br#"{"musicName":"Song","artist":[["Alice",1]],"album":"Album"}"#;
    let cover = [0xff, 0xd8, 0xff, 0xe0];
    let data = audec_crypt::build_ncm(&payload, Some(json), Some(&cover));
    (write_file(dir, name, &data), payload)
}

fn options() -> JobOptions {
    JobOptions {
        probe_only: false,
        with_tag: true,
        search_tag: false,
        try_fallback: false,
        overwrite: false,
    }
}

#[test]
fn test_batch_unlocks_files() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let (qmc_path, mp3) = qmc_fixture(src.path(), "Alice - Song.qmc0");
    let (cache_path, ogg) = cache_fixture(src.path(), "cached.uc!");

    let jobs = vec![
        Job {
            source: qmc_path,
            dest_dir: out.path().to_path_buf(),
        },
        Job {
            source: cache_path,
            dest_dir: out.path().to_path_buf(),
        },
    ];

    let (collector, notifier) = collector();
    let summary = batch::run(
        jobs,
        options(),
        BatchOptions {
            threads: 2,
            open_folders: false,
        },
        notifier,
    );

    assert_eq!(summary.total, 2);
    assert_eq!(summary.succeeded, 2);

    // ogg gets no tag completion, so its output is the bare payload
    assert_eq!(fs::read(out.path().join("cached.ogg")).unwrap(), ogg);

    // the qmc output is tagged from its file name before the audio stream
    let tagged = fs::read(out.path().join("Alice - Song.mp3")).unwrap();
    assert!(tagged.starts_with(b"ID3"));
    assert!(tagged.ends_with(&mp3));

    assert!(collector.contains("info", "All done, 2 file(s) processed, 2 succeeded"));
}

#[test]
fn test_ncm_unlocks_with_embedded_tags() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let (source, mp3) = ncm_fixture(src.path(), "a.ncm");

    let job = Job {
        source,
        dest_dir: out.path().to_path_buf(),
    };
    let (collector, notifier) = collector();
    let result = pipeline::run_job(&job, &options(), &notifier);

    assert_eq!(result, TaskResult::Success);

    // output keeps the source stem, gets the sniffed extension, and carries
    // the embedded metadata and cover ahead of the intact audio stream
    let tagged = fs::read(out.path().join("a.mp3")).unwrap();
    assert!(tagged.starts_with(b"ID3"));
    assert!(tagged.windows(4).any(|x| x == b"TIT2"));
    assert!(tagged.windows(4).any(|x| x == b"APIC"));
    assert!(tagged.ends_with(&mp3));

    assert!(collector.contains("info", "embedded metadata"));
}

#[test]
fn test_serial_and_parallel_runs_produce_identical_outputs() {
    let src = TempDir::new().unwrap();
    let mut sources = Vec::new();

    for i in 0..4 {
        sources.push(qmc_fixture(src.path(), &format!("track{}.qmc0", i)).0);
        sources.push(cache_fixture(src.path(), &format!("cache{}.uc!", i)).0);
    }

    let mut outputs = Vec::new();

    for threads in [1, 4] {
        let out = TempDir::new().unwrap();
        let jobs = sources
            .iter()
            .map(|source| Job {
                source: source.clone(),
                dest_dir: out.path().to_path_buf(),
            })
            .collect();

        let (_, notifier) = collector();
        let summary = batch::run(
            jobs,
            options(),
            BatchOptions {
                threads,
                open_folders: false,
            },
            notifier,
        );
        assert_eq!(summary.succeeded, 8);

        let mut files = fs::read_dir(out.path())
            .unwrap()
            .map(|x| x.unwrap().path())
            .collect::<Vec<_>>();
        files.sort();

        outputs.push((
            out,
            files
                .iter()
                .map(|x| {
                    (
                        x.file_name().unwrap().to_string_lossy().into_owned(),
                        fs::read(x).unwrap(),
                    )
                })
                .collect::<Vec<_>>(),
        ));
    }

    assert_eq!(outputs[0].1.len(), 8);
    assert_eq!(outputs[0].1, outputs[1].1);
}

#[test]
fn test_existing_destination_is_left_untouched() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let (source, _) = cache_fixture(src.path(), "cached.uc!");
    let dest = write_file(out.path(), "cached.ogg", b"precious");

    let job = Job {
        source,
        dest_dir: out.path().to_path_buf(),
    };
    let (collector, notifier) = collector();
    let result = pipeline::run_job(&job, &options(), &notifier);

    assert_eq!(result, TaskResult::Failed("decryption failed".to_owned()));
    assert_eq!(fs::read(&dest).unwrap(), b"precious");
    assert!(collector.contains("error", "Maybe retry with --overwrite?"));
}

#[test]
fn test_overwrite_replaces_destination() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let (source, payload) = cache_fixture(src.path(), "cached.uc!");
    let dest = write_file(out.path(), "cached.ogg", b"stale");

    let job = Job {
        source,
        dest_dir: out.path().to_path_buf(),
    };
    let options = JobOptions {
        overwrite: true,
        ..options()
    };
    let (_, notifier) = collector();
    let result = pipeline::run_job(&job, &options, &notifier);

    assert_eq!(result, TaskResult::Success);
    assert_eq!(fs::read(&dest).unwrap(), payload);
}

#[test]
fn test_unknown_output_format_still_unlocks() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    // opaque bytes, decrypts to no recognizable audio container
    let source = write_file(src.path(), "noise.qmc0", &[0x55; 256]);

    let job = Job {
        source,
        dest_dir: out.path().to_path_buf(),
    };
    let options = JobOptions {
        try_fallback: true,
        ..options()
    };
    let (collector, notifier) = collector();
    let result = pipeline::run_job(&job, &options, &notifier);

    assert_eq!(result, TaskResult::SucceededWithTagFailure);
    assert!(out.path().join("noise.unknown").exists());
    assert!(collector.contains("warning", "is unknown"));
}

#[test]
fn test_probe_failure_writes_nothing() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let source = write_file(src.path(), "noise.qmc0", &[0x55; 256]);

    let job = Job {
        source,
        dest_dir: out.path().to_path_buf(),
    };
    let (collector, notifier) = collector();
    let result = pipeline::run_job(&job, &options(), &notifier);

    assert_eq!(
        result,
        TaskResult::Failed("unsupported or undetectable input".to_owned())
    );
    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
    assert!(collector.contains("error", "Maybe retry with --try-fallback?"));
}

#[test]
fn test_probe_only_writes_nothing() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let (source, _) = qmc_fixture(src.path(), "track.qmc0");

    let job = Job {
        source,
        dest_dir: out.path().to_path_buf(),
    };
    let options = JobOptions {
        probe_only: true,
        ..options()
    };
    let (collector, notifier) = collector();
    let result = pipeline::run_job(&job, &options, &notifier);

    assert_eq!(result, TaskResult::Success);
    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
    assert!(collector.contains("info", "QMCv1"));
}
