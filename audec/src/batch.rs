//! Batch scheduling and progress aggregation.
//!
//! Each file's pipeline run is submitted to a bounded thread pool and its
//! outcome travels back over a single mpsc channel. The submitting thread is
//! the only consumer of that channel, so [`Session`] state is never touched
//! from two threads at once and completions are processed one at a time, in
//! whatever order the workers finish.

use crate::{notify::Notifier, pipeline};
use kdam::{BarExt, tqdm};
use std::{
    any::Any,
    collections::HashSet,
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    process::Command,
    sync::{Arc, mpsc},
    time::{Duration, Instant},
};
use threadpool::ThreadPool;

/// One file's configured decrypt request within a batch.
#[derive(Debug, Clone)]
pub struct Job {
    pub source: PathBuf,
    pub dest_dir: PathBuf,
}

/// Per-batch pipeline configuration, shared by every job.
#[derive(Debug, Clone)]
pub struct JobOptions {
    pub probe_only: bool,
    pub with_tag: bool,
    pub search_tag: bool,
    pub try_fallback: bool,
    pub overwrite: bool,
}

/// Batch level knobs that don't reach the per-file pipeline.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Worker pool size, `1` runs the batch strictly serially.
    pub threads: usize,
    /// Open every distinct output folder once the whole batch finished.
    pub open_folders: bool,
}

/// Terminal outcome of one job, produced exactly once per submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResult {
    Success,
    SucceededWithTagFailure,
    Failed(String),
}

impl TaskResult {
    pub fn is_success(&self) -> bool {
        !matches!(self, TaskResult::Failed(_))
    }
}

/// Aggregate numbers reported after a batch finished.
#[derive(Debug)]
pub struct Summary {
    pub total: usize,
    pub succeeded: usize,
    pub elapsed: Duration,
}

/// Batch wide progress state. Owned by the completion consumer alone.
pub struct Session {
    total: usize,
    completed: usize,
    succeeded: usize,
    remaining: Vec<PathBuf>,
    folders: HashSet<PathBuf>,
    started: Instant,
    collect_folders: bool,
    probe_only: bool,
}

impl Session {
    pub fn new(jobs: &[Job], options: &JobOptions, batch: &BatchOptions) -> Self {
        Self {
            total: jobs.len(),
            completed: 0,
            succeeded: 0,
            remaining: jobs.iter().map(|x| x.source.clone()).collect(),
            folders: HashSet::new(),
            started: Instant::now(),
            collect_folders: batch.open_folders,
            probe_only: options.probe_only,
        }
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn remaining(&self) -> &[PathBuf] {
        &self.remaining
    }

    pub fn is_finished(&self) -> bool {
        self.completed == self.total
    }

    /// Consume one completion event.
    pub fn on_completion(&mut self, job: &Job, result: &TaskResult, notifier: &Notifier) {
        self.completed += 1;

        if result.is_success() {
            self.succeeded += 1;
        }

        self.remaining.retain(|x| x != &job.source);

        if self.collect_folders {
            self.folders.insert(job.dest_dir.clone());
        }

        // probe runs already reported their findings, a per job verdict on
        // top of that is just noise
        if !self.probe_only {
            match result {
                TaskResult::Success => {
                    notifier.info(format!("Unlocked '{}' successfully", job.source.display()));
                }
                TaskResult::SucceededWithTagFailure => {
                    notifier.info(format!(
                        "Unlocked '{}', but couldn't complete its tags",
                        job.source.display()
                    ));
                }
                TaskResult::Failed(reason) => {
                    notifier.error(format!(
                        "Failed to unlock '{}': {}",
                        job.source.display(),
                        reason
                    ));
                }
            }
        }
    }

    /// Report the aggregate tally and run the open folder post action.
    /// Meaningful exactly once, when every completion has been consumed.
    pub fn finalize(self, notifier: &Notifier) -> Summary {
        let elapsed = self.started.elapsed();

        notifier.info(format!(
            "All done, {} file(s) processed, {} succeeded, took {}s",
            self.total,
            self.succeeded,
            elapsed.as_secs()
        ));

        for folder in &self.folders {
            if let Err(e) = open_folder(folder) {
                notifier.warning(format!("Couldn't open '{}': {}", folder.display(), e));
            }
        }

        Summary {
            total: self.total,
            succeeded: self.succeeded,
            elapsed,
        }
    }
}

/// Run a whole batch to completion and return its summary.
///
/// Every submitted job yields exactly one completion: pipeline runs convert
/// their own failures into a [`TaskResult`], and anything escaping a run
/// (a panic) is caught at this boundary instead of poisoning the pool.
pub fn run(
    jobs: Vec<Job>,
    options: JobOptions,
    batch: BatchOptions,
    notifier: Notifier,
) -> Summary {
    let mut session = Session::new(&jobs, &options, &batch);
    let mut pb = tqdm!(
        total = jobs.len(),
        unit = "file".to_owned(),
        dynamic_ncols = true
    );

    let pool = ThreadPool::new(batch.threads.max(1));
    let (tx, rx) = mpsc::channel();
    let options = Arc::new(options);

    for job in jobs {
        let tx = tx.clone();
        let notifier = notifier.clone();
        let options = options.clone();

        pool.execute(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                pipeline::run_job(&job, &options, &notifier)
            }))
            .unwrap_or_else(|e| TaskResult::Failed(panic_reason(e)));

            // the consumer outlives every worker, but a send error must not
            // take the worker thread down either way
            let _ = tx.send((job, result));
        });
    }

    drop(tx);

    while !session.is_finished() {
        let Ok((job, result)) = rx.recv() else {
            break;
        };

        session.on_completion(&job, &result, &notifier);
        let _ = pb.update(1);
    }

    eprintln!();
    pool.join();
    session.finalize(&notifier)
}

fn panic_reason(payload: Box<dyn Any + Send>) -> String {
    if let Some(x) = payload.downcast_ref::<&str>() {
        (*x).to_owned()
    } else if let Some(x) = payload.downcast_ref::<String>() {
        x.clone()
    } else {
        "task panicked".to_owned()
    }
}

fn open_folder(path: &Path) -> std::io::Result<()> {
    let opener = if cfg!(target_os = "windows") {
        "explorer"
    } else if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };

    Command::new(opener).arg(path).spawn().map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Observer;

    #[derive(Default)]
    struct Silent;

    impl Observer for Silent {
        fn on_info(&self, _message: &str) {}
        fn on_warning(&self, _message: &str) {}
        fn on_error(&self, _message: &str) {}
    }

    fn job(name: &str) -> Job {
        Job {
            source: PathBuf::from(name),
            dest_dir: PathBuf::from("/out"),
        }
    }

    fn options() -> JobOptions {
        JobOptions {
            probe_only: false,
            with_tag: true,
            search_tag: true,
            try_fallback: false,
            overwrite: false,
        }
    }

    #[test]
    fn test_session_counts_stay_consistent() {
        let notifier = Notifier::new(Arc::new(Silent));
        let jobs = [job("a.ncm"), job("b.qmc0"), job("c.uc!")];
        let batch = BatchOptions {
            threads: 1,
            open_folders: false,
        };
        let mut session = Session::new(&jobs, &options(), &batch);

        let results = [
            TaskResult::Success,
            TaskResult::Failed("probe".to_owned()),
            TaskResult::SucceededWithTagFailure,
        ];

        for (job, result) in jobs.iter().zip(&results) {
            assert!(!session.is_finished());
            session.on_completion(job, result, &notifier);
            assert!(session.succeeded() <= session.completed());
            assert!(session.completed() <= jobs.len());
        }

        assert!(session.is_finished());
        assert_eq!(session.completed(), 3);
        assert_eq!(session.succeeded(), 2);
        assert!(session.remaining().is_empty());

        let summary = session.finalize(&notifier);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 2);
    }

    #[test]
    fn test_completion_removes_job_from_remaining() {
        let notifier = Notifier::new(Arc::new(Silent));
        let jobs = [job("a.ncm"), job("b.qmc0")];
        let batch = BatchOptions {
            threads: 1,
            open_folders: false,
        };
        let mut session = Session::new(&jobs, &options(), &batch);

        session.on_completion(&jobs[1], &TaskResult::Success, &notifier);
        assert_eq!(session.remaining(), [PathBuf::from("a.ncm")]);
    }

    #[test]
    fn test_panic_reason_extraction() {
        assert_eq!(panic_reason(Box::new("boom")), "boom");
        assert_eq!(panic_reason(Box::new("boom".to_owned())), "boom");
        assert_eq!(panic_reason(Box::new(42usize)), "task panicked");
    }
}
