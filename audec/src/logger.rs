use colored::{ColoredString, Colorize};
use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};

static LOGGER: Logger = Logger;

/// Install the global logger at the given verbosity.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

pub struct Logger;

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Trace
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let time = chrono::Local::now().format("%H:%M:%S");

            match log::max_level() {
                LevelFilter::Off => (),
                LevelFilter::Error | LevelFilter::Warn | LevelFilter::Info => {
                    println!("{} {} {}", label(record.level()), time, record.args());
                }
                LevelFilter::Debug | LevelFilter::Trace => {
                    let location = match (record.file(), record.line()) {
                        (Some(file), Some(line)) => format!("[{}:{}]", file, line).dimmed(),
                        _ => "[unk]".dimmed(),
                    };

                    println!(
                        "{} {} {} {} {}",
                        label(record.level()),
                        time,
                        record.target().dimmed(),
                        location,
                        record.args()
                    );
                }
            }
        }
    }

    fn flush(&self) {}
}

fn label(level: Level) -> ColoredString {
    match level {
        Level::Debug => "[DEBUG]".bold().blue(),
        Level::Error => "[ERROR]".bold().red(),
        Level::Info => "[INFO]".bold().green(),
        Level::Trace => "[TRACE]".bold().purple(),
        Level::Warn => "[WARN]".bold().yellow(),
    }
}
