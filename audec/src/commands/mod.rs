mod schemes;
mod unlock;

pub use schemes::Schemes;
pub use unlock::Unlock;

use clap::{ColorChoice, Parser, Subcommand};

/// Batch decrypt DRM wrapped audio files and complete their tags.
#[derive(Debug, Clone, Parser)]
#[command(version, author = "clitic <clitic21@gmail.com>", about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// When to output colored text.
    #[arg(long, global = true, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    Schemes(Schemes),
    Unlock(Unlock),
}
