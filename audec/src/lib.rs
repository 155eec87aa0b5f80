pub mod batch;
pub mod logger;
pub mod notify;
pub mod pipeline;
pub mod tag;

mod commands;

#[doc(hidden)]
pub use commands::{Args, Commands};
