use thiserror::Error;

/// The error type returned when opening a decryption session fails.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Couldn't detect the encryption scheme from file contents or extension")]
    UndetectedScheme,

    #[error("{0} is recognized but its key unwrapping is not supported")]
    Unsupported(&'static str),

    #[error("Truncated {0} container")]
    Truncated(&'static str),

    #[error("Malformed {0} {1}")]
    Malformed(&'static str, &'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
