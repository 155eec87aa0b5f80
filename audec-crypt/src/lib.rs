//! This crate implements per-file decryption sessions for DRM wrapped audio
//! containers. A session is obtained from [`open_path`], which detects the
//! encryption scheme from file contents (optionally falling back to the file
//! extension) and returns a [`Crypter`], a readable and seekable view of the
//! decrypted payload.
//!
//! Supported schemes:
//!
//! - **NCM** (`.ncm`): rc4-like stream cipher, carries embedded tag metadata
//!   and a cover image.
//! - **QMCv1** (`.qmc0`, `.qmc2`, `.qmc3`, `.qmcflac`, `.qmcogg`): position
//!   keyed xor against a static table.
//! - **Netease cache** (`.uc!`): plain xor with `0xA3`.
//!
//! `.mflac` / `.mgg` (QMCv2) files are recognized but their key unwrapping is
//! not supported.

mod cache;
mod crypter;
mod detect;
mod error;
mod ncm;
mod qmc;

pub mod sniff;

pub use cache::NeteaseCache;
pub use crypter::{Crypter, Scheme};
pub use detect::{SUPPORTED_EXTENSIONS, is_supported_path, open_path};
pub use error::Error;
pub use ncm::Ncm;
#[doc(hidden)]
pub use ncm::build_ncm;
pub use qmc::Qmc;

/// A `Result` alias where the `Err` case is `audec_crypt::Error`.
pub type Result<T> = std::result::Result<T, Error>;
