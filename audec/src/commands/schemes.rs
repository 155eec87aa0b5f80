use anyhow::Result;
use clap::Args;
use kdam::term::Colorizer;

/// List supported encryption schemes and input file extensions.
#[derive(Debug, Clone, Args)]
pub struct Schemes;

const SCHEMES: &[(&str, &str, &str)] = &[
    ("NCM", "rc4-like stream", ".ncm"),
    ("NeteaseCache", "xor 0xa3", ".uc!"),
    (
        "QMCv1",
        "static map xor",
        ".qmc0 .qmc2 .qmc3 .qmcflac .qmcogg",
    ),
    ("QMCv2", "unsupported (key unwrapping)", ".mflac .mgg"),
];

impl Schemes {
    pub fn execute(self) -> Result<()> {
        for (name, cipher, extensions) in SCHEMES {
            println!(
                "{:>12}  {}  {}",
                name.colorize("bold green"),
                format!("[{}]", cipher).colorize("cyan"),
                extensions
            );
        }

        Ok(())
    }
}
