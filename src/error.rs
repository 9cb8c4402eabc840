use std::path::PathBuf;
use thiserror::Error;

/// Fatal conditions surfaced at the crate boundary.
///
/// Decode errors and other internal invariant violations are not represented
/// here; they panic at the point of discovery (see the CPU decoder).
#[derive(Debug, Error)]
pub enum GbError {
    #[error("couldn't load rom from {path}: {source}")]
    RomRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
