use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while discovering, reading or rewriting descriptor files.
#[derive(Debug, Error)]
pub enum JobError {
    /// The descriptor directory could not be listed. Fatal for the pass.
    #[error("cannot list descriptor directory {}: {source}", path.display())]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file vanished or could not be opened between discovery and read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not a JSON array of descriptors.
    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Saving the updated array failed. The file keeps its previous contents.
    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another pass holds the advisory lock on this file.
    #[error("{} is locked by another pass ({holder})", path.display())]
    Locked { path: PathBuf, holder: String },

    /// The lock file could not be opened or locked. Not fatal for the file.
    #[error("cannot lock {}: {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, JobError>;
