//! Error types for stratini.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the configuration cache and hierarchical loader.
///
/// "Not found" conditions (missing file, section, or key) are never errors;
/// the typed accessors return `Option` for those. Only conditions that mean
/// a broken installation or a failed disk operation show up here.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A `BasedOn` chain references an ancestor file that does not exist.
    ///
    /// The top-level bootstrap is expected to turn this into a process
    /// abort: running with a partially merged configuration would be worse
    /// than not running at all.
    #[error("couldn't locate '{missing}' which is required to run '{game}'", missing = .missing.display())]
    MissingBaseIni {
        /// The ancestor path that could not be found on disk.
        missing: PathBuf,
        /// Game name, included so the abort message identifies the product.
        game: String,
    },

    /// A `BasedOn` chain loops back on itself. Chains are linear by
    /// contract; a cycle means a corrupted install, and following it
    /// would never terminate.
    #[error("'{path}' appears in its own BasedOn chain", path = .path.display())]
    CyclicBaseIni {
        /// The first path encountered twice while walking the chain.
        path: PathBuf,
    },

    /// An I/O operation on a config file failed.
    #[error("I/O error on {path}: {source}", path = .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A coalesced archive could not be decoded.
    #[error("malformed coalesced archive {path}: {reason}", path = .path.display())]
    CoalescedFormat { path: PathBuf, reason: String },
}

impl ConfigError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
