//! Layered ini configuration with an in-memory cache.
//!
//! This crate reads classic `[Section]` / `key=value` ini files into
//! ordered sections, merges files layered on top of each other with
//! explicit per-line commands, and caches the results keyed by path so
//! repeated lookups never touch disk twice.
//!
//! # Key Features
//!
//! - **Ordered multimap sections**: a key may appear several times and
//!   insertion order is preserved, so list-valued settings round-trip
//! - **Explicit merge commands**: `+` (add unique), `-` (remove exact
//!   pair), `.` (append), `!` (remove key) control how an overriding
//!   layer combines with the file beneath it
//! - **`BasedOn` hierarchies**: a file names its parent and the
//!   [`loader`] resolves the whole chain root-first
//! - **Coalescing**: a directory of ini files can be packed into one
//!   binary archive and unpacked back into the cache
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use stratini::ConfigCache;
//!
//! let mut cache = ConfigCache::new("ExampleGame");
//! if let Some(paths) = cache
//!     .get_string("Core.System", "Paths", Path::new("Engine.ini"))
//! {
//!     println!("Paths: {paths}");
//! }
//! cache.set_string("Core.System", "Paths", "../Content", Path::new("Engine.ini"));
//! cache.flush(false, None);
//! ```

mod cache;
mod coalesced;
mod error;
mod file;
mod parse;
mod section;

pub mod loader;

pub use cache::{COALESCED_FILENAME, COALESCE_FILTER_SECTION, ConfigCache};
pub use coalesced::{Endianness, read_archive, write_archive};
pub use error::{ConfigError, Result};
pub use file::ConfigFile;
pub use parse::MergeCommand;
pub use section::{ConfigSection, DownloadContext};
