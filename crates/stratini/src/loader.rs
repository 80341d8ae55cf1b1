//! Hierarchical loader: resolves a `BasedOn` chain of ini files into
//! one fully merged [`ConfigFile`], and regenerates a baked ini when
//! the defaults it was generated from have changed.
//!
//! A file declares its parent with `[Configuration] BasedOn=<path>`,
//! forming a linear chain (no diamonds). The chain is read root-first:
//! the root is loaded verbatim, then each descendant is combined on
//! top, so the most-derived file's overrides win.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::debug;

use crate::cache::ConfigCache;
use crate::error::{ConfigError, Result};
use crate::file::ConfigFile;

/// Section/key a file declares its parent under.
pub const CONFIGURATION_SECTION: &str = "Configuration";
pub const BASED_ON_KEY: &str = "BasedOn";
/// Section holding the staleness fingerprint of a generated ini: one
/// numbered key per chain position, each a file timestamp. Written
/// only by [`load_ini_hierarchy`], read only by the outdatedness
/// check.
pub const INI_VERSION_SECTION: &str = "IniVersion";

fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().map(|m| m.len())
}

/// File modification time as seconds since the epoch; zero when the
/// time cannot be determined, so a fingerprint entry always exists.
fn file_timestamp(path: &Path) -> f64 {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// Fully load `path` into `config`: walk its `BasedOn` chain up to the
/// root, read the root, then combine each descendant back down so the
/// most-derived overrides apply last.
///
/// A missing or empty leaf is a silent no-op (`config` is left
/// untouched). A missing *ancestor* is fatal: the chain references a
/// file the installation should have, and continuing would silently
/// run with wrong configuration. A chain that loops back on itself is
/// fatal for the same reason.
///
/// With `update_timestamps`, each chain file's modification time is
/// recorded under `[IniVersion]` - the fingerprint the outdatedness
/// check compares later. Set it only when loading a default (template)
/// chain; generated files already carry their fingerprint.
pub fn load_ini_hierarchy(
    path: &Path,
    config: &mut ConfigFile,
    update_timestamps: bool,
    game: &str,
) -> Result<()> {
    if file_size(path).unwrap_or_default() == 0 {
        debug!(file = %path.display(), "ini hierarchy leaf missing or empty, nothing to load");
        return Ok(());
    }

    // Chain from most-derived leaf to root.
    let mut chain: Vec<PathBuf> = vec![path.to_path_buf()];
    let mut scratch = ConfigFile::with_game(game);
    let mut index = 0;
    loop {
        let current = &chain[index];
        if file_size(current).is_none() {
            return Err(ConfigError::MissingBaseIni {
                missing: current.clone(),
                game: game.to_string(),
            });
        }
        scratch.read(current);
        match scratch.get_string(CONFIGURATION_SECTION, BASED_ON_KEY) {
            Some(parent) => {
                let parent = PathBuf::from(parent);
                if chain.contains(&parent) {
                    return Err(ConfigError::CyclicBaseIni { path: parent });
                }
                chain.push(parent);
                index += 1;
            }
            None => break,
        }
    }

    let mut timestamps = Vec::with_capacity(chain.len());

    // Root first, then merge back toward the leaf.
    let root = &chain[index];
    config.read(root);
    timestamps.push(file_timestamp(root));
    for layer in chain[..index].iter().rev() {
        config.combine(layer);
        timestamps.push(file_timestamp(layer));
    }

    if update_timestamps {
        for (position, timestamp) in timestamps.iter().enumerate() {
            config.set_double(INI_VERSION_SECTION, &position.to_string(), *timestamp);
        }
    }

    Ok(())
}

/// The user's answer to an "ini is outdated, regenerate?" prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegenChoice {
    Yes,
    No,
    /// Yes, and stop asking for the rest of the run.
    YesToAll,
    /// No, and stop asking for the rest of the run.
    NoToAll,
}

/// Policy knobs for [`OutdatednessChecker`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RegenOptions {
    /// Regenerate unconditionally, stale or not.
    pub force_regenerate: bool,
    /// Running unattended: regenerate stale files without prompting.
    pub unattended: bool,
}

/// Compares a generated ini's `[IniVersion]` fingerprint against its
/// default chain and regenerates it when stale. One checker is meant
/// to live for a whole startup sequence: a Yes/No-to-all answer is
/// remembered across every file it checks.
#[derive(Debug, Default)]
pub struct OutdatednessChecker {
    options: RegenOptions,
    remembered: Option<RegenChoice>,
}

fn fingerprints(file: &ConfigFile) -> Vec<f64> {
    let mut out = Vec::new();
    let mut position = 0;
    while let Some(timestamp) = file.get_double(INI_VERSION_SECTION, &position.to_string()) {
        out.push(timestamp);
        position += 1;
    }
    out
}

impl OutdatednessChecker {
    pub fn new(options: RegenOptions) -> Self {
        OutdatednessChecker {
            options,
            remembered: None,
        }
    }

    fn should_regenerate(
        &mut self,
        stale: bool,
        generated_ini: &Path,
        prompt: &mut dyn FnMut(&Path) -> RegenChoice,
    ) -> bool {
        if self.options.force_regenerate {
            return true;
        }
        if !stale {
            return false;
        }
        if self.options.unattended {
            return true;
        }
        // Nothing on disk to overwrite means nothing to ask about.
        if file_size(generated_ini).unwrap_or_default() == 0 {
            return true;
        }
        let choice = match self.remembered {
            Some(choice) => choice,
            None => {
                let choice = prompt(generated_ini);
                if matches!(choice, RegenChoice::YesToAll | RegenChoice::NoToAll) {
                    self.remembered = Some(choice);
                }
                choice
            }
        };
        matches!(choice, RegenChoice::Yes | RegenChoice::YesToAll)
    }

    /// Check one default/generated ini pair, regenerating the generated
    /// file if its fingerprint no longer matches the default chain's,
    /// then load the generated file into `cache` (with the merged
    /// default as fallback should that load fail).
    ///
    /// Already-cached generated files are skipped: they were checked
    /// when they were loaded.
    pub fn check(
        &mut self,
        cache: &mut ConfigCache,
        default_ini: &Path,
        generated_ini: &Path,
        prompt: &mut dyn FnMut(&Path) -> RegenChoice,
    ) -> Result<()> {
        if cache.find_existing(generated_ini).is_some() {
            return Ok(());
        }
        let game = cache.game_name().to_string();

        // The default chain gets a fresh fingerprint; the generated
        // file's own fingerprint was recorded when it was generated, so
        // its chain is not re-walked.
        let mut default_file = ConfigFile::with_game(&game);
        load_ini_hierarchy(default_ini, &mut default_file, true, &game)?;
        let mut generated_file = ConfigFile::with_game(&game);
        load_ini_hierarchy(generated_ini, &mut generated_file, false, &game)?;

        // Entry-by-entry comparison; a count mismatch is a mismatch.
        let stale = fingerprints(&default_file) != fingerprints(&generated_file);

        if self.should_regenerate(stale, generated_ini, prompt) {
            // The merged default already carries the fresh fingerprint.
            default_file.dirty = true;
            default_file.write(generated_ini)?;
        }

        cache.load_file(generated_ini, Some(&default_file));
        Ok(())
    }
}
