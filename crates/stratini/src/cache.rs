//! `ConfigCache`: the process-wide registry of parsed config files.
//!
//! One cache owns every [`ConfigFile`] in play, keyed by filename, and
//! is the single point of truth the rest of a program reads
//! configuration through. Files load lazily on first access and flush
//! back to disk on demand (and on drop).
//!
//! # Concurrency
//!
//! The cache is deliberately single-threaded: every operation that can
//! lazily load or mutate takes `&mut self`, so exclusive access is
//! enforced by the borrow checker rather than internal locking. Wrap
//! the cache in a `Mutex` if multiple threads need it.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::coalesced::{self, Endianness};
use crate::error::Result;
use crate::file::ConfigFile;
use crate::section::DownloadContext;

/// Name of the section listing files excluded from coalescing.
pub const COALESCE_FILTER_SECTION: &str = "ConfigCoalesceFilter";
/// File name of the coalesced archive within a config directory.
pub const COALESCED_FILENAME: &str = "Coalesced.ini";

/// A registry mapping filenames to parsed [`ConfigFile`]s with lazy
/// load-on-first-access, typed accessors, and explicit lifecycle
/// control.
///
/// Construct one at startup and pass it by reference to everything
/// that needs configuration; there is intentionally no global
/// instance.
#[derive(Debug, Default)]
pub struct ConfigCache {
    files: IndexMap<PathBuf, ConfigFile>,
    file_ops_disabled: bool,
    download_context: DownloadContext,
    game_name: String,
}

impl ConfigCache {
    /// A cache whose files substitute `%GAME%` with `game` when parsing.
    ///
    /// Fields are spelled out because the `Drop` impl rules out
    /// functional-update syntax here.
    pub fn new(game: impl Into<String>) -> Self {
        ConfigCache {
            files: IndexMap::new(),
            file_ops_disabled: false,
            download_context: DownloadContext::default(),
            game_name: game.into(),
        }
    }

    /// The game name used for `%GAME%` substitution.
    pub fn game_name(&self) -> &str {
        &self.game_name
    }

    /// Look up a cached file without touching disk.
    pub fn find_existing(&self, filename: &Path) -> Option<&ConfigFile> {
        self.files.get(filename)
    }

    /// Look up a file, lazily loading it from disk on first access.
    ///
    /// When the file is not cached and file operations are enabled, it
    /// is read and cached if it exists on disk, or if
    /// `create_if_missing` asks for an empty one. Returns `None` when
    /// file operations are disabled or the file genuinely is not there
    /// and creation was not requested - the disable gate blocks
    /// creation too, not just reads.
    pub fn find(&mut self, filename: &Path, create_if_missing: bool) -> Option<&mut ConfigFile> {
        if !self.files.contains_key(filename)
            && !self.file_ops_disabled
            && (create_if_missing || fs::metadata(filename).is_ok())
        {
            let mut file = ConfigFile::with_game(&self.game_name);
            file.read_with(self.download_context, filename);
            debug!(file = %filename.display(), "config cache loaded file");
            self.files.insert(filename.to_path_buf(), file);
        }
        self.files.get_mut(filename)
    }

    /// Write dirty files back to disk (all of them, or just `filename`).
    /// With `read` set, additionally evict the file(s) so the next
    /// access re-reads from disk.
    pub fn flush(&mut self, read: bool, filename: Option<&Path>) {
        if !self.file_ops_disabled {
            for (path, file) in &mut self.files {
                if filename.is_none_or(|f| f == path.as_path()) {
                    if let Err(err) = file.write(path) {
                        warn!(file = %path.display(), %err, "failed to flush config file");
                    }
                }
            }
        }
        if read {
            if self.file_ops_disabled {
                warn!("tried to flush the config cache and read it back in, but file operations are disabled");
                return;
            }
            match filename {
                Some(f) => {
                    self.files.shift_remove(f);
                }
                None => self.files.clear(),
            }
        }
    }

    /// Mark sections created from here on as downloaded, optionally
    /// associated with a user. Existing sections are unaffected.
    pub fn start_using_downloaded_cache(&mut self, user_index: Option<i32>) {
        self.download_context = DownloadContext::downloaded(user_index);
    }

    /// Return section creation to normal tagging.
    pub fn stop_using_downloaded_cache(&mut self) {
        self.download_context = DownloadContext::default();
    }

    /// Remove every downloaded section whose user index matches
    /// `user_index` exactly. Passing `None` removes only the sections
    /// tagged with no user, not all downloaded sections.
    pub fn remove_downloaded_sections(&mut self, user_index: Option<i32>) {
        for file in self.files.values_mut() {
            file.retain_sections(|_, section| {
                !(section.is_downloaded() && section.user_index() == user_index)
            });
        }
    }

    /// Stop all disk access by the cache; `find` becomes cache-hit-only
    /// and flush skips its write phase.
    pub fn disable_file_operations(&mut self) {
        self.file_ops_disabled = true;
    }

    pub fn enable_file_operations(&mut self) {
        self.file_ops_disabled = false;
    }

    pub fn are_file_operations_disabled(&self) -> bool {
        self.file_ops_disabled
    }

    /// Read a file from disk into the cache, replacing any cached copy.
    /// If the file is missing, `fallback` (when given) is cached under
    /// the name instead.
    pub fn load_file(&mut self, filename: &Path, fallback: Option<&ConfigFile>) {
        if fs::metadata(filename).is_ok() {
            let mut file = ConfigFile::with_game(&self.game_name);
            file.read_with(self.download_context, filename);
            debug!(file = %filename.display(), "config cache loaded file");
            self.files.insert(filename.to_path_buf(), file);
        } else if let Some(fallback) = fallback {
            self.files.insert(filename.to_path_buf(), fallback.clone());
            debug!(file = %filename.display(), "config cache associated fallback file");
        } else {
            warn!(file = %filename.display(), "failed to load missing config file");
        }
    }

    /// Replace (or insert) a cache entry with an already-built file.
    pub fn set_file(&mut self, filename: &Path, file: ConfigFile) {
        self.files.insert(filename.to_path_buf(), file);
    }

    /// Evict a file from the cache without writing it.
    pub fn unload_file(&mut self, filename: &Path) {
        self.files.shift_remove(filename);
    }

    /// Mark a file as in-memory only: it stays readable and mutable but
    /// will never be written back to disk.
    pub fn detach(&mut self, filename: &Path) {
        if let Some(file) = self.find(filename, true) {
            file.no_save = true;
        }
    }

    /// Filenames of every cached file, in insertion order.
    pub fn config_filenames(&self) -> Vec<PathBuf> {
        self.files.keys().cloned().collect()
    }

    // Typed getters. Each fails with `None` at any missing level and
    // leaves parsing policy to the accessor: numbers parse leniently
    // (a present but garbled value reads as zero, like the text format
    // always has), bools recognize a fixed token set.

    pub fn get_string(&mut self, section: &str, key: &str, filename: &Path) -> Option<String> {
        self.find(filename, false)?.get_string(section, key)
    }

    pub fn get_int(&mut self, section: &str, key: &str, filename: &Path) -> Option<i32> {
        let text = self.get_string(section, key, filename)?;
        Some(text.trim().parse().unwrap_or_default())
    }

    pub fn get_float(&mut self, section: &str, key: &str, filename: &Path) -> Option<f32> {
        let text = self.get_string(section, key, filename)?;
        Some(text.trim().parse().unwrap_or_default())
    }

    pub fn get_double(&mut self, section: &str, key: &str, filename: &Path) -> Option<f64> {
        let text = self.get_string(section, key, filename)?;
        Some(text.trim().parse().unwrap_or_default())
    }

    /// `On`, `True`, `Yes` and `1` (case-insensitive) read as true;
    /// every other token reads as false.
    pub fn get_bool(&mut self, section: &str, key: &str, filename: &Path) -> Option<bool> {
        let text = self.get_string(section, key, filename)?;
        Some(["on", "true", "yes", "1"].contains(&text.to_ascii_lowercase().as_str()))
    }

    /// Every value stored for the key, in original insertion order.
    /// Missing file/section/key all read as an empty array.
    pub fn get_array(&mut self, section: &str, key: &str, filename: &Path) -> Vec<String> {
        self.find(filename, false)
            .and_then(|file| {
                let section = file.section(section)?;
                Some(section.find_all(key).into_iter().map(str::to_string).collect())
            })
            .unwrap_or_default()
    }

    // Typed setters. The file and section are created on demand; the
    // dirty comparison is case-sensitive throughout.

    pub fn set_string(&mut self, section: &str, key: &str, value: &str, filename: &Path) {
        let context = self.download_context;
        if let Some(file) = self.find(filename, true) {
            file.set_string_with(context, section, key, value);
        }
    }

    pub fn set_int(&mut self, section: &str, key: &str, value: i32, filename: &Path) {
        self.set_string(section, key, &value.to_string(), filename);
    }

    pub fn set_float(&mut self, section: &str, key: &str, value: f32, filename: &Path) {
        self.set_string(section, key, &format!("{value:.6}"), filename);
    }

    pub fn set_double(&mut self, section: &str, key: &str, value: f64, filename: &Path) {
        self.set_string(section, key, &format!("{value:.6}"), filename);
    }

    pub fn set_bool(&mut self, section: &str, key: &str, value: bool, filename: &Path) {
        self.set_string(section, key, if value { "True" } else { "False" }, filename);
    }

    /// Replace every entry for the key with the given values, in order.
    pub fn set_array(&mut self, section: &str, key: &str, values: &[String], filename: &Path) {
        let context = self.download_context;
        let Some(file) = self.find(filename, true) else {
            return;
        };
        let section = file.section_or_insert_with(context, section);
        let mutated = section.remove_key(key) > 0 || !values.is_empty();
        for value in values {
            section.add(key, value);
        }
        if mutated {
            file.dirty = true;
        }
    }

    /// Clear a section's entries and drop the section. If that leaves
    /// the file with no sections at all, the file is deleted from disk
    /// rather than rewritten empty; otherwise the file is flushed
    /// immediately.
    pub fn empty_section(&mut self, section: &str, filename: &Path) {
        let mut removed = false;
        let mut now_empty = false;
        if let Some(file) = self.find(filename, false) {
            if let Some(sec) = file.section_mut(section) {
                sec.clear();
                removed = file.remove_section(section);
                now_empty = file.is_empty();
                if !now_empty {
                    file.dirty = true;
                }
            }
        }
        if removed {
            if now_empty {
                let _ = fs::remove_file(filename);
            } else {
                self.flush(false, Some(filename));
            }
        }
    }

    /// A section's pairs rendered as `key=value` strings, in order.
    pub fn get_section(&mut self, section: &str, filename: &Path) -> Option<Vec<String>> {
        let file = self.find(filename, false)?;
        let section = file.section(section)?;
        Some(
            section
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect(),
        )
    }

    /// Names of every section in the file, in insertion order.
    /// `None` means the file itself was not found.
    pub fn get_section_names(&mut self, filename: &Path) -> Option<Vec<String>> {
        let file = self.find(filename, false)?;
        Some(file.section_names().map(str::to_string).collect())
    }

    /// Names of sections holding per-object data for `class_name`:
    /// sections named `<ObjectName> <ClassName>`, capped at
    /// `max_results`.
    pub fn get_per_object_config_sections(
        &mut self,
        filename: &Path,
        class_name: &str,
        max_results: usize,
    ) -> Vec<String> {
        let Some(file) = self.find(filename, false) else {
            return Vec::new();
        };
        file.section_names()
            .filter(|name| {
                name.split_once(' ')
                    .is_some_and(|(_, class)| class == class_name)
            })
            .take(max_results)
            .map(str::to_string)
            .collect()
    }

    /// Parse a section that alternates a group-key line with member-key
    /// lines beneath it:
    ///
    /// ```ini
    /// [PerMapPackages]
    /// MapName=Map1
    /// Package=PackageA
    /// Package=PackageB
    /// MapName=Map2
    /// Package=PackageC
    /// ```
    ///
    /// Members group under the most recent group key; any line matching
    /// neither key resets the active group.
    pub fn parse_1_to_n_section(
        &mut self,
        section: &str,
        key_one: &str,
        key_n: &str,
        filename: &Path,
    ) -> IndexMap<String, Vec<String>> {
        let mut out: IndexMap<String, Vec<String>> = IndexMap::new();
        let Some(file) = self.find(filename, false) else {
            return out;
        };
        let Some(section) = file.section(section) else {
            return out;
        };
        let mut current: Option<String> = None;
        for (key, value) in section.iter() {
            if key.eq_ignore_ascii_case(key_one) {
                out.entry(value.to_string()).or_default();
                current = Some(value.to_string());
            } else if key.eq_ignore_ascii_case(key_n) && current.is_some() {
                if let Some(list) = current.as_ref().and_then(|c| out.get_mut(c)) {
                    list.push(value.to_string());
                }
            } else {
                current = None;
            }
        }
        out
    }

    /// Bundle every `.ini` in `config_dir` (minus the archive itself
    /// and anything listed under `[ConfigCoalesceFilter]` in
    /// `filter_ini`) into one `Coalesced.ini` archive, written with the
    /// requested byte order. Purely a load-time I/O optimization; the
    /// archive is semantically equivalent to loading each file
    /// individually.
    pub fn coalesce_files_from_disk(
        &mut self,
        config_dir: &Path,
        endianness: Endianness,
        filter_ini: Option<&Path>,
    ) -> Result<()> {
        let excluded: Vec<String> = filter_ini
            .and_then(|f| self.find(f, false))
            .and_then(|file| {
                let section = file.section(COALESCE_FILTER_SECTION)?;
                Some(section.iter().map(|(_, v)| v.to_string()).collect())
            })
            .unwrap_or_default();

        let mut names: Vec<PathBuf> = Vec::new();
        let dir = fs::read_dir(config_dir)
            .map_err(|source| crate::error::ConfigError::io(config_dir, source))?;
        for entry in dir {
            let entry = entry.map_err(|source| crate::error::ConfigError::io(config_dir, source))?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if path.extension().and_then(|e| e.to_str()) == Some("ini")
                && name != COALESCED_FILENAME
                && !excluded.iter().any(|ex| ex == name)
            {
                names.push(path);
            }
        }
        // Directory iteration order is platform-dependent; archives
        // must not be.
        names.sort();

        let mut entries = Vec::new();
        for path in &names {
            match fs::read_to_string(path) {
                Ok(contents) => {
                    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                        entries.push((name.to_string(), contents));
                    }
                }
                Err(err) => {
                    warn!(file = %path.display(), %err, "skipping unreadable file during coalesce");
                }
            }
        }

        coalesced::write_archive(&config_dir.join(COALESCED_FILENAME), &entries, endianness)
    }

    /// Read a coalesced archive back and cache one [`ConfigFile`] per
    /// entry, filled through the coalesced (force-add) parse path
    /// instead of touching the filesystem per file.
    pub fn load_coalesced_file(&mut self, config_dir: &Path) -> Result<()> {
        let archive = config_dir.join(COALESCED_FILENAME);
        let entries = coalesced::read_archive(&archive)?;
        let context = self.download_context;
        for (name, contents) in entries {
            let path = config_dir.join(&name);
            let mut file = ConfigFile::with_game(&self.game_name);
            file.process_contents_with(context, &contents);
            debug!(file = %path.display(), "config cache loaded coalesced entry");
            self.files.insert(path, file);
        }
        Ok(())
    }
}

impl Drop for ConfigCache {
    /// Final flush-with-write so dirty files are not lost at shutdown.
    fn drop(&mut self) {
        self.flush(false, None);
    }
}
