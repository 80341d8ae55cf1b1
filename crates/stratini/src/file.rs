//! `ConfigFile`: one parsed `.ini` as an ordered map of sections.
//!
//! A file accumulates content from an override chain: `read` replaces
//! everything with a single file's contents, `combine` merges another
//! layer on top honoring the `+ - . !` directives, and
//! `process_contents` ingests pre-resolved coalesced content with every
//! key force-added. The three paths share the tokenizer but must not be
//! collapsed into one: combine supports override commands, the
//! coalesced path deliberately does not.

use std::fmt;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;

use crate::error::Result;
use crate::parse;
use crate::section::{ConfigSection, DownloadContext};

/// Which parsing flavor [`ConfigFile::apply_contents`] runs.
#[derive(Clone, Copy, PartialEq, Eq)]
enum ParseMode {
    /// Honor merge-command prefixes; mutations set the dirty flag.
    Combine,
    /// Force-add every pair; content is already resolved, so the file
    /// stays clean.
    Coalesced,
}

/// An ordered map from section name to [`ConfigSection`], plus the
/// flags controlling persistence.
///
/// Section names are unique within a file and keep insertion order so
/// written output round-trips deterministically.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    sections: IndexMap<String, ConfigSection>,
    /// In-memory changes not yet flushed to disk.
    pub dirty: bool,
    /// When set, `write` is a no-op even when dirty; the file exists
    /// only in memory.
    pub no_save: bool,
    /// Force quoting of every value on write, not just values that
    /// need it for round-trip safety.
    pub quote_all_values: bool,
    game_name: String,
}

impl ConfigFile {
    pub fn new() -> Self {
        ConfigFile::default()
    }

    /// A file whose text will have `%GAME%` replaced with `game` before
    /// tokenizing. An empty game name disables the substitution.
    pub fn with_game(game: impl Into<String>) -> Self {
        ConfigFile {
            game_name: game.into(),
            ..ConfigFile::default()
        }
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Section names in insertion order.
    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Sections with their names, in insertion order.
    pub fn sections(&self) -> impl Iterator<Item = (&str, &ConfigSection)> {
        self.sections.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn section(&self, name: &str) -> Option<&ConfigSection> {
        self.sections.get(name)
    }

    pub fn section_mut(&mut self, name: &str) -> Option<&mut ConfigSection> {
        self.sections.get_mut(name)
    }

    /// Find or create a section, tagging a newly created one with the
    /// given download context.
    pub fn section_or_insert_with(
        &mut self,
        context: DownloadContext,
        name: &str,
    ) -> &mut ConfigSection {
        self.sections
            .entry(name.to_string())
            .or_insert_with(|| ConfigSection::with_context(context))
    }

    /// Find or create a section with default (not downloaded) tagging.
    pub fn section_or_insert(&mut self, name: &str) -> &mut ConfigSection {
        self.section_or_insert_with(DownloadContext::default(), name)
    }

    /// Remove a section entirely. Returns whether it existed.
    pub fn remove_section(&mut self, name: &str) -> bool {
        self.sections.shift_remove(name).is_some()
    }

    /// Drop every section the predicate rejects.
    pub(crate) fn retain_sections(&mut self, mut keep: impl FnMut(&str, &ConfigSection) -> bool) {
        self.sections.retain(|name, section| keep(name, section));
    }

    /// Clear all sections. Flags are left alone.
    pub fn clear(&mut self) {
        self.sections.clear();
    }

    fn substitute_game(&self, text: &str) -> String {
        if self.game_name.is_empty() {
            text.to_string()
        } else {
            text.replace("%GAME%", &self.game_name)
        }
    }

    fn apply_contents(&mut self, context: DownloadContext, contents: &str, mode: ParseMode) {
        let text = self.substitute_game(contents);
        // Index of the currently open section; survives across lines and
        // across repeated calls on the same file, which is what makes a
        // section mergeable from multiple layers.
        let mut current: Option<usize> = None;
        for line in text.split(['\r', '\n']) {
            if line.is_empty() {
                continue;
            }
            if let Some(name) = parse::section_header(line) {
                let index = match self.sections.get_index_of(name) {
                    Some(index) => index,
                    None => {
                        self.sections
                            .insert(name.to_string(), ConfigSection::with_context(context));
                        self.sections.len() - 1
                    }
                };
                current = Some(index);
                continue;
            }
            let Some(index) = current else {
                continue;
            };
            let Some((raw_key, raw_value)) = parse::split_pair(line) else {
                continue;
            };
            let Some((_, section)) = self.sections.get_index_mut(index) else {
                continue;
            };
            match mode {
                ParseMode::Combine => {
                    let (command, key) = parse::parse_key(raw_key);
                    let value = parse::parse_value(raw_value);
                    if section.apply(command, key, &value) {
                        self.dirty = true;
                    }
                }
                ParseMode::Coalesced => {
                    let key = raw_key.trim();
                    let value = parse::parse_coalesced_value(raw_value);
                    section.add(key, &value);
                }
            }
        }
    }

    /// Merge another layer from disk into this file, honoring the
    /// `+ - . !` directives. A missing layer is expected and fine:
    /// silent no-op.
    pub fn combine(&mut self, path: &Path) {
        self.combine_with(DownloadContext::default(), path);
    }

    pub(crate) fn combine_with(&mut self, context: DownloadContext, path: &Path) {
        if let Ok(text) = fs::read_to_string(path) {
            self.apply_contents(context, &text, ParseMode::Combine);
        }
    }

    /// Ingest pre-resolved contents (from a coalesced archive). Every
    /// key is force-added; command prefixes stay part of the key.
    pub fn process_contents(&mut self, contents: &str) {
        self.process_contents_with(DownloadContext::default(), contents);
    }

    pub(crate) fn process_contents_with(&mut self, context: DownloadContext, contents: &str) {
        self.apply_contents(context, contents, ParseMode::Coalesced);
    }

    /// Replace this file's contents with a single file from disk.
    /// A missing file leaves the file empty.
    pub fn read(&mut self, path: &Path) {
        self.read_with(DownloadContext::default(), path);
    }

    pub(crate) fn read_with(&mut self, context: DownloadContext, path: &Path) {
        self.clear();
        if let Ok(text) = fs::read_to_string(path) {
            self.apply_contents(context, &text, ParseMode::Coalesced);
        }
    }

    fn quote_on_write(&self, value: &str) -> bool {
        // Unquoted leading whitespace would be stripped on the next
        // read, so such values are force-quoted regardless of settings.
        self.quote_all_values || value.starts_with(' ')
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for (name, section) in &self.sections {
            out.push('[');
            out.push_str(name);
            out.push_str("]\n");
            for (key, value) in section.iter() {
                if self.quote_on_write(value) {
                    // Backslashes must be escaped or the readers decode
                    // them as `\XY` byte escapes. Interior quotes stay
                    // raw: `read` strips one quote layer and re-escapes
                    // them itself, so pre-escaping would double up.
                    let escaped = value.replace('\\', "\\\\");
                    out.push_str(&format!("{key}=\"{escaped}\"\n"));
                } else {
                    out.push_str(&format!("{key}={value}\n"));
                }
            }
            out.push('\n');
        }
        out
    }

    /// Serialize to disk. No-op (and success) unless the file is dirty
    /// and saving is allowed; clears the dirty flag on a successful
    /// write and leaves it set otherwise.
    pub fn write(&mut self, path: &Path) -> Result<()> {
        if !self.dirty || self.no_save {
            return Ok(());
        }
        fs::write(path, self.render()).map_err(|source| crate::error::ConfigError::io(path, source))?;
        self.dirty = false;
        Ok(())
    }

    /// First value for `key` in `section`, if both exist.
    pub fn get_string(&self, section: &str, key: &str) -> Option<String> {
        Some(self.section(section)?.find(key)?.to_string())
    }

    /// Numeric accessor used by the `[IniVersion]` fingerprint machinery.
    /// A present but unparseable value reads as zero.
    pub fn get_double(&self, section: &str, key: &str) -> Option<f64> {
        let text = self.get_string(section, key)?;
        Some(text.trim().parse().unwrap_or_default())
    }

    /// Set a single value, replacing the first existing entry for the
    /// key. The dirty comparison is case-sensitive: values legitimately
    /// differ only by case.
    pub fn set_string(&mut self, section: &str, key: &str, value: &str) {
        self.set_string_with(DownloadContext::default(), section, key, value);
    }

    pub(crate) fn set_string_with(
        &mut self,
        context: DownloadContext,
        section: &str,
        key: &str,
        value: &str,
    ) {
        let section = self
            .sections
            .entry(section.to_string())
            .or_insert_with(|| ConfigSection::with_context(context));
        match section.find_mut(key) {
            None => {
                section.add(key, value);
                self.dirty = true;
            }
            Some(existing) => {
                if existing != value {
                    *existing = value.to_string();
                    self.dirty = true;
                }
            }
        }
    }

    pub fn set_double(&mut self, section: &str, key: &str, value: f64) {
        self.set_string(section, key, &format!("{value:.6}"));
    }
}

impl PartialEq for ConfigFile {
    /// Content comparison by insertion-order pairing: callers rely on
    /// consistent section ordering, so a name-lookup comparison would
    /// be wrong. Flags are not compared.
    fn eq(&self, other: &Self) -> bool {
        self.sections.len() == other.sections.len()
            && self
                .sections
                .iter()
                .zip(other.sections.iter())
                .all(|((an, asec), (bn, bsec))| an == bn && asec == bsec)
    }
}

impl fmt::Display for ConfigFile {
    /// The serialized `.ini` text, exactly as `write` would emit it.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn combined(text: &str) -> ConfigFile {
        let mut file = ConfigFile::new();
        file.apply_contents(DownloadContext::default(), text, ParseMode::Combine);
        file
    }

    #[test]
    fn test_combine_basic_sections_and_pairs() {
        let file = combined("[A]\nKey=1\nOther=2\n\n[B]\nKey=3\n");
        assert_eq!(file.get_string("A", "Key").as_deref(), Some("1"));
        assert_eq!(file.get_string("A", "Other").as_deref(), Some("2"));
        assert_eq!(file.get_string("B", "Key").as_deref(), Some("3"));
        assert_eq!(file.section_names().collect::<Vec<_>>(), vec!["A", "B"]);
        assert!(file.dirty);
    }

    #[test]
    fn test_lines_without_equals_are_ignored() {
        let file = combined("[A]\n; comment-ish noise\nmalformed line\nKey=1\n");
        let section = file.section("A").expect("section");
        assert_eq!(section.len(), 1);
    }

    #[test]
    fn test_pairs_before_any_section_are_ignored() {
        let file = combined("Key=1\n[A]\nOther=2\n");
        assert_eq!(file.get_string("A", "Key"), None);
        assert_eq!(file.get_string("A", "Other").as_deref(), Some("2"));
    }

    #[test]
    fn test_reopened_section_accumulates() {
        let file = combined("[A]\nKey=1\n[B]\nX=0\n[A]\n.Key=2\n");
        let section = file.section("A").expect("section");
        assert_eq!(section.find_all("Key"), vec!["1", "2"]);
    }

    #[test]
    fn test_combine_applies_merge_commands() {
        let mut file = combined("[A]\nKey=1\n.Key=2\n");
        file.apply_contents(
            DownloadContext::default(),
            "[A]\n+Key=2\n+Key=3\n-Key=1\n",
            ParseMode::Combine,
        );
        let section = file.section("A").expect("section");
        assert_eq!(section.find_all("Key"), vec!["2", "3"]);
    }

    #[test]
    fn test_coalesced_path_does_not_honor_commands() {
        // The same text through the coalesced path keeps the prefixes
        // as part of the key and force-adds everything. This asymmetry
        // is load-bearing for coalesced archives: do not "fix" it.
        let mut file = ConfigFile::new();
        file.process_contents("[A]\nKey=1\n+Key=1\n!Key=\n");
        let section = file.section("A").expect("section");
        assert_eq!(section.find_all("Key"), vec!["1"]);
        assert_eq!(section.find_all("+Key"), vec!["1"]);
        assert_eq!(section.find_all("!Key"), vec![""]);
        assert!(!file.dirty, "loading resolved content leaves the file clean");
    }

    #[test]
    fn test_game_substitution() {
        let mut file = ConfigFile::with_game("ExampleGame");
        file.process_contents("[%GAME%.Engine]\nName=%GAME%\n");
        assert_eq!(
            file.get_string("ExampleGame.Engine", "Name").as_deref(),
            Some("ExampleGame")
        );
    }

    #[test]
    fn test_write_skips_clean_and_nosave_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.ini");

        let mut clean = combined("[A]\nKey=1\n");
        clean.dirty = false;
        clean.write(&path).expect("write");
        assert!(!path.exists());

        let mut detached = combined("[A]\nKey=1\n");
        detached.no_save = true;
        detached.write(&path).expect("write");
        assert!(!path.exists());
    }

    #[test]
    fn test_write_format_and_dirty_clearing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.ini");

        let mut file = combined("[A]\nKey=1\n.Key=2\n[B]\nLeading=\" padded\"\n");
        file.write(&path).expect("write");
        assert!(!file.dirty);

        let text = fs::read_to_string(&path).expect("read back");
        // Leading-space values are force-quoted for round-trip safety.
        assert_eq!(text, "[A]\nKey=1\nKey=2\n\n[B]\nLeading=\" padded\"\n\n");
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("round.ini");

        let mut original = combined("[A]\nKey=\" leading space\"\n.Key=plain\n[B]\nX=\"quoted\"\n");
        original.write(&path).expect("write");

        let mut reread = ConfigFile::new();
        reread.read(&path);
        assert_eq!(original, reread);
    }

    #[test]
    fn test_quoted_values_with_backslashes_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("esc.ini");

        let mut file = ConfigFile::new();
        file.set_string("S", "Dir", " C:\\data");
        file.set_string("S", "Trailer", " ends in \\");
        file.write(&path).expect("write");

        let text = fs::read_to_string(&path).expect("read back");
        assert!(text.contains("Dir=\" C:\\\\data\""));

        let mut reread = ConfigFile::new();
        reread.read(&path);
        assert_eq!(reread.get_string("S", "Dir").as_deref(), Some(" C:\\data"));
        assert_eq!(
            reread.get_string("S", "Trailer").as_deref(),
            Some(" ends in \\")
        );
    }

    #[test]
    fn test_quoted_values_with_interior_quotes_round_trip() {
        // Interior quotes are written raw; the read path strips the
        // outer layer and re-escapes them before decoding.
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("quotes.ini");

        let mut file = ConfigFile::new();
        file.set_string("S", "Say", " he said \"hi\"");
        file.write(&path).expect("write");

        let mut reread = ConfigFile::new();
        reread.read(&path);
        assert_eq!(
            reread.get_string("S", "Say").as_deref(),
            Some(" he said \"hi\"")
        );
    }

    #[test]
    fn test_quote_all_values_on_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("quoted.ini");

        let mut file = combined("[A]\nKey=plain\n");
        file.quote_all_values = true;
        file.write(&path).expect("write");
        let text = fs::read_to_string(&path).expect("read back");
        assert_eq!(text, "[A]\nKey=\"plain\"\n\n");
    }

    #[test]
    fn test_read_replaces_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.ini");
        fs::write(&path, "[New]\nKey=1\n").expect("write fixture");

        let mut file = combined("[Old]\nGone=1\n");
        file.read(&path);
        assert!(file.section("Old").is_none());
        assert_eq!(file.get_string("New", "Key").as_deref(), Some("1"));
    }

    #[test]
    fn test_combine_missing_file_is_silent() {
        let mut file = combined("[A]\nKey=1\n");
        file.combine(Path::new("/nonexistent/layer.ini"));
        assert_eq!(file.get_string("A", "Key").as_deref(), Some("1"));
    }

    #[test]
    fn test_set_string_dirty_is_case_sensitive() {
        let mut file = ConfigFile::new();
        file.set_string("A", "Key", "Value");
        file.dirty = false;
        file.set_string("A", "Key", "Value");
        assert!(!file.dirty, "no-op set must not dirty the file");
        file.set_string("A", "Key", "value");
        assert!(file.dirty, "a case-only change is still a change");
        assert_eq!(file.get_string("A", "Key").as_deref(), Some("value"));
    }

    #[test]
    fn test_equality_pairs_by_order() {
        let a = combined("[A]\nK=1\n[B]\nK=2\n");
        let b = combined("[B]\nK=2\n[A]\nK=1\n");
        assert_ne!(a, b);
    }
}
