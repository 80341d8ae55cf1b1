//! `ConfigSection`: one `[Section]` block as an ordered multimap.
//!
//! Storage is a plain ordered list of (key, value) pairs. A key with one
//! pair behaves like a single-value map entry ("first match wins" for
//! replace and presence checks); duplicate keys represent array-valued
//! keys. Keeping both behaviors on one container is intentional, not
//! incidental: the merge commands below switch between them.

use crate::parse::MergeCommand;

/// Tagging applied to sections created while a downloaded cache is in
/// use. Fixed at section creation; never retroactively changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadContext {
    /// New sections are marked temporary (never persisted, bulk-removable).
    pub downloaded: bool,
    /// Optional owner tag for grouped removal. `None` is the "no user"
    /// sentinel and only matches removals that ask for exactly that.
    pub user_index: Option<i32>,
}

impl DownloadContext {
    /// Context for sections injected from a downloaded source.
    pub fn downloaded(user_index: Option<i32>) -> Self {
        DownloadContext {
            downloaded: true,
            user_index,
        }
    }
}

/// An ordered multimap of key/value pairs with case-insensitive,
/// case-preserving keys.
#[derive(Debug, Clone, Default)]
pub struct ConfigSection {
    pairs: Vec<(String, String)>,
    downloaded: bool,
    user_index: Option<i32>,
}

/// Case-insensitive key comparison; stored keys keep their original case.
fn key_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

fn has_quotes(s: &str) -> bool {
    s.len() >= 2 && s.starts_with('"') && s.ends_with('"')
}

/// Value equality for merge commands and section comparison.
///
/// Two values match if they are identical, or if stripping a single
/// layer of surrounding double quotes from either side makes them
/// identical. Some values arrive still quoted from disk while others
/// are set programmatically without quotes; the commands must treat
/// those as the same value.
pub(crate) fn values_equal(a: &str, b: &str) -> bool {
    a == b
        || (has_quotes(a) && &a[1..a.len() - 1] == b)
        || (has_quotes(b) && a == &b[1..b.len() - 1])
}

impl ConfigSection {
    pub fn new() -> Self {
        ConfigSection::default()
    }

    /// Create a section tagged with the given download context.
    pub fn with_context(context: DownloadContext) -> Self {
        ConfigSection {
            pairs: Vec::new(),
            downloaded: context.downloaded,
            user_index: context.user_index,
        }
    }

    /// Whether this section was injected from a downloaded source.
    pub fn is_downloaded(&self) -> bool {
        self.downloaded
    }

    /// The user index this section is associated with, if any.
    pub fn user_index(&self) -> Option<i32> {
        self.user_index
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    /// Pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// First value stored for `key`, if any.
    pub fn find(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| key_eq(k, key))
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn find_mut(&mut self, key: &str) -> Option<&mut String> {
        self.pairs
            .iter_mut()
            .find(|(k, _)| key_eq(k, key))
            .map(|(_, v)| v)
    }

    /// All values for `key`, in insertion order.
    pub fn find_all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| key_eq(k, key))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Unconditionally append a pair (the `.` command).
    pub fn add(&mut self, key: &str, value: &str) {
        self.pairs.push((key.to_string(), value.to_string()));
    }

    /// Append the pair unless an identical (key, value) pair already
    /// exists (the `+` command). Returns whether anything was added.
    pub fn add_unique(&mut self, key: &str, value: &str) -> bool {
        if self
            .pairs
            .iter()
            .any(|(k, v)| key_eq(k, key) && values_equal(v, value))
        {
            return false;
        }
        self.add(key, value);
        true
    }

    /// Remove pairs matching both key and value (the `-` command).
    /// Returns whether anything was removed.
    pub fn remove_pair(&mut self, key: &str, value: &str) -> bool {
        let before = self.pairs.len();
        self.pairs
            .retain(|(k, v)| !(key_eq(k, key) && values_equal(v, value)));
        self.pairs.len() != before
    }

    /// Remove every entry for `key` (the `!` command). Returns the
    /// number of entries removed.
    pub fn remove_key(&mut self, key: &str) -> usize {
        let before = self.pairs.len();
        self.pairs.retain(|(k, _)| !key_eq(k, key));
        before - self.pairs.len()
    }

    /// Apply one parsed merge directive. Returns whether the section
    /// mutated; the owning file's dirty flag follows from that.
    pub(crate) fn apply(&mut self, command: MergeCommand, key: &str, value: &str) -> bool {
        match command {
            MergeCommand::Replace => {
                match self.find_mut(key) {
                    Some(existing) => *existing = value.to_string(),
                    None => self.add(key, value),
                }
                true
            }
            MergeCommand::AddUnique => self.add_unique(key, value),
            MergeCommand::RemovePair => self.remove_pair(key, value),
            MergeCommand::ForceAdd => {
                self.add(key, value);
                true
            }
            MergeCommand::RemoveKey => self.remove_key(key) > 0,
        }
    }
}

impl PartialEq for ConfigSection {
    /// Pairwise comparison in insertion order, tolerant of one side
    /// being quote-wrapped. Download tagging must also match.
    fn eq(&self, other: &Self) -> bool {
        if self.pairs.len() != other.pairs.len()
            || self.downloaded != other.downloaded
            || self.user_index != other.user_index
        {
            return false;
        }
        self.pairs
            .iter()
            .zip(other.pairs.iter())
            .all(|((ak, av), (bk, bv))| key_eq(ak, bk) && values_equal(av, bv))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section_with(pairs: &[(&str, &str)]) -> ConfigSection {
        let mut sec = ConfigSection::new();
        for (k, v) in pairs {
            sec.add(k, v);
        }
        sec
    }

    #[test]
    fn test_replace_is_idempotent() {
        let mut sec = ConfigSection::new();
        assert!(sec.apply(MergeCommand::Replace, "Key", "1"));
        assert!(sec.apply(MergeCommand::Replace, "Key", "2"));
        assert_eq!(sec.find_all("Key"), vec!["2"]);
        assert_eq!(sec.len(), 1);
    }

    #[test]
    fn test_replace_overwrites_first_match_only() {
        let mut sec = section_with(&[("Key", "a"), ("Key", "b")]);
        sec.apply(MergeCommand::Replace, "Key", "c");
        assert_eq!(sec.find_all("Key"), vec!["c", "b"]);
    }

    #[test]
    fn test_add_unique_invariant() {
        let mut sec = ConfigSection::new();
        assert!(sec.apply(MergeCommand::AddUnique, "Key", "V"));
        assert!(!sec.apply(MergeCommand::AddUnique, "Key", "V"));
        assert!(!sec.apply(MergeCommand::AddUnique, "Key", "V"));
        assert_eq!(sec.find_all("Key"), vec!["V"]);
        // A different value for the same key is still added.
        assert!(sec.apply(MergeCommand::AddUnique, "Key", "W"));
        assert_eq!(sec.find_all("Key"), vec!["V", "W"]);
    }

    #[test]
    fn test_add_unique_tolerates_quoting() {
        let mut sec = section_with(&[("Key", "\"V\"")]);
        assert!(!sec.add_unique("Key", "V"));
        assert_eq!(sec.len(), 1);
    }

    #[test]
    fn test_remove_pair_exact_match_only() {
        let mut sec = section_with(&[("Key", "a"), ("Key", "b")]);
        assert!(sec.remove_pair("Key", "a"));
        assert!(!sec.remove_pair("Key", "missing"));
        assert_eq!(sec.find_all("Key"), vec!["b"]);
    }

    #[test]
    fn test_remove_key_clears_all_entries() {
        let mut sec = ConfigSection::new();
        for _ in 0..3 {
            sec.apply(MergeCommand::ForceAdd, "Key", "v");
        }
        sec.add("Other", "x");
        assert!(sec.apply(MergeCommand::RemoveKey, "Key", "ignored"));
        assert!(sec.find_all("Key").is_empty());
        assert_eq!(sec.find("Other"), Some("x"));
    }

    #[test]
    fn test_force_add_duplicates() {
        let mut sec = ConfigSection::new();
        sec.apply(MergeCommand::ForceAdd, "Key", "v");
        sec.apply(MergeCommand::ForceAdd, "Key", "v");
        assert_eq!(sec.find_all("Key"), vec!["v", "v"]);
    }

    #[test]
    fn test_keys_case_insensitive_case_preserving() {
        let mut sec = ConfigSection::new();
        sec.add("MixedCase", "1");
        assert_eq!(sec.find("mixedcase"), Some("1"));
        assert_eq!(sec.iter().next(), Some(("MixedCase", "1")));
    }

    #[test]
    fn test_values_equal_quote_tolerance() {
        assert!(values_equal("abc", "abc"));
        assert!(values_equal("\"abc\"", "abc"));
        assert!(values_equal("abc", "\"abc\""));
        assert!(!values_equal("\"abc\"", "abd"));
        // Only one layer of quotes is stripped.
        assert!(!values_equal("\"\"abc\"\"", "abc"));
    }

    #[test]
    fn test_section_equality_ignores_quote_wrapping() {
        let a = section_with(&[("Key", "value")]);
        let b = section_with(&[("Key", "\"value\"")]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_download_context_fixed_at_creation() {
        let sec = ConfigSection::with_context(DownloadContext::downloaded(Some(2)));
        assert!(sec.is_downloaded());
        assert_eq!(sec.user_index(), Some(2));
        let plain = ConfigSection::new();
        assert!(!plain.is_downloaded());
        assert_eq!(plain.user_index(), None);
    }
}
