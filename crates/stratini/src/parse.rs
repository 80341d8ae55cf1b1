//! Line tokenizer and value parser for `.ini` text.
//!
//! A physical line is one of three things: a `[Section]` header, a
//! `key=value` pair, or noise to ignore. Pair parsing comes in two
//! flavors that must stay distinct:
//!
//! - the **combine** flavor consumes a `+ - . !` merge-command prefix on
//!   the key and decodes quoted values in place ([`parse_key`] +
//!   [`parse_value`]);
//! - the **coalesced** flavor leaves command characters as part of the
//!   key and pre-normalizes the quoted value (strip one quote layer,
//!   re-escape interior quotes) before running the same escape decoder
//!   ([`parse_coalesced_value`]).
//!
//! Coalesced content is already-resolved per-file output, so it carries
//! no override directives; combine input is an override layer, so it
//! does.

/// How a parsed `key=value` line merges into a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeCommand {
    /// No prefix: overwrite the first existing entry, or add one.
    Replace,
    /// `+`: add the pair only if no identical (key, value) pair exists.
    AddUnique,
    /// `-`: remove pairs matching both key and value.
    RemovePair,
    /// `.`: always append, even if the pair already exists.
    ForceAdd,
    /// `!`: remove every entry for the key, whatever its value.
    RemoveKey,
}

/// Parse a hex digit; non-hex characters count as zero, matching the
/// lenient decoding the file format has always had.
fn hex_digit(c: char) -> u8 {
    match c {
        '0'..='9' => c as u8 - b'0',
        'a'..='f' => c as u8 - b'a' + 10,
        'A'..='F' => c as u8 - b'A' + 10,
        _ => 0,
    }
}

/// Returns the section name if this line is a `[Section]` header.
///
/// The opening bracket must be the first character of the line; the
/// closing bracket must be the last non-whitespace character.
pub(crate) fn section_header(line: &str) -> Option<&str> {
    line.trim_end().strip_prefix('[')?.strip_suffix(']')
}

/// Split a line on its first `=` into raw key and raw value.
/// Lines without `=` are not key-value pairs and are ignored upstream.
pub(crate) fn split_pair(line: &str) -> Option<(&str, &str)> {
    line.split_once('=')
}

/// Interpret the raw key of a combine-flavor line: strip leading
/// whitespace, consume a merge-command prefix if present, strip
/// trailing whitespace.
pub(crate) fn parse_key(raw: &str) -> (MergeCommand, &str) {
    let trimmed = raw.trim_start();
    let (command, rest) = match trimmed.chars().next() {
        Some('+') => (MergeCommand::AddUnique, &trimmed[1..]),
        Some('-') => (MergeCommand::RemovePair, &trimmed[1..]),
        Some('.') => (MergeCommand::ForceAdd, &trimmed[1..]),
        Some('!') => (MergeCommand::RemoveKey, &trimmed[1..]),
        _ => (MergeCommand::Replace, trimmed),
    };
    (command, rest.trim_end())
}

/// Decode the body of a quoted value, stopping at the first unescaped
/// closing quote. `\\` and `\"` decode to the literal character; any
/// other `\XY` is a two-hex-digit byte value.
fn decode_quoted_body(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => break,
            '\\' => match chars.next() {
                Some('\\') => out.push('\\'),
                Some('"') => out.push('"'),
                Some(hi) => {
                    let lo = chars.next().map(hex_digit).unwrap_or(0);
                    out.push(char::from(hex_digit(hi) * 16 + lo));
                }
                None => break,
            },
            _ => out.push(c),
        }
    }
    out
}

/// Interpret the raw value of a combine-flavor line.
///
/// Whitespace is trimmed at both ends. A value starting with `"` is a
/// quoted string with escape processing; anything else is literal.
pub(crate) fn parse_value(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.strip_prefix('"') {
        Some(body) => decode_quoted_body(body),
        None => trimmed.to_string(),
    }
}

/// Strip one layer of surrounding double quotes, if present.
pub(crate) fn trim_quotes(s: &str) -> &str {
    let s = s.strip_prefix('"').unwrap_or(s);
    s.strip_suffix('"').unwrap_or(s)
}

/// Interpret the raw value of a coalesced-flavor line.
///
/// Quoted values are pre-normalized (outer quote layer stripped,
/// interior quotes re-escaped) and then run through the same escape
/// decoder as the combine flavor. The observable difference: interior
/// unescaped quotes survive here, while the combine flavor stops at
/// them.
pub(crate) fn parse_coalesced_value(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') {
        let escaped = trim_quotes(trimmed).replace('"', "\\\"");
        decode_quoted_body(&escaped)
    } else {
        trimmed.to_string()
    }
}
