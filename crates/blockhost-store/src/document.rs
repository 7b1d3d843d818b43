//! Sectioned `key=value` documents.
//!
//! The text format is the loose INI dialect the engine and the launch
//! configuration share:
//!
//! ```text
//! server-port=25565
//! motd=A Minecraft Server
//!
//! [java]
//! java_xmx=512
//! jarfile=server.jar
//! ```
//!
//! Keys before the first `[section]` header belong to [`ROOT_SECTION`].
//! Blank lines and lines starting with `#` or `;` are ignored, a key without
//! `=` reads as `true`, and a value wrapped in double quotes is unquoted.
//!
//! Names and values that would not read back unchanged (line breaks, edge
//! whitespace, a leading quote, or a key that looks like a comment, header
//! or assignment) are written as JSON string literals.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of the implicit section holding keys that precede any header.
pub const ROOT_SECTION: &str = "";

/// A parsed property document: section → (key → value).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyDocument {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl PropertyDocument {
    /// Create an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse document text. Parsing never fails; unrecognised lines are skipped.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut document = Self::new();
        let mut section = ROOT_SECTION.to_string();

        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = unquote(header.trim()).into_owned();
                document.sections.entry(section.clone()).or_default();
                continue;
            }

            if let Some((key, value)) = quoted_entry(line) {
                document.set(&section, &key, &value);
                continue;
            }

            let (key, value) = match line.split_once('=') {
                Some((key, value)) => (key.trim(), unquote(value.trim())),
                None => (line, Cow::Borrowed("true")),
            };
            if key.is_empty() {
                continue;
            }
            document.set(&section, key, &value);
        }

        document
    }

    /// Look up a value.
    #[must_use]
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .map(String::as_str)
    }

    /// Look up a value in the root section.
    #[must_use]
    pub fn get_root(&self, key: &str) -> Option<&str> {
        self.get(ROOT_SECTION, key)
    }

    /// Look up a non-empty value.
    #[must_use]
    pub fn get_non_empty(&self, section: &str, key: &str) -> Option<&str> {
        self.get(section, key).filter(|v| !v.is_empty())
    }

    /// Read a value as a flag: only a case-insensitive `true` is set.
    #[must_use]
    pub fn get_bool(&self, section: &str, key: &str) -> bool {
        self.get(section, key)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }

    /// Read the leading integer of a value (`"512M"` reads as 512).
    #[must_use]
    pub fn get_int(&self, section: &str, key: &str) -> Option<i64> {
        self.get(section, key).and_then(parse_leading_int)
    }

    /// Set a value, creating the section if needed.
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    /// Remove a key. Returns the previous value.
    pub fn remove(&mut self, section: &str, key: &str) -> Option<String> {
        self.sections.get_mut(section).and_then(|s| s.remove(key))
    }

    /// Borrow one section.
    #[must_use]
    pub fn section(&self, section: &str) -> Option<&BTreeMap<String, String>> {
        self.sections.get(section)
    }

    /// Remove a whole section. Returns `true` if it existed.
    pub fn remove_section(&mut self, section: &str) -> bool {
        self.sections.remove(section).is_some()
    }

    /// Names of all named sections (the root section is excluded).
    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections
            .keys()
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    /// Returns true if the document holds no keys at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.values().all(BTreeMap::is_empty)
    }
}

impl fmt::Display for PropertyDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote_any = false;

        if let Some(root) = self.sections.get(ROOT_SECTION) {
            for (key, value) in root {
                writeln!(f, "{}={}", encode_key(key), encode_value(value))?;
                wrote_any = true;
            }
        }

        for (name, entries) in self.sections.iter().filter(|(n, _)| !n.is_empty()) {
            if wrote_any {
                writeln!(f)?;
            }
            writeln!(f, "[{}]", encode_value(name))?;
            for (key, value) in entries {
                writeln!(f, "{}={}", encode_key(key), encode_value(value))?;
            }
            wrote_any = true;
        }

        Ok(())
    }
}

fn unquote(value: &str) -> Cow<'_, str> {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        serde_json::from_str::<String>(value)
            .map_or_else(|_| Cow::Borrowed(&value[1..value.len() - 1]), Cow::Owned)
    } else {
        Cow::Borrowed(value)
    }
}

/// A line whose key is a JSON string literal: `"key"=value` or a bare `"key"`.
fn quoted_entry(line: &str) -> Option<(String, String)> {
    if !line.starts_with('"') {
        return None;
    }
    let mut literals = serde_json::Deserializer::from_str(line).into_iter::<String>();
    let key = literals.next()?.ok()?;
    let rest = line[literals.byte_offset()..].trim_start();

    if rest.is_empty() {
        return Some((key, "true".to_string()));
    }
    let value = rest.strip_prefix('=')?;
    Some((key, unquote(value.trim()).into_owned()))
}

fn needs_quoting(text: &str) -> bool {
    text != text.trim() || text.starts_with('"') || text.contains(['\n', '\r'])
}

fn quote(text: &str) -> Cow<'_, str> {
    serde_json::to_string(text).map_or(Cow::Borrowed(text), Cow::Owned)
}

fn encode_value(value: &str) -> Cow<'_, str> {
    if needs_quoting(value) {
        quote(value)
    } else {
        Cow::Borrowed(value)
    }
}

fn encode_key(key: &str) -> Cow<'_, str> {
    if key.is_empty()
        || needs_quoting(key)
        || key.contains('=')
        || key.starts_with(['#', ';', '['])
    {
        quote(key)
    } else {
        Cow::Borrowed(key)
    }
}

/// Parse the leading decimal integer of a string, ignoring whatever follows.
///
/// Leading whitespace and one sign are accepted; a string with no digits
/// yields `None`.
#[must_use]
pub fn parse_leading_int(value: &str) -> Option<i64> {
    let trimmed = value.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let magnitude: i64 = digits[..end].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# engine generated
server-port=25565
motd=A Minecraft Server
level-seed=

[java]
java_xmx=512
jarfile = server.jar
java_tweaks=\"-XX:+UseG1GC -Dfoo=bar\"

[minecraft]
unconventional
";

    #[test]
    fn parse_root_and_sections() {
        let doc = PropertyDocument::parse(SAMPLE);

        assert_eq!(doc.get_root("server-port"), Some("25565"));
        assert_eq!(doc.get_root("motd"), Some("A Minecraft Server"));
        assert_eq!(doc.get_root("level-seed"), Some(""));
        assert_eq!(doc.get("java", "java_xmx"), Some("512"));
        assert_eq!(doc.get("java", "jarfile"), Some("server.jar"));
        assert_eq!(
            doc.get("java", "java_tweaks"),
            Some("-XX:+UseG1GC -Dfoo=bar")
        );
        assert!(doc.get_bool("minecraft", "unconventional"));
    }

    #[test]
    fn value_may_contain_equals() {
        let doc = PropertyDocument::parse("generator-settings=a=b;c=d\n");
        assert_eq!(doc.get_root("generator-settings"), Some("a=b;c=d"));
    }

    #[test]
    fn display_then_parse_is_stable() {
        let doc = PropertyDocument::parse(SAMPLE);
        let text = doc.to_string();
        assert_eq!(PropertyDocument::parse(&text), doc);
        assert!(text.starts_with("level-seed=\n"));
        assert!(text.contains("\n[java]\n"));
    }

    #[test]
    fn awkward_values_read_back_unchanged() {
        let mut doc = PropertyDocument::new();
        doc.set(ROOT_SECTION, "motd", "line1\nenable-query=true");
        doc.set(ROOT_SECTION, "padded", "  padded  ");
        doc.set(ROOT_SECTION, "quoted", "\"Welcome\"");
        doc.set(ROOT_SECTION, "lone", "\"");
        doc.set(ROOT_SECTION, "path", r"C:\games");
        doc.set("java", "jar_args", "nogui");

        let text = doc.to_string();
        assert!(text.contains("motd=\"line1\\nenable-query=true\"\n"));
        assert!(text.contains("path=C:\\games\n"));

        let parsed = PropertyDocument::parse(&text);
        assert_eq!(parsed, doc);
        assert_eq!(parsed.get_root("enable-query"), None);
    }

    #[test]
    fn awkward_keys_and_sections_read_back_unchanged() {
        let mut doc = PropertyDocument::new();
        doc.set(ROOT_SECTION, "a=b", "1");
        doc.set(ROOT_SECTION, "#not-a-comment", "2");
        doc.set(ROOT_SECTION, "[not-a-header]", "3");
        doc.set(ROOT_SECTION, "multi\nline", "4");
        doc.set("cron\n[java]", "source", "* * * * *");

        let parsed = PropertyDocument::parse(&doc.to_string());
        assert_eq!(parsed, doc);
        assert!(parsed.section("java").is_none());
    }

    #[test]
    fn hand_written_quotes_are_lenient() {
        let doc = PropertyDocument::parse("a=\"C:\\bad\\escape\"\n\"flag\"\n");
        assert_eq!(doc.get_root("a"), Some(r"C:\bad\escape"));
        assert_eq!(doc.get_root("flag"), Some("true"));
    }

    #[test]
    fn set_and_remove() {
        let mut doc = PropertyDocument::new();
        assert!(doc.is_empty());

        doc.set("onreboot", "start", "false");
        doc.set(ROOT_SECTION, "server-port", "25566");
        assert_eq!(doc.get("onreboot", "start"), Some("false"));
        assert!(!doc.get_bool("onreboot", "start"));
        assert_eq!(doc.section_names().collect::<Vec<_>>(), vec!["onreboot"]);

        assert_eq!(doc.remove("onreboot", "start").as_deref(), Some("false"));
        assert!(doc.remove_section("onreboot"));
        assert!(!doc.remove_section("onreboot"));
    }

    #[test]
    fn leading_int_semantics() {
        assert_eq!(parse_leading_int("512"), Some(512));
        assert_eq!(parse_leading_int("512M"), Some(512));
        assert_eq!(parse_leading_int("  -5"), Some(-5));
        assert_eq!(parse_leading_int("+7x"), Some(7));
        assert_eq!(parse_leading_int(""), None);
        assert_eq!(parse_leading_int("abc"), None);
        assert_eq!(parse_leading_int("-"), None);
    }

    #[test]
    fn get_non_empty_filters_blank() {
        let doc = PropertyDocument::parse("[java]\njarfile=\n");
        assert_eq!(doc.get("java", "jarfile"), Some(""));
        assert_eq!(doc.get_non_empty("java", "jarfile"), None);
    }

    #[test]
    fn serializes_as_nested_map() {
        let doc = PropertyDocument::parse("server-port=25565\n[java]\njava_xmx=512\n");
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json[""]["server-port"], "25565");
        assert_eq!(json["java"]["java_xmx"], "512");
    }
}
