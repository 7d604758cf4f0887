//! Instance list file - the ordered index of instance names
//!
//! The list is written as a single-line JSON array of strings. Lists written by
//! earlier releases use a quoted list literal (`['alpha', 'beta']`); those are
//! still read and are rewritten as JSON on the next save.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::iter::Peekable;
use std::path::{Path, PathBuf};
use std::str::Chars;

use tracing::debug;

use crate::core::error::{Error, Result};
use crate::core::instance::{validate_name, LIST_FILE_NAME, LIST_TEMP_FILE_NAME};

/// Durable, human-readable storage for the ordered list of instance names
#[derive(Debug, Clone)]
pub struct ListStore {
    path: PathBuf,
    temp_path: PathBuf,
}

impl ListStore {
    /// List store for the instances directory `root`
    pub fn new(root: &Path) -> Self {
        Self {
            path: root.join(LIST_FILE_NAME),
            temp_path: root.join(LIST_TEMP_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the list. A missing or blank file is an empty list.
    pub fn load(&self) -> Result<Vec<String>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return Err(self.corrupt("file is not valid UTF-8"))
            }
            Err(e) => return Err(Error::storage("read", &self.path, e)),
        };

        let names = parse(&content).map_err(|reason| self.corrupt(reason))?;
        check_entries(&names).map_err(|reason| self.corrupt(reason))?;
        Ok(names)
    }

    /// Replace the whole list file with `names`
    pub fn save(&self, names: &[String]) -> Result<()> {
        let mut json = serde_json::to_string(names).map_err(|e| {
            Error::storage("serialize", &self.path, std::io::Error::other(e))
        })?;
        json.push('\n');

        std::fs::write(&self.temp_path, json)
            .map_err(|e| Error::storage("write", &self.temp_path, e))?;
        std::fs::rename(&self.temp_path, &self.path)
            .map_err(|e| Error::storage("replace", &self.path, e))?;

        debug!("Saved {} instance names to {:?}", names.len(), self.path);
        Ok(())
    }

    fn corrupt(&self, reason: impl Into<String>) -> Error {
        Error::CorruptList {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }
}

fn parse(content: &str) -> std::result::Result<Vec<String>, String> {
    let content = content.trim();
    if content.is_empty() {
        return Ok(Vec::new());
    }

    match serde_json::from_str::<Vec<String>>(content) {
        Ok(names) => Ok(names),
        Err(_) => parse_legacy(content),
    }
}

fn check_entries(names: &[String]) -> std::result::Result<(), String> {
    let mut seen = HashSet::new();
    for name in names {
        if let Err(Error::InvalidName { reason, .. }) = validate_name(name) {
            return Err(format!("entry {:?} is not a valid instance name ({})", name, reason));
        }
        if !seen.insert(name.as_str()) {
            return Err(format!("entry {:?} appears more than once", name));
        }
    }
    Ok(())
}

/// Strict reader for the quoted list literal of older releases
fn parse_legacy(input: &str) -> std::result::Result<Vec<String>, String> {
    let mut chars = input.chars().peekable();
    let mut names = Vec::new();

    skip_whitespace(&mut chars);
    match chars.next() {
        Some('[') => {}
        other => return Err(format!("expected '[' but found {}", describe(other))),
    }

    loop {
        skip_whitespace(&mut chars);
        match chars.peek() {
            Some(']') => {
                chars.next();
                break;
            }
            Some('\'') | Some('"') => {
                names.push(parse_string(&mut chars)?);
                skip_whitespace(&mut chars);
                match chars.next() {
                    Some(',') => {}
                    Some(']') => break,
                    other => {
                        return Err(format!("expected ',' or ']' but found {}", describe(other)))
                    }
                }
            }
            other => {
                return Err(format!(
                    "expected a quoted name but found {}",
                    describe(other.copied())
                ))
            }
        }
    }

    skip_whitespace(&mut chars);
    if let Some(c) = chars.next() {
        return Err(format!("unexpected {:?} after the closing ']'", c));
    }
    Ok(names)
}

fn parse_string(chars: &mut Peekable<Chars<'_>>) -> std::result::Result<String, String> {
    let quote = chars.next().ok_or("unexpected end of input")?;
    let mut out = String::new();

    loop {
        match chars.next() {
            None => return Err("unterminated string".to_string()),
            Some(c) if c == quote => return Ok(out),
            Some('\n') => return Err("line break inside a string".to_string()),
            Some('\\') => {
                let escaped = match chars.next() {
                    Some('\\') => '\\',
                    Some('\'') => '\'',
                    Some('"') => '"',
                    Some('n') => '\n',
                    Some('r') => '\r',
                    Some('t') => '\t',
                    Some('x') => parse_hex(chars, 2)?,
                    Some('u') => parse_hex(chars, 4)?,
                    Some('U') => parse_hex(chars, 8)?,
                    other => return Err(format!("unsupported escape \\{}", describe(other))),
                };
                out.push(escaped);
            }
            Some(c) => out.push(c),
        }
    }
}

fn parse_hex(chars: &mut Peekable<Chars<'_>>, digits: usize) -> std::result::Result<char, String> {
    let mut value = 0u32;
    for _ in 0..digits {
        let digit = chars
            .next()
            .and_then(|c| c.to_digit(16))
            .ok_or("malformed hexadecimal escape")?;
        value = value * 16 + digit;
    }
    char::from_u32(value).ok_or_else(|| format!("escape \\u{{{:x}}} is not a character", value))
}

fn skip_whitespace(chars: &mut Peekable<Chars<'_>>) {
    while chars.next_if(|c| c.is_whitespace()).is_some() {}
}

fn describe(c: Option<char>) -> String {
    match c {
        Some(c) => format!("{:?}", c),
        None => "end of input".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn missing_or_blank_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = ListStore::new(dir.path());
        assert!(store.load().unwrap().is_empty());

        std::fs::write(store.path(), "  \n").unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn save_then_load_returns_the_same_sequence() {
        let dir = tempdir().unwrap();
        let store = ListStore::new(dir.path());

        for seq in [
            names(&[]),
            names(&["alpha"]),
            names(&["zeta", "alpha", "Main Account", "it's \"quoted\"", "ünï"]),
        ] {
            store.save(&seq).unwrap();
            assert_eq!(store.load().unwrap(), seq);
        }
        assert!(!dir.path().join(LIST_TEMP_FILE_NAME).exists());
    }

    #[test]
    fn written_format_is_a_json_array_line() {
        let dir = tempdir().unwrap();
        let store = ListStore::new(dir.path());
        store.save(&names(&["alpha", "beta"])).unwrap();

        let content = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(content, "[\"alpha\",\"beta\"]\n");
    }

    #[test]
    fn reads_lists_written_by_older_releases() {
        let dir = tempdir().unwrap();
        let store = ListStore::new(dir.path());

        std::fs::write(store.path(), "['alpha', 'beta']").unwrap();
        assert_eq!(store.load().unwrap(), names(&["alpha", "beta"]));

        std::fs::write(store.path(), r#"["it's", 'say "hi"', 'caf\xe9']"#).unwrap();
        assert_eq!(
            store.load().unwrap(),
            names(&["it's", "say \"hi\"", "café"])
        );

        std::fs::write(store.path(), "[]").unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn legacy_names_with_backslashes_still_load() {
        let dir = tempdir().unwrap();
        let store = ListStore::new(dir.path());

        std::fs::write(store.path(), r#"['back\\slash', 'alpha']"#).unwrap();
        assert_eq!(store.load().unwrap(), names(&["back\\slash", "alpha"]));

        store.save(&store.load().unwrap()).unwrap();
        assert_eq!(store.load().unwrap(), names(&["back\\slash", "alpha"]));
    }

    #[test]
    fn malformed_content_is_reported_not_discarded() {
        let dir = tempdir().unwrap();
        let store = ListStore::new(dir.path());

        for content in [
            "['alpha'",
            "['alpha' 'beta']",
            "alpha\nbeta",
            "['alpha'] extra",
            "[1, 2]",
            "['unterminated]",
            "{'alpha': 1}",
        ] {
            std::fs::write(store.path(), content).unwrap();
            let err = store.load().unwrap_err();
            assert_eq!(err.kind(), "corrupt_list", "{content:?} should be corrupt");
            assert_eq!(std::fs::read_to_string(store.path()).unwrap(), content);
        }
    }

    #[test]
    fn duplicates_and_invalid_entries_are_corrupt() {
        let dir = tempdir().unwrap();
        let store = ListStore::new(dir.path());

        std::fs::write(store.path(), r#"["alpha","alpha"]"#).unwrap();
        assert!(matches!(store.load(), Err(Error::CorruptList { .. })));

        std::fs::write(store.path(), r#"["../escape"]"#).unwrap();
        assert!(matches!(store.load(), Err(Error::CorruptList { .. })));
    }
}
