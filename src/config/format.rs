//! On-disk settings formats.
//!
//! Settings files are line-oriented `key=value` properties files. A file
//! whose name ends in `.toml` is read as TOML instead, with nested tables
//! flattened to dotted keys.

use std::path::Path;
use std::str::Chars;

use crate::config::loader::ConfigError;
use crate::config::properties::RawProperties;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsFormat {
    Properties,
    Toml,
}

impl SettingsFormat {
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => SettingsFormat::Toml,
            _ => SettingsFormat::Properties,
        }
    }
}

/// Parse settings text into flat dotted keys, picking the format from `path`.
pub fn parse_settings(path: &Path, text: &str) -> Result<RawProperties, ConfigError> {
    match SettingsFormat::for_path(path) {
        SettingsFormat::Properties => parse_properties(path, text),
        SettingsFormat::Toml => parse_toml(path, text),
    }
}

/// Parse a properties file.
///
/// - `#` and `!` start a comment line
/// - the key ends at the first unescaped `=`, `:` or blank
/// - a line ending in an odd number of `\` continues on the next one
/// - `\t`, `\n`, `\r`, `\f` and `\uXXXX` escapes are decoded
pub fn parse_properties(path: &Path, text: &str) -> Result<RawProperties, ConfigError> {
    let mut out = RawProperties::new();
    let mut lines = text.lines().enumerate();

    while let Some((index, line)) = lines.next() {
        let line = line.trim_start_matches(is_blank);
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }

        let mut logical = line.to_string();
        while continues(&logical) {
            logical.pop();
            match lines.next() {
                Some((_, next)) => logical.push_str(next.trim_start_matches(is_blank)),
                None => break,
            }
        }

        let (key, value) = split_entry(&logical);
        let syntax = |reason: &'static str| ConfigError::Syntax {
            path: path.to_path_buf(),
            line: index + 1,
            reason,
        };
        out.insert(unescape(key).map_err(syntax)?, unescape(value).map_err(syntax)?);
    }
    Ok(out)
}

fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\x0c')
}

fn continues(line: &str) -> bool {
    line.chars().rev().take_while(|&c| c == '\\').count() % 2 == 1
}

fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    let mut key_end = line.len();
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => {
                key_end = i;
                break;
            }
            c if is_blank(c) => {
                key_end = i;
                break;
            }
            _ => {}
        }
    }

    let rest = line[key_end..].trim_start_matches(is_blank);
    let rest = rest
        .strip_prefix(|c: char| c == '=' || c == ':')
        .unwrap_or(rest)
        .trim_start_matches(is_blank);
    (&line[..key_end], rest)
}

fn unescape(raw: &str) -> Result<String, &'static str> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\x0c'),
            Some('u') => out.push(unicode_escape(&mut chars)?),
            Some(other) => out.push(other),
            None => {}
        }
    }
    Ok(out)
}

const MALFORMED_UNICODE: &str = "malformed \\uXXXX escape";

/// Decode the digits after `\u`, joining a surrogate pair when one follows.
fn unicode_escape(chars: &mut Chars<'_>) -> Result<char, &'static str> {
    let high = hex4(chars).ok_or(MALFORMED_UNICODE)?;
    if !(0xD800..0xDC00).contains(&high) {
        return char::from_u32(high).ok_or(MALFORMED_UNICODE);
    }
    if chars.next() != Some('\\') || chars.next() != Some('u') {
        return Err(MALFORMED_UNICODE);
    }
    let low = hex4(chars).ok_or(MALFORMED_UNICODE)?;
    if !(0xDC00..0xE000).contains(&low) {
        return Err(MALFORMED_UNICODE);
    }
    char::from_u32(0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00)).ok_or(MALFORMED_UNICODE)
}

fn hex4(chars: &mut Chars<'_>) -> Option<u32> {
    let mut value = 0;
    for _ in 0..4 {
        value = value * 16 + chars.next()?.to_digit(16)?;
    }
    Some(value)
}

/// Parse TOML text. Scalars are stringified and arrays of scalars are joined
/// with `,`.
pub fn parse_toml(path: &Path, text: &str) -> Result<RawProperties, ConfigError> {
    let table: toml::Table = text.parse().map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: Box::new(e),
    })?;
    let mut out = RawProperties::new();
    flatten(path, "", &table, &mut out)?;
    Ok(out)
}

fn flatten(path: &Path, prefix: &str, table: &toml::Table, out: &mut RawProperties) -> Result<(), ConfigError> {
    for (key, value) in table {
        let full = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::Table(inner) => flatten(path, &full, inner, out)?,
            toml::Value::Array(items) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    match scalar(item) {
                        Some(s) => parts.push(s),
                        None => {
                            return Err(ConfigError::Unsupported {
                                path: path.to_path_buf(),
                                key: full,
                                reason: "arrays may only hold scalar values",
                            })
                        }
                    }
                }
                out.insert(full, parts.join(","));
            }
            other => {
                if let Some(s) = scalar(other) {
                    out.insert(full, s);
                }
            }
        }
    }
    Ok(())
}

fn scalar(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Datetime(d) => Some(d.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => None,
    }
}
