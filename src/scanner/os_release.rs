//! Base OS identification from `os-release`.

use crate::error::Result;
use crate::image::ImageFs;
use std::collections::BTreeMap;

/// Candidate locations, in lookup order (see os-release(5)).
pub const OS_RELEASE_PATHS: [&str; 2] = ["/etc/os-release", "/usr/lib/os-release"];

const UNKNOWN: &str = "unknown";

/// The base record used when the image has no usable os-release file.
pub fn unknown_base() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("name".to_string(), UNKNOWN.to_string()),
        ("version_id".to_string(), UNKNOWN.to_string()),
    ])
}

/// Reads the image's os-release file into a map with lowercase keys.
///
/// A missing or malformed file yields [`unknown_base`].
pub fn identify_base(fs: &dyn ImageFs) -> Result<BTreeMap<String, String>> {
    for path in OS_RELEASE_PATHS {
        let content = match fs.read_file(path) {
            Ok(content) => content,
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e),
        };

        return Ok(match parse_os_release(&content) {
            Some(base) => {
                tracing::info!(
                    path,
                    name = base.get("name").map(String::as_str).unwrap_or(UNKNOWN),
                    version = base.get("version_id").map(String::as_str).unwrap_or(UNKNOWN),
                    "Identified base OS"
                );
                base
            }
            None => {
                tracing::warn!(path, "Malformed os-release file, using unknown base");
                unknown_base()
            }
        });
    }

    tracing::info!("No os-release file found, using unknown base");
    Ok(unknown_base())
}

/// Parses `KEY=value` lines, unquoting values and lowercasing keys.
///
/// Returns `None` when a non-comment line is not an assignment or when no
/// assignments are present.
///
/// ```
/// use imagemeta::scanner::parse_os_release;
///
/// let base = parse_os_release("NAME=\"Ubuntu\"\nVERSION_ID=\"18.04\"\n").unwrap();
/// assert_eq!(base["name"], "Ubuntu");
/// assert_eq!(base["version_id"], "18.04");
/// ```
pub fn parse_os_release(content: &str) -> Option<BTreeMap<String, String>> {
    let mut fields = BTreeMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once('=')?;
        let key = key.trim();
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return None;
        }

        fields.insert(key.to_ascii_lowercase(), unquote(value.trim()));
    }

    if fields.is_empty() {
        None
    } else {
        Some(fields)
    }
}

fn unquote(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 && bytes[0] == bytes[bytes.len() - 1] {
        let inner = &value[1..value.len() - 1];
        match bytes[0] {
            b'"' => return unescape(inner),
            b'\'' => return inner.to_string(),
            _ => {}
        }
    }
    value.to_string()
}

/// Handles the shell escapes os-release allows inside double quotes.
fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next @ ('"' | '\\' | '$' | '`')) => out.push(next),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}
