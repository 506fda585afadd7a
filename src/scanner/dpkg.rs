use super::collate;
use super::Extractor;
use crate::error::Result;
use crate::image::ImageFs;
use crate::model::{DebianPackageList, DependencyKind, DependencyRecord, PackageRecord};
use std::collections::HashMap;

/// The dpkg database of installed packages.
pub const STATUS_FILE: &str = "/var/lib/dpkg/status";
/// One-package-per-file status fragments, as written by distroless images.
pub const STATUS_DIR: &str = "/var/lib/dpkg/status.d";
pub const SOURCES_FILE: &str = "/etc/apt/sources.list";
pub const SOURCES_DIR: &str = "/etc/apt/sources.list.d";

/// Extracts installed Debian packages and configured apt sources.
pub struct DpkgExtractor;

impl Extractor for DpkgExtractor {
    fn name(&self) -> &'static str {
        "Debian Packages"
    }

    fn kind(&self) -> DependencyKind {
        DependencyKind::DebianPackages
    }

    fn extract(&self, fs: &dyn ImageFs) -> Result<Option<DependencyRecord>> {
        let packages = read_packages(fs)?;
        if packages.is_empty() {
            tracing::debug!("No dpkg packages found");
            return Ok(None);
        }

        let sources = read_sources(fs)?;
        tracing::info!(
            packages = packages.len(),
            sources = sources.len(),
            "Extracted Debian packages"
        );

        let payload = DebianPackageList { packages, sources };
        DependencyRecord::from_payload(DependencyKind::DebianPackages, "dpkg", &payload).map(Some)
    }
}

/// Reads the status file and every status fragment, sorted by package name.
pub fn read_packages(fs: &dyn ImageFs) -> Result<Vec<PackageRecord>> {
    let mut packages = Vec::new();

    match fs.read_file(STATUS_FILE) {
        Ok(content) => packages.extend(parse_status(&content)),
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e),
    }

    for content in fs.read_dir(STATUS_DIR)? {
        packages.extend(parse_status(&content));
    }

    packages.sort_by(|a, b| {
        collate::compare(&a.name, &b.name)
            .then_with(|| a.architecture.cmp(&b.architecture))
            .then_with(|| a.version.cmp(&b.version))
    });
    Ok(packages)
}

/// Reads apt source lines, skipping blanks and comments.
pub fn read_sources(fs: &dyn ImageFs) -> Result<Vec<String>> {
    let mut contents = Vec::new();

    match fs.read_file(SOURCES_FILE) {
        Ok(content) => contents.push(content),
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e),
    }
    contents.extend(fs.read_dir(SOURCES_DIR)?);

    let mut lines: Vec<String> = contents
        .iter()
        .flat_map(|content| content.lines())
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .map(str::to_string)
        .collect();

    collate::sort(&mut lines);
    Ok(lines)
}

/// Parses a dpkg status document into package records.
///
/// Stanzas without a `Package` field, and stanzas whose `Status` is not
/// `installed`, are skipped.
pub fn parse_status(content: &str) -> Vec<PackageRecord> {
    split_stanzas(content)
        .into_iter()
        .filter_map(|stanza| parse_stanza(&stanza))
        .collect()
}

fn split_stanzas(content: &str) -> Vec<Vec<&str>> {
    let mut stanzas = Vec::new();
    let mut current = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                stanzas.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        stanzas.push(current);
    }

    stanzas
}

fn parse_stanza(lines: &[&str]) -> Option<PackageRecord> {
    let mut fields: HashMap<String, &str> = HashMap::new();
    for line in lines {
        // Continuation of a multi-line field such as Description
        if line.starts_with(' ') || line.starts_with('\t') {
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            fields
                .entry(key.trim().to_ascii_lowercase())
                .or_insert_with(|| value.trim());
        }
    }

    let name = match fields.get("package") {
        Some(name) if !name.is_empty() => *name,
        _ => {
            tracing::debug!(first_line = lines.first().copied().unwrap_or(""), "Skipping stanza without Package");
            return None;
        }
    };

    if let Some(status) = fields.get("status") {
        if status.split_whitespace().last() != Some("installed") {
            tracing::debug!(package = name, status = *status, "Skipping package that is not installed");
            return None;
        }
    }

    let version = fields.get("version").copied().unwrap_or_default();
    let architecture = fields.get("architecture").copied().unwrap_or_default();
    let record = PackageRecord::new(name, version, architecture);

    match fields.get("source").map(|s| parse_source_field(s)) {
        Some((source, source_version)) if !source.is_empty() => {
            let source_version = source_version.unwrap_or(version).to_string();
            Some(record.with_source(source, source_version))
        }
        _ => Some(record),
    }
}

/// Splits a `Source:` value of the form `name` or `name (version)`.
///
/// ```
/// use imagemeta::scanner::parse_source_field;
///
/// assert_eq!(parse_source_field("glibc (2.31-13)"), ("glibc", Some("2.31-13")));
/// assert_eq!(parse_source_field("gcc-10"), ("gcc-10", None));
/// ```
pub fn parse_source_field(value: &str) -> (&str, Option<&str>) {
    match value.split_once('(') {
        Some((name, rest)) => {
            let version = rest.split(')').next().unwrap_or(rest).trim();
            (name.trim(), Some(version).filter(|v| !v.is_empty()))
        }
        None => (value.trim(), None),
    }
}
