use super::collate;
use super::Extractor;
use crate::error::{Error, Result};
use crate::image::ImageFs;
use crate::model::{DependencyKind, DependencyRecord, RpmPackage, RpmPackageList};
use std::process::Command;

/// Known RPM database locations as `(dbpath, marker file)`, checked in order.
const RPM_DATABASES: &[(&str, &str)] = &[
    ("/var/lib/rpm", "Packages"),
    ("/var/lib/rpm", "Packages.db"),
    ("/var/lib/rpm", "rpmdb.sqlite"),
    ("/usr/lib/sysimage/rpm", "rpmdb.sqlite"),
];

/// One column of the rpm query output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpmField {
    Name,
    Version,
    Architecture,
    License,
}

/// Query columns in output order. This list defines both the `--queryformat`
/// string and how each output line is split back into an [`RpmPackage`].
pub const RPM_QUERY_FIELDS: [RpmField; 4] = [
    RpmField::Name,
    RpmField::Version,
    RpmField::Architecture,
    RpmField::License,
];

impl RpmField {
    pub fn query_tag(self) -> &'static str {
        match self {
            RpmField::Name => "NAME",
            RpmField::Version => "VERSION",
            RpmField::Architecture => "ARCH",
            RpmField::License => "LICENSE",
        }
    }

    fn assign(self, package: &mut RpmPackage, value: &str) {
        let slot = match self {
            RpmField::Name => &mut package.name,
            RpmField::Version => &mut package.version,
            RpmField::Architecture => &mut package.architecture,
            RpmField::License => &mut package.license,
        };
        *slot = value.to_string();
    }
}

/// The `--queryformat` argument: tab-separated tags, one package per line.
///
/// ```
/// use imagemeta::scanner::query_format;
///
/// assert_eq!(query_format(), "%{NAME}\t%{VERSION}\t%{ARCH}\t%{LICENSE}\n");
/// ```
pub fn query_format() -> String {
    let tags: Vec<String> = RPM_QUERY_FIELDS
        .iter()
        .map(|field| format!("%{{{}}}", field.query_tag()))
        .collect();
    format!("{}\n", tags.join("\t"))
}

/// Parses rpm query output, dropping lines with the wrong column count.
pub fn parse_query_output(output: &str) -> Vec<RpmPackage> {
    let mut packages = Vec::new();

    for (number, line) in output.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let columns: Vec<&str> = line.split('\t').collect();
        if columns.len() != RPM_QUERY_FIELDS.len() {
            tracing::warn!(
                line = number + 1,
                columns = columns.len(),
                expected = RPM_QUERY_FIELDS.len(),
                "Skipping malformed rpm query line"
            );
            continue;
        }

        let mut package = RpmPackage::default();
        for (field, value) in RPM_QUERY_FIELDS.iter().zip(columns) {
            field.assign(&mut package, value);
        }
        packages.push(package);
    }

    packages
}

/// Lists installed RPM packages by running the rpm query tool against the
/// image's database.
pub struct RpmExtractor {
    command: String,
}

impl RpmExtractor {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    fn find_database(&self, fs: &dyn ImageFs) -> Result<Option<(&'static str, String)>> {
        for &(dir, marker) in RPM_DATABASES {
            let path = format!("{}/{}", dir, marker);
            if fs.exists(&path)? {
                return Ok(Some((dir, path)));
            }
        }
        Ok(None)
    }
}

impl Default for RpmExtractor {
    fn default() -> Self {
        Self::new("rpm")
    }
}

impl Extractor for RpmExtractor {
    fn name(&self) -> &'static str {
        "RPM Packages"
    }

    fn kind(&self) -> DependencyKind {
        DependencyKind::RpmPackages
    }

    fn extract(&self, fs: &dyn ImageFs) -> Result<Option<DependencyRecord>> {
        let Some((db_dir, db_path)) = self.find_database(fs)? else {
            tracing::debug!("No RPM database found");
            return Ok(None);
        };

        let dbpath = fs.root_dir()?.join(db_dir.trim_start_matches('/'));
        tracing::debug!(command = %self.command, dbpath = %dbpath.display(), "Querying RPM database");

        let format = query_format();
        let output = Command::new(&self.command)
            .arg("--dbpath")
            .arg(&dbpath)
            .args(["-qa", "--queryformat", format.as_str()])
            .output()
            .map_err(|source| Error::RpmToolMissing {
                db_path: db_path.clone(),
                command: self.command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(Error::CommandFailed {
                command: format!("{} --dbpath {} -qa", self.command, dbpath.display()),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut packages = parse_query_output(&stdout);
        if packages.is_empty() {
            tracing::debug!(db = %db_path, "RPM database lists no packages");
            return Ok(None);
        }

        packages.sort_by(|a, b| {
            collate::compare(&a.name, &b.name)
                .then_with(|| a.version.cmp(&b.version))
                .then_with(|| a.architecture.cmp(&b.architecture))
        });
        tracing::info!(packages = packages.len(), "Extracted RPM packages");

        let payload = RpmPackageList { packages };
        DependencyRecord::from_payload(DependencyKind::RpmPackages, "rpm", &payload).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::MemoryFs;

    #[test]
    fn test_query_format_follows_field_list() {
        assert_eq!(query_format(), "%{NAME}\t%{VERSION}\t%{ARCH}\t%{LICENSE}\n");
    }

    #[test]
    fn test_parse_query_output() {
        let output = "bash\t5.1.8\tx86_64\tGPLv3+\nzlib\t1.2.11\tx86_64\tzlib and Boost\n";
        let packages = parse_query_output(output);
        assert_eq!(packages.len(), 2);
        assert_eq!(
            packages[0],
            RpmPackage {
                name: "bash".to_string(),
                version: "5.1.8".to_string(),
                architecture: "x86_64".to_string(),
                license: "GPLv3+".to_string(),
            }
        );
        assert_eq!(packages[1].license, "zlib and Boost");
    }

    #[test]
    fn test_parse_query_output_skips_malformed_lines() {
        let output = "bash\t5.1.8\tx86_64\tGPLv3+\ntruncated\t1.0\nextra\t1\tnoarch\tMIT\tjunk\n\ncurl\t7.76.1\tx86_64\tMIT\n";
        let names: Vec<String> = parse_query_output(output).into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["bash", "curl"]);
    }

    #[test]
    fn test_no_database_is_not_an_error() {
        let fs = MemoryFs::new();
        let extractor = RpmExtractor::new("imagemeta-test-no-such-rpm");
        assert!(extractor.extract(&fs).unwrap().is_none());
    }

    #[test]
    fn test_database_without_tool_is_fatal() {
        let fs = MemoryFs::new()
            .with_file("/var/lib/rpm/rpmdb.sqlite", "")
            .with_root_dir("/nonexistent-root");
        let extractor = RpmExtractor::new("imagemeta-test-no-such-rpm");

        let err = extractor.extract(&fs).unwrap_err();
        match err {
            Error::RpmToolMissing { db_path, command, .. } => {
                assert_eq!(db_path, "/var/lib/rpm/rpmdb.sqlite");
                assert_eq!(command, "imagemeta-test-no-such-rpm");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    fn fake_rpm(dir: &std::path::Path, script: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-rpm");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_with_query_tool() {
        let tmp = tempfile::TempDir::new().unwrap();
        let command = fake_rpm(
            tmp.path(),
            r"printf 'zlib\t1.2.11\tx86_64\tzlib\nbash\t5.1.8\tx86_64\tGPLv3+\nbroken line\n'",
        );
        let fs = MemoryFs::new()
            .with_file("/var/lib/rpm/Packages", "")
            .with_root_dir(tmp.path());

        let record = RpmExtractor::new(command).extract(&fs).unwrap().unwrap();
        assert_eq!(record.kind, DependencyKind::RpmPackages);
        assert_eq!(record.source.kind, "rpm");
        assert_eq!(record.source.metadata["packages"][0]["name"], "bash");
        assert_eq!(record.source.metadata["packages"][1]["name"], "zlib");
        assert_eq!(record.source.metadata["packages"].as_array().unwrap().len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_query_tool_failure() {
        let tmp = tempfile::TempDir::new().unwrap();
        let command = fake_rpm(tmp.path(), "echo 'error: cannot open Packages database' >&2; exit 1");
        let fs = MemoryFs::new()
            .with_file("/var/lib/rpm/Packages", "")
            .with_root_dir(tmp.path());

        let err = RpmExtractor::new(command).extract(&fs).unwrap_err();
        assert!(matches!(err, Error::CommandFailed { .. }));
        assert!(err.to_string().contains("cannot open Packages database"));
    }
}
