use serde::{Deserialize, Serialize};

/// An installed Debian package as recorded in the dpkg database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    pub architecture: String,
    pub source_package: String,
    pub source_version: String,
    pub source_upstream_version: String,
}

impl PackageRecord {
    /// Creates a record whose source package is the package itself.
    pub fn new(name: impl Into<String>, version: impl Into<String>, architecture: impl Into<String>) -> Self {
        let name = name.into();
        let version = version.into();
        Self {
            source_package: name.clone(),
            source_version: version.clone(),
            source_upstream_version: upstream_version(&version).to_string(),
            name,
            version,
            architecture: architecture.into(),
        }
    }

    /// Overrides the source package, recomputing the upstream version.
    pub fn with_source(mut self, package: impl Into<String>, version: impl Into<String>) -> Self {
        self.source_package = package.into();
        self.source_version = version.into();
        self.source_upstream_version = upstream_version(&self.source_version).to_string();
        self
    }
}

/// Strips a Debian epoch (`N:`) and revision (`-R`) from a version string.
///
/// ```
/// use imagemeta::upstream_version;
///
/// assert_eq!(upstream_version("1:2.30-4ubuntu1"), "2.30");
/// assert_eq!(upstream_version("1.0"), "1.0");
/// ```
pub fn upstream_version(version: &str) -> &str {
    let without_epoch = match version.split_once(':') {
        Some((epoch, rest)) if !epoch.is_empty() && epoch.chars().all(|c| c.is_ascii_digit()) => rest,
        _ => version,
    };
    match without_epoch.rsplit_once('-') {
        Some((upstream, _)) => upstream,
        None => without_epoch,
    }
}

/// An installed RPM package as reported by the rpm query tool.
///
/// Field order matches [`RPM_QUERY_FIELDS`](crate::scanner::RPM_QUERY_FIELDS).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpmPackage {
    pub name: String,
    pub version: String,
    pub architecture: String,
    pub license: String,
}

/// Payload of the Debian package-list dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebianPackageList {
    pub packages: Vec<PackageRecord>,
    pub sources: Vec<String>,
}

/// Payload of the RPM package-list dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpmPackageList {
    pub packages: Vec<RpmPackage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_version_strips_epoch_and_revision() {
        assert_eq!(upstream_version("1:2.30-4ubuntu1"), "2.30");
        assert_eq!(upstream_version("2:8.1.2269-1ubuntu5"), "8.1.2269");
        assert_eq!(upstream_version("3.0.2-0ubuntu1.10"), "3.0.2");
    }

    #[test]
    fn test_upstream_version_keeps_inner_hyphens() {
        assert_eq!(upstream_version("1.2-beta-3"), "1.2-beta");
    }

    #[test]
    fn test_upstream_version_plain() {
        assert_eq!(upstream_version("20210110"), "20210110");
        assert_eq!(upstream_version(""), "");
    }

    #[test]
    fn test_upstream_version_non_numeric_prefix_is_not_epoch() {
        assert_eq!(upstream_version("abc:1.0"), "abc:1.0");
    }

    #[test]
    fn test_new_defaults_source_to_self() {
        let pkg = PackageRecord::new("bash", "5.1-2+deb11u1", "amd64");
        assert_eq!(pkg.source_package, "bash");
        assert_eq!(pkg.source_version, "5.1-2+deb11u1");
        assert_eq!(pkg.source_upstream_version, "5.1");
    }

    #[test]
    fn test_with_source() {
        let pkg = PackageRecord::new("libc6", "2.31-13", "amd64").with_source("glibc", "1:2.31-13");
        assert_eq!(pkg.source_package, "glibc");
        assert_eq!(pkg.source_version, "1:2.31-13");
        assert_eq!(pkg.source_upstream_version, "2.31");
    }
}
