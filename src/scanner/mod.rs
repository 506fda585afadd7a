//! Package extractors and base OS identification.
//!
//! This module provides the [`Extractor`] trait and implementations that read
//! package-manager state from a materialized image filesystem.
//!
//! # Available Extractors
//!
//! | Extractor | Dependency type | Evidence |
//! |-----------|-----------------|----------|
//! | [`DpkgExtractor`] | `debian_package_list` | `/var/lib/dpkg/status`, `/var/lib/dpkg/status.d/*`, apt sources |
//! | [`RpmExtractor`] | `rpm_package_list` | RPM database, queried with `rpm` |
//!
//! # Example
//!
//! ```
//! use imagemeta::image::MemoryFs;
//! use imagemeta::scanner::{DpkgExtractor, Extractor};
//!
//! let fs = MemoryFs::new().with_file(
//!     "/var/lib/dpkg/status",
//!     "Package: bash\nVersion: 5.1-2\nArchitecture: amd64\n",
//! );
//! let record = DpkgExtractor.extract(&fs)?.expect("bash is installed");
//! assert_eq!(record.source.metadata["packages"][0]["name"], "bash");
//! # Ok::<(), imagemeta::Error>(())
//! ```

pub mod collate;
mod dpkg;
mod os_release;
mod rpm;

pub use dpkg::{
    parse_source_field, parse_status, read_packages, read_sources, DpkgExtractor, SOURCES_DIR, SOURCES_FILE,
    STATUS_DIR, STATUS_FILE,
};
pub use os_release::{identify_base, parse_os_release, unknown_base, OS_RELEASE_PATHS};
pub use rpm::{parse_query_output, query_format, RpmExtractor, RpmField, RPM_QUERY_FIELDS};

use crate::error::Result;
use crate::image::ImageFs;
use crate::model::{DependencyKind, DependencyRecord};

/// Trait for extracting one kind of dependency evidence from an image filesystem.
pub trait Extractor {
    /// Returns the human-readable name of this extractor.
    fn name(&self) -> &'static str;

    /// Returns the dependency kind this extractor produces.
    fn kind(&self) -> DependencyKind;

    /// Extracts the dependency record, or `None` when the image carries no
    /// evidence of this kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the filesystem cannot be read or a required
    /// external tool is unavailable.
    fn extract(&self, fs: &dyn ImageFs) -> Result<Option<DependencyRecord>>;
}

/// Returns every package extractor, using `rpm_command` for RPM queries.
pub fn all_extractors(rpm_command: &str) -> Vec<Box<dyn Extractor>> {
    vec![Box::new(DpkgExtractor), Box::new(RpmExtractor::new(rpm_command))]
}
