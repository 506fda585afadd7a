//! Core data types for extracted packages and image metadata.
//!
//! This module contains the value types exchanged between extraction and
//! reconciliation:
//!
//! - [`PackageRecord`] - One installed Debian package
//! - [`RpmPackage`] - One installed RPM package
//! - [`DependencyRecord`] - One kind of evidence about what the image contains
//! - [`MetadataSnapshot`] - The full record embedded in an image label
//! - [`Warning`] - A field where an embedded record and a fresh scan disagree
//!
//! # Example
//!
//! ```
//! use imagemeta::{MetadataSnapshot, PackageRecord};
//!
//! let package = PackageRecord::new("libc6", "2.31-13", "amd64");
//! assert_eq!(package.source_upstream_version, "2.31");
//!
//! let snapshot = MetadataSnapshot::default();
//! assert!(snapshot.dependencies.is_empty());
//! ```

mod metadata;
mod package;

pub use metadata::*;
pub use package::*;
