//! Inspect container image filesystems and reconcile embedded metadata labels.
//!
//! The pipeline flattens an image's layers into a scratch directory
//! ([`image::RootFs`]), reads OS identity and package databases from it
//! ([`scanner`]), stamps each dependency with a canonical SHA-256
//! ([`digest`]), and reconciles the result with any record already embedded
//! in the image ([`merge`]). [`Labeler`] ties these stages together.

pub mod config;
pub mod digest;
pub mod error;
pub mod image;
pub mod labeler;
pub mod merge;
pub mod model;
pub mod output;
pub mod scanner;

pub use config::Config;
pub use digest::digest;
pub use error::{Error, Result};
pub use labeler::{LabelOutcome, Labeler};
pub use merge::merge;
pub use model::{
    upstream_version, DependencyKind, DependencyRecord, DependencySource, MetadataSnapshot, PackageRecord,
    Provenance, RpmPackage, Warning,
};
