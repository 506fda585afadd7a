//! Error types for image inspection and metadata reconciliation.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while materializing an image or extracting metadata from it.
///
/// Absence of evidence (no package database, no OS-release file, no prior
/// label) is never reported through this type; extractors return empty
/// results for those cases instead.
#[derive(Error, Debug)]
pub enum Error {
    /// The image layers could not be resolved into an ordered stack.
    #[error("failed to flatten layers of image {image}: {reason}")]
    Flatten { image: String, reason: String },

    /// A layer could not be written to the extraction directory.
    #[error("failed to extract image {image} into {}: {source}", dir.display())]
    Unpack {
        image: String,
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The requested path does not exist inside the image filesystem.
    #[error("not found in image filesystem: {0}")]
    NotFound(String),

    /// The image filesystem was released and can no longer be read.
    #[error("image filesystem has been released")]
    Released,

    /// Reading from the image filesystem failed for a reason other than absence.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// An RPM database is present but the query tool cannot be executed.
    #[error(
        "RPM database found at {db_path} but `{command}` could not be executed ({source}); \
         install rpm on the host or point `rpm_command` at a working binary"
    )]
    RpmToolMissing {
        db_path: String,
        command: String,
        #[source]
        source: io::Error,
    },

    /// An external query command ran but reported failure.
    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// A metadata value could not be serialized for hashing.
    #[error("failed to serialize metadata for digest: {0}")]
    Digest(#[source] serde_json::Error),

    /// A previously embedded metadata label is not valid JSON for the label schema.
    #[error("invalid metadata label {key}: {source}")]
    Label {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file problem.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns true when the error only signals that a path is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_distinct() {
        assert!(Error::NotFound("/etc/os-release".to_string()).is_not_found());
        assert!(!Error::Released.is_not_found());
        let io = Error::Io {
            path: "/etc/passwd".to_string(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(!io.is_not_found());
    }

    #[test]
    fn test_stage_named_in_message() {
        let flatten = Error::Flatten {
            image: "/images/app".to_string(),
            reason: "no manifests".to_string(),
        };
        assert!(flatten.to_string().contains("flatten"));
        assert!(flatten.to_string().contains("/images/app"));

        let unpack = Error::Unpack {
            image: "/images/app".to_string(),
            dir: PathBuf::from("/tmp/rootfs"),
            source: io::Error::new(io::ErrorKind::Other, "disk full"),
        };
        assert!(unpack.to_string().contains("extract"));
        assert!(unpack.to_string().contains("/tmp/rootfs"));
    }

    #[test]
    fn test_rpm_tool_missing_explains_remediation() {
        let err = Error::RpmToolMissing {
            db_path: "/var/lib/rpm/Packages".to_string(),
            command: "rpm".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "No such file"),
        };
        let msg = err.to_string();
        assert!(msg.contains("install rpm"));
        assert!(msg.contains("/var/lib/rpm/Packages"));
    }
}
