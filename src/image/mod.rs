//! Image handles and the materialized root filesystem.
//!
//! An [`ImageSource`] is an opaque, read-only handle to an OCI image that can
//! list its layer blobs bottom to top. [`RootFs::extract`] flattens those
//! layers into a private scratch directory, and every extractor reads the
//! result through the [`ImageFs`] capability interface.
//!
//! # Example
//!
//! ```no_run
//! use imagemeta::image::{ExtractOptions, ImageFs, OciImage, RootFs};
//!
//! let image = OciImage::open("/path/to/oci-layout")?;
//! let mut rootfs = RootFs::extract(&image, &ExtractOptions::default())?;
//! let os_release = rootfs.read_file("/etc/os-release")?;
//! println!("{}", os_release);
//! rootfs.release()?;
//! # Ok::<(), imagemeta::Error>(())
//! ```

mod layers;
mod memory;
mod oci;
mod rootfs;

pub use layers::{apply_layer, Compression, LayerBlob};
pub use memory::MemoryFs;
pub use oci::OciImage;
pub use rootfs::{ExtractOptions, RootFs};

use crate::error::Result;
use std::path::Path;

/// A read-only handle to a container image.
///
/// Implementors never mutate the underlying image; they only describe where
/// its layers and configuration live.
pub trait ImageSource {
    /// Human-readable reference used in error messages and logs.
    fn reference(&self) -> String;

    /// Layer blobs in application order (base layer first).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Flatten`](crate::Error::Flatten) when a layer is
    /// missing or uses an unsupported compression.
    fn layers(&self) -> Result<Vec<LayerBlob>>;

    /// Returns the value of an image config label.
    fn label(&self, key: &str) -> Option<String>;
}

/// Read access to a materialized image filesystem.
///
/// Paths are interpreted relative to the image root; a leading `/` is
/// optional. Both [`RootFs`] and the in-memory [`MemoryFs`] implement this.
pub trait ImageFs {
    /// Reads one file's full content.
    ///
    /// A missing file yields [`Error::NotFound`](crate::Error::NotFound).
    fn read_file(&self, path: &str) -> Result<String>;

    /// Returns the content of every regular file directly inside `path`,
    /// ordered by file name. A missing or empty directory yields an empty list.
    fn read_dir(&self, path: &str) -> Result<Vec<String>>;

    /// Returns true when `path` exists in the image.
    fn exists(&self, path: &str) -> Result<bool>;

    /// The host directory backing the image root, for external tools.
    fn root_dir(&self) -> Result<&Path>;

    /// Releases backing storage. Safe to call repeatedly; every later read fails.
    fn release(&mut self) -> Result<()>;
}
