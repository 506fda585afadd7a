//! Materialized image root filesystem.

use super::layers::apply_layer;
use super::{ImageFs, ImageSource};
use crate::error::{Error, Result};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

/// Symlink hops allowed while resolving one path, as in Linux `MAXSYMLINKS`.
const MAX_SYMLINK_HOPS: usize = 40;

/// Options controlling image extraction.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    exclude: Vec<PathBuf>,
}

impl ExtractOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skips every layer entry under `prefix` (relative to the image root).
    pub fn exclude(mut self, prefix: impl AsRef<Path>) -> Self {
        let relative: PathBuf = prefix
            .as_ref()
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect();
        if !relative.as_os_str().is_empty() {
            self.exclude.push(relative);
        }
        self
    }

    pub fn excluded(&self) -> &[PathBuf] {
        &self.exclude
    }
}

/// The flattened filesystem of one image in a private scratch directory.
///
/// The directory is removed by [`ImageFs::release`] or, failing that, when the
/// value is dropped.
#[derive(Debug)]
pub struct RootFs {
    image: String,
    dir: Option<TempDir>,
}

impl RootFs {
    /// Extracts every layer of `image` into a new scratch directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Flatten`] when the layer stack cannot be resolved and
    /// [`Error::Unpack`] when writing to disk fails. The scratch directory is
    /// removed before either error is returned.
    pub fn extract(image: &dyn ImageSource, options: &ExtractOptions) -> Result<Self> {
        let reference = image.reference();
        let layers = image.layers()?;

        let dir = tempfile::Builder::new()
            .prefix("imagemeta-rootfs-")
            .tempdir()
            .map_err(|source| Error::Unpack {
                image: reference.clone(),
                dir: std::env::temp_dir(),
                source,
            })?;

        tracing::info!(
            image = %reference,
            layers = layers.len(),
            target = %dir.path().display(),
            "Extracting image filesystem"
        );

        let unpack_err = |source: io::Error| Error::Unpack {
            image: reference.clone(),
            dir: dir.path().to_path_buf(),
            source,
        };

        for layer in &layers {
            apply_layer(layer, dir.path(), options.excluded()).map_err(unpack_err)?;
        }
        normalize_permissions(dir.path()).map_err(unpack_err)?;

        Ok(Self {
            image: reference,
            dir: Some(dir),
        })
    }

    /// Reference of the image this filesystem was extracted from.
    pub fn image(&self) -> &str {
        &self.image
    }

    fn root(&self) -> Result<&Path> {
        self.dir.as_ref().map(|d| d.path()).ok_or(Error::Released)
    }

    /// Resolves `path` to a host path, following symlinks without leaving the root.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        resolve_in_root(self.root()?, path)
    }
}

impl ImageFs for RootFs {
    fn read_file(&self, path: &str) -> Result<String> {
        let host = self.resolve(path)?;
        let bytes = fs::read(&host).map_err(|source| io_error(path, source))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn read_dir(&self, path: &str) -> Result<Vec<String>> {
        let host = match self.resolve(path) {
            Ok(host) => host,
            Err(Error::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        if !host.is_dir() {
            return Ok(Vec::new());
        }

        let mut entries: Vec<_> = fs::read_dir(&host)
            .map_err(|source| io_error(path, source))?
            .collect::<io::Result<_>>()
            .map_err(|source| io_error(path, source))?;
        entries.sort_by_key(|e| e.file_name());

        let mut contents = Vec::new();
        for entry in entries {
            let file_type = entry.file_type().map_err(|source| io_error(path, source))?;
            let file_path = if file_type.is_file() {
                entry.path()
            } else if file_type.is_symlink() {
                let rel = format!("{}/{}", path.trim_end_matches('/'), entry.file_name().to_string_lossy());
                match self.resolve(&rel) {
                    Ok(target) if target.is_file() => target,
                    _ => continue,
                }
            } else {
                continue;
            };
            let bytes = fs::read(&file_path).map_err(|source| io_error(path, source))?;
            contents.push(String::from_utf8_lossy(&bytes).into_owned());
        }

        Ok(contents)
    }

    fn exists(&self, path: &str) -> Result<bool> {
        match self.resolve(path) {
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn root_dir(&self) -> Result<&Path> {
        self.root()
    }

    fn release(&mut self) -> Result<()> {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().display().to_string();
            dir.close().map_err(|source| io_error(&path, source))?;
            tracing::debug!(image = %self.image, dir = %path, "Released image filesystem");
        }
        Ok(())
    }
}

fn io_error(path: &str, source: io::Error) -> Error {
    Error::Io {
        path: path.to_string(),
        source,
    }
}

/// Walks `path` component by component under `root`, re-rooting absolute
/// symlink targets at `root` and clamping `..` at the top.
pub(super) fn resolve_in_root(root: &Path, path: &str) -> Result<PathBuf> {
    let mut pending: Vec<OsString> = Vec::new();
    push_components(&mut pending, Path::new(path));

    let mut resolved = PathBuf::new();
    let mut hops = 0;

    while let Some(part) = pending.pop() {
        if part == ".." {
            resolved.pop();
            continue;
        }

        let candidate = resolved.join(&part);
        let host = root.join(&candidate);
        match fs::symlink_metadata(&host) {
            Ok(meta) if meta.file_type().is_symlink() => {
                hops += 1;
                if hops > MAX_SYMLINK_HOPS {
                    return Err(io_error(
                        path,
                        io::Error::new(io::ErrorKind::Other, "too many levels of symbolic links"),
                    ));
                }
                let target = fs::read_link(&host).map_err(|source| io_error(path, source))?;
                if target.has_root() {
                    resolved = PathBuf::new();
                }
                push_components(&mut pending, &target);
            }
            Ok(_) => resolved = candidate,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::NotFound(path.to_string()));
            }
            Err(e) if e.kind() == io::ErrorKind::NotADirectory => {
                return Err(Error::NotFound(path.to_string()));
            }
            Err(source) => return Err(io_error(path, source)),
        }
    }

    Ok(root.join(resolved))
}

/// Pushes the components of `path` so that the first component pops first.
fn push_components(stack: &mut Vec<OsString>, path: &Path) {
    let parts: Vec<OsString> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_os_string()),
            Component::ParentDir => Some(OsString::from("..")),
            _ => None,
        })
        .collect();
    stack.extend(parts.into_iter().rev());
}

/// Grants the owner read access everywhere so later reads never trip on
/// modes copied from the image.
#[cfg(unix)]
fn normalize_permissions(root: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let file_type = entry.file_type();
        let wanted = if file_type.is_dir() {
            0o700
        } else if file_type.is_file() {
            0o600
        } else {
            continue;
        };
        let meta = entry.metadata().map_err(io::Error::from)?;
        let mode = meta.permissions().mode();
        if mode & wanted != wanted {
            fs::set_permissions(entry.path(), fs::Permissions::from_mode(mode | wanted))?;
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn normalize_permissions(root: &Path) -> io::Result<()> {
    for entry in WalkDir::new(root).follow_links(false) {
        entry.map_err(io::Error::from)?;
    }
    Ok(())
}
