use super::ImageFs;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// An in-memory image filesystem, for driving extractors without an image.
///
/// # Example
///
/// ```
/// use imagemeta::image::{ImageFs, MemoryFs};
///
/// let fs = MemoryFs::new().with_file("/etc/os-release", "ID=alpine\n");
/// assert_eq!(fs.read_file("etc/os-release").unwrap(), "ID=alpine\n");
/// assert!(fs.read_dir("/var/lib/dpkg/status.d").unwrap().is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    files: BTreeMap<String, String>,
    root: Option<PathBuf>,
    released: bool,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, content: impl Into<String>) -> Self {
        self.files.insert(normalize(path), content.into());
        self
    }

    /// Sets the directory reported by [`ImageFs::root_dir`].
    pub fn with_root_dir(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    fn check(&self) -> Result<()> {
        if self.released {
            Err(Error::Released)
        } else {
            Ok(())
        }
    }
}

impl ImageFs for MemoryFs {
    fn read_file(&self, path: &str) -> Result<String> {
        self.check()?;
        self.files
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    fn read_dir(&self, path: &str) -> Result<Vec<String>> {
        self.check()?;
        let dir = normalize(path);
        Ok(self
            .files
            .iter()
            .filter(|(file, _)| Path::new(file.as_str()).parent() == Some(Path::new(dir.as_str())))
            .map(|(_, content)| content.clone())
            .collect())
    }

    fn exists(&self, path: &str) -> Result<bool> {
        self.check()?;
        let wanted = normalize(path);
        let prefix = format!("{}/", wanted);
        Ok(self
            .files
            .keys()
            .any(|file| *file == wanted || file.starts_with(&prefix)))
    }

    fn root_dir(&self) -> Result<&Path> {
        self.check()?;
        self.root
            .as_deref()
            .ok_or_else(|| Error::NotFound("root directory of in-memory filesystem".to_string()))
    }

    fn release(&mut self) -> Result<()> {
        self.released = true;
        self.files.clear();
        Ok(())
    }
}

fn normalize(path: &str) -> String {
    path.trim_matches('/').to_string()
}
