//! OCI layer application with whiteout handling.
//!
//! Layers are applied in order onto one directory the way a container runtime
//! presents them: later layers override earlier ones, `.wh.<name>` removes a
//! lower entry and `.wh..wh..opq` clears a directory's inherited contents.
//! Ownership is never applied and device nodes are skipped, so extraction
//! works unprivileged.

use super::rootfs::resolve_in_root;
use flate2::read::GzDecoder;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};

const WHITEOUT_PREFIX: &str = ".wh.";
const OPAQUE_WHITEOUT: &str = ".wh..wh..opq";

/// Layer compression, derived from the descriptor media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
}

impl Compression {
    /// Maps a layer media type to its compression, or `None` when unsupported.
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        match media_type {
            "application/vnd.oci.image.layer.v1.tar"
            | "application/vnd.oci.image.layer.nondistributable.v1.tar"
            | "application/vnd.docker.image.rootfs.diff.tar" => Some(Compression::None),
            "application/vnd.docker.image.rootfs.diff.tar.gzip"
            | "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip" => Some(Compression::Gzip),
            other if other.ends_with("+gzip") => Some(Compression::Gzip),
            _ => None,
        }
    }
}

/// One layer tarball on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerBlob {
    pub path: PathBuf,
    pub media_type: String,
    pub compression: Compression,
}

/// Applies one layer to `rootfs`, skipping entries under any `exclude` prefix.
///
/// Returns the number of entries written.
pub fn apply_layer(layer: &LayerBlob, rootfs: &Path, exclude: &[PathBuf]) -> io::Result<u64> {
    let file = BufReader::new(File::open(&layer.path)?);
    let written = match layer.compression {
        Compression::Gzip => apply_tar(GzDecoder::new(file), rootfs, exclude)?,
        Compression::None => apply_tar(file, rootfs, exclude)?,
    };

    tracing::debug!(
        layer = %layer.path.display(),
        entries = written,
        "Applied layer"
    );

    Ok(written)
}

fn apply_tar(reader: impl Read, rootfs: &Path, exclude: &[PathBuf]) -> io::Result<u64> {
    let mut archive = Archive::new(reader);
    archive.set_preserve_permissions(false);
    archive.set_preserve_ownerships(false);
    archive.set_unpack_xattrs(false);
    archive.set_overwrite(true);

    let mut written = 0;
    // Paths written by this layer; whiteouts only hide lower-layer content.
    let mut unpacked: HashSet<PathBuf> = HashSet::new();

    for raw_entry in archive.entries()? {
        let mut entry = raw_entry?;

        let rel = match normalize(&entry.path()?) {
            Some(rel) if !rel.as_os_str().is_empty() => rel,
            Some(_) => continue,
            None => {
                tracing::debug!(path = %entry.path()?.display(), "Skipping entry outside the root");
                continue;
            }
        };

        if exclude.iter().any(|prefix| rel.starts_with(prefix)) {
            tracing::debug!(path = %rel.display(), "Skipping excluded entry");
            continue;
        }

        let file_name = match rel.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_owned(),
            None => continue,
        };
        let parent = rel.parent().unwrap_or_else(|| Path::new("")).to_path_buf();

        if file_name == OPAQUE_WHITEOUT {
            if is_plain_path(rootfs, &parent) {
                let target = rootfs.join(&parent);
                if target.is_dir() {
                    clear_lower(&target, &parent, &unpacked)?;
                }
            }
            continue;
        }

        if let Some(target_name) = file_name.strip_prefix(WHITEOUT_PREFIX) {
            if target_name.is_empty() {
                continue;
            }
            let target = rel.with_file_name(target_name);
            if is_plain_path(rootfs, &parent) && !unpacked.contains(&target) {
                remove_entry(&rootfs.join(target))?;
            }
            continue;
        }

        let target = rootfs.join(&rel);
        let plain_parent = is_plain_path(rootfs, &parent);
        match entry.header().entry_type() {
            EntryType::Char | EntryType::Block | EntryType::Fifo => {
                tracing::debug!(path = %rel.display(), "Skipping device node");
                continue;
            }
            EntryType::Directory => {
                if !plain_parent {
                    tracing::debug!(path = %rel.display(), "Skipping directory below a symlink");
                    continue;
                }
                if let Ok(meta) = fs::symlink_metadata(&target) {
                    if !meta.is_dir() {
                        fs::remove_file(&target)?;
                    }
                }
                fs::create_dir_all(&target)?;
                unpacked.insert(rel);
                written += 1;
                continue;
            }
            _ => {}
        }

        if !plain_parent {
            if unpack_below_symlink(&mut entry, rootfs, &rel, &parent, &file_name)? {
                unpacked.insert(rel);
                written += 1;
            }
            continue;
        }

        // A non-directory replaces whatever a lower layer had at this path.
        if let Ok(meta) = fs::symlink_metadata(&target) {
            if meta.is_dir() {
                fs::remove_dir_all(&target)?;
            }
        }

        if entry.unpack_in(rootfs)? {
            unpacked.insert(rel);
            written += 1;
        }
    }

    Ok(written)
}

/// Unpacks an entry whose parent directory is reached through a symlink,
/// resolving that symlink inside `rootfs` the way the image sees it.
///
/// Returns false when the entry was skipped: the parent does not resolve to a
/// directory inside the root, or the entry is a hard link.
fn unpack_below_symlink<R: Read>(
    entry: &mut tar::Entry<'_, R>,
    rootfs: &Path,
    rel: &Path,
    parent: &Path,
    file_name: &str,
) -> io::Result<bool> {
    if entry.header().entry_type() == EntryType::Link {
        tracing::debug!(path = %rel.display(), "Skipping hard link below a symlink");
        return Ok(false);
    }

    let host_parent = match resolve_in_root(rootfs, &parent.to_string_lossy()) {
        Ok(host) if host.is_dir() => host,
        _ => {
            tracing::debug!(path = %rel.display(), "Skipping entry below an unresolvable symlink");
            return Ok(false);
        }
    };

    let target = host_parent.join(file_name);
    remove_entry(&target)?;
    entry.unpack(&target)?;
    tracing::debug!(path = %rel.display(), target = %target.display(), "Unpacked entry through symlinked parent");
    Ok(true)
}

/// Strips `/` and `.` components; `None` if the path climbs with `..`.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

/// True when no existing ancestor of `rel` inside `rootfs` is a symlink.
fn is_plain_path(rootfs: &Path, rel: &Path) -> bool {
    let mut current = rootfs.to_path_buf();
    for component in rel.components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => return false,
            Ok(_) => {}
            Err(_) => return true,
        }
    }
    true
}

fn remove_entry(target: &Path) -> io::Result<()> {
    match fs::symlink_metadata(target) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(target),
        Ok(_) => fs::remove_file(target),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Removes the lower-layer contents of `dir` (image path `rel`), keeping
/// anything the current layer has already written.
fn clear_lower(dir: &Path, rel: &Path, unpacked: &HashSet<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let child_rel = rel.join(entry.file_name());
        if unpacked.iter().any(|path| path.starts_with(&child_rel)) {
            if entry.file_type()?.is_dir() {
                clear_lower(&entry.path(), &child_rel, unpacked)?;
            }
            continue;
        }
        remove_entry(&entry.path())?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression as GzLevel;
    use tempfile::TempDir;

    /// Entry in a synthetic layer: `(path, Some(content))` for a file,
    /// `(path, None)` for a directory.
    pub(crate) type TestEntry<'a> = (&'a str, Option<&'a str>);

    pub(crate) fn write_layer(path: &Path, entries: &[TestEntry<'_>], gzip: bool) {
        let file = File::create(path).unwrap();
        if gzip {
            let encoder = GzEncoder::new(file, GzLevel::default());
            let mut builder = tar::Builder::new(encoder);
            append_entries(&mut builder, entries);
            builder.into_inner().unwrap().finish().unwrap();
        } else {
            let mut builder = tar::Builder::new(file);
            append_entries(&mut builder, entries);
            builder.finish().unwrap();
        }
    }

    fn append_entries<W: io::Write>(builder: &mut tar::Builder<W>, entries: &[TestEntry<'_>]) {
        for (name, content) in entries {
            let mut header = tar::Header::new_gnu();
            match content {
                Some(data) => {
                    header.set_entry_type(EntryType::Regular);
                    header.set_size(data.len() as u64);
                    header.set_mode(0o644);
                    header.set_cksum();
                    builder.append_data(&mut header, name, data.as_bytes()).unwrap();
                }
                None => {
                    header.set_entry_type(EntryType::Directory);
                    header.set_size(0);
                    header.set_mode(0o755);
                    header.set_cksum();
                    builder.append_data(&mut header, name, io::empty()).unwrap();
                }
            }
        }
    }

    fn layer(dir: &Path, name: &str, entries: &[TestEntry<'_>]) -> LayerBlob {
        let path = dir.join(name);
        write_layer(&path, entries, true);
        LayerBlob {
            path,
            media_type: "application/vnd.oci.image.layer.v1.tar+gzip".to_string(),
            compression: Compression::Gzip,
        }
    }

    #[test]
    fn test_compression_from_media_type() {
        assert_eq!(
            Compression::from_media_type("application/vnd.oci.image.layer.v1.tar+gzip"),
            Some(Compression::Gzip)
        );
        assert_eq!(
            Compression::from_media_type("application/vnd.docker.image.rootfs.diff.tar.gzip"),
            Some(Compression::Gzip)
        );
        assert_eq!(
            Compression::from_media_type("application/vnd.oci.image.layer.v1.tar"),
            Some(Compression::None)
        );
        assert_eq!(
            Compression::from_media_type("application/vnd.oci.image.layer.v1.tar+zstd"),
            None
        );
    }

    #[test]
    fn test_later_layer_overrides_earlier() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        fs::create_dir(&root).unwrap();

        let base = layer(tmp.path(), "l1", &[("etc/", None), ("etc/motd", Some("v1"))]);
        let top = layer(tmp.path(), "l2", &[("etc/motd", Some("v2"))]);

        apply_layer(&base, &root, &[]).unwrap();
        apply_layer(&top, &root, &[]).unwrap();

        assert_eq!(fs::read_to_string(root.join("etc/motd")).unwrap(), "v2");
    }

    #[test]
    fn test_whiteout_removes_lower_entry() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        fs::create_dir(&root).unwrap();

        let base = layer(
            tmp.path(),
            "l1",
            &[("etc/keep", Some("k")), ("etc/gone", Some("g")), ("opt/app/bin", Some("b"))],
        );
        let top = layer(
            tmp.path(),
            "l2",
            &[("etc/.wh.gone", Some("")), ("opt/.wh.app", Some(""))],
        );

        apply_layer(&base, &root, &[]).unwrap();
        apply_layer(&top, &root, &[]).unwrap();

        assert!(root.join("etc/keep").exists());
        assert!(!root.join("etc/gone").exists());
        assert!(!root.join("etc/.wh.gone").exists());
        assert!(!root.join("opt/app").exists());
    }

    #[test]
    fn test_opaque_whiteout_clears_directory() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        fs::create_dir(&root).unwrap();

        let base = layer(tmp.path(), "l1", &[("data/a", Some("a")), ("data/b", Some("b"))]);
        let top = layer(
            tmp.path(),
            "l2",
            &[("data/.wh..wh..opq", Some("")), ("data/c", Some("c"))],
        );

        apply_layer(&base, &root, &[]).unwrap();
        apply_layer(&top, &root, &[]).unwrap();

        assert!(!root.join("data/a").exists());
        assert!(!root.join("data/b").exists());
        assert!(root.join("data/c").exists());
    }

    #[test]
    fn test_opaque_whiteout_keeps_same_layer_entries() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        fs::create_dir(&root).unwrap();

        let base = layer(tmp.path(), "l1", &[("data/old", Some("o")), ("data/sub/deep", Some("d"))]);
        let top = layer(
            tmp.path(),
            "l2",
            &[
                ("data/new", Some("n")),
                ("data/sub/fresh", Some("f")),
                ("data/.wh..wh..opq", Some("")),
            ],
        );

        apply_layer(&base, &root, &[]).unwrap();
        apply_layer(&top, &root, &[]).unwrap();

        assert!(!root.join("data/old").exists());
        assert!(!root.join("data/sub/deep").exists());
        assert_eq!(fs::read_to_string(root.join("data/new")).unwrap(), "n");
        assert_eq!(fs::read_to_string(root.join("data/sub/fresh")).unwrap(), "f");
    }

    #[test]
    fn test_whiteout_does_not_remove_same_layer_entry() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        fs::create_dir(&root).unwrap();

        let top = layer(tmp.path(), "l1", &[("etc/motd", Some("m")), ("etc/.wh.motd", Some(""))]);
        apply_layer(&top, &root, &[]).unwrap();

        assert_eq!(fs::read_to_string(root.join("etc/motd")).unwrap(), "m");
    }

    #[cfg(unix)]
    #[test]
    fn test_file_below_absolute_symlink_parent_stays_in_root() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        fs::create_dir_all(root.join("run")).unwrap();
        fs::create_dir_all(root.join("var")).unwrap();
        std::os::unix::fs::symlink("/run", root.join("var/run")).unwrap();

        let top = layer(tmp.path(), "l1", &[("var/run/app.pid", Some("42"))]);
        let written = apply_layer(&top, &root, &[]).unwrap();

        assert_eq!(written, 1);
        assert_eq!(fs::read_to_string(root.join("run/app.pid")).unwrap(), "42");
        assert!(fs::symlink_metadata(root.join("var/run")).unwrap().file_type().is_symlink());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_below_dangling_symlink_parent_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        fs::create_dir_all(root.join("var")).unwrap();
        std::os::unix::fs::symlink("/missing", root.join("var/lock")).unwrap();

        let top = layer(
            tmp.path(),
            "l1",
            &[("var/lock/app.lock", Some("x")), ("etc/hostname", Some("h"))],
        );
        let written = apply_layer(&top, &root, &[]).unwrap();

        assert_eq!(written, 1);
        assert!(root.join("etc/hostname").exists());
        assert!(!root.join("missing").exists());
    }

    #[test]
    fn test_excluded_prefix_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        fs::create_dir(&root).unwrap();

        let base = layer(
            tmp.path(),
            "l1",
            &[("secret/", None), ("secret/key", Some("k")), ("etc/hostname", Some("h"))],
        );

        apply_layer(&base, &root, &[PathBuf::from("secret")]).unwrap();

        assert!(!root.join("secret").exists());
        assert!(root.join("etc/hostname").exists());
    }

    #[test]
    fn test_file_replaces_directory() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        fs::create_dir(&root).unwrap();

        let base = layer(tmp.path(), "l1", &[("srv/", None), ("srv/inner", Some("i"))]);
        let top = layer(tmp.path(), "l2", &[("srv", Some("now a file"))]);

        apply_layer(&base, &root, &[]).unwrap();
        apply_layer(&top, &root, &[]).unwrap();

        assert_eq!(fs::read_to_string(root.join("srv")).unwrap(), "now a file");
    }

    #[test]
    fn test_uncompressed_layer() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        fs::create_dir(&root).unwrap();

        let path = tmp.path().join("plain.tar");
        write_layer(&path, &[("hello.txt", Some("hi"))], false);
        let blob = LayerBlob {
            path,
            media_type: "application/vnd.oci.image.layer.v1.tar".to_string(),
            compression: Compression::None,
        };

        assert_eq!(apply_layer(&blob, &root, &[]).unwrap(), 1);
        assert_eq!(fs::read_to_string(root.join("hello.txt")).unwrap(), "hi");
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("./etc/passwd")), Some(PathBuf::from("etc/passwd")));
        assert_eq!(normalize(Path::new("/usr/bin")), Some(PathBuf::from("usr/bin")));
        assert_eq!(normalize(Path::new("../escape")), None);
    }
}
