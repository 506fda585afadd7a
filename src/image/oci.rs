//! OCI image-layout directory backend.

use super::layers::{Compression, LayerBlob};
use super::ImageSource;
use crate::error::{Error, Result};
use oci_spec::image::{ImageConfiguration, ImageIndex, ImageManifest};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const INDEX_MEDIA_TYPE: &str = "application/vnd.oci.image.index.v1+json";
const DOCKER_LIST_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.list.v2+json";

/// An image stored as an OCI image layout on disk.
///
/// The layout must contain an `oci-layout` file, `index.json` and a
/// `blobs/<algorithm>/` tree. The first manifest of the index is used; a
/// nested index is followed one level.
#[derive(Debug)]
pub struct OciImage {
    root_dir: PathBuf,
    manifest: ImageManifest,
    labels: HashMap<String, String>,
}

impl OciImage {
    /// Opens an OCI image layout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Flatten`] naming the layout directory when it is not a
    /// valid layout or its manifest/config cannot be parsed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root_dir = path.as_ref().to_path_buf();
        let fail = |reason: String| Error::Flatten {
            image: root_dir.display().to_string(),
            reason,
        };

        for required in ["oci-layout", "index.json", "blobs"] {
            if !root_dir.join(required).exists() {
                return Err(fail(format!("not an OCI image layout: missing {}", required)));
            }
        }

        let index: ImageIndex = read_json(&root_dir.join("index.json")).map_err(fail)?;
        let mut descriptor = index
            .manifests()
            .first()
            .cloned()
            .ok_or_else(|| fail("index.json lists no manifests".to_string()))?;

        let media_type = descriptor.media_type().to_string();
        if media_type == INDEX_MEDIA_TYPE || media_type == DOCKER_LIST_MEDIA_TYPE {
            let nested: ImageIndex =
                read_json(&blob_path(&root_dir, &descriptor.digest().to_string())).map_err(fail)?;
            descriptor = nested
                .manifests()
                .first()
                .cloned()
                .ok_or_else(|| fail("nested image index lists no manifests".to_string()))?;
        }

        let manifest: ImageManifest =
            read_json(&blob_path(&root_dir, &descriptor.digest().to_string())).map_err(fail)?;
        let config: ImageConfiguration =
            read_json(&blob_path(&root_dir, &manifest.config().digest().to_string())).map_err(fail)?;

        let labels = config
            .config()
            .as_ref()
            .and_then(|c| c.labels().clone())
            .unwrap_or_default();

        tracing::debug!(
            image = %root_dir.display(),
            layers = manifest.layers().len(),
            labels = labels.len(),
            "Opened OCI image layout"
        );

        Ok(Self {
            root_dir,
            manifest,
            labels,
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn labels(&self) -> &HashMap<String, String> {
        &self.labels
    }
}

impl ImageSource for OciImage {
    fn reference(&self) -> String {
        self.root_dir.display().to_string()
    }

    fn layers(&self) -> Result<Vec<LayerBlob>> {
        self.manifest
            .layers()
            .iter()
            .map(|layer| {
                let media_type = layer.media_type().to_string();
                let digest = layer.digest().to_string();
                let compression = Compression::from_media_type(&media_type).ok_or_else(|| Error::Flatten {
                    image: self.reference(),
                    reason: format!("layer {} has unsupported media type {}", digest, media_type),
                })?;
                let path = blob_path(&self.root_dir, &digest);
                if !path.is_file() {
                    return Err(Error::Flatten {
                        image: self.reference(),
                        reason: format!("layer blob {} is missing", digest),
                    });
                }
                Ok(LayerBlob {
                    path,
                    media_type,
                    compression,
                })
            })
            .collect()
    }

    fn label(&self, key: &str) -> Option<String> {
        self.labels.get(key).cloned()
    }
}

/// Path of a blob for a digest of the form `algorithm:hex`.
fn blob_path(root_dir: &Path, digest: &str) -> PathBuf {
    let (algorithm, hash) = digest.split_once(':').unwrap_or(("sha256", digest));
    root_dir.join("blobs").join(algorithm).join(hash)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> std::result::Result<T, String> {
    let content = std::fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    serde_json::from_str(&content).map_err(|e| format!("failed to parse {}: {}", path.display(), e))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::image::layers::tests::{write_layer, TestEntry};
    use sha2::{Digest, Sha256};
    use std::fs;
    use tempfile::TempDir;

    fn put_blob(root: &Path, bytes: &[u8]) -> String {
        let hash = hex::encode(Sha256::digest(bytes));
        fs::write(root.join("blobs/sha256").join(&hash), bytes).unwrap();
        format!("sha256:{}", hash)
    }

    /// Writes an OCI layout with one gzip layer per entry list.
    pub(crate) fn write_layout(root: &Path, layers: &[&[TestEntry<'_>]], labels: &[(&str, &str)]) {
        fs::create_dir_all(root.join("blobs/sha256")).unwrap();
        fs::write(root.join("oci-layout"), r#"{"imageLayoutVersion":"1.0.0"}"#).unwrap();

        let scratch = TempDir::new().unwrap();
        let mut layer_descriptors = Vec::new();
        for (i, entries) in layers.iter().enumerate() {
            let path = scratch.path().join(format!("layer{}", i));
            write_layer(&path, entries, true);
            let bytes = fs::read(&path).unwrap();
            let digest = put_blob(root, &bytes);
            layer_descriptors.push(serde_json::json!({
                "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip",
                "digest": digest,
                "size": bytes.len(),
            }));
        }

        let label_map: serde_json::Map<String, serde_json::Value> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect();
        let config = serde_json::to_vec(&serde_json::json!({
            "architecture": "amd64",
            "os": "linux",
            "config": { "Labels": label_map },
            "rootfs": { "type": "layers", "diff_ids": [] },
            "history": [],
        }))
        .unwrap();
        let config_digest = put_blob(root, &config);

        let manifest = serde_json::to_vec(&serde_json::json!({
            "schemaVersion": 2,
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "config": {
                "mediaType": "application/vnd.oci.image.config.v1+json",
                "digest": config_digest,
                "size": config.len(),
            },
            "layers": layer_descriptors,
        }))
        .unwrap();
        let manifest_digest = put_blob(root, &manifest);

        let index = serde_json::json!({
            "schemaVersion": 2,
            "manifests": [{
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "digest": manifest_digest,
                "size": manifest.len(),
            }],
        });
        fs::write(root.join("index.json"), serde_json::to_vec(&index).unwrap()).unwrap();
    }

    #[test]
    fn test_open_reads_layers_and_labels() {
        let tmp = TempDir::new().unwrap();
        write_layout(
            tmp.path(),
            &[&[("etc/hostname", Some("a"))], &[("etc/motd", Some("b"))]],
            &[("imagemeta.metadata", "{}")],
        );

        let image = OciImage::open(tmp.path()).unwrap();
        let layers = image.layers().unwrap();
        assert_eq!(layers.len(), 2);
        assert!(layers.iter().all(|l| l.compression == Compression::Gzip));
        assert_eq!(image.label("imagemeta.metadata").as_deref(), Some("{}"));
        assert_eq!(image.label("absent"), None);
    }

    #[test]
    fn test_open_missing_layout_file() {
        let tmp = TempDir::new().unwrap();
        let err = OciImage::open(tmp.path()).unwrap_err();
        assert!(matches!(err, Error::Flatten { .. }));
        assert!(err.to_string().contains("oci-layout"));
    }

    #[test]
    fn test_open_empty_index() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("blobs/sha256")).unwrap();
        fs::write(tmp.path().join("oci-layout"), r#"{"imageLayoutVersion":"1.0.0"}"#).unwrap();
        fs::write(tmp.path().join("index.json"), r#"{"schemaVersion":2,"manifests":[]}"#).unwrap();

        let err = OciImage::open(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("no manifests"));
    }

    #[test]
    fn test_missing_layer_blob_fails_flatten() {
        let tmp = TempDir::new().unwrap();
        write_layout(tmp.path(), &[&[("a", Some("1"))]], &[]);
        let image = OciImage::open(tmp.path()).unwrap();
        for layer in image.layers().unwrap() {
            fs::remove_file(layer.path).unwrap();
        }

        let err = image.layers().unwrap_err();
        assert!(matches!(err, Error::Flatten { .. }));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_blob_path() {
        assert_eq!(
            blob_path(Path::new("/img"), "sha256:abc"),
            PathBuf::from("/img/blobs/sha256/abc")
        );
        assert_eq!(blob_path(Path::new("/img"), "abc"), PathBuf::from("/img/blobs/sha256/abc"));
    }
}
