//! The labeling pipeline: materialize, inspect, reconcile.

use crate::config::Config;
use crate::error::Result;
use crate::image::{ExtractOptions, ImageFs, ImageSource, RootFs};
use crate::merge::merge;
use crate::model::{DependencyKind, DependencyRecord, MetadataSnapshot, Provenance, Warning};
use crate::scanner::{all_extractors, identify_base, Extractor};

/// Source type recorded on build-provenance dependencies.
const BUILD_SOURCE: &str = "build";

/// Result of labeling one image.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelOutcome {
    /// The reconciled record to embed in the image.
    pub metadata: MetadataSnapshot,
    /// Concerns where the embedded label and the fresh scan disagreed.
    pub warnings: Vec<Warning>,
    /// The record previously embedded in the image, if any.
    pub original: Option<MetadataSnapshot>,
}

/// Runs extractors over an image and reconciles the result with its label.
///
/// # Example
///
/// ```no_run
/// use imagemeta::image::OciImage;
/// use imagemeta::model::Provenance;
/// use imagemeta::{Config, Labeler};
///
/// let tool = Provenance::new("imagemeta", "0.1.0", "https://example.com/imagemeta");
/// let labeler = Labeler::new(Config::default(), tool);
/// let outcome = labeler.label(&OciImage::open("./image")?, None)?;
/// println!("{}", outcome.metadata.to_label()?);
/// # Ok::<(), imagemeta::Error>(())
/// ```
pub struct Labeler {
    config: Config,
    tool: Provenance,
    extractors: Vec<Box<dyn Extractor>>,
}

impl Labeler {
    pub fn new(config: Config, tool: Provenance) -> Self {
        let extractors = all_extractors(&config.rpm_command);
        Self {
            config,
            tool,
            extractors,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Computes a fresh snapshot from an already materialized filesystem.
    pub fn inspect(
        &self,
        fs: &dyn ImageFs,
        build_provenance: Option<serde_json::Value>,
    ) -> Result<MetadataSnapshot> {
        let base = identify_base(fs)?;

        let mut dependencies = Vec::new();
        for extractor in &self.extractors {
            tracing::debug!(extractor = extractor.name(), "Running extractor");
            if let Some(record) = extractor.extract(fs)? {
                dependencies.push(record);
            }
        }

        if let Some(payload) = build_provenance {
            dependencies.push(DependencyRecord::from_payload(
                DependencyKind::BuildProvenance,
                BUILD_SOURCE,
                &payload,
            )?);
        }

        Ok(MetadataSnapshot {
            base: Some(base),
            provenance: vec![self.tool.clone()],
            dependencies,
        })
    }

    /// Materializes `image`, inspects it and merges the result with the
    /// record stored under the configured label key.
    ///
    /// The extracted filesystem is released before returning, whether or not
    /// inspection succeeded.
    pub fn label(
        &self,
        image: &dyn ImageSource,
        build_provenance: Option<serde_json::Value>,
    ) -> Result<LabelOutcome> {
        let original = image
            .label(&self.config.label_key)
            .map(|json| MetadataSnapshot::from_label(&self.config.label_key, &json))
            .transpose()?;

        let options = self
            .config
            .exclude_paths
            .iter()
            .fold(ExtractOptions::new(), |options, prefix| options.exclude(prefix));

        let reference = image.reference();
        let mut rootfs = RootFs::extract(image, &options)?;

        let inspected = self.inspect(&rootfs, build_provenance);
        let released = rootfs.release();
        let current = inspected?;
        released?;

        let Some(original) = original else {
            tracing::info!(image = %reference, "No embedded label, using fresh scan");
            return Ok(LabelOutcome {
                metadata: current,
                warnings: Vec::new(),
                original: None,
            });
        };

        let (metadata, warnings) = merge(&original, &current);
        for warning in &warnings {
            tracing::warn!(image = %reference, concern = warning.tag(), "{}", warning);
        }

        Ok(LabelOutcome {
            metadata,
            warnings,
            original: Some(original),
        })
    }
}
