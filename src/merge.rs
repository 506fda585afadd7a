//! Reconciliation of an embedded label with a fresh scan.

use crate::model::{DependencyKind, DependencyRecord, MetadataSnapshot, Warning};

/// Merges the `original` snapshot parsed from an image label with the
/// `current` snapshot computed by a scan.
///
/// - Provenance is the original list followed by the current list.
/// - Base is always the current base.
/// - Recomputed kinds (Debian packages, RPM packages, build provenance) come
///   from `current` only. A divergent or vanished original record produces a
///   warning tagged with its kind.
/// - Every other kind in `original` is carried forward unchanged.
///
/// ```
/// use imagemeta::merge;
/// use imagemeta::model::MetadataSnapshot;
///
/// let (merged, warnings) = merge(&MetadataSnapshot::default(), &MetadataSnapshot::default());
/// assert_eq!(merged, MetadataSnapshot::default());
/// assert!(warnings.is_empty());
/// ```
pub fn merge(original: &MetadataSnapshot, current: &MetadataSnapshot) -> (MetadataSnapshot, Vec<Warning>) {
    let mut warnings = Vec::new();

    let provenance = original
        .provenance
        .iter()
        .chain(&current.provenance)
        .cloned()
        .collect();

    if let Some(base) = original.base.as_ref().filter(|b| !b.is_empty()) {
        if current.base.as_ref() != Some(base) {
            tracing::warn!(original = ?base, current = ?current.base, "Base image identity changed");
            warnings.push(Warning::Base);
        }
    }

    let mut dependencies: Vec<DependencyRecord> = original
        .dependencies
        .iter()
        .filter(|d| !d.kind.is_recomputed())
        .cloned()
        .collect();

    for kind in DependencyKind::recomputed() {
        let before = original.dependency(&kind);
        let after = current.dependency(&kind);

        match (before, after) {
            (Some(before), Some(after)) if before != after => {
                tracing::warn!(
                    kind = %kind,
                    original = before.sha256().unwrap_or("-"),
                    current = after.sha256().unwrap_or("-"),
                    "Dependency differs from embedded label"
                );
                warnings.push(Warning::Dependency(kind));
            }
            (Some(_), None) => {
                tracing::warn!(kind = %kind, "Dependency in embedded label is absent from the image");
                warnings.push(Warning::Dependency(kind));
            }
            _ => {}
        }

        if let Some(after) = after {
            dependencies.push(after.clone());
        }
    }

    for record in current.dependencies.iter().filter(|d| !d.kind.is_recomputed()) {
        if !dependencies.contains(record) {
            dependencies.push(record.clone());
        }
    }

    let merged = MetadataSnapshot {
        base: current.base.clone(),
        provenance,
        dependencies,
    };
    (merged, warnings)
}
