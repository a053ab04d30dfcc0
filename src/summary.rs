use std::collections::BTreeMap;
use std::fmt;

use tracing::info;

use crate::{GeometryKind, PolygonStats};

/// Counters gathered over one traversal.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Summary {
    /// Features whose geometry intersects the raster footprint.
    pub num_intersecting_features: u64,
    /// Intersecting features by the kind of their intersection.
    pub features_by_kind: BTreeMap<GeometryKind, u64>,
    pub polygons: PolygonStats,
    /// Features skipped because of a per-feature error.
    pub num_failed_features: u64,
    /// Distinct (feature, pixel) pairs reported to observers.
    pub num_processed_pixels: u64,
}

impl Summary {
    pub fn count(&self, kind: GeometryKind) -> u64 {
        self.features_by_kind.get(&kind).copied().unwrap_or(0)
    }

    pub(crate) fn record_kind(&mut self, kind: GeometryKind) {
        *self.features_by_kind.entry(kind).or_insert(0) += 1;
    }

    /// Emit the summary through `tracing`.
    pub fn log(&self) {
        info!(
            intersecting_features = self.num_intersecting_features,
            processed_pixels = self.num_processed_pixels,
            failed_features = self.num_failed_features,
            invalid_polygons = self.polygons.num_invalid,
            "traversal finished"
        );
        for (kind, count) in &self.features_by_kind {
            info!(kind = kind.name(), count, "intersections by kind");
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Summary:")?;
        writeln!(f, "  Intersecting features: {}", self.num_intersecting_features)?;
        for (kind, count) in &self.features_by_kind {
            writeln!(f, "    {}: {}", kind.name(), count)?;
        }
        let polygons = &self.polygons;
        if polygons.num_invalid > 0 {
            writeln!(f, "  Invalid polygons: {}", polygons.num_invalid)?;
            writeln!(
                f,
                "    with interior rings (not processed): {}",
                polygons.num_with_interior_ring
            )?;
            writeln!(
                f,
                "    exploded: {} into {} sub-polygons",
                polygons.num_exploded, polygons.num_sub_polygons
            )?;
        }
        if self.num_failed_features > 0 {
            writeln!(f, "  Failed features: {}", self.num_failed_features)?;
        }
        write!(f, "  Processed pixels: {}", self.num_processed_pixels)
    }
}
