#![doc = include_str!("../README.md")]
use thiserror::Error;

mod grid;
pub use grid::{GridSpec, Pixel, Transform};
mod pixset;
pub use pixset::PixelSet;
mod line;
pub use line::LineRasterizer;
mod poly;
pub use poly::{PixelRect, PolygonAlgorithm, PolygonOptions, PolygonStats};
mod repair;
pub use repair::{is_valid_polygon, polygonize_ring};
mod dispatch;
pub use dispatch::{rasterize_geometry, Dispatcher, GeometryKind, PixelAccumulator, PixelSink};
mod clip;
pub use clip::intersect_footprint;
mod buffer;
pub use buffer::{buffer_geometry, BufferParams, BufferValue};
mod source;
pub use source::{
    BandType, BandValue, Feature, FieldValue, MemoryRaster, MemoryVector, RasterSource,
    VectorSource,
};
mod observer;
pub use observer::{BandDescriptor, FeaturePixels, GlobalInfo, Observer, PixelCollector, TraversalEvent};
mod summary;
pub use summary::Summary;
mod traverse;
pub use traverse::{FeatureSelection, Traverser, TraverserBuilder, TraverserConfig};

#[cfg(test)]
mod proptests;
#[cfg(test)]
mod tests;

/// Error type for this crate.
///
/// Errors fall in two families: configuration and resource errors
/// that abort a whole traversal, and per-feature errors that only
/// cause the offending feature to be skipped. See
/// [is_recoverable][TraverseError::is_recoverable].
#[derive(Error, Clone, Debug, PartialEq)]
pub enum TraverseError {
    /// no observer was registered before building the traverser
    #[error("no observers registered")]
    NoObservers,

    /// `vector` is required in builder
    #[error("vector datasource not specified")]
    NoVector,

    /// at least one raster is required in builder
    #[error("no raster datasets were specified")]
    NoRasters,

    /// only single-layer vector datasources can be traversed
    #[error("vector datasource has {0} layers, exactly one is required")]
    MultipleLayers(usize),

    /// an attached raster does not share the grid of the first one
    #[error("rasters do not share the same grid: {0}")]
    GridMismatch(String),

    /// the geotransform has rotation or shear terms
    #[error("rotated or sheared geotransforms are not supported")]
    RotatedGrid,

    /// the geotransform has a zero pixel size
    #[error("pixel size must be non-zero")]
    ZeroPixelSize,

    /// pixel proportion must lie in [0, 1]
    #[error("pixel proportion {0} is outside [0, 1]")]
    InvalidPixelProportion(f64),

    /// the requested FID does not exist in the vector datasource
    #[error("FID {0} not found")]
    FeatureNotFound(i64),

    /// a raster could not deliver band values for a pixel
    #[error("error reading band values at [{col},{row}]: {reason}")]
    RasterRead { col: i64, row: i64, reason: String },

    /// at least one coordinate of the supplied geometry is NaN or infinite
    #[error("at least one coordinate of the supplied geometry is NaN or infinite")]
    NonFiniteCoordinate,

    /// the geometry kind cannot be rasterized
    #[error("{0}: intersection type not considered")]
    UnsupportedGeometry(&'static str),

    /// a `@field` buffer parameter names a field the feature lacks
    #[error("field `{0}' not found")]
    MissingAttribute(String),

    /// a buffer parameter is neither a number nor a `@field` reference
    #[error("invalid buffer parameter `{0}'")]
    InvalidBufferParameter(String),
}

impl TraverseError {
    /// Per-feature errors: the traversal logs them, counts them and
    /// moves on to the next feature.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TraverseError::NonFiniteCoordinate
                | TraverseError::UnsupportedGeometry(_)
                | TraverseError::MissingAttribute(_)
                | TraverseError::InvalidBufferParameter(_)
        )
    }
}

/// Result type for this crate that uses [TraverseError].
pub type Result<T> = std::result::Result<T, TraverseError>;
