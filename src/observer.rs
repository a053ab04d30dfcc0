use geo::Polygon;

use crate::{BandType, BandValue, Feature, Pixel};

/// One band of one of the rasters attached to a traversal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BandDescriptor {
    /// Index of the raster, in the order the rasters were added.
    pub raster: usize,
    /// Index of the band within its raster.
    pub band: usize,
    pub band_type: BandType,
}

impl BandDescriptor {
    pub fn size_bytes(&self) -> usize {
        self.band_type.size_bytes()
    }
}

/// Facts about a traversal that observers may need before the first
/// feature arrives.
#[derive(Clone, Debug, PartialEq)]
pub struct GlobalInfo {
    /// Every band of every raster, in reading order.
    pub bands: Vec<BandDescriptor>,
    /// The common raster footprint.
    pub raster_poly: Polygon<f64>,
}

/// A pixel selected for the current feature.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TraversalEvent<'a> {
    pub pixel: Pixel,
    /// Geographic origin of the pixel.
    pub x: f64,
    pub y: f64,
    /// One value per entry of [GlobalInfo::bands]; `None` when every
    /// observer is simple.
    pub band_values: Option<&'a [BandValue]>,
}

/// Receives the results of a traversal.
///
/// For each feature that intersects the raster, an observer sees
/// `intersection_found`, then one `add_pixel` per distinct selected
/// pixel, then `intersection_end`. `init` comes before the first
/// feature and `end` after the last one.
pub trait Observer {
    /// Simple observers only need pixel locations; if every observer
    /// is simple, band values are never read.
    fn is_simple(&self) -> bool {
        false
    }

    fn init(&mut self, _info: &GlobalInfo) {}

    fn intersection_found(&mut self, _feature: &Feature) {}

    fn add_pixel(&mut self, _event: &TraversalEvent<'_>) {}

    fn intersection_end(&mut self, _feature: &Feature) {}

    fn end(&mut self) {}
}

/// The pixels selected for one feature.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeaturePixels {
    pub fid: i64,
    pub pixels: Vec<Pixel>,
    /// Band values of each pixel, parallel to `pixels`. Empty for a
    /// locations-only collector.
    pub band_values: Vec<Vec<BandValue>>,
}

/// An [Observer] that keeps everything it is told in memory.
#[derive(Clone, Debug, Default)]
pub struct PixelCollector {
    simple: bool,
    bands: Vec<BandDescriptor>,
    features: Vec<FeaturePixels>,
    finished: bool,
}

impl PixelCollector {
    /// Collect pixel locations only.
    pub fn locations_only() -> Self {
        PixelCollector {
            simple: true,
            ..PixelCollector::default()
        }
    }

    /// Collect pixel locations and their band values.
    pub fn with_band_values() -> Self {
        PixelCollector::default()
    }

    pub fn bands(&self) -> &[BandDescriptor] {
        &self.bands
    }

    pub fn features(&self) -> &[FeaturePixels] {
        &self.features
    }

    pub fn into_features(self) -> Vec<FeaturePixels> {
        self.features
    }

    /// Whether the traversal has ended.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Observer for PixelCollector {
    fn is_simple(&self) -> bool {
        self.simple
    }

    fn init(&mut self, info: &GlobalInfo) {
        self.bands = info.bands.clone();
        self.features.clear();
        self.finished = false;
    }

    fn intersection_found(&mut self, feature: &Feature) {
        self.features.push(FeaturePixels {
            fid: feature.fid,
            ..FeaturePixels::default()
        });
    }

    fn add_pixel(&mut self, event: &TraversalEvent<'_>) {
        if let Some(current) = self.features.last_mut() {
            current.pixels.push(event.pixel);
            if let Some(values) = event.band_values {
                current.band_values.push(values.to_vec());
            }
        }
    }

    fn end(&mut self) {
        self.finished = true;
    }
}
