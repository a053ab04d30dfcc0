use anyhow::Result;
use geo::{polygon, Polygon};

use crate::{
    Feature, FeaturePixels, GlobalInfo, GridSpec, MemoryRaster, MemoryVector, Observer,
    PixelCollector, Summary, TraversalEvent, Traverser, TraverserConfig,
};

/// 10x10 grid of unit pixels covering `[0, 10] x [0, 10]`, north up.
pub fn grid10() -> GridSpec {
    GridSpec::new(0., 10., 1., -1., 10, 10)
}

pub fn rect_polygon(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon<f64> {
    polygon![(x: x0, y: y0), (x: x1, y: y0), (x: x1, y: y1), (x: x0, y: y1)]
}

pub fn vector_of(features: Vec<Feature>) -> MemoryVector {
    let mut vector = MemoryVector::new("test").with_spatial_reference("EPSG:32611");
    for feature in features {
        vector.push(feature);
    }
    vector
}

/// Traverse `vector` over `rasters` with a [PixelCollector] reading
/// band values and return what it collected.
pub fn collect(
    vector: &mut MemoryVector,
    rasters: &[&MemoryRaster],
    config: TraverserConfig,
) -> Result<(Summary, Vec<FeaturePixels>)> {
    let mut collector = PixelCollector::with_band_values();
    let mut builder = Traverser::builder()
        .vector(vector)
        .observer(&mut collector)
        .config(config);
    for raster in rasters {
        builder = builder.raster(*raster);
    }
    let summary = builder.build()?.traverse()?;
    Ok((summary, collector.into_features()))
}

/// An observer that writes down every notification it receives.
#[derive(Debug, Default)]
pub struct EventLog {
    pub simple: bool,
    pub events: Vec<String>,
}

impl EventLog {
    pub fn simple() -> Self {
        EventLog {
            simple: true,
            events: Vec::new(),
        }
    }
}

impl Observer for EventLog {
    fn is_simple(&self) -> bool {
        self.simple
    }

    fn init(&mut self, info: &GlobalInfo) {
        self.events.push(format!("init {}", info.bands.len()));
    }

    fn intersection_found(&mut self, feature: &Feature) {
        self.events.push(format!("found {}", feature.fid));
    }

    fn add_pixel(&mut self, event: &TraversalEvent<'_>) {
        let values = match event.band_values {
            Some(values) => values.len().to_string(),
            None => "-".to_string(),
        };
        self.events.push(format!("pixel {} {}", event.pixel, values));
    }

    fn intersection_end(&mut self, feature: &Feature) {
        self.events.push(format!("end {}", feature.fid));
    }

    fn end(&mut self) {
        self.events.push("done".to_string());
    }
}
