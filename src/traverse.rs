use std::env;

use geo::{Coord, CoordsIter, Geometry, Rect};
use tracing::{debug, info, warn};

use crate::{
    buffer_geometry, intersect_footprint, BandDescriptor, BandValue, BufferParams, BufferValue,
    Dispatcher,
    Feature, GeometryKind, GlobalInfo, GridSpec, Observer, Pixel, PixelSet, PixelSink,
    PolygonAlgorithm, PolygonOptions, RasterSource, Result, Summary, TraversalEvent,
    TraverseError, VectorSource,
};

/// Set to any value to scan every feature instead of asking the
/// vector source to filter by the raster footprint.
pub const NO_SPATIAL_FILTER_VAR: &str = "GEO_TRAVERSE_NO_SPATIAL_FILTER";

/// Set to any value to log the geometry of every invalid polygon.
pub const DUMP_POLYS_VAR: &str = "GEO_TRAVERSE_DUMP_POLYS";

/// Which features a traversal visits.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum FeatureSelection {
    #[default]
    All,
    /// Only the feature with this FID; a missing FID is an error.
    Fid(i64),
    /// Only the first feature whose `name` field reads `value`.
    Field { name: String, value: String },
}

/// Everything that tunes a traversal.
#[derive(Clone, Debug, PartialEq)]
pub struct TraverserConfig {
    pub polygon: PolygonOptions,
    pub selection: FeatureSelection,
    /// Buffer applied to every feature geometry before rasterizing.
    pub buffer: Option<BufferParams>,
    /// Log progress every this many percent of a full scan.
    pub progress_step: Option<f64>,
    /// Ask the vector source to skip features outside the raster.
    pub spatial_filter: bool,
}

impl Default for TraverserConfig {
    fn default() -> Self {
        TraverserConfig {
            polygon: PolygonOptions::default(),
            selection: FeatureSelection::default(),
            buffer: None,
            progress_step: None,
            spatial_filter: true,
        }
    }
}

impl TraverserConfig {
    /// The default configuration with the debugging switches read from
    /// [NO_SPATIAL_FILTER_VAR] and [DUMP_POLYS_VAR].
    pub fn from_env() -> Self {
        let mut config = TraverserConfig::default();
        config.spatial_filter = env::var_os(NO_SPATIAL_FILTER_VAR).is_none();
        config.polygon.dump_invalid = env::var_os(DUMP_POLYS_VAR).is_some();
        config
    }
}

/// A builder that constructs [Traverser]s. A vector source, at least
/// one raster and at least one observer are required.
///
/// ```rust
/// # fn main() -> geo_traverse::Result<()> {
/// use geo_traverse::{BandType, GridSpec, MemoryRaster, MemoryVector, PixelCollector, Traverser};
///
/// let raster = MemoryRaster::filled(GridSpec::new(0., 10., 1., -1., 10, 10), &[BandType::F32], 0.);
/// let mut vector = MemoryVector::new("empty");
/// let mut collector = PixelCollector::with_band_values();
/// let mut traverser = Traverser::builder()
///     .vector(&mut vector)
///     .raster(&raster)
///     .observer(&mut collector)
///     .pixel_proportion(0.25)
///     .build()?;
/// assert_eq!(traverser.band_buffer_size(), 4);
/// assert_eq!(traverser.traverse()?.num_intersecting_features, 0);
/// # Ok(())}
/// ```
#[derive(Default)]
pub struct TraverserBuilder<'a> {
    vector: Option<&'a mut dyn VectorSource>,
    rasters: Vec<&'a dyn RasterSource>,
    observers: Vec<&'a mut dyn Observer>,
    config: TraverserConfig,
}

impl<'a> TraverserBuilder<'a> {
    pub fn new() -> Self {
        TraverserBuilder::default()
    }

    pub fn vector(mut self, vector: &'a mut dyn VectorSource) -> Self {
        self.vector = Some(vector);
        self
    }

    /// Add a raster. Every raster has to share the grid of the first.
    pub fn raster(mut self, raster: &'a dyn RasterSource) -> Self {
        self.rasters.push(raster);
        self
    }

    /// Add an observer. Observers are notified in the order added.
    pub fn observer(mut self, observer: &'a mut dyn Observer) -> Self {
        self.observers.push(observer);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: TraverserConfig) -> Self {
        self.config = config;
        self
    }

    pub fn pixel_proportion(mut self, pixel_proportion: f64) -> Self {
        self.config.polygon.pixel_proportion = pixel_proportion;
        self
    }

    pub fn algorithm(mut self, algorithm: PolygonAlgorithm) -> Self {
        self.config.polygon.algorithm = algorithm;
        self
    }

    pub fn skip_invalid_polygons(mut self, skip: bool) -> Self {
        self.config.polygon.skip_invalid = skip;
        self
    }

    pub fn fid(mut self, fid: i64) -> Self {
        self.config.selection = FeatureSelection::Fid(fid);
        self
    }

    pub fn field(mut self, name: &str, value: &str) -> Self {
        self.config.selection = FeatureSelection::Field {
            name: name.to_string(),
            value: value.to_string(),
        };
        self
    }

    pub fn buffer(mut self, params: BufferParams) -> Self {
        self.config.buffer = Some(params);
        self
    }

    pub fn progress(mut self, step_percent: f64) -> Self {
        self.config.progress_step = Some(step_percent);
        self
    }

    pub fn spatial_filter(mut self, enabled: bool) -> Self {
        self.config.spatial_filter = enabled;
        self
    }

    pub fn build(self) -> Result<Traverser<'a>> {
        if self.observers.is_empty() {
            return Err(TraverseError::NoObservers);
        }
        let vector = self.vector.ok_or(TraverseError::NoVector)?;
        let Some(first) = self.rasters.first() else {
            return Err(TraverseError::NoRasters);
        };
        let layers = vector.layer_count();
        if layers != 1 {
            return Err(TraverseError::MultipleLayers(layers));
        }
        let pixel_proportion = self.config.polygon.pixel_proportion;
        if !(0.0..=1.0).contains(&pixel_proportion) {
            return Err(TraverseError::InvalidPixelProportion(pixel_proportion));
        }

        let grid = first.grid();
        for raster in &self.rasters[1..] {
            grid.check_matches(&raster.grid())?;
        }
        if vector.spatial_reference().is_none() {
            warn!(vector = vector.name(), "vector datasource has no spatial reference");
        }

        let bands = self
            .rasters
            .iter()
            .enumerate()
            .flat_map(|(raster, source)| {
                source
                    .band_types()
                    .iter()
                    .enumerate()
                    .map(move |(band, band_type)| BandDescriptor {
                        raster,
                        band,
                        band_type: *band_type,
                    })
            })
            .collect();
        let needs_band_values = self.observers.iter().any(|observer| !observer.is_simple());

        Ok(Traverser {
            vector,
            rasters: self.rasters,
            observers: self.observers,
            config: self.config,
            grid,
            global_info: GlobalInfo {
                bands,
                raster_poly: grid.footprint_polygon(),
            },
            needs_band_values,
            pixset: PixelSet::new(),
            summary: Summary::default(),
        })
    }
}

/// Walks the features of a vector source, works out which pixels of
/// the rasters each one selects and reports them to the observers.
pub struct Traverser<'a> {
    vector: &'a mut dyn VectorSource,
    rasters: Vec<&'a dyn RasterSource>,
    observers: Vec<&'a mut dyn Observer>,
    config: TraverserConfig,
    grid: GridSpec,
    global_info: GlobalInfo,
    needs_band_values: bool,
    pixset: PixelSet,
    summary: Summary,
}

impl<'a> Traverser<'a> {
    pub fn builder() -> TraverserBuilder<'a> {
        TraverserBuilder::new()
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn global_info(&self) -> &GlobalInfo {
        &self.global_info
    }

    pub fn config(&self) -> &TraverserConfig {
        &self.config
    }

    /// Bytes needed to hold one value of every band.
    pub fn band_buffer_size(&self) -> usize {
        self.global_info.bands.iter().map(BandDescriptor::size_bytes).sum()
    }

    /// Summary of the last traversal.
    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    /// Run the traversal and return its summary. Per-feature problems
    /// are logged and counted; only configuration and raster access
    /// problems abort the run.
    pub fn traverse(&mut self) -> Result<Summary> {
        self.summary = Summary::default();

        let single = match &self.config.selection {
            FeatureSelection::Fid(fid) => {
                Some(self.vector.feature(*fid).ok_or(TraverseError::FeatureNotFound(*fid))?)
            }
            _ => None,
        };

        for observer in self.observers.iter_mut() {
            observer.init(&self.global_info);
        }
        let mut scratch: Vec<BandValue> = if self.needs_band_values {
            self.global_info
                .bands
                .iter()
                .map(|band| BandValue::zero(band.band_type))
                .collect()
        } else {
            Vec::new()
        };

        match (single, self.config.selection.clone()) {
            (Some(feature), _) => self.visit(&feature, &mut scratch)?,
            (None, FeatureSelection::Field { name, value }) => {
                self.vector.reset_reading();
                match self.vector.find_by_field(&name, &value) {
                    Some(feature) => self.visit(&feature, &mut scratch)?,
                    None => warn!(field = %name, %value, "no feature with matching field"),
                }
            }
            (None, _) => self.scan(&mut scratch)?,
        }

        for observer in self.observers.iter_mut() {
            observer.end();
        }
        self.summary.log();
        Ok(self.summary.clone())
    }

    fn scan(&mut self, scratch: &mut [BandValue]) -> Result<()> {
        self.vector.reset_reading();
        let filter = self.spatial_filter();
        match filter {
            Some(rect) => self.vector.set_spatial_filter(Some(rect)),
            None => info!("spatial filtering disabled"),
        }
        let mut progress = self
            .config
            .progress_step
            .map(|step| Progress::new(self.vector.feature_count(), step));

        let result = loop {
            let Some(feature) = self.vector.next_feature() else {
                break Ok(());
            };
            if let Err(err) = self.visit(&feature, scratch) {
                break Err(err);
            }
            if let Some(progress) = progress.as_mut() {
                progress.advance();
            }
        };

        if let Some(progress) = progress {
            progress.complete();
        }
        if filter.is_some() {
            self.vector.set_spatial_filter(None);
        }
        result
    }

    /// Rectangle a feature envelope has to touch to possibly reach the
    /// raster. Buffered features are let in from as far as their
    /// buffer extends; a per-feature distance disables filtering.
    fn spatial_filter(&self) -> Option<Rect<f64>> {
        if !self.config.spatial_filter {
            return None;
        }
        let footprint = self.grid.footprint();
        let margin = match self.config.buffer.as_ref().map(|params| &params.distance) {
            None => 0.,
            Some(BufferValue::Literal(distance)) => (*distance).max(0.),
            Some(BufferValue::Attribute(name)) => {
                debug!(field = %name, "buffer distance read per feature, no spatial filter");
                return None;
            }
        };
        let grow = Coord {
            x: margin,
            y: margin,
        };
        Some(Rect::new(footprint.min() - grow, footprint.max() + grow))
    }

    /// Process one feature, absorbing recoverable errors.
    fn visit(&mut self, feature: &Feature, scratch: &mut [BandValue]) -> Result<()> {
        match self.process_feature(feature, scratch) {
            Err(err) if err.is_recoverable() => {
                self.record_failure(feature.fid, &err);
                Ok(())
            }
            other => other,
        }
    }

    fn record_failure(&mut self, fid: i64, err: &TraverseError) {
        warn!(fid, error = %err, "feature skipped");
        self.summary.num_failed_features += 1;
    }

    fn process_feature(&mut self, feature: &Feature, scratch: &mut [BandValue]) -> Result<()> {
        let fid = feature.fid;
        let Some(geometry) = feature.geometry.as_ref() else {
            debug!(fid, "feature without geometry");
            return Ok(());
        };
        if !geometry
            .coords_iter()
            .all(|coord| coord.x.is_finite() && coord.y.is_finite())
        {
            return Err(TraverseError::NonFiniteCoordinate);
        }

        let buffered: Geometry<f64>;
        let geometry = match &self.config.buffer {
            None => geometry,
            Some(params) => {
                let (distance, quadrant_segments) = params.resolve(feature)?;
                match buffer_geometry(geometry, distance, quadrant_segments) {
                    Some(result) => {
                        buffered = result;
                        &buffered
                    }
                    None => {
                        debug!(fid, distance, "empty buffer result");
                        return Ok(());
                    }
                }
            }
        };

        let Some(intersection) = intersect_footprint(geometry, &self.grid.footprint()) else {
            debug!(fid, "no intersection with the raster");
            return Ok(());
        };
        let kind = GeometryKind::of(&intersection)
            .ok_or(TraverseError::UnsupportedGeometry("intersection"))?;
        self.summary.num_intersecting_features += 1;
        self.summary.record_kind(kind);
        debug!(fid, kind = kind.name(), "intersection found");

        for observer in self.observers.iter_mut() {
            observer.intersection_found(feature);
        }

        self.pixset.clear();
        let dispatched = {
            let mut sink = PixelDispatch {
                grid: &self.grid,
                pixset: &mut self.pixset,
                observers: &mut self.observers,
                rasters: &self.rasters,
                band_values: if self.needs_band_values {
                    Some(scratch)
                } else {
                    None
                },
                processed: &mut self.summary.num_processed_pixels,
            };
            Dispatcher::new(&self.config.polygon, &mut self.summary.polygons)
                .dispatch(&intersection, &mut sink)
        };
        match dispatched {
            Ok(()) => {}
            Err(err) if err.is_recoverable() => self.record_failure(fid, &err),
            Err(err) => return Err(err),
        }

        for observer in self.observers.iter_mut() {
            observer.intersection_end(feature);
        }
        Ok(())
    }
}

/// Pixel sink of a running traversal: filters, reads band values and
/// fans each new pixel out to the observers.
struct PixelDispatch<'t, 'a> {
    grid: &'t GridSpec,
    pixset: &'t mut PixelSet,
    observers: &'t mut [&'a mut dyn Observer],
    rasters: &'t [&'a dyn RasterSource],
    band_values: Option<&'t mut [BandValue]>,
    processed: &'t mut u64,
}

impl PixelSink for PixelDispatch<'_, '_> {
    fn grid(&self) -> &GridSpec {
        self.grid
    }

    fn pixel_found(&mut self, pixel: Pixel) -> Result<()> {
        if !self.grid.contains(pixel) || self.pixset.contains(pixel) {
            return Ok(());
        }
        let (x, y) = self.grid.to_grid_xy(pixel);
        let band_values = match self.band_values.as_deref_mut() {
            Some(values) => {
                read_band_values(self.rasters, pixel, values)?;
                Some(&*values)
            }
            None => None,
        };
        let event = TraversalEvent {
            pixel,
            x,
            y,
            band_values,
        };
        for observer in self.observers.iter_mut() {
            observer.add_pixel(&event);
        }
        self.pixset.insert(pixel);
        *self.processed += 1;
        Ok(())
    }
}

/// Fill `values` with the bands of every raster at `pixel`, raster
/// after raster.
fn read_band_values(rasters: &[&dyn RasterSource], pixel: Pixel, values: &mut [BandValue]) -> Result<()> {
    let (col, row) = (pixel.col as usize, pixel.row as usize);
    let mut offset = 0;
    for raster in rasters {
        let count = raster.band_types().len();
        let slots = values
            .get_mut(offset..offset + count)
            .ok_or_else(|| TraverseError::RasterRead {
                col: pixel.col,
                row: pixel.row,
                reason: "band buffer too small".to_string(),
            })?;
        raster.read_pixel(col, row, slots)?;
        offset += count;
    }
    Ok(())
}

/// Finest progress step, in percent or features.
const MIN_PROGRESS_STEP: f64 = 0.01;

/// Logs the share of features processed every `step` percent. Without
/// a known total, logs every `step` features instead.
struct Progress {
    total: Option<usize>,
    step: f64,
    done: usize,
    next: f64,
}

impl Progress {
    fn new(total: Option<usize>, step: f64) -> Self {
        let step = if step.is_finite() && step > 0. {
            step.max(MIN_PROGRESS_STEP)
        } else {
            10.
        };
        Progress {
            total,
            step,
            done: 0,
            next: step,
        }
    }

    fn advance(&mut self) {
        self.done += 1;
        let position = match self.total {
            Some(0) => return,
            Some(total) => 100. * self.done as f64 / total as f64,
            None => self.done as f64,
        };
        if position >= self.next {
            match self.total {
                Some(_) => info!(percent = position.floor(), features = self.done, "progress"),
                None => info!(features = self.done, "progress"),
            }
            self.next = ((position / self.step).floor() + 1.) * self.step;
        }
    }

    fn complete(self) {
        info!(features = self.done, "progress: done");
    }
}
