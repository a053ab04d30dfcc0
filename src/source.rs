use std::collections::BTreeMap;
use std::fmt;

use geo::{BoundingRect, Geometry, Intersects, Rect};
use ndarray::Array2;
use num_traits::NumCast;

use crate::{GridSpec, Pixel, Result, TraverseError};

/// An attribute value of a vector feature.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Real(f64),
    String(String),
}

impl FieldValue {
    /// The value as a number; strings are parsed.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Real(v) => Some(*v),
            FieldValue::String(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            FieldValue::Real(v) => NumCast::from(v.trunc()),
            FieldValue::String(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Real(v) => write!(f, "{}", v),
            FieldValue::String(s) => f.write_str(s),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Real(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

/// One record of a vector datasource.
#[derive(Clone, Debug, PartialEq)]
pub struct Feature {
    pub fid: i64,
    pub geometry: Option<Geometry<f64>>,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Feature {
    pub fn new(fid: i64, geometry: Geometry<f64>) -> Self {
        Feature {
            fid,
            geometry: Some(geometry),
            fields: BTreeMap::new(),
        }
    }

    pub fn without_geometry(fid: i64) -> Self {
        Feature {
            fid,
            geometry: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

/// A readable, single-layer vector datasource.
///
/// Reading is sequential: [reset_reading][VectorSource::reset_reading]
/// rewinds and [next_feature][VectorSource::next_feature] yields the
/// features that pass the current spatial filter, in storage order.
pub trait VectorSource {
    fn name(&self) -> &str;

    fn layer_count(&self) -> usize {
        1
    }

    /// Well known text or any other description of the coordinate
    /// system, if the datasource declares one.
    fn spatial_reference(&self) -> Option<&str> {
        None
    }

    fn reset_reading(&mut self);

    fn next_feature(&mut self) -> Option<Feature>;

    /// Random access by FID. Ignores the spatial filter.
    fn feature(&mut self, fid: i64) -> Option<Feature>;

    /// Number of features passing the spatial filter, when cheap to
    /// know.
    fn feature_count(&self) -> Option<usize> {
        None
    }

    /// Restrict sequential reading to features whose envelope
    /// intersects `filter`; `None` removes the restriction.
    fn set_spatial_filter(&mut self, filter: Option<Rect<f64>>);

    /// Continue sequential reading up to the first feature whose
    /// `name` field, formatted as text, equals `value`. Reading stops
    /// at the first feature lacking the field.
    fn find_by_field(&mut self, name: &str, value: &str) -> Option<Feature> {
        while let Some(feature) = self.next_feature() {
            match feature.field(name) {
                None => return None,
                Some(field) if field.to_string() == value => return Some(feature),
                Some(_) => {}
            }
        }
        None
    }
}

/// An in-memory [VectorSource].
#[derive(Clone, Debug, Default)]
pub struct MemoryVector {
    name: String,
    layers: Vec<Vec<Feature>>,
    spatial_reference: Option<String>,
    filter: Option<Rect<f64>>,
    cursor: usize,
}

impl MemoryVector {
    pub fn new(name: &str) -> Self {
        MemoryVector {
            name: name.to_string(),
            layers: vec![Vec::new()],
            ..MemoryVector::default()
        }
    }

    pub fn with_spatial_reference(mut self, srs: &str) -> Self {
        self.spatial_reference = Some(srs.to_string());
        self
    }

    /// Append to the first layer.
    pub fn push(&mut self, feature: Feature) {
        if self.layers.is_empty() {
            self.layers.push(Vec::new());
        }
        self.layers[0].push(feature);
    }

    pub fn add_layer(&mut self, features: Vec<Feature>) {
        self.layers.push(features);
    }

    fn features(&self) -> &[Feature] {
        self.layers.first().map(Vec::as_slice).unwrap_or(&[])
    }

    fn passes_filter(&self, feature: &Feature) -> bool {
        match (&self.filter, &feature.geometry) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(filter), Some(geometry)) => geometry
                .bounding_rect()
                .map(|bounds| bounds.intersects(filter))
                .unwrap_or(false),
        }
    }
}

impl VectorSource for MemoryVector {
    fn name(&self) -> &str {
        &self.name
    }

    fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn spatial_reference(&self) -> Option<&str> {
        self.spatial_reference.as_deref()
    }

    fn reset_reading(&mut self) {
        self.cursor = 0;
    }

    fn next_feature(&mut self) -> Option<Feature> {
        while self.cursor < self.features().len() {
            let index = self.cursor;
            self.cursor += 1;
            let feature = &self.features()[index];
            if self.passes_filter(feature) {
                return Some(feature.clone());
            }
        }
        None
    }

    fn feature(&mut self, fid: i64) -> Option<Feature> {
        self.features().iter().find(|f| f.fid == fid).cloned()
    }

    fn feature_count(&self) -> Option<usize> {
        Some(self.features().iter().filter(|f| self.passes_filter(f)).count())
    }

    fn set_spatial_filter(&mut self, filter: Option<Rect<f64>>) {
        self.filter = filter;
    }
}

/// Storage type of a raster band.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BandType {
    U8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
}

impl BandType {
    pub fn size_bytes(&self) -> usize {
        match self {
            BandType::U8 => 1,
            BandType::U16 | BandType::I16 => 2,
            BandType::U32 | BandType::I32 | BandType::F32 => 4,
            BandType::F64 => 8,
        }
    }
}

/// One band value of one pixel, in the band's storage type.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BandValue {
    U8(u8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    F32(f32),
    F64(f64),
}

impl BandValue {
    pub fn zero(band_type: BandType) -> Self {
        match band_type {
            BandType::U8 => BandValue::U8(0),
            BandType::U16 => BandValue::U16(0),
            BandType::I16 => BandValue::I16(0),
            BandType::U32 => BandValue::U32(0),
            BandType::I32 => BandValue::I32(0),
            BandType::F32 => BandValue::F32(0.),
            BandType::F64 => BandValue::F64(0.),
        }
    }

    /// Convert `value` to `band_type`, or `None` if it is out of range.
    pub fn cast(band_type: BandType, value: f64) -> Option<Self> {
        Some(match band_type {
            BandType::U8 => BandValue::U8(NumCast::from(value)?),
            BandType::U16 => BandValue::U16(NumCast::from(value)?),
            BandType::I16 => BandValue::I16(NumCast::from(value)?),
            BandType::U32 => BandValue::U32(NumCast::from(value)?),
            BandType::I32 => BandValue::I32(NumCast::from(value)?),
            BandType::F32 => BandValue::F32(value as f32),
            BandType::F64 => BandValue::F64(value),
        })
    }

    pub fn band_type(&self) -> BandType {
        match self {
            BandValue::U8(_) => BandType::U8,
            BandValue::U16(_) => BandType::U16,
            BandValue::I16(_) => BandType::I16,
            BandValue::U32(_) => BandType::U32,
            BandValue::I32(_) => BandType::I32,
            BandValue::F32(_) => BandType::F32,
            BandValue::F64(_) => BandType::F64,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            BandValue::U8(v) => v.into(),
            BandValue::U16(v) => v.into(),
            BandValue::I16(v) => v.into(),
            BandValue::U32(v) => v.into(),
            BandValue::I32(v) => v.into(),
            BandValue::F32(v) => v.into(),
            BandValue::F64(v) => v,
        }
    }
}

/// A raster dataset whose bands all share one grid.
pub trait RasterSource {
    fn grid(&self) -> GridSpec;

    fn band_types(&self) -> &[BandType];

    /// Read the value of every band at `(col, row)` into `values`,
    /// which holds exactly one slot per band.
    fn read_pixel(&self, col: usize, row: usize, values: &mut [BandValue]) -> Result<()>;
}

/// An in-memory [RasterSource] with one `height x width` array per
/// band.
#[derive(Clone, Debug)]
pub struct MemoryRaster {
    grid: GridSpec,
    band_types: Vec<BandType>,
    bands: Vec<Array2<f64>>,
}

impl MemoryRaster {
    pub fn new(grid: GridSpec) -> Self {
        MemoryRaster {
            grid,
            band_types: Vec::new(),
            bands: Vec::new(),
        }
    }

    /// One band per entry of `band_types`, every pixel set to `value`.
    pub fn filled(grid: GridSpec, band_types: &[BandType], value: f64) -> Self {
        MemoryRaster {
            grid,
            band_types: band_types.to_vec(),
            bands: band_types
                .iter()
                .map(|_| Array2::from_elem((grid.height(), grid.width()), value))
                .collect(),
        }
    }

    /// Add a band; `values` is indexed by `(row, col)`.
    pub fn with_band(mut self, band_type: BandType, values: Array2<f64>) -> Result<Self> {
        let expected = (self.grid.height(), self.grid.width());
        if values.dim() != expected {
            return Err(TraverseError::GridMismatch(format!(
                "band is {}x{}, grid is {}x{}",
                values.ncols(),
                values.nrows(),
                expected.1,
                expected.0
            )));
        }
        self.band_types.push(band_type);
        self.bands.push(values);
        Ok(self)
    }
}

impl RasterSource for MemoryRaster {
    fn grid(&self) -> GridSpec {
        self.grid
    }

    fn band_types(&self) -> &[BandType] {
        &self.band_types
    }

    fn read_pixel(&self, col: usize, row: usize, values: &mut [BandValue]) -> Result<()> {
        let read_error = |reason: &str| TraverseError::RasterRead {
            col: col as i64,
            row: row as i64,
            reason: reason.to_string(),
        };
        if values.len() != self.bands.len() {
            return Err(read_error("band count mismatch"));
        }
        if !self.grid.contains(Pixel::new(col as i64, row as i64)) {
            return Err(read_error("outside the raster"));
        }
        for ((slot, band), band_type) in values.iter_mut().zip(&self.bands).zip(&self.band_types) {
            *slot = BandValue::cast(*band_type, band[(row, col)])
                .ok_or_else(|| read_error("value not representable in band type"))?;
        }
        Ok(())
    }
}
