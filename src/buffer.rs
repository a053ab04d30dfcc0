use std::f64::consts::PI;
use std::str::FromStr;

use geo::{BooleanOps, Coord, Geometry, Line, LineString, MultiPolygon, Polygon};

use crate::{Feature, Result, TraverseError};

/// A buffer parameter: either a literal number or `@name`, the name
/// of a numeric field read from each feature.
#[derive(Clone, Debug, PartialEq)]
pub enum BufferValue {
    Literal(f64),
    Attribute(String),
}

impl BufferValue {
    pub fn resolve(&self, feature: &Feature) -> Result<f64> {
        match self {
            BufferValue::Literal(value) => Ok(*value),
            BufferValue::Attribute(name) => feature
                .field(name)
                .ok_or_else(|| TraverseError::MissingAttribute(name.clone()))?
                .as_real()
                .ok_or_else(|| TraverseError::InvalidBufferParameter(format!("@{}", name))),
        }
    }
}

impl FromStr for BufferValue {
    type Err = TraverseError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.strip_prefix('@') {
            Some("") => Err(TraverseError::InvalidBufferParameter(s.to_string())),
            Some(name) => Ok(BufferValue::Attribute(name.to_string())),
            None => s
                .parse()
                .map(BufferValue::Literal)
                .map_err(|_| TraverseError::InvalidBufferParameter(s.to_string())),
        }
    }
}

/// Buffer distance and the number of segments used to approximate a
/// quarter circle, applied to every feature before rasterization.
#[derive(Clone, Debug, PartialEq)]
pub struct BufferParams {
    pub distance: BufferValue,
    pub quadrant_segments: BufferValue,
}

impl BufferParams {
    pub fn new(distance: BufferValue, quadrant_segments: BufferValue) -> Self {
        BufferParams {
            distance,
            quadrant_segments,
        }
    }

    /// Parse both parameters, e.g. `("10", "@segs")`.
    pub fn parse(distance: &str, quadrant_segments: &str) -> Result<Self> {
        Ok(BufferParams::new(distance.parse()?, quadrant_segments.parse()?))
    }

    /// The distance and quadrant segment count for `feature`.
    pub fn resolve(&self, feature: &Feature) -> Result<(f64, u32)> {
        let distance = self.distance.resolve(feature)?;
        if !distance.is_finite() {
            return Err(TraverseError::InvalidBufferParameter(distance.to_string()));
        }
        let segments = self.quadrant_segments.resolve(feature)?;
        if !segments.is_finite() {
            return Err(TraverseError::InvalidBufferParameter(segments.to_string()));
        }
        Ok((distance, segments.clamp(1., 1024.) as u32))
    }
}

/// Grow (positive `distance`) or shrink (negative) `geometry`.
///
/// Every edge is swept into a rectangle and every vertex into a
/// regular polygon with `4 * quadrant_segments` sides; the union of
/// those pieces is added to, or cut from, the polygonal parts of the
/// geometry. Points and lines only grow. Returns `None` when nothing
/// is left.
pub fn buffer_geometry(geometry: &Geometry<f64>, distance: f64, quadrant_segments: u32) -> Option<Geometry<f64>> {
    let mut parts = Parts::default();
    parts.collect(geometry);

    let base = union_all(parts.polygons);
    let result = if distance == 0. {
        base
    } else {
        let radius = distance.abs();
        let sides = 4 * quadrant_segments.max(1);
        let sweep = union_all(
            parts
                .edges
                .iter()
                .filter_map(|edge| edge_rectangle(edge, radius))
                .chain(parts.vertices.iter().map(|vertex| disc(*vertex, radius, sides)))
                .collect(),
        );
        if distance > 0. {
            base.union(&sweep)
        } else {
            base.difference(&sweep)
        }
    };

    let mut polygons = result.0;
    match polygons.len() {
        0 => None,
        1 => polygons.pop().map(Geometry::Polygon),
        _ => Some(Geometry::MultiPolygon(MultiPolygon::new(polygons))),
    }
}

#[derive(Default)]
struct Parts {
    polygons: Vec<Polygon<f64>>,
    edges: Vec<Line<f64>>,
    vertices: Vec<Coord<f64>>,
}

impl Parts {
    fn collect(&mut self, geometry: &Geometry<f64>) {
        match geometry {
            Geometry::Point(point) => self.vertices.push(point.0),
            Geometry::MultiPoint(points) => self.vertices.extend(points.iter().map(|p| p.0)),
            Geometry::Line(line) => self.line_string(&LineString::new(vec![line.start, line.end])),
            Geometry::LineString(line_string) => self.line_string(line_string),
            Geometry::MultiLineString(line_strings) => {
                line_strings.iter().for_each(|ls| self.line_string(ls))
            }
            Geometry::Polygon(polygon) => self.polygon(polygon.clone()),
            Geometry::MultiPolygon(polygons) => {
                polygons.iter().for_each(|p| self.polygon(p.clone()))
            }
            Geometry::Rect(rect) => self.polygon(rect.to_polygon()),
            Geometry::Triangle(triangle) => self.polygon(triangle.to_polygon()),
            Geometry::GeometryCollection(collection) => {
                collection.iter().for_each(|member| self.collect(member))
            }
        }
    }

    fn line_string(&mut self, line_string: &LineString<f64>) {
        self.edges.extend(line_string.lines());
        self.vertices.extend(line_string.coords().copied());
    }

    fn polygon(&mut self, polygon: Polygon<f64>) {
        self.line_string(polygon.exterior());
        for interior in polygon.interiors() {
            self.line_string(interior);
        }
        self.polygons.push(polygon);
    }
}

fn union_all(polygons: Vec<Polygon<f64>>) -> MultiPolygon<f64> {
    polygons
        .into_iter()
        .fold(MultiPolygon::new(vec![]), |acc, polygon| {
            acc.union(&MultiPolygon::new(vec![polygon]))
        })
}

fn edge_rectangle(edge: &Line<f64>, radius: f64) -> Option<Polygon<f64>> {
    let delta = edge.delta();
    let length = delta.x.hypot(delta.y);
    if length == 0. {
        return None;
    }
    let offset = Coord {
        x: -delta.y / length * radius,
        y: delta.x / length * radius,
    };
    Some(Polygon::new(
        LineString::new(vec![
            edge.start + offset,
            edge.end + offset,
            edge.end - offset,
            edge.start - offset,
        ]),
        vec![],
    ))
}

fn disc(center: Coord<f64>, radius: f64, sides: u32) -> Polygon<f64> {
    let step = 2. * PI / sides as f64;
    Polygon::new(
        (0..sides)
            .map(|k| {
                let angle = k as f64 * step;
                Coord {
                    x: center.x + radius * angle.cos(),
                    y: center.y + radius * angle.sin(),
                }
            })
            .collect::<Vec<_>>()
            .into(),
        vec![],
    )
}
