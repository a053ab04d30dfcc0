use geo::{Geometry, LineString, Point, Polygon};
use itertools::Itertools;

use crate::{
    intersect_footprint, poly::rasterize_polygon, GridSpec, LineRasterizer, Pixel, PixelSet, PolygonOptions,
    PolygonStats, Result, TraverseError,
};

/// Receiver of the pixels discovered by the rasterizers.
///
/// Rasterizers may report the same pixel more than once, and may
/// report pixels outside the grid; sinks are expected to drop both.
pub trait PixelSink {
    /// The grid pixels are expressed in.
    fn grid(&self) -> &GridSpec;

    /// A candidate pixel has been found.
    fn pixel_found(&mut self, pixel: Pixel) -> Result<()>;
}

/// A [PixelSink] that keeps every distinct in-grid pixel, in the order
/// they were first found.
#[derive(Clone, Debug)]
pub struct PixelAccumulator {
    grid: GridSpec,
    visited: PixelSet,
    pixels: Vec<Pixel>,
}

impl PixelAccumulator {
    pub fn new(grid: GridSpec) -> Self {
        PixelAccumulator {
            grid,
            visited: PixelSet::new(),
            pixels: Vec::new(),
        }
    }

    pub fn pixels(&self) -> &[Pixel] {
        &self.pixels
    }

    pub fn visited(&self) -> &PixelSet {
        &self.visited
    }

    pub fn into_pixels(self) -> Vec<Pixel> {
        self.pixels
    }
}

impl PixelSink for PixelAccumulator {
    fn grid(&self) -> &GridSpec {
        &self.grid
    }

    fn pixel_found(&mut self, pixel: Pixel) -> Result<()> {
        if self.grid.contains(pixel) && self.visited.insert(pixel) {
            self.pixels.push(pixel);
        }
        Ok(())
    }
}

/// The kinds of geometry the traversal knows how to rasterize.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GeometryKind {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
    GeometryCollection,
}

impl GeometryKind {
    /// The kind of `geometry`, or `None` for the `geo` types that have
    /// no counterpart here (`Line`, `Rect` and `Triangle`).
    pub fn of(geometry: &Geometry<f64>) -> Option<Self> {
        match geometry {
            Geometry::Point(_) => Some(GeometryKind::Point),
            Geometry::MultiPoint(_) => Some(GeometryKind::MultiPoint),
            Geometry::LineString(_) => Some(GeometryKind::LineString),
            Geometry::MultiLineString(_) => Some(GeometryKind::MultiLineString),
            Geometry::Polygon(_) => Some(GeometryKind::Polygon),
            Geometry::MultiPolygon(_) => Some(GeometryKind::MultiPolygon),
            Geometry::GeometryCollection(_) => Some(GeometryKind::GeometryCollection),
            Geometry::Line(_) | Geometry::Rect(_) | Geometry::Triangle(_) => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            GeometryKind::Point => "Point",
            GeometryKind::MultiPoint => "MultiPoint",
            GeometryKind::LineString => "LineString",
            GeometryKind::MultiLineString => "MultiLineString",
            GeometryKind::Polygon => "Polygon",
            GeometryKind::MultiPolygon => "MultiPolygon",
            GeometryKind::GeometryCollection => "GeometryCollection",
        }
    }
}

/// Routes each piece of a geometry to the rasterizer for its kind.
///
/// Points go straight to their containing pixel, linestrings through
/// the [LineRasterizer] one segment at a time, polygons through the
/// polygon rasterizer; collections are walked member by member.
pub struct Dispatcher<'a> {
    options: &'a PolygonOptions,
    stats: &'a mut PolygonStats,
}

impl<'a> Dispatcher<'a> {
    pub fn new(options: &'a PolygonOptions, stats: &'a mut PolygonStats) -> Self {
        Dispatcher { options, stats }
    }

    pub fn dispatch<S>(&mut self, geometry: &Geometry<f64>, sink: &mut S) -> Result<()>
    where
        S: PixelSink + ?Sized,
    {
        match geometry {
            Geometry::Point(point) => point_pixel(point, sink),
            Geometry::MultiPoint(points) => points.iter().try_for_each(|point| point_pixel(point, sink)),
            Geometry::LineString(line_string) => line_string_pixels(line_string, sink),
            Geometry::MultiLineString(line_strings) => line_strings
                .iter()
                .try_for_each(|line_string| line_string_pixels(line_string, sink)),
            Geometry::Polygon(polygon) => self.polygon(polygon, sink),
            Geometry::MultiPolygon(polygons) => {
                for polygon in polygons {
                    self.polygon(polygon, sink)?;
                }
                Ok(())
            }
            Geometry::GeometryCollection(collection) => {
                for member in collection {
                    self.dispatch(member, sink)?;
                }
                Ok(())
            }
            Geometry::Line(_) => Err(TraverseError::UnsupportedGeometry("Line")),
            Geometry::Rect(_) => Err(TraverseError::UnsupportedGeometry("Rect")),
            Geometry::Triangle(_) => Err(TraverseError::UnsupportedGeometry("Triangle")),
        }
    }

    fn polygon<S>(&mut self, polygon: &Polygon<f64>, sink: &mut S) -> Result<()>
    where
        S: PixelSink + ?Sized,
    {
        rasterize_polygon(polygon, self.options, self.stats, sink)
    }
}

fn point_pixel<S>(point: &Point<f64>, sink: &mut S) -> Result<()>
where
    S: PixelSink + ?Sized,
{
    let pixel = sink.grid().to_col_row(point.x(), point.y());
    sink.pixel_found(pixel)
}

fn line_string_pixels<S>(line_string: &LineString<f64>, sink: &mut S) -> Result<()>
where
    S: PixelSink + ?Sized,
{
    let rasterizer = LineRasterizer::new(sink.grid());
    line_string
        .0
        .iter()
        .tuple_windows()
        .try_for_each(|(start, end)| rasterizer.line(*start, *end, sink))
}

/// Rasterize one geometry on `grid` without running a traversal and
/// return the distinct in-grid pixels in discovery order. The geometry
/// is first cut to the grid footprint, like in a traversal.
///
/// ```rust
/// # fn main() -> geo_traverse::Result<()> {
/// use geo::{Geometry, Point};
/// use geo_traverse::{rasterize_geometry, GridSpec, Pixel, PolygonOptions};
///
/// let grid = GridSpec::new(0., 10., 1., -1., 10, 10);
/// let pixels = rasterize_geometry(&grid, &Geometry::Point(Point::new(2.5, 7.5)), &PolygonOptions::default())?;
/// assert_eq!(pixels, vec![Pixel::new(2, 2)]);
/// # Ok(())}
/// ```
pub fn rasterize_geometry(
    grid: &GridSpec,
    geometry: &Geometry<f64>,
    options: &PolygonOptions,
) -> Result<Vec<Pixel>> {
    let Some(clipped) = intersect_footprint(geometry, &grid.footprint()) else {
        return Ok(Vec::new());
    };
    let mut sink = PixelAccumulator::new(*grid);
    let mut stats = PolygonStats::default();
    Dispatcher::new(options, &mut stats).dispatch(&clipped, &mut sink)?;
    Ok(sink.into_pixels())
}
