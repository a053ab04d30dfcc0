use geo::{Area, BooleanOps, BoundingRect, MultiPolygon, Polygon, Rect};
use itertools::Itertools;
use tracing::{debug, warn};

use crate::{is_valid_polygon, polygonize_ring, GridSpec, Pixel, PixelSink, Result};

/// How polygon coverage is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolygonAlgorithm {
    /// Clip the polygon against every pixel of its envelope.
    BruteForce,

    /// Clip against recursively subdivided blocks of pixels, accepting
    /// or discarding whole blocks when their coverage settles the
    /// question. Selects the same pixels as `BruteForce` for every
    /// pixel proportion.
    Quadtree,
}

impl Default for PolygonAlgorithm {
    fn default() -> Self {
        PolygonAlgorithm::Quadtree
    }
}

/// Knobs of the polygon rasterizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolygonOptions {
    /// Minimum fraction of a pixel's area the polygon has to cover for
    /// the pixel to be selected. Must lie in `[0, 1]`.
    pub pixel_proportion: f64,
    pub algorithm: PolygonAlgorithm,
    /// Count invalid polygons but do not attempt to repair them.
    pub skip_invalid: bool,
    /// Log the full geometry of every invalid polygon found.
    pub dump_invalid: bool,
}

impl Default for PolygonOptions {
    fn default() -> Self {
        PolygonOptions {
            pixel_proportion: 0.5,
            algorithm: PolygonAlgorithm::default(),
            skip_invalid: false,
            dump_invalid: false,
        }
    }
}

/// Running counts of invalid polygons and what became of them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolygonStats {
    pub num_invalid: u64,
    /// Invalid polygons left alone because they have holes.
    pub num_with_interior_ring: u64,
    /// Invalid polygons successfully split into valid pieces.
    pub num_exploded: u64,
    /// Total pieces produced by those splits.
    pub num_sub_polygons: u64,
}

/// A block of pixels: `cols` x `rows` pixels with `(col, row)` as the
/// upper left one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub col: i64,
    pub row: i64,
    pub cols: i64,
    pub rows: i64,
}

impl PixelRect {
    pub fn new(col: i64, row: i64, cols: i64, rows: i64) -> Self {
        PixelRect {
            col,
            row,
            cols,
            rows,
        }
    }

    /// Smallest block holding every pixel touched by `bounds`.
    pub fn covering(grid: &GridSpec, bounds: &Rect<f64>) -> Self {
        let a = grid.to_col_row(bounds.min().x, bounds.min().y);
        let b = grid.to_col_row(bounds.max().x, bounds.max().y);
        let (col0, col1) = (a.col.min(b.col), a.col.max(b.col));
        let (row0, row1) = (a.row.min(b.row), a.row.max(b.row));
        PixelRect::new(col0, row0, col1 - col0 + 1, row1 - row0 + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.cols <= 0 || self.rows <= 0
    }

    pub fn is_single_pixel(&self) -> bool {
        self.cols == 1 && self.rows == 1
    }

    pub fn pixel_count(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.cols * self.rows
        }
    }

    /// Geographic area covered by the block.
    pub fn area(&self, grid: &GridSpec) -> f64 {
        self.pixel_count() as f64 * grid.pixel_area()
    }

    /// The four quadrants of the block: upper left, upper right, lower
    /// left, lower right. The lower right quadrant takes the odd column
    /// and row, so a single pixel is its own lower right quadrant.
    pub fn quadrants(&self) -> [PixelRect; 4] {
        let half_cols = self.cols / 2;
        let half_rows = self.rows / 2;
        [
            PixelRect::new(self.col, self.row, half_cols, half_rows),
            PixelRect::new(self.col + half_cols, self.row, self.cols - half_cols, half_rows),
            PixelRect::new(self.col, self.row + half_rows, half_cols, self.rows - half_rows),
            PixelRect::new(
                self.col + half_cols,
                self.row + half_rows,
                self.cols - half_cols,
                self.rows - half_rows,
            ),
        ]
    }

    /// Pixels of the block, row by row.
    pub fn pixels(&self) -> impl Iterator<Item = Pixel> {
        let (col, cols) = (self.col, self.cols.max(0));
        (self.row..self.row + self.rows.max(0))
            .cartesian_product(col..col + cols)
            .map(|(row, col)| Pixel::new(col, row))
    }

    pub fn to_polygon(&self, grid: &GridSpec) -> Polygon<f64> {
        let (x0, y0) = grid.to_grid_xy(Pixel::new(self.col, self.row));
        let (x1, y1) = grid.to_grid_xy(Pixel::new(self.col + self.cols, self.row + self.rows));
        Rect::new((x0, y0), (x1, y1)).to_polygon()
    }
}

/// Area thresholds derived from the pixel proportion. All comparisons
/// are tolerant by `epsilon` in favour of selecting pixels.
#[derive(Debug, Clone, Copy)]
struct Coverage {
    /// Covered area needed to select one pixel.
    threshold: f64,
    /// Area a block may miss and still be selected as a whole.
    slack: f64,
    epsilon: f64,
}

impl Coverage {
    fn new(grid: &GridSpec, pixel_proportion: f64) -> Self {
        let pixel_area = grid.pixel_area();
        Coverage {
            threshold: pixel_proportion * pixel_area,
            slack: if pixel_proportion > 0. {
                (1. - pixel_proportion) * pixel_area
            } else {
                0.
            },
            epsilon: 1e-6 * pixel_area,
        }
    }

    fn selects_pixel(&self, covered: f64) -> bool {
        covered > 0. && covered + self.epsilon >= self.threshold
    }

    fn selects_block(&self, covered: f64, block_area: f64) -> bool {
        covered + self.epsilon >= block_area - self.slack
    }

    fn rejects_block(&self, covered: f64) -> bool {
        covered + self.epsilon < self.threshold
    }
}

/// Report every pixel of `sink`'s grid that `polygon` covers by at
/// least the configured proportion.
///
/// Invalid polygons are repaired first: the exterior ring is noded and
/// polygonized and every resulting piece is rasterized on its own.
/// Invalid polygons with holes are counted and skipped.
pub(crate) fn rasterize_polygon<S>(
    polygon: &Polygon<f64>,
    options: &PolygonOptions,
    stats: &mut PolygonStats,
    sink: &mut S,
) -> Result<()>
where
    S: PixelSink + ?Sized,
{
    if is_valid_polygon(polygon) {
        return rasterize_valid_polygon(polygon, options, sink);
    }

    stats.num_invalid += 1;
    if options.dump_invalid {
        warn!(?polygon, "invalid polygon");
    }
    if options.skip_invalid {
        debug!("skipping invalid polygon");
        return Ok(());
    }
    if !polygon.interiors().is_empty() {
        stats.num_with_interior_ring += 1;
        warn!(
            interior_rings = polygon.interiors().len(),
            "invalid polygon with interior rings not processed"
        );
        return Ok(());
    }

    let pieces = polygonize_ring(polygon.exterior());
    if pieces.is_empty() {
        warn!("could not explode invalid polygon");
        return Ok(());
    }
    stats.num_exploded += 1;
    stats.num_sub_polygons += pieces.len() as u64;
    debug!(sub_polygons = pieces.len(), "invalid polygon exploded");

    for piece in &pieces {
        rasterize_valid_polygon(piece, options, sink)?;
    }
    Ok(())
}

fn rasterize_valid_polygon<S>(polygon: &Polygon<f64>, options: &PolygonOptions, sink: &mut S) -> Result<()>
where
    S: PixelSink + ?Sized,
{
    let grid = *sink.grid();
    let Some(bounds) = polygon.bounding_rect() else {
        return Ok(());
    };
    let envelope = PixelRect::covering(&grid, &bounds);
    let coverage = Coverage::new(&grid, options.pixel_proportion);

    match options.algorithm {
        PolygonAlgorithm::BruteForce => brute_force(polygon, &grid, envelope, &coverage, sink),
        PolygonAlgorithm::Quadtree => {
            let fragment = MultiPolygon::new(vec![polygon.clone()]);
            quadtree(&fragment, &grid, envelope, &coverage, sink)
        }
    }
}

fn brute_force<S>(
    polygon: &Polygon<f64>,
    grid: &GridSpec,
    envelope: PixelRect,
    coverage: &Coverage,
    sink: &mut S,
) -> Result<()>
where
    S: PixelSink + ?Sized,
{
    for pixel in envelope.pixels() {
        let cell = PixelRect::new(pixel.col, pixel.row, 1, 1).to_polygon(grid);
        let covered = polygon.intersection(&cell).unsigned_area();
        if coverage.selects_pixel(covered) {
            sink.pixel_found(pixel)?;
        }
    }
    Ok(())
}

/// One step of the subdivision: `fragment` is the part of the polygon
/// that falls inside `rect`.
fn quadtree<S>(
    fragment: &MultiPolygon<f64>,
    grid: &GridSpec,
    rect: PixelRect,
    coverage: &Coverage,
    sink: &mut S,
) -> Result<()>
where
    S: PixelSink + ?Sized,
{
    if rect.is_empty() {
        return Ok(());
    }
    let covered = fragment.unsigned_area();
    if covered <= 0. {
        return Ok(());
    }
    let rect_area = rect.area(grid);
    if covered > rect_area + coverage.epsilon {
        warn!(covered, rect_area, "fragment larger than its block, ignored");
        return Ok(());
    }

    if rect.is_single_pixel() {
        if coverage.selects_pixel(covered) {
            sink.pixel_found(Pixel::new(rect.col, rect.row))?;
        }
        return Ok(());
    }
    if coverage.selects_block(covered, rect_area) {
        for pixel in rect.pixels() {
            sink.pixel_found(pixel)?;
        }
        return Ok(());
    }
    if coverage.rejects_block(covered) {
        return Ok(());
    }

    for quadrant in rect.quadrants() {
        if quadrant.is_empty() {
            continue;
        }
        let clip = MultiPolygon::new(vec![quadrant.to_polygon(grid)]);
        let part = fragment.intersection(&clip);
        if !part.0.is_empty() {
            quadtree(&part, grid, quadrant, coverage, sink)?;
        }
    }
    Ok(())
}
