use std::fmt;

use euclid::{Transform2D, UnknownUnit};
use geo::{Coord, Polygon, Rect};

use crate::{Result, TraverseError};

/// Affine transform that describes how to convert between world-space
/// coordinates and (continuous) pixel coordinates.
pub type Transform = Transform2D<f64, UnknownUnit, UnknownUnit>;

/// A 0-based pixel location, with `(0, 0)` denoting the upper left
/// pixel of the grid.
///
/// Pixels are ordered column first, then row. Coordinates are signed
/// because geometry can produce candidates that fall outside the grid;
/// those are dropped before anybody sees them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pixel {
    pub col: i64,
    pub row: i64,
}

impl Pixel {
    pub fn new(col: i64, row: i64) -> Self {
        Pixel { col, row }
    }
}

impl fmt::Display for Pixel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.col, self.row)
    }
}

/// The pixel grid of a raster: origin, opposite corner, signed pixel
/// size and dimensions.
///
/// The sign of the pixel size encodes the direction of each axis; for
/// the usual north-up image `pix_y_size` is negative so rows grow
/// southwards.
///
/// ```rust
/// # use geo_traverse::{GridSpec, Pixel};
/// let grid = GridSpec::new(0., 10., 1., -1., 10, 10);
/// assert_eq!(grid.to_col_row(5.5, 5.5), Pixel::new(5, 4));
/// assert_eq!(grid.to_grid_xy(Pixel::new(5, 4)), (5., 6.));
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridSpec {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
    pix_x_size: f64,
    pix_y_size: f64,
    width: usize,
    height: usize,
}

impl GridSpec {
    pub fn new(
        x0: f64,
        y0: f64,
        pix_x_size: f64,
        pix_y_size: f64,
        width: usize,
        height: usize,
    ) -> Self {
        GridSpec {
            x0,
            y0,
            x1: x0 + width as f64 * pix_x_size,
            y1: y0 + height as f64 * pix_y_size,
            pix_x_size,
            pix_y_size,
            width,
            height,
        }
    }

    /// Build a grid from a GDAL style geotransform
    /// `[x0, pix_x_size, 0, y0, 0, pix_y_size]`. Rotated or sheared
    /// grids are not supported.
    pub fn from_geo_transform(geo_transform: [f64; 6], width: usize, height: usize) -> Result<Self> {
        let [x0, pix_x_size, row_rotation, y0, col_rotation, pix_y_size] = geo_transform;
        if !geo_transform.iter().all(|param| param.is_finite()) {
            return Err(TraverseError::NonFiniteCoordinate);
        }
        if row_rotation != 0. || col_rotation != 0. {
            return Err(TraverseError::RotatedGrid);
        }
        if pix_x_size == 0. || pix_y_size == 0. {
            return Err(TraverseError::ZeroPixelSize);
        }
        Ok(GridSpec::new(x0, y0, pix_x_size, pix_y_size, width, height))
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn origin(&self) -> (f64, f64) {
        (self.x0, self.y0)
    }

    pub fn opposite_corner(&self) -> (f64, f64) {
        (self.x1, self.y1)
    }

    pub fn pixel_size(&self) -> (f64, f64) {
        (self.pix_x_size, self.pix_y_size)
    }

    /// Area covered by one pixel, always positive.
    pub fn pixel_area(&self) -> f64 {
        (self.pix_x_size * self.pix_y_size).abs()
    }

    /// The pixel containing `(x, y)`.
    pub fn to_col_row(&self, x: f64, y: f64) -> Pixel {
        Pixel {
            col: ((x - self.x0) / self.pix_x_size).floor() as i64,
            row: ((y - self.y0) / self.pix_y_size).floor() as i64,
        }
    }

    /// The geographic origin of `pixel`. Only an exact inverse of
    /// [to_col_row][GridSpec::to_col_row] at grid aligned points.
    pub fn to_grid_xy(&self, pixel: Pixel) -> (f64, f64) {
        (
            self.x0 + pixel.col as f64 * self.pix_x_size,
            self.y0 + pixel.row as f64 * self.pix_y_size,
        )
    }

    /// Snap an arbitrary location to the origin of its pixel.
    pub fn xy_to_grid_xy(&self, x: f64, y: f64) -> (f64, f64) {
        self.to_grid_xy(self.to_col_row(x, y))
    }

    pub fn contains(&self, pixel: Pixel) -> bool {
        pixel.col >= 0
            && pixel.row >= 0
            && (pixel.col as u64) < self.width as u64
            && (pixel.row as u64) < self.height as u64
    }

    /// Transform from world space to continuous pixel space, where
    /// pixel `(col, row)` covers `[col, col+1) x [row, row+1)`.
    pub fn geo_to_pix(&self) -> Transform {
        Transform::translation(-self.x0, -self.y0)
            .then_scale(1. / self.pix_x_size, 1. / self.pix_y_size)
    }

    /// Inverse of [geo_to_pix][GridSpec::geo_to_pix].
    pub fn pix_to_geo(&self) -> Transform {
        Transform::scale(self.pix_x_size, self.pix_y_size).then_translate(euclid::vec2(self.x0, self.y0))
    }

    /// The raster footprint as an axis aligned rectangle.
    pub fn footprint(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.x0,
                y: self.y0,
            },
            Coord {
                x: self.x1,
                y: self.y1,
            },
        )
    }

    /// The raster footprint as a polygon, following the corners in
    /// the order (x0,y0), (x1,y0), (x1,y1), (x0,y1).
    pub fn footprint_polygon(&self) -> Polygon<f64> {
        Polygon::new(
            vec![
                (self.x0, self.y0),
                (self.x1, self.y0),
                (self.x1, self.y1),
                (self.x0, self.y1),
                (self.x0, self.y0),
            ]
            .into(),
            vec![],
        )
    }

    /// Check that `other` describes exactly the same grid. The
    /// comparison is exact on purpose: all rasters of one traversal
    /// share a single pixel addressing scheme.
    pub fn check_matches(&self, other: &GridSpec) -> Result<()> {
        if self.width != other.width || self.height != other.height {
            return Err(TraverseError::GridMismatch(format!(
                "different number of lines/cols: {}x{} vs {}x{}",
                self.width, self.height, other.width, other.height
            )));
        }
        if self.x0 != other.x0 || self.y0 != other.y0 || self.x1 != other.x1 || self.y1 != other.y1
        {
            return Err(TraverseError::GridMismatch(
                "different geographic location".to_string(),
            ));
        }
        if self.pix_x_size != other.pix_x_size || self.pix_y_size != other.pix_y_size {
            return Err(TraverseError::GridMismatch(
                "different pixel size".to_string(),
            ));
        }
        Ok(())
    }
}
