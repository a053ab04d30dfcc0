use euclid::point2;
use geo::Coord;

use crate::{GridSpec, Pixel, PixelSink, Result, Transform};

const SUBPIXEL_SHIFT: u32 = 8;
const SUBPIXEL_SCALE: f64 = (1 << SUBPIXEL_SHIFT) as f64;

/// Pixel-space location to 8-bit sub-pixel fixed point.
fn to_int(v: f64) -> i64 {
    (SUBPIXEL_SCALE * v).floor() as i64
}

/// Sub-pixel fixed point back to the pixel index.
fn line_lr(v: i64) -> i64 {
    v >> SUBPIXEL_SHIFT
}

/// Integer interpolator that spreads the rounding error of `y1 -> y2`
/// evenly over `count` steps.
#[derive(Debug, Clone)]
struct Dda2Interpolator {
    cnt: i64,
    lft: i64,
    rem: i64,
    modulo: i64,
    y: i64,
}

impl Dda2Interpolator {
    fn forward(y1: i64, y2: i64, count: i64) -> Self {
        let cnt = count.max(1);
        let mut lft = (y2 - y1) / cnt;
        let mut rem = (y2 - y1) % cnt;
        let mut modulo = rem;
        if modulo <= 0 {
            modulo += count;
            rem += count;
            lft -= 1;
        }
        modulo -= count;
        Dda2Interpolator {
            cnt,
            lft,
            rem,
            modulo,
            y: y1,
        }
    }

    fn inc(&mut self) {
        self.modulo += self.rem;
        self.y += self.lft;
        if self.modulo > 0 {
            self.modulo -= self.cnt;
            self.y += 1;
        }
    }
}

/// Bresenham interpolator working on sub-pixel coordinates: the major
/// axis advances one whole pixel per step while the minor axis keeps
/// its fractional accuracy.
struct BresenhamInterpolator {
    x1_lr: i64,
    y1_lr: i64,
    ver: bool,
    len: i64,
    inc: i64,
    interpolator: Dda2Interpolator,
}

impl BresenhamInterpolator {
    fn new(x1: i64, y1: i64, x2: i64, y2: i64) -> Self {
        let x1_lr = line_lr(x1);
        let y1_lr = line_lr(y1);
        let x2_lr = line_lr(x2);
        let y2_lr = line_lr(y2);

        let ver = (x2_lr - x1_lr).abs() < (y2_lr - y1_lr).abs();
        let (len, inc, interpolator) = if ver {
            let len = (y2_lr - y1_lr).abs();
            (len, if y2 > y1 { 1 } else { -1 }, Dda2Interpolator::forward(x1, x2, len))
        } else {
            let len = (x2_lr - x1_lr).abs();
            (len, if x2 > x1 { 1 } else { -1 }, Dda2Interpolator::forward(y1, y2, len))
        };

        BresenhamInterpolator {
            x1_lr,
            y1_lr,
            ver,
            len,
            inc,
            interpolator,
        }
    }

    fn hstep(&mut self) {
        self.interpolator.inc();
        self.x1_lr += self.inc;
    }

    fn vstep(&mut self) {
        self.interpolator.inc();
        self.y1_lr += self.inc;
    }

    fn minor(&self) -> i64 {
        line_lr(self.interpolator.y)
    }
}

/// Rasterizes line segments with sub-pixel accuracy.
///
/// Both endpoints are mapped into pixel space and then into 8-bit
/// fixed point before a Bresenham walk enumerates one pixel per step
/// along the dominant axis, both endpoint pixels included. Every
/// pixel is handed to a [PixelSink]; the sink is responsible for
/// bounds checking and for deduplicating pixels shared by consecutive
/// segments.
#[derive(Clone, Debug)]
pub struct LineRasterizer {
    geo_to_pix: Transform,
}

impl LineRasterizer {
    pub fn new(grid: &GridSpec) -> Self {
        LineRasterizer {
            geo_to_pix: grid.geo_to_pix(),
        }
    }

    fn to_subpixel(&self, coord: Coord<f64>) -> (i64, i64) {
        let p = self.geo_to_pix.transform_point(point2(coord.x, coord.y));
        (to_int(p.x), to_int(p.y))
    }

    /// Visit every pixel of the segment `start -> end`. A zero length
    /// segment visits exactly the pixel containing the point.
    pub fn line<S>(&self, start: Coord<f64>, end: Coord<f64>, sink: &mut S) -> Result<()>
    where
        S: PixelSink + ?Sized,
    {
        let (x1, y1) = self.to_subpixel(start);
        let (x2, y2) = self.to_subpixel(end);

        let mut li = BresenhamInterpolator::new(x1, y1, x2, y2);
        if li.len == 0 {
            return sink.pixel_found(Pixel::new(line_lr(x1), line_lr(y1)));
        }

        for _ in 0..=li.len {
            if li.ver {
                sink.pixel_found(Pixel::new(li.minor(), li.y1_lr))?;
                li.vstep();
            } else {
                sink.pixel_found(Pixel::new(li.x1_lr, li.minor()))?;
                li.hstep();
            }
        }
        Ok(())
    }
}
