use geo::{
    Area, BooleanOps, BoundingRect, Geometry, GeometryCollection, LineString, MultiLineString,
    MultiPoint, MultiPolygon, Point, Polygon, Rect,
};

use crate::polygonize_ring;

/// The part of `geometry` that falls inside `footprint`, or `None`
/// when they do not intersect.
///
/// Points on the footprint boundary are kept. Linear and polygonal
/// results are normalized: a single surviving piece is returned as a
/// `LineString` or `Polygon`, several as their multi counterpart.
/// `Line`, `Rect` and `Triangle` come back as linestrings and
/// polygons.
pub fn intersect_footprint(geometry: &Geometry<f64>, footprint: &Rect<f64>) -> Option<Geometry<f64>> {
    match geometry {
        Geometry::Point(point) => clip_point(point, footprint).map(Geometry::Point),
        Geometry::MultiPoint(points) => {
            let mut kept: Vec<Point<f64>> = points
                .iter()
                .filter_map(|point| clip_point(point, footprint))
                .collect();
            match kept.len() {
                0 => None,
                1 => kept.pop().map(Geometry::Point),
                _ => Some(Geometry::MultiPoint(MultiPoint::new(kept))),
            }
        }
        Geometry::Line(line) => clip_lines(
            MultiLineString::new(vec![LineString::new(vec![line.start, line.end])]),
            footprint,
        ),
        Geometry::LineString(line_string) => {
            clip_lines(MultiLineString::new(vec![line_string.clone()]), footprint)
        }
        Geometry::MultiLineString(line_strings) => clip_lines(line_strings.clone(), footprint),
        Geometry::Polygon(polygon) => {
            clip_polygons(MultiPolygon::new(vec![polygon.clone()]), footprint)
        }
        Geometry::MultiPolygon(polygons) => clip_polygons(polygons.clone(), footprint),
        Geometry::Rect(rect) => clip_polygons(MultiPolygon::new(vec![rect.to_polygon()]), footprint),
        Geometry::Triangle(triangle) => {
            clip_polygons(MultiPolygon::new(vec![triangle.to_polygon()]), footprint)
        }
        Geometry::GeometryCollection(collection) => {
            let mut kept: Vec<Geometry<f64>> = collection
                .iter()
                .filter_map(|member| intersect_footprint(member, footprint))
                .collect();
            match kept.len() {
                0 => None,
                1 => kept.pop(),
                _ => Some(Geometry::GeometryCollection(GeometryCollection::new_from(kept))),
            }
        }
    }
}

fn clip_point(point: &Point<f64>, footprint: &Rect<f64>) -> Option<Point<f64>> {
    let (min, max) = (footprint.min(), footprint.max());
    let inside = point.x() >= min.x && point.x() <= max.x && point.y() >= min.y && point.y() <= max.y;
    inside.then_some(*point)
}

fn envelope_relation(bounds: &Rect<f64>, footprint: &Rect<f64>) -> Envelope {
    let (min, max) = (footprint.min(), footprint.max());
    if bounds.max().x < min.x || bounds.min().x > max.x || bounds.max().y < min.y || bounds.min().y > max.y {
        Envelope::Disjoint
    } else if bounds.min().x >= min.x
        && bounds.max().x <= max.x
        && bounds.min().y >= min.y
        && bounds.max().y <= max.y
    {
        Envelope::Inside
    } else {
        Envelope::Overlapping
    }
}

enum Envelope {
    Disjoint,
    Inside,
    Overlapping,
}

fn clip_lines(lines: MultiLineString<f64>, footprint: &Rect<f64>) -> Option<Geometry<f64>> {
    let clipped = match envelope_relation(&lines.bounding_rect()?, footprint) {
        Envelope::Disjoint => return None,
        Envelope::Inside => lines,
        Envelope::Overlapping => footprint.to_polygon().clip(&lines, false),
    };
    let mut pieces: Vec<LineString<f64>> = clipped
        .0
        .into_iter()
        .filter(|piece| !piece.0.is_empty())
        .collect();
    match pieces.len() {
        0 => None,
        1 => pieces.pop().map(Geometry::LineString),
        _ => Some(Geometry::MultiLineString(MultiLineString::new(pieces))),
    }
}

fn clip_polygons(polygons: MultiPolygon<f64>, footprint: &Rect<f64>) -> Option<Geometry<f64>> {
    let mut pieces: Vec<Polygon<f64>> = match envelope_relation(&polygons.bounding_rect()?, footprint) {
        Envelope::Disjoint => return None,
        // Self-intersecting rings may have no net area; keep them for
        // repair unless nothing can be rebuilt from them.
        Envelope::Inside => polygons
            .0
            .into_iter()
            .filter(|piece| {
                piece.unsigned_area() > 0. || !polygonize_ring(piece.exterior()).is_empty()
            })
            .collect(),
        Envelope::Overlapping => polygons
            .intersection(&MultiPolygon::new(vec![footprint.to_polygon()]))
            .0
            .into_iter()
            .filter(|piece| piece.unsigned_area() > 0.)
            .collect(),
    };
    match pieces.len() {
        0 => None,
        1 => pieces.pop().map(Geometry::Polygon),
        _ => Some(Geometry::MultiPolygon(MultiPolygon::new(pieces))),
    }
}
