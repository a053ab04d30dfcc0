//! Polygon validity and repair.
//!
//! A polygon is considered valid when every ring is a simple closed
//! curve (no self crossings, no self touches, no spikes) enclosing a
//! non-zero area, and no two rings cross. Invalid single-ring
//! polygons are repaired by splitting the ring at every crossing and
//! rebuilding the faces of the resulting planar graph.

use std::collections::{HashMap, HashSet};
use std::iter::once;

use geo::{
    line_intersection::{line_intersection, LineIntersection},
    Area, Contains, Coord, Line, LineString, Point, Polygon,
};
use itertools::Itertools;

/// Whether `polygon` can be rasterized as is.
pub fn is_valid_polygon(polygon: &Polygon<f64>) -> bool {
    let rings: Vec<Vec<Line<f64>>> = match once(polygon.exterior())
        .chain(polygon.interiors())
        .map(ring_edges)
        .collect::<Option<Vec<_>>>()
    {
        Some(rings) => rings,
        None => return false,
    };

    if rings.iter().any(|edges| !is_simple_ring(edges)) {
        return false;
    }
    if polygon.unsigned_area() <= 0. {
        return false;
    }
    !rings
        .iter()
        .tuple_combinations()
        .any(|(a, b)| rings_cross(a, b))
}

/// Edges of a closed ring with repeated consecutive vertices dropped,
/// or `None` if the ring is open or has fewer than three edges.
fn ring_edges(ring: &LineString<f64>) -> Option<Vec<Line<f64>>> {
    if ring.0.len() < 4 || ring.0.first() != ring.0.last() {
        return None;
    }
    let mut coords: Vec<Coord<f64>> = ring.0.clone();
    coords.dedup();
    if coords.len() < 4 {
        return None;
    }
    Some(
        coords
            .iter()
            .tuple_windows()
            .map(|(a, b)| Line::new(*a, *b))
            .collect(),
    )
}

fn is_simple_ring(edges: &[Line<f64>]) -> bool {
    if edges
        .iter()
        .any(|e| !(e.start.x.is_finite() && e.start.y.is_finite()))
    {
        return false;
    }
    let count = edges.len();
    for (i, j) in overlapping_pairs(edges) {
        let adjacent = j == i + 1 || (i == 0 && j == count - 1);
        match line_intersection(edges[i], edges[j]) {
            None => {}
            // Neighbours always share their common vertex; anything
            // more means the ring doubles back on itself.
            Some(LineIntersection::SinglePoint { .. }) if adjacent => {}
            Some(_) => return false,
        }
    }
    true
}

fn rings_cross(a: &[Line<f64>], b: &[Line<f64>]) -> bool {
    let split = a.len();
    let edges: Vec<Line<f64>> = a.iter().chain(b).copied().collect();
    overlapping_pairs(&edges)
        .into_iter()
        .filter(|&(i, j)| i < split && j >= split)
        .any(|(i, j)| match line_intersection(edges[i], edges[j]) {
            Some(LineIntersection::SinglePoint { is_proper, .. }) => is_proper,
            Some(LineIntersection::Collinear { .. }) => true,
            None => false,
        })
}

/// Index pairs `(i, j)` with `i < j` of segments whose envelopes
/// overlap, found by sweeping along x.
fn overlapping_pairs(segments: &[Line<f64>]) -> Vec<(usize, usize)> {
    let envelope = |line: &Line<f64>| {
        (
            line.start.x.min(line.end.x),
            line.start.x.max(line.end.x),
            line.start.y.min(line.end.y),
            line.start.y.max(line.end.y),
        )
    };
    let envelopes: Vec<_> = segments.iter().map(envelope).collect();
    let mut order: Vec<usize> = (0..segments.len()).collect();
    order.sort_by(|&a, &b| envelopes[a].0.total_cmp(&envelopes[b].0));

    let mut pairs = Vec::new();
    for (k, &a) in order.iter().enumerate() {
        let (_, max_x, min_y, max_y) = envelopes[a];
        for &b in &order[k + 1..] {
            let other = envelopes[b];
            if other.0 > max_x {
                break;
            }
            if other.2 <= max_y && other.3 >= min_y {
                pairs.push((a.min(b), a.max(b)));
            }
        }
    }
    pairs
}

/// Split a (possibly self-crossing) ring into the valid polygons
/// enclosed by it.
///
/// The ring is noded at every crossing and overlap. Dangling edges
/// and edges with the same face on both sides are discarded; every
/// remaining counter-clockwise face becomes a polygon, and clockwise
/// faces nested in one of them become its holes. An empty result
/// means nothing could be recovered.
pub fn polygonize_ring(ring: &LineString<f64>) -> Vec<Polygon<f64>> {
    let mut graph = PlanarGraph::from_segments(&node_segments(ring));
    graph.remove_dangles();
    let faces = loop {
        let faces = graph.faces();
        if !graph.remove_cut_edges(&faces) {
            break faces;
        }
        graph.remove_dangles();
    };
    graph.assemble(&faces)
}

/// Segments of `ring`, split at every point where they meet another
/// segment.
fn node_segments(ring: &LineString<f64>) -> Vec<Line<f64>> {
    let segments: Vec<Line<f64>> = ring
        .lines()
        .filter(|line| line.start != line.end)
        .filter(|line| {
            [line.start, line.end]
                .iter()
                .all(|c| c.x.is_finite() && c.y.is_finite())
        })
        .collect();

    let mut splits: Vec<Vec<Coord<f64>>> = vec![Vec::new(); segments.len()];
    for (i, j) in overlapping_pairs(&segments) {
        match line_intersection(segments[i], segments[j]) {
            Some(LineIntersection::SinglePoint { intersection, .. }) => {
                splits[i].push(intersection);
                splits[j].push(intersection);
            }
            Some(LineIntersection::Collinear { .. }) => {
                let (a, b) = (segments[i], segments[j]);
                splits[i].extend([b.start, b.end].into_iter().filter(|c| spans(&a, c)));
                splits[j].extend([a.start, a.end].into_iter().filter(|c| spans(&b, c)));
            }
            None => {}
        }
    }

    let mut noded = Vec::new();
    for (segment, mut points) in segments.into_iter().zip(splits) {
        let delta = segment.delta();
        let along = |c: &Coord<f64>| (c.x - segment.start.x) * delta.x + (c.y - segment.start.y) * delta.y;
        points.push(segment.start);
        points.push(segment.end);
        points.sort_by(|a, b| along(a).total_cmp(&along(b)));
        points.dedup();
        noded.extend(
            points
                .iter()
                .tuple_windows()
                .map(|(a, b)| Line::new(*a, *b)),
        );
    }
    noded
}

/// Whether `c`, known to be collinear with `segment`, lies on it.
fn spans(segment: &Line<f64>, c: &Coord<f64>) -> bool {
    let delta = segment.delta();
    let t = (c.x - segment.start.x) * delta.x + (c.y - segment.start.y) * delta.y;
    t >= 0. && t <= delta.x * delta.x + delta.y * delta.y
}

fn coord_key(c: Coord<f64>) -> (u64, u64) {
    // -0.0 and 0.0 denote the same node
    ((c.x + 0.).to_bits(), (c.y + 0.).to_bits())
}

/// Undirected planar graph. Edge `e` is traversed as half edge `2e`
/// from `from` to `to` and as half edge `2e + 1` in reverse.
struct PlanarGraph {
    nodes: Vec<Coord<f64>>,
    edges: Vec<(usize, usize)>,
    alive: Vec<bool>,
}

impl PlanarGraph {
    fn from_segments(segments: &[Line<f64>]) -> Self {
        let mut ids: HashMap<(u64, u64), usize> = HashMap::new();
        let mut nodes = Vec::new();
        let mut node = |c: Coord<f64>| {
            *ids.entry(coord_key(c)).or_insert_with(|| {
                nodes.push(c);
                nodes.len() - 1
            })
        };

        let mut seen = HashSet::new();
        let mut edges = Vec::new();
        for segment in segments {
            let (a, b) = (node(segment.start), node(segment.end));
            if a != b && seen.insert((a.min(b), a.max(b))) {
                edges.push((a, b));
            }
        }
        let alive = vec![true; edges.len()];
        PlanarGraph { nodes, edges, alive }
    }

    fn degrees(&self) -> Vec<usize> {
        let mut degrees = vec![0; self.nodes.len()];
        for (edge, &(a, b)) in self.edges.iter().enumerate() {
            if self.alive[edge] {
                degrees[a] += 1;
                degrees[b] += 1;
            }
        }
        degrees
    }

    /// Drop edges ending at a node of degree one until none is left.
    fn remove_dangles(&mut self) {
        loop {
            let degrees = self.degrees();
            let mut removed = false;
            for (edge, &(a, b)) in self.edges.iter().enumerate() {
                if self.alive[edge] && (degrees[a] == 1 || degrees[b] == 1) {
                    self.alive[edge] = false;
                    removed = true;
                }
            }
            if !removed {
                return;
            }
        }
    }

    fn half_edge_ends(&self, half_edge: usize) -> (usize, usize) {
        let (a, b) = self.edges[half_edge / 2];
        if half_edge % 2 == 0 {
            (a, b)
        } else {
            (b, a)
        }
    }

    fn angle(&self, half_edge: usize) -> f64 {
        let (from, to) = self.half_edge_ends(half_edge);
        let (p, q) = (self.nodes[from], self.nodes[to]);
        (q.y - p.y).atan2(q.x - p.x)
    }

    /// Trace the faces of the live edges. Each face is the list of
    /// half edges around it; bounded faces come out counter-clockwise.
    fn faces(&self) -> Vec<Vec<usize>> {
        let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for edge in (0..self.edges.len()).filter(|&e| self.alive[e]) {
            for half_edge in [2 * edge, 2 * edge + 1] {
                outgoing[self.half_edge_ends(half_edge).0].push(half_edge);
            }
        }
        let mut position = vec![0; 2 * self.edges.len()];
        for around in outgoing.iter_mut() {
            around.sort_by(|&a, &b| self.angle(a).total_cmp(&self.angle(b)));
            for (k, &half_edge) in around.iter().enumerate() {
                position[half_edge] = k;
            }
        }

        // Arriving along `h`, leave along the edge clockwise from its twin.
        let next = |half_edge: usize| {
            let twin = half_edge ^ 1;
            let around = &outgoing[self.half_edge_ends(twin).0];
            around[(position[twin] + around.len() - 1) % around.len()]
        };

        let mut visited = vec![false; 2 * self.edges.len()];
        let mut faces = Vec::new();
        for start in (0..2 * self.edges.len()).filter(|&h| self.alive[h / 2]) {
            if visited[start] {
                continue;
            }
            let mut face = Vec::new();
            let mut half_edge = start;
            while !visited[half_edge] {
                visited[half_edge] = true;
                face.push(half_edge);
                half_edge = next(half_edge);
            }
            faces.push(face);
        }
        faces
    }

    /// Drop edges that have the same face on both sides. Returns
    /// whether anything was removed.
    fn remove_cut_edges(&mut self, faces: &[Vec<usize>]) -> bool {
        let mut face_of = vec![usize::MAX; 2 * self.edges.len()];
        for (id, face) in faces.iter().enumerate() {
            for &half_edge in face {
                face_of[half_edge] = id;
            }
        }
        let mut removed = false;
        for edge in 0..self.edges.len() {
            if self.alive[edge] && face_of[2 * edge] == face_of[2 * edge + 1] {
                self.alive[edge] = false;
                removed = true;
            }
        }
        removed
    }

    fn face_ring(&self, face: &[usize]) -> LineString<f64> {
        let mut coords: Vec<Coord<f64>> = face
            .iter()
            .map(|&half_edge| self.nodes[self.half_edge_ends(half_edge).0])
            .collect();
        if let Some(&first) = coords.first() {
            coords.push(first);
        }
        LineString::new(coords)
    }

    /// Counter-clockwise faces become shells; every clockwise face is
    /// given as a hole to the smallest shell containing it.
    fn assemble(&self, faces: &[Vec<usize>]) -> Vec<Polygon<f64>> {
        let rings: Vec<(LineString<f64>, f64)> = faces
            .iter()
            .map(|face| {
                let ring = self.face_ring(face);
                let area = signed_ring_area(&ring);
                (ring, area)
            })
            .collect();

        let mut shells: Vec<(Polygon<f64>, f64, Vec<LineString<f64>>)> = rings
            .iter()
            .filter(|(_, area)| *area > 0.)
            .map(|(ring, area)| (Polygon::new(ring.clone(), vec![]), *area, Vec::new()))
            .collect();

        for (ring, area) in &rings {
            if *area >= 0. {
                continue;
            }
            let Some(&probe) = ring.0.first() else {
                continue;
            };
            let owner = shells
                .iter_mut()
                .filter(|(shell, _, _)| shell.contains(&Point::from(probe)))
                .min_by(|a, b| a.1.total_cmp(&b.1));
            if let Some((_, _, holes)) = owner {
                holes.push(ring.clone());
            }
        }

        shells
            .into_iter()
            .map(|(shell, _, holes)| {
                let (exterior, _) = shell.into_inner();
                Polygon::new(exterior, holes)
            })
            .collect()
    }
}

fn signed_ring_area(ring: &LineString<f64>) -> f64 {
    ring.0
        .iter()
        .tuple_windows()
        .map(|(a, b)| a.x * b.y - b.x * a.y)
        .sum::<f64>()
        / 2.
}
