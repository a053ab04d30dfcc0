use std::collections::BTreeSet;

use geo::{Coord, Geometry, LineString, Point, Polygon};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use crate::tests::utils::{grid10, vector_of};
use crate::{
    rasterize_geometry, Feature, Pixel, PixelCollector, PolygonAlgorithm, PolygonOptions,
    Traverser, TraverserConfig,
};

// the grid is 10x10 over [0, 10]; shapes spill over by up to 8 units

#[rustfmt::skip]
prop_compose! {
    fn arb_point()(x in -3.0..13., y in -3.0..13.) -> Point<f64> {
	Point::new(x, y)
    }
}

#[rustfmt::skip]
prop_compose! {
    fn arb_linestring()(points in prop::collection::vec(arb_point(), 2..12)) -> LineString<f64> {
	points.into()
    }
}

// Vertices at increasing angles around the center, so the ring never
// crosses itself.
#[rustfmt::skip]
prop_compose! {
    fn arb_star()(center in arb_point(),
		  spokes in prop::collection::vec((0.1..0.9f64, 0.5..8.0f64), 3..14)) -> Polygon<f64> {
	let n = spokes.len() as f64;
	let points: Vec<Coord<f64>> = spokes
	    .iter()
	    .enumerate()
	    .map(|(idx, (jitter, radius))| {
		let angle = 2.0 * std::f64::consts::PI * (idx as f64 + jitter) / n;
		let (sin, cos) = angle.sin_cos();
		Coord { x: center.x() + radius * cos, y: center.y() + radius * sin }
	    })
	    .collect();
	Polygon::new(LineString(points), vec![])
    }
}

fn arb_geo() -> impl Strategy<Value = Geometry<f64>> {
    prop_oneof![
        arb_point().prop_map(Geometry::Point),
        arb_linestring().prop_map(Geometry::LineString),
        arb_star().prop_map(Geometry::Polygon),
    ]
}

fn pixels_with(
    polygon: &Polygon<f64>,
    algorithm: PolygonAlgorithm,
    pixel_proportion: f64,
) -> BTreeSet<Pixel> {
    let options = PolygonOptions {
        pixel_proportion,
        algorithm,
        ..PolygonOptions::default()
    };
    rasterize_geometry(&grid10(), &Geometry::Polygon(polygon.clone()), &options)
        .unwrap()
        .into_iter()
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn quadtree_matches_brute_force(
        polygon in arb_star(),
        pixel_proportion in prop::sample::select(vec![0.0, 0.1, 0.25, 0.5, 0.75, 1.0]),
    ) {
        assert_eq!(
            pixels_with(&polygon, PolygonAlgorithm::Quadtree, pixel_proportion),
            pixels_with(&polygon, PolygonAlgorithm::BruteForce, pixel_proportion)
        );
    }

    #[test]
    fn higher_proportion_selects_fewer(polygon in arb_star(), low in 0.05..0.5f64, delta in 0.0..0.45f64) {
        let loose = pixels_with(&polygon, PolygonAlgorithm::Quadtree, low);
        let strict = pixels_with(&polygon, PolygonAlgorithm::Quadtree, low + delta);
        prop_assert!(strict.is_subset(&loose));
    }

    #[test]
    fn rasterizing_is_deterministic(geometry in arb_geo()) {
        let options = PolygonOptions::default();
        let first = rasterize_geometry(&grid10(), &geometry, &options).unwrap();
        let second = rasterize_geometry(&grid10(), &geometry, &options).unwrap();
        assert_eq!(&first, &second);
        let unique: BTreeSet<_> = first.iter().copied().collect();
        assert_eq!(unique.len(), first.len());
    }

    #[test]
    fn traversal_stays_in_grid(geometries in prop::collection::vec(arb_geo(), 1..6)) {
        let grid = grid10();
        let raster = crate::MemoryRaster::filled(grid, &[crate::BandType::F32], 0.);
        let features = geometries
            .into_iter()
            .enumerate()
            .map(|(fid, geometry)| Feature::new(fid as i64, geometry))
            .collect();
        let mut vector = vector_of(features);
        let mut collector = PixelCollector::locations_only();
        let summary = Traverser::builder()
            .vector(&mut vector)
            .raster(&raster)
            .observer(&mut collector)
            .config(TraverserConfig::default())
            .build()
            .unwrap()
            .traverse()
            .unwrap();

        let mut total = 0;
        for feature in collector.features() {
            let unique: BTreeSet<_> = feature.pixels.iter().copied().collect();
            prop_assert_eq!(unique.len(), feature.pixels.len());
            prop_assert!(feature.pixels.iter().all(|pixel| grid.contains(*pixel)));
            prop_assert!(feature.band_values.is_empty());
            total += feature.pixels.len() as u64;
        }
        prop_assert_eq!(summary.num_processed_pixels, total);
        prop_assert_eq!(summary.num_failed_features, 0);
    }
}
