use crate::*;
use anyhow::Result;
use geo::{line_string, point, polygon, Geometry, MultiPoint, Rect};
use ndarray::Array2;
use pretty_assertions::assert_eq;

pub mod utils;
use utils::{collect, grid10, rect_polygon, vector_of, EventLog};

fn polygon_feature(fid: i64, polygon: geo::Polygon<f64>) -> Feature {
    Feature::new(fid, Geometry::Polygon(polygon))
}

fn u8_raster() -> MemoryRaster {
    MemoryRaster::filled(grid10(), &[BandType::U8], 1.)
}

#[test]
fn unit_square_covers_the_whole_grid() -> Result<()> {
    for algorithm in [PolygonAlgorithm::Quadtree, PolygonAlgorithm::BruteForce] {
        let mut vector = vector_of(vec![polygon_feature(0, rect_polygon(0., 0., 10., 10.))]);
        let config = TraverserConfig {
            polygon: PolygonOptions {
                algorithm,
                ..PolygonOptions::default()
            },
            ..TraverserConfig::default()
        };
        let (summary, features) = collect(&mut vector, &[&u8_raster()], config)?;
        assert_eq!(summary.num_processed_pixels, 100);
        assert_eq!(summary.count(GeometryKind::Polygon), 1);
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].pixels.len(), 100);
    }
    Ok(())
}

#[test]
fn zero_length_line_selects_one_pixel() -> Result<()> {
    let line = line_string![(x: 5.5, y: 5.5), (x: 5.5, y: 5.5)];
    let mut vector = vector_of(vec![Feature::new(0, line.into())]);
    let (summary, features) = collect(&mut vector, &[&u8_raster()], TraverserConfig::default())?;
    assert_eq!(summary.count(GeometryKind::LineString), 1);
    assert_eq!(features[0].pixels, vec![Pixel::new(5, 4)]);
    Ok(())
}

#[test]
fn sub_threshold_polygon_selects_nothing() -> Result<()> {
    let mut vector = vector_of(vec![polygon_feature(0, rect_polygon(3.1, 3.1, 3.4, 3.4))]);
    let (summary, features) = collect(&mut vector, &[&u8_raster()], TraverserConfig::default())?;
    assert_eq!(summary.num_intersecting_features, 1);
    assert_eq!(summary.num_processed_pixels, 0);
    assert_eq!(features[0].pixels, vec![]);
    Ok(())
}

#[test]
fn shapes_outside_the_grid_are_cut() -> Result<()> {
    let mut vector = vector_of(vec![
        polygon_feature(0, rect_polygon(-20., -20., 30., 30.)),
        Feature::new(1, line_string![(x: -5., y: 0.5), (x: 15., y: 9.5)].into()),
        Feature::new(2, point!(x: 11., y: 5.).into()),
    ]);
    let (summary, features) = collect(&mut vector, &[&u8_raster()], TraverserConfig::default())?;
    assert_eq!(summary.num_intersecting_features, 2);
    assert_eq!(features[0].pixels.len(), 100);
    let grid = grid10();
    for feature in &features {
        assert!(feature.pixels.iter().all(|p| grid.contains(*p)));
    }
    Ok(())
}

#[test]
fn multipoint_pixels_are_not_repeated() -> Result<()> {
    let points = MultiPoint::new(vec![
        point!(x: 1.2, y: 1.2),
        point!(x: 1.7, y: 1.9),
        point!(x: 8.5, y: 8.5),
    ]);
    let mut vector = vector_of(vec![Feature::new(4, points.into())]);
    let (summary, features) = collect(&mut vector, &[&u8_raster()], TraverserConfig::default())?;
    assert_eq!(summary.num_processed_pixels, 2);
    assert_eq!(features[0].fid, 4);
    assert_eq!(features[0].pixels, vec![Pixel::new(1, 8), Pixel::new(8, 1)]);
    Ok(())
}

#[test]
fn bowtie_is_repaired_during_traversal() -> Result<()> {
    let bowtie = polygon![(x: 1., y: 1.), (x: 5., y: 5.), (x: 5., y: 1.), (x: 1., y: 5.)];
    let mut vector = vector_of(vec![polygon_feature(0, bowtie)]);
    let (summary, features) = collect(&mut vector, &[&u8_raster()], TraverserConfig::default())?;
    assert_eq!(summary.polygons.num_invalid, 1);
    assert_eq!(summary.polygons.num_exploded, 1);
    assert_eq!(summary.polygons.num_sub_polygons, 2);
    assert_eq!(summary.count(GeometryKind::Polygon), 1);
    // two triangles of area 4: two whole and four half pixels each
    assert_eq!(features[0].pixels.len(), 12);
    Ok(())
}

#[test]
fn band_values_follow_raster_order() -> Result<()> {
    let grid = grid10();
    let first = u8_raster();
    let second = MemoryRaster::new(grid)
        .with_band(
            BandType::I32,
            Array2::from_shape_fn((10, 10), |(row, col)| (10 * row + col) as f64),
        )?
        .with_band(BandType::F64, Array2::from_elem((10, 10), 0.25))?;
    let mut vector = vector_of(vec![polygon_feature(0, rect_polygon(2., 6., 3., 7.))]);
    let (_, features) = collect(&mut vector, &[&first, &second], TraverserConfig::default())?;
    assert_eq!(features[0].pixels, vec![Pixel::new(2, 3)]);
    assert_eq!(
        features[0].band_values,
        vec![vec![BandValue::U8(1), BandValue::I32(32), BandValue::F64(0.25)]]
    );
    Ok(())
}

#[test]
fn observers_see_events_in_order() -> Result<()> {
    let raster = u8_raster();
    let mut vector = vector_of(vec![
        Feature::new(7, point!(x: 0.5, y: 9.5).into()),
        Feature::new(8, point!(x: 50., y: 50.).into()),
        Feature::without_geometry(9),
        Feature::new(10, point!(x: 9.5, y: 0.5).into()),
    ]);
    let mut detailed = EventLog::default();
    let mut simple = EventLog::simple();
    Traverser::builder()
        .vector(&mut vector)
        .raster(&raster)
        .observer(&mut detailed)
        .observer(&mut simple)
        .build()?
        .traverse()?;

    let expected = [
        "init 1",
        "found 7",
        "pixel [0,0] 1",
        "end 7",
        "found 10",
        "pixel [9,9] 1",
        "end 10",
        "done",
    ];
    assert_eq!(detailed.events, expected);
    assert_eq!(simple.events, expected);
    Ok(())
}

#[test]
fn simple_observers_get_no_band_values() -> Result<()> {
    let raster = u8_raster();
    let mut vector = vector_of(vec![Feature::new(1, point!(x: 0.5, y: 0.5).into())]);
    let mut log = EventLog::simple();
    let mut traverser = Traverser::builder()
        .vector(&mut vector)
        .raster(&raster)
        .observer(&mut log)
        .build()?;
    traverser.traverse()?;
    drop(traverser);
    assert_eq!(log.events[2], "pixel [0,9] -");
    Ok(())
}

#[test]
fn traversals_are_repeatable() -> Result<()> {
    let shape = polygon![
        (x: 0.3, y: 0.2),
        (x: 9.1, y: 1.7),
        (x: 4.4, y: 4.9),
        (x: 8.8, y: 9.6),
        (x: 0.9, y: 7.3),
    ];
    let mut vector = vector_of(vec![polygon_feature(0, shape)]);
    let raster = u8_raster();
    let (first, first_pixels) = collect(&mut vector, &[&raster], TraverserConfig::default())?;
    let (second, second_pixels) = collect(&mut vector, &[&raster], TraverserConfig::default())?;
    assert_eq!(first, second);
    assert_eq!(first_pixels, second_pixels);

    let unique: PixelSet = first_pixels[0].pixels.iter().fold(PixelSet::new(), |mut set, p| {
        set.insert(*p);
        set
    });
    assert_eq!(unique.len(), first_pixels[0].pixels.len());
    assert_eq!(first.num_processed_pixels, unique.len() as u64);
    Ok(())
}

#[test]
fn spatial_filter_does_not_change_results() -> Result<()> {
    let features = vec![
        polygon_feature(0, rect_polygon(2., 2., 6., 5.)),
        polygon_feature(1, rect_polygon(20., 20., 26., 25.)),
        Feature::new(2, line_string![(x: -1., y: -1.), (x: 11., y: 11.)].into()),
    ];
    let raster = u8_raster();
    let mut vector = vector_of(features.clone());
    let filtered = collect(&mut vector, &[&raster], TraverserConfig::default())?;
    let mut vector = vector_of(features);
    let unfiltered = collect(
        &mut vector,
        &[&raster],
        TraverserConfig {
            spatial_filter: false,
            ..TraverserConfig::default()
        },
    )?;
    assert_eq!(filtered, unfiltered);
    Ok(())
}

#[test]
fn select_by_fid() -> Result<()> {
    let raster = u8_raster();
    let mut vector = vector_of(vec![
        polygon_feature(1, rect_polygon(0., 0., 2., 2.)),
        polygon_feature(2, rect_polygon(5., 5., 6., 6.)),
    ]);
    let (summary, features) = collect(
        &mut vector,
        &[&raster],
        TraverserConfig {
            selection: FeatureSelection::Fid(2),
            ..TraverserConfig::default()
        },
    )?;
    assert_eq!(summary.num_intersecting_features, 1);
    assert_eq!(features[0].fid, 2);
    assert_eq!(features[0].pixels, vec![Pixel::new(5, 4)]);
    Ok(())
}

#[test]
fn missing_fid_is_fatal_before_init() -> Result<()> {
    let raster = u8_raster();
    let mut vector = vector_of(vec![polygon_feature(1, rect_polygon(0., 0., 2., 2.))]);
    let mut log = EventLog::default();
    let result = Traverser::builder()
        .vector(&mut vector)
        .raster(&raster)
        .observer(&mut log)
        .fid(99)
        .build()?
        .traverse();
    assert_eq!(result, Err(TraverseError::FeatureNotFound(99)));
    assert!(log.events.is_empty());
    Ok(())
}

#[test]
fn select_by_field() -> Result<()> {
    let raster = u8_raster();
    let mut vector = vector_of(vec![
        polygon_feature(1, rect_polygon(0., 0., 2., 2.)).with_field("zone", "north"),
        polygon_feature(2, rect_polygon(5., 5., 6., 6.)).with_field("zone", "south"),
        polygon_feature(3, rect_polygon(7., 7., 8., 8.)).with_field("zone", "south"),
    ]);
    let config = TraverserConfig {
        selection: FeatureSelection::Field {
            name: "zone".to_string(),
            value: "south".to_string(),
        },
        ..TraverserConfig::default()
    };
    let (summary, features) = collect(&mut vector, &[&raster], config.clone())?;
    assert_eq!(summary.num_intersecting_features, 1);
    assert_eq!(features[0].fid, 2);

    let none = TraverserConfig {
        selection: FeatureSelection::Field {
            name: "zone".to_string(),
            value: "east".to_string(),
        },
        ..config
    };
    let (summary, features) = collect(&mut vector, &[&raster], none)?;
    assert_eq!(summary.num_intersecting_features, 0);
    assert_eq!(features, vec![]);
    Ok(())
}

#[test]
fn buffered_points_become_areas() -> Result<()> {
    let raster = u8_raster();
    let mut vector = vector_of(vec![Feature::new(0, point!(x: 5., y: 5.).into())]);
    let config = TraverserConfig {
        buffer: Some(BufferParams::parse("1.5", "8")?),
        ..TraverserConfig::default()
    };
    let (summary, features) = collect(&mut vector, &[&raster], config)?;
    assert_eq!(summary.count(GeometryKind::Polygon), 1);
    let pixels = &features[0].pixels;
    for core in [(4, 4), (4, 5), (5, 4), (5, 5)] {
        assert!(pixels.contains(&Pixel::new(core.0, core.1)));
    }
    assert!(pixels.len() >= 4 && pixels.len() <= 12);
    Ok(())
}

#[test]
fn buffers_reach_in_from_outside_the_raster() -> Result<()> {
    let raster = u8_raster();
    let outside = || vec![Feature::new(0, point!(x: 11., y: 5.).into()).with_field("radius", 3.)];
    let mut results = Vec::new();
    for (distance, spatial_filter) in [("3", true), ("3", false), ("@radius", true)] {
        let mut vector = vector_of(outside());
        let config = TraverserConfig {
            buffer: Some(BufferParams::parse(distance, "8")?),
            spatial_filter,
            ..TraverserConfig::default()
        };
        let (summary, features) = collect(&mut vector, &[&raster], config)?;
        assert_eq!(summary.num_intersecting_features, 1, "{} {}", distance, spatial_filter);
        assert!(!features[0].pixels.is_empty());
        results.push(features);
    }
    assert_eq!(results[0], results[1]);
    assert_eq!(results[0], results[2]);
    Ok(())
}

#[test]
fn missing_buffer_attribute_skips_the_feature() -> Result<()> {
    let raster = u8_raster();
    let mut vector = vector_of(vec![
        Feature::new(0, point!(x: 2., y: 2.).into()),
        Feature::new(1, point!(x: 7., y: 7.).into()).with_field("radius", 1.),
    ]);
    let config = TraverserConfig {
        buffer: Some(BufferParams::parse("@radius", "4")?),
        ..TraverserConfig::default()
    };
    let (summary, features) = collect(&mut vector, &[&raster], config)?;
    assert_eq!(summary.num_failed_features, 1);
    assert_eq!(summary.num_intersecting_features, 1);
    assert_eq!(features.len(), 1);
    assert_eq!(features[0].fid, 1);
    Ok(())
}

#[test]
fn non_finite_geometry_is_skipped() -> Result<()> {
    let raster = u8_raster();
    let mut vector = vector_of(vec![
        Feature::new(0, line_string![(x: 1., y: 1.), (x: f64::NAN, y: 2.)].into()),
        Feature::new(1, point!(x: 3.5, y: 3.5).into()),
    ]);
    let config = TraverserConfig {
        spatial_filter: false,
        ..TraverserConfig::default()
    };
    let (summary, features) = collect(&mut vector, &[&raster], config)?;
    assert_eq!(summary.num_failed_features, 1);
    assert_eq!(features.len(), 1);
    assert_eq!(features[0].pixels, vec![Pixel::new(3, 6)]);
    Ok(())
}

#[test]
fn builder_validation() -> Result<()> {
    let raster = u8_raster();
    let other = MemoryRaster::filled(GridSpec::new(0., 10., 2., -2., 5, 5), &[BandType::U8], 0.);
    let mut log = EventLog::default();

    let mut vector = vector_of(vec![]);
    let no_observers = Traverser::builder().vector(&mut vector).raster(&raster).build();
    assert!(matches!(no_observers, Err(TraverseError::NoObservers)));

    let no_rasters = Traverser::builder()
        .vector(&mut vector)
        .observer(&mut log)
        .build();
    assert!(matches!(no_rasters, Err(TraverseError::NoRasters)));

    let mismatch = Traverser::builder()
        .vector(&mut vector)
        .raster(&raster)
        .raster(&other)
        .observer(&mut log)
        .build();
    assert!(matches!(mismatch, Err(TraverseError::GridMismatch(_))));

    for pixel_proportion in [-0.1, 1.5, f64::NAN] {
        let invalid = Traverser::builder()
            .vector(&mut vector)
            .raster(&raster)
            .observer(&mut log)
            .pixel_proportion(pixel_proportion)
            .build();
        assert!(matches!(invalid, Err(TraverseError::InvalidPixelProportion(_))));
    }

    vector.add_layer(vec![]);
    let layers = Traverser::builder()
        .vector(&mut vector)
        .raster(&raster)
        .observer(&mut log)
        .build();
    assert!(matches!(layers, Err(TraverseError::MultipleLayers(2))));
    Ok(())
}

struct BrokenRaster;

impl RasterSource for BrokenRaster {
    fn grid(&self) -> GridSpec {
        grid10()
    }

    fn band_types(&self) -> &[BandType] {
        &[BandType::U8]
    }

    fn read_pixel(&self, col: usize, row: usize, _values: &mut [BandValue]) -> crate::Result<()> {
        Err(TraverseError::RasterRead {
            col: col as i64,
            row: row as i64,
            reason: "device unplugged".to_string(),
        })
    }
}

#[test]
fn raster_read_failure_aborts() -> Result<()> {
    let raster = BrokenRaster;
    let mut vector = vector_of(vec![Feature::new(0, point!(x: 1.5, y: 1.5).into())]);

    let mut detailed = EventLog::default();
    let result = Traverser::builder()
        .vector(&mut vector)
        .raster(&raster)
        .observer(&mut detailed)
        .build()?
        .traverse();
    assert!(matches!(result, Err(TraverseError::RasterRead { col: 1, row: 8, .. })));

    // locations only: the raster is never read
    let mut simple = EventLog::simple();
    let summary = Traverser::builder()
        .vector(&mut vector)
        .raster(&raster)
        .observer(&mut simple)
        .build()?
        .traverse()?;
    assert_eq!(summary.num_processed_pixels, 1);
    Ok(())
}

#[test]
fn footprint_and_bands_reported_at_init() -> Result<()> {
    let raster = MemoryRaster::filled(grid10(), &[BandType::U8, BandType::F32, BandType::I16], 0.);
    let mut vector = vector_of(vec![]);
    let mut log = EventLog::default();
    let traverser = Traverser::builder()
        .vector(&mut vector)
        .raster(&raster)
        .observer(&mut log)
        .build()?;
    let info = traverser.global_info();
    assert_eq!(info.bands.len(), 3);
    assert_eq!(info.bands[1].band_type, BandType::F32);
    assert_eq!(traverser.band_buffer_size(), 7);
    assert_eq!(
        geo::BoundingRect::bounding_rect(&info.raster_poly),
        Some(Rect::new((0., 0.), (10., 10.)))
    );
    Ok(())
}
