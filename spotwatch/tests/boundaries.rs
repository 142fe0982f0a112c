mod common;

use approx::assert_abs_diff_eq;
use common::{calibration_frame, pipeline_config, provider_with_night, workspace};
use ndarray::Array2;
use spotwatch::{
    crop_window, observation_path, write_observations, CentroidExtractor, DriftMeasurer,
    FitConfig, FrameObservation, MasterLedger, NightAggregator, NightManifest, NightRunner,
    ReferenceCatalog, SpotDescriptor, SpotwatchError, UtcJulianClock,
};
use test_helpers::night_timestamp;

fn catalog_of(n: usize) -> ReferenceCatalog {
    ReferenceCatalog::new(
        10,
        (0..n)
            .map(|i| SpotDescriptor::new(format!("s{i:03}"), 0, 0, 50.0, 50.0, 1000.0))
            .collect(),
    )
}

fn uniform_rows(n: usize, dx: f64, jd: f64) -> Vec<FrameObservation> {
    (0..n)
        .map(|i| FrameObservation {
            id: format!("s{i:03}"),
            centroid_x: 50.0 - dx,
            centroid_y: 50.0,
            dx,
            dy: 0.0,
            intensity: 1000.0,
            julian_date: jd,
        })
        .collect()
}

#[test]
fn test_mean_drift_is_independent_of_catalog_size() {
    let dir = workspace();

    for n in [50, 200] {
        let catalog = catalog_of(n);
        let files: Vec<_> = (0..3)
            .map(|f| {
                let path = observation_path(dir.path(), &format!("n{n}"), &format!("f{f}"));
                write_observations(&path, &uniform_rows(n, 0.0125, 2_457_600.6)).unwrap();
                path
            })
            .collect();

        let summary = NightAggregator::new(&catalog)
            .aggregate(&files, "night")
            .unwrap()
            .summary;

        assert_abs_diff_eq!(summary.mean_dx, 0.0125, epsilon = 1e-12);
        assert_abs_diff_eq!(summary.normalized_intensity, 1.0, epsilon = 1e-12);
        assert_eq!(summary.frames_used, 3);
    }
}

#[test]
fn test_short_file_is_omitted_not_averaged() {
    let dir = workspace();
    let catalog = catalog_of(200);

    let full = observation_path(dir.path(), "n", "full");
    write_observations(&full, &uniform_rows(200, 0.01, 2_457_600.6)).unwrap();
    // 199 rows would bias a catalog-size divisor by 0.5 percent
    let short = observation_path(dir.path(), "n", "short");
    write_observations(&short, &uniform_rows(199, 0.01, 2_457_600.7)).unwrap();

    let summary = NightAggregator::new(&catalog)
        .aggregate(&[full, short], "n")
        .unwrap()
        .summary;

    assert_eq!(summary.frames_used, 1);
    assert_eq!(summary.frames_omitted, 1);
    assert_abs_diff_eq!(summary.mean_dx, 0.01, epsilon = 1e-12);
}

#[test]
fn test_window_with_corner_outside_frame_is_rejected() {
    let pixels = Array2::from_elem((100, 100), 50.0);

    for (x, y) in [(-1, 10), (10, -1), (81, 10), (10, 81)] {
        let err = crop_window(&pixels, x, y, 20).unwrap_err();
        assert_eq!((err.x, err.y, err.size), (x, y, 20));
    }
    assert!(crop_window(&pixels, 80, 80, 20).is_ok());

    let measurer = DriftMeasurer::new(CentroidExtractor::new(10, FitConfig::default()), Some(1)).unwrap();
    let catalog = ReferenceCatalog::new(10, vec![SpotDescriptor::new("edge", -3, 40, 7.0, 50.0, 1.0)]);
    let frame = spotwatch::Frame::new(pixels, night_timestamp(0));

    match measurer.measure_frame(&catalog, &frame, 2_457_590.6) {
        Err(SpotwatchError::OutOfBounds { spot, source }) => {
            assert_eq!(spot, "edge");
            assert_eq!(source.x, -3);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_catalog_half_width_must_match_measurer() {
    let measurer = DriftMeasurer::new(CentroidExtractor::new(8, FitConfig::default()), None).unwrap();
    let frame = spotwatch::Frame::new(Array2::from_elem((100, 100), 50.0), night_timestamp(0));

    assert!(matches!(
        measurer.measure_frame(&catalog_of(1), &frame, 2_457_590.6),
        Err(SpotwatchError::InvalidConfig(_))
    ));
}

#[test]
fn test_undersized_frames_are_dropped_from_the_night() {
    let dir = workspace();
    let config = pipeline_config(dir.path(), None);
    let (frames, ids) = provider_with_night(3, |i| {
        if i == 1 {
            // Cuts through the third spot's window
            calibration_frame(0.0, 0.0).slice(ndarray::s![.., ..905]).to_owned()
        } else {
            calibration_frame(0.0, 0.0)
        }
    });

    let runner = NightRunner::new(config.clone()).unwrap();
    runner.build_reference(&frames).unwrap();

    let mut ledger = MasterLedger::open(&config.ledger_path).unwrap();
    let report = runner
        .run_night(
            &NightManifest::new("20160721", ids),
            &frames,
            &UtcJulianClock,
            &mut ledger,
        )
        .unwrap();

    assert_eq!(report.summary.frames_used, 2);
    assert_eq!(report.frames_omitted, 1);
    assert_eq!(report.observation_files.len(), 2);
}
