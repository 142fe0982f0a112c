mod common;

use approx::assert_abs_diff_eq;
use common::{calibration_frame, pipeline_config, provider_with_night, workspace, SPOT_CENTERS};
use spotwatch::{
    read_observations, LedgerOutcome, MasterLedger, NightManifest, NightRunner, ReferenceCatalog,
    UtcJulianClock, Verdict,
};
use std::fs;
use test_helpers::add_gaussian_noise;

#[test]
fn test_reference_build_finds_true_centers() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = workspace();
    let config = pipeline_config(dir.path(), None);
    let (frames, _) = provider_with_night(0, |_| calibration_frame(0.0, 0.0));

    let runner = NightRunner::new(config.clone()).unwrap();
    let catalog = runner.build_reference(&frames).unwrap();

    assert_eq!(catalog.len(), 3);
    for (spot, &(x, y)) in catalog.spots().iter().zip(SPOT_CENTERS.iter()) {
        assert_abs_diff_eq!(spot.centroid_x, x, epsilon = 0.01);
        assert_abs_diff_eq!(spot.centroid_y, y, epsilon = 0.01);
    }

    let persisted = ReferenceCatalog::load(&config.reference_catalog_path, 10).unwrap();
    assert_eq!(persisted, catalog);
    let header = fs::read_to_string(&config.reference_catalog_path).unwrap();
    assert!(header.starts_with("@halfWidth=10\n@id,winX,winY,centroidX,centroidY,intensity\n"));
}

#[test]
fn test_refeeding_reference_frame_shows_no_drift() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = workspace();
    let config = pipeline_config(dir.path(), Some(2));
    let (frames, ids) = provider_with_night(3, |_| calibration_frame(0.0, 0.0));

    let runner = NightRunner::new(config.clone()).unwrap();
    runner.build_reference(&frames).unwrap();

    let manifest = NightManifest::new("20160721", ids);
    let mut ledger = MasterLedger::open(&config.ledger_path).unwrap();
    let report = runner
        .run_night(&manifest, &frames, &UtcJulianClock, &mut ledger)
        .unwrap();

    assert_eq!(report.summary.night_id, 2_457_590);
    assert_abs_diff_eq!(report.summary.mean_dx, 0.0, epsilon = 1e-3);
    assert_abs_diff_eq!(report.summary.mean_dy, 0.0, epsilon = 1e-3);
    assert_abs_diff_eq!(report.summary.normalized_intensity, 1.0, epsilon = 1e-3);
    assert_eq!(report.quality.dx, Verdict::Pass);
    assert_eq!(report.quality.dy, Verdict::Pass);
    assert_eq!(report.quality.intensity, Verdict::Pass);
    assert_eq!(report.ledger, LedgerOutcome::Written);
    assert_eq!(report.frames_omitted, 0);
    assert_eq!(report.diverged_fits, 0);

    // One observation file per frame, one row per spot
    assert_eq!(report.observation_files.len(), 3);
    let first = &report.observation_files[0];
    assert!(first.ends_with("observations/20160721/frame_000_20160721.spot"));
    let rows = read_observations(first).unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].id, "spot01");

    let ledger_text = fs::read_to_string(&config.ledger_path).unwrap();
    assert_eq!(
        ledger_text,
        "@juldate,meanDX,meanDY,normalizedIntensity\n2457590,0.0000,0.0000,1.000000\n"
    );
}

#[test]
fn test_rerunning_a_night_is_idempotent_and_deterministic() {
    let dir = workspace();
    let config = pipeline_config(dir.path(), Some(4));
    let (frames, ids) = provider_with_night(2, |i| calibration_frame(0.01 * i as f64, 0.0));

    let runner = NightRunner::new(config.clone()).unwrap();
    runner.build_reference(&frames).unwrap();
    let manifest = NightManifest::new("20160721", ids);

    let mut ledger = MasterLedger::open(&config.ledger_path).unwrap();
    let first = runner
        .run_night(&manifest, &frames, &UtcJulianClock, &mut ledger)
        .unwrap();
    let first_bytes: Vec<Vec<u8>> = first
        .observation_files
        .iter()
        .map(|p| fs::read(p).unwrap())
        .collect();
    let ledger_bytes = fs::read(&config.ledger_path).unwrap();

    // Fresh ledger handle, single worker: same files, no new ledger row
    let single = NightRunner::new(spotwatch::PipelineConfig {
        workers: Some(1),
        ..config.clone()
    })
    .unwrap();
    let mut reopened = MasterLedger::open(&config.ledger_path).unwrap();
    let second = single
        .run_night(&manifest, &frames, &UtcJulianClock, &mut reopened)
        .unwrap();

    assert_eq!(second.ledger, LedgerOutcome::SkippedDuplicate);
    assert_eq!(fs::read(&config.ledger_path).unwrap(), ledger_bytes);
    for (path, bytes) in second.observation_files.iter().zip(first_bytes.iter()) {
        assert_eq!(&fs::read(path).unwrap(), bytes);
    }
}

#[test]
fn test_shifted_night_reports_drift_and_fails_gate() {
    let dir = workspace();
    let config = pipeline_config(dir.path(), None);
    let (frames, ids) = provider_with_night(2, |_| calibration_frame(0.05, -0.03));

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

    // Displacement is reference minus measured
    assert_abs_diff_eq!(report.summary.mean_dx, -0.05, epsilon = 1e-3);
    assert_abs_diff_eq!(report.summary.mean_dy, 0.03, epsilon = 1e-3);
    assert_eq!(report.quality.dx, Verdict::Fail);
    assert_eq!(report.quality.dy, Verdict::Fail);
    assert_eq!(report.quality.intensity, Verdict::Pass);
    assert!(report.quality.to_string().contains("NO OK - CHECK"));

    // Spots moved together, so the intra-night jitter is flat
    for jitter in &report.jitter {
        assert_abs_diff_eq!(jitter.median_dx_mpix, 0.0, epsilon = 1.0);
        assert_abs_diff_eq!(jitter.median_intensity, 1.0, epsilon = 1e-3);
    }
}

#[test]
fn test_noisy_frames_stay_within_tolerance() {
    let dir = workspace();
    let config = pipeline_config(dir.path(), None);
    let (frames, ids) = provider_with_night(4, |i| {
        let mut frame = calibration_frame(0.0, 0.0);
        add_gaussian_noise(&mut frame, 3.0, 1000 + i as u64).unwrap();
        frame
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

    assert_eq!(report.summary.frames_used, 4);
    assert_abs_diff_eq!(report.summary.mean_dx, 0.0, epsilon = 0.02);
    assert_abs_diff_eq!(report.summary.mean_dy, 0.0, epsilon = 0.02);
    assert_abs_diff_eq!(report.summary.normalized_intensity, 1.0, epsilon = 0.01);
    assert_eq!(report.jitter.len(), 4);
}
