mod common;

use common::synthetic_image::{framed_scene, grid_scene, noise_u8};
use trueline_core::straighten::EstimatorKind;
use trueline_core::transform::RotateParams;
use trueline_core::{
    apply_transform, detect_straighten, straighten_report, BatchOptions, DetectionConfig,
    TransformParams,
};

#[test]
fn tilted_frame_reports_the_counter_rotation() {
    let image = framed_scene(1000, 800, 3.0, 7);
    let report = straighten_report(&image, &DetectionConfig::default()).unwrap();

    assert_eq!(report.working_size, (800, 640));
    assert!(
        (report.decision.angle_degrees + 3.0).abs() <= 0.2,
        "angle {}",
        report.decision.angle_degrees
    );
    assert!(report.decision.confidence >= 0.5, "confidence {}", report.decision.confidence);

    let angle_of = |kind: EstimatorKind| {
        report
            .estimates
            .iter()
            .find(|e| e.method == kind)
            .map(|e| e.angle_degrees)
            .unwrap()
    };
    let region = angle_of(EstimatorKind::RegionAnalysis);
    let search = angle_of(EstimatorKind::RotationSearch);
    assert!((region - search).abs() <= 1.5, "region {region}, search {search}");
}

#[test]
fn grain_edges_do_not_vote() {
    let image = framed_scene(1000, 800, 3.0, 7);
    let report = straighten_report(&image, &DetectionConfig::default()).unwrap();
    // Most raw edges are grain; the bar edges keep line support.
    assert!(
        report.supported_count * 4 < report.edge_count,
        "supported {} of {}",
        report.supported_count,
        report.edge_count
    );
    assert!(report.supported_count > 2000, "supported {}", report.supported_count);

    let noise = straighten_report(&noise_u8(400, 300, 3), &DetectionConfig::default()).unwrap();
    assert!(noise.edge_count > 10_000);
    assert_eq!(noise.supported_count, 0);
}

#[test]
fn level_frame_needs_no_correction() {
    let image = framed_scene(1000, 800, 0.0, 11);
    let decision = detect_straighten(&image).unwrap();

    assert!(decision.angle_degrees.abs() <= 0.1, "angle {}", decision.angle_degrees);
    let options = BatchOptions::default();
    assert!(!options.needs_correction(decision.angle_degrees, decision.confidence));
}

#[test]
fn pure_noise_is_not_trusted() {
    let image = noise_u8(400, 300, 3);
    let decision = detect_straighten(&image).unwrap();
    assert!(decision.confidence < 0.15, "confidence {}", decision.confidence);
}

#[test]
fn grid_tilt_is_recovered() {
    for tilt in [-2.5, -1.5, 1.0, 2.5] {
        let image = grid_scene(800, 600, 60.0, tilt, 5);
        let decision = detect_straighten(&image).unwrap();
        assert!(
            (decision.angle_degrees + tilt).abs() <= 0.25,
            "tilt {tilt}: angle {}",
            decision.angle_degrees
        );
        assert!(
            decision.confidence > 0.5,
            "tilt {tilt}: confidence {}",
            decision.confidence
        );
    }
}

#[test]
fn rotated_level_frame_reports_the_opposite_angle() {
    let level = framed_scene(900, 700, 0.0, 13);
    let rotated = apply_transform(&level, &TransformParams::Rotate(RotateParams::new(2.0))).unwrap();
    let decision = detect_straighten(&rotated).unwrap();
    assert!(
        (decision.angle_degrees + 2.0).abs() <= 0.25,
        "angle {}",
        decision.angle_degrees
    );
}

#[test]
fn applying_the_correction_is_idempotent() {
    let image = framed_scene(1000, 800, 2.0, 17);
    let first = detect_straighten(&image).unwrap();
    let corrected = apply_transform(
        &image,
        &TransformParams::Rotate(RotateParams::new(first.angle_degrees)),
    )
    .unwrap();

    let second = detect_straighten(&corrected).unwrap();
    assert!(
        second.angle_degrees.abs() <= 0.3,
        "residual {}",
        second.angle_degrees
    );
}

#[test]
fn detection_is_deterministic() {
    let image = grid_scene(640, 480, 48.0, 1.5, 23);
    let config = DetectionConfig::default();
    let a = straighten_report(&image, &config).unwrap();
    let b = straighten_report(&image, &config).unwrap();
    assert_eq!(a, b);
}
