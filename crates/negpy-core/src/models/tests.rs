//! Workspace record serialization tests.

use super::*;

#[test]
fn test_default_config_validates() {
    WorkspaceConfig::default().validate().unwrap();
}

#[test]
fn test_unknown_keys_are_ignored() {
    let json = r#"{
        "process_mode": "C41",
        "exposure": { "density": 0.4, "future_knob": 12.0 },
        "brand_new_section": { "a": 1 }
    }"#;
    let config: WorkspaceConfig = serde_json::from_str(json).unwrap();
    assert!((config.exposure.density - 0.4).abs() < 1e-6);
    // Missing keys fall back to defaults.
    assert!((config.exposure.grade - 2.0).abs() < 1e-6);
    assert_eq!(config.toning, ToningConfig::default());
}

#[test]
fn test_process_mode_wire_names() {
    assert_eq!(
        serde_json::to_string(&ProcessMode::E6Positive).unwrap(),
        "\"E6\""
    );
    let m: ProcessMode = serde_json::from_str("\"BW\"").unwrap();
    assert_eq!(m, ProcessMode::BwNegative);
}

#[test]
fn test_round_trip_preserves_record() {
    let mut config = WorkspaceConfig::default();
    config.exposure.grade = 3.25;
    config.retouch.spots.push(ManualSpot {
        x: 0.25,
        y: 0.75,
        radius: 0.01,
    });
    config.geometry.rotation = 270;
    config.export.format = OutputFormat::Jpeg;

    let json = serde_json::to_string(&config).unwrap();
    let back: WorkspaceConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(config, back);
}

#[test]
fn test_validate_rejects_bad_rotation() {
    let mut config = WorkspaceConfig::default();
    config.geometry.rotation = 45;
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_rejects_inverted_bounds() {
    let mut config = WorkspaceConfig::default();
    config.normalization.floor = Some([0.0, 0.0, 0.0]);
    config.normalization.ceiling = Some([-1.0, 1.0, 1.0]);
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_rejects_nan() {
    let mut config = WorkspaceConfig::default();
    config.exposure.density = f32::NAN;
    assert!(config.validate().is_err());
}

#[test]
fn test_paper_profile_lookup() {
    assert_eq!(paper_profile("Warm Fiber").dmax_gamma, 1.15);
    assert_eq!(paper_profile("nonsense").name, "None");
}

#[test]
fn test_quarter_turns() {
    let mut g = GeometryConfig::default();
    g.rotation = 270;
    assert_eq!(g.quarter_turns(), 3);
    assert!(g.swaps_axes());
    g.rotation = 180;
    assert!(!g.swaps_axes());
}
