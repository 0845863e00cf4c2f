//! Preset load/save.
//!
//! A preset is a JSON object `{ "version": int, "config": WorkspaceConfig }`.
//! Unknown keys are ignored and missing keys fall back to defaults, so old
//! presets keep loading as the record grows.
//!
//! Version history:
//! - v1 stored manual spots in pre-rotation coordinates.
//! - v2 (current) stores them in the rotated-and-flipped image space. v1
//!   presets are migrated through the geometry mapping at load time.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::models::{GeometryConfig, WorkspaceConfig};

pub const PRESET_VERSION: u32 = 2;

#[derive(Debug, Serialize, Deserialize)]
struct PresetFile {
    version: u32,
    config: WorkspaceConfig,
}

/// Load a preset, migrating old spot coordinates if needed.
pub fn load_preset<P: AsRef<Path>>(path: P) -> Result<WorkspaceConfig, String> {
    let contents = std::fs::read_to_string(path.as_ref())
        .map_err(|e| format!("Failed to read preset file: {}", e))?;
    parse_preset(&contents)
}

/// Parse preset JSON from a string.
pub fn parse_preset(contents: &str) -> Result<WorkspaceConfig, String> {
    let preset: PresetFile =
        serde_json::from_str(contents).map_err(|e| format!("Failed to parse preset JSON: {}", e))?;

    let mut config = preset.config;
    if preset.version < 2 {
        let geometry = config.geometry.clone();
        for spot in &mut config.retouch.spots {
            let (x, y) = map_to_rotated(spot.x, spot.y, &geometry);
            spot.x = x;
            spot.y = y;
        }
    }
    Ok(config)
}

/// Save a preset at the current version.
pub fn save_preset<P: AsRef<Path>>(config: &WorkspaceConfig, path: P) -> Result<(), String> {
    let preset = PresetFile {
        version: PRESET_VERSION,
        config: config.clone(),
    };
    let json = serde_json::to_string_pretty(&preset)
        .map_err(|e| format!("Failed to serialize preset: {}", e))?;
    std::fs::write(path.as_ref(), json).map_err(|e| format!("Failed to write preset file: {}", e))
}

/// Map a normalized pre-rotation coordinate into the rotated-and-flipped
/// space. Quarter turns are counter-clockwise; flips apply after rotation.
pub fn map_to_rotated(nx: f32, ny: f32, geometry: &GeometryConfig) -> (f32, f32) {
    let (mut x, mut y) = match geometry.quarter_turns() {
        1 => (ny, 1.0 - nx),
        2 => (1.0 - nx, 1.0 - ny),
        3 => (1.0 - ny, nx),
        _ => (nx, ny),
    };
    if geometry.flip_horizontal {
        x = 1.0 - x;
    }
    if geometry.flip_vertical {
        y = 1.0 - y;
    }
    (x, y)
}

/// Validate a preset name for use as a file stem.
pub fn validate_preset_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Preset name cannot be empty".to_string());
    }
    if name.contains('/') || name.contains('\\') {
        return Err("Preset name cannot contain path separators".to_string());
    }
    if name.contains("..") {
        return Err("Preset name cannot contain '..'".to_string());
    }
    if name.starts_with('.') {
        return Err("Preset name cannot start with '.'".to_string());
    }
    if name.contains('\0') {
        return Err("Preset name cannot contain null bytes".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ManualSpot;

    #[test]
    fn test_round_trip_current_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portra.json");

        let mut config = WorkspaceConfig::default();
        config.exposure.grade = 3.0;
        config.retouch.spots.push(ManualSpot {
            x: 0.2,
            y: 0.8,
            radius: 0.005,
        });
        save_preset(&config, &path).unwrap();

        let loaded = load_preset(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_v1_spots_are_migrated() {
        // 90 degrees CCW: (x, y) -> (y, 1-x)
        let json = r#"{
            "version": 1,
            "config": {
                "geometry": { "rotation": 90 },
                "retouch": { "spots": [{ "x": 0.2, "y": 0.7, "radius": 0.01 }] }
            }
        }"#;
        let config = parse_preset(json).unwrap();
        let spot = config.retouch.spots[0];
        assert!((spot.x - 0.7).abs() < 1e-6);
        assert!((spot.y - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_v2_spots_are_untouched() {
        let json = r#"{
            "version": 2,
            "config": {
                "geometry": { "rotation": 90 },
                "retouch": { "spots": [{ "x": 0.2, "y": 0.7, "radius": 0.01 }] }
            }
        }"#;
        let config = parse_preset(json).unwrap();
        let spot = config.retouch.spots[0];
        assert!((spot.x - 0.2).abs() < 1e-6);
        assert!((spot.y - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let json = r#"{ "version": 2, "config": {}, "written_by": "negpy 9.9" }"#;
        let config = parse_preset(json).unwrap();
        assert_eq!(config, WorkspaceConfig::default());
    }

    #[test]
    fn test_map_to_rotated_with_flip() {
        let mut geometry = GeometryConfig::default();
        geometry.rotation = 180;
        geometry.flip_horizontal = true;
        // 180: (0.2, 0.7) -> (0.8, 0.3); flip_h -> (0.2, 0.3)
        let (x, y) = map_to_rotated(0.2, 0.7, &geometry);
        assert!((x - 0.2).abs() < 1e-6);
        assert!((y - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_preset_name_validation() {
        assert!(validate_preset_name("tri-x_400").is_ok());
        assert!(validate_preset_name("").is_err());
        assert!(validate_preset_name("../evil").is_err());
        assert!(validate_preset_name("a/b").is_err());
        assert!(validate_preset_name(".hidden").is_err());
    }
}
