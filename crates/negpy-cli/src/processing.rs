//! Input expansion, config assembly, and per-file processing.

use std::path::{Path, PathBuf};

use negpy_core::decoders::KNOWN_EXTENSIONS;
use negpy_core::error::RenderError;
use negpy_core::models::{IccTag, OutputFormat, ProcessMode, SizePolicy};
use negpy_core::{Session, WorkspaceConfig};

use crate::Cli;

/// Expand files and directories (recursively) against the known scan
/// extensions, in stable sorted order.
pub fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, String> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            collect_dir(input, &mut files)?;
        } else if input.is_file() {
            files.push(input.clone());
        } else {
            return Err(format!("path not found: {}", input.display()));
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn collect_dir(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), String> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| format!("cannot read directory {}: {}", dir.display(), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| format!("cannot read entry: {}", e))?;
        let path = entry.path();
        if path.is_dir() {
            collect_dir(&path, files)?;
        } else if has_known_extension(&path) {
            files.push(path);
        }
    }
    Ok(())
}

fn has_known_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| KNOWN_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Assemble the workspace record from the settings file plus CLI overrides.
pub fn build_config(cli: &Cli) -> Result<WorkspaceConfig, String> {
    let mut config = match &cli.settings {
        Some(path) => negpy_core::presets::load_preset(path)?,
        None => WorkspaceConfig::default(),
    };

    config.process_mode = parse_mode(&cli.mode)?;
    config.export.format = parse_format(&cli.format)?;
    config.export.color_space = parse_color_space(&cli.color_space)?;
    config.export.dpi = cli.dpi;
    config.export.size = if cli.original_res {
        SizePolicy::Original
    } else if let Some(cm) = cli.print_cm {
        SizePolicy::PrintCm(cm)
    } else {
        config.export.size
    };

    if let Some(density) = cli.density {
        config.exposure.density = density;
    }
    if let Some(grade) = cli.grade {
        config.exposure.grade = grade;
    }
    if let Some(sharpen) = cli.sharpen {
        config.lab.sharpen_amount = sharpen;
    }

    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

pub fn parse_mode(mode: &str) -> Result<ProcessMode, String> {
    match mode.to_ascii_lowercase().as_str() {
        "c41" | "c-41" => Ok(ProcessMode::C41Negative),
        "bw" | "b&w" => Ok(ProcessMode::BwNegative),
        "e6" | "e-6" => Ok(ProcessMode::E6Positive),
        other => Err(format!("unknown process mode: {}", other)),
    }
}

pub fn parse_format(format: &str) -> Result<OutputFormat, String> {
    match format.to_ascii_lowercase().as_str() {
        "tiff" | "tif" | "tiff16" => Ok(OutputFormat::Tiff16),
        "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
        other => Err(format!("unknown output format: {}", other)),
    }
}

pub fn parse_color_space(space: &str) -> Result<IccTag, String> {
    let normalized = space.to_ascii_lowercase().replace([' ', '-'], "");
    match normalized.as_str() {
        "srgb" => Ok(IccTag::Srgb),
        "adobergb" => Ok(IccTag::AdobeRgb),
        "prophoto" | "prophotorgb" => Ok(IccTag::ProPhoto),
        "displayp3" | "p3" => Ok(IccTag::DisplayP3),
        "rec2020" => Ok(IccTag::Rec2020),
        "widegamut" | "widegamutrgb" => Ok(IccTag::WideGamut),
        "greyscale" | "grayscale" => Ok(IccTag::Greyscale),
        _ => Err(format!("unknown color space: {}", space)),
    }
}

/// Expand the filename template for one input.
pub fn output_path_for(cli: &Cli, out_dir: &Path, input: &Path, index: usize) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("scan");
    let name = cli
        .template
        .replace("{name}", stem)
        .replace("{index}", &format!("{:04}", index + 1))
        .replace("{mode}", &cli.mode.to_ascii_lowercase());
    let extension = match cli.format.to_ascii_lowercase().as_str() {
        "jpeg" | "jpg" => "jpg",
        _ => "tiff",
    };
    out_dir.join(format!("{}.{}", name, extension))
}

/// Print one file: load, optionally solve exposure, render, encode, write.
pub fn process_file(
    session: &mut Session,
    cli: &Cli,
    config: &WorkspaceConfig,
    input: &Path,
    out_path: &Path,
) -> Result<(), RenderError> {
    session.open_path(input)?;

    let mut config = config.clone();
    if cli.auto_exposure {
        let suggestion = session.solve_exposure(&config)?;
        config.exposure.density = suggestion.density.clamp(0.0, 1.0);
        config.exposure.grade = suggestion.grade.clamp(0.1, 10.0);
        config.exposure.cyan = suggestion.cyan.clamp(-1.0, 1.0);
        config.exposure.magenta = suggestion.magenta.clamp(-1.0, 1.0);
        config.exposure.yellow = suggestion.yellow.clamp(-1.0, 1.0);
        if cli.verbose {
            eprintln!(
                "    auto exposure: density {:.3}, grade {:.2}, cmy ({:.3}, {:.3}, {:.3})",
                config.exposure.density,
                config.exposure.grade,
                config.exposure.cyan,
                config.exposure.magenta,
                config.exposure.yellow
            );
        }
    }

    let bytes = session.render_export(&config)?;
    std::fs::write(out_path, bytes)
        .map_err(|e| RenderError::PersistenceFailed(format!("write failed: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        let mut full = vec!["negpy"];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("C41").unwrap(), ProcessMode::C41Negative);
        assert_eq!(parse_mode("e6").unwrap(), ProcessMode::E6Positive);
        assert!(parse_mode("kodachrome").is_err());
    }

    #[test]
    fn test_parse_color_space() {
        assert_eq!(parse_color_space("Adobe RGB").unwrap(), IccTag::AdobeRgb);
        assert_eq!(parse_color_space("display-p3").unwrap(), IccTag::DisplayP3);
        assert!(parse_color_space("ntsc").is_err());
    }

    #[test]
    fn test_template_expansion() {
        let c = cli(&[
            "scan.tif",
            "--template",
            "{mode}_{index}_{name}",
            "--mode",
            "bw",
        ]);
        let path = output_path_for(
            &c,
            Path::new("/tmp/prints"),
            Path::new("/scans/roll7/frame03.tif"),
            4,
        );
        assert_eq!(path, PathBuf::from("/tmp/prints/bw_0005_frame03.tiff"));
    }

    #[test]
    fn test_build_config_applies_overrides() {
        let c = cli(&[
            "scan.tif",
            "--mode",
            "e6",
            "--format",
            "jpeg",
            "--density",
            "0.4",
            "--grade",
            "3.5",
            "--print-cm",
            "20",
        ]);
        let config = build_config(&c).unwrap();
        assert_eq!(config.process_mode, ProcessMode::E6Positive);
        assert_eq!(config.export.format, OutputFormat::Jpeg);
        assert!((config.exposure.density - 0.4).abs() < 1e-6);
        assert!((config.exposure.grade - 3.5).abs() < 1e-6);
        assert_eq!(config.export.size, SizePolicy::PrintCm(20.0));
    }

    #[test]
    fn test_build_config_rejects_bad_values() {
        let c = cli(&["scan.tif", "--grade=0.0"]);
        assert!(build_config(&c).is_err());
    }

    #[test]
    fn test_expand_inputs_recurses_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("roll");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(dir.path().join("a.tif"), b"x").unwrap();
        std::fs::write(sub.join("b.tiff"), b"x").unwrap();
        std::fs::write(sub.join("notes.txt"), b"x").unwrap();

        let files = expand_inputs(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| has_known_extension(f)));
    }

    #[test]
    fn test_expand_inputs_missing_path() {
        assert!(expand_inputs(&[PathBuf::from("/no/such/scan.tif")]).is_err());
    }
}
