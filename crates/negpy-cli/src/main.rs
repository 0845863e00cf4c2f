use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;

mod processing;

use processing::{expand_inputs, output_path_for, process_file};

#[derive(Parser)]
#[command(name = "negpy")]
#[command(version, about = "Darkroom printing for scanned film negatives", long_about = None)]
pub struct Cli {
    /// Input files or directories (directories are expanded recursively
    /// against the known scan extensions)
    #[arg(value_name = "INPUT", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Film process: c41, bw, or e6
    #[arg(long, value_name = "MODE", default_value = "c41")]
    pub mode: String,

    /// Output format: tiff or jpeg
    #[arg(long, value_name = "FORMAT", default_value = "tiff")]
    pub format: String,

    /// Output directory; defaults to the export folder under the user data
    /// directory (NEGPY_DATA_DIR)
    #[arg(short, long, value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// Output color space tag (sRGB, Adobe RGB, ProPhoto, Display P3,
    /// Rec2020, WideGamut, Greyscale)
    #[arg(long, value_name = "SPACE", default_value = "sRGB")]
    pub color_space: String,

    /// Print density override (sigmoid pivot, 0-1)
    #[arg(long, value_name = "FLOAT")]
    pub density: Option<f32>,

    /// Paper grade override (sigmoid slope)
    #[arg(long, value_name = "FLOAT")]
    pub grade: Option<f32>,

    /// Luma sharpen amount override
    #[arg(long, value_name = "FLOAT")]
    pub sharpen: Option<f32>,

    /// Export DPI
    #[arg(long, value_name = "INT", default_value = "300")]
    pub dpi: u32,

    /// Print long edge in centimeters (overridden by --original-res)
    #[arg(long, value_name = "CM")]
    pub print_cm: Option<f32>,

    /// Export at the scan's native resolution
    #[arg(long)]
    pub original_res: bool,

    /// Output filename template; {name}, {index} and {mode} expand
    #[arg(long, value_name = "TEMPLATE", default_value = "{name}_print")]
    pub template: String,

    /// Force CPU-only processing
    #[arg(long)]
    pub cpu: bool,

    /// JSON settings file ({"version": 2, "config": {...}})
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Derive density, grade and filtration from the scan before printing
    #[arg(long)]
    pub auto_exposure: bool,

    /// Verbose progress output
    #[arg(short, long)]
    pub verbose: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let files = match expand_inputs(&cli.inputs) {
        Ok(files) => files,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };
    if files.is_empty() {
        eprintln!("error: no processable inputs found");
        std::process::exit(1);
    }

    let config = match processing::build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };

    let out_dir = cli
        .out
        .clone()
        .unwrap_or_else(|| negpy_core::store::data_dir().join("export"));
    if let Err(e) = std::fs::create_dir_all(&out_dir) {
        eprintln!("error: cannot create output directory: {}", e);
        std::process::exit(1);
    }

    let mut session = negpy_core::Session::new(negpy_core::SessionOptions {
        disable_gpu: cli.cpu,
        preview_max_edge: None,
    });

    let start = Instant::now();
    let total = files.len();
    let mut failures = 0usize;

    for (index, path) in files.iter().enumerate() {
        eprintln!("[{}/{}] {}", index + 1, total, path.display());
        let out_path = output_path_for(&cli, &out_dir, path, index);
        match process_file(&mut session, &cli, &config, path, &out_path) {
            Ok(()) => {
                if cli.verbose {
                    eprintln!("    -> {}", out_path.display());
                }
            }
            Err(e) => {
                failures += 1;
                eprintln!("    failed ({}): {}", e.kind(), e);
            }
        }
    }

    eprintln!(
        "{} of {} files in {:.1}s",
        total - failures,
        total,
        start.elapsed().as_secs_f32()
    );
    if failures > 0 {
        std::process::exit(1);
    }
}
