//! squaremark CLI: render markers, detect them, calibrate a camera.

use clap::{Parser, Subcommand, ValueEnum};
use rayon::prelude::*;
use squaremark::aruco::{DetectorParams, Dictionary, MarkerDetector, PredefinedDictionary};
use squaremark::calib::{
    board_object_points, calibrate_camera, CalibrationFile, CalibrationOptions, CalibrationSample,
    DistortionModel, ImageSize, PatternSize, PoseOptions,
};
use squaremark::{detect, draw, marker_poses};
use std::fs;
use std::path::{Path, PathBuf};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "squaremark")]
#[command(about = "Square fiducial markers: render, detect, calibrate")]
#[command(version)]
struct Cli {
    /// More log output (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render markers of a dictionary preset as `aruco-<id>.png`.
    Render {
        /// Dictionary preset, e.g. 4X4_50 or APRILTAG_36h11.
        #[arg(long, default_value = "4X4_50")]
        dictionary: PredefinedDictionary,

        /// Number of markers, starting at `--first-id`.
        #[arg(long, default_value_t = 10)]
        count: u32,

        #[arg(long, default_value_t = 0)]
        first_id: u32,

        /// Side length of each image in pixels.
        #[arg(long, default_value_t = 200)]
        size: usize,

        /// Border width in cells.
        #[arg(long, default_value_t = 1)]
        border_bits: usize,

        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Detect markers in one image and write an annotated copy.
    Detect {
        #[arg(long)]
        image: PathBuf,

        #[arg(long, default_value = "4X4_50")]
        dictionary: PredefinedDictionary,

        /// Annotated output image.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Also outline rejected candidates.
        #[arg(long)]
        draw_rejected: bool,

        /// Detector parameters as JSON; missing fields keep their defaults.
        #[arg(long)]
        params: Option<PathBuf>,

        /// Calibration JSON written by `calibrate`; enables pose estimation.
        #[arg(long, requires = "marker_length")]
        intrinsics: Option<PathBuf>,

        /// Physical marker side, in the calibration's units.
        #[arg(long)]
        marker_length: Option<f64>,

        /// Detection report as JSON.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Calibrate a camera from a directory of chessboard images.
    Calibrate {
        #[arg(long)]
        input_dir: PathBuf,

        #[arg(long)]
        output_dir: PathBuf,

        /// Inner corners per chessboard row.
        #[arg(long, default_value_t = 9)]
        width: usize,

        /// Inner corners per chessboard column.
        #[arg(long, default_value_t = 6)]
        height: usize,

        /// Chessboard square side in physical units.
        #[arg(long, default_value_t = 7.4)]
        square_size: f64,

        /// Expected image width; defaults to the first readable image.
        #[arg(long, requires = "image_height")]
        image_width: Option<u32>,

        #[arg(long, requires = "image_width")]
        image_height: Option<u32>,

        #[arg(long, value_enum, default_value_t = ModelArg::Radial5)]
        model: ModelArg,

        #[arg(long)]
        fix_principal_point: bool,

        #[arg(long)]
        zero_tangent_dist: bool,

        #[arg(long, default_value_t = 100)]
        max_iterations: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModelArg {
    Radial4,
    Radial5,
    Rational8,
}

impl From<ModelArg> for DistortionModel {
    fn from(m: ModelArg) -> Self {
        match m {
            ModelArg::Radial4 => DistortionModel::Radial4,
            ModelArg::Radial5 => DistortionModel::Radial5,
            ModelArg::Rational8 => DistortionModel::Rational8,
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    #[cfg(feature = "tracing")]
    {
        squaremark::core::init_tracing(false, level);
    }
    #[cfg(not(feature = "tracing"))]
    {
        let _ = squaremark::core::init_with_level(level);
    }
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Render {
            dictionary,
            count,
            first_id,
            size,
            border_bits,
            output_dir,
        } => run_render(dictionary, first_id, count, size, border_bits, &output_dir),
        Commands::Detect {
            image,
            dictionary,
            output,
            draw_rejected,
            params,
            intrinsics,
            marker_length,
            report,
        } => run_detect(DetectArgs {
            image,
            dictionary,
            output,
            draw_rejected,
            params,
            intrinsics,
            marker_length,
            report,
        }),
        Commands::Calibrate {
            input_dir,
            output_dir,
            width,
            height,
            square_size,
            image_width,
            image_height,
            model,
            fix_principal_point,
            zero_tangent_dist,
            max_iterations,
        } => {
            let options = CalibrationOptions {
                distortion_model: model.into(),
                fix_principal_point,
                zero_tangent_dist,
                max_iterations,
                ..CalibrationOptions::default()
            };
            let size = image_width.zip(image_height).map(|(w, h)| ImageSize::new(w, h));
            run_calibrate(
                &input_dir,
                &output_dir,
                PatternSize::new(width, height),
                square_size,
                size,
                &options,
            )
        }
    }
}

/// Preset lookup with the missing-table hint kept in the CLI error text.
fn load_preset(preset: PredefinedDictionary) -> CliResult<&'static Dictionary> {
    preset.dictionary().map_err(|e| e.to_string().into())
}

fn run_render(
    preset: PredefinedDictionary,
    first_id: u32,
    count: u32,
    size: usize,
    border_bits: usize,
    output_dir: &Path,
) -> CliResult<()> {
    let dict = load_preset(preset)?;
    let end = first_id.saturating_add(count).min(dict.len() as u32);
    if end < first_id.saturating_add(count) {
        log::warn!("{} has only {} markers; stopping at id {}", preset, dict.len(), end);
    }
    fs::create_dir_all(output_dir)?;
    for id in first_id..end {
        let marker = dict.draw_marker_with_border(id, size, border_bits)?;
        let img = ::image::GrayImage::from_raw(marker.width as u32, marker.height as u32, marker.data)
            .ok_or("rendered marker has an inconsistent buffer")?;
        let path = output_dir.join(format!("aruco-{id}.png"));
        img.save(&path)?;
        log::debug!("wrote {}", path.display());
    }
    println!(
        "rendered {} markers of {} to {}",
        end.saturating_sub(first_id),
        preset,
        output_dir.display()
    );
    Ok(())
}

struct DetectArgs {
    image: PathBuf,
    dictionary: PredefinedDictionary,
    output: Option<PathBuf>,
    draw_rejected: bool,
    params: Option<PathBuf>,
    intrinsics: Option<PathBuf>,
    marker_length: Option<f64>,
    report: Option<PathBuf>,
}

fn run_detect(args: DetectArgs) -> CliResult<()> {
    let img = ::image::open(&args.image).map_err(|e| -> CliError {
        format!("cannot read image {}: {e}", args.image.display()).into()
    })?;
    if img.width() == 0 || img.height() == 0 {
        return Err(format!("image {} is empty", args.image.display()).into());
    }

    let params: DetectorParams = match &args.params {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => DetectorParams::default(),
    };
    let detector = MarkerDetector::new(load_preset(args.dictionary)?.clone(), params);
    let result = detect::detect_markers_image(&img, &detector)?;

    println!(
        "detected {} markers ({} rejected candidates)",
        result.markers.len(),
        result.rejected.len()
    );
    for m in &result.markers {
        println!(
            "id {:4} at ({:.1}, {:.1}) hamming {}",
            m.id, m.corners[0].x, m.corners[0].y, m.hamming
        );
    }

    let poses = match (&args.intrinsics, args.marker_length) {
        (Some(path), Some(length)) => {
            let cam = CalibrationFile::load_json(path)?.intrinsics()?;
            let poses = marker_poses(&result, length, &cam, &PoseOptions::default());
            for (m, pose) in result.markers.iter().zip(&poses) {
                match pose {
                    Ok(p) => println!(
                        "id {:4} rvec [{:.4}, {:.4}, {:.4}] tvec [{:.4}, {:.4}, {:.4}]",
                        m.id, p.rvec.x, p.rvec.y, p.rvec.z, p.tvec.x, p.tvec.y, p.tvec.z
                    ),
                    Err(e) => log::warn!("marker {}: no pose ({e})", m.id),
                }
            }
            Some((cam, length, poses))
        }
        _ => None,
    };

    if let Some(out) = &args.output {
        let mut canvas = img.to_rgb8();
        draw::draw_detections(&mut canvas, &result, args.draw_rejected);
        if let Some((cam, length, poses)) = &poses {
            for pose in poses.iter().flatten() {
                draw::draw_axes(&mut canvas, pose, cam, length * 0.5);
            }
        }
        canvas.save(out)?;
        log::info!("annotated image written to {}", out.display());
    }

    if let Some(path) = &args.report {
        let pose_values: Vec<_> = poses
            .as_ref()
            .map(|(_, _, p)| p.iter().map(|r| r.as_ref().ok()).collect())
            .unwrap_or_default();
        let report = serde_json::json!({
            "image": args.image.to_string_lossy(),
            "dictionary": args.dictionary.name(),
            "markers": result.markers,
            "rejected": result.rejected,
            "poses": pose_values,
        });
        fs::write(path, serde_json::to_string_pretty(&report)?)?;
    }
    Ok(())
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| {
            matches!(
                e.to_ascii_lowercase().as_str(),
                "png" | "jpg" | "jpeg" | "bmp" | "tif" | "tiff"
            )
        })
}

struct View {
    path: PathBuf,
    size: ImageSize,
    corners: Vec<nalgebra::Point2<f32>>,
    image: ::image::GrayImage,
}

fn run_calibrate(
    input_dir: &Path,
    output_dir: &Path,
    pattern: PatternSize,
    square_size: f64,
    size: Option<ImageSize>,
    options: &CalibrationOptions,
) -> CliResult<()> {
    let mut files: Vec<PathBuf> = fs::read_dir(input_dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| is_image_file(p))
        .collect();
    files.sort();
    if files.is_empty() {
        return Err(format!("no images in {}", input_dir.display()).into());
    }
    fs::create_dir_all(output_dir)?;

    let chess_cfg = detect::default_chess_config();
    let outcomes: Vec<Result<View, String>> = files
        .par_iter()
        .map(|path| {
            let image = detect::load_gray(path).map_err(|e| e.to_string())?;
            let corners = detect::find_chessboard_corners(&image, pattern, &chess_cfg)
                .map_err(|e| format!("{}: {e}", path.display()))?;
            Ok(View {
                path: path.clone(),
                size: ImageSize::new(image.width(), image.height()),
                corners,
                image,
            })
        })
        .collect();

    let mut skipped = Vec::new();
    let mut views = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(v) => views.push(v),
            Err(msg) => {
                log::warn!("skipping {msg}");
                skipped.push(msg);
            }
        }
    }

    let Some(image_size) = size.or_else(|| views.first().map(|v| v.size)) else {
        return Err(format!(
            "no usable calibration views ({} skipped)",
            skipped.len()
        )
        .into());
    };
    views.retain(|v| {
        let ok = v.size == image_size;
        if !ok {
            let msg = format!(
                "{}: size {}x{} differs from {}x{}",
                v.path.display(),
                v.size.width,
                v.size.height,
                image_size.width,
                image_size.height
            );
            log::warn!("skipping {msg}");
            skipped.push(msg);
        }
        ok
    });

    let object = board_object_points(pattern, square_size);
    let samples: Vec<CalibrationSample> = views
        .iter()
        .map(|v| CalibrationSample {
            object_points: object.clone(),
            image_points: v
                .corners
                .iter()
                .map(|p| nalgebra::Point2::new(p.x as f64, p.y as f64))
                .collect(),
        })
        .collect();

    for v in &views {
        let mut canvas = ::image::DynamicImage::ImageLuma8(v.image.clone()).to_rgb8();
        draw::draw_chessboard_corners(&mut canvas, &v.corners, pattern);
        let stem = v
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "view".to_string());
        canvas.save(output_dir.join(format!("{stem}-corners.png")))?;
    }

    let result = calibrate_camera(&samples, image_size, options)?;
    let k = result.intrinsics.camera_matrix();
    println!("views used: {} (skipped {})", samples.len(), skipped.len());
    println!("rms reprojection error: {:.4} px", result.rms);
    println!("camera matrix:{k}");
    println!("distortion: {:?}", result.intrinsics.distortion());

    let file = CalibrationFile::from_result(&result, image_size, skipped);
    let path = output_dir.join("camera.json");
    file.write_json(&path)?;
    println!("intrinsics written to {}", path.display());
    Ok(())
}
