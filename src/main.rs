use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use image::{imageops, Rgba};
use std::path::PathBuf;
use std::sync::Arc;
use tryon::capture::{CameraSession, FacingMode, StreamConstraints, WebcamBackend};
use tryon::output::{DisplaySurface, V4L2Output, WindowSurface};
use tryon::overlay::{OverlayController, Point, ProductReference};
use tryon::render::{RenderConfig, RenderLoop};
use tryon::segmentation::{self, Architecture, InferOptions, InternalResolution, ModelConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Capture resolution width
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Capture resolution height
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Target frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Which way the camera faces; user-facing frames are mirrored
    #[arg(long, value_enum, default_value_t = Facing::User)]
    facing: Facing,

    /// Path to segmentation model (ONNX file)
    /// If not provided, runs in passthrough mode without background removal
    #[arg(long)]
    model: Option<PathBuf>,

    /// Model family the ONNX file belongs to
    #[arg(long, value_enum, default_value_t = ArchitectureArg::Fast)]
    architecture: ArchitectureArg,

    /// Model input sides are rounded up to a multiple of this (8, 16 or 32)
    #[arg(long, default_value_t = 16)]
    output_stride: u32,

    /// Backbone scale (0.5, 0.75 or 1.0)
    #[arg(long, default_value_t = 0.75)]
    model_scale: f32,

    /// Bytes per weight of the exported graph (1, 2 or 4)
    #[arg(long, default_value_t = 2)]
    precision_bytes: u8,

    /// Fraction of the frame resolution fed to the model
    #[arg(long, value_enum, default_value_t = ResolutionArg::Medium)]
    internal_resolution: ResolutionArg,

    /// Person probability above which a pixel is kept
    #[arg(long, default_value_t = 0.7)]
    threshold: f32,

    /// Offer a frame for segmentation every N ticks
    #[arg(long, default_value_t = 2)]
    infer_every: u32,

    /// Product image to try on (PNG/JPG)
    #[arg(long)]
    product: PathBuf,

    /// Product display name
    #[arg(long, default_value = "Product")]
    product_name: String,

    /// Product identifier
    #[arg(long, default_value_t = 0)]
    product_id: u32,

    /// Side of the square box the product image is fitted into
    #[arg(long, default_value_t = 192)]
    overlay_size: u32,

    /// Initial overlay centre, x
    #[arg(long, default_value_t = 300.0)]
    overlay_x: f32,

    /// Initial overlay centre, y
    #[arg(long, default_value_t = 200.0)]
    overlay_y: f32,

    /// Where the composited view goes
    #[arg(long, value_enum, default_value_t = OutputKind::Window)]
    output: OutputKind,

    /// Output v4l2loopback device path
    #[arg(long, default_value = "/dev/video10")]
    loopback_device: PathBuf,

    /// Colour behind removed background, as RRGGBB
    #[arg(long, default_value = "000000")]
    backdrop: String,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Facing {
    User,
    Environment,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ArchitectureArg {
    Fast,
    Accurate,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ResolutionArg {
    Low,
    Medium,
    High,
    Full,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputKind {
    Window,
    Loopback,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("Try-on starting");
    tracing::info!("Capture: {}x{} @ {} fps", args.width, args.height, args.fps);

    let backdrop = parse_backdrop(&args.backdrop)?;
    let product = Arc::new(load_product(&args)?);
    tracing::info!(
        "Product '{}' ({}x{})",
        product.name,
        product.image.width(),
        product.image.height()
    );

    let constraints = StreamConstraints {
        width: args.width,
        height: args.height,
        fps: args.fps,
        facing: match args.facing {
            Facing::User => FacingMode::User,
            Facing::Environment => FacingMode::Environment,
        },
    };
    let mut camera = CameraSession::new(Box::new(WebcamBackend::new(args.input_device)), constraints)
        .with_observer(|from, to| tracing::info!("Camera {} -> {}", from, to));
    let stream = camera.open().context("Camera unavailable")?;

    let options = InferOptions {
        resolution: match args.internal_resolution {
            ResolutionArg::Low => InternalResolution::Low,
            ResolutionArg::Medium => InternalResolution::Medium,
            ResolutionArg::High => InternalResolution::High,
            ResolutionArg::Full => InternalResolution::Full,
        },
        threshold: args.threshold,
    };
    let engine = match &args.model {
        Some(path) => {
            let config = ModelConfig {
                path: path.clone(),
                architecture: match args.architecture {
                    ArchitectureArg::Fast => Architecture::Fast,
                    ArchitectureArg::Accurate => Architecture::Accurate,
                },
                output_stride: args.output_stride,
                model_scale: args.model_scale,
                precision_bytes: args.precision_bytes,
            };
            tracing::info!("Loading segmentation model from {}", path.display());
            Some(segmentation::spawn_engine(config, options).context("Failed to start segmentation")?)
        }
        None => {
            tracing::info!("Running in passthrough mode (no segmentation)");
            None
        }
    };

    let surface: Box<dyn DisplaySurface> = match args.output {
        OutputKind::Window => Box::new(
            WindowSurface::new("Virtual Try-On", stream.width, stream.height, 60)
                .context("Failed to open window")?,
        ),
        OutputKind::Loopback => Box::new(
            V4L2Output::new(&args.loopback_device, stream.width, stream.height)
                .context("Failed to initialize v4l2loopback output")?,
        ),
    };

    let overlay = OverlayController::new(product, Point::new(args.overlay_x, args.overlay_y))
        .with_hit_size(args.overlay_size, args.overlay_size);
    let config = RenderConfig {
        infer_every: args.infer_every,
        target_fps: args.fps,
        backdrop,
        ..RenderConfig::default()
    };

    let mut render = RenderLoop::new(camera, engine, overlay, surface, config);
    render.run().context("Render loop failed")?;

    tracing::info!("Try-on closed");
    Ok(())
}

/// Decode the product image and contain-fit it into the overlay box.
fn load_product(args: &Args) -> Result<ProductReference> {
    let decoded = image::open(&args.product)
        .with_context(|| format!("Failed to load product image {}", args.product.display()))?
        .into_rgba8();

    let (width, height) = decoded.dimensions();
    let box_side = args.overlay_size.max(1) as f32;
    let scale = (box_side / width as f32).min(box_side / height as f32);
    let fitted_w = ((width as f32 * scale).round() as u32).max(1);
    let fitted_h = ((height as f32 * scale).round() as u32).max(1);
    let image = imageops::resize(&decoded, fitted_w, fitted_h, imageops::FilterType::Lanczos3);

    Ok(ProductReference {
        id: args.product_id,
        name: args.product_name.clone(),
        source: args.product.display().to_string(),
        image,
    })
}

fn parse_backdrop(hex: &str) -> Result<Rgba<u8>> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 {
        bail!("backdrop must be RRGGBB, got '{}'", hex);
    }
    let value = u32::from_str_radix(hex, 16).with_context(|| format!("invalid backdrop '{}'", hex))?;
    Ok(Rgba([(value >> 16) as u8, (value >> 8) as u8, value as u8, 255]))
}
