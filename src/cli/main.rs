//! Image-editing CLI
//!
//! One subcommand per engine operation. Inputs are read from disk, the PNG
//! result is written to `--output`.

use super::config::CliConfigBuilder;
use crate::{
    editing::{EnhanceOptions, UpscaleOptions, WatermarkOptions, WatermarkShape},
    processor::{ClipRequest, ImagingEngine},
    services::ImageCodec,
    tracing_config::{events, init_cli_tracing, spans},
    types::ProcessingResult,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::{debug, info, Instrument};

/// Image-editing engine command-line interface
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "dimo-imaging")]
pub struct Cli {
    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// JSON engine configuration (remote endpoints, limits, grain seed)
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Output PNG file
    #[arg(short, long, value_name = "OUTPUT", default_value = "output.png", global = true)]
    pub output: PathBuf,

    /// Override the maximum output dimension
    #[arg(long, global = true)]
    pub max_dimension: Option<u32>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "FILE", global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Contour clip seeding
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClipModeArg {
    /// Seed from a user mask
    Manual,
    /// Seed from the automatic cutout
    Auto,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Erase an object selected by mask or by magic wand
    RemoveObjects {
        input: PathBuf,
        /// Mask image; non-zero pixels are erased
        #[arg(long, conflicts_with_all = ["x", "y"])]
        mask: Option<PathBuf>,
        #[arg(long, requires = "y", allow_hyphen_values = true)]
        x: Option<i64>,
        #[arg(long, requires = "x", allow_hyphen_values = true)]
        y: Option<i64>,
        #[arg(long, default_value_t = 30)]
        tolerance: u8,
    },
    /// Write the magic-wand mask around a point
    MaskFromPoint {
        input: PathBuf,
        #[arg(long, allow_hyphen_values = true)]
        x: i64,
        #[arg(long, allow_hyphen_values = true)]
        y: i64,
        #[arg(long, default_value_t = 30)]
        tolerance: u8,
    },
    /// Remove the background by mask, by color key or automatically
    RemoveBackground {
        input: PathBuf,
        #[arg(long)]
        mask: Option<PathBuf>,
        /// Feather the mask edge
        #[arg(long)]
        refine: bool,
        /// JSON color list, e.g. '[[0,255,0]]'
        #[arg(long)]
        colors: Option<String>,
        #[arg(long, default_value_t = 30.0)]
        threshold: f32,
    },
    /// Clip the foreground contour with segmentation
    ContourClip {
        input: PathBuf,
        #[arg(long, value_enum, default_value_t = ClipModeArg::Manual)]
        mode: ClipModeArg,
        #[arg(long)]
        mask: Option<PathBuf>,
        #[arg(long)]
        refine: bool,
        /// JSON list of background colors (automatic mode)
        #[arg(long)]
        colors: Option<String>,
        #[arg(long, default_value_t = 30.0)]
        tolerance: f32,
    },
    /// Render a halftone dot pattern
    Halftone {
        input: PathBuf,
        #[arg(long, default_value_t = 10)]
        dot_size: u32,
        #[arg(long, default_value_t = 1.0)]
        scale: f32,
        /// JSON color list; the first entry is the garment color
        #[arg(long)]
        colors: Option<String>,
        #[arg(long, default_value_t = 30.0)]
        tolerance: f32,
        #[arg(long, default_value_t = 0.0)]
        spacing: f32,
    },
    /// Composite an overlay onto the input
    Watermark {
        input: PathBuf,
        overlay: PathBuf,
        #[arg(long, allow_hyphen_values = true)]
        x: i64,
        #[arg(long, allow_hyphen_values = true)]
        y: i64,
        #[arg(long, default_value_t = 1.0)]
        scale: f32,
        /// original, circle, square, rect-4-3 or rect-3-4
        #[arg(long, default_value = "original")]
        shape: String,
    },
    /// Upscale remotely with a local fallback
    Upscale {
        input: PathBuf,
        #[arg(long, default_value_t = 2.0)]
        factor: f32,
        #[arg(long, default_value_t = 1.5)]
        detail_boost: f32,
    },
    /// Adjust contrast, brightness and sharpness
    Enhance {
        input: PathBuf,
        #[arg(long, default_value_t = 1.2)]
        contrast: f32,
        #[arg(long, default_value_t = 1.1)]
        brightness: f32,
        #[arg(long, default_value_t = 1.3)]
        sharpness: f32,
    },
}

impl Command {
    /// Subcommand name as typed on the command line
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::RemoveObjects { .. } => "remove-objects",
            Self::MaskFromPoint { .. } => "mask-from-point",
            Self::RemoveBackground { .. } => "remove-background",
            Self::ContourClip { .. } => "contour-clip",
            Self::Halftone { .. } => "halftone",
            Self::Watermark { .. } => "watermark",
            Self::Upscale { .. } => "upscale",
            Self::Enhance { .. } => "enhance",
        }
    }

    fn input(&self) -> &Path {
        match self {
            Self::RemoveObjects { input, .. }
            | Self::MaskFromPoint { input, .. }
            | Self::RemoveBackground { input, .. }
            | Self::ContourClip { input, .. }
            | Self::Halftone { input, .. }
            | Self::Watermark { input, .. }
            | Self::Upscale { input, .. }
            | Self::Enhance { input, .. } => input,
        }
    }
}

/// Main entry point for CLI application
pub async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard =
        init_cli_tracing(cli.verbose, cli.log_file.clone()).context("Failed to initialize tracing")?;

    let name = cli.command.name();
    let span = spans::command(name, cli.command.input());

    match run(&cli).instrument(span).await {
        Ok(result) => {
            ImageCodec::write_file(&cli.output, &result.bytes)
                .with_context(|| format!("Failed to write '{}'", cli.output.display()))?;
            events::performance_metric(
                name,
                result.metadata.timings.total_ms,
                result.metadata.backend.as_deref(),
            );
            info!(output = %cli.output.display(), "{}", result.timing_summary());
            Ok(())
        },
        Err(e) => {
            events::error_with_context(&e, name);
            Err(e)
        },
    }
}

async fn run(cli: &Cli) -> Result<ProcessingResult> {
    let config = CliConfigBuilder::from_cli(cli).context("Failed to build configuration")?;
    let engine = ImagingEngine::new(config).context("Failed to create imaging engine")?;
    let image = CliConfigBuilder::read(cli.command.input())?;
    debug!(bytes = image.len(), "Input loaded");

    let result = match &cli.command {
        Command::RemoveObjects {
            mask,
            x,
            y,
            tolerance,
            ..
        } => {
            let point = x.zip(*y);
            let selection = CliConfigBuilder::object_selection(mask.as_deref(), point, *tolerance)?;
            engine.remove_objects(&image, selection).await?
        },
        Command::MaskFromPoint { x, y, tolerance, .. } => {
            engine.mask_from_point(&image, *x, *y, *tolerance).await?
        },
        Command::RemoveBackground {
            mask,
            refine,
            colors,
            threshold,
            ..
        } => {
            let mode = CliConfigBuilder::background_mode(
                mask.as_deref(),
                *refine,
                colors.as_deref(),
                *threshold,
            )?;
            engine.remove_background(&image, mode).await?
        },
        Command::ContourClip {
            mode,
            mask,
            refine,
            colors,
            tolerance,
            ..
        } => {
            let request = ClipRequest {
                mode: CliConfigBuilder::clip_mode(
                    *mode,
                    mask.as_deref(),
                    colors.as_deref(),
                    *tolerance,
                )?,
                refine: *refine,
            };
            engine.contour_clip(&image, request).await?
        },
        Command::Halftone {
            dot_size,
            scale,
            colors,
            tolerance,
            spacing,
            ..
        } => {
            let options = CliConfigBuilder::halftone_options(
                *dot_size,
                *scale,
                colors.as_deref(),
                *tolerance,
                *spacing,
            )?;
            engine.halftone(&image, options).await?
        },
        Command::Watermark {
            overlay,
            x,
            y,
            scale,
            shape,
            ..
        } => {
            let overlay = CliConfigBuilder::read(overlay)?;
            let options = WatermarkOptions {
                scale: *scale,
                shape: shape.parse::<WatermarkShape>()?,
                ..WatermarkOptions::at(*x, *y)
            };
            engine.watermark(&image, &overlay, options).await?
        },
        Command::Upscale {
            factor,
            detail_boost,
            ..
        } => {
            let options = UpscaleOptions {
                factor: *factor,
                detail_boost: *detail_boost,
            };
            engine.upscale(&image, options).await?
        },
        Command::Enhance {
            contrast,
            brightness,
            sharpness,
            ..
        } => {
            let options = EnhanceOptions {
                contrast: *contrast,
                brightness: *brightness,
                sharpness: *sharpness,
            };
            engine.enhance_quality(&image, options).await?
        },
    };
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_watermark() {
        let cli = Cli::try_parse_from([
            "dimo-imaging",
            "watermark",
            "base.png",
            "logo.png",
            "--x",
            "-10",
            "--y",
            "5",
            "--shape",
            "circle",
            "-o",
            "out.png",
        ])
        .unwrap();
        assert_eq!(cli.command.name(), "watermark");
        assert_eq!(cli.output, PathBuf::from("out.png"));
        match cli.command {
            Command::Watermark { x, shape, .. } => {
                assert_eq!(x, -10);
                assert_eq!(shape, "circle");
            },
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_mask_conflicts_with_point() {
        let parsed = Cli::try_parse_from([
            "dimo-imaging",
            "remove-objects",
            "in.png",
            "--mask",
            "m.png",
            "--x",
            "1",
            "--y",
            "1",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_upscale_defaults() {
        let cli = Cli::try_parse_from(["dimo-imaging", "upscale", "in.png", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Upscale { factor, detail_boost, .. } => {
                assert!((factor - 2.0).abs() < f32::EPSILON);
                assert!((detail_boost - 1.5).abs() < f32::EPSILON);
            },
            other => panic!("unexpected command {:?}", other),
        }
    }
}
