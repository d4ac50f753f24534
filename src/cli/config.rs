//! Conversion of CLI arguments into engine configuration and requests

use crate::cli::main_impl::{Cli, ClipModeArg};
use crate::{
    config::EngineConfig,
    editing::{ColorKey, HalftoneOptions},
    processor::{BackgroundMode, ClipMode, ObjectSelection},
    services::ImageCodec,
    types::ColorSample,
};
use anyhow::{Context, Result};
use std::path::Path;

/// Convert CLI arguments to engine inputs
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Engine configuration: JSON file when given, environment otherwise,
    /// then command-line overrides
    pub(crate) fn from_cli(cli: &Cli) -> Result<EngineConfig> {
        let mut config = match &cli.config {
            Some(path) => EngineConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config '{}'", path.display()))?,
            None => EngineConfig::from_env(),
        };
        if let Some(max_dimension) = cli.max_dimension {
            config.max_dimension = max_dimension;
        }
        config.validate().context("Invalid engine configuration")?;
        Ok(config)
    }

    pub(crate) fn read(path: &Path) -> Result<Vec<u8>> {
        ImageCodec::read_file(path).with_context(|| format!("Failed to read '{}'", path.display()))
    }

    pub(crate) fn parse_colors(colors: Option<&str>) -> Result<Option<Vec<ColorSample>>> {
        colors
            .map(|json| ColorSample::parse_list(json).context("Invalid --colors"))
            .transpose()
    }

    pub(crate) fn object_selection(
        mask: Option<&Path>,
        point: Option<(i64, i64)>,
        tolerance: u8,
    ) -> Result<ObjectSelection> {
        match (mask, point) {
            (Some(path), _) => Ok(ObjectSelection::Mask(Self::read(path)?)),
            (None, Some((x, y))) => Ok(ObjectSelection::Point { x, y, tolerance }),
            (None, None) => anyhow::bail!("Either --mask or --x/--y is required"),
        }
    }

    /// Mask wins over colors; neither means automatic removal
    pub(crate) fn background_mode(
        mask: Option<&Path>,
        refine: bool,
        colors: Option<&str>,
        threshold: f32,
    ) -> Result<BackgroundMode> {
        if let Some(path) = mask {
            return Ok(BackgroundMode::Mask {
                mask: Self::read(path)?,
                refine,
            });
        }
        Ok(match Self::parse_colors(colors)? {
            Some(colors) if !colors.is_empty() => BackgroundMode::ColorKey { colors, threshold },
            _ => BackgroundMode::Automatic,
        })
    }

    pub(crate) fn clip_mode(
        mode: ClipModeArg,
        mask: Option<&Path>,
        colors: Option<&str>,
        tolerance: f32,
    ) -> Result<ClipMode> {
        match mode {
            ClipModeArg::Manual => Ok(ClipMode::Manual {
                mask: mask.map(Self::read).transpose()?,
            }),
            ClipModeArg::Auto => {
                let hints = match Self::parse_colors(colors)? {
                    Some(colors) if !colors.is_empty() => Some(
                        ColorKey::new(colors, tolerance).context("Invalid --tolerance")?,
                    ),
                    _ => None,
                };
                Ok(ClipMode::Automatic { hints })
            },
        }
    }

    pub(crate) fn halftone_options(
        dot_size: u32,
        scale: f32,
        colors: Option<&str>,
        tolerance: f32,
        spacing: f32,
    ) -> Result<HalftoneOptions> {
        let options = HalftoneOptions {
            dot_size,
            scale,
            tolerance,
            spacing,
            ..HalftoneOptions::default()
        };
        let colors = Self::parse_colors(colors)?.unwrap_or_default();
        Ok(options.with_base_from(&colors))
    }
}
