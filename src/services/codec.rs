//! Image codec service
//!
//! Decoding, channel normalization, dimension validation and PNG encoding
//! are kept apart from the editing algorithms so that every operation shares
//! one decode → transform → encode boundary.

use crate::{
    error::{ImagingError, Result},
    types::{Mask, RasterImage},
};
use image::{DynamicImage, GrayImage, ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;

/// Service for decoding and encoding raster buffers
pub struct ImageCodec;

impl ImageCodec {
    /// Decode image bytes, normalizing to RGB or RGBA
    ///
    /// # Errors
    /// - Bytes are not a decodable image (`Processing`)
    /// - Image has a zero dimension (`Input`)
    pub fn decode(bytes: &[u8]) -> Result<RasterImage> {
        let image = Self::decode_dynamic(bytes)?;
        Ok(RasterImage::from_dynamic(&image))
    }

    /// Decode image bytes into the `image` crate representation
    ///
    /// # Errors
    /// - Bytes are not a decodable image
    /// - Image has a zero dimension
    pub fn decode_dynamic(bytes: &[u8]) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(ImagingError::processing_stage_error(
                "decode",
                "no image data",
                None,
            ));
        }

        let image = image::load_from_memory(bytes).map_err(|e| {
            ImagingError::processing_stage_error(
                "decode",
                &format!("Failed to decode image from bytes: {}", e),
                Some(&format!("{} bytes", bytes.len())),
            )
        })?;

        if image.width() == 0 || image.height() == 0 {
            return Err(ImagingError::input(format!(
                "Image has zero dimension ({}x{})",
                image.width(),
                image.height()
            )));
        }

        tracing::debug!(
            width = image.width(),
            height = image.height(),
            color = ?image.color(),
            "Image decoded from bytes"
        );
        Ok(image)
    }

    /// Decode mask bytes as single-channel luma
    ///
    /// # Errors
    /// - Bytes are not a decodable image
    pub fn decode_mask(bytes: &[u8]) -> Result<Mask> {
        let image = Self::decode_dynamic(bytes)?;
        Ok(Mask::from_luma(image.to_luma8()))
    }

    /// Decode mask bytes and match them to the image dimensions
    ///
    /// A mismatched mask is resized with nearest-neighbour sampling.
    ///
    /// # Errors
    /// - Bytes are not a decodable image
    pub fn decode_mask_for(bytes: &[u8], image: &RasterImage) -> Result<Mask> {
        let mask = Self::decode_mask(bytes)?;
        Ok(mask.fit_to(image.width(), image.height()))
    }

    /// Check output dimensions against the hard maximum
    ///
    /// # Errors
    /// - Either dimension is zero or exceeds `max_dimension`
    pub fn validate_dimensions(width: u32, height: u32, max_dimension: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(ImagingError::input(format!(
                "Output dimensions {}x{} are empty",
                width, height
            )));
        }
        if width > max_dimension || height > max_dimension {
            return Err(ImagingError::input(format!(
                "Resulting image would exceed {}x{} pixels ({}x{})",
                max_dimension, max_dimension, width, height
            )));
        }
        Ok(())
    }

    /// Encode a raster as PNG (lossless, alpha preserved)
    ///
    /// # Errors
    /// - PNG encoder failure
    pub fn encode_png(image: RasterImage) -> Result<Vec<u8>> {
        Self::encode_dynamic_png(&image.into_dynamic())
    }

    /// Encode a mask as single-channel PNG
    ///
    /// # Errors
    /// - PNG encoder failure
    pub fn encode_mask_png(mask: &Mask) -> Result<Vec<u8>> {
        let luma: GrayImage = mask.to_luma()?;
        Self::encode_dynamic_png(&DynamicImage::ImageLuma8(luma))
    }

    /// Encode any decoded image as PNG
    ///
    /// # Errors
    /// - PNG encoder failure
    pub fn encode_dynamic_png(image: &DynamicImage) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(|e| {
                ImagingError::processing_stage_error(
                    "encode",
                    &format!("Failed to encode PNG: {}", e),
                    Some(&format!("{}x{}", image.width(), image.height())),
                )
            })?;
        Ok(buffer)
    }

    /// Dimensions from the image header without decoding pixels
    ///
    /// # Errors
    /// - Unknown format or unreadable header
    pub fn probe_dimensions(bytes: &[u8]) -> Result<(u32, u32)> {
        ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()?
            .into_dimensions()
            .map_err(|e| {
                ImagingError::processing_stage_error(
                    "decode",
                    &format!("Failed to read image header: {}", e),
                    Some(&format!("{} bytes", bytes.len())),
                )
            })
    }

    /// Read an image file into memory
    ///
    /// # Errors
    /// - File cannot be read
    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
        let path_ref = path.as_ref();
        std::fs::read(path_ref).map_err(|e| {
            ImagingError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read '{}': {}", path_ref.display(), e),
            ))
        })
    }

    /// Write encoded bytes, creating the parent directory when needed
    ///
    /// # Errors
    /// - Directory creation or write failure
    pub fn write_file<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path_ref, bytes).map_err(|e| {
            ImagingError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to write '{}': {}", path_ref.display(), e),
            ))
        })
    }
}
