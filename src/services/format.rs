//! Output format handling service
//!
//! This module separates output format conversion logic from the layer model.

use crate::config::OutputFormat;
use image::{DynamicImage, Rgb, RgbImage, RgbaImage};

/// Service for handling output format conversions
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Convert an RGBA composite to the specified output format
    ///
    /// JPEG has no alpha channel, so transparent pixels are blended onto white.
    #[must_use]
    pub fn convert_format(rgba_image: &RgbaImage, format: OutputFormat) -> DynamicImage {
        match format {
            OutputFormat::Png | OutputFormat::Tiff => DynamicImage::ImageRgba8(rgba_image.clone()),
            OutputFormat::Jpeg => {
                let (width, height) = rgba_image.dimensions();
                let mut rgb_image = RgbImage::new(width, height);

                for (x, y, pixel) in rgba_image.enumerate_pixels() {
                    let alpha = u32::from(pixel[3]);
                    let blend =
                        |c: u8| ((u32::from(c) * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
                    rgb_image.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
                }

                DynamicImage::ImageRgb8(rgb_image)
            },
        }
    }

    /// Get the appropriate file extension for a given output format
    ///
    /// # Examples
    /// ```rust
    /// use rembg_layers::{config::OutputFormat, services::OutputFormatHandler};
    ///
    /// assert_eq!(OutputFormatHandler::get_extension(OutputFormat::Png), "png");
    /// assert_eq!(OutputFormatHandler::get_extension(OutputFormat::Jpeg), "jpg");
    /// ```
    #[must_use]
    pub fn get_extension(format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Tiff => "tiff",
        }
    }

    /// Check if a format supports transparency (alpha channel)
    #[must_use]
    pub fn supports_transparency(format: OutputFormat) -> bool {
        !matches!(format, OutputFormat::Jpeg)
    }
}
