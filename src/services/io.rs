//! Image I/O operations service
//!
//! This module separates file I/O operations from the layer model,
//! making the workspace testable without touching pixel codecs.

use crate::{
    config::OutputFormat,
    error::{RemovalError, Result},
    services::format::OutputFormatHandler,
};
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::path::Path;

/// Extensions accepted as input images
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff"];

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path
    ///
    /// Falls back to content sniffing when the extension does not match the
    /// actual encoding.
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(RemovalError::file_io_error(
                "read image file",
                path_ref,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        match image::open(path_ref) {
            Ok(img) => Ok(img),
            Err(e) => {
                log::debug!(
                    "Extension-based loading failed for {}: {}. Attempting content-based detection.",
                    path_ref.display(),
                    e
                );

                let data = std::fs::read(path_ref).map_err(|io_err| {
                    RemovalError::file_io_error("read image data", path_ref, &io_err)
                })?;

                image::load_from_memory(&data).map_err(RemovalError::from)
            },
        }
    }

    /// Load an image and convert it to 8-bit RGBA
    pub fn load_rgba<P: AsRef<Path>>(path: P) -> Result<RgbaImage> {
        Ok(Self::load_image(path)?.to_rgba8())
    }

    /// Save an RGBA buffer in the given output format
    ///
    /// Parent directories are created as needed.
    pub fn save_rgba<P: AsRef<Path>>(
        rgba: &RgbaImage,
        path: P,
        format: OutputFormat,
    ) -> Result<()> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                RemovalError::file_io_error("create output directory", parent, &e)
            })?;
        }

        let converted = OutputFormatHandler::convert_format(rgba, format);
        let image_format = match format {
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::Jpeg => ImageFormat::Jpeg,
            OutputFormat::Tiff => ImageFormat::Tiff,
        };

        converted
            .save_with_format(path_ref, image_format)
            .map_err(RemovalError::from)?;

        log::debug!(
            "Saved {}x{} image to {} as {:?}",
            rgba.width(),
            rgba.height(),
            path_ref.display(),
            format
        );
        Ok(())
    }

    /// Check whether a path has a supported input extension
    #[must_use]
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                SUPPORTED_EXTENSIONS
                    .iter()
                    .any(|s| s.eq_ignore_ascii_case(ext))
            })
    }
}
