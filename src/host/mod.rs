//! Host application seam
//!
//! Images and layers belong to the host; the procedure only asks it to run
//! editing primitives and never keeps pixel data of its own. [`Host`] lists
//! those primitives. [`Workspace`] is the in-process implementation used by
//! the command-line front-end and the tests.

pub mod workspace;

pub use workspace::{Layer, Workspace};

use crate::error::Result;
use image::Rgba;
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Handle to an open image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ImageId(pub u32);

/// Handle to a layer inside an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LayerId(pub u32);

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "image#{}", self.0)
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer#{}", self.0)
    }
}

/// Where a new layer goes in the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerPosition {
    Top,
    Bottom,
}

/// Editing primitives the host application provides
///
/// Layer lists are ordered top to bottom. Offsets are the layer's top-left
/// corner in canvas coordinates.
pub trait Host {
    /// Every open image, in the order they were opened
    fn images(&self) -> Vec<ImageId>;

    fn image_name(&self, image: ImageId) -> Result<String>;

    /// Canvas width and height
    fn dimensions(&self, image: ImageId) -> Result<(u32, u32)>;

    /// Layers of `image`, top first
    fn layers(&self, image: ImageId) -> Result<Vec<LayerId>>;

    fn layer_offsets(&self, image: ImageId, layer: LayerId) -> Result<(i32, i32)>;

    fn set_layer_offsets(&mut self, image: ImageId, layer: LayerId, offsets: (i32, i32))
        -> Result<()>;

    fn set_layer_visible(&mut self, image: ImageId, layer: LayerId, visible: bool) -> Result<()>;

    /// Write the layer's pixels to `path` as a lossless image file
    fn export_layer(&self, image: ImageId, layer: LayerId, path: &Path) -> Result<()>;

    /// Load `path` and insert it as a new top layer at offset (0, 0)
    fn import_layer(&mut self, image: ImageId, path: &Path, name: &str) -> Result<LayerId>;

    /// Give `target` a mask built from the alpha channel of `source`,
    /// replacing any mask it already has
    fn add_alpha_mask(&mut self, image: ImageId, target: LayerId, source: LayerId) -> Result<()>;

    fn remove_layer(&mut self, image: ImageId, layer: LayerId) -> Result<()>;

    /// Insert a canvas-sized layer filled with `color`
    fn insert_fill_layer(
        &mut self,
        image: ImageId,
        name: &str,
        color: Rgba<u8>,
        position: LayerPosition,
    ) -> Result<LayerId>;

    /// Merge visible layers into one, discarding hidden layers
    fn flatten(&mut self, image: ImageId) -> Result<LayerId>;

    /// Change the canvas size, moving every layer by the offset
    fn resize_canvas(
        &mut self,
        image: ImageId,
        width: u32,
        height: u32,
        offset_x: i32,
        offset_y: i32,
    ) -> Result<()>;

    fn undo_group_start(&mut self, image: ImageId) -> Result<()>;

    fn undo_group_end(&mut self, image: ImageId) -> Result<()>;

    /// Show a message to the user
    fn message(&mut self, text: &str);
}
