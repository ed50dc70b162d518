//! In-process layered image model
//!
//! [`Workspace`] keeps a list of open images, each with a canvas size and a
//! stack of RGBA layers. Layers carry an offset, a visibility flag and an
//! optional grayscale mask. Compositing uses straight (non-premultiplied)
//! alpha with the usual "over" operator.

use super::{Host, ImageId, LayerId, LayerPosition};
use crate::config::OutputFormat;
use crate::error::{RemovalError, Result};
use crate::services::ImageIOService;
use image::{GrayImage, Luma, Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One layer of an image
#[derive(Debug, Clone)]
pub struct Layer {
    id: LayerId,
    name: String,
    pixels: RgbaImage,
    offsets: (i32, i32),
    visible: bool,
    mask: Option<GrayImage>,
}

impl Layer {
    fn new(id: LayerId, name: &str, pixels: RgbaImage) -> Self {
        Self {
            id,
            name: name.to_string(),
            pixels,
            offsets: (0, 0),
            visible: true,
            mask: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> LayerId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    #[must_use]
    pub fn offsets(&self) -> (i32, i32) {
        self.offsets
    }

    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    #[must_use]
    pub fn mask(&self) -> Option<&GrayImage> {
        self.mask.as_ref()
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Alpha of the pixel at layer coordinates after applying the mask
    fn effective_alpha(&self, x: u32, y: u32) -> u8 {
        let alpha = self.pixels.get_pixel(x, y)[3];
        match &self.mask {
            Some(mask) => mul_u8(alpha, mask.get_pixel(x, y)[0]),
            None => alpha,
        }
    }

    /// Pixels with the mask folded into the alpha channel
    fn masked_pixels(&self) -> RgbaImage {
        match &self.mask {
            None => self.pixels.clone(),
            Some(_) => {
                let mut out = self.pixels.clone();
                for (x, y, px) in out.enumerate_pixels_mut() {
                    px[3] = self.effective_alpha(x, y);
                }
                out
            },
        }
    }
}

#[derive(Debug, Clone)]
struct Snapshot {
    width: u32,
    height: u32,
    layers: Vec<Layer>,
}

#[derive(Debug)]
struct Document {
    id: ImageId,
    name: String,
    source: Option<PathBuf>,
    width: u32,
    height: u32,
    /// Top first
    layers: Vec<Layer>,
    undo_stack: Vec<Snapshot>,
    group_depth: u32,
}

impl Document {
    fn layer_index(&self, layer: LayerId) -> Result<usize> {
        self.layers
            .iter()
            .position(|l| l.id == layer)
            .ok_or_else(|| RemovalError::host(format!("{layer} does not belong to {}", self.id)))
    }

    fn layer(&self, layer: LayerId) -> Result<&Layer> {
        let index = self.layer_index(layer)?;
        Ok(&self.layers[index])
    }

    fn layer_mut(&mut self, layer: LayerId) -> Result<&mut Layer> {
        let index = self.layer_index(layer)?;
        Ok(&mut self.layers[index])
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            width: self.width,
            height: self.height,
            layers: self.layers.clone(),
        }
    }

    fn composite(&self) -> RgbaImage {
        let mut canvas = RgbaImage::new(self.width, self.height);
        for layer in self.layers.iter().rev().filter(|l| l.visible) {
            let (ox, oy) = layer.offsets;
            for (x, y, src) in layer.pixels.enumerate_pixels() {
                let cx = i64::from(x) + i64::from(ox);
                let cy = i64::from(y) + i64::from(oy);
                if cx < 0 || cy < 0 || cx >= i64::from(self.width) || cy >= i64::from(self.height) {
                    continue;
                }
                let alpha = layer.effective_alpha(x, y);
                if alpha == 0 {
                    continue;
                }
                let dst = canvas.get_pixel_mut(cx as u32, cy as u32);
                *dst = blend_over(*src, alpha, *dst);
            }
        }
        canvas
    }
}

/// Layered images held in memory
#[derive(Debug, Default)]
pub struct Workspace {
    documents: Vec<Document>,
    next_image: u32,
    next_layer: u32,
    messages: Vec<String>,
}

impl Workspace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an image file as a new single-layer image
    pub fn open<P: AsRef<Path>>(&mut self, path: P) -> Result<ImageId> {
        let path = path.as_ref();
        let pixels = ImageIOService::load_rgba(path)?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());

        let id = self.add_image(&name, pixels);
        if let Some(doc) = self.documents.last_mut() {
            doc.source = Some(path.to_path_buf());
        }
        debug!(image = %id, path = %path.display(), "Opened image");
        Ok(id)
    }

    /// Add an image whose single layer holds `pixels`
    pub fn add_image(&mut self, name: &str, pixels: RgbaImage) -> ImageId {
        let (width, height) = pixels.dimensions();
        let id = self.add_empty_image(name, width, height);
        let layer = Layer::new(self.allocate_layer(), name, pixels);
        if let Some(doc) = self.documents.last_mut() {
            doc.layers.push(layer);
        }
        id
    }

    /// Add an image with a canvas but no layers
    pub fn add_empty_image(&mut self, name: &str, width: u32, height: u32) -> ImageId {
        self.next_image += 1;
        let id = ImageId(self.next_image);
        self.documents.push(Document {
            id,
            name: name.to_string(),
            source: None,
            width,
            height,
            layers: Vec::new(),
            undo_stack: Vec::new(),
            group_depth: 0,
        });
        id
    }

    /// File the image was opened from, if any
    pub fn source_path(&self, image: ImageId) -> Result<Option<&Path>> {
        Ok(self.doc(image)?.source.as_deref())
    }

    pub fn layer(&self, image: ImageId, layer: LayerId) -> Result<&Layer> {
        self.doc(image)?.layer(layer)
    }

    /// Visible layers merged onto a transparent canvas
    pub fn composite(&self, image: ImageId) -> Result<RgbaImage> {
        Ok(self.doc(image)?.composite())
    }

    /// Composite the image and write it to `path`
    pub fn save_composite<P: AsRef<Path>>(
        &self,
        image: ImageId,
        path: P,
        format: OutputFormat,
    ) -> Result<()> {
        let composite = self.composite(image)?;
        ImageIOService::save_rgba(&composite, path, format)
    }

    /// Messages shown to the user so far
    #[must_use]
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Number of undo steps recorded for `image`
    pub fn undo_steps(&self, image: ImageId) -> Result<usize> {
        Ok(self.doc(image)?.undo_stack.len())
    }

    /// Revert the last completed undo group; returns false when there is none
    pub fn undo(&mut self, image: ImageId) -> Result<bool> {
        let doc = self.doc_mut(image)?;
        if doc.group_depth > 0 {
            return Err(RemovalError::host(format!(
                "cannot undo {image} while an undo group is open"
            )));
        }
        match doc.undo_stack.pop() {
            Some(snapshot) => {
                doc.width = snapshot.width;
                doc.height = snapshot.height;
                doc.layers = snapshot.layers;
                Ok(true)
            },
            None => Ok(false),
        }
    }

    fn allocate_layer(&mut self) -> LayerId {
        self.next_layer += 1;
        LayerId(self.next_layer)
    }

    fn doc(&self, image: ImageId) -> Result<&Document> {
        self.documents
            .iter()
            .find(|d| d.id == image)
            .ok_or_else(|| RemovalError::host(format!("unknown {image}")))
    }

    fn doc_mut(&mut self, image: ImageId) -> Result<&mut Document> {
        self.documents
            .iter_mut()
            .find(|d| d.id == image)
            .ok_or_else(|| RemovalError::host(format!("unknown {image}")))
    }
}

impl Host for Workspace {
    fn images(&self) -> Vec<ImageId> {
        self.documents.iter().map(|d| d.id).collect()
    }

    fn image_name(&self, image: ImageId) -> Result<String> {
        Ok(self.doc(image)?.name.clone())
    }

    fn dimensions(&self, image: ImageId) -> Result<(u32, u32)> {
        let doc = self.doc(image)?;
        Ok((doc.width, doc.height))
    }

    fn layers(&self, image: ImageId) -> Result<Vec<LayerId>> {
        Ok(self.doc(image)?.layers.iter().map(|l| l.id).collect())
    }

    fn layer_offsets(&self, image: ImageId, layer: LayerId) -> Result<(i32, i32)> {
        Ok(self.layer(image, layer)?.offsets)
    }

    fn set_layer_offsets(
        &mut self,
        image: ImageId,
        layer: LayerId,
        offsets: (i32, i32),
    ) -> Result<()> {
        self.doc_mut(image)?.layer_mut(layer)?.offsets = offsets;
        Ok(())
    }

    fn set_layer_visible(&mut self, image: ImageId, layer: LayerId, visible: bool) -> Result<()> {
        self.doc_mut(image)?.layer_mut(layer)?.visible = visible;
        Ok(())
    }

    fn export_layer(&self, image: ImageId, layer: LayerId, path: &Path) -> Result<()> {
        let pixels = self.layer(image, layer)?.masked_pixels();
        ImageIOService::save_rgba(&pixels, path, OutputFormat::Png)
    }

    fn import_layer(&mut self, image: ImageId, path: &Path, name: &str) -> Result<LayerId> {
        // Check the target first so a bad id does not cost a decode
        self.doc(image)?;
        let pixels = ImageIOService::load_rgba(path)?;
        let id = self.allocate_layer();
        self.doc_mut(image)?.layers.insert(0, Layer::new(id, name, pixels));
        Ok(id)
    }

    fn add_alpha_mask(&mut self, image: ImageId, target: LayerId, source: LayerId) -> Result<()> {
        let doc = self.doc_mut(image)?;
        let source_layer = doc.layer(source)?;
        let target_layer = doc.layer(target)?;
        if target_layer.mask.is_some() {
            debug!(image = %image, layer = %target, "Replacing existing mask");
        }

        let (sw, sh) = source_layer.dimensions();
        let (sox, soy) = source_layer.offsets;
        let (tw, th) = target_layer.dimensions();
        let (tox, toy) = target_layer.offsets;

        let mut mask = GrayImage::new(tw, th);
        for (x, y, value) in mask.enumerate_pixels_mut() {
            let sx = i64::from(x) + i64::from(tox) - i64::from(sox);
            let sy = i64::from(y) + i64::from(toy) - i64::from(soy);
            if sx >= 0 && sy >= 0 && sx < i64::from(sw) && sy < i64::from(sh) {
                *value = Luma([source_layer.effective_alpha(sx as u32, sy as u32)]);
            }
        }

        doc.layer_mut(target)?.mask = Some(mask);
        Ok(())
    }

    fn remove_layer(&mut self, image: ImageId, layer: LayerId) -> Result<()> {
        let doc = self.doc_mut(image)?;
        let index = doc.layer_index(layer)?;
        doc.layers.remove(index);
        Ok(())
    }

    fn insert_fill_layer(
        &mut self,
        image: ImageId,
        name: &str,
        color: Rgba<u8>,
        position: LayerPosition,
    ) -> Result<LayerId> {
        let (width, height) = self.dimensions(image)?;
        let id = self.allocate_layer();
        let layer = Layer::new(id, name, RgbaImage::from_pixel(width, height, color));
        let doc = self.doc_mut(image)?;
        match position {
            LayerPosition::Top => doc.layers.insert(0, layer),
            LayerPosition::Bottom => doc.layers.push(layer),
        }
        Ok(id)
    }

    fn flatten(&mut self, image: ImageId) -> Result<LayerId> {
        let composite = self.composite(image)?;
        let id = self.allocate_layer();
        let doc = self.doc_mut(image)?;
        let name = doc
            .layers
            .iter()
            .rev()
            .find(|l| l.visible)
            .map_or_else(|| "Background".to_string(), |l| l.name.clone());
        let dropped = doc.layers.len();
        doc.layers = vec![Layer::new(id, &name, composite)];
        debug!(image = %image, merged_layers = dropped, "Flattened image");
        Ok(id)
    }

    fn resize_canvas(
        &mut self,
        image: ImageId,
        width: u32,
        height: u32,
        offset_x: i32,
        offset_y: i32,
    ) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(RemovalError::host(format!(
                "cannot resize {image} to {width}x{height}"
            )));
        }
        let doc = self.doc_mut(image)?;
        doc.width = width;
        doc.height = height;
        for layer in &mut doc.layers {
            layer.offsets.0 += offset_x;
            layer.offsets.1 += offset_y;
        }
        Ok(())
    }

    fn undo_group_start(&mut self, image: ImageId) -> Result<()> {
        let doc = self.doc_mut(image)?;
        if doc.group_depth == 0 {
            let snapshot = doc.snapshot();
            doc.undo_stack.push(snapshot);
        }
        doc.group_depth += 1;
        Ok(())
    }

    fn undo_group_end(&mut self, image: ImageId) -> Result<()> {
        let doc = self.doc_mut(image)?;
        if doc.group_depth == 0 {
            return Err(RemovalError::host(format!("no open undo group on {image}")));
        }
        doc.group_depth -= 1;
        Ok(())
    }

    fn message(&mut self, text: &str) {
        info!(target: "rembg_layers::host", "{}", text);
        self.messages.push(text.to_string());
    }
}

fn mul_u8(a: u8, b: u8) -> u8 {
    ((u32::from(a) * u32::from(b) + 127) / 255) as u8
}

/// Straight-alpha "over": `src` with coverage `alpha` on top of `dst`
fn blend_over(src: Rgba<u8>, alpha: u8, dst: Rgba<u8>) -> Rgba<u8> {
    let sa = f32::from(alpha) / 255.0;
    let da = f32::from(dst[3]) / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let channel = |i: usize| {
        let value = (f32::from(src[i]) * sa + f32::from(dst[i]) * da * (1.0 - sa)) / out_a;
        value.round().clamp(0.0, 255.0) as u8
    };
    Rgba([
        channel(0),
        channel(1),
        channel(2),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}
