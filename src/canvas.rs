use std::borrow::Cow;
use std::fmt;

use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EditorError, Result};
use crate::log_warn;
use crate::ops::transform::{self, Affine};
use crate::ops::{adjustments, filters};

/// Logical size used when a requested surface cannot be created.
pub const DEFAULT_WIDTH: u32 = 800;
pub const DEFAULT_HEIGHT: u32 = 600;

/// Upper bound on surface area (~256 megapixels).
const MAX_PIXELS: u64 = 256_000_000;

/// Largest accepted blur radius, in pixels.
pub const MAX_BLUR_RADIUS: f32 = 100.0;

pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

// ============================================================================
// COMPOSITE MODE
// ============================================================================

/// How painted pixels combine with what is already on a surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CompositeMode {
    /// Source-over.
    #[default]
    Normal,
    /// Destination-out: the painted alpha is removed from the surface.
    Erase,
}

impl CompositeMode {
    pub fn name(&self) -> &'static str {
        match self {
            CompositeMode::Normal => "normal",
            CompositeMode::Erase => "erase",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "normal" => Some(CompositeMode::Normal),
            "erase" | "eraser" => Some(CompositeMode::Erase),
            _ => None,
        }
    }
}

// ============================================================================
// RASTER SURFACE – flat row-major RGBA8 buffer
// ============================================================================

/// A 2D pixel buffer, row-major, 4 bytes (R, G, B, A) per pixel.
///
/// Invariant: `data.len() == width * height * 4`, and both dimensions are
/// at least 1.
#[derive(Clone, PartialEq, Eq)]
pub struct RasterSurface {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl fmt::Debug for RasterSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterSurface")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

fn checked_len(width: u32, height: u32) -> Result<usize> {
    if width == 0 || height == 0 {
        return Err(EditorError::validation(format!(
            "surface dimensions {}×{} must be non-zero",
            width, height
        )));
    }
    let total = width as u64 * height as u64;
    if total > MAX_PIXELS {
        return Err(EditorError::validation(format!(
            "surface dimensions {}×{} exceed {} pixels",
            width, height, MAX_PIXELS
        )));
    }
    Ok(total as usize * 4)
}

impl RasterSurface {
    // ---- construction -------------------------------------------------------

    /// Create a fully transparent surface, reporting invalid dimensions or
    /// allocation failure instead of falling back.
    pub fn try_new(width: u32, height: u32) -> Result<Self> {
        let len = checked_len(width, height)?;
        let mut data = Vec::new();
        data.try_reserve_exact(len)?;
        data.resize(len, 0);
        Ok(Self { width, height, data })
    }

    /// Create a fully transparent surface.  Invalid dimensions or a failed
    /// allocation fall back to `DEFAULT_WIDTH × DEFAULT_HEIGHT`.
    pub fn new(width: u32, height: u32) -> Self {
        match Self::try_new(width, height) {
            Ok(surface) => surface,
            Err(e) => {
                log_warn!(
                    "RasterSurface::new: {}×{} unavailable ({}), using {}×{}",
                    width, height, e, DEFAULT_WIDTH, DEFAULT_HEIGHT
                );
                Self {
                    width: DEFAULT_WIDTH,
                    height: DEFAULT_HEIGHT,
                    data: vec![0; DEFAULT_WIDTH as usize * DEFAULT_HEIGHT as usize * 4],
                }
            }
        }
    }

    pub fn new_filled(width: u32, height: u32, color: Rgba<u8>) -> Self {
        let mut surface = Self::new(width, height);
        if color != TRANSPARENT {
            surface.fill(color);
        }
        surface
    }

    /// Wrap an existing RGBA buffer.  `data` must be exactly
    /// `width * height * 4` bytes.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let len = checked_len(width, height)?;
        if data.len() != len {
            return Err(EditorError::validation(format!(
                "buffer holds {} bytes, {}×{} RGBA needs {}",
                data.len(),
                width,
                height,
                len
            )));
        }
        Ok(Self { width, height, data })
    }

    /// Import a decoded image.
    pub fn from_rgba_image(img: &RgbaImage) -> Result<Self> {
        Self::from_raw(img.width(), img.height(), img.as_raw().clone())
    }

    pub fn to_rgba_image(&self) -> RgbaImage {
        RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }

    /// Copy the buffer, reporting allocation failure instead of aborting.
    pub fn try_clone(&self) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(self.data.len())?;
        data.extend_from_slice(&self.data);
        Ok(Self {
            width: self.width,
            height: self.height,
            data,
        })
    }

    // ---- accessors ----------------------------------------------------------

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    pub fn memory_bytes(&self) -> usize {
        self.data.len()
    }

    /// The buffer viewed as `[R, G, B, A]` pixels.
    #[inline]
    pub fn pixels(&self) -> &[[u8; 4]] {
        bytemuck::cast_slice(&self.data)
    }

    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [[u8; 4]] {
        bytemuck::cast_slice_mut(&mut self.data)
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    #[inline]
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < self.width as i64 && y < self.height as i64
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(Rgba(self.pixels()[self.index(x, y)]))
    }

    /// Out-of-bounds writes are ignored.
    pub fn put_pixel(&mut self, x: u32, y: u32, color: Rgba<u8>) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = self.index(x, y);
        self.pixels_mut()[idx] = color.0;
    }

    /// True when every pixel has zero alpha.
    pub fn is_blank(&self) -> bool {
        self.pixels().iter().all(|p| p[3] == 0)
    }

    // ---- primitives ---------------------------------------------------------

    /// Reset every pixel to transparent.
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    pub fn fill(&mut self, color: Rgba<u8>) {
        for px in self.pixels_mut() {
            *px = color.0;
        }
    }

    /// Replace the pixels of a rectangle, clipped to the surface.
    pub fn fill_rect(&mut self, x: i32, y: i32, w: u32, h: u32, color: Rgba<u8>) {
        let x0 = (x as i64).max(0);
        let y0 = (y as i64).max(0);
        let x1 = (x as i64 + w as i64).min(self.width as i64);
        let y1 = (y as i64 + h as i64).min(self.height as i64);
        if x0 >= x1 || y0 >= y1 {
            return;
        }
        let width = self.width as usize;
        let pixels = self.pixels_mut();
        for row in y0 as usize..y1 as usize {
            let start = row * width;
            pixels[start + x0 as usize..start + x1 as usize].fill(color.0);
        }
    }

    /// Source-over a whole surface at an integer offset, clipped.
    pub fn blit(&mut self, source: &RasterSurface, x: i32, y: i32) {
        for sy in 0..source.height {
            let dy = y as i64 + sy as i64;
            if dy < 0 || dy >= self.height as i64 {
                continue;
            }
            for sx in 0..source.width {
                let dx = x as i64 + sx as i64;
                if dx < 0 || dx >= self.width as i64 {
                    continue;
                }
                let top = Rgba(source.pixels()[source.index(sx, sy)]);
                let idx = self.index(dx as u32, dy as u32);
                let base = Rgba(self.pixels()[idx]);
                self.pixels_mut()[idx] = blend_pixel(base, top, 1.0).0;
            }
        }
    }

    /// Source-over a same-sized surface at the given opacity.
    /// Rows are blended in parallel.
    pub fn composite_over(&mut self, top: &RasterSurface, opacity: f32) -> Result<()> {
        if top.dimensions() != self.dimensions() {
            return Err(EditorError::validation(format!(
                "cannot composite {}×{} onto {}×{}",
                top.width, top.height, self.width, self.height
            )));
        }
        let stride = self.width as usize * 4;
        self.data
            .par_chunks_mut(stride)
            .zip(top.data.par_chunks(stride))
            .for_each(|(dst_row, src_row)| {
                let dst: &mut [[u8; 4]] = bytemuck::cast_slice_mut(dst_row);
                let src: &[[u8; 4]] = bytemuck::cast_slice(src_row);
                for (d, s) in dst.iter_mut().zip(src) {
                    *d = blend_pixel(Rgba(*d), Rgba(*s), opacity).0;
                }
            });
        Ok(())
    }

    /// Draw a round-capped, anti-aliased line segment.  A zero-length
    /// segment stamps a round dot.
    pub fn draw_stroke_segment(
        &mut self,
        p0: (f32, f32),
        p1: (f32, f32),
        width: f32,
        color: Rgba<u8>,
        mode: CompositeMode,
    ) {
        let radius = width * 0.5;
        if !(radius > 0.0) || ![p0.0, p0.1, p1.0, p1.1].iter().all(|v| v.is_finite()) {
            return;
        }

        let min_x = ((p0.0.min(p1.0) - radius - 1.0).floor() as i64).max(0);
        let min_y = ((p0.1.min(p1.1) - radius - 1.0).floor() as i64).max(0);
        let max_x = ((p0.0.max(p1.0) + radius + 1.0).ceil() as i64).min(self.width as i64 - 1);
        let max_y = ((p0.1.max(p1.1) + radius + 1.0).ceil() as i64).min(self.height as i64 - 1);
        if min_x > max_x || min_y > max_y {
            return;
        }

        let dx = p1.0 - p0.0;
        let dy = p1.1 - p0.1;
        let len_sq = dx * dx + dy * dy;

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                // Distance from the pixel center to the closest point on the segment
                let px = x as f32 + 0.5;
                let py = y as f32 + 0.5;
                let t = if len_sq > 0.0 {
                    (((px - p0.0) * dx + (py - p0.1) * dy) / len_sq).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let cx = p0.0 + dx * t;
                let cy = p0.1 + dy * t;
                let dist = ((px - cx) * (px - cx) + (py - cy) * (py - cy)).sqrt();
                let coverage = (radius + 0.5 - dist).clamp(0.0, 1.0);
                if coverage > 0.0 {
                    self.stamp(x as u32, y as u32, color, coverage, mode);
                }
            }
        }
    }

    /// Draw `source` through an affine map (source pixel space → this
    /// surface).  See [`transform::blit_affine`].
    pub fn blit_transformed(&mut self, source: &RasterSurface, affine: &Affine, mode: CompositeMode) {
        transform::blit_affine(self, source, affine, mode);
    }

    /// Combine one pixel with `color` at partial `coverage`.
    #[inline]
    pub(crate) fn stamp(&mut self, x: u32, y: u32, color: Rgba<u8>, coverage: f32, mode: CompositeMode) {
        let idx = self.index(x, y);
        let base = Rgba(self.pixels()[idx]);
        let out = match mode {
            CompositeMode::Normal => blend_pixel(base, color, coverage),
            CompositeMode::Erase => erase_pixel(base, color[3] as f32 / 255.0 * coverage),
        };
        self.pixels_mut()[idx] = out.0;
    }
}

// ============================================================================
// PIXEL BLENDING
// ============================================================================

/// Unpremultiplied source-over of `top` onto `base`, with `top`'s alpha
/// scaled by `opacity`.
pub fn blend_pixel(base: Rgba<u8>, top: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    // Fast path: fully transparent top pixel
    if top[3] == 0 || opacity <= 0.0 {
        return base;
    }
    // Fast path: opaque top pixel at full opacity overwrites
    if opacity >= 1.0 && top[3] == 255 {
        return top;
    }

    let opacity = opacity.clamp(0.0, 1.0);
    let base_a = base[3] as f32 / 255.0;
    let top_a = (top[3] as f32 / 255.0) * opacity;

    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a <= 0.0 {
        return TRANSPARENT;
    }

    let channel = |c: usize| {
        let b = base[c] as f32 / 255.0;
        let t = top[c] as f32 / 255.0;
        let v = (t * top_a + b * base_a * (1.0 - top_a)) / out_a;
        (v * 255.0).round().clamp(0.0, 255.0) as u8
    };

    Rgba([
        channel(0),
        channel(1),
        channel(2),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

/// Remove `strength` (0..1) of the pixel's alpha.  Fully erased pixels
/// collapse to transparent black.
pub fn erase_pixel(base: Rgba<u8>, strength: f32) -> Rgba<u8> {
    let strength = strength.clamp(0.0, 1.0);
    let a = (base[3] as f32 * (1.0 - strength)).round().clamp(0.0, 255.0) as u8;
    if a == 0 {
        TRANSPARENT
    } else {
        Rgba([base[0], base[1], base[2], a])
    }
}

// ============================================================================
// LAYER
// ============================================================================

/// Stable layer identity, independent of stack position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(Uuid);

impl LayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single typed layer attribute edit.
#[derive(Clone, Debug, PartialEq)]
pub enum LayerProperty {
    Name(String),
    Visible(bool),
    /// Clamped to `[0, 1]`.
    Opacity(f32),
    /// Multiplier, must be finite and > 0.
    Brightness(f32),
    /// Multiplier, must be finite and > 0.
    Contrast(f32),
    /// Multiplier, must be finite and > 0.
    Saturation(f32),
    /// Gaussian blur radius in pixels, `0..=MAX_BLUR_RADIUS`.
    Blur(f32),
}

impl LayerProperty {
    pub fn label(&self) -> &'static str {
        match self {
            LayerProperty::Name(_) => "Name",
            LayerProperty::Visible(_) => "Visibility",
            LayerProperty::Opacity(_) => "Opacity",
            LayerProperty::Brightness(_) => "Brightness",
            LayerProperty::Contrast(_) => "Contrast",
            LayerProperty::Saturation(_) => "Saturation",
            LayerProperty::Blur(_) => "Blur",
        }
    }

    /// Check the value without touching any layer.
    pub fn validate(&self) -> Result<()> {
        let multiplier = |name: &str, v: f32| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(EditorError::validation(format!("{} must be > 0, got {}", name, v)))
            }
        };
        match self {
            LayerProperty::Name(_) | LayerProperty::Visible(_) => Ok(()),
            LayerProperty::Opacity(v) => {
                if v.is_nan() {
                    Err(EditorError::validation("opacity is NaN"))
                } else {
                    Ok(())
                }
            }
            LayerProperty::Brightness(v) => multiplier("brightness", *v),
            LayerProperty::Contrast(v) => multiplier("contrast", *v),
            LayerProperty::Saturation(v) => multiplier("saturation", *v),
            LayerProperty::Blur(v) => {
                if v.is_finite() && (0.0..=MAX_BLUR_RADIUS).contains(v) {
                    Ok(())
                } else {
                    Err(EditorError::validation(format!(
                        "blur radius must be within 0..={}, got {}",
                        MAX_BLUR_RADIUS, v
                    )))
                }
            }
        }
    }
}

/// The persisted, pixel-free part of a layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerMetadata {
    pub name: String,
    pub visible: bool,
    pub opacity: f32,
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub blur: f32,
}

#[derive(Clone, Debug)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub visible: bool,
    pub surface: RasterSurface,
    opacity: f32,
    brightness: f32,
    contrast: f32,
    saturation: f32,
    blur_radius: f32,
}

impl Layer {
    pub fn new(name: impl Into<String>, width: u32, height: u32, fill_color: Rgba<u8>) -> Self {
        Self::from_surface(name, RasterSurface::new_filled(width, height, fill_color))
    }

    pub fn from_surface(name: impl Into<String>, surface: RasterSurface) -> Self {
        Self {
            id: LayerId::new(),
            name: name.into(),
            visible: true,
            surface,
            opacity: 1.0,
            brightness: 1.0,
            contrast: 1.0,
            saturation: 1.0,
            blur_radius: 0.0,
        }
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn brightness(&self) -> f32 {
        self.brightness
    }

    pub fn contrast(&self) -> f32 {
        self.contrast
    }

    pub fn saturation(&self) -> f32 {
        self.saturation
    }

    pub fn blur_radius(&self) -> f32 {
        self.blur_radius
    }

    /// Apply one property edit.  Nothing changes when validation fails.
    pub fn set_property(&mut self, prop: LayerProperty) -> Result<()> {
        prop.validate()?;
        match prop {
            LayerProperty::Name(name) => self.name = name,
            LayerProperty::Visible(v) => self.visible = v,
            LayerProperty::Opacity(v) => self.opacity = v.clamp(0.0, 1.0),
            LayerProperty::Brightness(v) => self.brightness = v,
            LayerProperty::Contrast(v) => self.contrast = v,
            LayerProperty::Saturation(v) => self.saturation = v,
            LayerProperty::Blur(v) => self.blur_radius = v,
        }
        Ok(())
    }

    pub fn metadata(&self) -> LayerMetadata {
        LayerMetadata {
            name: self.name.clone(),
            visible: self.visible,
            opacity: self.opacity,
            brightness: self.brightness,
            contrast: self.contrast,
            saturation: self.saturation,
            blur: self.blur_radius,
        }
    }

    /// Apply a metadata record, validating every field before writing any.
    pub fn apply_metadata(&mut self, meta: LayerMetadata) -> Result<()> {
        let props = [
            LayerProperty::Opacity(meta.opacity),
            LayerProperty::Brightness(meta.brightness),
            LayerProperty::Contrast(meta.contrast),
            LayerProperty::Saturation(meta.saturation),
            LayerProperty::Blur(meta.blur),
        ];
        for prop in &props {
            prop.validate()?;
        }
        self.name = meta.name;
        self.visible = meta.visible;
        for prop in props {
            self.set_property(prop)?;
        }
        Ok(())
    }

    fn has_color_adjustments(&self) -> bool {
        self.brightness != 1.0 || self.contrast != 1.0 || self.saturation != 1.0
    }

    pub fn has_filters(&self) -> bool {
        self.has_color_adjustments() || self.blur_radius > 0.0
    }

    /// The layer's pixels after its display filters: color adjustments
    /// first, then blur.  Borrowed when no filter is active.
    pub fn rendered(&self) -> Cow<'_, RasterSurface> {
        if !self.has_filters() {
            return Cow::Borrowed(&self.surface);
        }
        let mut out = self.surface.clone();
        if self.has_color_adjustments() {
            adjustments::color_adjust(&mut out, self.brightness, self.contrast, self.saturation);
        }
        if self.blur_radius > 0.0 {
            out = filters::gaussian_blur(&out, self.blur_radius);
        }
        Cow::Owned(out)
    }

    /// Deep copy that reports allocation failure.
    pub fn try_clone(&self) -> Result<Layer> {
        Ok(Layer {
            id: self.id,
            name: self.name.clone(),
            visible: self.visible,
            surface: self.surface.try_clone()?,
            opacity: self.opacity,
            brightness: self.brightness,
            contrast: self.contrast,
            saturation: self.saturation,
            blur_radius: self.blur_radius,
        })
    }

    pub fn memory_bytes(&self) -> usize {
        self.surface.memory_bytes() + self.name.len()
    }
}

// ============================================================================
// LAYER STACK
// ============================================================================

/// Direction for [`LayerStack::move_layer`].  `Up` moves toward the top of
/// the stack (higher index, drawn later).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

/// Ordered layers, bottom (index 0) to top.  Never empty.
#[derive(Clone, Debug)]
pub struct LayerStack {
    layers: Vec<Layer>,
    active_index: usize,
    width: u32,
    height: u32,
    /// Counter used for "Layer N" default names.
    next_layer_number: usize,
}

impl LayerStack {
    /// A stack holding one transparent layer named "Layer 1".
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_background(width, height, TRANSPARENT)
    }

    pub fn with_background(width: u32, height: u32, color: Rgba<u8>) -> Self {
        let first = Layer::new("Layer 1", width, height, color);
        let (width, height) = first.surface.dimensions();
        Self {
            layers: vec![first],
            active_index: 0,
            width,
            height,
            next_layer_number: 2,
        }
    }

    // ---- queries ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Always false after construction; present for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, index: usize) -> Result<&Layer> {
        self.layers
            .get(index)
            .ok_or_else(|| EditorError::validation(format!("layer index {} out of range ({} layers)", index, self.layers.len())))
    }

    pub fn layer_mut(&mut self, index: usize) -> Result<&mut Layer> {
        let len = self.layers.len();
        self.layers
            .get_mut(index)
            .ok_or_else(|| EditorError::validation(format!("layer index {} out of range ({} layers)", index, len)))
    }

    pub fn index_of(&self, id: LayerId) -> Result<usize> {
        self.layers
            .iter()
            .position(|l| l.id == id)
            .ok_or_else(|| EditorError::validation(format!("unknown layer id {}", id)))
    }

    pub fn layer_by_id(&self, id: LayerId) -> Result<&Layer> {
        let idx = self.index_of(id)?;
        Ok(&self.layers[idx])
    }

    pub fn layer_by_id_mut(&mut self, id: LayerId) -> Result<&mut Layer> {
        let idx = self.index_of(id)?;
        Ok(&mut self.layers[idx])
    }

    pub fn active_index(&self) -> usize {
        self.active_index
    }

    pub fn active_layer(&self) -> &Layer {
        &self.layers[self.active_index]
    }

    pub fn active_layer_mut(&mut self) -> &mut Layer {
        &mut self.layers[self.active_index]
    }

    pub fn memory_bytes(&self) -> usize {
        self.layers.iter().map(Layer::memory_bytes).sum()
    }

    // ---- structure ----------------------------------------------------------

    pub fn set_active(&mut self, id: LayerId) -> Result<()> {
        self.active_index = self.index_of(id)?;
        Ok(())
    }

    /// Insert a new transparent layer directly above the active one and make
    /// it active.
    pub fn add_layer(&mut self) -> LayerId {
        let name = format!("Layer {}", self.next_layer_number);
        self.next_layer_number += 1;
        let layer = Layer::new(name, self.width, self.height, TRANSPARENT);
        let id = layer.id;
        let index = self.active_index + 1;
        self.layers.insert(index, layer);
        self.active_index = index;
        id
    }

    /// Insert an existing layer at `index` (clamped to the top) and make it
    /// active.  Its surface must match the stack size.
    pub fn insert_layer(&mut self, index: usize, layer: Layer) -> Result<LayerId> {
        if layer.surface.dimensions() != (self.width, self.height) {
            return Err(EditorError::validation(format!(
                "layer is {}×{}, stack is {}×{}",
                layer.surface.width(),
                layer.surface.height(),
                self.width,
                self.height
            )));
        }
        let id = layer.id;
        let index = index.min(self.layers.len());
        self.layers.insert(index, layer);
        self.active_index = index;
        self.next_layer_number += 1;
        Ok(id)
    }

    /// Remove a layer.  The last remaining layer cannot be deleted.
    pub fn delete_layer(&mut self, id: LayerId) -> Result<Layer> {
        let idx = self.index_of(id)?;
        if self.layers.len() <= 1 {
            return Err(EditorError::invalid("cannot delete the last layer"));
        }
        let removed = self.layers.remove(idx);
        if idx == self.active_index {
            self.active_index = self.layers.len() - 1;
        } else if idx < self.active_index {
            self.active_index -= 1;
        }
        Ok(removed)
    }

    /// Swap a layer with its neighbor.  Returns `false` (and changes
    /// nothing) when the layer is already at that edge of the stack.
    pub fn move_layer(&mut self, id: LayerId, dir: MoveDirection) -> Result<bool> {
        let idx = self.index_of(id)?;
        let new_idx = match dir {
            MoveDirection::Up if idx + 1 < self.layers.len() => idx + 1,
            MoveDirection::Down if idx > 0 => idx - 1,
            _ => return Ok(false),
        };
        let active_id = self.active_layer().id;
        self.layers.swap(idx, new_idx);
        self.active_index = self.index_of(active_id)?;
        Ok(true)
    }

    /// Draw `id` (with its filters and opacity) onto `target_id`, then remove
    /// `id`.  The target becomes active.
    pub fn merge_layer(&mut self, id: LayerId, target_id: LayerId) -> Result<()> {
        let src_idx = self.index_of(id)?;
        let dst_idx = self.index_of(target_id)?;
        if src_idx == dst_idx {
            return Err(EditorError::invalid("cannot merge a layer into itself"));
        }

        let source = &self.layers[src_idx];
        let opacity = source.opacity;
        let rendered = source.rendered().into_owned();
        self.layers[dst_idx].surface.composite_over(&rendered, opacity)?;

        self.layers.remove(src_idx);
        self.active_index = self.index_of(target_id)?;
        Ok(())
    }

    /// Merge the active layer into the one below it, or the one above when
    /// the active layer is at the bottom.  Returns the surviving layer id.
    pub fn merge_active_with_neighbor(&mut self) -> Result<LayerId> {
        let target_idx = self
            .neighbor_of_active()
            .ok_or_else(|| EditorError::invalid("no neighbor layer to merge with"))?;
        let target_id = self.layers[target_idx].id;
        self.merge_layer(self.active_layer().id, target_id)?;
        Ok(target_id)
    }

    pub fn neighbor_of_active(&self) -> Option<usize> {
        if self.layers.len() < 2 {
            None
        } else if self.active_index > 0 {
            Some(self.active_index - 1)
        } else {
            Some(self.active_index + 1)
        }
    }

    /// Resample every layer to a new size.  All buffers are allocated before
    /// any layer is replaced, so a failure leaves the stack untouched.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if (width, height) == (self.width, self.height) {
            return Ok(());
        }
        let resized = self
            .layers
            .iter()
            .map(|l| transform::resample(&l.surface, width, height))
            .collect::<Result<Vec<_>>>()?;
        for (layer, surface) in self.layers.iter_mut().zip(resized) {
            layer.surface = surface;
        }
        self.width = width;
        self.height = height;
        Ok(())
    }

    /// Replace the layer at `index` wholesale (used by history restore).
    pub(crate) fn replace_layer(&mut self, index: usize, layer: Layer) -> Result<()> {
        let slot = self.layer_mut(index)?;
        *slot = layer;
        Ok(())
    }

    /// Replace the whole stack contents (used by history restore).
    pub(crate) fn restore(&mut self, layers: Vec<Layer>, active_index: usize, width: u32, height: u32) {
        if layers.is_empty() {
            log_warn!("LayerStack::restore: refusing to restore an empty stack");
            return;
        }
        self.active_index = active_index.min(layers.len() - 1);
        self.layers = layers;
        self.width = width;
        self.height = height;
    }

    // ---- compositing --------------------------------------------------------

    /// Flatten bottom-to-top.  Each layer's filters are applied (color
    /// adjustments, then blur) before it is alpha-blended by its opacity.
    pub fn composite(&self, visible_only: bool) -> RasterSurface {
        let mut result = RasterSurface::new(self.width, self.height);
        for layer in &self.layers {
            if visible_only && !layer.visible {
                continue;
            }
            if layer.opacity <= 0.0 {
                continue;
            }
            let rendered = layer.rendered();
            if let Err(e) = result.composite_over(&rendered, layer.opacity) {
                log_warn!("composite: skipping layer '{}': {}", layer.name, e);
            }
        }
        result
    }
}
