use std::path::Path;

use image::ImageFormat;
use serde::{Deserialize, Serialize};

use crate::canvas::{Layer, LayerMetadata, RasterSurface};
use crate::error::{EditorError, Result};

// ============================================================================
// LAYER BLOB FORMAT
// ============================================================================

/// Magic header of a serialized layer.
const LAYER_MAGIC_V1: &str = "LPL1";

/// Maximum supported layer dimension in pixels (per axis).
/// Prevents memory exhaustion from crafted blobs.
const MAX_LAYER_DIM: u32 = 32_768;

/// Serializable layer record.  `magic` stays the first field so the tag sits
/// at a fixed offset in the encoded bytes.
#[derive(Serialize, Deserialize)]
struct LayerFileV1 {
    magic: String,
    meta: LayerMetadata,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

/// Encode a layer (attributes, size and raw RGBA) as a binary blob.
pub fn serialize_layer(layer: &Layer) -> Result<Vec<u8>> {
    let file = LayerFileV1 {
        magic: LAYER_MAGIC_V1.to_string(),
        meta: layer.metadata(),
        width: layer.surface.width(),
        height: layer.surface.height(),
        pixels: layer.surface.as_raw().to_vec(),
    };
    bincode::serialize(&file).map_err(|e| EditorError::resource(format!("layer encode failed: {}", e)))
}

/// Decode a blob produced by [`serialize_layer`].  The layer gets a fresh id.
pub fn deserialize_layer(blob: &[u8]) -> Result<Layer> {
    // bincode encodes a String as an 8-byte length prefix + UTF-8 data,
    // so bytes 8..12 hold the magic.
    if blob.len() < 12 {
        return Err(EditorError::validation("layer blob too small"));
    }
    let magic = std::str::from_utf8(&blob[8..12]).unwrap_or("");
    if magic != LAYER_MAGIC_V1 {
        return Err(EditorError::validation(format!("unknown layer blob magic '{}'", magic)));
    }

    let file: LayerFileV1 =
        bincode::deserialize(blob).map_err(|e| EditorError::validation(format!("malformed layer blob: {}", e)))?;

    if file.width == 0 || file.height == 0 {
        return Err(EditorError::validation("layer dimensions cannot be zero"));
    }
    if file.width > MAX_LAYER_DIM || file.height > MAX_LAYER_DIM {
        return Err(EditorError::validation(format!(
            "layer size {}x{} exceeds maximum allowed {}x{}",
            file.width, file.height, MAX_LAYER_DIM, MAX_LAYER_DIM
        )));
    }

    let surface = RasterSurface::from_raw(file.width, file.height, file.pixels)?;
    let mut layer = Layer::from_surface(file.meta.name.clone(), surface);
    layer.apply_metadata(file.meta)?;
    Ok(layer)
}

// ============================================================================
// IMAGE FILES (CLI / headless mode)
// ============================================================================

/// Decode an image file into an RGBA surface.
pub fn load_image(path: &Path) -> std::result::Result<RasterSurface, String> {
    let img = image::open(path).map_err(|e| format!("Failed to open '{}': {}", path.display(), e))?;
    RasterSurface::from_rgba_image(&img.to_rgba8()).map_err(|e| e.to_string())
}

/// Encode a surface to disk; the format follows the file extension (PNG
/// when there is none).  JPEG output drops alpha.
pub fn save_image(surface: &RasterSurface, path: &Path) -> std::result::Result<(), String> {
    let format = ImageFormat::from_path(path).unwrap_or(ImageFormat::Png);
    let rgba = surface.to_rgba_image();
    let result = match format {
        ImageFormat::Jpeg | ImageFormat::Bmp => {
            image::DynamicImage::ImageRgba8(rgba).to_rgb8().save_with_format(path, format)
        }
        _ => rgba.save_with_format(path, format),
    };
    result.map_err(|e| format!("Failed to save '{}': {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::LayerProperty;
    use image::Rgba;

    #[test]
    fn test_blob_preserves_pixels_and_attributes() {
        let mut layer = Layer::new("Sketch", 3, 2, Rgba([9, 8, 7, 255]));
        layer.surface.put_pixel(2, 1, Rgba([1, 2, 3, 4]));
        layer.set_property(LayerProperty::Opacity(0.25)).unwrap();
        layer.set_property(LayerProperty::Blur(2.0)).unwrap();
        layer.visible = false;

        let blob = serialize_layer(&layer).unwrap();
        let back = deserialize_layer(&blob).unwrap();
        assert_eq!(back.name, "Sketch");
        assert_eq!(back.metadata(), layer.metadata());
        assert_eq!(back.surface, layer.surface);
        assert_ne!(back.id, layer.id);
    }

    #[test]
    fn test_rejects_bad_magic_and_garbage() {
        assert!(matches!(deserialize_layer(b"short"), Err(EditorError::Validation(_))));
        let layer = Layer::new("L", 2, 2, Rgba([0, 0, 0, 0]));
        let mut blob = serialize_layer(&layer).unwrap();
        blob[8] = b'X';
        assert!(matches!(deserialize_layer(&blob), Err(EditorError::Validation(_))));
    }

    #[test]
    fn test_rejects_truncated_pixels() {
        let layer = Layer::new("L", 4, 4, Rgba([0, 0, 0, 0]));
        let blob = serialize_layer(&layer).unwrap();
        let cut = &blob[..blob.len() - 5];
        assert!(matches!(deserialize_layer(cut), Err(EditorError::Validation(_))));
    }

    #[test]
    fn test_rejects_invalid_metadata() {
        let file = LayerFileV1 {
            magic: LAYER_MAGIC_V1.to_string(),
            meta: LayerMetadata {
                name: "bad".into(),
                visible: true,
                opacity: 1.0,
                brightness: -2.0,
                contrast: 1.0,
                saturation: 1.0,
                blur: 0.0,
            },
            width: 1,
            height: 1,
            pixels: vec![0; 4],
        };
        let blob = bincode::serialize(&file).unwrap();
        assert!(matches!(deserialize_layer(&blob), Err(EditorError::Validation(_))));
    }

    #[test]
    fn test_png_roundtrip_on_disk() {
        let dir = std::env::temp_dir().join(format!("layerpaint-io-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("out.png");
        let mut surface = RasterSurface::new(5, 4);
        surface.put_pixel(1, 1, Rgba([10, 20, 30, 200]));
        save_image(&surface, &path).unwrap();
        let loaded = load_image(&path).unwrap();
        assert_eq!(loaded, surface);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
