// ============================================================================
// ADJUSTMENT OPERATIONS: per-pixel color adjustments
// ============================================================================
//
// Multipliers follow the usual display-filter conventions: 1.0 is identity,
// brightness scales the channels, contrast scales distance from mid-grey and
// saturation interpolates against Rec.709 luma.  Rows run in parallel.
// ============================================================================

use rayon::prelude::*;

use crate::canvas::RasterSurface;

const LUMA_R: f32 = 0.2126;
const LUMA_G: f32 = 0.7152;
const LUMA_B: f32 = 0.0722;

/// Apply a per-pixel transform in place.
/// `transform` receives (r, g, b, a) in 0..255 as f32; the result is
/// rounded and clamped.
pub fn apply_pixel_transform<F>(surface: &mut RasterSurface, transform: F)
where
    F: Fn(f32, f32, f32, f32) -> (f32, f32, f32, f32) + Sync,
{
    let stride = surface.width() as usize;
    surface.pixels_mut().par_chunks_mut(stride).for_each(|row| {
        for px in row.iter_mut() {
            let (r, g, b, a) = transform(px[0] as f32, px[1] as f32, px[2] as f32, px[3] as f32);
            *px = [
                r.round().clamp(0.0, 255.0) as u8,
                g.round().clamp(0.0, 255.0) as u8,
                b.round().clamp(0.0, 255.0) as u8,
                a.round().clamp(0.0, 255.0) as u8,
            ];
        }
    });
}

/// Brightness, then contrast, then saturation.  Alpha is untouched.
pub fn color_adjust(surface: &mut RasterSurface, brightness: f32, contrast: f32, saturation: f32) {
    let s = saturation;
    // Saturation matrix rows
    let m = [
        [LUMA_R + (1.0 - LUMA_R) * s, LUMA_G - LUMA_G * s, LUMA_B - LUMA_B * s],
        [LUMA_R - LUMA_R * s, LUMA_G + (1.0 - LUMA_G) * s, LUMA_B - LUMA_B * s],
        [LUMA_R - LUMA_R * s, LUMA_G - LUMA_G * s, LUMA_B + (1.0 - LUMA_B) * s],
    ];
    apply_pixel_transform(surface, move |r, g, b, a| {
        let adjust = |v: f32| {
            let v = (v * brightness).clamp(0.0, 255.0);
            ((v - 127.5) * contrast + 127.5).clamp(0.0, 255.0)
        };
        let (r, g, b) = (adjust(r), adjust(g), adjust(b));
        (
            m[0][0] * r + m[0][1] * g + m[0][2] * b,
            m[1][0] * r + m[1][1] * g + m[1][2] * b,
            m[2][0] * r + m[2][1] * g + m[2][2] * b,
            a,
        )
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_identity_multipliers() {
        let mut s = RasterSurface::new_filled(3, 3, Rgba([12, 200, 77, 90]));
        let before = s.clone();
        color_adjust(&mut s, 1.0, 1.0, 1.0);
        assert_eq!(s, before);
    }

    #[test]
    fn test_brightness_scales_and_clamps() {
        let mut s = RasterSurface::new_filled(1, 1, Rgba([100, 200, 0, 255]));
        color_adjust(&mut s, 2.0, 1.0, 1.0);
        assert_eq!(s.get_pixel(0, 0), Some(Rgba([200, 255, 0, 255])));
    }

    #[test]
    fn test_zero_saturation_is_grey() {
        let mut s = RasterSurface::new_filled(1, 1, Rgba([255, 0, 0, 255]));
        color_adjust(&mut s, 1.0, 1.0, 0.0001);
        let p = s.get_pixel(0, 0).unwrap();
        assert!((p[0] as i32 - p[1] as i32).abs() <= 1);
        assert!((p[1] as i32 - p[2] as i32).abs() <= 1);
    }

    #[test]
    fn test_contrast_pushes_from_midpoint() {
        let mut s = RasterSurface::new_filled(1, 1, Rgba([200, 50, 128, 255]));
        color_adjust(&mut s, 1.0, 2.0, 1.0);
        let p = s.get_pixel(0, 0).unwrap();
        assert_eq!(p[0], 255);
        assert_eq!(p[1], 0);
        assert_eq!(p[3], 255);
    }
}
