// ============================================================================
// GEOMETRIC TRANSFORMS: 2D affine maps, transformed blits, resampling
// ============================================================================

use image::Rgba;
use rayon::prelude::*;

use crate::canvas::{CompositeMode, RasterSurface, blend_pixel, erase_pixel};
use crate::error::Result;

/// A 2D affine map in canvas convention:
///
/// ```text
/// x' = a·x + c·y + e
/// y' = b·x + d·y + f
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine {
    pub const IDENTITY: Affine = Affine { a: 1.0, b: 0.0, c: 0.0, d: 1.0, e: 0.0, f: 0.0 };

    pub fn translate(tx: f64, ty: f64) -> Self {
        Affine { e: tx, f: ty, ..Self::IDENTITY }
    }

    pub fn scale(s: f64) -> Self {
        Affine { a: s, d: s, ..Self::IDENTITY }
    }

    /// Clockwise on screen (y points down) for positive degrees.
    pub fn rotate_deg(deg: f64) -> Self {
        let (sin, cos) = deg.to_radians().sin_cos();
        Affine { a: cos, b: sin, c: -sin, d: cos, e: 0.0, f: 0.0 }
    }

    /// `self ∘ other`: apply `other` first, then `self`.
    pub fn then_apply(&self, other: &Affine) -> Affine {
        Affine {
            a: self.a * other.a + self.c * other.b,
            b: self.b * other.a + self.d * other.b,
            c: self.a * other.c + self.c * other.d,
            d: self.b * other.c + self.d * other.d,
            e: self.a * other.e + self.c * other.f + self.e,
            f: self.b * other.e + self.d * other.f + self.f,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (self.a * x + self.c * y + self.e, self.b * x + self.d * y + self.f)
    }

    pub fn determinant(&self) -> f64 {
        self.a * self.d - self.b * self.c
    }

    /// `None` when the map is singular.
    pub fn inverse(&self) -> Option<Affine> {
        let det = self.determinant();
        if det.abs() < 1e-12 || !det.is_finite() {
            return None;
        }
        let inv = 1.0 / det;
        let a = self.d * inv;
        let b = -self.b * inv;
        let c = -self.c * inv;
        let d = self.a * inv;
        Some(Affine {
            a,
            b,
            c,
            d,
            e: -(a * self.e + c * self.f),
            f: -(b * self.e + d * self.f),
        })
    }
}

// ============================================================================
// SAMPLING
// ============================================================================

/// Bilinear sample at a continuous pixel coordinate (pixel centers at
/// integer + 0.5).  Interpolates premultiplied color, so transparent
/// neighbors don't darken edges.  Outside the surface reads as transparent.
pub fn bilinear_sample(src: &RasterSurface, x: f64, y: f64) -> Rgba<u8> {
    sample_with(src, x, y, false)
}

/// As [`bilinear_sample`], but clamps coordinates to the nearest edge pixel.
pub fn bilinear_sample_clamped(src: &RasterSurface, x: f64, y: f64) -> Rgba<u8> {
    sample_with(src, x, y, true)
}

fn sample_with(src: &RasterSurface, x: f64, y: f64, clamp: bool) -> Rgba<u8> {
    let sw = src.width() as i64;
    let sh = src.height() as i64;
    let fx = x - 0.5;
    let fy = y - 0.5;
    let x0 = fx.floor();
    let y0 = fy.floor();
    let tx = (fx - x0) as f32;
    let ty = (fy - y0) as f32;
    let (x0, y0) = (x0 as i64, y0 as i64);
    let pixels = src.pixels();

    let fetch = |sx: i64, sy: i64| -> [f32; 4] {
        let (sx, sy) = if clamp {
            (sx.clamp(0, sw - 1), sy.clamp(0, sh - 1))
        } else if sx < 0 || sy < 0 || sx >= sw || sy >= sh {
            return [0.0; 4];
        } else {
            (sx, sy)
        };
        let p = pixels[(sy * sw + sx) as usize];
        let a = p[3] as f32 / 255.0;
        [p[0] as f32 * a, p[1] as f32 * a, p[2] as f32 * a, p[3] as f32]
    };

    let tl = fetch(x0, y0);
    let tr = fetch(x0 + 1, y0);
    let bl = fetch(x0, y0 + 1);
    let br = fetch(x0 + 1, y0 + 1);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    let mut acc = [0.0f32; 4];
    for c in 0..4 {
        acc[c] = lerp(lerp(tl[c], tr[c], tx), lerp(bl[c], br[c], tx), ty);
    }

    let alpha = acc[3].round().clamp(0.0, 255.0);
    if alpha <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let unpremul = 255.0 / acc[3];
    Rgba([
        (acc[0] * unpremul).round().clamp(0.0, 255.0) as u8,
        (acc[1] * unpremul).round().clamp(0.0, 255.0) as u8,
        (acc[2] * unpremul).round().clamp(0.0, 255.0) as u8,
        alpha as u8,
    ])
}

// ============================================================================
// TRANSFORMED BLIT
// ============================================================================

/// Draw `src` onto `dst` through `affine` (source pixel space → destination
/// pixel space).  Each destination pixel inside the transformed bounds is
/// mapped back through the inverse and bilinearly sampled.  Singular maps
/// draw nothing.
pub fn blit_affine(dst: &mut RasterSurface, src: &RasterSurface, affine: &Affine, mode: CompositeMode) {
    let Some(inv) = affine.inverse() else {
        return;
    };

    // Destination bounding box of the transformed source rectangle
    let (sw, sh) = (src.width() as f64, src.height() as f64);
    let corners = [
        affine.apply(0.0, 0.0),
        affine.apply(sw, 0.0),
        affine.apply(0.0, sh),
        affine.apply(sw, sh),
    ];
    let min_x = corners.iter().map(|p| p.0).fold(f64::INFINITY, f64::min).floor().max(0.0);
    let min_y = corners.iter().map(|p| p.1).fold(f64::INFINITY, f64::min).floor().max(0.0);
    let max_x = corners.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max).ceil().min(dst.width() as f64);
    let max_y = corners.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max).ceil().min(dst.height() as f64);
    if !(min_x < max_x && min_y < max_y) {
        return;
    }
    let (x0, x1) = (min_x as usize, max_x as usize);
    let (y0, y1) = (min_y as usize, max_y as usize);

    let stride = dst.width() as usize;
    dst.pixels_mut()
        .par_chunks_mut(stride)
        .enumerate()
        .skip(y0)
        .take(y1 - y0)
        .for_each(|(dy, row)| {
            let py = dy as f64 + 0.5;
            for (dx, px) in row.iter_mut().enumerate().take(x1).skip(x0) {
                let (sx, sy) = inv.apply(dx as f64 + 0.5, py);
                if sx < -0.5 || sy < -0.5 || sx > sw + 0.5 || sy > sh + 0.5 {
                    continue;
                }
                let top = bilinear_sample(src, sx, sy);
                if top[3] == 0 {
                    continue;
                }
                *px = match mode {
                    CompositeMode::Normal => blend_pixel(Rgba(*px), top, 1.0).0,
                    CompositeMode::Erase => erase_pixel(Rgba(*px), top[3] as f32 / 255.0).0,
                };
            }
        });
}

/// Stretch `src` to `width × height` with bilinear filtering.  The target
/// buffer is allocated fallibly.
pub fn resample(src: &RasterSurface, width: u32, height: u32) -> Result<RasterSurface> {
    let mut out = RasterSurface::try_new(width, height)?;
    let sx = src.width() as f64 / width as f64;
    let sy = src.height() as f64 / height as f64;
    let stride = width as usize;
    out.pixels_mut().par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        let v = (y as f64 + 0.5) * sy;
        for (x, px) in row.iter_mut().enumerate() {
            let u = (x as f64 + 0.5) * sx;
            *px = bilinear_sample_clamped(src, u, v).0;
        }
    });
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    fn approx(a: (f64, f64), b: (f64, f64)) -> bool {
        (a.0 - b.0).abs() < 1e-9 && (a.1 - b.1).abs() < 1e-9
    }

    #[test]
    fn test_compose_and_invert() {
        let m = Affine::translate(10.0, -4.0)
            .then_apply(&Affine::rotate_deg(33.0))
            .then_apply(&Affine::scale(2.5));
        let inv = m.inverse().unwrap();
        let p = m.apply(3.0, 7.0);
        assert!(approx(inv.apply(p.0, p.1), (3.0, 7.0)));
    }

    #[test]
    fn test_rotate_quarter_turn() {
        let p = Affine::rotate_deg(90.0).apply(1.0, 0.0);
        assert!(approx(p, (0.0, 1.0)));
    }

    #[test]
    fn test_singular_has_no_inverse() {
        assert!(Affine::scale(0.0).inverse().is_none());
    }

    #[test]
    fn test_identity_blit_is_exact() {
        let mut src = RasterSurface::new(5, 5);
        src.put_pixel(2, 3, RED);
        src.put_pixel(0, 0, Rgba([10, 20, 30, 255]));
        let mut dst = RasterSurface::new(5, 5);
        blit_affine(&mut dst, &src, &Affine::IDENTITY, CompositeMode::Normal);
        assert_eq!(dst, src);
    }

    #[test]
    fn test_translated_blit_lands_offset() {
        let src = RasterSurface::new_filled(2, 2, RED);
        let mut dst = RasterSurface::new(8, 8);
        blit_affine(&mut dst, &src, &Affine::translate(4.0, 1.0), CompositeMode::Normal);
        assert_eq!(dst.get_pixel(4, 1), Some(RED));
        assert_eq!(dst.get_pixel(5, 2), Some(RED));
        assert_eq!(dst.get_pixel(3, 1).unwrap()[3], 0);
        assert_eq!(dst.get_pixel(6, 1).unwrap()[3], 0);
    }

    #[test]
    fn test_scaled_blit_covers_area() {
        let src = RasterSurface::new_filled(2, 2, RED);
        let mut dst = RasterSurface::new(10, 10);
        blit_affine(&mut dst, &src, &Affine::scale(4.0), CompositeMode::Normal);
        assert_eq!(dst.get_pixel(2, 2), Some(RED));
        assert_eq!(dst.get_pixel(5, 5), Some(RED));
        assert_eq!(dst.get_pixel(9, 9).unwrap()[3], 0);
    }

    #[test]
    fn test_resample_uniform() {
        let src = RasterSurface::new_filled(3, 3, RED);
        let out = resample(&src, 7, 2).unwrap();
        assert!(out.pixels().iter().all(|p| *p == RED.0));
    }
}
