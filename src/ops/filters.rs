// ============================================================================
// IMAGE FILTERS: Gaussian blur
// ============================================================================

use rayon::prelude::*;

use crate::canvas::RasterSurface;

/// Build a 1-D Gaussian kernel truncated at ceil(3*sigma).
fn build_gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil() as usize;
    if radius == 0 {
        return vec![1.0];
    }
    let len = radius * 2 + 1;
    let s2 = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..len)
        .map(|i| {
            let x = i as f32 - radius as f32;
            (-x * x / s2).exp()
        })
        .collect();
    let inv = 1.0 / kernel.iter().sum::<f32>();
    for v in &mut kernel {
        *v *= inv;
    }
    kernel
}

/// Separable Gaussian blur with standard deviation `sigma` (the layer's blur
/// radius).  Edges are clamped.  Rows are processed in parallel.
///
/// Color is averaged premultiplied, so transparent neighbors fade alpha
/// without darkening the color they surround.
pub fn gaussian_blur(src: &RasterSurface, sigma: f32) -> RasterSurface {
    if !(sigma > 0.0) || !sigma.is_finite() {
        return src.clone();
    }
    let w = src.width() as usize;
    let h = src.height() as usize;

    let kernel = build_gaussian_kernel(sigma);
    let radius = kernel.len() / 2;
    let stride = w * 4;

    let mut buf_in: Vec<f32> = Vec::with_capacity(w * h * 4);
    for px in src.pixels() {
        let a = px[3] as f32;
        buf_in.extend_from_slice(&[
            px[0] as f32 * a / 255.0,
            px[1] as f32 * a / 255.0,
            px[2] as f32 * a / 255.0,
            a,
        ]);
    }

    // --- Horizontal pass ---
    let mut buf_h = vec![0.0f32; w * h * 4];
    buf_h.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        let row_in = &buf_in[y * stride..(y + 1) * stride];
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (ki, &kv) in kernel.iter().enumerate() {
                let sx = (x as isize + ki as isize - radius as isize).clamp(0, w as isize - 1) as usize;
                let px = &row_in[sx * 4..sx * 4 + 4];
                for c in 0..4 {
                    acc[c] += px[c] * kv;
                }
            }
            row_out[x * 4..x * 4 + 4].copy_from_slice(&acc);
        }
    });

    // --- Vertical pass, straight to u8 ---
    let mut out = vec![0u8; w * h * 4];
    out.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (ki, &kv) in kernel.iter().enumerate() {
                let sy = (y as isize + ki as isize - radius as isize).clamp(0, h as isize - 1) as usize;
                let idx = sy * stride + x * 4;
                for c in 0..4 {
                    acc[c] += buf_h[idx + c] * kv;
                }
            }
            let alpha = acc[3].round().clamp(0.0, 255.0);
            if alpha == 0.0 {
                // Fully transparent stays zeroed
                continue;
            }
            for c in 0..3 {
                row_out[x * 4 + c] = (acc[c] * 255.0 / acc[3]).round().clamp(0.0, 255.0) as u8;
            }
            row_out[x * 4 + 3] = alpha as u8;
        }
    });

    RasterSurface::from_raw(src.width(), src.height(), out).unwrap_or_else(|_| src.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_kernel_is_normalized() {
        let k = build_gaussian_kernel(2.5);
        assert_eq!(k.len(), 2 * 8 + 1);
        let sum: f32 = k.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(k[8] > k[0]);
    }

    #[test]
    fn test_uniform_surface_unchanged() {
        let src = RasterSurface::new_filled(9, 5, Rgba([40, 80, 120, 255]));
        let out = gaussian_blur(&src, 3.0);
        assert_eq!(out, src);
    }

    #[test]
    fn test_blur_spreads_single_pixel() {
        let mut src = RasterSurface::new_filled(11, 11, Rgba([0, 0, 0, 255]));
        src.put_pixel(5, 5, Rgba([255, 255, 255, 255]));
        let out = gaussian_blur(&src, 1.5);
        let center = out.get_pixel(5, 5).unwrap()[0];
        let neighbor = out.get_pixel(6, 5).unwrap()[0];
        assert!(center < 255);
        assert!(neighbor > 0);
        assert!(center > neighbor);
    }

    #[test]
    fn test_blur_keeps_color_at_soft_edges() {
        let mut src = RasterSurface::new(5, 1);
        src.put_pixel(2, 0, Rgba([255, 0, 0, 255]));
        let out = gaussian_blur(&src, 1.0);
        let edge = out.get_pixel(1, 0).unwrap();
        assert!(edge[3] > 0 && edge[3] < 255);
        assert_eq!([edge[0], edge[1], edge[2]], [255, 0, 0]);
        assert_eq!(out.get_pixel(3, 0), Some(edge));
    }

    #[test]
    fn test_zero_sigma_is_identity() {
        let mut src = RasterSurface::new(4, 4);
        src.put_pixel(1, 1, Rgba([1, 2, 3, 4]));
        assert_eq!(gaussian_blur(&src, 0.0), src);
    }
}
