// ============================================================================
// FLOOD FILL: iterative 4-connected region fill
// ============================================================================

use image::Rgba;

use crate::canvas::RasterSurface;
use crate::error::{EditorError, Result};

/// Squared Euclidean distance over R, G, B and A.
#[inline(always)]
fn distance_sq(p: [u8; 4], q: [u8; 4]) -> u32 {
    p.iter()
        .zip(q.iter())
        .map(|(&a, &b)| {
            let d = a as i32 - b as i32;
            (d * d) as u32
        })
        .sum()
}

/// Fill the 4-connected region around `(seed_x, seed_y)` whose colors lie
/// within `tolerance` (Euclidean RGBA distance) of the seed color.
///
/// Returns the number of pixels written.  Filling with the seed's own color
/// writes nothing.  Fails without touching the surface when the seed is out
/// of bounds or the tolerance is negative or NaN.
pub fn flood_fill(
    surface: &mut RasterSurface,
    seed_x: i64,
    seed_y: i64,
    fill_color: Rgba<u8>,
    tolerance: f32,
) -> Result<usize> {
    if !surface.contains(seed_x, seed_y) {
        return Err(EditorError::validation(format!(
            "fill seed ({}, {}) outside {}×{} surface",
            seed_x,
            seed_y,
            surface.width(),
            surface.height()
        )));
    }
    if tolerance.is_nan() || tolerance < 0.0 {
        return Err(EditorError::validation(format!("fill tolerance must be >= 0, got {}", tolerance)));
    }

    let w = surface.width() as usize;
    let h = surface.height() as usize;
    let seed_idx = seed_y as usize * w + seed_x as usize;
    let pixels = surface.pixels_mut();
    let target = pixels[seed_idx];
    let fill = fill_color.0;

    if target == fill {
        return Ok(0);
    }

    // Integer comparison against the squared tolerance
    let tol_sq = {
        let t = tolerance as f64;
        let sq = t * t;
        if sq >= u32::MAX as f64 { u32::MAX } else { sq.floor() as u32 }
    };

    let mut visited = vec![false; w * h];
    // Packed flat indices; surfaces are capped well below u32::MAX pixels
    let mut stack: Vec<u32> = Vec::with_capacity(4096);
    visited[seed_idx] = true;
    stack.push(seed_idx as u32);

    let mut written = 0usize;
    while let Some(idx) = stack.pop() {
        let idx = idx as usize;
        if distance_sq(pixels[idx], target) > tol_sq {
            continue;
        }
        pixels[idx] = fill;
        written += 1;

        let x = idx % w;
        let y = idx / w;
        let mut visit = |n: usize| {
            if !visited[n] {
                visited[n] = true;
                stack.push(n as u32);
            }
        };
        if x > 0 {
            visit(idx - 1);
        }
        if x + 1 < w {
            visit(idx + 1);
        }
        if y > 0 {
            visit(idx - w);
        }
        if y + 1 < h {
            visit(idx + w);
        }
    }

    Ok(written)
}
