// ============================================================================
// SMOOTHING — separable Gaussian blur on the heightmap's color channels
// ============================================================================

use rayon::prelude::*;

use super::pixel_buffer::PixelBuffer;

/// Blur with an effective radius of `radius` pixels. Non-positive or
/// non-finite radii leave the buffer untouched.
///
/// Edges replicate the border pixel. Only R, G and B are blurred.
pub fn smooth(buf: &mut PixelBuffer, radius: f32) {
    if !radius.is_finite() || radius <= 0.0 || buf.is_empty() {
        return;
    }
    let kernel = build_gaussian_kernel(radius / 3.0);
    if kernel.len() == 1 {
        return;
    }
    separable_blur(buf, &kernel);
}

/// 1-D Gaussian kernel truncated at ceil(3*sigma), normalised to sum 1.
fn build_gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil() as usize;
    let s2 = 2.0 * sigma * sigma;
    // A sub-normal variance would turn the centre tap into 0/0.
    if radius == 0 || !s2.is_normal() {
        return vec![1.0];
    }
    let len = radius * 2 + 1;
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

fn separable_blur(buf: &mut PixelBuffer, kernel: &[f32]) {
    let w = buf.width() as usize;
    let h = buf.height() as usize;
    let radius = kernel.len() / 2;

    // Three color channels per pixel as f32.
    let src: Vec<f32> = buf
        .as_raw()
        .chunks_exact(4)
        .flat_map(|px| [px[0] as f32, px[1] as f32, px[2] as f32])
        .collect();

    // --- Horizontal pass (parallel by row) ---
    let mut horiz = vec![0.0f32; w * h * 3];
    horiz.par_chunks_mut(w * 3).enumerate().for_each(|(y, row_out)| {
        let row_in = &src[y * w * 3..(y + 1) * w * 3];
        for x in 0..w {
            let mut acc = [0.0f32; 3];
            for (ki, &kv) in kernel.iter().enumerate() {
                let sx = (x as isize + ki as isize - radius as isize).clamp(0, w as isize - 1) as usize;
                let idx = sx * 3;
                acc[0] += row_in[idx] * kv;
                acc[1] += row_in[idx + 1] * kv;
                acc[2] += row_in[idx + 2] * kv;
            }
            row_out[x * 3..x * 3 + 3].copy_from_slice(&acc);
        }
    });

    // --- Vertical pass, written straight back into the RGBA buffer ---
    let stride = w * 4;
    buf.as_raw_mut().par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        for x in 0..w {
            let mut acc = [0.0f32; 3];
            for (ki, &kv) in kernel.iter().enumerate() {
                let sy = (y as isize + ki as isize - radius as isize).clamp(0, h as isize - 1) as usize;
                let idx = (sy * w + x) * 3;
                acc[0] += horiz[idx] * kv;
                acc[1] += horiz[idx + 1] * kv;
                acc[2] += horiz[idx + 2] * kv;
            }
            let o = x * 4;
            row_out[o] = acc[0].round().clamp(0.0, 255.0) as u8;
            row_out[o + 1] = acc[1].round().clamp(0.0, 255.0) as u8;
            row_out[o + 2] = acc[2].round().clamp(0.0, 255.0) as u8;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(w: u32, h: u32) -> PixelBuffer {
        let mut data = Vec::with_capacity((w * h * 4) as usize);
        for y in 0..h {
            for x in 0..w {
                let v = if (x / 3 + y / 3) % 2 == 0 { 230 } else { 20 };
                data.extend_from_slice(&[v, v, v, 255]);
            }
        }
        PixelBuffer::from_raw(w, h, data).unwrap()
    }

    #[test]
    fn non_positive_radius_is_identity() {
        for r in [0.0, -3.0, f32::NAN] {
            let mut buf = checker(12, 9);
            let before = buf.clone();
            smooth(&mut buf, r);
            assert_eq!(buf, before);
        }
    }

    #[test]
    fn vanishing_radius_keeps_pixels() {
        for r in [1e-30, 1e-20, 1e-3] {
            let mut buf = PixelBuffer::filled(4, 4, [200, 200, 200, 255]);
            smooth(&mut buf, r);
            assert_eq!(buf.color_energy(), 4 * 4 * 600, "radius {r}");
            assert!(build_gaussian_kernel(r / 3.0).iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn kernel_is_normalised() {
        for sigma in [0.2, 1.0, 2.7] {
            let k = build_gaussian_kernel(sigma);
            let sum: f32 = k.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
            assert_eq!(k.len() % 2, 1);
        }
    }

    #[test]
    fn kernel_reach_matches_radius() {
        // radius 6 px -> sigma 2 -> 6 taps either side
        assert_eq!(build_gaussian_kernel(6.0 / 3.0).len(), 13);
    }

    #[test]
    fn blur_roughly_conserves_energy() {
        let mut buf = checker(30, 30);
        let before = buf.color_energy() as f64;
        smooth(&mut buf, 4.0);
        let after = buf.color_energy() as f64;
        assert!(((after - before) / before).abs() < 0.02, "{before} -> {after}");
    }

    #[test]
    fn uniform_image_stays_uniform_at_edges() {
        let mut buf = PixelBuffer::filled(7, 5, [99, 99, 99, 255]);
        smooth(&mut buf, 5.0);
        assert!(buf.as_raw().chunks_exact(4).all(|p| p == [99, 99, 99, 255]));
    }

    #[test]
    fn blur_leaves_alpha_untouched() {
        let mut data = Vec::new();
        for i in 0..16u8 {
            data.extend_from_slice(&[i * 15, 0, 0, i]);
        }
        let mut buf = PixelBuffer::from_raw(4, 4, data).unwrap();
        smooth(&mut buf, 2.0);
        let alphas: Vec<u8> = buf.as_raw().chunks_exact(4).map(|p| p[3]).collect();
        assert_eq!(alphas, (0..16u8).collect::<Vec<_>>());
    }
}
