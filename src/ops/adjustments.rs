// ============================================================================
// HEIGHTMAP ADJUSTMENTS — luminance, contrast and invert stages
// ============================================================================
//
// Every stage mutates the buffer in place and touches R, G and B only.
// Rows are processed in parallel via rayon; output does not depend on
// scheduling.
// ============================================================================

use super::pixel_buffer::PixelBuffer;

/// Valid contrast range. The formula has a pole at 259, so anything outside
/// this window is clamped before use.
pub const CONTRAST_MIN: f32 = -200.0;
pub const CONTRAST_MAX: f32 = 200.0;

/// Perceptual luminance weights (BT.601).
const LUMA_R: f32 = 0.299;
const LUMA_G: f32 = 0.587;
const LUMA_B: f32 = 0.114;

/// Replace R, G and B with the pixel's luminance, rounded to nearest.
pub fn luminance(buf: &mut PixelBuffer) {
    buf.for_each_pixel_mut(|px| {
        let lum = luma(px[0], px[1], px[2]);
        px[0] = lum;
        px[1] = lum;
        px[2] = lum;
    });
}

#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    (LUMA_R * r as f32 + LUMA_G * g as f32 + LUMA_B * b as f32)
        .round()
        .clamp(0.0, 255.0) as u8
}

/// Contrast stretch around 128. `c == 0` leaves the buffer untouched.
pub fn contrast(buf: &mut PixelBuffer, c: f32) {
    if c == 0.0 || !c.is_finite() {
        return;
    }
    let lut = build_contrast_lut(c);
    buf.apply_color_lut(&lut);
}

/// Contrast multiplier for `c` in [`CONTRAST_MIN`, `CONTRAST_MAX`].
pub fn contrast_factor(c: f32) -> f32 {
    let c = c.clamp(CONTRAST_MIN, CONTRAST_MAX);
    (259.0 * (c + 255.0)) / (255.0 * (259.0 - c))
}

fn build_contrast_lut(c: f32) -> [u8; 256] {
    let factor = contrast_factor(c);
    let mut lut = [0u8; 256];
    for (v, out) in lut.iter_mut().enumerate() {
        *out = (factor * (v as f32 - 128.0) + 128.0).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// `255 - v` on R, G and B when `enabled`.
pub fn invert(buf: &mut PixelBuffer, enabled: bool) {
    if !enabled {
        return;
    }
    buf.for_each_pixel_mut(|px| {
        px[0] = 255 - px[0];
        px[1] = 255 - px[1];
        px[2] = 255 - px[2];
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> PixelBuffer {
        let data: Vec<u8> = (0..=255u8).flat_map(|v| [v, v / 2, 255 - v, 255]).collect();
        PixelBuffer::from_raw(256, 1, data).unwrap()
    }

    #[test]
    fn pure_red_becomes_76() {
        let mut buf = PixelBuffer::filled(1, 1, [255, 0, 0, 255]);
        luminance(&mut buf);
        assert_eq!(buf.pixel(0, 0), [76, 76, 76, 255]);
    }

    #[test]
    fn luminance_keeps_alpha() {
        let mut buf = PixelBuffer::filled(3, 2, [10, 200, 40, 17]);
        luminance(&mut buf);
        let px = buf.pixel(2, 1);
        assert_eq!(px[3], 17);
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
    }

    #[test]
    fn luminance_on_empty_buffer_is_noop() {
        let mut buf = PixelBuffer::from_raw(0, 0, Vec::new()).unwrap();
        luminance(&mut buf);
        assert!(buf.is_empty());
    }

    #[test]
    fn zero_contrast_is_identity() {
        let mut buf = ramp();
        let before = buf.clone();
        contrast(&mut buf, 0.0);
        assert_eq!(buf, before);
    }

    #[test]
    fn contrast_pivots_on_mid_gray() {
        let mut buf = PixelBuffer::filled(1, 1, [128, 128, 128, 255]);
        contrast(&mut buf, 100.0);
        assert_eq!(buf.pixel(0, 0), [128, 128, 128, 255]);
    }

    #[test]
    fn extreme_contrast_saturates_instead_of_wrapping() {
        for c in [CONTRAST_MIN, -150.0, 150.0, CONTRAST_MAX, 1000.0] {
            let mut buf = ramp();
            contrast(&mut buf, c);
            // u8 storage cannot leave [0, 255]; check ordering survived so
            // nothing wrapped around.
            let reds: Vec<u8> = buf.as_raw().chunks_exact(4).map(|p| p[0]).collect();
            if c > 0.0 {
                assert!(reds.windows(2).all(|w| w[0] <= w[1]), "c={c}");
                assert_eq!(reds[0], 0);
                assert_eq!(reds[255], 255);
            }
        }
    }

    #[test]
    fn negative_contrast_flattens_toward_128() {
        let mut buf = PixelBuffer::filled(1, 1, [0, 255, 100, 255]);
        contrast(&mut buf, -200.0);
        let px = buf.pixel(0, 0);
        assert!(px[0] > 0 && px[0] < 128);
        assert!(px[1] < 255 && px[1] > 128);
    }

    #[test]
    fn contrast_keeps_gray_gray() {
        let mut buf = PixelBuffer::filled(1, 1, [90, 90, 90, 255]);
        contrast(&mut buf, 60.0);
        let px = buf.pixel(0, 0);
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
    }

    #[test]
    fn invert_76_is_179() {
        let mut buf = PixelBuffer::filled(1, 1, [76, 76, 76, 255]);
        invert(&mut buf, true);
        assert_eq!(buf.pixel(0, 0), [179, 179, 179, 255]);
    }

    #[test]
    fn invert_twice_restores_luminance() {
        let mut buf = ramp();
        luminance(&mut buf);
        let expected = buf.clone();
        invert(&mut buf, true);
        invert(&mut buf, true);
        assert_eq!(buf, expected);
    }

    #[test]
    fn disabled_invert_is_noop() {
        let mut buf = ramp();
        let before = buf.clone();
        invert(&mut buf, false);
        assert_eq!(buf, before);
    }
}
