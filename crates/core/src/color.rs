//! BT.601 studio-range RGB ↔ YCbCr conversion on whole images.

use rayon::prelude::*;

use crate::buffer::{CHANNELS, RgbBuffer};

const Y_WEIGHTS: [f32; 3] = [65.481, 128.553, 24.944];
const CB_WEIGHTS: [f32; 3] = [-37.797, -74.203, 112.0];
const CR_WEIGHTS: [f32; 3] = [112.0, -93.786, -18.214];
const BIAS: [f32; 3] = [16.0, 128.0, 128.0];

#[inline]
fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[inline]
fn dot(w: [f32; 3], px: [f32; 3]) -> f32 {
    (w[0] * px[0] + w[1] * px[1] + w[2] * px[2]) / 255.0
}

/// Convert one RGB pixel to studio-range YCbCr.
///
/// # Example
/// ```rust
/// use roundtrip_core::color::rgb_to_ycbcr_pixel;
///
/// assert_eq!(rgb_to_ycbcr_pixel([0, 0, 0]), [16, 128, 128]);
/// assert_eq!(rgb_to_ycbcr_pixel([255, 255, 255]), [235, 128, 128]);
/// ```
pub fn rgb_to_ycbcr_pixel(rgb: [u8; 3]) -> [u8; 3] {
    let px = [rgb[0] as f32, rgb[1] as f32, rgb[2] as f32];
    [
        clamp_u8(dot(Y_WEIGHTS, px) + BIAS[0]),
        clamp_u8(dot(CB_WEIGHTS, px) + BIAS[1]),
        clamp_u8(dot(CR_WEIGHTS, px) + BIAS[2]),
    ]
}

/// Inverse of [`rgb_to_ycbcr_pixel`].
pub fn ycbcr_to_rgb_pixel(ycc: [u8; 3]) -> [u8; 3] {
    let y = (ycc[0] as f32 - 16.0) * 255.0 / 219.0;
    let cb = (ycc[1] as f32 - 128.0) * 255.0 / 224.0;
    let cr = (ycc[2] as f32 - 128.0) * 255.0 / 224.0;
    [
        clamp_u8(y + 1.402 * cr),
        clamp_u8(y - 0.344_136 * cb - 0.714_136 * cr),
        clamp_u8(y + 1.772 * cb),
    ]
}

fn map_pixels(img: &RgbBuffer, f: fn([u8; 3]) -> [u8; 3]) -> Vec<u8> {
    let mut packed = img.packed_rgb().into_owned();
    packed.par_chunks_exact_mut(CHANNELS).for_each(|px| {
        let out = f([px[0], px[1], px[2]]);
        px.copy_from_slice(&out);
    });
    packed
}

/// Convert a whole image; the result is channels-last with Y, Cb, Cr in the
/// R, G, B slots.
pub fn rgb_to_ycbcr(img: &RgbBuffer) -> RgbBuffer {
    rebuild(img, map_pixels(img, rgb_to_ycbcr_pixel))
}

/// Convert a YCbCr image (stored as in [`rgb_to_ycbcr`]) back to RGB.
pub fn ycbcr_to_rgb(img: &RgbBuffer) -> RgbBuffer {
    rebuild(img, map_pixels(img, ycbcr_to_rgb_pixel))
}

fn rebuild(src: &RgbBuffer, packed: Vec<u8>) -> RgbBuffer {
    src.with_packed(packed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Layout;

    #[test]
    fn mid_gray_is_neutral() {
        let ycc = rgb_to_ycbcr_pixel([128, 128, 128]);
        assert_eq!(ycc[1], 128);
        assert_eq!(ycc[2], 128);
        assert_eq!(ycbcr_to_rgb_pixel(ycc), [128, 128, 128]);
    }

    #[test]
    fn conversion_round_trip_is_close() {
        for rgb in [[255u8, 0, 0], [0, 255, 0], [0, 0, 255], [12, 200, 77]] {
            let back = ycbcr_to_rgb_pixel(rgb_to_ycbcr_pixel(rgb));
            for c in 0..3 {
                assert!(
                    (back[c] as i16 - rgb[c] as i16).abs() <= 2,
                    "{rgb:?} -> {back:?}"
                );
            }
        }
    }

    #[test]
    fn whole_image_conversion_respects_layout() {
        let img = RgbBuffer::filled(2, 2, [255, 255, 255])
            .unwrap()
            .into_layout(Layout::ChannelsFirst);
        let ycc = rgb_to_ycbcr(&img);
        assert_eq!(ycc.layout(), Layout::ChannelsLast);
        assert_eq!(ycc.pixel(1, 1), [235, 128, 128]);
    }
}
