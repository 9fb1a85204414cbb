use rayon::prelude::*;

use crate::buffer::{CHANNELS, Layout};

/// Swap between interleaved and planar RGB.
///
/// `from` is the layout of `src`; the result is in the other layout. Callers
/// guarantee `src.len() == width * height * 3`.
///
/// # Example
/// ```rust
/// use roundtrip_core::prelude::Layout;
/// use roundtrip_core::transform::transpose_channels;
///
/// let hwc = [1, 2, 3, 4, 5, 6];
/// let chw = transpose_channels(&hwc, 2, 1, Layout::ChannelsLast);
/// assert_eq!(chw, vec![1, 4, 2, 5, 3, 6]);
/// assert_eq!(transpose_channels(&chw, 2, 1, Layout::ChannelsFirst), hwc.to_vec());
/// ```
pub fn transpose_channels(src: &[u8], width: usize, height: usize, from: Layout) -> Vec<u8> {
    let plane = width * height;
    debug_assert_eq!(src.len(), plane * CHANNELS);
    let mut dst = vec![0u8; plane * CHANNELS];
    match from {
        Layout::ChannelsLast => {
            dst.par_chunks_mut(plane)
                .enumerate()
                .for_each(|(c, out)| {
                    for (i, sample) in out.iter_mut().enumerate() {
                        *sample = src[i * CHANNELS + c];
                    }
                });
        }
        Layout::ChannelsFirst => {
            let row_bytes = width * CHANNELS;
            dst.par_chunks_mut(row_bytes)
                .enumerate()
                .for_each(|(y, row)| {
                    for (x, px) in row.chunks_exact_mut(CHANNELS).enumerate() {
                        let i = y * width + x;
                        px[0] = src[i];
                        px[1] = src[plane + i];
                        px[2] = src[2 * plane + i];
                    }
                });
        }
    }
    dst
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planar_to_interleaved_2x2() {
        // R plane, G plane, B plane for a 2x2 image.
        let chw = [1, 2, 3, 4, 10, 20, 30, 40, 100, 101, 102, 103];
        let hwc = transpose_channels(&chw, 2, 2, Layout::ChannelsFirst);
        assert_eq!(
            hwc,
            vec![1, 10, 100, 2, 20, 101, 3, 30, 102, 4, 40, 103]
        );
    }

    #[test]
    fn non_square_round_trip() {
        let hwc: Vec<u8> = (0..3 * 5 * 3).map(|v| v as u8).collect();
        let chw = transpose_channels(&hwc, 3, 5, Layout::ChannelsLast);
        assert_eq!(transpose_channels(&chw, 3, 5, Layout::ChannelsFirst), hwc);
    }
}
