use rayon::prelude::*;

use crate::buffer::{CHANNELS, RgbBuffer};
use crate::color::rgb_to_ycbcr;

/// Reasons two images cannot be compared.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetricError {
    #[error("cannot compare {a} with {b}: resolutions differ")]
    ResolutionMismatch { a: String, b: String },
}

fn check(a: &RgbBuffer, b: &RgbBuffer) -> Result<(), MetricError> {
    if a.resolution() != b.resolution() {
        return Err(MetricError::ResolutionMismatch {
            a: a.resolution().to_string(),
            b: b.resolution().to_string(),
        });
    }
    Ok(())
}

/// Per-channel sums of (absolute, squared) differences, layout independent.
fn channel_sums(a: &RgbBuffer, b: &RgbBuffer) -> [(f64, f64); CHANNELS] {
    let pa = a.packed_rgb();
    let pb = b.packed_rgb();
    pa.par_chunks_exact(CHANNELS)
        .zip(pb.par_chunks_exact(CHANNELS))
        .fold(
            || [(0.0f64, 0.0f64); CHANNELS],
            |mut acc, (x, y)| {
                for c in 0..CHANNELS {
                    let d = x[c] as f64 - y[c] as f64;
                    acc[c].0 += d.abs();
                    acc[c].1 += d * d;
                }
                acc
            },
        )
        .reduce(
            || [(0.0, 0.0); CHANNELS],
            |mut l, r| {
                for c in 0..CHANNELS {
                    l[c].0 += r[c].0;
                    l[c].1 += r[c].1;
                }
                l
            },
        )
}

/// Mean absolute sample difference over all channels.
///
/// # Example
/// ```rust
/// use roundtrip_core::prelude::RgbBuffer;
/// use roundtrip_core::metrics::mean_absolute_error;
///
/// let a = RgbBuffer::filled(4, 4, [100, 100, 100]).unwrap();
/// let b = RgbBuffer::filled(4, 4, [104, 100, 98]).unwrap();
/// assert_eq!(mean_absolute_error(&a, &b).unwrap(), 2.0);
/// ```
pub fn mean_absolute_error(a: &RgbBuffer, b: &RgbBuffer) -> Result<f64, MetricError> {
    check(a, b)?;
    let sums = channel_sums(a, b);
    let total: f64 = sums.iter().map(|s| s.0).sum();
    Ok(total / (a.resolution().pixels() * CHANNELS) as f64)
}

/// Per-channel mean squared error.
pub fn channel_mse(a: &RgbBuffer, b: &RgbBuffer) -> Result<[f64; CHANNELS], MetricError> {
    check(a, b)?;
    let n = a.resolution().pixels() as f64;
    let sums = channel_sums(a, b);
    Ok([sums[0].1 / n, sums[1].1 / n, sums[2].1 / n])
}

/// Mean squared error over all channels.
pub fn mse(a: &RgbBuffer, b: &RgbBuffer) -> Result<f64, MetricError> {
    let per = channel_mse(a, b)?;
    Ok(per.iter().sum::<f64>() / CHANNELS as f64)
}

/// PSNR in dB for an 8-bit MSE; infinite for identical images.
pub fn psnr_from_mse(mse: f64) -> f64 {
    if mse <= 0.0 {
        f64::INFINITY
    } else {
        10.0 * (255.0 * 255.0 / mse).log10()
    }
}

/// RGB PSNR in dB.
pub fn psnr(a: &RgbBuffer, b: &RgbBuffer) -> Result<f64, MetricError> {
    mse(a, b).map(psnr_from_mse)
}

/// YCbCr 4:4:4 PSNR with luma weighted 6:1:1 against the chroma channels.
pub fn psnr_ycbcr_611(reference: &RgbBuffer, test: &RgbBuffer) -> Result<f64, MetricError> {
    check(reference, test)?;
    let per = channel_mse(&rgb_to_ycbcr(reference), &rgb_to_ycbcr(test))?;
    Ok(psnr_from_mse((6.0 * per[0] + per[1] + per[2]) / 8.0))
}
