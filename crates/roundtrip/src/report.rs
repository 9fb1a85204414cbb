//! Timed round trips with rate and fidelity figures.

use std::{
    fmt,
    time::{Duration, Instant},
};

use roundtrip_codec::{ApplyRequest, Codec, CodecError, Original, image_utils};
use roundtrip_core::prelude::*;

/// Failures while producing a [`RoundTripReport`].
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Metric(#[from] MetricError),
}

/// Outcome of one measured round trip.
///
/// # Example
/// ```rust
/// use roundtrip::prelude::*;
///
/// let gray = RgbBuffer::filled(32, 32, [128, 128, 128])?;
/// let report = measure(&ImageJpegCodec::new(), &gray, &ApplyRequest::new().with_quality(90))?;
/// assert_eq!(report.codec, "jpeg");
/// assert!(report.bits_per_pixel > 0.0);
/// assert!(report.psnr_ycbcr_611 > 30.0);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RoundTripReport {
    /// Codec name from the descriptor.
    pub codec: &'static str,
    /// Quality actually requested.
    pub quality: i32,
    /// Compressed size in bytes.
    pub n_bytes: u64,
    /// `n_bytes * 8 / (width * height)`.
    pub bits_per_pixel: f64,
    /// YCbCr PSNR with luma weighted 6:1:1 (dB); infinite when lossless.
    pub psnr_ycbcr_611: f64,
    /// Mean absolute RGB sample error.
    pub mean_absolute_error: f64,
    /// Wall time of `apply`, including process start-up.
    pub elapsed: Duration,
}

impl fmt::Display for RoundTripReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} q={}: {} bytes, {:.4} bpp, {:.2} dB, MAE {:.3}, {:.1} ms",
            self.codec,
            self.quality,
            self.n_bytes,
            self.bits_per_pixel,
            self.psnr_ycbcr_611,
            self.mean_absolute_error,
            self.elapsed.as_secs_f64() * 1000.0
        )
    }
}

/// Run `codec` on `original` and compare the reconstruction against it.
///
/// When the request writes the reconstruction to a file, that file is read
/// back for the comparison.
pub fn measure(
    codec: &dyn Codec,
    original: &RgbBuffer,
    request: &ApplyRequest,
) -> Result<RoundTripReport, ReportError> {
    let desc = codec.descriptor();
    let quality = request.quality_for(desc);
    let started = Instant::now();
    let outcome = codec.apply(Original::Image(original), request)?;
    let elapsed = started.elapsed();

    let loaded;
    let restored = match (&outcome.restored, &request.decoded_path) {
        (Some(restored), _) => restored,
        (None, Some(path)) => {
            loaded = image_utils::load_rgb(path)?;
            &loaded
        }
        (None, None) => {
            return Err(CodecError::UnexpectedOutput {
                command: desc.name.to_string(),
                detail: "no reconstruction returned".into(),
            }
            .into());
        }
    };

    let report = RoundTripReport {
        codec: desc.name,
        quality,
        n_bytes: outcome.n_bytes,
        bits_per_pixel: outcome.bits_per_pixel(original.resolution()),
        psnr_ycbcr_611: psnr_ycbcr_611(original, restored)?,
        mean_absolute_error: mean_absolute_error(original, restored)?,
        elapsed,
    };
    log::debug!("{report}");
    Ok(report)
}

/// Measure every setting of `codec`'s quality scale, worst first. Stops at
/// the first failure.
pub fn sweep(codec: &dyn Codec, original: &RgbBuffer) -> Result<Vec<RoundTripReport>, ReportError> {
    codec
        .quality_steps()
        .into_iter()
        .map(|q| measure(codec, original, &ApplyRequest::new().with_quality(q)))
        .collect()
}
