#![doc = include_str!("../README.md")]

pub mod buffer;
pub mod color;
pub mod format;
pub mod metrics;
pub mod transform;

pub mod prelude {
    pub use crate::{
        buffer::{BufferError, CHANNELS, Layout, RgbBuffer},
        color::{rgb_to_ycbcr, ycbcr_to_rgb},
        format::{ChromaFormat, ColorModel, Resolution},
        metrics::{MetricError, mean_absolute_error, mse, psnr, psnr_ycbcr_611},
        transform::transpose_channels,
    };
}
