//! Command-line profiles for the wrapped codec programs, plus the ffmpeg codec
//! selection shared with the in-process backend.

use roundtrip_core::prelude::*;

use crate::{CodecError, CodecFamily, QualityRange};

mod bpg;
mod ffmpeg_cli;
mod webp;

pub use bpg::{BpgEncoder, BpgOptions, BpgTool};
pub use ffmpeg_cli::{FfmpegCliOptions, FfmpegCliTool};
pub use webp::{WebpOptions, WebpTool};

/// Codec driven through ffmpeg, either as a subprocess or through libavcodec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FfmpegEncoder {
    X265,
    X264,
    Av1,
    Jpeg,
    Jpeg2000,
}

/// How the quality value reaches the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityKnob {
    /// Constant rate factor (`-crf`).
    Crf,
    /// Fixed quantizer scale (`-q:v`).
    QScale,
}

impl FfmpegEncoder {
    pub fn family(&self) -> CodecFamily {
        match self {
            FfmpegEncoder::X265 => CodecFamily::X265,
            FfmpegEncoder::X264 => CodecFamily::X264,
            FfmpegEncoder::Av1 => CodecFamily::Av1,
            FfmpegEncoder::Jpeg => CodecFamily::Jpeg,
            FfmpegEncoder::Jpeg2000 => CodecFamily::Jpeg2000,
        }
    }

    /// libavcodec encoder name.
    pub fn encoder_name(&self) -> &'static str {
        match self {
            FfmpegEncoder::X265 => "libx265",
            FfmpegEncoder::X264 => "libx264",
            FfmpegEncoder::Av1 => "libaom-av1",
            FfmpegEncoder::Jpeg => "mjpeg",
            FfmpegEncoder::Jpeg2000 => "jpeg2000",
        }
    }

    /// libavcodec decoders to try, most preferred first.
    pub fn decoder_names(&self) -> &'static [&'static str] {
        match self {
            FfmpegEncoder::X265 => &["hevc"],
            FfmpegEncoder::X264 => &["h264"],
            FfmpegEncoder::Av1 => &["libdav1d", "libaom-av1", "av1"],
            FfmpegEncoder::Jpeg => &["mjpeg"],
            FfmpegEncoder::Jpeg2000 => &["jpeg2000", "libopenjpeg"],
        }
    }

    pub fn quality_knob(&self) -> QualityKnob {
        match self {
            FfmpegEncoder::X265 | FfmpegEncoder::X264 | FfmpegEncoder::Av1 => QualityKnob::Crf,
            FfmpegEncoder::Jpeg | FfmpegEncoder::Jpeg2000 => QualityKnob::QScale,
        }
    }

    pub fn quality(&self) -> QualityRange {
        match self {
            FfmpegEncoder::X265 | FfmpegEncoder::X264 => QualityRange::new(51, 1),
            FfmpegEncoder::Av1 => QualityRange::new(60, 1),
            FfmpegEncoder::Jpeg | FfmpegEncoder::Jpeg2000 => QualityRange::new(31, 2),
        }
    }

    pub fn default_quality(&self) -> i32 {
        match self {
            FfmpegEncoder::X265 => 28,
            FfmpegEncoder::X264 => 23,
            FfmpegEncoder::Av1 => 32,
            FfmpegEncoder::Jpeg | FfmpegEncoder::Jpeg2000 => 4,
        }
    }

    /// Extension of the bare (non-container) stream.
    pub fn elementary_extension(&self) -> &'static str {
        match self {
            FfmpegEncoder::X265 => ".hevc",
            FfmpegEncoder::X264 => ".h264",
            FfmpegEncoder::Av1 => ".ivf",
            FfmpegEncoder::Jpeg => ".jpg",
            FfmpegEncoder::Jpeg2000 => ".j2k",
        }
    }

    /// ffmpeg muxer writing the bare stream.
    pub fn elementary_muxer(&self) -> &'static str {
        match self {
            FfmpegEncoder::X265 => "hevc",
            FfmpegEncoder::X264 => "h264",
            FfmpegEncoder::Av1 => "ivf",
            FfmpegEncoder::Jpeg | FfmpegEncoder::Jpeg2000 => "image2",
        }
    }

    /// Planar pixel format the encoder is fed, or why the combination is
    /// unsupported.
    pub fn pix_fmt(&self, color: ColorModel, chroma: ChromaFormat) -> Result<&'static str, CodecError> {
        match (self, color) {
            (_, ColorModel::YCgCo) => Err(CodecError::InvalidInput(format!(
                "{} cannot code YCgCo through ffmpeg",
                self.encoder_name()
            ))),
            (FfmpegEncoder::X265 | FfmpegEncoder::Av1, ColorModel::Rgb) => Ok("gbrp"),
            (FfmpegEncoder::Jpeg2000, ColorModel::Rgb) => Ok("rgb24"),
            (FfmpegEncoder::X264 | FfmpegEncoder::Jpeg, ColorModel::Rgb) => {
                Err(CodecError::InvalidInput(format!(
                    "{} only codes YCbCr",
                    self.encoder_name()
                )))
            }
            (FfmpegEncoder::Jpeg, ColorModel::YCbCr) => Ok(match chroma {
                ChromaFormat::Yuv420 => "yuvj420p",
                ChromaFormat::Yuv422 => "yuvj422p",
                ChromaFormat::Yuv444 => "yuvj444p",
            }),
            (_, ColorModel::YCbCr) => Ok(chroma.ffmpeg_pix_fmt()),
        }
    }
}

/// File wrapping of ffmpeg-produced artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Container {
    /// The codec's native stream/file (`.hevc`, `.ivf`, `.jpg`, ...).
    #[default]
    Elementary,
    /// Matroska (`.mkv`); the byte count includes container overhead.
    Matroska,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_formats_follow_color_and_chroma() {
        assert_eq!(
            FfmpegEncoder::X265
                .pix_fmt(ColorModel::YCbCr, ChromaFormat::Yuv444)
                .unwrap(),
            "yuv444p"
        );
        assert_eq!(
            FfmpegEncoder::Jpeg
                .pix_fmt(ColorModel::YCbCr, ChromaFormat::Yuv420)
                .unwrap(),
            "yuvj420p"
        );
        assert_eq!(
            FfmpegEncoder::Av1
                .pix_fmt(ColorModel::Rgb, ChromaFormat::Yuv444)
                .unwrap(),
            "gbrp"
        );
        assert!(
            FfmpegEncoder::X264
                .pix_fmt(ColorModel::YCgCo, ChromaFormat::Yuv444)
                .unwrap_err()
                .is_invalid_input()
        );
    }

    #[test]
    fn av1_quality_scale_matches_crf_sweep() {
        let steps = FfmpegEncoder::Av1.quality().steps();
        assert_eq!(steps.first(), Some(&60));
        assert_eq!(steps.last(), Some(&1));
        assert_eq!(FfmpegEncoder::Av1.decoder_names()[0], "libdav1d");
    }
}
