//! In-process round trips through the linked libav* libraries.

mod decoder;
mod encoder;
pub(crate) mod util;

use std::{borrow::Cow, fs};

use roundtrip_core::prelude::*;

use crate::{
    ApplyRequest, BackendMode, Codec, CodecDescriptor, CodecError, Original, Outcome, image_utils,
    tools::FfmpegEncoder,
};

/// Settings for [`FfmpegLibraryCodec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FfmpegLibraryOptions {
    pub encoder: FfmpegEncoder,
    pub color: ColorModel,
    pub chroma: ChromaFormat,
    /// Frame threads for encoder and decoder; libav default when `None`.
    pub thread_count: Option<usize>,
}

impl FfmpegLibraryOptions {
    pub fn new(encoder: FfmpegEncoder) -> Self {
        let chroma = match encoder {
            FfmpegEncoder::X264 | FfmpegEncoder::Jpeg => ChromaFormat::Yuv420,
            _ => ChromaFormat::Yuv444,
        };
        Self {
            encoder,
            color: ColorModel::YCbCr,
            chroma,
            thread_count: None,
        }
    }
}

/// Same contract as the ffmpeg subprocess codecs without spawning anything.
/// The encoded artifact is the bare packet stream (`.hevc`, `.h264`, `.obu`,
/// `.jpg`, `.j2k`).
///
/// # Example
/// ```rust,no_run
/// use roundtrip_codec::prelude::*;
///
/// let x265 = FfmpegLibraryCodec::new(FfmpegLibraryOptions::new(FfmpegEncoder::X265));
/// if x265.available() {
///     let gray = RgbBuffer::filled(64, 64, [128, 128, 128])?;
///     let out = x265.apply(Original::Image(&gray), &ApplyRequest::new().with_quality(37))?;
///     assert!(out.n_bytes > 0);
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct FfmpegLibraryCodec {
    options: FfmpegLibraryOptions,
    descriptor: CodecDescriptor,
}

impl FfmpegLibraryCodec {
    pub fn new(options: FfmpegLibraryOptions) -> Self {
        let encoder = options.encoder;
        let (name, extension) = match encoder {
            FfmpegEncoder::X265 => ("x265-lib", ".hevc"),
            FfmpegEncoder::X264 => ("x264-lib", ".h264"),
            FfmpegEncoder::Av1 => ("av1-lib", ".obu"),
            FfmpegEncoder::Jpeg => ("jpeg-lib", ".jpg"),
            FfmpegEncoder::Jpeg2000 => ("jpeg2000-lib", ".j2k"),
        };
        Self {
            options,
            descriptor: CodecDescriptor {
                family: encoder.family(),
                backend: BackendMode::Library,
                default_quality: encoder.default_quality(),
                color: options.color,
                chroma: options.chroma,
                extension,
                name,
                impl_name: "libavcodec",
                quality: encoder.quality(),
            },
        }
    }

    pub fn options(&self) -> &FfmpegLibraryOptions {
        &self.options
    }

    fn check_available(&self) -> Result<(), CodecError> {
        let codec = self.descriptor.name;
        let unavailable = |missing: String| CodecError::Unavailable { codec, missing };
        util::init_ffmpeg().map_err(|e| unavailable(e.to_string()))?;
        let enc = self.options.encoder.encoder_name();
        if ffmpeg_next::codec::encoder::find_by_name(enc).is_none() {
            return Err(unavailable(format!("{enc} encoder in libavcodec")));
        }
        if decoder::find_decoder(self.options.encoder).is_none() {
            return Err(unavailable(format!(
                "decoder ({}) in libavcodec",
                self.options.encoder.decoder_names().join(" | ")
            )));
        }
        Ok(())
    }
}

impl Codec for FfmpegLibraryCodec {
    fn descriptor(&self) -> &CodecDescriptor {
        &self.descriptor
    }

    fn available(&self) -> bool {
        match self.check_available() {
            Ok(()) => true,
            Err(e) => {
                log::trace!("{e}");
                false
            }
        }
    }

    fn apply(&self, original: Original<'_>, request: &ApplyRequest) -> Result<Outcome, CodecError> {
        let quality = request.quality_for(&self.descriptor);
        self.check_available()?;
        let opts = &self.options;
        let pix_fmt = opts.encoder.pix_fmt(opts.color, opts.chroma)?;
        let target = util::pixel_format(pix_fmt)
            .ok_or_else(|| CodecError::InvalidInput(format!("unsupported pixel format {pix_fmt}")))?;
        let image = match original {
            Original::Image(img) => Cow::Borrowed(img),
            Original::Path(path) => Cow::Owned(image_utils::load_rgb(path)?),
        };

        let packets =
            encoder::encode_still(opts.encoder, target, opts.thread_count, &image, quality)?;
        let n_bytes = packets.iter().map(|p| p.len() as u64).sum();
        log::debug!(
            "{}: {} packets, {n_bytes} bytes at quality {quality}",
            self.descriptor.name,
            packets.len()
        );
        if let Some(path) = &request.encoded_path {
            fs::write(path, packets.concat()).map_err(|e| CodecError::io(path, e))?;
        }

        let restored = decoder::decode_still(opts.encoder, opts.thread_count, &packets)?;
        if restored.resolution() != image.resolution() {
            return Err(util::lib_error(format!(
                "decoded {} from a {} original",
                restored.resolution(),
                image.resolution()
            )));
        }
        if let Some(path) = &request.decoded_path {
            image_utils::save(&restored, path)?;
            return Ok(Outcome {
                n_bytes,
                restored: None,
            });
        }
        Ok(Outcome {
            n_bytes,
            restored: Some(restored.into_layout(original.layout())),
        })
    }
}
