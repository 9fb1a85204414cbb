use std::{borrow::Cow, fs};

use image::{ExtendedColorType, ImageEncoder, ImageFormat, codecs::jpeg::JpegEncoder};
use roundtrip_core::prelude::*;

use crate::{
    ApplyRequest, BackendMode, Codec, CodecDescriptor, CodecError, CodecFamily, Original, Outcome,
    QualityRange, image_utils,
};

/// Baseline JPEG through the `image` crate; needs no external programs.
///
/// # Example
/// ```rust
/// use roundtrip_codec::{Codec, ImageJpegCodec};
///
/// assert_eq!(ImageJpegCodec::new().descriptor().extension, ".jpg");
/// assert_eq!(ImageJpegCodec::jfif().descriptor().name, "jpegfi");
/// ```
#[derive(Debug, Clone)]
pub struct ImageJpegCodec {
    descriptor: CodecDescriptor,
}

impl ImageJpegCodec {
    pub fn new() -> Self {
        Self::named("jpeg", ".jpg")
    }

    /// Same encoder catalogued as `jpegfi`, writing `.jif` artifacts.
    pub fn jfif() -> Self {
        Self::named("jpegfi", ".jif")
    }

    fn named(name: &'static str, extension: &'static str) -> Self {
        Self {
            descriptor: CodecDescriptor {
                family: CodecFamily::Jpeg,
                backend: BackendMode::Library,
                default_quality: 85,
                color: ColorModel::YCbCr,
                chroma: ChromaFormat::Yuv444,
                extension,
                name,
                impl_name: "image",
                quality: QualityRange::new(1, 100),
            },
        }
    }

    fn error(&self, detail: impl ToString) -> CodecError {
        CodecError::Library {
            codec: self.descriptor.name,
            detail: detail.to_string(),
        }
    }

    fn encode(&self, img: &RgbBuffer, quality: u8) -> Result<Vec<u8>, CodecError> {
        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, quality)
            .write_image(
                &img.packed_rgb(),
                img.width() as u32,
                img.height() as u32,
                ExtendedColorType::Rgb8,
            )
            .map_err(|e| self.error(e))?;
        Ok(bytes)
    }
}

impl Default for ImageJpegCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for ImageJpegCodec {
    fn descriptor(&self) -> &CodecDescriptor {
        &self.descriptor
    }

    fn available(&self) -> bool {
        true
    }

    fn apply(&self, original: Original<'_>, request: &ApplyRequest) -> Result<Outcome, CodecError> {
        let quality = request.quality_for(&self.descriptor);
        let quality = u8::try_from(quality)
            .ok()
            .filter(|q| self.descriptor.quality.contains(i32::from(*q)))
            .ok_or_else(|| {
                CodecError::InvalidInput(format!(
                    "{} quality {quality} outside 1..=100",
                    self.descriptor.name
                ))
            })?;
        let image = match original {
            Original::Image(img) => Cow::Borrowed(img),
            Original::Path(path) => Cow::Owned(image_utils::load_rgb(path)?),
        };

        let encoded = self.encode(&image, quality)?;
        let n_bytes = encoded.len() as u64;
        log::debug!(
            "{}: encoded {n_bytes} bytes at quality {quality}",
            self.descriptor.name
        );
        if let Some(path) = &request.encoded_path {
            fs::write(path, &encoded).map_err(|e| CodecError::io(path, e))?;
        }

        let restored = image_utils::decode_rgb(&encoded, ImageFormat::Jpeg).map_err(|e| self.error(e))?;
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

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: usize, height: usize) -> RgbBuffer {
        let mut data = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[(x * 4) as u8, (y * 4) as u8, 128]);
            }
        }
        RgbBuffer::new(width, height, Layout::ChannelsLast, data).unwrap()
    }

    #[test]
    fn mid_gray_round_trip_is_close() {
        let codec = ImageJpegCodec::new();
        let gray = RgbBuffer::filled(64, 64, [128, 128, 128]).unwrap();
        let out = codec
            .apply(Original::Image(&gray), &ApplyRequest::new().with_quality(37))
            .unwrap();
        assert!(out.n_bytes > 0);
        let restored = out.restored.unwrap();
        assert!(mean_absolute_error(&gray, &restored).unwrap() < 10.0);
    }

    #[test]
    fn same_input_gives_same_output() {
        let codec = ImageJpegCodec::new();
        let img = gradient(32, 16);
        let req = ApplyRequest::new().with_quality(60);
        let a = codec.apply(Original::Image(&img), &req).unwrap();
        let b = codec.apply(Original::Image(&img), &req).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn layout_does_not_change_the_result() {
        let codec = ImageJpegCodec::new();
        let hwc = gradient(16, 16);
        let chw = hwc.to_layout(Layout::ChannelsFirst);
        let a = codec.apply(Original::Image(&hwc), &ApplyRequest::new()).unwrap();
        let b = codec.apply(Original::Image(&chw), &ApplyRequest::new()).unwrap();
        assert_eq!(a.n_bytes, b.n_bytes);
        let (ra, rb) = (a.restored.unwrap(), b.restored.unwrap());
        assert_eq!(rb.layout(), Layout::ChannelsFirst);
        assert!(ra.same_pixels(&rb));
    }

    #[test]
    fn higher_quality_costs_more_bytes() {
        let codec = ImageJpegCodec::new();
        let img = gradient(32, 32);
        let low = codec
            .apply(Original::Image(&img), &ApplyRequest::new().with_quality(10))
            .unwrap();
        let high = codec
            .apply(Original::Image(&img), &ApplyRequest::new().with_quality(95))
            .unwrap();
        assert!(high.n_bytes > low.n_bytes);
    }

    #[test]
    fn output_paths_are_honoured() {
        let dir = tempfile::tempdir().unwrap();
        let encoded = dir.path().join("out.jpg");
        let decoded = dir.path().join("out.png");
        let img = gradient(8, 8);
        let out = ImageJpegCodec::new()
            .apply(
                Original::Image(&img),
                &ApplyRequest::new()
                    .keep_encoded(&encoded)
                    .write_decoded(&decoded),
            )
            .unwrap();
        assert!(out.restored.is_none());
        assert_eq!(std::fs::metadata(&encoded).unwrap().len(), out.n_bytes);
        let written = image_utils::load_rgb(&decoded).unwrap();
        let direct = ImageJpegCodec::new()
            .apply(Original::Image(&img), &ApplyRequest::new())
            .unwrap()
            .restored
            .unwrap();
        assert!(written.same_pixels(&direct));
    }

    #[test]
    fn out_of_range_quality_is_invalid_input() {
        let img = gradient(4, 4);
        let err = ImageJpegCodec::new()
            .apply(Original::Image(&img), &ApplyRequest::new().with_quality(0))
            .unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn jfif_variant_shares_the_encoder() {
        let img = gradient(16, 8);
        let req = ApplyRequest::new().with_quality(70);
        let jpeg = ImageJpegCodec::new().apply(Original::Image(&img), &req).unwrap();
        let codec = ImageJpegCodec::jfif().clone();
        assert!(format!("{codec:?}").contains(".jif"));
        let jfif = codec.apply(Original::Image(&img), &req).unwrap();
        assert_eq!(jpeg, jfif);
    }

    #[test]
    fn shared_codec_gives_identical_results_across_threads() {
        let codec: std::sync::Arc<dyn Codec> = std::sync::Arc::new(ImageJpegCodec::new());
        let img = gradient(24, 24);
        let req = ApplyRequest::new().with_quality(50);
        let expected = codec.apply(Original::Image(&img), &req).unwrap();
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| codec.apply(Original::Image(&img), &req).unwrap()))
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap(), expected);
            }
        });
    }
}
