use std::{
    fmt,
    path::{Path, PathBuf},
};

use roundtrip_core::prelude::*;

use crate::{
    BackendMode, CodecDescriptor, CodecError, CodecFamily, QualityRange,
    process::{DecodeSink, EncodeSource, Invocation, ToolProfile},
};

/// HEVC encoder linked into `bpgenc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum BpgEncoder {
    /// JCT-VC reference encoder (HM).
    #[default]
    Jctvc,
    /// x265.
    X265,
}

impl BpgEncoder {
    pub fn as_str(&self) -> &'static str {
        match self {
            BpgEncoder::Jctvc => "jctvc",
            BpgEncoder::X265 => "x265",
        }
    }
}

impl fmt::Display for BpgEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `bpgenc`/`bpgdec` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BpgOptions {
    /// Compression level, 1 (fast) to 9 (slow, smaller).
    pub speed: u8,
    /// Internal bit depth, 8 to 12.
    pub bit_depth: u8,
    pub color: ColorModel,
    pub chroma: ChromaFormat,
    pub encoder: BpgEncoder,
    pub bpgenc: PathBuf,
    pub bpgdec: PathBuf,
}

impl Default for BpgOptions {
    fn default() -> Self {
        Self {
            speed: 9,
            bit_depth: 12,
            color: ColorModel::YCbCr,
            chroma: ChromaFormat::Yuv444,
            encoder: BpgEncoder::Jctvc,
            bpgenc: PathBuf::from("bpgenc"),
            bpgdec: PathBuf::from("bpgdec"),
        }
    }
}

/// BPG (HEVC intra) through `bpgenc`/`bpgdec`. Lower quality values mean
/// better fidelity.
///
/// # Example
/// ```rust
/// use roundtrip_codec::prelude::*;
///
/// let tool = BpgTool::x265();
/// assert_eq!(tool.descriptor().name, "bpg-x265");
/// assert_eq!(tool.options().encoder, BpgEncoder::X265);
/// assert_eq!(tool.descriptor().quality.steps()[0], 51);
/// ```
#[derive(Debug, Clone)]
pub struct BpgTool {
    options: BpgOptions,
    descriptor: CodecDescriptor,
}

impl BpgTool {
    pub fn new(options: BpgOptions) -> Self {
        let name = match options.encoder {
            BpgEncoder::Jctvc => "bpg",
            BpgEncoder::X265 => "bpg-x265",
        };
        Self::named(options, name)
    }

    /// BPG with the x265 encoder.
    pub fn x265() -> Self {
        Self::new(BpgOptions {
            encoder: BpgEncoder::X265,
            ..BpgOptions::default()
        })
    }

    /// BPG with the JCT-VC reference encoder, catalogued as plain HEVC.
    pub fn h265() -> Self {
        Self::named(BpgOptions::default(), "h265")
    }

    fn named(options: BpgOptions, name: &'static str) -> Self {
        let descriptor = CodecDescriptor {
            family: CodecFamily::Bpg,
            backend: BackendMode::TempFile,
            default_quality: 28,
            color: options.color,
            chroma: options.chroma,
            extension: ".bpg",
            name,
            impl_name: "bpgenc",
            quality: QualityRange::new(51, 1),
        };
        Self {
            options,
            descriptor,
        }
    }

    pub fn options(&self) -> &BpgOptions {
        &self.options
    }
}

impl Default for BpgTool {
    fn default() -> Self {
        Self::new(BpgOptions::default())
    }
}

impl ToolProfile for BpgTool {
    fn descriptor(&self) -> &CodecDescriptor {
        &self.descriptor
    }

    fn programs(&self) -> Vec<&Path> {
        vec![self.options.bpgenc.as_path(), self.options.bpgdec.as_path()]
    }

    fn validate(&self) -> Result<(), CodecError> {
        let opts = &self.options;
        if !(1..=9).contains(&opts.speed) {
            return Err(CodecError::InvalidInput(format!(
                "bpgenc level {} outside 1..=9",
                opts.speed
            )));
        }
        if !(8..=12).contains(&opts.bit_depth) {
            return Err(CodecError::InvalidInput(format!(
                "bpgenc bit depth {} outside 8..=12",
                opts.bit_depth
            )));
        }
        Ok(())
    }

    fn encode(
        &self,
        source: EncodeSource<'_>,
        encoded: &Path,
        quality: i32,
    ) -> Result<Invocation, CodecError> {
        let EncodeSource::File(input) = source else {
            return Err(CodecError::InvalidInput(
                "bpgenc reads its input from a file".into(),
            ));
        };
        let opts = &self.options;
        Ok(Invocation::new(&opts.bpgenc)
            .arg("-m")
            .arg(opts.speed.to_string())
            .arg("-b")
            .arg(opts.bit_depth.to_string())
            .arg("-q")
            .arg(quality.to_string())
            .args(["-c", opts.color.as_str()])
            .args(["-f", opts.chroma.bpg_arg()])
            .args(["-e", opts.encoder.as_str()])
            .arg(input)
            .arg("-o")
            .arg(encoded))
    }

    fn decode(&self, encoded: &Path, sink: DecodeSink<'_>) -> Result<Invocation, CodecError> {
        match sink {
            DecodeSink::File(out) => Ok(Invocation::new(&self.options.bpgdec)
                .arg(encoded)
                .arg("-o")
                .arg(out)),
            DecodeSink::Stdout => Err(CodecError::InvalidInput(
                "bpgdec writes its output to a file".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_command_matches_bpgenc_flags() {
        let inv = BpgTool::default()
            .encode(
                EncodeSource::File(Path::new("in.png")),
                Path::new("out.bpg"),
                37,
            )
            .unwrap();
        assert_eq!(
            inv.display(),
            "bpgenc -m 9 -b 12 -q 37 -c ycbcr -f 444 -e jctvc in.png -o out.bpg"
        );
    }

    #[test]
    fn variants_differ_only_in_encoder_and_name() {
        let h265 = BpgTool::h265();
        let x265 = BpgTool::x265();
        assert_eq!(h265.descriptor().name, "h265");
        assert_eq!(h265.options().encoder, BpgEncoder::Jctvc);
        assert_eq!(x265.options().encoder, BpgEncoder::X265);
        assert_eq!(h265.descriptor().quality, x265.descriptor().quality);
        assert_eq!(BpgTool::default().descriptor().name, "bpg");
    }

    #[test]
    fn chroma_and_color_options_reach_the_command_line() {
        let tool = BpgTool::new(BpgOptions {
            color: ColorModel::YCgCo,
            chroma: ChromaFormat::Yuv420,
            bit_depth: 8,
            ..BpgOptions::default()
        });
        let inv = tool
            .encode(
                EncodeSource::File(Path::new("a.png")),
                Path::new("a.bpg"),
                20,
            )
            .unwrap();
        let line = inv.display();
        assert!(line.contains("-c ycgco -f 420"), "{line}");
        assert!(line.contains("-b 8"), "{line}");
        assert_eq!(tool.descriptor().color, ColorModel::YCgCo);
    }

    #[test]
    fn decode_writes_png_file_only() {
        let tool = BpgTool::default();
        let inv = tool
            .decode(Path::new("a.bpg"), DecodeSink::File(Path::new("a.png")))
            .unwrap();
        assert_eq!(inv.display(), "bpgdec a.bpg -o a.png");
        assert!(tool.decode(Path::new("a.bpg"), DecodeSink::Stdout).is_err());
    }

    #[test]
    fn invalid_bit_depth_is_rejected() {
        let tool = BpgTool::new(BpgOptions {
            bit_depth: 16,
            ..BpgOptions::default()
        });
        assert!(tool.validate().unwrap_err().is_invalid_input());
    }
}
