use std::path::{Path, PathBuf};

use roundtrip_core::prelude::*;

use crate::{
    BackendMode, CodecDescriptor, CodecError, CodecFamily, QualityRange,
    process::{DecodeSink, EncodeSource, Invocation, ToolProfile},
};

/// `cwebp`/`dwebp` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WebpOptions {
    /// Compression method, 0 (fast) to 6 (slow, smaller).
    pub speed: u8,
    pub cwebp: PathBuf,
    pub dwebp: PathBuf,
}

impl Default for WebpOptions {
    fn default() -> Self {
        Self {
            speed: 6,
            cwebp: PathBuf::from("cwebp"),
            dwebp: PathBuf::from("dwebp"),
        }
    }
}

/// Lossy WebP through the libwebp command-line tools.
///
/// # Example
/// ```rust
/// use roundtrip_codec::prelude::*;
///
/// let tool = WebpTool::default();
/// assert_eq!(tool.descriptor().extension, ".webp");
/// assert_eq!(tool.descriptor().quality.steps().len(), 101);
/// ```
#[derive(Debug, Clone)]
pub struct WebpTool {
    options: WebpOptions,
    descriptor: CodecDescriptor,
}

impl WebpTool {
    pub fn new(options: WebpOptions) -> Self {
        Self {
            options,
            descriptor: CodecDescriptor {
                family: CodecFamily::Webp,
                backend: BackendMode::TempFile,
                default_quality: 75,
                color: ColorModel::YCbCr,
                chroma: ChromaFormat::Yuv420,
                extension: ".webp",
                name: "webp",
                impl_name: "cwebp",
                quality: QualityRange::new(0, 100),
            },
        }
    }

    pub fn options(&self) -> &WebpOptions {
        &self.options
    }
}

impl Default for WebpTool {
    fn default() -> Self {
        Self::new(WebpOptions::default())
    }
}

impl ToolProfile for WebpTool {
    fn descriptor(&self) -> &CodecDescriptor {
        &self.descriptor
    }

    fn programs(&self) -> Vec<&Path> {
        vec![self.options.cwebp.as_path(), self.options.dwebp.as_path()]
    }

    fn validate(&self) -> Result<(), CodecError> {
        if self.options.speed > 6 {
            return Err(CodecError::InvalidInput(format!(
                "cwebp method {} outside 0..=6",
                self.options.speed
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
                "cwebp reads its input from a file".into(),
            ));
        };
        Ok(Invocation::new(&self.options.cwebp)
            .args(["-quiet", "-m"])
            .arg(self.options.speed.to_string())
            .arg("-q")
            .arg(quality.to_string())
            .arg(input)
            .arg("-o")
            .arg(encoded))
    }

    fn decode(&self, encoded: &Path, sink: DecodeSink<'_>) -> Result<Invocation, CodecError> {
        let inv = Invocation::new(&self.options.dwebp)
            .arg("-quiet")
            .arg(encoded);
        Ok(match sink {
            DecodeSink::File(out) => inv.arg("-o").arg(out),
            DecodeSink::Stdout => inv.args(["-rgb", "-o", "-"]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(inv: &Invocation) -> Vec<String> {
        inv.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn encode_command_carries_speed_and_quality() {
        let tool = WebpTool::default();
        let inv = tool
            .encode(
                EncodeSource::File(Path::new("in.png")),
                Path::new("out.webp"),
                80,
            )
            .unwrap();
        assert_eq!(inv.program, PathBuf::from("cwebp"));
        assert_eq!(
            args(&inv),
            ["-quiet", "-m", "6", "-q", "80", "in.png", "-o", "out.webp"]
        );
    }

    #[test]
    fn decode_command_writes_requested_file() {
        let tool = WebpTool::default();
        let inv = tool
            .decode(Path::new("a.webp"), DecodeSink::File(Path::new("a.png")))
            .unwrap();
        assert_eq!(inv.display(), "dwebp -quiet a.webp -o a.png");

        let raw = tool.decode(Path::new("a.webp"), DecodeSink::Stdout).unwrap();
        assert_eq!(raw.display(), "dwebp -quiet a.webp -rgb -o -");
    }

    #[test]
    fn out_of_range_method_is_rejected() {
        let tool = WebpTool::new(WebpOptions {
            speed: 9,
            ..WebpOptions::default()
        });
        assert!(tool.validate().unwrap_err().is_invalid_input());
    }
}
