use std::path::{Path, PathBuf};

use roundtrip_core::prelude::*;

use super::{Container, FfmpegEncoder, QualityKnob};
use crate::{
    BackendMode, CodecDescriptor, CodecError,
    process::{self, DecodeSink, EncodeSource, Invocation, ToolConfig, ToolProfile},
};

/// Settings for an ffmpeg subprocess codec.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FfmpegCliOptions {
    pub encoder: FfmpegEncoder,
    pub color: ColorModel,
    pub chroma: ChromaFormat,
    pub container: Container,
    pub program: PathBuf,
}

impl FfmpegCliOptions {
    pub fn new(encoder: FfmpegEncoder) -> Self {
        Self {
            encoder,
            color: ColorModel::YCbCr,
            chroma: ChromaFormat::Yuv444,
            container: Container::Elementary,
            program: PathBuf::from("ffmpeg"),
        }
    }

    pub fn with_chroma(mut self, chroma: ChromaFormat) -> Self {
        self.chroma = chroma;
        self
    }

    pub fn with_color(mut self, color: ColorModel) -> Self {
        self.color = color;
        self
    }

    pub fn with_container(mut self, container: Container) -> Self {
        self.container = container;
        self
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }
}

/// Encoders reachable through the `ffmpeg` binary. Pixels travel as raw
/// RGB24 over stdin/stdout; only the encoded artifact touches the disk.
///
/// # Example
/// ```rust
/// use roundtrip_codec::prelude::*;
///
/// let av1 = FfmpegCliTool::av1();
/// assert_eq!(av1.descriptor().extension, ".ivf");
/// assert_eq!(av1.descriptor().backend, BackendMode::Pipe);
///
/// let mkv = FfmpegCliTool::new(FfmpegCliOptions::new(FfmpegEncoder::X265).with_container(Container::Matroska));
/// assert_eq!(mkv.descriptor().extension, ".mkv");
/// ```
#[derive(Debug, Clone)]
pub struct FfmpegCliTool {
    options: FfmpegCliOptions,
    descriptor: CodecDescriptor,
}

impl FfmpegCliTool {
    pub fn new(options: FfmpegCliOptions) -> Self {
        let encoder = options.encoder;
        let extension = match options.container {
            Container::Elementary => encoder.elementary_extension(),
            Container::Matroska => ".mkv",
        };
        let name = match encoder {
            FfmpegEncoder::X265 => "x265",
            FfmpegEncoder::X264 => "x264",
            FfmpegEncoder::Av1 => "av1",
            FfmpegEncoder::Jpeg => "jpeg-ffmpeg",
            FfmpegEncoder::Jpeg2000 => "jpeg2000",
        };
        let descriptor = CodecDescriptor {
            family: encoder.family(),
            backend: BackendMode::Pipe,
            default_quality: encoder.default_quality(),
            color: options.color,
            chroma: options.chroma,
            extension,
            name,
            impl_name: "ffmpeg-cli",
            quality: encoder.quality(),
        };
        Self {
            options,
            descriptor,
        }
    }

    pub fn x265() -> Self {
        Self::new(FfmpegCliOptions::new(FfmpegEncoder::X265))
    }

    pub fn x264() -> Self {
        Self::new(FfmpegCliOptions::new(FfmpegEncoder::X264).with_chroma(ChromaFormat::Yuv420))
    }

    pub fn av1() -> Self {
        Self::new(FfmpegCliOptions::new(FfmpegEncoder::Av1))
    }

    pub fn jpeg() -> Self {
        Self::new(FfmpegCliOptions::new(FfmpegEncoder::Jpeg).with_chroma(ChromaFormat::Yuv420))
    }

    pub fn jpeg2000() -> Self {
        Self::new(FfmpegCliOptions::new(FfmpegEncoder::Jpeg2000))
    }

    pub fn options(&self) -> &FfmpegCliOptions {
        &self.options
    }

    fn muxer(&self) -> &'static str {
        match self.options.container {
            Container::Elementary => self.options.encoder.elementary_muxer(),
            Container::Matroska => "matroska",
        }
    }

    fn base(&self) -> Invocation {
        Invocation::new(&self.options.program).args(["-hide_banner", "-nostdin", "-loglevel", "error"])
    }
}

impl ToolProfile for FfmpegCliTool {
    fn descriptor(&self) -> &CodecDescriptor {
        &self.descriptor
    }

    fn programs(&self) -> Vec<&Path> {
        vec![self.options.program.as_path()]
    }

    fn validate(&self) -> Result<(), CodecError> {
        self.options
            .encoder
            .pix_fmt(self.options.color, self.options.chroma)
            .map(drop)
    }

    fn encode(
        &self,
        source: EncodeSource<'_>,
        encoded: &Path,
        quality: i32,
    ) -> Result<Invocation, CodecError> {
        let encoder = self.options.encoder;
        let pix_fmt = encoder.pix_fmt(self.options.color, self.options.chroma)?;
        let inv = match source {
            // stdin carries the frame; -nostdin would close it
            EncodeSource::Stdin(res) => Invocation::new(&self.options.program)
                .args(["-hide_banner", "-loglevel", "error"])
                .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-s"])
                .arg(res.to_string())
                .args(["-i", "-"]),
            EncodeSource::File(path) => self.base().arg("-i").arg(path),
        };
        let inv = inv
            .args(["-y", "-frames:v", "1", "-c:v", encoder.encoder_name()])
            .args(["-pix_fmt", pix_fmt]);
        let inv = match encoder.quality_knob() {
            QualityKnob::Crf => inv.arg("-crf").arg(quality.to_string()),
            QualityKnob::QScale => inv.arg("-q:v").arg(quality.to_string()),
        };
        let inv = match encoder {
            FfmpegEncoder::Av1 => inv.args(["-b:v", "0", "-strict", "experimental"]),
            FfmpegEncoder::X265 => inv.args(["-x265-params", "log-level=error"]),
            _ => inv,
        };
        let inv = if self.muxer() == "image2" {
            inv.args(["-update", "1"])
        } else {
            inv
        };
        Ok(inv.args(["-f", self.muxer()]).arg(encoded))
    }

    fn decode(&self, encoded: &Path, sink: DecodeSink<'_>) -> Result<Invocation, CodecError> {
        let inv = self.base().arg("-i").arg(encoded).args(["-frames:v", "1"]);
        Ok(match sink {
            DecodeSink::Stdout => inv.args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"]),
            DecodeSink::File(out) => inv.args(["-y", "-update", "1"]).arg(out),
        })
    }

    fn probe(&self, config: &ToolConfig) -> Result<(), String> {
        let name = self.options.encoder.encoder_name();
        let missing = || format!("{name} encoder in {}", self.options.program.display());
        let program = config
            .resolve(&self.options.program)
            .ok_or_else(|| self.options.program.display().to_string())?;
        let listing = Invocation::new(program).args(["-hide_banner", "-nostdin", "-encoders"]);
        let output = process::run(&listing, config).map_err(|e| {
            log::trace!("encoder listing failed: {e}");
            missing()
        })?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if lists_encoder(&stdout, name) {
            Ok(())
        } else {
            Err(missing())
        }
    }
}

/// Whether `ffmpeg -encoders` output names `encoder`. Rows look like
/// ` V....D libx265              libx265 H.265 / HEVC`.
fn lists_encoder(listing: &str, encoder: &str) -> bool {
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|name| name == encoder)
}
