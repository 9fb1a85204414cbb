#![doc = include_str!("../README.md")]

use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use roundtrip_core::prelude::*;

/// Codec family wrapped by an adapter.
///
/// # Example
/// ```rust
/// use roundtrip_codec::CodecFamily;
///
/// assert_eq!(CodecFamily::Av1.to_string(), "av1");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum CodecFamily {
    /// WebP (VP8 intra).
    Webp,
    /// Better Portable Graphics (HEVC intra in a small container).
    Bpg,
    /// HEVC through x265.
    X265,
    /// H.264 through x264.
    X264,
    /// AV1 through libaom.
    Av1,
    /// Baseline JPEG.
    Jpeg,
    /// JPEG 2000.
    Jpeg2000,
}

impl fmt::Display for CodecFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CodecFamily::Webp => "webp",
            CodecFamily::Bpg => "bpg",
            CodecFamily::X265 => "x265",
            CodecFamily::X264 => "x264",
            CodecFamily::Av1 => "av1",
            CodecFamily::Jpeg => "jpeg",
            CodecFamily::Jpeg2000 => "jpeg2000",
        })
    }
}

/// How an adapter reaches its backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BackendMode {
    /// External process; raw pixels over stdin, decoded pixels over stdout.
    Pipe,
    /// External process; image files staged on disk.
    TempFile,
    /// In-process calls into a linked library.
    Library,
}

/// Quality scale of a codec, from the setting giving the smallest output to
/// the one giving the best fidelity. Values are handed to the backend as-is.
///
/// # Example
/// ```rust
/// use roundtrip_codec::QualityRange;
///
/// let crf = QualityRange::new(51, 1);
/// assert_eq!(crf.steps().first(), Some(&51));
/// assert_eq!(crf.steps().last(), Some(&1));
/// assert!(crf.contains(37));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QualityRange {
    /// Lowest-fidelity setting.
    pub worst: i32,
    /// Highest-fidelity setting.
    pub best: i32,
}

impl QualityRange {
    pub const fn new(worst: i32, best: i32) -> Self {
        Self { worst, best }
    }

    /// Every setting ordered from worst to best.
    pub fn steps(&self) -> Vec<i32> {
        if self.worst <= self.best {
            (self.worst..=self.best).collect()
        } else {
            (self.best..=self.worst).rev().collect()
        }
    }

    pub fn contains(&self, quality: i32) -> bool {
        let (lo, hi) = if self.worst <= self.best {
            (self.worst, self.best)
        } else {
            (self.best, self.worst)
        };
        (lo..=hi).contains(&quality)
    }
}

/// Immutable description of an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CodecDescriptor {
    /// Codec family.
    pub family: CodecFamily,
    /// Backend strategy.
    pub backend: BackendMode,
    /// Quality used when a request does not carry one.
    pub default_quality: i32,
    /// Representation the backend is asked to code in.
    pub color: ColorModel,
    /// Chroma subsampling when `color` has chroma planes.
    pub chroma: ChromaFormat,
    /// Extension (with dot) of the compressed artifact.
    pub extension: &'static str,
    /// Short codec name (e.g. "webp", "x265").
    pub name: &'static str,
    /// Implementation/backend identifier (e.g. "cwebp", "ffmpeg-cli", "libavcodec").
    pub impl_name: &'static str,
    /// Quality scale.
    pub quality: QualityRange,
}

/// Image handed to [`Codec::apply`].
#[derive(Debug, Clone, Copy)]
pub enum Original<'a> {
    /// Readable image file.
    Path(&'a Path),
    /// In-memory pixels.
    Image(&'a RgbBuffer),
}

impl Original<'_> {
    /// Layout restored pixels are returned in.
    pub fn layout(&self) -> Layout {
        match self {
            Original::Path(_) => Layout::ChannelsLast,
            Original::Image(img) => img.layout(),
        }
    }
}

impl<'a> From<&'a Path> for Original<'a> {
    fn from(path: &'a Path) -> Self {
        Original::Path(path)
    }
}

impl<'a> From<&'a PathBuf> for Original<'a> {
    fn from(path: &'a PathBuf) -> Self {
        Original::Path(path.as_path())
    }
}

impl<'a> From<&'a RgbBuffer> for Original<'a> {
    fn from(img: &'a RgbBuffer) -> Self {
        Original::Image(img)
    }
}

/// Per-call options for [`Codec::apply`].
///
/// # Example
/// ```rust
/// use roundtrip_codec::ApplyRequest;
///
/// let req = ApplyRequest::new().with_quality(37).keep_encoded("/tmp/out.hevc");
/// assert_eq!(req.quality, Some(37));
/// assert!(req.decoded_path.is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ApplyRequest {
    /// Codec-specific quality; the descriptor default when `None`.
    pub quality: Option<i32>,
    /// Keep the compressed artifact here instead of a temporary file.
    pub encoded_path: Option<PathBuf>,
    /// Write the reconstruction here instead of returning it.
    pub decoded_path: Option<PathBuf>,
}

impl ApplyRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quality(mut self, quality: i32) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn keep_encoded(mut self, path: impl Into<PathBuf>) -> Self {
        self.encoded_path = Some(path.into());
        self
    }

    pub fn write_decoded(mut self, path: impl Into<PathBuf>) -> Self {
        self.decoded_path = Some(path.into());
        self
    }

    /// Requested quality, or the descriptor default.
    pub fn quality_for(&self, descriptor: &CodecDescriptor) -> i32 {
        self.quality.unwrap_or(descriptor.default_quality)
    }
}

/// Result of one round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Size of the compressed artifact in bytes.
    pub n_bytes: u64,
    /// Reconstruction, absent when it was written to `decoded_path`.
    pub restored: Option<RgbBuffer>,
}

impl Outcome {
    /// Bits per pixel for an image of `resolution`.
    pub fn bits_per_pixel(&self, resolution: Resolution) -> f64 {
        self.n_bytes as f64 * 8.0 / resolution.pixels() as f64
    }
}

/// Uniform encode → measure → decode contract.
///
/// # Example
/// ```rust
/// use roundtrip_codec::{ApplyRequest, Codec, ImageJpegCodec, Original};
/// use roundtrip_core::prelude::RgbBuffer;
///
/// let codec = ImageJpegCodec::new();
/// assert!(codec.available());
/// let gray = RgbBuffer::filled(16, 16, [128, 128, 128])?;
/// let out = codec.apply(Original::Image(&gray), &ApplyRequest::new().with_quality(90))?;
/// assert!(out.n_bytes > 0);
/// assert_eq!(out.restored.unwrap().shape(), [16, 16, 3]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub trait Codec: Send + Sync + 'static {
    /// Describes the codec/backend pairing.
    fn descriptor(&self) -> &CodecDescriptor;

    /// Probe whether the backend can be invoked right now. Never fails.
    fn available(&self) -> bool;

    /// Encode `original`, measure the artifact, decode it again.
    fn apply(&self, original: Original<'_>, request: &ApplyRequest) -> Result<Outcome, CodecError>;

    /// Quality settings from worst to best.
    fn quality_steps(&self) -> Vec<i32> {
        self.descriptor().quality.steps()
    }
}

fn exit_label(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit code {code}"),
        None => "termination by signal".into(),
    }
}

/// Errors emitted by codec adapters.
///
/// # Example
/// ```rust
/// use roundtrip_codec::CodecError;
///
/// let err = CodecError::Backend {
///     command: "cwebp -q 80 in.png -o out.webp".into(),
///     status: Some(255),
///     stderr: "Could not process file in.png".into(),
/// };
/// assert!(err.to_string().contains("exit code 255"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The backend program or library cannot be reached.
    #[error("{codec} is unavailable: {missing} not found")]
    Unavailable { codec: &'static str, missing: String },
    /// Caller-supplied input was rejected before touching the backend.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Pixel buffer shape violation.
    #[error(transparent)]
    Buffer(#[from] BufferError),
    /// External process exited unsuccessfully.
    #[error("`{command}` failed with {}: {stderr}", exit_label(.status))]
    Backend {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
    /// External process exceeded the configured wait and was killed.
    #[error("`{command}` timed out after {after:?} and was killed")]
    Timeout { command: String, after: Duration },
    /// External process succeeded but its output is unusable.
    #[error("`{command}` produced unexpected output: {detail}")]
    UnexpectedOutput { command: String, detail: String },
    /// Linked library reported a failure.
    #[error("{codec} library error: {detail}")]
    Library { codec: &'static str, detail: String },
    /// Filesystem or pipe failure.
    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Image file could not be read or written.
    #[error("image error on {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl CodecError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CodecError::Io {
            path: path.into(),
            source,
        }
    }

    /// Backend missing (probe-time condition).
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CodecError::Unavailable { .. })
    }

    /// Rejected before any backend work.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, CodecError::InvalidInput(_) | CodecError::Buffer(_))
    }
}

#[cfg(feature = "codec-ffmpeg")]
pub mod ffmpeg;
pub mod image_jpeg;
pub mod image_utils;
pub mod process;
pub mod registry;
pub mod tools;

pub use image_jpeg::ImageJpegCodec;
pub use registry::{CodecRegistry, RegistryError};

pub mod prelude {
    #[cfg(feature = "codec-ffmpeg")]
    pub use crate::ffmpeg::{FfmpegLibraryCodec, FfmpegLibraryOptions};
    pub use crate::{
        ApplyRequest, BackendMode, Codec, CodecDescriptor, CodecError, CodecFamily,
        CodecRegistry, ImageJpegCodec, Original, Outcome, QualityRange, RegistryError,
        process::{ProcessCodec, ToolConfig, ToolProfile},
        tools::{
            BpgEncoder, BpgOptions, BpgTool, Container, FfmpegCliOptions, FfmpegCliTool,
            FfmpegEncoder, WebpOptions, WebpTool,
        },
    };
    pub use roundtrip_core::prelude::*;
}
