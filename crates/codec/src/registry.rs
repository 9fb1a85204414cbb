//! Codecs addressable by name.

use std::sync::{Arc, RwLock};

use crate::{
    Codec, CodecDescriptor, CodecError, ImageJpegCodec,
    process::{ProcessCodec, ToolConfig},
    tools::{BpgTool, FfmpegCliTool, WebpTool},
};

/// Names understood by [`build`].
pub const CATALOG: &[&str] = &[
    "webp",
    "bpg",
    "h265",
    "bpg-x265",
    "x265",
    "x264",
    "av1",
    "jpeg",
    "jpegfi",
    "jpeg-ffmpeg",
    "jpeg2000",
    #[cfg(feature = "codec-ffmpeg")]
    "x265-lib",
    #[cfg(feature = "codec-ffmpeg")]
    "x264-lib",
    #[cfg(feature = "codec-ffmpeg")]
    "av1-lib",
    #[cfg(feature = "codec-ffmpeg")]
    "jpeg-lib",
    #[cfg(feature = "codec-ffmpeg")]
    "jpeg2000-lib",
];

/// Construct the catalogued codec called `name` with default options.
///
/// # Example
/// ```rust
/// use roundtrip_codec::{process::ToolConfig, registry};
///
/// let codec = registry::build("bpg-x265", &ToolConfig::default()).unwrap();
/// assert_eq!(codec.descriptor().impl_name, "bpgenc");
/// assert!(registry::build("gif", &ToolConfig::default()).is_none());
/// ```
pub fn build(name: &str, config: &ToolConfig) -> Option<Arc<dyn Codec>> {
    let cfg = config.clone();
    let codec: Arc<dyn Codec> = match name.to_ascii_lowercase().as_str() {
        "webp" => Arc::new(ProcessCodec::new(WebpTool::default(), cfg)),
        "bpg" => Arc::new(ProcessCodec::new(BpgTool::default(), cfg)),
        "h265" => Arc::new(ProcessCodec::new(BpgTool::h265(), cfg)),
        "bpg-x265" => Arc::new(ProcessCodec::new(BpgTool::x265(), cfg)),
        "x265" => Arc::new(ProcessCodec::new(FfmpegCliTool::x265(), cfg)),
        "x264" => Arc::new(ProcessCodec::new(FfmpegCliTool::x264(), cfg)),
        "av1" => Arc::new(ProcessCodec::new(FfmpegCliTool::av1(), cfg)),
        "jpeg" => Arc::new(ImageJpegCodec::new()),
        "jpegfi" => Arc::new(ImageJpegCodec::jfif()),
        "jpeg-ffmpeg" => Arc::new(ProcessCodec::new(FfmpegCliTool::jpeg(), cfg)),
        "jpeg2000" => Arc::new(ProcessCodec::new(FfmpegCliTool::jpeg2000(), cfg)),
        #[cfg(feature = "codec-ffmpeg")]
        lib if lib.ends_with("-lib") => {
            use crate::{
                ffmpeg::{FfmpegLibraryCodec, FfmpegLibraryOptions},
                tools::FfmpegEncoder,
            };
            let encoder = match lib {
                "x265-lib" => FfmpegEncoder::X265,
                "x264-lib" => FfmpegEncoder::X264,
                "av1-lib" => FfmpegEncoder::Av1,
                "jpeg-lib" => FfmpegEncoder::Jpeg,
                "jpeg2000-lib" => FfmpegEncoder::Jpeg2000,
                _ => return None,
            };
            Arc::new(FfmpegLibraryCodec::new(FfmpegLibraryOptions::new(encoder)))
        }
        _ => return None,
    };
    Some(codec)
}

/// Errors surfaced by the registry.
///
/// # Example
/// ```rust
/// use roundtrip_codec::RegistryError;
///
/// let err = RegistryError::NotFound("gif".into());
/// assert_eq!(err.to_string(), "codec not registered: gif");
/// ```
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No codec registered under the requested name.
    #[error("codec not registered: {0}")]
    NotFound(String),
    /// Codec failed while processing.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Thread-safe name → codec table; clones share the same table.
///
/// # Example
/// ```rust
/// use std::sync::Arc;
/// use roundtrip_codec::{CodecRegistry, ImageJpegCodec};
///
/// let registry = CodecRegistry::new();
/// registry.register(Arc::new(ImageJpegCodec::new()));
/// assert!(registry.lookup("jpeg").is_ok());
/// assert_eq!(registry.names(), vec!["jpeg"]);
/// # Ok::<(), roundtrip_codec::RegistryError>(())
/// ```
#[derive(Clone, Default)]
pub struct CodecRegistry {
    codecs: Arc<RwLock<Vec<Arc<dyn Codec>>>>,
}

impl CodecRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every catalogued codec, configured with `config`.
    pub fn with_default_codecs(config: &ToolConfig) -> Self {
        let registry = Self::new();
        for name in CATALOG {
            if let Some(codec) = build(name, config) {
                registry.register(codec);
            }
        }
        registry
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<dyn Codec>>> {
        self.codecs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Arc<dyn Codec>>> {
        self.codecs.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a codec, replacing any codec of the same name.
    pub fn register(&self, codec: Arc<dyn Codec>) {
        let mut guard = self.write();
        let name = codec.descriptor().name;
        guard.retain(|c| !c.descriptor().name.eq_ignore_ascii_case(name));
        guard.push(codec);
    }

    /// Lookup a codec by name (case-insensitive).
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Codec>, RegistryError> {
        self.read()
            .iter()
            .find(|c| c.descriptor().name.eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Drop the codec called `name`; returns whether one was registered.
    pub fn disable(&self, name: &str) -> bool {
        let mut guard = self.write();
        let before = guard.len();
        guard.retain(|c| !c.descriptor().name.eq_ignore_ascii_case(name));
        guard.len() != before
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.read().iter().map(|c| c.descriptor().name).collect()
    }

    /// Snapshot of all registered descriptors.
    pub fn list_registered(&self) -> Vec<CodecDescriptor> {
        self.read().iter().map(|c| c.descriptor().clone()).collect()
    }

    /// Descriptors of codecs whose backend answers right now.
    pub fn list_available(&self) -> Vec<CodecDescriptor> {
        let codecs: Vec<_> = self.read().clone();
        codecs
            .iter()
            .filter(|c| c.available())
            .map(|c| c.descriptor().clone())
            .collect()
    }

    /// Look up `name` and run a round trip with it.
    pub fn apply(
        &self,
        name: &str,
        original: crate::Original<'_>,
        request: &crate::ApplyRequest,
    ) -> Result<crate::Outcome, RegistryError> {
        Ok(self.lookup(name)?.apply(original, request)?)
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("codecs", &self.names())
            .finish()
    }
}
