use std::{borrow::Cow, fs, path::Path};

use roundtrip_core::prelude::*;

use super::{Invocation, ProcessOutput, ToolConfig, scratch::Artifact};
use crate::{
    ApplyRequest, BackendMode, Codec, CodecDescriptor, CodecError, Original, Outcome, image_utils,
};

/// Where the encoder reads the original from.
#[derive(Debug, Clone, Copy)]
pub enum EncodeSource<'a> {
    /// Image file on disk.
    File(&'a Path),
    /// Packed RGB24 on stdin.
    Stdin(Resolution),
}

/// Where the decoder writes the reconstruction.
#[derive(Debug, Clone, Copy)]
pub enum DecodeSink<'a> {
    /// Image file whose format follows its extension.
    File(&'a Path),
    /// Packed RGB24 on stdout.
    Stdout,
}

/// Command-line knowledge of one family of codec programs.
///
/// Profiles only build command lines; spawning, staging and cleanup belong to
/// [`ProcessCodec`].
pub trait ToolProfile: Send + Sync + 'static {
    fn descriptor(&self) -> &CodecDescriptor;

    /// Programs that must be present for the codec to be usable.
    fn programs(&self) -> Vec<&Path>;

    /// Reject option combinations the tool cannot honour.
    fn validate(&self) -> Result<(), CodecError> {
        Ok(())
    }

    fn encode(
        &self,
        source: EncodeSource<'_>,
        encoded: &Path,
        quality: i32,
    ) -> Result<Invocation, CodecError>;

    fn decode(&self, encoded: &Path, sink: DecodeSink<'_>) -> Result<Invocation, CodecError>;

    /// Extra capability check run after all programs resolved. `Err` names
    /// the missing capability.
    fn probe(&self, _config: &ToolConfig) -> Result<(), String> {
        Ok(())
    }
}

/// [`Codec`] driving external programs described by a [`ToolProfile`].
///
/// # Example
/// ```rust,no_run
/// use roundtrip_codec::prelude::*;
///
/// let webp = ProcessCodec::new(WebpTool::default(), ToolConfig::from_env());
/// if webp.available() {
///     let img = RgbBuffer::filled(64, 64, [128, 128, 128])?;
///     let out = webp.apply(Original::Image(&img), &ApplyRequest::new().with_quality(80))?;
///     println!("{} bytes", out.n_bytes);
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct ProcessCodec<P> {
    profile: P,
    config: ToolConfig,
}

impl<P: ToolProfile> ProcessCodec<P> {
    pub fn new(profile: P, config: ToolConfig) -> Self {
        Self { profile, config }
    }

    pub fn profile(&self) -> &P {
        &self.profile
    }

    pub fn config(&self) -> &ToolConfig {
        &self.config
    }

    /// Programs resolvable on the search path; never spawns.
    fn resolve_programs(&self) -> Result<(), CodecError> {
        let codec = self.profile.descriptor().name;
        for program in self.profile.programs() {
            if self.config.resolve(program).is_none() {
                log::trace!("{codec}: {} not on search path", program.display());
                return Err(CodecError::Unavailable {
                    codec,
                    missing: program.display().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Profile capability probe; may spawn the tool.
    fn probe(&self) -> Result<(), CodecError> {
        let codec = self.profile.descriptor().name;
        self.profile.probe(&self.config).map_err(|missing| {
            log::trace!("{codec}: probe failed, {missing}");
            CodecError::Unavailable { codec, missing }
        })
    }

    fn spawn(&self, mut invocation: Invocation) -> Result<ProcessOutput, CodecError> {
        invocation.program = self.config.resolve(&invocation.program).ok_or_else(|| {
            CodecError::Unavailable {
                codec: self.profile.descriptor().name,
                missing: invocation.program.display().to_string(),
            }
        })?;
        super::run(&invocation, &self.config)
    }

    fn encode(&self, invocation: Invocation, encoded: &Artifact) -> Result<u64, CodecError> {
        let command = invocation.display();
        self.spawn(invocation)?;
        let n_bytes = fs::metadata(encoded.path())
            .map_err(|e| CodecError::io(encoded.path(), e))?
            .len();
        if n_bytes == 0 {
            return Err(CodecError::UnexpectedOutput {
                command,
                detail: format!("{} is empty", encoded.path().display()),
            });
        }
        log::debug!(
            "{}: encoded {} bytes into {}",
            self.profile.descriptor().name,
            n_bytes,
            encoded.path().display()
        );
        Ok(n_bytes)
    }

    /// Raw RGB24 over the pipes; the encoded artifact is the only file.
    fn apply_pipe(
        &self,
        image: &RgbBuffer,
        layout: Layout,
        request: &ApplyRequest,
        quality: i32,
    ) -> Result<Outcome, CodecError> {
        let resolution = image.resolution();
        let desc = self.profile.descriptor();

        let encoded =
            Artifact::kept_or_temp(request.encoded_path.as_deref(), &self.config, desc.extension)?;
        let invocation = self
            .profile
            .encode(EncodeSource::Stdin(resolution), encoded.path(), quality)?
            .stdin(image.packed_rgb().into_owned());
        let n_bytes = self.encode(invocation, &encoded)?;

        let invocation = self.profile.decode(encoded.path(), DecodeSink::Stdout)?;
        let command = invocation.display();
        let output = self.spawn(invocation)?;
        let expected = resolution.pixels() * CHANNELS;
        if output.stdout.len() != expected {
            return Err(CodecError::UnexpectedOutput {
                command,
                detail: format!(
                    "expected {expected} bytes of {resolution} rgb24, got {}",
                    output.stdout.len()
                ),
            });
        }
        let restored = RgbBuffer::new(
            image.width(),
            image.height(),
            Layout::ChannelsLast,
            output.stdout,
        )?;

        if let Some(path) = &request.decoded_path {
            image_utils::save(&restored, path)?;
            return Ok(Outcome {
                n_bytes,
                restored: None,
            });
        }
        Ok(Outcome {
            n_bytes,
            restored: Some(restored.into_layout(layout)),
        })
    }

    /// Original staged as a file, reconstruction read back from a file.
    fn apply_file(
        &self,
        original: Original<'_>,
        request: &ApplyRequest,
        quality: i32,
    ) -> Result<Outcome, CodecError> {
        let desc = self.profile.descriptor();
        let staged;
        let input = match original {
            Original::Path(path) => path,
            Original::Image(img) => {
                staged = Artifact::temp(&self.config, ".png")?;
                image_utils::save(img, staged.path())?;
                staged.path()
            }
        };

        let encoded =
            Artifact::kept_or_temp(request.encoded_path.as_deref(), &self.config, desc.extension)?;
        let invocation = self
            .profile
            .encode(EncodeSource::File(input), encoded.path(), quality)?;
        let n_bytes = self.encode(invocation, &encoded)?;

        let decoded =
            Artifact::kept_or_temp(request.decoded_path.as_deref(), &self.config, ".png")?;
        let invocation = self
            .profile
            .decode(encoded.path(), DecodeSink::File(decoded.path()))?;
        self.spawn(invocation)?;

        if !decoded.is_temporary() {
            return Ok(Outcome {
                n_bytes,
                restored: None,
            });
        }
        let restored = image_utils::load_rgb(decoded.path())?;
        Ok(Outcome {
            n_bytes,
            restored: Some(restored.into_layout(original.layout())),
        })
    }
}

impl<P: ToolProfile> Codec for ProcessCodec<P> {
    fn descriptor(&self) -> &CodecDescriptor {
        self.profile.descriptor()
    }

    fn available(&self) -> bool {
        self.resolve_programs().and_then(|()| self.probe()).is_ok()
    }

    /// Order: program resolution, option validation, input checks, probe,
    /// then the encoder. Bad input never reaches a spawned process.
    fn apply(&self, original: Original<'_>, request: &ApplyRequest) -> Result<Outcome, CodecError> {
        let desc = self.profile.descriptor();
        let quality = request.quality_for(desc);
        self.resolve_programs()?;
        self.profile.validate()?;
        match desc.backend {
            BackendMode::Pipe => {
                let image = match original {
                    Original::Image(img) => Cow::Borrowed(img),
                    Original::Path(path) => Cow::Owned(image_utils::load_rgb(path)?),
                };
                self.probe()?;
                self.apply_pipe(&image, original.layout(), request, quality)
            }
            BackendMode::TempFile | BackendMode::Library => {
                if let Original::Path(path) = original {
                    image_utils::check_readable(path)?;
                }
                self.probe()?;
                self.apply_file(original, request, quality)
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;
    use crate::process::testing::write_tool;
    use crate::{CodecFamily, QualityRange};

    /// Stand-in tools: `enc` copies its input, `dec` copies it back, each
    /// appending its name to `calls` so tests can see what was spawned.
    struct CopyTool {
        descriptor: CodecDescriptor,
        enc: PathBuf,
        dec: PathBuf,
    }

    impl CopyTool {
        fn new(backend: BackendMode) -> Self {
            Self {
                descriptor: CodecDescriptor {
                    family: CodecFamily::Webp,
                    backend,
                    default_quality: 50,
                    color: ColorModel::Rgb,
                    chroma: ChromaFormat::Yuv444,
                    extension: ".bin",
                    name: "copy",
                    impl_name: "sh",
                    quality: QualityRange::new(0, 100),
                },
                enc: PathBuf::from("fake-enc"),
                dec: PathBuf::from("fake-dec"),
            }
        }
    }

    impl ToolProfile for CopyTool {
        fn descriptor(&self) -> &CodecDescriptor {
            &self.descriptor
        }

        fn programs(&self) -> Vec<&Path> {
            vec![self.enc.as_path(), self.dec.as_path()]
        }

        fn encode(
            &self,
            source: EncodeSource<'_>,
            encoded: &Path,
            quality: i32,
        ) -> Result<Invocation, CodecError> {
            let inv = Invocation::new(&self.enc).arg(quality.to_string());
            Ok(match source {
                EncodeSource::File(path) => inv.arg(path).arg(encoded),
                EncodeSource::Stdin(_) => inv.arg("-").arg(encoded),
            })
        }

        fn decode(&self, encoded: &Path, sink: DecodeSink<'_>) -> Result<Invocation, CodecError> {
            let inv = Invocation::new(&self.dec).arg(encoded);
            Ok(match sink {
                DecodeSink::File(path) => inv.arg(path),
                DecodeSink::Stdout => inv.arg("-"),
            })
        }
    }

    struct Fixture {
        tools: tempfile::TempDir,
        scratch: tempfile::TempDir,
    }

    impl Fixture {
        fn new(enc_body: &str) -> Self {
            let tools = tempfile::tempdir().unwrap();
            let log = tools.path().join("calls");
            let copy = format!(
                "echo \"$0\" >> {log}\nif [ \"$2\" = - ]; then cat > \"$3\"; else cp \"$2\" \"$3\"; fi",
                log = log.display()
            );
            let enc = if enc_body.is_empty() { copy } else { enc_body.to_string() };
            write_tool(tools.path(), "fake-enc", &enc);
            write_tool(
                tools.path(),
                "fake-dec",
                &format!(
                    "echo \"$0\" >> {log}\nif [ \"$2\" = - ]; then cat \"$1\"; else cp \"$1\" \"$2\"; fi",
                    log = log.display()
                ),
            );
            Self {
                tools,
                scratch: tempfile::tempdir().unwrap(),
            }
        }

        fn config(&self) -> ToolConfig {
            ToolConfig::default()
                .with_search_path([self.tools.path()])
                .with_scratch_dir(self.scratch.path())
                .with_timeout(Some(Duration::from_secs(10)))
        }

        fn calls(&self) -> usize {
            std::fs::read_to_string(self.tools.path().join("calls"))
                .map(|s| s.lines().count())
                .unwrap_or(0)
        }

        fn scratch_is_empty(&self) -> bool {
            std::fs::read_dir(self.scratch.path()).unwrap().count() == 0
        }
    }

    fn gradient(width: usize, height: usize) -> RgbBuffer {
        let data = (0..width * height * 3).map(|i| (i * 7 % 256) as u8).collect();
        RgbBuffer::new(width, height, Layout::ChannelsLast, data).unwrap()
    }

    #[test]
    fn missing_program_is_unavailable_and_nothing_spawns() {
        let fx = Fixture::new("");
        std::fs::remove_file(fx.tools.path().join("fake-dec")).unwrap();
        let codec = ProcessCodec::new(CopyTool::new(BackendMode::Pipe), fx.config());
        assert!(!codec.available());
        let img = gradient(4, 4);
        let err = codec
            .apply(Original::Image(&img), &ApplyRequest::new())
            .unwrap_err();
        assert!(err.is_unavailable(), "{err}");
        assert_eq!(fx.calls(), 0);
    }

    #[test]
    fn pipe_round_trip_is_lossless_for_copy_tool() {
        let fx = Fixture::new("");
        let codec = ProcessCodec::new(CopyTool::new(BackendMode::Pipe), fx.config());
        assert!(codec.available());
        let img = gradient(5, 3);
        let out = codec
            .apply(Original::Image(&img), &ApplyRequest::new())
            .unwrap();
        assert_eq!(out.n_bytes, 5 * 3 * 3);
        assert_eq!(out.restored.unwrap(), img);
        assert_eq!(fx.calls(), 2);
        assert!(fx.scratch_is_empty());
    }

    #[test]
    fn file_round_trip_restores_caller_layout() {
        let fx = Fixture::new("");
        let codec = ProcessCodec::new(CopyTool::new(BackendMode::TempFile), fx.config());
        let planar = gradient(6, 4).into_layout(Layout::ChannelsFirst);
        let out = codec
            .apply(Original::Image(&planar), &ApplyRequest::new())
            .unwrap();
        let restored = out.restored.unwrap();
        assert_eq!(restored.layout(), Layout::ChannelsFirst);
        assert_eq!(restored, planar);
        assert!(fx.scratch_is_empty());
    }

    #[test]
    fn kept_encoded_and_decoded_paths_persist() {
        let fx = Fixture::new("");
        let out_dir = tempfile::tempdir().unwrap();
        let encoded = out_dir.path().join("img.bin");
        let decoded = out_dir.path().join("img.png");
        let img = gradient(4, 4);
        for backend in [BackendMode::Pipe, BackendMode::TempFile] {
            let codec = ProcessCodec::new(CopyTool::new(backend), fx.config());
            let req = ApplyRequest::new()
                .keep_encoded(&encoded)
                .write_decoded(&decoded);
            let out = codec.apply(Original::Image(&img), &req).unwrap();
            assert!(out.restored.is_none());
            assert_eq!(std::fs::metadata(&encoded).unwrap().len(), out.n_bytes);
            let written = image_utils::load_rgb(&decoded).unwrap();
            assert!(written.same_pixels(&img));
            std::fs::remove_file(&decoded).unwrap();
        }
        assert!(fx.scratch_is_empty());
    }

    #[test]
    fn path_original_is_read_from_disk() {
        let fx = Fixture::new("");
        let src_dir = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("src.png");
        let img = gradient(3, 3);
        image_utils::save(&img, &src).unwrap();
        for backend in [BackendMode::Pipe, BackendMode::TempFile] {
            let codec = ProcessCodec::new(CopyTool::new(backend), fx.config());
            let out = codec
                .apply(Original::Path(&src), &ApplyRequest::new())
                .unwrap();
            let restored = out.restored.unwrap();
            assert_eq!(restored.layout(), Layout::ChannelsLast);
            assert!(restored.same_pixels(&img));
        }
    }

    #[test]
    fn unreadable_original_fails_before_spawning() {
        let fx = Fixture::new("");
        let missing = fx.scratch.path().join("missing.png");
        for backend in [BackendMode::Pipe, BackendMode::TempFile] {
            let codec = ProcessCodec::new(CopyTool::new(backend), fx.config());
            let err = codec
                .apply(Original::Path(&missing), &ApplyRequest::new())
                .unwrap_err();
            assert!(matches!(err, CodecError::Io { .. }), "{err}");
        }
        assert_eq!(fx.calls(), 0);
    }

    #[test]
    fn encoder_failure_surfaces_and_cleans_up() {
        let fx = Fixture::new("echo 'cannot encode' >&2\nexit 2");
        let codec = ProcessCodec::new(CopyTool::new(BackendMode::TempFile), fx.config());
        let img = gradient(4, 4);
        let err = codec
            .apply(Original::Image(&img), &ApplyRequest::new().with_quality(7))
            .unwrap_err();
        match err {
            CodecError::Backend {
                command,
                status,
                stderr,
            } => {
                assert!(command.contains("fake-enc 7"), "{command}");
                assert_eq!(status, Some(2));
                assert_eq!(stderr, "cannot encode");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(fx.scratch_is_empty());
    }

    #[test]
    fn empty_artifact_is_unexpected_output() {
        let fx = Fixture::new("exit 0");
        let codec = ProcessCodec::new(CopyTool::new(BackendMode::TempFile), fx.config());
        let img = gradient(2, 2);
        let err = codec
            .apply(Original::Image(&img), &ApplyRequest::new())
            .unwrap_err();
        assert!(matches!(err, CodecError::UnexpectedOutput { .. }), "{err}");
        assert!(fx.scratch_is_empty());
    }

    #[test]
    fn hung_encoder_times_out_and_cleans_up() {
        let fx = Fixture::new("exec sleep 5");
        let cfg = fx.config().with_timeout(Some(Duration::from_millis(200)));
        let codec = ProcessCodec::new(CopyTool::new(BackendMode::Pipe), cfg);
        let img = gradient(4, 4);
        let err = codec
            .apply(Original::Image(&img), &ApplyRequest::new())
            .unwrap_err();
        assert!(matches!(err, CodecError::Timeout { .. }), "{err}");
        assert!(fx.scratch_is_empty());
    }

    #[test]
    fn repeated_runs_are_deterministic() {
        let fx = Fixture::new("");
        let codec = ProcessCodec::new(CopyTool::new(BackendMode::TempFile), fx.config());
        let img = gradient(8, 8);
        let a = codec
            .apply(Original::Image(&img), &ApplyRequest::new())
            .unwrap();
        let b = codec
            .apply(Original::Image(&img), &ApplyRequest::new())
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn shared_adapter_runs_concurrently_without_leaking_scratch_files() {
        let fx = Fixture::new("");
        let img = gradient(6, 6);
        for backend in [BackendMode::Pipe, BackendMode::TempFile] {
            let codec: std::sync::Arc<dyn Codec> =
                std::sync::Arc::new(ProcessCodec::new(CopyTool::new(backend), fx.config()));
            std::thread::scope(|scope| {
                let handles: Vec<_> = (0..6)
                    .map(|_| {
                        let codec = std::sync::Arc::clone(&codec);
                        let img = &img;
                        scope.spawn(move || {
                            codec
                                .apply(Original::Image(img), &ApplyRequest::new())
                                .unwrap()
                        })
                    })
                    .collect();
                let outs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
                for out in &outs {
                    assert_eq!(out, &outs[0]);
                    assert_eq!(out.restored.as_ref(), Some(&img));
                }
            });
        }
        assert!(fx.scratch_is_empty());
    }
}
