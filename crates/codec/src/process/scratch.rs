//! Files handed to external programs during one `apply` call.

use std::path::{Path, PathBuf};

use tempfile::TempPath;

use super::ToolConfig;
use crate::CodecError;

const PREFIX: &str = "roundtrip-";

/// Either a caller-chosen path that outlives the call, or a uniquely named
/// temporary file removed when the artifact drops.
///
/// # Example
/// ```rust
/// use roundtrip_codec::process::{ToolConfig, scratch::Artifact};
///
/// let cfg = ToolConfig::default();
/// let tmp = Artifact::temp(&cfg, ".webp")?;
/// let path = tmp.path().to_path_buf();
/// assert!(path.exists());
/// drop(tmp);
/// assert!(!path.exists());
/// # Ok::<(), roundtrip_codec::CodecError>(())
/// ```
#[derive(Debug)]
pub struct Artifact {
    path: PathBuf,
    temp: Option<TempPath>,
}

impl Artifact {
    /// Fresh, empty temporary file in the configured scratch directory.
    pub fn temp(config: &ToolConfig, suffix: &str) -> Result<Self, CodecError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(PREFIX).suffix(suffix);
        let file = match &config.scratch_dir {
            Some(dir) => builder
                .tempfile_in(dir)
                .map_err(|e| CodecError::io(dir, e))?,
            None => builder
                .tempfile()
                .map_err(|e| CodecError::io(std::env::temp_dir(), e))?,
        };
        let temp = file.into_temp_path();
        Ok(Self {
            path: temp.to_path_buf(),
            temp: Some(temp),
        })
    }

    /// Caller path that is left in place.
    pub fn kept(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            temp: None,
        }
    }

    /// `path` when given, a temporary file otherwise.
    pub fn kept_or_temp(
        path: Option<&Path>,
        config: &ToolConfig,
        suffix: &str,
    ) -> Result<Self, CodecError> {
        match path {
            Some(path) => Ok(Self::kept(path)),
            None => Self::temp(config, suffix),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        if let Some(temp) = self.temp.take()
            && let Err(e) = temp.close()
            && e.kind() != std::io::ErrorKind::NotFound
        {
            log::warn!("failed to remove {}: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_artifacts_live_in_scratch_dir_and_vanish() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ToolConfig::default().with_scratch_dir(dir.path());
        let a = Artifact::temp(&cfg, ".bpg").unwrap();
        let b = Artifact::temp(&cfg, ".bpg").unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with(dir.path()));
        assert!(a.path().to_string_lossy().ends_with(".bpg"));
        drop((a, b));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn kept_artifacts_survive_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keep.webp");
        std::fs::write(&path, b"data").unwrap();
        let art = Artifact::kept_or_temp(Some(&path), &ToolConfig::default(), ".webp").unwrap();
        assert!(!art.is_temporary());
        drop(art);
        assert!(path.exists());
    }

    #[test]
    fn missing_scratch_dir_is_an_io_error() {
        let cfg = ToolConfig::default().with_scratch_dir("/nonexistent/roundtrip/scratch");
        let err = Artifact::temp(&cfg, ".png").unwrap_err();
        assert!(matches!(err, CodecError::Io { .. }));
    }
}
