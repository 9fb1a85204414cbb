use std::{fmt, num::NonZeroU32, str::FromStr};

/// Image dimensions in pixels.
///
/// # Example
/// ```rust
/// use roundtrip_core::prelude::Resolution;
///
/// let res = Resolution::new(640, 480).unwrap();
/// assert_eq!(res.width.get(), 640);
/// assert_eq!(res.pixels(), 640 * 480);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Resolution {
    /// Width in pixels (non-zero).
    pub width: NonZeroU32,
    /// Height in pixels (non-zero).
    pub height: NonZeroU32,
}

impl Resolution {
    /// Create a resolution, returning `None` if width or height are zero.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        Some(Self {
            width: NonZeroU32::new(width)?,
            height: NonZeroU32::new(height)?,
        })
    }

    /// Total pixel count.
    pub fn pixels(&self) -> usize {
        self.width.get() as usize * self.height.get() as usize
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Sample representation a backend works in internally.
///
/// Callers always exchange RGB; the model only steers backend flags and the
/// conversion done before/after a library codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ColorModel {
    /// Plain RGB samples.
    Rgb,
    /// Luma + blue/red difference (BT.601).
    #[default]
    YCbCr,
    /// Luma + green/orange chroma (lifting transform, lossless-friendly).
    YCgCo,
}

impl ColorModel {
    /// Lowercase name as understood by the BPG tools.
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorModel::Rgb => "rgb",
            ColorModel::YCbCr => "ycbcr",
            ColorModel::YCgCo => "ycgco",
        }
    }
}

impl fmt::Display for ColorModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColorModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rgb" => Ok(ColorModel::Rgb),
            "ycbcr" | "yuv" => Ok(ColorModel::YCbCr),
            "ycgco" => Ok(ColorModel::YCgCo),
            other => Err(format!("unknown color model {other:?}")),
        }
    }
}

/// Chroma subsampling used when the color model carries chroma planes.
///
/// # Example
/// ```rust
/// use roundtrip_core::prelude::ChromaFormat;
///
/// assert_eq!(ChromaFormat::Yuv444.ffmpeg_pix_fmt(), "yuv444p");
/// assert_eq!(ChromaFormat::Yuv420.bpg_arg(), "420");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ChromaFormat {
    /// Half resolution chroma in both directions.
    Yuv420,
    /// Half horizontal chroma resolution.
    Yuv422,
    /// Full resolution chroma.
    #[default]
    Yuv444,
}

impl ChromaFormat {
    /// Value for `bpgenc -f`.
    pub fn bpg_arg(&self) -> &'static str {
        match self {
            ChromaFormat::Yuv420 => "420",
            ChromaFormat::Yuv422 => "422",
            ChromaFormat::Yuv444 => "444",
        }
    }

    /// Planar 8-bit pixel format name understood by ffmpeg's `-pix_fmt`.
    pub fn ffmpeg_pix_fmt(&self) -> &'static str {
        match self {
            ChromaFormat::Yuv420 => "yuv420p",
            ChromaFormat::Yuv422 => "yuv422p",
            ChromaFormat::Yuv444 => "yuv444p",
        }
    }

    /// Horizontal and vertical chroma subsampling factors.
    pub fn subsampling(&self) -> (usize, usize) {
        match self {
            ChromaFormat::Yuv420 => (2, 2),
            ChromaFormat::Yuv422 => (2, 1),
            ChromaFormat::Yuv444 => (1, 1),
        }
    }
}

impl FromStr for ChromaFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches("yuv").trim_end_matches('p') {
            "420" => Ok(ChromaFormat::Yuv420),
            "422" => Ok(ChromaFormat::Yuv422),
            "444" => Ok(ChromaFormat::Yuv444),
            _ => Err(format!("unknown chroma format {s:?}")),
        }
    }
}
