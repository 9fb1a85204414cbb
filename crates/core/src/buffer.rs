use crate::format::Resolution;
use crate::transform::transpose_channels;

/// Axis order of an [`RgbBuffer`].
///
/// # Example
/// ```rust
/// use roundtrip_core::prelude::Layout;
///
/// assert_eq!(Layout::ChannelsLast.shape(4, 2), [2, 4, 3]);
/// assert_eq!(Layout::ChannelsFirst.shape(4, 2), [3, 2, 4]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Layout {
    /// rows × columns × 3 (interleaved RGB).
    #[default]
    ChannelsLast,
    /// 3 × rows × columns (planar RGB).
    ChannelsFirst,
}

impl Layout {
    /// Shape of a `width` × `height` image in this layout.
    pub fn shape(&self, width: usize, height: usize) -> [usize; 3] {
        match self {
            Layout::ChannelsLast => [height, width, CHANNELS],
            Layout::ChannelsFirst => [CHANNELS, height, width],
        }
    }

    /// Guess the layout of a shape: the axis holding exactly 3 entries wins,
    /// channels-last when both ends qualify.
    pub fn infer(shape: [usize; 3]) -> Option<Self> {
        if shape[2] == CHANNELS {
            Some(Layout::ChannelsLast)
        } else if shape[0] == CHANNELS {
            Some(Layout::ChannelsFirst)
        } else {
            None
        }
    }
}

/// Number of samples per pixel.
pub const CHANNELS: usize = 3;

/// Errors raised while building or reshaping a buffer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// The channel axis is not 3.
    #[error("expected 3 channels, shape {shape:?} has {channels} on the {layout:?} channel axis")]
    Channels {
        shape: [usize; 3],
        layout: Layout,
        channels: usize,
    },
    /// A spatial dimension is zero or exceeds `u32`.
    #[error("invalid image dimensions {width}x{height}")]
    Dimensions { width: usize, height: usize },
    /// The sample vector does not match the shape.
    #[error("shape {shape:?} needs {expected} samples, got {actual}")]
    Length {
        shape: [usize; 3],
        expected: usize,
        actual: usize,
    },
    /// No axis of the shape has 3 entries.
    #[error("cannot infer a channel axis for shape {0:?}")]
    UnknownLayout([usize; 3]),
}

/// Three-channel, 8-bit RGB image in either channel-first or channel-last order.
///
/// # Example
/// ```rust
/// use roundtrip_core::prelude::{Layout, RgbBuffer};
///
/// let img = RgbBuffer::from_shape([2, 1, 3], Layout::ChannelsLast, vec![1, 2, 3, 4, 5, 6])?;
/// assert_eq!(img.pixel(0, 1), [4, 5, 6]);
///
/// let planar = img.to_layout(Layout::ChannelsFirst);
/// assert_eq!(planar.shape(), [3, 2, 1]);
/// assert_eq!(planar.as_raw(), &[1, 4, 2, 5, 3, 6]);
/// # Ok::<(), roundtrip_core::buffer::BufferError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbBuffer {
    resolution: Resolution,
    layout: Layout,
    data: Vec<u8>,
}

impl RgbBuffer {
    /// Build from a 3-D shape in the given layout.
    pub fn from_shape(shape: [usize; 3], layout: Layout, data: Vec<u8>) -> Result<Self, BufferError> {
        let (channels, height, width) = match layout {
            Layout::ChannelsLast => (shape[2], shape[0], shape[1]),
            Layout::ChannelsFirst => (shape[0], shape[1], shape[2]),
        };
        if channels != CHANNELS {
            return Err(BufferError::Channels {
                shape,
                layout,
                channels,
            });
        }
        Self::new(width, height, layout, data)
    }

    /// Build from a shape, guessing the channel axis.
    pub fn from_shape_auto(shape: [usize; 3], data: Vec<u8>) -> Result<Self, BufferError> {
        let layout = Layout::infer(shape).ok_or(BufferError::UnknownLayout(shape))?;
        Self::from_shape(shape, layout, data)
    }

    /// Build from explicit dimensions.
    pub fn new(width: usize, height: usize, layout: Layout, data: Vec<u8>) -> Result<Self, BufferError> {
        let resolution = u32::try_from(width)
            .ok()
            .zip(u32::try_from(height).ok())
            .and_then(|(w, h)| Resolution::new(w, h))
            .ok_or(BufferError::Dimensions { width, height })?;
        let expected = resolution.pixels() * CHANNELS;
        if data.len() != expected {
            return Err(BufferError::Length {
                shape: layout.shape(width, height),
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            resolution,
            layout,
            data,
        })
    }

    /// Image filled with a single color.
    pub fn filled(width: usize, height: usize, rgb: [u8; 3]) -> Result<Self, BufferError> {
        let pixels = width.saturating_mul(height);
        let data = rgb.iter().copied().cycle().take(pixels * CHANNELS).collect();
        Self::new(width, height, Layout::ChannelsLast, data)
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn width(&self) -> usize {
        self.resolution.width.get() as usize
    }

    pub fn height(&self) -> usize {
        self.resolution.height.get() as usize
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Shape in the buffer's own layout.
    pub fn shape(&self) -> [usize; 3] {
        self.layout.shape(self.width(), self.height())
    }

    /// Raw samples in the buffer's own layout.
    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// RGB triple at column `x`, row `y`.
    ///
    /// # Panics
    /// Panics when the coordinate is out of bounds.
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let (w, h) = (self.width(), self.height());
        assert!(x < w && y < h, "pixel ({x}, {y}) outside {w}x{h}");
        match self.layout {
            Layout::ChannelsLast => {
                let i = (y * w + x) * CHANNELS;
                [self.data[i], self.data[i + 1], self.data[i + 2]]
            }
            Layout::ChannelsFirst => {
                let plane = w * h;
                let i = y * w + x;
                [self.data[i], self.data[plane + i], self.data[2 * plane + i]]
            }
        }
    }

    /// Copy into `layout`; a plain clone when the layout already matches.
    pub fn to_layout(&self, layout: Layout) -> Self {
        self.clone().into_layout(layout)
    }

    /// Reorder the samples into `layout`. Lossless and reversible.
    pub fn into_layout(self, layout: Layout) -> Self {
        if self.layout == layout {
            return self;
        }
        let data = transpose_channels(&self.data, self.width(), self.height(), self.layout);
        Self {
            resolution: self.resolution,
            layout,
            data,
        }
    }

    /// Interleaved RGB24 bytes, borrowing when already channels-last.
    pub fn packed_rgb(&self) -> std::borrow::Cow<'_, [u8]> {
        match self.layout {
            Layout::ChannelsLast => std::borrow::Cow::Borrowed(&self.data),
            Layout::ChannelsFirst => std::borrow::Cow::Owned(transpose_channels(
                &self.data,
                self.width(),
                self.height(),
                self.layout,
            )),
        }
    }

    /// Channels-last image with this buffer's dimensions; `packed` must hold
    /// `width * height * 3` samples.
    pub(crate) fn with_packed(&self, packed: Vec<u8>) -> Self {
        debug_assert_eq!(packed.len(), self.data.len());
        Self {
            resolution: self.resolution,
            layout: Layout::ChannelsLast,
            data: packed,
        }
    }

    /// Same logical image, regardless of layout.
    pub fn same_pixels(&self, other: &RgbBuffer) -> bool {
        self.resolution == other.resolution && self.packed_rgb() == other.packed_rgb()
    }
}

#[cfg(feature = "image")]
impl RgbBuffer {
    /// Wrap an `image` crate RGB image (channels-last, no copy).
    pub fn from_rgb_image(img: image::RgbImage) -> Result<Self, BufferError> {
        let (width, height) = img.dimensions();
        Self::new(
            width as usize,
            height as usize,
            Layout::ChannelsLast,
            img.into_raw(),
        )
    }

    /// Convert any decoded image to 8-bit RGB.
    pub fn from_dynamic(img: image::DynamicImage) -> Result<Self, BufferError> {
        Self::from_rgb_image(img.into_rgb8())
    }

    /// Copy into an `image` crate RGB image.
    pub fn to_rgb_image(&self) -> image::RgbImage {
        let (width, height) = (self.width() as u32, self.height() as u32);
        image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb(self.pixel(x as usize, y as usize))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_wrong_channel_count() {
        let err = RgbBuffer::from_shape([2, 2, 4], Layout::ChannelsLast, vec![0; 16]).unwrap_err();
        assert!(matches!(err, BufferError::Channels { channels: 4, .. }));

        let err = RgbBuffer::from_shape([1, 2, 2], Layout::ChannelsFirst, vec![0; 4]).unwrap_err();
        assert!(matches!(err, BufferError::Channels { channels: 1, .. }));
    }

    #[test]
    fn rejects_length_and_zero_dims() {
        let err = RgbBuffer::from_shape([2, 2, 3], Layout::ChannelsLast, vec![0; 11]).unwrap_err();
        assert!(matches!(err, BufferError::Length { expected: 12, actual: 11, .. }));

        let err = RgbBuffer::new(0, 2, Layout::ChannelsLast, Vec::new()).unwrap_err();
        assert!(matches!(err, BufferError::Dimensions { .. }));
    }

    #[test]
    fn infers_channel_axis() {
        assert_eq!(Layout::infer([64, 64, 3]), Some(Layout::ChannelsLast));
        assert_eq!(Layout::infer([3, 64, 64]), Some(Layout::ChannelsFirst));
        assert_eq!(Layout::infer([4, 4, 4]), None);
        let img = RgbBuffer::from_shape_auto([3, 1, 2], vec![1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(img.layout(), Layout::ChannelsFirst);
        assert_eq!(img.pixel(1, 0), [2, 4, 6]);
    }

    #[test]
    fn filled_image_has_uniform_pixels() {
        let img = RgbBuffer::filled(3, 2, [128, 128, 128]).unwrap();
        assert_eq!(img.shape(), [2, 3, 3]);
        assert!(img.as_raw().iter().all(|&v| v == 128));
    }

    #[cfg(feature = "image")]
    #[test]
    fn rgb_image_interop_keeps_pixels() {
        let planar = RgbBuffer::from_shape([3, 1, 2], Layout::ChannelsFirst, vec![1, 2, 3, 4, 5, 6])
            .unwrap();
        let img = planar.to_rgb_image();
        assert_eq!(img.get_pixel(1, 0).0, [2, 4, 6]);
        let back = RgbBuffer::from_rgb_image(img).unwrap();
        assert!(back.same_pixels(&planar));
        assert_eq!(back.layout(), Layout::ChannelsLast);
    }

    #[cfg(feature = "image")]
    #[test]
    fn rgb_image_copies_every_sample_in_either_layout() {
        let data: Vec<u8> = (0..5 * 4 * 3).map(|i| (i * 11 % 251) as u8 + 1).collect();
        let packed = RgbBuffer::new(5, 4, Layout::ChannelsLast, data.clone()).unwrap();
        for layout in [Layout::ChannelsLast, Layout::ChannelsFirst] {
            let img = packed.to_layout(layout).to_rgb_image();
            assert_eq!(img.dimensions(), (5, 4));
            assert_eq!(img.into_raw(), data);
        }
    }

    proptest! {
        #[test]
        fn layout_changes_are_reversible(
            width in 1usize..9,
            height in 1usize..9,
            seed in any::<u8>(),
        ) {
            let data: Vec<u8> = (0..width * height * 3)
                .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
                .collect();
            let hwc = RgbBuffer::new(width, height, Layout::ChannelsLast, data).unwrap();
            let chw = hwc.to_layout(Layout::ChannelsFirst);
            prop_assert_eq!(chw.shape(), [3, height, width]);
            prop_assert!(chw.same_pixels(&hwc));
            prop_assert_eq!(chw.into_layout(Layout::ChannelsLast), hwc);
        }
    }
}
