use ffmpeg_next::{
    error::Error as FfmpegError,
    frame::Video as FfFrame,
    software::scaling::{context::Context as ScalingContext, flag::Flags},
    util::{error::EAGAIN, format::pixel::Pixel as PixelFormat},
};

use crate::CodecError;

pub(crate) fn init_ffmpeg() -> Result<(), CodecError> {
    ffmpeg_next::init().map_err(|e| lib_error(format!("ffmpeg init failed: {e}")))
}

pub(crate) fn lib_error(detail: impl Into<String>) -> CodecError {
    CodecError::Library {
        codec: "libavcodec",
        detail: detail.into(),
    }
}

pub(crate) fn is_again(err: &FfmpegError) -> bool {
    matches!(err, FfmpegError::Other { errno } if *errno == EAGAIN)
}

/// libav pixel format for an ffmpeg `-pix_fmt` name.
pub(crate) fn pixel_format(name: &str) -> Option<PixelFormat> {
    match name {
        "yuv420p" => Some(PixelFormat::YUV420P),
        "yuv422p" => Some(PixelFormat::YUV422P),
        "yuv444p" => Some(PixelFormat::YUV444P),
        "yuvj420p" => Some(PixelFormat::YUVJ420P),
        "yuvj422p" => Some(PixelFormat::YUVJ422P),
        "yuvj444p" => Some(PixelFormat::YUVJ444P),
        "gbrp" => Some(PixelFormat::GBRP),
        "rgb24" => Some(PixelFormat::RGB24),
        _ => None,
    }
}

/// Convert `src` into a freshly allocated frame of `target` format.
pub(crate) fn convert(src: &FfFrame, target: PixelFormat) -> Result<FfFrame, CodecError> {
    let (width, height) = (src.width(), src.height());
    let mut scaler = ScalingContext::get(
        src.format(),
        width,
        height,
        target,
        width,
        height,
        Flags::BILINEAR | Flags::ACCURATE_RND | Flags::FULL_CHR_H_INT,
    )
    .map_err(|e| lib_error(format!("scaler init failed: {e}")))?;
    let mut dst = FfFrame::new(target, width, height);
    scaler
        .run(src, &mut dst)
        .map_err(|e| lib_error(format!("scale failed: {e}")))?;
    Ok(dst)
}

/// Copy packed RGB24 rows into an RGB24 frame honouring its stride.
pub(crate) fn rgb_frame(packed: &[u8], width: u32, height: u32) -> Result<FfFrame, CodecError> {
    let mut frame = FfFrame::new(PixelFormat::RGB24, width, height);
    let row_len = width as usize * 3;
    let stride = frame.stride(0);
    let data = frame.data_mut(0);
    for (y, row) in packed.chunks_exact(row_len).take(height as usize).enumerate() {
        let off = y * stride;
        let dst = data
            .get_mut(off..off + row_len)
            .ok_or_else(|| lib_error("rgb frame smaller than image"))?;
        dst.copy_from_slice(row);
    }
    Ok(frame)
}

/// Packed RGB24 rows of an RGB24 frame.
pub(crate) fn rgb_rows(frame: &FfFrame) -> Result<Vec<u8>, CodecError> {
    let row_len = frame.width() as usize * 3;
    let height = frame.height() as usize;
    let stride = frame.stride(0);
    let data = frame.data(0);
    let mut out = Vec::with_capacity(row_len * height);
    for y in 0..height {
        let off = y * stride;
        let row = data
            .get(off..off + row_len)
            .ok_or_else(|| lib_error("decoded frame shorter than its geometry"))?;
        out.extend_from_slice(row);
    }
    Ok(out)
}
