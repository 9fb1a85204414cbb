use std::{fs, path::Path};

use roundtrip_core::prelude::*;

use crate::CodecError;

/// Fail early when `path` is not a readable regular file.
pub fn check_readable(path: &Path) -> Result<(), CodecError> {
    let meta = fs::metadata(path).map_err(|e| CodecError::io(path, e))?;
    if !meta.is_file() {
        return Err(CodecError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
        ));
    }
    fs::File::open(path).map_err(|e| CodecError::io(path, e))?;
    Ok(())
}

/// Decode any supported image file into channels-last RGB.
pub fn load_rgb(path: &Path) -> Result<RgbBuffer, CodecError> {
    check_readable(path)?;
    let img = image::open(path).map_err(|source| CodecError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(RgbBuffer::from_dynamic(img)?)
}

/// Decode an in-memory image of a known format.
pub fn decode_rgb(bytes: &[u8], format: image::ImageFormat) -> Result<RgbBuffer, image::ImageError> {
    let img = image::load_from_memory_with_format(bytes, format)?;
    RgbBuffer::from_dynamic(img).map_err(|e| {
        image::ImageError::Decoding(image::error::DecodingError::new(
            image::error::ImageFormatHint::Exact(format),
            e,
        ))
    })
}

/// Write `img`; the format follows the file extension.
pub fn save(img: &RgbBuffer, path: &Path) -> Result<(), CodecError> {
    img.to_rgb_image()
        .save(path)
        .map_err(|source| CodecError::Image {
            path: path.to_path_buf(),
            source,
        })
}
