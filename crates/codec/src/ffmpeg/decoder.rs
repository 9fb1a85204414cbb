use ffmpeg_next::{
    codec::{self, decoder},
    error::Error as FfmpegError,
    frame::Video as FfFrame,
    packet::Packet,
    util::format::pixel::Pixel as PixelFormat,
};
use roundtrip_core::prelude::*;

use super::util::{convert, is_again, lib_error, rgb_rows};
use crate::{CodecError, tools::FfmpegEncoder};

/// First libav decoder present for `which`.
pub(crate) fn find_decoder(which: FfmpegEncoder) -> Option<ffmpeg_next::Codec> {
    which
        .decoder_names()
        .iter()
        .find_map(|name| decoder::find_by_name(name))
}

/// Decode the packets of a still image back to RGB24.
pub(crate) fn decode_still(
    which: FfmpegEncoder,
    threads: Option<usize>,
    packets: &[Vec<u8>],
) -> Result<RgbBuffer, CodecError> {
    let codec = find_decoder(which).ok_or_else(|| {
        lib_error(format!(
            "no ffmpeg decoder among {:?}",
            which.decoder_names()
        ))
    })?;
    let mut context = codec::Context::new_with_codec(codec);
    if let Some(count) = threads {
        context.set_threading(codec::threading::Config {
            kind: codec::threading::Type::Frame,
            count,
            ..Default::default()
        });
    }
    let mut decoder = context
        .decoder()
        .video()
        .map_err(|e| lib_error(e.to_string()))?;

    let mut frame = None;
    for data in packets {
        let packet = Packet::copy(data);
        match decoder.send_packet(&packet) {
            Ok(()) => {}
            Err(err) if is_again(&err) => {
                receive_first(&mut decoder, &mut frame)?;
                decoder
                    .send_packet(&packet)
                    .map_err(|e| lib_error(format!("send_packet failed: {e}")))?;
            }
            Err(err) => return Err(lib_error(format!("send_packet failed: {err}"))),
        }
        receive_first(&mut decoder, &mut frame)?;
    }
    decoder
        .send_eof()
        .map_err(|e| lib_error(format!("decoder flush failed: {e}")))?;
    receive_first(&mut decoder, &mut frame)?;

    let frame = frame.ok_or_else(|| lib_error("decoder produced no frame"))?;
    let rgb = if frame.format() == PixelFormat::RGB24 {
        frame
    } else {
        convert(&frame, PixelFormat::RGB24)?
    };
    let (width, height) = (rgb.width() as usize, rgb.height() as usize);
    Ok(RgbBuffer::new(width, height, Layout::ChannelsLast, rgb_rows(&rgb)?)?)
}

/// Drain decoded frames, keeping the first one.
fn receive_first(
    decoder: &mut decoder::Video,
    first: &mut Option<FfFrame>,
) -> Result<(), CodecError> {
    loop {
        let mut frame = FfFrame::empty();
        match decoder.receive_frame(&mut frame) {
            Ok(()) => {
                if first.is_none() {
                    *first = Some(frame);
                }
            }
            Err(err) if is_again(&err) => break,
            Err(FfmpegError::Eof) => break,
            Err(err) => return Err(lib_error(format!("receive_frame failed: {err}"))),
        }
    }
    Ok(())
}
