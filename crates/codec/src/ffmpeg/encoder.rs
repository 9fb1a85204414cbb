use ffmpeg_next::{
    Dictionary,
    codec::{self, encoder},
    error::Error as FfmpegError,
    packet::Packet,
    util::format::pixel::Pixel as PixelFormat,
};
use roundtrip_core::prelude::*;

use super::util::{convert, is_again, lib_error, rgb_frame};
use crate::{CodecError, tools::FfmpegEncoder, tools::QualityKnob};

/// `global_quality` units per quantizer step.
const QP2LAMBDA: i32 = 118;

/// Encode one still image; returns the packets in output order.
pub(crate) fn encode_still(
    which: FfmpegEncoder,
    target: PixelFormat,
    threads: Option<usize>,
    img: &RgbBuffer,
    quality: i32,
) -> Result<Vec<Vec<u8>>, CodecError> {
    let name = which.encoder_name();
    let codec = encoder::find_by_name(name)
        .ok_or_else(|| lib_error(format!("ffmpeg encoder {name} not found")))?;
    let (width, height) = (img.width() as u32, img.height() as u32);

    let mut enc_ctx = codec::Context::new_with_codec(codec)
        .encoder()
        .video()
        .map_err(|e| lib_error(e.to_string()))?;
    if let Some(count) = threads {
        enc_ctx.set_threading(codec::threading::Config {
            kind: codec::threading::Type::Frame,
            count,
            ..Default::default()
        });
    }
    enc_ctx.set_width(width);
    enc_ctx.set_height(height);
    enc_ctx.set_format(target);
    enc_ctx.set_time_base((1, 25));
    enc_ctx.set_frame_rate(Some((25, 1)));
    enc_ctx.set_max_b_frames(0);
    enc_ctx.set_gop(1);
    enc_ctx.set_bit_rate(0);

    let mut opts = Dictionary::new();
    let q = quality.to_string();
    match which.quality_knob() {
        QualityKnob::Crf => opts.set("crf", &q),
        QualityKnob::QScale => {
            opts.set("flags", "+qscale");
            opts.set("global_quality", &(quality * QP2LAMBDA).to_string());
        }
    }
    match which {
        FfmpegEncoder::Av1 => opts.set("strict", "experimental"),
        FfmpegEncoder::X265 => opts.set("x265-params", "log-level=error"),
        _ => {}
    }
    let mut encoder = enc_ctx
        .open_as_with(codec, opts)
        .map_err(|e| lib_error(format!("open {name} failed: {e}")))?;

    let src = rgb_frame(&img.packed_rgb(), width, height)?;
    let mut frame = if target == PixelFormat::RGB24 {
        src
    } else {
        convert(&src, target)?
    };
    frame.set_pts(Some(0));

    let mut packets = Vec::new();
    match encoder.send_frame(&frame) {
        Ok(()) => {}
        Err(err) if is_again(&err) => {
            drain(&mut encoder, &mut packets)?;
            encoder
                .send_frame(&frame)
                .map_err(|e| lib_error(format!("{name} send_frame failed: {e}")))?;
        }
        Err(err) => return Err(lib_error(format!("{name} send_frame failed: {err}"))),
    }
    encoder
        .send_eof()
        .map_err(|e| lib_error(format!("{name} flush failed: {e}")))?;
    drain(&mut encoder, &mut packets)?;
    if packets.is_empty() {
        return Err(lib_error(format!("{name} produced no packets")));
    }
    Ok(packets)
}

fn drain(encoder: &mut encoder::video::Encoder, out: &mut Vec<Vec<u8>>) -> Result<(), CodecError> {
    loop {
        let mut packet = Packet::empty();
        match encoder.receive_packet(&mut packet) {
            Ok(()) => {
                if let Some(data) = packet.data() {
                    out.push(data.to_vec());
                }
            }
            Err(err) if is_again(&err) => break,
            Err(FfmpegError::Eof) => break,
            Err(err) => return Err(lib_error(format!("receive_packet failed: {err}"))),
        }
    }
    Ok(())
}
