use std::fs;
use std::path::{Path, PathBuf};

use ffmpeg_next::format::context::Output;
use ffmpeg_next::Rational;

use crate::audio::domain::audio_clip::AudioClip;
use crate::video::domain::audio_muxer::AudioMuxer;

const AAC_BIT_RATE: usize = 128_000;

/// Writes the dubbed container with ffmpeg-next.
///
/// The video stream of the source is copied without re-encoding, the source
/// audio is dropped and the new track is encoded as AAC. Output goes to a
/// sibling temp file first and is renamed into place once complete.
pub struct FfmpegAudioMuxer;

impl AudioMuxer for FfmpegAudioMuxer {
    fn mux(
        &self,
        source_path: &Path,
        audio: &AudioClip,
        output_path: &Path,
    ) -> Result<(), Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;
        if audio.channels() != 1 {
            return Err(format!("expected mono audio, got {} channels", audio.channels()).into());
        }

        let temp_path = temp_path_for(output_path);
        let result = write_container(source_path, audio, &temp_path)
            .and_then(|()| fs::rename(&temp_path, output_path).map_err(Into::into));
        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        result
    }
}

/// `out.mp4` -> `out.tmp.mp4`, keeping the extension ffmpeg picks the
/// container format from.
fn temp_path_for(output_path: &Path) -> PathBuf {
    let ext = output_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mp4");
    output_path.with_extension(format!("tmp.{ext}"))
}

fn write_container(
    source_path: &Path,
    audio: &AudioClip,
    temp_path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut ictx = ffmpeg_next::format::input(source_path)?;
    let mut octx = ffmpeg_next::format::output(temp_path)?;

    // Copy video stream parameters, if the source has video at all.
    let video = match ictx.streams().best(ffmpeg_next::media::Type::Video) {
        Some(stream) => {
            let mut ost = octx.add_stream(ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::None))?;
            ost.set_parameters(stream.parameters());
            unsafe {
                (*ost.parameters().as_mut_ptr()).codec_tag = 0;
            }
            Some((stream.index(), stream.time_base(), ost.index()))
        }
        None => None,
    };

    let aac_codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::AAC)
        .ok_or("AAC encoder not found")?;
    let global_header = octx
        .format()
        .flags()
        .contains(ffmpeg_next::format::flag::Flags::GLOBAL_HEADER);
    let mut ost_audio = octx.add_stream(Some(aac_codec))?;
    let audio_ost_idx = ost_audio.index();

    let mut encoder = ffmpeg_next::codec::context::Context::new_with_codec(aac_codec)
        .encoder()
        .audio()?;
    encoder.set_rate(audio.sample_rate() as i32);
    encoder.set_channel_layout(ffmpeg_next::ChannelLayout::MONO);
    encoder.set_format(ffmpeg_next::format::Sample::F32(
        ffmpeg_next::format::sample::Type::Planar,
    ));
    encoder.set_bit_rate(AAC_BIT_RATE);
    encoder.set_time_base(Rational::new(1, audio.sample_rate() as i32));
    if global_header {
        encoder.set_flags(ffmpeg_next::codec::flag::Flags::GLOBAL_HEADER);
    }
    let mut encoder = encoder.open_as(aac_codec)?;
    ost_audio.set_parameters(&encoder);

    let enc_time_base = encoder.time_base();
    let frame_size = encoder.frame_size() as usize;

    octx.write_header()?;

    let ost_audio_tb = octx
        .stream(audio_ost_idx)
        .ok_or("audio stream missing from output")?
        .time_base();

    if let Some((src_idx, in_tb, ost_idx)) = video {
        let ost_video_tb = octx
            .stream(ost_idx)
            .ok_or("video stream missing from output")?
            .time_base();
        for (stream, mut packet) in ictx.packets() {
            if stream.index() != src_idx {
                continue;
            }
            packet.rescale_ts(in_tb, ost_video_tb);
            packet.set_position(-1);
            packet.set_stream(ost_idx);
            packet.write_interleaved(&mut octx)?;
        }
    }

    encode_track(
        &mut encoder,
        audio,
        &mut octx,
        audio_ost_idx,
        enc_time_base,
        ost_audio_tb,
        frame_size,
    )?;

    octx.write_trailer()?;
    Ok(())
}

/// Encode the clip into AAC packets and write them to the output.
fn encode_track(
    encoder: &mut ffmpeg_next::codec::encoder::audio::Encoder,
    audio: &AudioClip,
    octx: &mut Output,
    stream_idx: usize,
    enc_time_base: Rational,
    ost_time_base: Rational,
    frame_size: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let frame_size = if frame_size == 0 { 1024 } else { frame_size };
    let mut pts: i64 = 0;

    for chunk in audio.samples().chunks(frame_size) {
        let mut frame = ffmpeg_next::util::frame::audio::Audio::new(
            ffmpeg_next::format::Sample::F32(ffmpeg_next::format::sample::Type::Planar),
            chunk.len(),
            ffmpeg_next::ChannelLayout::MONO,
        );
        frame.set_rate(audio.sample_rate());
        frame.set_pts(Some(pts));

        let dst = frame.data_mut(0);
        let src_bytes =
            unsafe { std::slice::from_raw_parts(chunk.as_ptr() as *const u8, chunk.len() * 4) };
        dst[..src_bytes.len()].copy_from_slice(src_bytes);

        encoder.send_frame(&frame)?;
        write_packets(encoder, octx, stream_idx, enc_time_base, ost_time_base)?;
        pts += chunk.len() as i64;
    }

    encoder.send_eof()?;
    write_packets(encoder, octx, stream_idx, enc_time_base, ost_time_base)?;
    Ok(())
}

fn write_packets(
    encoder: &mut ffmpeg_next::codec::encoder::audio::Encoder,
    octx: &mut Output,
    stream_idx: usize,
    enc_time_base: Rational,
    ost_time_base: Rational,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut encoded = ffmpeg_next::Packet::empty();
    while encoder.receive_packet(&mut encoded).is_ok() {
        encoded.set_stream(stream_idx);
        encoded.rescale_ts(enc_time_base, ost_time_base);
        encoded.write_interleaved(octx)?;
    }
    Ok(())
}
