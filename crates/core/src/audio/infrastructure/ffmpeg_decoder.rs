use std::path::Path;

use crate::audio::domain::audio_clip::AudioClip;
use crate::shared::error::ServiceError;
use crate::shared::media_metadata::MediaMetadata;

/// Read container facts without decoding any audio.
pub fn probe(path: &Path) -> Result<MediaMetadata, ServiceError> {
    ffmpeg_next::init()?;

    let ictx = ffmpeg_next::format::input(path)?;

    // Container duration is in AV_TIME_BASE units; negative means unknown.
    let raw = ictx.duration();
    let duration_secs = if raw > 0 {
        raw as f64 / ffmpeg_next::ffi::AV_TIME_BASE as f64
    } else {
        0.0
    };

    let has_video = ictx.streams().best(ffmpeg_next::media::Type::Video).is_some();
    let audio_format = match ictx.streams().best(ffmpeg_next::media::Type::Audio) {
        Some(stream) => {
            let codec_ctx =
                ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
            let decoder = codec_ctx.decoder().audio()?;
            Some((decoder.rate(), decoder.channels() as u16))
        }
        None => None,
    };

    Ok(MediaMetadata {
        duration_secs,
        has_video,
        audio_format,
    })
}

/// Decode the best audio stream of `path` to mono f32 at `target_sample_rate`.
/// Returns `None` if the file has no audio stream.
pub fn decode_audio(path: &Path, target_sample_rate: u32) -> Result<Option<AudioClip>, ServiceError> {
    ffmpeg_next::init()?;

    let mut ictx = ffmpeg_next::format::input(path)?;

    let audio_stream = match ictx.streams().best(ffmpeg_next::media::Type::Audio) {
        Some(stream) => stream,
        None => return Ok(None),
    };
    let audio_stream_index = audio_stream.index();

    let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(audio_stream.parameters())?;
    let mut decoder = codec_ctx.decoder().audio()?;

    let mut resampler = ffmpeg_next::software::resampling::Context::get(
        decoder.format(),
        decoder.channel_layout(),
        decoder.rate(),
        ffmpeg_next::format::Sample::F32(ffmpeg_next::format::sample::Type::Planar),
        ffmpeg_next::ChannelLayout::MONO,
        target_sample_rate,
    )?;

    let mut samples: Vec<f32> = Vec::new();
    let mut decoded = ffmpeg_next::util::frame::audio::Audio::empty();
    let mut resampled = ffmpeg_next::util::frame::audio::Audio::empty();

    for (stream, packet) in ictx.packets() {
        if stream.index() != audio_stream_index {
            continue;
        }
        decoder.send_packet(&packet)?;
        while decoder.receive_frame(&mut decoded).is_ok() {
            resampler.run(&decoded, &mut resampled)?;
            append_mono_f32(&resampled, &mut samples);
        }
    }

    decoder.send_eof()?;
    while decoder.receive_frame(&mut decoded).is_ok() {
        resampler.run(&decoded, &mut resampled)?;
        append_mono_f32(&resampled, &mut samples);
    }

    // The resampler may still hold a tail of buffered samples.
    if let Ok(Some(delay)) = resampler.flush(&mut resampled) {
        if delay.output > 0 {
            append_mono_f32(&resampled, &mut samples);
        }
    }

    Ok(Some(AudioClip::new(samples, target_sample_rate, 1)))
}

fn append_mono_f32(frame: &ffmpeg_next::util::frame::audio::Audio, out: &mut Vec<f32>) {
    let n = frame.samples();
    if n == 0 {
        return;
    }
    let data = frame.data(0);
    let floats = unsafe { std::slice::from_raw_parts(data.as_ptr() as *const f32, n) };
    out.extend_from_slice(floats);
}
