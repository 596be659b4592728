pub mod ffmpeg_audio_muxer;
