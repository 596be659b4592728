pub mod ffmpeg_decoder;
pub mod ffmpeg_media_source;
pub mod google_tts_synthesizer;
pub mod http_translator;
pub mod wav_segment_exporter;
pub mod whisper_transcriber;
