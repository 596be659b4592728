use std::fs;
use std::time::Duration;

use reqwest::blocking::Client;

use crate::audio::domain::audio_clip::AudioClip;
use crate::audio::domain::synthesis_service::SynthesisService;
use crate::shared::constants::TTS_MAX_CHUNK_CHARS;
use crate::shared::error::ServiceError;
use crate::shared::language::LanguageCode;
use crate::shared::scratch::ScratchSpace;

use super::ffmpeg_decoder::decode_audio;

const SENTENCE_ENDS: &[char] = &['.', '!', '?', ';', '।', '॥'];

/// Text-to-speech through the public Google Translate TTS endpoint.
///
/// Text is sent in chunks the endpoint accepts. Each chunk comes back as
/// MP3, is staged in the run's scratch space and decoded to mono PCM.
pub struct GoogleTtsSynthesizer {
    client: Client,
    url: String,
    scratch: ScratchSpace,
    sample_rate: u32,
}

impl GoogleTtsSynthesizer {
    pub fn new(
        url: &str,
        scratch: ScratchSpace,
        sample_rate: u32,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent("Mozilla/5.0")
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            scratch,
            sample_rate,
        })
    }

    fn fetch_chunk(
        &self,
        chunk: &str,
        language: &LanguageCode,
        idx: usize,
        total: usize,
    ) -> Result<AudioClip, ServiceError> {
        let idx = idx.to_string();
        let total = total.to_string();
        let textlen = chunk.chars().count().to_string();
        let query = [
            ("ie", "UTF-8"),
            ("client", "tw-ob"),
            ("tl", language.primary()),
            ("q", chunk),
            ("idx", idx.as_str()),
            ("total", total.as_str()),
            ("textlen", textlen.as_str()),
        ];
        let bytes = self
            .client
            .get(&self.url)
            .query(&query)
            .send()?
            .error_for_status()?
            .bytes()?;
        if bytes.is_empty() {
            return Err("speech service returned no audio".into());
        }

        // Removed when `mp3` drops, whether decoding succeeds or not.
        let mp3 = self.scratch.file("tts", "mp3");
        fs::write(mp3.path(), &bytes)?;
        decode_audio(mp3.path(), self.sample_rate)?
            .ok_or_else(|| "speech service response has no audio stream".into())
    }
}

impl SynthesisService for GoogleTtsSynthesizer {
    fn synthesize(&self, text: &str, language: &LanguageCode) -> Result<AudioClip, ServiceError> {
        let chunks = split_text(text, TTS_MAX_CHUNK_CHARS);
        let mut speech = AudioClip::empty(self.sample_rate, 1);
        for (idx, chunk) in chunks.iter().enumerate() {
            let part = self.fetch_chunk(chunk, language, idx, chunks.len())?;
            speech.append(&part)?;
        }
        Ok(speech)
    }
}

/// Splits `text` into chunks of at most `max_chars` characters.
///
/// Words are never split unless a single word is longer than `max_chars`.
/// A chunk also ends after a word closing a sentence.
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    let flush = |chunks: &mut Vec<String>, current: &mut String, current_len: &mut usize| {
        if !current.is_empty() {
            chunks.push(std::mem::take(current));
        }
        *current_len = 0;
    };

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if word_len > max_chars {
            flush(&mut chunks, &mut current, &mut current_len);
            let chars: Vec<char> = word.chars().collect();
            chunks.extend(chars.chunks(max_chars).map(|piece| piece.iter().collect::<String>()));
            continue;
        }

        if current_len > 0 && current_len + 1 + word_len > max_chars {
            flush(&mut chunks, &mut current, &mut current_len);
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;

        if word.ends_with(SENTENCE_ENDS) {
            flush(&mut chunks, &mut current, &mut current_len);
        }
    }
    flush(&mut chunks, &mut current, &mut current_len);
    chunks
}
