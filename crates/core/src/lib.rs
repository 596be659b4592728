//! Segment-parallel speech translation and dubbing for video files.
//!
//! The input's audio is cut into fixed-length segments; each segment is
//! transcribed, translated and re-synthesized independently on a bounded
//! worker pool, and the results are joined back in order and muxed over the
//! original video.

pub mod shared {
    pub mod constants;
    pub mod error;
    pub mod language;
    pub mod media_metadata;
    pub mod model_resolver;
    pub mod run_config;
    pub mod scratch;
}

pub mod segmentation {
    pub mod domain {
        pub mod segment;
    }
}

pub mod audio {
    pub mod domain {
        pub mod audio_clip;
        pub mod media_source;
        pub mod segment_exporter;
        pub mod synthesis_service;
        pub mod transcription_service;
        pub mod translation_service;
    }
    pub mod infrastructure;
}

pub mod video {
    pub mod domain {
        pub mod audio_muxer;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod bounded_call;
    pub mod dub_video_use_case;
    pub mod infrastructure;
    pub mod pipeline_logger;
    pub mod reassembler;
    pub mod run_context;
    pub mod run_report;
    pub mod segment_executor;
    pub mod segment_pipeline;
    pub mod segment_result;
}
