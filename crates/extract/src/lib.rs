//! Extraction boundary: turn free conversation text into structured contact
//! fields, and audio into text. Providers are consumed behind traits so the
//! rest of the system never depends on a concrete vendor API.

pub mod extractor;
pub mod payload;
pub mod transcribe;

pub use extractor::{ChatCompletionExtractor, ContactExtractor, ExtractError};
pub use payload::{lead_fields, transcript_note};
pub use transcribe::{Transcriber, WhisperHttpTranscriber};
