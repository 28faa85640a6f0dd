//! FieldBot Infer — the extraction pipeline.
//!
//! `RemoteExtractor` asks a `CompletionBackend` for structured records and
//! degrades to the rule-based parser on any remote failure. Results, tagged
//! with where they came from, are memoized by `ExtractionCache`.

pub mod cache;
pub mod extractor;
pub mod photo;

pub use cache::{fingerprint, ExtractionCache};
pub use extractor::{extract_json, Extraction, FallbackReason, RemoteExtractor};
pub use photo::{PhotoAnalyzer, PhotoReport};
