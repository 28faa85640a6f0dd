//! FieldBot Ingest — abbreviation normalizer, rule-based report parser,
//! message archive.

pub mod archive;
pub mod normalize;
pub mod parser;

pub use archive::{ArchivedMessage, MessageArchive};
pub use normalize::{Normalized, Normalizer};
pub use parser::RuleParser;
