//! FieldBot Core — operation records, reference catalogue, configuration.

pub mod config;
pub mod error;
pub mod reference;
pub mod types;

pub use config::{parse_id_list, BotConfig, DataPaths};
pub use error::{Error, Result};
pub use reference::ReferenceData;
pub use types::{ExtractionResult, OperationRecord, DEFAULT_SUBDIVISION};
