//! Shared application state.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use fieldbot_chat::CompletionBackend;
use fieldbot_core::{BotConfig, ReferenceData};
use fieldbot_infer::{ExtractionCache, PhotoAnalyzer, RemoteExtractor};
use fieldbot_ingest::{MessageArchive, Normalizer};
use fieldbot_report::WorkbookWriter;
use parking_lot::RwLock;
use serde::Serialize;

/// Counters for the current run, reported by `/status`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Session {
    pub total_messages: u64,
    pub senders: BTreeMap<String, u64>,
    pub last_workbook: Option<PathBuf>,
}

/// Everything the handlers need, built once at startup.
pub struct AppState {
    pub config: BotConfig,
    pub reference: Arc<ReferenceData>,
    pub extractor: RemoteExtractor,
    pub photos: Option<PhotoAnalyzer>,
    pub archive: MessageArchive,
    pub writer: WorkbookWriter,
    session: RwLock<Session>,
}

impl AppState {
    /// Wire the pipeline. Without a backend only the rule-based extractor runs
    /// and photo analysis is unavailable.
    pub fn new(
        config: BotConfig,
        reference: ReferenceData,
        backend: Option<Arc<dyn CompletionBackend>>,
    ) -> Self {
        let reference = Arc::new(reference);
        let paths = &config.data_paths;

        let cache = Arc::new(ExtractionCache::open(&paths.cache_file));
        let extractor = RemoteExtractor::new(backend.clone(), reference.clone(), cache);
        let photos = backend.map(PhotoAnalyzer::new);
        let archive = MessageArchive::new(&paths.messages);
        let writer = WorkbookWriter::new(&paths.excel, Normalizer::new(reference.clone()));

        Self {
            config,
            reference,
            extractor,
            photos,
            archive,
            writer,
            session: RwLock::new(Session::default()),
        }
    }

    pub fn record_message(&self, sender: &str) {
        let mut session = self.session.write();
        session.total_messages += 1;
        *session.senders.entry(sender.to_string()).or_insert(0) += 1;
    }

    pub fn set_last_workbook(&self, path: PathBuf) {
        self.session.write().last_workbook = Some(path);
    }

    pub fn session(&self) -> Session {
        self.session.read().clone()
    }

    pub fn reset_session(&self) {
        *self.session.write() = Session::default();
    }
}

/// Open chat, admin user 1, data under `root`.
#[cfg(test)]
pub(crate) fn test_config(root: &std::path::Path) -> BotConfig {
    BotConfig {
        bot_token: "123:TEST".into(),
        team_name: "agronomists".into(),
        allowed_chat_ids: vec![],
        admin_user_ids: vec![1],
        report_time: chrono::NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
        report_send_to: vec![],
        data_paths: fieldbot_core::DataPaths::new(root, "agronomists").unwrap(),
    }
}
