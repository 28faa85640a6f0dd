//! Persistent extraction cache keyed by content hash.
//!
//! Identical message text always maps to the same stored extraction, so a
//! report is sent to the model at most once. Stored on disk as one flat JSON
//! object (`analysis_cache.json`); no expiry, emptied only by `clear`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use fieldbot_core::Result;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::extractor::Extraction;

/// SHA-256 hex digest of the message text.
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Thread-safe, file-backed map from message fingerprint to extraction.
pub struct ExtractionCache {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Extraction>>,
}

impl ExtractionCache {
    /// Open the cache file, starting empty when it is missing or unreadable.
    pub fn open(path: &Path) -> Self {
        let entries = load_entries(path);
        info!("Extraction cache: {} entries loaded", entries.len());
        Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, text: &str) -> Option<Extraction> {
        let hit = self.entries.lock().get(&fingerprint(text)).cloned();
        if hit.is_some() {
            debug!("Extraction cache hit");
        }
        hit
    }

    /// Store an extraction and persist the whole map. The entry is kept in
    /// memory only if the file write succeeds.
    pub fn put(&self, text: &str, extraction: &Extraction) -> Result<()> {
        let key = fingerprint(text);
        let mut entries = self.entries.lock();
        let previous = entries.insert(key.clone(), extraction.clone());

        let saved = serde_json::to_string_pretty(&*entries)
            .map_err(fieldbot_core::Error::from)
            .and_then(|data| Ok(write_atomic(&self.path, &data)?));
        if let Err(e) = saved {
            match previous {
                Some(old) => entries.insert(key, old),
                None => entries.remove(&key),
            };
            return Err(e);
        }
        debug!("Extraction cache: {} entries saved", entries.len());
        Ok(())
    }

    /// Forget everything and delete the file.
    pub fn clear(&self) -> Result<()> {
        let mut entries = self.entries.lock();
        entries.clear();
        match std::fs::remove_file(&self.path) {
            Ok(()) => info!("Extraction cache removed: {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn load_entries(path: &Path) -> BTreeMap<String, Extraction> {
    match std::fs::read_to_string(path) {
        Ok(data) => serde_json::from_str(&data).unwrap_or_else(|e| {
            warn!("Ignoring unreadable cache {}: {}", path.display(), e);
            BTreeMap::new()
        }),
        Err(_) => BTreeMap::new(),
    }
}

/// Write through a sibling temp file so readers never see a partial file.
fn write_atomic(path: &Path, data: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::FallbackReason;
    use fieldbot_core::{ExtractionResult, OperationRecord};

    fn sample(work_type: &str) -> ExtractionResult {
        let mut record = OperationRecord::default();
        record.work_type = work_type.into();
        ExtractionResult::from_operations(vec![record], "01.04.2025".into())
    }

    #[test]
    fn test_fingerprint_is_sha256_hex() {
        assert_eq!(
            fingerprint("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(fingerprint("Пахота"), fingerprint("Пахота "));
    }

    #[test]
    fn test_put_get_roundtrip_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis_cache.json");

        let cache = ExtractionCache::open(&path);
        assert!(cache.get("Сев").is_none());

        let remote = Extraction::Remote {
            result: sample("Сев"),
        };
        let fallback = Extraction::Fallback {
            result: sample("Уборка"),
            reason: FallbackReason::Status { code: 500 },
        };
        cache.put("Сев", &remote).unwrap();
        cache.put("Уборка", &fallback).unwrap();
        assert_eq!(cache.get("Сев"), Some(remote.clone()));

        let reopened = ExtractionCache::open(&path);
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.get("Сев"), Some(remote));
        assert_eq!(reopened.get("Уборка"), Some(fallback));
        assert!(!dir.path().join("analysis_cache.json.tmp").exists());
    }

    #[test]
    fn test_clear_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis_cache.json");
        let cache = ExtractionCache::open(&path);
        cache
            .put("x", &Extraction::Remote { result: sample("x") })
            .unwrap();
        assert!(path.exists());

        cache.clear().unwrap();
        assert!(cache.is_empty());
        assert!(!path.exists());
        cache.clear().unwrap();
    }

    #[test]
    fn test_failed_write_keeps_entry_out_of_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis_cache.json");
        let cache = ExtractionCache::open(&path);
        cache
            .put("old", &Extraction::Remote { result: sample("old") })
            .unwrap();

        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        let entry = Extraction::Remote { result: sample("Сев") };
        assert!(cache.put("Сев", &entry).is_err());
        assert!(cache.get("Сев").is_none());
        assert!(cache.put("Сев", &entry).is_err());
        assert_eq!(cache.len(), 1);
        assert!(cache.get("old").is_some());
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis_cache.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(ExtractionCache::open(&path).is_empty());
    }

    #[test]
    fn test_concurrent_puts() {
        let dir = tempfile::tempdir().unwrap();
        let cache = std::sync::Arc::new(ExtractionCache::open(&dir.path().join("c.json")));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    let text = format!("msg {}", i);
                    cache
                        .put(&text, &Extraction::Remote { result: sample(&text) })
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let reopened = ExtractionCache::open(&dir.path().join("c.json"));
        assert_eq!(reopened.len(), 8);
    }
}
