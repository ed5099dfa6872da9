//! File-backed, in-memory cached store of dashboard contexts.
//!
//! One Markdown record per dashboard lives in the store directory. All records
//! are loaded at construction; afterwards reads are served from memory and
//! every write goes to disk before the cache changes.

use crate::clock::Clock;
use crate::record;
use crate::types::DashboardContext;
use dashlens_core::{AppError, AppResult};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

const RECORD_EXTENSION: &str = "md";

/// Repository of dashboard contexts with TTL-based expiry.
#[derive(Debug)]
pub struct ContextStore {
    dir: PathBuf,
    ttl_days: u32,
    clock: Arc<dyn Clock>,
    contexts: Mutex<BTreeMap<String, DashboardContext>>,

    /// Held across a record write and the matching cache update
    writes: Mutex<()>,
}

impl ContextStore {
    /// Open the store at `dir`, creating it if needed and loading every record.
    ///
    /// Malformed records are skipped with a warning.
    pub fn open(dir: impl Into<PathBuf>, ttl_days: u32, clock: Arc<dyn Clock>) -> AppResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            AppError::Store(format!("Failed to create context directory {:?}: {}", dir, e))
        })?;

        let contexts = load_records(&dir);
        tracing::info!(
            dir = %dir.display(),
            count = contexts.len(),
            "Loaded dashboard contexts"
        );

        Ok(Self {
            dir,
            ttl_days,
            clock,
            contexts: Mutex::new(contexts),
            writes: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl_days(&self) -> u32 {
        self.ttl_days
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn cache(&self) -> MutexGuard<'_, BTreeMap<String, DashboardContext>> {
        self.contexts.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn write_guard(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, dashboard_id: &str) -> Option<DashboardContext> {
        self.cache().get(dashboard_id).cloned()
    }

    /// Every cached context, ordered by dashboard id.
    pub fn get_all(&self) -> Vec<DashboardContext> {
        self.cache().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.cache().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache().is_empty()
    }

    /// Persist `context` at its `persisted_location`, then replace the cached entry.
    ///
    /// Concurrent saves are serialized, so the cached entry is always the
    /// one whose record is on disk.
    pub fn save(&self, context: DashboardContext) -> AppResult<()> {
        if context.dashboard_id.trim().is_empty() {
            return Err(AppError::Store("Dashboard id must not be empty".to_string()));
        }

        let rendered = record::render(&context);
        let _writing = self.write_guard();
        write_atomic(&context.persisted_location, &rendered)?;

        tracing::debug!(
            dashboard_id = %context.dashboard_id,
            path = %context.persisted_location.display(),
            "Saved dashboard context"
        );

        self.cache().insert(context.dashboard_id.clone(), context);
        Ok(())
    }

    /// Remove the durable record and the cached entry.
    ///
    /// Returns whether anything existed. A missing record is not an error.
    pub fn delete(&self, dashboard_id: &str) -> AppResult<bool> {
        let _writing = self.write_guard();
        let location = self
            .cache()
            .get(dashboard_id)
            .map(|c| c.persisted_location.clone())
            .unwrap_or_else(|| self.location_for(dashboard_id));

        let removed_file = match fs::remove_file(&location) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                return Err(AppError::Store(format!(
                    "Failed to delete context record {:?}: {}",
                    location, e
                )))
            }
        };

        let removed_entry = self.cache().remove(dashboard_id).is_some();

        if removed_file || removed_entry {
            tracing::debug!(dashboard_id, "Deleted dashboard context");
        }
        Ok(removed_file || removed_entry)
    }

    /// Whether `context` has outlived the store's TTL.
    pub fn is_expired(&self, context: &DashboardContext) -> bool {
        context.is_expired(self.ttl_days, self.clock.now())
    }

    /// Candidates that have no context or an expired one, in candidate order.
    pub fn expired_ids(&self, candidates: &[String]) -> Vec<String> {
        let now = self.clock.now();
        let cache = self.cache();
        candidates
            .iter()
            .filter(|id| match cache.get(id.as_str()) {
                Some(context) => context.is_expired(self.ttl_days, now),
                None => true,
            })
            .cloned()
            .collect()
    }

    /// Delete every context whose id is not in `valid_ids`; returns how many went.
    ///
    /// Individual delete failures are logged and skipped.
    pub fn cleanup(&self, valid_ids: &[String]) -> usize {
        let valid: HashSet<&str> = valid_ids.iter().map(String::as_str).collect();
        let stale: Vec<String> = self
            .cache()
            .keys()
            .filter(|id| !valid.contains(id.as_str()))
            .cloned()
            .collect();

        let mut removed = 0;
        for id in stale {
            match self.delete(&id) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(dashboard_id = %id, error = %e, "Failed to remove old context"),
            }
        }

        if removed > 0 {
            tracing::info!(removed, "Removed contexts for dashboards no longer available");
        }
        removed
    }

    /// `(fresh, expired)` counts of cached contexts.
    pub fn freshness_counts(&self) -> (usize, usize) {
        let now = self.clock.now();
        let cache = self.cache();
        let expired = cache
            .values()
            .filter(|c| c.is_expired(self.ttl_days, now))
            .count();
        (cache.len() - expired, expired)
    }

    /// Record path for a dashboard id.
    pub fn location_for(&self, dashboard_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", safe_file_stem(dashboard_id), RECORD_EXTENSION))
    }
}

/// Replace every character outside `[A-Za-z0-9_.-]` (Unicode letters and
/// digits included) with `_`.
pub fn safe_file_stem(dashboard_id: &str) -> String {
    dashboard_id
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn load_records(dir: &Path) -> BTreeMap<String, DashboardContext> {
    let mut contexts = BTreeMap::new();

    for entry in WalkDir::new(dir)
        .max_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION)
        {
            continue;
        }

        let parsed = fs::read_to_string(path)
            .map_err(AppError::from)
            .and_then(|content| record::parse(&content, path));

        match parsed {
            Ok(context) => {
                if let Some(previous) = contexts.insert(context.dashboard_id.clone(), context) {
                    tracing::warn!(
                        dashboard_id = %previous.dashboard_id,
                        path = %path.display(),
                        "Duplicate context record, keeping the later file"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping malformed context record");
            }
        }
    }

    contexts
}

/// Write to a sibling temp file, then rename over the target.
/// Write `contents` to a uniquely named temp file next to `path`, then
/// rename it over `path`. A failed write leaves `path` untouched.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> AppResult<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| {
        AppError::Store(format!("Failed to create temp file in {:?}: {}", parent, e))
    })?;
    tmp.write_all(contents.as_bytes())
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| AppError::Store(format!("Failed to write {:?}: {}", tmp.path(), e)))?;

    tmp.persist(path).map_err(|e| {
        AppError::Store(format!("Failed to move {:?} into place: {}", path, e.error))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::parse_timestamp;
    use chrono::Duration;
    use tempfile::TempDir;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            parse_timestamp("2024-03-01 12:00:00").unwrap(),
        ))
    }

    fn context(store: &ContextStore, id: &str, updated: &str) -> DashboardContext {
        DashboardContext {
            dashboard_id: id.to_string(),
            dashboard_name: format!("Dashboard {}", id),
            last_update_time: updated.to_string(),
            summary: format!("Summary of {}", id),
            charts: Vec::new(),
            screenshot: None,
            persisted_location: store.location_for(id),
        }
    }

    #[test]
    fn test_save_get_delete() {
        let temp = TempDir::new().unwrap();
        let store = ContextStore::open(temp.path(), 7, clock()).unwrap();

        let ctx = context(&store, "12", "2024-03-01 12:00:00");
        store.save(ctx.clone()).unwrap();
        assert_eq!(store.get("12"), Some(ctx.clone()));
        assert!(ctx.persisted_location.exists());

        assert!(store.delete("12").unwrap());
        assert!(store.get("12").is_none());
        assert!(!ctx.persisted_location.exists());

        // Deleting again is not an error
        assert!(!store.delete("12").unwrap());
    }

    #[test]
    fn test_save_rejects_blank_id() {
        let temp = TempDir::new().unwrap();
        let store = ContextStore::open(temp.path(), 7, clock()).unwrap();
        let ctx = context(&store, "  ", "2024-03-01 12:00:00");
        assert!(store.save(ctx).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_reload_from_disk() {
        let temp = TempDir::new().unwrap();
        {
            let store = ContextStore::open(temp.path(), 7, clock()).unwrap();
            store.save(context(&store, "a", "2024-03-01 12:00:00")).unwrap();
            store.save(context(&store, "b", "2024-03-01 12:00:00")).unwrap();
        }

        let reopened = ContextStore::open(temp.path(), 7, clock()).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.get("a").unwrap().dashboard_name, "Dashboard a");
    }

    #[test]
    fn test_malformed_records_skipped() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("broken.md"), "# nothing useful here\n").unwrap();
        fs::write(temp.path().join("notes.txt"), "ignored").unwrap();

        let store = ContextStore::open(temp.path(), 7, clock()).unwrap();
        store.save(context(&store, "ok", "2024-03-01 12:00:00")).unwrap();
        drop(store);

        let reopened = ContextStore::open(temp.path(), 7, clock()).unwrap();
        assert_eq!(reopened.len(), 1);
        assert!(reopened.get("ok").is_some());
    }

    #[test]
    fn test_expired_ids_in_candidate_order() {
        let temp = TempDir::new().unwrap();
        let clock = clock();
        let store = ContextStore::open(temp.path(), 7, clock.clone()).unwrap();

        store.save(context(&store, "fresh", "2024-03-01 10:00:00")).unwrap();
        store.save(context(&store, "old", "2024-02-01 10:00:00")).unwrap();
        store.save(context(&store, "garbled", "yesterday")).unwrap();

        let candidates = vec![
            "old".to_string(),
            "missing".to_string(),
            "fresh".to_string(),
            "garbled".to_string(),
        ];
        assert_eq!(
            store.expired_ids(&candidates),
            vec!["old", "missing", "garbled"]
        );

        clock.advance(Duration::days(8));
        assert_eq!(store.expired_ids(&candidates).len(), 4);
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = ContextStore::open(temp.path(), 7, clock()).unwrap();
        for id in ["a", "b", "c"] {
            store.save(context(&store, id, "2024-03-01 12:00:00")).unwrap();
        }

        let valid = vec!["a".to_string(), "c".to_string()];
        assert_eq!(store.cleanup(&valid), 1);
        assert_eq!(store.cleanup(&valid), 0);

        let ids: Vec<String> = store.get_all().into_iter().map(|c| c.dashboard_id).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_freshness_counts() {
        let temp = TempDir::new().unwrap();
        let store = ContextStore::open(temp.path(), 7, clock()).unwrap();
        store.save(context(&store, "a", "2024-03-01 12:00:00")).unwrap();
        store.save(context(&store, "b", "2023-01-01 12:00:00")).unwrap();
        assert_eq!(store.freshness_counts(), (1, 1));
    }

    #[test]
    fn test_location_for_sanitizes() {
        let temp = TempDir::new().unwrap();
        let store = ContextStore::open(temp.path(), 7, clock()).unwrap();
        assert_eq!(
            store.location_for("sales/eu q1"),
            temp.path().join("sales_eu_q1.md")
        );
        assert_eq!(store.location_for("销售-1.v2"), temp.path().join("销售-1.v2.md"));
    }

    #[test]
    fn test_concurrent_saves_of_one_id_match_disk() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(ContextStore::open(temp.path(), 7, clock()).unwrap());

        let writers: Vec<_> = (0..8)
            .map(|writer| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for round in 0..20 {
                        let mut ctx = context(&store, "x", "2024-03-01 12:00:00");
                        ctx.summary = format!("writer {} round {}", writer, round);
                        store.save(ctx).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let cached = store.get("x").unwrap();
        let reopened = ContextStore::open(temp.path(), 7, clock()).unwrap();
        assert_eq!(reopened.get("x").unwrap().summary, cached.summary);

        let files: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(files, vec![std::ffi::OsString::from("x.md")]);
    }

    #[test]
    fn test_failed_write_keeps_record_and_cache() {
        let temp = TempDir::new().unwrap();
        let store = ContextStore::open(temp.path(), 7, clock()).unwrap();
        store.save(context(&store, "a", "2024-03-01 12:00:00")).unwrap();

        // A directory where the record should go cannot be replaced
        let mut blocked = context(&store, "b", "2024-03-01 12:00:00");
        fs::create_dir(&blocked.persisted_location).unwrap();
        blocked.summary = "never stored".to_string();

        assert!(store.save(blocked).is_err());
        assert!(store.get("b").is_none());
        assert_eq!(store.get("a").unwrap().summary, "Summary of a");
    }
}
