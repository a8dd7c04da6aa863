//! File registry
//!
//! The registry is an immutable, ordered list of records. Every change goes
//! through [`Registry::reduce`], which returns the next registry value plus the
//! preview handles the change released. [`FileStore`] holds the current value,
//! swaps it atomically on each mutation, releases previews, and publishes the
//! new value to subscribers.

use crate::caption::Caption;
use crate::image::TargetFormat;
use crate::preview::{PreviewHandle, PreviewProvider};
use crate::source::SourceFile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Record identifier, unique for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Idle,
    Processing,
    Completed,
    Error,
}

impl RecordStatus {
    /// idle -> processing -> completed | error, nothing else
    pub fn can_advance_to(self, next: RecordStatus) -> bool {
        matches!(
            (self, next),
            (RecordStatus::Idle, RecordStatus::Processing)
                | (RecordStatus::Processing, RecordStatus::Completed)
                | (RecordStatus::Processing, RecordStatus::Error)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RecordStatus::Completed | RecordStatus::Error)
    }
}

/// Encoded output and the format it was encoded in
#[derive(Debug, Clone)]
pub struct ConvertedImage {
    pub format: TargetFormat,
    pub data: Arc<[u8]>,
}

impl ConvertedImage {
    pub fn new(format: TargetFormat, data: Vec<u8>) -> Self {
        Self {
            format,
            data: Arc::from(data),
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: RecordId,
    pub source: SourceFile,
    pub preview: PreviewHandle,
    pub target_format: TargetFormat,
    pub status: RecordStatus,
    pub converted: Option<ConvertedImage>,
    pub caption: Option<Caption>,
    pub uploaded_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn new(source: SourceFile, preview: PreviewHandle, target_format: TargetFormat) -> Self {
        Self {
            id: RecordId::new(),
            source,
            preview,
            target_format,
            status: RecordStatus::Idle,
            converted: None,
            caption: None,
            uploaded_at: Utc::now(),
        }
    }

    pub fn description(&self) -> Option<&str> {
        self.caption.as_ref().map(|c| c.description.as_str())
    }

    pub fn suggested_name(&self) -> Option<&str> {
        self.caption.as_ref().map(|c| c.suggested_name.as_str())
    }
}

/// Partial update produced by the pipeline.
///
/// Only the constructors exist so that a completed patch always carries output.
#[derive(Debug, Clone)]
pub struct RecordPatch {
    status: RecordStatus,
    converted: Option<ConvertedImage>,
    caption: Option<Caption>,
}

impl RecordPatch {
    pub fn processing() -> Self {
        Self {
            status: RecordStatus::Processing,
            converted: None,
            caption: None,
        }
    }

    pub fn completed(converted: ConvertedImage, caption: Option<Caption>) -> Self {
        Self {
            status: RecordStatus::Completed,
            converted: Some(converted),
            caption,
        }
    }

    pub fn failed() -> Self {
        Self {
            status: RecordStatus::Error,
            converted: None,
            caption: None,
        }
    }

    pub fn status(&self) -> RecordStatus {
        self.status
    }
}

#[derive(Debug, Clone)]
pub enum Mutation {
    Add(Vec<FileRecord>),
    Remove(RecordId),
    SetFormat(RecordId, TargetFormat),
    Merge(RecordId, RecordPatch),
    Clear,
}

/// Outcome of applying one mutation
#[derive(Debug)]
pub struct Transition {
    pub next: Registry,
    pub applied: bool,
    /// Previews whose records left the registry
    pub released: Vec<PreviewHandle>,
}

impl Transition {
    fn unchanged(registry: &Registry) -> Self {
        Self {
            next: registry.clone(),
            applied: false,
            released: Vec::new(),
        }
    }
}

/// Ordered, immutable snapshot of all records
#[derive(Debug, Clone, Default)]
pub struct Registry {
    records: Arc<Vec<FileRecord>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: RecordId) -> Option<&FileRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FileRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Ids of idle records, in insertion order
    pub fn idle_ids(&self) -> Vec<RecordId> {
        self.records
            .iter()
            .filter(|r| r.status == RecordStatus::Idle)
            .map(|r| r.id)
            .collect()
    }

    pub fn count_by_status(&self, status: RecordStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    /// Apply a mutation, producing the next registry value
    pub fn reduce(&self, mutation: Mutation) -> Transition {
        match mutation {
            Mutation::Add(new_records) => {
                if new_records.is_empty() {
                    return Transition::unchanged(self);
                }
                let mut records = Vec::with_capacity(self.records.len() + new_records.len());
                records.extend(self.records.iter().cloned());
                let existing = records.len();
                for record in new_records {
                    if records.iter().any(|r| r.id == record.id) {
                        warn!("Ignoring duplicate record {}", record.id);
                        continue;
                    }
                    records.push(record);
                }
                if records.len() == existing {
                    return Transition::unchanged(self);
                }
                self.replaced(records, Vec::new())
            }
            Mutation::Remove(id) => {
                let Some(removed) = self.get(id) else {
                    return Transition::unchanged(self);
                };
                let released = vec![removed.preview];
                let records = self.records.iter().filter(|r| r.id != id).cloned().collect();
                self.replaced(records, released)
            }
            Mutation::SetFormat(id, format) => match self.get(id) {
                Some(record) if record.status != RecordStatus::Processing => {
                    self.updated(id, |r| r.target_format = format)
                }
                Some(_) => {
                    debug!("Ignoring format change for {} while processing", id);
                    Transition::unchanged(self)
                }
                None => Transition::unchanged(self),
            },
            Mutation::Merge(id, patch) => match self.get(id) {
                Some(record) if record.status.can_advance_to(patch.status) => self.updated(id, |r| {
                    r.status = patch.status;
                    if patch.status == RecordStatus::Completed {
                        r.converted = patch.converted;
                        r.caption = patch.caption;
                    }
                }),
                Some(record) => {
                    warn!("Rejected status change {:?} -> {:?} for {}", record.status, patch.status, id);
                    Transition::unchanged(self)
                }
                None => Transition::unchanged(self),
            },
            Mutation::Clear => {
                if self.records.is_empty() {
                    return Transition::unchanged(self);
                }
                let released = self.records.iter().map(|r| r.preview).collect();
                self.replaced(Vec::new(), released)
            }
        }
    }

    fn replaced(&self, records: Vec<FileRecord>, released: Vec<PreviewHandle>) -> Transition {
        Transition {
            next: Registry {
                records: Arc::new(records),
            },
            applied: true,
            released,
        }
    }

    fn updated(&self, id: RecordId, update: impl FnOnce(&mut FileRecord)) -> Transition {
        let mut records: Vec<FileRecord> = self.records.as_ref().clone();
        if let Some(record) = records.iter_mut().find(|r| r.id == id) {
            update(record);
        }
        self.replaced(records, Vec::new())
    }
}

/// Shared owner of the current registry value
pub struct FileStore {
    state: watch::Sender<Registry>,
    previews: Arc<dyn PreviewProvider>,
}

impl FileStore {
    pub fn new(previews: Arc<dyn PreviewProvider>) -> Self {
        let (state, _) = watch::channel(Registry::new());
        Self { state, previews }
    }

    /// Current registry value
    pub fn snapshot(&self) -> Registry {
        self.state.borrow().clone()
    }

    /// Watch registry replacements
    pub fn subscribe(&self) -> watch::Receiver<Registry> {
        self.state.subscribe()
    }

    pub fn previews(&self) -> &Arc<dyn PreviewProvider> {
        &self.previews
    }

    /// Upload files, one idle record each. Returns the new ids in order.
    pub fn add(&self, sources: Vec<SourceFile>, target_format: TargetFormat) -> Vec<RecordId> {
        let records: Vec<FileRecord> = sources
            .into_iter()
            .map(|source| {
                let preview = self.previews.acquire(&source);
                FileRecord::new(source, preview, target_format)
            })
            .collect();
        let ids: Vec<RecordId> = records.iter().map(|r| r.id).collect();

        for record in &records {
            info!(
                "📥 Uploaded {} ({}, {} bytes) as {}",
                record.source.name(),
                record.source.mime_type(),
                record.source.size(),
                record.id
            );
        }

        self.dispatch(Mutation::Add(records));
        ids
    }

    pub fn remove(&self, id: RecordId) -> bool {
        self.dispatch(Mutation::Remove(id))
    }

    pub fn set_format(&self, id: RecordId, format: TargetFormat) -> bool {
        self.dispatch(Mutation::SetFormat(id, format))
    }

    pub fn merge(&self, id: RecordId, patch: RecordPatch) -> bool {
        self.dispatch(Mutation::Merge(id, patch))
    }

    pub fn clear(&self) -> bool {
        self.dispatch(Mutation::Clear)
    }

    /// Apply a mutation atomically; returns whether it changed anything
    pub fn dispatch(&self, mutation: Mutation) -> bool {
        let mut outcome = None;
        self.state.send_if_modified(|registry| {
            let transition = registry.reduce(mutation);
            let applied = transition.applied;
            *registry = transition.next;
            outcome = Some((applied, transition.released));
            applied
        });

        let (applied, released) = outcome.unwrap_or_default();
        for handle in released {
            self.previews.release(handle);
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Counts releases per handle
    #[derive(Default)]
    struct CountingPreviews {
        next: Mutex<u64>,
        releases: Mutex<HashMap<PreviewHandle, usize>>,
    }

    impl CountingPreviews {
        fn releases(&self, handle: PreviewHandle) -> usize {
            self.releases.lock().unwrap().get(&handle).copied().unwrap_or(0)
        }
    }

    impl PreviewProvider for CountingPreviews {
        fn acquire(&self, _source: &SourceFile) -> PreviewHandle {
            let mut next = self.next.lock().unwrap();
            *next += 1;
            PreviewHandle::new(*next)
        }

        fn release(&self, handle: PreviewHandle) -> bool {
            *self.releases.lock().unwrap().entry(handle).or_default() += 1;
            true
        }
    }

    fn source(name: &str) -> SourceFile {
        SourceFile::new(name, "image/png", b"bytes".to_vec())
    }

    fn store() -> (FileStore, Arc<CountingPreviews>) {
        let previews = Arc::new(CountingPreviews::default());
        (FileStore::new(previews.clone()), previews)
    }

    #[test]
    fn test_add_creates_one_idle_record_per_file() {
        let (store, _) = store();
        let ids = store.add(vec![source("a.png"), source("b.png"), source("c.png")], TargetFormat::Jpeg);

        let registry = store.snapshot();
        assert_eq!(registry.len(), 3);
        assert_eq!(ids.len(), 3);
        assert!(registry.iter().all(|r| r.status == RecordStatus::Idle));

        let names: Vec<&str> = registry.iter().map(|r| r.source.name()).collect();
        assert_eq!(names, vec!["a.png", "b.png", "c.png"]);

        let mut unique = ids.clone();
        unique.sort_by_key(|id| id.to_string());
        unique.dedup();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn test_add_keeps_existing_records() {
        let (store, _) = store();
        let first = store.add(vec![source("a.png")], TargetFormat::Png);
        store.add(vec![source("b.png")], TargetFormat::Webp);

        let registry = store.snapshot();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.iter().next().unwrap().id, first[0]);
        assert_eq!(registry.get(first[0]).unwrap().target_format, TargetFormat::Png);
    }

    #[test]
    fn test_add_ignores_duplicate_ids() {
        let (store, previews) = store();
        let ids = store.add(vec![source("a.png")], TargetFormat::Jpeg);
        let record = store.snapshot().get(ids[0]).cloned().unwrap();

        assert!(!store.dispatch(Mutation::Add(vec![record.clone()])));
        assert!(!store.dispatch(Mutation::Add(vec![record.clone(), record.clone()])));
        assert_eq!(store.snapshot().len(), 1);

        // one removal empties the registry and frees the preview once
        assert!(store.remove(ids[0]));
        assert!(store.snapshot().is_empty());
        assert_eq!(previews.releases(record.preview), 1);
    }

    #[test]
    fn test_remove_releases_preview_once() {
        let (store, previews) = store();
        let ids = store.add(vec![source("a.png"), source("b.png")], TargetFormat::Jpeg);
        let handle = store.snapshot().get(ids[0]).unwrap().preview;

        assert!(store.remove(ids[0]));
        assert!(!store.remove(ids[0]));

        assert_eq!(previews.releases(handle), 1);
        assert!(store.snapshot().get(ids[0]).is_none());
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn test_clear_releases_all_previews() {
        let (store, previews) = store();
        store.add(vec![source("a.png"), source("b.png")], TargetFormat::Jpeg);
        let handles: Vec<PreviewHandle> = store.snapshot().iter().map(|r| r.preview).collect();

        assert!(store.clear());
        assert!(!store.clear());

        assert!(store.snapshot().is_empty());
        for handle in handles {
            assert_eq!(previews.releases(handle), 1);
        }
    }

    #[test]
    fn test_set_format_keeps_status() {
        let (store, _) = store();
        let ids = store.add(vec![source("a.png")], TargetFormat::Jpeg);

        assert!(store.set_format(ids[0], TargetFormat::Webp));
        let record = store.snapshot().get(ids[0]).cloned().unwrap();
        assert_eq!(record.target_format, TargetFormat::Webp);
        assert_eq!(record.status, RecordStatus::Idle);

        assert!(!store.set_format(RecordId::new(), TargetFormat::Png));
    }

    #[test]
    fn test_set_format_ignored_while_processing() {
        let (store, _) = store();
        let ids = store.add(vec![source("a.png")], TargetFormat::Jpeg);
        store.merge(ids[0], RecordPatch::processing());

        assert!(!store.set_format(ids[0], TargetFormat::Png));
        assert_eq!(store.snapshot().get(ids[0]).unwrap().target_format, TargetFormat::Jpeg);
    }

    #[test]
    fn test_merge_follows_state_machine() {
        let (store, _) = store();
        let ids = store.add(vec![source("a.png")], TargetFormat::Jpeg);
        let id = ids[0];
        let output = ConvertedImage::new(TargetFormat::Jpeg, vec![1, 2, 3]);

        // idle cannot jump straight to completed
        assert!(!store.merge(id, RecordPatch::completed(output.clone(), None)));
        assert!(store.merge(id, RecordPatch::processing()));
        assert!(!store.merge(id, RecordPatch::processing()));
        assert!(store.merge(id, RecordPatch::completed(output, None)));

        // terminal
        assert!(!store.merge(id, RecordPatch::failed()));
        let record = store.snapshot().get(id).cloned().unwrap();
        assert_eq!(record.status, RecordStatus::Completed);
        assert_eq!(record.converted.unwrap().size(), 3);
    }

    #[test]
    fn test_merge_on_absent_record_is_noop() {
        let (store, _) = store();
        let ids = store.add(vec![source("a.png")], TargetFormat::Jpeg);
        store.merge(ids[0], RecordPatch::processing());
        store.remove(ids[0]);

        let output = ConvertedImage::new(TargetFormat::Jpeg, vec![1]);
        assert!(!store.merge(ids[0], RecordPatch::completed(output, None)));
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_reduce_is_copy_on_write() {
        let (store, _) = store();
        let ids = store.add(vec![source("a.png")], TargetFormat::Jpeg);
        let before = store.snapshot();

        store.set_format(ids[0], TargetFormat::Png);

        assert_eq!(before.get(ids[0]).unwrap().target_format, TargetFormat::Jpeg);
        assert_eq!(store.snapshot().get(ids[0]).unwrap().target_format, TargetFormat::Png);
    }

    #[tokio::test]
    async fn test_subscribers_see_replacements() {
        let (store, _) = store();
        let mut rx = store.subscribe();

        store.add(vec![source("a.png")], TargetFormat::Jpeg);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().len(), 1);

        // no-op mutations do not notify
        store.remove(RecordId::new());
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_status_transitions() {
        use RecordStatus::*;
        assert!(Idle.can_advance_to(Processing));
        assert!(Processing.can_advance_to(Completed));
        assert!(Processing.can_advance_to(Error));
        assert!(!Idle.can_advance_to(Completed));
        assert!(!Completed.can_advance_to(Idle));
        assert!(!Error.can_advance_to(Processing));
        assert!(Completed.is_terminal() && Error.is_terminal());
    }
}
