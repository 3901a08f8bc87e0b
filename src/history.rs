//! Bounded list of past generations and its persisted store.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::payload::ImagePayload;
use crate::style::StyleOption;

pub const HISTORY_CAP: usize = 20;

/// Fixed key the history list lives under in the store.
pub const HISTORY_KEY: &str = "avatar_history";

/// One completed generation. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub id: String,
    pub original_image: ImagePayload,
    pub generated_avatar: ImagePayload,
    pub style: StyleOption,
    /// Creation time, epoch milliseconds.
    pub timestamp: i64,
}

impl HistoryItem {
    pub fn new(
        id: impl Into<String>,
        original_image: ImagePayload,
        generated_avatar: ImagePayload,
        style: StyleOption,
        timestamp: i64,
    ) -> Self {
        Self {
            id: id.into(),
            original_image,
            generated_avatar,
            style,
            timestamp,
        }
    }
}

/// What the page needs to list a history item; images are fetched by URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub style: StyleOption,
    pub timestamp: i64,
    pub original_url: String,
    pub avatar_url: String,
}

impl From<&HistoryItem> for HistoryEntry {
    fn from(item: &HistoryItem) -> Self {
        Self {
            id: item.id.clone(),
            style: item.style,
            timestamp: item.timestamp,
            original_url: format!("/api/history/{}/original", item.id),
            avatar_url: format!("/api/history/{}/avatar", item.id),
        }
    }
}

pub fn entries(history: &[HistoryItem]) -> Vec<HistoryEntry> {
    history.iter().map(HistoryEntry::from).collect()
}

/// Id derived from the creation time, bumped past any id already in `history`.
pub fn next_id(history: &[HistoryItem], timestamp_ms: i64) -> String {
    let mut candidate = timestamp_ms;
    while history.iter().any(|item| item.id == candidate.to_string()) {
        candidate += 1;
    }
    candidate.to_string()
}

/// Insert at the front and drop whatever falls past the cap.
pub fn push_capped(history: &[HistoryItem], item: HistoryItem) -> Vec<HistoryItem> {
    std::iter::once(item)
        .chain(history.iter().cloned())
        .take(HISTORY_CAP)
        .collect()
}

pub fn remove_by_id(history: &[HistoryItem], id: &str) -> Vec<HistoryItem> {
    history.iter().filter(|item| item.id != id).cloned().collect()
}

pub fn find<'a>(history: &'a [HistoryItem], id: &str) -> Option<&'a HistoryItem> {
    history.iter().find(|item| item.id == id)
}

/// Durable home of the history list.
pub trait HistoryStore: Send + Sync + 'static {
    /// Read the stored list; unreadable content yields an empty list.
    fn load(&self) -> Vec<HistoryItem>;

    fn save(&self, items: &[HistoryItem]) -> Result<(), AppError>;
}

impl<T: HistoryStore> HistoryStore for Arc<T> {
    fn load(&self) -> Vec<HistoryItem> {
        (**self).load()
    }

    fn save(&self, items: &[HistoryItem]) -> Result<(), AppError> {
        (**self).save(items)
    }
}

/// JSON object on disk, `{ "avatar_history": [...] }`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_object(&self) -> BTreeMap<String, Value> {
        let Ok(raw) = fs::read_to_string(&self.path) else {
            return BTreeMap::new();
        };
        serde_json::from_str(&raw).unwrap_or_default()
    }
}

impl HistoryStore for JsonFileStore {
    fn load(&self) -> Vec<HistoryItem> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no saved history yet");
                return Vec::new();
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "failed to read history");
                return Vec::new();
            }
        };

        let object: BTreeMap<String, Value> = match serde_json::from_str(&raw) {
            Ok(object) => object,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "history file is malformed; starting empty");
                return Vec::new();
            }
        };

        let Some(value) = object.get(HISTORY_KEY).cloned() else {
            return Vec::new();
        };

        match serde_json::from_value::<Vec<HistoryItem>>(value) {
            Ok(mut items) => {
                items.truncate(HISTORY_CAP);
                items
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "history entries are malformed; starting empty");
                Vec::new()
            }
        }
    }

    fn save(&self, items: &[HistoryItem]) -> Result<(), AppError> {
        let mut object = self.read_object();
        let value = serde_json::to_value(items).map_err(|e| AppError::Storage(e.to_string()))?;
        object.insert(HISTORY_KEY.to_owned(), value);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| AppError::Storage(e.to_string()))?;
        }

        let body = serde_json::to_vec(&object).map_err(|e| AppError::Storage(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(|e| AppError::Storage(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| AppError::Storage(e.to_string()))?;
        Ok(())
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<Vec<HistoryItem>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn with_items(items: Vec<HistoryItem>) -> Self {
        Self {
            items: Mutex::new(items),
            saves: Mutex::new(0),
        }
    }

    /// Number of successful `save` calls.
    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|count| *count).unwrap_or(0)
    }
}

impl HistoryStore for MemoryStore {
    fn load(&self) -> Vec<HistoryItem> {
        self.items
            .lock()
            .map(|items| items.clone())
            .unwrap_or_default()
    }

    fn save(&self, items: &[HistoryItem]) -> Result<(), AppError> {
        let mut stored = self
            .items
            .lock()
            .map_err(|_| AppError::Storage("memory store poisoned".to_owned()))?;
        *stored = items.to_vec();
        if let Ok(mut saves) = self.saves.lock() {
            *saves += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str) -> HistoryItem {
        HistoryItem::new(
            id,
            ImagePayload::new("image/png", "b3JpZ2luYWw="),
            ImagePayload::new("image/png", "YXZhdGFy"),
            StyleOption::Anime,
            1_700_000_000_000,
        )
    }

    fn ids(items: &[HistoryItem]) -> Vec<&str> {
        items.iter().map(|item| item.id.as_str()).collect()
    }

    #[test]
    fn push_inserts_at_front() {
        let history = vec![item("a"), item("b")];
        let next = push_capped(&history, item("c"));
        assert_eq!(ids(&next), ["c", "a", "b"]);
    }

    #[test]
    fn push_past_cap_evicts_oldest() {
        let history: Vec<_> = (0..HISTORY_CAP).map(|i| item(&i.to_string())).collect();
        let next = push_capped(&history, item("new"));
        assert_eq!(next.len(), HISTORY_CAP);
        assert_eq!(next[0].id, "new");
        assert!(find(&next, &(HISTORY_CAP - 1).to_string()).is_none());
        assert_eq!(next[HISTORY_CAP - 1].id, (HISTORY_CAP - 2).to_string());
    }

    #[test]
    fn remove_keeps_relative_order() {
        let history = vec![item("a"), item("b"), item("c"), item("d")];
        assert_eq!(ids(&remove_by_id(&history, "b")), ["a", "c", "d"]);
        assert_eq!(ids(&remove_by_id(&history, "zzz")), ["a", "b", "c", "d"]);
    }

    #[test]
    fn next_id_avoids_collisions() {
        let history = vec![item("100"), item("101")];
        assert_eq!(next_id(&history, 100), "102");
        assert_eq!(next_id(&history, 99), "99");
    }

    #[test]
    fn serializes_with_camel_case_keys_and_data_uris() {
        let json = serde_json::to_value(item("x")).expect("item serializes");
        assert_eq!(json["originalImage"], "data:image/png;base64,b3JpZ2luYWw=");
        assert_eq!(json["generatedAvatar"], "data:image/png;base64,YXZhdGFy");
        assert_eq!(json["style"], "anime");
    }

    #[test]
    fn entries_link_images_instead_of_embedding_them() {
        let entry = HistoryEntry::from(&item("42"));
        assert_eq!(entry.original_url, "/api/history/42/original");
        assert_eq!(entry.avatar_url, "/api/history/42/avatar");

        let json = serde_json::to_string(&entry).expect("entry serializes");
        assert!(!json.contains("base64"));
        assert!(json.contains("\"avatarUrl\""));
    }

    #[test]
    fn file_store_saves_and_loads() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let store = JsonFileStore::new(dir.path().join("nested").join("history.json"));
        store
            .save(&[item("a"), item("b")])
            .expect("save should work");
        assert_eq!(ids(&store.load()), ["a", "b"]);
    }

    #[test]
    fn file_store_tolerates_missing_and_malformed_files() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("history.json");
        let store = JsonFileStore::new(&path);
        assert!(store.load().is_empty());

        fs::write(&path, "{not json").expect("write should work");
        assert!(store.load().is_empty());

        fs::write(&path, r#"{"avatar_history": [{"id": 3}]}"#).expect("write should work");
        assert!(store.load().is_empty());
    }

    #[test]
    fn file_store_preserves_other_keys() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("history.json");
        fs::write(&path, r#"{"theme": "dark"}"#).expect("write should work");

        let store = JsonFileStore::new(&path);
        store.save(&[item("a")]).expect("save should work");

        let raw = fs::read_to_string(&path).expect("read should work");
        let object: Value = serde_json::from_str(&raw).expect("file is json");
        assert_eq!(object["theme"], "dark");
        assert_eq!(object[HISTORY_KEY][0]["id"], "a");
    }

    #[test]
    fn memory_store_counts_saves() {
        let store = MemoryStore::default();
        store.save(&[item("a")]).expect("save should work");
        assert_eq!(store.save_count(), 1);
        assert_eq!(ids(&store.load()), ["a"]);
    }
}
