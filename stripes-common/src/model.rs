//! Shared document model
//!
//! The whole tracker lives in one remote JSON document. Field names are
//! camelCase on the wire so exports and stored documents keep one shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::levels::LevelOrder;

pub type LevelId = String;
pub type ItemId = String;
pub type SongId = String;
pub type StudentId = String;
pub type UserId = String;

/// Per-level completion flags keyed by item or sub-item id
pub type LevelProgress = BTreeMap<ItemId, bool>;

/// The single remote-persisted aggregate
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedDocument {
    #[serde(default)]
    pub students: Vec<Student>,
    #[serde(default)]
    pub curriculum: BTreeMap<LevelId, Vec<ChecklistItem>>,
    #[serde(default)]
    pub songs: Vec<Song>,
    #[serde(default)]
    pub sort_preference: SortPreference,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl SharedDocument {
    /// Empty document with an (empty) checklist for every level
    pub fn empty(levels: &LevelOrder) -> Self {
        Self {
            curriculum: levels.ids().map(|id| (id.to_string(), Vec::new())).collect(),
            ..Self::default()
        }
    }

    pub fn student(&self, id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == id)
    }

    pub fn student_mut(&mut self, id: &str) -> Option<&mut Student> {
        self.students.iter_mut().find(|s| s.id == id)
    }

    /// Student currently linked to the given user account, if any
    pub fn student_linked_to(&self, user_id: &str) -> Option<&Student> {
        self.students
            .iter()
            .find(|s| s.linked_user_id.as_deref() == Some(user_id))
    }

    pub fn song(&self, id: &str) -> Option<&Song> {
        self.songs.iter().find(|s| s.id == id)
    }

    /// Items of a level in display order; unknown levels have none
    pub fn items(&self, level: &str) -> &[ChecklistItem] {
        self.curriculum.get(level).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn item(&self, level: &str, item_id: &str) -> Option<&ChecklistItem> {
        self.items(level).iter().find(|i| i.id == item_id)
    }

    /// True when `id` names an item or a sub-item at `level`
    pub fn level_has_entry(&self, level: &str, id: &str) -> bool {
        self.items(level)
            .iter()
            .any(|item| item.id == id || item.sub_items.iter().any(|s| s.id == id))
    }

    /// Fill in a `false` progress entry for every curriculum entry a student
    /// is missing. Reads already treat missing entries as `false`; this makes
    /// the stored shape match.
    pub fn repair_progress(&mut self) {
        let Self {
            students,
            curriculum,
            ..
        } = self;
        for student in students.iter_mut() {
            for (level, items) in curriculum.iter() {
                let progress = student.progress.entry(level.clone()).or_default();
                for id in items.iter().flat_map(ChecklistItem::entry_ids) {
                    progress.entry(id.to_string()).or_insert(false);
                }
            }
        }
    }
}

/// A tracked student
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    pub current_level: LevelId,
    #[serde(default)]
    pub progress: BTreeMap<LevelId, LevelProgress>,
    #[serde(default)]
    pub linked_user_id: Option<UserId>,
    pub date_added: DateTime<Utc>,
}

impl Student {
    /// Completion flag for an entry; missing levels or entries read as `false`
    pub fn is_complete(&self, level: &str, item_id: &str) -> bool {
        self.progress
            .get(level)
            .and_then(|p| p.get(item_id))
            .copied()
            .unwrap_or(false)
    }

    pub fn set_progress(&mut self, level: &str, item_id: &str, done: bool) {
        self.progress
            .entry(level.to_string())
            .or_default()
            .insert(item_id.to_string(), done);
    }

    /// Drop progress entries for the given ids at one level
    pub fn remove_progress<'a>(&mut self, level: &str, ids: impl IntoIterator<Item = &'a str>) {
        if let Some(progress) = self.progress.get_mut(level) {
            for id in ids {
                progress.remove(id);
            }
        }
    }
}

/// Top-level checklist entry within a level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    pub id: ItemId,
    pub text: String,
    #[serde(default)]
    pub sub_items: Vec<SubItem>,
    #[serde(default)]
    pub linked_song_ids: BTreeSet<SongId>,
    #[serde(default)]
    pub lesson_content: Option<String>,
}

impl ChecklistItem {
    pub fn new(id: ItemId, text: String) -> Self {
        Self {
            id,
            text,
            sub_items: Vec::new(),
            linked_song_ids: BTreeSet::new(),
            lesson_content: None,
        }
    }

    /// The item's own id followed by its sub-item ids
    pub fn entry_ids(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.id.as_str()).chain(self.sub_items.iter().map(|s| s.id.as_str()))
    }

    pub fn sub_item(&self, id: &str) -> Option<&SubItem> {
        self.sub_items.iter().find(|s| s.id == id)
    }
}

/// Nested checklist entry; same shape as an item minus children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubItem {
    pub id: ItemId,
    pub text: String,
    #[serde(default)]
    pub linked_song_ids: BTreeSet<SongId>,
    #[serde(default)]
    pub lesson_content: Option<String>,
}

impl SubItem {
    pub fn new(id: ItemId, text: String) -> Self {
        Self {
            id,
            text,
            linked_song_ids: BTreeSet::new(),
            lesson_content: None,
        }
    }
}

/// Reference library entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: SongId,
    #[serde(default)]
    pub artist: String,
    pub title: String,
    #[serde(default)]
    pub tuning: Option<String>,
    #[serde(default)]
    pub difficulty: Option<u8>,
    #[serde(default)]
    pub techniques: Vec<String>,
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub date_added: Option<DateTime<Utc>>,
}

/// Editable song fields, used for both add and edit
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongDetails {
    #[serde(default)]
    pub artist: String,
    pub title: String,
    #[serde(default)]
    pub tuning: Option<String>,
    #[serde(default)]
    pub difficulty: Option<u8>,
    #[serde(default)]
    pub techniques: Vec<String>,
    #[serde(default)]
    pub links: Vec<String>,
}

impl SongDetails {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Student list ordering stored with the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortPreference {
    #[default]
    #[serde(rename = "name-asc")]
    NameAsc,
    #[serde(rename = "name-desc")]
    NameDesc,
    #[serde(rename = "level-desc")]
    LevelDesc,
    #[serde(rename = "level-asc")]
    LevelAsc,
}

/// Approval state of a signed-in account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Pending,
    Approved,
    Denied,
}

/// Identity record kept per signed-in user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn student() -> Student {
        Student {
            id: "s1".to_string(),
            name: "Ada".to_string(),
            current_level: "level1".to_string(),
            progress: BTreeMap::new(),
            linked_user_id: None,
            date_added: Utc::now(),
        }
    }

    #[test]
    fn test_missing_progress_reads_false() {
        let mut s = student();
        assert!(!s.is_complete("level1", "nope"));
        assert!(!s.is_complete("no-such-level", "nope"));
        s.set_progress("level1", "a", true);
        assert!(s.is_complete("level1", "a"));
    }

    #[test]
    fn test_repair_progress_fills_missing_entries() {
        let mut doc = SharedDocument::empty(&LevelOrder::default());
        let mut item = ChecklistItem::new("a".into(), "Chords".into());
        item.sub_items.push(SubItem::new("a1".into(), "G major".into()));
        doc.curriculum.get_mut("level1").unwrap().push(item);
        let mut s = student();
        s.set_progress("level1", "a", true);
        doc.students.push(s);

        doc.repair_progress();

        let progress = &doc.students[0].progress["level1"];
        assert_eq!(progress.get("a"), Some(&true));
        assert_eq!(progress.get("a1"), Some(&false));
        assert!(doc.students[0].progress.contains_key("level6"));
    }

    #[test]
    fn test_document_wire_shape_is_camel_case() {
        let mut doc = SharedDocument::default();
        doc.students.push(student());
        doc.sort_preference = SortPreference::LevelDesc;
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["sortPreference"], json!("level-desc"));
        assert_eq!(value["students"][0]["currentLevel"], json!("level1"));
        assert_eq!(value["students"][0]["linkedUserId"], json!(null));
    }

    #[test]
    fn test_sparse_document_deserializes_with_defaults() {
        let doc: SharedDocument = serde_json::from_value(json!({
            "curriculum": { "level1": [ { "id": "a", "text": "Strumming" } ] }
        }))
        .unwrap();
        assert!(doc.students.is_empty());
        assert_eq!(doc.sort_preference, SortPreference::NameAsc);
        assert!(doc.items("level1")[0].sub_items.is_empty());
        assert!(doc.items("level9").is_empty());
    }
}
