//! Read-only roster and curriculum queries

use serde::Serialize;

use crate::completion::calculate_completion;
use crate::levels::LevelOrder;
use crate::model::{ItemId, LevelId, SharedDocument, SortPreference, Student};

/// Students matching `search` (case-insensitive name substring), ordered
/// by `sort`. Level sorts break ties on completion of the current level.
pub fn sorted_students<'a>(
    document: &'a SharedDocument,
    levels: &LevelOrder,
    sort: SortPreference,
    search: &str,
) -> Vec<&'a Student> {
    let needle = search.trim().to_lowercase();
    let mut students: Vec<&Student> = document
        .students
        .iter()
        .filter(|s| needle.is_empty() || s.name.to_lowercase().contains(&needle))
        .collect();

    let rank = |s: &Student| {
        (
            levels.index_of(&s.current_level).unwrap_or(0),
            calculate_completion(document, s, &s.current_level),
        )
    };
    let by_name = |a: &&Student, b: &&Student| a.name.to_lowercase().cmp(&b.name.to_lowercase());

    match sort {
        SortPreference::NameAsc => students.sort_by(by_name),
        SortPreference::NameDesc => students.sort_by(|a, b| by_name(b, a)),
        SortPreference::LevelDesc => students.sort_by(|a, b| rank(*b).cmp(&rank(*a)).then_with(|| by_name(a, b))),
        SortPreference::LevelAsc => students.sort_by(|a, b| rank(*a).cmp(&rank(*b)).then_with(|| by_name(a, b))),
    }
    students
}

/// Where a song is used in the curriculum
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedConcept {
    pub level: LevelId,
    pub item_id: ItemId,
    pub text: String,
    /// Parent item text, set for sub-items
    pub parent_text: Option<String>,
}

/// Items and sub-items linked to `song_id`, in level order then display order
pub fn linked_concepts(document: &SharedDocument, levels: &LevelOrder, song_id: &str) -> Vec<LinkedConcept> {
    let mut concepts = Vec::new();
    for level in levels.ids() {
        for item in document.items(level) {
            if item.linked_song_ids.contains(song_id) {
                concepts.push(LinkedConcept {
                    level: level.to_string(),
                    item_id: item.id.clone(),
                    text: item.text.clone(),
                    parent_text: None,
                });
            }
            for sub in item.sub_items.iter().filter(|s| s.linked_song_ids.contains(song_id)) {
                concepts.push(LinkedConcept {
                    level: level.to_string(),
                    item_id: sub.id.clone(),
                    text: sub.text.clone(),
                    parent_text: Some(item.text.clone()),
                });
            }
        }
    }
    concepts
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumStats {
    /// Items plus sub-items across all configured levels
    pub total_entries: usize,
    pub with_lessons: usize,
}

pub fn curriculum_stats(document: &SharedDocument, levels: &LevelOrder) -> CurriculumStats {
    let mut stats = CurriculumStats::default();
    for level in levels.ids() {
        for item in document.items(level) {
            stats.total_entries += 1 + item.sub_items.len();
            stats.with_lessons += usize::from(item.lesson_content.is_some());
            stats.with_lessons += item.sub_items.iter().filter(|s| s.lesson_content.is_some()).count();
        }
    }
    stats
}

impl CurriculumStats {
    /// Share of entries with lesson content, 0-100
    pub fn lesson_coverage(&self) -> u8 {
        if self.total_entries == 0 {
            return 0;
        }
        let share = self.with_lessons.min(self.total_entries) as f64 / self.total_entries as f64;
        (share * 100.0).round() as u8
    }
}
