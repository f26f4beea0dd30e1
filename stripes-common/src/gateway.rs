//! Role-gated mutation gateway
//!
//! Every change to the shared document goes through [`MutationGateway`].
//! Each operation checks the session role against the authorization table
//! before touching anything, so a rejected call leaves the document exactly
//! as it was. Accepted changes stamp `lastUpdated` and mark the change
//! tracker dirty.
//!
//! Lookups that feed a mutation (student, item, song, level) fail with
//! `NotFound`. Deletes of ids that are already gone succeed as no-ops and
//! return `false`.

use chrono::Utc;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::accounts::UserDirectory;
use crate::auth::{Operation, Role};
use crate::completion::can_graduate;
use crate::export::DocumentExport;
use crate::levels::LevelOrder;
use crate::model::{
    AccountStatus, ChecklistItem, ItemId, LevelId, SharedDocument, Song, SongDetails, SongId,
    SortPreference, Student, StudentId, SubItem,
};
use crate::sync::SyncTracker;
use crate::uuid_utils::generate_id;
use crate::{Error, Result};

/// Item or sub-item addressed by a curriculum operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryRef<'a> {
    pub level: &'a str,
    pub item_id: &'a str,
    pub sub_item_id: Option<&'a str>,
}

impl<'a> EntryRef<'a> {
    pub fn item(level: &'a str, item_id: &'a str) -> Self {
        Self {
            level,
            item_id,
            sub_item_id: None,
        }
    }

    pub fn sub_item(level: &'a str, item_id: &'a str, sub_item_id: &'a str) -> Self {
        Self {
            level,
            item_id,
            sub_item_id: Some(sub_item_id),
        }
    }
}

pub struct MutationGateway {
    document: SharedDocument,
    role: Role,
    levels: LevelOrder,
    tracker: SyncTracker,
    revision: u64,
}

impl MutationGateway {
    pub fn new(document: SharedDocument, role: Role, levels: LevelOrder, tracker: SyncTracker) -> Self {
        Self {
            document,
            role,
            levels,
            tracker,
            revision: 0,
        }
    }

    pub fn document(&self) -> &SharedDocument {
        &self.document
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn levels(&self) -> &LevelOrder {
        &self.levels
    }

    pub fn tracker(&self) -> &SyncTracker {
        &self.tracker
    }

    /// Count of accepted changes; bumps once per state-changing call
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Replace local state with a remote snapshot. Not a local edit.
    pub(crate) fn replace_document(&mut self, document: SharedDocument) {
        self.document = document;
    }

    pub(crate) fn set_role(&mut self, role: Role) {
        self.role = role;
    }

    pub fn into_document(self) -> SharedDocument {
        self.document
    }

    fn authorize(&self, operation: Operation, target: Option<&str>) -> Result<()> {
        if self.role.permits(operation, target) {
            Ok(())
        } else {
            warn!(role = %self.role, operation = operation.as_str(), "Rejected mutation");
            Err(Error::Authorization {
                operation: operation.as_str(),
                role: self.role.clone(),
            })
        }
    }

    fn mark_changed(&mut self) {
        self.document.last_updated = Some(Utc::now());
        self.revision += 1;
        self.tracker.local_edit();
    }

    fn require_level(&self, level: &str) -> Result<()> {
        if self.levels.contains(level) {
            Ok(())
        } else {
            Err(Error::NotFound(format!("level {}", level)))
        }
    }

    fn student_mut(&mut self, student_id: &str) -> Result<&mut Student> {
        self.document
            .student_mut(student_id)
            .ok_or_else(|| Error::NotFound(format!("student {}", student_id)))
    }

    fn items_mut(&mut self, level: &str) -> Result<&mut Vec<ChecklistItem>> {
        self.require_level(level)?;
        Ok(self.document.curriculum.entry(level.to_string()).or_default())
    }

    fn item_mut(&mut self, level: &str, item_id: &str) -> Result<&mut ChecklistItem> {
        self.items_mut(level)?
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or_else(|| Error::NotFound(format!("item {} in {}", item_id, level)))
    }

    fn sub_item_mut<'a>(item: &'a mut ChecklistItem, sub_item_id: &str) -> Result<&'a mut SubItem> {
        let parent = item.id.clone();
        item.sub_items
            .iter_mut()
            .find(|s| s.id == sub_item_id)
            .ok_or_else(|| Error::NotFound(format!("sub-item {} of {}", sub_item_id, parent)))
    }

    /// Add one `false` progress entry per student for a new curriculum entry
    fn seed_progress(&mut self, level: &str, entry_id: &str) {
        for student in &mut self.document.students {
            student.set_progress(level, entry_id, false);
        }
    }

    // ---------------------------------------------------------------
    // Students
    // ---------------------------------------------------------------

    pub fn add_student(&mut self, name: &str) -> Result<StudentId> {
        self.authorize(Operation::AddStudent, None)?;
        let name = non_empty(name, "student name")?;

        let mut student = Student {
            id: generate_id(),
            name,
            current_level: self.levels.first().id.clone(),
            progress: Default::default(),
            linked_user_id: None,
            date_added: Utc::now(),
        };
        for level in self.levels.ids() {
            let progress = student.progress.entry(level.to_string()).or_default();
            for id in self.document.items(level).iter().flat_map(ChecklistItem::entry_ids) {
                progress.insert(id.to_string(), false);
            }
        }

        let id = student.id.clone();
        info!(student_id = %id, "Added student");
        self.document.students.push(student);
        self.mark_changed();
        Ok(id)
    }

    pub fn delete_student(&mut self, student_id: &str) -> Result<bool> {
        self.authorize(Operation::DeleteStudent, Some(student_id))?;
        let before = self.document.students.len();
        self.document.students.retain(|s| s.id != student_id);
        if self.document.students.len() == before {
            debug!(student_id, "Delete of unknown student ignored");
            return Ok(false);
        }
        info!(student_id, "Deleted student");
        self.mark_changed();
        Ok(true)
    }

    pub fn rename_student(&mut self, student_id: &str, name: &str) -> Result<()> {
        self.authorize(Operation::RenameStudent, Some(student_id))?;
        let name = non_empty(name, "student name")?;
        self.student_mut(student_id)?.name = name;
        self.mark_changed();
        Ok(())
    }

    /// Flip one progress entry and return its new value
    pub fn toggle_progress(&mut self, student_id: &str, level: &str, item_id: &str) -> Result<bool> {
        self.authorize(Operation::ToggleProgress, Some(student_id))?;
        self.require_level(level)?;
        if !self.document.level_has_entry(level, item_id) {
            return Err(Error::NotFound(format!("item {} in {}", item_id, level)));
        }

        let student = self.student_mut(student_id)?;
        let done = !student.is_complete(level, item_id);
        student.set_progress(level, item_id, done);
        debug!(student_id, level, item_id, done, "Toggled progress");
        self.mark_changed();
        Ok(done)
    }

    /// Advance a fully complete student to the next level. Returns `false`
    /// without changing anything when the student is below 100% or
    /// already at the last level.
    pub fn graduate_student(&mut self, student_id: &str) -> Result<bool> {
        self.authorize(Operation::AdvanceLevel, Some(student_id))?;
        let student = self
            .document
            .student(student_id)
            .ok_or_else(|| Error::NotFound(format!("student {}", student_id)))?;

        if !can_graduate(&self.document, &self.levels, student) {
            debug!(student_id, level = %student.current_level, "Student not eligible to graduate");
            return Ok(false);
        }
        let Some(next) = self.levels.next(&student.current_level).map(|l| l.id.clone()) else {
            return Ok(false);
        };

        info!(student_id, level = %next, "Graduated student");
        self.student_mut(student_id)?.current_level = next;
        self.mark_changed();
        Ok(true)
    }

    /// Link a user account to a student, releasing it from any other student
    pub fn link_user(&mut self, student_id: &str, user_id: &str) -> Result<()> {
        self.authorize(Operation::LinkUser, Some(student_id))?;
        if self.document.student(student_id).is_none() {
            return Err(Error::NotFound(format!("student {}", student_id)));
        }

        for student in &mut self.document.students {
            if student.id == student_id {
                student.linked_user_id = Some(user_id.to_string());
            } else if student.linked_user_id.as_deref() == Some(user_id) {
                info!(student_id = %student.id, user_id, "Released previous link");
                student.linked_user_id = None;
            }
        }
        self.mark_changed();
        Ok(())
    }

    pub fn unlink_user(&mut self, student_id: &str) -> Result<bool> {
        self.authorize(Operation::LinkUser, Some(student_id))?;
        let student = self.student_mut(student_id)?;
        if student.linked_user_id.take().is_none() {
            return Ok(false);
        }
        self.mark_changed();
        Ok(true)
    }

    // ---------------------------------------------------------------
    // Songs
    // ---------------------------------------------------------------

    pub fn add_song(&mut self, details: SongDetails) -> Result<SongId> {
        self.authorize(Operation::AddSong, None)?;
        let title = non_empty(&details.title, "song title")?;

        let song = Song {
            id: generate_id(),
            artist: details.artist.trim().to_string(),
            title,
            tuning: details.tuning,
            difficulty: details.difficulty,
            techniques: details.techniques,
            links: details.links,
            date_added: Some(Utc::now()),
        };
        let id = song.id.clone();
        self.document.songs.push(song);
        self.mark_changed();
        Ok(id)
    }

    pub fn edit_song(&mut self, song_id: &str, details: SongDetails) -> Result<()> {
        self.authorize(Operation::EditSong, None)?;
        let title = non_empty(&details.title, "song title")?;
        let song = self
            .document
            .songs
            .iter_mut()
            .find(|s| s.id == song_id)
            .ok_or_else(|| Error::NotFound(format!("song {}", song_id)))?;

        song.artist = details.artist.trim().to_string();
        song.title = title;
        song.tuning = details.tuning;
        song.difficulty = details.difficulty;
        song.techniques = details.techniques;
        song.links = details.links;
        self.mark_changed();
        Ok(())
    }

    /// Delete a song and remove its id from every item and sub-item
    pub fn delete_song(&mut self, song_id: &str) -> Result<bool> {
        self.authorize(Operation::DeleteSong, None)?;
        let before = self.document.songs.len();
        self.document.songs.retain(|s| s.id != song_id);
        let removed = self.document.songs.len() != before;

        let mut unlinked = 0usize;
        for item in self.document.curriculum.values_mut().flatten() {
            unlinked += usize::from(item.linked_song_ids.remove(song_id));
            for sub in &mut item.sub_items {
                unlinked += usize::from(sub.linked_song_ids.remove(song_id));
            }
        }

        if !removed && unlinked == 0 {
            debug!(song_id, "Delete of unknown song ignored");
            return Ok(false);
        }
        info!(song_id, unlinked, "Deleted song");
        self.mark_changed();
        Ok(true)
    }

    // ---------------------------------------------------------------
    // Curriculum
    // ---------------------------------------------------------------

    pub fn add_item(&mut self, level: &str, text: &str) -> Result<ItemId> {
        self.authorize(Operation::EditCurriculum, None)?;
        let text = non_empty(text, "item text")?;
        let item = ChecklistItem::new(generate_id(), text);
        let id = item.id.clone();

        self.items_mut(level)?.push(item);
        self.seed_progress(level, &id);
        self.mark_changed();
        Ok(id)
    }

    pub fn add_sub_item(&mut self, level: &str, item_id: &str, text: &str) -> Result<ItemId> {
        self.authorize(Operation::EditCurriculum, None)?;
        let text = non_empty(text, "sub-item text")?;
        let sub = SubItem::new(generate_id(), text);
        let id = sub.id.clone();

        self.item_mut(level, item_id)?.sub_items.push(sub);
        self.seed_progress(level, &id);
        self.mark_changed();
        Ok(id)
    }

    pub fn edit_item_text(&mut self, level: &str, item_id: &str, text: &str) -> Result<()> {
        self.authorize(Operation::EditCurriculum, None)?;
        let text = non_empty(text, "item text")?;
        self.item_mut(level, item_id)?.text = text;
        self.mark_changed();
        Ok(())
    }

    pub fn edit_sub_item_text(
        &mut self,
        level: &str,
        item_id: &str,
        sub_item_id: &str,
        text: &str,
    ) -> Result<()> {
        self.authorize(Operation::EditCurriculum, None)?;
        let text = non_empty(text, "sub-item text")?;
        let item = self.item_mut(level, item_id)?;
        Self::sub_item_mut(item, sub_item_id)?.text = text;
        self.mark_changed();
        Ok(())
    }

    /// Delete an item with its sub-items, and every student's progress
    /// entries for them. The item's song links go with it; songs stay.
    pub fn delete_item(&mut self, level: &str, item_id: &str) -> Result<bool> {
        self.authorize(Operation::EditCurriculum, None)?;
        let items = self.items_mut(level)?;
        let Some(index) = items.iter().position(|i| i.id == item_id) else {
            debug!(level, item_id, "Delete of unknown item ignored");
            return Ok(false);
        };
        let removed = items.remove(index);

        let ids: Vec<&str> = removed.entry_ids().collect();
        for student in &mut self.document.students {
            student.remove_progress(level, ids.iter().copied());
        }
        info!(level, item_id, sub_items = removed.sub_items.len(), "Deleted item");
        self.mark_changed();
        Ok(true)
    }

    /// Returns `false` when the sub-item or its parent item is already gone
    pub fn delete_sub_item(&mut self, level: &str, item_id: &str, sub_item_id: &str) -> Result<bool> {
        self.authorize(Operation::EditCurriculum, None)?;
        let Some(item) = self.items_mut(level)?.iter_mut().find(|i| i.id == item_id) else {
            debug!(level, item_id, sub_item_id, "Delete under unknown item ignored");
            return Ok(false);
        };
        let before = item.sub_items.len();
        item.sub_items.retain(|s| s.id != sub_item_id);
        if item.sub_items.len() == before {
            debug!(level, item_id, sub_item_id, "Delete of unknown sub-item ignored");
            return Ok(false);
        }

        for student in &mut self.document.students {
            student.remove_progress(level, [sub_item_id]);
        }
        self.mark_changed();
        Ok(true)
    }

    /// Move the item at `from` to position `to` within its level
    pub fn reorder_items(&mut self, level: &str, from: usize, to: usize) -> Result<()> {
        self.authorize(Operation::EditCurriculum, None)?;
        move_within(self.items_mut(level)?, from, to)?;
        self.mark_changed();
        Ok(())
    }

    pub fn reorder_sub_items(&mut self, level: &str, item_id: &str, from: usize, to: usize) -> Result<()> {
        self.authorize(Operation::EditCurriculum, None)?;
        move_within(&mut self.item_mut(level, item_id)?.sub_items, from, to)?;
        self.mark_changed();
        Ok(())
    }

    /// Move an item (with its sub-items) to the end of another level,
    /// carrying each student's progress values along
    pub fn move_item(&mut self, from_level: &str, item_id: &str, to_level: &str) -> Result<()> {
        self.authorize(Operation::EditCurriculum, None)?;
        self.require_level(to_level)?;
        let items = self.items_mut(from_level)?;
        let index = items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or_else(|| Error::NotFound(format!("item {} in {}", item_id, from_level)))?;
        if from_level == to_level {
            return Ok(());
        }
        let item = items.remove(index);

        for student in &mut self.document.students {
            for id in item.entry_ids() {
                let done = student.is_complete(from_level, id);
                student.remove_progress(from_level, [id]);
                student.set_progress(to_level, id, done);
            }
        }
        self.items_mut(to_level)?.push(item);
        info!(item_id, from_level, to_level, "Moved item");
        self.mark_changed();
        Ok(())
    }

    /// Set or clear (with `None`) the lesson HTML of an item or sub-item
    pub fn set_lesson_content(&mut self, entry: EntryRef<'_>, html: Option<String>) -> Result<()> {
        self.authorize(Operation::EditLesson, None)?;
        let html = html.filter(|h| !h.trim().is_empty());
        let item = self.item_mut(entry.level, entry.item_id)?;
        match entry.sub_item_id {
            Some(sub_id) => Self::sub_item_mut(item, sub_id)?.lesson_content = html,
            None => item.lesson_content = html,
        }
        self.mark_changed();
        Ok(())
    }

    pub fn link_song(&mut self, entry: EntryRef<'_>, song_id: &str) -> Result<()> {
        self.authorize(Operation::EditCurriculum, None)?;
        if self.document.song(song_id).is_none() {
            return Err(Error::NotFound(format!("song {}", song_id)));
        }
        if !self.entry_links_mut(entry)?.insert(song_id.to_string()) {
            return Ok(());
        }
        self.mark_changed();
        Ok(())
    }

    pub fn unlink_song(&mut self, entry: EntryRef<'_>, song_id: &str) -> Result<bool> {
        self.authorize(Operation::EditCurriculum, None)?;
        if !self.entry_links_mut(entry)?.remove(song_id) {
            return Ok(false);
        }
        self.mark_changed();
        Ok(true)
    }

    fn entry_links_mut(&mut self, entry: EntryRef<'_>) -> Result<&mut BTreeSet<SongId>> {
        let item = self.item_mut(entry.level, entry.item_id)?;
        match entry.sub_item_id {
            Some(sub_id) => Ok(&mut Self::sub_item_mut(item, sub_id)?.linked_song_ids),
            None => Ok(&mut item.linked_song_ids),
        }
    }

    // ---------------------------------------------------------------
    // Document-wide
    // ---------------------------------------------------------------

    pub fn set_sort_preference(&mut self, preference: SortPreference) -> Result<()> {
        self.authorize(Operation::SetSortPreference, None)?;
        if self.document.sort_preference == preference {
            return Ok(());
        }
        self.document.sort_preference = preference;
        self.mark_changed();
        Ok(())
    }

    /// Replace students, songs, curriculum and sort preference wholesale
    pub fn import_snapshot(&mut self, export: DocumentExport) -> Result<()> {
        self.authorize(Operation::Import, None)?;
        let imported = export.document;

        let unknown: Vec<&LevelId> = imported
            .curriculum
            .keys()
            .filter(|level| !self.levels.contains(level))
            .collect();
        if !unknown.is_empty() {
            warn!(?unknown, "Import carries levels outside the configured order");
        }

        self.document.students = imported.students;
        self.document.songs = imported.songs;
        self.document.curriculum = imported.curriculum;
        self.document.sort_preference = imported.sort_preference;
        for level in self.levels.ids() {
            self.document.curriculum.entry(level.to_string()).or_default();
        }
        self.document.repair_progress();

        info!(
            students = self.document.students.len(),
            songs = self.document.songs.len(),
            exported = ?export.export_date,
            "Imported snapshot"
        );
        self.mark_changed();
        Ok(())
    }

    // ---------------------------------------------------------------
    // Accounts
    // ---------------------------------------------------------------

    pub fn approve_user(&mut self, directory: &mut UserDirectory, user_id: &str) -> Result<()> {
        self.authorize(Operation::ManageAccounts, None)?;
        if !directory.set_status(user_id, AccountStatus::Approved) {
            return Err(Error::NotFound(format!("user {}", user_id)));
        }
        info!(user_id, "Approved account");
        Ok(())
    }

    /// Deny (or revoke) an account and release any student linked to it
    pub fn deny_user(&mut self, directory: &mut UserDirectory, user_id: &str) -> Result<()> {
        self.authorize(Operation::ManageAccounts, None)?;
        if !directory.set_status(user_id, AccountStatus::Denied) {
            return Err(Error::NotFound(format!("user {}", user_id)));
        }
        info!(user_id, "Denied account");

        let mut released = false;
        for student in &mut self.document.students {
            if student.linked_user_id.as_deref() == Some(user_id) {
                student.linked_user_id = None;
                released = true;
            }
        }
        if released {
            self.mark_changed();
        }
        Ok(())
    }
}

fn non_empty(value: &str, what: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput(format!("{} must not be empty", what)));
    }
    Ok(trimmed.to_string())
}

fn move_within<T>(items: &mut Vec<T>, from: usize, to: usize) -> Result<()> {
    if from >= items.len() || to >= items.len() {
        return Err(Error::InvalidInput(format!(
            "cannot move position {} to {} in a list of {}",
            from,
            to,
            items.len()
        )));
    }
    let item = items.remove(from);
    items.insert(to, item);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> MutationGateway {
        let levels = LevelOrder::default();
        MutationGateway::new(
            SharedDocument::empty(&levels),
            Role::Admin,
            levels,
            SyncTracker::new(),
        )
    }

    #[test]
    fn test_move_within() {
        let mut v = vec!['a', 'b', 'c', 'd'];
        move_within(&mut v, 0, 2).unwrap();
        assert_eq!(v, vec!['b', 'c', 'a', 'd']);
        move_within(&mut v, 3, 0).unwrap();
        assert_eq!(v, vec!['d', 'b', 'c', 'a']);
        assert!(move_within(&mut v, 4, 0).is_err());
    }

    #[test]
    fn test_add_student_seeds_progress_for_existing_items() {
        let mut gw = admin();
        let item = gw.add_item("level1", "Power chords").unwrap();
        let sub = gw.add_sub_item("level1", &item, "A5").unwrap();
        let id = gw.add_student("  Ada ").unwrap();

        let student = gw.document().student(&id).unwrap();
        assert_eq!(student.name, "Ada");
        assert_eq!(student.current_level, "level1");
        assert_eq!(student.progress["level1"].get(&item), Some(&false));
        assert_eq!(student.progress["level1"].get(&sub), Some(&false));
        assert!(gw.tracker().has_local_changes());
        assert!(gw.document().last_updated.is_some());
    }

    #[test]
    fn test_new_items_seed_existing_students() {
        let mut gw = admin();
        let id = gw.add_student("Ada").unwrap();
        let item = gw.add_item("level2", "Barre chords").unwrap();
        assert_eq!(
            gw.document().student(&id).unwrap().progress["level2"].get(&item),
            Some(&false)
        );
    }

    #[test]
    fn test_lookups_fail_with_not_found() {
        let mut gw = admin();
        assert!(matches!(gw.rename_student("ghost", "x"), Err(Error::NotFound(_))));
        assert!(matches!(gw.add_item("black", "x"), Err(Error::NotFound(_))));
        assert!(matches!(gw.add_sub_item("level1", "ghost", "x"), Err(Error::NotFound(_))));
        let id = gw.add_student("Ada").unwrap();
        assert!(matches!(
            gw.toggle_progress(&id, "level1", "ghost"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_idempotent_deletes_do_not_mark_changes() {
        let mut gw = admin();
        let revision = gw.revision();
        assert!(!gw.delete_student("ghost").unwrap());
        assert!(!gw.delete_song("ghost").unwrap());
        assert!(!gw.delete_item("level1", "ghost").unwrap());
        assert_eq!(gw.revision(), revision);
        assert!(!gw.tracker().has_local_changes());
    }

    #[test]
    fn test_empty_names_rejected() {
        let mut gw = admin();
        assert!(matches!(gw.add_student("   "), Err(Error::InvalidInput(_))));
        assert!(matches!(
            gw.add_song(SongDetails::new("Artist", "")),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_lesson_content_set_and_clear() {
        let mut gw = admin();
        let item = gw.add_item("level1", "Scales").unwrap();
        let sub = gw.add_sub_item("level1", &item, "Pentatonic").unwrap();

        gw.set_lesson_content(EntryRef::sub_item("level1", &item, &sub), Some("<p>Box 1</p>".into()))
            .unwrap();
        let doc = gw.document();
        assert_eq!(
            doc.item("level1", &item).unwrap().sub_item(&sub).unwrap().lesson_content.as_deref(),
            Some("<p>Box 1</p>")
        );

        gw.set_lesson_content(EntryRef::sub_item("level1", &item, &sub), Some("  ".into()))
            .unwrap();
        assert!(gw.document().item("level1", &item).unwrap().sub_items[0]
            .lesson_content
            .is_none());
    }
}
