//! Derived progress computations

use crate::levels::LevelOrder;
use crate::model::{SharedDocument, Student};

/// Percentage (0-100) of a level's items and sub-items the student has
/// completed, rounded to the nearest integer. A level with no items is 0.
pub fn calculate_completion(document: &SharedDocument, student: &Student, level: &str) -> u8 {
    let mut total = 0u32;
    let mut completed = 0u32;

    for id in document.items(level).iter().flat_map(|item| item.entry_ids()) {
        total += 1;
        if student.is_complete(level, id) {
            completed += 1;
        }
    }

    if total == 0 {
        return 0;
    }
    ((f64::from(completed) / f64::from(total)) * 100.0).round() as u8
}

/// A student may advance when the current level is fully complete and is
/// not the last level in the ordering.
pub fn can_graduate(document: &SharedDocument, levels: &LevelOrder, student: &Student) -> bool {
    levels.next(&student.current_level).is_some()
        && calculate_completion(document, student, &student.current_level) == 100
}
