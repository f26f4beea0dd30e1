//! Curriculum level ordering
//!
//! Levels (stripes) form a fixed progression. Students start at the first
//! level and only ever move forward through this order.

use serde::{Deserialize, Serialize};

use crate::model::LevelId;

/// One tier in the curriculum progression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub id: LevelId,
    pub name: String,
}

impl Level {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Ordered list of curriculum levels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelOrder {
    levels: Vec<Level>,
}

impl LevelOrder {
    /// Build an ordering; duplicates and an empty list are rejected
    pub fn new(levels: Vec<Level>) -> crate::Result<Self> {
        if levels.is_empty() {
            return Err(crate::Error::Config(
                "at least one curriculum level is required".to_string(),
            ));
        }
        for (i, level) in levels.iter().enumerate() {
            if levels[..i].iter().any(|l| l.id == level.id) {
                return Err(crate::Error::Config(format!(
                    "duplicate curriculum level: {}",
                    level.id
                )));
            }
        }
        Ok(Self { levels })
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.levels.iter().map(|l| l.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Level every new student starts at
    pub fn first(&self) -> &Level {
        &self.levels[0]
    }

    pub fn contains(&self, level: &str) -> bool {
        self.index_of(level).is_some()
    }

    pub fn index_of(&self, level: &str) -> Option<usize> {
        self.levels.iter().position(|l| l.id == level)
    }

    /// Level following `level`, or `None` at the end (or for unknown ids)
    pub fn next(&self, level: &str) -> Option<&Level> {
        self.index_of(level).and_then(|i| self.levels.get(i + 1))
    }

    pub fn is_last(&self, level: &str) -> bool {
        self.index_of(level) == Some(self.levels.len() - 1)
    }

    /// Display name, falling back to the id for unknown levels
    pub fn name<'a>(&'a self, level: &'a str) -> &'a str {
        self.levels
            .iter()
            .find(|l| l.id == level)
            .map(|l| l.name.as_str())
            .unwrap_or(level)
    }
}

impl Default for LevelOrder {
    /// Six numbered levels, `level1` through `level6`
    fn default() -> Self {
        Self {
            levels: (1..=6)
                .map(|n| Level::new(format!("level{n}"), format!("Level {n}")))
                .collect(),
        }
    }
}
