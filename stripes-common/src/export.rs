//! Export and import formats
//!
//! JSON exports are the shared document plus an `exportDate` stamp and read
//! back through [`parse_export`]. CSV exports are one-way reports.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::completion::calculate_completion;
use crate::levels::LevelOrder;
use crate::model::SharedDocument;
use crate::{Error, Result};

/// A full document snapshot as written to (and read from) an export file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentExport {
    #[serde(flatten)]
    pub document: SharedDocument,
    #[serde(default)]
    pub export_date: Option<DateTime<Utc>>,
}

impl DocumentExport {
    pub fn new(document: SharedDocument) -> Self {
        Self {
            document,
            export_date: Some(Utc::now()),
        }
    }
}

pub fn export_json(document: &SharedDocument) -> Result<String> {
    Ok(serde_json::to_string_pretty(&DocumentExport::new(document.clone()))?)
}

/// Parse a JSON export. Anything that is not a JSON object is rejected.
pub fn parse_export(json: &str) -> Result<DocumentExport> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    if !value.is_object() {
        return Err(Error::InvalidInput(
            "export file must contain a JSON object".to_string(),
        ));
    }
    Ok(serde_json::from_value(value)?)
}

pub fn students_csv(document: &SharedDocument, levels: &LevelOrder) -> String {
    let mut out = CsvWriter::new(&[
        "id",
        "name",
        "currentLevel",
        "completion",
        "linkedUserId",
        "dateAdded",
    ]);
    for student in &document.students {
        let completion = calculate_completion(document, student, &student.current_level);
        out.row([
            student.id.clone(),
            student.name.clone(),
            levels.name(&student.current_level).to_string(),
            completion.to_string(),
            student.linked_user_id.clone().unwrap_or_default(),
            student.date_added.to_rfc3339_opts(SecondsFormat::Secs, true),
        ]);
    }
    out.finish()
}

pub fn songs_csv(document: &SharedDocument) -> String {
    let mut out = CsvWriter::new(&[
        "id",
        "artist",
        "title",
        "tuning",
        "difficulty",
        "techniques",
        "links",
    ]);
    for song in &document.songs {
        out.row([
            song.id.clone(),
            song.artist.clone(),
            song.title.clone(),
            song.tuning.clone().unwrap_or_default(),
            song.difficulty.map(|d| d.to_string()).unwrap_or_default(),
            song.techniques.join(";"),
            song.links.join(";"),
        ]);
    }
    out.finish()
}

/// One row per item and sub-item, levels in configured order
pub fn curriculum_csv(document: &SharedDocument, levels: &LevelOrder) -> String {
    let mut out = CsvWriter::new(&[
        "level",
        "itemId",
        "parentItemId",
        "text",
        "linkedSongIds",
        "hasLesson",
    ]);
    for level in levels.ids() {
        for item in document.items(level) {
            out.row([
                level.to_string(),
                item.id.clone(),
                String::new(),
                item.text.clone(),
                join_ids(&item.linked_song_ids),
                item.lesson_content.is_some().to_string(),
            ]);
            for sub in &item.sub_items {
                out.row([
                    level.to_string(),
                    sub.id.clone(),
                    item.id.clone(),
                    sub.text.clone(),
                    join_ids(&sub.linked_song_ids),
                    sub.lesson_content.is_some().to_string(),
                ]);
            }
        }
    }
    out.finish()
}

fn join_ids<'a>(ids: impl IntoIterator<Item = &'a String>) -> String {
    ids.into_iter().map(String::as_str).collect::<Vec<_>>().join(";")
}

/// Minimal RFC 4180 writer: CRLF line endings, fields quoted when needed
struct CsvWriter {
    buf: String,
}

impl CsvWriter {
    fn new(header: &[&str]) -> Self {
        let mut writer = Self { buf: String::new() };
        writer.row(header.iter().map(|h| h.to_string()));
        writer
    }

    fn row(&mut self, fields: impl IntoIterator<Item = String>) {
        for (i, field) in fields.into_iter().enumerate() {
            if i > 0 {
                self.buf.push(',');
            }
            self.buf.push_str(&escape_field(&field));
        }
        self.buf.push_str("\r\n");
    }

    fn finish(self) -> String {
        self.buf
    }
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChecklistItem, Song, SubItem};

    #[test]
    fn test_escape_field() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_parse_export_rejects_non_objects() {
        assert!(matches!(parse_export("[1, 2]"), Err(Error::InvalidInput(_))));
        assert!(matches!(parse_export("not json"), Err(Error::Serialization(_))));
    }

    #[test]
    fn test_export_date_is_camel_case() {
        let json = export_json(&SharedDocument::default()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["exportDate"].is_string());
        assert!(value["students"].is_array());
    }

    #[test]
    fn test_curriculum_csv_rows() {
        let levels = LevelOrder::default();
        let mut doc = SharedDocument::empty(&levels);
        let mut item = ChecklistItem::new("a".into(), "Chords, open".into());
        item.linked_song_ids.insert("s1".into());
        item.linked_song_ids.insert("s2".into());
        let mut sub = SubItem::new("a1".into(), "G".into());
        sub.lesson_content = Some("<p>G</p>".into());
        item.sub_items.push(sub);
        doc.curriculum.get_mut("level2").unwrap().push(item);

        let csv = curriculum_csv(&doc, &levels);
        let lines: Vec<&str> = csv.split("\r\n").collect();
        assert_eq!(lines[0], "level,itemId,parentItemId,text,linkedSongIds,hasLesson");
        assert_eq!(lines[1], "level2,a,,\"Chords, open\",s1;s2,false");
        assert_eq!(lines[2], "level2,a1,a,G,,true");
        assert_eq!(lines[3], "");
    }

    #[test]
    fn test_songs_csv_joins_lists() {
        let mut doc = SharedDocument::default();
        doc.songs.push(Song {
            id: "s1".into(),
            artist: "Artist".into(),
            title: "Title".into(),
            tuning: Some("Drop D".into()),
            difficulty: Some(3),
            techniques: vec!["palm muting".into(), "slides".into()],
            links: vec![],
            date_added: None,
        });
        let csv = songs_csv(&doc);
        assert!(csv.ends_with("s1,Artist,Title,Drop D,3,palm muting;slides,\r\n"));
    }
}
