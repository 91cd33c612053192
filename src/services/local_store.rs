use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::models::document::{Document, DOCUMENT_VERSION};
use crate::services::legacy::{DirKeyValueStore, LegacyKeysLoader};

pub const STRUCTURED_FILE: &str = "classbook.json";
pub const LEGACY_DIR: &str = "legacy";

#[derive(Debug, Error)]
pub enum LocalStoreError {
    #[error("local storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("document could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One source the document can be read from. Loaders never fail loudly:
/// anything unreadable is `None` so the next loader gets a turn.
pub trait DocumentLoader: Send + Sync {
    fn name(&self) -> &'static str;
    fn load(&self) -> Option<Document>;
    fn clear(&self) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub document: Document,
    pub source: &'static str,
}

/// What the sync coordinator needs from on-device storage.
pub trait LocalPersistence: Send + Sync {
    fn load(&self) -> Option<LoadedDocument>;
    fn save(&self, doc: &Document) -> Result<(), LocalStoreError>;
    fn clear(&self) -> Result<(), LocalStoreError>;
}

pub struct StructuredFileLoader {
    path: PathBuf,
}

impl StructuredFileLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DocumentLoader for StructuredFileLoader {
    fn name(&self) -> &'static str {
        "structured-file"
    }

    fn load(&self) -> Option<Document> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Cannot read {}: {}", self.path.display(), e);
                return None;
            }
        };
        match serde_json::from_str::<Document>(&text) {
            Ok(doc) => {
                if doc.version > DOCUMENT_VERSION {
                    tracing::warn!(
                        "{} was written by a newer version ({} > {}); unknown fields are ignored",
                        self.path.display(),
                        doc.version,
                        DOCUMENT_VERSION
                    );
                }
                Some(doc)
            }
            Err(e) => {
                tracing::warn!("{} is not a valid document: {}", self.path.display(), e);
                None
            }
        }
    }

    fn clear(&self) -> std::io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// Device-private persistence: writes the structured file, reads through a
/// prioritized loader chain.
pub struct LocalStore {
    path: PathBuf,
    loaders: Vec<Box<dyn DocumentLoader>>,
}

impl LocalStore {
    pub fn new(path: impl Into<PathBuf>, loaders: Vec<Box<dyn DocumentLoader>>) -> Self {
        Self {
            path: path.into(),
            loaders,
        }
    }

    /// Standard layout: `<dir>/classbook.json`, falling back to `<dir>/legacy/<key>`.
    pub fn in_dir(dir: &Path) -> Self {
        let path = dir.join(STRUCTURED_FILE);
        Self::new(
            path.clone(),
            vec![
                Box::new(StructuredFileLoader::new(path)),
                Box::new(LegacyKeysLoader::new(DirKeyValueStore::new(dir.join(LEGACY_DIR)))),
            ],
        )
    }
}

impl LocalPersistence for LocalStore {
    fn load(&self) -> Option<LoadedDocument> {
        self.loaders.iter().find_map(|loader| {
            let document = loader.load()?;
            tracing::debug!("Loaded document from {}", loader.name());
            Some(LoadedDocument {
                document,
                source: loader.name(),
            })
        })
    }

    fn save(&self, doc: &Document) -> Result<(), LocalStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec(doc)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".saving");
        let tmp = PathBuf::from(tmp);
        {
            let mut out = File::create(&tmp)?;
            out.write_all(&bytes)?;
            out.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        tracing::debug!("Saved {} bytes to {}", bytes.len(), self.path.display());
        Ok(())
    }

    fn clear(&self) -> Result<(), LocalStoreError> {
        for loader in &self.loaders {
            loader.clear()?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::editor::DocumentEditor;
    use crate::models::schedule::{PeriodTime, ScheduleDay, ScheduledPeriod};
    use crate::models::student::{AttendanceStatus, BehaviorKind, Gender, NewStudent};
    use crate::models::teacher::CertificateSettings;
    use crate::models::document::Semester;
    use crate::services::legacy::KeyValueStore;
    use chrono::NaiveDate;

    /// Removed when dropped.
    pub(crate) fn temp_dir() -> tempfile::TempDir {
        tempfile::Builder::new()
            .prefix("classbook-test-")
            .tempdir()
            .unwrap()
    }

    /// Every top-level section is populated.
    pub(crate) fn sample_document() -> Document {
        let date = NaiveDate::from_ymd_opt(2026, 10, 12).unwrap();
        let mut doc = Document::empty_for(date);
        let mut editor = DocumentEditor::new(&mut doc);
        let sid = editor
            .add_student(NewStudent {
                name: "Ahmed".into(),
                classes: vec!["7A".into()],
                grade: Some("7".into()),
                parent_phone: Some("0791234567".into()),
                gender: Some(Gender::Male),
            })
            .unwrap();
        let quiz = editor.add_assessment_tool("Quiz 1", 20.0, 0.5).unwrap();
        editor
            .record_attendance(&sid, date, AttendanceStatus::Late, Some(1), Some("bus".into()))
            .unwrap();
        editor
            .record_behavior(&sid, date, BehaviorKind::Positive, "volunteered", Some(2), 3)
            .unwrap();
        editor
            .record_grade(&sid, &quiz, 17.5, date, Semester::First)
            .unwrap();
        editor.add_class("9C").unwrap();
        editor.set_class_hidden("9C", true);
        let team = editor.add_group("Debate team").unwrap();
        editor.set_group_members(&team, vec![sid]).unwrap();
        editor.set_schedule(vec![ScheduleDay {
            day: "sunday".into(),
            periods: vec![ScheduledPeriod {
                period: 1,
                class_name: "7A".into(),
                subject: Some("Science".into()),
            }],
        }]);
        editor.set_period_times(vec![PeriodTime {
            period: 1,
            start: "07:45".into(),
            end: "08:30".into(),
        }]);
        editor.set_current_semester(Semester::Second);
        editor.update_certificate_settings(CertificateSettings {
            title: "Star of the week".into(),
            show_stamp: false,
            ..CertificateSettings::default()
        });
        doc.teacher_info.name = "Ms. Huda".into();
        doc.teacher_info.stamp = Some("data:image/png;base64,AAAA".into());
        doc
    }

    #[test]
    fn save_then_load_round_trips() {
        let tmp = temp_dir();
        let dir = tmp.path();
        let store = LocalStore::in_dir(dir);
        let doc = sample_document();

        store.save(&doc).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.source, "structured-file");
        assert_eq!(loaded.document, doc);
        assert!(!dir.join("classbook.json.saving").exists());
    }

    #[test]
    fn arbitrary_scores_survive_a_save() {
        let tmp = temp_dir();
        let store = LocalStore::in_dir(tmp.path());
        let date = NaiveDate::from_ymd_opt(2026, 11, 3).unwrap();
        let mut doc = Document::empty_for(date);
        let mut editor = DocumentEditor::new(&mut doc);
        let sid = editor
            .add_student(NewStudent {
                name: "Lina".into(),
                classes: vec!["7A".into()],
                ..NewStudent::default()
            })
            .unwrap();
        let tool = editor.add_assessment_tool("Lab", 20.0, 0.37).unwrap();
        for i in 1..=2000u32 {
            // Irrational step: full-width mantissas across [0, 20).
            let score = (f64::from(i) * 0.618_033_988_749_894_9).fract() * 20.0;
            editor
                .record_grade(&sid, &tool, score, date, Semester::First)
                .unwrap();
        }

        store.save(&doc).unwrap();
        let loaded = store.load().unwrap().document;
        let before: Vec<u64> = doc.students[0].grades.iter().map(|g| g.score.to_bits()).collect();
        let after: Vec<u64> = loaded.students[0].grades.iter().map(|g| g.score.to_bits()).collect();
        assert_eq!(before, after);
        assert_eq!(loaded.fingerprint(), doc.fingerprint());
    }

    #[test]
    fn save_overwrites_previous_version() {
        let tmp = temp_dir();
        let dir = tmp.path();
        let store = LocalStore::in_dir(dir);
        let mut doc = sample_document();
        store.save(&doc).unwrap();
        doc.classes.push("8B".into());
        store.save(&doc).unwrap();
        assert_eq!(store.load().unwrap().document.classes, doc.classes);
    }

    #[test]
    fn legacy_keys_are_used_when_no_structured_file() {
        let tmp = temp_dir();
        let dir = tmp.path();
        let legacy = DirKeyValueStore::new(dir.join(LEGACY_DIR));
        legacy.set("classes", r#"["6A"]"#).unwrap();
        legacy
            .set("students", r#"[{"id":"s1","name":"Omar","classes":["6A"]}]"#)
            .unwrap();

        let loaded = LocalStore::in_dir(dir).load().unwrap();
        assert_eq!(loaded.source, "legacy-keys");
        assert_eq!(loaded.document.classes, vec!["6A".to_string()]);
        assert_eq!(loaded.document.students[0].name, "Omar");
    }

    #[test]
    fn structured_file_wins_over_legacy_keys() {
        let tmp = temp_dir();
        let dir = tmp.path();
        DirKeyValueStore::new(dir.join(LEGACY_DIR))
            .set("classes", r#"["old"]"#)
            .unwrap();
        let store = LocalStore::in_dir(dir);
        let doc = sample_document();
        store.save(&doc).unwrap();
        assert_eq!(store.load().unwrap().document, doc);
    }

    #[test]
    fn corrupt_file_falls_through_to_nothing() {
        let tmp = temp_dir();
        let dir = tmp.path();
        std::fs::write(dir.join(STRUCTURED_FILE), "{\"students\": [").unwrap();
        assert!(LocalStore::in_dir(dir).load().is_none());
    }

    #[test]
    fn clear_wipes_both_sources() {
        let tmp = temp_dir();
        let dir = tmp.path();
        let store = LocalStore::in_dir(dir);
        store.save(&sample_document()).unwrap();
        DirKeyValueStore::new(dir.join(LEGACY_DIR))
            .set("classes", r#"["6A"]"#)
            .unwrap();
        store.clear().unwrap();
        assert!(store.load().is_none());
    }
}
