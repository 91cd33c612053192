//! Flat key-value storage from older app versions.
//!
//! Before the structured file existed, every top-level document field was
//! kept under its own key (`students`, `classes`, ...). On disk the dump is
//! one file per key. The values are JSON text, except `currentSemester`,
//! which older versions stored as a bare string.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::models::document::{Document, Semester};
use crate::services::local_store::DocumentLoader;

pub const LEGACY_KEYS: [&str; 10] = [
    "students",
    "classes",
    "hiddenClasses",
    "groups",
    "schedule",
    "periodTimes",
    "assessmentTools",
    "currentSemester",
    "teacherInfo",
    "certificateSettings",
];

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> std::io::Result<()>;
    fn remove(&self, key: &str) -> std::io::Result<()>;
}

/// One file per key inside a directory.
pub struct DirKeyValueStore {
    dir: PathBuf,
}

impl DirKeyValueStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl KeyValueStore for DirKeyValueStore {
    fn get(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.path_for(key)).ok()
    }

    fn set(&self, key: &str, value: &str) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path_for(key), value)
    }

    fn remove(&self, key: &str) -> std::io::Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> std::io::Result<()> {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> std::io::Result<()> {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
        Ok(())
    }
}

/// Assembles a [`Document`] from the individual legacy keys.
pub struct LegacyKeysLoader<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> LegacyKeysLoader<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn field<T: DeserializeOwned>(&self, key: &str, found: &mut bool) -> Option<T> {
        let raw = self.store.get(key)?;
        *found = true;
        match serde_json::from_str::<T>(&raw) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("Legacy key '{}' is unreadable, using default: {}", key, e);
                None
            }
        }
    }

    fn semester(&self, found: &mut bool) -> Option<Semester> {
        let raw = self.store.get("currentSemester")?;
        *found = true;
        // Either a JSON string ("\"2\""), a JSON number (2) or the bare text (2).
        let text = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::String(s)) => s,
            Ok(Value::Number(n)) => n.to_string(),
            _ => raw,
        };
        match text.parse() {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!("Legacy currentSemester is unreadable, using default: {}", e);
                None
            }
        }
    }
}

impl<S: KeyValueStore> DocumentLoader for LegacyKeysLoader<S> {
    fn name(&self) -> &'static str {
        "legacy-keys"
    }

    fn load(&self) -> Option<Document> {
        let mut found = false;
        let mut doc = Document::empty_today();

        if let Some(v) = self.field("students", &mut found) {
            doc.students = v;
        }
        if let Some(v) = self.field("classes", &mut found) {
            doc.classes = v;
        }
        if let Some(v) = self.field("hiddenClasses", &mut found) {
            doc.hidden_classes = v;
        }
        if let Some(v) = self.field("groups", &mut found) {
            doc.groups = v;
        }
        if let Some(v) = self.field("schedule", &mut found) {
            doc.schedule = v;
        }
        if let Some(v) = self.field("periodTimes", &mut found) {
            doc.period_times = v;
        }
        if let Some(v) = self.field("assessmentTools", &mut found) {
            doc.assessment_tools = v;
        }
        if let Some(v) = self.semester(&mut found) {
            doc.current_semester = v;
        }
        if let Some(v) = self.field("teacherInfo", &mut found) {
            doc.teacher_info = v;
        }
        if let Some(v) = self.field("certificateSettings", &mut found) {
            doc.certificate_settings = v;
        }

        found.then_some(doc)
    }

    fn clear(&self) -> std::io::Result<()> {
        for key in LEGACY_KEYS {
            self.store.remove(key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::student::AttendanceStatus;

    #[test]
    fn no_keys_means_nothing_to_load() {
        let loader = LegacyKeysLoader::new(MemoryKeyValueStore::default());
        assert!(loader.load().is_none());
    }

    #[test]
    fn fields_come_from_their_keys() {
        let store = MemoryKeyValueStore::default();
        store
            .set(
                "students",
                r#"[{"id":"17","name":"Mona","classes":["9B"],
                    "attendance":[{"date":"2025-11-02","status":"absent"}]}]"#,
            )
            .unwrap();
        store.set("classes", r#"["9B","9C"]"#).unwrap();
        store.set("hiddenClasses", r#"["9C"]"#).unwrap();
        store.set("currentSemester", "2").unwrap();
        store
            .set("teacherInfo", r#"{"name":"Mr. Saleh","school":"Al Noor"}"#)
            .unwrap();

        let doc = LegacyKeysLoader::new(store).load().unwrap();
        assert_eq!(doc.students.len(), 1);
        assert_eq!(doc.students[0].id, "17");
        assert_eq!(doc.students[0].attendance[0].status, AttendanceStatus::Absent);
        assert_eq!(doc.classes, vec!["9B".to_string(), "9C".to_string()]);
        assert_eq!(doc.hidden_classes, vec!["9C".to_string()]);
        assert_eq!(doc.current_semester, Semester::Second);
        assert_eq!(doc.teacher_info.name, "Mr. Saleh");
        assert_eq!(doc.teacher_info.school, "Al Noor");
    }

    #[test]
    fn quoted_semester_is_accepted() {
        let store = MemoryKeyValueStore::default();
        store.set("currentSemester", "\"2\"").unwrap();
        let doc = LegacyKeysLoader::new(store).load().unwrap();
        assert_eq!(doc.current_semester, Semester::Second);
    }

    #[test]
    fn a_corrupt_key_does_not_sink_the_rest() {
        let store = MemoryKeyValueStore::default();
        store.set("students", "[{not json").unwrap();
        store.set("classes", r#"["5A"]"#).unwrap();
        let doc = LegacyKeysLoader::new(store).load().unwrap();
        assert!(doc.students.is_empty());
        assert_eq!(doc.classes, vec!["5A".to_string()]);
    }

    #[test]
    fn clear_removes_every_key() {
        let store = MemoryKeyValueStore::default();
        store.set("classes", r#"["5A"]"#).unwrap();
        store.set("currentSemester", "1").unwrap();
        let loader = LegacyKeysLoader::new(store);
        loader.clear().unwrap();
        assert!(loader.load().is_none());
    }
}
