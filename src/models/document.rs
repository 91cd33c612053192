use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{
    assessment::AssessmentTool,
    group::Group,
    schedule::{PeriodTime, ScheduleDay},
    student::Student,
    teacher::{CertificateSettings, TeacherProfile},
};

/// Format version written into the structured file.
pub const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Semester {
    #[default]
    #[serde(rename = "1")]
    First,
    #[serde(rename = "2")]
    Second,
}

impl Semester {
    /// August through January is the first semester.
    pub fn for_date(date: NaiveDate) -> Self {
        match date.month() {
            8..=12 | 1 => Semester::First,
            _ => Semester::Second,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Semester::First => "1",
            Semester::Second => "2",
        }
    }
}

impl std::fmt::Display for Semester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Semester {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_matches('"') {
            "1" => Ok(Semester::First),
            "2" => Ok(Semester::Second),
            other => Err(anyhow::anyhow!("Unknown semester: {other}")),
        }
    }
}

/// Academic year label, e.g. "2026-2027" for any date from August 2026 to July 2027.
pub fn academic_year_for(date: NaiveDate) -> String {
    let start = if date.month() >= 8 {
        date.year()
    } else {
        date.year() - 1
    };
    format!("{}-{}", start, start + 1)
}

/// The whole application state. Persisted and synced as one unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Document {
    pub version: u32,
    pub students: Vec<Student>,
    pub classes: Vec<String>,
    pub hidden_classes: Vec<String>,
    pub groups: Vec<Group>,
    pub schedule: Vec<ScheduleDay>,
    pub period_times: Vec<PeriodTime>,
    pub assessment_tools: Vec<AssessmentTool>,
    pub current_semester: Semester,
    pub teacher_info: TeacherProfile,
    pub certificate_settings: CertificateSettings,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            students: Vec::new(),
            classes: Vec::new(),
            hidden_classes: Vec::new(),
            groups: Vec::new(),
            schedule: Vec::new(),
            period_times: Vec::new(),
            assessment_tools: Vec::new(),
            current_semester: Semester::default(),
            teacher_info: TeacherProfile::default(),
            certificate_settings: CertificateSettings::default(),
        }
    }
}

impl Document {
    /// Empty first-run document for the given day.
    pub fn empty_for(today: NaiveDate) -> Self {
        let mut doc = Self {
            current_semester: Semester::for_date(today),
            ..Self::default()
        };
        doc.teacher_info.academic_year = academic_year_for(today);
        doc
    }

    pub fn empty_today() -> Self {
        Self::empty_for(Local::now().date_naive())
    }

    pub fn student(&self, id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == id)
    }

    pub fn tool(&self, id: &str) -> Option<&AssessmentTool> {
        self.assessment_tools.iter().find(|t| t.id == id)
    }

    pub fn students_in<'a>(&'a self, class: &'a str) -> impl Iterator<Item = &'a Student> + 'a {
        self.students.iter().filter(move |s| s.in_class(class))
    }

    pub fn visible_classes(&self) -> impl Iterator<Item = &String> {
        self.classes
            .iter()
            .filter(|c| !self.hidden_classes.contains(c))
    }

    /// SHA-256 over the serialized document, hex encoded.
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn empty_document_follows_the_calendar() {
        let autumn = Document::empty_for(day(2026, 10, 19));
        assert!(autumn.students.is_empty());
        assert_eq!(autumn.current_semester, Semester::First);
        assert_eq!(autumn.teacher_info.academic_year, "2026-2027");

        let spring = Document::empty_for(day(2027, 3, 2));
        assert_eq!(spring.current_semester, Semester::Second);
        assert_eq!(spring.teacher_info.academic_year, "2026-2027");

        let january = Document::empty_for(day(2027, 1, 10));
        assert_eq!(january.current_semester, Semester::First);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let doc: Document = serde_json::from_str(r#"{"classes":["7A"]}"#).unwrap();
        assert_eq!(doc.classes, vec!["7A".to_string()]);
        assert!(doc.students.is_empty());
        assert_eq!(doc.version, DOCUMENT_VERSION);
        assert_eq!(doc.current_semester, Semester::First);
    }

    #[test]
    fn top_level_keys_are_camel_case() {
        let value = serde_json::to_value(Document::default()).unwrap();
        for key in [
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
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["currentSemester"], "1");
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = Document::empty_for(day(2026, 9, 1));
        let mut b = a.clone();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.classes.push("7A".into());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
