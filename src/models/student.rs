use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::Semester;

pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

impl std::str::FromStr for Gender {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "male" | "m" => Ok(Gender::Male),
            "female" | "f" => Ok(Gender::Female),
            _ => Err(anyhow::anyhow!("Unknown gender: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub attendance: Vec<AttendanceRecord>,
    #[serde(default)]
    pub behaviors: Vec<BehaviorRecord>,
    #[serde(default)]
    pub grades: Vec<GradeRecord>,
}

impl Student {
    pub fn in_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }
}

/// Input for creating a student. The id is assigned on insert.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub name: String,
    pub classes: Vec<String>,
    pub grade: Option<String>,
    pub parent_phone: Option<String>,
    pub gender: Option<Gender>,
}

/// Profile fields that may change after creation. `None` leaves a field as
/// is; for the optional fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfileUpdate {
    pub name: Option<String>,
    pub classes: Option<Vec<String>>,
    #[serde(default, deserialize_with = "present_or_null")]
    pub grade: Option<Option<String>>,
    #[serde(default, deserialize_with = "present_or_null")]
    pub parent_phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "present_or_null")]
    pub gender: Option<Option<Gender>>,
}

/// A key that is present maps to `Some`, even when its value is `null`.
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

impl std::str::FromStr for AttendanceStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            "late" => Ok(AttendanceStatus::Late),
            "excused" => Ok(AttendanceStatus::Excused),
            _ => Err(anyhow::anyhow!("Unknown attendance status: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    #[serde(default = "new_record_id")]
    pub id: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorKind {
    Positive,
    Negative,
}

impl std::str::FromStr for BehaviorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positive" | "+" => Ok(BehaviorKind::Positive),
            "negative" | "-" => Ok(BehaviorKind::Negative),
            _ => Err(anyhow::anyhow!("Unknown behavior type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorRecord {
    #[serde(default = "new_record_id")]
    pub id: String,
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub kind: BehaviorKind,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<u8>,
    #[serde(default)]
    pub points: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GradeRecord {
    #[serde(default = "new_record_id")]
    pub id: String,
    pub tool_id: String,
    pub score: f64,
    pub date: NaiveDate,
    pub semester: Semester,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn behavior_kind_serializes_under_type_key() {
        let record = BehaviorRecord {
            id: "b1".into(),
            date: NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
            kind: BehaviorKind::Negative,
            description: "talking".into(),
            period: Some(3),
            points: -1,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "negative");
        assert_eq!(value["date"], "2026-10-01");
    }

    #[test]
    fn records_without_ids_get_fresh_ones() {
        let a: AttendanceRecord =
            serde_json::from_str(r#"{"date":"2026-09-14","status":"late"}"#).unwrap();
        let b: AttendanceRecord =
            serde_json::from_str(r#"{"date":"2026-09-14","status":"late"}"#).unwrap();
        assert!(!a.id.is_empty());
        assert_ne!(a.id, b.id);
        assert_eq!(a.status, AttendanceStatus::Late);
    }
}
