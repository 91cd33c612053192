use serde::{Deserialize, Serialize};

/// A named subset of students, e.g. a project team or a seating row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub student_ids: Vec<String>,
}
