use std::collections::HashMap;

use serde::Serialize;

use crate::models::document::{Document, Semester};
use crate::models::student::{AttendanceStatus, GradeRecord, Student};

/// Turns the current document into bytes for a print/share collaborator.
pub trait Renderer {
    fn render(&self, doc: &Document) -> anyhow::Result<Vec<u8>>;
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub student_id: String,
    pub name: String,
    pub present: u32,
    pub absent: u32,
    pub late: u32,
    pub excused: u32,
    pub behavior_points: i32,
    /// Weighted percentage over the tools that have a score; `None` if ungraded.
    pub grade_percent: Option<f64>,
}

fn latest_per_tool<'a>(grades: &'a [GradeRecord], semester: Semester) -> HashMap<&'a str, &'a GradeRecord> {
    let mut latest: HashMap<&str, &GradeRecord> = HashMap::new();
    for g in grades.iter().filter(|g| g.semester == semester) {
        match latest.get(g.tool_id.as_str()) {
            Some(prev) if prev.date > g.date => {}
            _ => {
                latest.insert(g.tool_id.as_str(), g);
            }
        }
    }
    latest
}

fn weighted_percent(doc: &Document, student: &Student, semester: Semester) -> Option<f64> {
    let mut earned = 0.0;
    let mut weights = 0.0;
    for (tool_id, grade) in latest_per_tool(&student.grades, semester) {
        // Grades for deleted tools carry no weight.
        let Some(tool) = doc.tool(tool_id) else { continue };
        if tool.max_score <= 0.0 {
            continue;
        }
        earned += grade.score / tool.max_score * tool.weight;
        weights += tool.weight;
    }
    (weights > 0.0).then(|| earned / weights * 100.0)
}

pub fn summarize(doc: &Document, student: &Student, semester: Semester) -> StudentSummary {
    let mut summary = StudentSummary {
        student_id: student.id.clone(),
        name: student.name.clone(),
        present: 0,
        absent: 0,
        late: 0,
        excused: 0,
        behavior_points: student.behaviors.iter().map(|b| b.points).sum(),
        grade_percent: weighted_percent(doc, student, semester),
    };
    for record in &student.attendance {
        match record.status {
            AttendanceStatus::Present => summary.present += 1,
            AttendanceStatus::Absent => summary.absent += 1,
            AttendanceStatus::Late => summary.late += 1,
            AttendanceStatus::Excused => summary.excused += 1,
        }
    }
    summary
}

/// One row per student in `class`, sorted by name.
pub fn student_summaries(doc: &Document, class: &str, semester: Semester) -> Vec<StudentSummary> {
    let mut rows: Vec<StudentSummary> = doc
        .students_in(class)
        .map(|s| summarize(doc, s, semester))
        .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));
    rows
}

/// Grade sheet for one class and semester as CSV.
pub struct CsvGradeSheet {
    pub class: String,
    pub semester: Semester,
}

impl Renderer for CsvGradeSheet {
    fn render(&self, doc: &Document) -> anyhow::Result<Vec<u8>> {
        let mut out = csv::Writer::from_writer(Vec::new());

        let mut header = vec!["Name".to_string()];
        header.extend(doc.assessment_tools.iter().map(|t| format!("{} (/{})", t.name, t.max_score)));
        header.extend(
            ["Weighted %", "Present", "Absent", "Late", "Excused", "Behavior"]
                .iter()
                .map(|s| s.to_string()),
        );
        out.write_record(&header)?;

        for row in student_summaries(doc, &self.class, self.semester) {
            let Some(student) = doc.student(&row.student_id) else { continue };
            let latest = latest_per_tool(&student.grades, self.semester);

            let mut record = vec![row.name.clone()];
            for tool in &doc.assessment_tools {
                record.push(
                    latest
                        .get(tool.id.as_str())
                        .map(|g| g.score.to_string())
                        .unwrap_or_default(),
                );
            }
            record.push(row.grade_percent.map(|p| format!("{p:.1}")).unwrap_or_default());
            record.push(row.present.to_string());
            record.push(row.absent.to_string());
            record.push(row.late.to_string());
            record.push(row.excused.to_string());
            record.push(row.behavior_points.to_string());
            out.write_record(&record)?;
        }

        out.flush()?;
        out.into_inner()
            .map_err(|e| anyhow::anyhow!("csv flush failed: {}", e))
    }
}
