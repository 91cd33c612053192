use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use super::{
    assessment::AssessmentTool,
    document::{Document, Semester},
    group::Group,
    schedule::{PeriodTime, ScheduleDay},
    student::{
        new_record_id, AttendanceRecord, AttendanceStatus, BehaviorKind, BehaviorRecord,
        GradeRecord, NewStudent, Student, StudentProfileUpdate,
    },
    teacher::{CertificateSettings, TeacherProfile},
};

#[derive(Debug, Error, PartialEq)]
pub enum DocumentError {
    #[error("student {0} not found")]
    StudentNotFound(String),
    #[error("record {0} not found")]
    RecordNotFound(String),
    #[error("name must not be empty")]
    EmptyName,
    #[error("a student needs at least one class")]
    NoClasses,
    #[error("assessment tool {0} not found")]
    UnknownTool(String),
    #[error("score {score} is outside 0..={max}")]
    ScoreOutOfRange { score: f64, max: f64 },
    #[error("class {0} still has students")]
    ClassInUse(String),
    #[error("class {0} already exists")]
    DuplicateClass(String),
    #[error("assessment tool {0} still has grades")]
    ToolInUse(String),
    #[error("group {0} not found")]
    GroupNotFound(String),
}

/// Intent-level write access to a [`Document`].
///
/// Historical records are append-only: they can be added or deleted by id,
/// never edited in place.
pub struct DocumentEditor<'a> {
    doc: &'a mut Document,
}

impl<'a> DocumentEditor<'a> {
    pub fn new(doc: &'a mut Document) -> Self {
        Self { doc }
    }

    pub fn document(&self) -> &Document {
        self.doc
    }

    // ----- students -----

    pub fn add_student(&mut self, new: NewStudent) -> Result<String, DocumentError> {
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(DocumentError::EmptyName);
        }
        let classes = clean_labels(new.classes);
        if classes.is_empty() {
            return Err(DocumentError::NoClasses);
        }
        for class in &classes {
            self.register_class(class);
        }

        let mut id = Uuid::new_v4().to_string();
        while self.doc.student(&id).is_some() {
            id = Uuid::new_v4().to_string();
        }

        self.doc.students.push(Student {
            id: id.clone(),
            name,
            classes,
            grade: new.grade.filter(|g| !g.trim().is_empty()),
            parent_phone: new.parent_phone.filter(|p| !p.trim().is_empty()),
            gender: new.gender,
            attendance: Vec::new(),
            behaviors: Vec::new(),
            grades: Vec::new(),
        });
        Ok(id)
    }

    pub fn delete_student(&mut self, id: &str) -> Result<Student, DocumentError> {
        let idx = self
            .doc
            .students
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| DocumentError::StudentNotFound(id.to_string()))?;
        for group in &mut self.doc.groups {
            group.student_ids.retain(|sid| sid != id);
        }
        Ok(self.doc.students.remove(idx))
    }

    pub fn update_student_profile(
        &mut self,
        id: &str,
        update: StudentProfileUpdate,
    ) -> Result<(), DocumentError> {
        let classes = match update.classes {
            Some(classes) => {
                let classes = clean_labels(classes);
                if classes.is_empty() {
                    return Err(DocumentError::NoClasses);
                }
                Some(classes)
            }
            None => None,
        };
        let name = match update.name {
            Some(name) if name.trim().is_empty() => return Err(DocumentError::EmptyName),
            Some(name) => Some(name.trim().to_string()),
            None => None,
        };
        if let Some(classes) = &classes {
            for class in classes {
                self.register_class(class);
            }
        }

        let student = self.student_mut(id)?;
        if let Some(name) = name {
            student.name = name;
        }
        if let Some(classes) = classes {
            student.classes = classes;
        }
        if let Some(grade) = update.grade {
            student.grade = grade.filter(|g| !g.trim().is_empty());
        }
        if let Some(phone) = update.parent_phone {
            student.parent_phone = phone.filter(|p| !p.trim().is_empty());
        }
        if let Some(gender) = update.gender {
            student.gender = gender;
        }
        Ok(())
    }

    // ----- records -----

    pub fn record_attendance(
        &mut self,
        student_id: &str,
        date: NaiveDate,
        status: AttendanceStatus,
        period: Option<u8>,
        note: Option<String>,
    ) -> Result<String, DocumentError> {
        let id = new_record_id();
        self.student_mut(student_id)?
            .attendance
            .push(AttendanceRecord {
                id: id.clone(),
                date,
                status,
                period,
                note: note.filter(|n| !n.trim().is_empty()),
            });
        Ok(id)
    }

    pub fn record_behavior(
        &mut self,
        student_id: &str,
        date: NaiveDate,
        kind: BehaviorKind,
        description: &str,
        period: Option<u8>,
        points: i32,
    ) -> Result<String, DocumentError> {
        let id = new_record_id();
        self.student_mut(student_id)?.behaviors.push(BehaviorRecord {
            id: id.clone(),
            date,
            kind,
            description: description.trim().to_string(),
            period,
            points,
        });
        Ok(id)
    }

    pub fn record_grade(
        &mut self,
        student_id: &str,
        tool_id: &str,
        score: f64,
        date: NaiveDate,
        semester: Semester,
    ) -> Result<String, DocumentError> {
        let max = self
            .doc
            .tool(tool_id)
            .map(|t| t.max_score)
            .ok_or_else(|| DocumentError::UnknownTool(tool_id.to_string()))?;
        if !score.is_finite() || score < 0.0 || score > max {
            return Err(DocumentError::ScoreOutOfRange { score, max });
        }
        let id = new_record_id();
        self.student_mut(student_id)?.grades.push(GradeRecord {
            id: id.clone(),
            tool_id: tool_id.to_string(),
            score,
            date,
            semester,
        });
        Ok(id)
    }

    pub fn delete_attendance(&mut self, student_id: &str, record_id: &str) -> Result<(), DocumentError> {
        let student = self.student_mut(student_id)?;
        remove_by_id(&mut student.attendance, record_id, |r| &r.id)
    }

    pub fn delete_behavior(&mut self, student_id: &str, record_id: &str) -> Result<(), DocumentError> {
        let student = self.student_mut(student_id)?;
        remove_by_id(&mut student.behaviors, record_id, |r| &r.id)
    }

    pub fn delete_grade(&mut self, student_id: &str, record_id: &str) -> Result<(), DocumentError> {
        let student = self.student_mut(student_id)?;
        remove_by_id(&mut student.grades, record_id, |r| &r.id)
    }

    // ----- classes -----

    pub fn add_class(&mut self, label: &str) -> Result<(), DocumentError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(DocumentError::EmptyName);
        }
        if self.doc.classes.iter().any(|c| c == label) {
            return Err(DocumentError::DuplicateClass(label.to_string()));
        }
        self.doc.classes.push(label.to_string());
        Ok(())
    }

    pub fn remove_class(&mut self, label: &str) -> Result<(), DocumentError> {
        if self.doc.students.iter().any(|s| s.in_class(label)) {
            return Err(DocumentError::ClassInUse(label.to_string()));
        }
        self.doc.classes.retain(|c| c != label);
        self.doc.hidden_classes.retain(|c| c != label);
        Ok(())
    }

    pub fn set_class_hidden(&mut self, label: &str, hidden: bool) {
        let already = self.doc.hidden_classes.iter().any(|c| c == label);
        if hidden && !already {
            self.doc.hidden_classes.push(label.to_string());
        } else if !hidden {
            self.doc.hidden_classes.retain(|c| c != label);
        }
    }

    // ----- assessment tools -----

    pub fn add_assessment_tool(
        &mut self,
        name: &str,
        max_score: f64,
        weight: f64,
    ) -> Result<String, DocumentError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DocumentError::EmptyName);
        }
        if !(max_score.is_finite() && max_score > 0.0) {
            return Err(DocumentError::ScoreOutOfRange {
                score: max_score,
                max: f64::INFINITY,
            });
        }
        let id = new_record_id();
        self.doc.assessment_tools.push(AssessmentTool {
            id: id.clone(),
            name: name.to_string(),
            max_score,
            weight: if weight.is_finite() && weight >= 0.0 { weight } else { 1.0 },
        });
        Ok(id)
    }

    pub fn delete_assessment_tool(&mut self, id: &str) -> Result<(), DocumentError> {
        if self
            .doc
            .students
            .iter()
            .any(|s| s.grades.iter().any(|g| g.tool_id == id))
        {
            return Err(DocumentError::ToolInUse(id.to_string()));
        }
        remove_by_id(&mut self.doc.assessment_tools, id, |t| &t.id)
    }

    // ----- groups -----

    pub fn add_group(&mut self, name: &str) -> Result<String, DocumentError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DocumentError::EmptyName);
        }
        let id = new_record_id();
        self.doc.groups.push(Group {
            id: id.clone(),
            name: name.to_string(),
            student_ids: Vec::new(),
        });
        Ok(id)
    }

    pub fn delete_group(&mut self, id: &str) -> Result<(), DocumentError> {
        let before = self.doc.groups.len();
        self.doc.groups.retain(|g| g.id != id);
        if self.doc.groups.len() == before {
            return Err(DocumentError::GroupNotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn set_group_members(&mut self, id: &str, student_ids: Vec<String>) -> Result<(), DocumentError> {
        if let Some(missing) = student_ids.iter().find(|sid| self.doc.student(sid).is_none()) {
            return Err(DocumentError::StudentNotFound(missing.clone()));
        }
        let group = self
            .doc
            .groups
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or_else(|| DocumentError::GroupNotFound(id.to_string()))?;
        group.student_ids = student_ids;
        Ok(())
    }

    // ----- settings -----

    pub fn set_current_semester(&mut self, semester: Semester) {
        self.doc.current_semester = semester;
    }

    pub fn update_teacher_info(&mut self, info: TeacherProfile) {
        self.doc.teacher_info = info;
    }

    pub fn update_certificate_settings(&mut self, settings: CertificateSettings) {
        self.doc.certificate_settings = settings;
    }

    pub fn set_schedule(&mut self, schedule: Vec<ScheduleDay>) {
        self.doc.schedule = schedule;
    }

    pub fn set_period_times(&mut self, times: Vec<PeriodTime>) {
        self.doc.period_times = times;
    }

    fn student_mut(&mut self, id: &str) -> Result<&mut Student, DocumentError> {
        self.doc
            .students
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| DocumentError::StudentNotFound(id.to_string()))
    }

    fn register_class(&mut self, label: &str) {
        if !self.doc.classes.iter().any(|c| c == label) {
            self.doc.classes.push(label.to_string());
        }
    }
}

fn clean_labels(labels: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(labels.len());
    for label in labels {
        let label = label.trim().to_string();
        if !label.is_empty() && !out.contains(&label) {
            out.push(label);
        }
    }
    out
}

fn remove_by_id<T>(items: &mut Vec<T>, id: &str, key: impl Fn(&T) -> &String) -> Result<(), DocumentError> {
    let idx = items
        .iter()
        .position(|item| key(item) == id)
        .ok_or_else(|| DocumentError::RecordNotFound(id.to_string()))?;
    items.remove(idx);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::schedule::ScheduledPeriod;
    use crate::models::student::Gender;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn ahmed() -> NewStudent {
        NewStudent {
            name: "Ahmed".into(),
            classes: vec!["7A".into()],
            ..NewStudent::default()
        }
    }

    #[test]
    fn add_then_delete_student_restores_the_roster() {
        let mut doc = Document::default();
        let mut editor = DocumentEditor::new(&mut doc);
        let other = editor.add_student(NewStudent {
            name: "Sara".into(),
            classes: vec!["7B".into()],
            ..NewStudent::default()
        });
        let other = other.unwrap();
        let before = editor.document().students.len();

        let id = editor.add_student(ahmed()).unwrap();
        assert_eq!(editor.document().students.len(), before + 1);
        let added = editor.document().student(&id).unwrap();
        assert!(added.attendance.is_empty());
        assert!(added.behaviors.is_empty());
        assert!(added.grades.is_empty());
        assert!(added.parent_phone.is_none());
        assert_ne!(id, other);

        let removed = editor.delete_student(&id).unwrap();
        assert_eq!(removed.id, id);
        assert_eq!(editor.document().students.len(), before);
        assert!(editor.document().student(&id).is_none());
        assert!(editor.document().student(&other).is_some());
    }

    #[test]
    fn add_student_requires_name_and_class() {
        let mut doc = Document::default();
        let mut editor = DocumentEditor::new(&mut doc);
        let no_class = editor.add_student(NewStudent {
            name: "Ahmed".into(),
            classes: vec!["  ".into()],
            ..NewStudent::default()
        });
        assert_eq!(no_class, Err(DocumentError::NoClasses));
        let no_name = editor.add_student(NewStudent {
            name: " ".into(),
            classes: vec!["7A".into()],
            ..NewStudent::default()
        });
        assert_eq!(no_name, Err(DocumentError::EmptyName));
        assert!(doc.students.is_empty());
    }

    #[test]
    fn adding_a_student_registers_the_class() {
        let mut doc = Document::default();
        DocumentEditor::new(&mut doc).add_student(ahmed()).unwrap();
        assert_eq!(doc.classes, vec!["7A".to_string()]);
    }

    #[test]
    fn records_append_and_delete_by_id() {
        let mut doc = Document::default();
        let mut editor = DocumentEditor::new(&mut doc);
        let sid = editor.add_student(ahmed()).unwrap();
        let first = editor
            .record_attendance(&sid, day(1), AttendanceStatus::Absent, Some(2), None)
            .unwrap();
        let second = editor
            .record_attendance(&sid, day(2), AttendanceStatus::Present, None, None)
            .unwrap();
        editor.delete_attendance(&sid, &first).unwrap();

        let student = doc.student(&sid).unwrap();
        assert_eq!(student.attendance.len(), 1);
        assert_eq!(student.attendance[0].id, second);
        assert_eq!(student.attendance[0].date, day(2));
    }

    #[test]
    fn deleting_unknown_record_is_an_error() {
        let mut doc = Document::default();
        let mut editor = DocumentEditor::new(&mut doc);
        let sid = editor.add_student(ahmed()).unwrap();
        assert_eq!(
            editor.delete_behavior(&sid, "nope"),
            Err(DocumentError::RecordNotFound("nope".into()))
        );
        assert_eq!(
            editor.delete_grade("ghost", "nope"),
            Err(DocumentError::StudentNotFound("ghost".into()))
        );
    }

    #[test]
    fn grades_are_checked_against_the_tool() {
        let mut doc = Document::default();
        let mut editor = DocumentEditor::new(&mut doc);
        let sid = editor.add_student(ahmed()).unwrap();
        let quiz = editor.add_assessment_tool("Quiz", 10.0, 1.0).unwrap();

        assert!(matches!(
            editor.record_grade(&sid, &quiz, 11.0, day(3), Semester::First),
            Err(DocumentError::ScoreOutOfRange { .. })
        ));
        assert_eq!(
            editor.record_grade(&sid, "missing", 5.0, day(3), Semester::First),
            Err(DocumentError::UnknownTool("missing".into()))
        );
        editor
            .record_grade(&sid, &quiz, 7.5, day(3), Semester::First)
            .unwrap();
        assert_eq!(
            editor.delete_assessment_tool(&quiz),
            Err(DocumentError::ToolInUse(quiz.clone()))
        );
    }

    #[test]
    fn classes_in_use_cannot_be_removed() {
        let mut doc = Document::default();
        let mut editor = DocumentEditor::new(&mut doc);
        editor.add_student(ahmed()).unwrap();
        assert_eq!(
            editor.remove_class("7A"),
            Err(DocumentError::ClassInUse("7A".into()))
        );
        editor.add_class("8C").unwrap();
        editor.set_class_hidden("8C", true);
        editor.set_class_hidden("8C", true);
        assert_eq!(editor.document().hidden_classes, vec!["8C".to_string()]);
        editor.remove_class("8C").unwrap();
        assert!(editor.document().hidden_classes.is_empty());
        assert_eq!(editor.add_class("7A"), Err(DocumentError::DuplicateClass("7A".into())));
    }

    #[test]
    fn deleting_a_student_drops_group_membership() {
        let mut doc = Document::default();
        let mut editor = DocumentEditor::new(&mut doc);
        let sid = editor.add_student(ahmed()).unwrap();
        let group = editor.add_group("Robotics").unwrap();
        editor.set_group_members(&group, vec![sid.clone()]).unwrap();
        editor.delete_student(&sid).unwrap();
        assert!(doc.groups[0].student_ids.is_empty());
    }

    #[test]
    fn profile_update_keeps_records() {
        let mut doc = Document::default();
        let mut editor = DocumentEditor::new(&mut doc);
        let sid = editor.add_student(ahmed()).unwrap();
        editor
            .record_behavior(&sid, day(5), BehaviorKind::Positive, "helped a peer", None, 2)
            .unwrap();
        editor
            .update_student_profile(
                &sid,
                StudentProfileUpdate {
                    name: Some("Ahmed Ali".into()),
                    parent_phone: Some(Some("0790000000".into())),
                    ..StudentProfileUpdate::default()
                },
            )
            .unwrap();
        let student = doc.student(&sid).unwrap();
        assert_eq!(student.name, "Ahmed Ali");
        assert_eq!(student.behaviors.len(), 1);
        assert_eq!(student.id, sid);
    }

    #[test]
    fn profile_update_can_clear_optional_fields() {
        let mut doc = Document::default();
        let mut editor = DocumentEditor::new(&mut doc);
        let sid = editor
            .add_student(NewStudent {
                grade: Some("7".into()),
                parent_phone: Some("0791234567".into()),
                gender: Some(Gender::Male),
                ..ahmed()
            })
            .unwrap();

        let update: StudentProfileUpdate =
            serde_json::from_str(r#"{"parentPhone": null, "gender": null}"#).unwrap();
        assert_eq!(update.parent_phone, Some(None));
        assert_eq!(update.grade, None);
        editor.update_student_profile(&sid, update).unwrap();

        let student = doc.student(&sid).unwrap();
        assert_eq!(student.grade.as_deref(), Some("7"));
        assert!(student.parent_phone.is_none());
        assert!(student.gender.is_none());
    }

    #[test]
    fn deleting_a_group_leaves_students_alone() {
        let mut doc = Document::default();
        let mut editor = DocumentEditor::new(&mut doc);
        let sid = editor.add_student(ahmed()).unwrap();
        let group = editor.add_group("Robotics").unwrap();
        editor.set_group_members(&group, vec![sid.clone()]).unwrap();

        editor.delete_group(&group).unwrap();
        assert_eq!(
            editor.delete_group(&group),
            Err(DocumentError::GroupNotFound(group.clone()))
        );
        assert!(doc.groups.is_empty());
        assert!(doc.student(&sid).is_some());
    }

    #[test]
    fn settings_replace_their_section() {
        let mut doc = Document::empty_for(day(1));
        let mut editor = DocumentEditor::new(&mut doc);
        editor.set_current_semester(Semester::Second);
        editor.update_teacher_info(TeacherProfile {
            name: "Ms. Huda".into(),
            school: "Al-Noor".into(),
            academic_year: "2026-2027".into(),
            ..TeacherProfile::default()
        });
        editor.update_certificate_settings(CertificateSettings {
            show_stamp: false,
            ..CertificateSettings::default()
        });
        editor.set_schedule(vec![ScheduleDay {
            day: "sunday".into(),
            periods: vec![ScheduledPeriod {
                period: 1,
                class_name: "7A".into(),
                subject: Some("Math".into()),
            }],
        }]);
        editor.set_period_times(vec![PeriodTime {
            period: 1,
            start: "08:00".into(),
            end: "08:45".into(),
        }]);

        assert_eq!(doc.current_semester, Semester::Second);
        assert_eq!(doc.teacher_info.school, "Al-Noor");
        assert!(!doc.certificate_settings.show_stamp);
        assert_eq!(doc.schedule[0].periods[0].class_name, "7A");
        assert_eq!(doc.period_times[0].end, "08:45");
        // Untouched sections keep their values.
        assert!(doc.students.is_empty());
    }
}
