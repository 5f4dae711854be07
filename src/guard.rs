use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::models::{midnight_utc, AttendanceStatus, Shift, StudentRecord, Teacher};
use crate::session::User;

/// Attendance form state before submission.
#[derive(Debug, Clone, Default)]
pub struct SubmissionDraft {
    pub class_id: Option<String>,
    pub teacher_id: Option<String>,
    pub date: NaiveDate,
    pub marks: HashMap<String, AttendanceStatus>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("Please select both class and teacher")]
    MissingSelection,
    #[error("Only the teacher assigned to this class can take attendance")]
    TeacherNotAssigned,
    #[error("You can only mark attendance for your assigned class")]
    NotOwnClass,
    #[error("You can only mark attendance as yourself")]
    NotSelf,
    #[error("Please mark attendance for at least one student")]
    NothingMarked,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayloadEntry {
    #[serde(rename = "studentName")]
    pub student_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shift: Option<Shift>,
    pub status: AttendanceStatus,
    pub date: DateTime<Utc>,
}

/// Full-session body for create and update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendancePayload {
    #[serde(rename = "classId")]
    pub class_id: String,
    #[serde(rename = "teacherName")]
    pub teacher_id: String,
    pub students: Vec<PayloadEntry>,
}

impl AttendancePayload {
    pub fn count(&self, status: AttendanceStatus) -> usize {
        self.students.iter().filter(|s| s.status == status).count()
    }
}

/// First rule on its own: it needs no roster, so callers run it before
/// fetching anything.
pub fn require_selection<'a>(
    class_id: Option<&'a str>,
    teacher_id: Option<&'a str>,
) -> Result<(&'a str, &'a str), SubmissionError> {
    match (
        class_id.filter(|id| !id.is_empty()),
        teacher_id.filter(|id| !id.is_empty()),
    ) {
        (Some(class_id), Some(teacher_id)) => Ok((class_id, teacher_id)),
        _ => Err(SubmissionError::MissingSelection),
    }
}

/// Runs every local rule and builds the payload. Every enrolled student of
/// the class is included; anyone not explicitly marked goes in as Absent.
pub fn prepare_submission(
    draft: &SubmissionDraft,
    submitter: &User,
    teachers: &[Teacher],
    students: &[StudentRecord],
) -> Result<AttendancePayload, SubmissionError> {
    let (class_id, teacher_id) =
        require_selection(draft.class_id.as_deref(), draft.teacher_id.as_deref())?;

    let assigned = teachers
        .iter()
        .any(|teacher| teacher.id == teacher_id && teacher.teaches(class_id));
    if !assigned {
        return Err(SubmissionError::TeacherNotAssigned);
    }

    if submitter.is_teacher() {
        if submitter.class_id().is_some_and(|own| own != class_id) {
            return Err(SubmissionError::NotOwnClass);
        }
        if submitter.teacher_id().is_some_and(|own| own != teacher_id) {
            return Err(SubmissionError::NotSelf);
        }
    }

    if draft.marks.is_empty() {
        return Err(SubmissionError::NothingMarked);
    }

    let date = midnight_utc(draft.date);
    let students = students
        .iter()
        .filter(|student| student.in_class(class_id))
        .map(|student| PayloadEntry {
            student_id: student.id.clone(),
            shift: student.shift,
            status: draft
                .marks
                .get(&student.id)
                .copied()
                .unwrap_or(AttendanceStatus::Absent),
            date,
        })
        .collect();

    Ok(AttendancePayload {
        class_id: class_id.to_string(),
        teacher_id: teacher_id.to_string(),
        students,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Part, Ref};
    use crate::session::Role;

    fn teacher(id: &str, class_id: Option<&str>) -> Teacher {
        Teacher {
            id: id.to_string(),
            full_name: format!("Teacher {id}"),
            email: String::new(),
            phone: String::new(),
            class: class_id.map(|c| Ref::Id(c.to_string())),
        }
    }

    fn student(id: &str, class_id: &str) -> StudentRecord {
        StudentRecord {
            id: id.to_string(),
            full_name: format!("Student {id}"),
            class: Some(Ref::Id(class_id.to_string())),
            shift: Some(Shift::Morning),
            part: Part::None,
            phone: String::new(),
            emergency_phone: String::new(),
        }
    }

    fn user(role: Role, class_id: Option<&str>, teacher_id: Option<&str>) -> User {
        User {
            id: "u1".into(),
            name: "Someone".into(),
            email: String::new(),
            role,
            class: class_id.map(|c| Ref::Id(c.to_string())),
            teacher: teacher_id.map(|t| Ref::Id(t.to_string())),
        }
    }

    fn roster() -> (Vec<Teacher>, Vec<StudentRecord>) {
        (
            vec![teacher("t1", Some("c1")), teacher("t2", Some("c2"))],
            vec![student("s1", "c1"), student("s2", "c1"), student("s3", "c2")],
        )
    }

    fn draft(class_id: Option<&str>, teacher_id: Option<&str>) -> SubmissionDraft {
        SubmissionDraft {
            class_id: class_id.map(str::to_string),
            teacher_id: teacher_id.map(str::to_string),
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            marks: HashMap::from([("s1".to_string(), AttendanceStatus::Present)]),
        }
    }

    #[test]
    fn requires_class_and_teacher() {
        let (teachers, students) = roster();
        let admin = user(Role::Admin, None, None);
        assert_eq!(
            prepare_submission(&draft(None, Some("t1")), &admin, &teachers, &students),
            Err(SubmissionError::MissingSelection)
        );
        assert_eq!(
            prepare_submission(&draft(Some("c1"), None), &admin, &teachers, &students),
            Err(SubmissionError::MissingSelection)
        );
        assert_eq!(
            prepare_submission(&draft(Some(""), Some("t1")), &admin, &teachers, &students),
            Err(SubmissionError::MissingSelection)
        );
    }

    #[test]
    fn selection_is_checked_without_a_roster() {
        assert_eq!(require_selection(Some("c1"), Some("t1")), Ok(("c1", "t1")));
        assert_eq!(
            require_selection(None, Some("t1")),
            Err(SubmissionError::MissingSelection)
        );
        assert_eq!(
            require_selection(Some("c1"), Some("")),
            Err(SubmissionError::MissingSelection)
        );
    }

    #[test]
    fn teacher_must_be_assigned_to_class() {
        let (teachers, students) = roster();
        let admin = user(Role::Admin, None, None);
        assert_eq!(
            prepare_submission(&draft(Some("c1"), Some("t2")), &admin, &teachers, &students),
            Err(SubmissionError::TeacherNotAssigned)
        );
        assert_eq!(
            prepare_submission(&draft(Some("c1"), Some("ghost")), &admin, &teachers, &students),
            Err(SubmissionError::TeacherNotAssigned)
        );
    }

    #[test]
    fn teacher_role_limited_to_own_class_and_self() {
        let (mut teachers, students) = roster();
        let t1 = user(Role::Teacher, Some("c1"), Some("t1"));
        assert_eq!(
            prepare_submission(&draft(Some("c2"), Some("t2")), &t1, &teachers, &students),
            Err(SubmissionError::NotOwnClass)
        );

        teachers.push(teacher("t3", Some("c1")));
        assert_eq!(
            prepare_submission(&draft(Some("c1"), Some("t3")), &t1, &teachers, &students),
            Err(SubmissionError::NotSelf)
        );
        assert!(prepare_submission(&draft(Some("c1"), Some("t1")), &t1, &teachers, &students).is_ok());
    }

    #[test]
    fn empty_marks_are_rejected() {
        let (teachers, students) = roster();
        let mut empty = draft(Some("c1"), Some("t1"));
        empty.marks.clear();
        assert_eq!(
            prepare_submission(&empty, &user(Role::Admin, None, None), &teachers, &students),
            Err(SubmissionError::NothingMarked)
        );
    }

    #[test]
    fn unmarked_enrolled_students_default_to_absent() {
        let (teachers, students) = roster();
        let payload = prepare_submission(
            &draft(Some("c1"), Some("t1")),
            &user(Role::Admin, None, None),
            &teachers,
            &students,
        )
        .unwrap();

        assert_eq!(payload.students.len(), 2);
        assert_eq!(payload.count(AttendanceStatus::Present), 1);
        let s2 = payload.students.iter().find(|s| s.student_id == "s2").unwrap();
        assert_eq!(s2.status, AttendanceStatus::Absent);
        assert!(payload.students.iter().all(|s| s.student_id != "s3"));

        let body = serde_json::to_value(&payload).unwrap();
        assert_eq!(body["classId"], "c1");
        assert_eq!(body["teacherName"], "t1");
        assert_eq!(body["students"][0]["studentName"], "s1");
        assert_eq!(body["students"][0]["date"], "2024-05-01T00:00:00Z");
    }
}
