use crate::attendance::{AttendanceRecord, AttendanceSummary};
use crate::models::{is_english_class, AttendanceStatus, Part, Shift, StudentRecord};

/// Selections that scope the attendance report. `None` matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttendanceFilter {
    pub class_name: Option<String>,
    pub shift: Option<Shift>,
    pub part: Option<Part>,
    pub status: Option<AttendanceStatus>,
}

impl AttendanceFilter {
    pub fn is_empty(&self) -> bool {
        self.class_name.is_none()
            && self.shift.is_none()
            && self.part.is_none()
            && self.status.is_none()
    }

    pub fn matches_record(&self, record: &AttendanceRecord) -> bool {
        self.matches_student_dimensions(&record.class_name, record.shift, record.part)
            && self.status.map_or(true, |status| record.status == status)
    }

    /// Class, shift and part only. Student totals keep every status so a
    /// status filter scopes the day view without dropping students. For a
    /// student these are the last-seen values, so a class filter keeps or
    /// drops their whole history by their most recent class.
    pub fn matches_student_dimensions(
        &self,
        class_name: &str,
        shift: Option<Shift>,
        part: Part,
    ) -> bool {
        self.class_name
            .as_deref()
            .map_or(true, |wanted| class_name == wanted)
            && self.shift.map_or(true, |wanted| shift == Some(wanted))
            && self.part.map_or(true, |wanted| part == wanted)
    }
}

/// Filters for student listings and the attendance roster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentFilter {
    pub search: Option<String>,
    pub class_id: Option<String>,
    pub shift: Option<Shift>,
    pub part: Option<Part>,
}

impl StudentFilter {
    pub fn matches(&self, student: &StudentRecord) -> bool {
        let search_ok = match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(term) => {
                let term = term.to_lowercase();
                student.full_name.to_lowercase().contains(&term)
                    || student
                        .class_name()
                        .is_some_and(|name| name.to_lowercase().contains(&term))
            }
        };

        search_ok
            && self
                .class_id
                .as_deref()
                .map_or(true, |class_id| student.in_class(class_id))
            && self.shift.map_or(true, |wanted| student.shift == Some(wanted))
            && self.part.map_or(true, |wanted| student.part == wanted)
    }

    pub fn apply<'a>(&self, students: &'a [StudentRecord]) -> Vec<&'a StudentRecord> {
        students.iter().filter(|s| self.matches(s)).collect()
    }
}

/// Whether the part dimension is worth offering: the selected class is an
/// English class, or any loaded student comes from one.
pub fn part_filter_visible(selected_class: Option<&str>, summary: Option<&AttendanceSummary>) -> bool {
    selected_class.is_some_and(is_english_class)
        || summary.is_some_and(|summary| summary.has_english_students)
}
