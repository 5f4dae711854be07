use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::warn;

use crate::filters::AttendanceFilter;
use crate::models::{
    is_english_class, percentage, AttendanceSession, AttendanceStatus, Part, Ref, Shift,
};

/// One student's status on one day, flattened out of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceRecord {
    pub date: NaiveDate,
    pub class_name: String,
    pub student_id: String,
    pub student_name: String,
    pub shift: Option<Shift>,
    pub part: Part,
    pub status: AttendanceStatus,
    pub is_english_class: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyStat {
    pub date: NaiveDate,
    pub present: u32,
    pub absent: u32,
    pub total: u32,
    pub percentage: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentStat {
    pub student_id: String,
    pub name: String,
    pub class_name: String,
    pub shift: Option<Shift>,
    pub part: Part,
    pub present: u32,
    pub absent: u32,
    pub percentage: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttendanceSummary {
    pub total_days: usize,
    pub total_students: usize,
    pub average_attendance: u32,
    pub daily_attendance: Vec<DailyStat>,
    pub student_attendance: Vec<StudentStat>,
    pub present_students: Vec<StudentStat>,
    pub absent_students: Vec<StudentStat>,
    /// Filtered records, for the detailed view and CSV export.
    pub records: Vec<AttendanceRecord>,
    pub has_english_students: bool,
}

#[derive(Default)]
struct DayCounts {
    present: u32,
    absent: u32,
}

impl DayCounts {
    fn add(&mut self, status: AttendanceStatus) {
        if status.is_present() {
            self.present += 1;
        } else {
            self.absent += 1;
        }
    }

    fn into_stat(self, date: NaiveDate) -> DailyStat {
        let total = self.present + self.absent;
        DailyStat {
            date,
            present: self.present,
            absent: self.absent,
            total,
            percentage: percentage(self.present, total),
        }
    }
}

struct StudentCounts {
    name: String,
    class_name: String,
    shift: Option<Shift>,
    part: Part,
    days: DayCounts,
}

pub fn flatten_sessions(sessions: &[AttendanceSession]) -> Vec<AttendanceRecord> {
    let mut records = Vec::new();

    for session in sessions {
        if session.students.is_empty() {
            continue;
        }

        let class_name = session.class_name();
        let english = is_english_class(class_name);

        for entry in &session.students {
            let Some(student_id) = entry.student_id() else {
                warn!(class = class_name, "attendance entry has no student, skipping");
                continue;
            };
            let Some(timestamp) = entry.date.or(session.created_at) else {
                warn!(student_id, class = class_name, "attendance entry has no date, skipping");
                continue;
            };

            let student = entry.student.as_ref().and_then(Ref::populated);
            records.push(AttendanceRecord {
                date: timestamp.date_naive(),
                class_name: class_name.to_string(),
                student_id: student_id.to_string(),
                student_name: entry.student_name().to_string(),
                shift: student.and_then(|s| s.shift),
                part: student.map(|s| s.part).unwrap_or_default(),
                status: entry.status,
                is_english_class: english,
            });
        }
    }

    records
}

pub fn daily_stats<'a>(records: impl IntoIterator<Item = &'a AttendanceRecord>) -> Vec<DailyStat> {
    let mut days: BTreeMap<NaiveDate, DayCounts> = BTreeMap::new();
    for record in records {
        days.entry(record.date).or_default().add(record.status);
    }
    days.into_iter()
        .map(|(date, counts)| counts.into_stat(date))
        .collect()
}

pub fn aggregate(sessions: &[AttendanceSession], filter: &AttendanceFilter) -> AttendanceSummary {
    let records = flatten_sessions(sessions);
    if records.is_empty() {
        return AttendanceSummary::default();
    }

    let has_english_students = records.iter().any(|r| r.is_english_class);

    let mut order: Vec<String> = Vec::new();
    let mut students: HashMap<String, StudentCounts> = HashMap::new();
    for record in &records {
        let entry = students
            .entry(record.student_id.clone())
            .or_insert_with(|| {
                order.push(record.student_id.clone());
                StudentCounts {
                    name: record.student_name.clone(),
                    class_name: record.class_name.clone(),
                    shift: record.shift,
                    part: record.part,
                    days: DayCounts::default(),
                }
            });
        entry.name = record.student_name.clone();
        entry.class_name = record.class_name.clone();
        entry.shift = record.shift;
        entry.part = record.part;
        entry.days.add(record.status);
    }

    let filtered: Vec<AttendanceRecord> = records
        .into_iter()
        .filter(|record| filter.matches_record(record))
        .collect();
    let daily_attendance = daily_stats(&filtered);

    let student_attendance: Vec<StudentStat> = order
        .into_iter()
        .filter_map(|id| students.remove(&id).map(|counts| (id, counts)))
        .filter(|(_, counts)| {
            filter.matches_student_dimensions(&counts.class_name, counts.shift, counts.part)
        })
        .map(|(student_id, counts)| {
            let total = counts.days.present + counts.days.absent;
            StudentStat {
                student_id,
                name: counts.name,
                class_name: counts.class_name,
                shift: counts.shift,
                part: counts.part,
                present: counts.days.present,
                absent: counts.days.absent,
                percentage: percentage(counts.days.present, total),
            }
        })
        .collect();

    let average_attendance = average(student_attendance.iter().map(|s| s.percentage));
    let present_students = student_attendance
        .iter()
        .filter(|s| s.present > 0)
        .cloned()
        .collect();
    let absent_students = student_attendance
        .iter()
        .filter(|s| s.absent > 0)
        .cloned()
        .collect();

    AttendanceSummary {
        total_days: daily_attendance.len(),
        total_students: student_attendance.len(),
        average_attendance,
        daily_attendance,
        student_attendance,
        present_students,
        absent_students,
        records: filtered,
        has_english_students,
    }
}

fn average(values: impl Iterator<Item = u32>) -> u32 {
    let (sum, count) = values.fold((0u64, 0u64), |(sum, count), v| (sum + u64::from(v), count + 1));
    if count == 0 {
        return 0;
    }
    ((sum * 2 + count) / (count * 2)) as u32
}

/// Raw sessions plus the current filter. Any change to either recomputes the
/// summary; the raw sessions are never touched by filtering.
#[derive(Debug, Clone, Default)]
pub struct AttendanceReportView {
    sessions: Vec<AttendanceSession>,
    filter: AttendanceFilter,
    summary: AttendanceSummary,
}

impl AttendanceReportView {
    pub fn new(sessions: Vec<AttendanceSession>) -> Self {
        let mut view = Self {
            sessions,
            ..Default::default()
        };
        view.recompute();
        view
    }

    pub fn summary(&self) -> &AttendanceSummary {
        &self.summary
    }

    pub fn filter(&self) -> &AttendanceFilter {
        &self.filter
    }

    pub fn sessions(&self) -> &[AttendanceSession] {
        &self.sessions
    }

    pub fn set_filter(&mut self, filter: AttendanceFilter) {
        if self.filter != filter {
            self.filter = filter;
            self.recompute();
        }
    }

    pub fn clear_filters(&mut self) {
        self.set_filter(AttendanceFilter::default());
    }

    fn recompute(&mut self) {
        self.summary = aggregate(&self.sessions, &self.filter);
    }
}

/// Count of students marked Present today, used by the dashboard.
pub fn present_on(sessions: &[AttendanceSession], day: NaiveDate) -> usize {
    sessions
        .iter()
        .filter(|session| session.session_date() == Some(day))
        .flat_map(|session| session.students.iter())
        .filter(|entry| entry.status.is_present())
        .count()
}

/// Sessions that belong to the given class id.
pub fn for_class<'a>(
    sessions: &'a [AttendanceSession],
    class_id: &'a str,
) -> impl Iterator<Item = &'a AttendanceSession> + 'a {
    sessions.iter().filter(move |s| s.class_id() == Some(class_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{midnight_utc, ClassRecord, StudentEntry, StudentRecord};

    fn student(id: &str, name: &str, shift: Shift, part: Part) -> StudentRecord {
        StudentRecord {
            id: id.to_string(),
            full_name: name.to_string(),
            class: None,
            shift: Some(shift),
            part,
            phone: String::new(),
            emergency_phone: String::new(),
        }
    }

    fn session(class_name: &str, day: &str, marks: &[(&StudentRecord, AttendanceStatus)]) -> AttendanceSession {
        let date = NaiveDate::parse_from_str(day, "%Y-%m-%d").unwrap();
        AttendanceSession {
            id: None,
            class: Some(Ref::Populated(ClassRecord {
                id: format!("class-{class_name}"),
                class_number: None,
                name: class_name.to_string(),
            })),
            teacher: None,
            students: marks
                .iter()
                .map(|(s, status)| StudentEntry {
                    student: Some(Ref::Populated((*s).clone())),
                    status: *status,
                    date: Some(midnight_utc(date)),
                })
                .collect(),
            created_at: None,
        }
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn three_students() -> (StudentRecord, StudentRecord, StudentRecord) {
        (
            student("a", "Amina", Shift::Morning, Part::Part1),
            student("b", "Bashir", Shift::Morning, Part::Part2),
            student("c", "Caaliya", Shift::Night, Part::Part1),
        )
    }

    fn two_day_sessions() -> Vec<AttendanceSession> {
        use AttendanceStatus::*;
        let (a, b, c) = three_students();
        vec![
            session("English 1", "2024-01-01", &[(&a, Present), (&b, Present), (&c, Absent)]),
            session("English 1", "2024-01-02", &[(&a, Present), (&b, Present), (&c, Present)]),
        ]
    }

    #[test]
    fn daily_stats_match_worked_example() {
        let summary = aggregate(&two_day_sessions(), &AttendanceFilter::default());

        assert_eq!(
            summary.daily_attendance,
            vec![
                DailyStat { date: day("2024-01-01"), present: 2, absent: 1, total: 3, percentage: 67 },
                DailyStat { date: day("2024-01-02"), present: 3, absent: 0, total: 3, percentage: 100 },
            ]
        );
        assert_eq!(summary.total_days, 2);
        assert_eq!(summary.total_students, 3);
        // 100, 100, 50
        assert_eq!(summary.average_attendance, 83);
        assert!(summary.has_english_students);
    }

    #[test]
    fn daily_totals_equal_filtered_record_count() {
        let filter = AttendanceFilter {
            shift: Some(Shift::Morning),
            ..Default::default()
        };
        let summary = aggregate(&two_day_sessions(), &filter);
        let counted: u32 = summary
            .daily_attendance
            .iter()
            .map(|d| d.present + d.absent)
            .sum();
        assert_eq!(counted as usize, summary.records.len());
        assert_eq!(counted, 4);
    }

    #[test]
    fn absent_status_filter_leaves_no_present_days() {
        let filter = AttendanceFilter {
            status: Some(AttendanceStatus::Absent),
            ..Default::default()
        };
        let summary = aggregate(&two_day_sessions(), &filter);
        assert_eq!(summary.daily_attendance.len(), 1);
        assert!(summary.daily_attendance.iter().all(|d| d.present == 0));
        assert_eq!(summary.daily_attendance[0].percentage, 0);
    }

    #[test]
    fn mixed_attendance_lands_in_both_groups() {
        let summary = aggregate(&two_day_sessions(), &AttendanceFilter::default());
        let in_present = summary.present_students.iter().any(|s| s.student_id == "c");
        let in_absent = summary.absent_students.iter().any(|s| s.student_id == "c");
        assert!(in_present && in_absent);
        assert_eq!(summary.absent_students.len(), 1);
        assert_eq!(summary.present_students.len(), 3);
    }

    #[test]
    fn clearing_filters_restores_unfiltered_summary() {
        let sessions = two_day_sessions();
        let mut view = AttendanceReportView::new(sessions.clone());
        let baseline = view.summary().clone();

        view.set_filter(AttendanceFilter {
            class_name: Some("English 1".into()),
            shift: Some(Shift::Night),
            part: Some(Part::Part1),
            status: Some(AttendanceStatus::Absent),
        });
        assert_ne!(view.summary(), &baseline);
        assert_eq!(view.sessions(), sessions.as_slice());

        view.clear_filters();
        assert_eq!(view.summary(), &baseline);
    }

    #[test]
    fn empty_sessions_do_not_create_days() {
        let mut sessions = two_day_sessions();
        sessions.push(session("Math", "2024-01-05", &[]));
        let summary = aggregate(&sessions, &AttendanceFilter::default());
        assert_eq!(summary.total_days, 2);
        assert!(summary.records.iter().all(|r| r.class_name != "Math"));
    }

    #[test]
    fn deleted_students_are_skipped_and_deleted_classes_are_unknown() {
        let (a, b, _) = three_students();
        let mut sessions = vec![session(
            "English 1",
            "2024-03-01",
            &[(&a, AttendanceStatus::Present), (&b, AttendanceStatus::Absent)],
        )];
        sessions[0].students[1].student = None;
        let mut orphan = session("Gone", "2024-03-02", &[(&a, AttendanceStatus::Present)]);
        orphan.class = None;
        sessions.push(orphan);

        let summary = aggregate(&sessions, &AttendanceFilter::default());
        assert_eq!(summary.records.len(), 2);
        assert!(summary.records.iter().all(|r| r.student_id == "a"));
        assert_eq!(summary.records[1].class_name, "Unknown");
        assert_eq!(summary.total_students, 1);
        assert_eq!(for_class(&sessions, "class-English 1").count(), 1);
    }

    #[test]
    fn late_and_excused_count_as_absent() {
        let (a, b, _) = three_students();
        let sessions = vec![session(
            "Math",
            "2024-02-01",
            &[(&a, AttendanceStatus::Late), (&b, AttendanceStatus::Excused)],
        )];
        let summary = aggregate(&sessions, &AttendanceFilter::default());
        assert_eq!(summary.daily_attendance[0].absent, 2);
        assert_eq!(summary.average_attendance, 0);
        assert!(!summary.has_english_students);

        let late_only = aggregate(
            &sessions,
            &AttendanceFilter {
                status: Some(AttendanceStatus::Late),
                ..Default::default()
            },
        );
        assert_eq!(late_only.records.len(), 1);
    }

    #[test]
    fn percentages_stay_in_range() {
        let summary = aggregate(&two_day_sessions(), &AttendanceFilter::default());
        assert!(summary
            .daily_attendance
            .iter()
            .map(|d| d.percentage)
            .chain(summary.student_attendance.iter().map(|s| s.percentage))
            .all(|p| p <= 100));
        assert_eq!(aggregate(&[], &AttendanceFilter::default()).average_attendance, 0);
    }

    #[test]
    fn entry_date_falls_back_to_creation_timestamp() {
        let (a, _, _) = three_students();
        let mut s = session("Math", "2024-03-01", &[(&a, AttendanceStatus::Present)]);
        s.students[0].date = None;
        s.created_at = Some(midnight_utc(day("2024-03-04")));
        let records = flatten_sessions(&[s.clone()]);
        assert_eq!(records[0].date, day("2024-03-04"));

        s.created_at = None;
        assert!(flatten_sessions(&[s]).is_empty());
    }

    #[test]
    fn present_on_counts_only_that_day() {
        let sessions = two_day_sessions();
        assert_eq!(present_on(&sessions, day("2024-01-01")), 2);
        assert_eq!(present_on(&sessions, day("2024-01-02")), 3);
        assert_eq!(present_on(&sessions, day("2024-01-03")), 0);
        assert_eq!(for_class(&sessions, "class-English 1").count(), 2);
    }
}
