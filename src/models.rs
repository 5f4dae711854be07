use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A reference the backend either leaves as a bare id or populates with the
/// referenced document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Ref<T> {
    Populated(T),
    Id(String),
}

impl<T: HasId> Ref<T> {
    pub fn id(&self) -> &str {
        match self {
            Ref::Populated(value) => value.id(),
            Ref::Id(id) => id,
        }
    }

    pub fn populated(&self) -> Option<&T> {
        match self {
            Ref::Populated(value) => Some(value),
            Ref::Id(_) => None,
        }
    }

    pub fn is(&self, id: &str) -> bool {
        self.id() == id
    }
}

pub trait HasId {
    fn id(&self) -> &str;
}

/// Collection responses arrive either bare or wrapped as `{ success, data }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    pub fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(data) => data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shift {
    Morning,
    Noon,
    #[serde(alias = "Afternoon")]
    AfterNoon,
    Night,
    #[serde(rename = "Khamiis iyo Jimco")]
    ThursdayFriday,
}

impl Shift {
    pub const ALL: [Shift; 5] = [
        Shift::Morning,
        Shift::Noon,
        Shift::AfterNoon,
        Shift::Night,
        Shift::ThursdayFriday,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Shift::Morning => "Morning",
            Shift::Noon => "Noon",
            Shift::AfterNoon => "AfterNoon",
            Shift::Night => "Night",
            Shift::ThursdayFriday => "Khamiis iyo Jimco",
        }
    }
}

impl fmt::Display for Shift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Shift {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Shift::ALL
            .into_iter()
            .find(|shift| shift.label().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("unknown shift '{value}'"))
    }
}

/// Curriculum progress tag for English-track students.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Part {
    #[default]
    None,
    #[serde(rename = "Part 0")]
    Part0,
    #[serde(rename = "Part 1")]
    Part1,
    #[serde(rename = "Part 2")]
    Part2,
    #[serde(rename = "Part 3")]
    Part3,
    #[serde(rename = "Part 4")]
    Part4,
    #[serde(rename = "Part 5")]
    Part5,
    #[serde(rename = "Part 6")]
    Part6,
    #[serde(rename = "Part 7")]
    Part7,
    #[serde(rename = "New Top One")]
    NewTopOne,
    #[serde(rename = "Top One")]
    TopOne,
    Congratulations,
}

impl Part {
    pub const ALL: [Part; 12] = [
        Part::None,
        Part::Part0,
        Part::Part1,
        Part::Part2,
        Part::Part3,
        Part::Part4,
        Part::Part5,
        Part::Part6,
        Part::Part7,
        Part::NewTopOne,
        Part::TopOne,
        Part::Congratulations,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Part::None => "None",
            Part::Part0 => "Part 0",
            Part::Part1 => "Part 1",
            Part::Part2 => "Part 2",
            Part::Part3 => "Part 3",
            Part::Part4 => "Part 4",
            Part::Part5 => "Part 5",
            Part::Part6 => "Part 6",
            Part::Part7 => "Part 7",
            Part::NewTopOne => "New Top One",
            Part::TopOne => "Top One",
            Part::Congratulations => "Congratulations",
        }
    }

    /// Next step on the English track. The table is explicit: the backend
    /// owns the progression rules and this mirrors its pairs one by one.
    pub fn next(&self) -> Option<Part> {
        match self {
            Part::Part0 => Some(Part::Part1),
            Part::Part1 => Some(Part::Part2),
            Part::Part2 => Some(Part::Part3),
            Part::Part3 => Some(Part::Part4),
            Part::Part4 => Some(Part::Part5),
            Part::Part5 => Some(Part::Part6),
            Part::Part6 => Some(Part::Part7),
            Part::Part7 => Some(Part::NewTopOne),
            Part::NewTopOne => Some(Part::TopOne),
            Part::TopOne => Some(Part::Congratulations),
            Part::Congratulations | Part::None => None,
        }
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Part {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Part::ALL
            .into_iter()
            .find(|part| part.label().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("unknown part '{value}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AttendanceStatus {
    #[default]
    Present,
    Absent,
    Late,
    Excused,
}

impl AttendanceStatus {
    pub fn is_present(&self) -> bool {
        matches!(self, AttendanceStatus::Present)
    }

    pub fn label(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
            AttendanceStatus::Late => "Late",
            AttendanceStatus::Excused => "Excused",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            "late" => Ok(AttendanceStatus::Late),
            "excused" => Ok(AttendanceStatus::Excused),
            _ => Err(format!("unknown status '{value}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Purpose {
    Tuition,
    Exam,
    Registration,
    #[default]
    Other,
}

impl Purpose {
    pub fn label(&self) -> &'static str {
        match self {
            Purpose::Tuition => "Tuition",
            Purpose::Exam => "Exam",
            Purpose::Registration => "Registration",
            Purpose::Other => "Other",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Purpose {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tuition" => Ok(Purpose::Tuition),
            "exam" => Ok(Purpose::Exam),
            "registration" => Ok(Purpose::Registration),
            "other" => Ok(Purpose::Other),
            _ => Err(format!("unknown purpose '{value}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassRecord {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(
        rename = "classId",
        default,
        deserialize_with = "number_or_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub class_number: Option<i64>,
    #[serde(rename = "className", default)]
    pub name: String,
}

impl ClassRecord {
    pub fn is_english(&self) -> bool {
        is_english_class(&self.name)
    }
}

impl HasId for ClassRecord {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "fullName", default)]
    pub full_name: String,
    #[serde(rename = "classId", default, skip_serializing_if = "Option::is_none")]
    pub class: Option<Ref<ClassRecord>>,
    #[serde(default)]
    pub shift: Option<Shift>,
    #[serde(rename = "Parts", default)]
    pub part: Part,
    #[serde(default)]
    pub phone: String,
    #[serde(rename = "emergencyPhone", default)]
    pub emergency_phone: String,
}

impl StudentRecord {
    pub fn class_id(&self) -> Option<&str> {
        self.class.as_ref().map(Ref::id)
    }

    pub fn class_name(&self) -> Option<&str> {
        self.class
            .as_ref()
            .and_then(Ref::populated)
            .map(|class| class.name.as_str())
    }

    pub fn in_class(&self, class_id: &str) -> bool {
        self.class.as_ref().is_some_and(|class| class.is(class_id))
    }
}

impl HasId for StudentRecord {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Teacher {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "fullName", default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(rename = "classId", default, skip_serializing_if = "Option::is_none")]
    pub class: Option<Ref<ClassRecord>>,
}

impl Teacher {
    pub fn teaches(&self, class_id: &str) -> bool {
        self.class.as_ref().is_some_and(|class| class.is(class_id))
    }
}

impl HasId for Teacher {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StudentEntry {
    /// `None` when the student was deleted after the session was taken.
    #[serde(rename = "studentName", default)]
    pub student: Option<Ref<StudentRecord>>,
    #[serde(default)]
    pub status: AttendanceStatus,
    #[serde(default, deserialize_with = "optional_timestamp")]
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AttendanceSession {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(rename = "classId", default)]
    pub class: Option<Ref<ClassRecord>>,
    #[serde(rename = "teacherName", default)]
    pub teacher: Option<Ref<Teacher>>,
    #[serde(default)]
    pub students: Vec<StudentEntry>,
    #[serde(rename = "createdAt", default, deserialize_with = "optional_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl StudentEntry {
    pub fn student_id(&self) -> Option<&str> {
        self.student.as_ref().map(Ref::id)
    }

    pub fn student_name(&self) -> &str {
        self.student
            .as_ref()
            .and_then(Ref::populated)
            .map(|student| student.full_name.as_str())
            .unwrap_or("Unknown")
    }
}

impl AttendanceSession {
    pub fn class_id(&self) -> Option<&str> {
        self.class.as_ref().map(Ref::id)
    }

    pub fn class_name(&self) -> &str {
        self.class
            .as_ref()
            .and_then(Ref::populated)
            .map(|class| class.name.as_str())
            .unwrap_or("Unknown")
    }

    /// Calendar day of the session as the dashboard reads it: the first
    /// entry's date, or the creation timestamp.
    pub fn session_date(&self) -> Option<NaiveDate> {
        self.students
            .first()
            .and_then(|entry| entry.date)
            .or(self.created_at)
            .map(|ts| ts.date_naive())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FinanceTransaction {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "fullName", default)]
    pub student: Option<Ref<StudentRecord>>,
    #[serde(rename = "classId", default)]
    pub class: Option<Ref<ClassRecord>>,
    #[serde(default)]
    pub month: String,
    #[serde(default, deserialize_with = "number_or_string")]
    pub year: Option<i64>,
    #[serde(rename = "amountPaid", default)]
    pub amount_paid: f64,
    #[serde(default)]
    pub purpose: Purpose,
    #[serde(rename = "datePaid", default, deserialize_with = "optional_timestamp")]
    pub date_paid: Option<DateTime<Utc>>,
}

impl FinanceTransaction {
    pub fn student_name(&self) -> &str {
        self.student
            .as_ref()
            .and_then(Ref::populated)
            .map(|student| student.full_name.as_str())
            .unwrap_or("N/A")
    }

    pub fn class_name(&self) -> &str {
        self.class
            .as_ref()
            .and_then(Ref::populated)
            .map(|class| class.name.as_str())
            .unwrap_or("N/A")
    }
}

impl HasId for FinanceTransaction {
    fn id(&self) -> &str {
        &self.id
    }
}

/// One bucket of the year-wide finance report.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MonthlyBucket {
    #[serde(rename = "_id", default)]
    pub key: Option<MonthKey>,
    #[serde(rename = "totalAmount", default)]
    pub total_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MonthKey {
    #[serde(default)]
    pub month: Option<MonthLabel>,
    #[serde(default, deserialize_with = "number_or_string")]
    pub year: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MonthLabel {
    Number(u32),
    Name(String),
}

impl MonthLabel {
    pub fn name(&self) -> String {
        match self {
            MonthLabel::Number(n) => u8::try_from(*n)
                .ok()
                .and_then(|n| chrono::Month::try_from(n).ok())
                .map(|month| month.name().to_string())
                .unwrap_or_else(|| n.to_string()),
            MonthLabel::Name(name) => name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PaidStudent {
    #[serde(flatten)]
    pub student: StudentRecord,
    #[serde(rename = "financeRecords", default)]
    pub finance_records: Vec<PaymentLine>,
}

impl PaidStudent {
    pub fn total_paid(&self) -> f64 {
        self.finance_records.iter().map(|r| r.amount_paid).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PaymentLine {
    #[serde(rename = "amountPaid", default)]
    pub amount_paid: f64,
    #[serde(default)]
    pub purpose: Purpose,
    #[serde(default)]
    pub month: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PaymentStatusGroups {
    #[serde(default)]
    pub paid: Vec<PaidStudent>,
    #[serde(default)]
    pub unpaid: Vec<StudentRecord>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PaymentStatusReport {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub paid: u64,
    #[serde(default)]
    pub unpaid: u64,
    pub students: PaymentStatusGroups,
}

pub fn is_english_class(class_name: &str) -> bool {
    class_name.to_lowercase().contains("english")
}

/// Integer percentage rounded half up, 0 when there is nothing to divide by.
pub fn percentage(part: u32, whole: u32) -> u32 {
    if whole == 0 {
        return 0;
    }
    let part = u64::from(part.min(whole));
    let whole = u64::from(whole);
    ((part * 200 + whole) / (whole * 2)) as u32
}

fn optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_timestamp(value)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{value}'"))),
    }
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(midnight_utc)
}

pub fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    use chrono::TimeZone;
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

fn number_or_string<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Int(n)) => Ok(Some(n)),
        Some(Raw::Float(n)) => Ok(Some(n as i64)),
        Some(Raw::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(Raw::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("expected a number, got '{text}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn refs_decode_bare_and_populated() {
        let bare: Ref<ClassRecord> = serde_json::from_value(json!("c1")).unwrap();
        assert_eq!(bare.id(), "c1");
        assert!(bare.populated().is_none());

        let populated: Ref<ClassRecord> =
            serde_json::from_value(json!({"_id": "c2", "className": "English A", "classId": "7"}))
                .unwrap();
        assert_eq!(populated.id(), "c2");
        let class = populated.populated().unwrap();
        assert_eq!(class.class_number, Some(7));
        assert!(class.is_english());
    }

    #[test]
    fn envelope_accepts_wrapped_and_bare_collections() {
        let wrapped: Envelope<Vec<u32>> =
            serde_json::from_value(json!({"success": true, "data": [1, 2]})).unwrap();
        assert_eq!(wrapped.into_inner(), vec![1, 2]);
        let bare: Envelope<Vec<u32>> = serde_json::from_value(json!([3])).unwrap();
        assert_eq!(bare.into_inner(), vec![3]);
    }

    #[test]
    fn session_decodes_backend_shape() {
        let session: AttendanceSession = serde_json::from_value(json!({
            "_id": "s1",
            "classId": {"_id": "c1", "className": "Math"},
            "teacherName": "t1",
            "students": [
                {
                    "studentName": {"_id": "st1", "fullName": "Amina", "shift": "Khamiis iyo Jimco", "Parts": "Part 3"},
                    "status": "Absent",
                    "date": "2024-01-01T00:00:00.000Z"
                },
                {"studentName": "st2", "date": "2024-01-01"}
            ],
            "createdAt": "2024-01-01T08:30:00Z"
        }))
        .unwrap();

        assert_eq!(session.class_name(), "Math");
        assert_eq!(session.students.len(), 2);
        let first = session.students[0].student.as_ref().and_then(Ref::populated).unwrap();
        assert_eq!(first.shift, Some(Shift::ThursdayFriday));
        assert_eq!(first.part, Part::Part3);
        assert_eq!(session.students[1].status, AttendanceStatus::Present);
        assert_eq!(
            session.session_date(),
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
    }

    #[test]
    fn deleted_references_decode_as_missing() {
        let sessions: Envelope<Vec<AttendanceSession>> = serde_json::from_value(json!([
            {
                "classId": {"_id": "c1", "className": "English 2"},
                "students": [
                    {"studentName": {"_id": "st1", "fullName": "Amina"}, "status": "Present", "date": "2024-01-01"},
                    {"studentName": null, "status": "Absent", "date": "2024-01-01"}
                ]
            },
            {
                "classId": null,
                "students": [{"studentName": "st2", "date": "2024-01-02"}]
            }
        ]))
        .unwrap();
        let sessions = sessions.into_inner();

        assert_eq!(sessions.len(), 2);
        let gone = &sessions[0].students[1];
        assert_eq!(gone.student_id(), None);
        assert_eq!(gone.student_name(), "Unknown");
        assert_eq!(sessions[0].students[0].student_name(), "Amina");

        assert_eq!(sessions[1].class_id(), None);
        assert_eq!(sessions[1].class_name(), "Unknown");
        assert_eq!(sessions[1].students[0].student_id(), Some("st2"));
    }

    #[test]
    fn malformed_timestamps_are_decode_errors() {
        let result: Result<StudentEntry, _> = serde_json::from_value(json!({
            "studentName": "st1",
            "date": "yesterday"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn part_transition_table_is_explicit() {
        assert_eq!(Part::Part0.next(), Some(Part::Part1));
        assert_eq!(Part::Part7.next(), Some(Part::NewTopOne));
        assert_eq!(Part::NewTopOne.next(), Some(Part::TopOne));
        assert_eq!(Part::TopOne.next(), Some(Part::Congratulations));
        assert_eq!(Part::Congratulations.next(), None);
        assert_eq!(Part::None.next(), None);
        assert_eq!("new top one".parse::<Part>(), Ok(Part::NewTopOne));
    }

    #[test]
    fn percentage_rounds_half_up_and_guards_zero() {
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(1, 2), 50);
        assert_eq!(percentage(1, 8), 13);
        assert_eq!(percentage(0, 0), 0);
        assert_eq!(percentage(5, 5), 100);
    }

    #[test]
    fn month_labels_accept_numbers_and_names() {
        assert_eq!(MonthLabel::Number(3).name(), "March");
        assert_eq!(MonthLabel::Name("May".into()).name(), "May");
        assert_eq!(MonthLabel::Number(13).name(), "13");
    }
}
