use chrono::NaiveDate;
use serde::Serialize;
use tracing::instrument;

use crate::api::{ApiClient, ApiError};
use crate::attendance;
use crate::finance;
use crate::models::{percentage, AttendanceSession, ClassRecord, FinanceTransaction, StudentRecord, Teacher};

/// The five collections the dashboard is built from, fetched together.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub students: Vec<StudentRecord>,
    pub teachers: Vec<Teacher>,
    pub classes: Vec<ClassRecord>,
    pub attendance: Vec<AttendanceSession>,
    pub finance: Vec<FinanceTransaction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_students: usize,
    pub total_teachers: usize,
    pub total_classes: usize,
    pub today_present: usize,
    pub monthly_income: f64,
    pub total_income: f64,
}

impl DashboardStats {
    pub fn attendance_rate(&self) -> u32 {
        percentage(self.today_present as u32, self.total_students as u32)
    }

    pub fn average_monthly_income(&self) -> f64 {
        self.total_income / 12.0
    }
}

/// Fails as a whole if any one collection fails.
#[instrument(skip(client))]
pub async fn fetch_snapshot(client: &ApiClient) -> Result<Snapshot, ApiError> {
    let (students, teachers, classes, attendance, finance) = tokio::try_join!(
        client.list::<StudentRecord>(),
        client.list::<Teacher>(),
        client.list::<ClassRecord>(),
        client.list_attendance(),
        client.list::<FinanceTransaction>(),
    )?;

    Ok(Snapshot {
        students,
        teachers,
        classes,
        attendance,
        finance,
    })
}

/// With a class scope (a teacher account) only that class is counted and
/// finance is hidden.
pub fn compute(snapshot: &Snapshot, today: NaiveDate, class_scope: Option<&str>) -> DashboardStats {
    match class_scope {
        Some(class_id) => {
            let scoped: Vec<AttendanceSession> =
                attendance::for_class(&snapshot.attendance, class_id).cloned().collect();
            DashboardStats {
                total_students: snapshot.students.iter().filter(|s| s.in_class(class_id)).count(),
                total_teachers: 1,
                total_classes: 1,
                today_present: attendance::present_on(&scoped, today),
                monthly_income: 0.0,
                total_income: 0.0,
            }
        }
        None => {
            let money = finance::live_summary(&snapshot.finance, today);
            DashboardStats {
                total_students: snapshot.students.len(),
                total_teachers: snapshot.teachers.len(),
                total_classes: snapshot.classes.len(),
                today_present: attendance::present_on(&snapshot.attendance, today),
                monthly_income: money.monthly_income,
                total_income: money.total_income,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::ApiSection;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 12).unwrap()
    }

    async fn mount(server: &MockServer, route: &str, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    async fn school(server: &MockServer) {
        mount(
            server,
            "/read/student",
            json!([
                {"_id": "s1", "fullName": "Amina", "classId": "c1"},
                {"_id": "s2", "fullName": "Bashir", "classId": {"_id": "c1", "className": "English 1"}},
                {"_id": "s3", "fullName": "Caaliya", "classId": "c2"}
            ]),
        )
        .await;
        mount(
            server,
            "/read/teacher",
            json!([{"_id": "t1", "fullName": "Hodan"}, {"_id": "t2", "fullName": "Omar"}]),
        )
        .await;
        mount(
            server,
            "/read/class",
            json!([{"_id": "c1", "className": "English 1"}, {"_id": "c2", "className": "Math"}]),
        )
        .await;
        mount(
            server,
            "/read/attendance",
            json!([
                {"classId": "c1", "students": [
                    {"studentName": "s1", "status": "Present", "date": "2024-03-12T00:00:00Z"},
                    {"studentName": "s2", "status": "Absent", "date": "2024-03-12T00:00:00Z"}
                ]},
                {"classId": "c2", "students": [
                    {"studentName": "s3", "status": "Present", "date": "2024-03-12"}
                ]},
                {"classId": "c1", "students": [
                    {"studentName": "s1", "status": "Present", "date": "2024-03-11"}
                ]}
            ]),
        )
        .await;
        mount(
            server,
            "/read/finance",
            json!({"data": [
                {"_id": "f1", "month": "March", "year": 2024, "amountPaid": 40, "purpose": "Tuition"},
                {"_id": "f2", "month": "February", "year": 2024, "amountPaid": 60, "purpose": "Exam"}
            ]}),
        )
        .await;
    }

    fn client(server: &MockServer) -> ApiClient {
        let config = ApiSection {
            base_url: server.uri(),
            timeout_secs: 5,
        };
        ApiClient::new(&config, None).unwrap()
    }

    #[tokio::test]
    async fn admin_dashboard_counts_everything() {
        let server = MockServer::start().await;
        school(&server).await;

        let snapshot = fetch_snapshot(&client(&server)).await.unwrap();
        let stats = compute(&snapshot, today(), None);
        assert_eq!(
            stats,
            DashboardStats {
                total_students: 3,
                total_teachers: 2,
                total_classes: 2,
                today_present: 2,
                monthly_income: 40.0,
                total_income: 100.0,
            }
        );
        assert_eq!(stats.attendance_rate(), 67);
    }

    #[tokio::test]
    async fn teacher_dashboard_is_limited_to_their_class() {
        let server = MockServer::start().await;
        school(&server).await;

        let snapshot = fetch_snapshot(&client(&server)).await.unwrap();
        let stats = compute(&snapshot, today(), Some("c1"));
        assert_eq!(stats.total_students, 2);
        assert_eq!(stats.total_teachers, 1);
        assert_eq!(stats.today_present, 1);
        assert_eq!(stats.total_income, 0.0);
        assert_eq!(stats.attendance_rate(), 50);
    }

    #[tokio::test]
    async fn one_failed_collection_fails_the_dashboard() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/read/finance"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "db down"})))
            .mount(&server)
            .await;
        school(&server).await;

        let err = fetch_snapshot(&client(&server)).await.unwrap_err();
        assert_eq!(err.to_string(), "db down");
    }

    #[test]
    fn empty_school_has_zero_rate() {
        let stats = compute(&Snapshot::default(), today(), None);
        assert_eq!(stats.attendance_rate(), 0);
        assert_eq!(stats.average_monthly_income(), 0.0);
    }
}
