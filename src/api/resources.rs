//! Typed wrappers for each backend endpoint.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::client::ApiClient;
use super::error::ApiError;
use crate::guard::AttendancePayload;
use crate::models::{
    AttendanceSession, ClassRecord, Envelope, FinanceTransaction, MonthlyBucket, Part,
    PaymentStatusReport, Shift, StudentRecord, Teacher,
};
use crate::progression::{ProgressOutcome, ProgressRequest};
use crate::session::{Role, Session, User};

/// A collection served under `/read/{name}` with the usual create, update
/// and delete routes.
pub trait Resource: DeserializeOwned {
    const NAME: &'static str;
}

impl Resource for StudentRecord {
    const NAME: &'static str = "student";
}

impl Resource for Teacher {
    const NAME: &'static str = "teacher";
}

impl Resource for ClassRecord {
    const NAME: &'static str = "class";
}

impl Resource for FinanceTransaction {
    const NAME: &'static str = "finance";
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentInput {
    #[serde(rename = "fullName")]
    pub full_name: String,
    #[serde(rename = "classId")]
    pub class_id: String,
    pub shift: Shift,
    #[serde(rename = "Parts")]
    pub part: Part,
    pub phone: String,
    #[serde(rename = "emergencyPhone")]
    pub emergency_phone: String,
}

impl StudentInput {
    /// Parts only mean something on the English track.
    pub fn for_class(mut self, class: Option<&ClassRecord>) -> Self {
        if !class.is_some_and(ClassRecord::is_english) {
            self.part = Part::None;
        }
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TeacherInput {
    #[serde(rename = "fullName", skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(rename = "classId", skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassInput {
    #[serde(rename = "classId")]
    pub class_number: i64,
    #[serde(rename = "className")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

impl From<LoginResponse> for Session {
    fn from(response: LoginResponse) -> Self {
        Session {
            token: response.token,
            user: response.user,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeResponse {
    #[serde(default)]
    pub user: Option<User>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangePassword {
    #[serde(rename = "currentPassword")]
    pub current_password: String,
    #[serde(rename = "newPassword")]
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeacherAccount {
    #[serde(rename = "teacherId")]
    pub teacher_id: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(rename = "teacherId", skip_serializing_if = "Option::is_none")]
    pub teacher_id: Option<String>,
}

/// Server-side scoping for the daily attendance report.
#[derive(Debug, Clone)]
pub struct DailyReportQuery {
    pub class_id: Option<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DailyReportQuery {
    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::with_capacity(3);
        if let Some(class_id) = &self.class_id {
            params.push(("classId", class_id.clone()));
        }
        params.push(("startDate", self.start.to_string()));
        params.push(("endDate", self.end.to_string()));
        params
    }
}

impl ApiClient {
    pub async fn list<T: Resource>(&self) -> Result<Vec<T>, ApiError> {
        self.get::<Envelope<Vec<T>>>(&format!("/read/{}", T::NAME))
            .await
            .map(Envelope::into_inner)
    }

    pub async fn create<T: Resource, B: Serialize>(&self, body: &B) -> Result<Value, ApiError> {
        self.post(&format!("/{}", T::NAME), body).await
    }

    pub async fn update<T: Resource, B: Serialize>(
        &self,
        id: &str,
        body: &B,
    ) -> Result<Value, ApiError> {
        self.put(&format!("/update/{}/{}", T::NAME, id), body).await
    }

    pub async fn remove<T: Resource>(&self, id: &str) -> Result<Value, ApiError> {
        self.delete(&format!("/delete/{}/{}", T::NAME, id)).await
    }

    pub async fn search_students(&self, name: &str) -> Result<Vec<StudentRecord>, ApiError> {
        self.get_with::<Envelope<Vec<StudentRecord>>>("/search/student", &[("name", name.to_string())])
            .await
            .map(Envelope::into_inner)
    }

    pub async fn progress_english_parts(
        &self,
        request: &ProgressRequest,
    ) -> Result<ProgressOutcome, ApiError> {
        self.post("/progress/english-parts", request).await
    }

    pub async fn list_attendance(&self) -> Result<Vec<AttendanceSession>, ApiError> {
        self.get::<Envelope<Vec<AttendanceSession>>>("/read/attendance")
            .await
            .map(Envelope::into_inner)
    }

    /// The session already recorded for a class on a date. Having none is
    /// the normal case for a fresh day, so a 404 is `Ok(None)`.
    pub async fn attendance_for(
        &self,
        class_id: &str,
        date: NaiveDate,
    ) -> Result<Option<AttendanceSession>, ApiError> {
        let path = format!("/readByClass/{class_id}/{date}");
        let value: Value = match self.get(&path).await {
            Ok(value) => value,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };

        let value = match value {
            Value::Object(mut map) if map.contains_key("data") => {
                map.remove("data").unwrap_or(Value::Null)
            }
            other => other,
        };
        if value.get("classId").is_none() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|source| ApiError::Decode { path, source })
    }

    pub async fn submit_attendance(
        &self,
        payload: &AttendancePayload,
        replace_existing: bool,
    ) -> Result<Value, ApiError> {
        if replace_existing {
            self.put("/update/attendance", payload).await
        } else {
            self.post("/attendance", payload).await
        }
    }

    pub async fn attendance_daily_report(
        &self,
        query: &DailyReportQuery,
    ) -> Result<Vec<AttendanceSession>, ApiError> {
        self.get_with::<Envelope<Vec<AttendanceSession>>>("/attendanceReport/daily", &query.params())
            .await
            .map(Envelope::into_inner)
    }

    pub async fn finance_month_report(
        &self,
        month: &str,
        year: i32,
    ) -> Result<Vec<FinanceTransaction>, ApiError> {
        self.get_with::<Envelope<Vec<FinanceTransaction>>>(
            "/report/month",
            &[("month", month.to_string()), ("year", year.to_string())],
        )
        .await
        .map(Envelope::into_inner)
    }

    pub async fn finance_year_report(&self, year: i32) -> Result<Vec<MonthlyBucket>, ApiError> {
        self.get_with::<Envelope<Vec<MonthlyBucket>>>("/report/monthly", &[("year", year.to_string())])
            .await
            .map(Envelope::into_inner)
    }

    pub async fn payment_status(
        &self,
        month: Option<&str>,
        year: Option<i32>,
    ) -> Result<PaymentStatusReport, ApiError> {
        let mut params = Vec::new();
        if let Some(month) = month {
            params.push(("month", month.to_string()));
        }
        if let Some(year) = year {
            params.push(("year", year.to_string()));
        }
        self.get_with("/report/students/payment-status", &params).await
    }

    pub async fn student_finance_report(
        &self,
        student_id: &str,
    ) -> Result<Vec<FinanceTransaction>, ApiError> {
        self.get::<Envelope<Vec<FinanceTransaction>>>(&format!("/finance/report/student/{student_id}"))
            .await
            .map(Envelope::into_inner)
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ApiError> {
        self.post("/api/auth/login", request).await
    }

    pub async fn current_user(&self) -> Result<Option<User>, ApiError> {
        self.get::<MeResponse>("/api/auth/me").await.map(|me| me.user)
    }

    pub async fn change_password(&self, request: &ChangePassword) -> Result<Value, ApiError> {
        self.put("/api/auth/change-password", request).await
    }

    pub async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        self.get::<Envelope<Vec<User>>>("/api/users")
            .await
            .map(Envelope::into_inner)
    }

    pub async fn create_teacher_account(&self, account: &TeacherAccount) -> Result<Value, ApiError> {
        self.post("/api/users/teacher", account).await
    }

    pub async fn update_user(&self, id: &str, update: &UserUpdate) -> Result<Value, ApiError> {
        self.put(&format!("/api/users/{id}"), update).await
    }

    pub async fn delete_user(&self, id: &str) -> Result<Value, ApiError> {
        self.delete(&format!("/api/users/{id}")).await
    }

    pub async fn teachers_without_accounts(&self) -> Result<Vec<Teacher>, ApiError> {
        self.get::<Envelope<Vec<Teacher>>>("/api/teachers/without-accounts")
            .await
            .map(Envelope::into_inner)
    }
}
