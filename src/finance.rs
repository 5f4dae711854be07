use chrono::{Datelike, Duration, Month, NaiveDate};
use serde::Serialize;
use thiserror::Error;

use crate::models::{FinanceTransaction, MonthlyBucket, Purpose};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncomeLine {
    pub name: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyIncome {
    pub month: String,
    pub year: i64,
    pub income: f64,
    pub expenses: f64,
}

/// Either a purpose breakdown (one month) or a month trend (one year). The
/// two modes fill different fields and are never merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FinanceReport {
    pub income: Vec<IncomeLine>,
    pub monthly: Vec<MonthlyIncome>,
    pub total_income: f64,
    pub total_expenses: f64,
    pub net_balance: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FinanceSummary {
    pub total_income: f64,
    pub monthly_income: f64,
    pub weekly_income: f64,
    pub per_purpose: Vec<IncomeLine>,
}

pub fn summarize_by_purpose(transactions: &[FinanceTransaction]) -> FinanceReport {
    let income = purpose_breakdown(transactions);
    let total_income = income.iter().map(|line| line.amount).sum();

    FinanceReport {
        income,
        monthly: Vec::new(),
        total_income,
        total_expenses: 0.0,
        net_balance: total_income,
    }
}

pub fn summarize_by_month(buckets: &[MonthlyBucket], fallback_year: i64) -> FinanceReport {
    let monthly: Vec<MonthlyIncome> = buckets
        .iter()
        .map(|bucket| {
            let key = bucket.key.as_ref();
            MonthlyIncome {
                month: key
                    .and_then(|k| k.month.as_ref())
                    .map(|m| m.name())
                    .unwrap_or_else(|| "Unknown".to_string()),
                year: key.and_then(|k| k.year).unwrap_or(fallback_year),
                income: bucket.total_amount,
                expenses: 0.0,
            }
        })
        .collect();
    let total_income = monthly.iter().map(|m| m.income).sum();

    FinanceReport {
        income: Vec::new(),
        monthly,
        total_income,
        total_expenses: 0.0,
        net_balance: total_income,
    }
}

/// Totals over the full transaction list relative to `today`: everything,
/// the current calendar month, and the trailing seven days including today.
pub fn live_summary(transactions: &[FinanceTransaction], today: NaiveDate) -> FinanceSummary {
    let current_month = month_name(today);
    let current_year = i64::from(today.year());
    let week_start = today - Duration::days(6);

    let mut summary = FinanceSummary {
        per_purpose: purpose_breakdown(transactions),
        ..Default::default()
    };

    for tx in transactions {
        summary.total_income += tx.amount_paid;

        if tx.month == current_month && tx.year == Some(current_year) {
            summary.monthly_income += tx.amount_paid;
        }

        if let Some(paid) = tx.date_paid.map(|ts| ts.date_naive()) {
            if paid >= week_start && paid <= today {
                summary.weekly_income += tx.amount_paid;
            }
        }
    }

    summary
}

fn purpose_breakdown(transactions: &[FinanceTransaction]) -> Vec<IncomeLine> {
    let mut lines: Vec<(Purpose, f64)> = Vec::new();
    for tx in transactions {
        match lines.iter_mut().find(|(purpose, _)| *purpose == tx.purpose) {
            Some((_, amount)) => *amount += tx.amount_paid,
            None => lines.push((tx.purpose, tx.amount_paid)),
        }
    }
    lines
        .into_iter()
        .map(|(purpose, amount)| IncomeLine {
            name: purpose.label().to_string(),
            amount,
        })
        .collect()
}

pub fn month_name(date: NaiveDate) -> &'static str {
    Month::try_from(date.month() as u8)
        .map(|month| month.name())
        .unwrap_or("January")
}

pub fn parse_month(value: &str) -> Option<&'static str> {
    (1u8..=12)
        .filter_map(|n| Month::try_from(n).ok())
        .map(|month| month.name())
        .find(|name| name.eq_ignore_ascii_case(value.trim()))
}

#[derive(Debug, Error, PartialEq)]
pub enum TransactionError {
    #[error("Amount paid must be greater than zero")]
    NonPositiveAmount,
    #[error("Unknown month '{0}'")]
    UnknownMonth(String),
    #[error("Year {0} is outside 2020-2100")]
    YearOutOfRange(i32),
    #[error("Please select a student")]
    MissingStudent,
}

/// Body of a finance create/update request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionInput {
    #[serde(rename = "fullName")]
    pub student_id: String,
    #[serde(rename = "classId", skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,
    pub month: String,
    pub year: i32,
    #[serde(rename = "amountPaid")]
    pub amount_paid: f64,
    pub purpose: Purpose,
    #[serde(rename = "datePaid")]
    pub date_paid: NaiveDate,
}

impl TransactionInput {
    /// Checks the form before anything is sent; normalises the month name.
    pub fn validate(mut self) -> Result<Self, TransactionError> {
        if self.student_id.trim().is_empty() {
            return Err(TransactionError::MissingStudent);
        }
        if !(self.amount_paid > 0.0) {
            return Err(TransactionError::NonPositiveAmount);
        }
        self.month = parse_month(&self.month)
            .ok_or_else(|| TransactionError::UnknownMonth(self.month.clone()))?
            .to_string();
        if !(2020..=2100).contains(&self.year) {
            return Err(TransactionError::YearOutOfRange(self.year));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{midnight_utc, MonthKey, MonthLabel};

    fn tx(purpose: Purpose, amount: f64) -> FinanceTransaction {
        FinanceTransaction {
            id: format!("{purpose}-{amount}"),
            student: None,
            class: None,
            month: "January".to_string(),
            year: Some(2024),
            amount_paid: amount,
            purpose,
            date_paid: None,
        }
    }

    fn paid_on(mut t: FinanceTransaction, date: NaiveDate) -> FinanceTransaction {
        t.month = month_name(date).to_string();
        t.year = Some(i64::from(date.year()));
        t.date_paid = Some(midnight_utc(date));
        t
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn purpose_breakdown_matches_worked_example() {
        let transactions = vec![
            tx(Purpose::Tuition, 100.0),
            tx(Purpose::Tuition, 50.0),
            tx(Purpose::Exam, 30.0),
        ];
        let report = summarize_by_purpose(&transactions);
        assert_eq!(
            report.income,
            vec![
                IncomeLine { name: "Tuition".into(), amount: 150.0 },
                IncomeLine { name: "Exam".into(), amount: 30.0 },
            ]
        );
        assert_eq!(report.total_income, 180.0);
        assert_eq!(report.total_expenses, 0.0);
        assert_eq!(report.net_balance, 180.0);
        assert!(report.monthly.is_empty());
    }

    #[test]
    fn month_trend_uses_bucket_labels() {
        let buckets = vec![
            MonthlyBucket {
                key: Some(MonthKey { month: Some(MonthLabel::Number(2)), year: Some(2024) }),
                total_amount: 200.0,
            },
            MonthlyBucket { key: None, total_amount: 5.0 },
        ];
        let report = summarize_by_month(&buckets, 2025);
        assert_eq!(report.monthly[0].month, "February");
        assert_eq!(report.monthly[1].month, "Unknown");
        assert_eq!(report.monthly[1].year, 2025);
        assert_eq!(report.total_income, 205.0);
        assert_eq!(report.net_balance, report.total_income);
        assert!(report.income.is_empty());
    }

    #[test]
    fn live_summary_buckets_by_month_and_week() {
        let today = day(2024, 3, 10);
        let transactions = vec![
            paid_on(tx(Purpose::Tuition, 100.0), today),
            paid_on(tx(Purpose::Exam, 40.0), day(2024, 3, 4)),
            paid_on(tx(Purpose::Exam, 25.0), day(2024, 3, 3)),
            paid_on(tx(Purpose::Registration, 10.0), day(2024, 2, 28)),
            paid_on(tx(Purpose::Other, 7.0), day(2024, 3, 11)),
        ];

        let summary = live_summary(&transactions, today);
        assert_eq!(summary.total_income, 182.0);
        assert_eq!(summary.monthly_income, 172.0);
        assert_eq!(summary.weekly_income, 140.0);
        assert_eq!(summary.per_purpose.len(), 4);
    }

    #[test]
    fn month_must_match_year_too() {
        let today = day(2024, 1, 15);
        let mut last_year = tx(Purpose::Tuition, 80.0);
        last_year.year = Some(2023);
        let summary = live_summary(&[last_year], today);
        assert_eq!(summary.monthly_income, 0.0);
        assert_eq!(summary.total_income, 80.0);
    }

    #[test]
    fn transaction_input_is_validated_before_sending() {
        let input = TransactionInput {
            student_id: "st1".into(),
            class_id: None,
            month: "march".into(),
            year: 2024,
            amount_paid: 25.0,
            purpose: Purpose::Tuition,
            date_paid: day(2024, 3, 2),
        };
        assert_eq!(input.clone().validate().unwrap().month, "March");

        let zero = TransactionInput { amount_paid: 0.0, ..input.clone() };
        assert_eq!(zero.validate(), Err(TransactionError::NonPositiveAmount));

        let bad_month = TransactionInput { month: "Smarch".into(), ..input.clone() };
        assert!(matches!(bad_month.validate(), Err(TransactionError::UnknownMonth(_))));

        let old = TransactionInput { year: 1999, ..input };
        assert_eq!(old.validate(), Err(TransactionError::YearOutOfRange(1999)));
    }
}
