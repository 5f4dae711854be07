use std::fmt::Write;

use chrono::NaiveDate;
use serde::Serialize;

use crate::attendance::{AttendanceRecord, AttendanceSummary};
use crate::dashboard::DashboardStats;
use crate::filters::AttendanceFilter;
use crate::finance::{FinanceReport, FinanceSummary};
use crate::models::{FinanceTransaction, PaymentStatusReport};

fn filter_label(filter: &AttendanceFilter) -> String {
    if filter.is_empty() {
        return "no filters".to_string();
    }
    let mut parts = Vec::new();
    if let Some(class_name) = &filter.class_name {
        parts.push(format!("class {class_name}"));
    }
    if let Some(shift) = filter.shift {
        parts.push(format!("shift {shift}"));
    }
    if let Some(part) = filter.part {
        parts.push(part.to_string());
    }
    if let Some(status) = filter.status {
        parts.push(format!("status {status}"));
    }
    parts.join(", ")
}

pub fn build_attendance_report(
    scope: Option<&str>,
    start: NaiveDate,
    end: NaiveDate,
    filter: &AttendanceFilter,
    summary: &AttendanceSummary,
) -> String {
    let mut output = String::new();
    let scope_label = scope.unwrap_or("all classes");

    let _ = writeln!(output, "# Attendance Report");
    let _ = writeln!(
        output,
        "Generated for {} from {} to {} ({})",
        scope_label,
        start,
        end,
        filter_label(filter)
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");
    let _ = writeln!(output, "- Days recorded: {}", summary.total_days);
    let _ = writeln!(output, "- Students: {}", summary.total_students);
    let _ = writeln!(output, "- Average attendance: {}%", summary.average_attendance);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Daily Attendance");

    if summary.daily_attendance.is_empty() {
        let _ = writeln!(output, "No attendance recorded for this range.");
    } else {
        for day in summary.daily_attendance.iter() {
            let _ = writeln!(
                output,
                "- {}: {} present, {} absent of {} ({}%)",
                day.date, day.present, day.absent, day.total, day.percentage
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Students");

    if summary.student_attendance.is_empty() {
        let _ = writeln!(output, "No students match these filters.");
    } else {
        for student in summary.student_attendance.iter() {
            let mut line = format!("- {} ({}", student.name, student.class_name);
            if let Some(shift) = student.shift {
                let _ = write!(line, ", {shift}");
            }
            if summary.has_english_students {
                let _ = write!(line, ", {}", student.part);
            }
            let _ = writeln!(
                output,
                "{line}): {} present, {} absent ({}%)",
                student.present, student.absent, student.percentage
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Absences");

    if summary.absent_students.is_empty() {
        let _ = writeln!(output, "Nobody was absent in this range.");
    } else {
        for student in summary.absent_students.iter() {
            let _ = writeln!(output, "- {}: {} days absent", student.name, student.absent);
        }
    }

    output
}

pub fn build_finance_report(title: &str, report: &FinanceReport) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Finance Report");
    let _ = writeln!(output, "Generated for {title}");
    let _ = writeln!(output);

    if !report.income.is_empty() || report.monthly.is_empty() {
        let _ = writeln!(output, "## Income by Purpose");
        if report.income.is_empty() {
            let _ = writeln!(output, "No payments recorded for this period.");
        } else {
            for line in report.income.iter() {
                let _ = writeln!(output, "- {}: ${:.2}", line.name, line.amount);
            }
        }
        let _ = writeln!(output);
    }

    if !report.monthly.is_empty() {
        let _ = writeln!(output, "## Income by Month");
        for month in report.monthly.iter() {
            let _ = writeln!(output, "- {} {}: ${:.2}", month.month, month.year, month.income);
        }
        let _ = writeln!(output);
    }

    let _ = writeln!(output, "## Totals");
    let _ = writeln!(output, "- Income: ${:.2}", report.total_income);
    let _ = writeln!(output, "- Expenses: ${:.2}", report.total_expenses);
    let _ = writeln!(output, "- Net balance: ${:.2}", report.net_balance);

    output
}

pub fn build_payment_status(title: &str, status: &PaymentStatusReport) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Payment Status");
    let _ = writeln!(
        output,
        "Generated for {}: {} students, {} paid, {} unpaid",
        title, status.total, status.paid, status.unpaid
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Paid");

    if status.students.paid.is_empty() {
        let _ = writeln!(output, "No payments recorded.");
    } else {
        for paid in status.students.paid.iter() {
            let _ = writeln!(
                output,
                "- {} ({}): ${:.2} across {} payments",
                paid.student.full_name,
                paid.student.class_name().unwrap_or("N/A"),
                paid.total_paid(),
                paid.finance_records.len()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Unpaid");

    if status.students.unpaid.is_empty() {
        let _ = writeln!(output, "Everyone has paid.");
    } else {
        for student in status.students.unpaid.iter() {
            let phone = if student.phone.is_empty() { "no phone" } else { &student.phone };
            let _ = writeln!(
                output,
                "- {} ({}, {})",
                student.full_name,
                student.class_name().unwrap_or("N/A"),
                phone
            );
        }
    }

    output
}

/// Plain-text transaction listing with the running summary on top.
pub fn format_transactions(transactions: &[FinanceTransaction], summary: &FinanceSummary) -> String {
    let mut output = String::new();

    let _ = writeln!(
        output,
        "Total ${:.2} | this month ${:.2} | last 7 days ${:.2}",
        summary.total_income, summary.monthly_income, summary.weekly_income
    );
    for line in summary.per_purpose.iter() {
        let _ = writeln!(output, "  {}: ${:.2}", line.name, line.amount);
    }
    let _ = writeln!(output);

    if transactions.is_empty() {
        let _ = writeln!(output, "No transactions recorded.");
        return output;
    }

    for tx in transactions.iter() {
        let paid = tx
            .date_paid
            .map(|ts| ts.date_naive().to_string())
            .unwrap_or_else(|| "-".to_string());
        let year = tx.year.map(|y| y.to_string()).unwrap_or_default();
        let _ = writeln!(
            output,
            "{}  {} ({})  {} {}  {}  ${:.2}  paid {}",
            tx.id,
            tx.student_name(),
            tx.class_name(),
            tx.month,
            year,
            tx.purpose,
            tx.amount_paid,
            paid
        );
    }

    output
}

pub fn format_dashboard(stats: &DashboardStats, show_finance: bool) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "Students:          {}", stats.total_students);
    let _ = writeln!(output, "Teachers:          {}", stats.total_teachers);
    let _ = writeln!(output, "Classes:           {}", stats.total_classes);
    let _ = writeln!(
        output,
        "Present today:     {}/{} ({}%)",
        stats.today_present,
        stats.total_students,
        stats.attendance_rate()
    );
    if show_finance {
        let _ = writeln!(output, "Income this month: ${:.2}", stats.monthly_income);
        let _ = writeln!(output, "Total income:      ${:.2}", stats.total_income);
        let _ = writeln!(output, "Monthly average:   ${:.2}", stats.average_monthly_income());
    }

    output
}

#[derive(Serialize)]
struct CsvRow<'a> {
    date: NaiveDate,
    class: &'a str,
    student_id: &'a str,
    student: &'a str,
    shift: &'a str,
    part: &'a str,
    status: &'a str,
}

pub fn write_attendance_csv<W: std::io::Write>(
    out: W,
    records: &[AttendanceRecord],
) -> anyhow::Result<usize> {
    let mut writer = csv::Writer::from_writer(out);
    for record in records {
        writer.serialize(CsvRow {
            date: record.date,
            class: &record.class_name,
            student_id: &record.student_id,
            student: &record.student_name,
            shift: record.shift.map(|s| s.label()).unwrap_or(""),
            part: record.part.label(),
            status: record.status.label(),
        })?;
    }
    writer.flush()?;
    Ok(records.len())
}
