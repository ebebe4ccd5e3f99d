use crate::ipc::helpers::{
    class_exists, get_optional_date, get_required_str, with_db, HandlerErr, DATE_FORMAT,
};
use crate::ipc::types::{AppState, Request};
use crate::stats::{self, AttendanceStatus};
use chrono::{Local, NaiveDate};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde_json::json;
use std::collections::HashMap;

struct RecordRow {
    class_id: String,
    student_id: String,
    date: NaiveDate,
    status: AttendanceStatus,
}

fn load_records(
    conn: &Connection,
    class_id: Option<&str>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Vec<RecordRow>, HandlerErr> {
    let mut sql = String::from(
        "SELECT class_id, student_id, date, status FROM attendance_records WHERE 1=1",
    );
    let mut args: Vec<Value> = Vec::new();
    if let Some(class_id) = class_id {
        sql.push_str(" AND class_id = ?");
        args.push(Value::Text(class_id.to_string()));
    }
    if let Some(from) = from {
        sql.push_str(" AND date >= ?");
        args.push(Value::Text(from.format(DATE_FORMAT).to_string()));
    }
    if let Some(to) = to {
        sql.push_str(" AND date <= ?");
        args.push(Value::Text(to.format(DATE_FORMAT).to_string()));
    }

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let raw = stmt
        .query_map(params_from_iter(args), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    // Writes validate both fields, so rows that fail to parse here would mean
    // outside edits to the db. Skip them rather than poisoning whole reports.
    let mut rows = Vec::with_capacity(raw.len());
    for (class_id, student_id, date, status) in raw {
        let parsed_date = NaiveDate::parse_from_str(&date, DATE_FORMAT).ok();
        let parsed_status = AttendanceStatus::parse(&status);
        if let (Some(date), Some(status)) = (parsed_date, parsed_status) {
            rows.push(RecordRow {
                class_id,
                student_id,
                date,
                status,
            });
        }
    }
    Ok(rows)
}

fn range_params(
    params: &serde_json::Value,
) -> Result<(Option<NaiveDate>, Option<NaiveDate>), HandlerErr> {
    let from = get_optional_date(params, "from")?;
    let to = get_optional_date(params, "to")?;
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(HandlerErr::bad_params("from must not be after to"));
        }
    }
    Ok((from, to))
}

fn stats_json(stats: stats::AttendanceStats) -> serde_json::Value {
    json!({ "stats": stats, "percentages": stats.percentages() })
}

/// School-wide totals plus a per-class breakdown over an optional date range.
fn report_overview(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (from, to) = range_params(params)?;
    let records = load_records(conn, None, from, to)?;

    let overall = stats::aggregate(records.iter().map(|r| r.status));

    let mut per_class: HashMap<&str, stats::AttendanceStats> = HashMap::new();
    for r in &records {
        per_class.entry(&r.class_id).or_default().record(r.status);
    }

    let mut stmt = conn
        .prepare("SELECT id, name FROM classes ORDER BY name")
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let classes = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    let class_rows: Vec<serde_json::Value> = classes
        .iter()
        .map(|(id, name)| {
            let class_stats = per_class.get(id.as_str()).copied().unwrap_or_default();
            json!({
                "classId": id,
                "name": name,
                "stats": class_stats,
                "percentages": class_stats.percentages(),
            })
        })
        .collect();

    let mut result = stats_json(overall);
    result["classes"] = json!(class_rows);
    Ok(result)
}

fn report_class(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let (from, to) = range_params(params)?;
    if !class_exists(conn, &class_id)? {
        return Err(HandlerErr::not_found("class not found"));
    }

    let records = load_records(conn, Some(&class_id), from, to)?;
    let class_stats = stats::aggregate(records.iter().map(|r| r.status));

    let mut result = stats_json(class_stats);
    result["classId"] = json!(class_id);
    Ok(result)
}

/// Per-student rows for one class, sorted by present-rate descending.
/// Enrolled students with no records in range still appear, at 0%.
fn report_students(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let (from, to) = range_params(params)?;
    if !class_exists(conn, &class_id)? {
        return Err(HandlerErr::not_found("class not found"));
    }

    let mut stmt = conn
        .prepare(
            "SELECT s.id, s.name, s.student_no
             FROM students s
             JOIN enrollments e ON e.student_id = s.id
             WHERE e.class_id = ?
             ORDER BY e.sort_order",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let roster = stmt
        .query_map([&class_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    let records = load_records(conn, Some(&class_id), from, to)?;
    let mut per_student: HashMap<&str, stats::AttendanceStats> = HashMap::new();
    for r in &records {
        per_student.entry(&r.student_id).or_default().record(r.status);
    }

    let mut rows: Vec<(u32, serde_json::Value)> = roster
        .iter()
        .map(|(id, name, student_no)| {
            let s = per_student.get(id.as_str()).copied().unwrap_or_default();
            let present_rate = stats::percent(s.present, s.total);
            let row = json!({
                "studentId": id,
                "name": name,
                "studentNo": student_no,
                "stats": s,
                "presentRate": present_rate,
            });
            (present_rate, row)
        })
        .collect();
    // Stable sort keeps roster order among equal rates.
    rows.sort_by(|a, b| b.0.cmp(&a.0));

    Ok(json!({
        "classId": class_id,
        "students": rows.into_iter().map(|(_, row)| row).collect::<Vec<_>>(),
    }))
}

/// Daily series over the last N days with trend and best/worst buckets.
fn report_trend(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let days = match params.get("days") {
        None => 7,
        Some(v) => v
            .as_u64()
            .filter(|d| (1..=366).contains(d))
            .ok_or_else(|| HandlerErr::bad_params("days must be between 1 and 366"))?,
    } as u32;
    if !class_exists(conn, &class_id)? {
        return Err(HandlerErr::not_found("class not found"));
    }

    let today = Local::now().date_naive();
    let dates = stats::last_n_days(today, days);
    let records = load_records(conn, Some(&class_id), dates.first().copied(), Some(today))?;
    let pairs: Vec<(NaiveDate, AttendanceStatus)> =
        records.iter().map(|r| (r.date, r.status)).collect();

    let series = stats::daily_series(&pairs, &dates);
    let days_json: Vec<serde_json::Value> = series
        .iter()
        .map(|day| {
            json!({
                "date": day.date.format(DATE_FORMAT).to_string(),
                "stats": day.stats,
                "percentages": day.stats.percentages(),
            })
        })
        .collect();

    Ok(json!({
        "classId": class_id,
        "days": days_json,
        "trend": stats::trend(&series),
        "bestDay": stats::best_day(&series).map(|d| d.date.format(DATE_FORMAT).to_string()),
        "worstDay": stats::worst_day(&series).map(|d| d.date.format(DATE_FORMAT).to_string()),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.overview" => Some(with_db(state, req, report_overview)),
        "reports.class" => Some(with_db(state, req, report_class)),
        "reports.students" => Some(with_db(state, req, report_students)),
        "reports.trend" => Some(with_db(state, req, report_trend)),
        _ => None,
    }
}
