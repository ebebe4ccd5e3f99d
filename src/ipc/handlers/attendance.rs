use crate::ipc::helpers::{
    class_exists, get_optional_str, get_required_date, get_required_status, get_required_str,
    get_string_array, student_enrolled, with_db, HandlerErr, DATE_FORMAT,
};
use crate::ipc::types::{AppState, Request};
use crate::stats::{self, AttendanceStatus};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashMap;

/// A session is one class on one calendar day. Opening it returns the full
/// roster; students without a stored record for that day default to absent,
/// mirroring how the marking screen presents an untouched list.
fn session_open(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let date = get_required_date(params, "date")?;
    if !class_exists(conn, &class_id)? {
        return Err(HandlerErr::not_found("class not found"));
    }
    let date_key = date.format(DATE_FORMAT).to_string();

    let mut stmt = conn
        .prepare(
            "SELECT s.id, s.name, s.student_no, s.avatar_url
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
                r.get::<_, Option<String>>(3)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    let mut recorded: HashMap<String, (AttendanceStatus, Option<String>)> = HashMap::new();
    let mut stmt = conn
        .prepare(
            "SELECT student_id, status, note
             FROM attendance_records
             WHERE class_id = ? AND date = ?",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let rows = stmt
        .query_map((&class_id, &date_key), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, Option<String>>(2)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    for (student_id, status, note) in rows {
        if let Some(status) = AttendanceStatus::parse(&status) {
            recorded.insert(student_id, (status, note));
        }
    }

    let mut effective: Vec<AttendanceStatus> = Vec::with_capacity(roster.len());
    let rows_json: Vec<serde_json::Value> = roster
        .iter()
        .map(|(id, name, student_no, avatar_url)| {
            let (status, note, has_record) = match recorded.get(id) {
                Some((status, note)) => (*status, note.clone(), true),
                None => (AttendanceStatus::Absent, None, false),
            };
            effective.push(status);
            json!({
                "studentId": id,
                "name": name,
                "studentNo": student_no,
                "avatarUrl": avatar_url,
                "status": status.as_str(),
                "note": note,
                "recorded": has_record,
            })
        })
        .collect();

    let session_stats = stats::aggregate(effective);

    Ok(json!({
        "classId": class_id,
        "date": date_key,
        "rows": rows_json,
        "stats": session_stats,
        "percentages": session_stats.percentages(),
    }))
}

fn set_status(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let date = get_required_date(params, "date")?;
    let student_id = get_required_str(params, "studentId")?;
    let status = get_required_status(params, "status")?;
    let note = get_optional_str(params, "note")?;

    if !class_exists(conn, &class_id)? {
        return Err(HandlerErr::not_found("class not found"));
    }
    if !student_enrolled(conn, &class_id, &student_id)? {
        return Err(HandlerErr::not_found("student not enrolled in class"));
    }

    let date_key = date.format(DATE_FORMAT).to_string();
    let updated_at = Utc::now().to_rfc3339();
    // Overwrite semantics: the triple is the identity, a second save for the
    // same day replaces status and note outright.
    conn.execute(
        "INSERT INTO attendance_records(class_id, student_id, date, status, note, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)
         ON CONFLICT(class_id, student_id, date) DO UPDATE SET
           status = excluded.status,
           note = excluded.note,
           updated_at = excluded.updated_at",
        (
            &class_id,
            &student_id,
            &date_key,
            status.as_str(),
            &note,
            &updated_at,
        ),
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "attendance_records" })),
    })?;

    Ok(json!({ "ok": true }))
}

fn set_note(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let date = get_required_date(params, "date")?;
    let student_id = get_required_str(params, "studentId")?;
    let note = get_optional_str(params, "note")?;
    let date_key = date.format(DATE_FORMAT).to_string();

    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM attendance_records WHERE class_id = ? AND student_id = ? AND date = ?",
            (&class_id, &student_id, &date_key),
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if exists.is_none() {
        return Err(HandlerErr::not_found("no record for that student and date"));
    }

    let updated_at = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE attendance_records SET note = ?, updated_at = ?
         WHERE class_id = ? AND student_id = ? AND date = ?",
        (&note, &updated_at, &class_id, &student_id, &date_key),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", e))?;

    Ok(json!({ "ok": true }))
}

fn bulk_set_status(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let date = get_required_date(params, "date")?;
    let status = get_required_status(params, "status")?;
    let student_ids = get_string_array(params, "studentIds")?;
    if !class_exists(conn, &class_id)? {
        return Err(HandlerErr::not_found("class not found"));
    }
    let date_key = date.format(DATE_FORMAT).to_string();
    let updated_at = Utc::now().to_rfc3339();

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;
    let mut written = 0usize;
    for student_id in &student_ids {
        if !student_enrolled(&tx, &class_id, student_id)? {
            continue;
        }
        tx.execute(
            "INSERT INTO attendance_records(class_id, student_id, date, status, note, updated_at)
             VALUES(?, ?, ?, ?, NULL, ?)
             ON CONFLICT(class_id, student_id, date) DO UPDATE SET
               status = excluded.status,
               note = excluded.note,
               updated_at = excluded.updated_at",
            (&class_id, student_id, &date_key, status.as_str(), &updated_at),
        )
        .map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "attendance_records" })),
        })?;
        written += 1;
    }
    tx.commit()
        .map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    Ok(json!({ "written": written }))
}

fn session_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let date = get_required_date(params, "date")?;
    let date_key = date.format(DATE_FORMAT).to_string();

    let deleted = conn
        .execute(
            "DELETE FROM attendance_records WHERE class_id = ? AND date = ?",
            (&class_id, &date_key),
        )
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;

    Ok(json!({ "deleted": deleted }))
}

fn record_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let date = get_required_date(params, "date")?;
    let student_id = get_required_str(params, "studentId")?;
    let date_key = date.format(DATE_FORMAT).to_string();

    let deleted = conn
        .execute(
            "DELETE FROM attendance_records WHERE class_id = ? AND student_id = ? AND date = ?",
            (&class_id, &student_id, &date_key),
        )
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;

    Ok(json!({ "deleted": deleted }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.sessionOpen" => Some(with_db(state, req, session_open)),
        "attendance.setStatus" => Some(with_db(state, req, set_status)),
        "attendance.setNote" => Some(with_db(state, req, set_note)),
        "attendance.bulkSetStatus" => Some(with_db(state, req, bulk_set_status)),
        "attendance.sessionDelete" => Some(with_db(state, req, session_delete)),
        "attendance.recordDelete" => Some(with_db(state, req, record_delete)),
        _ => None,
    }
}
