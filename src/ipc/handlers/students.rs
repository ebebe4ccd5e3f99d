use crate::ipc::helpers::{
    class_exists, get_optional_str, get_required_str, get_string_array, student_exists, with_db,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn student_row_json(row: &rusqlite::Row<'_>) -> Result<serde_json::Value, rusqlite::Error> {
    Ok(json!({
        "id": row.get::<_, String>(0)?,
        "name": row.get::<_, String>(1)?,
        "studentNo": row.get::<_, String>(2)?,
        "email": row.get::<_, Option<String>>(3)?,
        "avatarUrl": row.get::<_, Option<String>>(4)?,
    }))
}

fn students_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_optional_str(params, "classId")?;

    let students = match class_id {
        Some(class_id) => {
            if !class_exists(conn, &class_id)? {
                return Err(HandlerErr::not_found("class not found"));
            }
            let mut stmt = conn
                .prepare(
                    "SELECT s.id, s.name, s.student_no, s.email, s.avatar_url
                     FROM students s
                     JOIN enrollments e ON e.student_id = s.id
                     WHERE e.class_id = ?
                     ORDER BY e.sort_order",
                )
                .map_err(|e| HandlerErr::db("db_query_failed", e))?;
            stmt.query_map([&class_id], |row| student_row_json(row))
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(|e| HandlerErr::db("db_query_failed", e))?
        }
        None => {
            let mut stmt = conn
                .prepare(
                    "SELECT id, name, student_no, email, avatar_url
                     FROM students
                     ORDER BY name",
                )
                .map_err(|e| HandlerErr::db("db_query_failed", e))?;
            stmt.query_map([], |row| student_row_json(row))
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(|e| HandlerErr::db("db_query_failed", e))?
        }
    };

    Ok(json!({ "students": students }))
}

fn students_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?.trim().to_string();
    if name.is_empty() {
        return Err(HandlerErr::bad_params("name must not be empty"));
    }
    let student_no = get_required_str(params, "studentNo")?.trim().to_string();
    if student_no.is_empty() {
        return Err(HandlerErr::bad_params("studentNo must not be empty"));
    }
    let email = get_optional_str(params, "email")?;
    let avatar_url = get_optional_str(params, "avatarUrl")?;
    let class_id = get_optional_str(params, "classId")?;

    if let Some(class_id) = &class_id {
        if !class_exists(conn, class_id)? {
            return Err(HandlerErr::not_found("class not found"));
        }
    }

    let student_id = Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO students(id, name, student_no, email, avatar_url, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &student_id,
            &name,
            &student_no,
            &email,
            &avatar_url,
            &created_at,
        ),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "students" })),
    })?;

    if let Some(class_id) = &class_id {
        enroll_at_end(conn, class_id, &student_id)?;
    }

    Ok(json!({ "studentId": student_id, "name": name }))
}

fn enroll_at_end(conn: &Connection, class_id: &str, student_id: &str) -> Result<(), HandlerErr> {
    let next: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM enrollments WHERE class_id = ?",
            [class_id],
            |r| r.get(0),
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    conn.execute(
        "INSERT INTO enrollments(class_id, student_id, sort_order) VALUES(?, ?, ?)
         ON CONFLICT(class_id, student_id) DO NOTHING",
        (class_id, student_id, next),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e))?;
    Ok(())
}

fn students_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    if !student_exists(conn, &student_id)? {
        return Err(HandlerErr::not_found("student not found"));
    }

    if let Some(name) = get_optional_str(params, "name")? {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(HandlerErr::bad_params("name must not be empty"));
        }
        conn.execute(
            "UPDATE students SET name = ? WHERE id = ?",
            (&name, &student_id),
        )
        .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    }
    if let Some(student_no) = get_optional_str(params, "studentNo")? {
        let student_no = student_no.trim().to_string();
        if student_no.is_empty() {
            return Err(HandlerErr::bad_params("studentNo must not be empty"));
        }
        conn.execute(
            "UPDATE students SET student_no = ? WHERE id = ?",
            (&student_no, &student_id),
        )
        .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    }
    if params.get("email").is_some() {
        let email = get_optional_str(params, "email")?;
        conn.execute(
            "UPDATE students SET email = ? WHERE id = ?",
            (&email, &student_id),
        )
        .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    }
    if params.get("avatarUrl").is_some() {
        let avatar_url = get_optional_str(params, "avatarUrl")?;
        conn.execute(
            "UPDATE students SET avatar_url = ? WHERE id = ?",
            (&avatar_url, &student_id),
        )
        .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    }

    Ok(json!({ "ok": true }))
}

fn students_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    if !student_exists(conn, &student_id)? {
        return Err(HandlerErr::not_found("student not found"));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;

    for (sql, table) in [
        (
            "DELETE FROM attendance_records WHERE student_id = ?",
            "attendance_records",
        ),
        (
            "DELETE FROM enrollments WHERE student_id = ?",
            "enrollments",
        ),
        ("DELETE FROM students WHERE id = ?", "students"),
    ] {
        if let Err(e) = tx.execute(sql, [&student_id]) {
            let _ = tx.rollback();
            return Err(HandlerErr {
                code: "db_delete_failed",
                message: e.to_string(),
                details: Some(json!({ "table": table })),
            });
        }
    }

    tx.commit()
        .map_err(|e| HandlerErr::db("db_commit_failed", e))?;
    Ok(json!({ "ok": true }))
}

/// Bulk roster replace. Students dropped from the roster also lose their
/// attendance records for this class.
fn enrollments_set(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let student_ids = get_string_array(params, "studentIds")?;
    if !class_exists(conn, &class_id)? {
        return Err(HandlerErr::not_found("class not found"));
    }

    let missing: Vec<&String> = student_ids
        .iter()
        .filter(|sid| !matches!(student_exists(conn, sid), Ok(true)))
        .collect();
    if !missing.is_empty() {
        return Err(HandlerErr {
            code: "not_found",
            message: "unknown student ids".to_string(),
            details: Some(json!({ "studentIds": missing })),
        });
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;

    // Prune records of students leaving the roster, then rewrite it.
    let mut kept = student_ids.clone();
    kept.sort();
    let prune = tx
        .prepare("SELECT student_id FROM enrollments WHERE class_id = ?")
        .and_then(|mut stmt| {
            stmt.query_map([&class_id], |r| r.get::<_, String>(0))
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        })
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    for old_id in prune {
        if kept.binary_search(&old_id).is_err() {
            tx.execute(
                "DELETE FROM attendance_records WHERE class_id = ? AND student_id = ?",
                (&class_id, &old_id),
            )
            .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
        }
    }

    tx.execute("DELETE FROM enrollments WHERE class_id = ?", [&class_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    for (idx, student_id) in student_ids.iter().enumerate() {
        tx.execute(
            "INSERT INTO enrollments(class_id, student_id, sort_order) VALUES(?, ?, ?)",
            (&class_id, student_id, idx as i64),
        )
        .map_err(|e| HandlerErr::db("db_insert_failed", e))?;
    }

    tx.commit()
        .map_err(|e| HandlerErr::db("db_commit_failed", e))?;
    Ok(json!({ "classId": class_id, "enrolled": student_ids.len() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(with_db(state, req, students_list)),
        "students.create" => Some(with_db(state, req, students_create)),
        "students.update" => Some(with_db(state, req, students_update)),
        "students.delete" => Some(with_db(state, req, students_delete)),
        "enrollments.set" => Some(with_db(state, req, enrollments_set)),
        _ => None,
    }
}
