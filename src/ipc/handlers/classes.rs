use crate::ipc::helpers::{
    class_exists, get_optional_str, get_required_str, with_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn classes_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    // Include enrollment counts so the UI can render dashboard cards without
    // a second round trip.
    let mut stmt = conn
        .prepare(
            "SELECT
               c.id,
               c.name,
               c.description,
               c.schedule,
               c.grade,
               (SELECT COUNT(*) FROM enrollments e WHERE e.class_id = c.id) AS student_count
             FROM classes c
             ORDER BY c.name",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    let classes = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "description": row.get::<_, Option<String>>(2)?,
                "schedule": row.get::<_, String>(3)?,
                "grade": row.get::<_, String>(4)?,
                "studentCount": row.get::<_, i64>(5)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    Ok(json!({ "classes": classes }))
}

fn classes_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?.trim().to_string();
    if name.is_empty() {
        return Err(HandlerErr::bad_params("name must not be empty"));
    }
    let description = get_optional_str(params, "description")?;
    let schedule = get_optional_str(params, "schedule")?.unwrap_or_default();
    let grade = get_optional_str(params, "grade")?.unwrap_or_default();

    let class_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, name, description, schedule, grade) VALUES(?, ?, ?, ?, ?)",
        (&class_id, &name, &description, &schedule, &grade),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "classes" })),
    })?;

    Ok(json!({ "classId": class_id, "name": name }))
}

fn classes_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    if !class_exists(conn, &class_id)? {
        return Err(HandlerErr::not_found("class not found"));
    }

    if let Some(name) = get_optional_str(params, "name")? {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(HandlerErr::bad_params("name must not be empty"));
        }
        conn.execute("UPDATE classes SET name = ? WHERE id = ?", (&name, &class_id))
            .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    }
    if params.get("description").is_some() {
        let description = get_optional_str(params, "description")?;
        conn.execute(
            "UPDATE classes SET description = ? WHERE id = ?",
            (&description, &class_id),
        )
        .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    }
    if let Some(schedule) = get_optional_str(params, "schedule")? {
        conn.execute(
            "UPDATE classes SET schedule = ? WHERE id = ?",
            (&schedule, &class_id),
        )
        .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    }
    if let Some(grade) = get_optional_str(params, "grade")? {
        conn.execute(
            "UPDATE classes SET grade = ? WHERE id = ?",
            (&grade, &class_id),
        )
        .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    }

    Ok(json!({ "ok": true }))
}

fn classes_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    if !class_exists(conn, &class_id)? {
        return Err(HandlerErr::not_found("class not found"));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;

    // Explicitly delete in dependency order (no ON DELETE CASCADE).
    for (sql, table) in [
        (
            "DELETE FROM attendance_records WHERE class_id = ?",
            "attendance_records",
        ),
        ("DELETE FROM enrollments WHERE class_id = ?", "enrollments"),
        ("DELETE FROM classes WHERE id = ?", "classes"),
    ] {
        if let Err(e) = tx.execute(sql, [&class_id]) {
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

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(with_db(state, req, |conn, _| classes_list(conn))),
        "classes.create" => Some(with_db(state, req, |conn, p| classes_create(conn, p))),
        "classes.update" => Some(with_db(state, req, |conn, p| classes_update(conn, p))),
        "classes.delete" => Some(with_db(state, req, |conn, p| classes_delete(conn, p))),
        _ => None,
    }
}
