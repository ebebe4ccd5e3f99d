use crate::db;
use crate::ipc::helpers::{with_db, HandlerErr, DATE_FORMAT};
use crate::ipc::types::{AppState, Request};
use crate::stats::{self, AttendanceStatus};
use chrono::{Datelike, Duration, Local, Utc, Weekday};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

const DEMO_NAMES: [&str; 25] = [
    "Olivia Johnson",
    "Ethan Williams",
    "Sophia Lee",
    "Noah Garcia",
    "Isabella Martinez",
    "Liam Rodriguez",
    "Ava Wilson",
    "Mason Brown",
    "Emma Davis",
    "Jacob Taylor",
    "Charlotte Thomas",
    "Michael Hernandez",
    "Amelia Moore",
    "Alexander Clark",
    "Mia Lewis",
    "James Allen",
    "Harper Young",
    "Benjamin Walker",
    "Evelyn Hall",
    "Lucas Wright",
    "Abigail Hill",
    "Logan Green",
    "Emily Adams",
    "Daniel King",
    "Elizabeth Baker",
];

// (name, description, schedule, grade, roster size)
const DEMO_CLASSES: [(&str, &str, &str, &str, usize); 5] = [
    (
        "Mathematics 101",
        "Introductory mathematics course covering algebra and geometry",
        "Monday, Wednesday, Friday - 9:00 AM to 10:30 AM",
        "9th Grade",
        24,
    ),
    (
        "English Literature",
        "Study of classic literature and composition",
        "Tuesday, Thursday - 11:00 AM to 12:30 PM",
        "10th Grade",
        21,
    ),
    (
        "Physics",
        "Introduction to mechanics and thermodynamics",
        "Monday, Wednesday - 1:00 PM to 2:30 PM",
        "11th Grade",
        18,
    ),
    (
        "Chemistry",
        "General chemistry principles and lab work",
        "Tuesday, Thursday - 2:00 PM to 3:30 PM",
        "11th Grade",
        20,
    ),
    (
        "World History",
        "Survey of global historical events and civilizations",
        "Monday, Wednesday, Friday - 10:45 AM to 11:45 AM",
        "10th Grade",
        23,
    ),
];

const SEEDED_KEY: &str = "demo.seeded";

/// Populate the workspace with the demo classes, rosters, and 30 calendar
/// days of deterministic attendance (weekends skipped). Safe to call again;
/// a marker in settings makes the second call a no-op.
fn demo_seed(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let already = db::settings_get_json(conn, SEEDED_KEY).map_err(|e| HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    })?;
    if already.is_some() {
        return Ok(json!({ "alreadySeeded": true }));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;

    let today = Local::now().date_naive();
    let created_at = Utc::now().to_rfc3339();
    let mut student_total = 0usize;
    let mut record_total = 0usize;
    let mut student_seq = 0usize;

    for (name, description, schedule, grade, roster_size) in DEMO_CLASSES {
        let class_id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO classes(id, name, description, schedule, grade) VALUES(?, ?, ?, ?, ?)",
            (&class_id, name, description, schedule, grade),
        )
        .map_err(|e| HandlerErr::db("db_insert_failed", e))?;

        let mut roster: Vec<String> = Vec::with_capacity(roster_size);
        for i in 0..roster_size {
            let student_id = Uuid::new_v4().to_string();
            let student_name = DEMO_NAMES[i % DEMO_NAMES.len()];
            let student_no = format!("SID{}", 100000 + student_seq);
            let email = format!("student{}@school.edu", student_seq + 1);
            let avatar_url = format!(
                "https://ui-avatars.com/api/?name={}&background=random",
                student_name.replace(' ', "+")
            );
            tx.execute(
                "INSERT INTO students(id, name, student_no, email, avatar_url, created_at)
                 VALUES(?, ?, ?, ?, ?, ?)",
                (
                    &student_id,
                    student_name,
                    &student_no,
                    &email,
                    &avatar_url,
                    &created_at,
                ),
            )
            .map_err(|e| HandlerErr::db("db_insert_failed", e))?;
            tx.execute(
                "INSERT INTO enrollments(class_id, student_id, sort_order) VALUES(?, ?, ?)",
                (&class_id, &student_id, i as i64),
            )
            .map_err(|e| HandlerErr::db("db_insert_failed", e))?;
            roster.push(student_id);
            student_seq += 1;
        }
        student_total += roster.len();

        for day_offset in 0..30usize {
            let date = today - Duration::days(day_offset as i64);
            if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
                continue;
            }
            let date_key = date.format(DATE_FORMAT).to_string();
            for (index, student_id) in roster.iter().enumerate() {
                let status = stats::seed_status(index, day_offset);
                let note = if status == AttendanceStatus::Present {
                    None
                } else {
                    Some(format!("Auto-generated {} record", status.as_str()))
                };
                tx.execute(
                    "INSERT INTO attendance_records(class_id, student_id, date, status, note, updated_at)
                     VALUES(?, ?, ?, ?, ?, ?)
                     ON CONFLICT(class_id, student_id, date) DO UPDATE SET
                       status = excluded.status,
                       note = excluded.note,
                       updated_at = excluded.updated_at",
                    (
                        &class_id,
                        student_id,
                        &date_key,
                        status.as_str(),
                        &note,
                        &created_at,
                    ),
                )
                .map_err(|e| HandlerErr::db("db_insert_failed", e))?;
                record_total += 1;
            }
        }
    }

    db::settings_set_json(&tx, SEEDED_KEY, &json!({ "at": created_at })).map_err(|e| {
        HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: None,
        }
    })?;

    tx.commit()
        .map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    Ok(json!({
        "classes": DEMO_CLASSES.len(),
        "students": student_total,
        "records": record_total,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "demo.seed" => Some(with_db(state, req, demo_seed)),
        _ => None,
    }
}
