use crate::db;
use crate::ipc::helpers::{get_optional_str, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

const PROFILE_KEY: &str = "profile";

fn settings_get(
    conn: &Connection,
    _params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let profile = db::settings_get_json(conn, PROFILE_KEY)
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?
        .unwrap_or_else(|| json!({}));
    Ok(json!({ "profile": profile }))
}

fn settings_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let mut profile = db::settings_get_json(conn, PROFILE_KEY)
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?
        .unwrap_or_else(|| json!({}));

    if let Some(display_name) = get_optional_str(params, "displayName")? {
        profile["displayName"] = json!(display_name);
    }
    if let Some(school) = get_optional_str(params, "school")? {
        profile["school"] = json!(school);
    }

    db::settings_set_json(conn, PROFILE_KEY, &profile).map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: None,
    })?;
    Ok(json!({ "profile": profile }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "settings.get" => Some(with_db(state, req, settings_get)),
        "settings.update" => Some(with_db(state, req, settings_update)),
        _ => None,
    }
}
