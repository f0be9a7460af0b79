//! Todo CRUD routes and the todo JSON shape.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use super::ApiState;
use super::error::ApiError;
use super::extract::AuthUser;
use crate::store::types::{DEFAULT_CATEGORY, DEFAULT_PRIORITY};
use crate::store::{NewTask, Task, TaskId, TaskPatch};

/// Wire format of due dates, interpreted in the client's UTC offset.
pub const DUE_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Parse a client due date. Empty, `"null"`, `"undefined"` and unparsable
/// input all mean "no due date".
pub fn parse_due_date(raw: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "null" || raw == "undefined" {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(raw, DUE_DATE_FORMAT).ok()?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|local| local.with_timezone(&Utc))
}

/// Render a due time in the client's UTC offset.
pub fn format_due_date(due_at: DateTime<Utc>, offset: FixedOffset) -> String {
    due_at.with_timezone(&offset).format(DUE_DATE_FORMAT).to_string()
}

/// A todo as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TodoView {
    pub id: TaskId,
    pub title: String,
    pub due_date: Option<String>,
    pub priority: String,
    pub category: String,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub completed: bool,
    pub reminder_sent: bool,
    pub created_at: String,
}

impl TodoView {
    pub fn render(task: Task, offset: FixedOffset) -> Self {
        Self {
            id: task.id,
            title: task.title,
            due_date: task.due_at.map(|d| format_due_date(d, offset)),
            priority: task.priority,
            category: task.category,
            tags: task.tags,
            notes: task.notes,
            completed: task.completed,
            reminder_sent: task.reminder_sent,
            created_at: task.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct CreateTodoBody {
    title: Option<String>,
    due_date: Option<String>,
    priority: Option<String>,
    category: Option<String>,
    tags: Option<Vec<String>>,
    notes: Option<String>,
    completed: Option<bool>,
}

fn label_or(value: Option<&str>, default: &str) -> String {
    value
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_owned())
}

fn clean_notes(notes: Option<&str>) -> Option<String> {
    notes
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_owned)
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .map(|t| t.trim().to_owned())
        .filter(|t| !t.is_empty())
        .collect()
}

fn new_task_from(body: CreateTodoBody, offset: FixedOffset) -> Result<NewTask, ApiError> {
    let title = body
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::bad_request("Title is required"))?;

    Ok(NewTask {
        title: title.to_owned(),
        due_at: body
            .due_date
            .as_deref()
            .and_then(|raw| parse_due_date(raw, offset)),
        priority: label_or(body.priority.as_deref(), DEFAULT_PRIORITY),
        category: label_or(body.category.as_deref(), DEFAULT_CATEGORY),
        tags: clean_tags(body.tags.unwrap_or_default()),
        notes: clean_notes(body.notes.as_deref()),
        completed: body.completed.unwrap_or(false),
    })
}

fn string_field<'a>(value: &'a Value, field: &str) -> Result<&'a str, ApiError> {
    value
        .as_str()
        .ok_or_else(|| ApiError::bad_request(format!("{field} must be a string")))
}

/// Build a patch from a JSON object. Only keys present in the object are
/// patched; a present `due_date` key always re-arms the reminder.
pub(super) fn patch_from_json(
    body: &Map<String, Value>,
    offset: FixedOffset,
) -> Result<TaskPatch, ApiError> {
    let mut patch = TaskPatch::default();

    if let Some(title) = body.get("title") {
        let title = string_field(title, "title")?.trim();
        if title.is_empty() {
            return Err(ApiError::bad_request("Title is required"));
        }
        patch.title = Some(title.to_owned());
    }
    if let Some(completed) = body.get("completed") {
        let completed = completed
            .as_bool()
            .ok_or_else(|| ApiError::bad_request("completed must be a boolean"))?;
        patch.completed = Some(completed);
    }
    if let Some(due) = body.get("due_date") {
        patch.due_at = Some(due.as_str().and_then(|raw| parse_due_date(raw, offset)));
    }
    if let Some(priority) = body.get("priority") {
        patch.priority = Some(label_or(
            Some(string_field(priority, "priority")?),
            DEFAULT_PRIORITY,
        ));
    }
    if let Some(category) = body.get("category") {
        patch.category = Some(label_or(
            Some(string_field(category, "category")?),
            DEFAULT_CATEGORY,
        ));
    }
    if let Some(tags) = body.get("tags") {
        let tags = match tags {
            Value::Null => Vec::new(),
            Value::Array(items) => items
                .iter()
                .map(|t| string_field(t, "tags").map(str::to_owned))
                .collect::<Result<Vec<_>, _>>()?,
            _ => return Err(ApiError::bad_request("tags must be a list of strings")),
        };
        patch.tags = Some(clean_tags(tags));
    }
    if let Some(notes) = body.get("notes") {
        let notes = match notes {
            Value::Null => None,
            other => clean_notes(Some(string_field(other, "notes")?)),
        };
        patch.notes = Some(notes);
    }

    Ok(patch)
}

pub(super) async fn list_todos(
    State(state): State<ApiState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<TodoView>>, ApiError> {
    let tasks = state
        .on_store(move |store| store.list_tasks_for_user(user_id))
        .await??;
    debug!(user_id, count = tasks.len(), "listing todos");
    Ok(Json(
        tasks
            .into_iter()
            .map(|t| TodoView::render(t, state.client_offset))
            .collect(),
    ))
}

pub(super) async fn create_todo(
    State(state): State<ApiState>,
    AuthUser(user_id): AuthUser,
    body: Result<Json<CreateTodoBody>, JsonRejection>,
) -> Result<(StatusCode, Json<TodoView>), ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let new_task = new_task_from(body, state.client_offset)?;
    let task = state
        .on_store(move |store| store.insert_task(user_id, &new_task))
        .await??;
    info!(user_id, task_id = task.id, due = ?task.due_at, "todo created");
    Ok((
        StatusCode::CREATED,
        Json(TodoView::render(task, state.client_offset)),
    ))
}

pub(super) async fn update_todo(
    State(state): State<ApiState>,
    AuthUser(user_id): AuthUser,
    task_id: Result<Path<TaskId>, PathRejection>,
    body: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<Json<TodoView>, ApiError> {
    let Path(task_id) = task_id.map_err(|_| ApiError::not_found())?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let patch = patch_from_json(&body, state.client_offset)?;

    let rearmed = patch.due_at.is_some();
    let task = state
        .on_store(move |store| store.update_task_for_user(task_id, user_id, &patch))
        .await??
        .ok_or_else(ApiError::not_found)?;
    if rearmed {
        debug!(task_id, "due date edited; reminder re-armed");
    }
    Ok(Json(TodoView::render(task, state.client_offset)))
}

pub(super) async fn delete_todo(
    State(state): State<ApiState>,
    AuthUser(user_id): AuthUser,
    task_id: Result<Path<TaskId>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let Path(task_id) = task_id.map_err(|_| ApiError::not_found())?;
    let deleted = state
        .on_store(move |store| store.delete_task_for_user(task_id, user_id))
        .await??;
    if !deleted {
        return Err(ApiError::not_found());
    }
    info!(user_id, task_id, "todo deleted");
    Ok(Json(json!({ "message": "Deleted" })))
}
