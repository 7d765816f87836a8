use axum::{
    extract::{Path, Query, State},
    Json,
};
use quibble_shared::{ApiResponse, CreateTask, TaskItem};
use rusqlite::OptionalExtension;
use serde::Deserialize;

use crate::{
    error::{ApiError, FieldErrors},
    AppState,
};

#[derive(Deserialize, Default)]
pub struct TaskListParams {
    filter: Option<String>,
}

const TASK_COLUMNS: &str = "id, name, priority, difficulty, score, created_at";

fn task_from_row(row: &rusqlite::Row) -> rusqlite::Result<TaskItem> {
    Ok(TaskItem {
        id: row.get(0)?,
        name: row.get(1)?,
        priority: row.get(2)?,
        difficulty: row.get(3)?,
        score: row.get(4)?,
        created_at: row.get(5)?,
    })
}

enum TaskFilter {
    All,
    Valuable,
    Easiest,
    Hardest,
}

impl TaskFilter {
    fn parse(filter: Option<&str>) -> Self {
        match filter {
            Some("valuable") => Self::Valuable,
            Some("easiest") => Self::Easiest,
            Some("hardest") => Self::Hardest,
            _ => Self::All,
        }
    }

    fn order_by(&self) -> &'static str {
        match self {
            Self::All => "score DESC, id DESC",
            Self::Valuable => "priority DESC, id DESC",
            Self::Easiest => "difficulty ASC, id DESC",
            Self::Hardest => "difficulty DESC, id DESC",
        }
    }
}

fn validate_task(payload: &CreateTask) -> Result<(String, i64, i64), ApiError> {
    let mut details = FieldErrors::new();

    let name = payload.name.trim().to_string();
    if name.is_empty() {
        details
            .entry("name".to_string())
            .or_default()
            .push("Name is required".to_string());
    }
    if !(1..=10).contains(&payload.priority) {
        details
            .entry("priority".to_string())
            .or_default()
            .push("Priority must be between 1 and 10".to_string());
    }
    if !(1..=10).contains(&payload.difficulty) {
        details
            .entry("difficulty".to_string())
            .or_default()
            .push("Difficulty must be between 1 and 10".to_string());
    }

    if details.is_empty() {
        Ok((name, payload.priority, payload.difficulty))
    } else {
        Err(ApiError::validation(details))
    }
}

/// GET /api/tasks?filter=all|valuable|easiest|hardest
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<TaskListParams>,
) -> Result<Json<ApiResponse<Vec<TaskItem>>>, ApiError> {
    let filter = TaskFilter::parse(params.filter.as_deref());
    let pool = state.db.clone();

    let tasks = tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks ORDER BY {}",
            filter.order_by()
        ))?;
        let tasks = stmt
            .query_map([], task_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok::<_, ApiError>(tasks)
    })
    .await??;

    Ok(Json(ApiResponse::ok(tasks)))
}

/// GET /api/tasks/top — the three highest-priority tasks
pub async fn top_tasks(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<TaskItem>>>, ApiError> {
    let pool = state.db.clone();

    let tasks = tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks ORDER BY priority DESC, id DESC LIMIT 3"
        ))?;
        let tasks = stmt
            .query_map([], task_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok::<_, ApiError>(tasks)
    })
    .await??;

    Ok(Json(ApiResponse::ok(tasks)))
}

/// POST /api/tasks
pub async fn create_task(
    State(state): State<AppState>,
    Json(payload): Json<CreateTask>,
) -> Result<Json<ApiResponse<TaskItem>>, ApiError> {
    let (name, priority, difficulty) = validate_task(&payload)?;
    let pool = state.db.clone();

    let task = tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;
        conn.execute(
            "INSERT INTO tasks (name, priority, difficulty, score) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![name, priority, difficulty, priority + difficulty],
        )?;
        let id = conn.last_insert_rowid();
        let task = conn.query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
            [id],
            task_from_row,
        )?;
        Ok::<_, ApiError>(task)
    })
    .await??;

    Ok(Json(ApiResponse::ok(task)))
}

/// PUT /api/tasks/:id — score is recomputed server-side
pub async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<CreateTask>,
) -> Result<Json<ApiResponse<TaskItem>>, ApiError> {
    let (name, priority, difficulty) = validate_task(&payload)?;
    let pool = state.db.clone();

    let task = tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;
        let affected = conn.execute(
            "UPDATE tasks SET name = ?2, priority = ?3, difficulty = ?4, score = ?5
             WHERE id = ?1",
            rusqlite::params![id, name, priority, difficulty, priority + difficulty],
        )?;
        if affected == 0 {
            return Err(ApiError::NotFound("Task"));
        }
        let task = conn.query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
            [id],
            task_from_row,
        )?;
        Ok::<_, ApiError>(task)
    })
    .await??;

    Ok(Json(ApiResponse::ok(task)))
}

/// DELETE /api/tasks/:id
pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let pool = state.db.clone();

    tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;
        let existing: Option<i64> = conn
            .query_row("SELECT id FROM tasks WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;
        if existing.is_none() {
            return Err(ApiError::NotFound("Task"));
        }
        conn.execute("DELETE FROM tasks WHERE id = ?1", [id])?;
        Ok::<_, ApiError>(())
    })
    .await??;

    Ok(Json(ApiResponse::ok(())))
}
