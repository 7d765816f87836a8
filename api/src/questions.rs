use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use quibble_shared::{ApiResponse, CreateQuestion, Page, Question, Tag, User, ViewCount};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};

use crate::{
    auth,
    error::{ApiError, FieldErrors},
    pagination::{ListQuery, PageParams},
    AppState,
};

// Shared projection for question rows; every listing selects these columns
// in this order so one mapper serves them all.
pub(crate) const QUESTION_COLUMNS: &str = "
    q.id, q.title, q.body, q.views, q.created_at,
    u.id, u.username, u.avatar_url,
    (SELECT COUNT(*) FROM answers a WHERE a.question_id = q.id),
    (SELECT COUNT(*) FROM votes v
      WHERE v.target_type = 'question' AND v.target_id = q.id AND v.kind = 'upvote'),
    (SELECT COUNT(*) FROM votes v
      WHERE v.target_type = 'question' AND v.target_id = q.id AND v.kind = 'downvote')";

pub(crate) const NET_VOTES: &str = "
    ((SELECT COUNT(*) FROM votes v
       WHERE v.target_type = 'question' AND v.target_id = q.id AND v.kind = 'upvote')
   - (SELECT COUNT(*) FROM votes v
       WHERE v.target_type = 'question' AND v.target_id = q.id AND v.kind = 'downvote'))";

pub(crate) fn question_from_row(row: &rusqlite::Row) -> rusqlite::Result<Question> {
    Ok(Question {
        id: row.get(0)?,
        title: row.get(1)?,
        body: row.get(2)?,
        views: row.get(3)?,
        created_at: row.get(4)?,
        user: User {
            id: row.get(5)?,
            username: row.get(6)?,
            avatar_url: row.get(7)?,
        },
        tags: Vec::new(),
        answers: row.get(8)?,
        upvotes: row.get(9)?,
        downvotes: row.get(10)?,
    })
}

/// Fills in the tag list for each question, name-ordered.
pub(crate) fn attach_tags(conn: &Connection, questions: &mut [Question]) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.name,
                (SELECT COUNT(*) FROM question_tags qt2 WHERE qt2.tag_id = t.id)
         FROM tags t
         JOIN question_tags qt ON qt.tag_id = t.id
         WHERE qt.question_id = ?1
         ORDER BY t.name",
    )?;

    for question in questions {
        question.tags = stmt
            .query_map([question.id], |row| {
                Ok(Tag {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    questions: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
    }

    Ok(())
}

fn load_question(conn: &Connection, id: i64) -> Result<Question, ApiError> {
    let mut question = conn
        .query_row(
            &format!(
                "SELECT {QUESTION_COLUMNS}
                 FROM questions q JOIN users u ON q.user_id = u.id
                 WHERE q.id = ?1"
            ),
            [id],
            question_from_row,
        )
        .optional()?
        .ok_or(ApiError::NotFound("Question"))?;

    attach_tags(conn, std::slice::from_mut(&mut question))?;
    Ok(question)
}

fn question_author(conn: &Connection, id: i64) -> Result<i64, ApiError> {
    conn.query_row("SELECT user_id FROM questions WHERE id = ?1", [id], |row| {
        row.get(0)
    })
    .optional()?
    .ok_or(ApiError::NotFound("Question"))
}

// ── Sort keys ──

enum QuestionSort {
    Newest,
    Oldest,
    Popular,
    Unanswered,
}

impl QuestionSort {
    // Unknown values fall back to the default ordering, matching the
    // UI filter buttons which simply deselect.
    fn parse(sort: Option<&str>) -> Self {
        match sort {
            Some("oldest") => Self::Oldest,
            Some("popular") => Self::Popular,
            Some("unanswered") => Self::Unanswered,
            _ => Self::Newest,
        }
    }

    fn order_by(&self) -> String {
        match self {
            Self::Newest | Self::Unanswered => "q.created_at DESC, q.id DESC".to_string(),
            Self::Oldest => "q.created_at ASC, q.id ASC".to_string(),
            Self::Popular => format!("{NET_VOTES} DESC, q.id DESC"),
        }
    }

    fn extra_where(&self) -> &'static str {
        match self {
            Self::Unanswered => {
                " AND NOT EXISTS (SELECT 1 FROM answers a WHERE a.question_id = q.id)"
            }
            _ => "",
        }
    }
}

fn query_question_page(conn: &Connection, q: &ListQuery) -> Result<Page<Question>, ApiError> {
    let sort = QuestionSort::parse(q.sort.as_deref());
    let pattern = q.like_pattern();

    let total: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM questions q
             WHERE LOWER(q.title) LIKE ?1{}",
            sort.extra_where()
        ),
        [&pattern],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {QUESTION_COLUMNS}
         FROM questions q JOIN users u ON q.user_id = u.id
         WHERE LOWER(q.title) LIKE ?1{}
         ORDER BY {}
         LIMIT ?2 OFFSET ?3",
        sort.extra_where(),
        sort.order_by(),
    ))?;

    let mut items = stmt
        .query_map(
            rusqlite::params![pattern, q.page_size, q.offset()],
            question_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    attach_tags(conn, &mut items)?;

    Ok(Page {
        items,
        is_next: q.is_next(total),
    })
}

// ── Handlers ──

/// GET /api/questions?page=1&pageSize=10&query=...&sort=newest
pub async fn list_questions(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Result<Json<ApiResponse<Page<Question>>>, ApiError> {
    let query = params.validate()?;
    let pool = state.db.clone();

    let page = tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;
        query_question_page(&conn, &query)
    })
    .await??;

    Ok(Json(ApiResponse::ok(page)))
}

fn validate_question_input(title: &str, body: &str, tags: &[String]) -> Result<(), ApiError> {
    let mut details = FieldErrors::new();
    if title.trim().is_empty() {
        details
            .entry("title".to_string())
            .or_default()
            .push("Title is required".to_string());
    }
    if body.trim().is_empty() {
        details
            .entry("body".to_string())
            .or_default()
            .push("Body is required".to_string());
    }
    let tag_errors = details.entry("tags".to_string()).or_default();
    if tags.is_empty() || tags.len() > 3 {
        tag_errors.push("Between 1 and 3 tags are required".to_string());
    }
    if tags.iter().any(|t| t.trim().is_empty()) {
        tag_errors.push("Tags cannot be empty".to_string());
    }
    if tag_errors.is_empty() {
        details.remove("tags");
    }
    if details.is_empty() {
        Ok(())
    } else {
        Err(ApiError::validation(details))
    }
}

fn link_tags(conn: &Connection, question_id: i64, tags: &[String]) -> Result<(), ApiError> {
    conn.execute(
        "DELETE FROM question_tags WHERE question_id = ?1",
        [question_id],
    )?;

    for tag in tags {
        let name = tag.trim().to_lowercase();
        conn.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", [&name])?;
        let tag_id: i64 =
            conn.query_row("SELECT id FROM tags WHERE name = ?1", [&name], |row| {
                row.get(0)
            })?;
        conn.execute(
            "INSERT OR IGNORE INTO question_tags (question_id, tag_id) VALUES (?1, ?2)",
            rusqlite::params![question_id, tag_id],
        )?;
    }

    Ok(())
}

/// POST /api/questions
pub async fn create_question(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateQuestion>,
) -> Result<Json<ApiResponse<Question>>, ApiError> {
    let user_id = auth::extract_user_id(&headers, &state.jwt_secret)?;

    let title = ammonia::clean(&payload.title);
    let body = ammonia::clean(&payload.body);
    validate_question_input(&title, &body, &payload.tags)?;

    let pool = state.db.clone();
    let tags = payload.tags;

    let question = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT INTO questions (user_id, title, body) VALUES (?1, ?2, ?3)",
            rusqlite::params![user_id, title.trim(), body.trim()],
        )?;
        let id = tx.last_insert_rowid();
        link_tags(&tx, id, &tags)?;

        let question = load_question(&tx, id)?;
        tx.commit()?;
        Ok::<_, ApiError>(question)
    })
    .await??;

    Ok(Json(ApiResponse::ok(question)))
}

/// GET /api/questions/:id
///
/// The question row and its tag rows are fetched as two concurrently
/// issued tasks and joined before the response is assembled.
pub async fn get_question(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Question>>, ApiError> {
    let pool = state.db.clone();
    let question_task = tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;
        conn.query_row(
            &format!(
                "SELECT {QUESTION_COLUMNS}
                 FROM questions q JOIN users u ON q.user_id = u.id
                 WHERE q.id = ?1"
            ),
            [id],
            question_from_row,
        )
        .optional()?
        .ok_or(ApiError::NotFound("Question"))
    });

    let pool = state.db.clone();
    let tags_task = tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT t.id, t.name,
                    (SELECT COUNT(*) FROM question_tags qt2 WHERE qt2.tag_id = t.id)
             FROM tags t
             JOIN question_tags qt ON qt.tag_id = t.id
             WHERE qt.question_id = ?1
             ORDER BY t.name",
        )?;
        let tags = stmt
            .query_map([id], |row| {
                Ok(Tag {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    questions: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok::<_, ApiError>(tags)
    });

    let (question, tags) = tokio::join!(question_task, tags_task);
    let mut question = question??;
    question.tags = tags??;

    Ok(Json(ApiResponse::ok(question)))
}

/// PUT /api/questions/:id — author only
pub async fn update_question(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(payload): Json<CreateQuestion>,
) -> Result<Json<ApiResponse<Question>>, ApiError> {
    let user_id = auth::extract_user_id(&headers, &state.jwt_secret)?;

    let title = ammonia::clean(&payload.title);
    let body = ammonia::clean(&payload.body);
    validate_question_input(&title, &body, &payload.tags)?;

    let pool = state.db.clone();
    let tags = payload.tags;

    let question = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if question_author(&tx, id)? != user_id {
            return Err(ApiError::Forbidden);
        }

        tx.execute(
            "UPDATE questions SET title = ?2, body = ?3 WHERE id = ?1",
            rusqlite::params![id, title.trim(), body.trim()],
        )?;
        link_tags(&tx, id, &tags)?;

        let question = load_question(&tx, id)?;
        tx.commit()?;
        Ok::<_, ApiError>(question)
    })
    .await??;

    Ok(Json(ApiResponse::ok(question)))
}

/// DELETE /api/questions/:id — author only; cascades answers, votes,
/// collection entries and tag links.
pub async fn delete_question(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let user_id = auth::extract_user_id(&headers, &state.jwt_secret)?;
    let pool = state.db.clone();

    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if question_author(&tx, id)? != user_id {
            return Err(ApiError::Forbidden);
        }

        tx.execute(
            "DELETE FROM votes WHERE target_type = 'answer'
             AND target_id IN (SELECT id FROM answers WHERE question_id = ?1)",
            [id],
        )?;
        tx.execute("DELETE FROM answers WHERE question_id = ?1", [id])?;
        tx.execute(
            "DELETE FROM votes WHERE target_type = 'question' AND target_id = ?1",
            [id],
        )?;
        tx.execute("DELETE FROM collections WHERE question_id = ?1", [id])?;
        tx.execute("DELETE FROM question_tags WHERE question_id = ?1", [id])?;
        tx.execute("DELETE FROM questions WHERE id = ?1", [id])?;

        tx.commit()?;
        Ok::<_, ApiError>(())
    })
    .await??;

    Ok(Json(ApiResponse::ok(())))
}

/// POST /api/questions/:id/views — bumps the view counter
pub async fn increment_views(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ViewCount>>, ApiError> {
    let pool = state.db.clone();

    let views = tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;
        let affected = conn.execute("UPDATE questions SET views = views + 1 WHERE id = ?1", [id])?;
        if affected == 0 {
            return Err(ApiError::NotFound("Question"));
        }
        let views: i64 =
            conn.query_row("SELECT views FROM questions WHERE id = ?1", [id], |row| {
                row.get(0)
            })?;
        Ok::<_, ApiError>(views)
    })
    .await??;

    Ok(Json(ApiResponse::ok(ViewCount { views })))
}

/// GET /api/questions/hot — top five by net votes, then views, then
/// recency.
pub async fn hot_questions(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<Question>>>, ApiError> {
    let pool = state.db.clone();

    let questions = tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {QUESTION_COLUMNS}
             FROM questions q JOIN users u ON q.user_id = u.id
             ORDER BY {NET_VOTES} DESC, q.views DESC, q.id DESC
             LIMIT 5"
        ))?;
        let mut items = stmt
            .query_map([], question_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        attach_tags(&conn, &mut items)?;
        Ok::<_, ApiError>(items)
    })
    .await??;

    Ok(Json(ApiResponse::ok(questions)))
}
