use axum::{
    extract::{Path, Query, State},
    Json,
};
use quibble_shared::{ApiResponse, Page, Tag, TagQuestions};
use rusqlite::OptionalExtension;

use crate::{
    error::ApiError,
    pagination::PageParams,
    questions::{attach_tags, question_from_row, QUESTION_COLUMNS},
    AppState,
};

const TAG_COLUMNS: &str = "
    t.id, t.name,
    (SELECT COUNT(*) FROM question_tags qt WHERE qt.tag_id = t.id)";

fn tag_from_row(row: &rusqlite::Row) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        name: row.get(1)?,
        questions: row.get(2)?,
    })
}

enum TagSort {
    Popular,
    Name,
    Recent,
}

impl TagSort {
    fn parse(sort: Option<&str>) -> Self {
        match sort {
            Some("name") => Self::Name,
            Some("recent") => Self::Recent,
            _ => Self::Popular,
        }
    }

    // Name is unique, so it is its own total order; the other keys break
    // ties by name ascending.
    fn order_by(&self) -> &'static str {
        match self {
            Self::Popular => {
                "(SELECT COUNT(*) FROM question_tags qt WHERE qt.tag_id = t.id) DESC, t.name ASC"
            }
            Self::Name => "t.name ASC",
            Self::Recent => "t.created_at DESC, t.name ASC",
        }
    }
}

/// GET /api/tags?page=1&pageSize=10&query=...&sort=popular
pub async fn list_tags(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Result<Json<ApiResponse<Page<Tag>>>, ApiError> {
    let query = params.validate()?;
    let sort = TagSort::parse(query.sort.as_deref());
    let pattern = query.like_pattern();
    let pool = state.db.clone();

    let page = tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tags t WHERE LOWER(t.name) LIKE ?1",
            [&pattern],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {TAG_COLUMNS}
             FROM tags t
             WHERE LOWER(t.name) LIKE ?1
             ORDER BY {}
             LIMIT ?2 OFFSET ?3",
            sort.order_by(),
        ))?;

        let items = stmt
            .query_map(
                rusqlite::params![pattern, query.page_size, query.offset()],
                tag_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok::<_, ApiError>(Page {
            items,
            is_next: query.is_next(total),
        })
    })
    .await??;

    Ok(Json(ApiResponse::ok(page)))
}

/// GET /api/tags/popular — top five by question count
pub async fn popular_tags(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<Tag>>>, ApiError> {
    let pool = state.db.clone();

    let tags = tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TAG_COLUMNS}
             FROM tags t
             ORDER BY (SELECT COUNT(*) FROM question_tags qt WHERE qt.tag_id = t.id) DESC,
                      t.name ASC
             LIMIT 5"
        ))?;
        let tags = stmt
            .query_map([], tag_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok::<_, ApiError>(tags)
    })
    .await??;

    Ok(Json(ApiResponse::ok(tags)))
}

/// GET /api/tags/:id/questions — the tag plus a page of its questions,
/// newest first.
pub async fn tag_questions(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<PageParams>,
) -> Result<Json<ApiResponse<TagQuestions>>, ApiError> {
    let query = params.validate()?;
    let pattern = query.like_pattern();
    let pool = state.db.clone();

    let detail = tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;

        let tag = conn
            .query_row(
                &format!("SELECT {TAG_COLUMNS} FROM tags t WHERE t.id = ?1"),
                [id],
                tag_from_row,
            )
            .optional()?
            .ok_or(ApiError::NotFound("Tag"))?;

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM questions q
             JOIN question_tags qt ON qt.question_id = q.id
             WHERE qt.tag_id = ?1 AND LOWER(q.title) LIKE ?2",
            rusqlite::params![id, pattern],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {QUESTION_COLUMNS}
             FROM questions q
             JOIN users u ON q.user_id = u.id
             JOIN question_tags qt ON qt.question_id = q.id
             WHERE qt.tag_id = ?1 AND LOWER(q.title) LIKE ?2
             ORDER BY q.created_at DESC, q.id DESC
             LIMIT ?3 OFFSET ?4"
        ))?;

        let mut items = stmt
            .query_map(
                rusqlite::params![id, pattern, query.page_size, query.offset()],
                question_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        attach_tags(&conn, &mut items)?;

        Ok::<_, ApiError>(TagQuestions {
            tag,
            questions: Page {
                items,
                is_next: query.is_next(total),
            },
        })
    })
    .await??;

    Ok(Json(ApiResponse::ok(detail)))
}
