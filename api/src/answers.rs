use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use quibble_shared::{Answer, ApiResponse, CreateAnswer, Page, User};
use rusqlite::OptionalExtension;

use crate::{
    auth,
    error::{ApiError, FieldErrors},
    pagination::PageParams,
    AppState,
};

const ANSWER_COLUMNS: &str = "
    a.id, a.question_id, a.body, a.created_at,
    u.id, u.username, u.avatar_url,
    (SELECT COUNT(*) FROM votes v
      WHERE v.target_type = 'answer' AND v.target_id = a.id AND v.kind = 'upvote'),
    (SELECT COUNT(*) FROM votes v
      WHERE v.target_type = 'answer' AND v.target_id = a.id AND v.kind = 'downvote')";

fn answer_from_row(row: &rusqlite::Row) -> rusqlite::Result<Answer> {
    Ok(Answer {
        id: row.get(0)?,
        question_id: row.get(1)?,
        body: row.get(2)?,
        created_at: row.get(3)?,
        user: User {
            id: row.get(4)?,
            username: row.get(5)?,
            avatar_url: row.get(6)?,
        },
        upvotes: row.get(7)?,
        downvotes: row.get(8)?,
    })
}

enum AnswerSort {
    Latest,
    Oldest,
    Popular,
}

impl AnswerSort {
    fn parse(sort: Option<&str>) -> Self {
        match sort {
            Some("oldest") => Self::Oldest,
            Some("popular") => Self::Popular,
            _ => Self::Latest,
        }
    }

    fn order_by(&self) -> &'static str {
        match self {
            Self::Latest => "a.created_at DESC, a.id DESC",
            Self::Oldest => "a.created_at ASC, a.id ASC",
            Self::Popular => {
                "((SELECT COUNT(*) FROM votes v
                    WHERE v.target_type = 'answer' AND v.target_id = a.id AND v.kind = 'upvote')
                - (SELECT COUNT(*) FROM votes v
                    WHERE v.target_type = 'answer' AND v.target_id = a.id AND v.kind = 'downvote'))
                  DESC, a.id DESC"
            }
        }
    }
}

/// GET /api/questions/:id/answers?page=1&pageSize=10&sort=latest
pub async fn list_answers(
    State(state): State<AppState>,
    Path(question_id): Path<i64>,
    Query(params): Query<PageParams>,
) -> Result<Json<ApiResponse<Page<Answer>>>, ApiError> {
    let query = params.validate()?;
    let sort = AnswerSort::parse(query.sort.as_deref());
    let pool = state.db.clone();

    let page = tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;

        conn.query_row(
            "SELECT id FROM questions WHERE id = ?1",
            [question_id],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .ok_or(ApiError::NotFound("Question"))?;

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM answers WHERE question_id = ?1",
            [question_id],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {ANSWER_COLUMNS}
             FROM answers a JOIN users u ON a.user_id = u.id
             WHERE a.question_id = ?1
             ORDER BY {}
             LIMIT ?2 OFFSET ?3",
            sort.order_by(),
        ))?;

        let items = stmt
            .query_map(
                rusqlite::params![question_id, query.page_size, query.offset()],
                answer_from_row,
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

/// POST /api/questions/:id/answers
pub async fn create_answer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(question_id): Path<i64>,
    Json(payload): Json<CreateAnswer>,
) -> Result<Json<ApiResponse<Answer>>, ApiError> {
    let user_id = auth::extract_user_id(&headers, &state.jwt_secret)?;

    let body = ammonia::clean(&payload.body);
    if body.trim().is_empty() {
        let mut details = FieldErrors::new();
        details
            .entry("body".to_string())
            .or_default()
            .push("Answer body is required".to_string());
        return Err(ApiError::validation(details));
    }

    let pool = state.db.clone();

    let answer = tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;

        conn.query_row(
            "SELECT id FROM questions WHERE id = ?1",
            [question_id],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .ok_or(ApiError::NotFound("Question"))?;

        conn.execute(
            "INSERT INTO answers (question_id, user_id, body) VALUES (?1, ?2, ?3)",
            rusqlite::params![question_id, user_id, body.trim()],
        )?;
        let id = conn.last_insert_rowid();

        let answer = conn.query_row(
            &format!(
                "SELECT {ANSWER_COLUMNS}
                 FROM answers a JOIN users u ON a.user_id = u.id
                 WHERE a.id = ?1"
            ),
            [id],
            answer_from_row,
        )?;
        Ok::<_, ApiError>(answer)
    })
    .await??;

    Ok(Json(ApiResponse::ok(answer)))
}

/// DELETE /api/answers/:id — author only; removes the answer's votes too.
pub async fn delete_answer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let user_id = auth::extract_user_id(&headers, &state.jwt_secret)?;
    let pool = state.db.clone();

    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let author: i64 = tx
            .query_row("SELECT user_id FROM answers WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()?
            .ok_or(ApiError::NotFound("Answer"))?;
        if author != user_id {
            return Err(ApiError::Forbidden);
        }

        tx.execute(
            "DELETE FROM votes WHERE target_type = 'answer' AND target_id = ?1",
            [id],
        )?;
        tx.execute("DELETE FROM answers WHERE id = ?1", [id])?;

        tx.commit()?;
        Ok::<_, ApiError>(())
    })
    .await??;

    Ok(Json(ApiResponse::ok(())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{
        auth_headers, cast_test_vote, count_rows, seed_answer, seed_question, seed_user,
        test_state,
    };

    #[tokio::test]
    async fn answers_paginate_latest_first() {
        let state = test_state();
        seed_user(&state, "ada");
        let qid = seed_question(&state, "ada", "Q", "b", &[]);
        seed_answer(&state, "ada", qid, "first");
        seed_answer(&state, "ada", qid, "second");
        seed_answer(&state, "ada", qid, "third");

        let params = PageParams {
            page_size: Some("2".to_string()),
            ..PageParams::default()
        };
        let resp = list_answers(State(state.clone()), Path(qid), Query(params))
            .await
            .unwrap();
        let page = resp.0.data.unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.is_next);
        assert_eq!(page.items[0].body, "third");

        let params = PageParams {
            page: Some("2".to_string()),
            page_size: Some("2".to_string()),
            ..PageParams::default()
        };
        let resp = list_answers(State(state), Path(qid), Query(params))
            .await
            .unwrap();
        let page = resp.0.data.unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(!page.is_next);
        assert_eq!(page.items[0].body, "first");
    }

    #[tokio::test]
    async fn popular_sort_puts_upvoted_first() {
        let state = test_state();
        seed_user(&state, "ada");
        seed_user(&state, "bob");
        let qid = seed_question(&state, "ada", "Q", "b", &[]);
        seed_answer(&state, "ada", qid, "meh");
        let good = seed_answer(&state, "ada", qid, "great");
        cast_test_vote(&state, "bob", "answer", good, "upvote");

        let params = PageParams {
            sort: Some("popular".to_string()),
            ..PageParams::default()
        };
        let resp = list_answers(State(state), Path(qid), Query(params))
            .await
            .unwrap();
        let page = resp.0.data.unwrap();
        assert_eq!(page.items[0].body, "great");
        assert_eq!(page.items[0].upvotes, 1);
    }

    #[tokio::test]
    async fn listing_for_missing_question_is_not_found() {
        let state = test_state();
        let err = list_answers(State(state), Path(77), Query(PageParams::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn create_validates_body_and_question() {
        let state = test_state();
        let (_, token) = seed_user(&state, "ada");
        let qid = seed_question(&state, "ada", "Q", "b", &[]);

        let err = create_answer(
            State(state.clone()),
            auth_headers(&token),
            Path(qid),
            Json(CreateAnswer {
                body: "  ".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation { .. }));

        let err = create_answer(
            State(state.clone()),
            auth_headers(&token),
            Path(404),
            Json(CreateAnswer {
                body: "real answer".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        let resp = create_answer(
            State(state),
            auth_headers(&token),
            Path(qid),
            Json(CreateAnswer {
                body: "real answer".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(resp.0.data.unwrap().body, "real answer");
    }

    #[tokio::test]
    async fn delete_is_author_only_and_cascades_votes() {
        let state = test_state();
        let (_, ada) = seed_user(&state, "ada");
        let (_, bob) = seed_user(&state, "bob");
        let qid = seed_question(&state, "ada", "Q", "b", &[]);
        let aid = seed_answer(&state, "ada", qid, "mine");
        cast_test_vote(&state, "bob", "answer", aid, "upvote");

        let err = delete_answer(State(state.clone()), auth_headers(&bob), Path(aid))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden));

        delete_answer(State(state.clone()), auth_headers(&ada), Path(aid))
            .await
            .unwrap();
        assert_eq!(count_rows(&state, "answers"), 0);
        assert_eq!(count_rows(&state, "votes"), 0);
    }
}
