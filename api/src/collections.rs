use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use quibble_shared::{ApiResponse, Page, Question, SavedStatus, ToggleSave};
use rusqlite::{OptionalExtension, TransactionBehavior};
use serde::Deserialize;

use crate::{
    auth,
    error::ApiError,
    pagination::PageParams,
    questions::{attach_tags, question_from_row, NET_VOTES, QUESTION_COLUMNS},
    AppState,
};

#[derive(Deserialize)]
pub struct StatusQuery {
    question_id: i64,
}

enum SavedSort {
    MostRecent,
    Oldest,
    MostVoted,
    MostViewed,
    MostAnswered,
}

impl SavedSort {
    fn parse(sort: Option<&str>) -> Self {
        match sort {
            Some("oldest") => Self::Oldest,
            Some("most_voted") => Self::MostVoted,
            Some("most_viewed") => Self::MostViewed,
            Some("most_answered") => Self::MostAnswered,
            _ => Self::MostRecent,
        }
    }

    fn order_by(&self) -> String {
        match self {
            Self::MostRecent => "c.created_at DESC, c.id DESC".to_string(),
            Self::Oldest => "c.created_at ASC, c.id ASC".to_string(),
            Self::MostVoted => format!("{NET_VOTES} DESC, c.id DESC"),
            Self::MostViewed => "q.views DESC, c.id DESC".to_string(),
            Self::MostAnswered => {
                "(SELECT COUNT(*) FROM answers a WHERE a.question_id = q.id) DESC, c.id DESC"
                    .to_string()
            }
        }
    }
}

/// POST /api/collections/toggle — saves or unsaves a question for the
/// caller. A save record either exists or it does not; the toggle runs in
/// an immediate transaction and the UNIQUE(user_id, question_id) index
/// keeps concurrent toggles from producing duplicates.
pub async fn toggle_save(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ToggleSave>,
) -> Result<Json<ApiResponse<SavedStatus>>, ApiError> {
    let user_id = auth::extract_user_id(&headers, &state.jwt_secret)?;
    let pool = state.db.clone();
    let question_id = payload.question_id;

    let status = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.query_row(
            "SELECT id FROM questions WHERE id = ?1",
            [question_id],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .ok_or(ApiError::NotFound("Question"))?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM collections WHERE user_id = ?1 AND question_id = ?2",
                rusqlite::params![user_id, question_id],
                |row| row.get(0),
            )
            .optional()?;

        let saved = match existing {
            Some(record_id) => {
                tx.execute("DELETE FROM collections WHERE id = ?1", [record_id])?;
                false
            }
            None => {
                tx.execute(
                    "INSERT INTO collections (user_id, question_id) VALUES (?1, ?2)",
                    rusqlite::params![user_id, question_id],
                )?;
                true
            }
        };

        tx.commit()?;
        Ok::<_, ApiError>(SavedStatus { saved })
    })
    .await??;

    Ok(Json(ApiResponse::ok(status)))
}

/// GET /api/collections/status?question_id=123
pub async fn saved_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<StatusQuery>,
) -> Result<Json<ApiResponse<SavedStatus>>, ApiError> {
    let user_id = auth::extract_user_id(&headers, &state.jwt_secret)?;
    let pool = state.db.clone();
    let question_id = params.question_id;

    let status = tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM collections WHERE user_id = ?1 AND question_id = ?2",
                rusqlite::params![user_id, question_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok::<_, ApiError>(SavedStatus {
            saved: existing.is_some(),
        })
    })
    .await??;

    Ok(Json(ApiResponse::ok(status)))
}

/// GET /api/collections?page=1&pageSize=10&query=...&sort=most_recent —
/// the caller's saved questions.
pub async fn list_saved(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<PageParams>,
) -> Result<Json<ApiResponse<Page<Question>>>, ApiError> {
    let user_id = auth::extract_user_id(&headers, &state.jwt_secret)?;
    let query = params.validate()?;
    let sort = SavedSort::parse(query.sort.as_deref());
    let pattern = query.like_pattern();
    let pool = state.db.clone();

    let page = tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM collections c
             JOIN questions q ON q.id = c.question_id
             WHERE c.user_id = ?1 AND LOWER(q.title) LIKE ?2",
            rusqlite::params![user_id, pattern],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {QUESTION_COLUMNS}
             FROM collections c
             JOIN questions q ON q.id = c.question_id
             JOIN users u ON q.user_id = u.id
             WHERE c.user_id = ?1 AND LOWER(q.title) LIKE ?2
             ORDER BY {}
             LIMIT ?3 OFFSET ?4",
            sort.order_by(),
        ))?;

        let mut items = stmt
            .query_map(
                rusqlite::params![user_id, pattern, query.page_size, query.offset()],
                question_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        attach_tags(&conn, &mut items)?;

        Ok::<_, ApiError>(Page {
            items,
            is_next: query.is_next(total),
        })
    })
    .await??;

    Ok(Json(ApiResponse::ok(page)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{auth_headers, count_rows, seed_question, seed_user, test_state};

    #[tokio::test]
    async fn save_toggles_on_and_off() {
        let state = test_state();
        let (_, token) = seed_user(&state, "ada");
        let qid = seed_question(&state, "ada", "Keeper", "b", &[]);

        let resp = toggle_save(
            State(state.clone()),
            auth_headers(&token),
            Json(ToggleSave { question_id: qid }),
        )
        .await
        .unwrap();
        assert!(resp.0.data.unwrap().saved);
        assert_eq!(count_rows(&state, "collections"), 1);

        let resp = saved_status(
            State(state.clone()),
            auth_headers(&token),
            Query(StatusQuery { question_id: qid }),
        )
        .await
        .unwrap();
        assert!(resp.0.data.unwrap().saved);

        let resp = toggle_save(
            State(state.clone()),
            auth_headers(&token),
            Json(ToggleSave { question_id: qid }),
        )
        .await
        .unwrap();
        assert!(!resp.0.data.unwrap().saved);
        assert_eq!(count_rows(&state, "collections"), 0);
    }

    #[tokio::test]
    async fn unauthenticated_toggle_mutates_nothing() {
        let state = test_state();
        seed_user(&state, "ada");
        let qid = seed_question(&state, "ada", "Keeper", "b", &[]);

        let err = toggle_save(
            State(state.clone()),
            HeaderMap::new(),
            Json(ToggleSave { question_id: qid }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
        assert_eq!(count_rows(&state, "collections"), 0);
    }

    #[tokio::test]
    async fn missing_question_is_not_found() {
        let state = test_state();
        let (_, token) = seed_user(&state, "ada");

        let err = toggle_save(
            State(state.clone()),
            auth_headers(&token),
            Json(ToggleSave { question_id: 404 }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert_eq!(count_rows(&state, "collections"), 0);
    }

    #[tokio::test]
    async fn saved_listing_is_scoped_to_the_caller() {
        let state = test_state();
        let (_, ada) = seed_user(&state, "ada");
        let (_, bob) = seed_user(&state, "bob");
        let q1 = seed_question(&state, "ada", "Ada's pick", "b", &[]);
        let q2 = seed_question(&state, "ada", "Bob's pick", "b", &[]);

        toggle_save(
            State(state.clone()),
            auth_headers(&ada),
            Json(ToggleSave { question_id: q1 }),
        )
        .await
        .unwrap();
        toggle_save(
            State(state.clone()),
            auth_headers(&bob),
            Json(ToggleSave { question_id: q2 }),
        )
        .await
        .unwrap();

        let resp = list_saved(
            State(state),
            auth_headers(&ada),
            Query(PageParams::default()),
        )
        .await
        .unwrap();
        let page = resp.0.data.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].title, "Ada's pick");
        assert!(!page.is_next);
    }

    #[tokio::test]
    async fn saved_listing_filters_by_title() {
        let state = test_state();
        let (_, token) = seed_user(&state, "ada");
        let q1 = seed_question(&state, "ada", "Rust lifetimes", "b", &[]);
        let q2 = seed_question(&state, "ada", "CSS centering", "b", &[]);
        for qid in [q1, q2] {
            toggle_save(
                State(state.clone()),
                auth_headers(&token),
                Json(ToggleSave { question_id: qid }),
            )
            .await
            .unwrap();
        }

        let params = PageParams {
            query: Some("rust".to_string()),
            ..PageParams::default()
        };
        let resp = list_saved(State(state), auth_headers(&token), Query(params))
            .await
            .unwrap();
        let page = resp.0.data.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].title, "Rust lifetimes");
    }

    #[tokio::test]
    async fn most_viewed_sort_orders_by_views() {
        let state = test_state();
        let (_, token) = seed_user(&state, "ada");
        let quiet = seed_question(&state, "ada", "Quiet", "b", &[]);
        let busy = seed_question(&state, "ada", "Busy", "b", &[]);
        crate::test_util::bump_views(&state, busy, 10);

        for qid in [quiet, busy] {
            toggle_save(
                State(state.clone()),
                auth_headers(&token),
                Json(ToggleSave { question_id: qid }),
            )
            .await
            .unwrap();
        }

        let params = PageParams {
            sort: Some("most_viewed".to_string()),
            ..PageParams::default()
        };
        let resp = list_saved(State(state), auth_headers(&token), Query(params))
            .await
            .unwrap();
        let titles: Vec<_> = resp
            .0
            .data
            .unwrap()
            .items
            .into_iter()
            .map(|q| q.title)
            .collect();
        assert_eq!(titles, vec!["Busy", "Quiet"]);
    }
}
