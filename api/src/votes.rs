use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use quibble_shared::{ApiResponse, CreateVote, VoteStatus};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use serde::Deserialize;

use crate::{
    auth,
    error::{ApiError, FieldErrors},
    AppState,
};

pub const UPVOTE: &str = "upvote";
pub const DOWNVOTE: &str = "downvote";

#[derive(Deserialize)]
pub struct VoteQuery {
    r#type: String,
    id: i64,
}

fn validate_vote(target_type: &str, kind: &str) -> Result<(), ApiError> {
    let mut details = FieldErrors::new();
    if target_type != "question" && target_type != "answer" {
        details
            .entry("targetType".to_string())
            .or_default()
            .push("Target type must be question or answer".to_string());
    }
    if kind != UPVOTE && kind != DOWNVOTE {
        details
            .entry("kind".to_string())
            .or_default()
            .push("Kind must be upvote or downvote".to_string());
    }
    if details.is_empty() {
        Ok(())
    } else {
        Err(ApiError::validation(details))
    }
}

fn ensure_target_exists(conn: &Connection, target_type: &str, target_id: i64) -> Result<(), ApiError> {
    let (sql, label) = match target_type {
        "question" => ("SELECT id FROM questions WHERE id = ?1", "Question"),
        _ => ("SELECT id FROM answers WHERE id = ?1", "Answer"),
    };
    conn.query_row(sql, [target_id], |row| row.get::<_, i64>(0))
        .optional()?
        .ok_or(ApiError::NotFound(label))?;
    Ok(())
}

fn vote_counts(conn: &Connection, target_type: &str, target_id: i64) -> Result<(i64, i64), ApiError> {
    let counts = conn.query_row(
        "SELECT
             COALESCE(SUM(CASE WHEN kind = 'upvote' THEN 1 ELSE 0 END), 0),
             COALESCE(SUM(CASE WHEN kind = 'downvote' THEN 1 ELSE 0 END), 0)
         FROM votes
         WHERE target_type = ?1 AND target_id = ?2",
        rusqlite::params![target_type, target_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(counts)
}

/// GET /api/votes?type=question&id=123 — aggregate counts plus the calling
/// user's current vote when a valid token is presented.
pub async fn get_votes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<VoteQuery>,
) -> Result<Json<ApiResponse<VoteStatus>>, ApiError> {
    let user_id = auth::extract_user_id(&headers, &state.jwt_secret).ok();

    let pool = state.db.clone();
    let target_type = params.r#type;
    let target_id = params.id;

    let status = tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;

        let (upvotes, downvotes) = vote_counts(&conn, &target_type, target_id)?;

        let active = match user_id {
            Some(uid) => conn
                .query_row(
                    "SELECT kind FROM votes
                     WHERE user_id = ?1 AND target_type = ?2 AND target_id = ?3",
                    rusqlite::params![uid, target_type, target_id],
                    |row| row.get::<_, String>(0),
                )
                .optional()?,
            None => None,
        };

        Ok::<_, ApiError>(VoteStatus {
            upvotes,
            downvotes,
            active,
        })
    })
    .await??;

    Ok(Json(ApiResponse::ok(status)))
}

/// POST /api/votes — toggles the caller's vote on a question or answer.
///
/// State machine per (user, target): no vote + kind → vote recorded;
/// same kind again → vote removed; opposite kind → the existing row is
/// updated in place so the user never holds two votes at once. The
/// read-modify-write runs inside an immediate transaction so concurrent
/// toggles on the same pair serialize.
pub async fn cast_vote(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateVote>,
) -> Result<Json<ApiResponse<VoteStatus>>, ApiError> {
    let user_id = auth::extract_user_id(&headers, &state.jwt_secret)?;
    validate_vote(&payload.target_type, &payload.kind)?;

    let pool = state.db.clone();
    let target_type = payload.target_type;
    let target_id = payload.target_id;
    let kind = payload.kind;

    let status = tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        ensure_target_exists(&tx, &target_type, target_id)?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT kind FROM votes
                 WHERE user_id = ?1 AND target_type = ?2 AND target_id = ?3",
                rusqlite::params![user_id, target_type, target_id],
                |row| row.get(0),
            )
            .optional()?;

        let active = match existing {
            Some(ref k) if *k == kind => {
                // Same kind → toggle off
                tx.execute(
                    "DELETE FROM votes
                     WHERE user_id = ?1 AND target_type = ?2 AND target_id = ?3",
                    rusqlite::params![user_id, target_type, target_id],
                )?;
                None
            }
            Some(_) => {
                // Opposite kind → swap in place
                tx.execute(
                    "UPDATE votes SET kind = ?4
                     WHERE user_id = ?1 AND target_type = ?2 AND target_id = ?3",
                    rusqlite::params![user_id, target_type, target_id, kind],
                )?;
                Some(kind)
            }
            None => {
                tx.execute(
                    "INSERT INTO votes (user_id, target_type, target_id, kind)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![user_id, target_type, target_id, kind],
                )?;
                Some(kind)
            }
        };

        let (upvotes, downvotes) = vote_counts(&tx, &target_type, target_id)?;
        tx.commit()?;

        Ok::<_, ApiError>(VoteStatus {
            upvotes,
            downvotes,
            active,
        })
    })
    .await??;

    Ok(Json(ApiResponse::ok(status)))
}
