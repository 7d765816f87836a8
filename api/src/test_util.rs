use std::sync::Arc;

use axum::http::HeaderMap;
use tokio::sync::RwLock;

use crate::{auth, db, AppState};

/// State backed by a single in-memory SQLite connection, so every pool
/// checkout sees the same database.
pub fn test_state() -> AppState {
    let manager = r2d2_sqlite::SqliteConnectionManager::memory();
    let pool = r2d2::Pool::builder()
        .max_size(1)
        .build(manager)
        .expect("Failed to create test DB pool");
    db::run_migrations(&pool).expect("Failed to run test migrations");

    AppState {
        db: pool,
        jwt_secret: "test-secret".to_string(),
        http: reqwest::Client::new(),
        pokeapi_url: "http://127.0.0.1:0".to_string(),
        types_cache: Arc::new(RwLock::new(None)),
    }
}

pub fn auth_headers(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "Authorization",
        format!("Bearer {token}").parse().expect("header value"),
    );
    headers
}

/// Creates the user if needed and returns (id, signed token).
pub fn seed_user(state: &AppState, username: &str) -> (i64, String) {
    let conn = state.db.get().expect("pool");
    conn.execute(
        "INSERT OR IGNORE INTO users (username, avatar_url) VALUES (?1, '')",
        [username],
    )
    .expect("insert user");
    let id: i64 = conn
        .query_row("SELECT id FROM users WHERE username = ?1", [username], |row| {
            row.get(0)
        })
        .expect("user id");
    let token = auth::sign_token(id, &state.jwt_secret).expect("token");
    (id, token)
}

pub fn seed_question(
    state: &AppState,
    username: &str,
    title: &str,
    body: &str,
    tags: &[&str],
) -> i64 {
    let (user_id, _) = seed_user(state, username);
    let conn = state.db.get().expect("pool");
    conn.execute(
        "INSERT INTO questions (user_id, title, body) VALUES (?1, ?2, ?3)",
        rusqlite::params![user_id, title, body],
    )
    .expect("insert question");
    let question_id = conn.last_insert_rowid();

    for tag in tags {
        conn.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", [tag])
            .expect("insert tag");
        let tag_id: i64 = conn
            .query_row("SELECT id FROM tags WHERE name = ?1", [tag], |row| row.get(0))
            .expect("tag id");
        conn.execute(
            "INSERT OR IGNORE INTO question_tags (question_id, tag_id) VALUES (?1, ?2)",
            rusqlite::params![question_id, tag_id],
        )
        .expect("link tag");
    }

    question_id
}

pub fn seed_answer(state: &AppState, username: &str, question_id: i64, body: &str) -> i64 {
    let (user_id, _) = seed_user(state, username);
    let conn = state.db.get().expect("pool");
    conn.execute(
        "INSERT INTO answers (question_id, user_id, body) VALUES (?1, ?2, ?3)",
        rusqlite::params![question_id, user_id, body],
    )
    .expect("insert answer");
    conn.last_insert_rowid()
}

pub fn cast_test_vote(
    state: &AppState,
    username: &str,
    target_type: &str,
    target_id: i64,
    kind: &str,
) {
    let (user_id, _) = seed_user(state, username);
    let conn = state.db.get().expect("pool");
    conn.execute(
        "INSERT INTO votes (user_id, target_type, target_id, kind) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![user_id, target_type, target_id, kind],
    )
    .expect("insert vote");
}

pub fn bump_views(state: &AppState, question_id: i64, views: i64) {
    let conn = state.db.get().expect("pool");
    conn.execute(
        "UPDATE questions SET views = ?2 WHERE id = ?1",
        rusqlite::params![question_id, views],
    )
    .expect("bump views");
}

pub fn count_rows(state: &AppState, table: &str) -> i64 {
    let conn = state.db.get().expect("pool");
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })
    .expect("count rows")
}
