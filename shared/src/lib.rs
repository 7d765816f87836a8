use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ── Result envelope ──

/// Uniform response shape returned by every API route:
/// `{ success, data?, error? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    /// Field name → list of violation messages, set for validation errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, Vec<String>>>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: String, details: Option<HashMap<String, Vec<String>>>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody { message, details }),
        }
    }
}

// ── Pagination ──

/// One page of a filtered, sorted listing. `is_next` is true iff strictly
/// more matching records exist beyond this page's window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub is_next: bool,
}

// ── Auth ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub avatar_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRequest {
    pub username: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

// ── Questions ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub views: i64,
    pub created_at: String,
    pub user: User,
    pub tags: Vec<Tag>,
    pub answers: i64,
    pub upvotes: i64,
    pub downvotes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateQuestion {
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewCount {
    pub views: i64,
}

// ── Answers ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub id: i64,
    pub question_id: i64,
    pub body: String,
    pub created_at: String,
    pub user: User,
    pub upvotes: i64,
    pub downvotes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAnswer {
    pub body: String,
}

// ── Tags ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub questions: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagQuestions {
    pub tag: Tag,
    pub questions: Page<Question>,
}

// ── Votes ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVote {
    pub target_type: String,
    pub target_id: i64,
    pub kind: String,
}

/// Aggregate counts for a target plus the calling user's own vote, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteStatus {
    pub upvotes: i64,
    pub downvotes: i64,
    pub active: Option<String>,
}

// ── Collections ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleSave {
    pub question_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedStatus {
    pub saved: bool,
}

// ── Tasks ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskItem {
    pub id: i64,
    pub name: String,
    pub priority: i64,
    pub difficulty: i64,
    pub score: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTask {
    pub name: String,
    pub priority: i64,
    pub difficulty: i64,
}

// ── Pokédex ──

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PokemonStats {
    pub hp: i64,
    pub attack: i64,
    pub defense: i64,
    pub sp_atk: i64,
    pub sp_def: i64,
    pub speed: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pokemon {
    pub id: i64,
    pub name: String,
    pub image: String,
    pub types: Vec<String>,
    pub stats: PokemonStats,
}
