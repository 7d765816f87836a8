use serde::Deserialize;

use crate::error::{ApiError, FieldErrors};

pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Raw query-string inputs for a paginated listing. Numbers arrive as
/// strings so a bad value can be reported per field instead of bouncing
/// at the deserialization layer.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<String>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<String>,
    pub query: Option<String>,
    pub sort: Option<String>,
}

/// A validated list query. `page` and `page_size` are always positive.
#[derive(Debug, Clone)]
pub struct ListQuery {
    pub page: i64,
    pub page_size: i64,
    pub query: Option<String>,
    pub sort: Option<String>,
}

impl PageParams {
    /// Coerces and checks `page`/`pageSize`. Absent fields take the
    /// documented defaults; present-but-invalid fields are collected into
    /// one validation error covering every violation.
    pub fn validate(self) -> Result<ListQuery, ApiError> {
        let mut details = FieldErrors::new();

        let page = parse_positive(self.page.as_deref(), "page", "Page", 1, &mut details);
        let page_size = parse_positive(
            self.page_size.as_deref(),
            "pageSize",
            "Page size",
            DEFAULT_PAGE_SIZE,
            &mut details,
        );

        if !details.is_empty() {
            return Err(ApiError::validation(details));
        }

        let query = self
            .query
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());

        Ok(ListQuery {
            page,
            page_size,
            query,
            sort: self.sort,
        })
    }
}

fn parse_positive(
    raw: Option<&str>,
    field: &str,
    label: &str,
    default: i64,
    details: &mut FieldErrors,
) -> i64 {
    let Some(raw) = raw else {
        return default;
    };

    match raw.trim().parse::<i64>() {
        Ok(n) if n >= 1 => n,
        Ok(_) => {
            details
                .entry(field.to_string())
                .or_default()
                .push(format!("{label} must be at least 1"));
            default
        }
        Err(_) => {
            details
                .entry(field.to_string())
                .or_default()
                .push(format!("{label} expected a number, received a string"));
            default
        }
    }
}

impl ListQuery {
    /// First record of this page's window in the filtered, sorted set.
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }

    /// Case-insensitive substring pattern for SQL `LIKE`, or a match-all
    /// pattern when no filter was given.
    pub fn like_pattern(&self) -> String {
        match &self.query {
            Some(q) => format!("%{}%", q.to_lowercase()),
            None => "%".to_string(),
        }
    }

    /// True iff strictly more matching records exist beyond this page.
    pub fn is_next(&self, total: i64) -> bool {
        total > self.page * self.page_size
    }
}
