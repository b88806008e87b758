/// User resource endpoints
///
/// Both endpoints sit behind authentication and rate limiting. They only
/// ever expose active users, serialized without any credential fields.
///
/// # Endpoints
///
/// ```text
/// GET /v1/users?page=1&per_page=20
/// GET /v1/users/:id
/// ```
///
/// # Pagination
///
/// The list endpoint returns a bare JSON array and describes the page in
/// headers:
/// - `X-Pagination-Total-Count`
/// - `X-Pagination-Page-Count`
/// - `X-Pagination-Current-Page`
/// - `X-Pagination-Per-Page`

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{rejection::PathRejection, rejection::QueryRejection, Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    Json,
};
use serde::Deserialize;
use userapi_shared::models::user::User;
use validator::Validate;

pub const X_PAGINATION_TOTAL_COUNT: HeaderName = HeaderName::from_static("x-pagination-total-count");
pub const X_PAGINATION_PAGE_COUNT: HeaderName = HeaderName::from_static("x-pagination-page-count");
pub const X_PAGINATION_CURRENT_PAGE: HeaderName = HeaderName::from_static("x-pagination-current-page");
pub const X_PAGINATION_PER_PAGE: HeaderName = HeaderName::from_static("x-pagination-per-page");

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    20
}

/// Query parameters for the list endpoint
#[derive(Debug, Deserialize, Validate)]
pub struct ListUsersQuery {
    /// 1-based page number
    #[serde(default = "default_page")]
    #[validate(range(min = 1, message = "must be at least 1"))]
    pub page: u32,

    /// Page size
    #[serde(default = "default_per_page", alias = "per-page")]
    #[validate(range(min = 1, max = 100, message = "must be between 1 and 100"))]
    pub per_page: u32,
}

/// Page geometry derived from the total count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Page {
    total_count: i64,
    page_count: i64,
    current_page: u32,
    per_page: u32,
}

impl Page {
    fn new(total_count: i64, current_page: u32, per_page: u32) -> Self {
        let per_page_i64 = i64::from(per_page.max(1));
        Self {
            total_count,
            page_count: (total_count + per_page_i64 - 1) / per_page_i64,
            current_page,
            per_page,
        }
    }

    fn offset(&self) -> i64 {
        i64::from(self.current_page.saturating_sub(1)) * i64::from(self.per_page)
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(X_PAGINATION_TOTAL_COUNT, HeaderValue::from(self.total_count));
        headers.insert(X_PAGINATION_PAGE_COUNT, HeaderValue::from(self.page_count));
        headers.insert(X_PAGINATION_CURRENT_PAGE, HeaderValue::from(self.current_page));
        headers.insert(X_PAGINATION_PER_PAGE, HeaderValue::from(self.per_page));
        headers
    }
}

/// Lists active users ordered by id
///
/// # Errors
///
/// - 400 if the query string cannot be parsed
/// - 422 if `page` or `per_page` is out of range
/// - 503 if the identity store is unavailable
pub async fn index(
    State(state): State<AppState>,
    query: Result<Query<ListUsersQuery>, QueryRejection>,
) -> ApiResult<(HeaderMap, Json<Vec<User>>)> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    query.validate()?;

    let total = state.users.count_active().await?;
    let page = Page::new(total, query.page, query.per_page);
    let users = state
        .users
        .list_active(i64::from(page.per_page), page.offset())
        .await?;

    tracing::debug!(page = page.current_page, count = users.len(), "Listed users");

    Ok((page.headers(), Json(users)))
}

/// Returns one active user
///
/// # Errors
///
/// - 404 if the id is not numeric, unknown, or belongs to a deleted user
/// - 503 if the identity store is unavailable
pub async fn view(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<User>> {
    let Path(id) = id.map_err(|_| ApiError::NotFound("Object not found".to_string()))?;

    let user = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Object not found: {}", id)))?;

    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_geometry() {
        let page = Page::new(45, 3, 20);
        assert_eq!(page.page_count, 3);
        assert_eq!(page.offset(), 40);

        let empty = Page::new(0, 1, 20);
        assert_eq!(empty.page_count, 0);
        assert_eq!(empty.offset(), 0);

        let exact = Page::new(40, 2, 20);
        assert_eq!(exact.page_count, 2);
    }

    #[test]
    fn test_page_headers() {
        let headers = Page::new(45, 2, 20).headers();
        assert_eq!(headers.get("X-Pagination-Total-Count").unwrap(), "45");
        assert_eq!(headers.get("X-Pagination-Page-Count").unwrap(), "3");
        assert_eq!(headers.get("X-Pagination-Current-Page").unwrap(), "2");
        assert_eq!(headers.get("X-Pagination-Per-Page").unwrap(), "20");
    }

    #[test]
    fn test_query_validation() {
        let ok = ListUsersQuery { page: 1, per_page: 100 };
        assert!(ok.validate().is_ok());

        let zero_page = ListUsersQuery { page: 0, per_page: 20 };
        assert!(zero_page.validate().is_err());

        let too_big = ListUsersQuery { page: 1, per_page: 101 };
        assert!(too_big.validate().is_err());
    }
}
