/// Middleware modules for the API server
///
/// - Rate limiting per authenticated user
///
/// Authentication middleware lives in `userapi_shared::auth::middleware`.

pub mod rate_limit;
