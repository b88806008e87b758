/// Database layer
///
/// - `pool`: PostgreSQL connection pool with health checks
///
/// The `user` table layout is documented on [`crate::models::user::User`].
/// Schema changes are managed outside this crate.

pub mod pool;
