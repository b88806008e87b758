/// API route handlers
///
/// - `health`: Health check endpoint
/// - `users`: User list and view endpoints

pub mod health;
pub mod users;
