//! Request handlers. Each maps pipeline errors through [`crate::error::AppError`].

pub mod sessions;
