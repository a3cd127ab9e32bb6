//! The enabled-by-config fetch modes. Each mode is independent: a failure
//! is caught at the mode boundary and never prevents its siblings from
//! running.

pub mod active_users;
pub mod token_posts;
pub mod trending;
