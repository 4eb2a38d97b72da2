//! Application services and the repository seams they depend on.

pub mod accounts;
pub mod comments;
pub mod error;
pub mod feed;
pub mod follows;
pub mod forms;
pub mod groups;
pub mod pagination;
pub mod posts;
pub mod repos;
