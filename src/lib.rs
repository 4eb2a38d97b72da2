//! Yatube: a server-rendered blogging platform.
//!
//! Layers follow the usual split: `domain` holds records and invariants,
//! `application` holds services and repository traits, `infra` holds the
//! Postgres, HTTP and filesystem adapters, `presentation` holds templates.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
