//! Template contexts and rendering helpers.

pub mod views;
