//! Domain logic for the gifpress compression service.
//!
//! This crate holds everything that does not depend on the HTTP layer or
//! the database: the compression-option model, gifsicle argument
//! construction and probing, processing-time prediction, and the timed
//! progress animator planning.

pub mod error;
pub mod gifsicle;
pub mod options;
pub mod predictor;
pub mod progress;
pub mod types;
