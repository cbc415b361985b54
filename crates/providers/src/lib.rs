//! Text-generation backends for SQLPilot.
//!
//! All backends implement the `sqlpilot_core::Generator` trait.

pub mod tgi;

pub use tgi::TextGenInference;
