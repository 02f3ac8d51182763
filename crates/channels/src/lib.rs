//! Outbound channels for the loyalty engine.
//!
//! Email goes through the hosted edge function that renders the
//! organization's template; `LogOnlyMailer` stands in when email is disabled.

#![warn(clippy::unwrap_used)]

pub mod email;

pub use email::{mailer_from_config, EdgeFunctionMailer, LogOnlyMailer, TemplateStats};
