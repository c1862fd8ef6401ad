//! Out-of-band alert delivery.
//!
//! Notifiers consume the hub's in-process alert stream on their own task,
//! so a slow mail server never holds up the live pipeline.

pub mod email;

pub use email::{email_settings_from_env, EmailNotifier};
