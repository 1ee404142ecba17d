//! User-facing front end.
//!
//! - [`terminal`] - status line, transcript and volume bar on stdout

pub mod terminal;
