//! Output formatting for focuslog.
//!
//! Pretty output is rendered by each command; JSON goes through [`to_json`].

mod json;

pub use json::to_json;
