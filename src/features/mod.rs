//! Feature modules.
//!
//! - [`focus`]: session timer, aggregation and reports
//! - [`sync`]: local cache writes and the remote outbox

pub mod focus;
pub mod sync;
