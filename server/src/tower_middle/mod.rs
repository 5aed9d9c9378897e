/// Tower middleware wrapped around every HTTP request:
/// - access logging
/// - request timeouts
pub mod tower_access_log;
pub mod tower_timeout_handler;

pub use tower_access_log::{AccessLogLayer, AccessLogService};
pub use tower_timeout_handler::{TimeoutLayer, TimeoutService};
