//! Page-side execution: runs planned actions and reads diagnostics through
//! the automation agent.

pub mod diagnostics;
pub mod executor;
pub mod highlight;
pub mod snapshot;

#[cfg(test)]
mod test_support;

pub use diagnostics::PageDiagnosticsCollector;
pub use executor::{ActionExecutor, parse_wait_duration};
pub use highlight::HighlightRegistry;
pub use snapshot::{ScreenshotDiff, SnapshotStore};
