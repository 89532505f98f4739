//! Google Analytics Data API report clients.

pub mod backend;
pub mod realtime;
pub mod report;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use backend::AnalyticsBackend;
pub use realtime::RealtimeReport;
pub use report::Report;
