//! Run archives and reports

pub mod logger;
pub mod report;

pub use logger::RunArchive;
pub use report::generate_report;
