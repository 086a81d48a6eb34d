//! Result aggregation, comparison and reporting

mod aggregator;
mod compare;
mod report;

pub use aggregator::{Aggregator, RunReport};
pub use compare::{describe_mismatch, JsonComparator};
pub use report::{ReportEmitter, ReportFormat};
