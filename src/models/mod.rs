//! Data models for service test runs
//!
//! This module contains all data structures shared by the execution engine.

mod definition;
mod failure;
mod job;
mod test_result;

pub use definition::{
    CallRequest, CallResponse, CompareOptions, DefinitionError, ExpectedResponse, TestDefinition,
    TlsSettings,
};
pub use failure::{ExecutionError, FailureKind};
pub use job::TestJob;
pub use test_result::{AggregateStats, ExecutionResult, JobStatus, ProgressEvent};
