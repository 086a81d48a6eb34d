//! Seams between the execution engine and the outside world
//!
//! The engine only talks to these traits; concrete HTTP, TCP and JSON
//! implementations live in `http` and `results`.

use futures::future::BoxFuture;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::models::{
    CallRequest, CallResponse, CompareOptions, DefinitionError, ExecutionError, ExpectedResponse,
    TestDefinition, TestJob,
};

/// Performs the call against the service under test
pub trait TestExecutor: Send + Sync {
    /// `cancel` fires when a watchdog asks the call to stop early
    fn execute<'a>(
        &'a self,
        request: &'a CallRequest,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<CallResponse, ExecutionError>>;
}

/// Decides whether an actual response matches the expectation
pub trait ComparisonEngine: Send + Sync {
    fn compare(
        &self,
        actual: &CallResponse,
        expected: &ExpectedResponse,
        options: &CompareOptions,
    ) -> bool;
}

/// Pre-flight reachability check
pub trait ReachabilityProbe: Send + Sync {
    fn probe<'a>(
        &'a self,
        endpoint: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<(), ExecutionError>>;
}

/// Turns a job into its test definition
pub trait DefinitionLoader: Send + Sync {
    fn load(&self, job: &TestJob) -> Result<TestDefinition, DefinitionError>;
}

/// Reads definitions from the job's file
#[derive(Clone, Copy, Debug, Default)]
pub struct FileDefinitionLoader;

impl DefinitionLoader for FileDefinitionLoader {
    fn load(&self, job: &TestJob) -> Result<TestDefinition, DefinitionError> {
        TestDefinition::load(&job.path)
    }
}
