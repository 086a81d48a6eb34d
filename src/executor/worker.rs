//! Single-job execution
//!
//! A worker loads the job's definition, runs it under the retry policy and
//! the configured timeout strategy, then publishes exactly one progress
//! event and exactly one result.

use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::collaborators::{ComparisonEngine, DefinitionLoader, ReachabilityProbe, TestExecutor};
use super::retry::{retry_with_policy, RetryPolicy};
use super::timeout::{run_native, Bounded, TimeoutStrategy, Watchdog};
use super::EngineError;
use crate::channel::ResultSender;
use crate::models::{
    CallRequest, CallResponse, ExecutionError, ExecutionResult, TestDefinition, TestJob,
};
use crate::output::{OutputError, OutputHandle, ProgressStyle};
use crate::results::describe_mismatch;
use crate::utils::Timer;

/// Per-job limits shared by every worker in a run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecutionPolicy {
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub timeout_strategy: TimeoutStrategy,
    pub grace_period: Duration,
    pub probe_timeout: Duration,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            timeout_strategy: TimeoutStrategy::Native,
            grace_period: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(3),
        }
    }
}

impl ExecutionPolicy {
    /// Longest a single job can take with every attempt timing out
    pub fn worst_case_per_job(&self) -> Duration {
        let mut attempt = self.timeout;
        if self.timeout_strategy == TimeoutStrategy::Watchdog {
            attempt = attempt.saturating_add(self.grace_period);
        }
        if self.retry.health_checks_enabled() {
            attempt = attempt.saturating_add(self.probe_timeout);
        }

        let attempts = self.retry.max_retries().saturating_add(1);
        attempt
            .saturating_mul(attempts)
            .saturating_add(self.retry.total_delay())
    }
}

/// Implementations the worker calls out to
#[derive(Clone)]
pub struct Collaborators {
    pub executor: Arc<dyn TestExecutor>,
    pub comparator: Arc<dyn ComparisonEngine>,
    pub probe: Arc<dyn ReachabilityProbe>,
    pub loader: Arc<dyn DefinitionLoader>,
}

impl Collaborators {
    pub fn new(
        executor: Arc<dyn TestExecutor>,
        comparator: Arc<dyn ComparisonEngine>,
        probe: Arc<dyn ReachabilityProbe>,
        loader: Arc<dyn DefinitionLoader>,
    ) -> Self {
        Self {
            executor,
            comparator,
            probe,
            loader,
        }
    }
}

#[derive(Clone)]
pub struct Worker {
    collaborators: Collaborators,
    policy: ExecutionPolicy,
    output: OutputHandle,
    events: ResultSender,
    style: ProgressStyle,
}

impl Worker {
    pub fn new(
        collaborators: Collaborators,
        policy: ExecutionPolicy,
        output: OutputHandle,
        events: ResultSender,
    ) -> Self {
        Self {
            collaborators,
            policy,
            output,
            events,
            style: ProgressStyle::default(),
        }
    }

    pub fn with_style(mut self, style: ProgressStyle) -> Self {
        self.style = style;
        self
    }

    /// Execute the job and publish its outcome. A panic while executing is
    /// reported as a worker fault plus an `Error` result.
    pub async fn run(&self, job: &TestJob) -> Result<ExecutionResult, EngineError> {
        let result = match AssertUnwindSafe(self.execute(job)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(job = %job.id, "Worker panicked: {}", message);
                self.events.send_error(&job.id, &message).await?;
                ExecutionResult::error(job, format!("worker panicked: {message}"))
            }
        };

        self.emit(&result).await?;
        Ok(result)
    }

    /// Display the progress symbol and send progress, then the result
    pub async fn emit(&self, result: &ExecutionResult) -> Result<(), EngineError> {
        self.display(result)?;
        self.events.send_progress(result.progress())?;
        self.events.send_result(result.clone()).await?;
        Ok(())
    }

    fn display(&self, result: &ExecutionResult) -> Result<(), OutputError> {
        match self.style {
            ProgressStyle::Symbols => self.output.print(result.status.symbol().to_string()),
            ProgressStyle::Lines => self.output.print_line(result.to_string()),
            ProgressStyle::Quiet => Ok(()),
        }
    }

    /// Run the job to a terminal result without publishing anything
    pub async fn execute(&self, job: &TestJob) -> ExecutionResult {
        let started_at = Utc::now();
        let timer = Timer::start(&job.id);

        let definition = match self.collaborators.loader.load(job) {
            Ok(definition) => definition,
            Err(err) => {
                let err = ExecutionError::ProtocolError(err.to_string());
                return ExecutionResult::failed(job, &err, started_at, timer.elapsed_ms(), 0);
            }
        };

        let request = definition.call_request();
        let (definition, request) = (&definition, &request);
        let outcome = retry_with_policy(&self.policy.retry, |attempt| {
            debug!(job = %job.id, attempt, "Executing");
            self.attempt(definition, request)
        })
        .await;

        let duration_ms = timer.stop().as_millis() as u64;
        match outcome.result {
            Ok(()) => ExecutionResult::passed(job, started_at, duration_ms, outcome.attempts),
            Err(err) => {
                debug!(job = %job.id, attempts = outcome.attempts, "Job failed: {}", err);
                ExecutionResult::failed(job, &err, started_at, duration_ms, outcome.attempts)
            }
        }
    }

    async fn attempt(
        &self,
        definition: &TestDefinition,
        request: &CallRequest,
    ) -> Result<(), ExecutionError> {
        if self.policy.retry.health_checks_enabled() {
            self.collaborators
                .probe
                .probe(&request.endpoint, self.policy.probe_timeout)
                .await?;
        }

        let response = self.call(request).await?;
        if self
            .collaborators
            .comparator
            .compare(&response, &definition.expect, &definition.options)
        {
            Ok(())
        } else {
            Err(ExecutionError::AssertionMismatch(describe_mismatch(
                &response,
                &definition.expect,
            )))
        }
    }

    async fn call(&self, request: &CallRequest) -> Result<CallResponse, ExecutionError> {
        let limit = self.policy.timeout;

        let bounded = match self.policy.timeout_strategy {
            TimeoutStrategy::Native => {
                let executor = &self.collaborators.executor;
                run_native(limit, executor.execute(request, CancellationToken::new())).await
            }
            TimeoutStrategy::Watchdog => {
                let executor = Arc::clone(&self.collaborators.executor);
                let request = request.clone();
                Watchdog::new(limit, self.policy.grace_period)
                    .run(move |token| async move { executor.execute(&request, token).await })
                    .await
            }
        };

        match bounded {
            Bounded::Completed(response) => response,
            Bounded::TimedOut(phase) => {
                debug!(endpoint = %request.endpoint, ?phase, "Call timed out");
                Err(ExecutionError::Timeout(limit.as_millis() as u64))
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scriptable collaborators shared by the engine tests

    use super::*;
    use futures::future::BoxFuture;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::models::{DefinitionError, ExpectedResponse};
    use crate::results::JsonComparator;

    /// Behaviour of one fake endpoint
    #[derive(Clone, Debug)]
    pub enum Script {
        Ok(u16),
        Unreachable,
        Hang,
        Panic,
        /// Fails as unreachable for the first n attempts
        FlakyFor(u32),
    }

    /// Loads a definition whose endpoint is the job id
    pub struct EndpointLoader;

    impl DefinitionLoader for EndpointLoader {
        fn load(&self, job: &TestJob) -> Result<TestDefinition, DefinitionError> {
            let mut definition = TestDefinition::new(job.id.clone());
            definition.expect = ExpectedResponse {
                status: Some(200),
                body: None,
            };
            Ok(definition)
        }
    }

    #[derive(Default)]
    pub struct FakeExecutor {
        scripts: HashMap<String, Script>,
        pub delay: Duration,
        pub calls: Mutex<HashMap<String, u32>>,
        active: AtomicUsize,
        pub max_active: AtomicUsize,
        pub total_calls: AtomicU32,
    }

    impl FakeExecutor {
        pub fn new(scripts: impl IntoIterator<Item = (String, Script)>) -> Self {
            Self {
                scripts: scripts.into_iter().collect(),
                ..Default::default()
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn calls_for(&self, endpoint: &str) -> u32 {
            self.calls
                .lock()
                .unwrap()
                .get(endpoint)
                .copied()
                .unwrap_or(0)
        }

        fn record(&self, endpoint: &str) -> u32 {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(endpoint.to_string()).or_insert(0);
            *count += 1;
            *count
        }
    }

    impl TestExecutor for FakeExecutor {
        fn execute<'a>(
            &'a self,
            request: &'a CallRequest,
            _cancel: CancellationToken,
        ) -> BoxFuture<'a, Result<CallResponse, ExecutionError>> {
            Box::pin(async move {
                let attempt = self.record(&request.endpoint);
                self.total_calls.fetch_add(1, Ordering::SeqCst);
                let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_active.fetch_max(active, Ordering::SeqCst);

                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }

                let script = self
                    .scripts
                    .get(&request.endpoint)
                    .cloned()
                    .unwrap_or(Script::Ok(200));
                let outcome = match script {
                    Script::Ok(status) => Ok(CallResponse {
                        status,
                        body: serde_json::Value::Null,
                    }),
                    Script::Unreachable => Err(ExecutionError::NetworkUnavailable(
                        request.endpoint.clone(),
                    )),
                    Script::FlakyFor(n) if attempt <= n => Err(
                        ExecutionError::NetworkUnavailable(request.endpoint.clone()),
                    ),
                    Script::FlakyFor(_) => Ok(CallResponse {
                        status: 200,
                        body: serde_json::Value::Null,
                    }),
                    Script::Hang => {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok(CallResponse {
                            status: 200,
                            body: serde_json::Value::Null,
                        })
                    }
                    Script::Panic => {
                        self.active.fetch_sub(1, Ordering::SeqCst);
                        panic!("executor blew up on {}", request.endpoint);
                    }
                };

                self.active.fetch_sub(1, Ordering::SeqCst);
                outcome
            })
        }
    }

    /// Probe that always succeeds
    pub struct OpenProbe;

    impl ReachabilityProbe for OpenProbe {
        fn probe<'a>(
            &'a self,
            _endpoint: &'a str,
            _timeout: Duration,
        ) -> BoxFuture<'a, Result<(), ExecutionError>> {
            Box::pin(async { Ok(()) })
        }
    }

    pub fn collaborators(executor: Arc<FakeExecutor>) -> Collaborators {
        Collaborators::new(
            executor,
            Arc::new(JsonComparator),
            Arc::new(OpenProbe),
            Arc::new(EndpointLoader),
        )
    }

    pub fn scripted(entries: &[(&str, Script)]) -> Arc<FakeExecutor> {
        Arc::new(FakeExecutor::new(
            entries.iter().map(|(k, v)| (k.to_string(), v.clone())),
        ))
    }

    pub fn quick_policy(retries: u32) -> ExecutionPolicy {
        ExecutionPolicy {
            timeout: Duration::from_secs(2),
            retry: RetryPolicy::new(retries, Duration::ZERO),
            timeout_strategy: TimeoutStrategy::Native,
            grace_period: Duration::from_millis(50),
            probe_timeout: Duration::from_millis(100),
        }
    }
}
