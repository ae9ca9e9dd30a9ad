//! Ordered, named stages with required/optional failure semantics.
//!
//! A [`Pipeline`] runs its stages one after another. Every stage sees an
//! immutable snapshot of what earlier stages produced. A failed required
//! stage halts the run; a failed optional stage is recorded as skipped and
//! the run carries on.

use std::{collections::BTreeMap, collections::HashSet, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ErrorKind, Result, TubeDigestError};

/// A stage failure as it is recorded in the run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

impl StageError {
    pub fn cancelled() -> Self {
        Self::from(&TubeDigestError::Cancelled)
    }
}

impl From<&TubeDigestError> for StageError {
    fn from(err: &TubeDigestError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            causes: err.causes(),
        }
    }
}

impl From<TubeDigestError> for StageError {
    fn from(err: TubeDigestError) -> Self {
        Self::from(&err)
    }
}

impl std::fmt::Display for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageResult {
    Ok { value: Value },
    Skipped { reason: String },
    Failed { error: StageError },
}

impl StageResult {
    /// Serialize a stage output, turning errors into `Failed`.
    pub fn from_output<T: Serialize>(output: Result<T>) -> Self {
        match output.and_then(|value| serde_json::to_value(value).map_err(TubeDigestError::from)) {
            Ok(value) => StageResult::Ok { value },
            Err(err) => StageResult::Failed {
                error: StageError::from(&err),
            },
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        StageResult::Skipped {
            reason: reason.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, StageResult::Ok { .. })
    }
}

/// Produces a stage's result from the context accumulated so far.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    async fn execute(&self, context: &PipelineContext, cancel: &CancellationToken) -> StageResult;
}

#[derive(Clone)]
pub struct StageDefinition {
    pub name: String,
    pub required: bool,
    pub executor: Arc<dyn StageExecutor>,
}

impl StageDefinition {
    pub fn required(name: impl Into<String>, executor: Arc<dyn StageExecutor>) -> Self {
        Self {
            name: name.into(),
            required: true,
            executor,
        }
    }

    pub fn optional(name: impl Into<String>, executor: Arc<dyn StageExecutor>) -> Self {
        Self {
            name: name.into(),
            required: false,
            executor,
        }
    }
}

impl std::fmt::Debug for StageDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageDefinition")
            .field("name", &self.name)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}

/// Pipeline input plus the outputs of every stage that reached `Ok`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineContext {
    input: Value,
    values: BTreeMap<String, Value>,
}

impl PipelineContext {
    pub fn new(input: Value) -> Self {
        Self {
            input,
            values: BTreeMap::new(),
        }
    }

    pub fn from_input<T: Serialize>(input: &T) -> Result<Self> {
        Ok(Self::new(serde_json::to_value(input)?))
    }

    pub fn input<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.input.clone())?)
    }

    pub fn input_value(&self) -> &Value {
        &self.input
    }

    pub fn contains(&self, stage: &str) -> bool {
        self.values.contains_key(stage)
    }

    pub fn value(&self, stage: &str) -> Option<&Value> {
        self.values.get(stage)
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub fn get<T: DeserializeOwned>(&self, stage: &str) -> Result<Option<T>> {
        self.values
            .get(stage)
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
            .map_err(TubeDigestError::from)
    }

    pub fn require<T: DeserializeOwned>(&self, stage: &str) -> Result<T> {
        self.get(stage)?
            .ok_or_else(|| TubeDigestError::MissingStageOutput {
                stage: stage.to_string(),
            })
    }

    /// Seed a stage output, e.g. from a previous run's artifacts.
    pub fn insert(&mut self, stage: impl Into<String>, value: Value) {
        self.values.insert(stage.into(), value);
    }

    pub fn with_value(mut self, stage: impl Into<String>, value: Value) -> Self {
        self.insert(stage, value);
        self
    }
}

/// Receives progress callbacks while a pipeline runs.
pub trait PipelineObserver: Send + Sync {
    fn stage_started(&self, _stage: &StageDefinition) {}

    fn stage_finished(&self, _record: &StageRecord) {}
}

struct NoopObserver;

impl PipelineObserver for NoopObserver {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: String,
    pub required: bool,
    pub result: StageResult,
    /// Set when an optional stage's failure was downgraded to `Skipped`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StageError>,
    pub elapsed_ms: u64,
    /// The output came from a seeded context, not from running the stage.
    #[serde(default)]
    pub reused: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    Partial,
    Failed,
}

/// Which required stage halted the run, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl From<StageFailure> for TubeDigestError {
    fn from(failure: StageFailure) -> Self {
        TubeDigestError::RequiredStageFailed {
            stage: failure.stage,
            kind: failure.kind,
            message: failure.message,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    pub stages: Vec<StageRecord>,
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<StageFailure>,
    #[serde(skip)]
    pub context: PipelineContext,
}

impl PipelineRun {
    pub fn stage(&self, name: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|record| record.name == name)
    }

    pub fn was_cancelled(&self) -> bool {
        self.failure
            .as_ref()
            .is_some_and(|failure| failure.kind == ErrorKind::Cancelled)
    }

    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            RunOutcome::Success | RunOutcome::Partial => 0,
            RunOutcome::Failed if self.was_cancelled() => 130,
            RunOutcome::Failed => 1,
        }
    }

    pub fn output_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        self.output
            .clone()
            .map(serde_json::from_value)
            .transpose()
            .map_err(TubeDigestError::from)
    }

    /// `Err(RequiredStageFailed)` for a failed run, the run itself otherwise.
    pub fn into_result(self) -> Result<Self> {
        match &self.failure {
            Some(failure) if self.outcome == RunOutcome::Failed => Err(failure.clone().into()),
            _ => Ok(self),
        }
    }
}

pub struct PipelineBuilder {
    stages: Vec<StageDefinition>,
    output_stage: Option<String>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            output_stage: None,
        }
    }

    pub fn stage(mut self, stage: StageDefinition) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn required(self, name: impl Into<String>, executor: Arc<dyn StageExecutor>) -> Self {
        self.stage(StageDefinition::required(name, executor))
    }

    pub fn optional(self, name: impl Into<String>, executor: Arc<dyn StageExecutor>) -> Self {
        self.stage(StageDefinition::optional(name, executor))
    }

    /// Take the run's final output from this stage instead of the last `Ok` one.
    pub fn output_from(mut self, stage: impl Into<String>) -> Self {
        self.output_stage = Some(stage.into());
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        let mut seen = HashSet::new();
        for stage in &self.stages {
            if stage.name.trim().is_empty() {
                return Err(invalid("empty stage name"));
            }
            if !seen.insert(stage.name.as_str()) {
                return Err(invalid(&format!("duplicate stage name={}", stage.name)));
            }
        }
        if let Some(output) = &self.output_stage
            && !seen.contains(output.as_str())
        {
            return Err(invalid(&format!("output stage={output} is not defined")));
        }

        Ok(Pipeline {
            stages: self.stages,
            output_stage: self.output_stage,
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid(reason: &str) -> TubeDigestError {
    TubeDigestError::InvalidInput {
        reason: reason.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    stages: Vec<StageDefinition>,
    output_stage: Option<String>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    pub async fn run(&self, input: Value, cancel: &CancellationToken) -> PipelineRun {
        self.run_with_context(PipelineContext::new(input), cancel)
            .await
    }

    /// Run with a pre-seeded context. Stages whose output is already
    /// present are recorded as reused and not executed.
    pub async fn run_with_context(
        &self,
        context: PipelineContext,
        cancel: &CancellationToken,
    ) -> PipelineRun {
        self.run_observed(context, cancel, &NoopObserver).await
    }

    pub async fn run_observed(
        &self,
        mut context: PipelineContext,
        cancel: &CancellationToken,
        observer: &dyn PipelineObserver,
    ) -> PipelineRun {
        let run_id = Uuid::new_v4();
        let mut records = Vec::with_capacity(self.stages.len());
        let mut failure = None;
        let mut last_ok = None;

        info!(%run_id, stages = self.stages.len(), "Pipeline started");

        for stage in &self.stages {
            observer.stage_started(stage);

            if let Some(value) = context.value(&stage.name) {
                info!(%run_id, stage = %stage.name, "Reusing stage output");
                last_ok = Some(stage.name.clone());
                let record = StageRecord {
                    name: stage.name.clone(),
                    required: stage.required,
                    result: StageResult::Ok {
                        value: value.clone(),
                    },
                    error: None,
                    elapsed_ms: 0,
                    reused: true,
                };
                observer.stage_finished(&record);
                records.push(record);
                continue;
            }

            let started = Instant::now();
            let mut interrupted = cancel.is_cancelled();
            let result = if interrupted {
                StageResult::Failed {
                    error: StageError::cancelled(),
                }
            } else {
                info!(%run_id, stage = %stage.name, required = stage.required, "Stage started");
                let snapshot = context.clone();
                let result = tokio::select! {
                    biased;

                    _ = cancel.cancelled() => StageResult::Failed {
                        error: StageError::cancelled(),
                    },
                    result = stage.executor.execute(&snapshot, cancel) => result,
                };
                interrupted = cancel.is_cancelled() && !result.is_ok();
                // A stage interrupted by the caller is cancelled, whatever it returned.
                if interrupted {
                    StageResult::Failed {
                        error: StageError::cancelled(),
                    }
                } else {
                    result
                }
            };
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let mut record = StageRecord {
                name: stage.name.clone(),
                required: stage.required,
                result,
                error: None,
                elapsed_ms,
                reused: false,
            };

            match &record.result {
                StageResult::Ok { value } => {
                    info!(%run_id, stage = %stage.name, elapsed_ms, "Stage succeeded");
                    context.insert(stage.name.clone(), value.clone());
                    last_ok = Some(stage.name.clone());
                }
                StageResult::Skipped { reason } if stage.required => {
                    warn!(%run_id, stage = %stage.name, reason = %reason, "Required stage skipped, halting");
                    failure = Some(StageFailure {
                        stage: stage.name.clone(),
                        kind: ErrorKind::RequiredStageFailed,
                        message: format!("required stage skipped: {reason}"),
                    });
                }
                StageResult::Skipped { reason } => {
                    info!(%run_id, stage = %stage.name, reason = %reason, "Stage skipped");
                }
                StageResult::Failed { error } if stage.required || interrupted => {
                    warn!(%run_id, stage = %stage.name, kind = %error.kind, error = %error.message, "Stage failed, halting");
                    failure = Some(StageFailure {
                        stage: stage.name.clone(),
                        kind: error.kind,
                        message: error.message.clone(),
                    });
                }
                StageResult::Failed { error } => {
                    warn!(%run_id, stage = %stage.name, kind = %error.kind, error = %error.message, "Optional stage failed, skipping");
                    let error = error.clone();
                    record.result = StageResult::skipped(error.to_string());
                    record.error = Some(error);
                }
            }

            observer.stage_finished(&record);
            records.push(record);

            if failure.is_some() {
                break;
            }
        }

        let outcome = if failure.is_some() {
            RunOutcome::Failed
        } else if records.iter().all(|record| record.result.is_ok()) {
            RunOutcome::Success
        } else {
            RunOutcome::Partial
        };

        let output_stage = self.output_stage.clone().or(last_ok);
        let output = output_stage.and_then(|stage| context.value(&stage).cloned());

        info!(%run_id, outcome = ?outcome, "Pipeline finished");

        PipelineRun {
            run_id,
            outcome,
            stages: records,
            output,
            failure,
            context,
        }
    }
}
