//! Hook execution.
//!
//! Warning levels carry opaque action lists (`on_warn`, `on_expire`). The core
//! never interprets them; it hands them to a [`HookExecutor`] supplied by the
//! caller whenever a warning is issued, expires or resumes.

use async_trait::async_trait;
use sanction_common::AppResult;
use sanction_db::entities::{PunishmentType, active_warning};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// What caused a hook to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HookTrigger {
    Issued,
    Expired,
    Resumed,
}

/// Snapshot of the warning step a hook fired for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarningContext {
    pub record_id: String,
    pub level: i32,
    pub start_time: i64,
    /// Epoch milliseconds, or -1 when the step never expires.
    pub end_time: i64,
}

impl From<&active_warning::Model> for WarningContext {
    fn from(model: &active_warning::Model) -> Self {
        Self {
            record_id: model.punishment_record_id.clone(),
            level: model.level,
            start_time: model.start_time,
            end_time: model.end_time,
        }
    }
}

/// Arguments handed to the hook executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookInvocation {
    /// Who caused the transition (moderator name or `System`).
    pub actor: String,
    pub subject_id: String,
    pub action_kind: PunishmentType,
    pub duration_label: String,
    pub reason: String,
    pub is_removal: bool,
    /// Opaque configured actions, possibly empty.
    pub actions: Vec<String>,
    pub warning: Option<WarningContext>,
    pub trigger: HookTrigger,
}

/// Callback run for warning transitions.
#[async_trait]
pub trait HookExecutor: Send + Sync {
    /// Run the hook. Errors are logged by the caller and never roll back the
    /// transition that fired it.
    async fn execute(&self, invocation: HookInvocation) -> AppResult<()>;
}

/// Hook executor that does nothing.
#[derive(Clone, Default)]
pub struct NoOpHookExecutor;

#[async_trait]
impl HookExecutor for NoOpHookExecutor {
    async fn execute(&self, _invocation: HookInvocation) -> AppResult<()> {
        Ok(())
    }
}

/// Hook executor that keeps every invocation, for tests.
#[derive(Default)]
pub struct RecordingHookExecutor {
    invocations: Mutex<Vec<HookInvocation>>,
}

impl RecordingHookExecutor {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Invocations so far, oldest first.
    pub async fn invocations(&self) -> Vec<HookInvocation> {
        self.invocations.lock().await.clone()
    }

    /// Drain recorded invocations.
    pub async fn take(&self) -> Vec<HookInvocation> {
        std::mem::take(&mut *self.invocations.lock().await)
    }
}

#[async_trait]
impl HookExecutor for RecordingHookExecutor {
    async fn execute(&self, invocation: HookInvocation) -> AppResult<()> {
        self.invocations.lock().await.push(invocation);
        Ok(())
    }
}

/// Wrapper for boxed `HookExecutor` trait object.
pub type HookExecutorService = Arc<dyn HookExecutor>;
