use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use slotcore::{
    EngineError, EventBus, ExecutionLogEntry, ExecutionStatus, Result, Section, SectionError,
    SectionEvent, SectionId, Topic, Widget, WidgetAction,
};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::pipeline::{ExecutionPipeline, ExecutionRequest};
use crate::registry::WidgetRegistry;
use crate::store::{SectionStore, TopicStore};

/// Explicit retry schedule for failed execution attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5000,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt after `attempt`: doubles per completed
    /// attempt and caps at `max_delay_ms`.
    pub fn compute_backoff(&self, attempt: u32) -> Duration {
        if self.base_delay_ms == 0 {
            return Duration::from_millis(0);
        }
        let shift = attempt.saturating_sub(1).min(20);
        let delay = (self.base_delay_ms as u128) << shift;
        Duration::from_millis(delay.min(self.max_delay_ms as u128) as u64)
    }
}

/// Task record handed to the worker pool over the queue.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionTask {
    pub section_id: SectionId,
    pub attempt: u32,
    pub max_attempts: u32,
}

/// Snapshot returned to the caller right after the queued write lands.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionHandle {
    pub section_id: SectionId,
    pub status: ExecutionStatus,
    pub queued_at: Option<DateTime<Utc>>,
    pub metadata: Map<String, Value>,
    pub extra_instructions: Option<String>,
}

/// Shared services the workers and the enqueue path both need.
#[derive(Clone)]
pub struct EngineContext {
    pub registry: Arc<WidgetRegistry>,
    pub sections: Arc<dyn SectionStore>,
    pub topics: Arc<dyn TopicStore>,
    pub pipeline: Arc<ExecutionPipeline>,
    pub events: EventBus,
}

/// Accepts execution requests and feeds a fixed-size tokio worker pool over
/// a bounded queue. Dropping the sender drains and stops the pool.
pub struct Dispatcher {
    queue: mpsc::Sender<ExecutionTask>,
    retry: RetryPolicy,
    default_language: String,
    ctx: EngineContext,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    pub fn start(
        workers: usize,
        queue_capacity: usize,
        retry: RetryPolicy,
        default_language: impl Into<String>,
        ctx: EngineContext,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<ExecutionTask>(queue_capacity);
        let rx = Arc::new(Mutex::new(rx));

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let rx = Arc::clone(&rx);
            let worker_ctx = ctx.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, rx, worker_ctx, retry).await;
            }));
        }

        tracing::info!("Started {} execution workers", workers);

        Self {
            queue: tx,
            retry,
            default_language: default_language.into(),
            ctx,
            workers: handles,
        }
    }

    /// Accepts one execution request: resolves the capability, creates or
    /// reuses the section, writes the queued state synchronously and hands
    /// the task to the pool. Nothing is created or mutated on a rejection.
    pub async fn enqueue(
        &self,
        topic: &Topic,
        widget_identifier: &str,
        action_identifier: &str,
        section_id: Option<SectionId>,
        metadata: Map<String, Value>,
        extra_instructions: Option<String>,
    ) -> Result<ExecutionHandle> {
        let widget = self.ctx.registry.resolve_widget(widget_identifier)?;
        let action = self
            .ctx
            .registry
            .resolve_action(widget.as_ref(), action_identifier)?;

        let mut section = match section_id {
            Some(id) => {
                let section = self.ctx.sections.get(id).await?;
                if section.topic_id != topic.id {
                    return Err(SectionError::NotFound(id).into());
                }
                if section.widget != widget.name() {
                    return Err(SectionError::WidgetMismatch {
                        id,
                        bound: section.widget.clone(),
                        requested: widget.name().to_string(),
                    }
                    .into());
                }
                section
            }
            None => {
                match self
                    .ctx
                    .sections
                    .find_by_topic_and_widget(topic.id, widget.name())
                    .await
                {
                    Some(section) => section,
                    None => {
                        self.ctx
                            .sections
                            .create(topic.id, widget.name(), &self.default_language)
                            .await
                    }
                }
            }
        };

        section.mark_queued(action.name(), extra_instructions, metadata);
        self.ctx.sections.update(section.clone()).await?;

        self.ctx.events.emit(SectionEvent::ExecutionQueued {
            section_id: section.id,
            widget: widget.name().to_string(),
            action: action.name().to_string(),
            timestamp: Utc::now(),
        });

        let task = ExecutionTask {
            section_id: section.id,
            attempt: 1,
            max_attempts: self.retry.max_attempts,
        };
        self.queue
            .send(task)
            .await
            .map_err(|e| EngineError::Internal(format!("Execution queue closed: {}", e)))?;

        tracing::info!(
            "Queued execution for section {} (widget '{}', action '{}')",
            section.id,
            widget.name(),
            action.name()
        );

        Ok(ExecutionHandle {
            section_id: section.id,
            status: section.status(),
            queued_at: section.execution_state.queued_at,
            metadata: section.execution_state.request_metadata.clone(),
            extra_instructions: section.execution_state.extra_instructions.clone(),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Stops accepting work, drains the queue and waits for the workers.
    pub async fn shutdown(self) {
        let Dispatcher { queue, workers, .. } = self;
        drop(queue);
        for handle in workers {
            let _ = handle.await;
        }
        tracing::info!("Execution workers stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<Mutex<mpsc::Receiver<ExecutionTask>>>,
    ctx: EngineContext,
    retry: RetryPolicy,
) {
    loop {
        let task = {
            let mut rx = queue.lock().await;
            rx.recv().await
        };
        match task {
            Some(task) => process_task(worker_id, task, &ctx, retry).await,
            None => {
                tracing::debug!("Worker {} stopping: queue closed", worker_id);
                break;
            }
        }
    }
}

struct ResolvedCapability {
    topic: Topic,
    widget: Arc<dyn Widget>,
    action: Arc<dyn WidgetAction>,
}

/// Re-resolves the capability stored on the section. A missing action
/// identifier or a binding that no longer resolves rejects the task before
/// the pipeline ever runs.
async fn resolve_capability(
    section_id: SectionId,
    ctx: &EngineContext,
) -> Result<ResolvedCapability> {
    let section = ctx.sections.get(section_id).await?;

    let action_name = section
        .execution_state
        .action
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or(SectionError::MissingActionIdentifier(section_id))?
        .to_string();

    let widget = ctx.registry.resolve_widget(&section.widget)?;
    let action = ctx.registry.resolve_action(widget.as_ref(), &action_name)?;
    let topic = ctx.topics.get(section.topic_id).await?;

    Ok(ResolvedCapability {
        topic,
        widget,
        action,
    })
}

fn model_hint(section: &Section) -> Option<String> {
    section
        .execution_state
        .request_metadata
        .get("model")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// Runs the attempt loop for one task. Each failed attempt appends its own
/// failure entry and performs a failed transition; the next attempt re-opens
/// the cycle until the budget runs out.
async fn process_task(
    worker_id: usize,
    task: ExecutionTask,
    ctx: &EngineContext,
    retry: RetryPolicy,
) {
    let resolved = match resolve_capability(task.section_id, ctx).await {
        Ok(resolved) => resolved,
        Err(err) => {
            fail_terminal(task.section_id, &err, ctx).await;
            return;
        }
    };

    let mut attempt = task.attempt;
    loop {
        let mut section = match ctx.sections.get(task.section_id).await {
            Ok(section) => section,
            Err(err) => {
                tracing::error!(
                    "Worker {} lost section {}: {}",
                    worker_id,
                    task.section_id,
                    err
                );
                return;
            }
        };

        section.mark_running();
        if let Err(err) = ctx.sections.update(section.clone()).await {
            tracing::error!(
                "Worker {} failed to persist running state for section {}: {}",
                worker_id,
                task.section_id,
                err
            );
            return;
        }
        ctx.events.emit(SectionEvent::ExecutionStarted {
            section_id: section.id,
            attempt,
            timestamp: Utc::now(),
        });

        let outcome = ctx
            .pipeline
            .execute(ExecutionRequest {
                topic: &resolved.topic,
                section: &section,
                widget: Arc::clone(&resolved.widget),
                action: Arc::clone(&resolved.action),
                metadata: &section.execution_state.request_metadata,
                extra_instructions: section.execution_state.extra_instructions.as_deref(),
                model_override: None,
                tools_override: None,
            })
            .await;

        match outcome {
            Ok(result) => {
                section.apply_success(result.content, result.metadata, result.log_entry);
                if let Err(err) = ctx.sections.update(section.clone()).await {
                    tracing::error!(
                        "Worker {} failed to persist result for section {}: {}",
                        worker_id,
                        section.id,
                        err
                    );
                    return;
                }
                tracing::info!(
                    "Section {} finished on attempt {} (action '{}')",
                    section.id,
                    attempt,
                    resolved.action.name()
                );
                ctx.events.emit(SectionEvent::ExecutionFinished {
                    section_id: section.id,
                    attempt,
                    timestamp: Utc::now(),
                });
                return;
            }
            Err(err) => {
                let will_retry = attempt < task.max_attempts;
                let entry = ExecutionLogEntry::failure(err.to_string(), model_hint(&section));
                section.apply_failure(err.to_string(), err.error_code(), entry);
                if let Err(persist_err) = ctx.sections.update(section.clone()).await {
                    tracing::error!(
                        "Worker {} failed to persist failure for section {}: {}",
                        worker_id,
                        section.id,
                        persist_err
                    );
                    return;
                }
                tracing::warn!(
                    "Section {} attempt {}/{} failed: {}",
                    section.id,
                    attempt,
                    task.max_attempts,
                    err
                );
                ctx.events.emit(SectionEvent::ExecutionFailed {
                    section_id: section.id,
                    attempt,
                    error_code: err.error_code().to_string(),
                    will_retry,
                    timestamp: Utc::now(),
                });

                if !will_retry {
                    return;
                }
                tokio::time::sleep(retry.compute_backoff(attempt)).await;
                attempt += 1;
            }
        }
    }
}

/// Terminal failure for tasks rejected before the pipeline could run.
async fn fail_terminal(section_id: SectionId, err: &EngineError, ctx: &EngineContext) {
    tracing::warn!("Execution for section {} rejected: {}", section_id, err);

    let mut section = match ctx.sections.get(section_id).await {
        Ok(section) => section,
        Err(load_err) => {
            tracing::error!(
                "Section {} unavailable while recording rejection: {}",
                section_id,
                load_err
            );
            return;
        }
    };

    let entry = ExecutionLogEntry::failure(err.to_string(), model_hint(&section));
    section.apply_failure(err.to_string(), err.error_code(), entry);
    if let Err(persist_err) = ctx.sections.update(section).await {
        tracing::error!(
            "Failed to persist rejection for section {}: {}",
            section_id,
            persist_err
        );
        return;
    }
    ctx.events.emit(SectionEvent::ExecutionFailed {
        section_id,
        attempt: 1,
        error_code: err.error_code().to_string(),
        will_retry: false,
        timestamp: Utc::now(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.compute_backoff(1), Duration::from_millis(200));
        assert_eq!(policy.compute_backoff(2), Duration::from_millis(400));
        assert_eq!(policy.compute_backoff(3), Duration::from_millis(800));
        assert_eq!(policy.compute_backoff(10), Duration::from_millis(5000));
    }

    #[test]
    fn test_backoff_zero_base_stays_zero() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 0,
            max_delay_ms: 5000,
        };
        assert_eq!(policy.compute_backoff(4), Duration::from_millis(0));
    }

    #[test]
    fn test_backoff_large_attempt_does_not_overflow() {
        let policy = RetryPolicy {
            max_attempts: 100,
            base_delay_ms: 200,
            max_delay_ms: 5000,
        };
        assert_eq!(policy.compute_backoff(90), Duration::from_millis(5000));
    }
}
