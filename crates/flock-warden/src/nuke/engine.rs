//! Central trigger registry and wipe executor
//!
//! Every trigger path funnels into one execution slot: a `tokio::sync::Mutex`
//! holding the completed result. The slot is both the exclusivity lock (at
//! most one physical wipe in flight) and the idempotence record (redundant
//! callers get the recorded result instead of a second wipe).

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::config::NukeConfig;

use super::wipe::{SecureWipeOptions, WipeExecutor, WipeTarget};
use super::{NukeResult, TriggerSource};

/// Observer invoked once, after the physical wipe completes
type CompletionHook = Box<dyn Fn(&NukeResult) + Send + Sync>;

pub struct TamperResponseEngine {
    config: RwLock<NukeConfig>,
    executor: Arc<dyn WipeExecutor>,
    execution: Mutex<Option<NukeResult>>,
    completion_hook: RwLock<Option<CompletionHook>>,
}

impl TamperResponseEngine {
    pub fn new(config: NukeConfig, executor: Arc<dyn WipeExecutor>) -> Self {
        Self {
            config: RwLock::new(config),
            executor,
            execution: Mutex::new(None),
            completion_hook: RwLock::new(None),
        }
    }

    /// Register the post-wipe observer. The security context uses this to
    /// scrub in-memory authentication state once the settings category has
    /// been destroyed, regardless of which source fired.
    pub fn set_completion_hook(&self, hook: CompletionHook) {
        *self.completion_hook.write().unwrap() = Some(hook);
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> NukeConfig {
        self.config.read().unwrap().clone()
    }

    /// Replace the configuration (hot reload from the settings store)
    pub fn update_config(&self, config: NukeConfig) {
        *self.config.write().unwrap() = config;
    }

    /// Master switch state
    pub fn is_nuke_enabled(&self) -> bool {
        self.config.read().unwrap().enabled
    }

    /// Master switch AND at least one trigger source enabled
    pub fn is_nuke_armed(&self) -> bool {
        self.config.read().unwrap().is_armed()
    }

    /// Result of the completed wipe, if one has finished. Returns `None`
    /// while a wipe is in flight (the slot is held by the execution).
    pub fn last_result(&self) -> Option<NukeResult> {
        self.execution.try_lock().ok().and_then(|slot| slot.clone())
    }

    /// Route a trigger-source firing through configuration gating.
    ///
    /// Returns `None` when the master switch or this source is disabled;
    /// a dropped trigger is not an error. USB honors its configured grace
    /// delay before execution starts.
    pub async fn trigger(&self, source: TriggerSource) -> Option<NukeResult> {
        let config = self.config();
        if !config.enabled {
            tracing::debug!(%source, "tamper response disabled; ignoring trigger");
            return None;
        }
        if !config.is_source_enabled(source) {
            tracing::debug!(%source, "trigger source disabled; ignoring");
            return None;
        }

        if source == TriggerSource::UsbConnection && config.usb.delay_seconds > 0 {
            tracing::info!(
                delay_seconds = config.usb.delay_seconds,
                "USB trigger grace delay"
            );
            tokio::time::sleep(Duration::from_secs(u64::from(config.usb.delay_seconds))).await;
        }

        Some(self.execute_nuke(source).await)
    }

    /// Fire-and-forget trigger for call sites whose latency must not reveal
    /// that anything happened (duress unlock).
    pub fn trigger_detached(self: &Arc<Self>, source: TriggerSource) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.trigger(source).await;
        });
    }

    /// Execute the destructive wipe.
    ///
    /// Exactly one physical wipe runs no matter how many sources fire;
    /// concurrent callers await the in-flight execution and every later
    /// caller receives the recorded result. The wipe runs on a detached
    /// blocking task: dropping a caller's future cannot cancel it.
    pub async fn execute_nuke(&self, source: TriggerSource) -> NukeResult {
        let mut slot = self.execution.lock().await;
        if let Some(result) = slot.as_ref() {
            tracing::debug!(%source, "wipe already completed; returning recorded result");
            return result.clone();
        }

        let config = self.config();
        let executor = Arc::clone(&self.executor);
        tracing::warn!(%source, "executing destructive wipe");

        let worker = tokio::spawn(async move {
            tokio::task::spawn_blocking(move || run_wipe(executor.as_ref(), &config, source))
                .await
                .unwrap_or_else(|e| worker_failure(source, &e.to_string()))
        });

        let result = worker
            .await
            .unwrap_or_else(|e| worker_failure(source, &e.to_string()));

        *slot = Some(result.clone());
        tracing::warn!(success = result.success, %source, "wipe finished");
        if let Some(hook) = self.completion_hook.read().unwrap().as_ref() {
            hook(&result);
        }
        result
    }

    /// Clear the recorded execution so a future trigger can run again
    /// (re-arming after the device is re-provisioned).
    pub async fn reset(&self) {
        *self.execution.lock().await = None;
    }
}

/// One pass over the enabled targets. Each target's failure is recorded
/// and never aborts the remaining targets.
fn run_wipe(executor: &dyn WipeExecutor, config: &NukeConfig, source: TriggerSource) -> NukeResult {
    let opts = SecureWipeOptions {
        enabled: config.secure_wipe,
        passes: config.secure_wipe_passes.max(1),
    };

    let mut errors: Vec<String> = Vec::new();
    let database_wiped = wipe_one(
        executor,
        WipeTarget::Database,
        config.wipe_database,
        opts,
        &mut errors,
    );
    let settings_wiped = wipe_one(
        executor,
        WipeTarget::Settings,
        config.wipe_settings,
        opts,
        &mut errors,
    );
    let cache_wiped = wipe_one(
        executor,
        WipeTarget::Cache,
        config.wipe_cache,
        opts,
        &mut errors,
    );

    NukeResult {
        success: errors.is_empty(),
        database_wiped,
        settings_wiped,
        cache_wiped,
        error_message: (!errors.is_empty()).then(|| errors.join("; ")),
        trigger_source: source,
        timestamp: Utc::now(),
    }
}

fn wipe_one(
    executor: &dyn WipeExecutor,
    target: WipeTarget,
    enabled: bool,
    opts: SecureWipeOptions,
    errors: &mut Vec<String>,
) -> bool {
    if !enabled {
        return false;
    }
    match executor.wipe(target, opts) {
        Ok(()) => {
            tracing::info!(%target, "wipe target cleared");
            true
        }
        Err(e) => {
            tracing::error!(%target, error = %e, "wipe target failed");
            errors.push(format!("{}: {}", target, e));
            false
        }
    }
}

fn worker_failure(source: TriggerSource, detail: &str) -> NukeResult {
    NukeResult {
        success: false,
        database_wiped: false,
        settings_wiped: false,
        cache_wiped: false,
        error_message: Some(format!("wipe worker failed: {}", detail)),
        trigger_source: source,
        timestamp: Utc::now(),
    }
}
