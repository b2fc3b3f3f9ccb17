//! The export orchestrator (component C11): wires the controller, limiter,
//! checkpoint, and a fixed, ordered list of sections into one resumable run.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use streamvault_checkpoint::{Checkpoint, CheckpointConfig, CheckpointTracker};
use streamvault_concurrency::ClassLimiter;
use streamvault_controller::{AdaptiveController, ControllerEvent};
use streamvault_core::events::FnListener;
use streamvault_core::model::OperationClass;
use streamvault_eta::{EtaEstimate, EtaEstimator};

use crate::error::OrchestratorError;
use crate::section::Section;

/// The fixed section ordering spec §4.11 requires (`[pages, databases,
/// users, …]`), driven entirely by the order sections are handed to
/// [`Orchestrator::new`] — the orchestrator itself imposes no reordering.
pub struct OrchestratorConfig {
    pub export_id: String,
    pub output_dir: PathBuf,
    /// Bound on how long a section waits for in-flight workers to drain
    /// after cancellation before aborting them outright.
    pub shutdown_deadline: Duration,
}

impl OrchestratorConfig {
    pub fn new(export_id: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            export_id: export_id.into(),
            output_dir: output_dir.into(),
            shutdown_deadline: Duration::from_secs(5),
        }
    }
}

/// Per-section lifecycle state, tracked in memory for introspection
/// (`Orchestrator::section_states`); the durable record of progress is the
/// checkpoint file, not this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionState {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
}

/// What a completed [`Orchestrator::run`] call produced, mapping directly to
/// spec §6's exit codes (`0` success, `2` interrupted) — `1` (fatal) and
/// `3` (configuration error) are represented by `Err` and by the caller's
/// own argument validation respectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Interrupted,
}

/// Wires C3 (controller), C4 (limiter), C8 (checkpoint) and a fixed section
/// list together and drives one export run (spec §4.11).
pub struct Orchestrator {
    controller: Arc<AdaptiveController>,
    limiter: Arc<ClassLimiter>,
    checkpoint: Arc<CheckpointTracker>,
    sections: Vec<Arc<dyn Section>>,
    current_class: Arc<Mutex<OperationClass>>,
    states: Mutex<Vec<(String, SectionState)>>,
    cancellation: CancellationToken,
    shutdown_deadline: Duration,
    eta: Mutex<EtaEstimator>,
}

impl Orchestrator {
    /// `controller` and `limiter` are taken by value so the controller's
    /// recommendation events can be bridged into the limiter's per-class
    /// limits before either is shared behind an `Arc` (spec §4.3: "it may
    /// reduce C4 limits via a recommendation callback").
    pub fn new(
        config: OrchestratorConfig,
        mut controller: AdaptiveController,
        limiter: ClassLimiter,
        checkpoint_config: CheckpointConfig,
        sections: Vec<Arc<dyn Section>>,
    ) -> Self {
        let limiter = Arc::new(limiter);
        let current_class = Arc::new(Mutex::new(OperationClass::Default));
        let initial_concurrency = controller.recommended_concurrency().max(1);

        let bridge_limiter = Arc::clone(&limiter);
        let bridge_class = Arc::clone(&current_class);
        controller.add_listener(FnListener::new(move |event: &ControllerEvent| {
            let to = match event {
                ControllerEvent::ConcurrencyIncreased { to, .. }
                | ControllerEvent::ConcurrencyDecreased { to, .. }
                | ControllerEvent::EmergencyHalved { to, .. } => Some(*to),
                _ => None,
            };
            let Some(to) = to else { return };
            let class = *bridge_class.lock().expect("class mutex poisoned");
            let ratio = to as f64 / initial_concurrency as f64;
            let scaled = ((class.default_limit() as f64) * ratio).round().max(1.0) as usize;
            bridge_limiter.set_limit(class, scaled);
        }));

        let path = checkpoint_path(&config.output_dir, &config.export_id);
        let checkpoint = Arc::new(CheckpointTracker::new(
            path,
            config.export_id,
            config.output_dir.to_string_lossy().into_owned(),
            checkpoint_config,
        ));

        Self {
            controller: Arc::new(controller),
            limiter,
            checkpoint,
            sections,
            current_class,
            states: Mutex::new(Vec::new()),
            cancellation: CancellationToken::new(),
            shutdown_deadline: config.shutdown_deadline,
            eta: Mutex::new(EtaEstimator::new()),
        }
    }

    /// A token callers can clone into a signal handler; cancelling it has
    /// the same effect as calling [`Orchestrator::shutdown`].
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Requests graceful shutdown: the current section finishes draining
    /// in-flight items (bounded by `shutdown_deadline`), the checkpoint is
    /// saved, and [`run`](Self::run) returns `Ok(RunOutcome::Interrupted)`.
    pub fn shutdown(&self) {
        self.cancellation.cancel();
    }

    pub fn section_states(&self) -> Vec<(String, SectionState)> {
        self.states.lock().expect("state mutex poisoned").clone()
    }

    pub fn checkpoint(&self) -> &Arc<CheckpointTracker> {
        &self.checkpoint
    }

    /// Refreshes the ETA from the checkpoint's current progress counters.
    ///
    /// `now_ms` is a caller-supplied monotonic timestamp (e.g. milliseconds
    /// since the run started); the estimator is a pure function of the
    /// samples it's fed, so callers poll this at whatever cadence suits
    /// their progress display (spec §4.9 names no fixed interval).
    pub fn eta(&self, now_ms: u64) -> EtaEstimate {
        let snapshot = self.checkpoint.snapshot();
        self.eta
            .lock()
            .expect("eta mutex poisoned")
            .update(now_ms, snapshot.processed_count, snapshot.total_estimate)
    }

    /// Drives the run described in spec §4.11: initialize the checkpoint,
    /// run every not-yet-completed section in order, then finalize.
    pub async fn run(&self) -> Result<RunOutcome, OrchestratorError> {
        let resuming = self.checkpoint.initialize().await?;
        self.checkpoint.start_auto_save().await;

        let snapshot = self.checkpoint.snapshot();
        self.seed_states(&snapshot);

        let result = self.run_sections(resuming, &snapshot).await;

        // Stop the auto-save timer and persist one last time regardless of
        // how the run ended (spec §4.11 steps 3-4 both end in a save).
        self.checkpoint.cleanup().await?;

        match result {
            Ok(RunOutcome::Completed) => {
                self.checkpoint.remove().await?;
                Ok(RunOutcome::Completed)
            }
            other => other,
        }
    }

    fn seed_states(&self, snapshot: &Checkpoint) {
        let mut states = self.states.lock().expect("state mutex poisoned");
        states.clear();
        for section in &self.sections {
            let done = snapshot.completed_sections.iter().any(|s| s == section.name());
            states.push((
                section.name().to_string(),
                if done { SectionState::Completed } else { SectionState::Pending },
            ));
        }
    }

    fn set_state(&self, name: &str, new_state: SectionState) {
        let mut states = self.states.lock().expect("state mutex poisoned");
        if let Some(entry) = states.iter_mut().find(|(n, _)| n == name) {
            entry.1 = new_state;
        }
    }

    async fn run_sections(
        &self,
        resuming: bool,
        snapshot: &Checkpoint,
    ) -> Result<RunOutcome, OrchestratorError> {
        for section in &self.sections {
            if self.cancellation.is_cancelled() {
                return Ok(RunOutcome::Interrupted);
            }
            if snapshot.completed_sections.iter().any(|s| s == section.name()) {
                continue;
            }

            self.set_state(section.name(), SectionState::Running);
            *self.current_class.lock().expect("class mutex poisoned") = section.class();
            #[cfg(feature = "tracing")]
            tracing::info!(section = section.name(), "starting section");

            let resume_after_id = if resuming && snapshot.current_section == section.name() {
                snapshot.last_processed_id.clone()
            } else {
                None
            };

            let outcome = section
                .run(
                    Arc::clone(&self.controller),
                    Arc::clone(&self.limiter),
                    Arc::clone(&self.checkpoint),
                    resume_after_id,
                    self.shutdown_deadline,
                    self.cancellation.clone(),
                )
                .await;

            match outcome {
                Ok(()) if self.cancellation.is_cancelled() => {
                    self.set_state(section.name(), SectionState::Paused);
                    return Ok(RunOutcome::Interrupted);
                }
                Ok(()) => {
                    self.checkpoint.complete_section(section.name()).await?;
                    self.set_state(section.name(), SectionState::Completed);
                }
                Err(err) => {
                    self.set_state(section.name(), SectionState::Failed);
                    self.cancellation.cancel();
                    #[cfg(feature = "tracing")]
                    tracing::error!(section = section.name(), error = %err, "section failed fatally");
                    return Err(OrchestratorError::Fatal {
                        section: section.name().to_string(),
                        source: Box::new(err),
                    });
                }
            }
        }
        Ok(RunOutcome::Completed)
    }
}

fn checkpoint_path(output_dir: &Path, export_id: &str) -> PathBuf {
    output_dir.join(format!(".{export_id}.checkpoint.json"))
}
