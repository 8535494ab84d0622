// src/supervisor/runtime.rs

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::unit::{ExitCallback, ProcessBackend, ProcessSpec, ProcessUnit};
use crate::unit::process_unit::deadline_after;

use super::core::SupervisorCore;
use super::signals::spawn_signal_listener;
use super::{
    ShutdownHandle, ShutdownReason, SupervisorEvent, SupervisorOptions, SupervisorReport,
    UnitReport,
};

/// Starts an ordered list of units and tears the group down on the first
/// shutdown trigger.
///
/// All phase decisions are delegated to [`SupervisorCore`]; this type owns
/// the units, the event channel and the timers.
pub struct Supervisor<B: ProcessBackend> {
    backend: B,
    options: SupervisorOptions,
    base_env: BTreeMap<String, String>,
    core: SupervisorCore,
    units: Vec<ProcessUnit>,
    events_tx: mpsc::UnboundedSender<SupervisorEvent>,
    events_rx: mpsc::UnboundedReceiver<SupervisorEvent>,
}

impl<B: ProcessBackend> fmt::Debug for Supervisor<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("core", &self.core)
            .field("options", &self.options)
            .field("units", &self.units)
            .finish_non_exhaustive()
    }
}

impl<B: ProcessBackend> Supervisor<B> {
    /// Create a supervisor whose units inherit this process's environment.
    pub fn new(backend: B, options: SupervisorOptions) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            options,
            base_env: std::env::vars().collect(),
            core: SupervisorCore::new(),
            units: Vec::new(),
            events_tx,
            events_rx,
        }
    }

    /// Replace the base environment that unit overlays are merged onto.
    pub fn with_base_environment(mut self, env: BTreeMap<String, String>) -> Self {
        self.base_env = env;
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle::new(self.events_tx.clone())
    }

    /// Install SIGINT/SIGTERM handlers that feed this supervisor.
    ///
    /// Call before [`run`](Self::run) so signals during startup are seen.
    pub fn listen_for_signals(&self) -> std::io::Result<JoinHandle<()>> {
        spawn_signal_listener(self.events_tx.clone())
    }

    /// Start every spec in order, supervise the group, and shut it down on
    /// the first trigger. Returns once every unit is terminal or abandoned.
    pub async fn run(mut self, specs: Vec<ProcessSpec>) -> SupervisorReport {
        self.core.begin_startup();
        info!(units = specs.len(), "starting unit group");

        let mut remaining = specs.into_iter();
        let reason = match self.start_units(&mut remaining).await {
            Some(reason) => reason,
            None => {
                self.core.startup_complete();
                info!(units = self.units.len(), "all units running");
                self.wait_for_trigger().await
            }
        };

        let not_started = remaining.map(|spec| spec.name).collect::<Vec<_>>();
        if !not_started.is_empty() {
            info!(units = ?not_started, "skipping units that were never started");
        }

        self.shutdown(reason, not_started).await
    }

    /// Staged startup. Returns the shutdown reason if a trigger fired before
    /// every unit was started; specs not yet pulled from `specs` stay there.
    async fn start_units(
        &mut self,
        specs: &mut impl Iterator<Item = ProcessSpec>,
    ) -> Option<ShutdownReason> {
        if let Some(reason) = self.drain_pending_events() {
            return Some(reason);
        }

        for spec in specs.by_ref() {
            let index = self.units.len();
            let delay = spec.start_delay;
            let mut unit = ProcessUnit::new(index, spec, self.exit_callback());
            let started = unit.start(&self.backend, &self.base_env);
            let name = unit.name().to_string();
            self.units.push(unit);

            if let Err(err) = started {
                let reason = ShutdownReason::LaunchFailed {
                    unit: err.unit,
                    error: err.source.to_string(),
                };
                return self.core.trigger(reason);
            }

            let triggered = if delay.is_zero() {
                self.drain_pending_events()
            } else {
                debug!(unit = %name, ?delay, "waiting before next stage");
                self.wait_for_delay(delay).await
            };
            if triggered.is_some() {
                return triggered;
            }
        }

        None
    }

    /// Sleep for a stage delay, returning early if a shutdown trigger fires.
    async fn wait_for_delay(&mut self, delay: Duration) -> Option<ShutdownReason> {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return None,
                Some(event) = self.events_rx.recv() => {
                    if let Some(reason) = self.core.handle_event(event) {
                        info!(%reason, "startup delay cancelled");
                        return Some(reason);
                    }
                }
            }
        }
    }

    fn drain_pending_events(&mut self) -> Option<ShutdownReason> {
        while let Ok(event) = self.events_rx.try_recv() {
            if let Some(reason) = self.core.handle_event(event) {
                return Some(reason);
            }
        }
        None
    }

    async fn wait_for_trigger(&mut self) -> ShutdownReason {
        loop {
            let Some(event) = self.events_rx.recv().await else {
                // Unreachable while `self` holds a sender.
                self.core.trigger(ShutdownReason::Requested);
                return ShutdownReason::Requested;
            };

            debug!(?event, "supervisor received event");
            if let Some(reason) = self.core.handle_event(event) {
                return reason;
            }
        }
    }

    fn exit_callback(&self) -> ExitCallback {
        let tx = self.events_tx.clone();
        Arc::new(move |exit| {
            let _ = tx.send(SupervisorEvent::UnitExited(exit));
        })
    }

    /// Stop every live unit in reverse start order, then wait for the whole
    /// group, escalating stragglers to a forceful kill.
    async fn shutdown(
        mut self,
        reason: ShutdownReason,
        not_started: Vec<String>,
    ) -> SupervisorReport {
        if reason.is_clean() {
            info!(%reason, "shutting down unit group");
        } else {
            error!(%reason, "shutting down unit group");
        }

        // Send every stop signal first; nobody waits on a slow peer here.
        let mut stop_order = Vec::new();
        for unit in self.units.iter().rev() {
            if unit.stop() {
                stop_order.push(unit.index());
            }
        }

        let grace_deadline = deadline_after(self.options.grace_period);
        let mut stragglers = Vec::new();
        for &index in &stop_order {
            if let Err(timeout) = self.units[index].wait_until(grace_deadline).await {
                warn!(%timeout, "grace period elapsed; escalating to kill");
                stragglers.push(index);
            }
        }

        let mut escalated = Vec::new();
        for &index in &stragglers {
            if self.units[index].kill() {
                escalated.push(index);
            }
        }

        let kill_deadline = deadline_after(self.options.kill_grace_period);
        let mut abandoned = Vec::new();
        for &index in &escalated {
            if let Err(timeout) = self.units[index].wait_until(kill_deadline).await {
                error!(
                    %timeout,
                    pid = ?self.units[index].pid(),
                    "unit did not die after kill; abandoning it"
                );
                abandoned.push(index);
            }
        }

        self.core.finish();

        let names = |indices: &[usize]| -> Vec<String> {
            indices
                .iter()
                .map(|&i| self.units[i].name().to_string())
                .collect()
        };

        let report = SupervisorReport {
            reason,
            units: self
                .units
                .iter()
                .map(|unit| UnitReport {
                    name: unit.name().to_string(),
                    state: unit.state(),
                })
                .collect(),
            not_started,
            stop_order: names(&stop_order),
            escalated: names(&escalated),
            abandoned: names(&abandoned),
        };

        for unit in &report.units {
            info!(unit = %unit.name, state = %unit.state, "final unit state");
        }
        info!(exit_code = report.exit_code(), "unit group stopped");

        report
    }
}
