// src/unit/process_unit.rs

//! Runtime wrapper around one [`ProcessSpec`].
//!
//! The unit's [`UnitState`] lives in a `watch` channel. The control side
//! (`start`/`stop`/`kill`) and the exit observer spawned by `start` both write
//! it through `send_if_modified`/`send_replace`, so every transition is a
//! single synchronized update. The exit observer is the only writer of
//! `Exited`, and writes it exactly once.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::errors::{LaunchError, WaitTimeout};
use crate::types::StopSignal;

use super::backend::{ExitFuture, LaunchRequest, ProcessBackend};
use super::spec::{merge_environment, ProcessSpec};
use super::state::UnitState;

/// Notification sent by the exit observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitExit {
    /// Position of the unit in startup order.
    pub index: usize,
    pub unit: String,
    pub code: i32,
    /// True if the unit had been asked to stop before it exited.
    pub requested: bool,
}

/// Invoked from the exit observer's task once the unit is `Exited`.
pub type ExitCallback = Arc<dyn Fn(UnitExit) + Send + Sync>;

pub struct ProcessUnit {
    index: usize,
    spec: ProcessSpec,
    state: Arc<watch::Sender<UnitState>>,
    control: Option<mpsc::UnboundedSender<StopSignal>>,
    pid: Option<u32>,
    on_exit: ExitCallback,
}

impl std::fmt::Debug for ProcessUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessUnit")
            .field("index", &self.index)
            .field("name", &self.spec.name)
            .field("state", &*self.state.borrow())
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

impl ProcessUnit {
    pub fn new(index: usize, spec: ProcessSpec, on_exit: ExitCallback) -> Self {
        let (state, _) = watch::channel(UnitState::Idle);
        Self {
            index,
            spec,
            state: Arc::new(state),
            control: None,
            pid: None,
            on_exit,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn state(&self) -> UnitState {
        self.state.borrow().clone()
    }

    /// OS process id, only while the unit has a live process.
    pub fn pid(&self) -> Option<u32> {
        if self.state.borrow().is_live() {
            self.pid
        } else {
            None
        }
    }

    /// Spawn the unit's program with `base_env` overlaid by the spec's env.
    ///
    /// Only valid from `Idle`. On success the unit is `Running` and an exit
    /// observer is watching the process. On failure the unit is `Failed`.
    pub fn start(
        &mut self,
        backend: &dyn ProcessBackend,
        base_env: &BTreeMap<String, String>,
    ) -> Result<(), LaunchError> {
        let program = self.spec.resolve_program();

        let entered = self.state.send_if_modified(|state| {
            if *state == UnitState::Idle {
                *state = UnitState::Starting;
                true
            } else {
                false
            }
        });
        if !entered {
            return Err(LaunchError {
                unit: self.spec.name.clone(),
                program,
                source: std::io::Error::other(format!(
                    "unit is {} and cannot be started again",
                    self.state()
                )),
            });
        }

        let request = LaunchRequest {
            unit: self.spec.name.clone(),
            program: program.clone(),
            args: self.spec.args.clone(),
            working_directory: self.spec.resolved_working_directory(),
            env: merge_environment(base_env, &self.spec.env),
        };

        info!(
            unit = %self.spec.name,
            program = %program.display(),
            args = ?self.spec.args,
            cwd = %request.working_directory.display(),
            "starting unit"
        );

        match backend.launch(request) {
            Ok(launched) => {
                self.pid = launched.pid;
                self.control = Some(launched.control);
                self.state.send_replace(UnitState::Running);
                info!(unit = %self.spec.name, pid = ?self.pid, "unit running");
                self.observe_exit(launched.exit);
                Ok(())
            }
            Err(source) => {
                self.state.send_replace(UnitState::Failed(source.to_string()));
                error!(
                    unit = %self.spec.name,
                    program = %program.display(),
                    error = %source,
                    "unit failed to launch"
                );
                Err(LaunchError {
                    unit: self.spec.name.clone(),
                    program,
                    source,
                })
            }
        }
    }

    fn observe_exit(&self, exit: ExitFuture) {
        let state = Arc::clone(&self.state);
        let on_exit = Arc::clone(&self.on_exit);
        let index = self.index;
        let unit = self.spec.name.clone();

        tokio::spawn(async move {
            let code = exit.await;
            let previous = state.send_replace(UnitState::Exited(code));
            let requested = previous == UnitState::Stopping;

            info!(unit = %unit, code, requested, "unit exited");

            on_exit(UnitExit {
                index,
                unit,
                code,
                requested,
            });
        });
    }

    /// Ask the unit to terminate with its configured stop signal.
    ///
    /// Returns `true` if this call moved the unit to `Stopping`. Any other
    /// state makes this a no-op. Does not wait for the process to exit.
    pub fn stop(&self) -> bool {
        let stopping = self.state.send_if_modified(|state| {
            if state.accepts_stop() {
                *state = UnitState::Stopping;
                true
            } else {
                false
            }
        });

        if stopping {
            info!(
                unit = %self.spec.name,
                signal = %self.spec.stop_signal,
                "stopping unit"
            );
            self.deliver(self.spec.stop_signal);
        }

        stopping
    }

    /// Forcefully kill a unit whose process is still alive.
    ///
    /// Returns `true` if a kill was issued.
    pub fn kill(&self) -> bool {
        if !self.state.borrow().is_live() {
            return false;
        }

        info!(unit = %self.spec.name, "killing unit");
        self.deliver(StopSignal::Kill);
        true
    }

    fn deliver(&self, signal: StopSignal) {
        let Some(control) = &self.control else {
            return;
        };

        if control.send(signal).is_err() {
            debug!(
                unit = %self.spec.name,
                %signal,
                "process already gone; signal dropped"
            );
        }
    }

    /// Wait up to `timeout` for the unit to reach a terminal state.
    ///
    /// A timeout leaves the state untouched.
    pub async fn wait(&self, timeout: Duration) -> Result<UnitState, WaitTimeout> {
        self.wait_until(deadline_after(timeout)).await
    }

    /// Like [`wait`](Self::wait), but against an absolute deadline so several
    /// units can share one grace period.
    pub async fn wait_until(&self, deadline: Instant) -> Result<UnitState, WaitTimeout> {
        let started = Instant::now();
        let mut rx = self.state.subscribe();

        match tokio::time::timeout_at(deadline, rx.wait_for(UnitState::is_terminal)).await {
            Ok(Ok(state)) => Ok(state.clone()),
            // The sender lives as long as `self`; treat a closed channel as
            // "whatever the state is now".
            Ok(Err(_)) => Ok(self.state()),
            Err(_) => Err(WaitTimeout {
                unit: self.spec.name.clone(),
                waited: deadline.saturating_duration_since(started),
            }),
        }
    }
}

/// `now + period`, saturating at a far-future instant instead of overflowing.
pub(crate) fn deadline_after(period: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(period).unwrap_or_else(|| now + FAR_FUTURE)
}

// Roughly 30 years, the same horizon Tokio uses for an unbounded sleep.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Mutex;

    use tokio::sync::oneshot;

    use super::*;
    use crate::unit::backend::LaunchedProcess;

    /// Backend whose single process exits when the test says so, or when it
    /// receives any signal other than `ignore`.
    struct ScriptedBackend {
        exit_rx: Mutex<Option<oneshot::Receiver<i32>>>,
        ignore: Option<StopSignal>,
        signals: Arc<Mutex<Vec<StopSignal>>>,
    }

    impl ScriptedBackend {
        fn new(exit_rx: oneshot::Receiver<i32>, ignore: Option<StopSignal>) -> Self {
            Self {
                exit_rx: Mutex::new(Some(exit_rx)),
                ignore,
                signals: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl ProcessBackend for ScriptedBackend {
        fn launch(&self, _request: LaunchRequest) -> io::Result<LaunchedProcess> {
            let mut exit_rx = self
                .exit_rx
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| io::Error::other("already launched"))?;
            let (control, mut control_rx) = mpsc::unbounded_channel::<StopSignal>();
            let ignore = self.ignore;
            let signals = Arc::clone(&self.signals);

            let exit = Box::pin(async move {
                loop {
                    tokio::select! {
                        code = &mut exit_rx => return code.unwrap_or(-1),
                        Some(signal) = control_rx.recv() => {
                            signals.lock().unwrap().push(signal);
                            if Some(signal) != ignore {
                                return 128 + signal.number();
                            }
                        }
                    }
                }
            });

            Ok(LaunchedProcess {
                pid: Some(4242),
                control,
                exit,
            })
        }
    }

    struct MissingBackend;

    impl ProcessBackend for MissingBackend {
        fn launch(&self, _request: LaunchRequest) -> io::Result<LaunchedProcess> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no such file"))
        }
    }

    fn recording_callback() -> (ExitCallback, Arc<Mutex<Vec<UnitExit>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ExitCallback = Arc::new(move |exit| sink.lock().unwrap().push(exit));
        (callback, seen)
    }

    #[tokio::test]
    async fn unplanned_exit_is_reported_once() {
        let (exit_tx, exit_rx) = oneshot::channel();
        let backend = ScriptedBackend::new(exit_rx, None);
        let (callback, seen) = recording_callback();

        let mut unit = ProcessUnit::new(3, ProcessSpec::new("relay", "kbm"), callback);
        unit.start(&backend, &BTreeMap::new()).expect("start");
        assert_eq!(unit.state(), UnitState::Running);
        assert_eq!(unit.pid(), Some(4242));

        exit_tx.send(1).expect("exit");
        let state = unit.wait(Duration::from_secs(1)).await.expect("terminal");
        assert_eq!(state, UnitState::Exited(1));
        assert_eq!(unit.pid(), None);

        tokio::task::yield_now().await;
        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![UnitExit {
                index: 3,
                unit: "relay".to_string(),
                code: 1,
                requested: false,
            }]
        );
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_marks_exit_as_requested() {
        let (_exit_tx, exit_rx) = oneshot::channel();
        let backend = ScriptedBackend::new(exit_rx, None);
        let signals = Arc::clone(&backend.signals);
        let (callback, seen) = recording_callback();

        let mut unit = ProcessUnit::new(0, ProcessSpec::new("display", "X"), callback);
        unit.start(&backend, &BTreeMap::new()).expect("start");

        assert!(unit.stop());
        assert!(!unit.stop(), "second stop must be a no-op");

        let state = unit.wait(Duration::from_secs(1)).await.expect("terminal");
        assert_eq!(state, UnitState::Exited(128 + 15));
        assert!(!unit.stop());
        assert!(!unit.kill());

        tokio::task::yield_now().await;
        assert_eq!(*signals.lock().unwrap(), vec![StopSignal::Terminate]);
        assert!(seen.lock().unwrap()[0].requested);
    }

    #[tokio::test]
    async fn wait_times_out_without_changing_state_and_kill_escalates() {
        let (_exit_tx, exit_rx) = oneshot::channel();
        let backend = ScriptedBackend::new(exit_rx, Some(StopSignal::Terminate));
        let signals = Arc::clone(&backend.signals);
        let (callback, _seen) = recording_callback();

        let mut unit = ProcessUnit::new(0, ProcessSpec::new("stubborn", "x"), callback);
        unit.start(&backend, &BTreeMap::new()).expect("start");
        assert!(unit.stop());

        let timeout = unit
            .wait(Duration::from_millis(50))
            .await
            .expect_err("terminate is ignored");
        assert_eq!(timeout.unit, "stubborn");
        assert_eq!(unit.state(), UnitState::Stopping);

        assert!(unit.kill());
        let state = unit.wait(Duration::from_secs(1)).await.expect("terminal");
        assert_eq!(state, UnitState::Exited(128 + 9));
        assert_eq!(
            *signals.lock().unwrap(),
            vec![StopSignal::Terminate, StopSignal::Kill]
        );
    }

    #[tokio::test]
    async fn launch_failure_marks_unit_failed() {
        let (callback, seen) = recording_callback();
        let mut unit = ProcessUnit::new(1, ProcessSpec::new("browser", "chromium"), callback);

        let err = unit
            .start(&MissingBackend, &BTreeMap::new())
            .expect_err("launch must fail");
        assert_eq!(err.unit, "browser");
        assert_eq!(err.source.kind(), io::ErrorKind::NotFound);
        assert!(matches!(unit.state(), UnitState::Failed(_)));
        assert!(!unit.stop());

        let state = unit.wait(Duration::from_millis(10)).await.expect("terminal");
        assert!(state.is_terminal());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_requires_idle() {
        let (_exit_tx, exit_rx) = oneshot::channel();
        let backend = ScriptedBackend::new(exit_rx, None);
        let (callback, _seen) = recording_callback();

        let mut unit = ProcessUnit::new(0, ProcessSpec::new("app", "rotcore"), callback);
        unit.start(&backend, &BTreeMap::new()).expect("start");
        assert!(unit.start(&backend, &BTreeMap::new()).is_err());
        assert_eq!(unit.state(), UnitState::Running);
    }

    #[test]
    fn huge_periods_saturate_instead_of_overflowing() {
        let before = Instant::now();
        let deadline = deadline_after(Duration::MAX);
        assert!(deadline >= before + FAR_FUTURE);

        let near = deadline_after(Duration::from_millis(5));
        assert!(near >= before && near < deadline);
    }
}
