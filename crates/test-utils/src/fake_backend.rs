use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use roomboot::types::StopSignal;
use roomboot::unit::{LaunchRequest, LaunchedProcess, ProcessBackend};
use tokio::sync::mpsc;

/// What a fake "process" does once launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    /// Exits with `128 + n` on the first signal it receives.
    Obedient,
    /// Ignores graceful signals; only `Kill` ends it.
    IgnoresGraceful,
    /// Never exits, whatever it is sent.
    Unkillable,
    /// Exits by itself with `code` after `after`, or earlier on a signal.
    ExitsAfter { after: Duration, code: i32 },
    /// `launch` fails with `NotFound`.
    FailsToLaunch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeEvent {
    Launched(String),
    Signalled(String, StopSignal),
    Exited(String, i32),
}

/// A fake backend that:
/// - records every launch, signal and exit in a shared log
/// - lets each unit be scripted through a [`Behaviour`]
/// - lets tests end a running unit with [`FakeLog::exit_unit`].
pub struct FakeBackend {
    behaviours: HashMap<String, Behaviour>,
    log: FakeLog,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            behaviours: HashMap::new(),
            log: FakeLog::default(),
        }
    }

    pub fn with_behaviour(mut self, unit: &str, behaviour: Behaviour) -> Self {
        self.behaviours.insert(unit.to_string(), behaviour);
        self
    }

    /// Handle onto the shared log; stays valid after the backend is moved.
    pub fn log(&self) -> FakeLog {
        self.log.clone()
    }
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessBackend for FakeBackend {
    fn launch(&self, request: LaunchRequest) -> io::Result<LaunchedProcess> {
        let behaviour = self
            .behaviours
            .get(&request.unit)
            .copied()
            .unwrap_or(Behaviour::Obedient);

        if behaviour == Behaviour::FailsToLaunch {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("fake: no such program {}", request.program.display()),
            ));
        }

        let unit = request.unit.clone();
        let (control, mut control_rx) = mpsc::unbounded_channel::<StopSignal>();
        let (exit_tx, mut exit_rx) = mpsc::unbounded_channel::<i32>();

        {
            let mut state = self.log.inner.lock().unwrap();
            state.events.push(FakeEvent::Launched(unit.clone()));
            state.requests.push(request);
            state.exits.insert(unit.clone(), exit_tx);
        }

        let log = self.log.clone();
        let exit = Box::pin(async move {
            let natural_exit = async {
                match behaviour {
                    Behaviour::ExitsAfter { after, code } => {
                        tokio::time::sleep(after).await;
                        code
                    }
                    _ => std::future::pending().await,
                }
            };
            tokio::pin!(natural_exit);

            let code = loop {
                tokio::select! {
                    code = &mut natural_exit => break code,
                    Some(code) = exit_rx.recv() => break code,
                    Some(signal) = control_rx.recv() => {
                        log.push(FakeEvent::Signalled(unit.clone(), signal));
                        let dies = match behaviour {
                            Behaviour::IgnoresGraceful => signal == StopSignal::Kill,
                            Behaviour::Unkillable => false,
                            _ => true,
                        };
                        if dies {
                            break 128 + signal.number();
                        }
                    }
                }
            };

            log.push(FakeEvent::Exited(unit, code));
            code
        });

        Ok(LaunchedProcess {
            pid: None,
            control,
            exit,
        })
    }
}

#[derive(Default)]
struct LogState {
    events: Vec<FakeEvent>,
    requests: Vec<LaunchRequest>,
    exits: HashMap<String, mpsc::UnboundedSender<i32>>,
}

/// Shared record of what the fake backend was asked to do.
#[derive(Clone, Default)]
pub struct FakeLog {
    inner: Arc<Mutex<LogState>>,
}

impl FakeLog {
    fn push(&self, event: FakeEvent) {
        self.inner.lock().unwrap().events.push(event);
    }

    pub fn events(&self) -> Vec<FakeEvent> {
        self.inner.lock().unwrap().events.clone()
    }

    pub fn requests(&self) -> Vec<LaunchRequest> {
        self.inner.lock().unwrap().requests.clone()
    }

    /// Units in launch order.
    pub fn launched(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                FakeEvent::Launched(unit) => Some(unit),
                _ => None,
            })
            .collect()
    }

    /// Units in the order they received their first signal.
    pub fn first_signal_order(&self) -> Vec<String> {
        let mut order: Vec<String> = Vec::new();
        for event in self.events() {
            if let FakeEvent::Signalled(unit, _) = event {
                if !order.contains(&unit) {
                    order.push(unit);
                }
            }
        }
        order
    }

    pub fn signals_for(&self, unit: &str) -> Vec<StopSignal> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                FakeEvent::Signalled(u, signal) if u == unit => Some(signal),
                _ => None,
            })
            .collect()
    }

    pub fn is_launched(&self, unit: &str) -> bool {
        self.launched().iter().any(|u| u == unit)
    }

    /// Make a launched unit exit on its own with `code`.
    pub fn exit_unit(&self, unit: &str, code: i32) {
        let state = self.inner.lock().unwrap();
        let tx = state
            .exits
            .get(unit)
            .unwrap_or_else(|| panic!("unit '{unit}' was never launched"));
        let _ = tx.send(code);
    }

    /// Poll until `unit` has been launched.
    pub async fn wait_for_launch(&self, unit: &str) {
        while !self.is_launched(unit) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
