// src/supervisor/signals.rs

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::types::ControlSignal;

use super::SupervisorEvent;

/// Forward every SIGINT/SIGTERM to the supervisor as an event.
///
/// Handlers are registered before this returns, so a signal arriving right
/// after startup begins is not lost. Repeated signals are all forwarded; the
/// supervisor core collapses them into one shutdown.
pub fn spawn_signal_listener(
    tx: mpsc::UnboundedSender<SupervisorEvent>,
) -> std::io::Result<JoinHandle<()>> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;

        Ok(tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    Some(()) = interrupt.recv() => ControlSignal::Interrupt,
                    Some(()) = terminate.recv() => ControlSignal::Terminate,
                    else => break,
                };

                info!(signal = %received, "received signal");
                if tx.send(SupervisorEvent::Signal(received)).is_err() {
                    break;
                }
            }
            debug!("signal listener finished");
        }))
    }

    #[cfg(not(unix))]
    {
        Ok(tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                info!(signal = %ControlSignal::Interrupt, "received signal");
                if tx.send(SupervisorEvent::Signal(ControlSignal::Interrupt)).is_err() {
                    break;
                }
            }
            debug!("signal listener finished");
        }))
    }
}
