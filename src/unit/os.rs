// src/unit/os.rs

//! Production backend: real child processes via `tokio::process`.
//!
//! Each launched child is owned by its exit future, which also listens on the
//! control channel. Signals are therefore only ever delivered to a child that
//! has not been reaped yet.

use std::io;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::types::{OutputMode, StopSignal};

use super::backend::{LaunchRequest, LaunchedProcess, ProcessBackend};

#[derive(Debug, Clone, Copy, Default)]
pub struct OsBackend {
    output: OutputMode,
}

impl OsBackend {
    pub fn new(output: OutputMode) -> Self {
        Self { output }
    }
}

impl ProcessBackend for OsBackend {
    fn launch(&self, request: LaunchRequest) -> io::Result<LaunchedProcess> {
        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args)
            .current_dir(&request.working_directory)
            .env_clear()
            .envs(&request.env)
            .kill_on_drop(true);

        match self.output {
            // stdin stays detached: a child in its own process group that
            // read the terminal would be stopped by SIGTTIN.
            OutputMode::Inherit => {
                cmd.stdin(Stdio::null())
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit());
            }
            OutputMode::Log => {
                cmd.stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped());
            }
        }

        // Own process group: a terminal Ctrl-C reaches the supervisor only,
        // which then stops the children in reverse order.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn()?;
        let pid = child.id();

        if let Some(stdout) = child.stdout.take() {
            forward_lines(request.unit.clone(), Stream::Stdout, stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(request.unit.clone(), Stream::Stderr, stderr);
        }

        let (control, control_rx) = mpsc::unbounded_channel();
        let exit = Box::pin(supervise_child(request.unit, child, control_rx));

        Ok(LaunchedProcess { pid, control, exit })
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Re-emit child output line by line as log events.
fn forward_lines<R>(unit: String, stream: Stream, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            match stream {
                Stream::Stdout => info!(unit = %unit, "stdout: {}", line),
                Stream::Stderr => warn!(unit = %unit, "stderr: {}", line),
            }
        }

        debug!(unit = %unit, ?stream, "output stream closed");
    });
}

/// Wait for the child to exit while relaying control requests to it.
async fn supervise_child(
    unit: String,
    mut child: Child,
    mut control: mpsc::UnboundedReceiver<StopSignal>,
) -> i32 {
    loop {
        tokio::select! {
            status = child.wait() => {
                return match status {
                    Ok(status) => exit_code(status),
                    Err(e) => {
                        error!(unit = %unit, error = %e, "failed to wait for child process");
                        -1
                    }
                };
            }

            // Disabled once every sender is gone; the child is still awaited.
            Some(signal) = control.recv() => deliver_signal(&unit, &mut child, signal),
        }
    }
}

fn deliver_signal(unit: &str, child: &mut Child, signal: StopSignal) {
    let result = match signal {
        StopSignal::Kill => child.start_kill(),
        graceful => send_graceful(child, graceful),
    };

    match result {
        Ok(()) => debug!(unit = %unit, %signal, pid = ?child.id(), "signal delivered"),
        Err(e) => warn!(unit = %unit, %signal, error = %e, "failed to deliver signal"),
    }
}

#[cfg(unix)]
fn send_graceful(child: &Child, signal: StopSignal) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // No pid means the child has already been reaped.
    let Some(pid) = child.id() else {
        return Ok(());
    };

    let sig = match signal {
        StopSignal::Interrupt => Signal::SIGINT,
        _ => Signal::SIGTERM,
    };

    match kill(Pid::from_raw(pid as i32), sig) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(io::Error::from(e)),
    }
}

#[cfg(not(unix))]
fn send_graceful(child: &mut Child, _signal: StopSignal) -> io::Result<()> {
    child.start_kill()
}

/// Exit code of a finished child; `128 + n` when it died from signal `n`.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}
