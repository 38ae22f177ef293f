//! The seam between the supervisor and the operating system.

use std::{io, process::Stdio};

use async_trait::async_trait;
use tokio::{io::AsyncRead, process::Command};

use crate::encoder::EncoderCommand;

/// Diagnostic output of a child, read line by line by the supervisor.
pub type Diagnostics = Box<dyn AsyncRead + Send + Unpin>;

/// How a child ended. `code` is `None` when it was killed by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    pub code: Option<i32>,
}

impl std::fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "{code}"),
            None => write!(f, "signal"),
        }
    }
}

/// One running child process, exclusively owned by the supervisor.
#[async_trait]
pub trait ChildProcess: Send + 'static {
    fn id(&self) -> Option<u32>;

    /// Hands out the diagnostic stream. Returns `None` on later calls.
    fn take_diagnostics(&mut self) -> Option<Diagnostics>;

    async fn wait(&mut self) -> io::Result<ExitOutcome>;

    /// Asks the child to go away. `wait` still has to be called afterwards.
    async fn terminate(&mut self) -> io::Result<()>;

    /// Forces the child down when it ignored `terminate`.
    async fn kill(&mut self) -> io::Result<()> {
        self.terminate().await
    }
}

/// Starts encoder processes.
#[async_trait]
pub trait Launcher: Send + Sync + 'static {
    async fn launch(&self, command: &EncoderCommand) -> io::Result<Box<dyn ChildProcess>>;
}

/// Spawns real processes through `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioLauncher;

#[async_trait]
impl Launcher for TokioLauncher {
    async fn launch(&self, command: &EncoderCommand) -> io::Result<Box<dyn ChildProcess>> {
        let child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        Ok(Box::new(TokioChild { child }))
    }
}

struct TokioChild {
    child: tokio::process::Child,
}

#[async_trait]
impl ChildProcess for TokioChild {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn take_diagnostics(&mut self) -> Option<Diagnostics> {
        self.child
            .stderr
            .take()
            .map(|stderr| Box::new(stderr) as Diagnostics)
    }

    async fn wait(&mut self) -> io::Result<ExitOutcome> {
        let status = self.child.wait().await?;
        Ok(ExitOutcome {
            code: status.code(),
        })
    }

    /// Sends SIGTERM so the encoder can close the FLV stream cleanly.
    #[cfg(unix)]
    async fn terminate(&mut self) -> io::Result<()> {
        use nix::{
            errno::Errno,
            sys::signal::{kill, Signal},
            unistd::Pid,
        };

        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(io::Error::from(errno)),
        }
    }

    #[cfg(not(unix))]
    async fn terminate(&mut self) -> io::Result<()> {
        self.kill().await
    }

    async fn kill(&mut self) -> io::Result<()> {
        match self.child.start_kill() {
            Ok(()) => Ok(()),
            // Already reaped.
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e),
        }
    }
}
