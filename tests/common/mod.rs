use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use stream_supervisor::{
    ChildProcess, Diagnostics, EncoderCommand, EncoderSettings, ExitOutcome, Launcher,
    StreamSource, SupervisorBuilder, SupervisorHandle,
};
use tokio::{
    io::{AsyncWriteExt, DuplexStream},
    sync::mpsc,
};

/// Lets spawned tasks run without letting paused time move.
#[allow(unused)]
pub async fn settle() {
    for _ in 0..100 {
        tokio::task::yield_now().await;
    }
}

/// Advances paused time a hair past `duration` so millisecond rounding
/// of timer deadlines cannot hold a timer back.
#[allow(unused)]
pub async fn advance(duration: Duration) {
    tokio::time::advance(duration + Duration::from_millis(2)).await;
    settle().await;
}

/// A command with no input files, so asset checks always pass.
#[allow(unused)]
pub fn command() -> EncoderCommand {
    let source = StreamSource::SolidColor {
        color: "black".into(),
        size: "1280x720".into(),
        audio: None,
    };
    EncoderCommand::build(
        &EncoderSettings::default(),
        &source,
        "rtmp://ingest.test/live",
        "test-key",
    )
}

// Helper function to create a supervisor with default settings
#[allow(unused)]
pub async fn create_supervisor_and_get_handle(launcher: &FakeLauncher) -> SupervisorHandle {
    let handle = SupervisorBuilder::new()
        .with_command(command())
        .with_launcher(launcher.clone())
        .build()
        .run();
    settle().await;
    handle
}

#[derive(Default)]
struct LauncherState {
    children: Vec<FakeChildControl>,
    fail_next: u32,
    panic_next: u32,
    live: usize,
    max_live: usize,
}

/// Hands out in-memory children that tests drive by hand.
#[derive(Clone, Default)]
pub struct FakeLauncher {
    state: Arc<Mutex<LauncherState>>,
}

#[allow(unused)]
impl FakeLauncher {
    pub fn launches(&self) -> usize {
        self.state.lock().unwrap().children.len()
    }

    /// Highest number of children alive at the same time.
    pub fn max_live(&self) -> usize {
        self.state.lock().unwrap().max_live
    }

    pub fn live(&self) -> usize {
        self.state.lock().unwrap().live
    }

    /// The most recently launched child.
    pub fn last(&self) -> FakeChildControl {
        self.state
            .lock()
            .unwrap()
            .children
            .last()
            .cloned()
            .expect("nothing launched yet")
    }

    pub fn child(&self, index: usize) -> FakeChildControl {
        self.state.lock().unwrap().children[index].clone()
    }

    /// Makes the next `count` launches fail as if the binary were missing.
    pub fn fail_next(&self, count: u32) {
        self.state.lock().unwrap().fail_next = count;
    }

    /// Makes the next `count` launches panic.
    pub fn panic_next(&self, count: u32) {
        self.state.lock().unwrap().panic_next = count;
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn launch(&self, _command: &EncoderCommand) -> io::Result<Box<dyn ChildProcess>> {
        let mut state = self.state.lock().unwrap();
        if state.panic_next > 0 {
            state.panic_next -= 1;
            drop(state);
            panic!("launcher exploded");
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(io::Error::new(io::ErrorKind::NotFound, "ffmpeg: not found"));
        }

        let (reader, writer) = tokio::io::duplex(64 * 1024);
        let writer = Arc::new(tokio::sync::Mutex::new(Some(writer)));
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        let terminated = Arc::new(AtomicBool::new(false));
        let killed = Arc::new(AtomicBool::new(false));
        let stubborn = Arc::new(AtomicBool::new(false));
        let pid = 1000 + state.children.len() as u32;

        state.children.push(FakeChildControl {
            pid,
            writer: writer.clone(),
            exit_tx: exit_tx.clone(),
            terminated: terminated.clone(),
            killed: killed.clone(),
            stubborn: stubborn.clone(),
        });
        state.live += 1;
        state.max_live = state.max_live.max(state.live);

        Ok(Box::new(FakeChild {
            pid,
            diagnostics: Some(reader),
            writer,
            exit_tx,
            exit_rx,
            exited: None,
            terminated,
            killed,
            stubborn,
            launcher: self.state.clone(),
        }))
    }
}

/// Test-side controls of one fake child.
#[derive(Clone)]
pub struct FakeChildControl {
    pub pid: u32,
    writer: Arc<tokio::sync::Mutex<Option<DuplexStream>>>,
    exit_tx: mpsc::UnboundedSender<ExitOutcome>,
    terminated: Arc<AtomicBool>,
    killed: Arc<AtomicBool>,
    stubborn: Arc<AtomicBool>,
}

#[allow(unused)]
impl FakeChildControl {
    /// Writes one line to the child's diagnostic stream.
    pub async fn emit(&self, line: &str) {
        if let Some(writer) = self.writer.lock().await.as_mut() {
            writer
                .write_all(format!("{line}\n").as_bytes())
                .await
                .unwrap();
        }
    }

    /// Closes the diagnostic stream and makes the child exit with `code`.
    /// Calling it again queues a duplicate exit notification.
    pub async fn exit(&self, code: i32) {
        self.writer.lock().await.take();
        let _ = self.exit_tx.send(ExitOutcome { code: Some(code) });
    }

    pub fn was_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn was_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    /// Makes the child shrug off `terminate`; only `kill` ends it.
    pub fn ignore_terminate(&self) {
        self.stubborn.store(true, Ordering::SeqCst);
    }
}

struct FakeChild {
    pid: u32,
    diagnostics: Option<DuplexStream>,
    writer: Arc<tokio::sync::Mutex<Option<DuplexStream>>>,
    exit_tx: mpsc::UnboundedSender<ExitOutcome>,
    exit_rx: mpsc::UnboundedReceiver<ExitOutcome>,
    exited: Option<ExitOutcome>,
    terminated: Arc<AtomicBool>,
    killed: Arc<AtomicBool>,
    stubborn: Arc<AtomicBool>,
    launcher: Arc<Mutex<LauncherState>>,
}

#[async_trait]
impl ChildProcess for FakeChild {
    fn id(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn take_diagnostics(&mut self) -> Option<Diagnostics> {
        self.diagnostics
            .take()
            .map(|reader| Box::new(reader) as Diagnostics)
    }

    async fn wait(&mut self) -> io::Result<ExitOutcome> {
        if let Some(outcome) = self.exited {
            return Ok(outcome);
        }
        let outcome = self
            .exit_rx
            .recv()
            .await
            .unwrap_or(ExitOutcome { code: None });
        self.exited = Some(outcome);
        self.launcher.lock().unwrap().live -= 1;
        Ok(outcome)
    }

    async fn terminate(&mut self) -> io::Result<()> {
        self.terminated.store(true, Ordering::SeqCst);
        if self.stubborn.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.writer.lock().await.take();
        let _ = self.exit_tx.send(ExitOutcome { code: None });
        Ok(())
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.killed.store(true, Ordering::SeqCst);
        self.writer.lock().await.take();
        let _ = self.exit_tx.send(ExitOutcome { code: None });
        Ok(())
    }
}

/// Launches children whose `wait` panics.
#[allow(unused)]
#[derive(Clone, Default)]
pub struct PanickingLauncher {
    pub launches: Arc<Mutex<usize>>,
}

#[async_trait]
impl Launcher for PanickingLauncher {
    async fn launch(&self, _command: &EncoderCommand) -> io::Result<Box<dyn ChildProcess>> {
        *self.launches.lock().unwrap() += 1;
        Ok(Box::new(PanickingChild))
    }
}

struct PanickingChild;

#[async_trait]
impl ChildProcess for PanickingChild {
    fn id(&self) -> Option<u32> {
        None
    }

    fn take_diagnostics(&mut self) -> Option<Diagnostics> {
        None
    }

    async fn wait(&mut self) -> io::Result<ExitOutcome> {
        tokio::task::yield_now().await;
        panic!("wait exploded");
    }

    async fn terminate(&mut self) -> io::Result<()> {
        Ok(())
    }
}
