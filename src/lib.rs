//! # stream-supervisor
//!
//! `stream-supervisor` keeps an encoder process pushing a looping source to a
//! live ingest endpoint. It restarts the encoder whenever it exits, keeps a
//! short ring of its interesting output lines, and reports all of it over
//! HTTP.
//!
//! ## Quick example
//!
//! ```rust,no_run
//! use stream_supervisor::{EncoderCommand, EncoderSettings, StreamSource, SupervisorBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let command = EncoderCommand::build(
//!         &EncoderSettings::default(),
//!         &StreamSource::default(),
//!         "rtmp://a.rtmp.youtube.com/live2",
//!         &std::env::var("STREAM_KEY")?,
//!     );
//!     let handle = SupervisorBuilder::new().with_command(command).build().run();
//!
//!     println!("{}", handle.status().status);
//!     handle.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## What you get
//!
//! * **Automatic restarts** – the encoder is relaunched after a fixed delay, or
//!   with exponential back-off and jitter if configured.
//! * **One child at a time** – restarts are only scheduled when an exit is
//!   observed, so two encoders never overlap.
//! * **Filtered logs** – progress spam and banners are dropped before they can
//!   evict real errors from the ring.
//! * **Always answering** – configuration errors and encoder crashes are
//!   reported, never fatal; `/health` stays green.
//!
//! ## API overview
//!
//! | SupervisorHandle method | Purpose                                                |
//! | ----------------------- | ------------------------------------------------------ |
//! | `status()`              | `StatusSnapshot` (status, uptime, LastError, logs)     |
//! | `subscribe()`           | Receive every accepted log line as it arrives          |
//! | `restart()`             | Replace the running encoder right away                 |
//! | `stop().await`          | Cancel pending restarts and terminate the encoder      |

pub use config::AppConfig;
pub use encoder::{EncoderCommand, EncoderSettings, StreamSource};
pub use error::{ConfigError, SupervisorError};
pub use facade::{LogEntry, LogRing, Severity, StatusFacade};
pub use filter::{Disposition, LineFilter};
pub use launcher::{ChildProcess, Diagnostics, ExitOutcome, Launcher, TokioLauncher};
pub use status::{StatusSnapshot, StreamStatus};
pub use supervisor::{
    builder::SupervisorBuilder,
    handle::{SupervisorHandle, SupervisorHandleError},
    RestartPolicy, Supervisor,
};

pub mod config;
pub mod encoder;
pub mod error;
pub mod facade;
pub mod filter;
pub mod http;
pub mod launcher;
pub mod status;

mod child;
mod supervisor;
