use std::{sync::Arc, time::Duration};

use tokio::sync::mpsc;

use crate::{
    config::AppConfig,
    encoder::EncoderCommand,
    facade::{StatusFacade, DEFAULT_LOG_CAPACITY},
    filter::LineFilter,
    launcher::{Launcher, TokioLauncher},
    supervisor::{RestartPolicy, Supervisor},
};

/// Builds a `Supervisor` instance with configurable parameters.
///
/// Without a command the supervisor still runs and serves status, but every
/// start attempt fails with a missing stream key.
pub struct SupervisorBuilder {
    command: Option<EncoderCommand>,
    launcher: Arc<dyn Launcher>,
    facade: Option<StatusFacade>,
    filter: LineFilter,
    policy: RestartPolicy,
    log_capacity: usize,
}

impl SupervisorBuilder {
    /// Creates a new builder with default configuration values.
    pub fn new() -> Self {
        Self {
            command: None,
            launcher: Arc::new(TokioLauncher),
            facade: None,
            filter: LineFilter::default(),
            policy: RestartPolicy::default(),
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }

    /// Takes the command, filter, restart policy and log capacity from `config`.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            command: config.encoder_command(),
            filter: config.filter.line_filter(),
            policy: config.restart.policy(),
            log_capacity: config.stream.log_capacity,
            ..Self::new()
        }
    }

    pub fn with_command(mut self, command: EncoderCommand) -> Self {
        self.command = Some(command);
        self
    }

    /// Replaces the process launcher, mostly for tests.
    pub fn with_launcher(mut self, launcher: impl Launcher) -> Self {
        self.launcher = Arc::new(launcher);
        self
    }

    /// Shares an existing facade instead of creating one.
    pub fn with_facade(mut self, facade: StatusFacade) -> Self {
        self.facade = Some(facade);
        self
    }

    pub fn with_filter(mut self, filter: LineFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the delay between an exit and the next start.
    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.policy.base_delay = delay;
        self
    }

    /// Sets the delay between retries while an input file is missing.
    pub fn with_asset_retry_delay(mut self, delay: Duration) -> Self {
        self.policy.asset_retry_delay = delay;
        self
    }

    pub fn with_max_restart_attempts(mut self, attempts: u32) -> Self {
        self.policy.max_attempts = Some(attempts);
        self
    }

    /// Number of log lines kept. Ignored when a facade is supplied.
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    /// Constructs the `Supervisor` with the configured settings.
    pub fn build(self) -> Supervisor {
        let (tx, rx) = mpsc::unbounded_channel();
        let facade = self
            .facade
            .unwrap_or_else(|| StatusFacade::new(self.log_capacity));
        Supervisor {
            command: self.command,
            launcher: self.launcher,
            facade,
            filter: Arc::new(self.filter),
            policy: self.policy,
            child: None,
            next_generation: 0,
            restart_attempts: 0,
            pending_restart: None,
            next_ticket: 0,
            restart_now: false,
            gave_up: false,
            launched_once: false,
            tx,
            rx,
        }
    }
}

impl Default for SupervisorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
