//! Client-side bootstrap: find a running watch service, or launch one in the
//! background and wait for it to answer.

use crate::cli::LogLevel;
use crate::error::{BootstrapError, RpcError};
use crate::rpc::WatchClient;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_BUDGET: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub enum BootstrapState {
    ProbingExisting,
    Launching,
    Retrying,
    Ready(WatchClient),
    Failed(BootstrapError),
}

impl BootstrapState {
    pub fn name(&self) -> &'static str {
        match self {
            BootstrapState::ProbingExisting => "probing",
            BootstrapState::Launching => "launching",
            BootstrapState::Retrying => "retrying",
            BootstrapState::Ready(_) => "ready",
            BootstrapState::Failed(_) => "failed",
        }
    }
}

/// What the launched service needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub address: String,
    pub port: u16,
    pub log_level: Option<LogLevel>,
    pub kubeconfig: PathBuf,
    pub context: String,
}

impl LaunchRequest {
    pub fn bind(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// Arguments for the `watch` subcommand.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["watch".to_string()];
        match self.log_level {
            Some(LogLevel::Info) => args.push("--info".to_string()),
            Some(LogLevel::Debug) => args.push("--verbose".to_string()),
            None => {}
        }
        args.extend([
            "--kubeconfig".to_string(),
            self.kubeconfig.display().to_string(),
            "--address".to_string(),
            self.address.clone(),
            "--port".to_string(),
            self.port.to_string(),
            self.context.clone(),
        ]);
        args
    }
}

/// Starts a service instance without waiting on it.
pub trait Launcher: Send + Sync {
    fn launch(&self, request: &LaunchRequest) -> std::io::Result<()>;
}

/// Re-executes the current binary as a detached `watch` process.
#[derive(Debug, Default)]
pub struct DetachedLauncher;

impl Launcher for DetachedLauncher {
    fn launch(&self, request: &LaunchRequest) -> std::io::Result<()> {
        let program = std::env::current_exe()?;
        let mut cmd = Command::new(program);
        cmd.args(request.args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // New process group so the service outlives this command.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let child = cmd.spawn()?;
        debug!(pid = child.id(), context = %request.context, "launched watch service");
        Ok(())
    }
}

/// Exponential backoff bounded by a total elapsed budget.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
    pub max_elapsed: Duration,
    current: Duration,
    started: Instant,
}

impl ExponentialBackoff {
    pub fn new(max_elapsed: Duration) -> Self {
        let initial = Duration::from_millis(500);
        Self {
            initial_interval: initial,
            multiplier: 1.5,
            max_interval: Duration::from_secs(60),
            max_elapsed,
            current: initial,
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Next wait, or `None` once the budget would be exceeded.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        let elapsed = self.elapsed();
        if elapsed >= self.max_elapsed {
            return None;
        }
        let wait = self.current.min(self.max_elapsed - elapsed);
        self.current = self
            .current
            .mul_f64(self.multiplier)
            .min(self.max_interval);
        Some(wait)
    }
}

pub struct Bootstrap<'a> {
    request: LaunchRequest,
    service: String,
    budget: Duration,
    launcher: &'a dyn Launcher,
}

impl<'a> Bootstrap<'a> {
    pub fn new(request: LaunchRequest, service: &str, launcher: &'a dyn Launcher) -> Self {
        Self {
            request,
            service: service.to_string(),
            budget: DEFAULT_BUDGET,
            launcher,
        }
    }

    pub fn budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// Drive the state machine to `Ready` or `Failed`.
    pub async fn run(self) -> Result<WatchClient, BootstrapError> {
        let address = self.request.bind();
        let context = self.request.context.clone();
        let mut state = BootstrapState::ProbingExisting;
        let mut backoff = ExponentialBackoff::new(self.budget);

        loop {
            debug!(state = state.name(), %address, context = %context, "bootstrap");
            state = match state {
                BootstrapState::ProbingExisting => match self.probe(&address, &context).await {
                    Ok(client) => BootstrapState::Ready(client),
                    Err(e) if e.is_connection_refused() => {
                        info!(%address, "watch service is not running");
                        BootstrapState::Launching
                    }
                    Err(e) => BootstrapState::Failed(e.into()),
                },
                BootstrapState::Launching => {
                    info!(context = %context, "launching watch service");
                    match self.launcher.launch(&self.request) {
                        Ok(()) => {
                            backoff = ExponentialBackoff::new(self.budget);
                            BootstrapState::Retrying
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to launch watch service");
                            BootstrapState::Failed(BootstrapError::SpawnFailure(e))
                        }
                    }
                }
                BootstrapState::Retrying => match self.probe(&address, &context).await {
                    Ok(client) => {
                        info!(
                            service = client.service(),
                            elapsed = ?backoff.elapsed(),
                            "watch service is ready"
                        );
                        BootstrapState::Ready(client)
                    }
                    Err(e) => {
                        debug!(error = %e, "watch service not ready yet");
                        match backoff.next_backoff() {
                            Some(wait) => {
                                tokio::time::sleep(wait).await;
                                BootstrapState::Retrying
                            }
                            None => BootstrapState::Failed(BootstrapError::Timeout {
                                elapsed: backoff.elapsed(),
                                last_error: e.to_string(),
                            }),
                        }
                    }
                },
                BootstrapState::Ready(client) => return Ok(client),
                BootstrapState::Failed(e) => return Err(e),
            };
        }
    }

    async fn probe(&self, address: &str, context: &str) -> Result<WatchClient, RpcError> {
        let client = WatchClient::connect(address, &self.service).await?;
        client.status(context).await?;
        Ok(client)
    }
}
