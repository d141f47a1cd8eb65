use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kubectl-ac")]
#[command(about = "Pick cluster resources from a cached, always-on watch service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start watching Kube servers and serve the cache
    Watch(WatchArgs),

    /// Select a pod and run `kubectl get` (or `@describe`) on it
    #[command(visible_aliases = ["pod", "po", "p"])]
    Resources(ResourcesArgs),

    /// Select a pod and show its logs
    #[command(visible_aliases = ["logs", "lo", "l"])]
    Log(ResourcesArgs),

    /// Select a node and run `kubectl get` (or `@describe`) on it
    #[command(visible_aliases = ["no", "n"])]
    Node(ResourcesArgs),

    /// Select a pod and open a shell in it
    Ssh(ResourcesArgs),

    /// Print version
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Debug,
}

impl LogLevel {
    pub fn filter(level: Option<LogLevel>) -> &'static str {
        match level {
            Some(LogLevel::Debug) => "debug",
            Some(LogLevel::Info) => "info",
            None => "warn",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// The IP address where the watch service is accessible
    #[arg(short = 'a', long, default_value = "127.0.0.1")]
    pub address: String,

    /// The port on which the watch service is accessible
    #[arg(short = 'p', long, default_value_t = 33033)]
    pub port: u16,

    /// Path to the kubeconfig file
    #[arg(long, default_value = "~/.kube/config")]
    pub kubeconfig: String,

    /// Enables verbose output
    #[arg(short = 'i', long)]
    pub info: bool,

    /// Enables very verbose output
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl CommonArgs {
    pub fn log_level(&self) -> Option<LogLevel> {
        if self.verbose {
            Some(LogLevel::Debug)
        } else if self.info {
            Some(LogLevel::Info)
        } else {
            None
        }
    }

    pub fn bind(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    pub fn kubeconfig_path(&self) -> PathBuf {
        crate::utils::expand_home(&self.kubeconfig)
    }
}

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Contexts to watch
    #[arg(required = true)]
    pub contexts: Vec<String>,

    /// Seconds between full refreshes of polled kinds
    #[arg(long, default_value_t = 120)]
    pub interval: u64,

    /// Comma-separated kinds to watch, empty to watch all supported
    #[arg(long, default_value = "")]
    pub only: String,

    /// Log file for the service
    #[arg(long, default_value = "/tmp/kubectl-ac.log")]
    pub log_file: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ResourcesArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Context (default is the active context from kubeconfig)
    pub context: Option<String>,

    /// Retrieve resources for a specific namespace (default is all)
    #[arg(short = 'n', long, default_value = "")]
    pub namespace: String,

    /// Pass the context's proxy-url to kubectl as HTTPS_PROXY
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub setproxy: bool,
}
