mod bootstrap;
mod cli;
mod error;
mod ingest;
mod kubernetes;
mod prompt;
mod rpc;
mod store;
mod types;
mod utils;
mod watch;

use anyhow::Context;
use clap::Parser;
use kube::config::Kubeconfig;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use bootstrap::{Bootstrap, DetachedLauncher, LaunchRequest};
use cli::{Cli, Command, LogLevel, ResourcesArgs, WatchArgs};
use kubernetes::KubeSource;
use prompt::{Action, Picker};
use rpc::SERVICE_NAME;
use watch::WatchService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Watch(args) => {
            init_tracing(args.common.log_level(), Some(&args.log_file));
            log_failure(run_watch(args).await)
        }
        Command::Resources(args) => run_resources(Action::Pod, args).await,
        Command::Log(args) => run_resources(Action::Log, args).await,
        Command::Node(args) => run_resources(Action::Node, args).await,
        Command::Ssh(args) => run_resources(Action::Ssh, args).await,
        Command::Version => {
            println!("kubectl-ac");
            println!("Version: {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Logs go to `log_file` when given (the service runs detached), else stderr.
fn init_tracing(level: Option<LogLevel>, log_file: Option<&Path>) {
    let filter = LogLevel::filter(level);
    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter))
    };

    let file = log_file.and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| eprintln!("Warning: Could not open {} for logging: {}", path.display(), e))
            .ok()
    });

    match file {
        Some(file) => tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_target(false)
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .init(),
        None => tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_target(false)
            .with_writer(std::io::stderr)
            .init(),
    }
}

/// A launched service has no stderr; its failures only surface in the log file.
fn log_failure(result: anyhow::Result<()>) -> anyhow::Result<()> {
    if let Err(e) = &result {
        error!(error = %format!("{:#}", e), "watch service failed");
    }
    result
}

async fn run_watch(args: WatchArgs) -> anyhow::Result<()> {
    let kubeconfig = args.common.kubeconfig_path();
    let bind = args.common.bind();
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind on {}", bind))?;

    let source = KubeSource::from_kubeconfig(&kubeconfig, &args.contexts).await?;
    let mut service = WatchService::new(Arc::new(source), args.contexts);
    service.only = args.only;
    service.interval = Duration::from_secs(args.interval);
    service.run(listener).await
}

async fn run_resources(action: Action, args: ResourcesArgs) -> anyhow::Result<()> {
    init_tracing(args.common.log_level(), None);

    let kubeconfig_path = args.common.kubeconfig_path();
    let kubeconfig = Kubeconfig::read_from(&kubeconfig_path)
        .with_context(|| format!("Failed to read kubeconfig {}", kubeconfig_path.display()))?;
    let context = kubernetes::resolve_context(&kubeconfig, args.context.as_deref())?;
    let proxy_url = if args.setproxy {
        kubernetes::proxy_url(&kubeconfig, &context)
    } else {
        None
    };
    debug!(context = %context, namespace = %args.namespace, "using context");

    let request = LaunchRequest {
        address: args.common.address.clone(),
        port: args.common.port,
        log_level: args.common.log_level(),
        kubeconfig: kubeconfig_path,
        context: context.clone(),
    };
    let client = Bootstrap::new(request, SERVICE_NAME, &DetachedLauncher)
        .run()
        .await?;

    let records = client
        .resources(&action.filter(&context, &args.namespace))
        .await?;
    let picker = Picker::new(action, records);
    if picker.is_empty() {
        info!(context = %context, kind = action.kind(), "nothing cached yet");
    }
    picker.render(&mut std::io::stdout())?;

    let mut line = String::new();
    tokio::io::BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await?;
    debug!(input = %line.trim(), "your input");

    if let Some(selection) = picker.resolve(&line) {
        let kubectl_args = prompt::executor::build_args(action, &selection, &context);
        prompt::executor::run(&kubectl_args, proxy_url.as_deref())?;
    }
    Ok(())
}
