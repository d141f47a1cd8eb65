use crate::types::WatchFilter;
use crate::utils::Selection;
use std::process::Command;
use tracing::debug;

/// What to do with the picked resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Pod,
    Log,
    Node,
    Ssh,
}

impl Action {
    /// Kind of resource the action needs from the cache.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Pod | Action::Log | Action::Ssh => "pod",
            Action::Node => "node",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Action::Pod => "pod",
            Action::Log => "log",
            Action::Node => "node",
            Action::Ssh => "ssh",
        }
    }

    /// Nodes are cluster-scoped, so the namespace flag never narrows them.
    pub fn filter(&self, context: &str, namespace: &str) -> WatchFilter {
        match self {
            Action::Node => WatchFilter::new(context, "", self.kind()),
            _ => WatchFilter::new(context, namespace, self.kind()),
        }
    }

    /// Extra flags offered once a resource is picked.
    pub fn options(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Action::Pod | Action::Node => &[
                ("--output json", "Output manifest in json format"),
                ("--output yaml", "Output manifest in yaml format"),
                ("--output wide", "Output more details"),
                ("@describe", "Run kubectl describe instead of get"),
            ],
            Action::Log => &[
                ("--all-containers", "Get all containers' logs in the pod"),
                ("--container", "Get logs for specific container"),
                ("--follow", "Specify if the logs should be streamed"),
                ("--previous", "Print the logs for the previous instance of the container"),
                ("--timestamps", "Include timestamps on each line in the log output"),
            ],
            Action::Ssh => &[("--container", "Exec into a specific container")],
        }
    }
}

/// Build the kubectl argument list for a picked resource.
pub fn build_args(action: Action, selection: &Selection, context: &str) -> Vec<String> {
    let describe = selection.extra.iter().any(|a| a == "@describe");
    let verb = if describe { "describe" } else { "get" };
    let extra: &[String] = if describe { &[] } else { &selection.extra };
    let name = selection.name.clone();
    let ns = selection.namespace.clone();

    let mut args: Vec<String> = match action {
        Action::Pod => vec![verb.into(), "pod".into(), name, "--namespace".into(), ns],
        Action::Log => vec!["logs".into(), name, "--namespace".into(), ns],
        Action::Node => vec![verb.into(), "node".into(), name],
        Action::Ssh => {
            let mut args = vec![
                "exec".into(),
                "-ti".into(),
                name,
                "--namespace".into(),
                ns,
                "--context".into(),
                context.to_string(),
            ];
            if let [flag, container] = extra
                && flag == "--container"
            {
                args.extend([flag.clone(), container.clone()]);
            }
            // the shell always goes last
            args.extend(["--".into(), "sh".into()]);
            return args;
        }
    };
    args.extend(extra.iter().cloned());
    args.extend(["--context".into(), context.to_string()]);
    args
}

/// Run kubectl with the terminal attached.
pub fn run(args: &[String], proxy_url: Option<&str>) -> anyhow::Result<()> {
    debug!(?args, "running kubectl");
    let mut cmd = Command::new("kubectl");
    cmd.args(args);
    if let Some(url) = proxy_url {
        cmd.env("HTTPS_PROXY", url);
    }
    let status = cmd.status()?;
    if !status.success() {
        anyhow::bail!("kubectl failed with {}", status);
    }
    Ok(())
}
