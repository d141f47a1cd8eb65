use crate::types::ResourceRecord;
use crossterm::style::Color;
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

static SELECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\S+)(?:\s+\[([^\]]*)\])?\s*(.*?)\s*$").expect("valid selection regex")
});

/// A resource picked at the prompt plus any extra kubectl arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub name: String,
    pub namespace: String,
    pub extra: Vec<String>,
}

/// Expand a leading `~/` using `$HOME`.
pub fn expand_home(path: &str) -> PathBuf {
    let path = if path.trim().is_empty() {
        "~/.kube/config"
    } else {
        path
    };
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}

/// Sort by kind, then namespace, then name.
pub fn sort_records(records: &mut [ResourceRecord]) {
    records.sort_by(|a, b| {
        (&a.kind, &a.namespace, &a.name).cmp(&(&b.kind, &b.namespace, &b.name))
    });
}

/// Prompt text for a record: `name [namespace]`, or just `name`.
pub fn suggestion_text(record: &ResourceRecord) -> String {
    if record.namespace.trim().is_empty() {
        record.name.clone()
    } else {
        format!("{} [{}]", record.name, record.namespace)
    }
}

/// Parse `name [namespace] extra args`.
pub fn parse_selection(input: &str) -> Option<Selection> {
    let caps = SELECTION_RE.captures(input)?;
    let name = caps.get(1)?.as_str().to_string();
    let namespace = caps
        .get(2)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();
    let extra = caps
        .get(3)
        .map(|m| m.as_str().split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    Some(Selection {
        name,
        namespace,
        extra,
    })
}

pub fn status_color(status: &str) -> Color {
    let phase = status.split(':').next().unwrap_or("").trim();
    match phase {
        "Running" | "Ready" | "Active" | "Succeeded" => Color::Green,
        "Pending" | "Terminating" => Color::Yellow,
        "Unknown" => Color::Grey,
        _ => Color::Red,
    }
}
