use crate::prompt::Action;
use crate::types::ResourceRecord;
use crate::utils::{Selection, parse_selection, sort_records, status_color, suggestion_text};
use crossterm::style::Stylize;
use std::io::Write;

/// Numbered suggestion list for one prompt session.
pub struct Picker {
    action: Action,
    records: Vec<ResourceRecord>,
}

impl Picker {
    pub fn new(action: Action, mut records: Vec<ResourceRecord>) -> Self {
        sort_records(&mut records);
        Self { action, records }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn render(&self, out: &mut impl Write) -> std::io::Result<()> {
        for (idx, record) in self.records.iter().enumerate() {
            writeln!(
                out,
                "{:>4}  {:<60} {}",
                idx + 1,
                suggestion_text(record),
                record.status.clone().with(status_color(&record.status))
            )?;
            if matches!(self.action, Action::Log | Action::Ssh) {
                for c in &record.containers {
                    writeln!(out, "        - {} ({})", c.name, c.role)?;
                }
            }
        }
        let options = self
            .action
            .options()
            .iter()
            .map(|(flag, _)| *flag)
            .collect::<Vec<_>>()
            .join("  ");
        writeln!(out, "options: {}", options.dark_grey())?;
        write!(out, "[{}] >> ", self.action.label())?;
        out.flush()
    }

    /// Accept either a list index or `name [namespace] extra args`.
    pub fn resolve(&self, input: &str) -> Option<Selection> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        let mut parts = input.split_whitespace();
        let first = parts.next()?;
        if let Ok(idx) = first.parse::<usize>()
            && let Some(record) = idx.checked_sub(1).and_then(|i| self.records.get(i))
        {
            return Some(Selection {
                name: record.name.clone(),
                namespace: record.namespace.clone(),
                extra: parts.map(str::to_string).collect(),
            });
        }
        parse_selection(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContainerMeta, ContainerRole};

    fn picker() -> Picker {
        Picker::new(
            Action::Log,
            vec![
                ResourceRecord::new("pod", "web", "shop").with_status("Running"),
                ResourceRecord {
                    containers: vec![ContainerMeta {
                        name: "app".to_string(),
                        role: ContainerRole::Container,
                    }],
                    ..ResourceRecord::new("pod", "api", "shop").with_status("Pending")
                },
                ResourceRecord::new("pod", "db", "data"),
            ],
        )
    }

    #[test]
    fn test_sorted_and_rendered() {
        let mut out = Vec::new();
        picker().render(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let db = text.find("db [data]").unwrap();
        let api = text.find("api [shop]").unwrap();
        let web = text.find("web [shop]").unwrap();
        assert!(db < api && api < web);
        assert!(text.contains("- app (container)"));
        assert!(text.ends_with("[log] >> "));
    }

    #[test]
    fn test_resolve_by_index() {
        let sel = picker().resolve("2 --follow").unwrap();
        assert_eq!(sel.name, "api");
        assert_eq!(sel.namespace, "shop");
        assert_eq!(sel.extra, vec!["--follow".to_string()]);
    }

    #[test]
    fn test_resolve_by_text() {
        let sel = picker().resolve("web [shop] --tail 10").unwrap();
        assert_eq!(sel.name, "web");
        assert_eq!(sel.namespace, "shop");
        assert_eq!(sel.extra, vec!["--tail".to_string(), "10".to_string()]);

        assert!(picker().resolve("   ").is_none());
        // out of range indexes fall back to text
        assert_eq!(picker().resolve("9").unwrap().name, "9");
    }
}
