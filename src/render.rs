//! Console text for dispatch results.

use serde_json::Value;

use crate::{
    command::ALL_USAGES,
    dispatcher::{DeleteStatus, DispatchResult},
    metrics::MetricsReport,
    proxy::WriteAction,
};

const RULE_WIDTH: usize = 60;

pub fn render(result: &DispatchResult) -> String {
    match result {
        DispatchResult::Put {
            key,
            value,
            action,
            previous,
            ok,
        } => {
            let verb = match action {
                WriteAction::Added => "add",
                WriteAction::Updated => "update",
            };
            if *ok {
                match previous {
                    Some(prev) => format!("✓ {action} {key} = {value} (was: {prev})"),
                    None => format!("✓ {action} {key} = {value}"),
                }
            } else {
                format!("✗ failed to {verb} {key} = {value}")
            }
        }
        DispatchResult::Get { key, value } => match value {
            Some(value) => format!("✓ {key} = {value}"),
            None => format!("✗ key not found: {key}"),
        },
        DispatchResult::Delete {
            key,
            status,
            previous,
        } => match status {
            DeleteStatus::Deleted => match previous {
                Some(prev) => format!("✓ deleted {key} (was: {prev})"),
                None => format!("✓ deleted {key}"),
            },
            DeleteStatus::Absent => format!("✗ nothing to delete: key {key} does not exist"),
            DeleteStatus::Failed => format!("✗ failed to delete {key}"),
        },
        DispatchResult::List { pairs } => {
            if pairs.is_empty() {
                return "database is empty".to_string();
            }
            framed(
                "all key/value pairs",
                pairs
                    .iter()
                    .enumerate()
                    .map(|(i, p)| format!("{}. {} = {}", i + 1, p.key, p.value)),
                format!("total: {} pairs", pairs.len()),
            )
        }
        DispatchResult::Log { entries } => {
            if entries.is_empty() {
                return "operation log is empty".to_string();
            }
            framed(
                "operation log",
                entries
                    .iter()
                    .enumerate()
                    .map(|(i, e)| format!("{}. {e}", i + 1)),
                format!("total: {} entries", entries.len()),
            )
        }
        DispatchResult::Metrics { report } => match report {
            Some(report) => render_metrics(report),
            None => "✗ cluster metrics unavailable".to_string(),
        },
        DispatchResult::AddLearner {
            node_id,
            api_addr,
            ok,
        } => {
            if *ok {
                format!("✓ learner added: node_id={node_id}, address={api_addr}")
            } else {
                format!("✗ failed to add learner: node_id={node_id}, address={api_addr}")
            }
        }
        DispatchResult::ChangeMembership { node_ids, ok } => {
            if *ok {
                format!("✓ membership changed: members = {node_ids:?}")
            } else {
                format!("✗ failed to change membership: members = {node_ids:?}")
            }
        }
        DispatchResult::Exit { session_id } => format!("client {session_id} logged out"),
        DispatchResult::Invalid { message } => format!("✗ {message}"),
    }
}

pub fn render_metrics(report: &MetricsReport) -> String {
    let mut lines = Vec::new();
    for (name, fields) in &report.sections {
        lines.push(format!("[{name}]"));
        for (field, value) in fields {
            lines.push(format!("  {field}: {}", value_text(value)));
        }
    }
    for warning in &report.warnings {
        lines.push(format!("! {warning}"));
    }
    framed("cluster metrics", lines.into_iter(), String::new())
}

pub fn help_text() -> String {
    let mut lines = vec!["commands:".to_string()];
    lines.extend(ALL_USAGES.iter().map(|u| format!("  {u}")));
    lines.join("\n")
}

fn framed(title: &str, body: impl Iterator<Item = String>, footer: String) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut lines = vec![rule.clone(), title.to_string(), rule.clone()];
    lines.extend(body);
    lines.push(rule);
    if !footer.is_empty() {
        lines.push(footer);
    }
    lines.join("\n")
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "none".to_string(),
        other => other.to_string(),
    }
}
