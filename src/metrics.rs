use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value, json};

pub const SECTION_NODE: &str = "node";
pub const SECTION_VOTE: &str = "vote";
pub const SECTION_LOG: &str = "log";
pub const SECTION_MEMBERSHIP: &str = "membership";
pub const SECTION_HEARTBEAT: &str = "heartbeat";
pub const SECTION_REPLICATION: &str = "replication";
pub const SECTION_RAW: &str = "raw";

/// A leader not acknowledged by a quorum for longer than this may have lost the cluster.
pub const QUORUM_ACK_WARN_MILLIS: u64 = 1_000;

pub type Section = BTreeMap<String, Value>;

/// Cluster metrics reshaped into named sections. Field values stay JSON so higher layers can
/// render them however they like; ordering is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsReport {
    pub sections: BTreeMap<String, Section>,
    pub warnings: Vec<String>,
}

impl MetricsReport {
    pub fn from_reply(reply: &Value) -> Self {
        let mut report = Self::default();
        let Some(top) = reply.as_object() else {
            report.insert(SECTION_RAW, "value", reply.clone());
            return report;
        };

        if let Some(ok) = top.get("Ok").and_then(Value::as_object) {
            report.collect_node(ok);
            report.collect_vote(ok);
            report.collect_log(ok);
            report.collect_membership(ok);
        }

        if let Some(heartbeat) = top.get("heartbeat").and_then(Value::as_object) {
            let section = report.section(SECTION_HEARTBEAT);
            for (node_id, ts) in heartbeat {
                section.insert(node_id.clone(), ts.clone());
            }
        }

        if let Some(replication) = top.get("replication").and_then(Value::as_object) {
            let section = report.section(SECTION_REPLICATION);
            for (node_id, log_id) in replication {
                section.insert(node_id.clone(), log_id_summary(log_id));
            }
        }

        report
    }

    fn section(&mut self, name: &str) -> &mut Section {
        self.sections.entry(name.to_string()).or_default()
    }

    fn insert(&mut self, section: &str, field: &str, value: Value) {
        self.section(section).insert(field.to_string(), value);
    }

    fn copy_fields(&mut self, section: &str, ok: &Map<String, Value>, fields: &[&str]) {
        for field in fields {
            if let Some(value) = ok.get(*field) {
                self.insert(section, field, value.clone());
            }
        }
    }

    fn collect_node(&mut self, ok: &Map<String, Value>) {
        self.copy_fields(SECTION_NODE, ok, &["id", "current_term", "state", "current_leader"]);
        if let Some(running) = ok.get("running_state") {
            let status = match running {
                Value::Object(obj) if obj.contains_key("Ok") => json!("ok"),
                Value::Object(obj) => match obj.get("Err") {
                    Some(err) => json!(format!("error: {err}")),
                    None => running.clone(),
                },
                other => other.clone(),
            };
            self.insert(SECTION_NODE, "running_state", status);
        }
    }

    fn collect_vote(&mut self, ok: &Map<String, Value>) {
        let Some(vote) = ok.get("vote").and_then(Value::as_object) else {
            return;
        };
        if let Some(leader_id) = vote.get("leader_id") {
            self.insert(SECTION_VOTE, "leader_id", leader_id_summary(leader_id));
        }
        if let Some(committed) = vote.get("committed") {
            self.insert(SECTION_VOTE, "committed", committed.clone());
        }
    }

    fn collect_log(&mut self, ok: &Map<String, Value>) {
        self.copy_fields(SECTION_LOG, ok, &["last_log_index", "last_quorum_acked"]);
        for field in ["last_applied", "snapshot", "purged"] {
            if let Some(log_id) = ok.get(field) {
                self.insert(SECTION_LOG, field, log_id_summary(log_id));
            }
        }
        if let Some(millis) = ok.get("millis_since_quorum_ack") {
            self.insert(SECTION_LOG, "millis_since_quorum_ack", millis.clone());
            if let Some(millis) = millis.as_u64()
                && millis > QUORUM_ACK_WARN_MILLIS
            {
                self.warnings.push(format!(
                    "leader not acknowledged by a quorum for {millis} ms; it may be out of sync"
                ));
            }
        }
    }

    fn collect_membership(&mut self, ok: &Map<String, Value>) {
        let Some(config) = ok.get("membership_config").and_then(Value::as_object) else {
            return;
        };
        if let Some(log_id) = config.get("log_id") {
            self.insert(SECTION_MEMBERSHIP, "log_id", log_id_summary(log_id));
        }
        let Some(membership) = config.get("membership").and_then(Value::as_object) else {
            return;
        };
        if let Some(configs) = membership.get("configs") {
            self.insert(SECTION_MEMBERSHIP, "configs", configs.clone());
        }
        if let Some(nodes) = membership.get("nodes").and_then(Value::as_object) {
            let addrs: Map<String, Value> = nodes
                .iter()
                .map(|(id, node)| {
                    let addr = node.get("addr").cloned().unwrap_or_else(|| node.clone());
                    (id.clone(), addr)
                })
                .collect();
            self.insert(SECTION_MEMBERSHIP, "nodes", Value::Object(addrs));
        }
    }
}

/// `{"leader_id":{"term":t,"node_id":n},"index":i}` becomes
/// `{"index":i,"leader_node_id":n,"term":t}`.
fn log_id_summary(log_id: &Value) -> Value {
    let Some(obj) = log_id.as_object() else {
        return log_id.clone();
    };
    let mut out = Map::new();
    if let Some(index) = obj.get("index") {
        out.insert("index".to_string(), index.clone());
    }
    if let Some(Value::Object(leader)) = obj.get("leader_id") {
        out.insert(
            "leader_node_id".to_string(),
            leader.get("node_id").cloned().unwrap_or(Value::Null),
        );
        out.insert(
            "term".to_string(),
            leader.get("term").cloned().unwrap_or(Value::Null),
        );
    }
    Value::Object(out)
}

fn leader_id_summary(leader_id: &Value) -> Value {
    match leader_id.as_object() {
        Some(obj) => json!({
            "node_id": obj.get("node_id").cloned().unwrap_or(Value::Null),
            "term": obj.get("term").cloned().unwrap_or(Value::Null),
        }),
        None => leader_id.clone(),
    }
}
