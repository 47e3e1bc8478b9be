//! HTTP client for the replicated key-value backend.
//!
//! Every logical operation is sent to each member of the caller's membership view and the
//! per-replica outcomes are folded with a first-responder policy: the first usable answer in
//! view order wins and no agreement check is made across replicas.

use std::{sync::Arc, time::Duration};

use anyhow::Context as _;
use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cluster::{AddressTable, MemberId};

pub const WRITE_PATH: &str = "/write";
pub const READ_PATH: &str = "/read";
pub const READ_ALL_PATH: &str = "/read-all";
pub const ADD_LEARNER_PATH: &str = "/add-learner";
pub const CHANGE_MEMBERSHIP_PATH: &str = "/change-membership";
pub const METRICS_PATH: &str = "/metrics";

const LITERAL_OK: &str = "Ok";
const LITERAL_ERR: &str = "Err";

/// Body of a `/write` request, serialized as `{"Put":{..}}` or `{"Del":{..}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum WriteCommand<'a> {
    Put { key: &'a str, value: &'a str },
    Del { key: &'a str },
}

/// Classified reply of a single replica.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicaOutcome {
    /// Transport failure, timeout, non-2xx status, a literal `"Err"` body, or a body the
    /// operation does not accept as success.
    Err,
    /// 2xx with an empty body.
    Empty,
    Body(Value),
}

/// Folded result of one fan-out across the membership view.
#[derive(Debug, Clone, PartialEq)]
pub enum FanOut {
    /// Every replica failed; also the result for an empty view.
    AllFailed,
    /// At least one replica answered but none with a body.
    NoContent,
    Reply(Value),
}

impl FanOut {
    /// Folds outcomes given in view order.
    pub fn from_outcomes(outcomes: impl IntoIterator<Item = ReplicaOutcome>) -> Self {
        let mut any_answered = false;
        for outcome in outcomes {
            match outcome {
                ReplicaOutcome::Err => {}
                ReplicaOutcome::Empty => any_answered = true,
                ReplicaOutcome::Body(body) => return Self::Reply(body),
            }
        }
        if any_answered {
            Self::NoContent
        } else {
            Self::AllFailed
        }
    }

    pub fn into_reply(self) -> Option<Value> {
        match self {
            Self::Reply(body) => Some(body),
            Self::AllFailed | Self::NoContent => None,
        }
    }
}

/// Outcome of a delete, which first checks that the key exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted { previous: String },
    /// The key read back empty; `/write` was never called.
    Absent,
    Failed { previous: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KvPair {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendTimeouts {
    pub request: Duration,
    pub connect: Duration,
}

impl Default for BackendTimeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(3),
            connect: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Method {
    Get,
    Post,
}

/// Decides whether a decoded reply body is a success for the operation that was sent.
/// Bodies it refuses are folded as [`ReplicaOutcome::Err`] so the next replica gets its turn.
type Accept = fn(&Value) -> bool;

#[derive(Debug, Clone)]
struct ReplicaRequest {
    method: Method,
    path: &'static str,
    body: Option<Value>,
    accept: Accept,
}

impl ReplicaRequest {
    fn get(path: &'static str, accept: Accept) -> Self {
        Self {
            method: Method::Get,
            path,
            body: None,
            accept,
        }
    }

    fn post(path: &'static str, body: impl Serialize, accept: Accept) -> anyhow::Result<Self> {
        let body = serde_json::to_value(body).context("encode request body")?;
        Ok(Self {
            method: Method::Post,
            path,
            body: Some(body),
            accept,
        })
    }
}

#[derive(Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    addresses: Arc<AddressTable>,
}

impl BackendClient {
    pub fn try_new(
        addresses: Arc<AddressTable>,
        timeouts: BackendTimeouts,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.request)
            .build()
            .context("build reqwest client")?;
        Ok(Self { client, addresses })
    }

    pub async fn put(&self, view: &[MemberId], key: &str, value: &str) -> bool {
        self.write(view, &WriteCommand::Put { key, value }).await
    }

    /// Reads `key`; an absent key, an empty value and total failure all come back as `""`.
    pub async fn get(&self, view: &[MemberId], key: &str) -> String {
        let req = match ReplicaRequest::post(READ_PATH, key, accept_any) {
            Ok(req) => req,
            Err(err) => {
                warn!(error = %err, "read request not sent");
                return String::new();
            }
        };
        normalize_get(self.fan_out(view, &req).await)
    }

    pub async fn delete(&self, view: &[MemberId], key: &str) -> DeleteOutcome {
        let previous = self.get(view, key).await;
        if previous.is_empty() {
            return DeleteOutcome::Absent;
        }
        if self.write(view, &WriteCommand::Del { key }).await {
            DeleteOutcome::Deleted { previous }
        } else {
            DeleteOutcome::Failed { previous }
        }
    }

    pub async fn list(&self, view: &[MemberId]) -> Vec<KvPair> {
        let req = ReplicaRequest::get(READ_ALL_PATH, accept_any);
        self.fan_out(view, &req)
            .await
            .into_reply()
            .map(normalize_list)
            .unwrap_or_default()
    }

    /// Returns the first reply object in view order that carries an `"Ok"` key.
    pub async fn add_learner(
        &self,
        view: &[MemberId],
        node_id: MemberId,
        api_addr: &str,
    ) -> Option<Value> {
        let req = ReplicaRequest::post(ADD_LEARNER_PATH, (node_id, api_addr), has_ok_key).ok()?;
        self.fan_out(view, &req).await.into_reply()
    }

    pub async fn change_membership(&self, view: &[MemberId], ids: &[MemberId]) -> Option<Value> {
        let req = ReplicaRequest::post(CHANGE_MEMBERSHIP_PATH, ids, has_ok_key).ok()?;
        self.fan_out(view, &req).await.into_reply()
    }

    pub async fn metrics(&self, view: &[MemberId]) -> Option<Value> {
        let req = ReplicaRequest::get(METRICS_PATH, has_ok_key);
        self.fan_out(view, &req).await.into_reply()
    }

    async fn write(&self, view: &[MemberId], cmd: &WriteCommand<'_>) -> bool {
        let req = match ReplicaRequest::post(WRITE_PATH, cmd, is_literal_ok) {
            Ok(req) => req,
            Err(err) => {
                warn!(error = %err, "write request not sent");
                return false;
            }
        };
        matches!(self.fan_out(view, &req).await, FanOut::Reply(_))
    }

    /// Sends `req` to every member concurrently. Outcomes are collected in view order, so the
    /// lowest view index wins when several replicas answer.
    async fn fan_out(&self, view: &[MemberId], req: &ReplicaRequest) -> FanOut {
        let outcomes = join_all(view.iter().map(|id| self.call_one(*id, req))).await;
        let folded = FanOut::from_outcomes(outcomes);
        if folded == FanOut::AllFailed {
            warn!(path = req.path, members = ?view, "all replicas failed");
        }
        folded
    }

    async fn call_one(&self, member_id: MemberId, req: &ReplicaRequest) -> ReplicaOutcome {
        let Some(url) = self.addresses.url(member_id, req.path) else {
            warn!(member_id, "member has no configured address");
            return ReplicaOutcome::Err;
        };
        let builder = match req.method {
            Method::Get => self.client.get(&url),
            Method::Post => {
                let builder = self.client.post(&url);
                match &req.body {
                    Some(body) => builder.json(body),
                    None => builder,
                }
            }
        };

        let resp = match builder.send().await.and_then(|r| r.error_for_status()) {
            Ok(resp) => resp,
            Err(err) => {
                warn!(member_id, url = %url, error = %err, "replica request failed");
                return ReplicaOutcome::Err;
            }
        };
        let bytes = match resp.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(member_id, url = %url, error = %err, "replica response body failed");
                return ReplicaOutcome::Err;
            }
        };
        let outcome = match classify_body(&bytes) {
            ReplicaOutcome::Body(body) if !(req.accept)(&body) => {
                warn!(member_id, url = %url, %body, "replica rejected request");
                ReplicaOutcome::Err
            }
            outcome => outcome,
        };
        debug!(member_id, url = %url, ?outcome, "replica replied");
        outcome
    }
}

/// JSON when the body parses, raw text otherwise; a literal `Err` in either form is a failure.
pub fn classify_body(bytes: &[u8]) -> ReplicaOutcome {
    if bytes.is_empty() {
        return ReplicaOutcome::Empty;
    }
    let body = serde_json::from_slice::<Value>(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()));
    match &body {
        Value::String(s) if s == LITERAL_ERR => ReplicaOutcome::Err,
        _ => ReplicaOutcome::Body(body),
    }
}

pub fn normalize_get(result: FanOut) -> String {
    match result.into_reply() {
        Some(Value::Object(map)) => match map.get(LITERAL_OK) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        },
        Some(Value::String(s)) => s,
        _ => String::new(),
    }
}

/// Accepts `{"Ok": [...]}`, `{"OK": [...]}`, a bare array, or a key/value map in either
/// position. Array items use `k`/`v` (or `key`/`value`) fields.
pub fn normalize_list(body: Value) -> Vec<KvPair> {
    let items = match body {
        Value::Object(mut map) if map.contains_key(LITERAL_OK) || map.contains_key("OK") => map
            .remove(LITERAL_OK)
            .or_else(|| map.remove("OK"))
            .unwrap_or(Value::Null),
        other => other,
    };
    match items {
        Value::Array(items) => items.iter().filter_map(pair_from_item).collect(),
        Value::Object(map) => map
            .into_iter()
            .map(|(key, value)| KvPair {
                key,
                value: value_text(&value),
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn pair_from_item(item: &Value) -> Option<KvPair> {
    let obj = item.as_object()?;
    let key = obj.get("k").or_else(|| obj.get("key"))?;
    let value = obj.get("v").or_else(|| obj.get("value"));
    Some(KvPair {
        key: value_text(key),
        value: value.map(value_text).unwrap_or_default(),
    })
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn accept_any(_: &Value) -> bool {
    true
}

fn is_literal_ok(value: &Value) -> bool {
    value.as_str() == Some(LITERAL_OK)
}

fn has_ok_key(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| obj.contains_key(LITERAL_OK))
}
