//! Typed wrappers for the gateway methods the console uses.
//!
//! The method set is open and declared by the gateway at handshake time;
//! anything not wrapped here goes through [`GatewayClient::rpc`]. Response
//! types keep unknown fields in `extra` so newer gateways stay readable.

use {
    agentfield_protocol::methods,
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value, json},
};

use crate::{GatewayClient, Result, RpcOptions};

// ── Agents ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentsList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default)]
    pub agents: Vec<AgentSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ── Sessions ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_count: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `sessions.list` answers either with a bare array or `{sessions: [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum SessionsPayload {
    Bare(Vec<SessionSummary>),
    Wrapped { sessions: Vec<SessionSummary> },
}

// ── Chat ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSend {
    pub session_key: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

impl ChatSend {
    pub fn new(session_key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            session_key: session_key.into(),
            message: message.into(),
            agent_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatAck {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    #[serde(default)]
    pub messages: Vec<Value>,
}

// ── Approvals ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Approved,
    Denied,
}

// ── Nodes ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSummary {
    #[serde(alias = "id")]
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default)]
    pub connected: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NodesPayload {
    Bare(Vec<NodeSummary>),
    Wrapped { nodes: Vec<NodeSummary> },
}

// ── Wrappers ─────────────────────────────────────────────────────────────────

impl GatewayClient {
    pub async fn health(&self) -> Result<Value> {
        self.rpc(methods::HEALTH, Value::Null, RpcOptions::default())
            .await
    }

    pub async fn status(&self) -> Result<Value> {
        self.rpc(methods::STATUS, Value::Null, RpcOptions::default())
            .await
    }

    pub async fn agents_list(&self) -> Result<AgentsList> {
        self.call(methods::AGENTS_LIST, json!({}), RpcOptions::default())
            .await
    }

    pub async fn sessions_list(&self) -> Result<Vec<SessionSummary>> {
        let payload: SessionsPayload = self
            .call(methods::SESSIONS_LIST, json!({}), RpcOptions::default())
            .await?;
        Ok(match payload {
            SessionsPayload::Bare(sessions) | SessionsPayload::Wrapped { sessions } => sessions,
        })
    }

    /// Send a chat message. Always carries an idempotency key so a timed-out
    /// send can be retried without posting twice; pass one in `options` to
    /// control it.
    pub async fn chat_send(&self, request: &ChatSend, options: RpcOptions) -> Result<ChatAck> {
        let options = if options.idempotency_key.is_some() {
            options
        } else {
            options.idempotent()
        };
        self.call(methods::CHAT_SEND, serde_json::to_value(request)?, options)
            .await
    }

    pub async fn chat_history(&self, session_key: &str, limit: Option<u32>) -> Result<ChatHistory> {
        let mut params = json!({ "sessionKey": session_key });
        if let Some(limit) = limit {
            params["limit"] = json!(limit);
        }
        self.call(methods::CHAT_HISTORY, params, RpcOptions::default())
            .await
    }

    pub async fn chat_abort(&self, session_key: &str, run_id: Option<&str>) -> Result<Value> {
        let mut params = json!({ "sessionKey": session_key });
        if let Some(run_id) = run_id {
            params["runId"] = json!(run_id);
        }
        self.rpc(methods::CHAT_ABORT, params, RpcOptions::default())
            .await
    }

    pub async fn exec_approval_resolve(
        &self,
        request_id: &str,
        decision: ApprovalDecision,
    ) -> Result<Value> {
        let params = json!({ "requestId": request_id, "decision": decision });
        self.rpc(
            methods::EXEC_APPROVAL_RESOLVE,
            params,
            RpcOptions::default().idempotency_key(format!("approval:{request_id}")),
        )
        .await
    }

    pub async fn node_list(&self) -> Result<Vec<NodeSummary>> {
        let payload: NodesPayload = self
            .call(methods::NODE_LIST, json!({}), RpcOptions::default())
            .await?;
        Ok(match payload {
            NodesPayload::Bare(nodes) | NodesPayload::Wrapped { nodes } => nodes,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn agents_list_parses_camel_case() {
        let list: AgentsList = serde_json::from_value(json!({
            "defaultId": "a1",
            "mainKey": "m1",
            "scope": "org",
            "agents": [{ "id": "a1", "name": "Ops", "model": "m" }]
        }))
        .unwrap();
        assert_eq!(list.default_id.as_deref(), Some("a1"));
        assert_eq!(list.main_key.as_deref(), Some("m1"));
        assert_eq!(list.agents[0].id, "a1");
        assert_eq!(list.agents[0].extra["model"], "m");
    }

    #[test]
    fn sessions_payload_accepts_both_shapes() {
        let bare: SessionsPayload =
            serde_json::from_value(json!([{ "key": "main", "messageCount": 3 }])).unwrap();
        let wrapped: SessionsPayload =
            serde_json::from_value(json!({ "sessions": [{ "key": "main" }] })).unwrap();
        for payload in [bare, wrapped] {
            let sessions = match payload {
                SessionsPayload::Bare(s) | SessionsPayload::Wrapped { sessions: s } => s,
            };
            assert_eq!(sessions[0].key, "main");
        }
    }

    #[test]
    fn chat_send_wire_shape() {
        let value = serde_json::to_value(ChatSend::new("main", "hello")).unwrap();
        assert_eq!(value, json!({ "sessionKey": "main", "message": "hello" }));
    }

    #[test]
    fn node_summary_accepts_id_alias() {
        let node: NodeSummary =
            serde_json::from_value(json!({ "id": "n1", "connected": true })).unwrap();
        assert_eq!(node.node_id, "n1");
        assert!(node.connected);
    }

    #[test]
    fn approval_decision_is_lowercase() {
        assert_eq!(json!(ApprovalDecision::Denied), json!("denied"));
    }
}
