//! Node feed topics and subscription-id routing.
//!
//! Each `subscribe` request carries a numeric id; the node's ack returns a
//! subscription id, and every later push names only that subscription id.
//! The router keeps both maps for one connection's lifetime.

use std::collections::HashMap;

use txelevator_rpc::{JsonRpcRequest, JsonRpcResponse, RpcId};

/// A node event feed topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    NewTipBlock,
    NewTransaction,
    ProposedTransaction,
    RejectedTransaction,
}

impl Topic {
    pub const ALL: [Self; 4] = [
        Self::NewTipBlock,
        Self::NewTransaction,
        Self::ProposedTransaction,
        Self::RejectedTransaction,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewTipBlock => "new_tip_block",
            Self::NewTransaction => "new_transaction",
            Self::ProposedTransaction => "proposed_transaction",
            Self::RejectedTransaction => "rejected_transaction",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-connection map from request ids and subscription ids to topics.
#[derive(Debug, Default)]
pub struct TopicRouter {
    requested: HashMap<u64, Topic>,
    active: HashMap<String, Topic>,
}

impl TopicRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the previous connection and build one subscribe request per topic.
    pub fn subscribe_requests(&mut self) -> Vec<JsonRpcRequest> {
        self.requested.clear();
        self.active.clear();
        Topic::ALL
            .into_iter()
            .enumerate()
            .map(|(i, topic)| {
                let id = i as u64 + 1;
                self.requested.insert(id, topic);
                JsonRpcRequest::subscribe(id, topic.as_str())
            })
            .collect()
    }

    /// Record the subscription id from a subscribe ack.
    ///
    /// Returns the topic it activates, or `None` for responses we did not ask
    /// for or that carry an error.
    pub fn on_response(&mut self, resp: JsonRpcResponse) -> Option<(Topic, String)> {
        let RpcId::Number(id) = resp.id else {
            return None;
        };
        let topic = self.requested.remove(&id)?;
        let sub_id = match resp.into_result() {
            Ok(serde_json::Value::String(s)) => s,
            Ok(other) => other.to_string(),
            Err(err) => {
                tracing::error!(%topic, error = %err, "node refused subscription");
                return None;
            }
        };
        self.active.insert(sub_id.clone(), topic);
        Some((topic, sub_id))
    }

    /// Topic for a pushed notification's subscription id.
    pub fn route(&self, subscription: &str) -> Option<Topic> {
        self.active.get(subscription).copied()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}
