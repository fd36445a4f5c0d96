use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a cluster control message asks for.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum MessageAction {
    /// A new instance asks the primary to add it to the cluster.
    #[serde(rename = "ADD_TO_CLUSTER")]
    Join,

    /// The primary tells a joining instance that config sync finished.
    #[serde(rename = "SYNC_COMPLETE")]
    SyncComplete,
}

/// A control message exchanged between cluster members.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMessage {
    /// What the message asks for.
    pub action: MessageAction,

    /// Recipient, or `None` for every member.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_instance_id: Option<String>,

    /// Sender.
    pub from_instance_id: String,

    /// Action specific body.
    #[serde(default)]
    pub data: Value,
}

impl ClusterMessage {
    /// Whether `instance_id` should act on this message.
    #[must_use]
    pub fn is_for(&self, instance_id: &str) -> bool {
        self.to_instance_id
            .as_deref()
            .is_none_or(|to| to == instance_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_wire_format() {
        let message = ClusterMessage {
            action: MessageAction::Join,
            to_instance_id: Some("b".to_string()),
            from_instance_id: "a".to_string(),
            data: json!({"host": "10.0.0.3"}),
        };

        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "action": "ADD_TO_CLUSTER",
                "toInstanceId": "b",
                "fromInstanceId": "a",
                "data": {"host": "10.0.0.3"}
            })
        );
    }

    #[test]
    fn test_addressing() {
        let mut message: ClusterMessage = serde_json::from_value(json!({
            "action": "SYNC_COMPLETE",
            "fromInstanceId": "a"
        }))
        .unwrap();

        assert!(message.is_for("anyone"));

        message.to_instance_id = Some("b".to_string());
        assert!(message.is_for("b"));
        assert!(!message.is_for("c"));
    }
}
