use crate::MessageAction;

/// Prefix of the topic new members announce themselves on.
pub const JOIN_TOPIC_PREFIX: &str = "JOIN_";

/// Prefix of the topic the primary confirms syncs on.
pub const SYNC_COMPLETE_TOPIC_PREFIX: &str = "SYNC_COMPLETE_";

/// Prefix of the primary's subscription to the join topic.
pub const JOIN_SUBSCRIPTION_PREFIX: &str = "JOIN_SUB_";

/// Prefix of a member's subscription to the sync-complete topic.
pub const SYNC_COMPLETE_SUBSCRIPTION_PREFIX: &str = "SYNC_COMPLETE_SUB_";

/// Topic names of one cluster.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Channels {
    /// `JOIN_<group>`.
    pub join_topic: String,

    /// `SYNC_COMPLETE_<group>`.
    pub sync_complete_topic: String,
}

impl Channels {
    /// Channel names for the cluster called `group`.
    #[must_use]
    pub fn for_group(group: &str) -> Self {
        Self {
            join_topic: format!("{JOIN_TOPIC_PREFIX}{group}"),
            sync_complete_topic: format!("{SYNC_COMPLETE_TOPIC_PREFIX}{group}"),
        }
    }

    /// Topic carrying messages of `action`.
    #[must_use]
    pub fn topic_for(&self, action: MessageAction) -> &str {
        match action {
            MessageAction::Join => &self.join_topic,
            MessageAction::SyncComplete => &self.sync_complete_topic,
        }
    }

    /// Subscription through which `instance_id` receives `action` messages.
    #[must_use]
    pub fn subscription_for(action: MessageAction, instance_id: &str) -> String {
        match action {
            MessageAction::Join => format!("{JOIN_SUBSCRIPTION_PREFIX}{instance_id}"),
            MessageAction::SyncComplete => {
                format!("{SYNC_COMPLETE_SUBSCRIPTION_PREFIX}{instance_id}")
            }
        }
    }
}

/// Whether `existing` (short or fully qualified names) contains `name`.
#[must_use]
pub fn contains_resource(existing: &[String], name: &str) -> bool {
    let suffix = format!("/{name}");

    existing
        .iter()
        .any(|candidate| candidate == name || candidate.ends_with(&suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        let channels = Channels::for_group("prod");

        assert_eq!(channels.topic_for(MessageAction::Join), "JOIN_prod");
        assert_eq!(
            channels.topic_for(MessageAction::SyncComplete),
            "SYNC_COMPLETE_prod"
        );
        assert_eq!(
            Channels::subscription_for(MessageAction::Join, "a"),
            "JOIN_SUB_a"
        );
        assert_eq!(
            Channels::subscription_for(MessageAction::SyncComplete, "a"),
            "SYNC_COMPLETE_SUB_a"
        );
    }

    #[test]
    fn test_contains_resource() {
        let topics = vec![
            "projects/p/topics/JOIN_prod".to_string(),
            "projects/p/topics/XJOIN_test".to_string(),
        ];

        assert!(contains_resource(&topics, "JOIN_prod"));
        assert!(!contains_resource(&topics, "JOIN_test"));
        assert!(!contains_resource(&topics, "SYNC_COMPLETE_prod"));
    }
}
