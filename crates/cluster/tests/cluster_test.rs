//! End to end cluster passes against the in-memory backends.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeDelta, TimeZone, Utc};
use halyard_cluster::{
    BoxError, Error, GceProvider, GceProviderOptions, InstanceRecord, LastUpdateExpiry,
    LicenseRevoker, NoopRevoker, ProviderConfig,
};
use halyard_compute::{GroupMember, NetworkInterface, Vm, VmStatus};
use halyard_compute_mock::{MockCompute, MutationEvent};
use halyard_messaging::{MessageAction, PubSub};
use halyard_messaging_memory::MemoryPubSub;
use halyard_object_store::{ObjectStore, ObjectValue};
use halyard_object_store::keys::{instance_key, public_key_key};
use halyard_object_store_memory::MemoryObjectStore;
use pretty_assertions::assert_eq;
use serde_json::json;

const GROUP: &str = "bigip-ha";
const INSTANCE_GROUP: &str = "bigip-mig";
const ZONE: &str = "us-west1-a";

#[derive(Clone, Default)]
struct RecordingRevoker {
    revoked: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl LicenseRevoker for RecordingRevoker {
    async fn revoke(&self, record: &InstanceRecord) -> Result<(), BoxError> {
        self.revoked
            .lock()
            .unwrap()
            .push(record.instance_id.clone());
        Ok(())
    }
}

struct Harness {
    compute: MockCompute,
    pubsub: MemoryPubSub,
    store: MemoryObjectStore,
}

impl Harness {
    fn new() -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        Self {
            compute: MockCompute::new(),
            pubsub: MemoryPubSub::default(),
            store: MemoryObjectStore::new(),
        }
    }

    fn provider(
        &self,
        instance_id: &str,
        revoker: Arc<dyn LicenseRevoker>,
    ) -> GceProvider<MemoryObjectStore, MemoryPubSub, MockCompute> {
        self.provider_with(
            ProviderConfig {
                group: GROUP.to_string(),
                instance_group: Some(INSTANCE_GROUP.to_string()),
                instance_id: instance_id.to_string(),
                ..ProviderConfig::default()
            },
            revoker,
        )
    }

    fn provider_with(
        &self,
        config: ProviderConfig,
        revoker: Arc<dyn LicenseRevoker>,
    ) -> GceProvider<MemoryObjectStore, MemoryPubSub, MockCompute> {
        GceProvider::new(GceProviderOptions {
            config,
            compute: self.compute.clone(),
            expiry: Arc::new(LastUpdateExpiry::default()),
            pubsub: self.pubsub.clone(),
            revoker,
            store: self.store.clone(),
        })
        .unwrap()
    }

    async fn add_member(&self, name: &str, ip: &str) {
        self.compute.add_vm(vm(name, ip)).await;
        self.compute
            .add_group_member(
                INSTANCE_GROUP,
                GroupMember {
                    name: name.to_string(),
                    zone: ZONE.to_string(),
                    status: VmStatus::Running,
                },
            )
            .await;
    }

    async fn persist(&self, record: InstanceRecord) {
        self.store
            .put(instance_key(&record.instance_id), ObjectValue::json(&record).unwrap())
            .await
            .unwrap();
    }
}

fn vm(name: &str, ip: &str) -> Vm {
    Vm {
        name: name.to_string(),
        zone: ZONE.to_string(),
        status: Some(VmStatus::Running),
        network_interfaces: vec![NetworkInterface {
            name: "nic0".to_string(),
            network_ip: Some(ip.to_string()),
            ..NetworkInterface::default()
        }],
        self_link: format!("projects/p/zones/{ZONE}/instances/{name}"),
        ..Vm::default()
    }
}

fn record(id: &str, ip: &str) -> InstanceRecord {
    InstanceRecord {
        instance_id: id.to_string(),
        private_ip: Some(ip.to_string()),
        zone: Some(ZONE.to_string()),
        version_ok: true,
        last_update: Some(Utc::now()),
        ..InstanceRecord::default()
    }
}

#[tokio::test]
async fn test_reconcile_deletes_stale_records_and_keys() {
    let harness = Harness::new();
    harness.add_member("bigip-1", "10.0.0.5").await;
    harness.persist(record("bigip-1", "10.0.0.5")).await;
    harness.persist(record("bigip-gone", "10.0.0.2")).await;
    harness
        .store
        .put(public_key_key("bigip-gone"), ObjectValue::Bytes(Bytes::from_static(b"key")))
        .await
        .unwrap();

    let revoker = RecordingRevoker::default();
    let provider = harness.provider("bigip-1", Arc::new(revoker.clone()));

    let instances = provider.get_instances().await.unwrap();

    assert_eq!(instances.keys().collect::<Vec<_>>(), vec!["bigip-1"]);
    assert!(instances["bigip-1"].provider_visible);
    assert!(!harness.store.contains("instances/bigip-gone").await);
    assert!(!harness.store.contains("public_keys/bigip-gone").await);
    assert_eq!(*revoker.revoked.lock().unwrap(), vec!["bigip-gone"]);
}

#[tokio::test]
async fn test_reconcile_keeps_unexpired_invisible_primary() {
    let harness = Harness::new();
    harness.add_member("bigip-2", "10.0.0.6").await;
    harness
        .persist(InstanceRecord {
            is_primary: true,
            ..record("bigip-1", "10.0.0.5")
        })
        .await;
    harness
        .persist(InstanceRecord {
            is_primary: true,
            last_update: Some(Utc::now() - TimeDelta::hours(1)),
            ..record("bigip-old", "10.0.0.4")
        })
        .await;

    let provider = harness.provider("bigip-2", Arc::new(NoopRevoker));
    let instances = provider.get_instances().await.unwrap();

    let primary = &instances["bigip-1"];
    assert!(primary.is_primary);
    assert!(!primary.provider_visible);
    assert!(!instances.contains_key("bigip-old"));
    assert!(harness.store.contains("instances/bigip-1").await);

    // The invisible primary is not eligible, the fresh member has no
    // version check yet.
    assert_eq!(provider.elect_primary(&instances), None);
}

#[tokio::test]
async fn test_reconcile_synthesizes_new_members() {
    let harness = Harness::new();
    harness.add_member("bigip-1", "10.0.0.5").await;
    harness.add_member("bigip-no-nic", "10.0.0.9").await;
    harness
        .compute
        .add_vm(Vm {
            network_interfaces: Vec::new(),
            ..vm("bigip-no-nic", "10.0.0.9")
        })
        .await;
    harness
        .compute
        .add_group_member(
            INSTANCE_GROUP,
            GroupMember {
                name: "bigip-stopped".to_string(),
                zone: ZONE.to_string(),
                status: VmStatus::Terminated,
            },
        )
        .await;

    let provider = harness.provider("bigip-1", Arc::new(NoopRevoker));
    let instances = provider.get_instances().await.unwrap();

    let fresh = &instances["bigip-1"];
    assert_eq!(fresh.private_ip.as_deref(), Some("10.0.0.5"));
    assert_eq!(fresh.hostname.as_deref(), Some("bigip-1"));
    assert!(fresh.provider_visible);
    assert!(!fresh.is_primary);
    assert!(!fresh.version_ok);
    assert!(!instances.contains_key("bigip-stopped"));
    assert!(!instances.contains_key("bigip-no-nic"));
}

#[tokio::test]
async fn test_reconcile_empty_cluster() {
    let harness = Harness::new();
    let provider = harness.provider("bigip-1", Arc::new(NoopRevoker));

    assert!(provider.get_instances().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reconcile_inventory_failure_is_fatal() {
    let harness = Harness::new();
    harness.add_member("bigip-1", "10.0.0.5").await;
    harness.persist(record("bigip-gone", "10.0.0.2")).await;
    harness.compute.fail_inventory(true).await;

    let provider = harness.provider("bigip-1", Arc::new(NoopRevoker));

    assert_matches!(provider.get_instances().await, Err(Error::Compute(_)));
    assert!(harness.store.contains("instances/bigip-gone").await);
}

#[tokio::test]
async fn test_external_instance_wins_election() {
    let harness = Harness::new();
    harness.add_member("bigip-1", "10.0.0.5").await;
    harness.persist(record("bigip-1", "10.0.0.5")).await;

    let mut external = vm("bigip-byol", "10.0.9.9");
    external.labels = BTreeMap::from([("pool".to_string(), "byol".to_string())]);
    harness.compute.add_vm(external).await;
    harness
        .persist(record("bigip-byol", "10.0.9.9"))
        .await;

    let provider = harness.provider_with(
        ProviderConfig {
            group: GROUP.to_string(),
            instance_group: Some(INSTANCE_GROUP.to_string()),
            instance_id: "bigip-1".to_string(),
            external_tag: Some("pool=byol".to_string()),
            ..ProviderConfig::default()
        },
        Arc::new(NoopRevoker),
    );
    let instances = provider.get_instances().await.unwrap();

    assert!(instances["bigip-byol"].external);
    assert!(instances["bigip-byol"].provider_visible);
    assert_eq!(provider.elect_primary(&instances).as_deref(), Some("bigip-byol"));
}

#[tokio::test]
async fn test_external_flag_follows_current_labels() {
    let harness = Harness::new();
    harness.add_member("bigip-1", "10.0.0.9").await;
    harness.add_member("bigip-2", "10.0.0.5").await;
    harness
        .persist(InstanceRecord {
            external: true,
            ..record("bigip-1", "10.0.0.9")
        })
        .await;
    harness.persist(record("bigip-2", "10.0.0.5")).await;

    let untagged = harness.provider("bigip-2", Arc::new(NoopRevoker));
    let instances = untagged.get_instances().await.unwrap();

    assert!(!instances["bigip-1"].external);
    assert_eq!(untagged.elect_primary(&instances).as_deref(), Some("bigip-2"));

    let tagged = harness.provider_with(
        ProviderConfig {
            group: GROUP.to_string(),
            instance_group: Some(INSTANCE_GROUP.to_string()),
            instance_id: "bigip-2".to_string(),
            external_tag: Some("pool=byol".to_string()),
            ..ProviderConfig::default()
        },
        Arc::new(NoopRevoker),
    );
    let instances = tagged.get_instances().await.unwrap();

    assert!(!instances["bigip-1"].external);
    assert_eq!(tagged.elect_primary(&instances).as_deref(), Some("bigip-2"));
}

#[tokio::test]
async fn test_unpersisted_external_instance_is_synthesized() {
    let harness = Harness::new();
    harness.add_member("bigip-1", "10.0.0.5").await;
    harness.persist(record("bigip-1", "10.0.0.5")).await;

    let mut external = vm("bigip-byol", "10.0.9.9");
    external.labels = BTreeMap::from([("pool".to_string(), "byol".to_string())]);
    harness.compute.add_vm(external).await;

    let provider = harness.provider_with(
        ProviderConfig {
            group: GROUP.to_string(),
            instance_group: Some(INSTANCE_GROUP.to_string()),
            instance_id: "bigip-1".to_string(),
            external_tag: Some("pool=byol".to_string()),
            ..ProviderConfig::default()
        },
        Arc::new(NoopRevoker),
    );
    let instances = provider.get_instances().await.unwrap();

    let byol = &instances["bigip-byol"];
    assert!(byol.external);
    assert!(byol.provider_visible);
    assert!(!byol.is_primary);
    assert_eq!(byol.private_ip.as_deref(), Some("10.0.9.9"));
    assert_eq!(instances.len(), 2);
}

#[tokio::test]
async fn test_failed_stale_delete_does_not_fail_reconcile() {
    let harness = Harness::new();
    harness.add_member("bigip-1", "10.0.0.5").await;
    harness.persist(record("bigip-1", "10.0.0.5")).await;
    harness.persist(record("bigip-gone", "10.0.0.2")).await;
    harness
        .store
        .put(public_key_key("bigip-gone"), ObjectValue::Bytes(Bytes::from_static(b"key")))
        .await
        .unwrap();
    harness
        .store
        .fail_deletes_for(instance_key("bigip-gone"))
        .await;

    let revoker = RecordingRevoker::default();
    let provider = harness.provider("bigip-1", Arc::new(revoker.clone()));

    let instances = provider.get_instances().await.unwrap();

    assert_eq!(instances.keys().collect::<Vec<_>>(), vec!["bigip-1"]);
    assert!(harness.store.contains("instances/bigip-gone").await);
    assert!(!harness.store.contains("public_keys/bigip-gone").await);
    assert_eq!(*revoker.revoked.lock().unwrap(), vec!["bigip-gone"]);
}

#[tokio::test]
async fn test_stale_primaries_demoted_exactly_once() {
    let harness = Harness::new();
    for (id, ip, primary) in [
        ("bigip-1", "10.0.0.5", true),
        ("bigip-2", "10.0.0.6", true),
        ("bigip-3", "10.0.0.3", false),
    ] {
        harness
            .persist(InstanceRecord {
                is_primary: primary,
                ..record(id, ip)
            })
            .await;
    }

    let provider = harness.provider("bigip-3", Arc::new(NoopRevoker));

    let report = provider.primary_elected("bigip-3").wait().await;
    assert_eq!(report.demoted.unwrap(), vec!["bigip-1", "bigip-2"]);

    let records = provider.store().get_instances().await.unwrap();
    assert!(records.values().all(|record| !record.is_primary));

    let report = provider.primary_elected("bigip-3").wait().await;
    assert!(report.demoted.unwrap().is_empty());
}

#[tokio::test]
async fn test_channels_provisioned_per_role() {
    let harness = Harness::new();
    let primary = harness.provider("bigip-1", Arc::new(NoopRevoker));
    let secondary = harness.provider("bigip-2", Arc::new(NoopRevoker));

    let report = primary.primary_elected("bigip-1").wait().await;
    let channels = report.provisioning.unwrap();
    assert_eq!(
        channels.created_topics,
        vec![format!("JOIN_{GROUP}"), format!("SYNC_COMPLETE_{GROUP}")]
    );
    assert_eq!(channels.subscription, "JOIN_SUB_bigip-1");
    assert!(channels.subscription_created);

    let report = secondary.primary_elected("bigip-1").wait().await;
    let channels = report.provisioning.unwrap();
    assert!(channels.created_topics.is_empty());
    assert_eq!(channels.subscription, "SYNC_COMPLETE_SUB_bigip-2");

    let report = primary.primary_elected("bigip-1").wait().await;
    assert!(!report.provisioning.unwrap().subscription_created);

    let subscriptions = harness
        .pubsub
        .get_subscriptions(&format!("JOIN_{GROUP}"))
        .await
        .unwrap();
    assert_eq!(
        subscriptions,
        vec!["projects/local/subscriptions/JOIN_SUB_bigip-1"]
    );
}

#[tokio::test]
async fn test_join_and_sync_messages() {
    let harness = Harness::new();
    let primary = harness.provider("bigip-1", Arc::new(NoopRevoker));
    let joiner = harness.provider("bigip-2", Arc::new(NoopRevoker));

    // Nothing provisioned yet.
    assert!(
        joiner
            .get_messages(&[MessageAction::SyncComplete], "bigip-2")
            .await
            .unwrap()
            .is_empty()
    );

    primary.primary_elected("bigip-1").wait().await.provisioning.unwrap();
    joiner.primary_elected("bigip-1").wait().await.provisioning.unwrap();

    joiner
        .send_message(
            MessageAction::Join,
            Some("bigip-1"),
            json!({"host": "10.0.0.6"}),
        )
        .await
        .unwrap();

    let messages = primary
        .get_messages(&[MessageAction::Join], "bigip-1")
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].from_instance_id, "bigip-2");
    assert_eq!(messages[0].data, json!({"host": "10.0.0.6"}));

    // Pulled messages are consumed.
    assert!(
        primary
            .get_messages(&[MessageAction::Join], "bigip-1")
            .await
            .unwrap()
            .is_empty()
    );

    primary
        .send_message(MessageAction::SyncComplete, Some("bigip-3"), json!({}))
        .await
        .unwrap();
    primary
        .send_message(MessageAction::SyncComplete, None, json!({"done": true}))
        .await
        .unwrap();

    let messages = joiner
        .get_messages(&[MessageAction::SyncComplete], "bigip-2")
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].to_instance_id, None);
    assert_eq!(harness.pubsub.unacknowledged().await, 0);
}

#[tokio::test]
async fn test_primary_label_moves() {
    let harness = Harness::new();
    harness.add_member("bigip-1", "10.0.0.5").await;
    harness.add_member("bigip-2", "10.0.0.6").await;

    let mut old_primary = vm("bigip-2", "10.0.0.6");
    old_primary.labels = BTreeMap::from([("ha-primary".to_string(), "true".to_string())]);
    harness.compute.add_vm(old_primary).await;

    let provider = harness.provider("bigip-1", Arc::new(NoopRevoker));
    let instances = provider.get_instances().await.unwrap();

    let mut changed = provider.tag_primary_instance("bigip-1", &instances).await;
    changed.sort();
    assert_eq!(changed, vec!["bigip-1", "bigip-2"]);

    let labels = harness.compute.vm("bigip-1").await.unwrap().labels;
    assert_eq!(labels.get("ha-primary").map(String::as_str), Some("true"));
    assert!(harness.compute.vm("bigip-2").await.unwrap().labels.is_empty());

    // Already right: nothing is written.
    let events = harness.compute.events().await.len();
    assert!(provider.tag_primary_instance("bigip-1", &instances).await.is_empty());
    assert_eq!(harness.compute.events().await.len(), events);
    assert!(matches!(
        harness.compute.events().await.last(),
        Some(MutationEvent::Labels { .. })
    ));
}

#[tokio::test]
async fn test_primary_label_moves_to_external_primary() {
    let harness = Harness::new();
    harness.add_member("bigip-1", "10.0.0.5").await;

    let mut old_primary = vm("bigip-1", "10.0.0.5");
    old_primary.labels = BTreeMap::from([("ha-primary".to_string(), "true".to_string())]);
    harness.compute.add_vm(old_primary).await;

    let pool = BTreeMap::from([("pool".to_string(), "byol".to_string())]);
    let mut byol = vm("bigip-byol", "10.0.9.9");
    byol.labels.clone_from(&pool);
    harness.compute.add_vm(byol).await;
    let mut other = vm("bigip-byol-2", "10.0.9.10");
    other.labels.clone_from(&pool);
    harness.compute.add_vm(other).await;

    let provider = harness.provider_with(
        ProviderConfig {
            group: GROUP.to_string(),
            instance_group: Some(INSTANCE_GROUP.to_string()),
            instance_id: "bigip-1".to_string(),
            external_tag: Some("pool=byol".to_string()),
            ..ProviderConfig::default()
        },
        Arc::new(NoopRevoker),
    );
    let instances = provider.get_instances().await.unwrap();
    assert!(instances["bigip-byol"].external);

    let mut changed = provider.tag_primary_instance("bigip-byol", &instances).await;
    changed.sort();
    assert_eq!(changed, vec!["bigip-1", "bigip-byol"]);
    assert!(
        !harness
            .compute
            .vm("bigip-byol-2")
            .await
            .unwrap()
            .labels
            .contains_key("ha-primary")
    );

    let labels = harness.compute.vm("bigip-byol").await.unwrap().labels;
    assert_eq!(labels.get("ha-primary").map(String::as_str), Some("true"));
    assert!(!harness.compute.vm("bigip-1").await.unwrap().labels.contains_key("ha-primary"));
}

#[tokio::test]
async fn test_put_instance_stamps_last_update() {
    let harness = Harness::new();
    let provider = harness.provider("bigip-1", Arc::new(NoopRevoker));

    let written = provider
        .put_instance(InstanceRecord {
            last_update: None,
            ..record("bigip-1", "10.0.0.5")
        })
        .await
        .unwrap();

    assert!(written.last_update.is_some());
    assert_eq!(
        provider.get_instance("bigip-1").await.unwrap(),
        Some(written)
    );
    assert_eq!(provider.get_instance("bigip-9").await.unwrap(), None);
}

#[tokio::test]
async fn test_backup_retention() {
    let harness = Harness::new();
    for (day, name) in [(1, "123"), (2, "234"), (3, "345"), (4, "456")] {
        harness
            .store
            .put_at(
                format!("backup/ucsAutosave_{name}.ucs"),
                ObjectValue::Bytes(Bytes::from_static(b"ucs")),
                Utc.with_ymd_and_hms(2019, 1, day, 0, 0, 0).unwrap(),
            )
            .await;
    }

    let provider = harness.provider_with(
        ProviderConfig {
            group: GROUP.to_string(),
            instance_id: "bigip-1".to_string(),
            max_backups: 2,
            ..ProviderConfig::default()
        },
        Arc::new(NoopRevoker),
    );

    let mut deleted = provider
        .store_backup("ucsAutosave_567.ucs", Bytes::from_static(b"new"))
        .await
        .unwrap();
    deleted.sort();

    assert_eq!(
        deleted,
        vec![
            "backup/ucsAutosave_123.ucs",
            "backup/ucsAutosave_234.ucs"
        ]
    );
    assert_eq!(harness.store.names().await.len(), 3);
    assert_eq!(
        provider.latest_backup().await.unwrap().map(|info| info.name),
        Some("backup/ucsAutosave_567.ucs".to_string())
    );
}

#[tokio::test]
async fn test_keys_and_credentials() {
    let harness = Harness::new();
    let provider = harness.provider("bigip-1", Arc::new(NoopRevoker));

    assert_eq!(provider.get_public_key("bigip-1").await.unwrap(), None);
    provider
        .put_public_key(Bytes::from_static(b"ssh-rsa AAAA"))
        .await
        .unwrap();
    assert_eq!(
        provider.get_public_key("bigip-1").await.unwrap(),
        Some(Bytes::from_static(b"ssh-rsa AAAA"))
    );

    assert_eq!(provider.get_primary_credentials().await.unwrap(), None);
    provider
        .put_primary_credentials(json!({"username": "admin"}))
        .await
        .unwrap();
    assert_eq!(
        provider.get_primary_credentials().await.unwrap(),
        Some(json!({"username": "admin"}))
    );
}
