//! Command line entry point for the HA provider on Google Cloud.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use halyard_appliance_icontrol::{DEFAULT_BASE_URL, IControlAppliance, IControlApplianceOptions};
use halyard_cluster::{
    DEFAULT_MAX_BACKUPS, DEFAULT_PRIMARY_LABEL, GceProvider, GceProviderOptions, LastUpdateExpiry,
    NoopRevoker, ProviderConfig,
};
use halyard_compute_gce::{GceCompute, GceComputeOptions};
use halyard_failover::{DEFAULT_GROUP_LABEL_KEY, Failover, FailoverConfig, FailoverOptions};
use halyard_messaging::MessageAction;
use halyard_messaging_pubsub::{CloudPubSub, CloudPubSubOptions};
use halyard_metadata::{
    GoogleClient, MetadataClient, MetadataTokenSource, StaticTokenSource, TokenSource,
};
use halyard_object_store_gcs::{GcsObjectStore, GcsObjectStoreOptions};
use tracing::{Level, info, warn};

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Appliance client error
    #[error("appliance: {0}")]
    Appliance(#[from] halyard_appliance_icontrol::Error),

    /// Cluster error
    #[error(transparent)]
    Cluster(#[from] halyard_cluster::Error),

    /// Failover error
    #[error("failover: {0}")]
    Failover(
        #[from] halyard_failover::Error<halyard_appliance_icontrol::Error, halyard_compute_gce::Error>,
    ),

    /// Message body is not JSON
    #[error("invalid message data: {0}")]
    Json(#[from] serde_json::Error),

    /// Metadata server or credential error
    #[error("metadata: {0}")]
    Metadata(#[from] halyard_metadata::Error),
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Cluster name, shared by every member
    #[arg(long, env = "HALYARD_GROUP")]
    group: String,

    /// Managed instance group holding the members
    #[arg(long, env = "HALYARD_INSTANCE_GROUP")]
    instance_group: Option<String>,

    /// Membership is driven by an autoscaler
    #[arg(long, env = "HALYARD_AUTOSCALE")]
    autoscale: bool,

    /// Project; read from the metadata server when unset
    #[arg(long, env = "HALYARD_PROJECT")]
    project: Option<String>,

    /// Region; read from the metadata server when unset
    #[arg(long, env = "HALYARD_REGION")]
    region: Option<String>,

    /// Bucket holding cluster state
    #[arg(long, env = "HALYARD_BUCKET")]
    bucket: String,

    /// This instance's name; read from the metadata server when unset
    #[arg(long, env = "HALYARD_INSTANCE_ID")]
    instance_id: Option<String>,

    /// `key=value` label selecting members outside the instance group
    #[arg(long, env = "HALYARD_EXTERNAL_TAG")]
    external_tag: Option<String>,

    /// Prior backups kept when a new one is stored
    #[arg(long, default_value_t = DEFAULT_MAX_BACKUPS, env = "HALYARD_MAX_BACKUPS")]
    max_backups: usize,

    /// Label key marking the primary's VM
    #[arg(long, default_value = DEFAULT_PRIMARY_LABEL, env = "HALYARD_PRIMARY_LABEL")]
    primary_label: String,

    /// Access token to use instead of the metadata server's
    #[arg(long, env = "HALYARD_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Log level
    #[arg(long, default_value_t = Level::INFO, env = "HALYARD_LOG_LEVEL")]
    log_level: Level,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Reconcile membership, elect the primary and start the role transition
    Reconcile {
        /// Treat every visible member as running a compatible version
        #[arg(long)]
        assume_version_ok: bool,
    },

    /// Move this device's floating addresses onto this instance
    Failover {
        /// Device management URL
        #[arg(long, default_value = DEFAULT_BASE_URL, env = "HALYARD_DEVICE_URL")]
        device_url: String,

        /// Device admin user
        #[arg(long, default_value = "admin", env = "HALYARD_DEVICE_USER")]
        device_user: String,

        /// Device admin password
        #[arg(long, env = "HALYARD_DEVICE_PASSWORD", hide_env_values = true)]
        device_password: String,

        /// Verify the device's TLS certificate
        #[arg(long)]
        verify_device_cert: bool,

        /// Label key shared by the cluster's VMs; the value is the group name
        #[arg(long, default_value = DEFAULT_GROUP_LABEL_KEY)]
        group_label: String,
    },

    /// Publish a control message
    SendMessage {
        /// What the message asks for
        #[arg(long, value_enum)]
        action: Action,

        /// Recipient; every member when unset
        #[arg(long)]
        to: Option<String>,

        /// JSON body
        #[arg(long, default_value = "{}")]
        data: String,
    },

    /// Pull pending control messages
    GetMessages {
        /// Actions to collect
        #[arg(long, value_enum, required = true)]
        action: Vec<Action>,

        /// Recipient to filter for; this instance when unset
        #[arg(long)]
        to: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Action {
    Join,
    SyncComplete,
}

impl From<Action> for MessageAction {
    fn from(action: Action) -> Self {
        match action {
            Action::Join => Self::Join,
            Action::SyncComplete => Self::SyncComplete,
        }
    }
}

/// Resolved environment shared by every command.
struct Environment {
    client: GoogleClient,
    instance_id: String,
    project: String,
    region: String,
}

async fn environment(args: &Args) -> Result<Environment, Error> {
    let metadata = MetadataClient::new();

    let tokens: Arc<dyn TokenSource> = match &args.access_token {
        Some(token) => Arc::new(StaticTokenSource::new(token.clone())),
        None => Arc::new(MetadataTokenSource::new(metadata.clone())),
    };
    let client = GoogleClient::new(tokens)?;

    let project = match &args.project {
        Some(project) => project.clone(),
        None => metadata.project_id().await?,
    };
    let region = match &args.region {
        Some(region) => region.clone(),
        None => metadata.region().await?,
    };
    let instance_id = match &args.instance_id {
        Some(instance_id) => instance_id.clone(),
        None => metadata.instance_name().await?,
    };

    Ok(Environment {
        client,
        instance_id,
        project,
        region,
    })
}

fn compute(env: &Environment) -> GceCompute {
    GceCompute::new(GceComputeOptions {
        client: env.client.clone(),
        project: env.project.clone(),
        region: env.region.clone(),
    })
}

fn provider(
    args: &Args,
    env: &Environment,
) -> Result<GceProvider<GcsObjectStore, CloudPubSub, GceCompute>, Error> {
    let config = ProviderConfig {
        group: args.group.clone(),
        instance_group: args.instance_group.clone(),
        autoscale: args.autoscale,
        instance_id: env.instance_id.clone(),
        external_tag: args.external_tag.clone(),
        max_backups: args.max_backups,
        primary_label: args.primary_label.clone(),
        ..ProviderConfig::default()
    };

    Ok(GceProvider::new(GceProviderOptions {
        config,
        compute: compute(env),
        expiry: Arc::new(LastUpdateExpiry::default()),
        pubsub: CloudPubSub::new(CloudPubSubOptions {
            client: env.client.clone(),
            metadata: MetadataClient::new(),
            project: Some(env.project.clone()),
        }),
        revoker: Arc::new(NoopRevoker),
        store: GcsObjectStore::new(GcsObjectStoreOptions {
            bucket: args.bucket.clone(),
            client: env.client.clone(),
        }),
    })?)
}

async fn reconcile(args: &Args, env: &Environment, assume_version_ok: bool) -> Result<(), Error> {
    let provider = provider(args, env)?;

    let mut instances = provider.get_instances().await?;
    if assume_version_ok {
        for record in instances.values_mut().filter(|record| record.provider_visible) {
            record.version_ok = true;
        }
    }

    let Some(primary) = provider.elect_primary(&instances) else {
        warn!("no instance is eligible to be primary");
        return Ok(());
    };
    info!("elected {primary}");

    let transition = provider.primary_elected(&primary);

    if let Some(record) = instances.get(&env.instance_id) {
        let mut record = record.clone();
        record.is_primary = record.instance_id == primary;
        provider.put_instance(record).await?;
    }

    let relabelled = provider.tag_primary_instance(&primary, &instances).await;
    if !relabelled.is_empty() {
        info!("relabelled {}", relabelled.join(", "));
    }

    let report = transition.wait().await;
    match report.provisioning {
        Ok(channels) => info!("listening on {}", channels.subscription),
        Err(e) => warn!("channel provisioning failed: {e}"),
    }
    match report.demoted {
        Ok(demoted) if !demoted.is_empty() => info!("demoted {}", demoted.join(", ")),
        Ok(_) => {}
        Err(e) => warn!("demotion failed: {e}"),
    }

    println!("{primary}");
    Ok(())
}

async fn failover(args: &Args, env: &Environment, command: &Command) -> Result<(), Error> {
    let Command::Failover {
        device_url,
        device_user,
        device_password,
        verify_device_cert,
        group_label,
    } = command
    else {
        return Ok(());
    };

    let appliance = IControlAppliance::new(IControlApplianceOptions {
        base_url: device_url.clone(),
        username: device_user.clone(),
        password: device_password.clone(),
        accept_invalid_certs: !verify_device_cert,
    })?;

    let failover = Failover::new(FailoverOptions {
        appliance,
        compute: compute(env),
        config: FailoverConfig {
            instance_name: env.instance_id.clone(),
            group_label_key: group_label.clone(),
            group_label_value: args.group.clone(),
            ..FailoverConfig::default()
        },
    })?;

    let report = failover.run().await?;
    for nic in &report.disassociated {
        println!("disassociated {nic}");
    }
    for nic in &report.associated {
        println!("associated {nic}");
    }
    for rule in &report.rules {
        println!("retargeted {}", rule.name);
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_writer(std::io::stderr)
        .init();

    let env = environment(&args).await?;

    match &args.command {
        Command::Reconcile { assume_version_ok } => {
            reconcile(&args, &env, *assume_version_ok).await?;
        }
        command @ Command::Failover { .. } => failover(&args, &env, command).await?,
        Command::SendMessage { action, to, data } => {
            let data = serde_json::from_str(data)?;
            provider(&args, &env)?
                .send_message((*action).into(), to.as_deref(), data)
                .await?;
        }
        Command::GetMessages { action, to } => {
            let actions: Vec<MessageAction> = action.iter().copied().map(Into::into).collect();
            let to = to.as_deref().unwrap_or(&env.instance_id);

            for message in provider(&args, &env)?.get_messages(&actions, to).await? {
                println!("{}", serde_json::to_string(&message)?);
            }
        }
    }

    Ok(())
}
