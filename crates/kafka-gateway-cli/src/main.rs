//! Kafka Cluster Gateway CLI
//!
//! Drives the gateway's topic, ACL and status operations against one target
//! cluster per invocation. Results are printed as YAML; error kinds map to
//! distinct exit codes.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kafka_gateway_core::acl::PatternKind;
use kafka_gateway_core::config::LoggingConfig;
use kafka_gateway_core::{
    AccessRequest, AclChange, ClusterTarget, ErrorKind, Gateway, GatewayConfig, GatewayError,
    SecurityProtocol, TopicRequest,
};

/// Administrative gateway for Kafka clusters.
#[derive(Parser)]
#[command(name = "kafka-gateway")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "KAFKA_GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Comma-separated bootstrap hosts of the target.
    #[arg(long, env = "KAFKA_GATEWAY_HOSTS", global = true, default_value = "localhost:9092")]
    hosts: String,

    /// Security protocol, e.g. PLAINTEXT or SASL_SSL-SCRAMMECHANISM.
    #[arg(long, global = true, default_value = "PLAINTEXT")]
    protocol: String,

    /// Cluster identity used to look up credentials.
    #[arg(long, global = true, default_value = "default")]
    cluster: String,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report whether the target is online.
    Status {
        /// kafka, schemaregistry or kafkaconnect.
        #[arg(long, default_value = "kafka")]
        kind: String,
    },
    /// Topic lifecycle.
    #[command(subcommand)]
    Topics(TopicCommand),
    /// Producer and consumer access grants.
    #[command(subcommand)]
    Acls(AclCommand),
}

#[derive(Subcommand)]
enum TopicCommand {
    /// List topics with partition and replication counts.
    List,
    /// Create a topic.
    Create(TopicShape),
    /// Change a topic's partition count. Shrinking recreates the topic.
    Update(TopicShape),
    /// Delete a topic.
    Delete { name: String },
}

#[derive(Args)]
struct TopicShape {
    name: String,
    #[arg(short, long)]
    partitions: i32,
    #[arg(short, long, default_value_t = 1)]
    replication_factor: i16,
}

#[derive(Subcommand)]
enum AclCommand {
    /// List READ and WRITE grants.
    List,
    /// Grant producer or consumer access.
    Grant(AccessArgs),
    /// Revoke producer or consumer access.
    Revoke(AccessArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum Role {
    Producer,
    Consumer,
}

#[derive(Args)]
struct AccessArgs {
    #[arg(value_enum)]
    role: Role,
    /// Topic name, or prefix with --prefixed.
    topic: String,
    /// Grant to every principal connecting from this address.
    #[arg(long, conflicts_with = "identity")]
    ip: Option<String>,
    /// Grant to this principal from any host.
    #[arg(long)]
    identity: Option<String>,
    #[arg(long)]
    transactional_id: Option<String>,
    #[arg(long)]
    consumer_group: Option<String>,
    /// Match resources by prefix instead of exact name.
    #[arg(long)]
    prefixed: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    match try_main(Cli::parse()) {
        Ok(code) => Ok(code),
        Err(e) => match failure_status(&e) {
            Some(status) => Ok(ExitCode::from(status)),
            None => Err(e),
        },
    }
}

/// Exit status for errors inside the gateway taxonomy, reporting them on stderr.
fn failure_status(e: &anyhow::Error) -> Option<u8> {
    let err = e.downcast_ref::<GatewayError>()?;
    eprintln!("error [{}]: {}", err.kind(), err.message());
    Some(exit_status(err.kind()))
}

fn try_main(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => GatewayConfig::from_file(path).map_err(GatewayError::from)?,
        None => GatewayConfig::default(),
    };

    let log_config = match cli.verbose {
        0 => config.logging.clone(),
        1 => LoggingConfig {
            level: "debug".to_string(),
            ..config.logging.clone()
        },
        _ => LoggingConfig {
            level: "trace".to_string(),
            ..config.logging.clone()
        },
    };
    setup_tracing(&log_config);

    let protocol: SecurityProtocol = cli.protocol.parse()?;
    let target = ClusterTarget::new(&cli.hosts, protocol, cli.cluster.as_str());
    let gateway = Gateway::new(config)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        protocol = %protocol,
        cluster = %cli.cluster,
        "starting kafka gateway"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let outcome = run(&gateway, cli.command, &target).await;
        gateway.shutdown().await;
        outcome
    })
}

/// `RUST_LOG` wins when set and valid; otherwise the configured level applies.
fn env_filter(rust_log: Option<&str>, level: &str) -> EnvFilter {
    let from_env = rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok());
    if let Some(filter) = from_env {
        return filter;
    }
    let level = level.to_lowercase();
    let level = match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => level.as_str(),
        _ => "info",
    };
    EnvFilter::new(level)
}

fn setup_tracing(config: &LoggingConfig) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = env_filter(rust_log.as_deref(), &config.level);

    let subscriber = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout stays parseable.
    if config.json {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

async fn run(gateway: &Gateway, command: Command, target: &ClusterTarget) -> anyhow::Result<ExitCode> {
    match command {
        Command::Status { kind } => {
            let status = gateway.health().status(&kind, target).await;
            print_yaml(&status)?;
            Ok(if status.is_online() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(exit_status(ErrorKind::Unreachable))
            })
        }
        Command::Topics(command) => run_topics(gateway, command, target).await,
        Command::Acls(command) => run_acls(gateway, command, target).await,
    }
}

async fn run_topics(gateway: &Gateway, command: TopicCommand, target: &ClusterTarget) -> anyhow::Result<ExitCode> {
    let topics = gateway.topics();
    match command {
        TopicCommand::List => print_yaml(&topics.list_topics(target).await?)?,
        TopicCommand::Create(shape) => {
            let request = TopicRequest::new(shape.name, shape.partitions, shape.replication_factor)?;
            topics.create_topic(&request, target).await?;
            print_yaml(&Done::new("created", request.name()))?;
        }
        TopicCommand::Update(shape) => {
            let request = TopicRequest::new(shape.name, shape.partitions, shape.replication_factor)?;
            let update = topics.update_topic(&request, target).await?;
            if update.is_data_losing() {
                eprintln!("warning: topic '{}' was deleted and recreated; its data is gone", request.name());
            }
            print_yaml(&update)?;
        }
        TopicCommand::Delete { name } => {
            topics.delete_topic(&name, target).await?;
            print_yaml(&Done::new("deleted", &name))?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_acls(gateway: &Gateway, command: AclCommand, target: &ClusterTarget) -> anyhow::Result<ExitCode> {
    let acls = gateway.acls();
    let (args, change) = match command {
        AclCommand::List => {
            print_yaml(&acls.list_acls(target).await?)?;
            return Ok(ExitCode::SUCCESS);
        }
        AclCommand::Grant(args) => (args, AclChange::Create),
        AclCommand::Revoke(args) => (args, AclChange::Delete),
    };

    let mut builder = match args.role {
        Role::Producer => AccessRequest::producer(target.clone(), args.topic),
        Role::Consumer => AccessRequest::consumer(target.clone(), args.topic),
    }
    .change(change);
    if let Some(ip) = args.ip {
        builder = builder.ip(ip);
    }
    if let Some(identity) = args.identity {
        builder = builder.identity(identity);
    }
    if let Some(txn) = args.transactional_id {
        builder = builder.transactional_id(txn);
    }
    if let Some(group) = args.consumer_group {
        builder = builder.consumer_group(group);
    }
    if args.prefixed {
        builder = builder.pattern(PatternKind::Prefixed);
    }

    let outcome = acls.reconcile(&builder.build()?).await?;
    print_yaml(&outcome)?;
    Ok(ExitCode::SUCCESS)
}

#[derive(Serialize)]
struct Done<'a> {
    result: &'static str,
    topic: &'a str,
}

impl<'a> Done<'a> {
    fn new(result: &'static str, topic: &'a str) -> Self {
        Self { result, topic }
    }
}

fn print_yaml<T: Serialize>(value: &T) -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(value)?);
    Ok(())
}

/// 0 is success and 1 is reserved for failures outside the taxonomy.
fn exit_status(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::Invalid => 2,
        ErrorKind::Conflict => 3,
        ErrorKind::NotFound => 4,
        ErrorKind::Timeout => 5,
        ErrorKind::Unreachable => 6,
        ErrorKind::PartialFailure => 7,
        ErrorKind::ConfigMissing => 8,
    }
}
