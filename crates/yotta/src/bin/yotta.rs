//! Yotta CLI - launch, inspect and tear down GPU pod clusters.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use yotta::config::{ClientConfig, Credentials, DEFAULT_ENDPOINT};
use yotta::{
    CloudType, ClusterReport, ClusterState, LaunchRequest, PodApi, PodLifecycleManager,
    ProvisionerError, SshKeyProvisioner, YottaClient,
};

/// Yotta CLI - Provision GPU pods for AI/ML workloads.
#[derive(Parser)]
#[command(name = "yotta")]
#[command(about = "Launch and manage Yotta GPU pod clusters")]
struct Cli {
    /// Credentials file with `userId=` and `apikey=` lines.
    #[arg(long, env = "YOTTA_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// SDK API base URL.
    #[arg(long, env = "YOTTA_API_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Enable verbose logging.
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum CloudTypeArg {
    Secure,
    Community,
}

impl From<CloudTypeArg> for CloudType {
    fn from(arg: CloudTypeArg) -> Self {
        match arg {
            CloudTypeArg::Secure => CloudType::Secure,
            CloudTypeArg::Community => CloudType::Community,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configured API key.
    Check,

    /// Launch a cluster (no-op if it already has active pods).
    Launch {
        /// Cluster label.
        #[arg(long)]
        name: String,

        /// Container image.
        #[arg(long)]
        image: String,

        /// Instance type such as `1x_L4_SECURE` (overrides GPU flags).
        #[arg(long)]
        instance_type: Option<String>,

        /// GPU model, e.g. `NVIDIA_L4_24G`.
        #[arg(long, required_unless_present = "instance_type")]
        gpu_type: Option<String>,

        /// GPUs per pod.
        #[arg(long, default_value = "1")]
        gpu_count: u32,

        /// Capacity pool.
        #[arg(long, value_enum, default_value = "secure")]
        cloud_type: CloudTypeArg,

        /// Number of pods.
        #[arg(long, default_value = "1")]
        nodes: u32,

        /// Disk size in GB.
        #[arg(long, default_value = "100")]
        disk_size: u32,

        /// Remote provisioning timeout in seconds.
        #[arg(long, default_value = "600")]
        timeout: u64,

        /// Region or zone.
        #[arg(long)]
        region: Option<String>,

        /// Extra TCP ports to expose (comma-separated).
        #[arg(long, value_delimiter = ',')]
        ports: Vec<u16>,

        /// SSH login user.
        #[arg(long)]
        ssh_user: Option<String>,

        /// Skip SSH key provisioning.
        #[arg(long, default_value = "false")]
        no_ssh: bool,
    },

    /// Show the status of a cluster.
    Status {
        /// Cluster label.
        #[arg(long)]
        name: String,

        /// Print the report as JSON.
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Poll a cluster until it is UP.
    Wait {
        /// Cluster label.
        #[arg(long)]
        name: String,

        /// Timeout in seconds.
        #[arg(long, default_value = "600")]
        timeout: u64,

        /// Seconds between polls.
        #[arg(long, default_value = "10")]
        interval: u64,
    },

    /// Destroy every pod of a cluster.
    Destroy {
        /// Cluster label.
        #[arg(long)]
        name: String,

        /// Skip confirmation prompt.
        #[arg(long, short = 'y', default_value = "false")]
        yes: bool,
    },

    /// Pause a cluster (not supported on Yotta).
    Pause {
        /// Cluster label.
        #[arg(long)]
        name: String,
    },

    /// Create the local SSH keypair if needed and register it.
    EnsureKey {
        /// Private key path (defaults to `~/.yotta/sky-key`).
        #[arg(long)]
        key: Option<PathBuf>,
    },
}

#[tokio::main]
#[allow(clippy::too_many_lines)]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let credentials = match &cli.credentials {
        Some(path) => Credentials::load(path),
        None => Credentials::load_default(),
    }
    .context("Failed to load Yotta credentials")?;

    let config = ClientConfig::new(credentials).with_endpoint(cli.endpoint.clone());
    let client = YottaClient::new(config).context("Failed to create Yotta client")?;

    match cli.command {
        Commands::Check => {
            client.check_credentials().await?;
            println!("\n✅ API key is valid");
        }

        Commands::Launch {
            name,
            image,
            instance_type,
            gpu_type,
            gpu_count,
            cloud_type,
            nodes,
            disk_size,
            timeout,
            region,
            ports,
            ssh_user,
            no_ssh,
        } => {
            let mut request = match (instance_type, gpu_type) {
                (Some(instance_type), _) => {
                    LaunchRequest::from_instance_type(&name, &instance_type, &image)?
                }
                (None, Some(gpu_type)) => {
                    let mut request = LaunchRequest::new(&name, gpu_type, gpu_count, &image);
                    request.cloud_type = cloud_type.into();
                    request
                }
                (None, None) => bail!("either --instance-type or --gpu-type is required"),
            };
            request.node_count = nodes;
            request.disk_size_gb = disk_size;
            request.timeout_seconds = timeout;
            request.region = region;
            request.ports = ports;
            request.ssh_user = ssh_user;

            let mut manager = PodLifecycleManager::new(client);
            if !no_ssh {
                manager = manager.with_ssh_keys(SshKeyProvisioner::default_location()?);
            }

            info!(cluster = %name, "Launching cluster");
            match manager.launch(request).await {
                Ok(outcome) => {
                    if outcome.reused {
                        println!("\nℹ️  Cluster {name} already has active pods, nothing created");
                    } else {
                        println!("\n✅ Cluster {name} launched");
                    }
                    for pod in &outcome.pods {
                        println!("   {:<24} {:<28} {}", pod.pod_id, pod.name, pod.remote_state);
                    }
                    println!("\n💡 Run `yotta wait --name {name}` to wait for it to be ready");
                }
                Err(ProvisionerError::PartialLaunch(failure)) => {
                    println!("\n⚠️  Cluster {name} was only partially launched");
                    for pod in &failure.succeeded {
                        println!("   created  {:<24} {}", pod.pod_id, pod.name);
                    }
                    for failed in &failure.failed {
                        println!("   failed   {:<24} {}", failed.node_name, failed.reason);
                    }
                    for skipped in &failure.not_attempted {
                        println!("   skipped  {skipped}");
                    }
                    println!("\n💡 Run `yotta destroy --name {name} --yes` to clean up");
                    return Err(ProvisionerError::PartialLaunch(failure).into());
                }
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Status { name, json } => {
            let report = PodLifecycleManager::new(client).query(&name).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }

        Commands::Wait {
            name,
            timeout,
            interval,
        } => {
            println!("⏳ Waiting for cluster {name} to be UP...");
            let manager = PodLifecycleManager::new(client);
            let start = Instant::now();
            loop {
                let report = manager.query(&name).await?;
                match report.state {
                    ClusterState::Up => {
                        println!("\n✅ Cluster {name} is UP");
                        print_report(&report);
                        break;
                    }
                    ClusterState::Stopped => {
                        print_report(&report);
                        bail!("cluster {name} is STOPPED; launch a new cluster instead");
                    }
                    ClusterState::Absent => bail!("cluster {name} has no pods"),
                    ClusterState::Init => {}
                }

                if start.elapsed() > Duration::from_secs(timeout) {
                    bail!("cluster {name} not UP after {timeout} seconds");
                }
                tokio::time::sleep(Duration::from_secs(interval)).await;
            }
        }

        Commands::Destroy { name, yes } => {
            if !yes {
                println!("⚠️  Are you sure you want to destroy cluster {name}?");
                println!("   This action cannot be undone.");
                println!("   Use --yes to skip this prompt.");
                return Ok(());
            }

            let outcome = PodLifecycleManager::new(client).destroy(&name).await?;
            if outcome.destroyed.is_empty() {
                println!("\n✅ Cluster {name} has no pods left");
            } else {
                println!(
                    "\n✅ Cluster {name} destroyed ({} pods)",
                    outcome.destroyed.len()
                );
            }
        }

        Commands::Pause { name } => {
            PodLifecycleManager::new(client).pause(&name).await?;
        }

        Commands::EnsureKey { key } => {
            let provisioner = match key {
                Some(path) => SshKeyProvisioner::new(path),
                None => SshKeyProvisioner::default_location()?,
            };
            let key = provisioner.ensure_key(&client).await?;
            println!("\n🔑 SSH key ready");
            println!("   Private:     {}", key.private_key_path.display());
            println!("   Public:      {}", key.public_key_path.display());
            println!("   Fingerprint: {}", key.record.public_key_fingerprint);
        }
    }

    Ok(())
}

fn print_report(report: &ClusterReport) {
    println!(
        "\n🖥️  Cluster {}: {}",
        report.cluster_name_label, report.state
    );
    if report.pods.is_empty() {
        return;
    }

    println!("\n{:<24} {:<28} {:<14} {:<20}", "ID", "NAME", "STATE", "SSH");
    println!("{}", "-".repeat(88));
    for pod in &report.pods {
        let ssh = pod
            .ssh_port()
            .and_then(|p| Some(format!("{}:{}", p.host.as_deref()?, p.proxy_port?)))
            .unwrap_or_default();
        println!(
            "{:<24} {:<28} {:<14} {:<20}",
            pod.pod_id,
            pod.name,
            pod.remote_state.to_string(),
            ssh
        );
    }
    for warning in &report.warnings {
        println!("⚠️  {warning}");
    }
}
