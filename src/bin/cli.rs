use anyhow::{bail, Context};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Parser, Subcommand};
use mcphub::models::{
    DispatchRequest, DispatchResponse, HeartbeatRequest, InstanceStatus, RegisterRequest,
    RegisterResponse, ServiceInstance, ServiceType,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "hub-cli")]
#[command(about = "CLI tool for operating an MCP hub", long_about = None)]
struct Cli {
    /// Base URL of the hub
    #[arg(long, env = "HUB_URL", default_value = "http://127.0.0.1:8080", global = true)]
    hub: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a backend instance
    Register {
        /// Service type (reasoning, memory, personality, knowledge)
        #[arg(short = 't', long)]
        service_type: ServiceType,

        /// Address the hub dispatches to (host:port or base URL)
        #[arg(short, long)]
        address: String,

        /// Capability the instance serves; repeat for several
        #[arg(short, long = "capability")]
        capabilities: Vec<String>,
    },

    /// Send a heartbeat for an instance
    Heartbeat {
        instance_id: Uuid,

        /// Requests currently in flight on the instance
        #[arg(long)]
        load: Option<u32>,

        /// Recent response time in milliseconds
        #[arg(long)]
        latency_ms: Option<f64>,

        /// Self-reported status (healthy, degraded, unreachable)
        #[arg(long)]
        status: Option<String>,
    },

    /// Remove an instance from the hub
    Deregister { instance_id: Uuid },

    /// List registered instances
    List {
        /// Only instances advertising this capability
        #[arg(short, long)]
        capability: Option<String>,
    },

    /// Route a request through the hub
    Dispatch {
        capability: String,

        /// JSON payload
        #[arg(short, long, conflicts_with = "raw_file")]
        payload: Option<String>,

        /// File whose bytes are sent as a raw payload
        #[arg(long)]
        raw_file: Option<PathBuf>,

        /// Per-request timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> anyhow::Result<T> {
    let status = response.status();
    let body = response.text().await.context("Failed to read hub response")?;

    if !status.is_success() {
        bail!("Hub returned {}: {}", status, body);
    }

    serde_json::from_str(&body).with_context(|| format!("Unexpected hub response: {}", body))
}

fn parse_status(raw: &str) -> anyhow::Result<InstanceStatus> {
    serde_json::from_value(Value::String(raw.to_ascii_lowercase()))
        .with_context(|| format!("Unknown status: {}", raw))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let hub = cli.hub.trim_end_matches('/').to_string();

    match cli.command {
        Commands::Register {
            service_type,
            address,
            capabilities,
        } => {
            let request = RegisterRequest {
                service_type,
                address,
                capabilities: capabilities.into_iter().collect(),
            };
            let response = client
                .post(format!("{}/register", hub))
                .json(&request)
                .send()
                .await
                .context("Failed to reach hub")?;
            let registered: RegisterResponse = read_json(response).await?;
            println!("Registered instance {}", registered.instance_id);
            println!(
                "Send heartbeats every {}ms",
                registered.heartbeat_interval_ms
            );
        }

        Commands::Heartbeat {
            instance_id,
            load,
            latency_ms,
            status,
        } => {
            let request = HeartbeatRequest {
                load,
                latency_ms,
                status: status.as_deref().map(parse_status).transpose()?,
            };
            let response = client
                .post(format!("{}/heartbeat/{}", hub, instance_id))
                .json(&request)
                .send()
                .await
                .context("Failed to reach hub")?;
            let instance: ServiceInstance = read_json(response).await?;
            println!(
                "Instance {} is {} (load {}, latency {:.1}ms)",
                instance.instance_id,
                instance.status,
                instance.current_load,
                instance.recent_latency_ms
            );
        }

        Commands::Deregister { instance_id } => {
            let response = client
                .delete(format!("{}/instances/{}", hub, instance_id))
                .send()
                .await
                .context("Failed to reach hub")?;
            if !response.status().is_success() {
                bail!("Hub returned {}", response.status());
            }
            println!("Deregistered instance {}", instance_id);
        }

        Commands::List { capability } => {
            let mut request = client.get(format!("{}/instances", hub));
            if let Some(capability) = &capability {
                request = request.query(&[("capability", capability)]);
            }
            let response = request.send().await.context("Failed to reach hub")?;
            let instances: Vec<ServiceInstance> = read_json(response).await?;

            if instances.is_empty() {
                println!("No instances registered");
                return Ok(());
            }

            println!(
                "{:<38} {:<12} {:<12} {:>5} {:>10}  ADDRESS",
                "ID", "TYPE", "STATUS", "LOAD", "LATENCY"
            );
            for instance in instances {
                println!(
                    "{:<38} {:<12} {:<12} {:>5} {:>8.1}ms  {}",
                    instance.instance_id,
                    instance.service_type,
                    instance.status,
                    instance.current_load,
                    instance.recent_latency_ms,
                    instance.address
                );
            }
        }

        Commands::Dispatch {
            capability,
            payload,
            raw_file,
            timeout_ms,
        } => {
            let payload = payload
                .map(|p| serde_json::from_str::<Value>(&p).context("Payload is not valid JSON"))
                .transpose()?;
            let raw_payload = match raw_file {
                Some(path) => {
                    let bytes = tokio::fs::read(&path)
                        .await
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    Some(STANDARD.encode(bytes))
                }
                None => None,
            };

            let request = DispatchRequest {
                capability,
                payload,
                raw_payload,
                timeout_ms,
            };
            let response = client
                .post(format!("{}/dispatch", hub))
                .json(&request)
                .send()
                .await
                .context("Failed to reach hub")?;
            let dispatched: DispatchResponse = read_json(response).await?;
            print_json(&dispatched)?;

            if dispatched.degraded {
                eprintln!(
                    "Degraded response: {}",
                    dispatched
                        .reason
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "unknown".to_string())
                );
            }
        }
    }

    Ok(())
}
