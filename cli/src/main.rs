mod config;
mod error;
mod http_client;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Method;
use serde_json::json;
use std::io::Write;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use http_client::Client;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8080";

#[derive(Parser, Debug)]
#[command(name = "ipamctl")]
#[command(about = "CLI for the IPv4 subnet and address pool service", long_about = None)]
struct Cli {
    /// Server base URL (falls back to the config file)
    #[arg(long, env = "IPAMCTL_SERVER")]
    server: Option<String>,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage subnets
    #[command(subcommand)]
    Subnet(SubnetCmd),
    /// Manage pool addresses
    #[command(subcommand)]
    Addr(AddrCmd),
    /// Manage local CLI configuration
    #[command(subcommand)]
    Config(ConfigCmd),
}

#[derive(Subcommand, Debug)]
enum SubnetCmd {
    /// Create a subnet
    Create {
        #[arg(long)]
        router: String,
        #[arg(long)]
        cidr: String,
        /// public, private, cgnat or ipv6
        #[arg(long)]
        kind: String,
        /// dynamic or static
        #[arg(long, default_value = "dynamic")]
        allocation: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Explicit gateway address inside the subnet
        #[arg(long)]
        gateway: Option<String>,
    },
    /// List subnets
    List,
    /// Show one subnet
    Show { id: String },
    /// Replace a subnet's fields (re-validates and re-checks overlap)
    Update {
        id: String,
        #[arg(long)]
        router: String,
        #[arg(long)]
        cidr: String,
        #[arg(long)]
        kind: String,
        #[arg(long, default_value = "dynamic")]
        allocation: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        gateway: Option<String>,
    },
    /// Delete a subnet and its address pool
    Delete { id: String },
    /// Check a CIDR against the existing inventory without persisting
    CheckOverlap {
        cidr: String,
        /// Subnet id to ignore (edit-in-place)
        #[arg(long)]
        exclude: Option<String>,
    },
    /// Generate (or rebuild) a subnet's address pool
    Generate {
        id: String,
        /// Destroy and rebuild an existing pool
        #[arg(long)]
        regenerate: bool,
        /// Skip the interactive confirmation
        #[arg(long)]
        yes: bool,
    },
    /// Show assignment counts for a subnet
    Utilization { id: String },
}

#[derive(Subcommand, Debug)]
enum AddrCmd {
    /// List a subnet's addresses
    List {
        #[arg(long)]
        subnet: String,
        /// available, assigned or reserved
        #[arg(long)]
        status: Option<String>,
        /// Substring of the address or the bound customer's name
        #[arg(long)]
        search: Option<String>,
    },
    /// Bind an available address to a customer/service
    Assign {
        id: String,
        #[arg(long)]
        customer: String,
        #[arg(long)]
        service: String,
    },
    /// Return an assigned address to the pool
    Release { id: String },
}

#[derive(Subcommand, Debug)]
enum ConfigCmd {
    /// Persist the server base URL
    SetServer { url: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = config::default_config_path();

    if let Command::Config(ConfigCmd::SetServer { url }) = &cli.command {
        let mut cfg = config::Config::load(&config_path)?;
        cfg.base_url = Some(url.clone());
        cfg.save(&config_path)?;
        println!("Server set to {}", url);
        return Ok(());
    }

    let base_url = match cli.server {
        Some(url) => url,
        None => config::Config::load(&config_path)?
            .base_url
            .unwrap_or_else(|| DEFAULT_SERVER.to_string()),
    };

    let client = Client::new(&base_url, Duration::from_secs(30), 2)?;

    match cli.command {
        Command::Subnet(cmd) => run_subnet(&client, cmd).await,
        Command::Addr(cmd) => run_addr(&client, cmd).await,
        Command::Config(_) => unreachable!("handled above"),
    }
}

async fn run_subnet(client: &Client, cmd: SubnetCmd) -> Result<()> {
    match cmd {
        SubnetCmd::Create {
            router,
            cidr,
            kind,
            allocation,
            name,
            description,
            gateway,
        } => {
            client
                .send_json(
                    Method::POST,
                    "/api/subnets",
                    Some(json!({
                        "router_id": router,
                        "cidr": cidr,
                        "kind": kind,
                        "allocation": allocation,
                        "name": name,
                        "description": description,
                        "gateway": gateway,
                    })),
                )
                .await
        }
        SubnetCmd::List => client.send_json(Method::GET, "/api/subnets", None).await,
        SubnetCmd::Show { id } => {
            client
                .send_json(Method::GET, &format!("/api/subnets/{}", id), None)
                .await
        }
        SubnetCmd::Update {
            id,
            router,
            cidr,
            kind,
            allocation,
            name,
            description,
            gateway,
        } => {
            client
                .send_json(
                    Method::PUT,
                    &format!("/api/subnets/{}", id),
                    Some(json!({
                        "router_id": router,
                        "cidr": cidr,
                        "kind": kind,
                        "allocation": allocation,
                        "name": name,
                        "description": description,
                        "gateway": gateway,
                    })),
                )
                .await
        }
        SubnetCmd::Delete { id } => {
            client
                .send_json(Method::DELETE, &format!("/api/subnets/{}", id), None)
                .await
        }
        SubnetCmd::CheckOverlap { cidr, exclude } => {
            client
                .send_json(
                    Method::POST,
                    "/api/subnets/check-overlap",
                    Some(json!({ "cidr": cidr, "exclude_id": exclude })),
                )
                .await
        }
        SubnetCmd::Generate {
            id,
            regenerate,
            yes,
        } => {
            if regenerate && !yes {
                confirm_regenerate(client, &id).await?;
            }
            client
                .send_json(
                    Method::POST,
                    &format!("/api/subnets/{}/generate-ips", id),
                    Some(json!({ "regenerate": regenerate })),
                )
                .await
        }
        SubnetCmd::Utilization { id } => {
            client
                .send_json(Method::GET, &format!("/api/subnets/{}/utilization", id), None)
                .await
        }
    }
}

/// Destructive rebuilds require the operator to type the subnet id back
/// after seeing what the rebuild will destroy.
async fn confirm_regenerate(client: &Client, id: &str) -> Result<()> {
    let util: serde_json::Value = client
        .get_json(&format!("/api/subnets/{}/utilization", id))
        .await?;

    eprintln!("Rebuilding the pool for subnet {} deletes every address row:", id);
    eprintln!(
        "  total: {}, assigned: {}, free: {}",
        util["total"], util["assigned"], util["free"]
    );
    eprint!("Type the subnet id to confirm: ");
    std::io::stderr().flush().ok();

    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("Failed to read confirmation")?;
    if line.trim() != id {
        anyhow::bail!("Confirmation did not match the subnet id; aborting");
    }
    Ok(())
}

async fn run_addr(client: &Client, cmd: AddrCmd) -> Result<()> {
    match cmd {
        AddrCmd::List {
            subnet,
            status,
            search,
        } => {
            let mut query: Vec<(&str, &str)> = vec![("subnet_id", subnet.as_str())];
            if let Some(status) = &status {
                query.push(("status", status));
            }
            if let Some(search) = &search {
                query.push(("search", search));
            }
            client
                .send_json_query(Method::GET, "/api/ip-addresses", &query)
                .await
        }
        AddrCmd::Assign {
            id,
            customer,
            service,
        } => {
            client
                .send_json(
                    Method::POST,
                    &format!("/api/ip-addresses/{}/assign", id),
                    Some(json!({ "customer_id": customer, "service_id": service })),
                )
                .await
        }
        AddrCmd::Release { id } => {
            client
                .send_json(
                    Method::POST,
                    &format!("/api/ip-addresses/{}/release", id),
                    None,
                )
                .await
        }
    }
}
