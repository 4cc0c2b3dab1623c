//! NBI command line
//!
//! Drives the intent engine and the controller-facing services from a shell:
//! - intents against mounted NETCONF devices
//! - mount, unmount and status reconciliation
//! - topology and capability sync
//! - OpenFlow rule lifecycle
//!
//! Every command prints one JSON envelope `{success, code, message, data}`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::debug;

use nbi_core::{ManagementProtocol, OsType, Settings, Vendor};
use nbi_drivers::Params;
use nbi_network::FlowRequest;
use nbi_store::{DeviceRecord, DeviceStore, FlowFilter, FlowKey, FlowStatus, DEFAULT_TABLE};

mod app;

use app::App;

#[derive(Parser, Debug)]
#[command(name = "nbi")]
#[command(about = "Vendor-neutral intents and OpenFlow rules over an SDN controller")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Override NBI_DATABASE_URL
    #[arg(long, global = true)]
    database: Option<String>,

    /// Override ODL_BASE_URL
    #[arg(long, global = true)]
    controller: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute one intent against a device
    Intent {
        /// Dotted intent name, e.g. interface.set_ipv4
        intent: String,
        node_id: String,
        /// Parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,
    },
    /// List supported intents by category
    Intents,
    /// Store a device record
    Register {
        name: String,
        #[arg(long)]
        vendor: String,
        #[arg(long, default_value = "netconf")]
        protocol: String,
        #[arg(long)]
        os_type: Option<String>,
        #[arg(long)]
        node_id: Option<String>,
        #[arg(long)]
        ip: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    /// List stored devices
    Devices,
    /// Mount a stored device on the controller
    Mount {
        device_id: i64,
        /// Poll until connected or failed
        #[arg(long)]
        wait: bool,
    },
    Unmount {
        device_id: i64,
    },
    /// Re-read live connection status and persist it
    Status {
        device_id: i64,
    },
    /// Reconcile device records against the NETCONF topology
    Sync,
    /// Reconcile OpenFlow switches against the inventory
    SyncOpenflow,
    /// Sync and show the capability cache
    Capabilities {
        /// Refresh and show only this node
        #[arg(long)]
        node: Option<String>,
        /// With --node, check for this YANG module
        #[arg(long, requires = "node")]
        module: Option<String>,
    },
    /// Explain a controller failure for an intent
    Diagnose {
        node_id: String,
        intent: String,
        #[arg(long)]
        vendor: String,
        /// Error text returned by the controller
        #[arg(long, default_value = "")]
        error: String,
    },
    /// Interface inventory with config and operational state
    Interfaces {
        node_id: String,
        /// Bypass the cache
        #[arg(long)]
        force: bool,
    },
    /// OpenFlow rules
    #[command(subcommand)]
    Flows(FlowCommand),
    /// Prometheus text exposition
    Metrics,
}

#[derive(Subcommand, Debug)]
enum FlowCommand {
    /// Stored rules
    List {
        #[arg(long)]
        node: Option<String>,
        #[arg(long)]
        table: Option<u32>,
        #[arg(long)]
        status: Option<String>,
    },
    /// Flows currently installed on the switch
    Show {
        node: String,
        #[arg(long)]
        table: Option<u32>,
    },
    /// Install a template; the request is a JSON object with a `template` tag
    Add {
        node: String,
        request: String,
    },
    /// Detect zombie and unmanaged flows
    Sync {
        node: String,
        #[arg(long, default_value_t = DEFAULT_TABLE)]
        table: u32,
    },
    Retry(FlowTarget),
    Reactivate(FlowTarget),
    Delete(FlowTarget),
    HardDelete(FlowTarget),
    /// Delete every flow in a table
    Reset {
        node: String,
        #[arg(long, default_value_t = DEFAULT_TABLE)]
        table: u32,
    },
}

#[derive(clap::Args, Debug)]
struct FlowTarget {
    node: String,
    flow_id: String,
    #[arg(long, default_value_t = DEFAULT_TABLE)]
    table: u32,
}

impl FlowTarget {
    fn key(&self) -> FlowKey {
        FlowKey::new(&self.node, &self.flow_id, self.table)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let loaded = nbi_core::config::load_environment();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nbi=info".parse()?)
                .add_directive("nbi_network=info".parse()?)
                .add_directive("nbi_store=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();
    if let Some(path) = loaded {
        debug!("Environment loaded from {}", path);
    }

    let args = Args::parse();
    let mut settings = Settings::from_env();
    if let Some(url) = args.database {
        settings.database_url = url;
    }
    if let Some(url) = args.controller {
        settings.controller.base_url = url;
    }

    let app = App::connect(&settings).await?;
    let outcome = run(&app, args.command).await;
    let failed = outcome.is_err();
    println!("{}", serde_json::to_string_pretty(&envelope(outcome))?);

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

fn envelope(outcome: nbi_core::Result<Value>) -> Value {
    match outcome {
        Ok(data) => json!({"success": true, "code": "OK", "message": "ok", "data": data}),
        Err(err) => {
            let mut body = json!({"success": false, "code": err.code(), "message": err.to_string(), "data": null});
            if let nbi_core::Error::Controller { suggestion: Some(hint), .. } = &err {
                body["suggestion"] = json!(hint);
            }
            body
        }
    }
}

async fn run(app: &App, command: Command) -> nbi_core::Result<Value> {
    let data = match command {
        Command::Intent { intent, node_id, params } => {
            let params: Params = serde_json::from_str(&params)
                .map_err(|e| nbi_core::Error::invalid_params(format!("--params is not a JSON object: {}", e)))?;
            let request = nbi_network::IntentRequest::new(intent, node_id, params);
            serde_json::to_value(app.intents.handle(&request).await?)?
        }
        Command::Intents => serde_json::to_value(app.intents.supported_intents())?,
        Command::Register {
            name,
            vendor,
            protocol,
            os_type,
            node_id,
            ip,
            port,
            username,
            password,
        } => {
            let vendor: Vendor = vendor.parse()?;
            let protocol: ManagementProtocol = protocol.parse()?;
            let mut device = DeviceRecord::new(name, vendor, protocol);
            device.os_type = os_type.map(|os| os.parse::<OsType>()).transpose()?;
            device.node_id = node_id;
            device.ip_address = ip;
            if let Some(port) = port {
                device.netconf_port = port;
            }
            device.netconf_username = username;
            device.netconf_password = password;
            serde_json::to_value(app.store.create_device(&device).await?)?
        }
        Command::Devices => serde_json::to_value(app.store.list_devices(None).await?)?,
        Command::Mount { device_id, wait } => {
            let outcome = if wait {
                app.mounts.mount_and_wait(device_id).await?
            } else {
                app.mounts.mount_device(device_id).await?
            };
            serde_json::to_value(outcome)?
        }
        Command::Unmount { device_id } => serde_json::to_value(app.mounts.unmount_device(device_id).await?)?,
        Command::Status { device_id } => {
            serde_json::to_value(app.mounts.check_and_sync_status(device_id).await?)?
        }
        Command::Sync => serde_json::to_value(app.sync.sync_devices().await?)?,
        Command::SyncOpenflow => serde_json::to_value(app.sync.sync_openflow().await?)?,
        Command::Capabilities { node, module } => match (node, module) {
            (Some(node), Some(module)) => {
                app.capabilities.refresh(&node).await?;
                serde_json::to_value(app.capabilities.is_feature_supported(&node, &module).await)?
            }
            (Some(node), None) => serde_json::to_value(app.capabilities.refresh(&node).await?)?,
            (None, _) => {
                app.capabilities.sync_all().await?;
                serde_json::to_value(app.capabilities.summary().await)?
            }
        },
        Command::Diagnose {
            node_id,
            intent,
            vendor,
            error,
        } => {
            let vendor: Vendor = vendor.parse()?;
            serde_json::to_value(app.capabilities.diagnose_error(&node_id, &intent, vendor, &error).await)?
        }
        Command::Interfaces { node_id, force } => {
            let device = app
                .store
                .find_device_by_node_id(&node_id)
                .await?
                .ok_or_else(|| nbi_core::Error::device_not_found(node_id.clone()))?;
            let vendor = device.profile()?.vendor;
            serde_json::to_value(app.discovery.discover(&node_id, vendor, force).await?)?
        }
        Command::Flows(flow) => run_flow(app, flow).await?,
        Command::Metrics => {
            nbi_store::metrics::register_metrics();
            Value::String(nbi_store::metrics::gather_metrics())
        }
    };
    Ok(data)
}

async fn run_flow(app: &App, command: FlowCommand) -> nbi_core::Result<Value> {
    let engine = &app.flows;
    let data = match command {
        FlowCommand::List { node, table, status } => {
            let filter = FlowFilter {
                node_id: node,
                table_id: table,
                status: status.map(|s| s.parse::<FlowStatus>()).transpose()?,
            };
            serde_json::to_value(engine.list_rules(&filter).await?)?
        }
        FlowCommand::Show { node, table } => serde_json::to_value(engine.get_flows(&node, table).await?)?,
        FlowCommand::Add { node, request } => {
            let request: FlowRequest = serde_json::from_str(&request)
                .map_err(|e| nbi_core::Error::invalid_params(format!("invalid flow request: {}", e)))?;
            serde_json::to_value(engine.add_flow(&node, &request).await?)?
        }
        FlowCommand::Sync { node, table } => serde_json::to_value(engine.sync(&node, table).await?)?,
        FlowCommand::Retry(target) => serde_json::to_value(engine.retry_flow(&target.key()).await?)?,
        FlowCommand::Reactivate(target) => {
            serde_json::to_value(engine.reactivate_flow(&target.key()).await?)?
        }
        FlowCommand::Delete(target) => serde_json::to_value(engine.delete_flow(&target.key()).await?)?,
        FlowCommand::HardDelete(target) => serde_json::to_value(engine.hard_delete(&target.key()).await?)?,
        FlowCommand::Reset { node, table } => json!({"deleted": engine.reset_table(&node, table).await?}),
    };
    Ok(data)
}
