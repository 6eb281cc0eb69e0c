//! `networking-ctl` — manual exerciser for `NetworkingManager`
//!
//! Not the product's operator CLI; a thin smoke-test harness engineers use
//! to poke a cluster from the command line while developing against this
//! crate.
//!
//! ```bash
//! networking-ctl create --spec app.yaml
//! networking-ctl status --name myapp --namespace ns1
//! networking-ctl suspend --namespace ns1
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use sealos_networking_core::spec::AppNetworkingSpec;
use sealos_networking_core::{CancelSignal, NetworkingManager};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "networking-ctl")]
#[command(about = "Exercise the networking core against a live cluster")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create (or idempotently reconcile) networking for an application spec.
    Create(SpecArgs),
    /// Update networking for an application spec.
    Update(SpecArgs),
    /// Delete the Gateway/VirtualService pair for a named application.
    Delete(NameArgs),
    /// Suspend every managed VirtualService in a namespace.
    Suspend(NamespaceArgs),
    /// Resume every suspended VirtualService in a namespace.
    Resume(NamespaceArgs),
    /// Print the composed networking status for a named application.
    Status(NameArgs),
}

#[derive(Parser, Debug)]
pub struct SpecArgs {
    /// Path to a YAML or JSON `AppNetworkingSpec`.
    #[arg(long)]
    pub spec: PathBuf,
}

#[derive(Parser, Debug)]
pub struct NameArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub namespace: String,
}

#[derive(Parser, Debug)]
pub struct NamespaceArgs {
    #[arg(long)]
    pub namespace: String,
}

fn load_spec(path: &PathBuf) -> Result<AppNetworkingSpec> {
    let content = std::fs::read_to_string(path)?;
    let is_yaml = path
        .extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false);

    let spec = if is_yaml {
        serde_yaml::from_str(&content)?
    } else {
        serde_json::from_str(&content)?
    };
    Ok(spec)
}

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let manager = NetworkingManager::from_env().await?;
    let cancel = CancelSignal::new();

    match args.command {
        Command::Create(spec_args) => {
            let spec = load_spec(&spec_args.spec)?;
            manager.create_app_networking(&spec, &cancel).await?;
            println!("✓ networking created for {}/{}", spec.namespace, spec.name);
        }
        Command::Update(spec_args) => {
            let spec = load_spec(&spec_args.spec)?;
            manager.update_app_networking(&spec, &cancel).await?;
            println!("✓ networking updated for {}/{}", spec.namespace, spec.name);
        }
        Command::Delete(name_args) => {
            manager
                .delete_app_networking(&name_args.name, &name_args.namespace, &cancel)
                .await?;
            println!("✓ networking deleted for {}/{}", name_args.namespace, name_args.name);
        }
        Command::Suspend(ns_args) => {
            let count = manager.suspend_networking(&ns_args.namespace, &cancel).await?;
            println!("✓ suspended {count} VirtualService(s) in {}", ns_args.namespace);
        }
        Command::Resume(ns_args) => {
            let count = manager.resume_networking(&ns_args.namespace, &cancel).await?;
            println!("✓ resumed {count} VirtualService(s) in {}", ns_args.namespace);
        }
        Command::Status(name_args) => {
            let status = manager
                .get_networking_status(&name_args.name, &name_args.namespace, &cancel)
                .await;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}
