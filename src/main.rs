// src/main.rs

//! The main entry point for the cluster launcher.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use flintrock::cli::{Cli, Command};
use flintrock::config::FileConfig;
use flintrock::core::errors::FlintrockError;
use flintrock::core::modules::{Module, Spark};
use flintrock::core::orchestrator::{Orchestrator, print_descriptions};
use flintrock::core::provider::ec2::Ec2Provider;
use tracing::error;
use tracing_subscriber::filter::EnvFilter;

#[tokio::main]
async fn main() {
    // Setup logging with compact format and ANSI colors; RUST_LOG overrides
    // the default level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .compact()
        .with_ansi(true)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run_app(cli).await {
        // Guarded precondition failures get a plain message; anything else
        // is an error trace.
        match e.downcast_ref::<FlintrockError>() {
            Some(fe) if fe.is_precondition_failure() => eprintln!("{fe}"),
            _ => error!("{e:#}"),
        }
        std::process::exit(1);
    }
}

async fn run_app(cli: Cli) -> Result<()> {
    let config = FileConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Launch(args) => {
            let orchestrator = orchestrator_for(&args.region(&config)).await;
            let options = args.options(&config)?;
            let ssh = args.ssh_access(&config)?;
            let modules = args.modules(&config)?;
            orchestrator.launch(&options, &ssh, modules).await?;
        }
        Command::Destroy(args) => {
            let orchestrator = orchestrator_for(&args.region(&config)).await;
            orchestrator
                .destroy(&args.cluster_name, args.assume_yes)
                .await?;
        }
        Command::Start(args) => {
            let orchestrator = orchestrator_for(&args.region(&config)).await;
            let ssh = args.ssh_access(&config)?;
            // The installed Spark version is not recorded anywhere we can
            // read it back from, so restarts run with a placeholder; the
            // configure paths are version-independent.
            let modules: Vec<Box<dyn Module>> = vec![Box::new(Spark::new("unknown"))];
            orchestrator.start(&args.cluster_name, &ssh, modules).await?;
        }
        Command::Stop(args) => {
            let orchestrator = orchestrator_for(&args.region(&config)).await;
            orchestrator.stop(&args.cluster_name, args.assume_yes).await?;
        }
        Command::Describe(args) => {
            let orchestrator = orchestrator_for(&args.region(&config)).await;
            let descriptions = orchestrator.describe(args.cluster_name.as_deref()).await?;
            print_descriptions(&descriptions, args.master_hostname_only);
        }
        Command::Login(args) => {
            let orchestrator = orchestrator_for(&args.region(&config)).await;
            let ssh = args.ssh_access(&config)?;
            orchestrator.login(&args.cluster_name, &ssh).await?;
        }
    }
    Ok(())
}

async fn orchestrator_for(region: &str) -> Orchestrator {
    Orchestrator::new(Arc::new(Ec2Provider::new(region).await))
}
