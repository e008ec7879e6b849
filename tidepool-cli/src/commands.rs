//! CLI command implementations

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Subcommand;
use tidepool_core::{
    CassetteKeying, HarnessConfig, ProviderContext, ProviderId, RecordMode, SearchProvider,
};
use tidepool_harness::{ConformanceRunner, HarnessContext, Operation, Selection, synthesize};
use tidepool_providers::builtin_registry;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the conformance suites of every qualifying provider
    Run {
        /// Only run these providers (repeatable)
        #[arg(short, long = "provider")]
        providers: Vec<String>,
        /// Only run these operations (repeatable)
        #[arg(short, long = "operation")]
        operations: Vec<Operation>,
        /// Directory holding cassette files
        #[arg(long)]
        cassette_dir: Option<PathBuf>,
        /// playback or extend
        #[arg(long)]
        record_mode: Option<RecordMode>,
        /// provider or operation
        #[arg(long)]
        keying: Option<CassetteKeying>,
        /// TOML file replacing the built-in skip and override tables
        #[arg(long)]
        policy: Option<PathBuf>,
        /// Live request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// List registered providers and whether they get a suite
    List,
}

/// Handle the CLI command
///
/// # Errors
/// - Configuration or policy file could not be loaded
pub async fn handle_command(command: Commands) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Run {
            providers,
            operations,
            cassette_dir,
            record_mode,
            keying,
            policy,
            timeout,
        } => {
            let mut config = HarnessConfig::from_env().context("invalid environment configuration")?;
            if let Some(dir) = cassette_dir {
                config.cassette.dir = dir;
            }
            if let Some(mode) = record_mode {
                config.cassette.record_mode = mode;
            }
            if let Some(keying) = keying {
                config.cassette.keying = keying;
            }
            if let Some(path) = policy {
                config.policy_file = Some(path);
            }
            if let Some(seconds) = timeout {
                config.network.request_timeout = Duration::from_secs(seconds);
            }
            let selection = Selection::all()
                .with_providers(&providers)
                .with_operations(operations);
            run_suites(&config, &providers, &selection).await
        }
        Commands::List => {
            let config = HarnessConfig::from_env().context("invalid environment configuration")?;
            list_providers(&config);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Runs the selected suites and prints the verbose report.
///
/// # Errors
/// - Policy file could not be loaded
pub async fn run_suites(
    config: &HarnessConfig,
    requested: &[String],
    selection: &Selection,
) -> anyhow::Result<ExitCode> {
    let harness = HarnessContext::from_config(config).context("failed to load policy")?;
    let context = ProviderContext {
        network: config.network.clone(),
        ..ProviderContext::default()
    };

    let registry = builtin_registry();
    for name in requested {
        let id = ProviderId::from_name(name);
        if !registry.names().any(|known| ProviderId::from_name(known) == id) {
            tracing::warn!("Requested provider '{name}' is not registered");
        }
    }

    tracing::info!(
        "Running conformance suites: cassettes={} mode={} keying={}",
        config.cassette.dir.display(),
        config.cassette.record_mode,
        config.cassette.keying
    );

    let enumeration = registry.list_providers(&context);
    let suites = synthesize(&enumeration, Arc::new(harness));
    let report = ConformanceRunner::new()
        .with_setup_errors(&enumeration.setup_errors)
        .run(&suites, selection)
        .await;

    println!("{report}");

    if report.has_failures() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Prints every registered provider with its capabilities.
pub fn list_providers(config: &HarnessConfig) {
    let context = ProviderContext {
        network: config.network.clone(),
        ..ProviderContext::default()
    };
    let enumeration = builtin_registry().list_providers(&context);

    println!(
        "{:<16} {:<16} {:<8} {:<8} {:<8} {:<8} SUITE",
        "NAME", "ID", "KIND", "ACCESS", "BACKLOG", "RSS"
    );
    for provider in &enumeration.providers {
        print_provider(provider.as_ref());
    }

    for error in &enumeration.setup_errors {
        println!("{error}");
    }
}

fn print_provider(provider: &dyn SearchProvider) {
    let caps = provider.capabilities();
    let yes_no = |flag: bool| if flag { "yes" } else { "no" };
    println!(
        "{:<16} {:<16} {:<8} {:<8} {:<8} {:<8} {}",
        provider.name(),
        provider.id().as_str(),
        format!("{:?}", caps.kind).to_lowercase(),
        format!("{:?}", caps.visibility).to_lowercase(),
        yes_no(caps.supports_backlog),
        yes_no(caps.supports_periodic_refresh),
        yes_no(caps.qualifies_for_conformance())
    );
}
