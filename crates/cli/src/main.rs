//! Stackweave CLI entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration**: load the stack TOML named by `--config` or
//!    `STACK_CONFIG` and validate it.
//! 2. **Wire observability**: JSON `tracing-subscriber` output plus an optional
//!    OTLP exporter (see [`telemetry`]).
//! 3. **Construct infrastructure**: pick a secret store and a provisioning
//!    backend and hand them to the synthesis core.
//! 4. **Dispatch**: `synth`, `validate` or `outputs`.

mod telemetry;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use assembly::{AssemblyWriter, DryRunBackend};
use construct::{ProvisioningBackend, SecretStore, StackConfig};
use secrets::EnvSecretStore;

use crate::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};

#[derive(Debug, Parser)]
#[command(name = "stackweave", version, about = "Synthesize a web service stack and its delivery pipeline")]
struct Cli {
    /// Stack configuration file.
    #[arg(long, short, env = "STACK_CONFIG", default_value = "stack.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Synthesize the stack and hand it to a provisioning backend.
    Synth {
        /// Write a cloud assembly here. Without it the run is a dry run.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Resolve the source credential from the environment before synthesis.
        #[arg(long)]
        verify_secrets: bool,

        /// Prefix for secret environment variables.
        #[arg(long, env = "STACK_SECRET_PREFIX", default_value = "")]
        secret_prefix: String,
    },
    /// Check the configuration and the resulting graph without writing anything.
    Validate,
    /// Print the stack's output bindings as JSON.
    Outputs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_telemetry(TelemetryConfig::default())?;

    let result = run(cli).await;
    shutdown_telemetry();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli.config).await?;

    match cli.command {
        Command::Synth {
            out,
            verify_secrets,
            secret_prefix,
        } => {
            let store = EnvSecretStore::with_prefix(secret_prefix);
            let secrets: Option<&dyn SecretStore> = verify_secrets.then_some(&store as &dyn SecretStore);
            let stack = components::synthesize_with(&config, secrets)?;

            let backend: Box<dyn ProvisioningBackend> = match out {
                Some(dir) => Box::new(AssemblyWriter::new(dir)),
                None => Box::new(DryRunBackend),
            };
            let receipt = backend.submit(&stack.declaration).await?;
            info!(
                synthesis_id = %stack.synthesis_id,
                location = %receipt.location,
                nodes = receipt.node_count,
                "synthesis submitted"
            );
            println!("{}: {} nodes", receipt.location, receipt.node_count);
        }
        Command::Validate => {
            let stack = components::synthesize(&config)?;
            println!(
                "{} is valid: {} nodes, {} edges",
                cli.config.display(),
                stack.declaration.nodes.len(),
                stack.declaration.edges.len()
            );
        }
        Command::Outputs => {
            let stack = components::synthesize(&config)?;
            println!("{}", serde_json::to_string_pretty(&stack.declaration.outputs)?);
        }
    }
    Ok(())
}

async fn load_config(path: &Path) -> anyhow::Result<StackConfig> {
    let document = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    StackConfig::from_toml_str(&document).with_context(|| format!("invalid configuration in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn synth_flags_parse() {
        let cli = Cli::try_parse_from([
            "stackweave",
            "synth",
            "--config",
            "demos/stack.toml",
            "--out",
            "cdk.out",
            "--verify-secrets",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("demos/stack.toml"));
        match cli.command {
            Command::Synth { out, verify_secrets, .. } => {
                assert_eq!(out, Some(PathBuf::from("cdk.out")));
                assert!(verify_secrets);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn demo_config_loads_and_synthesizes() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/stack.toml");
        let config = load_config(&path).await.unwrap();
        let stack = components::synthesize(&config).unwrap();
        assert_eq!(stack.declaration.outputs.len(), 4);
    }

    #[tokio::test]
    async fn missing_config_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = load_config(&path).await.unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }
}
