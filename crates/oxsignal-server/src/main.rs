use anyhow::Result;
use oxsignal_common::types::Resolution;
use oxsignal_server::config::ServerConfig;
use oxsignal_server::report::{self, AgentReport, ReportResponse};
use oxsignal_server::rule_seed;
use oxsignal_server::state::AppState;
use oxsignal_storage::SqliteStore;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "config/server.toml";
const DEFAULT_HISTORY_LIMIT: usize = 20;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  oxsignal-server [config.toml]                                   Process newline-delimited JSON reports from stdin");
    eprintln!("  oxsignal-server report <config.toml> <report.json>              Process a single agent report");
    eprintln!("  oxsignal-server init-rules <config.toml> <seed.json>            Upsert alert configurations from seed file");
    eprintln!("  oxsignal-server delete-rule <config.toml> <configuration_id>    Remove an alert configuration");
    eprintln!("  oxsignal-server history <config.toml> <agent_id> [limit]        List an agent's recent alerts");
    eprintln!("  oxsignal-server set-resolution <config.toml> <agent_id> <res>   Override an agent's window resolution ('default' clears it)");
}

#[tokio::main]
async fn main() -> Result<()> {
    oxsignal_common::id::init(1, 1);

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("oxsignal=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("report") => {
            let (config_path, report_path) = two_args(&args, "report", "<report.json>")?;
            run_report(config_path, report_path).await
        }
        Some("init-rules") => {
            let (config_path, seed_path) = two_args(&args, "init-rules", "<seed.json>")?;
            run_init_rules(config_path, seed_path)
        }
        Some("delete-rule") => {
            let (config_path, configuration_id) =
                two_args(&args, "delete-rule", "<configuration_id>")?;
            run_delete_rule(config_path, configuration_id)
        }
        Some("history") => {
            let (config_path, agent_id) = two_args(&args, "history", "<agent_id>")?;
            let limit = match args.get(4) {
                Some(raw) => raw
                    .parse()
                    .map_err(|e| anyhow::anyhow!("Invalid history limit '{raw}': {e}"))?,
                None => DEFAULT_HISTORY_LIMIT,
            };
            run_history(config_path, agent_id, limit)
        }
        Some("set-resolution") => {
            let (config_path, agent_id) = two_args(&args, "set-resolution", "<agent_id>")?;
            let raw = args.get(4).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("set-resolution requires a <res> argument")
            })?;
            run_set_resolution(config_path, agent_id, raw)
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => {
            let config_path = args
                .get(1)
                .map(|s| s.as_str())
                .unwrap_or(DEFAULT_CONFIG_PATH);
            run_ingest(config_path).await
        }
    }
}

fn two_args<'a>(args: &'a [String], command: &str, second: &str) -> Result<(&'a str, &'a str)> {
    let config_path = args.get(2).ok_or_else(|| {
        print_usage();
        anyhow::anyhow!("{command} requires <config.toml> and {second} arguments")
    })?;
    let other = args.get(3).ok_or_else(|| {
        print_usage();
        anyhow::anyhow!("{command} requires {second} argument")
    })?;
    Ok((config_path.as_str(), other.as_str()))
}

#[allow(clippy::print_stdout)]
fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn open_store(config: &ServerConfig) -> Result<SqliteStore> {
    Ok(SqliteStore::open(
        Path::new(&config.data_dir),
        config.default_resolution,
    )?)
}

/// Process one report file and print the response.
async fn run_report(config_path: &str, report_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let state = AppState::open(config)?;

    let content = std::fs::read_to_string(report_path)
        .map_err(|e| anyhow::anyhow!("Failed to read report '{}': {}", report_path, e))?;
    let agent_report: AgentReport = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse report '{}': {}", report_path, e))?;

    let response = report::process_report(&state, agent_report).await;
    print_json(&response)?;
    if !response.success {
        anyhow::bail!("report rejected: {}", response.message);
    }
    Ok(())
}

/// Upsert alert configurations from a JSON seed file.
fn run_init_rules(config_path: &str, seed_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let store = open_store(&config)?;
    let seed = rule_seed::read_seed_file(seed_path)?;

    let outcome = rule_seed::apply_seed(&store, &seed);
    tracing::info!(
        upserted = outcome.upserted,
        invalid = outcome.invalid,
        failed = outcome.failed,
        "init-rules completed"
    );
    Ok(())
}

fn run_delete_rule(config_path: &str, configuration_id: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let store = open_store(&config)?;
    if store.delete_configuration(configuration_id)? {
        tracing::info!(configuration_id, "Alert configuration deleted");
    } else {
        tracing::warn!(configuration_id, "No alert configuration with that id");
    }
    Ok(())
}

fn run_history(config_path: &str, agent_id: &str, limit: usize) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let store = open_store(&config)?;
    let alerts = store.list_alerts(agent_id, limit)?;
    print_json(&alerts)
}

fn run_set_resolution(config_path: &str, agent_id: &str, raw: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let store = open_store(&config)?;
    let resolution = match raw {
        "default" => None,
        other => Some(
            other
                .parse::<Resolution>()
                .map_err(|e| anyhow::anyhow!("Invalid resolution '{other}': {e}"))?,
        ),
    };
    store.set_agent_resolution(agent_id, resolution)?;
    tracing::info!(
        agent_id,
        resolution = %resolution.map(|r| r.to_string()).unwrap_or_else(|| "default".to_string()),
        "Agent resolution updated"
    );
    Ok(())
}

/// Read newline-delimited reports from stdin until EOF or Ctrl-C. Each
/// report runs on its own task; responses print as they complete.
async fn run_ingest(config_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let state = AppState::open(config)?;
    tracing::info!(
        data_dir = %state.config.data_dir,
        cooldown_minutes = state.config.cooldown_minutes,
        "oxsignal ingest started"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tasks: JoinSet<ReportResponse> = JoinSet::new();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<AgentReport>(line) {
                    Ok(agent_report) => {
                        let state = state.clone();
                        tasks.spawn(async move { report::process_report(&state, agent_report).await });
                    }
                    Err(e) => tracing::warn!(error = %e, "Skipping malformed report line"),
                }
            }
            Some(done) = tasks.join_next() => {
                match done {
                    Ok(response) => print_json(&response)?,
                    Err(e) => tracing::error!(error = %e, "Report task failed"),
                }
            }
            _ = signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
                break;
            }
        }
    }

    while let Some(done) = tasks.join_next().await {
        match done {
            Ok(response) => print_json(&response)?,
            Err(e) => tracing::error!(error = %e, "Report task failed"),
        }
    }
    tracing::info!("oxsignal ingest stopped");
    Ok(())
}
