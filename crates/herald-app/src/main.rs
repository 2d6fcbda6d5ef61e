//! Herald application binary - composition root.
//!
//! Wires the orchestrator to an in-memory simulated platform:
//! 1. Load configuration from TOML
//! 2. Read action lines from a file or stdin
//! 3. Stage the batch and show what will run
//! 4. Confirm (prompt or `--yes`), with Ctrl-C cancelling the run
//! 5. Print the final report

mod cli;

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use herald_action::handler::simulated::{GuildState, SimulatedPlatform};
use herald_action::{
    ActionRegistry, CircuitBreaker, Confirmation, ExecutionEngine, InMemorySessionStore,
    Orchestrator, SessionKey,
};
use herald_core::config::HeraldConfig;
use herald_core::types::TenantId;

use cli::CliArgs;

/// Non-empty lines that are not `#` comments.
fn read_action_lines(reader: impl BufRead) -> io::Result<Vec<String>> {
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        lines.push(trimmed.to_string());
    }
    Ok(lines)
}

fn seed_state(args: &CliArgs) -> GuildState {
    let mut state = GuildState::default().with_members(args.members.iter().map(String::as_str));
    for name in &args.categories {
        state = state.with_category(name);
    }
    for name in &args.channels {
        state = state.with_channel(name);
    }
    for name in &args.roles {
        state = state.with_role(name);
    }
    state
}

fn prompt_confirmation() -> io::Result<Confirmation> {
    print!("Proceed? [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Confirmation::Approved,
        _ => Confirmation::Declined,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let config = HeraldConfig::load_or_default(&config_file);

    // Tracing. Logs go to stderr so stdout stays clean for the report.
    let log_level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .with_writer(io::stderr)
        .init();

    tracing::info!("Starting Herald v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    if args.init_config {
        config.save(&config_file)?;
        println!("Wrote {}", config_file.display());
        return Ok(());
    }

    if !args.yes && args.reads_stdin() {
        return Err("actions read from stdin need --yes, the prompt cannot share stdin".into());
    }

    // Actions.
    let lines = match &args.actions {
        Some(path) if path.as_os_str() != "-" => {
            read_action_lines(io::BufReader::new(std::fs::File::open(path)?))?
        }
        _ => read_action_lines(io::stdin().lock())?,
    };
    if lines.is_empty() {
        tracing::warn!("No actions to run");
        return Ok(());
    }

    // Simulated platform.
    let tenant = TenantId::new(args.tenant.clone());
    let platform = Arc::new(SimulatedPlatform::new());
    platform.seed(&tenant, seed_state(&args));
    let registry = Arc::new(ActionRegistry::new());
    platform.register_all(&registry);
    tracing::info!(handlers = registry.len(), "Simulated platform ready");

    // Orchestrator.
    let breaker = Arc::new(CircuitBreaker::new(&config.breaker));
    let engine = ExecutionEngine::new(registry, breaker, &config)
        .with_validation(platform.clone(), &config.validation);
    let orchestrator = Orchestrator::new(Arc::new(InMemorySessionStore::new()), engine, &config);

    let requester = std::env::var("USER").unwrap_or_else(|_| "operator".to_string());
    let key = SessionKey::new(requester, "cli");
    let staged = orchestrator.submit(key.clone(), tenant.clone(), lines).await?;

    println!("Batch {} ({} actions):", staged.id, staged.len());
    for line in orchestrator.preview(&staged) {
        println!("  - {}", line);
    }

    let answer = if args.yes {
        Confirmation::Approved
    } else {
        prompt_confirmation()?
    };

    // Ctrl-C cancels the run and still yields a partial report.
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling run");
            trigger.cancel();
        }
    });

    let outcome = orchestrator.respond(&key, answer, &cancel).await?;
    match outcome.report() {
        Some(report) if args.json => println!("{}", report.to_json()?),
        _ => println!("{}", outcome.to_string().trim_end()),
    }

    tracing::debug!(state = ?platform.snapshot(&tenant), "Final simulated state");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_action_lines_skips_blanks_and_comments() {
        let input = "# setup\ncreate_category Lobby\n\n  create_channel general in Lobby  \n";
        let lines = read_action_lines(input.as_bytes()).unwrap();
        assert_eq!(
            lines,
            vec![
                "create_category Lobby".to_string(),
                "create_channel general in Lobby".to_string()
            ]
        );
    }

    #[test]
    fn test_seed_state_from_args() {
        let args = CliArgs::try_parse_from([
            "herald", "--member", "alice", "--channel", "general", "--role", "Mods",
        ])
        .unwrap();
        let state = seed_state(&args);
        assert!(state.members.contains_key("alice"));
        assert!(state.channels.contains_key("general"));
        assert!(state.roles.contains("Mods"));
        assert!(state.categories.is_empty());
    }
}
