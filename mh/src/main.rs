//! mfehost - micro-frontend host runtime
//!
//! CLI entry point for loading fragments and watching bus activity.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info};

use fragbus::{MessageBus, Registry};
use mfehost::cli::{Cli, Command, parse_level};
use mfehost::config::Config;
use mfehost::fragments::{UserListFragment, register_builtins};
use mfehost::host::Host;
use mfehost::loader::{HttpFetcher, LoadError, LoadOutcome, LoadRequest, ModuleLoader, NativeRuntime};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mfehost")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => parse_level(s).unwrap_or_else(|| {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
            tracing::Level::INFO
        }),
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("mfehost.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!("mfehost loaded config: {} fragment(s)", config.fragments.len());

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Fragments) | None => {
            debug!("main: matched Fragments command");
            cmd_fragments(&config)
        }
        Some(Command::Load { name, code_url, style }) => {
            debug!(%name, %code_url, ?style, "main: matched Load command");
            let mut request = LoadRequest::new(name, code_url);
            if let Some(style) = style {
                request = request.with_style(style);
            }
            cmd_load(&config, request).await
        }
        Some(Command::Run { only, message, theme }) => {
            debug!(?only, "main: matched Run command");
            cmd_run(&config, only.as_deref(), message, theme).await
        }
    }
}

/// Everything a host session needs, wired to the process-wide bus
struct Session {
    host: Host,
    loader: ModuleLoader,
    user_list: UserListFragment,
}

fn start_session(config: &Config) -> Result<Session> {
    debug!("start_session: called");
    let registry = Registry::from_global_or(MessageBus::shared());
    let host = Host::attach(registry.bus().clone(), &config.host);

    let runtime = Arc::new(NativeRuntime::new());
    let user_list = register_builtins(&runtime);
    let fetcher = Arc::new(HttpFetcher::new(&config.loader).context("Failed to create HTTP fetcher")?);
    let loader = ModuleLoader::new(fetcher, runtime, registry, &config.loader);

    Ok(Session {
        host,
        loader,
        user_list,
    })
}

fn cmd_fragments(config: &Config) -> Result<()> {
    debug!("cmd_fragments: called");
    if config.fragments.is_empty() {
        println!("No fragments configured");
        return Ok(());
    }

    println!("{}", "Fragments".bold());
    for fragment in &config.fragments {
        println!("  {}", fragment.name.cyan());
        println!("    code:  {}", fragment.code_url);
        if let Some(style_url) = &fragment.style_url {
            println!("    style: {}", style_url);
        }
        if let Some(tag_name) = &fragment.tag_name {
            println!("    tag:   {}", tag_name);
        }
        let caps = fragment.capabilities;
        println!(
            "    caps:  emit={} subscribe={} read-state={} write-state={}",
            caps.emit, caps.subscribe, caps.read_state, caps.write_state
        );
    }
    Ok(())
}

async fn cmd_load(config: &Config, request: LoadRequest) -> Result<()> {
    debug!(name = %request.name, "cmd_load: called");
    let session = start_session(config)?;
    let name = request.name.clone();

    let result = session.loader.load(request).await;
    print_outcome(&name, &result);
    print_activity(&session);

    result.map(|_| ()).map_err(|e| eyre::eyre!(e))
}

async fn cmd_run(config: &Config, only: Option<&str>, message: Option<String>, theme: Option<String>) -> Result<()> {
    debug!(?only, "cmd_run: called");
    let requests: Vec<LoadRequest> = match only {
        Some(name) => {
            let fragment = config
                .fragment(name)
                .ok_or_else(|| eyre::eyre!("Unknown fragment: {}", name))?;
            vec![fragment.to_request()]
        }
        None => config.fragments.iter().map(|f| f.to_request()).collect(),
    };

    if requests.is_empty() {
        println!("No fragments configured");
        return Ok(());
    }

    let session = start_session(config)?;
    let names: Vec<String> = requests.iter().map(|r| r.name.clone()).collect();
    let results = session.loader.load_all(requests).await;

    println!("{}", "Loading fragments".bold());
    for (name, result) in names.iter().zip(&results) {
        print_outcome(name, result);
    }

    if let Some(message) = message {
        session.host.send_message(message);
    }
    if let Some(theme) = theme {
        session.host.update_theme(theme);
    }

    print_activity(&session);

    let failed = results.iter().filter(|r| r.is_err()).count();
    if failed > 0 {
        return Err(eyre::eyre!("{} of {} fragment(s) failed to load", failed, names.len()));
    }
    Ok(())
}

fn print_outcome(name: &str, result: &Result<LoadOutcome, LoadError>) {
    match result {
        Ok(LoadOutcome::Fetched) => println!("  {} {}", "✓".green(), name),
        Ok(LoadOutcome::Cached) => println!("  {} {} (already loaded)", "✓".green(), name),
        Ok(LoadOutcome::Joined) => println!("  {} {} (joined in-flight load)", "✓".green(), name),
        Err(e) => println!("  {} {}", "✗".red(), e),
    }
}

fn print_activity(session: &Session) {
    println!();
    println!("{}", "Shared state".bold());
    for (key, value) in session.host.bus().current_state().iter() {
        println!("  {} = {}", key.cyan(), value);
    }

    let users = session.user_list.view().users;
    if !users.is_empty() {
        println!();
        println!("{}", "User list".bold());
        for user in users {
            println!("  {}", user);
        }
    }

    println!();
    println!("{}", "Recent messages".bold());
    let messages = session.host.messages();
    if messages.is_empty() {
        println!("  (none)");
    }
    for message in messages {
        println!(
            "  [{}] {} from {}: {}",
            message.time_string.dimmed(),
            message.event_type.yellow(),
            message.source,
            message.payload
        );
    }
}
