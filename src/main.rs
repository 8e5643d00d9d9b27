use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use talkback::app::{run_interactive, run_once};
use talkback::cli::{Cli, Commands, ConfigAction};
use talkback::config::Config;
use talkback::diagnostics::check_dependencies;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    match cli.command {
        None => {
            let config = load_config(&cli)?;
            run_interactive(config, cli.no_speech)?;
        }
        Some(Commands::Say { ref text }) => {
            let config = load_config(&cli)?;
            let report = run_once(config, text, cli.no_speech)?;
            if report.cancelled {
                std::process::exit(130);
            }
        }
        Some(Commands::Check) => {
            let config = load_config(&cli)?;
            if !check_dependencies(&config) {
                std::process::exit(1);
            }
        }
        Some(Commands::Config { ref action }) => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "talkback",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Install the tracing subscriber on stderr.
///
/// `RUST_LOG` wins when set; otherwise the level follows `-q` / `-v`.
fn init_logging(quiet: bool, verbose: u8) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("talkback={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/talkback/config.toml)
/// 3. Built-in defaults
///
/// Environment variables, then CLI flags, override whatever was loaded.
fn load_config(cli: &Cli) -> Result<Config> {
    let config = match cli.config.as_deref() {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(&Config::default_path())?,
    };

    let mut config = config.with_env_overrides();
    if let Some(ref model) = cli.model {
        config.llm.model = model.clone();
    }
    if cli.start_server {
        config.llm.start_server = true;
    }
    if let Some(interval) = cli.poll_interval {
        config.pipeline.poll_interval_ms = interval.as_millis().try_into().unwrap_or(u64::MAX);
    }

    config.validate()?;
    Ok(config)
}

/// Handle configuration commands.
fn handle_config_command(action: &ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    let config_path = custom_path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);

    match action {
        ConfigAction::Show => {
            let config = Config::load_or_default(&config_path)?.with_env_overrides();
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Path => {
            println!("{}", config_path.display());
        }
        ConfigAction::Init { force } => {
            if config_path.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    config_path.display()
                );
            }
            Config::default()
                .save(&config_path)
                .with_context(|| format!("writing {}", config_path.display()))?;
            println!(
                "{} {}",
                "Wrote default configuration to".green(),
                config_path.display()
            );
        }
    }
    Ok(())
}
