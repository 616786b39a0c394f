mod serve;
mod signin;

use anyhow::{Context, Result};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::core::config::{AppConfig, MailConfig, config_path_from_env};
use crate::core::notifier::{Notifier, SmtpMailer};
use crate::core::terminal::{self, print_error};
use crate::logging;

fn print_help() {
    terminal::print_banner();

    println!("{}", style("Commands").bold());
    terminal::print_command("serve", "Track MAA presence over HTTP and run daily sign-ins (default)");
    terminal::print_command("signin", "Run the daily sign-in for every account right now");
    terminal::print_command("help", "Show this message");
    println!();

    println!("{}", style("Flags").bold());
    terminal::print_command("--config", "Path to config.json (default: config/config.json)");
    terminal::print_command("--host", "Listen address for serve");
    terminal::print_command("--port", "Listen port for serve");
    terminal::print_command("--saved", "Presence save file for serve");

    println!(
        "\n {} {} <command> [flags]\n",
        style("Usage:").bold(),
        style("maa-manager").green()
    );
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CliFlags {
    pub config: PathBuf,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub saved: Option<PathBuf>,
}

pub(crate) fn parse_flags(args: &[String], start: usize, config: PathBuf) -> CliFlags {
    let mut flags = CliFlags {
        config,
        host: None,
        port: None,
        saved: None,
    };
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    flags.config = PathBuf::from(&args[i + 1]);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--host" => {
                if i + 1 < args.len() {
                    flags.host = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    flags.port = args[i + 1].parse().ok();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--saved" => {
                if i + 1 < args.len() {
                    flags.saved = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    flags
}

/// File, then `MAA_*` environment, then flags.
pub(crate) fn load_config(flags: &CliFlags) -> Result<AppConfig> {
    let mut config = AppConfig::load(&flags.config)?;
    config.apply_env(|name| std::env::var(name).ok())?;
    if let Some(host) = &flags.host {
        config.server.host = host.clone();
    }
    if let Some(port) = flags.port {
        config.server.port = port;
    }
    if let Some(saved) = &flags.saved {
        config.saved_path = saved.clone();
    }
    Ok(config)
}

/// Loads config and installs logging. Config problems that only disable a
/// subsystem are logged here.
pub(crate) fn bootstrap(flags: &CliFlags) -> Result<AppConfig> {
    let config = load_config(flags)?;
    logging::init(config.log_file.as_deref()).context("opening log file")?;
    for warning in &config.warnings {
        warn!("{}", warning);
    }
    Ok(config)
}

/// SMTP notifier after a connection probe; disabled when absent or unusable.
pub(crate) async fn build_notifier(mail: Option<&MailConfig>) -> Notifier {
    let Some(mail) = mail else {
        info!("No mail-sender configured, notifications disabled");
        return Notifier::disabled();
    };
    let mailer = match SmtpMailer::new(mail) {
        Ok(mailer) => mailer,
        Err(e) => {
            error!("{}, notifications disabled", e);
            return Notifier::disabled();
        }
    };
    match mailer.test_connection().await {
        Ok(()) => {
            info!("Mail sender connected to {} as {}", mail.host, mail.username);
            Notifier::new(Arc::new(mailer))
        }
        Err(e) => {
            error!(
                "Mail sender {} unreachable ({}), notifications disabled",
                mail.host, e
            );
            Notifier::disabled()
        }
    }
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    // Bare flags mean `serve`.
    let (command, start) = match args.get(1).map(String::as_str) {
        None => ("serve", 1),
        Some(arg) if arg.starts_with('-') && !matches!(arg, "-h" | "--help") => ("serve", 1),
        Some(arg) => (arg, 2),
    };

    match command {
        "serve" => {
            let flags = parse_flags(&args, start, config_path_from_env());
            serve::run_server(flags).await
        }
        "signin" => {
            let flags = parse_flags(&args, start, config_path_from_env());
            signin::run_signin(flags).await
        }
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        other => {
            print_error(&format!("Unknown command '{}'", other));
            print_help();
            std::process::exit(2);
        }
    }
}
