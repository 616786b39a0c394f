use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{CliFlags, bootstrap, build_notifier};
use crate::core::lifecycle::LifecycleManager;
use crate::core::presence::{PresencePersistence, PresenceStore};
use crate::core::signin::scheduler::SignInScheduler;
use crate::core::signin::SklandClient;
use crate::core::terminal;
use crate::interfaces::web::ApiServer;

pub async fn run_server(flags: CliFlags) -> Result<()> {
    let config = bootstrap(&flags)?;

    // reqwest and axum-server both pull in rustls; pin one provider process-wide.
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider already installed");
    }

    let notifier = build_notifier(config.mail.as_ref()).await;
    let presence = PresenceStore::new(notifier.clone());

    let mut lifecycle = LifecycleManager::new().await?;
    lifecycle.attach(Arc::new(Mutex::new(ApiServer::new(
        presence.clone(),
        config.server.clone(),
    ))));
    lifecycle.attach(Arc::new(Mutex::new(PresencePersistence::new(
        presence,
        config.saved_path.clone(),
    ))));

    lifecycle.start().await?;
    terminal::print_success(&format!(
        "Listening on {}:{}",
        config.server.host, config.server.port
    ));

    // The listener is already serving while handshakes run.
    if config.accounts.is_empty() {
        info!("No accounts configured, daily sign-in disabled");
    } else {
        let scheduler = SignInScheduler::new(SklandClient::new(config.skland.clone())?, notifier);
        tokio::select! {
            jobs = scheduler.build(&config.accounts) => {
                let registered = lifecycle.schedule_sign_ins(jobs).await?;
                info!(
                    "{} of {} account(s) scheduled for daily sign-in",
                    registered,
                    config.accounts.len()
                );
                if lifecycle.scheduled_jobs() == 0 {
                    warn!("No account passed the sign-in handshake, daily sign-in disabled");
                }
            }
            res = wait_for_signal() => {
                res?;
                info!("Shutting down maa-manager before sign-in setup finished...");
                return lifecycle.shutdown().await;
            }
        }
    }

    wait_for_signal().await?;
    info!("Shutting down maa-manager...");
    lifecycle.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<()> {
    let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res?,
        _ = term.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
