mod handlers;
mod router;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use axum_server::tls_rustls::RustlsConfig;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::core::config::ServerConfig;
use crate::core::lifecycle::LifecycleComponent;
use crate::core::presence::PresenceStore;

/// How long shutdown waits for in-flight requests.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) presence: PresenceStore,
}

enum Shutdown {
    Plain(oneshot::Sender<()>),
    Tls(axum_server::Handle),
}

/// HTTP listener for the report and query endpoints, plain or TLS.
pub struct ApiServer {
    presence: PresenceStore,
    config: ServerConfig,
    shutdown: Option<Shutdown>,
    task: Option<JoinHandle<()>>,
}

impl ApiServer {
    pub fn new(presence: PresenceStore, config: ServerConfig) -> Self {
        Self {
            presence,
            config,
            shutdown: None,
            task: None,
        }
    }
}

#[async_trait]
impl LifecycleComponent for ApiServer {
    async fn on_init(&mut self) -> Result<()> {
        info!("API Server Interface initializing...");
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let app = router::build_api_router(AppState {
            presence: self.presence.clone(),
        });

        if let Some((cert, key)) = self.config.tls_paths() {
            let tls = RustlsConfig::from_pem_file(cert, key)
                .await
                .with_context(|| format!("loading TLS certificate {}", cert.display()))?;
            let socket_addr = tokio::net::lookup_host(&addr)
                .await?
                .next()
                .ok_or_else(|| anyhow!("cannot resolve listen address {}", addr))?;
            let handle = axum_server::Handle::new();
            let server = axum_server::bind_rustls(socket_addr, tls).handle(handle.clone());

            info!("API Server running at https://{addr}");
            self.task = Some(tokio::spawn(async move {
                if let Err(e) = server.serve(app.into_make_service()).await {
                    error!("API Server crashed: {}", e);
                }
            }));
            self.shutdown = Some(Shutdown::Tls(handle));
        } else {
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("binding {}", addr))?;
            let (tx, rx) = oneshot::channel::<()>();

            info!("API Server running at http://{addr}");
            self.task = Some(tokio::spawn(async move {
                let graceful = async {
                    let _ = rx.await;
                };
                if let Err(e) = axum::serve(listener, app)
                    .with_graceful_shutdown(graceful)
                    .await
                {
                    error!("API Server crashed: {}", e);
                }
            }));
            self.shutdown = Some(Shutdown::Plain(tx));
        }
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("API Server Interface shutting down...");
        match self.shutdown.take() {
            Some(Shutdown::Plain(tx)) => {
                let _ = tx.send(());
            }
            Some(Shutdown::Tls(handle)) => handle.graceful_shutdown(Some(DRAIN_TIMEOUT)),
            None => {}
        }
        if let Some(task) = self.task.take() {
            if tokio::time::timeout(DRAIN_TIMEOUT, task).await.is_err() {
                warn!("API Server did not drain within {:?}", DRAIN_TIMEOUT);
            }
        }
        Ok(())
    }
}
