use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::JobScheduler;
use tracing::{info, warn};

use crate::core::signin::scheduler::{ScheduledSignIn, SignInScheduler};

#[derive(Debug, PartialEq)]
pub enum LifecycleState {
    Init,
    Serving,
    Ready,
    Shutdown,
}

#[async_trait::async_trait]
pub trait LifecycleComponent {
    async fn on_init(&mut self) -> Result<()> {
        Ok(())
    }
    async fn on_start(&mut self) -> Result<()> {
        Ok(())
    }
    async fn on_shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Starts components in attach order and shuts them down in the same order.
pub struct LifecycleManager {
    state: LifecycleState,
    components: Vec<Arc<Mutex<dyn LifecycleComponent + Send + Sync>>>,
    scheduler: JobScheduler,
    scheduler_running: bool,
    scheduled_jobs: usize,
}

impl LifecycleManager {
    pub async fn new() -> Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            state: LifecycleState::Init,
            components: Vec::new(),
            scheduler,
            scheduler_running: false,
            scheduled_jobs: 0,
        })
    }

    pub fn attach(&mut self, component: Arc<Mutex<dyn LifecycleComponent + Send + Sync>>) {
        self.components.push(component);
    }

    /// Registers the jobs and starts the cron scheduler once the first job is in.
    /// May be called after `start`.
    pub async fn schedule_sign_ins(&mut self, jobs: Vec<ScheduledSignIn>) -> Result<usize> {
        let registered = SignInScheduler::register(jobs, &self.scheduler).await?;
        self.scheduled_jobs += registered;

        if self.scheduled_jobs > 0 && !self.scheduler_running {
            info!(
                "Starting Scheduler with {} daily sign-in job(s)",
                self.scheduled_jobs
            );
            self.scheduler.start().await?;
            self.scheduler_running = true;
        }
        Ok(registered)
    }

    pub fn scheduled_jobs(&self) -> usize {
        self.scheduled_jobs
    }

    #[cfg(test)]
    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    pub async fn start(&mut self) -> Result<()> {
        info!("Lifecycle Phase: Init");
        self.state = LifecycleState::Init;
        for comp in &self.components {
            comp.lock().await.on_init().await?;
        }

        info!("Lifecycle Phase: Serving");
        self.state = LifecycleState::Serving;
        for comp in &self.components {
            comp.lock().await.on_start().await?;
        }

        info!("Lifecycle Phase: Ready");
        self.state = LifecycleState::Ready;

        Ok(())
    }

    /// Stops the scheduler, then every component in attach order. Idempotent.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.state == LifecycleState::Shutdown {
            return Ok(());
        }
        info!("Lifecycle Phase: Shutdown");
        self.state = LifecycleState::Shutdown;

        if self.scheduler_running {
            if let Err(e) = self.scheduler.shutdown().await {
                warn!("Scheduler shutdown error: {}", e);
            }
            self.scheduler_running = false;
        }

        for comp in &self.components {
            if let Err(e) = comp.lock().await.on_shutdown().await {
                warn!("Component shutdown error: {}", e);
            }
        }

        Ok(())
    }
}
