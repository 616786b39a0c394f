use anyhow::Result;
use rand::Rng;
use std::fmt;
use tokio::task::JoinSet;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use super::SklandClient;
use super::job::SignInJob;
use super::session::SklandSession;
use crate::core::config::AccountConfig;
use crate::core::notifier::Notifier;

/// Latest hour (inclusive) a daily sign-in may fire at.
const LATEST_FIRE_HOUR: u32 = 8;

/// Local time of day a job fires. Drawn once per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FireTime {
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl FireTime {
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Self {
            hour: rng.gen_range(0..=LATEST_FIRE_HOUR),
            minute: rng.gen_range(0..=59),
            second: rng.gen_range(0..=59),
        }
    }

    /// Six-field cron expression (seconds first) firing daily at this time.
    pub fn cron_expression(&self) -> String {
        format!("{} {} {} * * *", self.second, self.minute, self.hour)
    }
}

impl fmt::Display for FireTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

pub struct ScheduledSignIn {
    pub job: SignInJob,
    pub fire_time: FireTime,
}

/// Turns configured accounts into daily sign-in jobs.
pub struct SignInScheduler {
    client: SklandClient,
    notifier: Notifier,
}

impl SignInScheduler {
    pub fn new(client: SklandClient, notifier: Notifier) -> Self {
        Self { client, notifier }
    }

    /// Builds one job per usable account. Handshakes run concurrently; accounts
    /// with incomplete config or credentials the service rejects are logged and
    /// skipped. Jobs come back in config order.
    pub async fn build(&self, accounts: &[AccountConfig]) -> Vec<ScheduledSignIn> {
        let mut handshakes = JoinSet::new();
        for (index, account) in accounts.iter().enumerate() {
            if let Err(e) = account.validate() {
                error!("Skipping daily sign-in: {}", e);
                continue;
            }
            let client = self.client.clone();
            let account = account.clone();
            handshakes.spawn(async move {
                let result = SklandSession::establish(&client, &account).await;
                (index, account, result)
            });
        }

        let mut verified = Vec::with_capacity(handshakes.len());
        while let Some(joined) = handshakes.join_next().await {
            match joined {
                Ok((index, account, Ok(_))) => verified.push((index, account)),
                Ok((_, _, Err(e))) => error!("Skipping daily sign-in: {}", e),
                Err(e) => error!("Sign-in handshake task failed: {}", e),
            }
        }
        verified.sort_by_key(|(index, _)| *index);

        verified
            .into_iter()
            .map(|(_, account)| {
                let fire_time = FireTime::random(&mut rand::thread_rng());
                info!(
                    "Account [{}] will sign in daily at {}",
                    account.phone, fire_time
                );
                ScheduledSignIn {
                    job: SignInJob::new(self.client.clone(), account, self.notifier.clone()),
                    fire_time,
                }
            })
            .collect()
    }

    /// Registers every job with the cron scheduler, in local time. Returns how
    /// many were accepted.
    pub async fn register(jobs: Vec<ScheduledSignIn>, scheduler: &JobScheduler) -> Result<usize> {
        let mut registered = 0;
        for ScheduledSignIn { job, fire_time } in jobs {
            let account = job.account().to_string();
            let cron_expr = fire_time.cron_expression();

            match Job::new_async_tz(cron_expr.as_str(), chrono::Local, move |_uuid, mut _l| {
                let job = job.clone();
                Box::pin(async move {
                    job.run().await;
                })
            }) {
                Ok(cron_job) => match scheduler.add(cron_job).await {
                    Ok(_) => registered += 1,
                    Err(e) => {
                        error!(
                            "Failed to register daily sign-in for [{}]: {}",
                            account, e
                        );
                    }
                },
                Err(e) => {
                    error!(
                        "Failed to create daily sign-in job for [{}] ({}): {}",
                        account, cron_expr, e
                    );
                }
            }
        }
        Ok(registered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::HandshakePhase;
    use crate::core::signin::SklandEndpoints;
    use crate::core::signin::session::LOGIN_PATH;
    use crate::core::signin::session::testing::{account, mount_handshake};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::time::{Duration, Instant};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn fire_times_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let t = FireTime::random(&mut rng);
            assert!(t.hour <= 8);
            assert!(t.minute <= 59);
            assert!(t.second <= 59);
        }
    }

    #[test]
    fn cron_expression_puts_seconds_first() {
        let t = FireTime {
            hour: 7,
            minute: 5,
            second: 42,
        };
        assert_eq!(t.cron_expression(), "42 5 7 * * *");
        assert_eq!(t.to_string(), "07:05:42");
    }

    #[tokio::test]
    async fn rejected_login_registers_no_job() {
        let server = MockServer::start().await;
        mount_handshake(&server, Some(HandshakePhase::Login)).await;
        let scheduler = SignInScheduler::new(
            SklandClient::new(SklandEndpoints::single(&server.uri())).unwrap(),
            Notifier::disabled(),
        );

        let jobs = scheduler.build(&[account("p1")]).await;
        assert!(jobs.is_empty());
    }

    #[tokio::test]
    async fn slow_logins_are_verified_concurrently() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"status": 100, "msg": "busy"}))
                    .set_delay(Duration::from_secs(1)),
            )
            .expect(3)
            .mount(&server)
            .await;
        let scheduler = SignInScheduler::new(
            SklandClient::new(SklandEndpoints::single(&server.uri())).unwrap(),
            Notifier::disabled(),
        );

        let started = Instant::now();
        let jobs = scheduler
            .build(&[account("p1"), account("p2"), account("p3")])
            .await;
        assert!(jobs.is_empty());
        assert!(
            started.elapsed() < Duration::from_millis(2500),
            "handshakes ran one after another: {:?}",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn jobs_keep_config_order() {
        let server = MockServer::start().await;
        mount_handshake(&server, None).await;
        let scheduler = SignInScheduler::new(
            SklandClient::new(SklandEndpoints::single(&server.uri())).unwrap(),
            Notifier::disabled(),
        );

        let jobs = scheduler
            .build(&[account("p1"), account("p2"), account("p3")])
            .await;
        let order: Vec<&str> = jobs.iter().map(|s| s.job.account()).collect();
        assert_eq!(order, vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn valid_accounts_are_scheduled_and_invalid_skipped() {
        let server = MockServer::start().await;
        mount_handshake(&server, None).await;
        let scheduler = SignInScheduler::new(
            SklandClient::new(SklandEndpoints::single(&server.uri())).unwrap(),
            Notifier::disabled(),
        );
        let mut blank = account("p2");
        blank.uid = String::new();

        let jobs = scheduler.build(&[account("p1"), blank]).await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job.account(), "p1");
        assert!(jobs[0].fire_time.hour <= 8);

        let cron = JobScheduler::new().await.unwrap();
        assert_eq!(SignInScheduler::register(jobs, &cron).await.unwrap(), 1);
    }
}
