mod snapshot;

pub use snapshot::PresencePersistence;

use chrono::{DateTime, Local, TimeDelta};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::core::error::MailError;
use crate::core::notifier::Notifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Online,
    Offline,
}

impl Action {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "online" => Some(Action::Online),
            "offline" => Some(Action::Offline),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Online => f.write_str("online"),
            Action::Offline => f.write_str("offline"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceRecord {
    pub action: Action,
    pub at: DateTime<Local>,
}

/// Answer to a query on a known agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastSeen {
    pub action: Action,
    pub elapsed: TimeDelta,
}

#[derive(Default)]
struct PresenceState {
    records: HashMap<String, PresenceRecord>,
    /// Agents queried while online; an offline report for them sends one notice.
    waiting: HashSet<String>,
}

/// Last reported action per agent plus the armed offline notifications.
///
/// Records and the waiting set share one lock. Notifications are sent after the
/// lock is released, so a slow mail server never stalls reports or queries.
#[derive(Clone)]
pub struct PresenceStore {
    state: Arc<Mutex<PresenceState>>,
    notifier: Notifier,
}

impl PresenceStore {
    pub fn new(notifier: Notifier) -> Self {
        Self {
            state: Arc::new(Mutex::new(PresenceState::default())),
            notifier,
        }
    }

    pub async fn report(&self, agent: &str, action: Action) -> Result<(), MailError> {
        let should_notify = {
            let mut state = self.state.lock().await;
            state.records.insert(
                agent.to_string(),
                PresenceRecord {
                    action,
                    at: Local::now(),
                },
            );
            action == Action::Offline && state.waiting.remove(agent)
        };
        debug!("Agent [{}] reported {}", agent, action);

        if should_notify {
            info!("Agent [{}] went offline after a query, notifying", agent);
            self.notifier.notify_offline(agent).await?;
        }
        Ok(())
    }

    /// `None` when the agent never reported. Observing `online` arms the
    /// offline notification.
    pub async fn query(&self, agent: &str) -> Option<LastSeen> {
        let mut state = self.state.lock().await;
        let record = *state.records.get(agent)?;
        if record.action == Action::Online {
            state.waiting.insert(agent.to_string());
        }
        Some(LastSeen {
            action: record.action,
            elapsed: Local::now() - record.at,
        })
    }

    #[cfg(test)]
    pub async fn is_waiting(&self, agent: &str) -> bool {
        self.state.lock().await.waiting.contains(agent)
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }
}

/// Renders an elapsed time as "1 day 0 hours 3 minutes 0 seconds".
///
/// Seconds are always shown; once a larger unit is shown every smaller unit follows.
pub fn display_duration(elapsed: TimeDelta) -> String {
    let total = elapsed.num_seconds();
    let days = total.div_euclid(86_400);
    let rest = total.rem_euclid(86_400);
    let hours = rest / 3600;
    let minutes = rest % 3600 / 60;
    let seconds = rest % 60;

    let mut parts = Vec::with_capacity(4);
    if days != 0 {
        parts.push(unit(days, "day"));
    }
    if hours != 0 || !parts.is_empty() {
        parts.push(unit(hours, "hour"));
    }
    if minutes != 0 || !parts.is_empty() {
        parts.push(unit(minutes, "minute"));
    }
    parts.push(unit(seconds, "second"));
    parts.join(" ")
}

fn unit(amount: i64, name: &str) -> String {
    if amount.abs() == 1 {
        format!("{} {}", amount, name)
    } else {
        format!("{} {}s", amount, name)
    }
}
