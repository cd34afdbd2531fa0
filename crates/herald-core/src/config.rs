//! Herald configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HeraldConfig {
    /// Admin user ids allowed to stage broadcasts.
    #[serde(default)]
    pub admins: Vec<i64>,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub reminder: ReminderConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

impl HeraldConfig {
    /// Load config from the default path (~/.herald/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::HeraldError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| crate::error::HeraldError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".herald")
            .join("config.toml")
    }
}

/// Telegram Bot API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

fn bool_true() -> bool { true }
fn default_poll_interval() -> u64 { 1 }

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            enabled: true,
            poll_interval: default_poll_interval(),
        }
    }
}

/// Staging, queue, and progress tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// How long a staged proposal waits for confirmation.
    #[serde(default = "default_proposal_ttl")]
    pub proposal_ttl_secs: u64,
    /// How often the staging store sweeps expired proposals.
    #[serde(default = "default_staging_sweep")]
    pub staging_sweep_secs: u64,
    /// Bounded queue capacity; producers block above this.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Edit the live status message every N deliveries.
    #[serde(default = "default_progress_every")]
    pub progress_update_every: usize,
    /// Bookkeeping TTL for progress state whose target went away.
    #[serde(default = "default_progress_ttl")]
    pub progress_ttl_secs: u64,
    /// How often the progress projector sweeps stale state.
    #[serde(default = "default_progress_sweep")]
    pub progress_sweep_secs: u64,
}

fn default_proposal_ttl() -> u64 { 600 }
fn default_staging_sweep() -> u64 { 300 }
fn default_queue_capacity() -> usize { 100 }
fn default_progress_every() -> usize { 5 }
fn default_progress_ttl() -> u64 { 3600 }
fn default_progress_sweep() -> u64 { 300 }

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            proposal_ttl_secs: default_proposal_ttl(),
            staging_sweep_secs: default_staging_sweep(),
            queue_capacity: default_queue_capacity(),
            progress_update_every: default_progress_every(),
            progress_ttl_secs: default_progress_ttl(),
            progress_sweep_secs: default_progress_sweep(),
        }
    }
}

impl BroadcastConfig {
    pub fn proposal_ttl(&self) -> Duration {
        Duration::from_secs(self.proposal_ttl_secs)
    }
}

/// Reminder escalation tunables. The doubling interval and the pre-warning
/// window carry no business meaning beyond "nag harder, then shut up".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    /// Delay before the first reminder (one-shot, not tied to the tick).
    #[serde(default = "default_first_after")]
    pub first_after_secs: u64,
    /// Starting interval between reminders; doubles each time.
    #[serde(default = "default_base_interval")]
    pub base_interval_secs: u64,
    /// Cap on the doubled interval.
    #[serde(default = "default_max_interval")]
    pub max_interval_secs: u64,
    /// Once remaining TTL drops under this, send one pre-warning and stop.
    #[serde(default = "default_pre_warning")]
    pub pre_warning_secs: u64,
    /// Periodic scan cadence.
    #[serde(default = "default_reminder_tick")]
    pub tick_secs: u64,
}

fn default_first_after() -> u64 { 30 }
fn default_base_interval() -> u64 { 30 }
fn default_max_interval() -> u64 { 1920 }
fn default_pre_warning() -> u64 { 300 }
fn default_reminder_tick() -> u64 { 60 }

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            first_after_secs: default_first_after(),
            base_interval_secs: default_base_interval(),
            max_interval_secs: default_max_interval(),
            pre_warning_secs: default_pre_warning(),
            tick_secs: default_reminder_tick(),
        }
    }
}

/// Conversational workflow tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Idle contexts older than this are destroyed.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// Idle sweep cadence.
    #[serde(default = "default_workflow_sweep")]
    pub sweep_secs: u64,
}

fn default_idle_timeout() -> u64 { 1800 }
fn default_workflow_sweep() -> u64 { 60 }

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            sweep_secs: default_workflow_sweep(),
        }
    }
}
