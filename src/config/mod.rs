use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use sysinfo::System;

pub mod defaults;
pub mod duration_serde;

use crate::errors::{AppError, AppResult};
use crate::models::Role;
use defaults::*;
use duration_serde::duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub node: NodeConfig,
    pub schedule: ScheduleConfig,
    pub scheduler: SchedulerConfig,
    pub supervisor: SupervisorConfig,
    pub workers: WorkersConfig,
    pub media: MediaConfig,
    pub gate: GateConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Identity matched against the schedule's equipment column. Falls back to the
    /// host name.
    pub id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleSourceKind {
    #[default]
    Sheets,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub source: ScheduleSourceKind,
    /// Opportunistic refresh cadence
    #[serde(with = "duration")]
    pub refresh_interval: Duration,
    /// Unconditional refresh cadence, rewrites the snapshot even when unchanged
    #[serde(with = "duration")]
    pub force_refresh_interval: Duration,
    pub snapshot_path: PathBuf,
    pub sheets: SheetsConfig,
    pub file: TableFileConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetsConfig {
    pub endpoint: String,
    pub spreadsheet_id: Option<String>,
    /// Sheet name or A1 range
    pub range: String,
    pub api_key: Option<String>,
    /// File holding an OAuth bearer token, rotated by an external helper
    pub access_token_file: Option<PathBuf>,
    #[serde(with = "duration")]
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TableFileConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    #[serde(with = "duration")]
    pub tick_interval: Duration,
    /// Symmetric tolerance around an entry's start for the due check
    #[serde(with = "duration")]
    pub due_tolerance: Duration,
    /// How long an executed slot blocks re-enqueueing
    #[serde(with = "duration")]
    pub slot_retention: Duration,
    #[serde(with = "duration")]
    pub free2up_poll_interval: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub liveness_dir: PathBuf,
    #[serde(with = "duration")]
    pub terminate_grace: Duration,
    /// Pause after reclaiming a role so capture devices are released
    #[serde(with = "duration")]
    pub settle_delay: Duration,
    /// Process names force-killed system-wide on every reclaim
    pub encoder_process_names: Vec<String>,
    #[serde(with = "duration")]
    pub capture_deadline_margin: Duration,
    pub instance_lock_path: PathBuf,
}

/// Program plus leading arguments for one worker role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl WorkerCommand {
    fn script(path: &str) -> Self {
        Self {
            program: DEFAULT_WORKER_INTERPRETER.to_string(),
            args: vec![path.to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub record: WorkerCommand,
    pub continuous: WorkerCommand,
    pub stream: WorkerCommand,
    pub upload: WorkerCommand,
    pub broadcast: WorkerCommand,
}

impl WorkersConfig {
    pub fn for_role(&self, role: Role) -> &WorkerCommand {
        match role {
            Role::Record => &self.record,
            Role::Continuous => &self.continuous,
            Role::Stream => &self.stream,
            Role::Upload => &self.upload,
            Role::Broadcast => &self.broadcast,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub recorded_dir: PathBuf,
    pub uploaded_dir: PathBuf,
    /// Extension marking media that was uploaded but not yet broadcast
    pub uploaded_extension: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    #[serde(with = "duration")]
    pub grace_before: Duration,
    #[serde(with = "duration")]
    pub grace_after: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            source: ScheduleSourceKind::default(),
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            force_refresh_interval: Duration::from_secs(DEFAULT_FORCE_REFRESH_INTERVAL_SECS),
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
            sheets: SheetsConfig::default(),
            file: TableFileConfig::default(),
        }
    }
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_SHEETS_ENDPOINT.to_string(),
            spreadsheet_id: None,
            range: DEFAULT_SHEETS_RANGE.to_string(),
            api_key: None,
            access_token_file: None,
            request_timeout: Duration::from_secs(DEFAULT_SHEETS_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl Default for TableFileConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_TABLE_FILE_PATH),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(DEFAULT_TICK_INTERVAL_SECS),
            due_tolerance: Duration::from_secs(DEFAULT_DUE_TOLERANCE_SECS),
            slot_retention: Duration::from_secs(DEFAULT_SLOT_RETENTION_SECS),
            free2up_poll_interval: Duration::from_secs(DEFAULT_FREE2UP_POLL_INTERVAL_SECS),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            liveness_dir: PathBuf::from(DEFAULT_LIVENESS_DIR),
            terminate_grace: Duration::from_secs(DEFAULT_TERMINATE_GRACE_SECS),
            settle_delay: Duration::from_secs(DEFAULT_SETTLE_DELAY_SECS),
            encoder_process_names: vec![DEFAULT_ENCODER_PROCESS_NAME.to_string()],
            capture_deadline_margin: Duration::from_secs(DEFAULT_CAPTURE_DEADLINE_MARGIN_SECS),
            instance_lock_path: PathBuf::from(DEFAULT_INSTANCE_LOCK_PATH),
        }
    }
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            record: WorkerCommand::script(DEFAULT_RECORD_SCRIPT),
            continuous: WorkerCommand::script(DEFAULT_CONTINUOUS_SCRIPT),
            stream: WorkerCommand::script(DEFAULT_STREAM_SCRIPT),
            upload: WorkerCommand::script(DEFAULT_UPLOAD_SCRIPT),
            broadcast: WorkerCommand::script(DEFAULT_BROADCAST_SCRIPT),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            recorded_dir: PathBuf::from(DEFAULT_RECORDED_DIR),
            uploaded_dir: PathBuf::from(DEFAULT_UPLOADED_DIR),
            uploaded_extension: DEFAULT_UPLOADED_EXTENSION.to_string(),
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            grace_before: Duration::from_secs(DEFAULT_GRACE_BEFORE_SECS),
            grace_after: Duration::from_secs(DEFAULT_GRACE_AFTER_SECS),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Layered configuration sources, lowest precedence first:
    /// 1. Built-in defaults
    /// 2. TOML file (missing file is fine)
    /// 3. Legacy `AGENDA_REFRESH_INTERVAL` (seconds)
    /// 4. `SLOTKEEPER_` environment variables, `__` separating sections
    pub fn figment(config_file: Option<&Path>) -> Figment {
        let config_file = config_file
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(ENV_CONFIG_FILE).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
            .merge(
                Env::raw()
                    .only(&[ENV_LEGACY_REFRESH_INTERVAL])
                    .map(|_| "schedule.refresh_interval".into()),
            )
            .merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]).split("__"))
    }

    pub fn load(config_file: Option<&Path>) -> AppResult<Self> {
        let config: Config = Self::figment(config_file)
            .extract()
            .map_err(|e| AppError::configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.scheduler.tick_interval.is_zero() {
            return Err(AppError::configuration(
                "scheduler.tick_interval must be greater than zero",
            ));
        }
        if self.schedule.refresh_interval.is_zero() {
            return Err(AppError::configuration(
                "schedule.refresh_interval must be greater than zero",
            ));
        }
        if self.schedule.force_refresh_interval.is_zero() {
            return Err(AppError::configuration(
                "schedule.force_refresh_interval must be greater than zero",
            ));
        }
        // A fired slot has to be remembered for the whole window in which it is due
        if self.scheduler.slot_retention <= self.scheduler.due_tolerance * 2 {
            return Err(AppError::configuration(format!(
                "scheduler.slot_retention ({}) must exceed twice scheduler.due_tolerance ({})",
                humantime::format_duration(self.scheduler.slot_retention),
                humantime::format_duration(self.scheduler.due_tolerance)
            )));
        }
        if self.schedule.source == ScheduleSourceKind::Sheets {
            let sheets = &self.schedule.sheets;
            if sheets.spreadsheet_id.as_deref().is_none_or(str::is_empty) {
                return Err(AppError::configuration(
                    "schedule.sheets.spreadsheet_id is required for the sheets source",
                ));
            }
            if sheets.api_key.is_none() && sheets.access_token_file.is_none() {
                return Err(AppError::configuration(
                    "schedule.sheets needs either api_key or access_token_file",
                ));
            }
        }
        for role in Role::ALL {
            if self.workers.for_role(role).program.trim().is_empty() {
                return Err(AppError::configuration(format!(
                    "workers.{role}.program must not be empty"
                )));
            }
        }
        Ok(())
    }

    /// This node's identity: configured id, else the host name, else "unknown"
    pub fn node_id(&self) -> String {
        self.node
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .or_else(System::host_name)
            .unwrap_or_else(|| UNKNOWN_BINDING.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_match_appliance_timings() {
        let config = Config::default();
        assert_eq!(config.schedule.refresh_interval, Duration::from_secs(30));
        assert_eq!(config.schedule.force_refresh_interval, Duration::from_secs(600));
        assert_eq!(config.scheduler.due_tolerance, Duration::from_secs(90));
        assert_eq!(config.supervisor.terminate_grace, Duration::from_secs(3));
        assert_eq!(config.supervisor.settle_delay, Duration::from_secs(30));
        assert_eq!(config.gate.grace_after, Duration::from_secs(300));
        assert_eq!(config.supervisor.encoder_process_names, vec!["ffmpeg"]);
    }

    #[test]
    fn test_toml_then_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "node.toml",
                r#"
                [node]
                id = "cam-07"

                [schedule]
                source = "file"
                refresh_interval = "45s"

                [workers.record]
                program = "/usr/bin/record"
                args = ["--device", "/dev/video0"]
                "#,
            )?;
            jail.set_env("SLOTKEEPER_SUPERVISOR__SETTLE_DELAY", "5");
            jail.set_env("SLOTKEEPER_LOGGING__FORMAT", "json");

            let config: Config = Config::figment(Some(Path::new("node.toml"))).extract()?;
            assert_eq!(config.node_id(), "cam-07");
            assert_eq!(config.schedule.source, ScheduleSourceKind::File);
            assert_eq!(config.schedule.refresh_interval, Duration::from_secs(45));
            assert_eq!(config.supervisor.settle_delay, Duration::from_secs(5));
            assert_eq!(config.logging.format, LogFormat::Json);
            assert_eq!(config.workers.record.args, vec!["--device", "/dev/video0"]);
            assert_eq!(config.workers.upload.program, "python3");
            Ok(())
        });
    }

    #[test]
    fn test_legacy_refresh_interval_is_honoured() {
        Jail::expect_with(|jail| {
            jail.set_env("AGENDA_REFRESH_INTERVAL", "12");
            let config: Config = Config::figment(Some(Path::new("absent.toml"))).extract()?;
            assert_eq!(config.schedule.refresh_interval, Duration::from_secs(12));
            Ok(())
        });
    }

    #[test]
    fn test_sheets_source_requires_spreadsheet_and_credentials() {
        let mut config = Config::default();
        assert!(config.validate().is_err());

        config.schedule.sheets.spreadsheet_id = Some("abc".into());
        assert!(config.validate().is_err());

        config.schedule.sheets.api_key = Some("key".into());
        assert!(config.validate().is_ok());

        config.schedule.source = ScheduleSourceKind::File;
        config.schedule.sheets = SheetsConfig::default();
        assert!(config.validate().is_ok());
    }

    fn file_sourced() -> Config {
        let mut config = Config::default();
        config.schedule.source = ScheduleSourceKind::File;
        config
    }

    #[test]
    fn test_zero_force_refresh_interval_is_rejected() {
        let mut config = file_sourced();
        config.schedule.force_refresh_interval = Duration::ZERO;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("force_refresh_interval"));
    }

    #[test]
    fn test_slot_retention_must_outlast_due_window() {
        let mut config = file_sourced();
        config.scheduler.due_tolerance = Duration::from_secs(90);

        config.scheduler.slot_retention = Duration::from_secs(180);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("slot_retention"));

        config.scheduler.slot_retention = Duration::from_secs(181);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_blank_node_id_falls_back() {
        let mut config = Config::default();
        config.node.id = Some("   ".into());
        assert!(!config.node_id().trim().is_empty());
    }
}
