/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Schedule defaults
pub const DEFAULT_CONFIG_FILE: &str = "slotkeeper.toml";
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_FORCE_REFRESH_INTERVAL_SECS: u64 = 600;
pub const DEFAULT_SNAPSHOT_PATH: &str = "./data/agenda.json";
pub const DEFAULT_SHEETS_ENDPOINT: &str = "https://sheets.googleapis.com";
pub const DEFAULT_SHEETS_RANGE: &str = "agenda";
pub const DEFAULT_SHEETS_REQUEST_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_TABLE_FILE_PATH: &str = "./data/agenda-table.json";

// Scheduler defaults
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 1;
pub const DEFAULT_DUE_TOLERANCE_SECS: u64 = 90;
pub const DEFAULT_SLOT_RETENTION_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_FREE2UP_POLL_INTERVAL_SECS: u64 = 30;

// Supervisor defaults
pub const DEFAULT_LIVENESS_DIR: &str = "/run/slotkeeper";
pub const DEFAULT_TERMINATE_GRACE_SECS: u64 = 3;
pub const DEFAULT_SETTLE_DELAY_SECS: u64 = 30;
pub const DEFAULT_ENCODER_PROCESS_NAME: &str = "ffmpeg";
pub const DEFAULT_CAPTURE_DEADLINE_MARGIN_SECS: u64 = 60;
pub const DEFAULT_INSTANCE_LOCK_PATH: &str = "/run/slotkeeper/slotkeeper.lock";

// Worker defaults
pub const DEFAULT_WORKER_INTERPRETER: &str = "python3";
pub const DEFAULT_RECORD_SCRIPT: &str = "/opt/capture/01v4record.py";
pub const DEFAULT_UPLOAD_SCRIPT: &str = "/opt/capture/02upload.py";
pub const DEFAULT_CONTINUOUS_SCRIPT: &str = "/opt/capture/03gravcont.py";
pub const DEFAULT_STREAM_SCRIPT: &str = "/opt/capture/05streamyt.py";
pub const DEFAULT_BROADCAST_SCRIPT: &str = "/opt/capture/a07broadcast.py";

// Media defaults
pub const DEFAULT_RECORDED_DIR: &str = "./recorded";
pub const DEFAULT_UPLOADED_DIR: &str = "./uploaded";
pub const DEFAULT_UPLOADED_EXTENSION: &str = "uploaded";

// Gate defaults
pub const DEFAULT_GRACE_BEFORE_SECS: u64 = 90;
pub const DEFAULT_GRACE_AFTER_SECS: u64 = 300;

// Logging defaults
pub const DEFAULT_LOG_LEVEL: &str = "info";

// Environment
pub const ENV_PREFIX: &str = "SLOTKEEPER_";
pub const ENV_CONFIG_FILE: &str = "SLOTKEEPER_CONFIG";
pub const ENV_LEGACY_REFRESH_INTERVAL: &str = "AGENDA_REFRESH_INTERVAL";
pub const ENV_CUSTOMER: &str = "CUSTOMER";
pub const ENV_EQUIPMENT: &str = "EQUIPMENT";
pub const UNKNOWN_BINDING: &str = "unknown";
