use clap::Args;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address the REST API binds to
    pub host: String,

    /// Port for the REST API server
    pub port: u16,

    /// Log level name
    pub log_level: String,

    /// Settings shared by every analysis run
    pub analysis: AnalysisConfig,
}

/// Per-process analysis settings, read-only after startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Largest accepted capture, in bytes
    pub max_capture_bytes: usize,

    /// Wall-clock budget for one whole analysis
    pub analysis_timeout_secs: u64,

    /// Parent directory for per-request work directories (system temp dir when unset)
    pub work_dir: Option<PathBuf>,

    /// Optional Wireshark `manuf` file used for MAC vendor labels
    pub oui_file: Option<PathBuf>,

    /// Keep EVE events of unrecognized types in the output
    pub keep_unclassified_events: bool,

    /// Signature engine invocation
    pub engine: EngineConfig,
}

/// How the external signature engine is invoked
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Run the engine at all
    pub enabled: bool,

    /// Engine executable, looked up in PATH when relative
    pub binary: PathBuf,

    /// Engine configuration file (`-c`)
    pub config_file: Option<PathBuf>,

    /// Rule file (`-S`), replacing the rules named in the configuration
    pub rules_file: Option<PathBuf>,

    /// Budget for one engine run
    pub timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            log_level: "info".to_string(),
            analysis: AnalysisConfig::default(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_capture_bytes: 50 * 1024 * 1024,
            analysis_timeout_secs: 120,
            work_dir: None,
            oui_file: None,
            keep_unclassified_events: false,
            engine: EngineConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            binary: PathBuf::from("suricata"),
            config_file: None,
            rules_file: None,
            timeout_secs: 90,
        }
    }
}

impl AnalysisConfig {
    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_secs)
    }
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Analysis flags shared by the server and the offline analyzer
#[derive(Args, Debug, Clone)]
pub struct AnalysisArgs {
    /// Largest accepted capture, in megabytes
    #[clap(long, default_value = "50")]
    pub max_upload_mb: usize,

    /// Budget for one whole analysis, in seconds
    #[clap(long, default_value = "120")]
    pub analysis_timeout: u64,

    /// Budget for the signature engine run, in seconds
    #[clap(long, default_value = "90")]
    pub engine_timeout: u64,

    /// Suricata executable
    #[clap(long, default_value = "suricata")]
    pub suricata_bin: PathBuf,

    /// Suricata configuration file
    #[clap(long)]
    pub suricata_config: Option<PathBuf>,

    /// Rule file to load instead of the configured rules
    #[clap(long)]
    pub suricata_rules: Option<PathBuf>,

    /// Skip the signature engine entirely
    #[clap(long)]
    pub no_engine: bool,

    /// Wireshark `manuf` file for MAC vendor names
    #[clap(long)]
    pub oui_file: Option<PathBuf>,

    /// Keep EVE events of unrecognized types
    #[clap(long)]
    pub keep_unclassified_events: bool,

    /// Parent directory for temporary work directories
    #[clap(long)]
    pub work_dir: Option<PathBuf>,
}

impl From<AnalysisArgs> for AnalysisConfig {
    fn from(args: AnalysisArgs) -> Self {
        Self {
            max_capture_bytes: args.max_upload_mb.saturating_mul(1024 * 1024),
            analysis_timeout_secs: args.analysis_timeout,
            work_dir: args.work_dir,
            oui_file: args.oui_file,
            keep_unclassified_events: args.keep_unclassified_events,
            engine: EngineConfig {
                enabled: !args.no_engine,
                binary: args.suricata_bin,
                config_file: args.suricata_config,
                rules_file: args.suricata_rules,
                timeout_secs: args.engine_timeout,
            },
        }
    }
}
