use log::{debug, info, warn};
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

use crate::models::config::EngineConfig;

/// Log files the engine writes into its log directory
pub const EVE_LOG: &str = "eve.json";
pub const FAST_LOG: &str = "fast.log";
pub const STATS_LOG: &str = "stats.log";
pub const ENGINE_LOG: &str = "suricata.log";

/// Failure of the signature engine run
///
/// Never fails a request: the analysis still returns every other section.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("disabled")]
    Disabled,

    #[error("SecurityEngineFailed: could not start {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: io::Error,
    },

    #[error("SecurityEngineFailed: no result within {0} seconds")]
    Timeout(u64),

    #[error("SecurityEngineFailed: exited with {status} and wrote no logs")]
    NoLogs { status: String },

    #[error("SecurityEngineFailed: {0}")]
    Io(#[from] io::Error),
}

/// Raw contents of the engine's log files; a missing file is `None`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineLogs {
    pub eve: Option<String>,
    pub fast: Option<String>,
    pub stats: Option<String>,
    pub suricata: Option<String>,
}

impl EngineLogs {
    /// Read whatever logs exist in `dir`
    pub async fn collect(dir: &Path) -> Result<Self, EngineError> {
        Ok(Self {
            eve: read_optional(&dir.join(EVE_LOG)).await?,
            fast: read_optional(&dir.join(FAST_LOG)).await?,
            stats: read_optional(&dir.join(STATS_LOG)).await?,
            suricata: read_optional(&dir.join(ENGINE_LOG)).await?,
        })
    }

    /// At least one log has content
    pub fn has_output(&self) -> bool {
        [&self.eve, &self.fast, &self.stats, &self.suricata]
            .iter()
            .any(|log| log.as_deref().map_or(false, |text| !text.trim().is_empty()))
    }
}

async fn read_optional(path: &Path) -> Result<Option<String>, EngineError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(EngineError::Io(e)),
    }
}

/// Runs the external signature engine against a capture file
#[derive(Debug, Clone)]
pub struct SignatureEngine {
    config: EngineConfig,
}

impl SignatureEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Command line for one offline run: `<bin> -r <capture> -l <dir> -k none [-c cfg] [-S rules]`
    pub fn command(&self, capture: &Path, log_dir: &Path) -> Command {
        let mut command = Command::new(&self.config.binary);
        command
            .arg("-r")
            .arg(capture)
            .arg("-l")
            .arg(log_dir)
            .args(["-k", "none"]);

        if let Some(config_file) = &self.config.config_file {
            command.arg("-c").arg(config_file);
        }
        if let Some(rules_file) = &self.config.rules_file {
            command.arg("-S").arg(rules_file);
        }

        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    /// Run the engine and collect its logs
    ///
    /// A non-zero exit that still produced logs is logged and the logs are
    /// kept. Dropping the returned future kills the child.
    pub async fn run(&self, capture: &Path, log_dir: &Path) -> Result<EngineLogs, EngineError> {
        if !self.config.enabled {
            return Err(EngineError::Disabled);
        }

        let started = Instant::now();
        let child = self.command(capture, log_dir).spawn().map_err(|source| EngineError::Spawn {
            binary: self.config.binary.display().to_string(),
            source,
        })?;

        let output = match timeout(self.config.timeout(), child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!(
                    "Signature engine did not finish within {}s, killing it",
                    self.config.timeout_secs
                );
                return Err(EngineError::Timeout(self.config.timeout_secs));
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!("Signature engine stderr: {}", stderr.trim());
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!("Signature engine stdout: {}", stdout.trim());
        }

        let logs = EngineLogs::collect(log_dir).await?;

        if !output.status.success() {
            if !logs.has_output() {
                return Err(EngineError::NoLogs {
                    status: output.status.to_string(),
                });
            }
            warn!("Signature engine exited with {}, keeping the logs it wrote", output.status);
        }

        info!(
            "Signature engine finished in {:.2}s ({})",
            started.elapsed().as_secs_f64(),
            output.status
        );
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn config(binary: &Path) -> EngineConfig {
        EngineConfig {
            binary: binary.to_path_buf(),
            timeout_secs: 5,
            ..EngineConfig::default()
        }
    }

    #[cfg(unix)]
    fn script(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-engine.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Script prelude that stores the `-l` argument in $dir
    #[cfg(unix)]
    const FIND_LOG_DIR: &str = "while [ $# -gt 0 ]; do if [ \"$1\" = \"-l\" ]; then dir=\"$2\"; fi; shift; done";

    #[test]
    fn test_command_line() {
        let engine = SignatureEngine::new(EngineConfig {
            rules_file: Some(PathBuf::from("/etc/rules/local.rules")),
            ..EngineConfig::default()
        });
        let command = engine.command(Path::new("/tmp/x/capture.pcap"), Path::new("/tmp/x/logs"));
        let args: Vec<String> = command
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec!["-r", "/tmp/x/capture.pcap", "-l", "/tmp/x/logs", "-k", "none", "-S", "/etc/rules/local.rules"]
        );
    }

    #[tokio::test]
    async fn test_disabled() {
        let engine = SignatureEngine::new(EngineConfig {
            enabled: false,
            ..EngineConfig::default()
        });
        let err = engine.run(Path::new("a.pcap"), Path::new(".")).await.unwrap_err();
        assert!(matches!(err, EngineError::Disabled));
        assert_eq!(err.to_string(), "disabled");
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let dir = TempDir::new().unwrap();
        let engine = SignatureEngine::new(config(Path::new("/nonexistent/suricata-binary")));
        let err = engine.run(&dir.path().join("c.pcap"), dir.path()).await.unwrap_err();
        assert!(matches!(err, EngineError::Spawn { .. }));
        assert!(err.to_string().starts_with("SecurityEngineFailed"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_without_logs() {
        let dir = TempDir::new().unwrap();
        let binary = script(dir.path(), "echo boom >&2\nexit 3");
        let logs = dir.path().join("logs");
        std::fs::create_dir(&logs).unwrap();

        let err = SignatureEngine::new(config(&binary))
            .run(&dir.path().join("c.pcap"), &logs)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoLogs { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failure_with_logs_keeps_them() {
        let dir = TempDir::new().unwrap();
        let body = format!(
            "{}\necho '[**] x [**] [Priority: 1] {{TCP}} a -> b' > \"$dir/fast.log\"\nexit 1",
            FIND_LOG_DIR
        );
        let binary = script(dir.path(), &body);
        let logs = dir.path().join("logs");
        std::fs::create_dir(&logs).unwrap();

        let collected = SignatureEngine::new(config(&binary))
            .run(&dir.path().join("c.pcap"), &logs)
            .await
            .unwrap();
        assert!(collected.fast.unwrap().contains("[Priority: 1]"));
        assert!(collected.eve.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout() {
        let dir = TempDir::new().unwrap();
        let binary = script(dir.path(), "sleep 10");
        let engine = SignatureEngine::new(EngineConfig {
            timeout_secs: 1,
            ..config(&binary)
        });

        let err = engine.run(&dir.path().join("c.pcap"), dir.path()).await.unwrap_err();
        assert!(matches!(err, EngineError::Timeout(1)));
    }

    #[test]
    fn test_has_output() {
        assert!(!EngineLogs::default().has_output());
        let logs = EngineLogs {
            stats: Some("  \n".into()),
            ..EngineLogs::default()
        };
        assert!(!logs.has_output());
        let logs = EngineLogs {
            eve: Some("{}".into()),
            ..EngineLogs::default()
        };
        assert!(logs.has_output());
    }
}
