use futures::future::try_join3;
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tokio::task::{spawn_blocking, JoinError};
use tokio::time::timeout;
use uuid::Uuid;

use crate::analysis::endpoints::{extract_endpoints, EndpointReport};
use crate::analysis::hierarchy::build_hierarchy;
use crate::analysis::resolver::{CaptureResolver, OuiTable, PassiveDns};
use crate::analysis::streams::{reassemble, StreamSet};
use crate::capture::decoder::CaptureDecoder;
use crate::ids::engine::{EngineError, SignatureEngine};
use crate::ids::SuricataReport;
use crate::models::capture::CaptureInfo;
use crate::models::config::AnalysisConfig;
use crate::models::result::{AnalysisResult, ProtocolNode, STREAM_ORDERING};
use crate::utils::error::{AppError, AppResult};

/// Capture file extensions handed to the engine unchanged
const CAPTURE_EXTENSIONS: &[&str] = &["pcap", "pcapng", "cap"];

/// Outputs of the decode and fan-out stage
struct CaptureAnalysis {
    info: CaptureInfo,
    hierarchy: Vec<ProtocolNode>,
    endpoints: EndpointReport,
    streams: StreamSet,
}

/// Runs every analysis step for one capture at a time
///
/// Built once at startup and shared read-only between requests.
pub struct Analyzer {
    config: AnalysisConfig,
    ouis: Arc<OuiTable>,
    engine: SignatureEngine,
}

impl Analyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        let ouis = match &config.oui_file {
            Some(path) => OuiTable::with_manuf_file(path),
            None => OuiTable::builtin(),
        };
        let engine = SignatureEngine::new(config.engine.clone());

        Self {
            config,
            ouis: Arc::new(ouis),
            engine,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn engine_enabled(&self) -> bool {
        self.engine.is_enabled()
    }

    /// Analyze one capture file
    ///
    /// Fails as a whole on decode errors and on the analysis timeout. An
    /// engine failure only empties the `suricata` section. The per-run work
    /// directory is removed on every exit path, including cancellation.
    pub async fn analyze(&self, file_name: &str, data: Vec<u8>) -> AppResult<AnalysisResult> {
        let analysis_id = Uuid::new_v4();
        let started = Instant::now();
        info!("Analysis {} started: {} ({} bytes)", analysis_id, file_name, data.len());

        // Checked before anything touches the disk
        if data.len() > self.config.max_capture_bytes {
            return Err(AppError::CaptureTooLarge {
                size: data.len(),
                limit: self.config.max_capture_bytes,
            });
        }

        let outcome = match timeout(self.config.analysis_timeout(), self.run(analysis_id, file_name, data)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(AppError::Timeout(self.config.analysis_timeout_secs)),
        };

        match &outcome {
            Ok(result) => info!(
                "Analysis {} finished in {:.2}s: {} frames, {} TCP / {} UDP streams, {} alerts",
                analysis_id,
                started.elapsed().as_secs_f64(),
                result.capture_info.total_packets,
                result.tcp_streams.len(),
                result.udp_streams.len(),
                result.suricata.alert_count()
            ),
            Err(e) if e.kind() == "InternalError" => {
                error!("Analysis {} of {} failed: {:?}", analysis_id, file_name, e)
            }
            Err(e) => warn!("Analysis {} of {} rejected: {}", analysis_id, file_name, e),
        }

        outcome
    }

    async fn run(&self, analysis_id: Uuid, file_name: &str, data: Vec<u8>) -> AppResult<AnalysisResult> {
        let workspace = self.workspace()?;
        let capture_path = workspace.path().join(capture_file_name(file_name));
        let log_dir = workspace.path().join("logs");
        tokio::fs::write(&capture_path, &data).await?;
        tokio::fs::create_dir(&log_dir).await?;

        let data = Arc::new(data);
        let (analysis, suricata) = tokio::try_join!(
            self.decode_and_fan_out(data),
            self.run_engine(analysis_id, &capture_path, &log_dir)
        )?;

        // Dropping the TempDir removes the capture copy and the engine logs
        drop(workspace);

        Ok(AnalysisResult {
            analysis_id,
            file: file_name.to_string(),
            capture_info: analysis.info,
            protocol_hierarchy: analysis.hierarchy,
            mac_addresses: analysis.endpoints.mac_addresses,
            ip_addresses: analysis.endpoints.ip_addresses,
            external_resources: analysis.endpoints.external_resources,
            tcp_streams: analysis.streams.tcp_records(),
            udp_streams: analysis.streams.udp_records(),
            stream_ordering: STREAM_ORDERING.to_string(),
            suricata,
        })
    }

    /// Create the per-run directory under the configured work dir
    fn workspace(&self) -> AppResult<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("capscope-");
        let dir = match &self.config.work_dir {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    /// Decode, then build hierarchy, endpoints and streams in parallel
    async fn decode_and_fan_out(&self, data: Arc<Vec<u8>>) -> AppResult<CaptureAnalysis> {
        let decoder = CaptureDecoder::new(self.config.max_capture_bytes);
        let decoded = spawn_blocking(move || decoder.decode(&data))
            .await
            .map_err(worker_failed)??;

        let info = decoded.info;
        let frames = Arc::new(decoded.frames);

        let hierarchy = {
            let frames = frames.clone();
            spawn_blocking(move || build_hierarchy(frames.iter()))
        };
        let endpoints = {
            let frames = frames.clone();
            let ouis = self.ouis.clone();
            spawn_blocking(move || {
                let resolver = CaptureResolver::new(&ouis, PassiveDns::from_frames(frames.iter()));
                extract_endpoints(frames.iter(), &resolver)
            })
        };
        let streams = spawn_blocking(move || reassemble(frames.iter()));

        let (hierarchy, endpoints, streams) = try_join3(hierarchy, endpoints, streams)
            .await
            .map_err(worker_failed)?;

        Ok(CaptureAnalysis {
            info,
            hierarchy,
            endpoints,
            streams,
        })
    }

    /// Run the engine; failures degrade to an empty section
    async fn run_engine(&self, analysis_id: Uuid, capture: &Path, log_dir: &Path) -> AppResult<SuricataReport> {
        let report = match self.engine.run(capture, log_dir).await {
            Ok(logs) => SuricataReport::from_logs(logs, self.config.keep_unclassified_events),
            Err(EngineError::Disabled) => SuricataReport::failed(&EngineError::Disabled),
            Err(e) => {
                warn!("Analysis {}: {}", analysis_id, e);
                SuricataReport::failed(&e)
            }
        };
        Ok(report)
    }
}

/// Name of the capture copy given to the engine; the upload name is not trusted as a path
fn capture_file_name(upload_name: &str) -> PathBuf {
    let extension = Path::new(upload_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .filter(|ext| CAPTURE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or_else(|| "pcap".to_string());
    PathBuf::from(format!("capture.{}", extension))
}

fn worker_failed(e: JoinError) -> AppError {
    AppError::InternalError(format!("analysis worker failed: {}", e))
}
