use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;

use capscope::analysis::Analyzer;
use capscope::models::config::{AnalysisArgs, AnalysisConfig};
use capscope::utils::logging;

/// Analyze a capture file offline and print the JSON result
#[derive(Parser, Debug)]
#[clap(author, version, about = "Analyze a pcap or pcap-ng file without the REST API")]
struct Args {
    /// Capture file to analyze
    file: PathBuf,

    /// Pretty-print the JSON result
    #[clap(long)]
    pretty: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[clap(long, default_value = "warn")]
    log_level: String,

    #[clap(flatten)]
    analysis: AnalysisArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_logger(logging::get_log_level(&args.log_level));

    let config: AnalysisConfig = args.analysis.into();

    let size = tokio::fs::metadata(&args.file)
        .await
        .with_context(|| format!("Cannot read {}", args.file.display()))?
        .len();
    if size > config.max_capture_bytes as u64 {
        bail!(
            "{} is {} bytes, the limit is {} bytes (see --max-upload-mb)",
            args.file.display(),
            size,
            config.max_capture_bytes
        );
    }

    let data = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("Cannot read {}", args.file.display()))?;
    let file_name = args
        .file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| args.file.display().to_string());

    info!("Analyzing {} ({} bytes)", args.file.display(), data.len());
    let analyzer = Analyzer::new(config);
    let result = analyzer.analyze(&file_name, data).await?;

    let json = if args.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{}", json);

    Ok(())
}
