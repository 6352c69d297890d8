//! analyze_image - run one image file through the analysis pipeline
//!
//! Prints the analysis report as JSON on stdout. Non-secure verdicts record
//! evidence and notify exactly as the daemon does.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;

use watchpost::{build_analyzer, FrameSource, StillImageSource, WatchpostConfig};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Image file to analyze (JPEG or PNG).
    image: PathBuf,
    /// Evidence directory (overrides configuration).
    #[arg(long)]
    evidence_dir: Option<PathBuf>,
    /// UI mode for stderr progress.
    #[arg(long, value_enum, default_value_t = ui::UiMode::Auto, value_name = "MODE")]
    ui: ui::UiMode,
}

fn main() -> Result<()> {
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            return Err(anyhow!("failed to read .env: {}", err));
        }
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = ui::Ui::detect(args.ui);

    let analyzer = {
        let _stage = ui.stage("Load configuration");
        let mut cfg = WatchpostConfig::load()?;
        if let Some(dir) = args.evidence_dir {
            cfg.evidence.dir = dir;
        }
        build_analyzer(&cfg)?
    };

    let frame = {
        let mut stage = ui.stage("Read image");
        let mut source = StillImageSource::new(&args.image);
        source.connect()?;
        let frame = source.next_frame()?;
        stage.outcome(format!("{}x{}", frame.width(), frame.height()));
        frame
    };

    let report = {
        let mut stage = ui.stage("Analyze frame");
        let report = analyzer.analyze_frame(&frame);
        stage.outcome(report.status.as_str());
        report
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
