//! incident_log - print the incident log

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use watchpost::{IncidentLog, IncidentRecord};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Evidence directory holding incident_log.json.
    #[arg(long, env = "WATCHPOST_EVIDENCE_DIR", default_value = "evidence")]
    evidence_dir: PathBuf,
    /// Print the records as JSON instead of a table.
    #[arg(long)]
    json: bool,
    /// Only the most recent N records.
    #[arg(long, value_name = "N")]
    limit: Option<usize>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let log = IncidentLog::in_dir(&args.evidence_dir);
    let records = log.load()?;
    let shown = tail(&records, args.limit);

    if args.json {
        println!("{}", serde_json::to_string_pretty(shown)?);
        return Ok(());
    }

    if shown.is_empty() {
        println!("no incidents in {}", log.path().display());
        return Ok(());
    }
    println!(
        "{:<26}  {:<15}  {:>4}  {:<30}  {}",
        "TIMESTAMP", "EVENT", "CONF", "DESCRIPTION", "EVIDENCE"
    );
    for record in shown {
        println!(
            "{:<26}  {:<15}  {:>3}%  {:<30}  {}",
            record.timestamp,
            record.event_type,
            record.confidence_score,
            record.description,
            record.evidence_file
        );
    }
    println!("{} of {} incident(s)", shown.len(), records.len());
    Ok(())
}

fn tail(records: &[IncidentRecord], limit: Option<usize>) -> &[IncidentRecord] {
    match limit {
        Some(n) if n < records.len() => &records[records.len() - n..],
        _ => records,
    }
}
