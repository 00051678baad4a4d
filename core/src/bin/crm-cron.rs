//! One synchronisation run: push a site export into the CRM.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crm_core::{run_cron, CrmClient, Settings, SiteExport};

#[derive(Parser)]
#[command(name = "crm-cron")]
#[command(version, about = "Synchronise a site export with the CRM backend")]
struct Cli {
    /// Site export (webforms, submissions, users, consents) as JSON
    #[arg(long)]
    export: PathBuf,

    /// Settings JSON file (default: read CRM_* environment variables)
    #[arg(long)]
    settings: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => Settings::from_file(path),
        None => Settings::from_env(),
    };
    let settings = match settings {
        Ok(settings) => settings,
        Err(err) => {
            tracing::error!(%err, "invalid settings");
            return ExitCode::FAILURE;
        }
    };

    let export = match std::fs::read_to_string(&cli.export) {
        Ok(raw) => SiteExport::from_json_str(&raw),
        Err(err) => {
            tracing::error!(%err, path = %cli.export.display(), "cannot read export");
            return ExitCode::FAILURE;
        }
    };
    let export = match export {
        Ok(export) => export,
        Err(err) => {
            tracing::error!(%err, "invalid export");
            return ExitCode::FAILURE;
        }
    };

    let client = CrmClient::new(&settings.client_config());
    match run_cron(&client, &settings, &export) {
        Ok(report) => {
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{json}"),
                Err(err) => tracing::error!(%err, "cannot render report"),
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(%err, "cron run aborted");
            ExitCode::FAILURE
        }
    }
}
