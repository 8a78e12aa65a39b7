//! SurveySync CLI - Main entry point

use clap::Parser;
use std::process;
use surveysync_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use surveysync_extract::commands::{self, ExtractArgs};
use surveysync_extract::{Cli, Commands};
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Info })
        .output(LogOutput::Console)
        .log_file_prefix("surveysync")
        .build();

    // Environment variables take precedence
    let log_config = match log_config.clone().merge_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: ignoring invalid LOG_* settings: {}", e);
            log_config
        },
    };
    let _guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {}", e);
            None
        },
    };

    if let Err(e) = execute_command(cli.command).await {
        error!(error = %e, fatal = e.is_fatal(), "Command failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn execute_command(command: Commands) -> surveysync_extract::Result<()> {
    match command {
        Commands::Extract {
            surveys,
            page_size,
            state_file,
            local_dir,
        } => {
            let args = ExtractArgs {
                surveys,
                page_size,
                state_file,
                local_dir,
            };
            let report = commands::extract(&args).await?;
            // survey failures were alerted; they don't fail the process
            info!(%report, clean = report.is_clean(), "Extraction complete");
            println!("{}", report);
        },
        Commands::SyncOptions {
            config,
            contacts,
            dry_run,
        } => {
            let report = commands::sync_options(&config, &contacts, dry_run).await?;
            println!(
                "{} questions: {} created, {} deleted, {} failed",
                report.questions, report.created, report.deleted, report.failed
            );
        },
        Commands::Bookmarks { state_file } => {
            let (path, bookmarks) = commands::bookmarks(state_file.as_deref())?;
            if bookmarks.is_empty() {
                println!("No bookmarks in {}", path.display());
            }
            for (survey_id, bookmark) in &bookmarks {
                println!("{}\t{}", survey_id, bookmark.to_rfc3339());
            }
        },
    }

    Ok(())
}
