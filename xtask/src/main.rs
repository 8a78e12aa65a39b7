//! Build automation tasks for SurveySync
//!
//! - `generate-cli-docs`: Markdown CLI reference from the clap definitions

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for SurveySync", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the CLI reference in Markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<surveysync_extract::Cli>();

    let content = format!(
        r#"# SurveySync CLI Reference

This documentation is auto-generated from the CLI source code. Last updated: {}.

## Overview

`surveysync` pulls surveys, questions, campaigns and responses from the survey
platform's REST API and lands them as gzip-compressed JSON in S3 (or a local
directory). Each survey's progress is kept as a bookmark in a JSON checkpoint
file, so every run only pulls responses submitted since the last one.

## Quick Start

```bash
export ALCHEMER_API_TOKEN=...
export ALCHEMER_API_TOKEN_SECRET=...
export CURRENT_ACADEMIC_YEAR=2024
export S3_BUCKET=survey-exports

# Extract everything new
surveysync extract

# Extract two surveys into a local directory
surveysync extract --survey 42 --survey 43 --local-dir ./out

# Show the stored bookmarks
surveysync bookmarks

# Preview option changes for staff-picker questions
surveysync sync-options --config options.toml --contacts contacts.json --dry-run
```

## Commands

{}

## Environment Variables

| Variable | Default |
|---|---|
| `ALCHEMER_API_TOKEN`, `ALCHEMER_API_TOKEN_SECRET` | required |
| `ALCHEMER_API_VERSION` | `v5` |
| `ALCHEMER_BASE_URL` | `https://api.alchemer.com` |
| `ALCHEMER_TIMEZONE` | `-05:00` |
| `ALCHEMER_TIMEOUT_SECS` | `300` |
| `ALCHEMER_PAGE_SIZE` | API default |
| `ALCHEMER_DEGRADED_RETRY` | `true` |
| `CURRENT_ACADEMIC_YEAR` | required |
| `SYNC_LAG_SECS` | `3600` |
| `SYNC_DATA_DIR` | `./data` |
| `SYNC_STATE_FILE` | `$SYNC_DATA_DIR/state.json` |
| `SYNC_STORE` | `s3` |
| `SYNC_SCHEMA_NAME` | `surveygizmo` |
| `S3_BUCKET`, `S3_REGION`, `S3_ENDPOINT`, `S3_ACCESS_KEY`, `S3_SECRET_KEY`, `S3_PATH_STYLE`, `S3_PUBLIC_URL` | see `surveysync extract --help` |
| `ALERT_WEBHOOK_URL` | unset (alerts are logged) |
| `LOG_LEVEL`, `LOG_OUTPUT`, `LOG_FORMAT`, `LOG_DIR` | `info`, `console`, `text`, `./logs` |

---

*To update, run `cargo xtask generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("Generated CLI documentation at: {}", file_path.display());
    Ok(())
}
