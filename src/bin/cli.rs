// Audiocine - Audio description cinema for mobile
// Copyright (C) 2025 Audiocine contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


use anyhow::{bail, Context};
use audiocine_core::content::{ContentRef, ContentType, NO_INDEX};
use audiocine_core::download::DownloadQueue;
use audiocine_core::logging::{init_logging, LogLevel, LoggingConfig};
use audiocine_core::storage::{Database, DownloadRequest, DownloadStatus, ProgressStore};
use audiocine_core::{core_version, CoreConfig};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "audiocine-cli")]
#[command(about = "Audiocine CLI - Desktop testing tool", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overrides the configuration
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct UnitArgs {
    content_id: String,
    #[arg(short = 't', long = "type", default_value = "movie")]
    content_type: String,
    #[arg(short, long, default_value_t = NO_INDEX, allow_negative_numbers = true)]
    part: i32,
    #[arg(short, long, default_value_t = NO_INDEX, allow_negative_numbers = true)]
    episode: i32,
}

impl UnitArgs {
    fn content_ref(&self) -> anyhow::Result<ContentRef> {
        let content_type = ContentType::from_str(&self.content_type)
            .with_context(|| format!("unknown content type '{}'", self.content_type))?;
        Ok(ContentRef::new(&self.content_id, content_type, self.part, self.episode))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the core version
    Version,
    /// Download one unit and wait for the result
    Download {
        #[command(flatten)]
        unit: UnitArgs,
        /// Media URL
        #[arg(long)]
        url: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        series_title: Option<String>,
    },
    /// List downloads grouped by content
    Downloads,
    /// Delete one download and its file
    Delete {
        #[command(flatten)]
        unit: UnitArgs,
    },
    /// Re-queue downloads left unfinished and wait for them
    ResumePending,
    /// Playback history, most recent first
    History,
    /// Clear saved progress for one content item, or everything
    ClearProgress {
        content_id: Option<String>,
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { LogLevel::Debug } else { LogLevel::Info };
    init_logging(LoggingConfig::default().with_level(level))?;

    let mut config = match &cli.config {
        Some(path) => CoreConfig::load(path)?,
        None => CoreConfig::default(),
    };
    if let Some(db) = cli.db {
        config.storage.database_path = db;
    }
    config.validate()?;

    if let Commands::Version = cli.command {
        println!("{}", core_version());
        return Ok(());
    }

    let db = Database::new(&config.storage.database_path)
        .await
        .with_context(|| format!("opening {}", config.storage.database_path.display()))?;
    let queue = DownloadQueue::from_config(&config, &db)?;
    let progress = ProgressStore::new(db.pool().clone());

    match cli.command {
        Commands::Version => {}
        Commands::Download {
            unit,
            url,
            title,
            series_title,
        } => {
            let content = unit.content_ref()?;
            let mut request = DownloadRequest::new(content.clone(), title, url);
            if let Some(series_title) = series_title {
                request = request.with_series_title(series_title);
            }

            queue.enqueue(request).await?;
            println!("Queued {}", content);

            let record = loop {
                tokio::time::sleep(Duration::from_millis(250)).await;
                match queue.store().get(&content).await? {
                    Some(record) if record.status.is_terminal() => break record,
                    Some(_) => continue,
                    None => bail!("download record for {} disappeared", content),
                }
            };

            match record.status {
                DownloadStatus::Complete => println!(
                    "Complete: {} ({:.2} MB, {} ms)",
                    record.file_path.as_deref().unwrap_or("-"),
                    record.total_size_mb,
                    record.duration_ms
                ),
                _ => println!("Failed: {}", record.error_message.as_deref().unwrap_or("unknown error")),
            }
        }
        Commands::Downloads => {
            let groups = queue.list_groups().await?;
            if groups.is_empty() {
                println!("No downloads");
            }
            for group in groups {
                println!(
                    "{} [{}] {} {}/{} complete, {:.2} MB",
                    group.title,
                    group.content_type,
                    group.status().as_str(),
                    group.completed_count(),
                    group.tasks.len(),
                    group.total_size_mb()
                );
                for task in &group.tasks {
                    println!("    {:<40} {}", task.title, task.status.as_str());
                }
            }
        }
        Commands::Delete { unit } => {
            let content = unit.content_ref()?;
            queue.delete(&content).await?;
            println!("Deleted {}", content);
        }
        Commands::ResumePending => {
            let resumed = queue.resume_pending().await?;
            println!("Resumed {} download(s)", resumed);
            while queue.active_count() > 0 || queue.pending_count().await > 0 {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
        Commands::History => {
            for entry in progress.list_all().await? {
                println!(
                    "{:<32} {:>8} / {:<8} ms",
                    entry.content.to_string(),
                    entry.current_position_ms,
                    entry.total_duration_ms
                );
            }
        }
        Commands::ClearProgress { content_id, all } => match (content_id, all) {
            (_, true) => {
                progress.delete_all().await?;
                println!("Cleared all progress");
            }
            (Some(id), false) => {
                progress.delete_all_for_content(&id).await?;
                println!("Cleared progress for {}", id);
            }
            (None, false) => bail!("give a content id or --all"),
        },
    }

    db.close().await?;
    Ok(())
}
