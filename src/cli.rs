//! Command-line surface.

use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use pagesnap_snapshot_pipeline::{
    AutoReplace, Decision, DecisionPrompt, DiffContext, SnapshotError,
};
use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use tracing::info;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::pipeline::Pipeline;

#[derive(Parser, Debug)]
#[command(
    name = "pagesnap",
    about = "Record browser interactions and keep deterministic screenshots up to date",
    version
)]
pub struct Cli {
    /// Config file (TOML); defaults to pagesnap.toml when present.
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Record a new entry: interact with the page, press Enter to stop,
    /// then draw the capture region.
    Record {
        /// Entry name (becomes the artifact filename).
        name: String,
        /// Page to record against.
        url: String,
    },
    /// Replay and re-capture one entry.
    Take {
        name: String,
        /// Replace a changed artifact without asking.
        #[arg(long)]
        auto: bool,
    },
    /// Replay and re-capture every entry in order.
    TakeAll {
        #[arg(long)]
        auto: bool,
    },
    /// List the stored entries.
    List,
    /// Import entries from a JSON file (array or single entry).
    Add {
        /// File in the entries format.
        file: std::path::PathBuf,
    },
    /// Print every entry as JSON on stdout.
    Export,
    /// Remove one entry and its artifact.
    Remove { name: String },
    /// Remove every entry definition (artifacts are kept).
    Clear,
}

/// Interactive decision prompt on stdin: anything starting with `y` or `r`
/// replaces, everything else keeps the old artifact.
pub struct StdinPrompt;

#[async_trait]
impl DecisionPrompt for StdinPrompt {
    async fn decide(&self, ctx: &DiffContext) -> Result<Decision, SnapshotError> {
        eprintln!(
            "{}: {} pixels changed (candidate: {}{})",
            ctx.name,
            ctx.changed_pixels,
            ctx.candidate_path.display(),
            ctx.diff_path
                .as_ref()
                .map(|p| format!(", diff: {}", p.display()))
                .unwrap_or_default()
        );
        eprint!("replace the stored screenshot? [y/N] ");

        let mut line = String::new();
        let mut reader = BufReader::new(stdin());
        reader
            .read_line(&mut line)
            .await
            .map_err(|err| SnapshotError::Prompt(err.to_string()))?;
        let answer = line.trim().to_ascii_lowercase();
        if answer.starts_with('y') || answer.starts_with('r') {
            Ok(Decision::Replace)
        } else {
            Ok(Decision::Discard)
        }
    }
}

async fn wait_for_enter() {
    let mut line = String::new();
    let mut reader = BufReader::new(stdin());
    let _ = reader.read_line(&mut line).await;
}

/// The `--auto` flag and the `auto_replace` config field both disable the
/// interactive prompt.
fn prompt_for(flag: bool, cfg_auto: bool) -> Box<dyn DecisionPrompt> {
    if flag || cfg_auto {
        Box::new(AutoReplace)
    } else {
        Box::new(StdinPrompt)
    }
}

pub async fn run(cli: Cli, cfg: AppConfig) -> Result<(), AppError> {
    let auto_replace = cfg.auto_replace;
    let pipeline = Arc::new(Pipeline::new(cfg));

    match cli.command {
        Command::Record { name, url } => {
            pipeline.start().await?;
            eprintln!("recording {name}; press Enter to stop");
            let entry = pipeline
                .record_entry(&name, &url, wait_for_enter())
                .await?;
            info!(
                target: "pagesnap",
                name = %entry.png_name,
                actions = entry.actions.len(),
                "entry saved"
            );
            pipeline.shutdown().await;
        }
        Command::Take { name, auto } => {
            pipeline.start().await?;
            let prompt = prompt_for(auto, auto_replace);
            pipeline.run_one(&name, prompt.as_ref()).await?;
            pipeline.shutdown().await;
        }
        Command::TakeAll { auto } => {
            pipeline.start().await?;
            let prompt = prompt_for(auto, auto_replace);
            let failures = pipeline.run_all(prompt.as_ref()).await?;
            pipeline.shutdown().await;
            if failures > 0 {
                return Err(AppError::Invalid(format!("{failures} entries failed")));
            }
        }
        Command::List => {
            for entry in pipeline.store.load()? {
                println!(
                    "{}  {}  clip {}x{}@{},{}  {} actions",
                    entry.png_name,
                    entry.url,
                    entry.clip.width,
                    entry.clip.height,
                    entry.clip.x,
                    entry.clip.y,
                    entry.actions.len()
                );
            }
        }
        Command::Add { file } => {
            let raw = std::fs::read_to_string(&file).map_err(|source| AppError::StoreIo {
                path: file.clone(),
                source,
            })?;
            let batch: Vec<pagesnap_core_types::ScreenshotEntry> =
                match serde_json::from_str(&raw) {
                    Ok(entries) => entries,
                    Err(_) => vec![serde_json::from_str(&raw)?],
                };
            let count = batch.len();
            pipeline.store.bulk_add(batch)?;
            info!(target: "pagesnap", count, "entries imported");
        }
        Command::Export => {
            let entries = pipeline.store.load()?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        Command::Remove { name } => {
            if pipeline.store.remove(&name)? {
                pipeline.artifacts.remove_final(&name)?;
                info!(target: "pagesnap", name = %name, "entry removed");
            } else {
                return Err(AppError::UnknownEntry(name));
            }
        }
        Command::Clear => {
            pipeline.store.clear()?;
            info!(target: "pagesnap", "entry list cleared");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> DiffContext {
        DiffContext {
            name: "hero".to_string(),
            changed_pixels: 12,
            bounds: None,
            candidate_path: "staging/hero.png".into(),
            diff_path: None,
        }
    }

    #[tokio::test]
    async fn config_auto_replace_skips_the_interactive_prompt() {
        let prompt = prompt_for(false, true);
        assert_eq!(prompt.decide(&ctx()).await.unwrap(), Decision::Replace);
    }

    #[tokio::test]
    async fn the_auto_flag_alone_also_skips_it() {
        let prompt = prompt_for(true, false);
        assert_eq!(prompt.decide(&ctx()).await.unwrap(), Decision::Replace);
    }
}
