use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "dashboard")]
#[command(about = "Headless operator console for the fashion-analysis pipeline")]
pub struct Cli {
    /// Log more; repeat for trace output.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start a new run and follow it until it pauses or finishes.
    Run {
        /// Trend query for the data collector.
        query: String,
    },
    /// Show progress, pending pause and log of a thread.
    Status(ThreadArg),
    /// Approve the outfit designs under review.
    Approve(ThreadArg),
    /// Ask for changes to the outfit designs under review.
    Edit {
        #[command(flatten)]
        thread: ThreadArg,
        /// What to change.
        instructions: String,
    },
    /// Reject the outfit designs under review.
    Reject {
        #[command(flatten)]
        thread: ThreadArg,
        /// Why the designs were rejected.
        feedback: String,
        /// Outfits to keep; repeat for several.
        #[arg(long = "outfit")]
        outfit_ids: Vec<String>,
    },
    /// Provide custom sources requested by the data collector.
    Input {
        #[command(flatten)]
        thread: ThreadArg,
        #[arg(long = "url")]
        urls: Vec<String>,
        #[arg(long = "image")]
        images: Vec<String>,
        #[arg(long = "video")]
        videos: Vec<String>,
        #[arg(long, default_value = "")]
        query: String,
    },
    /// Answer a generic pause or a manual stop with edited JSON.
    Respond {
        #[command(flatten)]
        thread: ThreadArg,
        #[command(flatten)]
        data: JsonArg,
    },
    /// Replace a stage's output and rerun everything downstream of it.
    Rerun {
        #[command(flatten)]
        thread: ThreadArg,
        /// Stage id, e.g. `content_analyzer`.
        node: String,
        #[command(flatten)]
        data: JsonArg,
    },
    /// Cancel the thread's in-flight runs and pause it.
    Stop(ThreadArg),
}

#[derive(Debug, Args)]
pub struct ThreadArg {
    /// Thread to act on.
    #[arg(long, short = 't')]
    pub thread: String,
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct JsonArg {
    /// Inline JSON.
    #[arg(long)]
    pub json: Option<String>,
    /// Path to a JSON file.
    #[arg(long)]
    pub file: Option<PathBuf>,
}

impl JsonArg {
    pub fn read(&self) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
        let raw = match (&self.json, &self.file) {
            (Some(json), _) => json.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)?,
            (None, None) => return Err("either --json or --file is required".into()),
        };
        Ok(serde_json::from_str(&raw)?)
    }
}
