use clap::Parser;
use std::path::PathBuf;

/// Reconstruct traceroute test archives (legacy paris free-text and
/// structured scamper jsonl) into newline-delimited JSON records
#[derive(Parser, Debug, Clone)]
#[command(name = "tracesift")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Test files or directories to process (.paris, .jsonl, .json)
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Task archive name the members came from; derives the metro code
    /// and the date prefix of generated test ids. Defaults to the first
    /// input file name.
    #[arg(short = 't', long = "task")]
    pub task: Option<String>,

    /// Write records to this file instead of stdout
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Stop at the first malformed test instead of skipping it
    #[arg(long = "fail-fast")]
    pub fail_fast: bool,

    /// Print a counter summary to stderr when done
    #[arg(long = "summary")]
    pub summary: bool,
}

impl Args {
    /// Validate arguments
    pub fn validate(&self) -> Result<(), String> {
        if self.inputs.is_empty() {
            return Err("At least one input file or directory is required".into());
        }
        for input in &self.inputs {
            if !input.exists() {
                return Err(format!("Input does not exist: {}", input.display()));
            }
        }
        if let Some(ref task) = self.task {
            if task.is_empty() {
                return Err("Task name cannot be empty".into());
            }
        }
        Ok(())
    }
}
