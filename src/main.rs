use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

mod cli;

use cli::Args;
use tracesift::assemble::TestAssembler;
use tracesift::error::ProcessError;
use tracesift::sink::{JsonlSink, Sink};

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let members = collect_members(&args.inputs)?;
    if members.is_empty() {
        anyhow::bail!("No test files found under the given inputs");
    }

    let task_file_name = match args.task {
        Some(ref task) => task.clone(),
        None => members[0]
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };

    let writer: Box<dyn Write> = match args.output {
        Some(ref path) => Box::new(BufWriter::new(
            File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout()),
    };
    let mut assembler = TestAssembler::new(task_file_name, JsonlSink::new(writer));

    for member in &members {
        let raw = fs::read(member)
            .with_context(|| format!("Failed to read test file: {}", member.display()))?;
        let name = member.to_string_lossy();
        match assembler.process_test(&name, &raw) {
            Ok(()) => {}
            Err(ProcessError::Format(err)) => {
                if args.fail_fast {
                    return Err(err).with_context(|| format!("Rejected test: {}", name));
                }
                warn!("skipping test {}: {}", name, err);
            }
            Err(ProcessError::Sink(err)) => {
                return Err(err).context("Sink failure, aborting");
            }
        }
    }

    let snapshot = assembler.metrics();
    let sink = assembler.finish().context("Failed to flush results")?;
    let stats = sink.stats();

    info!(
        "processed {} test file(s), committed {} record(s)",
        members.len(),
        stats.committed
    );
    if args.summary {
        for (name, value) in snapshot.labelled() {
            eprintln!("{:30} {}", name, value);
        }
        eprintln!("{:30} {}", "committed", stats.committed);
    }

    Ok(())
}

/// Expand directories into their test files; keep order deterministic so
/// the pollution window sees members the way the archive laid them out.
fn collect_members(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut members = Vec::new();
    for input in inputs {
        if input.is_dir() {
            collect_dir(input, &mut members)?;
        } else {
            members.push(input.clone());
        }
    }
    members.sort();
    Ok(members)
}

fn collect_dir(dir: &Path, members: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_dir() {
            collect_dir(&path, members)?;
        } else {
            members.push(path);
        }
    }
    Ok(())
}
