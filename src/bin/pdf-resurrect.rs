//! PDF Resurrect CLI tool
//!
//! A command-line tool for recovering the version history of PDF files.

use anyhow::{bail, Context};
use clap::{ArgAction, Parser};
use glob::glob;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing::info;

use pdf_resurrect::pdf::{
    classify_document, scrubbed_path, write_scrubbed, write_versions, Document, WriteOutcome,
};
use pdf_resurrect::report::{write_creator_info, write_summary};
use pdf_resurrect::Mode;

/// PDF Resurrect - Recover previous versions of incrementally updated PDFs
#[derive(Parser)]
#[command(name = "pdf-resurrect")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    # Summarize the history of a document
    pdf-resurrect report.pdf

    # Write every version to report-versions/
    pdf-resurrect -w report.pdf

    # Count versions of many files
    pdf-resurrect -q \"scans/*.pdf\"")]
struct Cli {
    /// Input PDF files. Supports glob patterns like "*.pdf"
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Display creator information (DocInfo dictionary) per version
    #[arg(short, long)]
    info: bool,

    /// Write each version and the summary to <name>-versions/
    #[arg(short, long)]
    write: bool,

    /// Print only the number of versions
    #[arg(short, long)]
    quiet: bool,

    /// Write a copy with superseded and deleted objects blanked out (experimental)
    #[arg(short, long)]
    scrub: bool,

    /// Directory in which <name>-versions/ is created
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mode = Mode {
        quiet: cli.quiet,
        show_creator: cli.info,
        write_versions: cli.write,
        scrub: cli.scrub,
    };

    let inputs = match expand_globs(cli.inputs) {
        Ok(inputs) => inputs,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let mut failed = false;
    for input in &inputs {
        if let Err(e) = cmd_resurrect(input, &mode, &cli.output_dir) {
            eprintln!("Error: {}", e);
            failed = true;
        }
    }
    if failed {
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pdf_resurrect={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();
}

/// Expand glob patterns in input paths
fn expand_globs(patterns: Vec<String>) -> anyhow::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for pattern in patterns {
        // Check if pattern contains glob characters
        if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
            let mut matched = false;
            for entry in glob(&pattern)? {
                match entry {
                    Ok(path) => {
                        paths.push(path);
                        matched = true;
                    }
                    Err(e) => eprintln!("Warning: glob error for {}: {}", pattern, e),
                }
            }
            if !matched {
                bail!("No files matched pattern: {}", pattern);
            }
        } else {
            paths.push(PathBuf::from(pattern));
        }
    }

    paths.sort();
    Ok(paths)
}

fn cmd_resurrect(input: &Path, mode: &Mode, output_dir: &Path) -> anyhow::Result<()> {
    let doc = Document::load(input)?;

    if !mode.quiet {
        println!("Found {} '%%EOF' markers", doc.eof_count());
    }
    if doc.version_count() == 0 {
        bail!("{}: no xref section could be recovered", doc.name);
    }

    let changes = classify_document(&doc);
    let single = doc.version_count() < 2;
    if single && !(mode.quiet || mode.show_creator) {
        println!("{}: There is only one version of this PDF", doc.name);
    }

    let mut summary_written = false;
    if mode.write_versions && !single {
        match write_versions(&doc, output_dir) {
            Ok(WriteOutcome::Written { dir, files, skipped }) => {
                for (version, reason) in &skipped {
                    eprintln!("Warning: version {} was not written: {}", version, reason);
                }
                let summary_path = dir.join(format!("{}.summary", doc.base_name()));
                let file = File::create(&summary_path)
                    .with_context(|| format!("Failed to create {}", summary_path.display()))?;
                let mut out = BufWriter::new(file);
                write_summary(&mut out, &doc, &changes, mode)?;
                out.flush()?;
                summary_written = true;
                info!(dir = %dir.display(), files = files.len(), "wrote versions and summary");
            }
            Ok(WriteOutcome::OnlyOneVersion) => {}
            Err(e) => eprintln!("Error: {}, PDF version extraction will not occur", e),
        }
    }

    // quiet mode always reports the count on stdout
    let stdout = io::stdout();
    if !summary_written || mode.quiet {
        write_summary(&mut stdout.lock(), &doc, &changes, mode)?;
    }

    if mode.scrub {
        eprintln!("Warning: scrubbing is experimental; check the scrubbed copy before relying on it");
        let target = scrubbed_path(input);
        match write_scrubbed(&doc, &target) {
            Ok(report) => {
                for skipped in &report.skipped {
                    eprintln!(
                        "Warning: object {} (version {}) not scrubbed: {}",
                        skipped.id, skipped.version, skipped.reason
                    );
                }
                if !mode.quiet {
                    println!(
                        "{}: scrubbed {} objects into {}",
                        doc.name,
                        report.scrubbed.len(),
                        target.display()
                    );
                }
            }
            Err(e) => eprintln!("Error: {}, scrubbing will not occur", e),
        }
    }

    if mode.show_creator {
        write_creator_info(&mut stdout.lock(), &doc, &changes)?;
    }

    Ok(())
}
