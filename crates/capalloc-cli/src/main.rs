//! capalloc CLI: run every file in a corpus directory through the host on a
//! bounded, accounting allocator.

use clap::{CommandFactory, Parser};
use capalloc_core::config::{AllocatorConfig, ConfigFile};
use capalloc_exec::{run_directory, Harness, ScanHost};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "capalloc")]
#[command(
    about = "Decode and render a corpus of documents under a hard allocation ceiling",
    long_about = None
)]
struct Cli {
    /// Directory whose regular files (non-recursive) are processed one by one
    corpus_dir: Option<PathBuf>,

    /// JSON config file (overrides environment)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Allocation ceiling in bytes (overrides config)
    #[arg(long)]
    max_allocation: Option<usize>,

    /// Document type hint passed to the host (overrides config)
    #[arg(long)]
    magic: Option<String>,

    /// Print the batch summary as JSON on stdout
    #[arg(long)]
    json: bool,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let Some(corpus_dir) = cli.corpus_dir.as_deref() else {
        eprintln!("{}", Cli::command().render_usage());
        std::process::exit(1);
    };

    if let Err(e) = run_corpus(corpus_dir, &cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_corpus(corpus_dir: &Path, cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(cli)?;
    tracing::info!(
        ceiling = config.max_allocation_bytes,
        magic = %config.document_magic,
        "starting batch"
    );

    let mut harness = Harness::new(ScanHost::new(), &config);
    let summary = run_directory(corpus_dir, &mut harness)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "processed {} of {} files ({} failed, {} skipped), {} pages, peak {} bytes",
            summary.files_processed,
            summary.files_seen,
            summary.runs_failed,
            summary.files_skipped,
            summary.pages_rendered,
            summary.peak_bytes
        );
    }
    Ok(())
}

/// defaults < environment < `--config` file < flags.
fn build_config(cli: &Cli) -> Result<AllocatorConfig, capalloc_core::Error> {
    let mut config = AllocatorConfig::from_env();
    if let Some(path) = &cli.config {
        config.apply_file(&ConfigFile::from_json_file(path)?);
        tracing::debug!(path = %path.display(), "loaded config file");
    }
    apply_cli_overrides(&mut config, cli);
    config.validate()?;
    Ok(config)
}

fn apply_cli_overrides(config: &mut AllocatorConfig, cli: &Cli) {
    if let Some(cap) = cli.max_allocation {
        config.max_allocation_bytes = cap;
    }
    if let Some(magic) = &cli.magic {
        config.document_magic = magic.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::{apply_cli_overrides, build_config, AllocatorConfig, Cli};
    use clap::Parser;

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from([
            "capalloc",
            "/corpus",
            "--max-allocation",
            "4096",
            "--magic",
            "xps",
        ]);
        let mut config = AllocatorConfig::default();
        apply_cli_overrides(&mut config, &cli);
        assert_eq!(config.max_allocation_bytes, 4096);
        assert_eq!(config.document_magic, "xps");
    }

    #[test]
    fn config_file_then_flags() {
        let mut path = std::env::temp_dir();
        path.push("capalloc-cli-config-test.json");
        std::fs::write(&path, r#"{ "max_allocation_bytes": 2048 }"#).expect("write config");

        let path_arg = path.to_string_lossy().to_string();
        let cli = Cli::parse_from(["capalloc", "/corpus", "--config", &path_arg]);
        let config = build_config(&cli).expect("config");
        assert_eq!(config.max_allocation_bytes, 2048);

        let cli = Cli::parse_from([
            "capalloc",
            "/corpus",
            "--config",
            &path_arg,
            "--max-allocation",
            "8192",
        ]);
        let config = build_config(&cli).expect("config");
        assert_eq!(config.max_allocation_bytes, 8192);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn zero_ceiling_flag_is_rejected() {
        let cli = Cli::parse_from(["capalloc", "/corpus", "--max-allocation", "0"]);
        assert!(build_config(&cli).is_err());
    }

    #[test]
    fn directory_argument_is_optional_for_parsing() {
        let cli = Cli::parse_from(["capalloc"]);
        assert!(cli.corpus_dir.is_none());
    }
}
