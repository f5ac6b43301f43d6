use clap::{ArgGroup, Parser};
use stairsplus_whitelist::config::{BackendConfig, DEFAULT_CHUNK_SIZE, DecodePolicy, ScanConfig};
use stairsplus_whitelist::decoder::CommandDecoder;
use stairsplus_whitelist::writer::default_output_path;
use stairsplus_whitelist::{WhitelistError, pipeline};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "create_whitelist")]
#[command(about = "Build a stairsplus whitelist from the nodes actually present in a map", long_about = None)]
#[command(group(ArgGroup::new("backend").required(true).args(["pg_connection", "sqlite_file"])))]
struct Cli {
    /// Postgres connection string of the map database
    #[arg(short = 'c', long, visible_alias = "pg_connection")]
    pg_connection: Option<String>,
    /// Path to map.sqlite
    #[arg(short = 's', long, visible_alias = "sqlite_file", value_parser = existing_file)]
    sqlite_file: Option<PathBuf>,
    /// Rows fetched per page
    #[arg(long, visible_alias = "chunk_size", default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: u64,
    /// Worker threads (defaults to available parallelism)
    #[arg(long)]
    workers: Option<usize>,
    /// Output file (defaults to stairsplus.whitelist next to the dump)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Log and skip blocks the decoder rejects instead of aborting
    #[arg(long)]
    skip_bad_blocks: bool,
    /// Program that reads one map block on stdin and prints its node names
    #[arg(long, value_name = "PROGRAM")]
    decoder: String,
    /// Stairsplus dump (JSON with shaped_nodes and aliases)
    #[arg(value_parser = existing_file)]
    stairsplus_dump: PathBuf,
    /// Extra arguments passed to the decoder program
    #[arg(last = true)]
    decoder_args: Vec<String>,
}

fn existing_file(path: &str) -> Result<PathBuf, String> {
    let file_path = PathBuf::from(path);
    if !file_path.exists() {
        return Err(format!("{:?} does not exist.", path));
    }
    if !file_path.is_file() {
        return Err(format!("{:?} is not a file.", path));
    }
    Ok(file_path)
}

fn run(cli: Cli) -> Result<(), WhitelistError> {
    let backend = BackendConfig::from_options(cli.pg_connection, cli.sqlite_file)?;

    let mut config = ScanConfig::default_config().with_chunk_size(cli.chunk_size);
    if let Some(workers) = cli.workers {
        config = config.with_workers(workers);
    }
    if cli.skip_bad_blocks {
        config = config.with_decode_policy(DecodePolicy::Skip);
    }
    config.validate()?;

    let decoder = CommandDecoder::new(cli.decoder, cli.decoder_args);
    let output = cli
        .output
        .unwrap_or_else(|| default_output_path(&cli.stairsplus_dump));

    info!(backend = %backend.describe(), output = %output.display(), "creating whitelist");
    let census = pipeline::collect(&cli.stairsplus_dump, &backend, &decoder, &config)?;

    if let Err(e) = census.write_to(&output) {
        error!(
            entries = census.whitelist.len(),
            "whitelist was built but could not be written"
        );
        return Err(e);
    }

    if census.report.skipped_rows > 0 {
        info!(
            skipped_rows = census.report.skipped_rows,
            "some blocks could not be decoded and were skipped"
        );
    }
    info!(
        rows = census.report.row_count,
        nodes = census.report.observed.len(),
        whitelisted = census.whitelist.len(),
        "done"
    );
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("[create_whitelist] {} failed: {}", e.stage(), e);
            ExitCode::FAILURE
        }
    }
}
