mod config;
mod server;
mod store;
mod wav;

use clap::{Parser, Subcommand};
use config::DecodeArgs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use store::{NewToneEntry, ToneStore};
use tracing_subscriber::EnvFilter;
use twotone_core::{DecodeEngine, DecodeResult, ToneTableSource};

#[derive(Parser)]
#[command(name = "twotone")]
#[command(about = "Two-tone sequential paging decoder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a WAV recording and match it against the tone table
    Decode {
        /// Input WAV file
        #[arg(value_name = "INPUT.WAV")]
        input: PathBuf,

        /// Tone table (JSON)
        #[arg(long, value_name = "FILE", default_value = "tones.json")]
        table: PathBuf,

        #[command(flatten)]
        decode: DecodeArgs,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Serve the decode and tone table HTTP API
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8000")]
        addr: SocketAddr,

        /// Tone table (JSON), created on first write
        #[arg(long, value_name = "FILE", default_value = "tones.json")]
        table: PathBuf,

        #[command(flatten)]
        decode: DecodeArgs,

        /// Largest accepted upload in MiB
        #[arg(long, default_value_t = 50)]
        max_upload_mb: usize,
    },

    /// Maintain the tone table
    Tones {
        /// Tone table (JSON)
        #[arg(long, value_name = "FILE", default_value = "tones.json", global = true)]
        table: PathBuf,

        #[command(subcommand)]
        action: ToneCommands,
    },
}

#[derive(Subcommand)]
enum ToneCommands {
    /// List all entries
    List,

    /// Add an entry
    Add {
        /// Unit label, e.g. "Engine 7"
        label: String,

        /// First tone in Hz
        #[arg(value_name = "TONE1_HZ")]
        tone1_hz: f64,

        /// Second tone in Hz
        #[arg(value_name = "TONE2_HZ")]
        tone2_hz: f64,
    },

    /// Remove an entry by id
    Remove {
        id: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Decode {
            input,
            table,
            decode,
            json,
        } => decode_command(&input, &table, &decode, json)?,
        Commands::Serve {
            addr,
            table,
            decode,
            max_upload_mb,
        } => serve_command(addr, &table, &decode, max_upload_mb).await?,
        Commands::Tones { table, action } => tones_command(&table, action)?,
    }

    Ok(())
}

/// Logs go to stderr so `decode --json` output stays parseable
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn decode_command(
    input_path: &Path,
    table_path: &Path,
    args: &DecodeArgs,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = DecodeEngine::new(args.load()?)?;
    let store = ToneStore::open(table_path)?;

    let buffer = wav::read_wav_file(input_path)?;
    tracing::info!(
        "Read {}: {:.2} s at {} Hz",
        input_path.display(),
        buffer.duration_s(),
        buffer.sample_rate_hz()
    );

    let result = engine.decode_snapshot(&buffer, &store.snapshot())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(())
}

fn print_result(result: &DecodeResult) {
    println!("{}", result.message);
    match result.tone1.hz() {
        Some(hz) => println!("  Tone 1:     {:.1} Hz", hz),
        None => println!("  Tone 1:     -"),
    }
    match result.tone2.hz() {
        Some(hz) => println!("  Tone 2:     {:.1} Hz", hz),
        None => println!("  Tone 2:     -"),
    }
    println!("  Confidence: {:.2}", result.confidence);
    if let Some(entry) = &result.matched_entry {
        println!("  Matched:    {} (id {})", entry.label, entry.id);
    }
}

async fn serve_command(
    addr: SocketAddr,
    table_path: &Path,
    args: &DecodeArgs,
    max_upload_mb: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = DecodeEngine::new(args.load()?)?;
    let store = ToneStore::open(table_path)?;
    tracing::info!(
        "tone table {} ({} entries, version {})",
        table_path.display(),
        store.len(),
        store.version()
    );

    let state = server::AppState::new(engine, store);
    server::serve(addr, state, max_upload_mb * 1024 * 1024).await?;
    Ok(())
}

fn tones_command(table_path: &Path, action: ToneCommands) -> Result<(), Box<dyn std::error::Error>> {
    let store = ToneStore::open(table_path)?;

    match action {
        ToneCommands::List => {
            let entries = store.list(0, store::MAX_LIST_LIMIT);
            if entries.is_empty() {
                println!("No tone entries in {}", table_path.display());
            }
            for record in entries {
                let entry = &record.entry;
                println!(
                    "{:>4}  {:<24} {:>8.1} Hz  {:>8.1} Hz  updated {}",
                    entry.id,
                    entry.label,
                    entry.tone1_hz,
                    entry.tone2_hz,
                    record.updated_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        ToneCommands::Add {
            label,
            tone1_hz,
            tone2_hz,
        } => {
            let record = store.create(NewToneEntry {
                label,
                tone1_hz,
                tone2_hz,
            })?;
            println!("Added {} with id {}", record.entry.label, record.entry.id);
        }
        ToneCommands::Remove { id } => {
            store.delete(id)?;
            println!("Removed entry {}", id);
        }
    }

    Ok(())
}
