use clap::{Parser, Subcommand};
use lzpack::io_stream::{decode, encode, inspect, verify};
use lzpack::Level;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{info, Level as LogLevel};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "lzpack", about = "Block-oriented LZO container CLI", version)]
struct Cli {
    /// More log output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a stream into a container ("-" for stdin/stdout)
    Compress {
        input: PathBuf,
        output: PathBuf,
        /// Use the fastest compression variant
        #[arg(short = '1', long, conflicts_with = "best")]
        fast: bool,
        /// Use the best compression variant (default)
        #[arg(short = '9', long)]
        best: bool,
        /// Compression variant by name: fastest, best, 1 or 9
        #[arg(short, long, value_parser = parse_level, conflicts_with_all = ["fast", "best"])]
        level: Option<Level>,
        /// Uncompressed block size in KiB
        #[arg(short, long, default_value_t = 256)]
        block_size: u32,
    },
    /// Restore the original bytes from a container
    Decompress {
        input: PathBuf,
        output: PathBuf,
    },
    /// Decode a container and verify its checksum without writing output
    Test {
        input: PathBuf,
    },
    /// Show header fields and block statistics
    Info {
        input: PathBuf,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet)?;

    match cli.command {
        // ── Compress ─────────────────────────────────────────────────────────
        Commands::Compress { input, output, fast, best: _, level, block_size } => {
            let level = level.unwrap_or(if fast { Level::Fastest } else { Level::Best });
            let block_size = block_size
                .checked_mul(1024)
                .ok_or_else(|| format!("block size {block_size} KiB is too large"))?;
            let src = open_input(&input)?;
            let stats = with_output(&output, |dst| encode(src, dst, level, block_size))?;
            info!(
                input = %input.display(),
                output = %output.display(),
                blocks = stats.blocks,
                stored_blocks = stats.stored_blocks,
                ratio = format_args!("{:.3}", stats.ratio()),
                "compressed"
            );
        }

        // ── Decompress ───────────────────────────────────────────────────────
        Commands::Decompress { input, output } => {
            let src = open_input(&input)?;
            let stats = with_output(&output, |dst| decode(src, dst))?;
            info!(
                input = %input.display(),
                output = %output.display(),
                bytes = stats.original_bytes,
                "decompressed"
            );
        }

        // ── Test ─────────────────────────────────────────────────────────────
        Commands::Test { input } => {
            let stats = verify(open_input(&input)?)?;
            println!(
                "{}: ok ({} blocks, {} bytes)",
                input.display(),
                stats.blocks,
                stats.original_bytes
            );
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input, json } => {
            let info = inspect(open_input(&input)?)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
                return Ok(());
            }
            let stats = &info.stats;
            println!("── lzpack container ─────────────────────────────────────");
            println!("  Path           {}", input.display());
            println!("  Method         {}", info.method);
            println!("  Level          {} ({})", info.level, info.level_name.unwrap_or("unknown"));
            println!("  Block size     {} B", info.block_size);
            println!("  Blocks         {} ({} stored verbatim)", stats.blocks, stats.stored_blocks);
            println!("  Original       {} B", stats.original_bytes);
            println!("  Container      {} B", info.container_bytes);
            println!("  Ratio          {:.3}", stats.ratio());
            match stats.checksum {
                Some(sum) => println!("  Adler-32       {sum:08x} (verified)"),
                None => println!("  Adler-32       not present"),
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_logging(verbose: u8, quiet: bool) -> Result<(), Box<dyn Error>> {
    let level = match (quiet, verbose) {
        (true, _) => LogLevel::ERROR,
        (false, 0) => LogLevel::WARN,
        (false, 1) => LogLevel::INFO,
        (false, 2) => LogLevel::DEBUG,
        (false, _) => LogLevel::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn parse_level(s: &str) -> Result<Level, String> {
    Level::from_name(s).ok_or_else(|| format!("unknown level '{s}' (expected fastest, best, 1 or 9)"))
}

fn is_stdio(path: &Path) -> bool {
    path == Path::new("-")
}

fn open_input(path: &Path) -> io::Result<Box<dyn Read>> {
    if is_stdio(path) {
        Ok(Box::new(io::stdin().lock()))
    } else {
        Ok(Box::new(BufReader::new(File::open(path)?)))
    }
}

/// Run `f` against the destination. A file destination is written through a
/// temporary sibling that only replaces `path` once `f` has succeeded.
fn with_output<T>(
    path: &Path,
    f: impl FnOnce(&mut dyn Write) -> lzpack::Result<T>,
) -> Result<T, Box<dyn Error>> {
    if is_stdio(path) {
        let mut stdout = io::stdout().lock();
        return Ok(f(&mut stdout)?);
    }
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let tmp = NamedTempFile::new_in(dir)?;
    let value = {
        let mut writer = BufWriter::new(tmp.as_file());
        let value = f(&mut writer)?;
        writer.flush()?;
        value
    };
    tmp.persist(path)?;
    Ok(value)
}
