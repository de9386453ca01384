// CLI application
use clap::Parser;
use mdfn_cli::commands::{inspect_state, movie_info};
use mdfn_cli::compression::{pack_state, unpack_state, CompressionLevel};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mdfnstate")]
#[command(about = "Inspect and convert save states and movies")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show the header, preview and section layout of a save state
    Inspect {
        /// Path to the state file (plain or zstd)
        file: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Summarize a movie file
    MovieInfo {
        /// Path to the movie file
        file: PathBuf,

        /// Input bytes per port, in port order
        #[arg(short, long = "port-bytes", value_delimiter = ',', default_value = "2")]
        port_bytes: Vec<usize>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Compress a state file with zstd
    Pack {
        input: PathBuf,
        output: PathBuf,

        /// zstd level (1-22)
        #[arg(short, long, default_value = "19")]
        level: i32,
    },
    /// Write a state file uncompressed
    Unpack { input: PathBuf, output: PathBuf },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect { file, json } => inspect_state(&file, json)?,
        Commands::MovieInfo { file, port_bytes, json } => movie_info(&file, &port_bytes, json)?,
        Commands::Pack { input, output, level } => {
            let (plain, packed) = pack_state(&input, &output, CompressionLevel::new(level))?;
            println!("Packed {} bytes into {} bytes", plain, packed);
        }
        Commands::Unpack { input, output } => {
            let len = unpack_state(&input, &output)?;
            println!("Wrote {} bytes", len);
        }
    }

    Ok(())
}
