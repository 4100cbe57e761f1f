//! Payload Inspector CLI
//!
//! Reads stored payload bytes and reports their format and envelope metadata
//! without needing the entity types that wrote them.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use familiar_persist::{detect_format, CodecConfig, DetectedFormat, SafeSerializer, TypeRegistry};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "payload-inspect")]
#[command(about = "Inspect stored Familiar payloads")]
struct Cli {
    /// Config file layered over the default locations
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print envelope metadata as JSON
    Show {
        /// Payload file, or "-" for stdin
        input: String,
        /// Migrate to the configured current version first
        #[arg(long)]
        migrate: bool,
        /// Include the full decoded payload
        #[arg(long)]
        payload: bool,
    },

    /// Print only the detected format
    Detect {
        /// Payload file, or "-" for stdin
        input: String,
    },

    /// Print the effective configuration, or write it to a file
    Config {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = CodecConfig::load_from(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Show { input, migrate, payload } => {
            let bytes = read_input(&input)?;
            let codec = SafeSerializer::from_config(TypeRegistry::new(), &config)?;
            let mut info = codec.inspect(&bytes, migrate)?;
            if !payload {
                info.payload = serde_json::Value::Null;
            }
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Detect { input } => {
            let bytes = read_input(&input)?;
            match detect_format(&bytes)? {
                DetectedFormat::Tagged(format) => println!("{}", format),
                DetectedFormat::Untagged => println!("untagged"),
            }
        }

        Commands::Config { output } => match output {
            Some(path) => {
                config
                    .save(&path)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("✅ Wrote {}", path.display());
            }
            None => print!("{}", toml::to_string_pretty(&config)?),
        },
    }

    Ok(())
}

fn read_input(input: &str) -> Result<Vec<u8>> {
    if input == "-" {
        let mut bytes = Vec::new();
        std::io::stdin().read_to_end(&mut bytes).context("reading stdin")?;
        Ok(bytes)
    } else {
        std::fs::read(input).with_context(|| format!("reading {}", input))
    }
}
