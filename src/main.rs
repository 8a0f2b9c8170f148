//! hexaswitch - command line front end for Hexabus devices

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hexabus::config::{self, Config};
use hexabus::{Client, DataType, Discovery, DiscoveryError, Directory, Payload};

/// EID of a device's main switch
const EID_SWITCH: u32 = 1;

/// EID of a device's power meter
const EID_POWER: u32 = 2;

/// hexaswitch - talk to Hexabus devices
#[derive(Parser)]
#[command(name = "hexaswitch")]
#[command(author = "Hexabus Contributors")]
#[command(version = hexabus::VERSION)]
#[command(about = "Query, set and discover Hexabus device endpoints", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the value of an endpoint
    Get {
        /// Device address (port defaults to 61616)
        #[arg(short, long)]
        ip: String,

        /// Endpoint ID
        #[arg(short, long)]
        eid: u32,
    },

    /// Write a value to an endpoint
    Set {
        /// Device address (port defaults to 61616)
        #[arg(short, long)]
        ip: String,

        /// Endpoint ID
        #[arg(short, long)]
        eid: u32,

        /// Data type: 1 Bool, 2 UInt8, 3 UInt32, 4 DateTime, 5 Float,
        /// 6 String, 7 Timestamp, 8 Bytes65, 9 Bytes16
        #[arg(short, long, value_parser = parse_data_type)]
        datatype: DataType,

        /// Value to write
        #[arg(long)]
        value: String,
    },

    /// Show the data type and description of an endpoint
    Epquery {
        /// Device address (port defaults to 61616)
        #[arg(short, long)]
        ip: String,

        /// Endpoint ID
        #[arg(short, long)]
        eid: u32,
    },

    /// List the endpoints of a device
    Discover {
        /// Device address (port defaults to 61616)
        #[arg(short, long)]
        ip: String,

        /// Number of EIDs to scan
        #[arg(long)]
        eids: Option<u32>,

        /// Probe writability with trial writes (changes device state)
        #[arg(long)]
        probe_writability: bool,

        /// Print the directory as JSON
        #[arg(long)]
        json: bool,
    },

    /// Switch a device on
    On {
        #[arg(short, long)]
        ip: String,
    },

    /// Switch a device off
    Off {
        #[arg(short, long)]
        ip: String,
    },

    /// Show whether a device is switched on
    Status {
        #[arg(short, long)]
        ip: String,
    },

    /// Show the power reading of a device
    Power {
        #[arg(short, long)]
        ip: String,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn parse_data_type(value: &str) -> Result<DataType, String> {
    if let Ok(tag) = value.parse::<u8>() {
        return DataType::try_from(tag).map_err(|tag| format!("unknown data type {}", tag));
    }

    DataType::ALL
        .into_iter()
        .find(|dtype| dtype.name().eq_ignore_ascii_case(value))
        .ok_or_else(|| format!("unknown data type {:?}", value))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    let client = Client::new(config.client_config());

    match cli.command {
        Commands::Get { ip, eid } => {
            let info = client.query_info(&ip, eid).await?;
            println!(
                "Eid:\t{}\nType:\t{}\nValue:\t{}",
                info.eid,
                info.data_type(),
                info.payload
            );
        }
        Commands::Set {
            ip,
            eid,
            datatype,
            value,
        } => {
            let payload = Payload::parse(datatype, &value)?;
            client.write(&ip, eid, payload).await?;
        }
        Commands::Epquery { ip, eid } => {
            let info = client.endpoint_query(&ip, eid).await?;
            println!(
                "Eid:\t{}\nType:\t{}\nDescription:\t{}",
                info.eid,
                type_label(info.dtype),
                info.description
            );
        }
        Commands::Discover {
            ip,
            eids,
            probe_writability,
            json,
        } => {
            let discovery = Discovery::new(client)
                .with_writability_probe(probe_writability || config.discovery.probe_writability);
            let eid_count = eids.unwrap_or(config.discovery.eid_count);

            match discovery.discover(&ip, eid_count).await {
                Ok(directory) => print_directory(&directory, json)?,
                Err(DiscoveryError::Incomplete { found, failures }) => {
                    print_directory(&found, json)?;
                    for (eid, error) in &failures {
                        eprintln!("Eid {}: {}", eid, error);
                    }
                    anyhow::bail!("{} endpoint(s) could not be described", failures.len());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::On { ip } => {
            client.write(&ip, EID_SWITCH, Payload::Bool(true)).await?;
        }
        Commands::Off { ip } => {
            client.write(&ip, EID_SWITCH, Payload::Bool(false)).await?;
        }
        Commands::Status { ip } => {
            let info = client.query_info(&ip, EID_SWITCH).await?;
            match info.payload {
                Payload::Bool(true) => println!("on"),
                Payload::Bool(false) => println!("off"),
                other => anyhow::bail!("unexpected switch value {} ({})", other, other.data_type()),
            }
        }
        Commands::Power { ip } => {
            let info = client.query_info(&ip, EID_POWER).await?;
            println!("{}", info.payload);
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config()?;
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}

fn print_directory(directory: &Directory, json: bool) -> anyhow::Result<()> {
    if json {
        let endpoints: Vec<_> = directory.values().collect();
        println!("{}", serde_json::to_string_pretty(&endpoints)?);
        return Ok(());
    }

    for endpoint in directory.values() {
        println!(
            "{:>5}  {:<10} {:<3} {}",
            endpoint.eid,
            type_label(endpoint.dtype),
            if endpoint.writable { "rw" } else { "r" },
            endpoint.description
        );
    }
    Ok(())
}

/// Name of a known data type, otherwise the raw byte
fn type_label(dtype: u8) -> String {
    match DataType::try_from(dtype) {
        Ok(dtype) => dtype.to_string(),
        Err(byte) => format!("{:#04x}", byte),
    }
}
