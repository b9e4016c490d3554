use anyhow::{bail, Context};
use bp7::administrative_record::AdministrativeRecord;
use bp7::crc::{CrcRawType, CrcTypeName, CRC_16, CRC_32, CRC_NO};
use bp7::dtntime::{DtnTime, DtnTimeHelpers};
use bp7::helpers::{hexify, rnd_bundle_with, unhexify, GeneratorConfig};
use bp7::*;
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Inspect, generate and dump BPv7 bundles.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print id and hex encoding of random bundles
    Rnd {
        /// TOML file with generator settings
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Number of bundles to generate
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
        /// Write the raw CBOR bytes to stdout instead of id and hex
        #[arg(short, long)]
        raw: bool,
    },
    /// Decode a hex encoded bundle, read from stdin when not given
    Decode {
        hex: Option<String>,
        /// Print the bundle as JSON instead of debug output
        #[arg(long, conflicts_with = "payload_only")]
        json: bool,
        /// Write only the payload bytes to stdout
        #[arg(short, long)]
        payload_only: bool,
    },
    /// Build a bundle and print its hex encoding
    Encode {
        #[arg(long)]
        src: String,
        #[arg(long)]
        dst: String,
        #[arg(long)]
        payload: String,
        #[arg(long, value_enum, default_value_t = CrcArg::No)]
        crc: CrcArg,
    },
    /// Print current dtn time, or the given dtn timestamp in human readable form
    Dtntime { ts: Option<DtnTime> },
    /// Convert a dtn timestamp into a unix timestamp in milliseconds
    D2u { ts: DtnTime },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CrcArg {
    #[value(name = "no")]
    No,
    #[value(name = "16")]
    Crc16,
    #[value(name = "32")]
    Crc32,
}

impl From<CrcArg> for CrcRawType {
    fn from(arg: CrcArg) -> Self {
        match arg {
            CrcArg::No => CRC_NO,
            CrcArg::Crc16 => CRC_16,
            CrcArg::Crc32 => CRC_32,
        }
    }
}

fn load_generator_config(path: &Path) -> anyhow::Result<GeneratorConfig> {
    let cfg: GeneratorConfig = config::Config::builder()
        .add_source(config::File::from(path))
        .build()
        .with_context(|| format!("failed to read configuration '{}'", path.display()))?
        .try_deserialize()
        .context("failed to parse generator configuration")?;
    Ok(cfg)
}

fn rnd(config: Option<PathBuf>, count: usize, raw: bool) -> anyhow::Result<()> {
    let cfg = match config {
        Some(path) => {
            info!("Using configuration file '{}'", path.display());
            load_generator_config(&path)?
        }
        None => GeneratorConfig::default(),
    };
    let counter = SequenceCounter::new();
    let mut stdout = io::stdout().lock();
    for _ in 0..count {
        let bndl = rnd_bundle_with(&cfg, CreationTimestamp::now(&counter))?;
        let buf = bndl.to_cbor()?;
        if raw {
            debug!("writing {} ({} bytes)", bndl.id(), buf.len());
            stdout.write_all(&buf)?;
        } else {
            writeln!(stdout, "{}", bndl.id())?;
            writeln!(stdout, "{}\n", hexify(&buf))?;
        }
    }
    stdout.flush()?;
    Ok(())
}

fn read_input(hex: Option<String>) -> anyhow::Result<Vec<u8>> {
    if let Some(hex) = hex {
        return Ok(unhexify(hex.trim())?);
    }
    let mut buf: Vec<u8> = Vec::new();
    io::stdin()
        .read_to_end(&mut buf)
        .context("error reading from stdin")?;
    // stdin may carry either hex text or the raw bundle
    match std::str::from_utf8(&buf).ok().map(str::trim) {
        Some(text) if !text.is_empty() => match unhexify(text) {
            Ok(bytes) => Ok(bytes),
            Err(_) => Ok(buf),
        },
        _ => Ok(buf),
    }
}

fn decode(hex: Option<String>, json: bool, payload_only: bool) -> anyhow::Result<()> {
    let buf = read_input(hex)?;
    debug!("decoding {} bytes", buf.len());
    match serde_cbor::from_slice::<serde_cbor::Value>(&buf) {
        Ok(value) => debug!("raw cbor: {:?}", value),
        Err(err) => debug!("input is not a single cbor item: {}", err),
    }
    let bndl = Bundle::try_from(buf.as_slice()).context("error decoding bundle")?;
    match bndl.validate() {
        Ok(()) => info!("bundle {} is valid", bndl.id()),
        Err(errors) => {
            for err in &errors {
                warn!("bundle {}: {}", bndl.id(), err);
            }
        }
    }
    if bndl.is_administrative_record() {
        match AdministrativeRecord::try_from(&bndl) {
            Ok(record) => info!("administrative record: {:?}", record),
            Err(err) => warn!("bundle {}: {}", bndl.id(), err),
        }
    }
    if payload_only {
        let payload = bndl.payload().context("bundle has no payload")?;
        let mut stdout = io::stdout().lock();
        stdout.write_all(payload)?;
        stdout.flush()?;
    } else if json {
        println!("{}", bndl.to_json()?);
    } else {
        println!("{:#?}", bndl);
    }
    Ok(())
}

fn encode(src: &str, dst: &str, payload: &str, crc: CrcArg) -> anyhow::Result<()> {
    let counter = SequenceCounter::new();
    let now = CreationTimestamp::now(&counter);
    let mut bndl = api::construct_default(src, dst, payload.as_bytes(), now)?;
    let crc_type: CrcRawType = crc.into();
    bndl.set_crc(crc_type);
    bndl.calculate_crc()?;
    if let Err(errors) = bndl.validate() {
        bail!(Error::ValidationError(errors));
    }
    debug!("encoding {} with crc {}", bndl.id(), crc_type.crc_name());
    println!("{}", hexify(&bndl.to_cbor()?));
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Rnd { config, count, raw } => rnd(config, count, raw),
        Commands::Decode {
            hex,
            json,
            payload_only,
        } => decode(hex, json, payload_only),
        Commands::Encode {
            src,
            dst,
            payload,
            crc,
        } => encode(&src, &dst, &payload, crc),
        Commands::Dtntime { ts } => {
            match ts {
                Some(ts) => println!("{}", ts.string()),
                None => println!("{}", dtn_time_now()),
            }
            Ok(())
        }
        Commands::D2u { ts } => {
            println!("{}", ts.unix());
            Ok(())
        }
    }
}
