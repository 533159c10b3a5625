use chrono::Utc;
use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::fs;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use xv2_formats::emb::{parse_emb, synthetic_name};
use xv2_formats::emd::{parse_emd, write_emd};
use xv2_formats::importer::obj_to_emd;
use xv2_formats::obj_export::emd_to_obj;
use xv2_formats::options::ObjExportOptions;
use xv2_formats::{decode, encode};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the format of a file and print a short summary.
    Info {
        input: PathBuf,
    },
    /// Decode a file and print it as JSON.
    Dump {
        input: PathBuf,
        /// Write the JSON here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Decode a file and encode it again.
    Roundtrip {
        input: PathBuf,
        output: PathBuf,
    },
    EmdToObj {
        input: PathBuf,
        output: PathBuf,
    },
    ObjToEmd {
        input: PathBuf,
        output: PathBuf,
        /// JSON export options.
        #[arg(long)]
        options: Option<PathBuf>,
    },
    /// Write every blob of a texture container to a directory.
    EmbExtract {
        input: PathBuf,
        dir: PathBuf,
    },
}

fn roundtrip(data: &[u8]) -> xv2_formats::Result<Vec<u8>> {
    let document = decode(data)?;
    let bytes = encode(&document)?;
    if bytes == data {
        info!(format = %document.format(), "re-encoded bytes are identical");
    } else {
        info!(
            format = %document.format(),
            before = data.len(),
            after = bytes.len(),
            "re-encoded bytes differ"
        );
    }
    Ok(bytes)
}

fn convert_obj_to_emd(obj_data: &[u8], options: Option<&Path>) -> xv2_formats::Result<Vec<u8>> {
    let options = match options {
        Some(path) => ObjExportOptions::load(path)?,
        None => ObjExportOptions::default(),
    };
    let emd = obj_to_emd(obj_data, &options)?;
    write_emd(&emd)
}

fn extract_emb(data: &[u8], dir: &Path) -> xv2_formats::Result<usize> {
    let emb = parse_emb(data)?;
    fs::create_dir_all(dir)?;
    for (index, entry) in emb.entries.iter().enumerate() {
        // only the final path component is used
        let name = match Path::new(&entry.name).file_name() {
            Some(name) => PathBuf::from(name),
            None => {
                warn!(index, name = %entry.name, "entry has no usable file name");
                PathBuf::from(synthetic_name(index))
            }
        };
        fs::write(dir.join(name), &entry.data)?;
    }
    Ok(emb.entries.len())
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let start = Utc::now();
    match cli.command {
        Commands::Info { input } => {
            let data = fs::read(&input)?;
            let document = decode(&data)?;
            println!("{}: {} ({})", input.display(), document.format(), document.summary());
        }
        Commands::Dump { input, output } => {
            let data = fs::read(input)?;
            let json = serde_json::to_string_pretty(&decode(&data)?)?;
            match output {
                Some(path) => fs::write(path, json)?,
                None => println!("{json}"),
            }
        }
        Commands::Roundtrip { input, output } => {
            let data = fs::read(input)?;
            let bytes = roundtrip(&data)?;
            fs::write(output, bytes)?;
        }
        Commands::EmdToObj { input, output } => {
            let data = fs::read(input)?;
            let obj = emd_to_obj(&parse_emd(&data)?)?;
            fs::write(output, obj)?;
        }
        Commands::ObjToEmd { input, output, options } => {
            let obj_data = fs::read(input)?;
            let bytes = convert_obj_to_emd(&obj_data, options.as_deref())?;
            fs::write(output, bytes)?;
        }
        Commands::EmbExtract { input, dir } => {
            let data = fs::read(input)?;
            let count = extract_emb(&data, &dir)?;
            info!(count, dir = %dir.display(), "extracted entries");
        }
    }
    let elapsed = Utc::now().signed_duration_since(start);
    info!("done in {} ms", elapsed.num_milliseconds());
    Ok(())
}
