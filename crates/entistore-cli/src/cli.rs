use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "entistore",
    about = "Store, find and fetch files in a chunked entity store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Store snapshot file
    #[arg(long, global = true, default_value = "entistore.json")]
    pub data: PathBuf,

    /// TOML file with DAO settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store a file as chunks
    Put(PutArgs),
    /// Fetch a stored file
    Get(GetArgs),
    /// List stored files
    Ls(LsArgs),
    /// Find files whose properties match every condition
    Find(FindArgs),
    /// Delete a stored file and its chunks
    Rm(RmArgs),
    /// Show the effective configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct PutArgs {
    pub file: PathBuf,
    /// Name to store the file under (defaults to the file name)
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub content_type: Option<String>,
    /// Chunk size in bytes, overriding the configuration
    #[arg(long)]
    pub chunk_size: Option<usize>,
}

#[derive(Args)]
pub struct GetArgs {
    /// Key such as `StoredFile(3)`, or a bare numeric id
    pub key: String,
    /// Write the payload here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct LsArgs {
    /// Show every property instead of the summary
    #[arg(short, long)]
    pub long: bool,
}

#[derive(Args)]
pub struct FindArgs {
    /// Conditions of the form `field=value`; values are parsed as JSON when
    /// possible and taken as strings otherwise
    #[arg(required = true)]
    pub conditions: Vec<String>,
}

#[derive(Args)]
pub struct RmArgs {
    pub key: String,
}

#[derive(Args)]
pub struct ConfigArgs {}
