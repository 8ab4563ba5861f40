use std::path::PathBuf;

use ccas_crypto::HashAlgorithm;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "ccas",
    about = "Convergent content-addressed object store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

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
    /// Create a new repository
    Init(InitArgs),
    /// Print the ID a file would be stored under
    Hash(HashArgs),
    /// Store files in a repository
    Put(PutArgs),
    /// Read an object back
    Get(GetArgs),
    /// Summarize and optionally verify a repository's objects
    Stats(StatsArgs),
}

#[derive(Args)]
pub struct InitArgs {
    pub repo: PathBuf,
    /// Use convergent encryption with a freshly generated master secret
    #[arg(long)]
    pub encrypt: bool,
    /// Digest for plain repositories
    #[arg(long, default_value = "blake3")]
    pub hash: HashAlgorithm,
}

#[derive(Args)]
pub struct HashArgs {
    pub file: PathBuf,
    /// Use this repository's formatter instead of a plain digest
    #[arg(long)]
    pub repo: Option<PathBuf>,
    #[arg(long, default_value = "")]
    pub prefix: String,
    /// Digest used when no repository is given
    #[arg(long, default_value = "blake3")]
    pub hash: HashAlgorithm,
}

#[derive(Args)]
pub struct PutArgs {
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
    #[arg(long)]
    pub repo: PathBuf,
    #[arg(long, default_value = "")]
    pub prefix: String,
}

#[derive(Args)]
pub struct GetArgs {
    pub id: String,
    #[arg(long)]
    pub repo: PathBuf,
    /// Hex encryption key printed by `put`, required for encrypted objects
    #[arg(long)]
    pub key: Option<String>,
    /// Write to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct StatsArgs {
    #[arg(long)]
    pub repo: PathBuf,
    /// Re-derive and check the ID of every plain object
    #[arg(long)]
    pub verify: bool,
}
