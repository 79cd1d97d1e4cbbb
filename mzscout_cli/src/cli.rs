use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Peaktable ingestion and spectral-library annotation", long_about = None)]
pub struct Cli {
    /// Path to the JSON run configuration.
    #[arg(short, long)]
    pub config: PathBuf,

    /// Override the peaktable path from the config.
    #[arg(long)]
    pub peaktable: Option<PathBuf>,

    /// Override the output directory from the config.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}
