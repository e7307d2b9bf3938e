use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "apiprobe")]
#[command(version = "0.3.0")]
#[command(about = "API endpoint liveness scanner with TLS certificate domain discovery", long_about = None)]
pub struct Cli {
    #[arg(short, long, help = "Input file with one host:port candidate per line")]
    pub input: PathBuf,

    #[arg(
        short = 'f',
        long,
        default_value = "categorized_results.json",
        help = "Output file path"
    )]
    pub output_file: PathBuf,

    #[arg(
        short = 'o',
        long,
        value_enum,
        default_value = "human",
        help = "Stdout format; the JSON report file is always written"
    )]
    pub output_format: OutputFormat,

    #[arg(long, help = "Timeout in milliseconds per candidate (overrides config)")]
    pub timeout: Option<u64>,

    #[arg(short, long, help = "Number of concurrent probes (overrides config)")]
    pub concurrency: Option<usize>,

    #[arg(long, help = "Port assumed for lines without one (overrides config)")]
    pub default_port: Option<u16>,

    #[arg(long, help = "Skip the TLS certificate domain scan")]
    pub skip_cert_scan: bool,

    #[arg(long, help = "Write a debug log to this file in addition to stderr")]
    pub log_file: Option<PathBuf>,

    #[arg(long, help = "Hide the progress bar")]
    pub no_progress: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Enable debug output")]
    pub debug: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum OutputFormat {
    #[value(name = "human", help = "Human-readable summary on stdout")]
    Human,
    #[value(name = "json", help = "No stdout summary, report file only")]
    Json,
}
