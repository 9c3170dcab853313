use std::path::PathBuf;

use clap::Parser;

/// arkscan: explorer for off-chain settlement rounds and VTXOs.
#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    /// Address to bind the query server to.
    #[arg(long, default_value = "127.0.0.1", env = "ARKSCAN_BIND")]
    pub bind: String,

    /// Port to listen on.
    #[arg(long, default_value = "3090", env = "ARKSCAN_PORT")]
    pub port: u16,

    /// JSONL file of lifecycle events emitted by the settlement engine.
    #[arg(long, env = "ARKSCAN_EVENTS")]
    pub events: Option<PathBuf>,

    /// Keep tailing the events file for newly appended events.
    #[arg(long)]
    pub follow: bool,

    /// Poll interval for `--follow`, in milliseconds.
    #[arg(long, default_value = "500")]
    pub poll_interval_ms: u64,

    /// Path of the JSONL storage log. If omitted, the index is in-memory only.
    #[arg(long, env = "ARKSCAN_STORE")]
    pub store: Option<PathBuf>,

    /// Reject replayed events instead of ignoring them.
    #[arg(long)]
    pub strict_replay: bool,

    /// Initial wait before retrying an event that failed on storage, in
    /// milliseconds. Doubles on each further failure.
    #[arg(long, default_value = "200")]
    pub retry_backoff_ms: u64,

    /// Capacity of the channel between the feed reader and the processor.
    #[arg(long, default_value = "1024")]
    pub feed_buffer: usize,
}
