use clap::Parser;

use nfio_core::GroupingMode;

/// MPI-parallel benchmark for coordinated N-to-M file write/read passes.
#[derive(Parser, Debug)]
#[command(name = "nfio-bench", about = "N-to-M coordinated file I/O benchmark")]
pub struct CliArgs {
    /// Number of physical output files (clamped to [1, num ranks])
    #[arg(short = 'n', long = "nfiles", default_value_t = 128)]
    pub nfiles: i32,

    /// Output file prefix; file number is appended zero-padded
    #[arg(short = 'o', long = "prefix", default_value = "NFiles")]
    pub prefix: String,

    /// Map contiguous rank blocks to one file instead of interleaving
    #[arg(short = 'g', long = "grouped")]
    pub grouped: bool,

    /// Dynamic (load-balanced) writer selection instead of the static waves
    #[arg(short = 'd', long = "dynamic")]
    pub dynamic: bool,

    /// Decider rank for dynamic selection (default: last rank)
    #[arg(long = "decider")]
    pub decider: Option<i32>,

    /// Payload bytes written per rank (supports k/m/g suffixes)
    #[arg(short = 'b', long = "bytes-per-rank", default_value = "1m")]
    pub bytes_per_rank: String,

    /// Stream buffer size in bytes (supports k/m/g suffixes)
    #[arg(long = "buffer-size", default_value = "2m")]
    pub buffer_size: String,

    /// Number of times to repeat the pass
    #[arg(short = 't', long = "ntimes", default_value_t = 1)]
    pub ntimes: i32,

    /// Read files back after a static write pass and verify wave order
    #[arg(short = 'r', long = "read-back")]
    pub read_back: bool,

    /// Keep output files after the run
    #[arg(short = 'k', long = "keep-files")]
    pub keep_files: bool,

    /// Output results as JSON to stdout (suppresses text output)
    #[arg(long = "json")]
    pub json: bool,

    /// Output results as JSON to file (text output still printed)
    #[arg(long = "json-file")]
    pub json_file: Option<String>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl CliArgs {
    pub fn mode(&self) -> GroupingMode {
        if self.grouped {
            GroupingMode::Grouped
        } else {
            GroupingMode::Interleaved
        }
    }
}

/// Parse a size string with optional k/m/g/t suffix (case-insensitive).
pub fn parse_size(s: &str) -> i64 {
    let s = s.trim();
    if s.is_empty() {
        return 0;
    }

    let (num_str, multiplier) = match s.as_bytes().last() {
        Some(b'k' | b'K') => (&s[..s.len() - 1], 1024i64),
        Some(b'm' | b'M') => (&s[..s.len() - 1], 1024 * 1024),
        Some(b'g' | b'G') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        Some(b't' | b'T') => (&s[..s.len() - 1], 1024i64 * 1024 * 1024 * 1024),
        _ => (s, 1),
    };

    num_str
        .trim()
        .parse::<i64>()
        .unwrap_or_else(|_| panic!("invalid size: {s}"))
        * multiplier
}
