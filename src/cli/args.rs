//! Command-line argument definitions.

use clap::builder::RangedU64ValueParser;
use clap::Parser;
use std::path::{Path, PathBuf};

use super::DEFAULT_OUTPUT_BUFFER;
use crate::format::{DEFAULT_RECORD_CAPACITY, MAX_RECORD_CAPACITY, MIN_RECORD_CAPACITY};
use crate::postgres::DEFAULT_MAX_MESSAGE_LENGTH;
use crate::stream::{TraceConfig, DEFAULT_SERVER_PORT};

/// Trace PostgreSQL protocol messages from a packet capture.
///
/// Writes one line per message: timestamp, client port, direction,
/// message name, length and a printable rendering of the payload.
/// Send SIGUSR1 to log statistics and flush buffered output.
#[derive(Parser, Debug)]
#[command(name = "pgtrace")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Capture to read (pcap or pcapng, optionally gzipped), or `-` for stdin
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Port the PostgreSQL server listens on
    #[arg(short = 'p', long = "port", value_name = "PORT", default_value_t = DEFAULT_SERVER_PORT)]
    pub port: u16,

    /// Longest message accepted before a stream is treated as out of sync
    #[arg(
        long = "max-message-length",
        value_name = "BYTES",
        default_value_t = DEFAULT_MAX_MESSAGE_LENGTH,
        value_parser = clap::value_parser!(i32).range(4..)
    )]
    pub max_message_length: i32,

    /// Maximum length of one output line; longer payloads end in "..."
    #[arg(
        long = "record-capacity",
        value_name = "BYTES",
        default_value_t = DEFAULT_RECORD_CAPACITY,
        value_parser = RangedU64ValueParser::<usize>::new()
            .range(MIN_RECORD_CAPACITY as u64..=MAX_RECORD_CAPACITY as u64)
    )]
    pub record_capacity: usize,

    /// Write the trace to a file instead of stdout
    #[arg(short = 'o', long = "output", value_name = "OUTPUT_FILE")]
    pub output: Option<PathBuf>,

    /// Output buffer size
    #[arg(long = "output-buffer", value_name = "BYTES", default_value_t = DEFAULT_OUTPUT_BUFFER)]
    pub output_buffer: usize,

    /// Enable verbose logging (repeat for more)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Whether the capture should be read from stdin.
    pub fn reads_stdin(&self) -> bool {
        self.input == Path::new("-")
    }

    pub fn trace_config(&self) -> TraceConfig {
        TraceConfig {
            server_port: self.port,
            max_message_length: self.max_message_length,
            record_capacity: self.record_capacity,
        }
    }

    /// Default log filter for the verbosity level.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["pgtrace", "capture.pcap"]).unwrap();
        assert_eq!(args.input, PathBuf::from("capture.pcap"));
        assert!(!args.reads_stdin());
        assert_eq!(args.output, None);
        assert_eq!(args.output_buffer, 256 * 1024);
        assert_eq!(args.log_filter(), "warn");

        let config = args.trace_config();
        assert_eq!(config.server_port, 5432);
        assert_eq!(config.max_message_length, 1024 * 1024);
        assert_eq!(config.record_capacity, 4096);
    }

    #[test]
    fn test_stdin_and_overrides() {
        let args = Args::try_parse_from([
            "pgtrace",
            "-p",
            "6432",
            "--max-message-length",
            "65536",
            "--record-capacity",
            "512",
            "-o",
            "trace.log",
            "-vv",
            "-",
        ])
        .unwrap();

        assert!(args.reads_stdin());
        assert_eq!(args.output, Some(PathBuf::from("trace.log")));
        assert_eq!(args.log_filter(), "debug");

        let config = args.trace_config();
        assert_eq!(config.server_port, 6432);
        assert_eq!(config.max_message_length, 65536);
        assert_eq!(config.record_capacity, 512);
    }

    #[test]
    fn test_rejects_negative_max_length() {
        assert!(Args::try_parse_from(["pgtrace", "--max-message-length", "-1", "x.pcap"]).is_err());
    }

    #[test]
    fn test_record_capacity_bounds() {
        let parse = |value: &str| {
            Args::try_parse_from(["pgtrace", "--record-capacity", value, "x.pcap"])
                .map(|args| args.record_capacity)
        };
        assert_eq!(parse("64").unwrap(), 64);
        assert_eq!(parse("1048576").unwrap(), 1 << 20);
        assert!(parse("63").is_err());
        assert!(parse("1048577").is_err());
        assert!(parse("18446744073709551615").is_err());
    }

    #[test]
    fn test_input_required() {
        assert!(Args::try_parse_from(["pgtrace"]).is_err());
    }
}
