//! pgtrace CLI entry point.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pgtrace::cli::{Args, OutputSink};
use pgtrace::pcap::PcapReader;
use pgtrace::stream::{TraceManager, TraceStats};

/// Exit status after an interrupt (128 + SIGINT).
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Output and running statistics, shared between the trace worker and the
/// signal handlers.
struct Shared {
    out: Mutex<OutputSink>,
    stats: Mutex<TraceStats>,
}

impl Shared {
    fn out(&self) -> MutexGuard<'_, OutputSink> {
        self.out.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stats(&self) -> TraceStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, stats: &TraceStats) {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner) = *stats;
    }

    /// Log statistics and push buffered trace lines out.
    fn report(&self) -> io::Result<()> {
        log_stats(&self.stats());
        self.out().flush()
    }
}

/// Writes each record under the output lock, so a flush from a signal
/// handler never splits a line.
struct SharedWriter<'a>(&'a Shared);

impl Write for SharedWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.out().write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.0.out().write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.out().flush()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries the trace
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| args.log_filter().into()),
        )
        .init();

    let out = OutputSink::open(args.output.as_deref(), args.output_buffer).with_context(|| {
        match &args.output {
            Some(path) => format!("Failed to create output file: {}", path.display()),
            None => "Failed to open stdout".to_string(),
        }
    })?;

    let shared = Arc::new(Shared {
        out: Mutex::new(out),
        stats: Mutex::new(TraceStats::default()),
    });

    // Installed before the capture header is read, which may block on stdin
    spawn_signal_listeners(Arc::clone(&shared))?;

    info!(input = %args.input.display(), port = args.port, "tracing");

    let worker = Arc::clone(&shared);
    let stats = tokio::task::spawn_blocking(move || trace_capture(&args, &worker))
        .await
        .context("Trace worker panicked")??;

    log_stats(&stats);
    Ok(())
}

/// Open the capture and trace it, flushing output before returning.
fn trace_capture(args: &Args, shared: &Shared) -> Result<TraceStats> {
    let reader = if args.reads_stdin() {
        PcapReader::stdin().context("Failed to read capture from stdin")?
    } else {
        PcapReader::open(&args.input)
            .with_context(|| format!("Failed to open capture: {}", args.input.display()))?
    };

    let mut manager = TraceManager::new(args.trace_config());
    let result = trace_packets(reader, &mut manager, shared);
    shared.publish(manager.stats());

    let flushed = shared.out().flush();
    result?;
    flushed?;
    Ok(*manager.stats())
}

fn trace_packets(
    reader: PcapReader,
    manager: &mut TraceManager,
    shared: &Shared,
) -> pgtrace::Result<()> {
    let mut out = SharedWriter(shared);
    for packet in reader {
        manager.process_packet(&packet?, &mut out)?;
        shared.publish(manager.stats());
    }
    Ok(())
}

fn spawn_signal_listeners(shared: Arc<Shared>) -> io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut usr1 = signal(SignalKind::user_defined1())?;
        let on_usr1 = Arc::clone(&shared);
        tokio::spawn(async move {
            while usr1.recv().await.is_some() {
                let shared = Arc::clone(&on_usr1);
                // Flushing blocks while the consumer is slow
                match tokio::task::spawn_blocking(move || shared.report()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(error = %e, "failed to flush output"),
                    Err(e) => warn!(error = %e, "report task failed"),
                }
            }
        });
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            // The worker may be blocked reading an idle stream, so finish
            // here. Holding the output lock keeps a partial record out.
            let mut out = shared.out();
            if let Err(e) = out.flush() {
                warn!(error = %e, "failed to flush output");
            }
            warn!("interrupted");
            log_stats(&shared.stats());
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    });
    Ok(())
}

fn log_stats(stats: &TraceStats) {
    info!(
        packets = stats.packets,
        skipped = stats.skipped,
        accepted = stats.accepted,
        duplicates = stats.duplicates,
        out_of_order = stats.out_of_order,
        bytes = stats.bytes,
        records = stats.records,
        unrecognized = stats.unrecognized,
        aborted = stats.aborted,
        "trace statistics"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn shared_file() -> (NamedTempFile, Shared) {
        let temp = NamedTempFile::new().unwrap();
        let out = OutputSink::create(temp.path(), 64 * 1024).unwrap();
        let shared = Shared {
            out: Mutex::new(out),
            stats: Mutex::new(TraceStats::default()),
        };
        (temp, shared)
    }

    #[test]
    fn test_report_flushes_buffered_records() {
        let (temp, shared) = shared_file();
        SharedWriter(&shared)
            .write_all(b"1000000 49152 fe Sync 4\n")
            .unwrap();
        assert!(std::fs::read(temp.path()).unwrap().is_empty());

        // No further packet is needed for the line to appear
        shared.report().unwrap();
        assert_eq!(
            std::fs::read_to_string(temp.path()).unwrap(),
            "1000000 49152 fe Sync 4\n"
        );
    }

    #[test]
    fn test_published_stats_are_visible() {
        let (_temp, shared) = shared_file();
        let stats = TraceStats {
            packets: 3,
            records: 2,
            ..TraceStats::default()
        };
        shared.publish(&stats);
        assert_eq!(shared.stats(), stats);
    }
}
