//! Lock-free MPMC queue benchmark.
//!
//! Spawns producers and consumers against one shared `RingQueue<u64>`, times
//! the run, and checks that the consumed values sum to the produced total.
//!
//! ```text
//! cargo run --release --bin lockfree_bench -- --producers 4 --consumers 4
//! ```

use anyhow::{bail, Result};
use clap::Parser;
use ringmpmc_rs::harness::{self, Workload};
use ringmpmc_rs::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "lockfree_bench", about = "Bounded lock-free MPMC queue throughput benchmark")]
struct Args {
    /// Number of producer threads
    #[arg(short, long, default_value_t = 4)]
    producers: usize,

    /// Number of consumer threads
    #[arg(short, long, default_value_t = 4)]
    consumers: usize,

    /// Values enqueued by each producer
    #[arg(short, long, default_value_t = 1_000_000)]
    ops: u64,

    /// Ring size as a power of two (16 = 65536 slots)
    #[arg(short, long, default_value_t = 16)]
    ring_bits: u8,

    /// Collect queue metrics (full/empty/CAS retry counters)
    #[arg(long)]
    metrics: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ringmpmc_rs=info,lockfree_bench=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let workload = Workload {
        producers: args.producers,
        consumers: args.consumers,
        ops_per_producer: args.ops,
        config: Config::new(args.ring_bits, args.metrics),
    };

    let report = harness::run(&workload)?;
    println!("{report}");

    if args.metrics {
        let m = report.metrics;
        tracing::info!(
            enqueued = m.enqueued,
            dequeued = m.dequeued,
            full_rejections = m.full_rejections,
            empty_polls = m.empty_polls,
            cas_retries = m.cas_retries,
            "queue metrics"
        );
    }

    if !report.is_valid() {
        bail!(
            "checksum mismatch: consumed {} (sum {}), expected sum {}",
            report.consumed,
            report.checksum,
            report.expected
        );
    }
    Ok(())
}
