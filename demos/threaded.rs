//! Two threads, two profiled types.
//!
//! Each worker owns one instance of its own type and hammers a different
//! field; the report shows the two access patterns side by side.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example threaded -- [iterations]
//! ```

use std::hint::black_box;
use std::thread;

use accprof::{ProfiledBox, Profiler, ProfilerConfig};
use tracing_subscriber::EnvFilter;

#[derive(Default)]
struct Connection {
    id: u64,
    bytes_sent: u64,
    bytes_received: u64,
    last_error: Option<u32>,
}

#[derive(Default)]
struct CacheEntry {
    key: [u8; 16],
    hits: u32,
    misses: u32,
}

fn parse_args() -> Result<u64, Box<dyn std::error::Error>> {
    Ok(match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => 1000,
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("accprof=info".parse()?),
        )
        .with_target(false)
        .init();
    accprof::metrics::init();

    let iterations = parse_args()?;
    let profiler = Profiler::start(ProfilerConfig::default())?;

    let sender = thread::spawn(move || {
        let mut conn = ProfiledBox::new(Connection {
            id: 7,
            ..Connection::default()
        });
        for i in 0..iterations {
            conn.bytes_sent += black_box(i % 1500);
            if conn.bytes_sent % 4096 == 0 {
                conn.last_error = Some(0);
            }
        }
        (conn.id, conn.bytes_sent, conn.bytes_received, conn.last_error)
    });

    let cache = thread::spawn(move || {
        let mut entry = ProfiledBox::new(CacheEntry::default());
        entry.key[0] = 1;
        for i in 0..iterations {
            if black_box(i) % 3 == 0 {
                entry.misses += 1;
            } else {
                entry.hits += 1;
            }
        }
        (entry.hits, entry.misses)
    });

    let (id, sent, received, last_error) = sender.join().map_err(|_| "sender panicked")?;
    let (hits, misses) = cache.join().map_err(|_| "cache worker panicked")?;
    println!("connection {id}: sent={sent} received={received} last_error={last_error:?}");
    println!("cache: hits={hits} misses={misses}");

    let report = profiler.stop();
    print!("{report}");
    Ok(())
}
