//! Field access counts for a small record.
//!
//! Opts one type into profiling, updates two of its fields in a loop and
//! writes the per-offset counts to `access_profile.out`.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example field_counts
//! cat access_profile.out
//! ```

use std::mem::MaybeUninit;
use std::ptr;

use accprof::{ProfiledBox, Profiler, ProfilerConfig};
use tracing_subscriber::EnvFilter;

/// 50 bytes nobody touches, then two counters at offsets 50 and 54.
#[repr(C, packed)]
struct Record {
    _buffer: [MaybeUninit<u8>; 50],
    a: i32,
    b: i32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("accprof=info".parse()?),
        )
        .with_target(false)
        .init();
    accprof::metrics::init();

    let profiler = Profiler::start(ProfilerConfig::default())?;

    // Only the two counters are initialized; the buffer stays untouched.
    let mut uninit = ProfiledBox::<Record>::new_uninit();
    let p = uninit.as_mut_ptr().cast::<Record>();
    unsafe {
        ptr::addr_of_mut!((*p).a).write_unaligned(0);
        ptr::addr_of_mut!((*p).b).write_unaligned(0);
    }
    let mut record = unsafe { uninit.assume_init() };

    for _ in 0..10 {
        record.a += 1;
        record.b += record.a;
    }
    let b = record.b;
    println!("{b}");
    drop(record);

    let report = profiler.stop();
    print!("{report}");
    Ok(())
}
