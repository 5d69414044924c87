//! End-to-end counting through real page faults and single-step traps.
//!
//! All tests share one process-wide profiler; each test uses its own types so
//! the counters do not interfere.

#![cfg(all(target_arch = "x86_64", any(target_os = "linux", target_os = "macos")))]

use std::any::type_name;
use std::hint::black_box;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::OnceLock;

use accprof::{AccessCounters, PAGE_SIZE, ProfiledBox, Profiler, ProfilerConfig};
use accprof_sys::{map_pages, unmap_pages};
use memoffset::offset_of;

fn profiler() -> &'static Profiler {
    static PROFILER: OnceLock<&'static Profiler> = OnceLock::new();
    PROFILER.get_or_init(|| {
        let path = std::env::temp_dir().join(format!("accprof-{}.out", std::process::id()));
        Profiler::start(ProfilerConfig::default().with_report_path(path))
            .expect("profiler should start")
    })
}

fn counters<T: 'static>(b: &ProfiledBox<T>) -> &'static AccessCounters {
    let index = b.token().index().expect("type should be registered");
    profiler()
        .registry()
        .record(index)
        .expect("record should exist")
        .counters()
}

#[allow(dead_code)]
#[repr(C, packed)]
struct Scenario {
    buffer: [MaybeUninit<u8>; 50],
    a: i32,
    b: i32,
}

#[test]
fn test_field_scenario() {
    assert_eq!(offset_of!(Scenario, a), 50);
    assert_eq!(offset_of!(Scenario, b), 54);

    let profiler = profiler();
    let mut uninit = ProfiledBox::<Scenario>::new_uninit_in(Some(profiler));
    assert!(uninit.is_tracked());

    let p = uninit.as_mut_ptr().cast::<Scenario>();
    unsafe {
        ptr::addr_of_mut!((*p).a).write_unaligned(0);
        ptr::addr_of_mut!((*p).b).write_unaligned(0);
    }
    let mut t = unsafe { uninit.assume_init() };

    for _ in 0..10 {
        t.a += 1;
        t.b += t.a;
    }
    let b = t.b;
    assert_eq!(black_box(b), 55);
    drop(t);

    let report = profiler.report();
    let block = report
        .find(type_name::<Scenario>())
        .expect("scenario type should be reported");
    assert!(block.count_at(50) >= 10, "offset 50: {}", block.count_at(50));
    assert!(block.count_at(54) >= 10, "offset 54: {}", block.count_at(54));
    for offset in 0..50 {
        assert_eq!(block.count_at(offset), 0, "offset {offset} was never touched");
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("access_profile.out");
    profiler.emit_report(&path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    let mut lines = text.lines().skip_while(|l| *l != type_name::<Scenario>());
    assert_eq!(lines.next(), Some(type_name::<Scenario>()));
    let offsets: Vec<usize> = lines
        .take_while(|l| !l.is_empty())
        .map(|l| l.split(':').next().unwrap().trim().parse().unwrap())
        .collect();
    assert!(offsets.contains(&50));
    assert!(offsets.contains(&54));
    assert!(offsets.windows(2).all(|w| w[0] < w[1]));
}

#[allow(dead_code)]
#[repr(C)]
struct Slots {
    first: u64,
    second: u64,
    third: u64,
}

#[test]
fn test_each_access_counted_once() {
    let mut slots = ProfiledBox::<Slots>::new_uninit_in(Some(profiler()));
    assert!(slots.is_tracked());
    let p = slots.as_mut_ptr().cast::<Slots>();

    unsafe {
        for i in 0..25u64 {
            ptr::addr_of_mut!((*p).second).write_volatile(i);
        }
        for _ in 0..5 {
            black_box(ptr::addr_of!((*p).second).read_volatile());
        }
        assert_eq!(ptr::addr_of!((*p).second).read_volatile(), 24);
    }

    let counts = counters(&slots);
    assert_eq!(counts.get(offset_of!(Slots, second)), 31);
    assert_eq!(counts.get(offset_of!(Slots, first)), 0);
    assert_eq!(counts.get(offset_of!(Slots, third)), 0);
    assert_eq!(counts.total(), 31);
}

#[allow(dead_code)]
#[repr(C)]
struct Padded {
    words: [u64; 3],
}

#[test]
fn test_padding_accesses_not_counted() {
    let mut padded = ProfiledBox::<Padded>::new_uninit_in(Some(profiler()));
    let base = padded.as_mut_ptr().cast::<u8>();

    unsafe {
        base.add(100).write_volatile(0xAA);
        assert_eq!(base.add(100).read_volatile(), 0xAA);
        base.add(PAGE_SIZE - 1).write_volatile(1);
    }
    assert_eq!(counters(&padded).total(), 0);

    // The page is protected again: the next in-bounds access still counts.
    unsafe { base.add(8).write_volatile(3) };
    assert_eq!(counters(&padded).get(8), 1);
}

#[allow(dead_code)]
#[repr(C)]
struct Short {
    value: u32,
}

#[allow(dead_code)]
#[repr(C)]
struct Successor {
    value: u32,
}

#[test]
fn test_release_removes_descriptors() {
    let profiler = profiler();

    let mut first = ProfiledBox::<Short>::new_uninit_in(Some(profiler));
    let first_base = first.as_ptr() as usize;
    unsafe { first.as_mut_ptr().cast::<u32>().write_volatile(1) };
    let first_counts = counters(&first);
    assert_eq!(first_counts.total(), 1);
    assert!(profiler.page_map().contains(first_base));
    drop(first);
    assert!(!profiler.page_map().contains(first_base));

    // Plain memory, likely at the released address: no fault is handled.
    let plain = map_pages(PAGE_SIZE).expect("mapping should succeed");
    unsafe {
        for offset in [0, 8, 100] {
            plain.as_ptr().add(offset).write_volatile(0x5A);
        }
        unmap_pages(plain, PAGE_SIZE);
    }
    assert_eq!(first_counts.total(), 1);

    let mut next = ProfiledBox::<Successor>::new_uninit_in(Some(profiler));
    for i in 0..4 {
        unsafe { next.as_mut_ptr().cast::<u32>().write_volatile(i) };
    }
    assert_eq!(counters(&next).get(0), 4);
    assert_eq!(first_counts.total(), 1);
}

#[allow(dead_code)]
#[repr(C)]
struct Lane<const N: usize> {
    slots: [u64; 4],
}

fn drive_lane<const N: usize>(iterations: u64) -> (u64, u64) {
    let mut lane = ProfiledBox::<Lane<N>>::new_uninit_in(Some(profiler()));
    let p = lane.as_mut_ptr().cast::<Lane<N>>();
    unsafe {
        let slot = ptr::addr_of_mut!((*p).slots).cast::<u64>().add(N);
        for i in 0..iterations {
            slot.write_volatile(i);
        }
    }
    let counts = counters(&lane);
    (counts.get(N * 8), counts.total())
}

#[test]
fn test_threads_are_isolated() {
    let a = std::thread::spawn(|| drive_lane::<0>(500));
    let b = std::thread::spawn(|| drive_lane::<1>(120));
    assert_eq!(a.join().unwrap(), (500, 500));
    assert_eq!(b.join().unwrap(), (120, 120));
}

#[allow(dead_code)]
#[repr(C)]
struct Wide {
    bytes: [u8; 2 * PAGE_SIZE],
}

#[test]
fn test_straddling_access_reprotects_both_pages() {
    let mut wide = ProfiledBox::<Wide>::new_uninit_in(Some(profiler()));
    let base = wide.as_mut_ptr().cast::<u8>();

    unsafe {
        let straddle = base.add(PAGE_SIZE - 4).cast::<u64>();
        straddle.write_unaligned(black_box(u64::MAX));
    }
    let counts = counters(&wide);
    assert!(counts.total() >= 1);
    let before = counts.total();

    unsafe {
        black_box(base.add(100).read_volatile());
        black_box(base.add(PAGE_SIZE + 100).read_volatile());
    }
    assert_eq!(counts.get(100), 1);
    assert_eq!(counts.get(PAGE_SIZE + 100), 1);
    assert_eq!(counts.total(), before + 2);
}

#[test]
fn test_untracked_type_still_works() {
    #[derive(Debug, PartialEq)]
    struct Empty;

    let b = ProfiledBox::new_in(Empty, Some(profiler()));
    assert!(!b.is_tracked());
    assert_eq!(*b, Empty);
}

#[test]
fn test_start_twice_fails() {
    let _ = profiler();
    assert!(matches!(
        Profiler::start(ProfilerConfig::default()),
        Err(accprof::ProfilerError::AlreadyStarted)
    ));
    assert!(Profiler::active().is_some());
}
