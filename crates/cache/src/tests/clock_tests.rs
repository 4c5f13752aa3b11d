use crate::{Clock, INITIAL_CUTOFF, INITIAL_FILE_ID, INITIAL_TICK};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

// --------------------- Tick ---------------------

#[test]
fn fresh_clock_starts_at_initial_values() {
    let clock = Clock::new();
    assert_eq!(clock.ts(), INITIAL_TICK);
    assert_eq!(clock.gc_cutoff(), INITIAL_CUTOFF);
    assert_eq!(clock.total_size(), 0);
    assert!(!clock.is_dirty());
}

#[test]
fn new_ts_is_strictly_increasing_and_marks_dirty() {
    let clock = Clock::new();
    let a = clock.new_ts();
    let b = clock.new_ts();
    assert!(b > a);
    assert_eq!(clock.ts(), b);
    assert!(clock.take_dirty());
    assert!(!clock.is_dirty());
}

#[test]
fn ticks_are_unique_across_threads() {
    let clock = Arc::new(Clock::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let clock = clock.clone();
            thread::spawn(move || {
                let ticks: Vec<i32> = (0..1000).map(|_| clock.new_ts()).collect();
                assert!(ticks.windows(2).all(|w| w[0] < w[1]));
                ticks
            })
        })
        .collect();

    let mut all = HashSet::new();
    for h in handles {
        for t in h.join().unwrap() {
            assert!(all.insert(t), "tick {t} handed out twice");
        }
    }
    assert_eq!(all.len(), 8000);
    assert_eq!(clock.ts(), INITIAL_TICK + 8000);
}

#[test]
fn file_ids_start_after_initial_value() {
    let clock = Clock::new();
    assert_eq!(clock.new_file_id(), INITIAL_FILE_ID + 1);
    assert_eq!(clock.new_file_id(), INITIAL_FILE_ID + 2);
}

// --------------------- Cutoff ---------------------

#[test]
fn cutoff_never_moves_backwards() {
    let clock = Clock::new();
    for _ in 0..10 {
        clock.new_ts();
    }
    let t = clock.ts();
    assert_eq!(clock.advance_gc_cutoff(t - 2), t - 2);
    assert_eq!(clock.advance_gc_cutoff(t - 5), t - 2);
    assert_eq!(clock.gc_cutoff(), t - 2);
}

#[test]
fn cutoff_is_clamped_to_current_tick() {
    let clock = Clock::new();
    clock.new_ts();
    let t = clock.ts();
    assert_eq!(clock.advance_gc_cutoff(i32::MAX), t);
    assert!(clock.gc_cutoff() <= clock.ts());
}

// --------------------- Persistence ---------------------

#[test]
fn encode_decode_preserves_every_field() -> anyhow::Result<()> {
    let clock = Clock::new();
    for _ in 0..42 {
        clock.new_ts();
    }
    clock.advance_gc_cutoff(clock.ts() - 7);
    clock.new_file_id();
    clock.set_total_size(123_456_789);

    let bytes = clock.encode();
    assert_eq!(bytes.len(), 20);
    let back = Clock::decode(&bytes)?;
    assert_eq!(back.ts(), clock.ts());
    assert_eq!(back.gc_cutoff(), clock.gc_cutoff());
    assert_eq!(back.total_size(), 123_456_789);
    assert_eq!(back.new_file_id(), INITIAL_FILE_ID + 2);
    assert!(back.is_dirty());
    Ok(())
}

#[test]
fn decode_rejects_wrong_length() {
    assert!(Clock::decode(&[0u8; 19]).is_err());
    assert!(Clock::decode(&[0u8; 21]).is_err());
}
