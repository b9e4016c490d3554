use bp7::dtntime::{dtn_time_now, CreationTimestamp, DtnTimeHelpers, SequenceCounter};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::thread::sleep;
use std::time::Duration;

#[test]
fn test_creation_with_delay() {
    let counter = SequenceCounter::new();
    let ct1 = CreationTimestamp::now(&counter);
    sleep(Duration::from_millis(50));
    let ct2 = CreationTimestamp::now(&counter);
    assert_eq!(ct1.seqno(), 0);
    assert_eq!(ct2.seqno(), 0);
    assert!(ct1.dtntime() < ct2.dtntime());
}

#[test]
fn same_millisecond_bumps_sequence() {
    let counter = SequenceCounter::new();
    let t = dtn_time_now();
    let ct3 = counter.next(t);
    let ct4 = counter.next(t);
    assert_eq!(ct3.seqno(), 0);
    assert_eq!(ct4.seqno(), 1);
    assert_eq!(ct3.dtntime(), ct4.dtntime());
}

#[test]
fn clock_stepping_back_keeps_order() {
    let counter = SequenceCounter::new();
    let first = counter.next(5000);
    let second = counter.next(4000);
    assert!(first < second);
    assert_eq!(second.dtntime(), 5000);
    assert_eq!(second.seqno(), 1);
}

#[test]
fn shared_counter_hands_out_unique_timestamps() {
    let counter = Arc::new(SequenceCounter::new());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let counter = Arc::clone(&counter);
            thread::spawn(move || {
                let mut seen = Vec::new();
                for _ in 0..500 {
                    seen.push(CreationTimestamp::now(&counter));
                }
                seen
            })
        })
        .collect();

    let mut all = HashSet::new();
    for h in handles {
        let seen = h.join().unwrap();
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        all.extend(seen);
    }
    assert_eq!(all.len(), 2000);
}

#[test]
fn now_is_after_2000() {
    let now = dtn_time_now();
    assert!(now > 0);
    assert!(now.unix() > 946_684_800_000);
}
