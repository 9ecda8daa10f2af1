#![no_main]

use libfuzzer_sys::fuzz_target;
use colony_kernel::{TopicKey, Topics};

const TOPIC: TopicKey<u16> = TopicKey::new("fuzz");

#[derive(Debug, Clone, arbitrary::Arbitrary)]
enum Op {
    Publish { priority: i16, ttl: u8, details: u16 },
    Consume,
    Peek,
    Advance(u8),
    Sweep,
}

fuzz_target!(|ops: Vec<Op>| {
    let mut topics = Topics::new(50);
    let mut cycle = 0u64;
    topics.set_cycle(cycle);

    for op in ops {
        match op {
            Op::Publish { priority, ttl, details } => {
                topics
                    .publish_with_ttl(&TOPIC, f64::from(priority), details, u64::from(ttl))
                    .expect("single-typed topic");
            }
            Op::Consume => {
                let peeked = topics.peek_highest_priority(&TOPIC).map(|r| (r.priority, r.details));
                let consumed = topics.consume_highest_priority(&TOPIC).map(|r| (r.priority, r.details));
                assert_eq!(peeked, consumed);
                if let Some((priority, _)) = consumed {
                    if let Some(next) = topics.peek_highest_priority(&TOPIC) {
                        assert!(next.priority <= priority);
                    }
                }
            }
            Op::Peek => {
                if let Some(request) = topics.peek_highest_priority(&TOPIC) {
                    assert!(!request.is_expired(cycle));
                }
            }
            Op::Advance(n) => {
                cycle += u64::from(n);
                topics.set_cycle(cycle);
            }
            Op::Sweep => {
                topics.sweep_expired();
                for request in topics.filter(&TOPIC, |_| true) {
                    assert!(!request.is_expired(cycle));
                }
            }
        }
    }
});
