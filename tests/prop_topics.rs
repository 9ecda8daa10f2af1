use proptest::prelude::*;
use colony_kernel::topics::{TopicKey, Topics};

const KEY: TopicKey<usize> = TopicKey::new("prop");

/// (priority, ttl) pairs published at cycle 0. Integer priorities keep
/// comparisons exact.
fn requests() -> impl Strategy<Value = Vec<(u16, u64)>> {
    prop::collection::vec((0u16..50, 0u64..20), 0..40)
}

fn publish_all(topics: &mut Topics, requests: &[(u16, u64)]) {
    topics.set_cycle(0);
    for (i, &(priority, ttl)) in requests.iter().enumerate() {
        topics.publish_with_ttl(&KEY, priority as f64, i, ttl).unwrap();
    }
}

proptest! {
    /// Peek returns the highest unexpired priority; consume returns and removes exactly that request.
    #[test]
    fn prop_peek_and_consume_agree_on_maximum(reqs in requests(), now in 0u64..25) {
        let mut topics = Topics::new(100);
        publish_all(&mut topics, &reqs);
        topics.set_cycle(now);

        let expected = reqs.iter().filter(|&&(_, ttl)| ttl >= now).map(|&(p, _)| p as f64).fold(None, |acc: Option<f64>, p| {
            Some(acc.map_or(p, |a| a.max(p)))
        });
        let live_before = topics.len("prop");

        let peeked = topics.peek_highest_priority(&KEY).cloned();
        prop_assert_eq!(peeked.as_ref().map(|r| r.priority), expected);

        let consumed = topics.consume_highest_priority(&KEY);
        prop_assert_eq!(consumed.as_ref(), peeked.as_ref());
        if consumed.is_some() {
            prop_assert_eq!(topics.len("prop"), live_before - 1);
        }
    }

    /// Consuming N times yields priorities in non-increasing order and empties the topic.
    #[test]
    fn prop_consume_order_is_non_increasing(priorities in prop::collection::vec(0u16..1000, 0..60)) {
        let mut topics = Topics::new(100);
        let reqs: Vec<(u16, u64)> = priorities.iter().map(|&p| (p, 100)).collect();
        publish_all(&mut topics, &reqs);

        let mut drained = Vec::new();
        for _ in 0..priorities.len() {
            let request = topics.consume_highest_priority(&KEY);
            prop_assert!(request.is_some());
            drained.push(request.unwrap().priority);
        }
        prop_assert!(drained.windows(2).all(|w| w[0] >= w[1]));
        prop_assert_eq!(topics.len("prop"), 0);
        prop_assert!(topics.consume_highest_priority(&KEY).is_none());
    }

    /// Once the cycle passes a request's ttl, no read ever returns it.
    #[test]
    fn prop_expired_requests_are_never_returned(reqs in requests(), now in 0u64..25) {
        let mut topics = Topics::new(100);
        publish_all(&mut topics, &reqs);
        topics.set_cycle(now);

        for request in topics.filter(&KEY, |_| true) {
            prop_assert!(request.ttl >= now);
        }
        let chosen = topics.consume_matching(&KEY, |live| {
            if live.is_empty() { None } else { Some(0) }
        });
        if let Some(request) = chosen {
            prop_assert!(request.ttl >= now);
        }
        while let Some(request) = topics.consume_highest_priority(&KEY) {
            prop_assert!(request.ttl >= now);
        }
    }

    /// The sweep leaves only live requests behind.
    #[test]
    fn prop_sweep_keeps_live_requests(reqs in requests(), now in 0u64..25) {
        let mut topics = Topics::new(100);
        publish_all(&mut topics, &reqs);
        topics.set_cycle(now);

        let live = reqs.iter().filter(|&&(_, ttl)| ttl >= now).count();
        let removed = topics.sweep_expired();
        prop_assert_eq!(removed, reqs.len() - live);
        prop_assert_eq!(topics.len("prop"), live);
    }
}
