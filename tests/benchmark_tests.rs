//! Performance benchmarks for the hot paths of the discovery engine

use server::queue::TargetQueue;
use shared::{testing, Dialect, QueryResponse, ServerDetails};
use std::time::{Duration, Instant};

fn status_fields(players: usize) -> Vec<(String, String)> {
    let mut fields: Vec<(String, String)> = [
        ("hostname", "Benchmark Server"),
        ("hostport", "10480"),
        ("gamevariant", "SWAT 4X"),
        ("gamever", "1.0"),
        ("gametype", "Barricaded Suspects"),
        ("mapname", "Mt. Threshold Research Center"),
        ("maxplayers", "16"),
    ]
    .iter()
    .map(|(key, value)| (key.to_string(), value.to_string()))
    .collect();
    fields.push(("numplayers".to_string(), players.to_string()));
    for id in 0..players {
        fields.push((format!("player_{}", id), format!("Player{}", id)));
        fields.push((format!("score_{}", id), (id * 10).to_string()));
        fields.push((format!("ping_{}", id), "50".to_string()));
    }
    fields
}

/// Benchmarks decoding and validating a full status payload
#[test]
fn benchmark_response_decoding() {
    let owned = status_fields(16);
    let fields: Vec<(&str, &str)> = owned.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    let payload = testing::encode_fields(&fields);

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let response = QueryResponse::parse(&payload, Dialect::Gs1).unwrap();
        let details = ServerDetails::from_valid_response(&response).unwrap();
        assert_eq!(details.players.len(), 16);
    }

    let duration = start.elapsed();
    println!(
        "Response decoding: {} iterations in {:?} ({:.2} us/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration < Duration::from_secs(5));
}

/// Benchmarks draining a large queue where half the targets are not ready yet
#[test]
fn benchmark_queue_pop_many() {
    let now = tokio::time::Instant::now();
    let later = now + Duration::from_secs(60);
    let mut queue = TargetQueue::new(None);

    let total = 100_000;
    for i in 0..total {
        let not_before = (i % 2 == 1).then_some(later);
        queue.add_between(i, not_before, None).unwrap();
    }

    let start = Instant::now();
    let mut popped = 0;
    loop {
        let (items, expired) = queue.pop_many(25, now);
        assert_eq!(expired, 0);
        if items.is_empty() {
            break;
        }
        popped += items.len();
    }
    let duration = start.elapsed();

    println!(
        "Queue pop_many: {} ready of {} targets in {:?}",
        popped, total, duration
    );

    assert_eq!(popped, total / 2);
    assert_eq!(queue.len(), total / 2);
    assert!(duration < Duration::from_secs(30));
}

/// Benchmarks single pops on a queue with a mix of expired and ready targets
#[test]
fn benchmark_queue_pop_with_expiry() {
    let now = tokio::time::Instant::now();
    let past = now - Duration::from_millis(1);
    let mut queue = TargetQueue::new(None);

    let total = 50_000;
    for i in 0..total {
        let not_after = (i % 3 == 0).then_some(past);
        queue.add_between(i, None, not_after).unwrap();
    }

    let start = Instant::now();
    let mut popped = 0;
    while queue.pop(now).is_ok() {
        popped += 1;
    }
    let duration = start.elapsed();

    println!("Queue pop: {} of {} targets in {:?}", popped, total, duration);

    assert_eq!(popped + queue.take_expired(), total);
    assert!(queue.is_empty());
    assert!(duration < Duration::from_secs(5));
}
