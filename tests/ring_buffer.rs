mod common;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::{decode_blobs, Blob, Liar, Pong};
use dmxp_net::Core::NetMetrics;
use dmxp_net::Net::Message::encode_message;
use dmxp_net::Net::Outgoing::{OutgoingRingBuffer, PipeOut};
use dmxp_net::{NetConfig, NetError};

fn pipe(capacity: usize) -> PipeOut {
    let config = NetConfig::new().with_ring_buffer_size(capacity);
    let ring = OutgoingRingBuffer::new(&config, Arc::new(NetMetrics::new())).unwrap();
    PipeOut::new(1, Arc::new(ring))
}

#[test]
fn push_then_drain_yields_encoded_message() {
    let out = pipe(1024);
    let blob = Blob::new(3, 9, 40);
    let id = out.push(&blob).unwrap();

    let mut drained = Vec::new();
    out.ring_buffer().drain_to_vec(&mut drained);
    assert_eq!(drained, encode_message(&blob, id).unwrap());
    assert!(out.ring_buffer().is_empty());
}

#[test]
fn message_ids_increase_per_connection() {
    let out = pipe(4096);
    let first = out.push(&Blob::new(0, 0, 1)).unwrap();
    let second = out.push(&Blob::new(0, 1, 1)).unwrap();
    assert_eq!(second, first + 1);
}

#[test]
fn responses_do_not_consume_message_ids() {
    let out = pipe(4096);
    let request = out.push(&Blob::new(0, 0, 1)).unwrap();
    let response = Pong { request: 77, value: 1, bound_to: None };
    assert_eq!(out.push(&response).unwrap(), 77);
    assert_eq!(out.push(&Blob::new(0, 1, 1)).unwrap(), request + 1);
}

#[test]
fn non_power_of_two_capacity_is_a_config_error() {
    let config = NetConfig::new().with_ring_buffer_size(1000);
    let err = OutgoingRingBuffer::new(&config, Arc::new(NetMetrics::new())).unwrap_err();
    assert!(matches!(err, NetError::Config(_)), "got {err:?}");

    let err = NetConfig::from_toml_str("ring_buffer_size = 3000").unwrap_err();
    assert!(matches!(err, NetError::Config(_)));
}

#[test]
fn config_loads_from_toml() {
    let config = NetConfig::from_toml_str(
        "ring_buffer_size = 65536\nhandler_threads = 3\nfull_buffer_park_ns = 250\n",
    )
    .unwrap();
    assert_eq!(config.ring_buffer_size, 65536);
    assert_eq!(config.handler_threads, 3);
    assert_eq!(config.full_buffer_park_ns, 250);
    assert_eq!(config.receive_slots, NetConfig::default().receive_slots);

    assert!(NetConfig::from_toml_str("no_such_key = 1").is_err());
}

#[test]
fn messages_wrap_around_the_physical_end() {
    let out = pipe(256);
    let mut expected = Vec::new();
    let mut drained = Vec::new();
    for seq in 0..50 {
        let blob = Blob::new(1, seq, 60 + (seq as usize % 7));
        let id = out.push(&blob).unwrap();
        expected.extend(encode_message(&blob, id).unwrap());
        // leave some bytes behind so later messages straddle the end
        if seq % 2 == 1 {
            out.ring_buffer().drain_to_vec(&mut drained);
        }
    }
    out.ring_buffer().drain_to_vec(&mut drained);
    assert_eq!(drained, expected);
}

#[test]
fn try_push_and_push_timeout_report_a_full_buffer() {
    let out = pipe(256);
    let blob = Blob::new(0, 0, 100);
    out.push(&blob).unwrap();
    out.push(&blob).unwrap();

    match out.try_push(&blob) {
        Err(NetError::BufferFull { needed, free }) => {
            assert!(needed > free);
        }
        other => panic!("expected BufferFull, got {other:?}"),
    }
    assert!(matches!(
        out.push_timeout(&blob, Duration::from_millis(20)),
        Err(NetError::Timeout(_))
    ));

    let mut drained = Vec::new();
    out.ring_buffer().drain_to_vec(&mut drained);
    out.try_push(&blob).unwrap();
}

#[test]
fn try_push_of_a_message_larger_than_the_ring_fails_at_once() {
    let out = pipe(1024);
    let large = Blob::new(0, 0, 5000);

    let started = Instant::now();
    match out.try_push(&large) {
        Err(NetError::BufferFull { needed, free }) => {
            assert_eq!(needed, blob_len(&large));
            assert_eq!(free, 1024);
        }
        other => panic!("expected BufferFull, got {other:?}"),
    }
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(out.ring_buffer().front_producer().bytes, 0);
    assert!(out.ring_buffer().is_empty());

    // nothing was left half-reserved
    let small = Blob::new(0, 1, 10);
    out.try_push(&small).unwrap();
    let mut drained = Vec::new();
    out.ring_buffer().drain_to_vec(&mut drained);
    assert_eq!(drained.len(), blob_len(&small));
}

#[test]
fn push_timeout_of_a_large_message_gives_up_while_the_ring_is_busy() {
    let out = pipe(1024);
    let small = Blob::new(0, 0, 100);
    out.push(&small).unwrap();
    let before = out.ring_buffer().front_producer();

    let started = Instant::now();
    let result = out.push_timeout(&Blob::new(0, 1, 5000), Duration::from_millis(50));
    assert!(matches!(result, Err(NetError::Timeout(_))), "got {result:?}");
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(out.ring_buffer().front_producer(), before);

    // once the ring is drained the same push goes through
    let mut drained = Vec::new();
    out.ring_buffer().drain_to_vec(&mut drained);
    let large = Blob::new(0, 2, 5000);
    let expected = blob_len(&small) + blob_len(&large);
    let handle = {
        let out = out.clone();
        thread::spawn(move || out.push_timeout(&large, Duration::from_secs(5)))
    };
    while drained.len() < expected {
        if out.ring_buffer().drain_to_vec(&mut drained) == 0 {
            thread::yield_now();
        }
    }
    handle.join().unwrap().unwrap();

    let seqs: Vec<u32> = decode_blobs(&drained).into_iter().map(|(_, b)| b.seq).collect();
    assert_eq!(seqs, vec![0, 2]);
}

#[test]
fn full_buffer_blocks_push_until_drained() {
    let out = pipe(512);
    let blob = Blob::new(0, 0, 200);
    out.push(&blob).unwrap();
    out.push(&blob).unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let handle = {
        let out = out.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            out.push(&Blob::new(0, 1, 200)).unwrap();
            done.store(true, Ordering::Release);
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!done.load(Ordering::Acquire), "push returned although the buffer is full");

    let mut drained = Vec::new();
    out.ring_buffer().drain_to_vec(&mut drained);
    handle.join().unwrap();
    assert!(done.load(Ordering::Acquire));
    assert!(out.ring_buffer().metrics().snapshot().full_buffer_waits >= 1);

    out.ring_buffer().drain_to_vec(&mut drained);
    let seqs: Vec<u32> = decode_blobs(&drained).into_iter().map(|(_, b)| b.seq).collect();
    assert_eq!(seqs, vec![0, 0, 1]);
}

/// Drain concurrently with `producers` threads pushing `per_producer` messages
/// each, then check the stream.
fn run_concurrent(
    capacity: usize,
    producers: u32,
    per_producer: u32,
    sizes: fn(u32, u32) -> usize,
) -> Vec<u8> {
    let out = pipe(capacity);
    let stop = Arc::new(AtomicBool::new(false));
    let highest_front = Arc::new(AtomicU64::new(0));

    let drainer = {
        let ring = Arc::clone(out.ring_buffer());
        let stop = Arc::clone(&stop);
        let highest_front = Arc::clone(&highest_front);
        thread::spawn(move || {
            let mut drained = Vec::new();
            let mut last_front = 0u32;
            loop {
                // The commit front never moves backwards.
                let front = ring.front_consumer().bytes;
                assert!(
                    front >= last_front,
                    "front_consumer went back from {last_front} to {front}"
                );
                last_front = front;
                highest_front.store(u64::from(front), Ordering::Relaxed);

                let moved = ring.drain_to_vec(&mut drained);
                if moved == 0 {
                    if stop.load(Ordering::Acquire) && ring.is_empty() {
                        break;
                    }
                    thread::yield_now();
                }
            }
            drained
        })
    };

    let handles: Vec<_> = (0..producers)
        .map(|p| {
            let out = out.clone();
            thread::spawn(move || {
                for seq in 0..per_producer {
                    out.push(&Blob::new(p, seq, sizes(p, seq))).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    stop.store(true, Ordering::Release);
    let drained = drainer.join().unwrap();
    assert_eq!(highest_front.load(Ordering::Relaxed) as usize, drained.len() % (1 << 31));
    drained
}

fn check_stream(drained: &[u8], producers: u32, per_producer: u32, sizes: fn(u32, u32) -> usize) {
    let messages = decode_blobs(drained);
    assert_eq!(messages.len(), (producers * per_producer) as usize);

    let mut next_seq = vec![0u32; producers as usize];
    let mut ids = HashSet::new();
    for (header, blob) in &messages {
        assert!(ids.insert(header.message_id), "duplicate message id {}", header.message_id);
        let expected = Blob::new(blob.producer, blob.seq, sizes(blob.producer, blob.seq));
        assert_eq!(blob, &expected, "payload corrupted");
        // one producer's messages are committed in the order it pushed them
        assert_eq!(blob.seq, next_seq[blob.producer as usize]);
        next_seq[blob.producer as usize] += 1;
    }
}

#[test]
fn concurrent_producers_lose_and_duplicate_nothing() {
    fn sizes(p: u32, seq: u32) -> usize {
        ((p * 13 + seq * 7) % 90) as usize
    }
    let drained = run_concurrent(16 * 1024, 8, 2000, sizes);
    check_stream(&drained, 8, 2000, sizes);
}

#[test]
fn large_messages_are_chunked_between_small_ones() {
    // Every 50th message of producer 0 is bigger than the whole ring.
    fn sizes(p: u32, seq: u32) -> usize {
        if p == 0 && seq % 50 == 0 {
            20_000 + seq as usize
        } else {
            ((p + seq) % 120) as usize
        }
    }
    let drained = run_concurrent(4096, 4, 400, sizes);
    check_stream(&drained, 4, 400, sizes);
}

#[test]
fn two_large_producers_take_turns() {
    fn sizes(_p: u32, seq: u32) -> usize {
        5000 + (seq as usize % 3) * 1000
    }
    let drained = run_concurrent(2048, 2, 30, sizes);
    check_stream(&drained, 2, 30, sizes);
}

#[test]
fn size_mismatch_is_reported_and_does_not_stall_the_ring() {
    let out = pipe(1024);
    let err = out.push(&Liar { declared: 20, actual: 12 }).unwrap_err();
    assert!(matches!(
        err,
        NetError::SerializationSizeMismatch { expected: 20, written: 12, .. }
    ));
    let err = out.push(&Liar { declared: 8, actual: 30 }).unwrap_err();
    assert!(matches!(
        err,
        NetError::SerializationSizeMismatch { expected: 8, written: 30, .. }
    ));

    // both reserved ranges were still committed, later pushes go through
    let blob = Blob::new(0, 0, 10);
    out.push(&blob).unwrap();
    let mut drained = Vec::new();
    out.ring_buffer().drain_to_vec(&mut drained);
    let liar_bytes = (7 + 1 + 20) + (7 + 1 + 8);
    assert_eq!(drained.len(), liar_bytes + blob_len(&blob));
}

#[test]
fn large_message_size_mismatch_reserves_nothing() {
    let out = pipe(256);
    let err = out.push(&Liar { declared: 1000, actual: 999 }).unwrap_err();
    assert!(matches!(err, NetError::SerializationSizeMismatch { .. }));
    assert_eq!(out.ring_buffer().front_producer().bytes, 0);
}

fn blob_len(blob: &Blob) -> usize {
    encode_message(blob, 1).unwrap().len()
}
