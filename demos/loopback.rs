// Loopback run of one connection: producer threads push SHA-256 tagged
// messages into the outgoing ring buffer, a drain thread feeds the bytes back
// into the incoming pipe in randomly sized fragments, and the handler pool
// checks every digest.
//
//   cargo run --example loopback -- <messages_per_producer> [producers]
//   RUST_LOG=dmxp_net=debug cargo run --example loopback -- 100000 4
use std::any::Any;
use std::env;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dmxp_net::Net::Cursor::compact::compact_size;
use dmxp_net::Net::Cursor::{Exporter, Importer};
use dmxp_net::Net::Incoming::{IncomingBuffer, MessageHandlers};
use dmxp_net::Net::Message::{Message, ReceivedMessage, TypeDirectory};
use dmxp_net::Net::ConnectionBuilder;
use dmxp_net::{ImportError, NetConfig, NetError, Overflow};
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

const APP_TYPE: u8 = 20;
const TAGGED: u8 = 1;

#[derive(Default)]
struct Tagged {
    producer: u32,
    seq: u32,
    body: String,
    digest: Vec<u8>,
}

impl Tagged {
    fn new(producer: u32, seq: u32) -> Self {
        let body = format!("message_{producer}_{seq}");
        let digest = Sha256::digest(body.as_bytes()).to_vec();
        Self {
            producer,
            seq,
            body,
            digest,
        }
    }

    fn verify(&self) -> bool {
        Sha256::digest(self.body.as_bytes()).as_slice() == self.digest.as_slice()
    }
}

impl Message for Tagged {
    fn message_type(&self) -> u8 {
        APP_TYPE
    }

    fn subtype(&self) -> u8 {
        TAGGED
    }

    fn payload_length(&self) -> usize {
        8 + compact_size(self.body.len() as u32)
            + self.body.len()
            + compact_size(self.digest.len() as u32)
            + self.digest.len()
    }

    fn write_payload(&self, exporter: &mut dyn Exporter) -> Result<(), Overflow> {
        exporter.write_u32(self.producer)?;
        exporter.write_u32(self.seq)?;
        exporter.write_string(&self.body)?;
        exporter.write_byte_array(&self.digest)
    }

    fn read_payload(&mut self, importer: &mut dyn Importer) -> Result<(), ImportError> {
        importer.read_u32(&mut self.producer)?;
        importer.read_u32(&mut self.seq)?;
        importer.read_string(&mut self.body)?;
        importer.read_byte_array(&mut self.digest)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn main() -> Result<(), NetError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <messages_per_producer> [producers]", args[0]);
        std::process::exit(1);
    }
    let per_producer: u32 = args[1]
        .parse()
        .map_err(|_| NetError::config("invalid number of messages"))?;
    let producers: u32 = match args.get(2) {
        Some(raw) => raw.parse().map_err(|_| NetError::config("invalid number of producers"))?,
        None => 4,
    };

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .map_err(|err| NetError::config(format!("cannot install Ctrl+C handler: {err}")))?;
    }

    let config = NetConfig::new().with_ring_buffer_size(256 * 1024);
    let directory = TypeDirectory::new();
    directory.register::<Tagged>()?;
    let handlers = MessageHandlers::new(config.handler_threads, config.handler_queue_depth)?;

    let verified = Arc::new(AtomicU64::new(0));
    let failed = Arc::new(AtomicU64::new(0));
    {
        let verified = Arc::clone(&verified);
        let failed = Arc::clone(&failed);
        handlers.register(
            APP_TYPE,
            TAGGED,
            Arc::new(move |received: &ReceivedMessage| match received.downcast_ref::<Tagged>() {
                Some(tagged) if tagged.verify() => {
                    verified.fetch_add(1, Ordering::Relaxed);
                }
                Some(tagged) => {
                    error!(producer = tagged.producer, seq = tagged.seq, "digest mismatch");
                    failed.fetch_add(1, Ordering::Relaxed);
                }
                None => warn!(header = %received.header, "unexpected message"),
            }),
        );
    }

    let (pipe_out, mut pipe_in) = ConnectionBuilder::new()
        .with_config(config)
        .with_connection_id(1)
        .with_directory(Arc::new(directory))
        .with_handlers(Arc::clone(&handlers))
        .build()?;
    let ring = Arc::clone(pipe_out.ring_buffer());
    let metrics = Arc::clone(ring.metrics());

    info!(producers, per_producer, "starting loopback");
    let start = Instant::now();

    let producers_done = Arc::new(AtomicBool::new(false));
    let receiver = {
        let producers_done = Arc::clone(&producers_done);
        thread::spawn(move || -> Result<(), NetError> {
            let mut rng = fastrand::Rng::new();
            let mut staged = Vec::with_capacity(64 * 1024);
            loop {
                staged.clear();
                if ring.drain_to_vec(&mut staged) == 0 {
                    if producers_done.load(Ordering::Acquire) && ring.is_empty() {
                        return Ok(());
                    }
                    thread::yield_now();
                    continue;
                }
                // fragment the stream the way a socket would
                let mut rest = &staged[..];
                while !rest.is_empty() {
                    let take = rng.usize(1..=rest.len().min(1500));
                    pipe_in.process_buffer(IncomingBuffer::from_bytes(&rest[..take])?)?;
                    rest = &rest[take..];
                }
            }
        })
    };

    let senders: Vec<_> = (0..producers)
        .map(|producer| {
            let pipe_out = pipe_out.clone();
            let running = Arc::clone(&running);
            thread::spawn(move || -> Result<u32, NetError> {
                let mut sent = 0;
                for seq in 0..per_producer {
                    if !running.load(Ordering::Relaxed) {
                        break;
                    }
                    pipe_out.push(&Tagged::new(producer, seq))?;
                    sent += 1;
                }
                Ok(sent)
            })
        })
        .collect();

    let mut sent = 0u64;
    for sender in senders {
        match sender.join() {
            Ok(result) => sent += u64::from(result?),
            Err(_) => error!("producer thread panicked"),
        }
    }
    producers_done.store(true, Ordering::Release);
    match receiver.join() {
        Ok(result) => result?,
        Err(_) => error!("receiver thread panicked"),
    }

    // handlers may still be working through the queue
    let deadline = Instant::now() + Duration::from_secs(10);
    while verified.load(Ordering::Relaxed) + failed.load(Ordering::Relaxed) < sent
        && Instant::now() < deadline
    {
        thread::sleep(Duration::from_millis(5));
    }
    handlers.shutdown();

    let elapsed = start.elapsed();
    let snapshot = metrics.snapshot();
    info!(
        sent,
        verified = verified.load(Ordering::Relaxed),
        failed = failed.load(Ordering::Relaxed),
        bytes = snapshot.bytes_posted,
        buffers = snapshot.buffers_received,
        full_buffer_waits = snapshot.full_buffer_waits,
        slot_waits = snapshot.slot_waits,
        elapsed = ?elapsed,
        "loopback finished"
    );
    println!(
        "{sent} messages in {elapsed:.2?} ({:.0} msg/s)",
        sent as f64 / elapsed.as_secs_f64()
    );
    Ok(())
}
