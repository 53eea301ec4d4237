// Shared fixtures for the integration tests: message types, a counting
// buffer pool and a collecting receiver.
#![allow(dead_code)]

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dmxp_net::Net::collaborators::{BufferPool, PendingRequest};
use dmxp_net::Net::Cursor::compact::compact_size;
use dmxp_net::Net::Cursor::{DirectImporter, Exporter, ImportProgress, Importer};
use dmxp_net::Net::Incoming::{IncomingBuffer, MessageHandlers};
use dmxp_net::Net::Message::{Message, ReceivedMessage, TypeDirectory};
use dmxp_net::Net::Structs::MessageHeader;
use dmxp_net::{ImportError, Overflow};
use parking_lot::Mutex;

pub const TEST_TYPE: u8 = 10;
pub const BLOB: u8 = 1;
pub const MIXED: u8 = 2;
pub const LIAR: u8 = 3;
pub const RPC_TYPE: u8 = 11;
pub const PONG: u8 = 2;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Producer id, per-producer sequence number and a byte payload.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Blob {
    pub producer: u32,
    pub seq: u32,
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(producer: u32, seq: u32, len: usize) -> Self {
        let data = (0..len)
            .map(|i| (i as u32 ^ seq ^ producer.wrapping_mul(31)) as u8)
            .collect();
        Self { producer, seq, data }
    }
}

impl Message for Blob {
    fn message_type(&self) -> u8 {
        TEST_TYPE
    }

    fn subtype(&self) -> u8 {
        BLOB
    }

    fn payload_length(&self) -> usize {
        8 + compact_size(self.data.len() as u32) + self.data.len()
    }

    fn write_payload(&self, exporter: &mut dyn Exporter) -> Result<(), Overflow> {
        exporter.write_u32(self.producer)?;
        exporter.write_u32(self.seq)?;
        exporter.write_byte_array(&self.data)
    }

    fn read_payload(&mut self, importer: &mut dyn Importer) -> Result<(), ImportError> {
        importer.read_u32(&mut self.producer)?;
        importer.read_u32(&mut self.seq)?;
        importer.read_byte_array(&mut self.data)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One field of every kind the codec supports.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Mixed {
    pub flag: bool,
    pub small: i16,
    pub value: i64,
    pub ratio: f64,
    pub tag: u32,
    pub name: String,
    pub numbers: Vec<i32>,
    pub wide: Vec<i64>,
    pub shorts: Vec<i16>,
    pub tail: u8,
}

impl Mixed {
    pub fn sample(seed: u32) -> Self {
        Self {
            flag: seed % 2 == 0,
            small: -(seed as i16) - 7,
            value: 0x0102_0304_0506_0708 ^ i64::from(seed),
            ratio: f64::from(seed) * 1.5 + 0.25,
            tag: 300 + seed * 1000,
            name: format!("mixed-{seed}-ünïcødé"),
            numbers: (0..(seed % 40 + 3) as i32).map(|i| i * -7 + seed as i32).collect(),
            wide: vec![i64::MIN, -1, 0, i64::MAX, i64::from(seed)],
            shorts: (0..130).map(|i| i as i16 - 60).collect(),
            tail: 0xEE,
        }
    }
}

impl Message for Mixed {
    fn message_type(&self) -> u8 {
        TEST_TYPE
    }

    fn subtype(&self) -> u8 {
        MIXED
    }

    fn payload_length(&self) -> usize {
        1 + 2
            + 8
            + 8
            + compact_size(self.tag)
            + compact_size(self.name.len() as u32)
            + self.name.len()
            + compact_size(self.numbers.len() as u32)
            + 4 * self.numbers.len()
            + compact_size(self.wide.len() as u32)
            + 8 * self.wide.len()
            + compact_size(self.shorts.len() as u32)
            + 2 * self.shorts.len()
            + 1
    }

    fn write_payload(&self, exporter: &mut dyn Exporter) -> Result<(), Overflow> {
        exporter.write_bool(self.flag)?;
        exporter.write_i16(self.small)?;
        exporter.write_i64(self.value)?;
        exporter.write_f64(self.ratio)?;
        exporter.write_compact_number(self.tag)?;
        exporter.write_string(&self.name)?;
        exporter.write_i32_array(&self.numbers)?;
        exporter.write_i64_array(&self.wide)?;
        exporter.write_i16_array(&self.shorts)?;
        exporter.write_u8(self.tail)
    }

    fn read_payload(&mut self, importer: &mut dyn Importer) -> Result<(), ImportError> {
        importer.read_bool(&mut self.flag)?;
        importer.read_i16(&mut self.small)?;
        importer.read_i64(&mut self.value)?;
        importer.read_f64(&mut self.ratio)?;
        importer.read_compact(&mut self.tag)?;
        importer.read_string(&mut self.name)?;
        importer.read_i32_array(&mut self.numbers)?;
        importer.read_i64_array(&mut self.wide)?;
        importer.read_i16_array(&mut self.shorts)?;
        importer.read_u8(&mut self.tail)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Response message. `bound_to` is filled by `bind_request`, not from the wire.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Pong {
    pub request: u32,
    pub value: u64,
    pub bound_to: Option<u32>,
}

impl Message for Pong {
    fn message_type(&self) -> u8 {
        RPC_TYPE
    }

    fn subtype(&self) -> u8 {
        PONG
    }

    fn response_to(&self) -> Option<u32> {
        Some(self.request)
    }

    fn payload_length(&self) -> usize {
        8
    }

    fn write_payload(&self, exporter: &mut dyn Exporter) -> Result<(), Overflow> {
        exporter.write_u64(self.value)
    }

    fn read_payload(&mut self, importer: &mut dyn Importer) -> Result<(), ImportError> {
        importer.read_u64(&mut self.value)
    }

    fn bind_request(&mut self, request: &Arc<dyn PendingRequest>) {
        self.bound_to = Some(request.request_id());
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Declares one payload length and writes another.
#[derive(Debug, Default, Clone)]
pub struct Liar {
    pub declared: usize,
    pub actual: usize,
}

impl Message for Liar {
    fn message_type(&self) -> u8 {
        TEST_TYPE
    }

    fn subtype(&self) -> u8 {
        LIAR
    }

    fn payload_length(&self) -> usize {
        self.declared
    }

    fn write_payload(&self, exporter: &mut dyn Exporter) -> Result<(), Overflow> {
        for _ in 0..self.actual {
            exporter.write_u8(0xAB)?;
        }
        Ok(())
    }

    fn read_payload(&mut self, _importer: &mut dyn Importer) -> Result<(), ImportError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn directory() -> Arc<TypeDirectory> {
    let directory = TypeDirectory::new();
    directory.register::<Blob>().unwrap();
    directory.register::<Mixed>().unwrap();
    directory.register::<Pong>().unwrap();
    Arc::new(directory)
}

/// Buffer pool that only counts what comes back.
#[derive(Default)]
pub struct CountingPool {
    returned: AtomicUsize,
}

impl CountingPool {
    pub fn returned(&self) -> usize {
        self.returned.load(Ordering::Acquire)
    }
}

impl BufferPool for CountingPool {
    fn return_buffer(&self, buffer: IncomingBuffer) {
        drop(buffer);
        self.returned.fetch_add(1, Ordering::AcqRel);
    }
}

/// Thread-safe collection of everything a receiver saw.
pub struct Inbox<T> {
    items: Mutex<Vec<T>>,
}

impl<T: Clone> Inbox<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, item: T) {
        self.items.lock().push(item);
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.items.lock().clone()
    }

    pub fn clear(&self) {
        self.items.lock().clear();
    }

    /// Wait until at least `count` items arrived. False on timeout.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.len() >= count)
    }
}

pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// Register a receiver collecting every message of type `T` under its key.
pub fn collect<T: Message + Default + Clone>(handlers: &MessageHandlers) -> Arc<Inbox<T>> {
    let sample = T::default();
    let inbox = Inbox::<T>::new();
    let sink = Arc::clone(&inbox);
    handlers.register(
        sample.message_type(),
        sample.subtype(),
        Arc::new(move |received: &ReceivedMessage| {
            let message = received
                .downcast_ref::<T>()
                .expect("receiver registered for a different type");
            sink.push(message.clone());
        }),
    );
    inbox
}

pub fn buffer(bytes: &[u8]) -> IncomingBuffer {
    IncomingBuffer::from_bytes(bytes).unwrap()
}

/// Decode a drained stream of `Blob` messages with plain direct importers.
pub fn decode_blobs(mut bytes: &[u8]) -> Vec<(MessageHeader, Blob)> {
    let mut out = Vec::new();
    while !bytes.is_empty() {
        let mut progress = ImportProgress::default();
        let mut header = MessageHeader::default();
        let mut importer = DirectImporter::new(bytes, &mut progress);
        header.import(&mut importer).expect("truncated header");
        let mut blob = Blob::default();
        blob.read_payload(&mut importer).expect("truncated payload");
        let consumed = importer.consumed();
        assert_eq!(consumed, header.message_size(), "message not contiguous");
        out.push((header, blob));
        bytes = &bytes[consumed..];
    }
    out
}
