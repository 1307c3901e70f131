#![forbid(unsafe_code)]

//! Telemetry transport: where consumers hand off published samples.
//!
//! The pipeline only ever calls [`TelemetryTransport::publish`], which must
//! return immediately. Delivery, buffering, and backpressure belong to the
//! transport.
//!
//! [`QueuedTransport`] moves delivery onto a dedicated thread fed by a
//! bounded channel. It is the only thread in a pipeline process.
//!
//! # Coalescing Rules
//!
//! - Samples are delivered in publish order.
//! - A full queue drops the new sample and counts it; the scheduler is never
//!   blocked by a slow endpoint.
//! - Shutdown delivers everything already queued, then joins the thread.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::io;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use serde::Serialize;
use web_time::Duration;

/// Default channel capacity for [`QueuedTransport`].
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// A published value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TelemetryValue {
    Number(f64),
    Integer(i64),
    Bool(bool),
    Text(String),
}

impl TelemetryValue {
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl fmt::Display for TelemetryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<f64> for TelemetryValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<f32> for TelemetryValue {
    fn from(v: f32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<i64> for TelemetryValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for TelemetryValue {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<u32> for TelemetryValue {
    fn from(v: u32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<bool> for TelemetryValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<String> for TelemetryValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for TelemetryValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

/// One value on its way to the telemetry endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub path: String,
    pub value: TelemetryValue,
    /// Pipeline uptime at publication.
    #[serde(rename = "uptime_ms", serialize_with = "serialize_millis")]
    pub timestamp: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis().min(u64::MAX as u128) as u64)
}

/// External collaborator that delivers samples. Fire-and-forget.
pub trait TelemetryTransport {
    fn publish(&self, sample: Sample);
}

// ─── Log transport ───────────────────────────────────────────────────────────

/// Logs every sample at `debug` and discards it.
#[derive(Debug, Default)]
pub struct LogTransport;

impl TelemetryTransport for LogTransport {
    fn publish(&self, sample: Sample) {
        tracing::debug!(
            path = %sample.path,
            value = %sample.value,
            uptime_ms = sample.timestamp.as_millis() as u64,
            "telemetry sample"
        );
    }
}

// ─── Recording transport ─────────────────────────────────────────────────────

/// Keeps every sample in memory. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    samples: Rc<RefCell<Vec<Sample>>>,
}

impl RecordingTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn samples(&self) -> Vec<Sample> {
        self.samples.borrow().clone()
    }

    /// Values published under `path`, in order.
    #[must_use]
    pub fn values_for(&self, path: &str) -> Vec<TelemetryValue> {
        self.samples
            .borrow()
            .iter()
            .filter(|s| s.path == path)
            .map(|s| s.value.clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.borrow().is_empty()
    }
}

impl TelemetryTransport for RecordingTransport {
    fn publish(&self, sample: Sample) {
        self.samples.borrow_mut().push(sample);
    }
}

// ─── Queued transport ────────────────────────────────────────────────────────

enum Msg {
    Publish(Sample),
    Shutdown,
}

/// Delivers samples on a dedicated thread.
///
/// `deliver` runs on that thread, in publish order. It may block (network
/// I/O); the pipeline thread never waits for it.
pub struct QueuedTransport {
    sender: RefCell<Option<mpsc::SyncSender<Msg>>>,
    handle: RefCell<Option<JoinHandle<()>>>,
    dropped: Cell<u64>,
    delivered: Arc<AtomicU64>,
}

impl fmt::Debug for QueuedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedTransport")
            .field("running", &self.sender.borrow().is_some())
            .field("dropped", &self.dropped.get())
            .field("delivered", &self.delivered())
            .finish()
    }
}

impl QueuedTransport {
    /// Spawn the delivery thread.
    pub fn start<F>(capacity: usize, deliver: F) -> io::Result<Self>
    where
        F: FnMut(Sample) + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel::<Msg>(capacity.max(1));
        let delivered = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&delivered);

        let handle = thread::Builder::new()
            .name("sensflow-transport".into())
            .spawn(move || delivery_loop(rx, deliver, counter))?;

        Ok(Self {
            sender: RefCell::new(Some(tx)),
            handle: RefCell::new(Some(handle)),
            dropped: Cell::new(0),
            delivered,
        })
    }

    /// Samples discarded because the queue was full or closed.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.get()
    }

    /// Samples handed to `deliver` so far.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Acquire)
    }

    /// Deliver what is queued, then stop the thread. Idempotent.
    pub fn shutdown(&self) {
        let Some(sender) = self.sender.borrow_mut().take() else {
            return;
        };
        // Blocking send: queued samples ahead of it are still delivered.
        let _ = sender.send(Msg::Shutdown);
        drop(sender);
        if let Some(handle) = self.handle.borrow_mut().take() {
            if handle.join().is_err() {
                tracing::error!("telemetry delivery thread panicked");
            }
        }
    }

    fn note_drop(&self, reason: &str) {
        let dropped = self.dropped.get() + 1;
        self.dropped.set(dropped);
        if dropped.is_power_of_two() {
            tracing::warn!(dropped, reason, "telemetry sample dropped");
        }
    }
}

impl TelemetryTransport for QueuedTransport {
    fn publish(&self, sample: Sample) {
        let sender = self.sender.borrow();
        let Some(sender) = sender.as_ref() else {
            self.note_drop("transport shut down");
            return;
        };
        match sender.try_send(Msg::Publish(sample)) {
            Ok(()) => {}
            Err(mpsc::TrySendError::Full(_)) => self.note_drop("queue full"),
            Err(mpsc::TrySendError::Disconnected(_)) => self.note_drop("delivery thread gone"),
        }
    }
}

impl Drop for QueuedTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn delivery_loop<F: FnMut(Sample)>(rx: mpsc::Receiver<Msg>, mut deliver: F, delivered: Arc<AtomicU64>) {
    while let Ok(msg) = rx.recv() {
        match msg {
            Msg::Publish(sample) => {
                deliver(sample);
                delivered.fetch_add(1, Ordering::Release);
            }
            Msg::Shutdown => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn sample(path: &str, v: f64) -> Sample {
        Sample {
            path: path.to_owned(),
            value: v.into(),
            timestamp: Duration::from_millis(1500),
        }
    }

    #[test]
    fn sample_serializes_as_flat_json() {
        let json = serde_json::to_value(sample("a.b", 2.5)).expect("serialize");
        assert_eq!(json, serde_json::json!({"path": "a.b", "value": 2.5, "uptime_ms": 1500}));
    }

    #[test]
    fn value_conversions() {
        assert_eq!(TelemetryValue::from(3_i32), TelemetryValue::Integer(3));
        assert_eq!(TelemetryValue::from(true).to_string(), "true");
        assert_eq!(TelemetryValue::from("ok"), TelemetryValue::Text("ok".into()));
        assert_eq!(TelemetryValue::Integer(4).as_f64(), Some(4.0));
        assert_eq!(TelemetryValue::Bool(false).as_f64(), None);
    }

    #[test]
    fn recording_transport_filters_by_path() {
        let transport = RecordingTransport::new();
        transport.publish(sample("x", 1.0));
        transport.publish(sample("y", 2.0));
        transport.publish(sample("x", 3.0));
        assert_eq!(transport.len(), 3);
        assert_eq!(
            transport.values_for("x"),
            vec![TelemetryValue::Number(1.0), TelemetryValue::Number(3.0)]
        );
    }

    #[test]
    fn queued_transport_delivers_in_order_and_drains_on_shutdown() {
        let out = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&out);
        let transport = QueuedTransport::start(64, move |s: Sample| {
            sink.lock().expect("lock").push(s.value.as_f64().unwrap_or(f64::NAN));
        })
        .expect("spawn");

        for i in 0..10 {
            transport.publish(sample("n", f64::from(i)));
        }
        transport.shutdown();

        let got = out.lock().expect("lock").clone();
        assert_eq!(got, (0..10).map(f64::from).collect::<Vec<_>>());
        assert_eq!(transport.delivered(), 10);
        assert_eq!(transport.dropped(), 0);
    }

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let (started_tx, started_rx) = mpsc::channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let transport = QueuedTransport::start(1, move |_s: Sample| {
            let _ = started_tx.send(());
            let _ = release_rx.recv();
        })
        .expect("spawn");

        // The worker holds the first sample, the second fills the queue.
        transport.publish(sample("n", 0.0));
        started_rx.recv().expect("worker picked up first sample");
        transport.publish(sample("n", 1.0));
        transport.publish(sample("n", 2.0));
        transport.publish(sample("n", 3.0));
        assert_eq!(transport.dropped(), 2);

        drop(release_tx);
        transport.shutdown();
        assert_eq!(transport.delivered(), 2);
    }

    #[test]
    fn publish_after_shutdown_counts_as_dropped() {
        let transport = QueuedTransport::start(4, |_s: Sample| {}).expect("spawn");
        transport.shutdown();
        transport.shutdown();
        transport.publish(sample("late", 1.0));
        assert_eq!(transport.dropped(), 1);
    }
}
