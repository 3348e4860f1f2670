//! In-order command queues and timing events
//!
//! A `Stream` executes enqueued commands one after another on a dedicated
//! worker thread, so work submitted to the same stream is ordered while
//! separate streams overlap freely. Commands that panic mark the stream as
//! faulted; the fault is sticky and reported by every later `synchronize`.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{Gf2nError, Result};

type Command = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Command),
    Sync(mpsc::Sender<()>),
}

/// Ordered device work queue
pub struct Stream {
    id: usize,
    sender: Option<mpsc::Sender<Message>>,
    worker: Option<JoinHandle<()>>,
    faulted: Arc<AtomicBool>,
}

impl Stream {
    pub(crate) fn spawn(id: usize) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Message>();
        let faulted = Arc::new(AtomicBool::new(false));
        let worker_fault = Arc::clone(&faulted);

        let worker = thread::Builder::new()
            .name(format!("gf2n-stream-{}", id))
            .spawn(move || {
                for message in receiver {
                    match message {
                        Message::Run(command) => {
                            if panic::catch_unwind(AssertUnwindSafe(command)).is_err() {
                                worker_fault.store(true, Ordering::SeqCst);
                            }
                        }
                        Message::Sync(ack) => {
                            let _ = ack.send(());
                        }
                    }
                }
            })
            .map_err(|e| Gf2nError::DeviceFault(format!("failed to start stream {}: {}", id, e)))?;

        tracing::debug!(stream = id, "stream created");

        Ok(Self {
            id,
            sender: Some(sender),
            worker: Some(worker),
            faulted,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Appends a command to the queue without waiting for it
    pub fn enqueue<F>(&self, command: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.send(Message::Run(Box::new(command)))
    }

    /// Blocks until every command enqueued so far has finished
    pub fn synchronize(&self) -> Result<()> {
        let (ack, done) = mpsc::channel();
        self.send(Message::Sync(ack))?;
        done.recv()
            .map_err(|_| Gf2nError::DeviceFault(format!("stream {} terminated", self.id)))?;

        if self.faulted.load(Ordering::SeqCst) {
            return Err(Gf2nError::DeviceFault(format!(
                "a command on stream {} panicked",
                self.id
            )));
        }
        Ok(())
    }

    /// Whether a previous command on this stream panicked
    pub fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::SeqCst)
    }

    fn send(&self, message: Message) -> Result<()> {
        self.sender
            .as_ref()
            .ok_or_else(|| Gf2nError::DeviceFault(format!("stream {} is closed", self.id)))?
            .send(message)
            .map_err(|_| Gf2nError::DeviceFault(format!("stream {} terminated", self.id)))
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain its queue and exit.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id)
            .field("faulted", &self.is_faulted())
            .finish()
    }
}

/// Timestamp taken when a stream reaches the point where it was recorded
#[derive(Debug, Clone, Default)]
pub struct Event {
    stamp: Arc<OnceLock<Instant>>,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues the timestamp on `stream`
    pub fn record(&self, stream: &Stream) -> Result<()> {
        let stamp = Arc::clone(&self.stamp);
        stream.enqueue(move || {
            let _ = stamp.set(Instant::now());
        })
    }

    pub fn is_complete(&self) -> bool {
        self.stamp.get().is_some()
    }

    /// Time between two completed events
    pub fn elapsed(start: &Event, end: &Event) -> Result<Duration> {
        match (start.stamp.get(), end.stamp.get()) {
            (Some(&s), Some(&e)) => Ok(e.saturating_duration_since(s)),
            _ => Err(Gf2nError::DeviceFault(
                "event queried before its stream reached it".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_stream_preserves_order() {
        let stream = Stream::spawn(100).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..50 {
            let log = Arc::clone(&log);
            stream.enqueue(move || log.lock().unwrap().push(i)).unwrap();
        }
        stream.synchronize().unwrap();

        assert_eq!(*log.lock().unwrap(), (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_panicking_command_faults_stream() {
        let stream = Stream::spawn(101).unwrap();
        stream.enqueue(|| panic!("kernel fault")).unwrap();
        assert!(matches!(stream.synchronize(), Err(Gf2nError::DeviceFault(_))));
        assert!(stream.is_faulted());
    }

    #[test]
    fn test_event_timing() {
        let stream = Stream::spawn(102).unwrap();
        let start = Event::new();
        let end = Event::new();

        start.record(&stream).unwrap();
        stream
            .enqueue(|| thread::sleep(Duration::from_millis(2)))
            .unwrap();
        end.record(&stream).unwrap();
        stream.synchronize().unwrap();

        assert!(start.is_complete() && end.is_complete());
        assert!(Event::elapsed(&start, &end).unwrap() >= Duration::from_millis(2));
    }

    #[test]
    fn test_unrecorded_event_is_an_error() {
        assert!(Event::elapsed(&Event::new(), &Event::new()).is_err());
    }
}
