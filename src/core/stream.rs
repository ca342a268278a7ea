//! Grapheme-safe character stream from the PTY reader to the interpreter
//!
//! [`data_stream`] creates both halves:
//! - [`StreamWriter`] (producer): never blocks, holds back the trailing grapheme
//!   until the next chunk, a flush or close
//! - [`DataStream`] (consumer): single characters, pushback and bulk reads of
//!   printable runs, with a refill policy per [`PerformanceMode`]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};
use unicode_segmentation::UnicodeSegmentation;

/// Consumed bytes kept before the buffer is compacted
pub const DEFAULT_COMPACTION_THRESHOLD: usize = 4096;

/// Stream errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamError {
    #[error("end of stream")]
    Eof,
}

pub type Result<T> = std::result::Result<T, StreamError>;

/// Refill policy of the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceMode {
    /// Block until the next chunk; hand out data as soon as it exists
    Latency,
    /// Long polls, large batches
    Throughput,
    #[default]
    Balanced,
}

impl PerformanceMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "latency" => Some(Self::Latency),
            "throughput" => Some(Self::Throughput),
            "balanced" => Some(Self::Balanced),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Latency => "latency",
            Self::Throughput => "throughput",
            Self::Balanced => "balanced",
        }
    }

    /// Poll interval while waiting for the next character. `None` blocks.
    fn poll_interval(self) -> Option<Duration> {
        match self {
            Self::Latency => None,
            Self::Throughput => Some(Duration::from_millis(100)),
            Self::Balanced => Some(Duration::from_millis(10)),
        }
    }

    /// Wait for more data in the middle of a bulk read
    fn bulk_wait(self) -> Duration {
        match self {
            Self::Latency => Duration::ZERO,
            Self::Balanced => Duration::from_millis(1),
            Self::Throughput => Duration::from_millis(5),
        }
    }
}

/// Stream lifecycle hooks. Every method defaults to a no-op.
pub trait StreamObserver: Send + Sync {
    /// A complete chunk was queued (producer thread)
    fn on_chunk_appended(&self, _chunk: &str) {}
    /// The consumer started handing out a freshly refilled buffer
    fn on_chunk_start(&self) {}
    /// The consumer exhausted its buffer
    fn on_chunk_end(&self) {}
    /// The consumer is about to park waiting for data
    fn before_wait(&self) {}
}

/// Options for [`data_stream`]
#[derive(Clone)]
pub struct StreamOptions {
    pub mode: PerformanceMode,
    pub compaction_threshold: usize,
    pub observer: Option<Arc<dyn StreamObserver>>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self::new(PerformanceMode::default())
    }
}

impl StreamOptions {
    pub fn new(mode: PerformanceMode) -> Self {
        Self {
            mode,
            compaction_threshold: DEFAULT_COMPACTION_THRESHOLD,
            observer: None,
        }
    }

    pub fn with_compaction_threshold(mut self, threshold: usize) -> Self {
        self.compaction_threshold = threshold;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn StreamObserver>) -> Self {
        self.observer = Some(observer);
        self
    }
}

enum Message {
    Chunk(String),
    Close,
}

struct Shared {
    closed: AtomicBool,
    /// Chunks sent but not yet received
    pending: AtomicUsize,
}

/// Create a connected writer/stream pair
pub fn data_stream(options: StreamOptions) -> (StreamWriter, DataStream) {
    let (tx, rx) = mpsc::channel();
    let shared = Arc::new(Shared {
        closed: AtomicBool::new(false),
        pending: AtomicUsize::new(0),
    });

    let writer = StreamWriter {
        tx,
        shared: Arc::clone(&shared),
        partial: String::new(),
        observer: options.observer.clone(),
    };
    let stream = DataStream {
        rx,
        shared,
        buf: String::new(),
        pos: 0,
        pushback: Vec::new(),
        closed: false,
        in_chunk: false,
        mode: options.mode,
        compaction_threshold: options.compaction_threshold,
        observer: options.observer,
    };
    (writer, stream)
}

/// Producer half
pub struct StreamWriter {
    tx: Sender<Message>,
    shared: Arc<Shared>,
    /// Trailing grapheme held back from the last append
    partial: String,
    observer: Option<Arc<dyn StreamObserver>>,
}

impl StreamWriter {
    /// Queue `chunk`, holding back a trailing grapheme that may continue.
    pub fn append(&mut self, chunk: &str) {
        if self.is_closed() {
            trace!("append after close ignored ({} bytes)", chunk.len());
            return;
        }
        if chunk.is_empty() {
            return;
        }

        let mut text = std::mem::take(&mut self.partial);
        text.push_str(chunk);

        let complete = complete_prefix_len(&text);
        if complete < text.len() {
            self.partial = text.split_off(complete);
        }
        if !text.is_empty() {
            self.queue(text);
        }
    }

    /// Deliver the held-back tail now
    pub fn flush_partial(&mut self) {
        if self.partial.is_empty() || self.is_closed() {
            return;
        }
        let tail = std::mem::take(&mut self.partial);
        self.queue(tail);
    }

    /// Deliver the held-back tail and the end-of-stream marker. Idempotent.
    pub fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        let tail = std::mem::take(&mut self.partial);
        if !tail.is_empty() {
            self.queue(tail);
        }
        self.shared.closed.store(true, Ordering::SeqCst);
        // The consumer may already be gone
        let _ = self.tx.send(Message::Close);
        debug!("data stream closed");
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Text currently held back
    pub fn pending_partial(&self) -> &str {
        &self.partial
    }

    fn queue(&self, chunk: String) {
        if let Some(observer) = &self.observer {
            observer.on_chunk_appended(&chunk);
        }
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(Message::Chunk(chunk)).is_err() {
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for StreamWriter {
    fn drop(&mut self) {
        self.close();
    }
}

/// Length of the prefix of `text` before its last grapheme.
///
/// The last cluster may still be extended by the next chunk (combining mark,
/// variation selector, ZWJ, skin tone, second regional indicator). Only a
/// control ends a cluster for certain.
fn complete_prefix_len(text: &str) -> usize {
    match text.grapheme_indices(true).next_back() {
        Some((_, last)) if last.chars().next_back().is_some_and(is_control) => text.len(),
        Some((start, _)) => start,
        None => text.len(),
    }
}

fn is_control(ch: char) -> bool {
    (ch as u32) < 0x20 || ch == '\u{7f}'
}

/// Consumer half
pub struct DataStream {
    rx: Receiver<Message>,
    shared: Arc<Shared>,
    buf: String,
    /// Byte offset of the next unread character in `buf`
    pos: usize,
    pushback: Vec<char>,
    /// Close marker seen or producer gone
    closed: bool,
    in_chunk: bool,
    mode: PerformanceMode,
    compaction_threshold: usize,
    observer: Option<Arc<dyn StreamObserver>>,
}

impl DataStream {
    pub fn mode(&self) -> PerformanceMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: PerformanceMode) {
        self.mode = mode;
    }

    /// Next character, blocking per the performance mode.
    pub fn next_char(&mut self) -> Result<char> {
        if let Some(ch) = self.pushback.pop() {
            return Ok(ch);
        }
        loop {
            if let Some(ch) = self.take_buffered() {
                return Ok(ch);
            }
            self.refill(self.mode.poll_interval())?;
        }
    }

    /// Read up to `max` printable characters.
    ///
    /// Stops before the first control character, which stays unread.
    pub fn read_non_control_characters(&mut self, max: usize) -> Result<String> {
        let mut out = String::new();
        let mut count = 0;

        while count < max {
            if let Some(ch) = self.pushback.pop() {
                if is_control(ch) {
                    self.pushback.push(ch);
                    break;
                }
                out.push(ch);
                count += 1;
                continue;
            }

            if self.pos < self.buf.len() {
                let (bytes, chars) = printable_prefix(&self.buf[self.pos..], max - count);
                out.push_str(&self.buf[self.pos..self.pos + bytes]);
                self.pos += bytes;
                count += chars;
                if self.pos < self.buf.len() {
                    break;
                }
                continue;
            }

            if count == 0 {
                match self.refill(self.mode.poll_interval()) {
                    Ok(_) => continue,
                    Err(StreamError::Eof) => return Err(StreamError::Eof),
                }
            }
            match self.refill(Some(self.mode.bulk_wait())) {
                Ok(true) => {}
                Ok(false) | Err(StreamError::Eof) => break,
            }
        }
        Ok(out)
    }

    pub fn push_char(&mut self, ch: char) {
        self.pushback.push(ch);
    }

    /// Push `chars` back so they are read again in their original order
    pub fn push_back_buffer(&mut self, chars: &[char]) {
        self.pushback.extend(chars.iter().rev());
    }

    /// True when nothing is buffered, pushed back or queued
    pub fn is_empty(&self) -> bool {
        self.pushback.is_empty()
            && self.pos >= self.buf.len()
            && self.shared.pending.load(Ordering::SeqCst) == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn take_buffered(&mut self) -> Option<char> {
        let ch = self.buf[self.pos..].chars().next()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    /// Refill the exhausted buffer.
    ///
    /// `Ok(false)` means the wait elapsed with nothing new; `Err(Eof)` means
    /// the stream is closed and fully drained.
    fn refill(&mut self, wait: Option<Duration>) -> Result<bool> {
        if self.in_chunk {
            self.in_chunk = false;
            if let Some(observer) = &self.observer {
                observer.on_chunk_end();
            }
        }
        self.compact();

        if self.drain_ready() {
            return Ok(self.start_chunk());
        }
        if self.closed {
            return Err(StreamError::Eof);
        }
        if wait == Some(Duration::ZERO) {
            return Ok(false);
        }

        if let Some(observer) = &self.observer {
            observer.before_wait();
        }
        trace!("data stream waiting ({:?})", wait);
        let received = match wait {
            None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            Some(timeout) => self.rx.recv_timeout(timeout),
        };
        match received {
            Ok(message) => {
                self.accept(message);
                self.drain_ready();
            }
            Err(RecvTimeoutError::Timeout) => return Ok(false),
            Err(RecvTimeoutError::Disconnected) => self.closed = true,
        }

        if self.pos < self.buf.len() {
            Ok(self.start_chunk())
        } else if self.closed {
            Err(StreamError::Eof)
        } else {
            Ok(false)
        }
    }

    /// Move every queued message into the buffer without blocking
    fn drain_ready(&mut self) -> bool {
        loop {
            match self.rx.try_recv() {
                Ok(message) => self.accept(message),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }
        self.pos < self.buf.len()
    }

    fn accept(&mut self, message: Message) {
        match message {
            Message::Chunk(chunk) => {
                self.shared.pending.fetch_sub(1, Ordering::SeqCst);
                debug!("data stream received {} bytes", chunk.len());
                self.buf.push_str(&chunk);
            }
            Message::Close => self.closed = true,
        }
    }

    fn start_chunk(&mut self) -> bool {
        self.in_chunk = true;
        if let Some(observer) = &self.observer {
            observer.on_chunk_start();
        }
        true
    }

    fn compact(&mut self) {
        if self.pos >= self.compaction_threshold {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
    }
}

/// Byte and char length of the printable prefix of `text`, at most `max` chars
fn printable_prefix(text: &str, max: usize) -> (usize, usize) {
    let mut bytes = 0;
    let mut chars = 0;
    for ch in text.chars() {
        if chars == max || is_control(ch) {
            break;
        }
        bytes += ch.len_utf8();
        chars += 1;
    }
    (bytes, chars)
}
