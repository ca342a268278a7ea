//! Session management
//!
//! Runs one terminal: a reader thread decoding PTY output into the data
//! stream and an interpreter thread applying it to the terminal state.

use std::char::REPLACEMENT_CHARACTER;
use std::io::{self, ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::stream::{
    data_stream, PerformanceMode, StreamObserver, StreamOptions, StreamWriter, DEFAULT_COMPACTION_THRESHOLD,
};
use super::term::state::DEFAULT_SCROLLBACK_LIMIT;
use super::term::{ModeSet, Response, SharedModes, TerminalState, VtParser};
use crate::config::Config;

const READ_BUFFER_SIZE: usize = 4096;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("failed to start session thread: {0}")]
    Io(#[from] io::Error),
}

/// Session events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Screen changed since the last render
    Output,
    /// Output stream ended and everything was interpreted
    Exited,
    TitleChanged(String),
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub cols: u16,
    pub rows: u16,
    pub mode: PerformanceMode,
    pub compaction_threshold: usize,
    pub scrollback_limit: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            cols: 80,
            rows: 24,
            mode: PerformanceMode::default(),
            compaction_threshold: DEFAULT_COMPACTION_THRESHOLD,
            scrollback_limit: DEFAULT_SCROLLBACK_LIMIT,
        }
    }
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        Self {
            cols: config.terminal.cols,
            rows: config.terminal.rows,
            mode: config.performance_mode,
            compaction_threshold: config.compaction_threshold,
            scrollback_limit: config.scrollback_limit,
        }
    }
}

/// Incremental UTF-8 decoding across read boundaries
#[derive(Default)]
struct Utf8Decoder {
    /// Incomplete sequence at the end of the last read
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::with_capacity(self.pending.len());
        let mut start = 0;

        while start < self.pending.len() {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(text) => {
                    out.push_str(text);
                    start = self.pending.len();
                }
                Err(e) => {
                    let valid = start + e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[start..valid]));
                    match e.error_len() {
                        Some(len) => {
                            warn!("invalid UTF-8 in PTY output ({} bytes)", len);
                            out.push(REPLACEMENT_CHARACTER);
                            start = valid + len;
                        }
                        None => {
                            start = valid;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..start);
        out
    }

    /// A sequence cut off by end of input decodes to U+FFFD
    fn finish(&mut self) -> Option<char> {
        if self.pending.is_empty() {
            return None;
        }
        self.pending.clear();
        Some(REPLACEMENT_CHARACTER)
    }
}

/// Publishes modes and emits events from the interpreter's side of the stream
struct SessionObserver {
    state: Arc<Mutex<TerminalState>>,
    modes: SharedModes,
    events: Mutex<Sender<SessionEvent>>,
    title: Mutex<String>,
}

impl SessionObserver {
    fn notify(&self) {
        let (render, title) = {
            let mut state = self.state.lock();
            self.modes.publish(state.modes);
            (state.take_render_request(), state.title.clone())
        };

        let events = self.events.lock();
        // The owner may have dropped the receiver
        if render {
            let _ = events.send(SessionEvent::Output);
        }
        let mut last = self.title.lock();
        if *last != title {
            last.clone_from(&title);
            let _ = events.send(SessionEvent::TitleChanged(title));
        }
    }

    fn send(&self, event: SessionEvent) {
        let _ = self.events.lock().send(event);
    }
}

impl StreamObserver for SessionObserver {
    fn on_chunk_end(&self) {
        let state = self.state.lock();
        self.modes.publish(state.modes);
    }

    fn before_wait(&self) {
        self.notify();
    }
}

/// Synchronous interpreter for [`Session::feed`]
#[derive(Default)]
struct DirectFeed {
    decoder: Utf8Decoder,
    parser: VtParser,
}

/// A terminal session
pub struct Session {
    pub id: u64,
    state: Arc<Mutex<TerminalState>>,
    modes: SharedModes,
    observer: Arc<SessionObserver>,
    events: Receiver<SessionEvent>,
    running: Arc<AtomicBool>,
    direct: DirectFeed,
    reader_thread: Option<JoinHandle<()>>,
    interpreter_thread: Option<JoinHandle<()>>,
}

impl Session {
    /// Create a session without threads, driven by [`Session::feed`]
    pub fn new(id: u64, options: SessionOptions) -> Self {
        let state = TerminalState::with_scrollback(options.cols, options.rows, options.scrollback_limit);
        let modes = SharedModes::new(state.modes);
        let state = Arc::new(Mutex::new(state));
        let (tx, rx) = mpsc::channel();
        let observer = Arc::new(SessionObserver {
            state: Arc::clone(&state),
            modes: modes.clone(),
            events: Mutex::new(tx),
            title: Mutex::new(String::new()),
        });

        Self {
            id,
            state,
            modes,
            observer,
            events: rx,
            running: Arc::new(AtomicBool::new(false)),
            direct: DirectFeed::default(),
            reader_thread: None,
            interpreter_thread: None,
        }
    }

    /// Start reading PTY output from `reader`, answering queries on `responder`
    pub fn spawn<R, W>(id: u64, reader: R, responder: W, options: SessionOptions) -> Result<Self, SessionError>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let mut session = Self::new(id, options.clone());
        session.running.store(true, Ordering::SeqCst);

        let stream_options = StreamOptions::new(options.mode)
            .with_compaction_threshold(options.compaction_threshold)
            .with_observer(session.observer.clone() as Arc<dyn StreamObserver>);
        let (writer, stream) = data_stream(stream_options);

        let running = session.running.clone();
        let reader_thread = thread::Builder::new()
            .name(format!("termcore-reader-{id}"))
            .spawn(move || read_loop(reader, writer, running))?;
        session.reader_thread = Some(reader_thread);

        let state = session.state.clone();
        let observer = session.observer.clone();
        let running = session.running.clone();
        let interpreter_thread = thread::Builder::new()
            .name(format!("termcore-vt-{id}"))
            .spawn(move || {
                let mut stream = stream;
                let mut responder = responder;
                let mut parser = VtParser::new();
                parser.run(&mut stream, &state, |response| {
                    let result = responder
                        .write_all(&response.to_bytes())
                        .and_then(|()| responder.flush());
                    if let Err(e) = result {
                        warn!("failed to answer {:?}: {}", response, e);
                    }
                });
                observer.notify();
                running.store(false, Ordering::SeqCst);
                observer.send(SessionEvent::Exited);
                info!("session {} exited", id);
            })?;
        session.interpreter_thread = Some(interpreter_thread);

        info!("session {} started ({})", id, options.mode.name());
        Ok(session)
    }

    /// Interpret `bytes` on the calling thread, returning the replies
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Response> {
        let text = self.direct.decoder.decode(bytes);
        let responses = {
            let mut state = self.state.lock();
            self.direct.parser.feed_str(&text, &mut state)
        };
        self.observer.notify();
        responses
    }

    pub fn state(&self) -> Arc<Mutex<TerminalState>> {
        Arc::clone(&self.state)
    }

    /// Latest published mode flags
    pub fn modes(&self) -> ModeSet {
        self.modes.snapshot()
    }

    pub fn events(&self) -> &Receiver<SessionEvent> {
        &self.events
    }

    pub fn try_event(&self) -> Option<SessionEvent> {
        self.events.try_recv().ok()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn resize(&self, cols: u16, rows: u16) {
        self.state.lock().resize(cols, rows);
    }

    pub fn title(&self) -> String {
        self.state.lock().title.clone()
    }

    /// Block until the output stream is fully interpreted
    pub fn wait(&mut self) {
        if let Some(handle) = self.interpreter_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.reader_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // The reader may be parked in a blocking read, so it is not joined
        self.running.store(false, Ordering::SeqCst);
    }
}

fn read_loop<R: Read>(mut reader: R, mut writer: StreamWriter, running: Arc<AtomicBool>) {
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    let mut decoder = Utf8Decoder::default();

    while running.load(Ordering::SeqCst) {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                debug!("read {} bytes", n);
                writer.append(&decoder.decode(&buffer[..n]));
                // A short read ends the burst
                if n < buffer.len() {
                    writer.flush_partial();
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("PTY read failed: {}", e);
                break;
            }
        }
    }

    if let Some(ch) = decoder.finish() {
        writer.append(ch.encode_utf8(&mut [0; 4]));
    }
    writer.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::term::TerminalMode;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;
    use std::time::Duration;

    /// A reader handing out fixed pieces, one per call
    struct Pieces(Vec<Vec<u8>>);

    impl Read for Pieces {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.0.is_empty() {
                return Ok(0);
            }
            let piece = self.0.remove(0);
            buf[..piece.len()].copy_from_slice(&piece);
            Ok(piece.len())
        }
    }

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn wait_for_exit(session: &Session) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        loop {
            let event = session
                .events()
                .recv_timeout(Duration::from_secs(5))
                .expect("session did not exit");
            let done = event == SessionEvent::Exited;
            events.push(event);
            if done {
                return events;
            }
        }
    }

    #[test]
    fn test_decoder_holds_incomplete_tail() {
        let mut decoder = Utf8Decoder::default();
        let bytes = "中".as_bytes();
        assert_eq!(decoder.decode(&bytes[..1]), "");
        assert_eq!(decoder.decode(&bytes[1..2]), "");
        assert_eq!(decoder.decode(&bytes[2..]), "中");
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"a\xffb"), "a\u{fffd}b");
        assert_eq!(decoder.decode(b"c\xe4\xb8"), "c");
        assert_eq!(decoder.finish(), Some(REPLACEMENT_CHARACTER));
    }

    #[test]
    fn test_feed() {
        let mut session = Session::new(1, SessionOptions::default());
        let responses = session.feed(b"\x1b]2;build\x07ab\x1b[6n");
        assert_eq!(responses, vec![Response::CursorPosition(1, 3)]);
        assert_eq!(session.title(), "build");
        assert_eq!(session.try_event(), Some(SessionEvent::Output));
        assert_eq!(session.try_event(), Some(SessionEvent::TitleChanged("build".to_string())));
        assert_eq!(session.try_event(), None);
    }

    #[test]
    fn test_feed_split_utf8() {
        let mut session = Session::new(1, SessionOptions::default());
        let bytes = "x中y".as_bytes();
        session.feed(&bytes[..2]);
        session.feed(&bytes[2..]);
        let state = session.state();
        let state = state.lock();
        assert_eq!(state.active_screen().rows[0].text(), "x中y");
    }

    #[test]
    fn test_modes_published() {
        let mut session = Session::new(1, SessionOptions::default());
        assert!(!session.modes().contains(TerminalMode::BracketedPasteMode));
        session.feed(b"\x1b[?2004h");
        assert!(session.modes().contains(TerminalMode::BracketedPasteMode));
    }

    #[test]
    fn test_synchronized_update_defers_output() {
        let mut session = Session::new(1, SessionOptions::default());
        session.feed(b"\x1b[?2026hhello");
        assert_eq!(session.try_event(), None);
        session.feed(b"\x1b[?2026l");
        assert_eq!(session.try_event(), Some(SessionEvent::Output));
    }

    #[test]
    fn test_spawn_replays_to_end() {
        let source = Pieces(vec![
            b"one\r\n".to_vec(),
            "t\u{e4}".as_bytes()[..2].to_vec(),
            "\u{e4}".as_bytes()[1..].to_vec(),
            b"wo\x1b[c".to_vec(),
        ]);
        let sink = SharedSink::default();
        let mut session = Session::spawn(7, source, sink.clone(), SessionOptions::default()).unwrap();

        let events = wait_for_exit(&session);
        session.wait();

        assert!(events.contains(&SessionEvent::Output));
        assert!(!session.is_running());
        let state = session.state();
        let state = state.lock();
        assert_eq!(state.active_screen().rows[0].text(), "one");
        assert_eq!(state.active_screen().rows[1].text(), "t\u{e4}wo");
        assert_eq!(sink.0.lock().clone(), b"\x1b[?62;c".to_vec());
    }

    #[test]
    fn test_spawn_empty_source() {
        let mut session = Session::spawn(2, Cursor::new(Vec::new()), io::sink(), SessionOptions::default()).unwrap();
        let events = wait_for_exit(&session);
        session.wait();
        assert_eq!(events.last(), Some(&SessionEvent::Exited));
    }

    #[test]
    fn test_options_from_config() {
        let mut config = Config::default();
        config.terminal.cols = 132;
        config.performance_mode = PerformanceMode::Latency;
        let options = SessionOptions::from(&config);
        assert_eq!(options.cols, 132);
        assert_eq!(options.rows, 24);
        assert_eq!(options.mode, PerformanceMode::Latency);
    }
}
