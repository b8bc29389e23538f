//! Bounded in-memory copy of the log output, served by `/api/logs`.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing_subscriber::fmt::MakeWriter;

/// Ring buffer of formatted log lines. Cloning shares the buffer.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    inner: Arc<Mutex<Lines>>,
}

#[derive(Debug)]
struct Lines {
    lines: VecDeque<String>,
    partial: String,
    capacity: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl LogBuffer {
    pub const DEFAULT_CAPACITY: usize = 1000;

    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Lines {
                lines: VecDeque::with_capacity(capacity.min(Self::DEFAULT_CAPACITY)),
                partial: String::new(),
                capacity: capacity.max(1),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Lines> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append raw writer output; only complete lines become visible.
    pub fn push_bytes(&self, bytes: &[u8]) {
        let mut buf = self.lock();
        buf.partial.push_str(&String::from_utf8_lossy(bytes));
        while let Some(idx) = buf.partial.find('\n') {
            let line: String = buf.partial.drain(..=idx).collect();
            let line = line.trim_end_matches(['\r', '\n']).to_string();
            if buf.lines.len() == buf.capacity {
                buf.lines.pop_front();
            }
            buf.lines.push_back(line);
        }
    }

    /// The newest `n` lines, oldest first.
    pub fn tail(&self, n: usize) -> Vec<String> {
        let buf = self.lock();
        let skip = buf.lines.len().saturating_sub(n);
        buf.lines.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct LogWriter(LogBuffer);

impl io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.push_bytes(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter(self.clone())
    }
}
