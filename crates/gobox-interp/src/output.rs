//! Bounded capture buffer for guest stdout/stderr.

use std::sync::{Arc, Mutex, PoisonError};

/// Appended after captured output that hit the cap.
pub const TRUNCATION_MARKER: &str = "\n... [output truncated]";

#[derive(Debug, Default)]
struct Inner {
    data: Vec<u8>,
    cap: usize,
    truncated: bool,
}

/// Shared, size-capped byte sink. Clones write into the same buffer, so the
/// host can keep a handle and read partial output after an interrupted run.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    inner: Arc<Mutex<Inner>>,
}

impl OutputBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                data: Vec::new(),
                cap,
                truncated: false,
            })),
        }
    }

    /// Append bytes, dropping whatever does not fit.
    pub fn write(&self, bytes: &[u8]) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let room = inner.cap.saturating_sub(inner.data.len());
        if bytes.len() > room {
            inner.truncated = true;
        }
        let take = bytes.len().min(room);
        inner.data.extend_from_slice(&bytes[..take]);
    }

    /// Captured text, lossily decoded, with the truncation marker appended
    /// when the cap was hit.
    pub fn contents(&self) -> String {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut text = String::from_utf8_lossy(&inner.data).into_owned();
        if inner.truncated {
            text.push_str(TRUNCATION_MARKER);
        }
        text
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .data
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_truncated(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_accumulate_across_clones() {
        let buf = OutputBuffer::new(64);
        let handle = buf.clone();
        buf.write(b"hello ");
        handle.write(b"world");
        assert_eq!(buf.contents(), "hello world");
        assert!(!buf.is_truncated());
    }

    #[test]
    fn cap_truncates_and_marks() {
        let buf = OutputBuffer::new(4);
        buf.write(b"abcdef");
        assert_eq!(buf.len(), 4);
        assert!(buf.is_truncated());
        assert_eq!(buf.contents(), format!("abcd{TRUNCATION_MARKER}"));
    }

    #[test]
    fn zero_cap_keeps_nothing() {
        let buf = OutputBuffer::new(0);
        buf.write(b"x");
        assert!(buf.is_empty());
        assert!(buf.is_truncated());
    }
}
