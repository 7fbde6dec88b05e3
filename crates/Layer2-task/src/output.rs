//! Captured process output
//!
//! stdout and stderr are read in fixed-size chunks on separate tasks and
//! appended to one shared buffer in arrival order, a line at a time where
//! lines are short. The buffer stops growing at its byte cap; after that the
//! readers only count what they drop.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

/// Read size, and the most a reader holds back waiting for a newline
const CHUNK: usize = 8 * 1024;

/// Merged, size-capped output of one process
#[derive(Debug)]
pub struct OutputBuffer {
    text: String,
    limit: usize,
    dropped: usize,
}

impl OutputBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            text: String::new(),
            limit,
            dropped: 0,
        }
    }

    /// Append one line (the trailing newline is included if present)
    pub fn push(&mut self, line: &str) {
        let room = self.limit.saturating_sub(self.text.len());
        if line.len() <= room {
            self.text.push_str(line);
            return;
        }

        let mut cut = room;
        while cut > 0 && !line.is_char_boundary(cut) {
            cut -= 1;
        }
        self.text.push_str(&line[..cut]);
        self.dropped += line.len() - cut;
    }

    /// Count bytes that arrived after the cap without looking at them
    pub fn discard(&mut self, bytes: usize) {
        self.dropped += bytes;
    }

    pub fn is_full(&self) -> bool {
        self.text.len() >= self.limit
    }

    pub fn is_truncated(&self) -> bool {
        self.dropped > 0
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Final text, with a marker line if anything was dropped
    pub fn finish(self) -> String {
        let mut text = self.text;
        if self.dropped > 0 {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&format!(
                "[output truncated: {} bytes dropped after {} bytes]",
                self.dropped, self.limit
            ));
        }
        text
    }
}

/// Shared handle the reader tasks write into
pub type SharedOutput = Arc<Mutex<OutputBuffer>>;

pub fn shared(limit: usize) -> SharedOutput {
    Arc::new(Mutex::new(OutputBuffer::new(limit)))
}

/// Take the buffer out of its shared handle
pub fn take(output: &SharedOutput) -> String {
    let buffer = std::mem::replace(&mut *output.lock(), OutputBuffer::new(0));
    buffer.finish()
}

/// Copy `stream` into `output` until EOF. Invalid UTF-8 is replaced rather
/// than ending the capture. At most two chunks are held in memory whatever
/// the stream looks like.
pub fn spawn_reader<R>(mut stream: R, output: SharedOutput) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = vec![0u8; CHUNK];
        let mut pending: Vec<u8> = Vec::with_capacity(CHUNK);

        loop {
            let n = match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };

            {
                let mut out = output.lock();
                if out.is_full() {
                    out.discard(pending.len() + n);
                    pending.clear();
                    continue;
                }
            }

            pending.extend_from_slice(&chunk[..n]);
            loop {
                let ready = ready_len(&pending);
                if ready == 0 {
                    break;
                }
                let text = String::from_utf8_lossy(&pending[..ready]).into_owned();
                output.lock().push(&text);
                pending.drain(..ready);
            }
        }

        if !pending.is_empty() {
            output.lock().push(&String::from_utf8_lossy(&pending));
        }
    })
}

/// How many leading bytes of `pending` to hand over now: everything up to
/// the last newline, or once a full chunk has piled up without one,
/// everything except an incomplete trailing UTF-8 sequence
fn ready_len(pending: &[u8]) -> usize {
    if let Some(pos) = pending.iter().rposition(|&b| b == b'\n') {
        return pos + 1;
    }
    if pending.len() < CHUNK {
        return 0;
    }
    pending.len() - incomplete_utf8_tail(pending)
}

/// Length of a multi-byte sequence cut off at the end of `bytes`
fn incomplete_utf8_tail(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let byte = bytes[bytes.len() - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let needed = match byte {
            b if b & 0xE0 == 0xC0 => 2,
            b if b & 0xF0 == 0xE0 => 3,
            b if b & 0xF8 == 0xF0 => 4,
            _ => return 0,
        };
        return if back < needed { back } else { 0 };
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_under_limit_kept_verbatim() {
        let mut buffer = OutputBuffer::new(64);
        buffer.push("hello\n");
        buffer.push("world\n");
        assert!(!buffer.is_truncated());
        assert_eq!(buffer.finish(), "hello\nworld\n");
    }

    #[test]
    fn test_truncates_with_marker() {
        let mut buffer = OutputBuffer::new(8);
        buffer.push("12345\n");
        buffer.push("67890\n");
        buffer.push("more\n");
        assert!(buffer.is_truncated());
        assert_eq!(buffer.len(), 8);

        let text = buffer.finish();
        assert!(text.starts_with("12345\n67\n"));
        assert!(text.contains("[output truncated: 9 bytes dropped after 8 bytes]"));
    }

    #[test]
    fn test_cut_respects_char_boundaries() {
        let mut buffer = OutputBuffer::new(3);
        buffer.push("aéb");
        // 'é' is two bytes; only "a" + "é" fit exactly
        assert_eq!(buffer.len(), 3);
        buffer.push("é");
        assert!(buffer.is_truncated());
    }

    #[tokio::test]
    async fn test_reader_merges_lines() {
        let output = shared(1024);
        let data: &[u8] = b"first\nsecond\n\xffbroken\nno-newline";
        spawn_reader(data, output.clone()).await.unwrap();

        let text = take(&output);
        assert!(text.starts_with("first\nsecond\n"));
        assert!(text.contains("broken"));
        assert!(text.ends_with("no-newline"));
    }

    #[tokio::test]
    async fn test_reader_without_newlines_stays_bounded() {
        let total: u64 = 4 * 1024 * 1024;
        let output = shared(16);
        let stream = tokio::io::repeat(b'x').take(total);
        spawn_reader(stream, output.clone()).await.unwrap();

        let text = take(&output);
        assert!(text.starts_with(&"x".repeat(16)));
        assert!(text.ends_with(&format!(
            "[output truncated: {} bytes dropped after 16 bytes]",
            total - 16
        )));
    }

    #[test]
    fn test_ready_len() {
        assert_eq!(ready_len(b"partial"), 0);
        assert_eq!(ready_len(b"one\ntwo\nrest"), 8);

        let full = vec![b'a'; CHUNK];
        assert_eq!(ready_len(&full), CHUNK);

        // A chunk ending in the first byte of 'é' keeps that byte back
        let mut split = vec![b'a'; CHUNK - 1];
        split.push(0xC3);
        assert_eq!(ready_len(&split), CHUNK - 1);
    }

    #[test]
    fn test_incomplete_utf8_tail() {
        assert_eq!(incomplete_utf8_tail(b"abc"), 0);
        assert_eq!(incomplete_utf8_tail("aé".as_bytes()), 0);
        assert_eq!(incomplete_utf8_tail(b"a\xC3"), 1);
        assert_eq!(incomplete_utf8_tail(b"a\xE2\x82"), 2);
        assert_eq!(incomplete_utf8_tail("€".as_bytes()), 0);
    }
}
