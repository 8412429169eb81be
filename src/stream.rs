//! Line framing for the engine's stdout.
//!
//! The engine writes arbitrary byte chunks; [`OutputStream`] re-frames them
//! into `\n`-terminated lines and forwards each line to a bounded channel.

use tokio::sync::mpsc;

use crate::uci::UciError;

/// Default size of the per-line scratch buffer.
pub const DEFAULT_LINE_BUFFER_SIZE: usize = 16_384;

/// Default capacity, in lines, of the channel the stream emits into.
pub const DEFAULT_LINE_CHANNEL_CAPACITY: usize = 4_096;

/// Real-time, line-by-line view of a byte stream.
///
/// Lines are terminated by a single newline preceded by an optional carriage
/// return; both are stripped before the line is sent. Sending blocks when the
/// channel is full, so backpressure propagates to the writing process. The
/// stream never closes the channel.
pub struct OutputStream {
    tx: mpsc::Sender<String>,
    buf: Vec<u8>,
    last_char: usize,
}

impl OutputStream {
    /// Create a stream emitting into `tx`. A `line_buf_size` of 0 selects
    /// [`DEFAULT_LINE_BUFFER_SIZE`].
    pub fn new(tx: mpsc::Sender<String>, line_buf_size: usize) -> Self {
        let size = if line_buf_size == 0 {
            DEFAULT_LINE_BUFFER_SIZE
        } else {
            line_buf_size
        };
        Self {
            tx,
            buf: vec![0; size],
            last_char: 0,
        }
    }

    /// Write a chunk of process output.
    ///
    /// Every line completed by this chunk is emitted, in order, before the
    /// call returns. Unterminated bytes are held in the scratch buffer for
    /// the next write; if they do not fit, the write fails with
    /// [`UciError::LineBufferOverflow`] after having emitted the lines that
    /// did complete.
    pub async fn write(&mut self, p: &[u8]) -> Result<usize, UciError> {
        let mut first = 0;

        while let Some(offset) = p[first..].iter().position(|&b| b == b'\n') {
            let newline = first + offset;

            let mut line = Vec::with_capacity(self.last_char + (newline - first));
            line.extend_from_slice(&self.buf[..self.last_char]);
            self.last_char = 0;
            line.extend_from_slice(&p[first..newline]);
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            let line = String::from_utf8_lossy(&line).into_owned();
            if self.tx.send(line).await.is_err() {
                return Err(UciError::SessionFaulted);
            }

            first = newline + 1;
        }

        if first < p.len() {
            let remain = p.len() - first;
            let free = self.buf.len() - self.last_char;
            if remain > free {
                let mut line = Vec::with_capacity(self.last_char + remain);
                line.extend_from_slice(&self.buf[..self.last_char]);
                line.extend_from_slice(&p[first..]);
                return Err(UciError::LineBufferOverflow {
                    line: String::from_utf8_lossy(&line).into_owned(),
                    buffer_size: self.buf.len(),
                    buffer_free: free,
                });
            }
            self.buf[self.last_char..self.last_char + remain].copy_from_slice(&p[first..]);
            self.last_char += remain;
        }

        Ok(p.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        lines
    }

    #[tokio::test]
    async fn test_reframes_chunks_into_lines() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut stream = OutputStream::new(tx, 0);

        stream.write(b"foo\nba").await.unwrap();
        stream.write(b"r\nbaz").await.unwrap();
        stream.write(b"\n").await.unwrap();

        assert_eq!(drain(&mut rx), ["foo", "bar", "baz"]);
    }

    #[tokio::test]
    async fn test_strips_carriage_returns() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut stream = OutputStream::new(tx, 0);

        stream.write(b"one\r\ntwo\nthree\r\n").await.unwrap();

        assert_eq!(drain(&mut rx), ["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_framing_is_chunking_independent() {
        let input = b"alpha\r\nbeta\ngamma delta\n";
        for split in 1..input.len() {
            let (tx, mut rx) = mpsc::channel(16);
            let mut stream = OutputStream::new(tx, 0);

            stream.write(&input[..split]).await.unwrap();
            stream.write(&input[split..]).await.unwrap();

            assert_eq!(
                drain(&mut rx),
                ["alpha", "beta", "gamma delta"],
                "failed for split at byte {split}"
            );
        }
    }

    #[tokio::test]
    async fn test_overflow_reports_size_and_free_bytes() {
        let (tx, _rx) = mpsc::channel(16);
        let mut stream = OutputStream::new(tx, 8);

        let err = stream.write(b"0123456789").await.unwrap_err();
        match err {
            UciError::LineBufferOverflow {
                line,
                buffer_size,
                buffer_free,
            } => {
                assert_eq!(line, "0123456789");
                assert_eq!(buffer_size, 8);
                assert_eq!(buffer_free, 8);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_overflow_includes_buffered_tail() {
        let (tx, _rx) = mpsc::channel(16);
        let mut stream = OutputStream::new(tx, 8);

        stream.write(b"abc").await.unwrap();
        let err = stream.write(b"defghi").await.unwrap_err();
        match err {
            UciError::LineBufferOverflow {
                line,
                buffer_size,
                buffer_free,
            } => {
                assert_eq!(line, "abcdefghi");
                assert_eq!(buffer_size, 8);
                assert_eq!(buffer_free, 5);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_lines_before_overflow_are_emitted() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut stream = OutputStream::new(tx, 4);

        let err = stream.write(b"ok\ntoolongline").await.unwrap_err();
        assert!(matches!(err, UciError::LineBufferOverflow { .. }));
        assert_eq!(drain(&mut rx), ["ok"]);
    }
}
