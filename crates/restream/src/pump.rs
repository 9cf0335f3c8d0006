//! Output pump draining an encoder's stdout and stderr
//!
//! Two independent reader tasks, one per stream, forward every line into a
//! shared channel. Ordering is preserved within a stream; stdout and stderr
//! interleave in whatever order their reads complete.

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

const READ_CHUNK: usize = 4096;

/// Which encoder stream a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        }
    }
}

/// One line read from the encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub line: String,
}

pub type LineSender = mpsc::UnboundedSender<OutputLine>;
pub type LineReceiver = mpsc::UnboundedReceiver<OutputLine>;

/// Splits a byte stream into lines on `\n` or `\r`
///
/// ffmpeg redraws its status line with a bare carriage return, so both
/// terminators end a line. Empty lines are dropped and invalid UTF-8 is
/// replaced.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every line they complete
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &b in bytes {
            if b == b'\n' || b == b'\r' {
                if let Some(line) = self.take_pending() {
                    lines.push(line);
                }
            } else {
                self.pending.push(b);
            }
        }
        lines
    }

    /// Flush a trailing line that had no terminator
    pub fn finish(&mut self) -> Option<String> {
        self.take_pending()
    }

    fn take_pending(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(line)
    }
}

/// Reader tasks attached to one encoder process
pub struct OutputPump {
    readers: Vec<JoinHandle<()>>,
}

impl OutputPump {
    /// Start one reader per stream, forwarding lines into `sink`
    pub fn attach<O, E>(stdout: O, stderr: E, sink: LineSender) -> Self
    where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        let readers = vec![
            tokio::spawn(read_lines(stdout, OutputStream::Stdout, sink.clone())),
            tokio::spawn(read_lines(stderr, OutputStream::Stderr, sink)),
        ];
        Self { readers }
    }

    /// Wait up to `timeout` for both readers to finish
    ///
    /// Readers still running at the deadline are aborted, which drops and
    /// closes their streams. Returns true if both finished on their own.
    pub async fn join(self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut clean = true;
        for mut reader in self.readers {
            match tokio::time::timeout_at(deadline, &mut reader).await {
                Ok(_) => {}
                Err(_) => {
                    reader.abort();
                    clean = false;
                }
            }
        }
        clean
    }
}

/// Read `stream` to end-of-stream, forwarding each line
///
/// The stream is owned by this function and closed on every exit path.
async fn read_lines<R>(mut stream: R, kind: OutputStream, sink: LineSender)
where
    R: AsyncRead + Unpin,
{
    let mut splitter = LineSplitter::new();
    let mut buf = [0u8; READ_CHUNK];

    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                for line in splitter.push(&buf[..n]) {
                    if sink.send(OutputLine { stream: kind, line }).is_err() {
                        debug!(stream = kind.as_str(), "line sink closed, reader exiting");
                        return;
                    }
                }
            }
            Err(e) => {
                debug!(stream = kind.as_str(), error = %e, "encoder stream read failed");
                break;
            }
        }
    }

    if let Some(line) = splitter.finish() {
        let _ = sink.send(OutputLine { stream: kind, line });
    }
    debug!(stream = kind.as_str(), "encoder stream reached end");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splitter_handles_cr_lf_and_partial_chunks() {
        let mut splitter = LineSplitter::new();

        assert_eq!(splitter.push(b"Input #0, mov"), Vec::<String>::new());
        assert_eq!(
            splitter.push(b",mp4\r\nframe=1 fps=0\rframe=2 fps=25\r"),
            vec!["Input #0, mov,mp4", "frame=1 fps=0", "frame=2 fps=25"]
        );
        assert_eq!(splitter.push(b"tail"), Vec::<String>::new());
        assert_eq!(splitter.finish().as_deref(), Some("tail"));
        assert_eq!(splitter.finish(), None);
    }

    #[test]
    fn test_splitter_replaces_invalid_utf8() {
        let mut splitter = LineSplitter::new();
        let lines = splitter.push(b"bad \xff byte\n");
        assert_eq!(lines, vec!["bad \u{fffd} byte"]);
    }

    #[tokio::test]
    async fn test_pump_preserves_per_stream_order() {
        let (out_w, out_r) = tokio::io::duplex(64);
        let (err_w, err_r) = tokio::io::duplex(64);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let pump = OutputPump::attach(out_r, err_r, tx);

        let writer = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            let (mut out_w, mut err_w) = (out_w, err_w);
            for i in 0..20 {
                out_w.write_all(format!("out {}\n", i).as_bytes()).await.unwrap();
                err_w.write_all(format!("err {}\r", i).as_bytes()).await.unwrap();
            }
            // Dropping the writers signals end-of-stream
        });
        writer.await.unwrap();

        assert!(pump.join(Duration::from_secs(5)).await);

        let mut out = Vec::new();
        let mut err = Vec::new();
        while let Ok(line) = rx.try_recv() {
            match line.stream {
                OutputStream::Stdout => out.push(line.line),
                OutputStream::Stderr => err.push(line.line),
            }
        }

        let expected_out: Vec<String> = (0..20).map(|i| format!("out {}", i)).collect();
        let expected_err: Vec<String> = (0..20).map(|i| format!("err {}", i)).collect();
        assert_eq!(out, expected_out);
        assert_eq!(err, expected_err);
    }

    #[tokio::test]
    async fn test_join_aborts_readers_that_never_finish() {
        // Writers are kept alive so the readers never see end-of-stream
        let (_out_w, out_r) = tokio::io::duplex(64);
        let (_err_w, err_r) = tokio::io::duplex(64);
        let (tx, _rx) = mpsc::unbounded_channel();

        let pump = OutputPump::attach(out_r, err_r, tx);
        assert!(!pump.join(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn test_reader_flushes_unterminated_last_line() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        read_lines(&b"first\nlast"[..], OutputStream::Stderr, tx).await;

        assert_eq!(rx.recv().await.unwrap().line, "first");
        assert_eq!(rx.recv().await.unwrap().line, "last");
        assert!(rx.recv().await.is_none());
    }
}
