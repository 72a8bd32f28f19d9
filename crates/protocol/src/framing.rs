//! Newline framing
//!
//! Every message on the wire is one UTF-8 line terminated by `\n`
//! (a preceding `\r` is tolerated). Reads are bounded so a peer that never
//! sends a newline cannot grow the buffer without limit.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Outcome of [`read_bounded_line`]
#[derive(Debug, PartialEq, Eq)]
pub enum LineRead {
    /// A complete line is in the buffer, terminator stripped.
    /// Carries the number of bytes consumed from the stream.
    Line(usize),
    /// The line was longer than the limit; it was consumed and discarded
    TooLong(usize),
    /// Stream closed with no pending bytes
    Eof,
}

/// Read one line into `buf`, never storing more than `max_size` bytes
///
/// A trailing fragment at EOF is returned as a line. Oversized lines are
/// drained up to their newline so the stream stays aligned on message
/// boundaries.
pub async fn read_bounded_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max_size: usize,
) -> io::Result<LineRead> {
    buf.clear();

    let mut consumed = 0usize;
    let mut oversized = false;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if consumed == 0 {
                return Ok(LineRead::Eof);
            }
            break;
        }

        let (take, done) = match available.iter().position(|&b| b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (available.len(), false),
        };

        if !oversized {
            let room = max_size.saturating_sub(buf.len());
            let payload = if done { take - 1 } else { take };
            if payload <= room {
                buf.extend_from_slice(&available[..payload]);
            } else {
                oversized = true;
                buf.clear();
            }
        }

        consumed += take;
        reader.consume(take);

        if done {
            break;
        }
    }

    if oversized {
        return Ok(LineRead::TooLong(consumed));
    }

    if buf.last() == Some(&b'\r') {
        buf.pop();
    }

    Ok(LineRead::Line(consumed))
}

/// Write `line` followed by `\n` and flush
pub async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

/// Errors that mean the peer went away rather than something broke
pub fn is_connection_reset(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    async fn read_all(input: &[u8], max: usize) -> Vec<(LineRead, Vec<u8>)> {
        let mut reader = BufReader::with_capacity(4, input);
        let mut buf = Vec::new();
        let mut out = Vec::new();
        loop {
            let result = read_bounded_line(&mut reader, &mut buf, max).await.unwrap();
            if result == LineRead::Eof {
                break;
            }
            out.push((result, buf.clone()));
        }
        out
    }

    #[tokio::test]
    async fn test_splits_lines_and_strips_crlf() {
        let lines = read_all(b"alpha\r\nbeta\n", 64).await;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], (LineRead::Line(7), b"alpha".to_vec()));
        assert_eq!(lines[1], (LineRead::Line(5), b"beta".to_vec()));
    }

    #[tokio::test]
    async fn test_trailing_fragment_at_eof() {
        let lines = read_all(b"one\ntwo", 64).await;
        assert_eq!(lines[1], (LineRead::Line(3), b"two".to_vec()));
    }

    #[tokio::test]
    async fn test_oversized_line_is_skipped_and_stream_realigns() {
        let lines = read_all(b"0123456789abcdef\nok\n", 8).await;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].0, LineRead::TooLong(17));
        assert_eq!(lines[1], (LineRead::Line(3), b"ok".to_vec()));
    }

    #[tokio::test]
    async fn test_line_exactly_at_limit() {
        let lines = read_all(b"12345678\n", 8).await;
        assert_eq!(lines[0], (LineRead::Line(9), b"12345678".to_vec()));
    }

    #[tokio::test]
    async fn test_write_line_appends_newline() {
        let mut out = Vec::new();
        write_line(&mut out, "hello").await.unwrap();
        assert_eq!(out, b"hello\n");
    }

    #[test]
    fn test_connection_reset_kinds() {
        assert!(is_connection_reset(&io::Error::from(io::ErrorKind::BrokenPipe)));
        assert!(!is_connection_reset(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }
}
