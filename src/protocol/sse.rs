//! SSE framing shared by the broker's `/consume` handler and the client's
//! stream parser.
//!
//! Per the design note on scanner portability: a hand-rolled line scanner
//! with an explicit blank-line delimiter is used on both ends rather than a
//! third-party SSE crate, so broker and client agree byte-for-byte on what
//! "one event" means.

use super::message::Message;

/// One framed SSE event: `id: <id>\ndata: <message-json>\npartition:
/// <n>\n\n`.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// The message id, mirrored in `data` for convenience.
    pub id: String,
    /// The encoded message.
    pub message: Message,
}

impl Frame {
    /// Build a frame from a message.
    #[must_use]
    pub fn new(message: Message) -> Self {
        Self {
            id: message.id.to_string(),
            message,
        }
    }

    /// Render the frame using the exact framing from the spec: an `id:`
    /// line, a `data:` line with one-line JSON, an advisory `partition:`
    /// line, and a terminating blank line.
    ///
    /// # Errors
    ///
    /// Returns an error if the message fails to serialize as JSON.
    pub fn encode(&self) -> crate::error::Result<String> {
        let data = serde_json::to_string(&self.message)?;
        Ok(format!(
            "id: {}\ndata: {}\npartition: {}\n\n",
            self.id, data, self.message.partition
        ))
    }
}

/// Incrementally accumulates bytes from a streaming HTTP body and yields
/// complete [`Frame`]s as blank-line-terminated records arrive.
///
/// Tolerant of partial reads: callers feed arbitrary byte chunks via
/// [`Scanner::push`] and drain completed frames via [`Scanner::next_frame`].
#[derive(Debug, Default)]
pub struct Scanner {
    buf: String,
}

impl Scanner {
    /// Create an empty scanner.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed newly received bytes into the scanner's buffer.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.push_str(&String::from_utf8_lossy(chunk));
    }

    /// Pop the next complete event out of the buffer, if a blank-line
    /// terminator has arrived. Malformed records (missing `id:`/`data:`
    /// lines, or a `data:` line that fails to parse as a `Message`) are
    /// skipped rather than surfaced as an error, per spec.
    pub fn next_frame(&mut self) -> Option<Message> {
        loop {
            let sep = self.buf.find("\n\n")?;
            let record: String = self.buf.drain(..sep + 2).collect();

            let mut data_line = None;
            for line in record.lines() {
                if let Some(rest) = line.strip_prefix("data: ") {
                    data_line = Some(rest.to_string());
                }
            }

            match data_line {
                Some(data) => match serde_json::from_str::<Message>(&data) {
                    Ok(message) => return Some(message),
                    Err(err) => {
                        tracing::warn!(%err, "skipping malformed SSE data line");
                        continue;
                    }
                },
                None => {
                    tracing::warn!("skipping SSE record with no data line");
                    continue;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::TopicName;

    fn sample_message() -> Message {
        Message::new(TopicName::try_new("events").unwrap(), 1, "payload".into())
    }

    #[test]
    fn encode_then_scan_round_trips() {
        let msg = sample_message();
        let frame = Frame::new(msg.clone());
        let encoded = frame.encode().unwrap();

        let mut scanner = Scanner::new();
        scanner.push(encoded.as_bytes());
        let decoded = scanner.next_frame().unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn scanner_handles_partial_chunks() {
        let msg = sample_message();
        let encoded = Frame::new(msg.clone()).encode().unwrap();
        let (first, second) = encoded.split_at(encoded.len() / 2);

        let mut scanner = Scanner::new();
        scanner.push(first.as_bytes());
        assert!(scanner.next_frame().is_none());
        scanner.push(second.as_bytes());
        assert_eq!(scanner.next_frame().unwrap(), msg);
    }

    #[test]
    fn scanner_skips_malformed_record() {
        let mut scanner = Scanner::new();
        scanner.push(b"id: abc\ndata: not json\npartition: 0\n\n");
        let msg = sample_message();
        scanner.push(Frame::new(msg.clone()).encode().unwrap().as_bytes());
        assert_eq!(scanner.next_frame().unwrap(), msg);
    }
}
