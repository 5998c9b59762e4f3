//! # Telemetry Feed
//!
//! Reads the ground station feed as JSON lines.
//!
//! Each line is either a decoded telemetry message:
//!
//! ```text
//! {"type":"VFR_HUD","fields":{"airspeed":12.5,"alt":101.0}}
//! ```
//!
//! or an operator command such as `tp start power run1`. Transport and
//! MAVLink decoding happen upstream of this reader.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::warn;

use super::Message;
use crate::error::Result;

/// One event read from the feed.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Decoded telemetry message
    Message(Message),
    /// Operator command line
    Command(String),
}

/// Line-oriented feed reader over any async buffered source (stdin, file, socket).
pub struct MessageFeed<R> {
    reader: R,
    line_buffer: String,
    line_number: u64,
}

impl<R: AsyncBufRead + Unpin> MessageFeed<R> {
    /// Wraps a buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_buffer: String::with_capacity(512),
            line_number: 0,
        }
    }

    /// Reads the next event, skipping blank and malformed lines.
    ///
    /// Returns `Ok(None)` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns an error only if the underlying reader fails.
    pub async fn next_event(&mut self) -> Result<Option<FeedEvent>> {
        loop {
            self.line_buffer.clear();
            let read = self.reader.read_line(&mut self.line_buffer).await?;
            if read == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            if let Some(event) = self.parse_line() {
                return Ok(Some(event));
            }
        }
    }

    /// Number of lines consumed so far.
    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    fn parse_line(&self) -> Option<FeedEvent> {
        let line = self.line_buffer.trim();
        if line.is_empty() {
            return None;
        }

        if line.starts_with('{') {
            return match serde_json::from_str::<Message>(line) {
                Ok(msg) => Some(FeedEvent::Message(msg)),
                Err(e) => {
                    warn!("Skipping malformed message on line {}: {}", self.line_number, e);
                    None
                }
            };
        }

        Some(FeedEvent::Command(line.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_reads_messages_and_commands() {
        let mock = tokio_test::io::Builder::new()
            .read(b"{\"type\":\"VFR_HUD\",\"fields\":{\"airspeed\":5}}\n")
            .read(b"tp start power run1\n")
            .build();
        let mut feed = MessageFeed::new(BufReader::new(mock));

        match feed.next_event().await.unwrap() {
            Some(FeedEvent::Message(msg)) => {
                assert_eq!(msg.msg_type(), "VFR_HUD");
                assert_eq!(msg.field("airspeed"), Some(5.0));
            }
            other => panic!("Expected message, got: {:?}", other),
        }
        assert_eq!(
            feed.next_event().await.unwrap(),
            Some(FeedEvent::Command("tp start power run1".to_string()))
        );
        assert_eq!(feed.next_event().await.unwrap(), None);
        assert_eq!(feed.line_number(), 2);
    }

    #[tokio::test]
    async fn test_skips_blank_and_malformed_lines() {
        let mock = tokio_test::io::Builder::new()
            .read(b"\n   \n{\"type\": 42}\n{not json\n")
            .read(b"{\"type\":\"SYS_STATUS\",\"fields\":{\"voltage_battery\":12000}}\n")
            .build();
        let mut feed = MessageFeed::new(BufReader::new(mock));

        match feed.next_event().await.unwrap() {
            Some(FeedEvent::Message(msg)) => assert_eq!(msg.msg_type(), "SYS_STATUS"),
            other => panic!("Expected message, got: {:?}", other),
        }
        assert_eq!(feed.line_number(), 5);
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let mock = tokio_test::io::Builder::new().build();
        let mut feed = MessageFeed::new(BufReader::new(mock));
        assert_eq!(feed.next_event().await.unwrap(), None);
    }
}
