//! Bounded queue between the MQTT callback and the engine.
//!
//! The transport's message callback runs on the MQTT client task. It must
//! not block and must not touch engine state, so it only splits the
//! payload into lines and offers each to a fixed-depth channel. The engine
//! drains the channel from its own loop.
//!
//! A full queue drops the line. The drop is logged and counted; the
//! platform re-delivers pending operations on request (`500`).

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{debug, warn};

use crate::protocol::command::MAX_INBOUND_LINE;

/// Queue depth.
pub const COMMAND_QUEUE_DEPTH: usize = 4;

/// Holds one byte more than the decoder accepts so an overlong line is
/// still seen as overlong after truncation.
pub type InboundLine = heapless::String<{ MAX_INBOUND_LINE + 1 }>;

pub struct CommandInbox {
    channel: Channel<CriticalSectionRawMutex, InboundLine, COMMAND_QUEUE_DEPTH>,
    dropped: AtomicU32,
}

impl Default for CommandInbox {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandInbox {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            dropped: AtomicU32::new(0),
        }
    }

    /// Callback entry point: enqueue every non-blank line of `payload`.
    /// Returns the number of lines accepted.
    pub fn deliver(&self, topic: &str, payload: &[u8]) -> usize {
        let Ok(text) = core::str::from_utf8(payload) else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!("Inbox: non-UTF-8 payload on {topic} dropped ({} bytes)", payload.len());
            return 0;
        };
        debug!("Inbox: {} bytes on {topic}", payload.len());
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .filter(|l| self.push_line(l))
            .count()
    }

    /// Offer one line without blocking. `false` if the queue was full.
    pub fn push_line(&self, line: &str) -> bool {
        let mut entry = InboundLine::new();
        for c in line.chars() {
            if entry.push(c).is_err() {
                break;
            }
        }
        if self.channel.try_send(entry).is_ok() {
            true
        } else {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!("Inbox: queue full, dropped \"{line}\" ({total} dropped so far)");
            false
        }
    }

    pub fn try_next(&self) -> Option<InboundLine> {
        self.channel.try_receive().ok()
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_split_into_lines() {
        let inbox = CommandInbox::new();
        let n = inbox.deliver("s/ds", b"510,XDK\r\n511,XDK,toggle\r\n\r\n");
        assert_eq!(n, 2);
        assert_eq!(inbox.try_next().as_deref(), Some("510,XDK"));
        assert_eq!(inbox.try_next().as_deref(), Some("511,XDK,toggle"));
        assert!(inbox.try_next().is_none());
    }

    #[test]
    fn full_queue_drops_and_counts() {
        let inbox = CommandInbox::new();
        for _ in 0..COMMAND_QUEUE_DEPTH {
            assert!(inbox.push_line("511,XDK,toggle"));
        }
        assert!(!inbox.push_line("510,XDK"));
        assert_eq!(inbox.dropped(), 1);
        assert_eq!(inbox.len(), COMMAND_QUEUE_DEPTH);
    }

    #[test]
    fn overlong_line_stays_overlong() {
        let inbox = CommandInbox::new();
        let long = "x".repeat(MAX_INBOUND_LINE * 2);
        assert!(inbox.push_line(&long));
        let queued = inbox.try_next().unwrap();
        assert_eq!(queued.len(), MAX_INBOUND_LINE + 1);
    }

    #[test]
    fn invalid_utf8_is_dropped() {
        let inbox = CommandInbox::new();
        assert_eq!(inbox.deliver("s/ds", &[0xFF, 0xFE]), 0);
        assert_eq!(inbox.dropped(), 1);
        assert!(inbox.is_empty());
    }
}
