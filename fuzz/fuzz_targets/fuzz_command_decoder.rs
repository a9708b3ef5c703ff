//! Fuzz target: inbound operation `decode` behind the command inbox
//!
//! Delivers arbitrary payloads the way the MQTT callback does, then
//! decodes every queued line. Neither step may panic, and the queue must
//! never hold more than its depth.
//!
//! cargo fuzz run fuzz_command_decoder

#![no_main]

use c8y_agent::app::inbox::{CommandInbox, COMMAND_QUEUE_DEPTH};
use c8y_agent::protocol::command::decode;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let inbox = CommandInbox::new();
    let accepted = inbox.deliver("s/ds", data);
    assert!(accepted <= COMMAND_QUEUE_DEPTH);

    while let Some(line) = inbox.try_next() {
        if let Err(e) = decode(&line) {
            assert!(!e.failure.reason().is_empty());
        }
    }
});
