//! Fuzz target: config text `parse`
//!
//! Feeds arbitrary bytes to the parser in both passes and checks that
//! whatever it accepted serializes back into text that parses cleanly.
//!
//! cargo fuzz run fuzz_config_parser

#![no_main]

use c8y_agent::config::parser::parse;
use c8y_agent::config::{ConfigKey, ConfigStore};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut store = ConfigStore::new();
    let _ = parse(&mut store, data, false);
    let _ = parse(&mut store, data, true);

    let text = store.serialize(false);
    let mut reparsed = ConfigStore::new();
    if parse(&mut reparsed, text.as_bytes(), false).is_ok() {
        for key in ConfigKey::ALL {
            if !key.is_deprecated() {
                assert_eq!(reparsed.get(key), store.get(key), "{}", key.name());
            }
        }
    }
});
