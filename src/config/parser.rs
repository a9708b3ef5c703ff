//! `KEY=VALUE` configuration text parser.
//!
//! A hand-rolled scanner feeding a three-state parser:
//!
//! ```text
//!   ┌────────────┐ name ┌──────────────┐  =  ┌─────────────┐
//!   │ ExpectName │─────▶│ ExpectEquals │────▶│ ExpectValue │
//!   └────────────┘      └──────────────┘     └──────┬──────┘
//!         ▲                                         │ value
//!         └─────────────────────────────────────────┘
//! ```
//!
//! Whitespace, blank lines and `#` comment lines are skipped only while a
//! name is expected. Inside a value only spaces and tabs before the first
//! character are skipped, so `KEY=` followed by a newline defines `KEY` as
//! the empty string.

use log::{info, warn};

use super::{ConfigKey, ConfigStore, CONFIG_FILE, MAX_VALUE_LEN};
use crate::app::ports::PersistentStore;
use crate::error::{ConfigError, Expected, ParseError, ParseErrorKind, StorageError};

// ───────────────────────────────────────────────────────────────
// Scanner
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Name(ConfigKey),
    Equals,
    Value(&'a str),
    Eof,
}

struct Scanner<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn skip_while(&mut self, pred: impl Fn(u8) -> bool) {
        while let Some(b) = self.peek() {
            if !pred(b) {
                break;
            }
            self.pos += 1;
        }
    }

    /// Next token and the byte offset it starts at.
    fn next_token(&mut self, expect: Expected) -> Result<(usize, Token<'a>), ParseError> {
        if expect == Expected::Value {
            self.skip_while(|b| b == b' ' || b == b'\t');
            let start = self.pos;
            return self.value().map(|v| (start, Token::Value(v)));
        }

        loop {
            self.skip_while(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'));
            if expect == Expected::AttributeName && self.peek() == Some(b'#') {
                self.skip_while(|b| b != b'\n' && b != b'\r');
                continue;
            }
            break;
        }

        let start = self.pos;
        let token = match self.peek() {
            None => Token::Eof,
            Some(b'=') => {
                self.pos += 1;
                Token::Equals
            }
            Some(_) => {
                self.skip_while(|b| !matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'='));
                let word = &self.text[start..self.pos];
                ConfigKey::from_name(word).map_or(Token::Value(word), Token::Name)
            }
        };
        Ok((start, token))
    }

    /// Value up to end of line, tab, or a whitespace-preceded `#`.
    fn value(&mut self) -> Result<&'a str, ParseError> {
        let bytes = self.text.as_bytes();
        let start = self.pos;
        let mut end = start;
        let mut comment = false;
        while let Some(&b) = bytes.get(end) {
            if matches!(b, b'\r' | b'\n' | b'\t') {
                break;
            }
            if b == b'#' && end > 0 && matches!(bytes[end - 1], b' ' | b'\t') {
                comment = true;
                break;
            }
            end += 1;
        }

        let value = self.text[start..end].trim_end_matches([' ', '\t']);
        self.pos = end;
        if comment {
            self.skip_while(|b| b != b'\n' && b != b'\r');
        }

        if value.len() > MAX_VALUE_LEN {
            return Err(ParseError {
                kind: ParseErrorKind::ValueTooLong,
                offset: start,
            });
        }
        Ok(value)
    }
}

// ───────────────────────────────────────────────────────────────
// Parser
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum State {
    ExpectName,
    ExpectEquals(ConfigKey),
    ExpectValue(ConfigKey),
}

impl State {
    fn expected(self) -> Expected {
        match self {
            Self::ExpectName => Expected::AttributeName,
            Self::ExpectEquals(_) => Expected::Equals,
            Self::ExpectValue(_) => Expected::Value,
        }
    }
}

/// Parse `text` into `store`.
///
/// Without `allow_overwrite` an attribute that is already defined is an
/// error and keeps its first value. Lines before the failing token stay
/// applied.
pub fn parse(store: &mut ConfigStore, text: &[u8], allow_overwrite: bool) -> Result<(), ParseError> {
    let text = core::str::from_utf8(text).map_err(|e| ParseError {
        kind: ParseErrorKind::InvalidUtf8,
        offset: e.valid_up_to(),
    })?;

    let mut scanner = Scanner::new(text);
    let mut state = State::ExpectName;

    loop {
        let expected = state.expected();
        let (offset, token) = scanner.next_token(expected)?;
        let fail = |kind| -> Result<(), ParseError> { Err(ParseError { kind, offset }) };

        state = match (state, token) {
            (State::ExpectName, Token::Eof) => return Ok(()),
            (State::ExpectName, Token::Name(key)) => State::ExpectEquals(key),
            (State::ExpectEquals(_), Token::Eof) => return fail(ParseErrorKind::Truncated),
            (State::ExpectEquals(key), Token::Equals) => State::ExpectValue(key),
            (State::ExpectValue(key), Token::Value(value)) => {
                if store.is_defined(key) && !allow_overwrite {
                    return fail(ParseErrorKind::DuplicateAttribute(key));
                }
                store.set(key, value);
                State::ExpectName
            }
            _ => return fail(ParseErrorKind::UnexpectedToken { expected }),
        };
    }
}

// ───────────────────────────────────────────────────────────────
// Source merging
// ───────────────────────────────────────────────────────────────

/// What happened to one configuration source during a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    /// Medium absent or no config file on it.
    Missing,
    /// File present but could not be read.
    Unreadable(StorageError),
    /// File present but malformed.
    Invalid(ParseError),
    Parsed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    pub primary: SourceStatus,
    pub secondary: SourceStatus,
}

impl MergeOutcome {
    /// Neither source exists; the store holds compiled defaults only.
    pub fn is_defaults_only(&self) -> bool {
        self.primary == SourceStatus::Missing && self.secondary == SourceStatus::Missing
    }

    fn any_parsed(&self) -> bool {
        self.primary == SourceStatus::Parsed || self.secondary == SourceStatus::Parsed
    }
}

fn load_source(
    store: &mut ConfigStore,
    source: &dyn PersistentStore,
    allow_overwrite: bool,
    label: &str,
) -> SourceStatus {
    if !source.is_available() {
        info!("Config: {label} storage not available");
        return SourceStatus::Missing;
    }

    let mut text = match source.read_file(CONFIG_FILE) {
        Ok(bytes) => bytes,
        Err(StorageError::NotFound | StorageError::Unavailable) => {
            info!("Config: no {CONFIG_FILE} on {label} storage");
            return SourceStatus::Missing;
        }
        Err(e) => {
            warn!("Config: reading {label} {CONFIG_FILE} failed: {e}");
            return SourceStatus::Unreadable(e);
        }
    };

    // The override file is often hand-edited without a final newline.
    if allow_overwrite {
        text.push(b'\n');
    }

    match parse(store, &text, allow_overwrite) {
        Ok(()) => {
            info!("Config: {label} {CONFIG_FILE} applied");
            SourceStatus::Parsed
        }
        Err(e) => {
            warn!("Config: {label} {CONFIG_FILE} invalid: {e}");
            SourceStatus::Invalid(e)
        }
    }
}

/// Rebuild `store` from the primary source and an optional override.
///
/// The primary file is parsed first with first-writer-wins semantics, the
/// override second with overwrite allowed. The merge succeeds if either
/// file parsed, or if neither exists (defaults only). A file that exists
/// but fails to parse, with no other valid file, is
/// [`ConfigError::NoValidSource`].
pub fn merge_config(
    store: &mut ConfigStore,
    primary: &dyn PersistentStore,
    secondary: Option<&dyn PersistentStore>,
) -> Result<MergeOutcome, ConfigError> {
    store.reset();

    let outcome = MergeOutcome {
        primary: load_source(store, primary, false, "primary"),
        secondary: secondary.map_or(SourceStatus::Missing, |s| {
            load_source(store, s, true, "override")
        }),
    };

    if outcome.any_parsed() {
        Ok(outcome)
    } else if outcome.is_defaults_only() {
        warn!("Config: no configuration found, running on compiled defaults");
        Ok(outcome)
    } else {
        Err(ConfigError::NoValidSource)
    }
}

/// Persist the full configuration to `target`.
pub fn write_config(store: &ConfigStore, target: &mut dyn PersistentStore) -> Result<(), ConfigError> {
    target.write_file(CONFIG_FILE, store.serialize(false).as_bytes())?;
    info!("Config: written to {CONFIG_FILE}");
    Ok(())
}

/// Delete the configuration file from `target`. A missing file is fine.
pub fn factory_reset(target: &mut dyn PersistentStore) -> Result<(), StorageError> {
    match target.delete_file(CONFIG_FILE) {
        Ok(()) | Err(StorageError::NotFound) => {
            warn!("Config: {CONFIG_FILE} deleted, defaults apply on next boot");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::MemoryStore;

    fn parsed(text: &str) -> ConfigStore {
        let mut store = ConfigStore::new();
        parse(&mut store, text.as_bytes(), false).unwrap();
        store
    }

    #[test]
    fn parses_simple_lines() {
        let store = parsed("WIFISSID=home\nWIFIPASSWORD=secret\n");
        assert_eq!(store.get(ConfigKey::WifiSsid), "home");
        assert_eq!(store.get(ConfigKey::WifiPassword), "secret");
        assert!(!store.is_defined(ConfigKey::BrokerName));
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let store = parsed("# header\n\n   \r\nSTREAMRATE=1000\n# trailer");
        assert_eq!(store.get(ConfigKey::StreamRate), "1000");
    }

    #[test]
    fn trailing_comment_is_ignored() {
        let store = parsed("MQTTANONYMOUS=FALSE #not used by the cloud\nGYRO=FALSE\n");
        assert_eq!(store.get(ConfigKey::MqttAnonymous), "FALSE");
        assert_eq!(store.get(ConfigKey::Gyro), "FALSE");
    }

    #[test]
    fn hash_inside_value_is_kept() {
        let store = parsed("WIFIPASSWORD=pa#ss\n");
        assert_eq!(store.get(ConfigKey::WifiPassword), "pa#ss");
    }

    #[test]
    fn value_keeps_inner_spaces_and_drops_trailing() {
        let store = parsed("WIFISSID =  My Home Net  \r\n");
        assert_eq!(store.get(ConfigKey::WifiSsid), "My Home Net");
    }

    #[test]
    fn empty_value_is_defined() {
        let store = parsed("SNTPNAME=\nSNTPPORT=99\n");
        assert!(store.is_defined(ConfigKey::SntpName));
        assert_eq!(store.get(ConfigKey::SntpName), "");
        assert_eq!(store.get(ConfigKey::SntpPort), "99");
    }

    #[test]
    fn empty_value_at_end_of_buffer() {
        let store = parsed("FIRMWAREURL=");
        assert!(store.is_defined(ConfigKey::FirmwareUrl));
    }

    #[test]
    fn value_may_spell_a_key() {
        let store = parsed("WIFISSID=MAG\n");
        assert_eq!(store.get(ConfigKey::WifiSsid), "MAG");
    }

    #[test]
    fn unknown_name_is_rejected() {
        let mut store = ConfigStore::new();
        let err = parse(&mut store, b"WIFISSID=a\nBOGUS=1\n", false).unwrap_err();
        assert_eq!(
            err.kind,
            ParseErrorKind::UnexpectedToken {
                expected: Expected::AttributeName
            }
        );
        assert_eq!(err.offset, 11);
        assert_eq!(store.get(ConfigKey::WifiSsid), "a");
    }

    #[test]
    fn missing_equals_is_rejected() {
        let mut store = ConfigStore::new();
        let err = parse(&mut store, b"WIFISSID home\n", false).unwrap_err();
        assert_eq!(
            err.kind,
            ParseErrorKind::UnexpectedToken {
                expected: Expected::Equals
            }
        );
    }

    #[test]
    fn name_at_end_of_buffer_is_truncated() {
        let mut store = ConfigStore::new();
        let err = parse(&mut store, b"WIFISSID", false).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Truncated);
    }

    #[test]
    fn duplicate_without_overwrite_keeps_first() {
        let mut store = ConfigStore::new();
        let err = parse(&mut store, b"WIFISSID=a\nWIFISSID=b\n", false).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::DuplicateAttribute(ConfigKey::WifiSsid));
        assert_eq!(store.get(ConfigKey::WifiSsid), "a");
    }

    #[test]
    fn duplicate_with_overwrite_takes_last() {
        let mut store = ConfigStore::new();
        parse(&mut store, b"WIFISSID=a\nWIFISSID=b\n", true).unwrap();
        assert_eq!(store.get(ConfigKey::WifiSsid), "b");
    }

    #[test]
    fn overlong_value_is_rejected() {
        let mut store = ConfigStore::new();
        let text = format!("WIFISSID={}\n", "x".repeat(MAX_VALUE_LEN + 1));
        let err = parse(&mut store, text.as_bytes(), false).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::ValueTooLong);
        assert_eq!(err.offset, 9);
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let mut store = ConfigStore::new();
        let err = parse(&mut store, b"WIFISSID=\xff\n", false).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidUtf8);
        assert_eq!(err.offset, 9);
    }

    #[test]
    fn serialize_round_trips_parsed_values() {
        let store = parsed("WIFISSID=lab\nSTREAMRATE=250\nNOISE=TRUE\n");
        let mut again = ConfigStore::new();
        parse(&mut again, store.serialize(false).as_bytes(), false).unwrap();
        for key in ConfigKey::ALL {
            assert_eq!(again.get(key), store.get(key), "{}", key.name());
        }
    }

    #[test]
    fn merge_override_wins() {
        let primary = MemoryStore::with_file(CONFIG_FILE, b"WIFISSID=a\nSTREAMRATE=100\n");
        let secondary = MemoryStore::with_file(CONFIG_FILE, b"WIFISSID=b");
        let mut store = ConfigStore::new();
        let outcome = merge_config(&mut store, &primary, Some(&secondary)).unwrap();
        assert_eq!(outcome.primary, SourceStatus::Parsed);
        assert_eq!(outcome.secondary, SourceStatus::Parsed);
        assert_eq!(store.get(ConfigKey::WifiSsid), "b");
        assert_eq!(store.get(ConfigKey::StreamRate), "100");
    }

    #[test]
    fn merge_accepts_one_valid_source() {
        let primary = MemoryStore::with_file(CONFIG_FILE, b"NOT A CONFIG\n");
        let secondary = MemoryStore::with_file(CONFIG_FILE, b"WIFISSID=b\n");
        let mut store = ConfigStore::new();
        let outcome = merge_config(&mut store, &primary, Some(&secondary)).unwrap();
        assert!(matches!(outcome.primary, SourceStatus::Invalid(_)));
        assert_eq!(store.get(ConfigKey::WifiSsid), "b");
    }

    #[test]
    fn merge_without_any_file_uses_defaults() {
        let primary = MemoryStore::new();
        let mut store = ConfigStore::new();
        store.set(ConfigKey::WifiSsid, "stale");
        let outcome = merge_config(&mut store, &primary, None).unwrap();
        assert!(outcome.is_defaults_only());
        assert_eq!(store.get(ConfigKey::WifiSsid), "TBD");
    }

    #[test]
    fn merge_with_only_invalid_source_fails() {
        let primary = MemoryStore::with_file(CONFIG_FILE, b"WIFISSID\n=\n=");
        let mut store = ConfigStore::new();
        assert_eq!(
            merge_config(&mut store, &primary, None),
            Err(ConfigError::NoValidSource)
        );
    }

    #[test]
    fn merge_skips_unavailable_override() {
        let primary = MemoryStore::with_file(CONFIG_FILE, b"WIFISSID=a\n");
        let mut sd = MemoryStore::with_file(CONFIG_FILE, b"WIFISSID=b\n");
        sd.set_available(false);
        let mut store = ConfigStore::new();
        let outcome = merge_config(&mut store, &primary, Some(&sd)).unwrap();
        assert_eq!(outcome.secondary, SourceStatus::Missing);
        assert_eq!(store.get(ConfigKey::WifiSsid), "a");
    }

    #[test]
    fn write_then_merge_restores_values() {
        let mut flash = MemoryStore::new();
        let mut store = ConfigStore::new();
        store.set(ConfigKey::MqttUser, "t1/dev");
        write_config(&store, &mut flash).unwrap();

        let mut loaded = ConfigStore::new();
        merge_config(&mut loaded, &flash, None).unwrap();
        assert_eq!(loaded.get(ConfigKey::MqttUser), "t1/dev");
    }

    #[test]
    fn factory_reset_removes_file_and_tolerates_missing() {
        let mut flash = MemoryStore::with_file(CONFIG_FILE, b"WIFISSID=a\n");
        factory_reset(&mut flash).unwrap();
        assert_eq!(flash.read_file(CONFIG_FILE), Err(StorageError::NotFound));
        factory_reset(&mut flash).unwrap();
    }
}
