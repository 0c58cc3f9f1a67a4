//! Line protocol for power and key events.
//!
//! ```text
//! screen_on [ms]
//! down <key> [ms]
//! up <key> [ms]
//! ```
//!
//! `<key>` is `volume_up`, `volume_down` or a platform key code. Lines without
//! a timestamp are stamped from the daemon's monotonic clock.

use std::time::Instant;

use shared::domain::{KeyCode, KeyEvent, UnknownKey};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    ScreenOn { at_ms: u64 },
    Key(KeyEvent),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown event '{0}'")]
    UnknownEvent(String),
    #[error("missing key after '{0}'")]
    MissingKey(String),
    #[error(transparent)]
    UnknownKey(#[from] UnknownKey),
    #[error("invalid timestamp '{0}'")]
    BadTimestamp(String),
    #[error("unexpected trailing input '{0}'")]
    Trailing(String),
}

pub struct MonotonicClock {
    started: Instant,
}

impl MonotonicClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Blank lines and `#` comments yield `Ok(None)`.
pub fn parse_line(line: &str, now_ms: u64) -> Result<Option<InputEvent>, ParseError> {
    let line = line.split('#').next().unwrap_or_default().trim();
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        return Ok(None);
    };

    let event = match command.to_ascii_lowercase().as_str() {
        "screen_on" | "screen-on" => InputEvent::ScreenOn {
            at_ms: parse_timestamp(parts.next(), now_ms)?,
        },
        "down" | "up" => {
            let key: KeyCode = parts
                .next()
                .ok_or_else(|| ParseError::MissingKey(command.to_string()))?
                .parse()?;
            let at_ms = parse_timestamp(parts.next(), now_ms)?;
            InputEvent::Key(if command.eq_ignore_ascii_case("down") {
                KeyEvent::down(key, at_ms)
            } else {
                KeyEvent::up(key, at_ms)
            })
        }
        _ => return Err(ParseError::UnknownEvent(command.to_string())),
    };

    if let Some(extra) = parts.next() {
        return Err(ParseError::Trailing(extra.to_string()));
    }
    Ok(Some(event))
}

fn parse_timestamp(raw: Option<&str>, now_ms: u64) -> Result<u64, ParseError> {
    match raw {
        Some(raw) => raw
            .parse()
            .map_err(|_| ParseError::BadTimestamp(raw.to_string())),
        None => Ok(now_ms),
    }
}
