//! Gateway status board and status page rendering
//!
//! Collects what a status page shows about the link: the last received
//! payload as text, delivery and timeout counters, the device address and a
//! fixed-size circular log. Nothing here depends on link internals.

use crate::config::status::{ADDRESS_LEN, LAST_PAYLOAD_LEN, LOG_LINES, LOG_LINE_LEN, REFRESH_SECONDS};
use core::fmt::{self, Write};
use heapless::String;

/// One log line
pub type LogLine = String<LOG_LINE_LEN>;

/// Fixed-size circular log, oldest lines overwritten first
pub struct LogRing {
    lines: [Option<LogLine>; LOG_LINES],
    /// Slot the next line is written to; also the oldest line once full
    next: usize,
}

impl LogRing {
    pub fn new() -> Self {
        Self {
            lines: core::array::from_fn(|_| None),
            next: 0,
        }
    }

    /// Append a line, truncating it to the line length
    pub fn push(&mut self, text: &str) {
        self.lines[self.next] = Some(truncate(text));
        self.next = (self.next + 1) % LOG_LINES;
    }

    /// Append a formatted line
    pub fn push_fmt(&mut self, args: fmt::Arguments) {
        let mut line = LogLine::new();
        // Overflow only truncates
        let _ = line.write_fmt(args);
        self.lines[self.next] = Some(line);
        self.next = (self.next + 1) % LOG_LINES;
    }

    /// Lines from oldest to newest, skipping empty slots
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        (0..LOG_LINES)
            .map(move |offset| &self.lines[(self.next + offset) % LOG_LINES])
            .filter_map(|slot| slot.as_deref())
    }

    pub fn len(&self) -> usize {
        self.lines.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LogRing {
    fn default() -> Self {
        Self::new()
    }
}

/// Longest prefix of `text` that fits a line, cut on a char boundary
fn truncate<const N: usize>(text: &str) -> String<N> {
    let mut out = String::new();
    for c in text.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

/// Everything the status page shows
pub struct StatusBoard {
    address: String<ADDRESS_LEN>,
    last_payload: String<LAST_PAYLOAD_LEN>,
    received_ok: u32,
    timeouts: u32,
    log: LogRing,
}

impl StatusBoard {
    pub fn new(address: &str) -> Self {
        Self {
            address: truncate(address),
            last_payload: String::new(),
            received_ok: 0,
            timeouts: 0,
            log: LogRing::new(),
        }
    }

    /// Record a delivered payload. Invalid UTF-8 is shown as `?`.
    pub fn record_received(&mut self, payload: &[u8]) {
        self.received_ok = self.received_ok.wrapping_add(1);
        self.last_payload.clear();

        let mut rest = payload;
        while !rest.is_empty() {
            let (valid, skip) = match core::str::from_utf8(rest) {
                Ok(text) => (text, rest.len()),
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    let text = core::str::from_utf8(&rest[..valid_up_to]).unwrap_or_default();
                    let bad = e.error_len().unwrap_or(rest.len() - valid_up_to);
                    (text, valid_up_to + bad)
                }
            };

            for c in valid.chars() {
                if self.last_payload.push(c).is_err() {
                    return;
                }
            }
            if skip > valid.len() && self.last_payload.push('?').is_err() {
                return;
            }
            rest = &rest[skip..];
        }
    }

    pub fn record_timeout(&mut self) {
        self.timeouts = self.timeouts.wrapping_add(1);
    }

    pub fn log(&mut self) -> &mut LogRing {
        &mut self.log
    }

    pub fn last_payload(&self) -> &str {
        &self.last_payload
    }

    pub fn received_ok(&self) -> u32 {
        self.received_ok
    }

    pub fn timeouts(&self) -> u32 {
        self.timeouts
    }

    /// Write a complete HTTP response carrying the status page.
    ///
    /// `heading` is the caller's one-line status, e.g. "Listening" or
    /// "Waiting for init".
    pub fn render<W: Write>(&self, heading: &str, out: &mut W) -> fmt::Result {
        out.write_str("HTTP/1.1 200 OK\r\n")?;
        out.write_str("Content-Type: text/html; charset=utf-8\r\n")?;
        out.write_str("Cache-Control: no-store\r\n")?;
        out.write_str("Connection: close\r\n\r\n")?;

        out.write_str("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">")?;
        write!(
            out,
            "<meta http-equiv=\"refresh\" content=\"{}\">",
            REFRESH_SECONDS
        )?;
        out.write_str("<title>LoRa gateway</title></head>\n<body>\n<h1>")?;
        write_escaped(out, heading)?;
        out.write_str("</h1>\n")?;
        out.write_str("<p>Address: ")?;
        write_escaped(out, &self.address)?;
        out.write_str("</p>\n<p>Last message: ")?;
        write_escaped(out, &self.last_payload)?;
        write!(
            out,
            "</p>\n<p>Received OK: {}</p>\n<p>Timeouts: {}</p>\n",
            self.received_ok, self.timeouts
        )?;

        out.write_str("<h2>Log</h2>\n<ul>\n")?;
        for line in self.log.iter() {
            out.write_str("<li>")?;
            write_escaped(out, line)?;
            out.write_str("</li>\n")?;
        }
        out.write_str("</ul>\n</body></html>\n")
    }
}

fn write_escaped<W: Write>(out: &mut W, text: &str) -> fmt::Result {
    for c in text.chars() {
        match c {
            '<' => out.write_str("&lt;")?,
            '>' => out.write_str("&gt;")?,
            '&' => out.write_str("&amp;")?,
            '"' => out.write_str("&quot;")?,
            _ => out.write_char(c)?,
        }
    }
    Ok(())
}
