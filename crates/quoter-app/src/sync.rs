// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::Deserialize;

const DEFAULT_FAILURE_MESSAGE: &str = "unable to update the calculation totals";

/// JSON body returned by the totals update endpoint.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct TotalsResponse {
    pub result: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub overall_margin: Option<f64>,
    #[serde(default)]
    pub overall_below: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Completed(TotalsResponse),
    Failed(String),
    Aborted,
}

/// Authoritative totals as last reported by the server.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServerTotals {
    pub lines: Vec<String>,
    pub overall_margin: Option<f64>,
    pub overall_below: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTicket {
    pub request_id: u64,
    /// Request superseded by this one; its caller should abort it.
    pub aborted: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncApplied {
    Updated,
    Failed,
    Ignored,
}

/// Bookkeeping for the single outstanding totals request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncState {
    next_request_id: u64,
    in_flight: Option<u64>,
    read_only: bool,
    totals: Option<ServerTotals>,
    notification: Option<String>,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self) -> Option<u64> {
        self.in_flight
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn totals(&self) -> Option<&ServerTotals> {
        self.totals.as_ref()
    }

    pub fn notification(&self) -> Option<&str> {
        self.notification.as_deref()
    }

    /// Starts a new request, superseding any pending one.
    pub fn begin(&mut self) -> SyncTicket {
        self.next_request_id = self.next_request_id.saturating_add(1);
        if self.next_request_id == 0 {
            self.next_request_id = 1;
        }
        let aborted = self.in_flight.replace(self.next_request_id);
        SyncTicket {
            request_id: self.next_request_id,
            aborted,
        }
    }

    /// Drops the pending request without starting another.
    pub fn cancel(&mut self) -> Option<u64> {
        self.in_flight.take()
    }

    pub fn finish(&mut self, request_id: u64, outcome: SyncOutcome) -> SyncApplied {
        if self.in_flight != Some(request_id) {
            return SyncApplied::Ignored;
        }
        self.in_flight = None;

        match outcome {
            SyncOutcome::Aborted => SyncApplied::Ignored,
            SyncOutcome::Completed(response) if response.result => {
                self.totals = Some(ServerTotals {
                    lines: response
                        .body
                        .as_deref()
                        .map(html_to_lines)
                        .unwrap_or_default(),
                    overall_margin: response.overall_margin,
                    overall_below: response.overall_below.unwrap_or(false),
                });
                SyncApplied::Updated
            }
            SyncOutcome::Completed(response) => {
                let message = response
                    .message
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_owned());
                self.fail(message);
                SyncApplied::Failed
            }
            SyncOutcome::Failed(error) => {
                self.fail(format!("{DEFAULT_FAILURE_MESSAGE}: {error}"));
                SyncApplied::Failed
            }
        }
    }

    /// Closes the notification and re-enables editing.
    pub fn dismiss(&mut self) -> bool {
        let had_notification = self.notification.take().is_some();
        self.read_only = false;
        had_notification
    }

    fn fail(&mut self, message: String) {
        self.read_only = true;
        self.notification = Some(message);
    }
}

/// Reduces the server's totals HTML fragment to text lines, one per row or
/// block; table cells are separated by two spaces.
pub fn html_to_lines(html: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut chars = html.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '<' => {
                let mut tag = String::new();
                for inner in chars.by_ref() {
                    if inner == '>' {
                        break;
                    }
                    tag.push(inner);
                }
                let name = tag
                    .trim_start_matches('/')
                    .split(|c: char| c.is_whitespace() || c == '/')
                    .next()
                    .unwrap_or("")
                    .to_ascii_lowercase();
                match name.as_str() {
                    "br" | "tr" | "p" | "div" | "li" | "h1" | "h2" | "h3" | "h4" | "table"
                    | "thead" | "tbody" | "tfoot" => flush_line(&mut current, &mut lines),
                    "td" | "th" if tag.starts_with('/') => current.push_str("  "),
                    _ => {}
                }
            }
            '&' => {
                let mut entity = String::new();
                while let Some(&next) = chars.peek() {
                    if !(next.is_ascii_alphanumeric() || next == '#') || entity.len() > 8 {
                        break;
                    }
                    entity.push(next);
                    chars.next();
                }
                if chars.peek() == Some(&';') {
                    chars.next();
                    current.push_str(decode_entity(&entity));
                } else {
                    current.push('&');
                    current.push_str(&entity);
                }
            }
            _ => current.push(ch),
        }
    }
    flush_line(&mut current, &mut lines);
    lines
}

fn decode_entity(entity: &str) -> &str {
    match entity {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "#39" | "apos" => "'",
        "nbsp" | "#160" => " ",
        _ => "",
    }
}

// Double spaces separate cells; any other whitespace run collapses to one.
fn flush_line(current: &mut String, lines: &mut Vec<String>) {
    let line = current
        .split("  ")
        .map(|cell| cell.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|cell| !cell.is_empty())
        .collect::<Vec<_>>()
        .join("  ");
    if !line.is_empty() {
        lines.push(line);
    }
    current.clear();
}
