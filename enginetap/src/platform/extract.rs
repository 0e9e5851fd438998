//! Extraction of the user-visible part of sub-console output.
//!
//! A sub-console echoes its entry command, prints a divider line, echoes
//! each statement, and echoes the closing `end`. None of that is output
//! the user asked for. Each step below looks for one marker and is a
//! no-op when the marker is missing: truncated or partial output is
//! normal while streaming and never an error.

use log::trace;
use memchr::memmem;

use super::console::{ConsoleMarkers, ConsoleMode};

/// Strip sub-console banners, echo, and exit marker from `raw`.
///
/// Pure: identical inputs always give identical output. Plain mode
/// returns the input unchanged.
pub fn extract_interactive(raw: &str, command: &str, mode: ConsoleMode) -> String {
    let Some(markers) = mode.markers() else {
        return raw.to_string();
    };

    let mut text = raw;
    text = after_entry_banner(text, markers).unwrap_or_else(|| miss(markers, "entry banner", text));
    text = after_divider(text, markers).unwrap_or_else(|| miss(markers, "divider", text));
    text = after_echo(text, command).unwrap_or_else(|| miss(markers, "command echo", text));
    text = before_exit_marker(text, markers).unwrap_or_else(|| miss(markers, "exit marker", text));
    text.to_string()
}

/// The part of `extract_interactive(raw, ..)` that stays the same however
/// `raw` continues.
///
/// Used while a session is still producing output. Nothing is settled
/// until the entry banner and the whole divider line have arrived. After
/// that, an unfinished command echo, the rightmost exit marker onwards, and
/// a tail that could still grow into an exit marker are held back.
pub fn extract_settled(raw: &str, command: &str, mode: ConsoleMode) -> String {
    let Some(markers) = mode.markers() else {
        return raw.to_string();
    };

    let Some(rest) = after_entry_banner(raw, markers) else {
        return String::new();
    };
    let divider = markers.divider();
    let Some(start) = memmem::find(rest.as_bytes(), divider.as_bytes()) else {
        return String::new();
    };
    let line = &rest[start + divider.len()..];
    let Some(nl) = memchr::memchr(b'\n', line.as_bytes()) else {
        return String::new();
    };
    let rest = &line[nl + 1..];

    let body = if command.is_empty() {
        rest
    } else if rest.len() < command.len() && command.starts_with(rest) {
        return String::new();
    } else {
        match after_echo(rest, command) {
            Some("\r") => return String::new(),
            Some(after) => after,
            None => rest,
        }
    };

    if let Some(end) = before_exit_marker(body, markers) {
        return end.to_string();
    }

    let exit = markers.exit_marker;
    let held = (1..exit.len())
        .rev()
        .find(|&k| body.ends_with(&exit[..k]))
        .unwrap_or(0);
    body[..body.len() - held].to_string()
}

fn miss<'a>(markers: &ConsoleMarkers, what: &str, text: &'a str) -> &'a str {
    trace!("{}: no {} in {} bytes of output", markers.name, what, text.len());
    text
}

/// Text following the earliest entry banner.
fn after_entry_banner<'a>(text: &'a str, markers: &ConsoleMarkers) -> Option<&'a str> {
    markers
        .entry_banners
        .iter()
        .filter_map(|banner| {
            memmem::find(text.as_bytes(), banner.as_bytes()).map(|pos| pos + banner.len())
        })
        .min()
        .map(|end| &text[end..])
}

/// Text following the line that holds the divider.
fn after_divider<'a>(text: &'a str, markers: &ConsoleMarkers) -> Option<&'a str> {
    let divider = markers.divider();
    let start = memmem::find(text.as_bytes(), divider.as_bytes())?;
    let rest = &text[start + divider.len()..];
    match memchr::memchr(b'\n', rest.as_bytes()) {
        Some(nl) => Some(&rest[nl + 1..]),
        None => Some(""),
    }
}

/// Text following an echo of `command` at the very start, including the
/// line ending that closes the echoed line.
fn after_echo<'a>(text: &'a str, command: &str) -> Option<&'a str> {
    if command.is_empty() {
        return None;
    }
    let rest = text.strip_prefix(command)?;
    Some(
        rest.strip_prefix("\r\n")
            .or_else(|| rest.strip_prefix('\n'))
            .unwrap_or(rest),
    )
}

/// Text before the rightmost exit marker.
fn before_exit_marker<'a>(text: &'a str, markers: &ConsoleMarkers) -> Option<&'a str> {
    let pos = memmem::rfind(text.as_bytes(), markers.exit_marker.as_bytes())?;
    Some(&text[..pos])
}
