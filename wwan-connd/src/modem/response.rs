use regex::Regex;
use std::sync::LazyLock;

static QUOTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""([^"]+)""#).expect("hardcoded regex is valid")
});

/// Returned by `send_and_read` when the port could not be opened.
pub const NO_RESPONSE: &str = "<no response>";

/// Drops the command echo and blank lines from raw modem output.
pub fn clean_response(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("AT"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_owned()
}

/// First `"quoted"` substring, as found in `+COPS: 0,0,"Operator",7`.
pub fn first_quoted(s: &str) -> Option<&str> {
    QUOTED
        .captures(s)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}
