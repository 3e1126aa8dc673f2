use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static COPS_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""([^"]+)","([^"]+)","([^"]+)",(\d+)"#)
        .expect("hardcoded regex is valid")
});

/// Identity and registration details of the modem and its SIM.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModemInfo {
    pub model: String,
    pub firmware: String,
    pub imei: String,
    pub serial: String,
    pub sim_status: String,
    pub subscriber_number: String,
    pub registration: String,
    pub operator: String,
}

/// Queries backing each [`ModemInfo`] field, in field order.
pub const INFO_QUERIES: [&str; 8] = [
    "AT+CGMM", "AT+GMR", "AT+CGSN", "AT+GSN", "AT+CPIN?", "AT+CNUM", "AT+CREG?",
    "AT+COPS?",
];

impl ModemInfo {
    /// Builds from the cleaned responses to [`INFO_QUERIES`], in the same order.
    pub fn from_responses(responses: [String; 8]) -> Self {
        let [
            model,
            firmware,
            imei,
            serial,
            sim_status,
            subscriber_number,
            registration,
            operator,
        ] = std::array::from_fn(|i| clean_field(INFO_QUERIES[i], &responses[i]));

        Self {
            model,
            firmware,
            imei,
            serial,
            sim_status,
            subscriber_number,
            registration,
            operator,
        }
    }
}

/// Strips line breaks, the `+CMD: ` prefix, quotes and the trailing `OK` off a
/// single-value response.
pub fn clean_field(command: &str, response: &str) -> String {
    let name = command.trim_start_matches("AT").trim_end_matches('?');
    let prefix = format!("{name}: ");

    let body = response
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && *line != "OK")
        .collect::<Vec<_>>()
        .join(" ");

    body.replace(&prefix, "").replace('"', "").trim().to_owned()
}

/// A network found by `AT+COPS=?`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperatorEntry {
    pub name: String,
    /// Numeric MCC/MNC, `"0"` for automatic selection.
    pub id: String,
}

impl OperatorEntry {
    pub fn automatic() -> Self {
        Self {
            name: "Automatic".into(),
            id: "0".into(),
        }
    }
}

/// Parses the `("long","short","numeric",act)` tuples of an operator scan. The
/// automatic choice always comes first.
pub fn parse_operator_list(response: &str) -> Vec<OperatorEntry> {
    let found = COPS_ENTRY.captures_iter(response).map(|caps| OperatorEntry {
        name: caps[1].to_owned(),
        id: caps[3].to_owned(),
    });

    std::iter::once(OperatorEntry::automatic())
        .chain(found)
        .collect()
}
