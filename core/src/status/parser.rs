//! Parse the OpenVPN status log (version 1 layout).
//!
//! ```text
//! OpenVPN CLIENT LIST
//! Updated,2023-05-01 10:00:00
//! Common Name,Real Address,Bytes Received,Bytes Sent,Connected Since
//! alice,203.0.113.7:51234,2200,1500,2023-05-01 09:00:00
//! ROUTING TABLE
//! Virtual Address,Common Name,Real Address,Last Ref
//! 10.8.0.6,alice,203.0.113.7:51234,2023-05-01 09:59:58
//! GLOBAL STATS
//! Max bcast/mcast queue length,0
//! END
//! ```
//!
//! The parser is a forward-only state machine. A malformed record stops the
//! parse: the records accumulated before the faulting line are returned and
//! the fault is logged, so a corrupt or truncated log never takes down the
//! caller.

use std::io::BufRead;

use tracing::{debug, error};

use super::timestamp::{parse_timestamp, zero_timestamp};
use super::types::{ClientSession, RoutingEntry, Snapshot};
use crate::errors::ParseError;

const ROUTING_TABLE_SENTINEL: &str = "ROUTING TABLE";
const GLOBAL_STATS_SENTINEL: &str = "GLOBAL STATS";
const CLIENT_COLUMNS_PREFIX: &str = "Common Name";
const ROUTE_COLUMNS_PREFIX: &str = "Virtual Address";

const CLIENT_FIELDS: usize = 5;
const ROUTE_FIELDS: usize = 4;

/// The first fault hit while parsing, with its 1-based line number.
#[derive(Debug)]
pub struct ParseFault {
    pub line: usize,
    pub error: ParseError,
}

/// A parsed snapshot plus the fault that cut the parse short, if any.
#[derive(Debug)]
pub struct ParseReport {
    pub snapshot: Snapshot,
    pub fault: Option<ParseFault>,
}

/// Parse a status log, absorbing any fault.
///
/// On corruption this returns whatever was parsed before the faulting line
/// (possibly nothing) after logging the fault.
pub fn parse_status_log<R: BufRead>(reader: R) -> Snapshot {
    parse_status_log_report(reader).snapshot
}

/// Parse a status log and also report the fault that stopped it, if any.
pub fn parse_status_log_report<R: BufRead>(reader: R) -> ParseReport {
    let mut parser = StatusLogParser::new();

    for (index, chunk) in reader.split(b'\n').enumerate() {
        let line_no = index + 1;
        let result = chunk
            .map_err(ParseError::from)
            .and_then(|bytes| parser.feed(&decode_line(&bytes)));

        if let Err(error) = result {
            error!(
                "OpenVPN status log is corrupt at line {}: {}",
                line_no, error
            );
            return parser.finish(Some(ParseFault {
                line: line_no,
                error,
            }));
        }

        if parser.stage == Stage::Done {
            break;
        }
    }

    parser.finish(None)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    ReadHeader,
    ReadClients,
    ReadRoutes,
    Done,
}

struct StatusLogParser {
    stage: Stage,
    clients: Vec<ClientSession>,
    routes: Vec<RoutingEntry>,
    generated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl StatusLogParser {
    fn new() -> Self {
        Self {
            stage: Stage::ReadHeader,
            clients: Vec::new(),
            routes: Vec::new(),
            generated_at: None,
        }
    }

    fn feed(&mut self, line: &str) -> Result<(), ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }

        match self.stage {
            Stage::ReadHeader => {
                if line.contains(ROUTING_TABLE_SENTINEL) {
                    // No header and no client section.
                    self.stage = Stage::ReadRoutes;
                } else if line.contains(GLOBAL_STATS_SENTINEL) {
                    self.stage = Stage::Done;
                } else if line.starts_with(CLIENT_COLUMNS_PREFIX) {
                    // No header line at all; the client list starts here.
                    self.stage = Stage::ReadClients;
                } else if line.contains(',') {
                    self.generated_at = Some(parse_header(line));
                    self.stage = Stage::ReadClients;
                }
                // Anything else is the "OpenVPN CLIENT LIST" title.
            }
            Stage::ReadClients => {
                if line.contains(ROUTING_TABLE_SENTINEL) {
                    self.stage = Stage::ReadRoutes;
                } else if line.contains(GLOBAL_STATS_SENTINEL) {
                    debug!("Status log has no routing table section");
                    self.stage = Stage::Done;
                } else if !line.starts_with(CLIENT_COLUMNS_PREFIX) {
                    self.clients.push(parse_client_line(line)?);
                }
            }
            Stage::ReadRoutes => {
                if line.contains(GLOBAL_STATS_SENTINEL) {
                    self.stage = Stage::Done;
                } else if !line.starts_with(ROUTE_COLUMNS_PREFIX) {
                    self.routes.push(parse_route_line(line)?);
                }
            }
            Stage::Done => {}
        }

        Ok(())
    }

    fn finish(self, fault: Option<ParseFault>) -> ParseReport {
        ParseReport {
            snapshot: Snapshot {
                clients: self.clients,
                routes: self.routes,
                generated_at: self.generated_at.unwrap_or_else(zero_timestamp),
            },
            fault,
        }
    }
}

/// Strip the line terminator and decode, replacing invalid UTF-8.
fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

fn split_fields(line: &str) -> Vec<&str> {
    line.split(',').map(str::trim).collect()
}

/// Parse the `Updated,<timestamp>` header line.
fn parse_header(line: &str) -> chrono::DateTime<chrono::Utc> {
    split_fields(line)
        .get(1)
        .map(|raw| parse_timestamp(raw))
        .unwrap_or_else(zero_timestamp)
}

/// Parse one `CLIENT LIST` record:
/// `common_name,real_address,bytes_received,bytes_sent,connected_since`.
pub fn parse_client_line(line: &str) -> Result<ClientSession, ParseError> {
    let fields = split_fields(line);
    if fields.len() != CLIENT_FIELDS {
        return Err(ParseError::FieldCount {
            section: "client",
            expected: CLIENT_FIELDS,
            found: fields.len(),
        });
    }

    Ok(ClientSession {
        common_name: fields[0].to_string(),
        real_address: fields[1].to_string(),
        bytes_received: parse_counter("bytes_received", fields[2])?,
        bytes_sent: parse_counter("bytes_sent", fields[3])?,
        connected_since: parse_timestamp(fields[4]),
    })
}

/// Parse one `ROUTING TABLE` record:
/// `virtual_address,common_name,real_address,last_ref`.
pub fn parse_route_line(line: &str) -> Result<RoutingEntry, ParseError> {
    let fields = split_fields(line);
    if fields.len() != ROUTE_FIELDS {
        return Err(ParseError::FieldCount {
            section: "route",
            expected: ROUTE_FIELDS,
            found: fields.len(),
        });
    }

    Ok(RoutingEntry {
        virtual_address: fields[0].to_string(),
        common_name: fields[1].to_string(),
        real_address: fields[2].to_string(),
        last_ref: parse_timestamp(fields[3]),
    })
}

/// Parse an unsigned counter. The base is taken from the literal's prefix:
/// `0x` hex, `0o` or a bare leading `0` octal, `0b` binary, else decimal.
pub fn parse_counter(field: &'static str, value: &str) -> Result<u64, ParseError> {
    let invalid = || ParseError::InvalidNumber {
        field,
        value: value.to_string(),
    };

    let (digits, radix) = if let Some(rest) = strip_prefix_ci(value, "0x") {
        (rest, 16)
    } else if let Some(rest) = strip_prefix_ci(value, "0o") {
        (rest, 8)
    } else if let Some(rest) = strip_prefix_ci(value, "0b") {
        (rest, 2)
    } else if value.len() > 1 && value.starts_with('0') {
        (&value[1..], 8)
    } else {
        (value, 10)
    };

    // from_str_radix would accept a leading '+'
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(invalid());
    }

    u64::from_str_radix(digits, radix).map_err(|_| invalid())
}

fn strip_prefix_ci<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        value.get(prefix.len()..)
    } else {
        None
    }
}
