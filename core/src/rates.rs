//! Per-client transfer rates from consecutive snapshots.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::{ClientSession, Snapshot};

/// Current transfer rate of one connected client, in bytes per second.
///
/// `tx` is derived from the daemon's `bytes_sent` counter and `rx` from
/// `bytes_received`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedStat {
    pub common_name: String,
    pub tx: f64,
    pub rx: f64,
}

/// The outcome of diffing two snapshots.
#[derive(Debug, Clone, Default)]
pub struct RateUpdate {
    /// The new rate table, one entry per client in the current snapshot.
    pub stats: Vec<SpeedStat>,
    /// Clients of the previous snapshot that are gone, with their last
    /// known counters.
    pub disconnected: Vec<ClientSession>,
}

/// Seconds between two log timestamps, floored to one second when the
/// interval is zero or negative.
pub fn elapsed_seconds(previous: DateTime<Utc>, current: DateTime<Utc>) -> f64 {
    let millis = (current - previous).num_milliseconds();
    if millis <= 0 {
        1.0
    } else {
        millis as f64 / 1000.0
    }
}

/// Rate of one counter. A counter that went backwards (daemon restart)
/// is treated like a fresh one: its whole value accrued in this window.
fn counter_rate(previous: Option<u64>, current: u64, seconds: f64) -> f64 {
    let delta = previous
        .and_then(|p| current.checked_sub(p))
        .unwrap_or(current);
    delta as f64 / seconds
}

/// Compute the rate table for `current` against `previous`.
///
/// `table` is the rate table produced by the previous call; it only
/// determines ordering: surviving entries keep their relative order and
/// newly seen clients are appended in snapshot order.
pub fn compute_rates(previous: &Snapshot, current: &Snapshot, table: &[SpeedStat]) -> RateUpdate {
    let seconds = elapsed_seconds(previous.generated_at, current.generated_at);

    // Last occurrence wins for names listed more than once.
    let before: HashMap<&str, &ClientSession> = previous
        .clients
        .iter()
        .map(|c| (c.common_name.as_str(), c))
        .collect();
    let now: HashMap<&str, &ClientSession> = current
        .clients
        .iter()
        .map(|c| (c.common_name.as_str(), c))
        .collect();

    let rate_for = |session: &ClientSession| {
        let old = before.get(session.common_name.as_str());
        SpeedStat {
            common_name: session.common_name.clone(),
            tx: counter_rate(old.map(|o| o.bytes_sent), session.bytes_sent, seconds),
            rx: counter_rate(
                old.map(|o| o.bytes_received),
                session.bytes_received,
                seconds,
            ),
        }
    };

    let mut seen: HashSet<&str> = HashSet::with_capacity(now.len());
    let mut stats = Vec::with_capacity(now.len());

    for entry in table {
        if let Some(session) = now.get(entry.common_name.as_str()) {
            if seen.insert(session.common_name.as_str()) {
                stats.push(rate_for(*session));
            }
        }
    }
    for session in &current.clients {
        let name = session.common_name.as_str();
        if seen.insert(name) {
            // `now` holds the last line for this name
            stats.push(rate_for(now[name]));
        }
    }

    let mut gone: HashSet<&str> = HashSet::new();
    let disconnected = previous
        .clients
        .iter()
        .filter(|c| !now.contains_key(c.common_name.as_str()))
        .filter(|c| gone.insert(c.common_name.as_str()))
        .map(|c| (*before[c.common_name.as_str()]).clone())
        .collect();

    RateUpdate {
        stats,
        disconnected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_682_935_200 + secs, 0).unwrap()
    }

    fn client(name: &str, sent: u64, received: u64) -> ClientSession {
        ClientSession {
            common_name: name.to_string(),
            real_address: format!("198.51.100.1:{}", 40000 + name.len()),
            bytes_received: received,
            bytes_sent: sent,
            connected_since: at(-3600),
        }
    }

    fn snapshot(secs: i64, clients: Vec<ClientSession>) -> Snapshot {
        Snapshot {
            clients,
            routes: Vec::new(),
            generated_at: at(secs),
        }
    }

    fn names(stats: &[SpeedStat]) -> Vec<&str> {
        stats.iter().map(|s| s.common_name.as_str()).collect()
    }

    #[test]
    fn known_client_rate_from_delta() {
        let prev = snapshot(0, vec![client("A", 1000, 2000)]);
        let curr = snapshot(5, vec![client("A", 1500, 2200)]);
        let update = compute_rates(&prev, &curr, &[]);

        assert_eq!(update.stats.len(), 1);
        assert!((update.stats[0].tx - 100.0).abs() < 1e-9);
        assert!((update.stats[0].rx - 40.0).abs() < 1e-9);
        assert!(update.disconnected.is_empty());
    }

    #[test]
    fn new_client_rate_from_total() {
        let prev = snapshot(0, vec![]);
        let curr = snapshot(5, vec![client("B", 500, 250)]);
        let update = compute_rates(&prev, &curr, &[]);

        assert!((update.stats[0].tx - 100.0).abs() < 1e-9);
        assert!((update.stats[0].rx - 50.0).abs() < 1e-9);
    }

    #[test]
    fn counter_reset_uses_new_value() {
        let prev = snapshot(0, vec![client("A", 10_000, 10_000)]);
        let curr = snapshot(10, vec![client("A", 300, 20_000)]);
        let update = compute_rates(&prev, &curr, &[]);

        assert!((update.stats[0].tx - 30.0).abs() < 1e-9);
        assert!((update.stats[0].rx - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn non_positive_interval_floors_to_one_second() {
        assert_eq!(elapsed_seconds(at(5), at(5)), 1.0);
        assert_eq!(elapsed_seconds(at(5), at(2)), 1.0);
        assert_eq!(elapsed_seconds(at(0), at(3)), 3.0);

        let prev = snapshot(7, vec![client("A", 100, 100)]);
        let curr = snapshot(7, vec![client("A", 350, 100)]);
        let update = compute_rates(&prev, &curr, &[]);
        assert!((update.stats[0].tx - 250.0).abs() < 1e-9);
        assert_eq!(update.stats[0].rx, 0.0);
    }

    #[test]
    fn vanished_client_is_reported_once_with_last_counters() {
        let gone = client("A", 1234, 5678);
        let prev = snapshot(0, vec![gone.clone(), client("B", 1, 1)]);
        let curr = snapshot(5, vec![client("B", 6, 6)]);
        let table = vec![
            SpeedStat {
                common_name: "A".into(),
                tx: 1.0,
                rx: 1.0,
            },
            SpeedStat {
                common_name: "B".into(),
                tx: 1.0,
                rx: 1.0,
            },
        ];
        let update = compute_rates(&prev, &curr, &table);

        assert_eq!(update.disconnected, vec![gone]);
        assert_eq!(names(&update.stats), vec!["B"]);
    }

    #[test]
    fn table_keeps_survivor_order_and_appends_new() {
        let prev = snapshot(0, vec![client("C", 0, 0), client("A", 0, 0), client("X", 0, 0)]);
        let curr = snapshot(
            5,
            vec![client("D", 0, 0), client("A", 0, 0), client("C", 0, 0), client("E", 0, 0)],
        );
        let table: Vec<SpeedStat> = ["C", "X", "A"]
            .iter()
            .map(|n| SpeedStat {
                common_name: n.to_string(),
                tx: 0.0,
                rx: 0.0,
            })
            .collect();

        let update = compute_rates(&prev, &curr, &table);
        assert_eq!(names(&update.stats), vec!["C", "A", "D", "E"]);
        assert_eq!(update.disconnected.len(), 1);
        assert_eq!(update.disconnected[0].common_name, "X");
    }

    #[test]
    fn table_names_match_current_snapshot_exactly() {
        let prev = snapshot(0, vec![client("A", 0, 0), client("B", 0, 0)]);
        let curr = snapshot(5, vec![client("B", 10, 10), client("C", 10, 10)]);
        let stale = vec![SpeedStat {
            common_name: "Z".into(),
            tx: 9.0,
            rx: 9.0,
        }];

        let update = compute_rates(&prev, &curr, &stale);
        let mut got = names(&update.stats);
        got.sort();
        assert_eq!(got, vec!["B", "C"]);
    }

    #[test]
    fn duplicate_names_collapse_to_last_line() {
        let prev = snapshot(0, vec![client("A", 100, 0), client("A", 200, 0)]);
        let curr = snapshot(1, vec![client("A", 150, 0), client("A", 260, 0)]);
        let update = compute_rates(&prev, &curr, &[]);

        assert_eq!(update.stats.len(), 1);
        assert!((update.stats[0].tx - 60.0).abs() < 1e-9);
    }

    #[test]
    fn duplicate_vanished_name_reported_once() {
        let prev = snapshot(0, vec![client("A", 1, 0), client("A", 2, 0)]);
        let curr = snapshot(1, vec![]);
        let update = compute_rates(&prev, &curr, &[]);

        assert_eq!(update.disconnected.len(), 1);
        assert_eq!(update.disconnected[0].bytes_sent, 2);
        assert!(update.stats.is_empty());
    }
}
