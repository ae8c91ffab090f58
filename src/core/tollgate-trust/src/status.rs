//! Live connection table from the daemon's status report.
//!
//! The report carries a `CLIENT_LIST` marker line, one line per connected
//! client whose first comma-separated field is the identity name, and a
//! `ROUTING_TABLE` marker that ends the section.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::TrustError;

const CLIENT_LIST_MARKER: &str = "CLIENT_LIST";
const ROUTING_TABLE_MARKER: &str = "ROUTING_TABLE";

/// Names connected at the moment the report was read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    names: BTreeSet<String>,
}

impl ConnectionSnapshot {
    /// Whether `name` is connected.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Number of connected names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when nobody is connected.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Connected names, sorted.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// The underlying set.
    pub fn into_names(self) -> BTreeSet<String> {
        self.names
    }
}

impl FromIterator<String> for ConnectionSnapshot {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().collect(),
        }
    }
}

/// Parses a status report.
pub fn parse_status_report(text: &str) -> ConnectionSnapshot {
    let mut capturing = false;
    let mut names = BTreeSet::new();
    for line in text.lines() {
        if line.starts_with(CLIENT_LIST_MARKER) {
            capturing = true;
            continue;
        }
        if line.starts_with(ROUTING_TABLE_MARKER) {
            break;
        }
        if capturing {
            let name = line.split(',').next().unwrap_or_default().trim();
            if !name.is_empty() {
                names.insert(name.to_string());
            }
        }
    }
    ConnectionSnapshot { names }
}

/// Read-only view of the daemon's status report.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    report: PathBuf,
}

impl ConnectionTracker {
    /// Tracker reading `report`.
    pub fn new(report: impl Into<PathBuf>) -> Self {
        Self {
            report: report.into(),
        }
    }

    /// The report path.
    pub fn report(&self) -> &Path {
        &self.report
    }

    /// Rebuilds the snapshot; a missing report means nobody is connected.
    pub fn currently_connected(&self) -> Result<ConnectionSnapshot, TrustError> {
        match std::fs::read(&self.report) {
            Ok(bytes) => Ok(parse_status_report(&String::from_utf8_lossy(&bytes))),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(report = %self.report.display(), "No status report yet");
                Ok(ConnectionSnapshot::default())
            },
            Err(source) => Err(TrustError::StatusReport {
                path: self.report.clone(),
                source,
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_client_list_section() {
        let report = "CLIENT_LIST\n\
                      a,1.2.3.4:50000,1024,2048,2025-03-01 10:00:00\n\
                      b,5.6.7.8:50001,10,20,2025-03-01 10:05:00\n\
                      ROUTING_TABLE\n\
                      10.8.0.2,c,1.1.1.1:1,2025-03-01\n";
        let snapshot = parse_status_report(report);
        let names: Vec<&str> = snapshot.iter().collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_lines_before_marker_are_ignored() {
        let report = "TITLE,OpenVPN 2.6\nTIME,now\nCLIENT_LIST\nalice,1.2.3.4\n";
        let snapshot = parse_status_report(report);
        assert!(snapshot.contains("alice"));
        assert!(!snapshot.contains("TITLE"));
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_no_marker_means_nobody() {
        assert!(parse_status_report("alice,1.2.3.4\nROUTING_TABLE\n").is_empty());
        assert!(parse_status_report("").is_empty());
    }

    #[test]
    fn test_crlf_report() {
        let snapshot = parse_status_report("CLIENT_LIST\r\nalice,1.2.3.4\r\nROUTING_TABLE\r\n");
        assert!(snapshot.contains("alice"));
    }

    #[test]
    fn test_missing_report_is_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let tracker = ConnectionTracker::new(tmp.path().join("openvpn-status.log"));
        assert!(tracker.currently_connected().unwrap().is_empty());
    }

    #[test]
    fn test_reads_report_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("openvpn-status.log");
        std::fs::write(&path, "CLIENT_LIST\nclient_1,9.9.9.9\nROUTING_TABLE\n").unwrap();

        let snapshot = ConnectionTracker::new(&path).currently_connected().unwrap();
        assert!(snapshot.contains("client_1"));
    }

    #[test]
    fn test_unreadable_report_is_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        // A directory cannot be read as a file.
        let tracker = ConnectionTracker::new(tmp.path());
        assert!(matches!(
            tracker.currently_connected(),
            Err(TrustError::StatusReport { .. })
        ));
    }
}
