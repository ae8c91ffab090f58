//! Reader for the easy-rsa `index.txt` ledger.
//!
//! Each line is tab-separated:
//! `status  expiry  revocation-date  serial  filename  distinguished-name`.
//! Lines with fewer than six fields are skipped.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;

use crate::error::PkiError;

/// Minimum number of tab-separated fields for a well-formed line.
const MIN_FIELDS: usize = 6;

/// Status flag of an index record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    /// `V`
    Valid,
    /// `R`
    Revoked,
    /// `E`
    Expired,
    /// Anything else the CA tool may write.
    Unknown(char),
}

impl RecordStatus {
    fn from_field(field: &str) -> Self {
        match field.chars().next() {
            Some('V') => RecordStatus::Valid,
            Some('R') => RecordStatus::Revoked,
            Some('E') => RecordStatus::Expired,
            Some(c) => RecordStatus::Unknown(c),
            None => RecordStatus::Unknown(' '),
        }
    }
}

/// One line of the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRecord {
    /// Status flag.
    pub status: RecordStatus,
    /// Expiry timestamp as written by the CA (`YYMMDDHHMMSSZ`).
    pub expires: String,
    /// Revocation timestamp, empty unless revoked.
    pub revoked_at: Option<String>,
    /// Hex serial.
    pub serial: String,
    /// Common name with any `CN=` / `/CN=` / leading `/` stripped.
    pub common_name: String,
}

impl IndexRecord {
    /// Parses one index line, `None` if malformed.
    pub fn parse_line(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.trim().split('\t').collect();
        if fields.len() < MIN_FIELDS {
            return None;
        }
        let revoked_at = Some(fields[2].trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Some(Self {
            status: RecordStatus::from_field(fields[0]),
            expires: fields[1].to_string(),
            revoked_at,
            serial: fields[3].to_string(),
            common_name: normalize_common_name(fields[5]).to_string(),
        })
    }
}

/// Strips the `/CN=` or `CN=` prefix, then any leading `/`.
pub fn normalize_common_name(dn: &str) -> &str {
    let cn = dn
        .strip_prefix("/CN=")
        .or_else(|| dn.strip_prefix("CN="))
        .unwrap_or(dn);
    cn.trim_start_matches('/')
}

/// Parsed snapshot of `index.txt`.
#[derive(Debug, Clone, Default)]
pub struct PkiIndex {
    records: Vec<IndexRecord>,
}

impl PkiIndex {
    /// Reads the index; a missing file is an empty index.
    pub fn load(path: &Path) -> Result<Self, PkiError> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Self::parse(&String::from_utf8_lossy(&bytes))),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No PKI index yet");
                Ok(Self::default())
            },
            Err(e) => Err(PkiError::io(path, e)),
        }
    }

    /// Parses index text, skipping malformed lines.
    pub fn parse(text: &str) -> Self {
        let mut skipped = 0usize;
        let records = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| {
                let record = IndexRecord::parse_line(line);
                if record.is_none() {
                    skipped += 1;
                }
                record
            })
            .collect();
        if skipped > 0 {
            debug!(skipped = skipped, "Skipped malformed index lines");
        }
        Self { records }
    }

    /// All well-formed records, in file order.
    pub fn records(&self) -> &[IndexRecord] {
        &self.records
    }

    /// Every common name the CA has recorded, issued or revoked.
    pub fn common_names(&self) -> BTreeSet<String> {
        self.records
            .iter()
            .map(|r| r.common_name.clone())
            .collect()
    }

    /// Whether the latest record for `name` is revoked.
    pub fn is_revoked(&self, name: &str) -> bool {
        self.records
            .iter()
            .rev()
            .find(|r| r.common_name == name)
            .is_some_and(|r| r.status == RecordStatus::Revoked)
    }

    /// Serial of the latest record for `name`.
    pub fn serial_of(&self, name: &str) -> Option<&str> {
        self.records
            .iter()
            .rev()
            .find(|r| r.common_name == name)
            .map(|r| r.serial.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    const INDEX: &str = "V\t350101000000Z\t\t01\tunknown\t/CN=server_abc\n\
                         R\t350101000000Z\t250301120000Z\t02\tunknown\t/CN=client_1\n\
                         V\t350101000000Z\t\t03\tunknown\tCN=client_3\n\
                         garbage line\n\
                         V\t350101000000Z\t\t04\tunknown\n\
                         V\t350101000000Z\t\t05\tunknown\t//CN=odd\n";

    #[test]
    fn test_normalize_common_name() {
        assert_eq!(normalize_common_name("/CN=client_1"), "client_1");
        assert_eq!(normalize_common_name("CN=client_1"), "client_1");
        assert_eq!(normalize_common_name("/client_1"), "client_1");
        assert_eq!(normalize_common_name("client_1"), "client_1");
    }

    #[test]
    fn test_parse_skips_malformed_lines() {
        let index = PkiIndex::parse(INDEX);
        assert_eq!(index.records().len(), 4);

        let names = index.common_names();
        assert!(names.contains("server_abc"));
        assert!(names.contains("client_1"));
        assert!(names.contains("client_3"));
        assert!(names.contains("CN=odd"));
    }

    #[test]
    fn test_record_fields() {
        let index = PkiIndex::parse(INDEX);
        let revoked = &index.records()[1];
        assert_eq!(revoked.status, RecordStatus::Revoked);
        assert_eq!(revoked.revoked_at.as_deref(), Some("250301120000Z"));
        assert_eq!(revoked.serial, "02");

        let valid = &index.records()[2];
        assert_eq!(valid.status, RecordStatus::Valid);
        assert!(valid.revoked_at.is_none());
    }

    #[test]
    fn test_revocation_lookup() {
        let index = PkiIndex::parse(INDEX);
        assert!(index.is_revoked("client_1"));
        assert!(!index.is_revoked("client_3"));
        assert!(!index.is_revoked("nobody"));
        assert_eq!(index.serial_of("client_3"), Some("03"));
    }

    #[test]
    fn test_missing_index_is_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let index = PkiIndex::load(&tmp.path().join("index.txt")).unwrap();
        assert!(index.records().is_empty());
    }
}
