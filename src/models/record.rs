//! Record, batch and run statistics types.
//!
//! K_i: These types represent the core data flow through the batch loop.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// One snapshot line: an account and the balance to distribute to it.
///
/// K_i: Immutable once read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// SS58 address of the beneficiary
    #[serde(rename = "AccountId")]
    pub account_id: String,

    /// Snapshot balance, before the distribution multiplier
    #[serde(
        rename = "Total",
        serialize_with = "serialize_total",
        deserialize_with = "deserialize_total"
    )]
    pub total: u128,

    /// Number of snapshot entries merged into this record
    #[serde(rename = "Count")]
    pub count: u64,
}

impl Record {
    /// Parse a single JSON line.
    pub fn from_json_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Account ID: {}, Total: {}, Count: {}",
            self.account_id, self.total, self.count
        )
    }
}

/// Totals may exceed the JSON integer range, so they are written as strings.
fn serialize_total<S>(total: &u128, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(total)
}

/// Accepts a JSON integer or a decimal numeric string.
fn deserialize_total<'de, D>(deserializer: D) -> Result<u128, D::Error>
where
    D: Deserializer<'de>,
{
    struct TotalVisitor;

    impl Visitor<'_> for TotalVisitor {
        type Value = u128;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a non-negative integer or numeric string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
            Ok(u128::from(v))
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<u128, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u128, E> {
            u128::try_from(v).map_err(|_| E::custom(format!("negative total {v}")))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<u128, E> {
            Err(E::custom(format!("total {v} is not an exact integer")))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
            v.trim()
                .parse::<u128>()
                .map_err(|e| E::custom(format!("invalid total {v:?}: {e}")))
        }
    }

    deserializer.deserialize_any(TotalVisitor)
}

/// A group of consecutive records submitted as one atomic transaction.
///
/// K_i: Every batch has a number, a nonce and at least one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Batch counter value assigned to this batch
    pub number: u64,

    /// Signer nonce the transaction is signed with
    pub nonce: u64,

    /// 1-based input line of the first record
    pub first_line: u64,

    /// Records in file order
    pub records: Vec<Record>,
}

impl Batch {
    /// 1-based input line of the last record.
    pub fn last_line(&self) -> u64 {
        self.first_line + self.records.len() as u64 - 1
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the batch carries no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Statistics for a distribution run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Lines skipped because the checkpoint already covered them
    pub records_skipped: u64,

    /// Records submitted and finalized in this run
    pub records_submitted: u64,

    /// Batches submitted and finalized in this run
    pub batches_submitted: u64,

    /// Last processed line after the run
    pub last_processed_line: u64,

    /// Batch counter after the run
    pub current_batch_number: u64,

    /// Total runtime in seconds
    pub runtime_secs: f64,

    /// Records per hour throughput
    pub throughput_per_hour: f64,
}

impl RunStats {
    /// Calculate derived stats.
    pub fn finalize(&mut self) {
        if self.runtime_secs > 0.0 {
            self.throughput_per_hour = self.records_submitted as f64 / self.runtime_secs * 3600.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_accepts_number_and_string() {
        let a = Record::from_json_line(r#"{"AccountId":"5Alice","Total":42,"Count":1}"#).unwrap();
        assert_eq!(a.total, 42);

        let b = Record::from_json_line(
            r#"{"AccountId":"5Bob","Total":"340282366920938463463374607431768211455","Count":3}"#,
        )
        .unwrap();
        assert_eq!(b.total, u128::MAX);
        assert_eq!(b.count, 3);
    }

    #[test]
    fn test_total_rejects_bad_values() {
        for line in [
            r#"{"AccountId":"5A","Total":-1,"Count":1}"#,
            r#"{"AccountId":"5A","Total":1.5,"Count":1}"#,
            r#"{"AccountId":"5A","Total":"abc","Count":1}"#,
            r#"{"AccountId":"5A","Count":1}"#,
        ] {
            assert!(Record::from_json_line(line).is_err(), "accepted {line}");
        }
    }

    #[test]
    fn test_large_total_survives_json() {
        let r = Record {
            account_id: "5Whale".to_string(),
            total: u128::from(u64::MAX) * 10,
            count: 1,
        };
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains(r#""Total":"184467440737095516150""#));
        assert_eq!(Record::from_json_line(&json).unwrap(), r);
    }

    #[test]
    fn test_record_display_matches_log_format() {
        let r = Record {
            account_id: "5Alice".to_string(),
            total: 100,
            count: 2,
        };
        assert_eq!(r.to_string(), "Account ID: 5Alice, Total: 100, Count: 2");
    }

    #[test]
    fn test_batch_last_line() {
        let batch = Batch {
            number: 0,
            nonce: 5,
            first_line: 301,
            records: vec![
                Record {
                    account_id: "5A".to_string(),
                    total: 1,
                    count: 1,
                };
                50
            ],
        };
        assert_eq!(batch.last_line(), 350);
        assert_eq!(batch.len(), 50);
    }
}
