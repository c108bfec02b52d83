// Validator - partition a staging batch into valid records and rejects
// Never fails, never deduplicates (the store resolves duplicates)

use crate::record::{RawPair, Record, RecordRejection};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A raw pair that failed validation, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejected {
    #[serde(flatten)]
    pub pair: RawPair,

    #[serde(rename = "Reason")]
    pub reason: RecordRejection,
}

/// Output of `validate`: both partitions in input order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub valid: Vec<Record>,
    pub invalid: Vec<Rejected>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.valid.len() + self.invalid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Normalize every pair and route it to `valid` or `invalid`.
pub fn validate(batch: &[RawPair]) -> Partition {
    let mut partition = Partition::default();

    for pair in batch {
        match Record::parse(&pair.name, &pair.code) {
            Ok(record) => partition.valid.push(record),
            Err(reason) => {
                debug!(name = %pair.name, code = %pair.code, %reason, "rejected pair");
                partition.invalid.push(Rejected {
                    pair: pair.clone(),
                    reason,
                });
            }
        }
    }

    partition
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch() -> Vec<RawPair> {
        vec![
            RawPair::new("Goa", "GA"),
            RawPair::new("X", "123"),
            RawPair::new(" delhi ", "dl"),
            RawPair::new("", "KL"),
            RawPair::new("Goa", "ga"),
            RawPair::new("Nowhere", ""),
        ]
    }

    #[test]
    fn test_partition_is_complete() {
        let input = batch();
        let partition = validate(&input);

        assert_eq!(partition.len(), input.len());
        assert!(partition.valid.iter().all(Record::is_valid));
    }

    #[test]
    fn test_partition_preserves_order_and_duplicates() {
        let partition = validate(&batch());

        let valid: Vec<(&str, &str)> = partition
            .valid
            .iter()
            .map(|r| (r.name(), r.code()))
            .collect();
        assert_eq!(valid, vec![("Goa", "GA"), ("Delhi", "DL"), ("Goa", "GA")]);

        let reasons: Vec<RecordRejection> = partition.invalid.iter().map(|r| r.reason).collect();
        assert_eq!(
            reasons,
            vec![
                RecordRejection::CodeLength(3),
                RecordRejection::EmptyName,
                RecordRejection::EmptyCode,
            ]
        );
    }

    #[test]
    fn test_rejected_keeps_raw_text() {
        let partition = validate(&[RawPair::new("  X ", "123")]);

        assert_eq!(partition.invalid[0].pair, RawPair::new("  X ", "123"));
    }

    #[test]
    fn test_empty_batch() {
        assert!(validate(&[]).is_empty());
    }

    #[test]
    fn test_rejected_serializes_flat() {
        let rejected = Rejected {
            pair: RawPair::new("X", "123"),
            reason: RecordRejection::CodeLength(3),
        };

        let json = serde_json::to_value(&rejected).unwrap();

        assert_eq!(json["State Name"], "X");
        assert_eq!(json["ID"], "123");
        assert_eq!(json["Reason"]["reason"], "code_length");
        assert_eq!(json["Reason"]["length"], 3);
    }
}
