//! Aggregated replication result.

use super::key::StoreKey;
use super::verify::VerificationOutcome;
use serde::Serialize;

/// Counts and verified keys for one batch.
///
/// A shortfall is an ordinary result, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    /// Keys the ingestor attempted to write.
    pub attempted_count: usize,
    /// Keys that produced an outcome (failed reads produce none).
    pub queried_count: usize,
    /// Keys found on the replica.
    pub verified_count: usize,
    /// Verified keys in verification order.
    pub verified_keys: Vec<StoreKey>,
}

impl ConsistencyReport {
    /// Aggregate `outcomes` against the `attempted` key list.
    pub fn build(attempted: &[StoreKey], outcomes: &[VerificationOutcome]) -> Self {
        let verified_keys: Vec<StoreKey> = outcomes
            .iter()
            .filter(|o| o.is_present())
            .map(|o| o.key.clone())
            .collect();

        Self {
            attempted_count: attempted.len(),
            queried_count: outcomes.len(),
            verified_count: verified_keys.len(),
            verified_keys,
        }
    }

    /// Attempted keys not seen on the replica.
    pub fn missing_count(&self) -> usize {
        self.attempted_count.saturating_sub(self.verified_count)
    }

    /// Every attempted key was verified.
    pub fn is_fully_replicated(&self) -> bool {
        self.verified_count == self.attempted_count
    }

    /// Fraction of attempted keys verified; 1.0 for an empty batch.
    pub fn verified_ratio(&self) -> f64 {
        if self.attempted_count == 0 {
            return 1.0;
        }
        self.verified_count as f64 / self.attempted_count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(id: &str, present: bool) -> VerificationOutcome {
        VerificationOutcome {
            key: StoreKey::derive("fact", id),
            value: present.then(|| format!("text-{}", id)),
        }
    }

    #[test]
    fn test_partial() {
        let attempted: Vec<StoreKey> = ["a", "b", "c"].iter().map(|id| StoreKey::derive("fact", id)).collect();
        let outcomes = vec![outcome("a", true), outcome("b", false), outcome("c", true)];

        let report = ConsistencyReport::build(&attempted, &outcomes);
        assert_eq!(report.attempted_count, 3);
        assert_eq!(report.verified_count, 2);
        assert_eq!(report.missing_count(), 1);
        assert!(!report.is_fully_replicated());
        assert_eq!(
            report.verified_keys,
            vec![StoreKey::derive("fact", "a"), StoreKey::derive("fact", "c")]
        );
    }

    #[test]
    fn test_empty_batch() {
        let report = ConsistencyReport::build(&[], &[]);
        assert!(report.is_fully_replicated());
        assert_eq!(report.verified_ratio(), 1.0);
    }

    #[test]
    fn test_omitted_reads_count_as_missing() {
        let attempted = vec![StoreKey::derive("fact", "a"), StoreKey::derive("fact", "b")];
        let report = ConsistencyReport::build(&attempted, &[outcome("a", true)]);
        assert_eq!(report.queried_count, 1);
        assert_eq!(report.missing_count(), 1);
        assert_eq!(report.verified_ratio(), 0.5);
    }

    #[test]
    fn test_serializes_keys_as_strings() {
        let attempted = vec![StoreKey::derive("fact", "a")];
        let report = ConsistencyReport::build(&attempted, &[outcome("a", true)]);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["verified_keys"][0], "fact:a");
        assert_eq!(json["verified_count"], 1);
    }
}
