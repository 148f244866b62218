use serde::{Deserialize, Serialize};

const DEFAULT_MAJORITY_FRACTION: f32 = 0.5;

/// Policy dial controlling when household voting locks in a decision
/// before every resident has participated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Fraction of all residents a choice must exceed to count as a
    /// majority. `0.5` means strictly more than half.
    pub majority_fraction: f32,
}

impl ConsensusConfig {
    /// Smallest vote count that constitutes a majority of `total_residents`.
    pub fn majority_needed(&self, total_residents: usize) -> usize {
        let fraction = if self.majority_fraction.is_finite()
            && self.majority_fraction > 0.0
            && self.majority_fraction < 1.0
        {
            self.majority_fraction
        } else {
            DEFAULT_MAJORITY_FRACTION
        };

        (total_residents as f64 * fraction as f64).floor() as usize + 1
    }
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            majority_fraction: DEFAULT_MAJORITY_FRACTION,
        }
    }
}
