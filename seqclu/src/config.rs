//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeqCluError};

/// Tunables for a clustering run.
///
/// Constructed from a host's configuration source (file, environment, CLI flags) and
/// validated once via [`Config::validate`] before being handed to a
/// [`crate::clusterer::Clusterer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Number of clusters, `K`.
    pub k: usize,
    /// Prototypes maintained per cluster.
    pub p: usize,
    /// Of the `p` prototypes, how many are representatives.
    pub r: usize,
    /// Maximum number of sequences held in the candidate buffer at once.
    pub buffer_capacity: usize,
    /// Minimum representativeness a sequence needs to bypass buffering.
    pub min_representativeness: f64,
    /// Weighting applied when combining representativeness and weight into
    /// prototype value (see [`crate::value::LinearPrototypeValue`]).
    pub alpha: f64,
    /// Whether cluster assignment may use the approximate (error-bounded) distance
    /// path instead of always computing exact distances to every cluster.
    pub approximate_cluster_assignment: bool,
    /// Whether ambiguous/under-representative sequences are buffered at all. When
    /// `false`, every sequence is labelled immediately.
    pub buffering_enabled: bool,
    /// Upper bound on sequences pulled from the stream in a single tick.
    pub max_per_tick: usize,
}

impl Config {
    /// Checks every precondition the engine relies on, returning the first violated
    /// one as [`SeqCluError::Configuration`].
    pub fn validate(&self) -> Result<()> {
        if self.k < 1 {
            return Err(SeqCluError::Configuration("k must be >= 1".into()));
        }
        if !(0 < self.r && self.r < self.p) {
            return Err(SeqCluError::Configuration("0 < r < p is required".into()));
        }
        if !(0.0..=1.0).contains(&self.min_representativeness) {
            return Err(SeqCluError::Configuration(
                "min_representativeness must be within [0.0, 1.0]".into(),
            ));
        }
        if self.alpha < 0.0 {
            return Err(SeqCluError::Configuration("alpha must be >= 0.0".into()));
        }
        if self.max_per_tick < 1 {
            return Err(SeqCluError::Configuration(
                "max_per_tick must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            k: 2,
            p: 5,
            r: 2,
            buffer_capacity: 10,
            min_representativeness: 0.5,
            alpha: 1.0,
            approximate_cluster_assignment: true,
            buffering_enabled: true,
            max_per_tick: 50,
        }
    }

    #[test]
    fn accepts_a_well_formed_config() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn rejects_r_not_less_than_p() {
        let mut config = base_config();
        config.r = config.p;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_clusters() {
        let mut config = base_config();
        config.k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_representativeness() {
        let mut config = base_config();
        config.min_representativeness = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_capacity_buffer_is_legal_when_buffering_disabled() {
        let mut config = base_config();
        config.buffer_capacity = 0;
        config.buffering_enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn round_trips_through_json() {
        let config = base_config();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.k, config.k);
        assert_eq!(parsed.p, config.p);
        assert_eq!(parsed.r, config.r);
        assert_eq!(parsed.buffer_capacity, config.buffer_capacity);
        assert_eq!(parsed.approximate_cluster_assignment, config.approximate_cluster_assignment);
    }
}
