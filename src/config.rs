//! Aggregate tracker configuration.
//!
//! Every field has a default matching the values the navigation page ships
//! with, so a host can load a partial JSON document and override only what
//! it tunes.
//!
//! ```rust
//! use route_tracker::TrackerConfig;
//!
//! let config = TrackerConfig::from_json(r#"{
//!     "filter": {"update_interval_ms": 3000},
//!     "recalculation": {"cooldown_ms": 15000}
//! }"#).unwrap();
//!
//! assert_eq!(config.filter.update_interval_ms, 3000);
//! assert_eq!(config.filter.min_accuracy, 50.0);
//! assert_eq!(config.recalculation.cooldown_ms, 15000);
//! ```

use serde::{Deserialize, Serialize};

use crate::interpolation::InterpolationConfig;
use crate::location::FilterConfig;
use crate::progress::ProgressConfig;
use crate::recalculation::RecalculationConfig;
use crate::routing::TravelProfile;

/// Configuration for a navigation session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub filter: FilterConfig,
    pub interpolation: InterpolationConfig,
    pub progress: ProgressConfig,
    pub recalculation: RecalculationConfig,
    /// Travel mode for re-route requests. Default: driving
    pub profile: TravelProfile,
}

impl TrackerConfig {
    /// Parse a (possibly partial) JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_defaults() {
        assert_eq!(TrackerConfig::from_json("{}").unwrap(), TrackerConfig::default());
    }

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::default();
        assert_eq!(config.filter.min_accuracy, 50.0);
        assert_eq!(config.filter.min_distance, 5.0);
        assert_eq!(config.filter.update_interval_ms, 2000);
        assert_eq!(config.interpolation.duration_ms, 1000);
        assert_eq!(config.progress.on_route_threshold, 50.0);
        assert_eq!(config.recalculation.cooldown_ms, 8000);
        assert_eq!(config.recalculation.request_timeout_ms, 15_000);
        assert_eq!(config.profile, TravelProfile::Driving);
    }

    #[test]
    fn test_profile_override() {
        let config = TrackerConfig::from_json(r#"{"profile": "walking"}"#).unwrap();
        assert_eq!(config.profile, TravelProfile::Walking);
    }

    #[test]
    fn test_malformed_document_is_an_error() {
        assert!(TrackerConfig::from_json(r#"{"filter": {"min_accuracy": "high"}}"#).is_err());
    }
}
