//! Validation policy for timespans and collections.
//!
//! Two behaviors are configurable rather than fixed:
//!
//! - Whether a timespan built with its endpoints swapped is quietly
//!   normalized or rejected ([`EndpointOrder`]). A collection applies the
//!   same policy to values that report their bounds out of order, and a
//!   rejected value then falls under the malformed policy.
//! - Whether batch insertion skips values lacking bounds or fails on them
//!   ([`MalformedPolicy`]).
//!
//! The defaults keep the lenient behavior. Configs deserialize with serde,
//! so they can live next to whatever settings a caller already loads:
//!
//! ```
//! use timespans::config::{CollectionConfig, EndpointOrder, MalformedPolicy};
//!
//! let config: CollectionConfig = serde_json::from_str(r#"{ "malformed": "reject" }"#).unwrap();
//! assert_eq!(config.malformed, MalformedPolicy::Reject);
//! assert_eq!(config.endpoint_order, EndpointOrder::Normalize);
//! ```

use serde::Deserialize;
use serde::Serialize;

use crate::error::Result;
use crate::error::TimespanError;

/// What to do with a timespan whose start offset exceeds its stop offset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointOrder {
    /// Swap the endpoints so that `start <= stop`.
    #[default]
    Normalize,
    /// Fail with [`TimespanError::InvalidTimespan`].
    Reject,
}

impl EndpointOrder {
    /// Apply this policy to a pair of endpoints.
    pub fn order(self, start: f64, stop: f64) -> Result<(f64, f64)> {
        if start <= stop {
            return Ok((start, stop));
        }
        return match self {
            EndpointOrder::Normalize => Ok((stop, start)),
            EndpointOrder::Reject => Err(TimespanError::InvalidTimespan(format!(
                "start offset {start} is after stop offset {stop}"
            ))),
        };
    }
}

/// What batch insertion does with values that lack a start or stop offset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    /// Leave the value out and keep going.
    #[default]
    Skip,
    /// Stop at the value and fail with [`TimespanError::InvalidTimespan`].
    Reject,
}

/// Settings carried by every [`TimespanCollection`](crate::tree::TimespanCollection).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CollectionConfig {
    pub endpoint_order: EndpointOrder,
    pub malformed: MalformedPolicy,
}

impl CollectionConfig {
    /// Reject both swapped endpoints and malformed values.
    pub fn strict() -> CollectionConfig {
        return CollectionConfig {
            endpoint_order: EndpointOrder::Reject,
            malformed: MalformedPolicy::Reject,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_lenient() {
        let config = CollectionConfig::default();
        assert_eq!(config.endpoint_order, EndpointOrder::Normalize);
        assert_eq!(config.malformed, MalformedPolicy::Skip);
    }

    #[test]
    fn normalize_swaps_endpoints() {
        assert_eq!(EndpointOrder::Normalize.order(3.0, 1.0), Ok((1.0, 3.0)));
        assert_eq!(EndpointOrder::Normalize.order(1.0, 1.0), Ok((1.0, 1.0)));
    }

    #[test]
    fn reject_refuses_swapped_endpoints() {
        assert!(EndpointOrder::Reject.order(3.0, 1.0).is_err());
        assert_eq!(EndpointOrder::Reject.order(1.0, 3.0), Ok((1.0, 3.0)));
    }

    #[test]
    fn parses_snake_case() {
        let config: CollectionConfig =
            serde_json::from_str(r#"{ "endpoint_order": "reject", "malformed": "reject" }"#).unwrap();
        assert_eq!(config, CollectionConfig::strict());

        let config: CollectionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, CollectionConfig::default());
    }
}
