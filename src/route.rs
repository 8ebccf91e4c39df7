//! # Routes and routing configuration
//!
//! A [`Route`] is a named intent: a handful of reference phrases, free-form metadata
//! (for example which tool handles the intent) and a distance threshold. A query matches
//! a route when the aggregated cosine distance between the query and the route's
//! references is below that threshold.
//!
//! Routes are plain data and serialize to YAML, so a whole router can be described in a
//! file and rebuilt from it:
//!
//! ```yaml
//! name: banking_router
//! routes:
//!   - name: loans
//!     references: ["I want a personal loan", "What is my EMI?"]
//!     metadata: { tool: calculate_emi }
//!     distance_threshold: 0.5
//! routing_config:
//!   max_k: 3
//!   aggregation_method: avg
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::error::{Result, RouterError};

/// Largest possible cosine distance.
pub const MAX_DISTANCE: f32 = 2.0;

fn default_distance_threshold() -> f32 {
    0.5
}

/// A named intent with its reference phrases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Unique route name within a router.
    pub name: String,
    /// Example phrases that represent this intent.
    pub references: Vec<String>,
    /// Arbitrary key/value pairs carried alongside the route.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Maximum aggregated distance for a query to match, in `(0, 2]`.
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f32,
}

impl Route {
    /// Create a route with the default threshold (`0.5`) and no metadata.
    pub fn new<S: Into<String>>(name: impl Into<String>, references: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            references: references.into_iter().map(Into::into).collect(),
            metadata: BTreeMap::new(),
            distance_threshold: default_distance_threshold(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_distance_threshold(mut self, threshold: f32) -> Self {
        self.distance_threshold = threshold;
        self
    }

    /// Check the route's invariants.
    ///
    /// # Errors
    /// [`RouterError::InvalidRoute`] for an empty name, no references, a blank
    /// reference, or a threshold outside `(0, 2]`.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(RouterError::InvalidRoute("route name must not be empty".into()));
        }
        if self.references.is_empty() {
            return Err(RouterError::InvalidRoute(format!(
                "route '{}' has no references",
                self.name
            )));
        }
        if self.references.iter().any(|r| r.trim().is_empty()) {
            return Err(RouterError::InvalidRoute(format!(
                "route '{}' has an empty reference",
                self.name
            )));
        }
        validate_threshold(&self.name, self.distance_threshold)
    }
}

pub(crate) fn validate_threshold(route: &str, threshold: f32) -> Result<()> {
    if !(threshold > 0.0 && threshold <= MAX_DISTANCE) {
        return Err(RouterError::InvalidRoute(format!(
            "route '{route}' distance threshold {threshold} must be in (0, {MAX_DISTANCE}]"
        )));
    }
    Ok(())
}

/// How the distances of one route's references are folded into a single score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceAggregationMethod {
    #[default]
    Avg,
    Min,
    Sum,
}

impl DistanceAggregationMethod {
    /// Aggregate a non-empty slice of distances. Returns `None` for an empty slice.
    pub fn aggregate(&self, distances: &[f32]) -> Option<f32> {
        if distances.is_empty() {
            return None;
        }
        let value = match self {
            Self::Avg => distances.iter().sum::<f32>() / distances.len() as f32,
            Self::Min => distances.iter().copied().fold(f32::INFINITY, f32::min),
            Self::Sum => distances.iter().sum(),
        };
        Some(value)
    }
}

impl std::fmt::Display for DistanceAggregationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Sum => "sum",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for DistanceAggregationMethod {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "avg" | "mean" => Ok(Self::Avg),
            "min" => Ok(Self::Min),
            "sum" => Ok(Self::Sum),
            other => Err(RouterError::InvalidRoute(format!(
                "unknown aggregation method '{other}'"
            ))),
        }
    }
}

fn default_max_k() -> usize {
    1
}

/// Router-wide matching settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Maximum number of route matches returned.
    #[serde(default = "default_max_k")]
    pub max_k: usize,
    /// Aggregation applied to each route's reference distances.
    #[serde(default)]
    pub aggregation_method: DistanceAggregationMethod,
    /// When set, only the nearest `reference_k` references of a route are aggregated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_k: Option<usize>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            max_k: default_max_k(),
            aggregation_method: DistanceAggregationMethod::default(),
            reference_k: None,
        }
    }
}

impl RoutingConfig {
    pub fn new(max_k: usize, aggregation_method: DistanceAggregationMethod) -> Self {
        Self {
            max_k,
            aggregation_method,
            reference_k: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_k == 0 {
            return Err(RouterError::InvalidRoute("max_k must be at least 1".into()));
        }
        if self.reference_k == Some(0) {
            return Err(RouterError::InvalidRoute("reference_k must be at least 1".into()));
        }
        Ok(())
    }
}

/// A route accepted by the threshold gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteMatch {
    pub name: String,
    /// Aggregated cosine distance (lower is closer).
    pub distance: f32,
}

/// Serializable description of a whole router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterDefinition {
    pub name: String,
    pub routes: Vec<Route>,
    #[serde(default)]
    pub routing_config: RoutingConfig,
}

impl RouterDefinition {
    pub fn new(name: impl Into<String>, routes: Vec<Route>, routing_config: RoutingConfig) -> Self {
        Self {
            name: name.into(),
            routes,
            routing_config,
        }
    }

    /// Validate the router name, every route, route-name uniqueness and the routing config.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(RouterError::InvalidRoute("router name must not be empty".into()));
        }
        let mut seen = HashSet::new();
        for route in &self.routes {
            route.validate()?;
            if !seen.insert(route.name.as_str()) {
                return Err(RouterError::InvalidRoute(format!(
                    "duplicate route name '{}'",
                    route.name
                )));
            }
        }
        self.routing_config.validate()
    }

    pub fn get(&self, name: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.name == name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Route> {
        self.routes.iter_mut().find(|r| r.name == name)
    }

    pub fn route_names(&self) -> Vec<String> {
        self.routes.iter().map(|r| r.name.clone()).collect()
    }

    /// Largest threshold across all routes; the search radius for a query.
    pub fn max_threshold(&self) -> f32 {
        self.routes
            .iter()
            .map(|r| r.distance_threshold)
            .fold(0.0, f32::max)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let definition: RouterDefinition = serde_yaml::from_str(content)?;
        definition.validate()?;
        Ok(definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_methods() {
        let d = [0.1, 0.3, 0.2];
        assert!((DistanceAggregationMethod::Avg.aggregate(&d).unwrap() - 0.2).abs() < 1e-6);
        assert_eq!(DistanceAggregationMethod::Min.aggregate(&d), Some(0.1));
        assert!((DistanceAggregationMethod::Sum.aggregate(&d).unwrap() - 0.6).abs() < 1e-6);
        assert_eq!(DistanceAggregationMethod::Avg.aggregate(&[]), None);
    }

    #[test]
    fn test_route_validation() {
        assert!(Route::new("loans", ["i want a loan"]).validate().is_ok());
        assert!(Route::new("", ["x"]).validate().is_err());
        assert!(Route::new("empty", Vec::<String>::new()).validate().is_err());
        assert!(Route::new("blank", ["  "]).validate().is_err());
        assert!(
            Route::new("t", ["x"])
                .with_distance_threshold(0.0)
                .validate()
                .is_err()
        );
        assert!(
            Route::new("t", ["x"])
                .with_distance_threshold(2.5)
                .validate()
                .is_err()
        );
        assert!(
            Route::new("t", ["x"])
                .with_distance_threshold(2.0)
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_definition_rejects_duplicates() {
        let def = RouterDefinition::new(
            "r",
            vec![Route::new("a", ["x"]), Route::new("a", ["y"])],
            RoutingConfig::default(),
        );
        assert!(matches!(def.validate(), Err(RouterError::InvalidRoute(_))));
    }

    #[test]
    fn test_routing_config_validation() {
        assert!(RoutingConfig::new(0, DistanceAggregationMethod::Avg).validate().is_err());
        let mut cfg = RoutingConfig::default();
        cfg.reference_k = Some(0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_yaml_defaults() {
        let yaml = r#"
name: topic_router
routes:
  - name: sports
    references: ["Who won the game last night?"]
"#;
        let def = RouterDefinition::from_yaml_str(yaml).unwrap();
        assert_eq!(def.routes[0].distance_threshold, 0.5);
        assert_eq!(def.routing_config.max_k, 1);
        assert_eq!(
            def.routing_config.aggregation_method,
            DistanceAggregationMethod::Avg
        );
        let back = RouterDefinition::from_yaml_str(&def.to_yaml_string().unwrap()).unwrap();
        assert_eq!(back, def);
    }

    #[test]
    fn test_aggregation_from_str() {
        assert_eq!("AVG".parse::<DistanceAggregationMethod>().unwrap(), DistanceAggregationMethod::Avg);
        assert_eq!("min".parse::<DistanceAggregationMethod>().unwrap(), DistanceAggregationMethod::Min);
        assert!("median".parse::<DistanceAggregationMethod>().is_err());
    }
}
