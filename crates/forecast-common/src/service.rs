//! Upstream forecast services and their timing characteristics.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Service used when a request names none.
pub const DEFAULT_SERVICE: &str = "basic-5min";

fn default_init_frequency() -> u32 {
    360
}

fn default_max_forecast_days() -> u32 {
    7
}

fn default_retention_hours() -> u32 {
    48
}

fn default_latency_minutes() -> u32 {
    60
}

/// A named upstream product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub id: String,
    /// Package URL queried per grid point
    pub endpoint: String,
    /// Key of the data block inside the JSON response
    pub response_key: String,
    /// Minutes between model initialisations
    #[serde(default = "default_init_frequency")]
    pub init_frequency_minutes: u32,
    /// Native spacing of the returned time axis in minutes
    pub native_resolution_minutes: u32,
    /// How far ahead of now a forecast may be requested
    #[serde(default = "default_max_forecast_days")]
    pub max_forecast_days: u32,
    /// How far back runs stay available
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u32,
    /// Delay between a run's nominal time and its availability
    #[serde(default = "default_latency_minutes")]
    pub publication_latency_minutes: u32,
}

impl ServiceDefinition {
    /// Meteoblue 5-minute package.
    pub fn basic_5min() -> Self {
        Self {
            id: "basic-5min".to_string(),
            endpoint: "https://my.meteoblue.com/packages/basic-5min".to_string(),
            response_key: "data_xmin".to_string(),
            init_frequency_minutes: default_init_frequency(),
            native_resolution_minutes: 5,
            max_forecast_days: default_max_forecast_days(),
            retention_hours: default_retention_hours(),
            publication_latency_minutes: default_latency_minutes(),
        }
    }

    /// Meteoblue hourly package.
    pub fn basic_1h() -> Self {
        Self {
            id: "basic-1h".to_string(),
            endpoint: "https://my.meteoblue.com/packages/basic-1h".to_string(),
            response_key: "data_1h".to_string(),
            init_frequency_minutes: default_init_frequency(),
            native_resolution_minutes: 60,
            max_forecast_days: default_max_forecast_days(),
            retention_hours: default_retention_hours(),
            publication_latency_minutes: default_latency_minutes(),
        }
    }

    pub fn native_step(&self) -> Duration {
        Duration::minutes(i64::from(self.native_resolution_minutes))
    }

    pub fn init_frequency(&self) -> Duration {
        Duration::minutes(i64::from(self.init_frequency_minutes))
    }

    pub fn forward_horizon(&self) -> Duration {
        Duration::days(i64::from(self.max_forecast_days))
    }

    pub fn retention(&self) -> Duration {
        Duration::hours(i64::from(self.retention_hours))
    }

    pub fn publication_latency(&self) -> Duration {
        Duration::minutes(i64::from(self.publication_latency_minutes))
    }

    /// Check internal consistency of the timing values.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("service id must not be empty".to_string());
        }
        if self.response_key.trim().is_empty() {
            return Err(format!("service '{}' has no response_key", self.id));
        }
        if self.native_resolution_minutes == 0 || self.init_frequency_minutes == 0 {
            return Err(format!(
                "service '{}' needs non-zero native resolution and init frequency",
                self.id
            ));
        }
        if self.max_forecast_days == 0 {
            return Err(format!("service '{}' needs a forecast horizon", self.id));
        }
        Ok(())
    }
}

/// Immutable table of known services, built once at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTable {
    services: BTreeMap<String, ServiceDefinition>,
}

impl Default for ServiceTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ServiceTable {
    /// The two Meteoblue basic packages.
    pub fn builtin() -> Self {
        Self::from_definitions([ServiceDefinition::basic_5min(), ServiceDefinition::basic_1h()])
    }

    pub fn from_definitions(definitions: impl IntoIterator<Item = ServiceDefinition>) -> Self {
        Self {
            services: definitions
                .into_iter()
                .map(|d| (d.id.clone(), d))
                .collect(),
        }
    }

    /// Replace or add entries, keeping the rest.
    pub fn with_overrides(mut self, definitions: impl IntoIterator<Item = ServiceDefinition>) -> Self {
        for definition in definitions {
            self.services.insert(definition.id.clone(), definition);
        }
        self
    }

    pub fn get(&self, id: &str) -> Option<&ServiceDefinition> {
        self.services.get(id.trim())
    }

    pub fn ids(&self) -> Vec<&str> {
        self.services.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceDefinition> {
        self.services.values()
    }
}
