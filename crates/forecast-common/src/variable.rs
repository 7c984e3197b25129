//! Registry of forecast variables.
//!
//! Base variables come straight from the provider payload. Derived variables
//! are computed cell by cell from base grids once those are normalized.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ForecastError, ForecastResult};
use crate::grid::Grid;

/// Variable requested when a request names none.
pub const DEFAULT_VARIABLE: &str = "precipitation";

/// Temporal behaviour of a variable, which drives aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableClass {
    /// Running total from the provider, stored as per-step increments
    Accumulated,
    /// Point-in-time state (temperature, humidity, pressure)
    Instantaneous,
    /// Direction in degrees, averaged on the circle
    Angular,
    /// Codes and flags that must not be averaged
    Categorical,
}

/// Computes a derived grid from its dependency grids, given in declaration order.
pub type DeriveFn = fn(&[&Grid]) -> Grid;

/// How a variable is obtained.
#[derive(Clone, Copy)]
pub enum VariableKind {
    Base,
    Derived {
        dependencies: &'static [&'static str],
        compute: DeriveFn,
    },
}

impl std::fmt::Debug for VariableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VariableKind::Base => write!(f, "Base"),
            VariableKind::Derived { dependencies, .. } => f
                .debug_struct("Derived")
                .field("dependencies", dependencies)
                .finish(),
        }
    }
}

/// A catalog entry.
#[derive(Debug, Clone, Copy)]
pub struct VariableDefinition {
    pub code: &'static str,
    pub name: &'static str,
    /// Canonical unit the normalizer converts into
    pub unit: &'static str,
    pub class: VariableClass,
    pub kind: VariableKind,
}

impl VariableDefinition {
    const fn base(
        code: &'static str,
        name: &'static str,
        unit: &'static str,
        class: VariableClass,
    ) -> Self {
        Self {
            code,
            name,
            unit,
            class,
            kind: VariableKind::Base,
        }
    }

    pub fn is_derived(&self) -> bool {
        matches!(self.kind, VariableKind::Derived { .. })
    }

    pub fn dependencies(&self) -> &'static [&'static str] {
        match self.kind {
            VariableKind::Base => &[],
            VariableKind::Derived { dependencies, .. } => dependencies,
        }
    }
}

/// Read-only lookup table of base and derived variables.
///
/// Codes are matched case-insensitively, so `PRECIPITATION` and
/// `precipitation` resolve to the same entry.
#[derive(Debug, Clone)]
pub struct VariableCatalog {
    entries: BTreeMap<&'static str, VariableDefinition>,
}

impl Default for VariableCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl VariableCatalog {
    /// Catalog of the Meteoblue basic-package variables plus derived products.
    pub fn builtin() -> Self {
        use VariableClass::*;

        let definitions = [
            VariableDefinition::base("precipitation", "Precipitation", "mm", Accumulated),
            VariableDefinition::base(
                "convective_precipitation",
                "Convective precipitation",
                "mm",
                Accumulated,
            ),
            VariableDefinition::base("snowfraction", "Snow fraction", "fraction", Instantaneous),
            VariableDefinition::base(
                "precipitation_probability",
                "Precipitation probability",
                "percent",
                Instantaneous,
            ),
            VariableDefinition::base("rainspot", "Rainspot", "code", Categorical),
            VariableDefinition::base("pictocode", "Pictogram code", "code", Categorical),
            VariableDefinition::base("isdaylight", "Daylight flag", "flag", Categorical),
            VariableDefinition::base("uvindex", "UV index", "index", Instantaneous),
            VariableDefinition::base("temperature", "Air temperature", "degC", Instantaneous),
            VariableDefinition::base(
                "felttemperature",
                "Felt temperature",
                "degC",
                Instantaneous,
            ),
            VariableDefinition::base(
                "relativehumidity",
                "Relative humidity",
                "percent",
                Instantaneous,
            ),
            VariableDefinition::base(
                "sealevelpressure",
                "Sea level pressure",
                "hPa",
                Instantaneous,
            ),
            VariableDefinition::base("windspeed", "Wind speed", "m/s", Instantaneous),
            VariableDefinition::base("winddirection", "Wind direction", "degree", Angular),
            VariableDefinition {
                code: "wind_u",
                name: "Eastward wind component",
                unit: "m/s",
                class: Instantaneous,
                kind: VariableKind::Derived {
                    dependencies: &["windspeed", "winddirection"],
                    compute: derive_wind_u,
                },
            },
            VariableDefinition {
                code: "wind_v",
                name: "Northward wind component",
                unit: "m/s",
                class: Instantaneous,
                kind: VariableKind::Derived {
                    dependencies: &["windspeed", "winddirection"],
                    compute: derive_wind_v,
                },
            },
            VariableDefinition {
                code: "dewpoint",
                name: "Dew point temperature",
                unit: "degC",
                class: Instantaneous,
                kind: VariableKind::Derived {
                    dependencies: &["temperature", "relativehumidity"],
                    compute: derive_dewpoint,
                },
            },
        ];

        Self {
            entries: definitions.into_iter().map(|d| (d.code, d)).collect(),
        }
    }

    /// Look up a variable code.
    pub fn resolve(&self, code: &str) -> ForecastResult<&VariableDefinition> {
        let normalized = code.trim().to_lowercase();
        self.entries
            .get(normalized.as_str())
            .ok_or_else(|| ForecastError::UnknownVariable(code.to_string()))
    }

    pub fn contains(&self, code: &str) -> bool {
        self.resolve(code).is_ok()
    }

    /// Base variables a code depends on; empty for base variables.
    pub fn base_variables_for(&self, code: &str) -> ForecastResult<Vec<&'static str>> {
        Ok(self.resolve(code)?.dependencies().to_vec())
    }

    /// Base variables that must be fetched to produce `codes`, dependencies
    /// first, each listed once.
    pub fn expand_with_dependencies<S: AsRef<str>>(
        &self,
        codes: &[S],
    ) -> ForecastResult<Vec<&'static str>> {
        let mut base = Vec::new();
        for code in codes {
            let definition = self.resolve(code.as_ref())?;
            let needed: Vec<&'static str> = match definition.kind {
                VariableKind::Base => vec![definition.code],
                VariableKind::Derived { dependencies, .. } => dependencies.to_vec(),
            };
            for dep in needed {
                if !base.contains(&dep) {
                    base.push(dep);
                }
            }
        }
        Ok(base)
    }

    /// Compute a derived grid from already-normalized base grids.
    pub fn compute_derived(
        &self,
        code: &str,
        base_grids: &BTreeMap<&str, &Grid>,
    ) -> ForecastResult<Grid> {
        let definition = self.resolve(code)?;
        let (dependencies, compute) = match definition.kind {
            VariableKind::Derived {
                dependencies,
                compute,
            } => (dependencies, compute),
            VariableKind::Base => {
                return Err(ForecastError::UnknownVariable(format!(
                    "{} is a base variable and cannot be derived",
                    definition.code
                )))
            }
        };

        let mut inputs = Vec::with_capacity(dependencies.len());
        for dep in dependencies {
            let grid = base_grids
                .get(dep)
                .ok_or_else(|| ForecastError::MissingDependency {
                    variable: definition.code.to_string(),
                    dependency: dep.to_string(),
                })?;
            inputs.push(*grid);
        }

        if let Some(first) = inputs.first() {
            if let Some(other) = inputs.iter().find(|g| g.shape() != first.shape()) {
                return Err(ForecastError::ShapeMismatch(format!(
                    "{} inputs differ: {:?} vs {:?}",
                    definition.code,
                    first.shape(),
                    other.shape()
                )));
            }
        }

        Ok(compute(&inputs))
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariableDefinition> {
        self.entries.values()
    }

    /// Codes of every fetchable (non-derived) variable, alphabetically.
    pub fn base_codes(&self) -> Vec<&'static str> {
        self.entries
            .values()
            .filter(|d| !d.is_derived())
            .map(|d| d.code)
            .collect()
    }
}

/// Wind speed from eastward/northward components.
pub fn wind_speed(u: f32, v: f32) -> f32 {
    (u * u + v * v).sqrt()
}

/// Meteorological wind direction (where the wind blows from) in [0, 360).
pub fn wind_direction(u: f32, v: f32) -> f32 {
    let degrees = (-u).atan2(-v).to_degrees();
    let normalized = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if normalized >= 360.0 {
        0.0
    } else {
        normalized
    }
}

fn zip_cells(a: &Grid, b: &Grid, f: impl Fn(f32, f32) -> f32) -> Grid {
    Grid {
        nx: a.nx,
        ny: a.ny,
        values: a
            .values
            .iter()
            .zip(&b.values)
            .map(|(&x, &y)| f(x, y))
            .collect(),
    }
}

fn derive_wind_u(inputs: &[&Grid]) -> Grid {
    zip_cells(inputs[0], inputs[1], |speed, dir| {
        -speed * dir.to_radians().sin()
    })
}

fn derive_wind_v(inputs: &[&Grid]) -> Grid {
    zip_cells(inputs[0], inputs[1], |speed, dir| {
        -speed * dir.to_radians().cos()
    })
}

/// Magnus approximation over water.
fn derive_dewpoint(inputs: &[&Grid]) -> Grid {
    const A: f32 = 17.625;
    const B: f32 = 243.04;
    zip_cells(inputs[0], inputs[1], |temp, rh| {
        if rh <= 0.0 || rh.is_nan() || temp.is_nan() {
            return f32::NAN;
        }
        let gamma = (rh / 100.0).ln() + A * temp / (B + temp);
        B * gamma / (A - gamma)
    })
}
