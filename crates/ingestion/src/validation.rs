//! Validation of raw request parameters.
//!
//! Hosts pass parameters as strings exactly as they received them. The
//! validator turns them into a [`SubsetRequest`] or [`IngestRequest`], or
//! rejects them with a [`ValidationError`] naming the offending parameter.
//! No I/O happens here.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use forecast_common::{
    parse_timestamp, BoundingBox, BucketUri, CoordRange, IngestRequest, OutputTarget,
    RasterFormat, ServiceDefinition, ServiceTable, SubsetRequest, TimeWindow, ValidationError,
    ValidationKind, VariableCatalog, DEFAULT_SERVICE, DEFAULT_VARIABLE,
};

/// Default grid resolution in metres.
pub const DEFAULT_GRID_RES: u32 = 1000;

/// Grid resolutions must be a multiple of this many metres.
pub const GRID_RES_STEP: u32 = 100;

/// Request parameters as received, before validation.
///
/// Blank strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawParams {
    /// Comma separated variable codes
    pub variable: Option<String>,
    pub service: Option<String>,
    pub location_name: Option<String>,
    /// `"min,max"`, brackets allowed
    pub lat_range: Option<String>,
    pub long_range: Option<String>,
    /// Metres
    pub grid_res: Option<String>,
    /// Minutes
    pub time_delta: Option<String>,
    /// `"start,end"` or `"start"`
    pub time_range: Option<String>,
    pub out_format: Option<String>,
    pub out: Option<String>,
    pub out_dir: Option<String>,
    pub bucket_destination: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Checks raw parameters against the variable catalog and service table.
#[derive(Debug, Clone, Copy)]
pub struct RangeValidator<'a> {
    catalog: &'a VariableCatalog,
    services: &'a ServiceTable,
}

impl<'a> RangeValidator<'a> {
    pub fn new(catalog: &'a VariableCatalog, services: &'a ServiceTable) -> Self {
        Self { catalog, services }
    }

    /// Validate a retrieval request.
    pub fn validate(&self, raw: &RawParams) -> Result<SubsetRequest, ValidationError> {
        let service = self.service(raw)?;
        let variables = match present(&raw.variable) {
            Some(list) => self.variables(list)?,
            None => self.catalog.base_codes().into_iter().map(String::from).collect(),
        };
        let location = location(raw)?;
        let lat_range = present(&raw.lat_range)
            .map(|s| coord_range("lat_range", s, 90.0))
            .transpose()?;
        let lon_range = present(&raw.long_range)
            .map(|s| coord_range("long_range", s, 180.0))
            .transpose()?;
        let resolution_m = grid_res(raw)?;
        let time_delta_minutes = time_delta(raw, service)?;
        let window = present(&raw.time_range)
            .ok_or_else(|| ValidationError::missing("time_range"))
            .and_then(time_range)?;
        let format = match present(&raw.out_format) {
            Some(s) => RasterFormat::parse(s).map_err(|_| {
                ValidationError::new(
                    ValidationKind::UnsupportedFormat,
                    format!("unsupported output format '{}'", s),
                )
            })?,
            None => RasterFormat::default(),
        };

        Ok(SubsetRequest {
            variables,
            service: service.id.clone(),
            location,
            lat_range,
            lon_range,
            window,
            resolution_m,
            time_delta_minutes,
            format,
            output: output_target(raw)?,
        })
    }

    /// Validate an ingestion request. Both coordinate ranges are required;
    /// the time range is not used.
    pub fn validate_ingest(&self, raw: &RawParams) -> Result<IngestRequest, ValidationError> {
        let service = self.service(raw)?;
        let variables = self.variables(present(&raw.variable).unwrap_or(DEFAULT_VARIABLE))?;
        let location = location(raw)?;
        let lat = present(&raw.lat_range)
            .ok_or_else(|| ValidationError::missing("lat_range"))
            .and_then(|s| coord_range("lat_range", s, 90.0))?;
        let lon = present(&raw.long_range)
            .ok_or_else(|| ValidationError::missing("long_range"))
            .and_then(|s| coord_range("long_range", s, 180.0))?;

        Ok(IngestRequest {
            variables,
            service: service.id.clone(),
            location,
            bbox: BoundingBox::from_ranges(lat.as_tuple(), lon.as_tuple()),
            resolution_m: grid_res(raw)?,
            time_delta_minutes: time_delta(raw, service)?,
        })
    }

    fn service(&self, raw: &RawParams) -> Result<&'a ServiceDefinition, ValidationError> {
        let id = present(&raw.service).unwrap_or(DEFAULT_SERVICE);
        self.services.get(id).ok_or_else(|| {
            ValidationError::new(
                ValidationKind::UnknownService,
                format!(
                    "unknown service '{}', expected one of {}",
                    id,
                    self.services.ids().join(", ")
                ),
            )
        })
    }

    /// Canonical codes in request order, each once.
    fn variables(&self, list: &str) -> Result<Vec<String>, ValidationError> {
        let mut codes = Vec::new();
        for code in strip_brackets(list).split(',').map(str::trim) {
            if code.is_empty() {
                continue;
            }
            let definition = self.catalog.resolve(code).map_err(|_| {
                ValidationError::new(
                    ValidationKind::UnknownVariable,
                    format!("unknown variable '{}'", code),
                )
            })?;
            if !codes.iter().any(|c| c == definition.code) {
                codes.push(definition.code.to_string());
            }
        }
        if codes.is_empty() {
            return Err(ValidationError::missing("variable"));
        }
        Ok(codes)
    }
}

/// Trimmed location name with path separators and spaces replaced by `_`.
pub fn normalize_location(name: &str) -> String {
    name.trim().replace([' ', '/', '\\'], "_")
}

fn location(raw: &RawParams) -> Result<String, ValidationError> {
    present(&raw.location_name)
        .map(normalize_location)
        .ok_or_else(|| ValidationError::missing("location_name"))
}

fn strip_brackets(s: &str) -> &str {
    s.trim()
        .trim_start_matches(['[', '('])
        .trim_end_matches([']', ')'])
}

fn split_pair<'s>(name: &str, s: &'s str) -> Result<Vec<&'s str>, ValidationError> {
    let parts: Vec<&str> = strip_brackets(s).split(',').map(str::trim).collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(ValidationError::invalid_format(format!(
            "{} has an empty element: '{}'",
            name, s
        )));
    }
    Ok(parts)
}

fn coord_range(name: &str, s: &str, limit: f64) -> Result<CoordRange, ValidationError> {
    let parts = split_pair(name, s)?;
    if parts.len() != 2 {
        return Err(ValidationError::invalid_format(format!(
            "{} must be 'min,max', got '{}'",
            name, s
        )));
    }

    let mut values = [0.0f64; 2];
    for (slot, part) in values.iter_mut().zip(&parts) {
        *slot = part
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| {
                ValidationError::invalid_format(format!("{} value '{}' is not a number", name, part))
            })?;
    }
    let [min, max] = values;

    if min < -limit || max > limit || min > limit || max < -limit {
        return Err(ValidationError::out_of_range(format!(
            "{} {},{} must lie within [-{}, {}]",
            name, min, max, limit, limit
        )));
    }
    if min >= max {
        return Err(ValidationError::invalid_order(format!(
            "{} minimum {} must be below maximum {}",
            name, min, max
        )));
    }
    Ok(CoordRange::new(min, max))
}

fn grid_res(raw: &RawParams) -> Result<u32, ValidationError> {
    let Some(s) = present(&raw.grid_res) else {
        return Ok(DEFAULT_GRID_RES);
    };
    let res: u32 = s.parse().map_err(|_| {
        ValidationError::invalid_format(format!("grid_res '{}' is not a whole number of metres", s))
    })?;
    if res < GRID_RES_STEP || res % GRID_RES_STEP != 0 {
        return Err(ValidationError::new(
            ValidationKind::UnsupportedResolution,
            format!(
                "grid_res {} must be at least {} and a multiple of {}",
                res, GRID_RES_STEP, GRID_RES_STEP
            ),
        ));
    }
    Ok(res)
}

fn time_delta(raw: &RawParams, service: &ServiceDefinition) -> Result<u32, ValidationError> {
    let native = service.native_resolution_minutes;
    let Some(s) = present(&raw.time_delta) else {
        return Ok(native);
    };
    let delta: u32 = s.parse().map_err(|_| {
        ValidationError::invalid_format(format!("time_delta '{}' is not a whole number of minutes", s))
    })?;
    if delta < native || delta % native != 0 {
        return Err(ValidationError::new(
            ValidationKind::InvalidTimeDelta,
            format!(
                "time_delta {} must be a positive multiple of {} minutes for {}",
                delta, native, service.id
            ),
        ));
    }
    Ok(delta)
}

fn time_range(s: &str) -> Result<TimeWindow, ValidationError> {
    let parts = split_pair("time_range", s)?;
    let parse = |p: &str| {
        parse_timestamp(p).map_err(|_| {
            ValidationError::invalid_format(format!("time_range value '{}' is not a timestamp", p))
        })
    };

    let window = match parts.as_slice() {
        [start] => TimeWindow::one_day_from(parse(start)?),
        [start, end] => TimeWindow::new(parse(start)?, parse(end)?),
        _ => {
            return Err(ValidationError::invalid_format(format!(
                "time_range must be 'start' or 'start,end', got '{}'",
                s
            )))
        }
    };
    if window.start >= window.end {
        return Err(ValidationError::invalid_order(format!(
            "time_range start {} must be before end {}",
            window.start, window.end
        )));
    }
    Ok(window)
}

fn output_target(raw: &RawParams) -> Result<OutputTarget, ValidationError> {
    let out = match present(&raw.out) {
        Some(s) if s.to_lowercase().ends_with(".tif") || s.to_lowercase().ends_with(".tiff") => {
            Some(PathBuf::from(s))
        }
        Some(s) => {
            return Err(ValidationError::invalid_format(format!(
                "out must be a .tif file, got '{}'",
                s
            )))
        }
        None => None,
    };
    let bucket = present(&raw.bucket_destination)
        .map(BucketUri::parse)
        .transpose()
        .map_err(ValidationError::invalid_format)?;

    Ok(OutputTarget {
        out,
        out_dir: present(&raw.out_dir).map(PathBuf::from),
        bucket,
    })
}
