//! Spatiotemporal slicing of canonical datasets.

use std::borrow::Cow;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use forecast_common::{
    CoordRange, ForecastError, ForecastResult, GriddedDataset, SubsetRequest, VariableCatalog,
    VariableKind, VariableSeries,
};

use crate::normalize::derive_series;
use crate::resample::resample_series;

/// Slices datasets by bounding box and time window.
pub struct SpatioTemporalSubsetter<'a> {
    catalog: &'a VariableCatalog,
}

impl<'a> SpatioTemporalSubsetter<'a> {
    pub fn new(catalog: &'a VariableCatalog) -> Self {
        Self { catalog }
    }

    /// Subset every requested variable, failing on the first that cannot
    /// be served.
    pub fn subset(
        &self,
        dataset: &GriddedDataset,
        request: &SubsetRequest,
    ) -> ForecastResult<GriddedDataset> {
        let mut result: Option<GriddedDataset> = None;
        for variable in &request.variables {
            let part = self.subset_variable(dataset, request, variable)?;
            match result.as_mut() {
                None => result = Some(part),
                Some(acc) => acc.variables.extend(part.variables),
            }
        }
        result.ok_or_else(|| ForecastError::empty_selection("no variables requested"))
    }

    /// Subset a single variable.
    ///
    /// Keeps grid points with `lat_min <= lat <= lat_max` and
    /// `long_min <= long <= long_max`, and timestamps inside the closed
    /// request window. Derived variables absent from the dataset are computed
    /// when their base variables are stored. When the request asks for a
    /// coarser time step than the dataset holds, only the steps inside the
    /// window are resampled, so no band mixes in data from outside it.
    pub fn subset_variable(
        &self,
        dataset: &GriddedDataset,
        request: &SubsetRequest,
        variable: &str,
    ) -> ForecastResult<GriddedDataset> {
        let rows = select_axis(&dataset.lats, request.lat_range.as_ref());
        let cols = select_axis(&dataset.lons, request.lon_range.as_ref());
        if rows.is_empty() || cols.is_empty() {
            return Err(ForecastError::empty_selection(format!(
                "no grid points inside lat {:?} long {:?}; dataset covers {:?}",
                request.lat_range.map(|r| r.as_tuple()),
                request.lon_range.map(|r| r.as_tuple()),
                dataset.bbox()
            )));
        }

        let series = self.resolve_series(dataset, variable)?;

        let picked: Vec<usize> = series
            .times
            .iter()
            .enumerate()
            .filter(|(_, t)| request.window.contains(t))
            .map(|(idx, _)| idx)
            .collect();
        if picked.is_empty() {
            return Err(ForecastError::empty_selection(format!(
                "no '{}' timestamps between {} and {}",
                variable, request.window.start, request.window.end
            )));
        }

        let windowed = VariableSeries {
            unit: series.unit.clone(),
            class: series.class,
            times: picked.iter().map(|&i| series.times[i]).collect(),
            frames: picked
                .iter()
                .map(|&i| series.frames[i].select(&rows, &cols))
                .collect(),
        };
        let (subset_series, time_delta) = self.apply_time_delta(windowed, dataset, request);

        debug!(
            variable,
            rows = rows.len(),
            cols = cols.len(),
            steps = subset_series.times.len(),
            "Subset variable"
        );

        let mut variables = BTreeMap::new();
        let code = self.catalog.resolve(variable)?.code;
        variables.insert(code.to_string(), subset_series);

        Ok(GriddedDataset {
            lats: rows.iter().map(|&r| dataset.lats[r]).collect(),
            lons: cols.iter().map(|&c| dataset.lons[c]).collect(),
            time_delta_minutes: time_delta,
            variables,
            ..dataset.empty_like()
        })
    }

    fn resolve_series<'d>(
        &self,
        dataset: &'d GriddedDataset,
        variable: &str,
    ) -> ForecastResult<Cow<'d, VariableSeries>> {
        let def = self.catalog.resolve(variable)?;
        if let Some(series) = dataset.variable(def.code) {
            return Ok(Cow::Borrowed(series));
        }

        match def.kind {
            VariableKind::Base => Err(ForecastError::VariableNotIngested(def.code.to_string())),
            VariableKind::Derived { dependencies, .. } => {
                let bases: BTreeMap<&'static str, VariableSeries> = dependencies
                    .iter()
                    .filter_map(|dep| dataset.variable(dep).map(|s| (*dep, s.clone())))
                    .collect();
                derive_series(self.catalog, def.code, dependencies, &bases).map(Cow::Owned)
            }
        }
    }

    fn apply_time_delta(
        &self,
        series: VariableSeries,
        dataset: &GriddedDataset,
        request: &SubsetRequest,
    ) -> (VariableSeries, u32) {
        let stored = dataset.time_delta_minutes;
        let wanted = request.time_delta_minutes;
        if wanted == stored || stored == 0 {
            return (series, stored);
        }
        if wanted < stored || wanted % stored != 0 {
            warn!(
                requested = wanted,
                stored,
                "Requested time step not reachable from stored step, keeping stored step"
            );
            return (series, stored);
        }
        (resample_series(&series, wanted), wanted)
    }
}

/// Indices of axis coordinates inside the range, or all of them without one.
fn select_axis(axis: &[f64], range: Option<&CoordRange>) -> Vec<usize> {
    match range {
        None => (0..axis.len()).collect(),
        Some(range) => axis
            .iter()
            .enumerate()
            .filter(|(_, &c)| c >= range.min && c <= range.max)
            .map(|(idx, _)| idx)
            .collect(),
    }
}
