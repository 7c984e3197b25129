//! Temporal aggregation of gridded series.
//!
//! Provides cumulative-to-incremental conversion for accumulating variables
//! and block resampling onto a coarser time step, with the aggregation
//! chosen per variable class.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use forecast_common::{floor_to_interval, Grid, VariableClass, VariableSeries};

/// Method used to collapse a block of time steps into one.
///
/// - **Sum**: accumulated quantities (precipitation per step)
/// - **Mean**: continuous state (temperature, humidity, pressure)
/// - **CircularMean**: directions in degrees
/// - **First**: codes and flags, keeps the first value of the block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResampleMethod {
    Sum,
    #[default]
    Mean,
    CircularMean,
    First,
}

impl ResampleMethod {
    /// Aggregation appropriate for a variable class.
    pub fn for_class(class: VariableClass) -> Self {
        match class {
            VariableClass::Accumulated => ResampleMethod::Sum,
            VariableClass::Instantaneous => ResampleMethod::Mean,
            VariableClass::Angular => ResampleMethod::CircularMean,
            VariableClass::Categorical => ResampleMethod::First,
        }
    }

    fn aggregate(&self, values: &[f32]) -> f32 {
        match self {
            ResampleMethod::Sum => sum_of_block(values),
            ResampleMethod::Mean => mean_of_block(values),
            ResampleMethod::CircularMean => circular_mean_of_block(values),
            ResampleMethod::First => values.first().copied().unwrap_or(f32::NAN),
        }
    }
}

/// Turn a running total into per-step increments.
///
/// The first step has no predecessor and is dropped. Negative differences
/// come from provider resets and are clamped to zero. A NaN on either side
/// yields NaN.
pub fn cumulative_to_incremental(
    times: &[DateTime<Utc>],
    frames: &[Grid],
) -> (Vec<DateTime<Utc>>, Vec<Grid>) {
    if frames.len() < 2 {
        return (Vec::new(), Vec::new());
    }

    let mut out_times = Vec::with_capacity(frames.len() - 1);
    let mut out_frames = Vec::with_capacity(frames.len() - 1);

    for (idx, pair) in frames.windows(2).enumerate() {
        let (prev, curr) = (&pair[0], &pair[1]);
        let values = prev
            .values
            .iter()
            .zip(&curr.values)
            .map(|(&p, &c)| {
                if p.is_nan() || c.is_nan() {
                    f32::NAN
                } else {
                    (c - p).max(0.0)
                }
            })
            .collect();

        out_times.push(times[idx + 1]);
        out_frames.push(Grid {
            nx: curr.nx,
            ny: curr.ny,
            values,
        });
    }

    (out_times, out_frames)
}

/// Aggregate a series into blocks of `step_minutes`.
///
/// Blocks are aligned to the Unix epoch and labelled by their start, so the
/// result does not depend on where the input series begins. Empty blocks
/// produce no output step. NaN cells are skipped; a block with no valid
/// value for a cell yields NaN.
pub fn resample_frames(
    times: &[DateTime<Utc>],
    frames: &[Grid],
    step_minutes: u32,
    method: ResampleMethod,
) -> (Vec<DateTime<Utc>>, Vec<Grid>) {
    let mut out_times: Vec<DateTime<Utc>> = Vec::new();
    let mut out_frames = Vec::new();

    let mut start = 0;
    while start < times.len() {
        let label = floor_to_interval(times[start], step_minutes);
        let mut end = start + 1;
        while end < times.len() && floor_to_interval(times[end], step_minutes) == label {
            end += 1;
        }

        out_times.push(label);
        out_frames.push(aggregate_frames(&frames[start..end], method));
        start = end;
    }

    (out_times, out_frames)
}

/// Resample a whole series using the aggregation of its class.
pub fn resample_series(series: &VariableSeries, step_minutes: u32) -> VariableSeries {
    let method = ResampleMethod::for_class(series.class);
    let (times, frames) = resample_frames(&series.times, &series.frames, step_minutes, method);
    VariableSeries {
        unit: series.unit.clone(),
        class: series.class,
        times,
        frames,
    }
}

fn aggregate_frames(block: &[Grid], method: ResampleMethod) -> Grid {
    let (nx, ny) = block[0].shape();
    let mut values = vec![f32::NAN; nx * ny];
    let mut cell = Vec::with_capacity(block.len());

    for (idx, out) in values.iter_mut().enumerate() {
        cell.clear();
        cell.extend(block.iter().map(|g| g.values.get(idx).copied().unwrap_or(f32::NAN)));
        *out = method.aggregate(&cell);
    }

    Grid { nx, ny, values }
}

/// Sum of valid values; NaN when none are valid.
#[inline]
fn sum_of_block(values: &[f32]) -> f32 {
    let mut sum = 0.0f32;
    let mut count = 0;
    for &v in values {
        if !v.is_nan() {
            sum += v;
            count += 1;
        }
    }
    if count == 0 {
        f32::NAN
    } else {
        sum
    }
}

/// Mean of valid values; NaN when none are valid.
#[inline]
fn mean_of_block(values: &[f32]) -> f32 {
    let mut sum = 0.0f32;
    let mut count = 0;
    for &v in values {
        if !v.is_nan() {
            sum += v;
            count += 1;
        }
    }
    if count == 0 {
        f32::NAN
    } else {
        sum / count as f32
    }
}

/// Mean direction on the circle, in [0, 360).
#[inline]
fn circular_mean_of_block(values: &[f32]) -> f32 {
    let mut sin_sum = 0.0f64;
    let mut cos_sum = 0.0f64;
    let mut count = 0;
    for &v in values {
        if !v.is_nan() {
            let rad = f64::from(v).to_radians();
            sin_sum += rad.sin();
            cos_sum += rad.cos();
            count += 1;
        }
    }
    if count == 0 {
        return f32::NAN;
    }
    let degrees = sin_sum.atan2(cos_sum).to_degrees().rem_euclid(360.0) as f32;
    if degrees >= 360.0 {
        0.0
    } else {
        degrees
    }
}
