use crate::types::{LoaderError, LoaderResult, MissingDatePolicy};
use chrono::{Duration, NaiveDate};
use std::path::PathBuf;

/// Dates from `from` to `to` inclusive, every `step_days` days.
/// A non-positive step yields an empty grid instead of looping forever.
pub fn date_steps(from: NaiveDate, to: NaiveDate, step_days: i64) -> Vec<NaiveDate> {
    if step_days <= 0 {
        log::warn!("Non-positive day step {}; returning empty date grid", step_days);
        return Vec::new();
    }
    let mut dates = Vec::new();
    let mut current = from;
    while current <= to {
        dates.push(current);
        current += Duration::days(step_days);
    }
    dates
}

/// Produces one region raster for a single date. The pipeline is the
/// production implementation; tests substitute closures.
pub trait RegionProvider {
    fn region_for(&mut self, date: NaiveDate) -> LoaderResult<PathBuf>;
}

impl<F> RegionProvider for F
where
    F: FnMut(NaiveDate) -> LoaderResult<PathBuf>,
{
    fn region_for(&mut self, date: NaiveDate) -> LoaderResult<PathBuf> {
        self(date)
    }
}

/// Walk the date grid and collect `(date, raster)` pairs in ascending
/// order, applying `policy` to dates the provider cannot serve.
///
/// `Interpolate` only marks a failed date as pending when an earlier date
/// succeeded; filling pending dates is unimplemented, so any pending date
/// at a later success fails the whole series with
/// [`LoaderError::InterpolationUnsupported`].
pub fn assemble_history<P: RegionProvider>(
    provider: &mut P,
    from: NaiveDate,
    to: NaiveDate,
    step_days: i64,
    policy: MissingDatePolicy,
) -> LoaderResult<Vec<(NaiveDate, PathBuf)>> {
    let mut series: Vec<(NaiveDate, PathBuf)> = Vec::new();
    let mut pending: usize = 0;

    for date in date_steps(from, to, step_days) {
        match provider.region_for(date) {
            Ok(path) => {
                if pending > 0 {
                    return Err(LoaderError::InterpolationUnsupported);
                }
                series.push((date, path));
            }
            Err(e) => match policy {
                MissingDatePolicy::Skip => {
                    log::warn!("Skipping {}: {}", date, e);
                }
                MissingDatePolicy::Abort => return Err(e),
                MissingDatePolicy::Interpolate => {
                    if series.is_empty() {
                        log::warn!("Skipping {} (nothing to interpolate from): {}", date, e);
                    } else {
                        log::warn!("Marking {} for interpolation: {}", date, e);
                        pending += 1;
                    }
                }
            },
        }
    }
    Ok(series)
}
