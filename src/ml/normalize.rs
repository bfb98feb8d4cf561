use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::NormalizeSettings;
use crate::error::{PipelineError, Result};
use crate::types::{FeatureFrame, DEBUG_PREFIX};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalerKind {
    MinMax,
    Standard,
    Robust,
}

/// Mutually exclusive ways of taming extreme scaled values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierPolicy {
    /// Clamp values into the bounds, keeping every row.
    Clip,
    /// Drop training rows with any value outside the bounds.
    RemoveRows,
}

/// Per-column affine scaling learned from a training frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedScaler {
    pub kind: ScalerKind,
    pub columns: Vec<String>,
    centre: Vec<f64>,
    scale: Vec<f64>,
}

impl FittedScaler {
    pub fn fit(kind: ScalerKind, frame: &FeatureFrame) -> Result<Self> {
        let mut centre = Vec::with_capacity(frame.width());
        let mut scale = Vec::with_capacity(frame.width());
        for name in frame.column_names() {
            let col = frame.column(name)?;
            let (c, s) = match kind {
                ScalerKind::MinMax => {
                    let lo = col.iter().copied().fold(f64::INFINITY, f64::min);
                    let hi = col.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                    (lo, hi - lo)
                }
                ScalerKind::Standard => {
                    let m = crate::indicators::mean(col);
                    let var = col.iter().map(|v| (v - m).powi(2)).sum::<f64>() / col.len().max(1) as f64;
                    (m, var.sqrt())
                }
                ScalerKind::Robust => {
                    let mut sorted = col.to_vec();
                    sorted.sort_by(|a, b| a.total_cmp(b));
                    (quantile(&sorted, 0.5), quantile(&sorted, 0.75) - quantile(&sorted, 0.25))
                }
            };
            centre.push(c);
            scale.push(s);
        }
        Ok(Self {
            kind,
            columns: frame.column_names().to_vec(),
            centre,
            scale,
        })
    }

    /// Columns with zero spread map to 0.
    pub fn transform(&self, frame: &FeatureFrame) -> Result<FeatureFrame> {
        let mut out = FeatureFrame::new(frame.index().to_vec());
        for (j, name) in self.columns.iter().enumerate() {
            let col = frame.column(name)?;
            let (c, s) = (self.centre[j], self.scale[j]);
            let scaled = col
                .iter()
                .map(|v| if s > 0.0 && s.is_finite() { (v - c) / s } else { 0.0 })
                .collect();
            out.insert(name.clone(), scaled)?;
        }
        Ok(out)
    }
}

// Linear interpolation between order statistics
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

pub const CALENDAR_COLUMNS: [&str; 5] = [
    "days_from_start",
    "day_of_week",
    "day_of_month",
    "week_of_year",
    "month",
];

fn calendar_anchor() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Scales and cleans feature frames ahead of the reducer.
#[derive(Debug, Clone)]
pub struct FeatureNormalizer {
    scaler: ScalerKind,
    outliers: OutlierPolicy,
    bounds: [f64; 2],
    calendar: bool,
}

impl FeatureNormalizer {
    pub fn new(settings: &NormalizeSettings) -> Self {
        Self {
            scaler: settings.scaler,
            outliers: settings.outlier_policy,
            bounds: settings.outlier_bounds,
            calendar: settings.calendar_features,
        }
    }

    pub fn outlier_policy(&self) -> OutlierPolicy {
        self.outliers
    }

    /// Report infinities, drop debug columns, add calendar features and
    /// zero-fill anything still non-finite.
    pub fn prepare(&self, frame: &FeatureFrame) -> Result<FeatureFrame> {
        let inf_cols = frame.check_inf();
        if !inf_cols.is_empty() {
            warn!("Infinity in columns: {:?}", inf_cols);
        }

        let mut df = frame.without_prefixed(DEBUG_PREFIX);
        if self.calendar && !df.is_empty() {
            add_calendar_features(&mut df)?;
        }
        let filled = df.fill_non_finite(0.0);
        if filled > 0 {
            debug!("Zero-filled {} non-finite values", filled);
        }
        Ok(df)
    }

    /// Fit a scaler on the training frame and return it with the scaled frame.
    /// Under `Clip` the scaled values are clamped into the bounds.
    pub fn fit_transform(&self, frame: &FeatureFrame) -> Result<(FittedScaler, FeatureFrame)> {
        let prepared = self.prepare(frame)?;
        let scaler = FittedScaler::fit(self.scaler, &prepared)?;
        let mut scaled = scaler.transform(&prepared)?;
        if self.outliers == OutlierPolicy::Clip {
            scaled = self.clip(&scaled)?;
        }
        Ok((scaler, scaled))
    }

    /// Scale live data with a previously fitted scaler. Live rows are never
    /// dropped, so they are always clamped.
    pub fn transform(&self, scaler: &FittedScaler, frame: &FeatureFrame) -> Result<FeatureFrame> {
        let prepared = self.prepare(frame)?;
        let scaled = scaler.transform(&prepared)?;
        self.clip(&scaled)
    }

    /// Self-contained scaling of a frame on its own statistics.
    pub fn transform_standalone(&self, frame: &FeatureFrame) -> Result<FeatureFrame> {
        let prepared = self.prepare(frame)?;
        let scaler = FittedScaler::fit(self.scaler, &prepared)?;
        let scaled = scaler.transform(&prepared)?;
        self.clip(&scaled)
    }

    fn clip(&self, frame: &FeatureFrame) -> Result<FeatureFrame> {
        let [lo, hi] = self.bounds;
        let mut out = FeatureFrame::new(frame.index().to_vec());
        for name in frame.column_names() {
            let col = frame.column(name)?.iter().map(|v| v.clamp(lo, hi)).collect();
            out.insert(name.clone(), col)?;
        }
        Ok(out)
    }

    /// Drop rows with any value outside the bounds. Both label vectors are
    /// filtered with the same row mask.
    pub fn remove_outliers(
        &self,
        frame: &FeatureFrame,
        entries: &[f64],
        exits: &[f64],
    ) -> Result<(FeatureFrame, Vec<f64>, Vec<f64>)> {
        if entries.len() != frame.len() || exits.len() != frame.len() {
            return Err(PipelineError::ColumnLength {
                name: "labels".to_string(),
                expected: frame.len(),
                actual: entries.len().min(exits.len()),
            });
        }
        let [lo, hi] = self.bounds;
        let matrix = frame.to_matrix();
        let keep: Vec<usize> = matrix
            .rows()
            .into_iter()
            .enumerate()
            .filter(|(_, row)| row.iter().all(|v| *v >= lo && *v <= hi))
            .map(|(i, _)| i)
            .collect();

        let dropped = frame.len() - keep.len();
        if dropped > 0 {
            debug!("Removed {} outlier rows", dropped);
        }
        Ok((
            frame.select_rows(&keep),
            keep.iter().map(|&i| entries[i]).collect(),
            keep.iter().map(|&i| exits[i]).collect(),
        ))
    }
}

fn add_calendar_features(frame: &mut FeatureFrame) -> Result<()> {
    let anchor = calendar_anchor();
    let index = frame.index().to_vec();
    let columns: [Vec<f64>; 5] = [
        index.iter().map(|t| (*t - anchor).num_days() as f64).collect(),
        index.iter().map(|t| t.weekday().num_days_from_monday() as f64).collect(),
        index.iter().map(|t| t.day() as f64).collect(),
        index.iter().map(|t| t.iso_week().week() as f64).collect(),
        index.iter().map(|t| t.month() as f64).collect(),
    ];
    for (name, values) in CALENDAR_COLUMNS.iter().zip(columns) {
        frame.insert(*name, values)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn frame_with(cols: &[(&str, Vec<f64>)]) -> FeatureFrame {
        let n = cols[0].1.len();
        let start = Utc.with_ymd_and_hms(2023, 5, 1, 0, 0, 0).unwrap();
        let mut f = FeatureFrame::new((0..n).map(|i| start + Duration::days(i as i64)).collect());
        for (name, values) in cols {
            f.insert(*name, values.clone()).unwrap();
        }
        f
    }

    fn settings(scaler: ScalerKind, policy: OutlierPolicy, calendar: bool) -> NormalizeSettings {
        NormalizeSettings {
            scaler,
            outlier_policy: policy,
            outlier_bounds: [-3.0, 3.0],
            calendar_features: calendar,
            reuse_training_scaler: true,
        }
    }

    #[test]
    fn test_minmax_fit_transform_drops_debug_columns() {
        let f = frame_with(&[
            ("close", vec![1.0, 2.0, 3.0, 5.0]),
            ("%future_gain", vec![9.0, 9.0, 9.0, 9.0]),
        ]);
        let norm = FeatureNormalizer::new(&settings(ScalerKind::MinMax, OutlierPolicy::Clip, false));
        let (scaler, scaled) = norm.fit_transform(&f).unwrap();
        assert_eq!(scaler.columns, vec!["close".to_string()]);
        assert_eq!(scaled.get("close").unwrap(), &[0.0, 0.25, 0.5, 1.0]);
        assert!(!scaled.has("%future_gain"));
    }

    #[test]
    fn test_live_transform_reuses_scaler_and_clips() {
        let train = frame_with(&[("x", vec![0.0, 1.0, 2.0])]);
        let live = frame_with(&[("x", vec![1.0, 20.0, -20.0])]);
        let norm = FeatureNormalizer::new(&settings(ScalerKind::MinMax, OutlierPolicy::Clip, false));
        let (scaler, _) = norm.fit_transform(&train).unwrap();
        let out = norm.transform(&scaler, &live).unwrap();
        assert_eq!(out.get("x").unwrap(), &[0.5, 3.0, -3.0]);
    }

    #[test]
    fn test_constant_column_and_non_finite() {
        let f = frame_with(&[
            ("flat", vec![4.0, 4.0, 4.0]),
            ("ratio", vec![1.0, f64::INFINITY, 3.0]),
        ]);
        let norm = FeatureNormalizer::new(&settings(ScalerKind::Standard, OutlierPolicy::Clip, false));
        let (_, scaled) = norm.fit_transform(&f).unwrap();
        assert_eq!(scaled.get("flat").unwrap(), &[0.0, 0.0, 0.0]);
        assert!(scaled.get("ratio").unwrap().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_calendar_features() {
        let f = frame_with(&[("close", vec![1.0, 2.0])]);
        let norm = FeatureNormalizer::new(&settings(ScalerKind::MinMax, OutlierPolicy::Clip, true));
        let prepared = norm.prepare(&f).unwrap();
        // 2023-05-01 is a Monday
        assert_eq!(prepared.get("day_of_week").unwrap(), &[0.0, 1.0]);
        assert_eq!(prepared.get("day_of_month").unwrap(), &[1.0, 2.0]);
        assert_eq!(prepared.get("month").unwrap(), &[5.0, 5.0]);
        assert_eq!(prepared.get("week_of_year").unwrap(), &[18.0, 18.0]);
        assert_eq!(prepared.get("days_from_start").unwrap()[0], 1216.0);
    }

    #[test]
    fn test_remove_outliers_keeps_labels_aligned() {
        let f = frame_with(&[("z", vec![0.0, 5.0, -1.0, -4.0, 2.0])]);
        let norm = FeatureNormalizer::new(&settings(ScalerKind::Standard, OutlierPolicy::RemoveRows, false));
        let entries = [1.0, 1.0, 0.0, 0.0, 1.0];
        let exits = [0.0, 0.0, 1.0, 1.0, 0.0];
        let (kept, e, x) = norm.remove_outliers(&f, &entries, &exits).unwrap();
        assert_eq!(kept.get("z").unwrap(), &[0.0, -1.0, 2.0]);
        assert_eq!(e, vec![1.0, 0.0, 1.0]);
        assert_eq!(x, vec![0.0, 1.0, 0.0]);
        assert!(norm.remove_outliers(&f, &entries[..2], &exits).is_err());
    }

    #[test]
    fn test_robust_quantiles() {
        assert_eq!(quantile(&[1.0, 2.0, 3.0, 4.0, 5.0], 0.5), 3.0);
        assert_eq!(quantile(&[1.0, 2.0, 3.0, 4.0], 0.25), 1.75);
    }
}
