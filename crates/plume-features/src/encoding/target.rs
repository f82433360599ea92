//! Smoothed target-mean encoding.

use crate::error::{FeatureError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Smoothing parameters of the target encoder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetEncoderConfig {
    /// Category count at which the category mean and the prior weigh equally
    pub min_samples_leaf: usize,
    /// Steepness of the blend between prior and category mean
    pub smoothing: f64,
}

impl Default for TargetEncoderConfig {
    fn default() -> Self {
        Self {
            min_samples_leaf: 20,
            smoothing: 10.0,
        }
    }
}

impl TargetEncoderConfig {
    /// Weight of the category mean for a category seen `count` times.
    pub fn weight(&self, count: f64) -> f64 {
        1.0 / (1.0 + (-(count - self.min_samples_leaf as f64) / self.smoothing).exp())
    }

    fn validate(&self) -> Result<()> {
        if self.smoothing.is_finite() && self.smoothing > 0.0 {
            Ok(())
        } else {
            Err(FeatureError::InvalidParameter(format!(
                "target encoding smoothing must be positive, got {}",
                self.smoothing
            )))
        }
    }
}

/// Replaces categories with a smoothed label mean.
///
/// The statistic of each category is
/// `prior * (1 - w) + mean * w` where `prior` is the label mean over all fit
/// rows, `mean` the label mean within the category and `w` the
/// [`TargetEncoderConfig::weight`] of its count. Categories unseen at fit
/// time, and nulls, map to the prior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetEncoder {
    config: TargetEncoderConfig,
    prior: f64,
    mappings: BTreeMap<String, HashMap<String, f64>>,
    fit_rows: usize,
}

impl TargetEncoder {
    /// Fit the statistics of `columns` against `label` over every row of `df`.
    ///
    /// Rows with a null label are ignored. Which rows are passed in decides
    /// which labels leak into the encoding.
    ///
    /// # Errors
    ///
    /// [`FeatureError::Schema`] for a missing or non-string column or a
    /// non-numeric label, [`FeatureError::InvalidParameter`] for a bad
    /// config or when no row carries a label.
    pub fn fit(
        df: &DataFrame,
        columns: &[&str],
        label: &str,
        config: TargetEncoderConfig,
    ) -> Result<Self> {
        config.validate()?;

        let labels = df
            .column(label)
            .map_err(|_| FeatureError::schema(label, "label column not found"))?
            .cast(&DataType::Float64)
            .map_err(|_| FeatureError::schema(label, "label column is not numeric"))?;
        let labels = labels.f64()?;

        let fit_rows = labels.len() - labels.null_count();
        let prior = labels.mean().ok_or_else(|| {
            FeatureError::InvalidParameter("no labelled rows to fit target encoding on".to_string())
        })?;

        let mut mappings = BTreeMap::new();
        for &column in columns {
            let stats = category_stats(df, column, label)?;
            let mapping = stats
                .into_iter()
                .map(|(category, (mean, count))| {
                    let w = config.weight(count);
                    (category, prior * (1.0 - w) + mean * w)
                })
                .collect();
            mappings.insert(column.to_string(), mapping);
        }

        tracing::debug!(
            columns = columns.len(),
            rows = fit_rows,
            prior,
            "target encoder fitted"
        );

        Ok(Self {
            config,
            prior,
            mappings,
            fit_rows,
        })
    }

    /// Global label mean over the fit rows.
    pub const fn prior(&self) -> f64 {
        self.prior
    }

    /// Number of labelled rows the statistics were computed from.
    pub const fn fit_rows(&self) -> usize {
        self.fit_rows
    }

    /// Smoothing parameters.
    pub const fn config(&self) -> &TargetEncoderConfig {
        &self.config
    }

    /// Encoded columns, sorted.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.mappings.keys().map(String::as_str)
    }

    /// Encoded value for a category of a column.
    pub fn encode(&self, column: &str, category: Option<&str>) -> Option<f64> {
        let mapping = self.mappings.get(column)?;
        Some(
            category
                .and_then(|c| mapping.get(c))
                .copied()
                .unwrap_or(self.prior),
        )
    }

    /// Replace every encoded column with its `Float64` statistic, in place.
    ///
    /// # Errors
    ///
    /// [`FeatureError::Schema`] if an encoded column is missing or is not a
    /// string column.
    pub fn transform(&self, df: DataFrame) -> Result<DataFrame> {
        let mut df = df;
        for (column, mapping) in &self.mappings {
            let encoded: Vec<f64> = df
                .column(column)
                .map_err(|_| FeatureError::schema(column.as_str(), "column not found"))?
                .str()
                .map_err(|_| FeatureError::schema(column.as_str(), "expected a string column"))?
                .into_iter()
                .map(|v| v.and_then(|c| mapping.get(c)).copied().unwrap_or(self.prior))
                .collect();
            df.with_column(Column::new(column.as_str().into(), encoded))?;
        }
        Ok(df)
    }
}

/// Fit on `df` with default smoothing and encode it in one step.
pub fn target_encode(df: DataFrame, columns: &[&str], label: &str) -> Result<DataFrame> {
    let encoder = TargetEncoder::fit(&df, columns, label, TargetEncoderConfig::default())?;
    encoder.transform(df)
}

/// Label mean and count per non-null category, over rows with a label.
fn category_stats(df: &DataFrame, column: &str, label: &str) -> Result<HashMap<String, (f64, f64)>> {
    let source = df
        .column(column)
        .map_err(|_| FeatureError::schema(column, "column not found"))?;
    if source.str().is_err() {
        return Err(FeatureError::schema(column, "expected a string column"));
    }

    let stats = df
        .clone()
        .lazy()
        .select([col(column), col(label).cast(DataType::Float64)])
        .filter(col(label).is_not_null().and(col(column).is_not_null()))
        .group_by([col(column)])
        .agg([
            col(label).mean().alias("label_mean"),
            col(label).count().cast(DataType::Float64).alias("label_count"),
        ])
        .collect()?;

    let keys = stats.column(column)?.str()?;
    let means = stats.column("label_mean")?.f64()?;
    let counts = stats.column("label_count")?.f64()?;

    Ok(keys
        .into_iter()
        .zip(means.into_iter())
        .zip(counts.into_iter())
        .filter_map(|((key, mean), count)| Some((key?.to_string(), (mean?, count?))))
        .collect())
}
