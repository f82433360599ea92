//! Dataset assembly.
//!
//! Turns a [`Dataset`] into a frame whose feature columns are all numeric:
//!
//! 1. build the frame for the target plus the additional fields,
//! 2. order rows by entity then reporting year,
//! 3. lag every tracked field,
//! 4. drop rows with any missing value,
//! 5. one-hot encode province and estimation method,
//! 6. target encode the identity columns.

use crate::encoding::{CategoricalEncoder, OneHotEncoder, TargetEncoder, TargetEncoderConfig};
use crate::error::{FeatureError, Partition, Result};
use crate::lag::LagFeatureGenerator;
use plume_data::{Dataset, columns};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which rows the target encoder learns from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetEncodingScope {
    /// Only rows before the cutoff year; test labels never reach the features.
    #[default]
    TrainOnly,
    /// Every assembled row, test partition included.
    Combined,
}

impl TargetEncodingScope {
    /// Configuration spelling.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TrainOnly => "train_only",
            Self::Combined => "combined",
        }
    }
}

impl fmt::Display for TargetEncodingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetEncodingScope {
    type Err = FeatureError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "train_only" => Ok(Self::TrainOnly),
            "combined" => Ok(Self::Combined),
            other => Err(FeatureError::InvalidParameter(format!(
                "unknown target encoding scope '{other}', expected 'train_only' or 'combined'"
            ))),
        }
    }
}

/// Assembly parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblerConfig {
    /// Label field
    pub target: String,
    /// Numeric fields lagged alongside the target
    pub additional_fields: Vec<String>,
    /// Lags per tracked field
    pub n_lags: usize,
    /// First test year; bounds the target encoder's fit rows under
    /// [`TargetEncodingScope::TrainOnly`]
    pub cutoff_year: i32,
    /// Fit rows of the target encoder
    pub encoding_scope: TargetEncodingScope,
    /// Target encoder smoothing
    pub target_encoder: TargetEncoderConfig,
}

impl AssemblerConfig {
    /// Config with no additional fields, train-only encoding and default smoothing.
    pub fn new(target: impl Into<String>, n_lags: usize, cutoff_year: i32) -> Self {
        Self {
            target: target.into(),
            additional_fields: Vec::new(),
            n_lags,
            cutoff_year,
            encoding_scope: TargetEncodingScope::default(),
            target_encoder: TargetEncoderConfig::default(),
        }
    }

    /// Set the additional fields.
    #[must_use]
    pub fn with_additional_fields(mut self, fields: Vec<String>) -> Self {
        self.additional_fields = fields;
        self
    }

    /// Set the encoding scope.
    #[must_use]
    pub const fn with_encoding_scope(mut self, scope: TargetEncodingScope) -> Self {
        self.encoding_scope = scope;
        self
    }

    /// Target followed by the additional fields.
    pub fn tracked_fields(&self) -> Vec<String> {
        std::iter::once(self.target.clone())
            .chain(self.additional_fields.iter().cloned())
            .collect()
    }
}

/// Output of [`DatasetAssembler::assemble`].
#[derive(Debug, Clone)]
pub struct AssembledDataset {
    /// Rows with complete history, ordered by entity then year
    pub frame: DataFrame,
    /// Ordered feature columns of the model
    pub feature_columns: Vec<String>,
    /// Label column
    pub target: String,
    /// Rows removed for missing values
    pub rows_dropped: usize,
    /// Encoders fitted during assembly
    pub encoder: CategoricalEncoder,
}

impl AssembledDataset {
    /// Number of assembled rows.
    pub fn height(&self) -> usize {
        self.frame.height()
    }
}

/// Builds the trainable frame from raw records.
#[derive(Debug, Clone)]
pub struct DatasetAssembler {
    config: AssemblerConfig,
    lags: LagFeatureGenerator,
}

impl DatasetAssembler {
    /// Create an assembler.
    pub fn new(config: AssemblerConfig) -> Self {
        Self {
            config,
            lags: LagFeatureGenerator::default(),
        }
    }

    /// Assembly parameters.
    pub const fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Assemble the dataset.
    ///
    /// Deterministic: the same records in the same order give the same frame
    /// and feature columns.
    ///
    /// # Errors
    ///
    /// - [`FeatureError::Data`] for an empty dataset or a tracked field no
    ///   record carries
    /// - [`FeatureError::InsufficientHistory`] when dropping incomplete rows
    ///   leaves nothing
    /// - [`FeatureError::EmptyPartition`] when the train-only target encoder
    ///   has no rows before the cutoff year
    pub fn assemble(&self, dataset: &Dataset) -> Result<AssembledDataset> {
        let cfg = &self.config;
        let tracked = cfg.tracked_fields();

        let mut df = dataset
            .to_frame(&tracked)?
            .lazy()
            .sort(
                [columns::ENTITY_ID, columns::REPORTING_YEAR],
                SortMultipleOptions::default().with_maintain_order(true),
            )
            .collect()?;

        let mut lag_columns = Vec::with_capacity(tracked.len() * cfg.n_lags);
        for field in &tracked {
            df = self.lags.generate(df, field, cfg.n_lags)?;
            lag_columns.extend(LagFeatureGenerator::column_names(field, cfg.n_lags));
        }

        let rows = df.height();
        let df = drop_incomplete_rows(df)?;
        let rows_dropped = rows - df.height();
        if df.height() == 0 {
            return Err(FeatureError::InsufficientHistory {
                rows,
                n_lags: cfg.n_lags,
            });
        }
        tracing::info!(
            rows = df.height(),
            rows_dropped,
            n_lags = cfg.n_lags,
            "dropped rows lacking history"
        );

        let province = OneHotEncoder::fit(&df, columns::PROVINCE, columns::PROVINCE)?;
        let method = OneHotEncoder::fit(&df, columns::ESTIMATION_METHOD, columns::ESTIMATION_METHOD)?;
        let target_encoder = self.fit_target_encoder(&df)?;

        let encoder = CategoricalEncoder::new()
            .with_one_hot(province)
            .with_one_hot(method)
            .with_target(target_encoder);
        let frame = encoder.transform(df)?;

        let mut feature_columns = lag_columns;
        feature_columns.extend(encoder.indicator_columns());
        feature_columns.extend(columns::IDENTITY.iter().map(|c| c.to_string()));
        if frame.column(columns::REGION).is_ok() {
            feature_columns.push(columns::REGION.to_string());
        }

        tracing::debug!(
            features = feature_columns.len(),
            rows = frame.height(),
            "dataset assembled"
        );

        Ok(AssembledDataset {
            frame,
            feature_columns,
            target: cfg.target.clone(),
            rows_dropped,
            encoder,
        })
    }

    fn fit_target_encoder(&self, df: &DataFrame) -> Result<TargetEncoder> {
        let cfg = &self.config;
        let fit_rows = match cfg.encoding_scope {
            TargetEncodingScope::TrainOnly => {
                let train = df
                    .clone()
                    .lazy()
                    .filter(col(columns::REPORTING_YEAR).lt(lit(cfg.cutoff_year)))
                    .collect()?;
                if train.height() == 0 {
                    return Err(FeatureError::EmptyPartition {
                        partition: Partition::Train,
                        cutoff_year: cfg.cutoff_year,
                        earliest_year: df.column(columns::REPORTING_YEAR)?.i32()?.min(),
                    });
                }
                train
            }
            TargetEncodingScope::Combined => {
                tracing::warn!(
                    cutoff_year = cfg.cutoff_year,
                    "target encoding fitted on all rows; test labels influence the identity features"
                );
                df.clone()
            }
        };

        TargetEncoder::fit(
            &fit_rows,
            &columns::IDENTITY,
            &cfg.target,
            cfg.target_encoder,
        )
    }
}

/// Keep only rows where every column is non-null.
fn drop_incomplete_rows(df: DataFrame) -> Result<DataFrame> {
    let complete = df
        .get_column_names()
        .into_iter()
        .fold(lit(true), |acc, name| {
            acc.and(col(name.as_str()).is_not_null())
        });
    Ok(df.lazy().filter(complete).collect()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use plume_data::Record;
    use rstest::rstest;

    fn dataset(entities: usize, years: std::ops::RangeInclusive<i32>) -> Dataset {
        let provinces = ["ON", "QC", "AB"];
        let mut records = Vec::new();
        for year in years {
            for e in 0..entities {
                records.push(
                    Record::new(
                        "Sarnia",
                        format!("Plant {e}"),
                        "Acme",
                        "325110",
                        "Petrochemicals",
                        provinces[e % provinces.len()],
                        year,
                        if e % 2 == 0 { "M" } else { "E" },
                    )
                    .with_measurement("Total_Release", Some(f64::from(year - 2000) + e as f64))
                    .with_measurement("Population", Some(1000.0 * (e + 1) as f64)),
                );
            }
        }
        Dataset::new(records)
    }

    #[test]
    fn test_assemble_drops_first_n_years_per_entity() {
        let config = AssemblerConfig::new("Total_Release", 2, 2022);
        let out = DatasetAssembler::new(config).assemble(&dataset(5, 2018..=2023)).unwrap();

        assert_eq!(out.height(), 5 * 4);
        assert_eq!(out.rows_dropped, 10);
        let min_year = out.frame.column("reporting_year").unwrap().i32().unwrap().min();
        assert_eq!(min_year, Some(2020));
    }

    #[test]
    fn test_feature_column_order() {
        let config = AssemblerConfig::new("Total_Release", 2, 2022)
            .with_additional_fields(vec!["Population".to_string()]);
        let out = DatasetAssembler::new(config).assemble(&dataset(3, 2018..=2021)).unwrap();

        assert_eq!(
            out.feature_columns,
            vec![
                "Total_Release_lag_1",
                "Total_Release_lag_2",
                "Population_lag_1",
                "Population_lag_2",
                "province_ON",
                "province_QC",
                "estimation_method_M",
                "city",
                "facility_name",
                "naics_title",
                "naics_code",
                "company_name",
            ]
        );
        for name in &out.feature_columns {
            let dtype = out.frame.column(name).unwrap().dtype().clone();
            assert_eq!(dtype, DataType::Float64, "{name}");
        }
    }

    #[test]
    fn test_lag_values_follow_entity_history() {
        let config = AssemblerConfig::new("Total_Release", 1, 2022);
        let out = DatasetAssembler::new(config).assemble(&dataset(2, 2018..=2020)).unwrap();

        let current: Vec<f64> = out.frame.column("Total_Release").unwrap().f64().unwrap().into_no_null_iter().collect();
        let lagged: Vec<f64> = out.frame.column("Total_Release_lag_1").unwrap().f64().unwrap().into_no_null_iter().collect();
        for (now, before) in current.iter().zip(&lagged) {
            assert_eq!(now - before, 1.0);
        }
    }

    #[test]
    fn test_all_rows_dropped_is_insufficient_history() {
        let config = AssemblerConfig::new("Total_Release", 3, 2022);
        let err = DatasetAssembler::new(config).assemble(&dataset(2, 2018..=2020)).unwrap_err();
        assert!(matches!(err, FeatureError::InsufficientHistory { rows: 6, n_lags: 3 }));
    }

    #[rstest]
    #[case(TargetEncodingScope::TrainOnly, true)]
    #[case(TargetEncodingScope::Combined, false)]
    fn test_encoding_scope_bounds_fit_rows(#[case] scope: TargetEncodingScope, #[case] fails: bool) {
        let config = AssemblerConfig::new("Total_Release", 1, 2000).with_encoding_scope(scope);
        let result = DatasetAssembler::new(config).assemble(&dataset(2, 2018..=2020));
        assert_eq!(result.is_err(), fails);
        if let Err(err) = result {
            assert!(matches!(
                err,
                FeatureError::EmptyPartition { partition: Partition::Train, cutoff_year: 2000, earliest_year: Some(2019) }
            ));
        }
    }

    #[test]
    fn test_train_only_scope_ignores_test_labels() {
        let base = AssemblerConfig::new("Total_Release", 1, 2020);
        let out = DatasetAssembler::new(base).assemble(&dataset(2, 2018..=2021)).unwrap();
        let encoder = out.encoder.target().unwrap();
        assert_eq!(encoder.fit_rows(), 2);
    }

    #[test]
    fn test_scope_parses_from_config_spelling() {
        assert_eq!("combined".parse::<TargetEncodingScope>().unwrap(), TargetEncodingScope::Combined);
        assert_eq!(TargetEncodingScope::default().to_string(), "train_only");
        assert!("everything".parse::<TargetEncodingScope>().is_err());
    }

    #[test]
    fn test_missing_tracked_field_is_schema_error() {
        let config = AssemblerConfig::new("Total_Release", 1, 2020)
            .with_additional_fields(vec!["Number_of_Employees".to_string()]);
        let err = DatasetAssembler::new(config).assemble(&dataset(2, 2018..=2021)).unwrap_err();
        assert!(matches!(err, FeatureError::Data(_)));
    }
}
