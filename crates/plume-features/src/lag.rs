//! Lagged copies of tracked fields.
//!
//! `field_lag_k` holds the value of `field` from `k` rows earlier within the
//! same entity. The frame must already be ordered by reporting year inside
//! each entity; the generator never reorders rows.

use crate::error::{FeatureError, Result};
use plume_data::columns;
use polars::prelude::*;

/// Name of the `k`-th lag column of `field`.
pub fn lag_column_name(field: &str, k: usize) -> String {
    format!("{field}_lag_{k}")
}

/// Generates per-entity lag columns.
#[derive(Debug, Clone)]
pub struct LagFeatureGenerator {
    entity_column: String,
}

impl Default for LagFeatureGenerator {
    fn default() -> Self {
        Self::new(columns::ENTITY_ID)
    }
}

impl LagFeatureGenerator {
    /// Create a generator that shifts within groups of `entity_column`.
    pub fn new(entity_column: impl Into<String>) -> Self {
        Self {
            entity_column: entity_column.into(),
        }
    }

    /// Column identifying the entity.
    pub fn entity_column(&self) -> &str {
        &self.entity_column
    }

    /// Names of the columns [`generate`](Self::generate) adds, in order.
    pub fn column_names(field: &str, n_lags: usize) -> Vec<String> {
        (1..=n_lags).map(|k| lag_column_name(field, k)).collect()
    }

    /// Append `field_lag_1..=field_lag_n` to the frame.
    ///
    /// The first `k` rows of each entity get a null in `field_lag_k`. Row
    /// count and row order are unchanged. `n_lags == 0` returns the frame
    /// as is.
    ///
    /// # Errors
    ///
    /// [`FeatureError::Schema`] if `field` or the entity column is missing,
    /// or if a lag column name is already taken.
    pub fn generate(&self, df: DataFrame, field: &str, n_lags: usize) -> Result<DataFrame> {
        for required in [self.entity_column.as_str(), field] {
            if df.column(required).is_err() {
                return Err(FeatureError::schema(required, "column not found"));
            }
        }

        let names = Self::column_names(field, n_lags);
        if let Some(taken) = names.iter().find(|n| df.column(n.as_str()).is_ok()) {
            return Err(FeatureError::schema(
                taken.as_str(),
                "lag column already exists",
            ));
        }
        if names.is_empty() {
            return Ok(df);
        }

        let lags: Vec<Expr> = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                col(field)
                    .shift(lit((i + 1) as i64))
                    .over([col(self.entity_column.as_str())])
                    .alias(name.as_str())
            })
            .collect();

        Ok(df.lazy().with_columns(lags).collect()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn frame() -> DataFrame {
        df! {
            "entity_id" => [0u32, 0, 0, 1, 1, 1],
            "reporting_year" => [2019i32, 2020, 2021, 2019, 2020, 2021],
            "Total_Release" => [1.0f64, 2.0, 3.0, 10.0, 20.0, 30.0],
        }
        .unwrap()
    }

    fn values(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
        df.column(name).unwrap().f64().unwrap().into_iter().collect()
    }

    #[test]
    fn test_lags_shift_within_entity() {
        let out = LagFeatureGenerator::default()
            .generate(frame(), "Total_Release", 2)
            .unwrap();

        assert_eq!(out.height(), 6);
        assert_eq!(
            values(&out, "Total_Release_lag_1"),
            vec![None, Some(1.0), Some(2.0), None, Some(10.0), Some(20.0)]
        );
        assert_eq!(
            values(&out, "Total_Release_lag_2"),
            vec![None, None, Some(1.0), None, None, Some(10.0)]
        );
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(4)]
    fn test_adds_exactly_n_columns(#[case] n_lags: usize) {
        let before = frame().width();
        let out = LagFeatureGenerator::default()
            .generate(frame(), "Total_Release", n_lags)
            .unwrap();
        assert_eq!(out.width(), before + n_lags);
    }

    #[test]
    fn test_missing_field_is_schema_error() {
        let err = LagFeatureGenerator::default()
            .generate(frame(), "Population", 1)
            .unwrap_err();
        assert!(matches!(err, FeatureError::Schema { column, .. } if column == "Population"));
    }

    #[test]
    fn test_reapplying_same_field_collides() {
        let gen_ = LagFeatureGenerator::default();
        let once = gen_.generate(frame(), "Total_Release", 1).unwrap();
        let err = gen_.generate(once, "Total_Release", 1).unwrap_err();
        assert!(matches!(err, FeatureError::Schema { .. }));
    }

    #[test]
    fn test_distinct_fields_do_not_collide() {
        let mut df = frame();
        df.with_column(Column::new("Population".into(), vec![5.0f64; 6]))
            .unwrap();
        let gen_ = LagFeatureGenerator::default();
        let df = gen_.generate(df, "Total_Release", 2).unwrap();
        let df = gen_.generate(df, "Population", 2).unwrap();
        assert!(df.column("Population_lag_2").is_ok());
        assert!(df.column("Total_Release_lag_2").is_ok());
    }
}
