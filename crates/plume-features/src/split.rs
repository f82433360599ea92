//! Temporal train/test split.

use crate::error::{FeatureError, Partition, Result};
use plume_data::columns;
use polars::prelude::*;

/// Result of [`TemporalSplitter::split`].
#[derive(Debug, Clone)]
pub struct TemporalSplit {
    /// Rows with reporting year strictly before the cutoff
    pub train: DataFrame,
    /// Rows with reporting year at or after the cutoff
    pub test: DataFrame,
    /// Cutoff year used
    pub cutoff_year: i32,
    /// Earliest reporting year in the input, if it had rows
    pub earliest_year: Option<i32>,
}

impl TemporalSplit {
    /// Fail unless the train partition has rows.
    ///
    /// # Errors
    ///
    /// [`FeatureError::EmptyPartition`] naming the cutoff and earliest year.
    pub fn ensure_trainable(&self) -> Result<()> {
        if self.train.height() == 0 {
            return Err(FeatureError::EmptyPartition {
                partition: Partition::Train,
                cutoff_year: self.cutoff_year,
                earliest_year: self.earliest_year,
            });
        }
        Ok(())
    }

    /// Whether the test partition has rows.
    pub fn has_test(&self) -> bool {
        self.test.height() > 0
    }
}

/// Splits a frame on a reporting-year cutoff.
#[derive(Debug, Clone)]
pub struct TemporalSplitter {
    year_column: String,
}

impl Default for TemporalSplitter {
    fn default() -> Self {
        Self::new(columns::REPORTING_YEAR)
    }
}

impl TemporalSplitter {
    /// Create a splitter on `year_column`.
    pub fn new(year_column: impl Into<String>) -> Self {
        Self {
            year_column: year_column.into(),
        }
    }

    /// Partition `frame` into years `< cutoff_year` and `>= cutoff_year`.
    ///
    /// Either side may be empty. Row order within each side is kept.
    ///
    /// # Errors
    ///
    /// [`FeatureError::Schema`] if the year column is missing or not integral.
    pub fn split(&self, frame: &DataFrame, cutoff_year: i32) -> Result<TemporalSplit> {
        let year = self.year_column.as_str();
        let years = frame
            .column(year)
            .map_err(|_| FeatureError::schema(year, "column not found"))?
            .cast(&DataType::Int32)
            .map_err(|_| FeatureError::schema(year, "expected an integer year"))?;
        let earliest_year = years.i32()?.min();

        let lf = frame.clone().lazy();
        let train = lf
            .clone()
            .filter(col(year).lt(lit(cutoff_year)))
            .collect()?;
        let test = lf.filter(col(year).gt_eq(lit(cutoff_year))).collect()?;

        tracing::debug!(
            cutoff_year,
            train = train.height(),
            test = test.height(),
            "temporal split"
        );

        Ok(TemporalSplit {
            train,
            test,
            cutoff_year,
            earliest_year,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn frame() -> DataFrame {
        DataFrame::new(vec![
            Column::new("reporting_year".into(), vec![2019i32, 2020, 2021, 2022, 2023, 2021]),
            Column::new("row".into(), vec![0u32, 1, 2, 3, 4, 5]),
        ])
        .unwrap()
    }

    fn rows(df: &DataFrame) -> Vec<u32> {
        df.column("row").unwrap().u32().unwrap().into_no_null_iter().collect()
    }

    #[rstest]
    #[case(2019, 0, 6)]
    #[case(2022, 4, 2)]
    #[case(2024, 6, 0)]
    fn test_partitions_are_disjoint_and_cover_input(
        #[case] cutoff: i32,
        #[case] n_train: usize,
        #[case] n_test: usize,
    ) {
        let split = TemporalSplitter::default().split(&frame(), cutoff).unwrap();
        assert_eq!(split.train.height(), n_train);
        assert_eq!(split.test.height(), n_test);

        let mut all = rows(&split.train);
        all.extend(rows(&split.test));
        all.sort_unstable();
        assert_eq!(all, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_year_boundary() {
        let split = TemporalSplitter::default().split(&frame(), 2022).unwrap();
        let train_years = split.train.column("reporting_year").unwrap().i32().unwrap().max();
        let test_years = split.test.column("reporting_year").unwrap().i32().unwrap().min();
        assert_eq!(train_years, Some(2021));
        assert_eq!(test_years, Some(2022));
        assert_eq!(rows(&split.train), vec![0, 1, 2, 5]);
    }

    #[test]
    fn test_cutoff_before_data_is_not_trainable() {
        let split = TemporalSplitter::default().split(&frame(), 2010).unwrap();
        let err = split.ensure_trainable().unwrap_err();
        match err {
            FeatureError::EmptyPartition {
                partition,
                cutoff_year,
                earliest_year,
            } => {
                assert_eq!(partition, Partition::Train);
                assert_eq!(cutoff_year, 2010);
                assert_eq!(earliest_year, Some(2019));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_test_partition_is_valid() {
        let split = TemporalSplitter::default().split(&frame(), 2030).unwrap();
        assert!(split.ensure_trainable().is_ok());
        assert!(!split.has_test());
    }

    #[test]
    fn test_missing_year_column() {
        let df = frame().drop("reporting_year").unwrap();
        assert!(matches!(
            TemporalSplitter::default().split(&df, 2020),
            Err(FeatureError::Schema { .. })
        ));
    }
}
