//! One-hot indicator encoding.

use crate::error::{FeatureError, Result};
use polars::prelude::*;
use std::collections::BTreeSet;

/// Indicator encoder for one categorical string column.
///
/// Categories are the distinct non-null values seen at fit time, sorted.
/// The first one is the reference category and gets no column, so `m`
/// categories yield `m - 1` indicators named `{prefix}_{value}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneHotEncoder {
    column: String,
    prefix: String,
    categories: Vec<String>,
}

impl OneHotEncoder {
    /// Learn the category set of `column`.
    ///
    /// # Errors
    ///
    /// [`FeatureError::Schema`] if the column is absent or not a string column.
    pub fn fit(df: &DataFrame, column: &str, prefix: &str) -> Result<Self> {
        let values = string_column(df, column)?;
        let categories: BTreeSet<String> = values
            .into_iter()
            .flatten()
            .map(str::to_string)
            .collect();

        Ok(Self {
            column: column.to_string(),
            prefix: prefix.to_string(),
            categories: categories.into_iter().collect(),
        })
    }

    /// Encoded column.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// All categories seen at fit time, reference first.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Dropped reference category.
    pub fn reference(&self) -> Option<&str> {
        self.categories.first().map(String::as_str)
    }

    /// Indicator column names, in category order.
    pub fn indicator_columns(&self) -> Vec<String> {
        self.categories
            .iter()
            .skip(1)
            .map(|c| self.indicator_name(c))
            .collect()
    }

    fn indicator_name(&self, category: &str) -> String {
        format!("{}_{category}", self.prefix)
    }

    /// Append the indicator columns. The source column is kept.
    ///
    /// A row whose value was not seen at fit time, or is the reference, is
    /// 0.0 in every indicator.
    ///
    /// # Errors
    ///
    /// [`FeatureError::Schema`] if the source column is missing or an
    /// indicator name is already taken.
    pub fn transform(&self, df: DataFrame) -> Result<DataFrame> {
        string_column(&df, &self.column)?;

        let names = self.indicator_columns();
        if let Some(taken) = names.iter().find(|n| df.column(n.as_str()).is_ok()) {
            return Err(FeatureError::schema(
                taken.as_str(),
                "indicator column already exists",
            ));
        }
        if names.is_empty() {
            return Ok(df);
        }

        let indicators: Vec<Expr> = self
            .categories
            .iter()
            .skip(1)
            .zip(&names)
            .map(|(category, name)| {
                when(col(self.column.as_str()).eq(lit(category.as_str())))
                    .then(lit(1.0))
                    .otherwise(lit(0.0))
                    .alias(name.as_str())
            })
            .collect();

        Ok(df.lazy().with_columns(indicators).collect()?)
    }
}

/// Fit on `df` and encode it in one step, returning the indicator names.
pub fn one_hot_encode(
    df: DataFrame,
    column: &str,
    prefix: &str,
) -> Result<(DataFrame, Vec<String>)> {
    let encoder = OneHotEncoder::fit(&df, column, prefix)?;
    let encoded = encoder.transform(df)?;
    Ok((encoded, encoder.indicator_columns()))
}

fn string_column<'a>(df: &'a DataFrame, column: &str) -> Result<&'a StringChunked> {
    df.column(column)
        .map_err(|_| FeatureError::schema(column, "column not found"))?
        .str()
        .map_err(|_| FeatureError::schema(column, "expected a string column"))
}
