//! Categorical encoding.
//!
//! Low-cardinality columns become 0/1 indicator columns ([`OneHotEncoder`]);
//! high-cardinality identity columns are replaced in place by a smoothed
//! mean of the label ([`TargetEncoder`]). Both are fit once and can then be
//! applied to any frame with the same columns.

mod one_hot;
mod target;

pub use one_hot::{OneHotEncoder, one_hot_encode};
pub use target::{TargetEncoder, TargetEncoderConfig, target_encode};

use crate::error::Result;
use polars::prelude::DataFrame;

/// The fitted encoders of one assembled dataset.
#[derive(Debug, Clone, Default)]
pub struct CategoricalEncoder {
    one_hot: Vec<OneHotEncoder>,
    target: Option<TargetEncoder>,
}

impl CategoricalEncoder {
    /// Create an encoder with nothing fitted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fitted one-hot encoder. Indicators are emitted in insertion order.
    #[must_use]
    pub fn with_one_hot(mut self, encoder: OneHotEncoder) -> Self {
        self.one_hot.push(encoder);
        self
    }

    /// Set the fitted target encoder.
    #[must_use]
    pub fn with_target(mut self, encoder: TargetEncoder) -> Self {
        self.target = Some(encoder);
        self
    }

    /// Fitted one-hot encoders.
    pub fn one_hot(&self) -> &[OneHotEncoder] {
        &self.one_hot
    }

    /// Fitted target encoder, if any.
    pub const fn target(&self) -> Option<&TargetEncoder> {
        self.target.as_ref()
    }

    /// Every indicator column the one-hot encoders produce.
    pub fn indicator_columns(&self) -> Vec<String> {
        self.one_hot
            .iter()
            .flat_map(OneHotEncoder::indicator_columns)
            .collect()
    }

    /// Apply every fitted encoder to a frame.
    pub fn transform(&self, df: DataFrame) -> Result<DataFrame> {
        let mut df = df;
        for encoder in &self.one_hot {
            df = encoder.transform(df)?;
        }
        match &self.target {
            Some(encoder) => encoder.transform(df),
            None => Ok(df),
        }
    }
}
