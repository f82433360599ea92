#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/plume-forecast/plume/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod assembler;
pub mod encoding;
pub mod error;
pub mod lag;
pub mod matrix;
pub mod registry;
pub mod split;

pub use assembler::{AssembledDataset, AssemblerConfig, DatasetAssembler, TargetEncodingScope};
pub use encoding::{
    CategoricalEncoder, OneHotEncoder, TargetEncoder, TargetEncoderConfig, one_hot_encode,
    target_encode,
};
pub use error::{FeatureError, Partition, Result};
pub use lag::{LagFeatureGenerator, lag_column_name};
pub use matrix::{FeatureMatrix, extract_matrix};
pub use registry::{
    FieldCategory, FieldInfo, available_fields, count_by_category, default_additional_features,
    fields_by_category, get_field_info,
};
pub use split::{TemporalSplit, TemporalSplitter};
