//! Integration tests for assembling, splitting and extracting features.

use plume_data::{Dataset, Record};
use plume_features::{
    AssemblerConfig, DatasetAssembler, TargetEncodingScope, TemporalSplitter, extract_matrix,
};

/// Five facilities reporting every year from 2018 to 2023.
fn five_by_six() -> Dataset {
    let facilities = [
        ("Sarnia", "Plant A", "Acme", "ON", "M"),
        ("Sarnia", "Plant B", "Acme", "ON", "E"),
        ("Regina", "Refinery", "Prairie Oil", "SK", "M"),
        ("Montreal", "Smelter", "Nord", "QC", "C"),
        ("Calgary", "Gas Plant", "Foothills", "AB", "E"),
    ];
    // Records arrive year-major so the assembler has to regroup them.
    (2018..=2023)
        .flat_map(|year| {
            facilities
                .iter()
                .enumerate()
                .map(move |(i, (city, facility, company, province, method))| {
                    let base = 100.0 * (i + 1) as f64;
                    Record::new(*city, *facility, *company, "325110", "Chemicals", *province, year, *method)
                        .with_measurement("Total_Release", Some(base + f64::from(year - 2018) * 5.0))
                })
        })
        .collect()
}

#[test]
fn test_five_entities_six_years_two_lags() {
    let config = AssemblerConfig::new("Total_Release", 2, 2022);
    let assembled = DatasetAssembler::new(config).assemble(&five_by_six()).unwrap();

    assert_eq!(assembled.height(), 20);
    assert_eq!(assembled.rows_dropped, 10);
    assert!(assembled.feature_columns.starts_with(&[
        "Total_Release_lag_1".to_string(),
        "Total_Release_lag_2".to_string(),
    ]));
    // 4 provinces -> 3 indicators, 3 methods -> 2 indicators
    assert_eq!(assembled.encoder.indicator_columns().len(), 5);

    let split = TemporalSplitter::default().split(&assembled.frame, 2022).unwrap();
    split.ensure_trainable().unwrap();
    assert_eq!(split.train.height(), 10);
    assert_eq!(split.test.height(), 10);

    let (x, y) = extract_matrix(&split.train, &assembled.feature_columns, &assembled.target).unwrap();
    assert_eq!(x.nrows(), y.len());
    assert_eq!(x.ncols(), assembled.feature_columns.len());
}

#[test]
fn test_assembly_is_idempotent() {
    let config = AssemblerConfig::new("Total_Release", 2, 2022);
    let assembler = DatasetAssembler::new(config);

    let first = assembler.assemble(&five_by_six()).unwrap();
    let second = assembler.assemble(&five_by_six()).unwrap();

    assert_eq!(first.feature_columns, second.feature_columns);
    assert!(first.frame.equals(&second.frame));
}

#[test]
fn test_combined_scope_sees_test_labels() {
    let train_only = DatasetAssembler::new(AssemblerConfig::new("Total_Release", 2, 2022))
        .assemble(&five_by_six())
        .unwrap();
    let combined = DatasetAssembler::new(
        AssemblerConfig::new("Total_Release", 2, 2022)
            .with_encoding_scope(TargetEncodingScope::Combined),
    )
    .assemble(&five_by_six())
    .unwrap();

    assert_eq!(train_only.encoder.target().unwrap().fit_rows(), 10);
    assert_eq!(combined.encoder.target().unwrap().fit_rows(), 20);
    assert!(combined.encoder.target().unwrap().prior() > train_only.encoder.target().unwrap().prior());
}

#[test]
fn test_cutoff_before_data_fails_fast() {
    let config = AssemblerConfig::new("Total_Release", 2, 2022);
    let assembled = DatasetAssembler::new(config).assemble(&five_by_six()).unwrap();
    let split = TemporalSplitter::default().split(&assembled.frame, 2015).unwrap();
    let message = split.ensure_trainable().unwrap_err().to_string();
    assert!(message.contains("2015"), "{message}");
    assert!(message.contains("2020"), "{message}");
}
