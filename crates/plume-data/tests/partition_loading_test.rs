//! Integration tests for loading and combining partitions.

use plume_data::loader::{read_partition, write_dataset};
use plume_data::{DataError, Dataset, columns};
use std::fs;

const HEADER: &str = "City,Facility_Name/Installation,NAICS Title/Titre_Code_SCIAN,NAICS/Code_SCIAN,Company_Name/Dénomination_sociale_de_l'entreprise,PROVINCE,Reporting_Year/Année,Estimation_Method/Méthode_destimation,Region,Total_Release";

fn write_csv(dir: &std::path::Path, name: &str, rows: &[&str]) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut body = String::from(HEADER);
    body.push('\n');
    for row in rows {
        body.push_str(row);
        body.push('\n');
    }
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_raw_and_held_out_partitions_combine_into_one_frame() {
    let dir = tempfile::tempdir().unwrap();
    let train = write_csv(
        dir.path(),
        "train.csv",
        &[
            "Sarnia,Plant A,Petro,325110,Acme,ON,2018,M,1,10.0",
            "Sarnia,Plant A,Petro,325110,Acme,ON,2019,M,1,11.0",
        ],
    );
    let test = write_csv(
        dir.path(),
        "test.csv",
        &["Sarnia,Plant A,Petro,325110,Acme,ON,2020,M,1,12.5"],
    );

    let combined = Dataset::combine(read_partition(&train).unwrap(), read_partition(&test).unwrap());
    assert_eq!(combined.len(), 3);
    assert_eq!(combined.year_range(), Some((2018, 2020)));

    let df = combined.to_frame(&["Total_Release".to_string()]).unwrap();
    assert_eq!(df.height(), 3);
    assert!(df.column(columns::REGION).is_ok());
    assert_eq!(df.column(columns::ENTITY_ID).unwrap().unique().unwrap().len(), 1);

    let out = dir.path().join("combined.csv");
    write_dataset(&combined, &out).unwrap();
    assert_eq!(read_partition(&out).unwrap(), combined);
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = read_partition(dir.path().join("absent.csv")).unwrap_err();
    assert!(matches!(err, DataError::Io(_)));
}

#[test]
fn test_text_columns_do_not_block_loading() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("annotated.csv");
    fs::write(
        &path,
        format!(
            "{HEADER},Notes\n\
             Sarnia,Plant A,Petro,325110,Acme,ON,2018,M,1,10.0,\n\
             Sarnia,Plant A,Petro,325110,Acme,ON,2019,M,1,11.0,restated in 2021\n"
        ),
    )
    .unwrap();

    let dataset = read_partition(&path).unwrap();
    assert_eq!(dataset.len(), 2);
    let df = dataset.to_frame(&["Total_Release".to_string()]).unwrap();
    assert!(df.column("Total_Release").is_ok());
    assert!(df.column("Notes").is_err());

    match dataset.to_frame(&["Notes".to_string()]).unwrap_err() {
        DataError::Schema { column, reason } => {
            assert_eq!(column, "Notes");
            assert!(reason.contains("restated in 2021"), "{reason}");
            assert!(reason.contains("line 3"), "{reason}");
        }
        other => panic!("unexpected error: {other}"),
    }
}
