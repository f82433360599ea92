//! CSV partition loading.
//!
//! Partitions use the bilingual headers of the published inventory files.
//! The identity, province, year and method headers are required; `Region` is
//! optional. Every other header whose cells are all numbers or empty is read
//! as a measurement, an empty cell meaning missing. A column holding any other
//! text is not a measurement: it is left out of the records and remembered on
//! the [`Dataset`] so that tracking it later fails with the offending cell.

use crate::error::{DataError, Result};
use crate::record::{Dataset, Record};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};
use std::path::Path;

/// Source column headers.
pub mod headers {
    /// City header.
    pub const CITY: &str = "City";
    /// Facility name header.
    pub const FACILITY_NAME: &str = "Facility_Name/Installation";
    /// NAICS title header.
    pub const NAICS_TITLE: &str = "NAICS Title/Titre_Code_SCIAN";
    /// NAICS code header.
    pub const NAICS_CODE: &str = "NAICS/Code_SCIAN";
    /// Company name header.
    pub const COMPANY_NAME: &str = "Company_Name/Dénomination_sociale_de_l'entreprise";
    /// Province header.
    pub const PROVINCE: &str = "PROVINCE";
    /// Reporting year header.
    pub const REPORTING_YEAR: &str = "Reporting_Year/Année";
    /// Estimation method header.
    pub const ESTIMATION_METHOD: &str = "Estimation_Method/Méthode_destimation";
    /// Optional region header.
    pub const REGION: &str = "Region";

    /// Headers every partition must carry.
    pub const REQUIRED: [&str; 8] = [
        CITY,
        FACILITY_NAME,
        NAICS_TITLE,
        NAICS_CODE,
        COMPANY_NAME,
        PROVINCE,
        REPORTING_YEAR,
        ESTIMATION_METHOD,
    ];
}

/// Read a partition from a CSV file.
pub fn read_partition<P: AsRef<Path>>(path: P) -> Result<Dataset> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let dataset = read_partition_from(file)?;
    tracing::debug!(path = %path.display(), rows = dataset.len(), "partition loaded");
    Ok(dataset)
}

/// Read a partition from any CSV source.
pub fn read_partition_from<R: Read>(reader: R) -> Result<Dataset> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let header_row = rdr.headers()?.clone();
    let position = |name: &str| header_row.iter().position(|h| h == name);

    let mut required = [0usize; 8];
    for (slot, name) in required.iter_mut().zip(headers::REQUIRED) {
        *slot = position(name).ok_or_else(|| DataError::schema(name, "required column missing"))?;
    }
    let [city, facility, naics_title, naics_code, company, province, year, method] = required;
    let region = position(headers::REGION);

    let rows = rdr.records().collect::<std::result::Result<Vec<_>, _>>()?;
    let line_of = |row: &csv::StringRecord| row.position().map_or(0, |p| p.line());

    let mut measurement_columns: Vec<(usize, String)> = Vec::new();
    let mut text_columns = BTreeMap::new();
    for (idx, name) in header_row.iter().enumerate() {
        if headers::REQUIRED.contains(&name) || name == headers::REGION {
            continue;
        }
        let offending = rows.iter().find_map(|row| {
            let raw = row.get(idx).unwrap_or("");
            parse_optional(raw).is_err().then(|| (line_of(row), raw))
        });
        match offending {
            None => measurement_columns.push((idx, name.to_string())),
            Some((line, raw)) => {
                tracing::debug!(column = name, line, "skipping non-numeric column");
                text_columns.insert(name.to_string(), format!("malformed value '{raw}' on line {line}"));
            }
        }
    }

    let mut records = Vec::with_capacity(rows.len());
    for row in &rows {
        let line = line_of(row);
        let cell = |idx: usize| row.get(idx).unwrap_or("");

        let reporting_year = parse_year(cell(year))
            .ok_or_else(|| malformed(headers::REPORTING_YEAR, line, cell(year)))?;

        let mut record = Record::new(
            cell(city),
            cell(facility),
            cell(company),
            cell(naics_code),
            cell(naics_title),
            cell(province),
            reporting_year,
            cell(method),
        );

        if let Some(idx) = region {
            record.region = parse_optional(cell(idx))
                .map_err(|_| malformed(headers::REGION, line, cell(idx)))?;
        }

        for (idx, name) in &measurement_columns {
            let value =
                parse_optional(cell(*idx)).map_err(|_| malformed(name, line, cell(*idx)))?;
            record.measurements.insert(name.clone(), value);
        }

        records.push(record);
    }

    Ok(Dataset::new(records).with_text_columns(text_columns))
}

/// Write a dataset to a CSV file using the source headers.
pub fn write_dataset<P: AsRef<Path>>(dataset: &Dataset, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    write_dataset_to(dataset, file)?;
    tracing::debug!(path = %path.display(), rows = dataset.len(), "dataset written");
    Ok(())
}

/// Write a dataset as CSV to any sink.
pub fn write_dataset_to<W: Write>(dataset: &Dataset, writer: W) -> Result<()> {
    let fields: BTreeSet<String> = dataset.measurement_fields();
    let with_region = dataset.records().iter().any(|r| r.region.is_some());

    let mut wtr = csv::Writer::from_writer(writer);

    let mut header: Vec<&str> = headers::REQUIRED.to_vec();
    if with_region {
        header.push(headers::REGION);
    }
    header.extend(fields.iter().map(String::as_str));
    wtr.write_record(&header)?;

    for r in dataset.records() {
        let mut row: Vec<String> = vec![
            r.city.clone(),
            r.facility_name.clone(),
            r.naics_title.clone(),
            r.naics_code.clone(),
            r.company_name.clone(),
            r.province.clone(),
            r.reporting_year.to_string(),
            r.estimation_method.clone(),
        ];
        if with_region {
            row.push(format_optional(r.region));
        }
        row.extend(
            fields
                .iter()
                .map(|f| format_optional(r.measurements.get(f).copied().flatten())),
        );
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

fn parse_year(raw: &str) -> Option<i32> {
    raw.parse::<i32>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|y| y.fract() == 0.0 && y.abs() < f64::from(i32::MAX))
            .map(|y| y as i32)
    })
}

fn parse_optional(raw: &str) -> std::result::Result<Option<f64>, std::num::ParseFloatError> {
    if raw.is_empty() {
        Ok(None)
    } else {
        raw.parse::<f64>().map(Some)
    }
}

fn format_optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn malformed(column: &str, line: u64, raw: &str) -> DataError {
    DataError::schema(column, format!("malformed value '{raw}' on line {line}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const HEADER: &str = "City,Facility_Name/Installation,NAICS Title/Titre_Code_SCIAN,NAICS/Code_SCIAN,Company_Name/Dénomination_sociale_de_l'entreprise,PROVINCE,Reporting_Year/Année,Estimation_Method/Méthode_destimation";

    #[test]
    fn test_read_partition_from_csv() {
        let csv = format!(
            "{HEADER},Total_Release,Population\n\
             Sarnia,Plant A,Petrochemicals,325110,Acme,ON,2019,M,12.5,71000\n\
             Sarnia,Plant A,Petrochemicals,325110,Acme,ON,2020,M,,71500\n"
        );

        let ds = read_partition_from(csv.as_bytes()).unwrap();
        assert_eq!(ds.len(), 2);

        let first = &ds.records()[0];
        assert_eq!(first.facility_name, "Plant A");
        assert_eq!(first.company_name, "Acme");
        assert_eq!(first.reporting_year, 2019);
        assert_eq!(first.measurement("Total_Release"), Some(12.5));
        assert_eq!(first.region, None);
        assert_eq!(ds.records()[1].measurement("Total_Release"), None);
    }

    #[test]
    fn test_missing_required_header() {
        let csv = "City,PROVINCE\nSarnia,ON\n";
        let err = read_partition_from(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, DataError::Schema { .. }));
    }

    #[rstest]
    #[case("20x9", "Reporting_Year/Année")]
    #[case("2019", "Region")]
    fn test_malformed_cell_names_column(#[case] year: &str, #[case] expected: &str) {
        let csv = format!(
            "{HEADER},Region\n\
             Sarnia,Plant A,Petrochemicals,325110,Acme,ON,{year},M,north\n"
        );
        match read_partition_from(csv.as_bytes()).unwrap_err() {
            DataError::Schema { column, reason } => {
                assert_eq!(column, expected);
                assert!(reason.contains("line 2"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_text_column_is_not_a_measurement() {
        let csv = format!(
            "{HEADER},Total_Release,Comments\n\
             Sarnia,Plant A,Petrochemicals,325110,Acme,ON,2019,M,12.5,\n\
             Sarnia,Plant A,Petrochemicals,325110,Acme,ON,2020,M,13.0,revised figure\n"
        );
        let ds = read_partition_from(csv.as_bytes()).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.records()[1].measurement("Total_Release"), Some(13.0));
        assert!(!ds.records()[1].measurements.contains_key("Comments"));
        assert_eq!(ds.measurement_fields().len(), 1);
        assert!(ds.text_columns()["Comments"].contains("line 3"));
    }

    #[test]
    fn test_year_written_as_float() {
        assert_eq!(parse_year("2019.0"), Some(2019));
        assert_eq!(parse_year("2019.5"), None);
    }

    #[test]
    fn test_write_then_read_preserves_records() {
        let ds = Dataset::new(vec![
            Record::new("Sarnia", "Plant A", "Acme", "325110", "Petro", "ON", 2019, "M")
                .with_measurement("Total_Release", Some(1.5))
                .with_region(2.0),
            Record::new("Regina", "Plant B", "Prairie", "211110", "Oil", "SK", 2020, "E")
                .with_measurement("Total_Release", None),
        ]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("combined.csv");
        write_dataset(&ds, &path).unwrap();

        let back = read_partition(&path).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back.records()[0].region, Some(2.0));
        assert_eq!(back.records()[1].region, None);
        assert_eq!(back.records()[0].measurement("Total_Release"), Some(1.5));
        assert_eq!(back.records()[1].measurement("Total_Release"), None);
    }
}
