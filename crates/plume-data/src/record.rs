//! Facility-year records and the dataset schema boundary.
//!
//! Records are plain typed structs. They only become a polars [`DataFrame`]
//! through [`Dataset::to_frame`], which validates the tracked measurement
//! fields first so that a missing column is reported here rather than deep
//! inside feature assembly.

use crate::error::{DataError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Column names of the frame produced by [`Dataset::to_frame`].
pub mod columns {
    /// Dense per-entity identifier, assigned in first-appearance order.
    pub const ENTITY_ID: &str = "entity_id";
    /// City of the facility.
    pub const CITY: &str = "city";
    /// Facility name.
    pub const FACILITY_NAME: &str = "facility_name";
    /// Operating company name.
    pub const COMPANY_NAME: &str = "company_name";
    /// NAICS industry code.
    pub const NAICS_CODE: &str = "naics_code";
    /// NAICS industry title.
    pub const NAICS_TITLE: &str = "naics_title";
    /// Province or territory.
    pub const PROVINCE: &str = "province";
    /// Reporting year.
    pub const REPORTING_YEAR: &str = "reporting_year";
    /// Estimation method flag.
    pub const ESTIMATION_METHOD: &str = "estimation_method";
    /// Optional numeric region code.
    pub const REGION: &str = "region";

    /// High-cardinality identity columns, in encoding order.
    pub const IDENTITY: [&str; 5] = [CITY, FACILITY_NAME, NAICS_TITLE, NAICS_CODE, COMPANY_NAME];

    /// Every non-measurement column name. Measurement fields may not reuse these.
    pub const RESERVED: [&str; 10] = [
        ENTITY_ID,
        CITY,
        FACILITY_NAME,
        COMPANY_NAME,
        NAICS_CODE,
        NAICS_TITLE,
        PROVINCE,
        REPORTING_YEAR,
        ESTIMATION_METHOD,
        REGION,
    ];
}

/// One facility-year observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// City of the facility
    pub city: String,
    /// Facility name
    pub facility_name: String,
    /// Operating company name
    pub company_name: String,
    /// NAICS industry code
    pub naics_code: String,
    /// NAICS industry title
    pub naics_title: String,
    /// Province or territory (low cardinality)
    pub province: String,
    /// Reporting year, defines temporal order
    pub reporting_year: i32,
    /// Estimation method flag
    pub estimation_method: String,
    /// Numeric region code, when the source carries one
    pub region: Option<f64>,
    /// Pollutant and release measurements keyed by field name; `None` is missing
    pub measurements: BTreeMap<String, Option<f64>>,
}

impl Record {
    /// Create a record with no measurements and no region.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        city: impl Into<String>,
        facility_name: impl Into<String>,
        company_name: impl Into<String>,
        naics_code: impl Into<String>,
        naics_title: impl Into<String>,
        province: impl Into<String>,
        reporting_year: i32,
        estimation_method: impl Into<String>,
    ) -> Self {
        Self {
            city: city.into(),
            facility_name: facility_name.into(),
            company_name: company_name.into(),
            naics_code: naics_code.into(),
            naics_title: naics_title.into(),
            province: province.into(),
            reporting_year,
            estimation_method: estimation_method.into(),
            region: None,
            measurements: BTreeMap::new(),
        }
    }

    /// Set a measurement value.
    pub fn with_measurement(mut self, field: impl Into<String>, value: Option<f64>) -> Self {
        self.measurements.insert(field.into(), value);
        self
    }

    /// Set the region code.
    pub const fn with_region(mut self, region: f64) -> Self {
        self.region = Some(region);
        self
    }

    /// Measurement value for a field. NaN counts as missing.
    pub fn measurement(&self, field: &str) -> Option<f64> {
        self.measurements
            .get(field)
            .copied()
            .flatten()
            .filter(|v| !v.is_nan())
    }

    /// Key identifying the facility across years.
    pub fn entity_key(&self) -> (&str, &str, &str) {
        (&self.company_name, &self.facility_name, &self.city)
    }
}

/// Ordered collection of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    records: Vec<Record>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    text_columns: BTreeMap<String, String>,
}

impl Dataset {
    /// Create a dataset from records.
    pub const fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            text_columns: BTreeMap::new(),
        }
    }

    /// Attach the source columns that were skipped for holding text, each
    /// with a description of its first non-numeric cell.
    pub fn with_text_columns(mut self, text_columns: BTreeMap<String, String>) -> Self {
        self.text_columns = text_columns;
        self
    }

    /// Concatenate a raw partition and a held-out partition, raw rows first.
    pub fn combine(raw: Self, held_out: Self) -> Self {
        let mut records = raw.records;
        records.extend(held_out.records);
        let mut text_columns = raw.text_columns;
        for (name, reason) in held_out.text_columns {
            text_columns.entry(name).or_insert(reason);
        }
        Self {
            records,
            text_columns,
        }
    }

    /// Source columns left out of the records because they hold text.
    pub const fn text_columns(&self) -> &BTreeMap<String, String> {
        &self.text_columns
    }

    /// Records in insertion order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the dataset has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Earliest and latest reporting year.
    pub fn year_range(&self) -> Option<(i32, i32)> {
        let min = self.records.iter().map(|r| r.reporting_year).min()?;
        let max = self.records.iter().map(|r| r.reporting_year).max()?;
        Some((min, max))
    }

    /// Every measurement field carried by at least one record.
    pub fn measurement_fields(&self) -> BTreeSet<String> {
        self.records
            .iter()
            .flat_map(|r| r.measurements.keys().cloned())
            .collect()
    }

    /// Whether every record carries a region code.
    pub fn has_region(&self) -> bool {
        !self.records.is_empty() && self.records.iter().all(|r| r.region.is_some())
    }

    /// Validate the tracked fields and build the polars frame.
    ///
    /// The frame holds `entity_id`, the identity and categorical columns,
    /// `reporting_year`, `region` (only when every record has one) and one
    /// nullable `Float64` column per tracked field. Row order is preserved.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::Empty`] for an empty dataset and
    /// [`DataError::Schema`] when a tracked field is absent from every record,
    /// holds text, is listed twice, or collides with a reserved column name.
    pub fn to_frame(&self, tracked_fields: &[String]) -> Result<DataFrame> {
        if self.records.is_empty() {
            return Err(DataError::Empty(
                "no records to build a frame from".to_string(),
            ));
        }

        let present = self.measurement_fields();
        let mut seen = BTreeSet::new();
        for field in tracked_fields {
            if columns::RESERVED.contains(&field.as_str()) {
                return Err(DataError::schema(
                    field,
                    "measurement name collides with a reserved column",
                ));
            }
            if !seen.insert(field.as_str()) {
                return Err(DataError::schema(field, "tracked field listed more than once"));
            }
            if let Some(reason) = self.text_columns.get(field) {
                return Err(DataError::schema(field, format!("not numeric: {reason}")));
            }
            if !present.contains(field) {
                return Err(DataError::schema(field, "not present in any record"));
            }
        }

        let mut entity_ids: HashMap<(&str, &str, &str), u32> = HashMap::new();
        let ids: Vec<u32> = self
            .records
            .iter()
            .map(|r| {
                let next = entity_ids.len() as u32;
                *entity_ids.entry(r.entity_key()).or_insert(next)
            })
            .collect();

        let mut cols = vec![
            Column::new(columns::ENTITY_ID.into(), ids),
            text_column(&self.records, columns::CITY, |r| &r.city),
            text_column(&self.records, columns::FACILITY_NAME, |r| &r.facility_name),
            text_column(&self.records, columns::COMPANY_NAME, |r| &r.company_name),
            text_column(&self.records, columns::NAICS_CODE, |r| &r.naics_code),
            text_column(&self.records, columns::NAICS_TITLE, |r| &r.naics_title),
            text_column(&self.records, columns::PROVINCE, |r| &r.province),
            Column::new(
                columns::REPORTING_YEAR.into(),
                self.records
                    .iter()
                    .map(|r| r.reporting_year)
                    .collect::<Vec<i32>>(),
            ),
            text_column(&self.records, columns::ESTIMATION_METHOD, |r| {
                &r.estimation_method
            }),
        ];

        if self.has_region() {
            let regions: Vec<Option<f64>> = self.records.iter().map(|r| r.region).collect();
            cols.push(Column::new(columns::REGION.into(), regions));
        }

        for field in tracked_fields {
            let values: Vec<Option<f64>> =
                self.records.iter().map(|r| r.measurement(field)).collect();
            cols.push(Column::new(field.as_str().into(), values));
        }

        Ok(DataFrame::new(cols)?)
    }
}

fn text_column(records: &[Record], name: &str, get: fn(&Record) -> &str) -> Column {
    Column::new(name.into(), records.iter().map(get).collect::<Vec<&str>>())
}

impl FromIterator<Record> for Dataset {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
