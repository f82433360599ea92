//! Tracked Field Registry
//!
//! Catalogue of the numeric fields lagged alongside the target. The default
//! additional feature set is every field listed here, in registry order.

use std::collections::HashMap;

/// Field categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldCategory {
    /// Facility context (population served, headcount)
    Context,
    /// Releases to air
    AirRelease,
    /// Releases to land
    LandRelease,
    /// Aggregated small releases
    Aggregate,
}

/// Field metadata
#[derive(Debug, Clone)]
pub struct FieldInfo {
    /// Column name as it appears in the source partitions
    pub name: &'static str,
    /// Field category
    pub category: FieldCategory,
    /// Brief description of what the field measures
    pub description: &'static str,
}

/// Get all registered field info
pub fn available_fields() -> Vec<FieldInfo> {
    vec![
        FieldInfo {
            name: "Population",
            category: FieldCategory::Context,
            description: "Population of the surrounding census area",
        },
        FieldInfo {
            name: "Number_of_Employees",
            category: FieldCategory::Context,
            description: "Full-time equivalent employees at the facility",
        },
        FieldInfo {
            name: "Release_to_Air(Fugitive)",
            category: FieldCategory::AirRelease,
            description: "Fugitive releases to air",
        },
        FieldInfo {
            name: "Release_to_Air(Other_Non-Point)",
            category: FieldCategory::AirRelease,
            description: "Other non-point releases to air",
        },
        FieldInfo {
            name: "Release_to_Air(Road dust)",
            category: FieldCategory::AirRelease,
            description: "Road dust releases to air",
        },
        FieldInfo {
            name: "Release_to_Air(Spills)",
            category: FieldCategory::AirRelease,
            description: "Spills to air",
        },
        FieldInfo {
            name: "Release_to_Air(Stack/Point)",
            category: FieldCategory::AirRelease,
            description: "Stack or point-source releases to air",
        },
        FieldInfo {
            name: "Release_to_Air(Storage/Handling)",
            category: FieldCategory::AirRelease,
            description: "Storage and handling releases to air",
        },
        FieldInfo {
            name: "Releases_to_Land(Leaks)",
            category: FieldCategory::LandRelease,
            description: "Leaks to land",
        },
        FieldInfo {
            name: "Releases_to_Land(Other)",
            category: FieldCategory::LandRelease,
            description: "Other releases to land",
        },
        FieldInfo {
            name: "Releases_to_Land(Spills)",
            category: FieldCategory::LandRelease,
            description: "Spills to land",
        },
        FieldInfo {
            name: "Sum_of_release_to_all_media_(<1tonne)",
            category: FieldCategory::Aggregate,
            description: "Releases below one tonne summed over all media",
        },
    ]
}

/// Names of the default additional features, in registry order
pub fn default_additional_features() -> Vec<String> {
    available_fields()
        .into_iter()
        .map(|f| f.name.to_string())
        .collect()
}

/// Get fields by category
pub fn fields_by_category(category: FieldCategory) -> Vec<FieldInfo> {
    available_fields()
        .into_iter()
        .filter(|f| f.category == category)
        .collect()
}

/// Get field info by name
pub fn get_field_info(name: &str) -> Option<FieldInfo> {
    available_fields().into_iter().find(|f| f.name == name)
}

/// Count fields by category
pub fn count_by_category() -> HashMap<FieldCategory, usize> {
    let mut counts = HashMap::new();
    for field in available_fields() {
        *counts.entry(field.category).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_fields_count() {
        assert_eq!(available_fields().len(), 12);
        assert_eq!(default_additional_features().len(), 12);
    }

    #[test]
    fn test_fields_by_category() {
        assert_eq!(fields_by_category(FieldCategory::Context).len(), 2);
        assert_eq!(fields_by_category(FieldCategory::AirRelease).len(), 6);
        assert_eq!(fields_by_category(FieldCategory::LandRelease).len(), 3);
        assert_eq!(fields_by_category(FieldCategory::Aggregate).len(), 1);
    }

    #[test]
    fn test_get_field_info() {
        let info = get_field_info("Releases_to_Land(Leaks)").unwrap();
        assert_eq!(info.category, FieldCategory::LandRelease);
        assert!(get_field_info("Total_Release").is_none());
    }

    #[test]
    fn test_count_by_category() {
        let counts = count_by_category();
        assert_eq!(counts.get(&FieldCategory::AirRelease), Some(&6));
        assert_eq!(counts.values().sum::<usize>(), 12);
    }

    #[test]
    fn test_names_are_unique() {
        let mut names = default_additional_features();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 12);
    }
}
