use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// One photo as it appears in the run output. Optional fields are omitted
/// from the JSON entirely when absent.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ImageRecord {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<NaiveTime>,
    /// Decimal degrees, `[lat, lon]` on the wire.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<(f64, f64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// Images grouped by their immediate parent directory, in scan order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FolderGroup {
    pub name: String,
    pub images: Vec<ImageRecord>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CityVisit {
    pub name: String,
    pub visits: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CountrySummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_visit_date: Option<NaiveDate>,
    pub cities: Vec<CityVisit>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RunSummary {
    pub total_running_time: String,
    pub geocoder_calls: u64,
    pub geocoder_errors: u64,
    pub geocoder_timeouts: u64,
    pub original_number_of_files: u64,
    pub files_with_extracted_exif: u64,
    pub extracted_exifs_with_errors: u64,
}

/// The primary output document: diagnostics, folder-grouped records and the
/// per-file error strings accumulated during the run.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RunOutput {
    pub summary: RunSummary,
    pub folders: Vec<FolderGroup>,
    pub errors: Vec<String>,
}

/// The secondary output document consumed by the country/city list view.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CountryOutput {
    pub countries: Vec<CountrySummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn record_serializes_with_wire_field_names() {
        let record = ImageRecord {
            filename: "IMG_0001.jpg".to_string(),
            date: NaiveDate::from_ymd_opt(2022, 3, 10),
            time: chrono::NaiveTime::from_hms_opt(14, 30, 5),
            coordinates: Some((48.8584, 2.2945)),
            city: Some("Paris".to_string()),
            country: Some("France".to_string()),
        };

        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["filename"], "IMG_0001.jpg");
        assert_eq!(json["date"], "2022-03-10");
        assert_eq!(json["time"], "14:30:05");
        assert_eq!(json["coordinates"][0], 48.8584);
        assert_eq!(json["coordinates"][1], 2.2945);
        assert_eq!(json["city"], "Paris");
        assert_eq!(json["country"], "France");
    }

    #[test]
    fn absent_fields_are_omitted_not_null() {
        let record = ImageRecord {
            filename: "no_gps.jpg".to_string(),
            date: None,
            time: None,
            coordinates: None,
            city: None,
            country: None,
        };

        let json = serde_json::to_value(&record).unwrap();
        let object = json.as_object().unwrap();

        assert_eq!(object.len(), 1);
        assert!(object.contains_key("filename"));
    }

    #[test]
    fn summary_uses_snake_case_wire_names() {
        let summary = RunSummary {
            total_running_time: "0m 03s".to_string(),
            geocoder_calls: 4,
            geocoder_errors: 1,
            geocoder_timeouts: 1,
            original_number_of_files: 5,
            files_with_extracted_exif: 3,
            extracted_exifs_with_errors: 2,
        };

        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["total_running_time"], "0m 03s");
        assert_eq!(json["geocoder_calls"], 4);
        assert_eq!(json["original_number_of_files"], 5);
        assert_eq!(json["files_with_extracted_exif"], 3);
        assert_eq!(json["extracted_exifs_with_errors"], 2);
    }

    #[test]
    fn country_output_round_trips() {
        let output = CountryOutput {
            countries: vec![CountrySummary {
                name: "France".to_string(),
                first_visit_date: NaiveDate::from_ymd_opt(2022, 3, 10),
                cities: vec![CityVisit {
                    name: "Paris".to_string(),
                    visits: 2,
                }],
            }],
        };

        let json = serde_json::to_string(&output).unwrap();
        assert!(json.contains("\"first_visit_date\":\"2022-03-10\""));

        let back: CountryOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(back, output);
    }
}
