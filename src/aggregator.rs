use crate::record::{CityVisit, CountryOutput, CountrySummary, FolderGroup, ImageRecord};

/// Folds per-image records into the two output shapes: folder groups in scan
/// order, and country/city summaries in first-seen order.
///
/// Visit counting is per image: a second photo of the same city on the same
/// day is a second visit. That is a policy carried over from the source data,
/// not a derived statistic.
#[derive(Debug, Default)]
pub struct Aggregator {
    folders: Vec<FolderGroup>,
    countries: Vec<CountrySummary>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, folder: &str, record: ImageRecord) {
        self.tally_place(&record);

        let index = match self.folders.iter().position(|g| g.name == folder) {
            Some(index) => index,
            None => {
                self.folders.push(FolderGroup {
                    name: folder.to_string(),
                    images: Vec::new(),
                });
                self.folders.len() - 1
            }
        };
        self.folders[index].images.push(record);
    }

    /// Country/city bookkeeping. Images without a resolved country stay in
    /// the folder listing but contribute nothing here.
    fn tally_place(&mut self, record: &ImageRecord) {
        let country_name = match &record.country {
            Some(name) => name,
            None => return,
        };

        let index = match self.countries.iter().position(|c| &c.name == country_name) {
            Some(index) => index,
            None => {
                self.countries.push(CountrySummary {
                    name: country_name.clone(),
                    first_visit_date: None,
                    cities: Vec::new(),
                });
                self.countries.len() - 1
            }
        };
        let country = &mut self.countries[index];

        if let Some(date) = record.date {
            country.first_visit_date = match country.first_visit_date {
                Some(current) if current <= date => Some(current),
                _ => Some(date),
            };
        }

        if let Some(city_name) = &record.city {
            match country.cities.iter_mut().find(|c| &c.name == city_name) {
                Some(city) => city.visits += 1,
                None => country.cities.push(CityVisit {
                    name: city_name.clone(),
                    visits: 1,
                }),
            }
        }
    }

    pub fn into_outputs(self) -> (Vec<FolderGroup>, CountryOutput) {
        (
            self.folders,
            CountryOutput {
                countries: self.countries,
            },
        )
    }
}
