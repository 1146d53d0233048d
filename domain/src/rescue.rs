//! Rescue-dog categories the dashboard filters by.
//!
//! Each category narrows the collection with an exact-match store query and
//! then applies breed, sex and age rules in process.

use serde::Serialize;

use crate::service::RecordGateway;
use crate::{CoreError, Criteria, Record, RecordStore};

struct RescueProfile {
    animal_type: Option<&'static str>,
    breeds: &'static [&'static str],
    sex: &'static str,
    min_age_weeks: f64,
    max_age_weeks: f64,
}

const WATER: RescueProfile = RescueProfile {
    animal_type: Some("Dog"),
    breeds: &[
        "Labrador Retriever Mix",
        "Chesapeake Bay Retriever",
        "Newfoundland",
    ],
    sex: "Intact Female",
    min_age_weeks: 26.0,
    max_age_weeks: 156.0,
};

const MOUNTAIN: RescueProfile = RescueProfile {
    animal_type: Some("Dog"),
    breeds: &[
        "German Shepherd",
        "Alaskan Malamute",
        "Old English Sheepdog",
        "Siberian Husky",
        "Rottweiler",
    ],
    sex: "Intact Male",
    min_age_weeks: 26.0,
    max_age_weeks: 156.0,
};

// No animal_type condition: the breed list already implies dogs.
const DISASTER: RescueProfile = RescueProfile {
    animal_type: None,
    breeds: &[
        "Doberman Pinscher",
        "German Shepherd",
        "Golden Retriever",
        "Bloodhound",
        "Rottweiler",
    ],
    sex: "Intact Male",
    min_age_weeks: 20.0,
    max_age_weeks: 300.0,
};

/// Dashboard filter selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RescueFilter {
    Water,
    Mountain,
    Disaster,
    /// No filtering; the whole collection.
    Reset,
}

impl RescueFilter {
    pub const ALL: [RescueFilter; 4] = [
        RescueFilter::Water,
        RescueFilter::Mountain,
        RescueFilter::Disaster,
        RescueFilter::Reset,
    ];

    /// Accepts short names and the dashboard's radio values. Anything else
    /// means no filter.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "water" | "filter by water rescue" => RescueFilter::Water,
            "mountain" | "filter by mountain rescue" => RescueFilter::Mountain,
            "disaster" | "filter by disaster rescue" => RescueFilter::Disaster,
            _ => RescueFilter::Reset,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RescueFilter::Water => "water",
            RescueFilter::Mountain => "mountain",
            RescueFilter::Disaster => "disaster",
            RescueFilter::Reset => "reset",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RescueFilter::Water => "Water Rescue",
            RescueFilter::Mountain => "Mountain Rescue",
            RescueFilter::Disaster => "Disaster Rescue",
            RescueFilter::Reset => "Reset",
        }
    }

    fn profile(&self) -> Option<&'static RescueProfile> {
        match self {
            RescueFilter::Water => Some(&WATER),
            RescueFilter::Mountain => Some(&MOUNTAIN),
            RescueFilter::Disaster => Some(&DISASTER),
            RescueFilter::Reset => None,
        }
    }

    /// Exact-match part of the filter, pushed to the store.
    pub fn base_criteria(&self) -> Criteria {
        match self.profile().and_then(|p| p.animal_type) {
            Some(kind) => Criteria::all().and("animal_type", kind),
            None => Criteria::all(),
        }
    }

    /// Whether a record qualifies for this rescue category.
    pub fn matches(&self, record: &Record) -> bool {
        let Some(profile) = self.profile() else {
            return true;
        };
        if !self.base_criteria().matches(record) {
            return false;
        }
        let breed_ok = record
            .str_field("breed")
            .is_some_and(|b| profile.breeds.iter().any(|candidate| *candidate == b));
        let sex_ok = record.str_field("sex_upon_outcome") == Some(profile.sex);
        let age_ok = record
            .number_field("age_upon_outcome_in_weeks")
            .is_some_and(|age| (profile.min_age_weeks..=profile.max_age_weeks).contains(&age));
        breed_ok && sex_ok && age_ok
    }

    /// Query the gateway and keep the qualifying records, in store order.
    pub fn query<S: RecordStore>(
        &self,
        gateway: &RecordGateway<S>,
    ) -> Result<Vec<Record>, CoreError> {
        let criteria = self.base_criteria();
        let mut out = Vec::new();
        for record in gateway.find(Some(&criteria))? {
            let record = record?;
            if self.matches(&record) {
                out.push(record);
            }
        }
        Ok(out)
    }
}
