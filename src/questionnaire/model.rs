//! Travel preference data models.
//!
//! `TravelPreferences` is the draft built up across the wizard steps. Every
//! single-choice answer is a closed enum; an unanswered question is `None`.
//! `FinalizedPreferences` is the read-only record produced from a complete
//! draft, with every required answer unwrapped.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::QuestionnaireError;

use super::state::WizardStep;

/// Declares a closed single-choice answer with its wire value and UI label.
macro_rules! choice_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $value:literal, $label:literal;)+ }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $value)]
                $variant,
            )+
        }

        impl $name {
            /// Every option, in display order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Value stored and sent to the model.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $value,)+
                }
            }

            /// Human-readable option label.
            pub fn label(&self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($value => Ok($name::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($name), other)),
                }
            }
        }
    };
}

choice_enum! {
    /// Preferred surroundings.
    Environment {
        Urban => "urban", "Urban (Cities)";
        Nature => "nature", "Nature (Countryside)";
        Coastal => "coastal", "Coastal (Beaches)";
        Mountains => "mountains", "Mountains";
        Mixed => "mixed", "Mixed Environments";
        Islands => "islands", "Island Settings";
        Desert => "desert", "Desert Landscapes";
    }
}

choice_enum! {
    AccommodationType {
        Luxury => "luxury", "Luxury Hotels";
        Boutique => "boutique", "Boutique Hotels";
        MidRange => "mid-range", "Mid-range Hotels";
        Airbnb => "airbnb", "Vacation Rentals/Airbnb";
        Hostel => "hostel", "Hostels";
        Camping => "camping", "Camping/Glamping";
        Mixed => "mixed", "Mix of Different Types";
    }
}

choice_enum! {
    DiningBudget {
        Budget => "budget", "Budget (Street food & Local spots)";
        Moderate => "moderate", "Moderate (Mix of local & mid-range)";
        High => "high", "High-end (Fine dining & Experiences)";
        Mixed => "mixed", "Mixed (Variety of options)";
    }
}

choice_enum! {
    TravelCompanions {
        Solo => "solo", "Solo Travel";
        Partner => "partner", "With Partner";
        Family => "family", "Family with Children";
        Friends => "friends", "Friends Group";
        Couple => "couple", "Couple";
        MultiGeneration => "multi-generation", "Multi-generational Family";
    }
}

choice_enum! {
    AdventureLevel {
        Relaxed => "relaxed", "Relaxed (Minimal physical activity)";
        Moderate => "moderate", "Moderate (Some physical activities)";
        Active => "active", "Active (Regular physical activities)";
        Challenging => "challenging", "Challenging (Intense activities)";
        Extreme => "extreme", "Extreme (Adrenaline-pumping activities)";
    }
}

choice_enum! {
    TravelPace {
        Relaxed => "relaxed", "Relaxed (Plenty of free time)";
        Balanced => "balanced", "Balanced (Mix of activities and rest)";
        Busy => "busy", "Busy (Full schedule)";
        Intensive => "intensive", "Intensive (Maximum activities)";
    }
}

choice_enum! {
    Transportation {
        Public => "public", "Public Transportation";
        Rental => "rental", "Rental Car";
        Private => "private", "Private Transfers";
        Walking => "walking", "Walking/Cycling";
        Mixed => "mixed", "Mix of Options";
    }
}

choice_enum! {
    ExperienceLevel {
        Beginner => "beginner", "First-time International Traveler";
        Intermediate => "intermediate", "Some International Experience";
        Experienced => "experienced", "Experienced Traveler";
        Expert => "expert", "Expert/Frequent Traveler";
    }
}

choice_enum! {
    ComfortLevel {
        Familiar => "familiar", "Prefer Familiar/Tourist-friendly Areas";
        Moderate => "moderate", "Comfortable with Some Adventure";
        Adventurous => "adventurous", "Very Comfortable with New Experiences";
        Any => "any", "Comfortable in Any Setting";
    }
}

impl TravelPace {
    /// Short name shown in the trip summary ("Balanced", "Busy", ...).
    pub fn short_label(&self) -> &'static str {
        match self {
            Self::Relaxed => "Relaxed",
            Self::Balanced => "Balanced",
            Self::Busy => "Busy",
            Self::Intensive => "Intensive",
        }
    }
}

/// Preset trip-length buckets offered alongside the free-form day count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TripLengthBucket {
    Weekend,
    Short,
    Medium,
    Long,
}

/// How long the trip lasts: a preset bucket or an exact number of days.
///
/// Serialized as the bucket name (`"short"`) or as `"<n> days"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TripLength {
    Bucket(TripLengthBucket),
    Days(u32),
}

impl TripLength {
    pub const WEEKEND: TripLength = TripLength::Bucket(TripLengthBucket::Weekend);
    pub const SHORT: TripLength = TripLength::Bucket(TripLengthBucket::Short);
    pub const MEDIUM: TripLength = TripLength::Bucket(TripLengthBucket::Medium);
    pub const LONG: TripLength = TripLength::Bucket(TripLengthBucket::Long);

    /// Preset buckets, shortest first.
    pub const PRESETS: &'static [TripLength] =
        &[Self::WEEKEND, Self::SHORT, Self::MEDIUM, Self::LONG];

    pub fn label(&self) -> String {
        match self {
            Self::Bucket(TripLengthBucket::Weekend) => "Weekend (1-3 days)".to_string(),
            Self::Bucket(TripLengthBucket::Short) => "Short Trip (4-7 days)".to_string(),
            Self::Bucket(TripLengthBucket::Medium) => "Extended Stay (1-2 weeks)".to_string(),
            Self::Bucket(TripLengthBucket::Long) => "Long Journey (2+ weeks)".to_string(),
            Self::Days(n) => format!("{n} days"),
        }
    }
}

impl fmt::Display for TripLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bucket(TripLengthBucket::Weekend) => f.write_str("weekend"),
            Self::Bucket(TripLengthBucket::Short) => f.write_str("short"),
            Self::Bucket(TripLengthBucket::Medium) => f.write_str("medium"),
            Self::Bucket(TripLengthBucket::Long) => f.write_str("long"),
            Self::Days(n) => write!(f, "{n} days"),
        }
    }
}

impl FromStr for TripLength {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "weekend" => Ok(Self::WEEKEND),
            "short" => Ok(Self::SHORT),
            "medium" => Ok(Self::MEDIUM),
            "long" => Ok(Self::LONG),
            other => {
                let days = other
                    .strip_suffix("days")
                    .or_else(|| other.strip_suffix("day"))
                    .map(str::trim)
                    .and_then(|n| n.parse::<u32>().ok())
                    .filter(|n| *n > 0)
                    .ok_or_else(|| format!("invalid trip length '{other}'"))?;
                Ok(Self::Days(days))
            }
        }
    }
}

impl TryFrom<String> for TripLength {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TripLength> for String {
    fn from(value: TripLength) -> Self {
        value.to_string()
    }
}

/// Preset activities for step 1.
pub const ACTIVITY_OPTIONS: &[&str] = &[
    "Outdoor Adventures",
    "Cultural Experiences",
    "Food & Dining",
    "Shopping",
    "Museums & Art",
    "Nightlife",
    "Relaxation",
    "Sports",
    "Photography",
    "Local Markets",
    "Historical Sites",
    "Beach Activities",
];

/// Preset regions for step 3.
pub const REGION_OPTIONS: &[&str] = &[
    "Europe",
    "Asia",
    "North America",
    "South America",
    "Africa",
    "Oceania",
    "Caribbean",
    "Middle East",
    "Mediterranean",
    "Scandinavia",
    "Central America",
    "Pacific Islands",
];

/// Preset cuisines for step 5.
pub const CUISINE_OPTIONS: &[&str] = &[
    "Local Cuisine",
    "Fine Dining",
    "Street Food",
    "Vegetarian",
    "Vegan",
    "Seafood",
    "International",
    "Food Markets",
    "Wine Tasting",
    "Food Tours",
    "Cooking Classes",
    "Cafes",
];

/// Preset bucket-list experiences for step 7.
pub const BUCKET_LIST_OPTIONS: &[&str] = &[
    "Historical Sites",
    "Natural Wonders",
    "Adventure Sports",
    "Cultural Festivals",
    "Wildlife Encounters",
    "Local Experiences",
    "Iconic Landmarks",
    "Hidden Gems",
    "Scenic Routes",
    "Unique Accommodations",
    "Local Workshops",
    "Special Events",
];

/// One selectable answer: the wire value plus what the form shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceOption {
    pub value: String,
    pub label: String,
}

macro_rules! choices {
    ($name:ident) => {
        $name::ALL
            .iter()
            .map(|c| ChoiceOption {
                value: c.as_str().to_string(),
                label: c.label().to_string(),
            })
            .collect()
    };
}

/// Everything a client needs to render the questionnaire's choices.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionnaireOptions {
    pub activities: &'static [&'static str],
    pub trip_lengths: Vec<ChoiceOption>,
    pub regions: &'static [&'static str],
    pub environments: Vec<ChoiceOption>,
    pub accommodation_types: Vec<ChoiceOption>,
    pub cuisines: &'static [&'static str],
    pub dining_budgets: Vec<ChoiceOption>,
    pub travel_companions: Vec<ChoiceOption>,
    pub adventure_levels: Vec<ChoiceOption>,
    pub bucket_list: &'static [&'static str],
    pub travel_paces: Vec<ChoiceOption>,
    pub transportation: Vec<ChoiceOption>,
    pub experience_levels: Vec<ChoiceOption>,
    pub comfort_levels: Vec<ChoiceOption>,
}

impl QuestionnaireOptions {
    pub fn new() -> Self {
        Self {
            activities: ACTIVITY_OPTIONS,
            trip_lengths: TripLength::PRESETS
                .iter()
                .map(|t| ChoiceOption {
                    value: t.to_string(),
                    label: t.label(),
                })
                .collect(),
            regions: REGION_OPTIONS,
            environments: choices!(Environment),
            accommodation_types: choices!(AccommodationType),
            cuisines: CUISINE_OPTIONS,
            dining_budgets: choices!(DiningBudget),
            travel_companions: choices!(TravelCompanions),
            adventure_levels: choices!(AdventureLevel),
            bucket_list: BUCKET_LIST_OPTIONS,
            travel_paces: choices!(TravelPace),
            transportation: choices!(Transportation),
            experience_levels: choices!(ExperienceLevel),
            comfort_levels: choices!(ComfortLevel),
        }
    }
}

impl Default for QuestionnaireOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Travel window. Flexible by default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TravelDates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,
    pub is_flexible: bool,
}

impl Default for TravelDates {
    fn default() -> Self {
        Self {
            start: None,
            end: None,
            is_flexible: true,
        }
    }
}

impl TravelDates {
    /// "2026-05-01 to 2026-05-08 (flexible)" style description, if any date is set.
    pub fn describe(&self) -> Option<String> {
        let range = match (self.start, self.end) {
            (Some(start), Some(end)) => format!("{start} to {end}"),
            (Some(start), None) => format!("from {start}"),
            (None, Some(end)) => format!("until {end}"),
            (None, None) => return None,
        };
        Some(if self.is_flexible {
            format!("{range} (flexible)")
        } else {
            range
        })
    }
}

/// Multi-select fields with toggle semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetField {
    Activities,
    PreferredRegions,
    CuisinePreferences,
    BucketListItems,
}

/// The questionnaire draft.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TravelPreferences {
    // Goals & interests
    pub trip_purpose: String,
    pub activities: Vec<String>,

    // Timing
    pub travel_dates: TravelDates,
    pub trip_length: Option<TripLength>,

    // Destinations
    pub preferred_regions: Vec<String>,
    pub environment_preference: Option<Environment>,

    // Budget & accommodation
    pub total_budget: Decimal,
    pub accommodation_type: Option<AccommodationType>,
    /// Per night.
    pub accommodation_budget: Decimal,

    // Dining
    pub cuisine_preferences: Vec<String>,
    pub dining_budget: Option<DiningBudget>,

    // Companions
    pub travel_companions: Option<TravelCompanions>,
    pub special_considerations: Option<String>,

    // Adventure
    pub adventure_level: Option<AdventureLevel>,
    pub bucket_list_items: Vec<String>,

    // Style & logistics
    pub travel_pace: Option<TravelPace>,
    pub transportation_preference: Option<Transportation>,
    pub travel_experience_level: Option<ExperienceLevel>,

    // Safety & comfort
    pub comfort_level: Option<ComfortLevel>,
    pub health_safety_concerns: Option<String>,

    // Notes
    pub previous_experiences: Option<String>,
}

impl TravelPreferences {
    pub fn set_field(&self, field: SetField) -> &Vec<String> {
        match field {
            SetField::Activities => &self.activities,
            SetField::PreferredRegions => &self.preferred_regions,
            SetField::CuisinePreferences => &self.cuisine_preferences,
            SetField::BucketListItems => &self.bucket_list_items,
        }
    }

    fn set_field_mut(&mut self, field: SetField) -> &mut Vec<String> {
        match field {
            SetField::Activities => &mut self.activities,
            SetField::PreferredRegions => &mut self.preferred_regions,
            SetField::CuisinePreferences => &mut self.cuisine_preferences,
            SetField::BucketListItems => &mut self.bucket_list_items,
        }
    }

    /// Add `value` if absent, remove it otherwise. Returns whether it is now present.
    pub fn toggle(&mut self, field: SetField, value: &str) -> bool {
        let values = self.set_field_mut(field);
        if let Some(pos) = values.iter().position(|v| v == value) {
            values.remove(pos);
            false
        } else {
            values.push(value.to_string());
            true
        }
    }

    /// Trip length as displayed and sent to the model; empty when unset.
    pub fn trip_length_label(&self) -> String {
        self.trip_length.map(|t| t.to_string()).unwrap_or_default()
    }
}

/// Normalise optional free text: trimmed, blank becomes `None`.
pub(crate) fn non_blank(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
}

/// A submitted, read-only preference record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedPreferences {
    pub id: Uuid,
    pub user_id: String,
    pub created_at: DateTime<Utc>,

    pub trip_purpose: String,
    pub activities: Vec<String>,
    pub travel_dates: TravelDates,
    pub trip_length: TripLength,
    pub preferred_regions: Vec<String>,
    pub environment_preference: Environment,
    pub total_budget: Decimal,
    pub accommodation_type: AccommodationType,
    pub accommodation_budget: Decimal,
    pub cuisine_preferences: Vec<String>,
    pub dining_budget: DiningBudget,
    pub travel_companions: TravelCompanions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_considerations: Option<String>,
    pub adventure_level: AdventureLevel,
    pub bucket_list_items: Vec<String>,
    pub travel_pace: TravelPace,
    pub transportation_preference: Transportation,
    pub travel_experience_level: ExperienceLevel,
    pub comfort_level: ComfortLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_safety_concerns: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_experiences: Option<String>,
}

impl FinalizedPreferences {
    /// Freeze a draft into a record owned by `user_id`.
    ///
    /// A positive `custom_day_count` takes precedence over the stored trip
    /// length. Fails with the first step whose required answers are missing.
    pub fn from_draft(
        draft: &TravelPreferences,
        custom_day_count: Option<u32>,
        custom_destinations: &[String],
        user_id: impl Into<String>,
    ) -> Result<Self, QuestionnaireError> {
        if let Some(step) =
            super::validator::first_incomplete_step(draft, custom_day_count, custom_destinations)
        {
            return Err(QuestionnaireError::ValidationIncomplete {
                step: step.index(),
            });
        }

        let missing = |step: WizardStep| QuestionnaireError::ValidationIncomplete {
            step: step.index(),
        };

        let trip_length = match custom_day_count.filter(|n| *n > 0) {
            Some(days) => TripLength::Days(days),
            None => draft.trip_length.ok_or_else(|| missing(WizardStep::Timing))?,
        };

        // Custom destinations are mirrored into preferred_regions, but a preset
        // toggle can remove the mirrored copy; keep them in the record.
        let mut preferred_regions = draft.preferred_regions.clone();
        for destination in custom_destinations {
            if !preferred_regions.contains(destination) {
                preferred_regions.push(destination.clone());
            }
        }

        Ok(Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            created_at: Utc::now(),
            trip_purpose: draft.trip_purpose.trim().to_string(),
            activities: draft.activities.clone(),
            travel_dates: draft.travel_dates.clone(),
            trip_length,
            preferred_regions,
            environment_preference: draft
                .environment_preference
                .ok_or_else(|| missing(WizardStep::Location))?,
            total_budget: draft.total_budget,
            accommodation_type: draft
                .accommodation_type
                .ok_or_else(|| missing(WizardStep::Budget))?,
            accommodation_budget: draft.accommodation_budget,
            cuisine_preferences: draft.cuisine_preferences.clone(),
            dining_budget: draft.dining_budget.ok_or_else(|| missing(WizardStep::Dining))?,
            travel_companions: draft
                .travel_companions
                .ok_or_else(|| missing(WizardStep::Group))?,
            special_considerations: non_blank(draft.special_considerations.as_deref()),
            adventure_level: draft
                .adventure_level
                .ok_or_else(|| missing(WizardStep::Adventure))?,
            bucket_list_items: draft.bucket_list_items.clone(),
            travel_pace: draft.travel_pace.ok_or_else(|| missing(WizardStep::Style))?,
            transportation_preference: draft
                .transportation_preference
                .ok_or_else(|| missing(WizardStep::Style))?,
            travel_experience_level: draft
                .travel_experience_level
                .ok_or_else(|| missing(WizardStep::Style))?,
            comfort_level: draft.comfort_level.ok_or_else(|| missing(WizardStep::Safety))?,
            health_safety_concerns: non_blank(draft.health_safety_concerns.as_deref()),
            previous_experiences: non_blank(draft.previous_experiences.as_deref()),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::complete_draft;
    use super::*;

    #[test]
    fn default_draft_is_empty() {
        let draft = TravelPreferences::default();
        assert!(draft.trip_purpose.is_empty());
        assert!(draft.activities.is_empty());
        assert!(draft.travel_dates.is_flexible);
        assert!(draft.trip_length.is_none());
        assert_eq!(draft.total_budget, Decimal::ZERO);
        assert_eq!(draft.trip_length_label(), "");
    }

    #[test]
    fn toggle_twice_restores_original() {
        let mut draft = TravelPreferences::default();
        draft.activities = vec!["Shopping".to_string()];
        let before = draft.clone();

        assert!(draft.toggle(SetField::Activities, "Nightlife"));
        assert_eq!(draft.activities, vec!["Shopping", "Nightlife"]);
        assert!(!draft.toggle(SetField::Activities, "Nightlife"));
        assert_eq!(draft, before);
    }

    #[test]
    fn toggle_never_duplicates() {
        let mut draft = TravelPreferences::default();
        for field in [
            SetField::Activities,
            SetField::PreferredRegions,
            SetField::CuisinePreferences,
            SetField::BucketListItems,
        ] {
            draft.toggle(field, "X");
            draft.toggle(field, "Y");
            draft.toggle(field, "X");
            draft.toggle(field, "X");
            assert_eq!(draft.set_field(field), &vec!["Y".to_string(), "X".to_string()]);
        }
    }

    #[test]
    fn trip_length_wire_format() {
        assert_eq!(TripLength::Days(5).to_string(), "5 days");
        assert_eq!(TripLength::SHORT.to_string(), "short");
        assert_eq!("5 days".parse::<TripLength>().unwrap(), TripLength::Days(5));
        assert_eq!("weekend".parse::<TripLength>().unwrap(), TripLength::WEEKEND);
        assert!("0 days".parse::<TripLength>().is_err());
        assert!("fortnight".parse::<TripLength>().is_err());

        let json = serde_json::to_string(&TripLength::Days(12)).unwrap();
        assert_eq!(json, "\"12 days\"");
        let parsed: TripLength = serde_json::from_str("\"long\"").unwrap();
        assert_eq!(parsed, TripLength::LONG);
    }

    #[test]
    fn choice_enums_round_trip_wire_values() {
        for env in Environment::ALL {
            assert_eq!(env.as_str().parse::<Environment>().unwrap(), *env);
            let json = serde_json::to_string(env).unwrap();
            assert_eq!(json, format!("\"{}\"", env.as_str()));
        }
        assert_eq!(AccommodationType::MidRange.as_str(), "mid-range");
        assert_eq!(TravelCompanions::MultiGeneration.as_str(), "multi-generation");
        assert_eq!(Environment::Coastal.label(), "Coastal (Beaches)");
        assert!("volcano".parse::<Environment>().is_err());
    }

    #[test]
    fn options_list_every_choice_with_labels() {
        let options = QuestionnaireOptions::new();
        assert_eq!(options.environments.len(), Environment::ALL.len());
        assert_eq!(
            options.accommodation_types[2],
            ChoiceOption {
                value: "mid-range".into(),
                label: "Mid-range Hotels".into(),
            }
        );
        assert_eq!(options.trip_lengths[0].value, "weekend");
        assert_eq!(options.trip_lengths[3].label, "Long Journey (2+ weeks)");
        assert!(options.regions.contains(&"Caribbean"));

        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["comfort_levels"][0]["value"], "familiar");
        assert_eq!(json["bucket_list"].as_array().unwrap().len(), 12);
    }

    #[test]
    fn unknown_enum_value_rejected_by_serde() {
        let result: Result<TravelPace, _> = serde_json::from_str("\"sprint\"");
        assert!(result.is_err());
    }

    #[test]
    fn travel_dates_description() {
        let mut dates = TravelDates::default();
        assert!(dates.describe().is_none());
        dates.start = NaiveDate::from_ymd_opt(2026, 5, 1);
        dates.end = NaiveDate::from_ymd_opt(2026, 5, 8);
        assert_eq!(dates.describe().unwrap(), "2026-05-01 to 2026-05-08 (flexible)");
        dates.is_flexible = false;
        assert_eq!(dates.describe().unwrap(), "2026-05-01 to 2026-05-08");
    }

    #[test]
    fn finalize_complete_draft() {
        let mut draft = complete_draft();
        draft.trip_purpose = "  relaxation  ".to_string();
        draft.special_considerations = Some("   ".to_string());
        draft.health_safety_concerns = Some("Shellfish allergy".to_string());

        let record = FinalizedPreferences::from_draft(&draft, None, &[], "user-1").unwrap();
        assert_eq!(record.user_id, "user-1");
        assert_eq!(record.trip_purpose, "relaxation");
        assert_eq!(record.trip_length, TripLength::SHORT);
        assert_eq!(record.environment_preference, Environment::Coastal);
        assert!(record.special_considerations.is_none());
        assert_eq!(record.health_safety_concerns.as_deref(), Some("Shellfish allergy"));
    }

    #[test]
    fn finalize_prefers_custom_day_count() {
        let record =
            FinalizedPreferences::from_draft(&complete_draft(), Some(9), &[], "u").unwrap();
        assert_eq!(record.trip_length, TripLength::Days(9));
    }

    #[test]
    fn finalize_keeps_custom_destinations() {
        let mut draft = complete_draft();
        draft.preferred_regions.clear();
        let custom = vec!["Kyoto, Japan".to_string()];
        let record = FinalizedPreferences::from_draft(&draft, None, &custom, "u").unwrap();
        assert_eq!(record.preferred_regions, custom);
    }

    #[test]
    fn finalize_incomplete_names_first_failing_step() {
        let mut draft = complete_draft();
        draft.dining_budget = None;
        draft.comfort_level = None;
        let err = FinalizedPreferences::from_draft(&draft, None, &[], "u").unwrap_err();
        assert_eq!(err, QuestionnaireError::ValidationIncomplete { step: 5 });
    }

    #[test]
    fn finalized_serde_roundtrip() {
        let record = super::fixtures::finalized();
        let json = serde_json::to_string(&record).unwrap();
        let parsed: FinalizedPreferences = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}
