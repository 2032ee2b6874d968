//! Per-step required-field predicates.
//!
//! Pure functions, evaluated on every input event to gate forward navigation.

use rust_decimal::Decimal;

use super::model::TravelPreferences;
use super::state::WizardStep;

/// Message shown whenever a step's predicate does not hold.
pub const INCOMPLETE_STEP_MESSAGE: &str = "Please complete all required fields before continuing";

/// Whether `step`'s required answers are filled in.
pub fn is_step_complete(
    step: WizardStep,
    draft: &TravelPreferences,
    custom_day_count: Option<u32>,
    custom_destinations: &[String],
) -> bool {
    match step {
        WizardStep::Goals => !draft.trip_purpose.trim().is_empty() && !draft.activities.is_empty(),
        WizardStep::Timing => {
            draft.trip_length.is_some() || custom_day_count.is_some_and(|n| n > 0)
        }
        WizardStep::Location => {
            (!draft.preferred_regions.is_empty() || !custom_destinations.is_empty())
                && draft.environment_preference.is_some()
        }
        WizardStep::Budget => {
            draft.total_budget > Decimal::ZERO
                && draft.accommodation_type.is_some()
                && draft.accommodation_budget > Decimal::ZERO
        }
        WizardStep::Dining => {
            !draft.cuisine_preferences.is_empty() && draft.dining_budget.is_some()
        }
        WizardStep::Group => draft.travel_companions.is_some(),
        WizardStep::Adventure => {
            draft.adventure_level.is_some() && !draft.bucket_list_items.is_empty()
        }
        WizardStep::Style => {
            draft.travel_pace.is_some()
                && draft.transportation_preference.is_some()
                && draft.travel_experience_level.is_some()
        }
        WizardStep::Safety => draft.comfort_level.is_some(),
        WizardStep::Notes => true,
    }
}

/// The first step (in order) whose predicate fails, if any.
pub fn first_incomplete_step(
    draft: &TravelPreferences,
    custom_day_count: Option<u32>,
    custom_destinations: &[String],
) -> Option<WizardStep> {
    WizardStep::ALL
        .iter()
        .copied()
        .find(|step| !is_step_complete(*step, draft, custom_day_count, custom_destinations))
}
