//! Questionnaire state machine: steps, events and the reducer.
//!
//! The wizard is a linear chain of ten steps. Moving forward is gated by the
//! step validator; moving back is always allowed from step 2 onward. All
//! mutation goes through [`reduce`] (or [`WizardState::apply`]), so the
//! whole flow can be exercised without any transport attached.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::QuestionnaireError;

use super::model::{
    AccommodationType, AdventureLevel, ComfortLevel, DiningBudget, Environment, ExperienceLevel,
    SetField, Transportation, TravelCompanions, TravelPace, TravelPreferences, TripLength,
    non_blank,
};
use super::prompts::to_plain_text;
use super::requester::TripSummary;
use super::validator::{INCOMPLETE_STEP_MESSAGE, first_incomplete_step, is_step_complete};

/// The ten questionnaire steps, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum WizardStep {
    Goals,
    Timing,
    Location,
    Budget,
    Dining,
    Group,
    Adventure,
    Style,
    Safety,
    Notes,
}

impl WizardStep {
    pub const ALL: &'static [WizardStep] = &[
        Self::Goals,
        Self::Timing,
        Self::Location,
        Self::Budget,
        Self::Dining,
        Self::Group,
        Self::Adventure,
        Self::Style,
        Self::Safety,
        Self::Notes,
    ];

    pub const FIRST: WizardStep = WizardStep::Goals;
    pub const LAST: WizardStep = WizardStep::Notes;

    /// 1-based position in the wizard.
    pub fn index(&self) -> u8 {
        match self {
            Self::Goals => 1,
            Self::Timing => 2,
            Self::Location => 3,
            Self::Budget => 4,
            Self::Dining => 5,
            Self::Group => 6,
            Self::Adventure => 7,
            Self::Style => 8,
            Self::Safety => 9,
            Self::Notes => 10,
        }
    }

    pub fn from_index(index: u8) -> Option<WizardStep> {
        Self::ALL.get(usize::from(index).checked_sub(1)?).copied()
    }

    /// Progress-bar label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Goals => "Goals",
            Self::Timing => "Timing",
            Self::Location => "Location",
            Self::Budget => "Budget",
            Self::Dining => "Dining",
            Self::Group => "Group",
            Self::Adventure => "Adventure",
            Self::Style => "Style",
            Self::Safety => "Safety",
            Self::Notes => "Notes",
        }
    }

    pub fn next(&self) -> Option<WizardStep> {
        Self::from_index(self.index() + 1)
    }

    pub fn previous(&self) -> Option<WizardStep> {
        Self::from_index(self.index() - 1)
    }

    /// Only single-step moves in either direction are legal.
    pub fn can_transition_to(&self, target: WizardStep) -> bool {
        self.next() == Some(target) || self.previous() == Some(target)
    }

    pub fn is_last(&self) -> bool {
        *self == Self::LAST
    }
}

impl Default for WizardStep {
    fn default() -> Self {
        Self::FIRST
    }
}

impl std::fmt::Display for WizardStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "step {} ({})", self.index(), self.label())
    }
}

impl TryFrom<u8> for WizardStep {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_index(value).ok_or_else(|| format!("step must be 1..=10, got {value}"))
    }
}

impl From<WizardStep> for u8 {
    fn from(step: WizardStep) -> Self {
        step.index()
    }
}

/// Assignment to a single-valued draft field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum FieldUpdate {
    TripPurpose(String),
    TravelStart(Option<NaiveDate>),
    TravelEnd(Option<NaiveDate>),
    DatesFlexible(bool),
    /// Preset bucket selection; clears the custom day count.
    TripLength(Option<TripLength>),
    EnvironmentPreference(Option<Environment>),
    TotalBudget(Decimal),
    AccommodationType(Option<AccommodationType>),
    AccommodationBudget(Decimal),
    DiningBudget(Option<DiningBudget>),
    TravelCompanions(Option<TravelCompanions>),
    SpecialConsiderations(Option<String>),
    AdventureLevel(Option<AdventureLevel>),
    TravelPace(Option<TravelPace>),
    TransportationPreference(Option<Transportation>),
    TravelExperienceLevel(Option<ExperienceLevel>),
    ComfortLevel(Option<ComfortLevel>),
    HealthSafetyConcerns(Option<String>),
    PreviousExperiences(Option<String>),
}

/// Everything that can happen to a questionnaire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WizardEvent {
    SetField {
        update: FieldUpdate,
    },
    ToggleField {
        field: SetField,
        value: String,
    },
    SetCustomDestinationInput {
        text: String,
    },
    /// Adds `text`, or the input buffer when `text` is absent.
    AddCustomDestination {
        #[serde(default)]
        text: Option<String>,
    },
    RemoveCustomDestination {
        text: String,
    },
    SetCustomDays {
        input: String,
    },
    Advance,
    Retreat,
    Submit,
    SubmitFailed {
        message: String,
    },
    Persisted {
        record_id: Uuid,
    },
    GenerationCompleted {
        itinerary: String,
        summary: TripSummary,
    },
    GenerationFailed {
        message: String,
    },
}

impl WizardEvent {
    /// Events a client may send directly. The rest are produced by the session.
    pub fn is_user_input(&self) -> bool {
        matches!(
            self,
            Self::SetField { .. }
                | Self::ToggleField { .. }
                | Self::SetCustomDestinationInput { .. }
                | Self::AddCustomDestination { .. }
                | Self::RemoveCustomDestination { .. }
                | Self::SetCustomDays { .. }
                | Self::Advance
                | Self::Retreat
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::SetField { .. } => "set_field",
            Self::ToggleField { .. } => "toggle_field",
            Self::SetCustomDestinationInput { .. } => "set_custom_destination_input",
            Self::AddCustomDestination { .. } => "add_custom_destination",
            Self::RemoveCustomDestination { .. } => "remove_custom_destination",
            Self::SetCustomDays { .. } => "set_custom_days",
            Self::Advance => "advance",
            Self::Retreat => "retreat",
            Self::Submit => "submit",
            Self::SubmitFailed { .. } => "submit_failed",
            Self::Persisted { .. } => "persisted",
            Self::GenerationCompleted { .. } => "generation_completed",
            Self::GenerationFailed { .. } => "generation_failed",
        }
    }
}

/// The results panel shown after submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecommendationView {
    pub loading: bool,
    /// Formatted itinerary, or `"Error: ..."` when generation failed.
    pub recommendation: String,
    /// `recommendation` with inline markup stripped, for copying.
    pub plain_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<TripSummary>,
    pub failed: bool,
}

impl RecommendationView {
    pub fn pending() -> Self {
        Self {
            loading: true,
            ..Default::default()
        }
    }
}

/// Full state of one questionnaire.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WizardState {
    pub step: WizardStep,
    pub draft: TravelPreferences,
    pub custom_destination_input: String,
    pub custom_destinations: Vec<String>,
    pub custom_day_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub submitting: bool,
    /// Id of the persisted record once submission succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<RecommendationView>,
}

/// Apply `event` to `state`, returning the next state.
pub fn reduce(mut state: WizardState, event: WizardEvent) -> WizardState {
    state.apply(event);
    state
}

impl WizardState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the current step's required answers are present.
    pub fn current_step_complete(&self) -> bool {
        is_step_complete(
            self.step,
            &self.draft,
            self.custom_day_count,
            &self.custom_destinations,
        )
    }

    /// Input is frozen while a submission is in flight and after it succeeded.
    pub fn is_locked(&self) -> bool {
        self.submitting || self.submitted.is_some()
    }

    pub fn apply(&mut self, event: WizardEvent) {
        if event.is_user_input() && self.is_locked() {
            tracing::debug!(event = event.kind(), "Ignoring input on a locked questionnaire");
            return;
        }

        match event {
            WizardEvent::SetField { update } => self.set_field(update),
            WizardEvent::ToggleField { field, value } => {
                let value = value.trim();
                if !value.is_empty() {
                    self.draft.toggle(field, value);
                }
            }
            WizardEvent::SetCustomDestinationInput { text } => {
                self.custom_destination_input = text;
            }
            WizardEvent::AddCustomDestination { text } => {
                let text = text.unwrap_or_else(|| self.custom_destination_input.clone());
                self.add_custom_destination(&text);
            }
            WizardEvent::RemoveCustomDestination { text } => self.remove_custom_destination(&text),
            WizardEvent::SetCustomDays { input } => self.set_custom_day_count(&input),
            WizardEvent::Advance => self.advance(),
            WizardEvent::Retreat => self.retreat(),
            WizardEvent::Submit => {
                if let Err(e) = self.begin_submit() {
                    tracing::debug!(error = %e, "Submit not started");
                }
            }
            WizardEvent::SubmitFailed { message } => {
                self.submitting = false;
                self.error_message = Some(message);
            }
            WizardEvent::Persisted { record_id } => {
                self.submitted = Some(record_id);
                self.results = Some(RecommendationView::pending());
            }
            WizardEvent::GenerationCompleted { itinerary, summary } => {
                self.finish_generation(itinerary, Some(summary), false);
            }
            WizardEvent::GenerationFailed { message } => {
                let text = if message.starts_with("Error:") {
                    message
                } else {
                    format!("Error: {message}")
                };
                self.finish_generation(text, None, true);
            }
        }
    }

    fn set_field(&mut self, update: FieldUpdate) {
        let draft = &mut self.draft;
        match update {
            FieldUpdate::TripPurpose(v) => draft.trip_purpose = v,
            FieldUpdate::TravelStart(v) => draft.travel_dates.start = v,
            FieldUpdate::TravelEnd(v) => draft.travel_dates.end = v,
            FieldUpdate::DatesFlexible(v) => draft.travel_dates.is_flexible = v,
            FieldUpdate::TripLength(v) => {
                draft.trip_length = v;
                self.custom_day_count = match v {
                    Some(TripLength::Days(n)) => Some(n),
                    _ => None,
                };
            }
            FieldUpdate::EnvironmentPreference(v) => draft.environment_preference = v,
            FieldUpdate::TotalBudget(v) => {
                if v.is_sign_negative() {
                    tracing::debug!(value = %v, "Ignoring negative total budget");
                } else {
                    draft.total_budget = v;
                }
            }
            FieldUpdate::AccommodationType(v) => draft.accommodation_type = v,
            FieldUpdate::AccommodationBudget(v) => {
                if v.is_sign_negative() {
                    tracing::debug!(value = %v, "Ignoring negative accommodation budget");
                } else {
                    draft.accommodation_budget = v;
                }
            }
            FieldUpdate::DiningBudget(v) => draft.dining_budget = v,
            FieldUpdate::TravelCompanions(v) => draft.travel_companions = v,
            FieldUpdate::SpecialConsiderations(v) => {
                draft.special_considerations = keep_unless_blank(v);
            }
            FieldUpdate::AdventureLevel(v) => draft.adventure_level = v,
            FieldUpdate::TravelPace(v) => draft.travel_pace = v,
            FieldUpdate::TransportationPreference(v) => draft.transportation_preference = v,
            FieldUpdate::TravelExperienceLevel(v) => draft.travel_experience_level = v,
            FieldUpdate::ComfortLevel(v) => draft.comfort_level = v,
            FieldUpdate::HealthSafetyConcerns(v) => {
                draft.health_safety_concerns = keep_unless_blank(v);
            }
            FieldUpdate::PreviousExperiences(v) => {
                draft.previous_experiences = keep_unless_blank(v);
            }
        }
    }

    /// Append a trimmed custom destination to both lists. Blank input is a no-op.
    pub fn add_custom_destination(&mut self, text: &str) {
        let Some(destination) = non_blank(Some(text)) else {
            return;
        };
        self.custom_destinations.push(destination.clone());
        self.draft.preferred_regions.push(destination);
        self.custom_destination_input.clear();
    }

    /// Remove every entry equal to `text` from both lists.
    pub fn remove_custom_destination(&mut self, text: &str) {
        self.custom_destinations.retain(|d| d != text);
        self.draft.preferred_regions.retain(|r| r != text);
    }

    /// Accepts an empty string or a positive integer; anything else is ignored.
    pub fn set_custom_day_count(&mut self, input: &str) {
        let input = input.trim();
        if input.is_empty() {
            self.custom_day_count = None;
            self.draft.trip_length = None;
            return;
        }
        match input.parse::<u32>() {
            Ok(days) if days > 0 => {
                self.custom_day_count = Some(days);
                self.draft.trip_length = Some(TripLength::Days(days));
            }
            _ => tracing::debug!(input, "Ignoring invalid day count"),
        }
    }

    pub fn advance(&mut self) {
        if !self.current_step_complete() {
            self.error_message = Some(INCOMPLETE_STEP_MESSAGE.to_string());
            return;
        }
        if let Some(next) = self.step.next() {
            self.step = next;
            self.error_message = None;
        }
    }

    pub fn retreat(&mut self) {
        if let Some(previous) = self.step.previous() {
            self.step = previous;
            self.error_message = None;
        }
    }

    /// Flip `submitting` on if the questionnaire may be submitted now.
    ///
    /// Returns why not otherwise; the state is left unchanged apart from the
    /// error banner on a validation failure.
    pub fn begin_submit(&mut self) -> Result<(), QuestionnaireError> {
        if self.submitting {
            return Err(QuestionnaireError::SubmissionInFlight);
        }
        if self.submitted.is_some() {
            return Err(QuestionnaireError::AlreadySubmitted);
        }
        let incomplete = if self.step.is_last() {
            first_incomplete_step(&self.draft, self.custom_day_count, &self.custom_destinations)
        } else {
            Some(self.step)
        };
        if let Some(step) = incomplete {
            self.error_message = Some(INCOMPLETE_STEP_MESSAGE.to_string());
            return Err(QuestionnaireError::ValidationIncomplete { step: step.index() });
        }
        self.submitting = true;
        self.error_message = None;
        Ok(())
    }

    fn finish_generation(&mut self, text: String, summary: Option<TripSummary>, failed: bool) {
        let Some(results) = self.results.as_mut().filter(|r| r.loading) else {
            tracing::debug!("Generation result arrived with nothing pending");
            return;
        };
        results.plain_text = to_plain_text(&text);
        results.recommendation = text;
        results.summary = summary;
        results.failed = failed;
        results.loading = false;
        self.submitting = false;
    }
}

fn keep_unless_blank(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty())
}
