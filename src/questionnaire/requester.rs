//! Itinerary generation: one LLM request per submitted questionnaire.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::QuestionnaireError;
use crate::llm::{ChatMessage, CompletionRequest, FinishReason, LlmProvider};

use super::model::FinalizedPreferences;
use super::prompts::{SYSTEM_PROMPT, format_currency, format_itinerary, itinerary_prompt, to_plain_text};
use super::state::WizardEvent;

/// Fallback reason when the model answers with nothing usable.
const EMPTY_COMPLETION: &str = "Failed to generate recommendations. Please try again.";

/// Sampling settings for itinerary requests.
#[derive(Debug, Clone, PartialEq)]
pub struct RequesterConfig {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for RequesterConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

/// Generated itinerary text in its three renderings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Itinerary {
    pub raw: String,
    /// `**bold**` converted to `<strong>` tags.
    pub formatted: String,
    pub plain_text: String,
}

impl Itinerary {
    pub fn from_raw(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let formatted = format_itinerary(&raw);
        let plain_text = to_plain_text(&formatted);
        Self {
            raw,
            formatted,
            plain_text,
        }
    }
}

/// Header card shown above the itinerary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripSummary {
    pub total_budget: String,
    pub duration: String,
    pub destinations: Vec<String>,
    /// "1 Region" / "3 Regions".
    #[serde(default)]
    pub destination_count: String,
    pub travel_style: String,
}

impl TripSummary {
    pub fn from_preferences(prefs: &FinalizedPreferences) -> Self {
        Self {
            total_budget: format_currency(prefs.total_budget),
            duration: prefs.trip_length.to_string(),
            destination_count: destination_count_label(prefs.preferred_regions.len()),
            destinations: prefs.preferred_regions.clone(),
            travel_style: prefs.travel_pace.short_label().to_string(),
        }
    }
}

fn destination_count_label(count: usize) -> String {
    match count {
        1 => "1 Region".to_string(),
        n => format!("{n} Regions"),
    }
}

/// Outcome of one generation attempt. Exactly one of `itinerary` and `error` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub itinerary: Option<Itinerary>,
    pub error: Option<String>,
    pub summary: Option<TripSummary>,
}

impl Recommendation {
    pub fn completed(itinerary: Itinerary, summary: TripSummary) -> Self {
        Self {
            itinerary: Some(itinerary),
            error: None,
            summary: Some(summary),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            itinerary: None,
            error: Some(reason.into()),
            summary: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Text shown in the results panel.
    pub fn display_text(&self) -> String {
        match (&self.itinerary, &self.error) {
            (Some(itinerary), _) => itinerary.formatted.clone(),
            (None, Some(reason)) => format!("Error: {reason}"),
            (None, None) => format!("Error: {EMPTY_COMPLETION}"),
        }
    }

    /// The state-machine event that settles the loading view.
    pub fn into_event(self) -> WizardEvent {
        match (self.itinerary, self.error) {
            (Some(itinerary), _) => WizardEvent::GenerationCompleted {
                itinerary: itinerary.formatted,
                summary: self.summary.unwrap_or_default(),
            },
            (None, error) => WizardEvent::GenerationFailed {
                message: error.unwrap_or_else(|| EMPTY_COMPLETION.to_string()),
            },
        }
    }
}

/// Sends finalized preferences to the LLM and turns the reply into an itinerary.
pub struct RecommendationRequester {
    llm: Arc<dyn LlmProvider>,
    config: RequesterConfig,
}

impl RecommendationRequester {
    pub fn new(llm: Arc<dyn LlmProvider>, config: RequesterConfig) -> Self {
        Self { llm, config }
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// Build the completion request for `prefs`.
    pub fn build_request(&self, prefs: &FinalizedPreferences) -> CompletionRequest {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(itinerary_prompt(prefs)),
        ])
        .with_temperature(self.config.temperature);

        match self.config.max_tokens {
            Some(max_tokens) => request.with_max_tokens(max_tokens),
            None => request,
        }
    }

    /// Make exactly one generation call. Never retries; failures come back
    /// as a failed [`Recommendation`].
    pub async fn request(&self, prefs: &FinalizedPreferences) -> Recommendation {
        match self.generate(prefs).await {
            Ok(itinerary) => {
                info!(
                    record_id = %prefs.id,
                    chars = itinerary.raw.len(),
                    "Generated itinerary"
                );
                Recommendation::completed(itinerary, TripSummary::from_preferences(prefs))
            }
            Err(e) => {
                warn!(record_id = %prefs.id, error = %e, "Itinerary generation failed");
                let reason = match e {
                    QuestionnaireError::GenerationFailure(reason) => reason,
                    other => other.to_string(),
                };
                Recommendation::failed(reason)
            }
        }
    }

    async fn generate(&self, prefs: &FinalizedPreferences) -> Result<Itinerary, QuestionnaireError> {
        let request = self.build_request(prefs);
        let response = self
            .llm
            .complete(request)
            .await
            .map_err(|e| QuestionnaireError::GenerationFailure(e.to_string()))?;

        if response.finish_reason == FinishReason::Length {
            warn!(
                model = self.llm.model_name(),
                output_tokens = response.output_tokens,
                "Itinerary was truncated at the token limit"
            );
        }

        if response.content.trim().is_empty() {
            return Err(QuestionnaireError::GenerationFailure(
                EMPTY_COMPLETION.to_string(),
            ));
        }
        Ok(Itinerary::from_raw(response.content))
    }
}


#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::stub::StubLlm;
    use super::*;
    use crate::llm::Role;
    use crate::questionnaire::model::TripLength;
    use crate::questionnaire::model::fixtures::finalized;

    #[tokio::test]
    async fn successful_request_formats_itinerary() {
        let llm = Arc::new(StubLlm::replying("**Option 1: Barbados**\nDay 1: beach"));
        let requester = RecommendationRequester::new(llm.clone(), RequesterConfig::default());

        let rec = requester.request(&finalized()).await;
        assert!(!rec.is_failed());
        assert_eq!(llm.calls(), 1);

        let itinerary = rec.itinerary.clone().unwrap();
        assert_eq!(
            itinerary.formatted,
            "<strong>Option 1: Barbados</strong>\nDay 1: beach"
        );
        assert_eq!(itinerary.plain_text, "Option 1: Barbados\nDay 1: beach");
        assert_eq!(rec.display_text(), itinerary.formatted);

        let summary = rec.summary.clone().unwrap();
        assert_eq!(summary.total_budget, "$3,000");
        assert_eq!(summary.duration, "short");
        assert_eq!(summary.destinations, vec!["Caribbean"]);
        assert_eq!(summary.travel_style, "Balanced");
    }

    #[tokio::test]
    async fn request_carries_system_prompt_and_temperature() {
        let llm = Arc::new(StubLlm::replying("ok"));
        let requester = RecommendationRequester::new(
            llm.clone(),
            RequesterConfig {
                temperature: 0.7,
                max_tokens: Some(3000),
            },
        );
        requester.request(&finalized()).await;

        let requests = llm.requests.lock().unwrap();
        let sent = &requests[0];
        assert_eq!(sent.messages.len(), 2);
        assert_eq!(sent.messages[0].role, Role::System);
        assert_eq!(sent.messages[0].content, SYSTEM_PROMPT);
        assert_eq!(sent.messages[1].role, Role::User);
        assert!(sent.messages[1].content.contains("- Purpose: relaxation"));
        assert_eq!(sent.temperature, Some(0.7));
        assert_eq!(sent.max_tokens, Some(3000));
    }

    #[tokio::test]
    async fn llm_failure_becomes_error_text() {
        let llm = Arc::new(StubLlm::failing("connection reset"));
        let requester = RecommendationRequester::new(llm.clone(), RequesterConfig::default());

        let rec = requester.request(&finalized()).await;
        assert!(rec.is_failed());
        assert!(rec.summary.is_none());
        assert_eq!(llm.calls(), 1, "no retry");
        let text = rec.display_text();
        assert!(text.starts_with("Error: "));
        assert!(text.contains("connection reset"));

        match rec.into_event() {
            WizardEvent::GenerationFailed { message } => assert!(message.contains("connection reset")),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_completion_is_a_failure() {
        let llm = Arc::new(StubLlm::replying("   \n"));
        let requester = RecommendationRequester::new(llm, RequesterConfig::default());

        let rec = requester.request(&finalized()).await;
        assert!(rec.is_failed());
        assert_eq!(
            rec.display_text(),
            "Error: Failed to generate recommendations. Please try again."
        );
    }

    #[test]
    fn summary_for_custom_trip() {
        let mut prefs = finalized();
        prefs.total_budget = dec!(12500.5);
        prefs.trip_length = TripLength::Days(5);
        prefs.preferred_regions = vec!["Europe".into(), "Kyoto, Japan".into()];

        let summary = TripSummary::from_preferences(&prefs);
        assert_eq!(summary.total_budget, "$12,500.5");
        assert_eq!(summary.duration, "5 days");
        assert_eq!(summary.destination_count, "2 Regions");
    }

    #[test]
    fn summary_serializes_destination_count() {
        let summary = TripSummary::from_preferences(&finalized());
        assert_eq!(summary.destination_count, "1 Region");

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["destination_count"], "1 Region");
    }
}
