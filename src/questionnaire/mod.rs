//! Travel questionnaire: a ten-step wizard that collects travel preferences,
//! saves them, and asks an LLM for two personalised itineraries.
//!
//! The flow is driven by a pure reducer (`state::reduce`) over `WizardEvent`s.
//! `session::QuestionnaireSession` owns the state, runs submissions against
//! the injected identity, store, and requester, and broadcasts each change.

pub mod model;
pub mod prompts;
pub mod requester;
pub mod routes;
pub mod session;
pub mod state;
pub mod validator;

pub use model::{FinalizedPreferences, QuestionnaireOptions, TravelPreferences, TripLength};
pub use requester::{Recommendation, RecommendationRequester, RequesterConfig, TripSummary};
pub use routes::{QuestionnaireRouteState, questionnaire_routes};
pub use session::{
    QuestionnaireSession, SessionDeps, SessionLimits, SessionRegistry, WizardUpdate,
    spawn_sweep_task,
};
pub use state::{FieldUpdate, RecommendationView, WizardEvent, WizardState, WizardStep, reduce};
