//! Trip Planner: travel questionnaire and LLM itinerary service.

pub mod config;
pub mod error;
pub mod identity;
pub mod llm;
pub mod mailer;
pub mod questionnaire;
pub mod store;
