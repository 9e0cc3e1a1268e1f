pub mod aggregator;
pub mod collaborative;
pub mod content;
pub mod engine;
pub mod generative;
pub mod resilience;
pub mod search;
pub mod weights;

pub use engine::{RecommendationEngine, RequestState};
pub use generative::{GenerativeAdapter, GenerativeClient, OpenAiClient};
pub use resilience::{Degraded, RetryPolicy};
