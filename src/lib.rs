// coordinator-agent: LLM-driven service coordinator
//
// Translates one natural-language request into an ordered fan-out of calls to
// a catalog of contract-described HTTP services: select the services, extract
// structured parameters from the query, order execution along the implicit
// data-flow graph, and run a fixed-point loop that tolerates cycles and
// partial unresolvability.

pub mod audit;
pub mod config;
pub mod contract;
pub mod dispatcher;
pub mod error;
pub mod extractor;
pub mod llm;
pub mod model;
pub mod planner;
pub mod resolver;
pub mod retrieval;
pub mod selector;
pub mod server;

pub use config::CoordinatorConfig;
pub use error::{CoordinatorError, CoordinatorResult};
pub use llm::{LanguageModel, LmStudioClient};
pub use model::{Candidate, DispatchOutcome, Selection};
pub use server::{app, serve, AppState};
