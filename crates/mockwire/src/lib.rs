// Request-matching and mapping-dispatch engine for HTTP test doubles.

// ===== Scoring =====
pub mod error;
pub mod match_result;
pub mod matchers;
pub mod score;

// ===== Requests and mappings =====
pub mod mapping;
pub mod request;

// ===== Shared state and dispatch =====
pub mod dispatch;
pub mod log;
pub mod registry;
pub mod scenario;

// ===== Host =====
pub mod config;
pub mod metrics;
pub mod server;

pub use dispatch::{DispatchKind, DispatchResult, Dispatcher};
pub use error::{MappingError, MatchError};
pub use mapping::{Mapping, MappingKind, ResponseMessage, StaticResponse};
pub use matchers::Matcher;
pub use request::{RequestMatcher, RequestMessage};
