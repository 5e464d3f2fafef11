//! Configuration model, loading, and two-stage validation
//!
//! The loader guarantees that every configuration handed to the rest of the
//! engine has passed the structural schema check and the semantic
//! cross-reference rules, so downstream identifier lookups are total.

mod loader;
mod model;
mod semantic;
mod structural;

pub use loader::{load_and_validate_config, validate_config};
pub use model::{
    ChainStep, Config, FallbackTarget, MessageContent, MessageRole, MessageTemplate, PhasedRule,
    Prompt, ProviderConfig, ProviderType, ResponseFormat, Routing, RoutingRule, Variant,
};
