//! Promptgate core - configuration-driven prompt routing and execution
//!
//! Given a declarative configuration enumerating providers, prompts, prompt
//! variants, routing rules, and fallback chains, this crate accepts symbolic
//! requests (a prompt identifier plus variables and optional user context)
//! and produces either a rendered message list or, after routing and provider
//! invocation, a normalized chat-completion response.
//!
//! # Main Components
//!
//! - **Config Model & Validator**: two-stage validation (structural schema +
//!   semantic cross-reference rules) that makes every downstream lookup total
//! - **Router**: deterministic variant selection under layered policies with
//!   stable per-user hashing
//! - **Template Engine**: a narrow Liquid-subset interpreter with a fixed
//!   filter set
//! - **Provider Adapters**: OpenAI-, Anthropic-, and Google-shaped execution
//!   behind one capability trait, with retryable/terminal error classification
//! - **Fallback Executor**: ordered attempts across a fallback chain
//! - **Telemetry Builder**: one structured observability event per request
//! - **Engine**: the orchestrator composing all of the above
//!
//! # Example
//!
//! ```no_run
//! use promptgate_core::{ChatCompletionParams, Engine, Environment, RuntimeConfig};
//!
//! # async fn example() -> promptgate_core::Result<()> {
//! let mut runtime = RuntimeConfig::new("prompts.json", Environment::Dev);
//! runtime.openai_api_key = Some("sk-...".to_string());
//!
//! let engine = Engine::new(runtime);
//! let response = engine
//!     .chat_completion(ChatCompletionParams::new("greeting"))
//!     .await?;
//! println!("{}", response.content_text().unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod params;
pub mod providers;
pub mod router;
pub mod telemetry;
pub mod template;

pub use config::{load_and_validate_config, validate_config, Config, ProviderType};
pub use engine::{
    ChatCompletionParams, Engine, Environment, GetTemplateParams, ProviderBaseUrls, RuntimeConfig,
};
pub use error::{Error, Result};
pub use providers::{ChatMessage, ChatResponse, TokenUsage};
pub use router::{RoutingReason, Selection};
pub use telemetry::{ObservabilityEvent, ObservabilitySink};

/// Library version, recorded on every observability event.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
