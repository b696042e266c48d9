//! # Waterfall Core
//!
//! Client-side orchestration for the staged Architect → Reasoner → Executor →
//! Reviewer pipeline: stream decoding, phase transitions, gating and
//! cancellation, with a single-phase step runner alongside.
//!
//! ## Architecture
//!
//! - `waterfall/` - phase model, event decoding, controller and transport
//! - `models` - LLM provider selection
//! - `config` - where the server lives and how long to wait for it
//!
//! ## Usage
//!
//! ```rust,ignore
//! use waterfall_core::config::ClientConfig;
//! use waterfall_core::waterfall::WaterfallController;
//!
//! let config = ClientConfig::load().await?;
//! let controller = WaterfallController::from_config(&config)?;
//! let outcome = controller.run_full_waterfall("Build a stock tracker", false).await;
//! ```

pub mod config;
pub mod models;
pub mod waterfall;

pub use config::ClientConfig;
pub use models::LlmProvider;
