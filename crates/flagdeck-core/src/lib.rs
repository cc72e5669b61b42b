// crates/flagdeck-core/src/lib.rs
// ============================================================================
// Module: Flagdeck Core Library
// Description: Data model, rule compiler, bucketer, and evaluation engine.
// Purpose: Provide the pure, I/O-free heart of the feature-flag platform.
// Dependencies: regex, semver, serde, serde_jcs, sha2, hmac, time, uuid
// ============================================================================

//! ## Overview
//! `flagdeck-core` is the shared library underneath every Flagdeck service:
//! the control plane compiles authored rules with [`compiler`], edges
//! evaluate installed plans with [`eval`] and [`bucketer`], and every
//! component exchanges the [`core::plan::EnvironmentConfig`] document whose
//! etag and signature come from [`hashing`]. The crate is deliberately free
//! of I/O and async so evaluation stays pure CPU work.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod auth;
pub mod bucketer;
pub mod compiler;
pub mod core;
pub mod error;
pub mod eval;
pub mod hashing;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use crate::auth::AllowAll;
pub use crate::auth::StaticVerifier;
pub use crate::auth::TokenKind;
pub use crate::auth::TokenVerifier;
pub use crate::auth::Verification;
pub use crate::bucketer::Bucketing;
pub use crate::bucketer::TOTAL_BUCKETS;
pub use crate::bucketer::bucket_user;
pub use crate::compiler::CompileError;
pub use crate::compiler::compile_environment;
pub use crate::compiler::compile_flag;
pub use crate::core::attributes::AttributeValue;
pub use crate::core::attributes::EvalContext;
pub use crate::core::events::EvalReason;
pub use crate::core::events::ExposureEvent;
pub use crate::core::events::MetricEvent;
pub use crate::core::flag::Condition;
pub use crate::core::flag::Flag;
pub use crate::core::flag::FlagStatus;
pub use crate::core::flag::FlagType;
pub use crate::core::flag::Predicate;
pub use crate::core::flag::RolloutWeight;
pub use crate::core::flag::Rule;
pub use crate::core::flag::RuleAction;
pub use crate::core::flag::Segment;
pub use crate::core::flag::Variation;
pub use crate::core::identifiers::EnvKey;
pub use crate::core::identifiers::FlagKey;
pub use crate::core::identifiers::KeyError;
pub use crate::core::identifiers::MAX_KEY_LEN;
pub use crate::core::identifiers::MetricKey;
pub use crate::core::identifiers::RuleId;
pub use crate::core::identifiers::SegmentKey;
pub use crate::core::identifiers::VariationKey;
pub use crate::core::identifiers::validate_key;
pub use crate::core::plan::CompiledAction;
pub use crate::core::plan::CompiledCondition;
pub use crate::core::plan::CompiledPlan;
pub use crate::core::plan::CompiledRule;
pub use crate::core::plan::EnvironmentConfig;
pub use crate::core::plan::Operator;
pub use crate::core::plan::RolloutRange;
pub use crate::core::time::Timestamp;
pub use crate::error::ApiError;
pub use crate::error::ErrorBody;
pub use crate::error::FieldError;
pub use crate::eval::Evaluation;
pub use crate::eval::evaluate_flag;
pub use crate::hashing::ConfigSigner;
pub use crate::hashing::HashAlgorithm;
pub use crate::hashing::HashDigest;
pub use crate::hashing::HashError;
pub use crate::hashing::user_key_hash;
