// crates/flagdeck-distributor/src/lib.rs
// ============================================================================
// Module: Flagdeck Distributor Library
// Description: Edge-side config distribution with fallback paths.
// Purpose: Converge edge env maps with the control plane within seconds.
// Dependencies: flagdeck-bus, flagdeck-core, flagdeck-store, reqwest, tokio
// ============================================================================

//! ## Overview
//! `flagdeck-distributor` keeps an edge's env → config map converged:
//! bus messages install new versions within the convergence window, a
//! conditional-GET poll loop compensates for missed messages, the shared
//! warm cache absorbs local misses, and a bootstrap file keeps answers
//! flowing when the control plane is unreachable. Installs are monotonic
//! per environment, so readers never travel back in version.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod bootstrap;
pub mod distributor;
pub mod env_map;
pub mod fetch;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use crate::bootstrap::BootstrapError;
pub use crate::bootstrap::load_bootstrap;
pub use crate::distributor::Distributor;
pub use crate::distributor::DistributorBuilder;
pub use crate::distributor::Resolution;
pub use crate::env_map::EnvConfigMap;
pub use crate::fetch::ConfigFetcher;
pub use crate::fetch::FetchOutcome;
pub use crate::fetch::HttpConfigFetcher;
