//! Mutuals Engine - mutual-preference recompute engine
//!
//! Members of a closed roster list free-text "crushes". The engine resolves
//! those names to members, detects mutual pairs, keeps a "how many people
//! like me" counter, and ratchets every crush that became a match so it can
//! never be withdrawn.
//!
//! # Architecture
//!
//! - **Resolver**: free text → canonical member (exact, then first + last token)
//! - **Calculator**: full-population pass producing counts, matches and locks
//! - **Ratchet**: restores locked crushes a client tried to drop
//! - **Trigger**: decides whether a change is material
//! - **Orchestrator**: snapshot → ratchet → calculate → batched commit
//! - **Worker**: single-writer queue, at most one recompute in flight
//! - **Watcher**: applies the above to the store's change feed
//!
//! # Example
//!
//! ```no_run
//! use mutuals_engine::{EngineConfig, EngineService, Member, MemberStore, MemoryStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::new());
//!     store.insert(Member::new("a".into(), "ada@example.org".into()).with_name("Ada"))?;
//!     let engine = EngineService::start(Arc::clone(&store), &EngineConfig::default());
//!     let stats = engine.trigger_full_recompute().await?;
//!     println!("{} match pairs", stats.totals.match_pairs);
//!     Ok(())
//! }
//! ```

pub mod calculator;
pub mod config;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod ratchet;
pub mod report;
pub mod resolver;
pub mod service;
pub mod store;
pub mod trigger;
pub mod watcher;
pub mod worker;

pub use calculator::{MatchCalculator, MemberOutcome, Recomputation, RecomputeTotals};
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use model::{now_millis, EngineWrite, MatchEntry, Member, MemberChange, MemberEdit, MemberId};
pub use orchestrator::{plan_recompute, Orchestrator, RecomputePlan, RecomputeStats};
pub use ratchet::{enforce_locks, missing_locks, restore_locks};
pub use report::{periodic_report, MatchPair, ReportSnapshot};
pub use resolver::{normalize_name, resolve, AmbiguityPolicy, NameResolver};
pub use service::EngineService;
pub use store::{BatchOutcome, MemberStore, MemoryStore, DEFAULT_MAX_BATCH};
pub use trigger::{is_material, is_material_change};
pub use watcher::{on_member_changed, spawn_watcher, watch_changes, ChangeDisposition};
pub use worker::{RecomputeHandle, RecomputeTrigger, RecomputeWorker};
