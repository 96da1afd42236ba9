//! Funnel Retrieval
//!
//! Incremental, resumable retrieval of time-sliced funnel parameters.
//!
//! # Architecture
//!
//! ```text
//! Retriever::retrieve
//!   ├─ plan_retrieval      parse → sign → decide → coverage → gaps
//!   ├─ RemoteAdapter       one call per gap (simple, composite or dual)
//!   ├─ merge               funnel_cache::merge_time_series
//!   └─ FileRegistry        persist after every gap
//! ```
//!
//! Storage and the remote backend are injected ports; the engine holds no
//! global state.
//!
//! # Example
//!
//! ```rust,ignore
//! let registry = Arc::new(InMemoryFileRegistry::new());
//! registry.open().await?;
//! let retriever = Retriever::new(registry, Arc::new(adapter))
//!     .with_config(RetrievalConfig::new().with_atomicity(true));
//!
//! let outcome = retriever
//!     .retrieve(
//!         "signup-to-purchase",
//!         &RetrievalTarget::Edge("signup->purchase".into()),
//!         "window(-30d:-1d).context(channel:google)",
//!         &RetrieveOptions::new().with_connection("amplitude-prod"),
//!     )
//!     .await?;
//! println!("p = {:.3} ({} days fetched)", outcome.p_mean, outcome.days_fetched);
//! ```

#![warn(unreachable_pub)]

pub mod adapter;
pub mod batch;
pub mod classify;
pub mod clock;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod registry;

pub use adapter::{
    combine_dual, AdapterResponse, CompositeEvidence, CompositeResponse, ExecuteOptions,
    QueryPattern, QueryPayload, QueryRole, RemoteAdapter, RetrievalTarget,
};
pub use batch::{BatchReport, BatchRequest};
pub use classify::classify_adapter_message;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{BatchConfig, RetrievalConfig};
pub use error::{AdapterError, AdapterErrorKind, ConfigError, RegistryError, RetrievalError};
pub use orchestrator::{RetrievalOutcome, RetrieveOptions, Retriever};
pub use plan::{plan_retrieval, sign_query, RetrievalPlan};
pub use registry::{CachedFileRegistry, FileRegistry, FsFileRegistry, InMemoryFileRegistry};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
