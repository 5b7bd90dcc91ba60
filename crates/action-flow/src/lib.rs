//! Query orchestration
//!
//! Drives one dashboard query from session restore to the reduced result:
//! per-stage deadlines, coarse retries from the furthest stable stage and a
//! single forced re-login when the dashboard rejects the stored session.

pub mod errors;
pub mod orchestrator;
pub mod plan;
pub mod policy;
pub mod session;

pub use errors::FlowError;
pub use orchestrator::QueryOrchestrator;
pub use plan::{ParamSource, PlanField, QueryPlan, QueryPlans};
pub use policy::{FlowPolicy, StageBudgets, WaitPolicies, MAX_BACKOFF_MS};
pub use session::{host_of, LoginFailure, LoginProvider, SessionCheck};
