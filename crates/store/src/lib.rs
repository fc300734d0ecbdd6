//! Persistence built over [`llmgate_state::StateStore`].
//!
//! Usage records, usage alerts, and bot health logs are append-only: none
//! of those stores expose an update or delete operation, matching the data
//! model's append-only semantics. Tenants, providers, bots, admin agents
//! and credentials are mutable entity configuration instead, each with its
//! own small CRUD store following the same JSON-blob-over-`StateStore`
//! shape.

pub mod admin_agents;
pub mod alerts;
pub mod bots;
pub mod credentials;
pub mod error;
pub mod health_logs;
pub mod providers;
pub mod query;
pub mod tenants;
pub mod usage;

pub use admin_agents::{AdminAgentStore, StateAdminAgentStore};
pub use alerts::{AlertStore, StateAlertStore};
pub use bots::{BotStore, StateBotStore};
pub use credentials::{CredentialStore, StateCredentialStore};
pub use error::StoreError;
pub use health_logs::{HealthLogStore, StateHealthLogStore};
pub use providers::{ProviderStore, StateProviderStore};
pub use query::{Page, Query};
pub use tenants::{StateTenantStore, TenantStore};
pub use usage::{StateUsageStore, UsageStore};
