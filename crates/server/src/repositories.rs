//! Thin adapters wiring the generic [`llmgate_store`] entity stores into
//! each consuming crate's own repository trait. Kept here rather than in
//! `llmgate-store` itself, since `llmgate-gateway`/`llmgate-supervisor`/
//! `llmgate-health`/`llmgate-credentials` already depend on the store crate
//! and cannot hand it their own trait definitions without a dependency
//! cycle.

use std::sync::Arc;

use async_trait::async_trait;
use llmgate_core::{AdminAgent, Bot, BotId, Credential, GatewayError, Provider, ProviderId, Tenant, TenantId};
use llmgate_credentials::CredentialSource;
use llmgate_gateway::{ProviderRepository as GatewayProviderRepository, TenantRepository as GatewayTenantRepository};
use llmgate_health::BotRepository as HealthBotRepository;
use llmgate_store::{AdminAgentStore, BotStore, CredentialStore, ProviderStore, StoreError, TenantStore};
use llmgate_supervisor::{AdminAgentRepository, BotOwnership, RestartAction, TenantRepository as SupervisorTenantRepository};
use tracing::info;

/// Tenant lookups, shared by the gateway (which also needs to flip
/// `suspended`) and the supervisor loop (which only ever reads).
pub struct TenantAdapter {
    store: Arc<dyn TenantStore>,
}

impl TenantAdapter {
    #[must_use]
    pub fn new(store: Arc<dyn TenantStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl GatewayTenantRepository for TenantAdapter {
    async fn get(&self, tenant_id: &TenantId) -> Result<Option<Tenant>, GatewayError> {
        Ok(self.store.get(tenant_id).await?)
    }

    async fn set_suspended(&self, tenant_id: &TenantId, suspended: bool) -> Result<(), GatewayError> {
        let Some(mut tenant) = self.store.get(tenant_id).await? else {
            return Err(GatewayError::UnknownTenant(tenant_id.clone()));
        };
        tenant.suspended = suspended;
        self.store.upsert(tenant).await?;
        Ok(())
    }
}

#[async_trait]
impl SupervisorTenantRepository for TenantAdapter {
    async fn get(&self, tenant_id: &TenantId) -> Result<Option<Tenant>, GatewayError> {
        Ok(self.store.get(tenant_id).await?)
    }
}

/// Provider catalog lookup for the router.
pub struct ProviderAdapter {
    store: Arc<dyn ProviderStore>,
}

impl ProviderAdapter {
    #[must_use]
    pub fn new(store: Arc<dyn ProviderStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl GatewayProviderRepository for ProviderAdapter {
    async fn list(&self) -> Result<Vec<Provider>, GatewayError> {
        Ok(self.store.list().await?)
    }
}

/// Admin agents eligible for a supervisor cycle.
pub struct AdminAgentAdapter {
    store: Arc<dyn AdminAgentStore>,
}

impl AdminAgentAdapter {
    #[must_use]
    pub fn new(store: Arc<dyn AdminAgentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AdminAgentRepository for AdminAgentAdapter {
    async fn active_agents(&self) -> Result<Vec<AdminAgent>, GatewayError> {
        let all = self.store.list_all().await?;
        Ok(all
            .into_iter()
            .filter(|agent| agent.is_active() && agent.health_check_enabled)
            .collect())
    }
}

/// Which bots a tenant owns, for the supervisor's fan-out.
pub struct BotOwnershipAdapter {
    store: Arc<dyn BotStore>,
}

impl BotOwnershipAdapter {
    #[must_use]
    pub fn new(store: Arc<dyn BotStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl BotOwnership for BotOwnershipAdapter {
    async fn bots_for_tenant(&self, tenant_id: &TenantId) -> Result<Vec<BotId>, GatewayError> {
        let bots = self.store.list_for_tenant(tenant_id).await?;
        Ok(bots.into_iter().map(|bot| bot.id).collect())
    }
}

/// Bot restarts go through an external process manager in a real
/// deployment; that transport is out of scope here, so this stub just
/// reports success, the same stand-in role [`crate::dispatcher::StubDispatcher`]
/// plays for upstream completion calls.
pub struct StubRestarter;

#[async_trait]
impl RestartAction for StubRestarter {
    async fn restart(&self, bot_id: &BotId) -> Result<(), String> {
        info!(bot_id = %bot_id, "restart requested (stub)");
        Ok(())
    }
}

/// Bot lookup by bare id, for the health checker. `BotStore` is scoped by
/// tenant, so a bot's owning tenant isn't known up front; this walks the
/// tenant list until it finds a match. Fine at the scale this gateway
/// targets, but an index keyed directly by bot id would be the right fix
/// if the tenant count grew large.
pub struct BotRepositoryAdapter {
    bots: Arc<dyn BotStore>,
    tenants: Arc<dyn TenantStore>,
}

impl BotRepositoryAdapter {
    #[must_use]
    pub fn new(bots: Arc<dyn BotStore>, tenants: Arc<dyn TenantStore>) -> Self {
        Self { bots, tenants }
    }
}

#[async_trait]
impl HealthBotRepository for BotRepositoryAdapter {
    async fn get(&self, bot_id: &BotId) -> Result<Option<Bot>, GatewayError> {
        for tenant in self.tenants.list().await? {
            if let Some(bot) = self.bots.get(&tenant.id, bot_id).await? {
                return Ok(Some(bot));
            }
        }
        Ok(None)
    }
}

/// Bridges the async [`CredentialStore`] to the synchronous
/// [`CredentialSource`] the credential pool manager calls on every
/// completion. `refresh` pulls a provider's current pool into the cache;
/// callers invoke it after any credential admin mutation and on a
/// periodic interval, since `credentials_for` only ever reads the cache.
pub struct StoreBackedCredentialSource {
    store: Arc<dyn CredentialStore>,
    cache: dashmap::DashMap<ProviderId, Vec<Credential>>,
}

impl StoreBackedCredentialSource {
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            cache: dashmap::DashMap::new(),
        }
    }

    pub async fn refresh(&self, provider_id: &ProviderId) -> Result<(), StoreError> {
        let credentials = self.store.list_for_provider(provider_id).await?;
        self.cache.insert(provider_id.clone(), credentials);
        Ok(())
    }

    pub async fn refresh_all(&self, provider_ids: &[ProviderId]) -> Result<(), StoreError> {
        for provider_id in provider_ids {
            self.refresh(provider_id).await?;
        }
        Ok(())
    }
}

impl CredentialSource for StoreBackedCredentialSource {
    fn credentials_for(&self, provider_id: &ProviderId) -> Vec<Credential> {
        self.cache.get(provider_id).map(|v| v.clone()).unwrap_or_default()
    }
}
