//! Health-filtered, priority-ordered provider selection with fallback.
//!
//! Selection is read-only: it consults each candidate provider's circuit
//! breaker and capacity but never reserves capacity itself. The caller
//! (the gateway facade) is responsible for incrementing and, in a
//! guaranteed-release scope, decrementing the provider's active-request
//! counter around the actual dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use llmgate_breaker::{CircuitBreakerRegistry, CircuitState};
use llmgate_core::{Provider, ProviderId, ProviderStatus, Tenant};
use tracing::debug;

/// Optional hints narrowing provider selection.
#[derive(Debug, Clone, Default)]
pub struct SelectOptions {
    pub model: Option<String>,
    pub prefer_provider: Option<ProviderId>,
}

/// A selected provider plus a human-readable justification, surfaced to
/// operators in logs and admin tooling.
#[derive(Debug, Clone)]
pub struct Selection {
    pub provider: Provider,
    pub reason: String,
}

/// Per-provider current concurrency, supplied by the caller (typically
/// read from the rate limiter's gauges) so selection can apply the
/// capacity check without the router owning that state itself.
pub trait CapacityView: Send + Sync {
    /// Whether `provider` has headroom for one more concurrent request.
    fn has_capacity(&self, provider: &ProviderId) -> bool;
}

/// A capacity view that always reports headroom, useful for tests and for
/// deployments that enforce concurrency purely at the rate limiter.
pub struct UnboundedCapacity;

impl CapacityView for UnboundedCapacity {
    fn has_capacity(&self, _provider: &ProviderId) -> bool {
        true
    }
}

pub struct ProviderRouter {
    breakers: Arc<CircuitBreakerRegistry>,
}

impl ProviderRouter {
    #[must_use]
    pub fn new(breakers: Arc<CircuitBreakerRegistry>) -> Self {
        Self { breakers }
    }

    async fn availability_reason(
        &self,
        provider: &Provider,
        capacity: &dyn CapacityView,
    ) -> Result<(), String> {
        if !provider.status.is_selectable() {
            return Err(format!("{}: status {:?}", provider.id, provider.status));
        }
        if let Some(breaker) = self.breakers.get(&provider.id) {
            let (state, _transition) = breaker.try_acquire_permit().await;
            if state == CircuitState::Open {
                return Err(format!("{}: circuit-open", provider.id));
            }
        }
        if !capacity.has_capacity(&provider.id) {
            return Err(format!("{}: capacity", provider.id));
        }
        Ok(())
    }

    /// Select the best available provider for a tenant, honoring the
    /// tenant's allowlist, an optional model filter, and an optional
    /// preferred provider.
    ///
    /// # Errors
    ///
    /// Returns `Err` with the concatenated per-provider rejection reasons
    /// if no candidate provider is currently available.
    pub async fn select(
        &self,
        tenant: &Tenant,
        providers: &[Provider],
        options: &SelectOptions,
        capacity: &dyn CapacityView,
    ) -> Result<Selection, String> {
        let mut candidates: Vec<&Provider> = providers
            .iter()
            .filter(|p| p.status.is_selectable())
            .filter(|p| tenant.allowed_providers.is_empty() || tenant.allowed_providers.contains(&p.id))
            .filter(|p| {
                options
                    .model
                    .as_ref()
                    .is_none_or(|model| p.models.iter().any(|m| m == model))
            })
            .collect();
        candidates.sort_by_key(|p| p.priority);

        if let Some(preferred_id) = &options.prefer_provider {
            if let Some(preferred) = candidates.iter().find(|p| &p.id == preferred_id) {
                if self.availability_reason(preferred, capacity).await.is_ok() {
                    return Ok(Selection {
                        provider: (*preferred).clone(),
                        reason: format!(
                            "{} selected as preferred provider (priority {}, status {:?})",
                            preferred.id, preferred.priority, preferred.status
                        ),
                    });
                }
            }
        }

        let mut reasons = Vec::with_capacity(candidates.len());
        for provider in &candidates {
            match self.availability_reason(provider, capacity).await {
                Ok(()) => {
                    debug!(provider = %provider.id, tenant = %tenant.id, "provider selected");
                    return Ok(Selection {
                        provider: (*provider).clone(),
                        reason: format!(
                            "{} selected (priority {}, status {:?})",
                            provider.id, provider.priority, provider.status
                        ),
                    });
                }
                Err(reason) => reasons.push(reason),
            }
        }

        if reasons.is_empty() {
            reasons.push("no providers configured for tenant".to_string());
        }
        Err(reasons.join("; "))
    }
}

/// Convenience capacity view backed by an in-memory active-request count
/// per provider, used by tests and by single-instance deployments that
/// don't share concurrency state across replicas.
#[derive(Default)]
pub struct InMemoryCapacity {
    active: dashmap::DashMap<ProviderId, u32>,
    limits: dashmap::DashMap<ProviderId, u32>,
}

impl InMemoryCapacity {
    #[must_use]
    pub fn new(limits: HashMap<ProviderId, u32>) -> Self {
        Self {
            active: dashmap::DashMap::new(),
            limits: limits.into_iter().collect(),
        }
    }

    pub fn increment(&self, provider: &ProviderId) {
        *self.active.entry(provider.clone()).or_insert(0) += 1;
    }

    pub fn decrement(&self, provider: &ProviderId) {
        if let Some(mut count) = self.active.get_mut(provider) {
            *count = count.saturating_sub(1);
        }
    }

    /// Set or update the concurrency limit for a provider, used to keep
    /// this view in sync as the provider catalog changes without having
    /// to rebuild (and lose active counts for) the whole view.
    pub fn set_limit(&self, provider: ProviderId, limit: u32) {
        self.limits.insert(provider, limit);
    }
}

impl CapacityView for InMemoryCapacity {
    fn has_capacity(&self, provider: &ProviderId) -> bool {
        let Some(limit) = self.limits.get(provider) else {
            return true;
        };
        let current = self.active.get(provider).map_or(0, |v| *v);
        current < *limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmgate_core::{CostRates, ProviderType};
    use llmgate_state_memory::{MemoryDistributedLock, MemoryStateStore};
    use rust_decimal::Decimal;

    fn provider(id: &str, priority: u32, status: ProviderStatus) -> Provider {
        Provider {
            id: ProviderId::from(id),
            name: id.to_string(),
            provider_type: ProviderType::Vendor,
            priority,
            status,
            rate_limit_per_minute: 60,
            max_concurrency: 5,
            cost_rates: CostRates {
                input_cost_per_1k_tokens: Decimal::new(1, 3),
                output_cost_per_1k_tokens: Decimal::new(2, 3),
            },
            models: vec!["gpt-4o".to_string()],
            updated_at: chrono::Utc::now(),
        }
    }

    fn tenant() -> Tenant {
        Tenant {
            id: llmgate_core::TenantId::from("t1"),
            name: "Tenant".to_string(),
            monthly_budget: Decimal::new(10000, 2),
            daily_budget: None,
            limits: llmgate_core::TenantLimits::default(),
            allowed_agents: vec![],
            allowed_providers: vec![],
            suspended: false,
            suspend_on_exceed: false,
            deleted: false,
            alert_thresholds: llmgate_core::TenantAlertThresholds::default(),
            created_at: chrono::Utc::now(),
        }
    }

    fn router() -> ProviderRouter {
        let registry = CircuitBreakerRegistry::new(
            Arc::new(MemoryStateStore::new()),
            Arc::new(MemoryDistributedLock::new()),
        );
        ProviderRouter::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn selects_lowest_priority_active_provider() {
        let router = router();
        let providers = vec![
            provider("p2", 2, ProviderStatus::Active),
            provider("p1", 1, ProviderStatus::Active),
        ];
        let selection = router
            .select(&tenant(), &providers, &SelectOptions::default(), &UnboundedCapacity)
            .await
            .unwrap();
        assert_eq!(selection.provider.id, ProviderId::from("p1"));
    }

    #[tokio::test]
    async fn skips_disabled_provider_for_next_priority() {
        let router = router();
        let providers = vec![
            provider("p1", 1, ProviderStatus::Disabled),
            provider("p2", 2, ProviderStatus::Active),
        ];
        let selection = router
            .select(&tenant(), &providers, &SelectOptions::default(), &UnboundedCapacity)
            .await
            .unwrap();
        assert_eq!(selection.provider.id, ProviderId::from("p2"));
    }

    #[tokio::test]
    async fn respects_tenant_allowlist() {
        let router = router();
        let mut t = tenant();
        t.allowed_providers = vec![ProviderId::from("p2")];
        let providers = vec![
            provider("p1", 1, ProviderStatus::Active),
            provider("p2", 2, ProviderStatus::Active),
        ];
        let selection = router
            .select(&t, &providers, &SelectOptions::default(), &UnboundedCapacity)
            .await
            .unwrap();
        assert_eq!(selection.provider.id, ProviderId::from("p2"));
    }

    #[tokio::test]
    async fn prefer_provider_wins_when_available() {
        let router = router();
        let providers = vec![
            provider("p1", 1, ProviderStatus::Active),
            provider("p2", 2, ProviderStatus::Active),
        ];
        let options = SelectOptions {
            model: None,
            prefer_provider: Some(ProviderId::from("p2")),
        };
        let selection = router
            .select(&tenant(), &providers, &options, &UnboundedCapacity)
            .await
            .unwrap();
        assert_eq!(selection.provider.id, ProviderId::from("p2"));
    }

    #[tokio::test]
    async fn open_circuit_recovers_to_half_open_after_timeout_without_manual_reset() {
        let mut registry = CircuitBreakerRegistry::new(
            Arc::new(MemoryStateStore::new()),
            Arc::new(MemoryDistributedLock::new()),
        );
        registry.register(
            ProviderId::from("p1"),
            llmgate_breaker::CircuitBreakerConfig {
                open_timeout: std::time::Duration::from_millis(1),
                ..Default::default()
            },
        );
        let registry = Arc::new(registry);
        registry.get(&ProviderId::from("p1")).unwrap().trip().await;

        let router = ProviderRouter::new(registry);
        let providers = vec![provider("p1", 1, ProviderStatus::Active)];

        let immediate = router
            .select(&tenant(), &providers, &SelectOptions::default(), &UnboundedCapacity)
            .await;
        assert!(immediate.is_err(), "circuit should still be open before the timeout elapses");

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let after_timeout = router
            .select(&tenant(), &providers, &SelectOptions::default(), &UnboundedCapacity)
            .await
            .unwrap();
        assert_eq!(after_timeout.provider.id, ProviderId::from("p1"));
    }

    #[tokio::test]
    async fn falls_back_when_preferred_provider_lacks_capacity() {
        let router = router();
        let mut limits = HashMap::new();
        limits.insert(ProviderId::from("p1"), 1);
        let capacity = InMemoryCapacity::new(limits);
        capacity.increment(&ProviderId::from("p1"));

        let providers = vec![
            provider("p1", 1, ProviderStatus::Active),
            provider("p2", 2, ProviderStatus::Active),
        ];
        let options = SelectOptions {
            model: None,
            prefer_provider: Some(ProviderId::from("p1")),
        };
        let selection = router
            .select(&tenant(), &providers, &options, &capacity)
            .await
            .unwrap();
        assert_eq!(selection.provider.id, ProviderId::from("p2"));
    }

    #[tokio::test]
    async fn filters_by_model() {
        let router = router();
        let mut p1 = provider("p1", 1, ProviderStatus::Active);
        p1.models = vec!["claude-3".to_string()];
        let providers = vec![p1, provider("p2", 2, ProviderStatus::Active)];
        let options = SelectOptions {
            model: Some("gpt-4o".to_string()),
            prefer_provider: None,
        };
        let selection = router
            .select(&tenant(), &providers, &options, &UnboundedCapacity)
            .await
            .unwrap();
        assert_eq!(selection.provider.id, ProviderId::from("p2"));
    }

    #[tokio::test]
    async fn no_available_provider_aggregates_reasons() {
        let router = router();
        let mut limits = HashMap::new();
        limits.insert(ProviderId::from("p1"), 0);
        limits.insert(ProviderId::from("p2"), 0);
        let capacity = InMemoryCapacity::new(limits);

        let providers = vec![
            provider("p1", 1, ProviderStatus::Active),
            provider("p2", 2, ProviderStatus::Active),
        ];
        let err = router
            .select(&tenant(), &providers, &SelectOptions::default(), &capacity)
            .await
            .unwrap_err();
        assert!(err.contains("p1") && err.contains("p2"));
    }

    #[tokio::test]
    async fn open_circuit_excludes_provider() {
        let registry = CircuitBreakerRegistry::new(
            Arc::new(MemoryStateStore::new()),
            Arc::new(MemoryDistributedLock::new()),
        );
        let mut registry = registry;
        registry.register(ProviderId::from("p1"), llmgate_breaker::CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        });
        registry.get(&ProviderId::from("p1")).unwrap().record_failure().await;

        let router = ProviderRouter::new(Arc::new(registry));
        let providers = vec![
            provider("p1", 1, ProviderStatus::Active),
            provider("p2", 2, ProviderStatus::Active),
        ];
        let selection = router
            .select(&tenant(), &providers, &SelectOptions::default(), &UnboundedCapacity)
            .await
            .unwrap();
        assert_eq!(selection.provider.id, ProviderId::from("p2"));
    }
}
