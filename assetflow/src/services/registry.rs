//! In-memory service factory.

use super::{Capability, ServiceFactory, TaskService};
use std::collections::HashMap;
use std::sync::Arc;

type WebhookFn = dyn Fn(&str, &str) -> String + Send + Sync;

/// A [`ServiceFactory`] backed by services registered up front.
///
/// Webhook URLs come from the function passed to [`ServiceRegistry::new`];
/// the registry adds no logic of its own.
#[derive(Clone)]
pub struct ServiceRegistry {
    services: HashMap<Capability, Arc<dyn TaskService>>,
    webhook: Arc<WebhookFn>,
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut registered: Vec<String> = self.services.keys().map(ToString::to_string).collect();
        registered.sort();
        f.debug_struct("ServiceRegistry")
            .field("registered", &registered)
            .finish_non_exhaustive()
    }
}

impl ServiceRegistry {
    /// Creates an empty registry using `webhook` to build callback URLs.
    pub fn new<W>(webhook: W) -> Self
    where
        W: Fn(&str, &str) -> String + Send + Sync + 'static,
    {
        Self {
            services: HashMap::new(),
            webhook: Arc::new(webhook),
        }
    }

    /// Registers the service for a capability, replacing any previous one.
    #[must_use]
    pub fn with_service(mut self, capability: Capability, service: Arc<dyn TaskService>) -> Self {
        self.services.insert(capability, service);
        self
    }

    /// Registers one service for every capability.
    #[must_use]
    pub fn with_all(mut self, service: Arc<dyn TaskService>) -> Self {
        for capability in [
            Capability::TextTo3d,
            Capability::Rigging,
            Capability::Animation,
            Capability::Retexture,
        ] {
            self.services.insert(capability, Arc::clone(&service));
        }
        self
    }

    /// Returns true if a service is registered for the capability.
    #[must_use]
    pub fn has_service(&self, capability: Capability) -> bool {
        self.services.contains_key(&capability)
    }
}

impl ServiceFactory for ServiceRegistry {
    fn service(&self, capability: Capability) -> Option<&dyn TaskService> {
        self.services.get(&capability).map(|s| s.as_ref())
    }

    fn webhook_url(&self, species: &str, stage: &str) -> String {
        (self.webhook)(species, stage)
    }
}
