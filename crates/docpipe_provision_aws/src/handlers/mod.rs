//! Orchestration handlers: plan, apply, inspect, and teardown.
//!
//! Handlers depend only on the adapter trait seams, so every flow runs
//! against recording fakes in tests and against SDK clients in the
//! binary.

pub mod apply;
pub mod inspect;
pub mod observe;
pub mod teardown;

use crate::adapters::function::FunctionStore;
use crate::adapters::identity::IdentityStore;
use crate::adapters::parameters::DiscoveryParameterStore;
use crate::adapters::queue::QueueStore;
use crate::adapters::repository::RepositoryStore;
use crate::adapters::storage::StorageProbe;

/// One bundle of adapter seams per provisioning run.
pub struct ProviderAdapters<'a> {
    pub repositories: &'a dyn RepositoryStore,
    pub queues: &'a dyn QueueStore,
    pub identities: &'a dyn IdentityStore,
    pub functions: &'a dyn FunctionStore,
    pub parameters: &'a dyn DiscoveryParameterStore,
    pub storage: &'a dyn StorageProbe,
}
