//! In-memory fake cloud backing the integration tests.
//!
//! State lives behind a mutex so one fake can serve every adapter seam;
//! every mutating call is appended to a log the tests assert against.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use docpipe_provision_aws::adapters::function::{FunctionSpec, FunctionStore};
use docpipe_provision_aws::adapters::identity::IdentityStore;
use docpipe_provision_aws::adapters::parameters::DiscoveryParameterStore;
use docpipe_provision_aws::adapters::queue::QueueStore;
use docpipe_provision_aws::adapters::repository::{
    retained_count_from_policy_text, RepositoryStore,
};
use docpipe_provision_aws::adapters::storage::StorageProbe;
use docpipe_provision_aws::handlers::ProviderAdapters;
use docpipe_provision_core::plan::{
    ObservedFunction, ObservedQueue, ObservedRepository, ObservedRole, ObservedTrigger,
};
use docpipe_provision_core::policy::POLICY_FINGERPRINT_TAG_KEY;

const ACCOUNT: &str = "123456789012";
const REGION: &str = "eu-central-1";

#[derive(Default)]
pub struct CloudState {
    pub buckets: BTreeSet<String>,
    pub repositories: BTreeMap<String, ObservedRepository>,
    pub queues: BTreeMap<String, ObservedQueue>,
    pub roles: BTreeMap<String, ObservedRole>,
    pub functions: BTreeMap<String, ObservedFunction>,
    pub triggers: BTreeMap<String, (String, ObservedTrigger)>,
    pub parameters: BTreeMap<String, String>,
    trigger_counter: usize,
}

#[derive(Default)]
pub struct InMemoryCloud {
    pub state: Mutex<CloudState>,
    pub mutation_log: Mutex<Vec<String>>,
    failing_operations: Mutex<BTreeSet<String>>,
}

impl InMemoryCloud {
    pub fn with_bucket(bucket: &str) -> Self {
        let cloud = Self::default();
        cloud
            .state
            .lock()
            .expect("poisoned mutex")
            .buckets
            .insert(bucket.to_string());
        cloud
    }

    pub fn adapters(&self) -> ProviderAdapters<'_> {
        ProviderAdapters {
            repositories: self,
            queues: self,
            identities: self,
            functions: self,
            parameters: self,
            storage: self,
        }
    }

    pub fn fail_on(&self, operation: &str) {
        self.failing_operations
            .lock()
            .expect("poisoned mutex")
            .insert(operation.to_string());
    }

    pub fn mutations(&self) -> Vec<String> {
        self.mutation_log.lock().expect("poisoned mutex").clone()
    }

    fn record(&self, operation: &str, target: &str) -> Result<(), String> {
        if self
            .failing_operations
            .lock()
            .expect("poisoned mutex")
            .contains(operation)
        {
            return Err(format!("injected failure for {operation}"));
        }
        self.mutation_log
            .lock()
            .expect("poisoned mutex")
            .push(format!("{operation} {target}"));
        Ok(())
    }

    fn queue_url(name: &str) -> String {
        format!("https://sqs.{REGION}.amazonaws.com/{ACCOUNT}/{name}")
    }
}

fn apply_queue_attributes(queue: &mut ObservedQueue, attributes: &BTreeMap<String, String>) {
    if let Some(value) = attributes.get("VisibilityTimeout") {
        queue.visibility_timeout_seconds = value.parse().ok();
    }
    if let Some(value) = attributes.get("DelaySeconds") {
        queue.delivery_delay_seconds = value.parse().ok();
    }
    if let Some(value) = attributes.get("MessageRetentionPeriod") {
        queue.message_retention_seconds = value.parse().ok();
    }
    if let Some(value) = attributes.get("ContentBasedDeduplication") {
        queue.content_based_deduplication = value.parse().ok();
    }
    if let Some(value) = attributes.get("RedrivePolicy") {
        if let Ok(redrive) = serde_json::from_str::<serde_json::Value>(value) {
            queue.max_receive_count = redrive["maxReceiveCount"]
                .as_u64()
                .and_then(|count| u32::try_from(count).ok());
            queue.dead_letter_target_arn = redrive["deadLetterTargetArn"]
                .as_str()
                .map(str::to_string);
        }
    }
}

impl RepositoryStore for InMemoryCloud {
    fn describe(&self, name: &str) -> Result<Option<ObservedRepository>, String> {
        Ok(self
            .state
            .lock()
            .expect("poisoned mutex")
            .repositories
            .get(name)
            .cloned())
    }

    fn create(
        &self,
        name: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<ObservedRepository, String> {
        self.record("create_repository", name)?;
        let repository = ObservedRepository {
            name: name.to_string(),
            uri: format!("{ACCOUNT}.dkr.ecr.{REGION}.amazonaws.com/{name}"),
            arn: format!("arn:aws:ecr:{REGION}:{ACCOUNT}:repository/{name}"),
            retained_image_count: None,
            tags: tags.clone(),
        };
        self.state
            .lock()
            .expect("poisoned mutex")
            .repositories
            .insert(name.to_string(), repository.clone());
        Ok(repository)
    }

    fn put_lifecycle_policy(&self, name: &str, policy_text: &str) -> Result<(), String> {
        self.record("put_lifecycle_policy", name)?;
        let mut state = self.state.lock().expect("poisoned mutex");
        let repository = state
            .repositories
            .get_mut(name)
            .ok_or_else(|| format!("repository '{name}' does not exist"))?;
        repository.retained_image_count = retained_count_from_policy_text(policy_text);
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<(), String> {
        self.record("delete_repository", name)?;
        self.state
            .lock()
            .expect("poisoned mutex")
            .repositories
            .remove(name);
        Ok(())
    }
}

impl QueueStore for InMemoryCloud {
    fn describe(&self, name: &str) -> Result<Option<ObservedQueue>, String> {
        Ok(self
            .state
            .lock()
            .expect("poisoned mutex")
            .queues
            .get(name)
            .cloned())
    }

    fn create(
        &self,
        name: &str,
        attributes: &BTreeMap<String, String>,
        tags: &BTreeMap<String, String>,
    ) -> Result<ObservedQueue, String> {
        self.record("create_queue", name)?;
        let mut queue = ObservedQueue {
            url: Self::queue_url(name),
            arn: format!("arn:aws:sqs:{REGION}:{ACCOUNT}:{name}"),
            tags: tags.clone(),
            ..ObservedQueue::default()
        };
        apply_queue_attributes(&mut queue, attributes);
        self.state
            .lock()
            .expect("poisoned mutex")
            .queues
            .insert(name.to_string(), queue.clone());
        Ok(queue)
    }

    fn set_attributes(
        &self,
        url: &str,
        attributes: &BTreeMap<String, String>,
    ) -> Result<(), String> {
        self.record("set_queue_attributes", url)?;
        let mut state = self.state.lock().expect("poisoned mutex");
        let queue = state
            .queues
            .values_mut()
            .find(|queue| queue.url == url)
            .ok_or_else(|| format!("queue '{url}' does not exist"))?;
        apply_queue_attributes(queue, attributes);
        Ok(())
    }

    fn delete(&self, url: &str) -> Result<(), String> {
        self.record("delete_queue", url)?;
        self.state
            .lock()
            .expect("poisoned mutex")
            .queues
            .retain(|_, queue| queue.url != url);
        Ok(())
    }
}

impl IdentityStore for InMemoryCloud {
    fn describe(&self, name: &str) -> Result<Option<ObservedRole>, String> {
        Ok(self
            .state
            .lock()
            .expect("poisoned mutex")
            .roles
            .get(name)
            .cloned())
    }

    fn create(
        &self,
        name: &str,
        _trust_document: &serde_json::Value,
        tags: &BTreeMap<String, String>,
    ) -> Result<ObservedRole, String> {
        self.record("create_role", name)?;
        let role = ObservedRole {
            name: name.to_string(),
            arn: format!("arn:aws:iam::{ACCOUNT}:role/{name}"),
            policy_fingerprint: None,
            tags: tags.clone(),
        };
        self.state
            .lock()
            .expect("poisoned mutex")
            .roles
            .insert(name.to_string(), role.clone());
        Ok(role)
    }

    fn put_execution_policy(
        &self,
        role_name: &str,
        _policy_name: &str,
        _document: &serde_json::Value,
        fingerprint: &str,
    ) -> Result<(), String> {
        self.record("put_role_policy", role_name)?;
        let mut state = self.state.lock().expect("poisoned mutex");
        let role = state
            .roles
            .get_mut(role_name)
            .ok_or_else(|| format!("role '{role_name}' does not exist"))?;
        role.policy_fingerprint = Some(fingerprint.to_string());
        role.tags.insert(
            POLICY_FINGERPRINT_TAG_KEY.to_string(),
            fingerprint.to_string(),
        );
        Ok(())
    }

    fn delete(&self, role_name: &str, _policy_name: &str) -> Result<(), String> {
        self.record("delete_role", role_name)?;
        self.state
            .lock()
            .expect("poisoned mutex")
            .roles
            .remove(role_name);
        Ok(())
    }
}

impl FunctionStore for InMemoryCloud {
    fn describe(&self, name: &str) -> Result<Option<ObservedFunction>, String> {
        Ok(self
            .state
            .lock()
            .expect("poisoned mutex")
            .functions
            .get(name)
            .cloned())
    }

    fn create(&self, spec: &FunctionSpec) -> Result<ObservedFunction, String> {
        self.record("create_function", &spec.name)?;
        let function = ObservedFunction {
            name: spec.name.clone(),
            arn: format!("arn:aws:lambda:{REGION}:{ACCOUNT}:function:{}", spec.name),
            image_uri: Some(spec.image_uri.clone()),
            role_arn: Some(spec.role_arn.clone()),
            timeout_seconds: Some(spec.timeout_seconds),
            memory_mb: Some(spec.memory_mb),
            environment: spec.environment.clone(),
            tags: spec.tags.clone(),
        };
        self.state
            .lock()
            .expect("poisoned mutex")
            .functions
            .insert(spec.name.clone(), function.clone());
        Ok(function)
    }

    fn update_code(&self, name: &str, image_uri: &str) -> Result<(), String> {
        self.record("update_function_code", name)?;
        let mut state = self.state.lock().expect("poisoned mutex");
        let function = state
            .functions
            .get_mut(name)
            .ok_or_else(|| format!("function '{name}' does not exist"))?;
        function.image_uri = Some(image_uri.to_string());
        Ok(())
    }

    fn update_configuration(&self, spec: &FunctionSpec) -> Result<(), String> {
        self.record("update_function_configuration", &spec.name)?;
        let mut state = self.state.lock().expect("poisoned mutex");
        let function = state
            .functions
            .get_mut(&spec.name)
            .ok_or_else(|| format!("function '{}' does not exist", spec.name))?;
        function.role_arn = Some(spec.role_arn.clone());
        function.timeout_seconds = Some(spec.timeout_seconds);
        function.memory_mb = Some(spec.memory_mb);
        function.environment = spec.environment.clone();
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<(), String> {
        self.record("delete_function", name)?;
        self.state
            .lock()
            .expect("poisoned mutex")
            .functions
            .remove(name);
        Ok(())
    }

    fn describe_trigger(
        &self,
        function_name: &str,
        queue_arn: &str,
    ) -> Result<Option<ObservedTrigger>, String> {
        Ok(self
            .state
            .lock()
            .expect("poisoned mutex")
            .triggers
            .values()
            .find(|(owner, trigger)| owner == function_name && trigger.queue_arn == queue_arn)
            .map(|(_, trigger)| trigger.clone()))
    }

    fn create_trigger(
        &self,
        function_name: &str,
        queue_arn: &str,
        batch_size: u32,
        batching_window_seconds: u32,
    ) -> Result<ObservedTrigger, String> {
        self.record("create_trigger", function_name)?;
        let mut state = self.state.lock().expect("poisoned mutex");
        state.trigger_counter += 1;
        let trigger = ObservedTrigger {
            id: format!("esm-{}", state.trigger_counter),
            queue_arn: queue_arn.to_string(),
            batch_size: Some(batch_size),
            batching_window_seconds: Some(batching_window_seconds),
        };
        state
            .triggers
            .insert(trigger.id.clone(), (function_name.to_string(), trigger.clone()));
        Ok(trigger)
    }

    fn update_trigger(
        &self,
        id: &str,
        batch_size: u32,
        batching_window_seconds: u32,
    ) -> Result<(), String> {
        self.record("update_trigger", id)?;
        let mut state = self.state.lock().expect("poisoned mutex");
        let (_, trigger) = state
            .triggers
            .get_mut(id)
            .ok_or_else(|| format!("trigger '{id}' does not exist"))?;
        trigger.batch_size = Some(batch_size);
        trigger.batching_window_seconds = Some(batching_window_seconds);
        Ok(())
    }

    fn delete_trigger(&self, id: &str) -> Result<(), String> {
        self.record("delete_trigger", id)?;
        self.state
            .lock()
            .expect("poisoned mutex")
            .triggers
            .remove(id);
        Ok(())
    }
}

impl DiscoveryParameterStore for InMemoryCloud {
    fn get(&self, path: &str) -> Result<Option<String>, String> {
        Ok(self
            .state
            .lock()
            .expect("poisoned mutex")
            .parameters
            .get(path)
            .cloned())
    }

    fn put(&self, path: &str, value: &str) -> Result<(), String> {
        self.record("put_parameter", path)?;
        self.state
            .lock()
            .expect("poisoned mutex")
            .parameters
            .insert(path.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<(), String> {
        self.record("delete_parameter", path)?;
        self.state
            .lock()
            .expect("poisoned mutex")
            .parameters
            .remove(path);
        Ok(())
    }
}

impl StorageProbe for InMemoryCloud {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, String> {
        Ok(self
            .state
            .lock()
            .expect("poisoned mutex")
            .buckets
            .contains(bucket))
    }
}
