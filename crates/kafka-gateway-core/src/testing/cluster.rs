//! In-memory cluster standing in for a real one behind the [`AdminClient`] seam.
//!
//! One [`InMemoryCluster`] holds the topics, ACLs and the ordered call log.
//! Each handle created by [`MockAdminFactory`] is a separate client onto that
//! shared state, so a recreated handle sees the same cluster.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::acl::{AclBindingFilter, AclBindingSpec};
use crate::admin::{AdminClient, AdminClientFactory, AdminHandle, NewTopic, TopicDescription};
use crate::error::{codes, AdminError, AdminResult};
use crate::security::{SecurityProfile, SecurityProtocol};

/// One recorded admin call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCall {
    Probe,
    ListTopics,
    DescribeTopics,
    DescribeTopic(String),
    CreateTopic(String),
    CreatePartitions(String, i32),
    DeleteTopic(String),
    DescribeAcls,
    CreateAcls(usize),
    DeleteAcls(usize),
    Close,
}

impl AdminCall {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            AdminCall::CreateTopic(_)
                | AdminCall::CreatePartitions(..)
                | AdminCall::DeleteTopic(_)
                | AdminCall::CreateAcls(_)
                | AdminCall::DeleteAcls(_)
        )
    }
}

#[derive(Debug, Default)]
struct ClusterState {
    topics: BTreeMap<String, TopicDescription>,
    acls: BTreeSet<AclBindingSpec>,
    calls: Vec<AdminCall>,
}

/// Shared cluster state with failure injection.
#[derive(Debug)]
pub struct InMemoryCluster {
    state: Mutex<ClusterState>,
    broker_count: i16,
    failing_probes: AtomicUsize,
    down: AtomicBool,
    fail_mutations: AtomicBool,
    fail_acl_describe: AtomicBool,
    mutation_delay: Mutex<Option<Duration>>,
    probe_delay: Mutex<Option<Duration>>,
    closes: AtomicUsize,
}

impl Default for InMemoryCluster {
    fn default() -> Self {
        Self::new(3)
    }
}

impl InMemoryCluster {
    /// Cluster with `broker_count` brokers, which caps the replication factor.
    pub fn new(broker_count: i16) -> Self {
        Self {
            state: Mutex::new(ClusterState::default()),
            broker_count,
            failing_probes: AtomicUsize::new(0),
            down: AtomicBool::new(false),
            fail_mutations: AtomicBool::new(false),
            fail_acl_describe: AtomicBool::new(false),
            mutation_delay: Mutex::new(None),
            probe_delay: Mutex::new(None),
            closes: AtomicUsize::new(0),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A new client onto this cluster.
    pub fn client(self: &Arc<Self>) -> InMemoryAdmin {
        InMemoryAdmin {
            cluster: Arc::clone(self),
            closed: AtomicBool::new(false),
        }
    }

    /// Fail the next `n` liveness probes.
    pub fn fail_next_probes(&self, n: usize) {
        self.failing_probes.store(n, Ordering::SeqCst);
    }

    /// Every call fails while down.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn fail_mutations(&self, fail: bool) {
        self.fail_mutations.store(fail, Ordering::SeqCst);
    }

    pub fn fail_acl_describe(&self, fail: bool) {
        self.fail_acl_describe.store(fail, Ordering::SeqCst);
    }

    /// Sleep before answering each mutation.
    pub async fn set_mutation_delay(&self, delay: Option<Duration>) {
        *self.mutation_delay.lock().await = delay;
    }

    /// Sleep before answering each liveness probe.
    pub async fn set_probe_delay(&self, delay: Option<Duration>) {
        *self.probe_delay.lock().await = delay;
    }

    /// Add a topic without going through a client.
    pub async fn seed_topic(&self, name: &str, partitions: i32, replication_factor: i16) {
        self.state.lock().await.topics.insert(
            name.to_string(),
            TopicDescription {
                name: name.to_string(),
                partitions,
                replication_factor,
                internal: name.starts_with("__"),
            },
        );
    }

    /// Add bindings without going through a client.
    pub async fn seed_acls(&self, bindings: impl IntoIterator<Item = AclBindingSpec>) {
        self.state.lock().await.acls.extend(bindings);
    }

    pub async fn topic(&self, name: &str) -> Option<TopicDescription> {
        self.state.lock().await.topics.get(name).cloned()
    }

    pub async fn acls(&self) -> Vec<AclBindingSpec> {
        self.state.lock().await.acls.iter().cloned().collect()
    }

    pub async fn calls(&self) -> Vec<AdminCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn mutation_calls(&self) -> Vec<AdminCall> {
        self.calls().await.into_iter().filter(AdminCall::is_mutation).collect()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    /// Number of client handles closed so far.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    async fn enter(&self, call: AdminCall) -> AdminResult<()> {
        let mutation = call.is_mutation();
        let probe = call == AdminCall::Probe;
        let acl_describe = call == AdminCall::DescribeAcls;
        self.state.lock().await.calls.push(call);

        let delay = if mutation {
            *self.mutation_delay.lock().await
        } else if probe {
            *self.probe_delay.lock().await
        } else {
            None
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.down.load(Ordering::SeqCst) {
            return Err(injected("cluster down"));
        }
        if probe
            && self
                .failing_probes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(injected("probe failure"));
        }
        if mutation && self.fail_mutations.load(Ordering::SeqCst) {
            return Err(injected("mutation failure"));
        }
        if acl_describe && self.fail_acl_describe.load(Ordering::SeqCst) {
            return Err(injected("ACL describe failure"));
        }
        Ok(())
    }
}

fn injected(message: &str) -> AdminError {
    AdminError::BrokerUnavailable {
        address: "in-memory".to_string(),
        message: message.to_string(),
    }
}

/// One client handle onto an [`InMemoryCluster`].
#[derive(Debug)]
pub struct InMemoryAdmin {
    cluster: Arc<InMemoryCluster>,
    closed: AtomicBool,
}

impl InMemoryAdmin {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn enter(&self, call: AdminCall) -> AdminResult<()> {
        if self.is_closed() {
            return Err(AdminError::Closed);
        }
        self.cluster.enter(call).await
    }
}

#[async_trait]
impl AdminClient for InMemoryAdmin {
    async fn probe(&self) -> AdminResult<()> {
        self.enter(AdminCall::Probe).await
    }

    async fn list_topics(&self) -> AdminResult<Vec<String>> {
        self.enter(AdminCall::ListTopics).await?;
        let state = self.cluster.state.lock().await;
        Ok(state.topics.values().filter(|t| !t.internal).map(|t| t.name.clone()).collect())
    }

    async fn describe_topics(&self) -> AdminResult<Vec<TopicDescription>> {
        self.enter(AdminCall::DescribeTopics).await?;
        Ok(self.cluster.state.lock().await.topics.values().cloned().collect())
    }

    async fn describe_topic(&self, name: &str) -> AdminResult<Option<TopicDescription>> {
        self.enter(AdminCall::DescribeTopic(name.to_string())).await?;
        Ok(self.cluster.state.lock().await.topics.get(name).cloned())
    }

    async fn create_topic(&self, topic: &NewTopic) -> AdminResult<()> {
        self.enter(AdminCall::CreateTopic(topic.name.clone())).await?;
        let mut state = self.cluster.state.lock().await;
        if state.topics.contains_key(&topic.name) {
            return Err(AdminError::broker(
                codes::TOPIC_ALREADY_EXISTS,
                Some(&format!("Topic '{}' already exists.", topic.name)),
            ));
        }
        if topic.partitions < 1 {
            return Err(AdminError::broker(codes::INVALID_PARTITIONS, None));
        }
        if topic.replication_factor < 1 || topic.replication_factor > self.cluster.broker_count {
            return Err(AdminError::broker(
                codes::INVALID_REPLICATION_FACTOR,
                Some(&format!(
                    "Replication factor: {} larger than available brokers: {}.",
                    topic.replication_factor, self.cluster.broker_count
                )),
            ));
        }
        state.topics.insert(
            topic.name.clone(),
            TopicDescription {
                name: topic.name.clone(),
                partitions: topic.partitions,
                replication_factor: topic.replication_factor,
                internal: false,
            },
        );
        Ok(())
    }

    async fn create_partitions(&self, name: &str, total_count: i32) -> AdminResult<()> {
        self.enter(AdminCall::CreatePartitions(name.to_string(), total_count)).await?;
        let mut state = self.cluster.state.lock().await;
        let topic = state
            .topics
            .get_mut(name)
            .ok_or_else(|| AdminError::broker(codes::UNKNOWN_TOPIC_OR_PARTITION, None))?;
        if total_count <= topic.partitions {
            return Err(AdminError::broker(
                codes::INVALID_PARTITIONS,
                Some(&format!("Topic already has {} partitions.", topic.partitions)),
            ));
        }
        topic.partitions = total_count;
        Ok(())
    }

    async fn delete_topic(&self, name: &str) -> AdminResult<()> {
        self.enter(AdminCall::DeleteTopic(name.to_string())).await?;
        match self.cluster.state.lock().await.topics.remove(name) {
            Some(_) => Ok(()),
            None => Err(AdminError::broker(codes::UNKNOWN_TOPIC_OR_PARTITION, None)),
        }
    }

    async fn describe_acls(&self, filter: &AclBindingFilter) -> AdminResult<Vec<AclBindingSpec>> {
        self.enter(AdminCall::DescribeAcls).await?;
        let state = self.cluster.state.lock().await;
        Ok(state.acls.iter().filter(|b| filter.matches(b)).cloned().collect())
    }

    async fn create_acls(&self, bindings: &[AclBindingSpec]) -> AdminResult<()> {
        self.enter(AdminCall::CreateAcls(bindings.len())).await?;
        self.cluster.state.lock().await.acls.extend(bindings.iter().cloned());
        Ok(())
    }

    async fn delete_acls(&self, filters: &[AclBindingFilter]) -> AdminResult<Vec<AclBindingSpec>> {
        self.enter(AdminCall::DeleteAcls(filters.len())).await?;
        let mut state = self.cluster.state.lock().await;
        let (removed, kept): (BTreeSet<_>, BTreeSet<_>) = std::mem::take(&mut state.acls)
            .into_iter()
            .partition(|b| filters.iter().any(|f| f.matches(b)));
        state.acls = kept;
        Ok(removed.into_iter().collect())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.cluster.state.lock().await.calls.push(AdminCall::Close);
            self.cluster.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Hands out [`InMemoryAdmin`] clients and counts them.
#[derive(Debug)]
pub struct MockAdminFactory {
    cluster: Arc<InMemoryCluster>,
    created: AtomicUsize,
    fail_create: AtomicBool,
    protocols: Mutex<Vec<SecurityProtocol>>,
}

impl MockAdminFactory {
    pub fn new(cluster: Arc<InMemoryCluster>) -> Self {
        Self {
            cluster,
            created: AtomicUsize::new(0),
            fail_create: AtomicBool::new(false),
            protocols: Mutex::new(Vec::new()),
        }
    }

    pub fn cluster(&self) -> &Arc<InMemoryCluster> {
        &self.cluster
    }

    /// Handles created so far.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Reject creation as a broken profile would.
    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Protocols of the profiles seen, in order.
    pub async fn protocols(&self) -> Vec<SecurityProtocol> {
        self.protocols.lock().await.clone()
    }
}

#[async_trait]
impl AdminClientFactory for MockAdminFactory {
    async fn create(&self, _bootstrap: &[String], profile: &SecurityProfile) -> AdminResult<AdminHandle> {
        self.protocols.lock().await.push(profile.protocol());
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(AdminError::Config("injected profile failure".to_string()));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.cluster.client()))
    }
}
