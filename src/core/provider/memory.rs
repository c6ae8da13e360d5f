// src/core/provider/memory.rs

//! An in-memory compute provider that simulates VM lifecycle transitions.
//! Backs the orchestrator test suite; also usable as a dry-run substrate.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    ComputeProvider, LaunchRequest, NodeHandle, NodeState, SecurityGroupRule,
    client_ingress_rules, intra_cluster_rules,
};
use crate::core::cluster::{GROUP_PREFIX, cluster_group_name};
use crate::core::errors::FlintrockError;

#[derive(Debug, Clone)]
struct MemoryGroup {
    id: String,
    rules: HashSet<SecurityGroupRule>,
}

#[derive(Debug, Clone)]
struct MemoryNode {
    handle: NodeHandle,
    /// State the node is transitioning toward. Each `refresh` advances the
    /// observable state one step, which is what exercises the orchestrator's
    /// poll loops.
    target: NodeState,
}

#[derive(Default)]
struct MemoryState {
    nodes: Vec<MemoryNode>,
    /// Group name -> group record.
    groups: HashMap<String, MemoryGroup>,
    next_id: u32,
}

pub struct MemoryProvider {
    state: Mutex<MemoryState>,
    client_cidr: String,
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new("198.51.100.7/32")
    }
}

impl MemoryProvider {
    pub fn new(client_cidr: &str) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            client_cidr: client_cidr.to_string(),
        }
    }

    /// The rules currently authorized on the named group, for assertions.
    pub fn group_rules(&self, group_name: &str) -> Option<HashSet<SecurityGroupRule>> {
        self.state
            .lock()
            .groups
            .get(group_name)
            .map(|g| g.rules.clone())
    }

    pub fn group_names(&self) -> Vec<String> {
        self.state.lock().groups.keys().cloned().collect()
    }

    fn advance(node: &mut MemoryNode) {
        node.handle.state = match (node.handle.state, node.target) {
            (NodeState::Pending, _) => NodeState::Running,
            (NodeState::Stopping, target) => target,
            (current, _) => current,
        };
    }
}

#[async_trait]
impl ComputeProvider for MemoryProvider {
    async fn ensure_security_groups(
        &self,
        cluster_name: &str,
        _vpc_id: Option<&str>,
    ) -> Result<Vec<String>, FlintrockError> {
        let cluster_group = cluster_group_name(cluster_name);
        let mut state = self.state.lock();

        let mut group_id = |state: &mut MemoryState, name: &str| {
            if !state.groups.contains_key(name) {
                state.next_id += 1;
                let group = MemoryGroup {
                    id: format!("sg-mem-{}", state.next_id),
                    rules: HashSet::new(),
                };
                state.groups.insert(name.to_string(), group);
            }
            state.groups[name].id.clone()
        };

        let base_id = group_id(&mut state, GROUP_PREFIX);
        let cluster_id = group_id(&mut state, &cluster_group);

        if let Some(group) = state.groups.get_mut(GROUP_PREFIX) {
            group.rules.extend(client_ingress_rules(&self.client_cidr));
        }
        if let Some(group) = state.groups.get_mut(&cluster_group) {
            group.rules.extend(intra_cluster_rules(&cluster_id));
        }

        Ok(vec![base_id, cluster_id])
    }

    async fn launch_nodes(
        &self,
        request: &LaunchRequest,
    ) -> Result<Vec<NodeHandle>, FlintrockError> {
        let mut state = self.state.lock();
        let group_names: Vec<String> = state
            .groups
            .iter()
            .filter(|(_, g)| request.security_group_ids.contains(&g.id))
            .map(|(name, _)| name.clone())
            .collect();

        let mut launched = Vec::with_capacity(request.count as usize);
        for _ in 0..request.count {
            state.next_id += 1;
            let n = state.next_id;
            let handle = NodeHandle {
                id: format!("i-mem-{n}"),
                state: NodeState::Pending,
                public_hostname: format!("node-{n}.memory.invalid"),
                address: format!("192.0.2.{}", n % 250 + 1),
                tags: HashMap::new(),
                security_groups: group_names.clone(),
            };
            state.nodes.push(MemoryNode {
                handle: handle.clone(),
                target: NodeState::Running,
            });
            launched.push(handle);
        }
        Ok(launched)
    }

    async fn tag_nodes(
        &self,
        node_ids: &[String],
        tags: &[(String, String)],
    ) -> Result<(), FlintrockError> {
        let mut state = self.state.lock();
        for node in state.nodes.iter_mut() {
            if node_ids.contains(&node.handle.id) {
                for (key, value) in tags {
                    node.handle.tags.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(())
    }

    async fn list_cluster(&self, cluster_name: &str) -> Result<Vec<NodeHandle>, FlintrockError> {
        let group = cluster_group_name(cluster_name);
        Ok(self
            .state
            .lock()
            .nodes
            .iter()
            .filter(|n| n.handle.security_groups.contains(&group))
            .map(|n| n.handle.clone())
            .collect())
    }

    async fn list_all_clusters(&self) -> Result<Vec<NodeHandle>, FlintrockError> {
        let prefix = format!("{GROUP_PREFIX}-");
        Ok(self
            .state
            .lock()
            .nodes
            .iter()
            .filter(|n| {
                n.handle
                    .security_groups
                    .iter()
                    .any(|g| g.starts_with(&prefix))
            })
            .map(|n| n.handle.clone())
            .collect())
    }

    async fn start_nodes(&self, node_ids: &[String]) -> Result<(), FlintrockError> {
        let mut state = self.state.lock();
        for node in state.nodes.iter_mut() {
            if node_ids.contains(&node.handle.id) && node.handle.state == NodeState::Stopped {
                node.handle.state = NodeState::Pending;
                node.target = NodeState::Running;
            }
        }
        Ok(())
    }

    async fn stop_nodes(&self, node_ids: &[String]) -> Result<(), FlintrockError> {
        let mut state = self.state.lock();
        for node in state.nodes.iter_mut() {
            if node_ids.contains(&node.handle.id) && node.handle.state == NodeState::Running {
                node.handle.state = NodeState::Stopping;
                node.target = NodeState::Stopped;
            }
        }
        Ok(())
    }

    async fn terminate_nodes(&self, node_ids: &[String]) -> Result<(), FlintrockError> {
        let mut state = self.state.lock();
        for node in state.nodes.iter_mut() {
            if node_ids.contains(&node.handle.id) && node.handle.state != NodeState::Terminated {
                node.handle.state = NodeState::Stopping;
                node.target = NodeState::Terminated;
            }
        }
        Ok(())
    }

    async fn refresh(&self, node: &NodeHandle) -> Result<NodeHandle, FlintrockError> {
        let mut state = self.state.lock();
        let found = state
            .nodes
            .iter_mut()
            .find(|n| n.handle.id == node.id)
            .ok_or_else(|| FlintrockError::Provider(format!("no such node: {}", node.id)))?;
        Self::advance(found);
        Ok(found.handle.clone())
    }
}
