// src/core/provider/ec2.rs

//! The EC2 implementation of the compute provider surface.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ec2::Client;
use aws_sdk_ec2::config::Region;
use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_ec2::types::{
    Filter, Instance, InstanceStateName, InstanceType, IpPermission, IpRange, Placement,
    ShutdownBehavior, Tag, Tenancy, UserIdGroupPair,
};
use tracing::{debug, info};

use super::{
    ComputeProvider, LaunchRequest, NodeHandle, NodeState, RuleSource, SecurityGroupRule,
    client_ingress_rules, discover_client_cidr, intra_cluster_rules,
};
use crate::core::cluster::{GROUP_PREFIX, cluster_group_name};
use crate::core::errors::FlintrockError;

/// Error code EC2 returns when an ingress rule already exists. Authorizing
/// an existing rule is a no-op for us, so this specific failure is swallowed.
const DUPLICATE_RULE_CODE: &str = "InvalidPermission.Duplicate";

pub struct Ec2Provider {
    client: Client,
}

impl Ec2Provider {
    pub async fn new(region: &str) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        Self {
            client: Client::new(&sdk_config),
        }
    }

    async fn find_group_id(&self, group_name: &str) -> Result<Option<String>, FlintrockError> {
        let output = self
            .client
            .describe_security_groups()
            .filters(
                Filter::builder()
                    .name("group-name")
                    .values(group_name)
                    .build(),
            )
            .send()
            .await
            .map_err(provider_error)?;
        Ok(output
            .security_groups()
            .iter()
            .find(|sg| sg.group_name() == Some(group_name))
            .and_then(|sg| sg.group_id())
            .map(str::to_string))
    }

    async fn create_group(
        &self,
        group_name: &str,
        description: &str,
        vpc_id: Option<&str>,
    ) -> Result<String, FlintrockError> {
        info!("Creating security group {group_name}...");
        let output = self
            .client
            .create_security_group()
            .group_name(group_name)
            .description(description)
            .set_vpc_id(vpc_id.map(str::to_string))
            .send()
            .await
            .map_err(provider_error)?;
        output
            .group_id()
            .map(str::to_string)
            .ok_or_else(|| FlintrockError::Provider(format!("no id returned for {group_name}")))
    }

    async fn authorize_rules(
        &self,
        group_id: &str,
        rules: &[SecurityGroupRule],
    ) -> Result<(), FlintrockError> {
        for rule in rules {
            let mut permission = IpPermission::builder()
                .ip_protocol(rule.protocol.to_string())
                .from_port(rule.from_port)
                .to_port(rule.to_port);
            permission = match &rule.source {
                RuleSource::Cidr(cidr) => {
                    permission.ip_ranges(IpRange::builder().cidr_ip(cidr).build())
                }
                RuleSource::Group(source_group_id) => permission.user_id_group_pairs(
                    UserIdGroupPair::builder().group_id(source_group_id).build(),
                ),
            };

            let result = self
                .client
                .authorize_security_group_ingress()
                .group_id(group_id)
                .ip_permissions(permission.build())
                .send()
                .await;

            if let Err(e) = result {
                if e.as_service_error().and_then(|se| se.code()) == Some(DUPLICATE_RULE_CODE) {
                    debug!("Rule already authorized on {group_id}; skipping.");
                    continue;
                }
                return Err(provider_error(e));
            }
        }
        Ok(())
    }

    async fn describe_by_filter(
        &self,
        name: &str,
        value: &str,
    ) -> Result<Vec<NodeHandle>, FlintrockError> {
        let output = self
            .client
            .describe_instances()
            .filters(Filter::builder().name(name).values(value).build())
            .send()
            .await
            .map_err(provider_error)?;
        Ok(output
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .map(node_from_instance)
            .collect())
    }
}

#[async_trait]
impl ComputeProvider for Ec2Provider {
    async fn ensure_security_groups(
        &self,
        cluster_name: &str,
        vpc_id: Option<&str>,
    ) -> Result<Vec<String>, FlintrockError> {
        let base_name = GROUP_PREFIX;
        let cluster_name_full = cluster_group_name(cluster_name);

        let base_id = match self.find_group_id(base_name).await? {
            Some(id) => id,
            None => self.create_group(base_name, "flintrock base group", vpc_id).await?,
        };
        let cluster_id = match self.find_group_id(&cluster_name_full).await? {
            Some(id) => id,
            None => {
                self.create_group(&cluster_name_full, "Flintrock cluster group", vpc_id)
                    .await?
            }
        };

        let client_cidr = discover_client_cidr().await?;
        self.authorize_rules(&base_id, &client_ingress_rules(&client_cidr))
            .await?;
        self.authorize_rules(&cluster_id, &intra_cluster_rules(&cluster_id))
            .await?;

        Ok(vec![base_id, cluster_id])
    }

    async fn launch_nodes(
        &self,
        request: &LaunchRequest,
    ) -> Result<Vec<NodeHandle>, FlintrockError> {
        let placement = Placement::builder()
            .set_availability_zone(request.availability_zone.clone())
            .set_group_name(request.placement_group.clone())
            .tenancy(Tenancy::from(request.tenancy.as_str()))
            .build();

        let output = self
            .client
            .run_instances()
            .image_id(&request.image)
            .min_count(request.count as i32)
            .max_count(request.count as i32)
            .instance_type(InstanceType::from(request.instance_type.as_str()))
            .set_key_name(request.key_name.clone())
            .set_subnet_id(request.subnet_id.clone())
            .set_security_group_ids(Some(request.security_group_ids.clone()))
            .placement(placement)
            .ebs_optimized(request.ebs_optimized)
            .instance_initiated_shutdown_behavior(ShutdownBehavior::from(
                request.shutdown_behavior.as_str(),
            ))
            .send()
            .await
            .map_err(provider_error)?;

        Ok(output.instances().iter().map(node_from_instance).collect())
    }

    async fn tag_nodes(
        &self,
        node_ids: &[String],
        tags: &[(String, String)],
    ) -> Result<(), FlintrockError> {
        let mut request = self
            .client
            .create_tags()
            .set_resources(Some(node_ids.to_vec()));
        for (key, value) in tags {
            request = request.tags(Tag::builder().key(key).value(value).build());
        }
        request.send().await.map_err(provider_error)?;
        Ok(())
    }

    async fn list_cluster(&self, cluster_name: &str) -> Result<Vec<NodeHandle>, FlintrockError> {
        self.describe_by_filter("instance.group-name", &cluster_group_name(cluster_name))
            .await
    }

    async fn list_all_clusters(&self) -> Result<Vec<NodeHandle>, FlintrockError> {
        self.describe_by_filter("instance.group-name", &format!("{GROUP_PREFIX}-*"))
            .await
    }

    async fn start_nodes(&self, node_ids: &[String]) -> Result<(), FlintrockError> {
        self.client
            .start_instances()
            .set_instance_ids(Some(node_ids.to_vec()))
            .send()
            .await
            .map_err(provider_error)?;
        Ok(())
    }

    async fn stop_nodes(&self, node_ids: &[String]) -> Result<(), FlintrockError> {
        self.client
            .stop_instances()
            .set_instance_ids(Some(node_ids.to_vec()))
            .send()
            .await
            .map_err(provider_error)?;
        Ok(())
    }

    async fn terminate_nodes(&self, node_ids: &[String]) -> Result<(), FlintrockError> {
        self.client
            .terminate_instances()
            .set_instance_ids(Some(node_ids.to_vec()))
            .send()
            .await
            .map_err(provider_error)?;
        Ok(())
    }

    async fn refresh(&self, node: &NodeHandle) -> Result<NodeHandle, FlintrockError> {
        let output = self
            .client
            .describe_instances()
            .instance_ids(&node.id)
            .send()
            .await
            .map_err(provider_error)?;
        let refreshed = output
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .find(|i| i.instance_id() == Some(node.id.as_str()))
            .map(node_from_instance);
        // A node the API no longer reports has been reaped post-termination.
        Ok(refreshed.unwrap_or_else(|| NodeHandle {
            state: NodeState::Terminated,
            ..node.clone()
        }))
    }
}

fn node_from_instance(instance: &Instance) -> NodeHandle {
    NodeHandle {
        id: instance.instance_id().unwrap_or_default().to_string(),
        state: instance
            .state()
            .and_then(|s| s.name())
            .map(node_state)
            .unwrap_or(NodeState::Pending),
        public_hostname: instance.public_dns_name().unwrap_or_default().to_string(),
        address: instance.public_ip_address().unwrap_or_default().to_string(),
        tags: instance
            .tags()
            .iter()
            .filter_map(|t| Some((t.key()?.to_string(), t.value()?.to_string())))
            .collect(),
        security_groups: instance
            .security_groups()
            .iter()
            .filter_map(|g| g.group_name().map(str::to_string))
            .collect(),
    }
}

fn node_state(name: &InstanceStateName) -> NodeState {
    match name {
        InstanceStateName::Pending => NodeState::Pending,
        InstanceStateName::Running => NodeState::Running,
        InstanceStateName::ShuttingDown | InstanceStateName::Stopping => NodeState::Stopping,
        InstanceStateName::Stopped => NodeState::Stopped,
        InstanceStateName::Terminated => NodeState::Terminated,
        _ => NodeState::Pending,
    }
}

fn provider_error<E: std::error::Error>(e: E) -> FlintrockError {
    FlintrockError::Provider(DisplayErrorContext(e).to_string())
}
