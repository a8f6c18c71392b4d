// Cluster membership resolution
// Decides once at startup whether a node seeds its own cluster or joins a peer

use tracing::info;

use sebar_common::{Result, SebarError};

use crate::{
    config::NodeConfig,
    network::{ClusterClient, NetworkEndpoint},
};

/// What a node intends to do, derived from its configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MembershipPlan {
    /// `cluster` is empty or is this node's own address
    Seed,
    /// `cluster` names another node
    Join {
        cluster: String,
        user_id: String,
        secret: String,
    },
}

impl MembershipPlan {
    pub fn for_config(config: &NodeConfig) -> Self {
        if config.is_seed() {
            MembershipPlan::Seed
        } else {
            MembershipPlan::Join {
                cluster: config.cluster.clone(),
                user_id: config.cluster_user_id.clone(),
                secret: config.cluster_secret.clone(),
            }
        }
    }
}

/// Resolved membership of a started node
pub enum Membership {
    Seed,
    /// Holds the outbound connection to the cluster
    Joined(Box<dyn ClusterClient>),
}

impl Membership {
    pub fn is_joined(&self) -> bool {
        matches!(self, Membership::Joined(_))
    }
}

impl std::fmt::Debug for Membership {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Membership::Seed => f.write_str("Seed"),
            Membership::Joined(client) => f
                .debug_tuple("Joined")
                .field(&client.remote_address())
                .finish(),
        }
    }
}

/// Seed or join according to `config`.
///
/// A seed normalizes an empty `cluster` to its own address. A join connects
/// through `network` with the pre-parsed cluster credentials; a failed connect
/// is returned as `SebarError::Join` and is not retried.
pub async fn resolve(config: &mut NodeConfig, network: &dyn NetworkEndpoint) -> Result<Membership> {
    match MembershipPlan::for_config(config) {
        MembershipPlan::Seed => {
            if config.cluster.is_empty() {
                config.cluster = config.host_address();
            }
            info!(cluster = %config.cluster, "Node is the seed of cluster {}", config.cluster);
            Ok(Membership::Seed)
        }
        MembershipPlan::Join {
            cluster,
            user_id,
            secret,
        } => {
            let client = network
                .connect(&cluster, &secret, &user_id)
                .await
                .map_err(|source| SebarError::Join {
                    cluster: cluster.clone(),
                    source,
                })?;
            info!(cluster = %cluster, user = %user_id, "Successfully joined cluster {}", cluster);
            Ok(Membership::Joined(client))
        }
    }
}
