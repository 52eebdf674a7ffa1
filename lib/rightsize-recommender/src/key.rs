use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a logical recommendation target.
///
/// Partial checkpoints collected over disjoint windows are grouped by key before they're merged.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityKey {
    /// A single container of a Kubernetes workload.
    Container {
        /// Cluster name.
        cluster: String,

        /// Namespace of the workload.
        namespace: String,

        /// Workload name.
        workload: String,

        /// Container name.
        container: String,
    },

    /// A Kubernetes workload, grouping its containers.
    Workload {
        /// Cluster name.
        cluster: String,

        /// Namespace of the workload.
        namespace: String,

        /// Workload name.
        workload: String,
    },

    /// An ECS service.
    EcsService {
        /// Cluster name.
        cluster: String,

        /// Service ARN.
        service_arn: String,
    },

    /// A virtual machine instance.
    Instance {
        /// Cloud account identifier.
        account: String,

        /// Instance identifier.
        instance_id: String,
    },
}

impl EntityKey {
    /// Returns the key that this entity is grouped under.
    ///
    /// Containers group under their workload. Every other kind of entity is its own group.
    pub fn group(&self) -> EntityKey {
        match self {
            Self::Container {
                cluster,
                namespace,
                workload,
                ..
            } => Self::Workload {
                cluster: cluster.clone(),
                namespace: namespace.clone(),
                workload: workload.clone(),
            },
            other => other.clone(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Container {
                cluster,
                namespace,
                workload,
                container,
            } => write!(f, "{}/{}/{}/{}", cluster, namespace, workload, container),
            Self::Workload {
                cluster,
                namespace,
                workload,
            } => write!(f, "{}/{}/{}", cluster, namespace, workload),
            Self::EcsService { cluster, service_arn } => write!(f, "{}/{}", cluster, service_arn),
            Self::Instance { account, instance_id } => write!(f, "{}/{}", account, instance_id),
        }
    }
}
