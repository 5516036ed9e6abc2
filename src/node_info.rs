//! Static node identity and the peer descriptors carried by gossip.

use crate::ids::Id;
use crate::role::Role;
use serde::{Deserialize, Serialize};

/// A host/port pair. Used for both internal and external, plain and secure
/// endpoints throughout the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// An optional host/port override advertised to clients in place of the
/// endpoint actually bound to. Empty host or zero port mean "no override for
/// this field" per spec.md §4.3.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertisedInfo {
    pub host: Option<String>,
    pub tcp_port: Option<u16>,
    pub http_port: Option<u16>,
}

/// Immutable facts about this node, set once at construction and never
/// mutated by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub instance_id: Id,
    pub http_endpoint: Endpoint,
    pub tcp_endpoint: Endpoint,
    pub secure_tcp_endpoint: Option<Endpoint>,
    pub is_read_only_replica: bool,
}

/// A peer descriptor as received from gossip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub instance_id: Id,
    pub http_endpoint: Endpoint,
    pub internal_tcp_endpoint: Endpoint,
    pub internal_secure_tcp_endpoint: Option<Endpoint>,
    pub external_tcp_endpoint: Endpoint,
    pub external_secure_tcp_endpoint: Option<Endpoint>,
    pub advertised: AdvertisedInfo,
    pub is_alive: bool,
    pub role: Role,
}

impl MemberInfo {
    pub fn is_alive_leader(&self) -> bool {
        self.is_alive && self.role == Role::Leader
    }
}
