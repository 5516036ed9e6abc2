//! Leader-Info Resolver component (spec.md §2, §4.3): computes the
//! advertised endpoint tuple returned to clients told "not leader" or
//! "read-only".

use crate::message::LeaderInfo;
use crate::node_info::{Endpoint, MemberInfo, NodeInfo};

/// Resolves the endpoint tuple clients are redirected to.
pub struct LeaderInfoResolver;

impl LeaderInfoResolver {
    /// If `leader` is known, use its endpoints and advertised overrides;
    /// otherwise fall back to this node's own endpoints with no overrides.
    /// Empty advertised host uses the endpoint's host; zero advertised port
    /// uses the endpoint's port (spec.md §4.3).
    pub fn resolve(leader: Option<&MemberInfo>, self_info: &NodeInfo) -> LeaderInfo {
        match leader {
            Some(member) => {
                let is_tcp_secure = member.internal_secure_tcp_endpoint.is_some();
                let base_tcp = member
                    .internal_secure_tcp_endpoint
                    .as_ref()
                    .unwrap_or(&member.external_tcp_endpoint);
                let tcp = apply_override(
                    base_tcp,
                    member.advertised.host.as_deref(),
                    member.advertised.tcp_port,
                );
                let http = apply_override(
                    &member.http_endpoint,
                    member.advertised.host.as_deref(),
                    member.advertised.http_port,
                );
                LeaderInfo {
                    advertised_tcp_endpoint: Some(tcp),
                    is_tcp_secure,
                    advertised_http_endpoint: http,
                }
            }
            None => {
                let is_tcp_secure = self_info.secure_tcp_endpoint.is_some();
                let tcp = self_info
                    .secure_tcp_endpoint
                    .clone()
                    .unwrap_or_else(|| self_info.tcp_endpoint.clone());
                LeaderInfo {
                    advertised_tcp_endpoint: Some(tcp),
                    is_tcp_secure,
                    advertised_http_endpoint: self_info.http_endpoint.clone(),
                }
            }
        }
    }
}

fn apply_override(base: &Endpoint, host: Option<&str>, port: Option<u16>) -> Endpoint {
    let host = match host {
        Some(h) if !h.is_empty() => h.to_string(),
        _ => base.host.clone(),
    };
    let port = match port {
        Some(p) if p != 0 => p,
        _ => base.port,
    };
    Endpoint { host, port }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_info::AdvertisedInfo;
    use crate::role::Role;
    use uuid::Uuid;

    fn member(advertised: AdvertisedInfo) -> MemberInfo {
        MemberInfo {
            instance_id: Uuid::new_v4(),
            http_endpoint: Endpoint::new("10.0.0.1", 2113),
            internal_tcp_endpoint: Endpoint::new("10.0.0.1", 1112),
            internal_secure_tcp_endpoint: None,
            external_tcp_endpoint: Endpoint::new("10.0.0.1", 1113),
            external_secure_tcp_endpoint: None,
            advertised,
            is_alive: true,
            role: Role::Leader,
        }
    }

    #[test]
    fn empty_host_and_zero_port_fall_back_to_endpoint() {
        let m = member(AdvertisedInfo {
            host: Some(String::new()),
            tcp_port: Some(0),
            http_port: None,
        });
        let self_info = NodeInfo {
            instance_id: Uuid::new_v4(),
            http_endpoint: Endpoint::new("self", 2113),
            tcp_endpoint: Endpoint::new("self", 1112),
            secure_tcp_endpoint: None,
            is_read_only_replica: false,
        };
        let info = LeaderInfoResolver::resolve(Some(&m), &self_info);
        assert_eq!(info.advertised_tcp_endpoint.unwrap().host, "10.0.0.1");
    }

    #[test]
    fn override_applies_when_present() {
        let m = member(AdvertisedInfo {
            host: Some("public.example.com".into()),
            tcp_port: Some(9999),
            http_port: Some(8080),
        });
        let self_info = NodeInfo {
            instance_id: Uuid::new_v4(),
            http_endpoint: Endpoint::new("self", 2113),
            tcp_endpoint: Endpoint::new("self", 1112),
            secure_tcp_endpoint: None,
            is_read_only_replica: false,
        };
        let info = LeaderInfoResolver::resolve(Some(&m), &self_info);
        let tcp = info.advertised_tcp_endpoint.unwrap();
        assert_eq!(tcp.host, "public.example.com");
        assert_eq!(tcp.port, 9999);
        assert_eq!(info.advertised_http_endpoint.port, 8080);
    }

    #[test]
    fn no_leader_uses_self_endpoints() {
        let self_info = NodeInfo {
            instance_id: Uuid::new_v4(),
            http_endpoint: Endpoint::new("self", 2113),
            tcp_endpoint: Endpoint::new("self", 1112),
            secure_tcp_endpoint: None,
            is_read_only_replica: false,
        };
        let info = LeaderInfoResolver::resolve(None, &self_info);
        assert_eq!(info.advertised_tcp_endpoint.unwrap().host, "self");
        assert!(!info.is_tcp_secure);
    }
}
