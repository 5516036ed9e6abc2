//! Role state: the controller's position in the cluster lifecycle plus the
//! mutable fields tied to it. See spec.md §3 for the data model this module
//! implements directly.

use crate::fatal::FatalReason;
use crate::ids::{Id, new_id};
use crate::node_info::MemberInfo;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use strum_macros::{Display, EnumIter};

/// The node's current position in the cluster lifecycle. Initial: `Initializing`.
/// Terminal: `Shutdown` (invariant 6: once reached, no further transitions occur).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Role {
    Initializing,
    DiscoverLeader,
    Unknown,
    PreReplica,
    CatchingUp,
    Clone,
    Follower,
    PreLeader,
    Leader,
    ResigningLeader,
    ShuttingDown,
    Shutdown,
    ReadOnlyLeaderless,
    PreReadOnlyReplica,
    ReadOnlyReplica,
}

/// Whether a role requires a known leader, forbids one, or is indifferent.
/// Backs invariants 2 and 3 of the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderRequirement {
    Required,
    Forbidden,
    Either,
}

impl Role {
    /// Invariants 2/3: which roles require, forbid, or don't constrain the
    /// presence of a known leader. `Leader` itself is handled separately by
    /// invariant 1 (leader must be self), and is reported `Required` here.
    pub fn leader_requirement(self) -> LeaderRequirement {
        use LeaderRequirement::*;
        match self {
            Role::PreReplica
            | Role::CatchingUp
            | Role::Clone
            | Role::Follower
            | Role::PreReadOnlyReplica
            | Role::ReadOnlyReplica
            | Role::PreLeader
            | Role::Leader => Required,
            Role::Unknown
            | Role::DiscoverLeader
            | Role::ReadOnlyLeaderless
            | Role::Initializing
            | Role::Shutdown => Forbidden,
            Role::ResigningLeader | Role::ShuttingDown => Either,
        }
    }

    /// Roles that stage behind a chaser-catch-up handshake before taking on
    /// the full role (§4.2: "If the role needs a chaser-catch-up phase").
    pub fn needs_chaser_catch_up(self) -> bool {
        matches!(
            self,
            Role::PreReplica | Role::PreReadOnlyReplica | Role::PreLeader
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Role::Shutdown)
    }
}

/// The mutable fields owned exclusively by the controller. See spec.md §3.
#[derive(Debug)]
pub struct ControllerState {
    pub role: Role,
    pub leader: Option<MemberInfo>,
    pub state_correlation_id: Id,
    pub leader_connection_correlation_id: Id,
    /// Empty (`None`) until the first successful subscribe.
    pub subscription_id: Option<Id>,
    pub service_inits_to_expect: i64,
    pub service_shutdowns_to_expect: i64,
    /// Decremented off the main queue by subsystem-init notifications, so it
    /// must be the one atomic field in this otherwise single-threaded state
    /// (spec.md §5, §9 design notes).
    pub subsystem_inits_to_expect: Arc<AtomicI64>,
    pub exit_process_on_shutdown: bool,
}

impl ControllerState {
    pub fn new(core_services: i64, subsystem_count: i64) -> Self {
        Self {
            role: Role::Initializing,
            leader: None,
            state_correlation_id: new_id(),
            leader_connection_correlation_id: new_id(),
            subscription_id: None,
            service_inits_to_expect: core_services,
            service_shutdowns_to_expect: 0,
            subsystem_inits_to_expect: Arc::new(AtomicI64::new(subsystem_count)),
            exit_process_on_shutdown: false,
        }
    }

    pub fn rotate_state_correlation_id(&mut self) -> Id {
        self.state_correlation_id = new_id();
        self.state_correlation_id
    }

    pub fn rotate_leader_connection_id(&mut self) -> Id {
        self.leader_connection_correlation_id = new_id();
        self.leader_connection_correlation_id
    }

    pub fn rotate_subscription_id(&mut self) -> Id {
        let id = new_id();
        self.subscription_id = Some(id);
        id
    }

    pub fn decrement_subsystem_inits(&self) -> i64 {
        self.subsystem_inits_to_expect.fetch_sub(1, Ordering::SeqCst) - 1
    }

    /// Assigns a new role after the caller has already satisfied its
    /// preconditions (leader set/cleared as appropriate). Re-checks the
    /// leader-presence invariants (2/3) and invariant 1 as a last line of
    /// defense; a violation here is a programmer error.
    pub fn assign_role(
        &mut self,
        role: Role,
        self_instance_id: Id,
    ) -> Result<(), FatalReason> {
        if role == Role::Leader {
            match &self.leader {
                Some(leader) if leader.instance_id == self_instance_id => {}
                _ => {
                    return Err(FatalReason::InvariantViolation(format!(
                        "role==Leader requires leader.instanceId == self, got {:?}",
                        self.leader.as_ref().map(|m| m.instance_id)
                    )));
                }
            }
        }
        match role.leader_requirement() {
            LeaderRequirement::Required if self.leader.is_none() => {
                return Err(FatalReason::InvariantViolation(format!(
                    "role {role} requires a known leader"
                )));
            }
            LeaderRequirement::Forbidden if self.leader.is_some() => {
                return Err(FatalReason::InvariantViolation(format!(
                    "role {role} must not have a known leader"
                )));
            }
            _ => {}
        }
        self.role = role;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn every_role_has_a_leader_requirement() {
        for role in Role::iter() {
            let _ = role.leader_requirement();
        }
    }

    #[test]
    fn assign_leader_requires_self_as_leader() {
        let mut state = ControllerState::new(3, 0);
        let self_id = new_id();
        let err = state.assign_role(Role::Leader, self_id);
        assert!(err.is_err());
    }
}
