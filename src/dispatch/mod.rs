//! Transition Dispatcher (spec.md §4.1): table-driven routing of
//! `(role, message-kind)` to a handler or a forward/ignore/deny action.

pub mod table;

use crate::fatal::FatalReason;
use crate::message::MessageKind;
use crate::role::Role;
use std::collections::HashMap;

/// What the dispatcher decided to do with a `(role, messageKind)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Route to the matching role handler in `crate::handlers`.
    Handle,
    /// Publish the message to the output bus unchanged.
    Forward,
    /// Drop the message; no handler, no output.
    Ignore,
    /// Deny client requests with the given reason (admission only).
    Deny(&'static str),
    /// Deliberately fatal: a combination that must never legitimately occur.
    Fatal,
}

/// The scope a rule was declared at, used to resolve precedence
/// (spec.md §4.1: specific role > role set > "all roles except"/"any role").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Scope {
    /// "all roles except ..." / "any role" fallbacks.
    AnyRole = 0,
    /// Rules declared for a set of roles.
    RoleSet = 1,
    /// Rules declared for the specific current role.
    Specific = 2,
}

#[derive(Debug, Clone)]
struct Rule {
    action: Action,
    scope: Scope,
    /// Insertion order, used to break ties within the same scope ("the
    /// per-message-kind rule declared last wins").
    seq: u32,
}

/// The resolved table, keyed by `(role, kind)`; also tracks the scope of
/// each entry so coverage checks can tell a deliberate rule from the
/// hardcoded structural fallback.
#[derive(Debug)]
pub struct Dispatcher {
    rules: HashMap<(Role, MessageKind), Rule>,
    when_other: HashMap<Role, Action>,
    default_when_other: Action,
    seq: u32,
}

/// Whether a `(role, kind)` pair was resolved from a declared rule (specific
/// or role-set scope) or fell through to the any-role/default fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Explicit,
    Fallback,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder {
            dispatcher: Dispatcher {
                rules: HashMap::new(),
                when_other: HashMap::new(),
                default_when_other: Action::Forward,
                seq: 0,
            },
        }
    }

    /// Resolves the action for a `(role, kind)` pair, per the precedence in
    /// spec.md §4.1. Unclaimed kinds fall through to the scope's
    /// `WhenOther` action (default: forward to output bus); an unclaimed
    /// `StateChange`-kind message is fatal instead (spec.md §4.1 "Fatal
    /// condition").
    pub fn resolve(&self, role: Role, kind: MessageKind) -> (Action, Provenance) {
        if let Some(rule) = self.rules.get(&(role, kind)) {
            // A rule declared at `AnyRole` scope is still a real,
            // deliberately-authored rule, but coverage checks care whether
            // a role was *specifically* considered, so only `RoleSet` and
            // `Specific` scopes count as explicit for that purpose.
            let provenance = if rule.scope == Scope::AnyRole {
                Provenance::Fallback
            } else {
                Provenance::Explicit
            };
            return (rule.action.clone(), provenance);
        }
        let fallback = self
            .when_other
            .get(&role)
            .cloned()
            .unwrap_or_else(|| self.default_when_other.clone());
        if kind.is_state_change() {
            (Action::Fatal, Provenance::Fallback)
        } else {
            (fallback, Provenance::Fallback)
        }
    }

    /// Resolves and turns `Action::Fatal` into a `Result`, for callers that
    /// just want to route and handle the fatal path uniformly.
    pub fn resolve_or_fatal(
        &self,
        role: Role,
        kind: MessageKind,
    ) -> Result<Action, FatalReason> {
        match self.resolve(role, kind) {
            (Action::Fatal, _) => Err(FatalReason::UnhandledStateChange {
                role: role.to_string(),
                kind: kind.to_string(),
            }),
            (action, _) => Ok(action),
        }
    }
}

/// Builds a [`Dispatcher`] by layering rules from widest to narrowest scope.
/// Methods can be called in any order; precedence is resolved by `scope`,
/// not call order, except that within the same scope the later call wins.
pub struct DispatcherBuilder {
    dispatcher: Dispatcher,
}

impl DispatcherBuilder {
    /// Declares the fallback action used within a role scope when no rule
    /// claims the message kind. Applies to `for_role`/`for_roles` calls for
    /// that role made afterward; does not affect the default-of-defaults.
    pub fn when_other(mut self, role: Role, action: Action) -> Self {
        self.dispatcher.when_other.insert(role, action);
        self
    }

    pub fn default_when_other(mut self, action: Action) -> Self {
        self.dispatcher.default_when_other = action;
        self
    }

    /// Declares a rule scoped to a single specific role (highest precedence).
    pub fn for_role(mut self, role: Role, kind: MessageKind, action: Action) -> Self {
        let seq = self.next_seq();
        self.insert(role, kind, action, Scope::Specific, seq);
        self
    }

    /// Declares a rule scoped to a set of roles (middle precedence).
    pub fn for_roles(mut self, roles: &[Role], kind: MessageKind, action: Action) -> Self {
        let seq = self.next_seq();
        for &role in roles {
            self.insert(role, kind, action.clone(), Scope::RoleSet, seq);
        }
        self
    }

    /// Declares a rule for every role except the given exclusions (lowest
    /// non-default precedence, "any role"/"all roles except" family).
    pub fn for_all_except(mut self, except: &[Role], kind: MessageKind, action: Action) -> Self {
        use strum::IntoEnumIterator;
        let seq = self.next_seq();
        for role in Role::iter() {
            if !except.contains(&role) {
                self.insert(role, kind, action.clone(), Scope::AnyRole, seq);
            }
        }
        self
    }

    pub fn for_any_role(self, kind: MessageKind, action: Action) -> Self {
        self.for_all_except(&[], kind, action)
    }

    fn next_seq(&mut self) -> u32 {
        self.dispatcher.seq += 1;
        self.dispatcher.seq
    }

    fn insert(&mut self, role: Role, kind: MessageKind, action: Action, scope: Scope, seq: u32) {
        let entry = self.dispatcher.rules.entry((role, kind));
        let candidate = Rule { action, scope, seq };
        match entry {
            std::collections::hash_map::Entry::Vacant(v) => {
                v.insert(candidate);
            }
            std::collections::hash_map::Entry::Occupied(mut o) => {
                let existing = o.get();
                let wins = (candidate.scope, candidate.seq) >= (existing.scope, existing.seq);
                if wins {
                    o.insert(candidate);
                }
            }
        }
    }

    pub fn build(self) -> Dispatcher {
        self.dispatcher
    }
}
