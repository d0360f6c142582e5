//! MACI-style role separation: Executive / Legislative / Judicial,
//! each confined to a fixed action whitelist, with an anti-self-
//! validation invariant enforced independently of the whitelist.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::message::MessageType;

/// The three governance roles. No other role name is recognized; an
/// unrecognized `role` string on a message's security context is
/// treated as a violation, never defaulted to a permissive role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Executive,
    Legislative,
    Judicial,
}

impl Role {
    pub fn parse(s: &str) -> Option<Role> {
        match s.to_ascii_uppercase().as_str() {
            "EXECUTIVE" => Some(Role::Executive),
            "LEGISLATIVE" => Some(Role::Legislative),
            "JUDICIAL" => Some(Role::Judicial),
            _ => None,
        }
    }
}

/// The action a message is attempting to perform, derived from its
/// `MessageType` via [`default_action_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Propose,
    Synthesize,
    Query,
    ExtractRules,
    Validate,
    Audit,
}

/// Maps each role to the actions it may perform. Fixed and total: a
/// role not present in the table may perform no actions.
fn role_whitelist(role: Role) -> &'static [Action] {
    match role {
        Role::Executive => &[Action::Propose, Action::Synthesize, Action::Query],
        Role::Legislative => &[Action::ExtractRules, Action::Synthesize, Action::Query],
        Role::Judicial => &[Action::Validate, Action::Query, Action::Audit],
    }
}

/// Actions that, if performed by the same role that originated the
/// proposal under review, violate separation of powers regardless of
/// whether the whitelist would otherwise allow it.
const SELF_VALIDATION_GUARDED: &[Action] = &[Action::Validate];

/// The `spec.md` §9 Open Question 1 resolution: a fixed table from
/// message type to the action it represents. Override via
/// [`RoleEnforcer::with_action_table`] for a host that needs different
/// semantics; the processor never hardcodes this mapping itself.
pub fn default_action_table() -> HashMap<MessageType, Action> {
    use Action::*;
    use MessageType::*;
    HashMap::from([
        (GovernanceRequest, Propose),
        (ConstitutionalValidation, Validate),
        (TaskRequest, Synthesize),
        (TaskResponse, Synthesize),
        (GovernanceResponse, Validate),
        (Query, Query),
        (Command, Propose),
        (Response, Query),
        (Event, Query),
        (Notification, Query),
        (Heartbeat, Query),
    ])
}

/// Enforcement mode. `Strict` rejects unrecognized roles/types;
/// `Permissive` allows them through with a recorded warning, for
/// migration periods where not every agent has been role-tagged yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnforcementMode {
    Strict,
    Permissive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleCheckOutcome {
    Allowed,
    Denied { reason: String },
    AllowedWithWarning { warning: String },
}

impl RoleCheckOutcome {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, RoleCheckOutcome::Denied { .. })
    }
}

/// Checks whether a role may perform the action derived from a
/// message type, applying the anti-self-validation invariant first.
pub struct RoleEnforcer {
    mode: EnforcementMode,
    action_table: HashMap<MessageType, Action>,
}

impl RoleEnforcer {
    pub fn new(mode: EnforcementMode) -> Self {
        Self {
            mode,
            action_table: default_action_table(),
        }
    }

    pub fn with_action_table(mut self, table: HashMap<MessageType, Action>) -> Self {
        self.action_table = table;
        self
    }

    /// `originator_role` is the role that proposed the item under
    /// review, if this check concerns validating someone else's
    /// proposal (e.g. a `CONSTITUTIONAL_VALIDATION` message). `None`
    /// when there is no prior proposer to compare against.
    pub fn check(
        &self,
        role: Role,
        message_type: MessageType,
        originator_role: Option<Role>,
    ) -> RoleCheckOutcome {
        let Some(&action) = self.action_table.get(&message_type) else {
            return match self.mode {
                EnforcementMode::Strict => RoleCheckOutcome::Denied {
                    reason: format!("no action mapping for message type {message_type:?}"),
                },
                EnforcementMode::Permissive => RoleCheckOutcome::AllowedWithWarning {
                    warning: format!("no action mapping for message type {message_type:?}, allowing"),
                },
            };
        };

        if SELF_VALIDATION_GUARDED.contains(&action) {
            if let Some(originator) = originator_role {
                if originator == role {
                    return RoleCheckOutcome::Denied {
                        reason: format!("role {role:?} may not validate its own proposal"),
                    };
                }
            }
        }

        if role_whitelist(role).contains(&action) {
            RoleCheckOutcome::Allowed
        } else {
            match self.mode {
                EnforcementMode::Strict => RoleCheckOutcome::Denied {
                    reason: format!("role {role:?} may not perform action {action:?}"),
                },
                EnforcementMode::Permissive => RoleCheckOutcome::AllowedWithWarning {
                    warning: format!("role {role:?} is not whitelisted for {action:?}, allowing"),
                },
            }
        }
    }
}

impl Default for RoleEnforcer {
    fn default() -> Self {
        Self::new(EnforcementMode::Strict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_role_may_both_propose_and_validate() {
        for role in [Role::Executive, Role::Legislative, Role::Judicial] {
            let whitelist = role_whitelist(role);
            assert!(
                !(whitelist.contains(&Action::Propose) && whitelist.contains(&Action::Validate)),
                "{role:?} may both propose and validate"
            );
        }
    }

    #[test]
    fn judicial_validates_executive_proposal() {
        let enforcer = RoleEnforcer::default();
        let outcome = enforcer.check(
            Role::Judicial,
            MessageType::ConstitutionalValidation,
            Some(Role::Executive),
        );
        assert!(outcome.is_allowed());
    }

    #[test]
    fn role_cannot_validate_its_own_proposal() {
        let enforcer = RoleEnforcer::default();
        let outcome = enforcer.check(
            Role::Judicial,
            MessageType::ConstitutionalValidation,
            Some(Role::Judicial),
        );
        assert!(!outcome.is_allowed());
    }

    #[test]
    fn legislative_may_not_propose() {
        let enforcer = RoleEnforcer::default();
        let outcome = enforcer.check(Role::Legislative, MessageType::GovernanceRequest, None);
        assert!(!outcome.is_allowed());
    }

    #[test]
    fn permissive_mode_allows_unmapped_type_with_warning() {
        let enforcer = RoleEnforcer::new(EnforcementMode::Permissive).with_action_table(HashMap::new());
        let outcome = enforcer.check(Role::Executive, MessageType::Query, None);
        assert!(matches!(outcome, RoleCheckOutcome::AllowedWithWarning { .. }));
    }

    #[test]
    fn strict_mode_denies_unmapped_type() {
        let enforcer = RoleEnforcer::new(EnforcementMode::Strict).with_action_table(HashMap::new());
        let outcome = enforcer.check(Role::Executive, MessageType::Query, None);
        assert!(matches!(outcome, RoleCheckOutcome::Denied { .. }));
    }

    #[test]
    fn role_parse_is_case_insensitive_and_rejects_unknown() {
        assert_eq!(Role::parse("executive"), Some(Role::Executive));
        assert_eq!(Role::parse("EXECUTIVE"), Some(Role::Executive));
        assert_eq!(Role::parse("dictator"), None);
    }
}
