use std::collections::{BTreeSet, HashMap};

use super::domain::{ActorId, Operation, Role};

/// Decides whether an authenticated actor may act in a role for an operation.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, actor: &ActorId, role: Role, operation: Operation) -> bool;
}

/// Static actor-to-role grants, loaded from configuration or fixtures.
#[derive(Debug, Clone, Default)]
pub struct RoleDirectory {
    grants: HashMap<ActorId, BTreeSet<Role>>,
}

impl RoleDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_grant(mut self, actor: impl Into<String>, role: Role) -> Self {
        self.grant(ActorId::new(actor), role);
        self
    }

    pub fn grant(&mut self, actor: ActorId, role: Role) {
        self.grants.entry(actor).or_default().insert(role);
    }

    pub fn from_grants(grants: &[(String, Role)]) -> Self {
        let mut directory = Self::new();
        for (actor, role) in grants {
            directory.grant(ActorId::new(actor.clone()), *role);
        }
        directory
    }

    pub fn roles(&self, actor: &ActorId) -> Vec<Role> {
        self.grants
            .get(actor)
            .map(|roles| roles.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl Authorizer for RoleDirectory {
    fn authorize(&self, actor: &ActorId, role: Role, _operation: Operation) -> bool {
        self.grants
            .get(actor)
            .is_some_and(|roles| roles.contains(&role))
    }
}
