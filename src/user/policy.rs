//! Per-operation access declaration.

use std::collections::HashMap;

/// Operations exposed by both transports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Login,
    Create,
    CreateMany,
    GetAll,
    GetByEmail,
    GetById,
    Update,
    Delete,
    GetUserClaims,
}

impl Operation {
    pub const ALL: [Operation; 9] = [
        Operation::Login,
        Operation::Create,
        Operation::CreateMany,
        Operation::GetAll,
        Operation::GetByEmail,
        Operation::GetById,
        Operation::Update,
        Operation::Delete,
        Operation::GetUserClaims,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Login => "Login",
            Operation::Create => "Create",
            Operation::CreateMany => "CreateMany",
            Operation::GetAll => "GetAll",
            Operation::GetByEmail => "GetByEmail",
            Operation::GetById => "GetById",
            Operation::Update => "Update",
            Operation::Delete => "Delete",
            Operation::GetUserClaims => "GetUserClaims",
        }
    }
}

/// What a caller must present to run an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
    /// Authenticated and holding every named claim.
    Claims(Vec<&'static str>),
}

impl Access {
    /// Claim names that must be granted by the token.
    pub fn required_claims(&self) -> &[&'static str] {
        match self {
            Access::Claims(claims) => claims,
            _ => &[],
        }
    }
}

/// Access declaration for every [`Operation`].
///
/// Operations that were never declared are treated as
/// [`Access::Authenticated`].
#[derive(Clone, Debug, Default)]
pub struct AccessPolicy {
    rules: HashMap<Operation, Access>,
}

impl AccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn public(mut self, operation: Operation) -> Self {
        self.rules.insert(operation, Access::Public);
        self
    }

    pub fn authenticated(mut self, operation: Operation) -> Self {
        self.rules.insert(operation, Access::Authenticated);
        self
    }

    pub fn require(mut self, operation: Operation, claims: &[&'static str]) -> Self {
        self.rules.insert(operation, Access::Claims(claims.to_vec()));
        self
    }

    pub fn access(&self, operation: Operation) -> &Access {
        self.rules.get(&operation).unwrap_or(&Access::Authenticated)
    }
}
