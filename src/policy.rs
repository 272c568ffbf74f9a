//! Authorization policy
//!
//! A pure decision over (actor, action). The actor is always passed in
//! explicitly by the caller; nothing here looks up a "current user".

use crate::{
    error::{AppError, AppResult},
    models::user::Role,
};

/// Who is performing an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Anonymous,
    Member { id: i32, role: Role },
}

impl Actor {
    pub fn member(id: i32, role: Role) -> Self {
        Actor::Member { id, role }
    }

    pub fn id(&self) -> Option<i32> {
        match self {
            Actor::Anonymous => None,
            Actor::Member { id, .. } => Some(*id),
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Actor::Member { role: Role::Admin, .. })
    }

    /// Authenticated user id, or 401 for anonymous callers
    pub fn require_id(&self) -> AppResult<i32> {
        self.id()
            .ok_or_else(|| AppError::Authentication("Authentication credentials were not provided".to_string()))
    }

    /// Evaluate the policy and turn a denial into an error
    pub fn require(&self, action: Action) -> AppResult<()> {
        match authorize(self, action) {
            Decision::Allow => Ok(()),
            Decision::Deny(Denial::Unauthenticated) => Err(AppError::Authentication(
                "Authentication credentials were not provided".to_string(),
            )),
            Decision::Deny(Denial::Forbidden(reason)) => Err(AppError::Authorization(reason.to_string())),
        }
    }
}

/// Operations gated by the policy; resource owners are carried in the variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ReadCatalog,
    MutateCatalog,
    /// Open a loan whose borrower will be `borrower`
    Borrow { borrower: i32 },
    ReadLoan { owner: i32 },
    ReturnLoan { owner: i32 },
    ListOwnLoans,
    ListAllLoans,
    ViewOverdueLoans,
    ManageOwnProfile,
    ListUsers,
    ManageUser,
    DeactivateUser { target: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    Unauthenticated,
    Forbidden(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(Denial),
}

fn forbid(reason: &'static str) -> Decision {
    Decision::Deny(Denial::Forbidden(reason))
}

/// The role and ownership rules
pub fn authorize(actor: &Actor, action: Action) -> Decision {
    let (id, role) = match actor {
        Actor::Anonymous => {
            return match action {
                Action::ReadCatalog => Decision::Allow,
                _ => Decision::Deny(Denial::Unauthenticated),
            };
        }
        Actor::Member { id, role } => (*id, *role),
    };

    // Applies to every role, including administrators
    if let Action::DeactivateUser { target } = action {
        if target == id {
            return forbid("You cannot delete your own account.");
        }
    }

    let admin = role == Role::Admin;

    match action {
        Action::ReadCatalog | Action::ListOwnLoans | Action::ManageOwnProfile => Decision::Allow,
        Action::Borrow { borrower } if borrower == id => Decision::Allow,
        Action::Borrow { .. } => forbid("Loans can only be opened for yourself."),
        Action::ReadLoan { owner } | Action::ReturnLoan { owner } if owner == id || admin => Decision::Allow,
        Action::ReadLoan { .. } => forbid("You do not have permission to view this loan."),
        Action::ReturnLoan { .. } => forbid("You do not have permission to return this loan."),
        _ if admin => Decision::Allow,
        Action::MutateCatalog => forbid("Only administrators can modify the catalog."),
        _ => forbid("Administrator privileges required."),
    }
}
