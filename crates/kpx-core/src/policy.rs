//! Authorization policy for grid operations.
//!
//! Every permission decision in Kutplix goes through [`authorize`], keyed by
//! the caller's role, whether the caller belongs to the grid's company, and
//! the operation requested.
//!
//! | Operation                  | admin | designer | client        |
//! |----------------------------|-------|----------|---------------|
//! | view / comment             | any   | any      | own company   |
//! | create grid / edit items   | yes   | yes      | no            |
//! | send                       | yes   | yes      | no            |
//! | approve / request changes  | yes   | no       | own company   |
//! | delete grid                | yes   | no       | no            |

use std::fmt;

use thiserror::Error;

use crate::enums::{GridAction, Role};
use crate::identity::Actor;

/// An operation on a grid or its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    View,
    Comment,
    CreateGrid,
    EditItems,
    Transition(GridAction),
    DeleteGrid,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::View => f.write_str("view"),
            Self::Comment => f.write_str("comment"),
            Self::CreateGrid => f.write_str("create grid"),
            Self::EditItems => f.write_str("edit items"),
            Self::Transition(action) => write!(f, "{action}"),
            Self::DeleteGrid => f.write_str("delete grid"),
        }
    }
}

/// Why an operation was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Denied {
    #[error("user account is inactive")]
    Inactive,

    #[error("grid belongs to another company")]
    OtherCompany,

    #[error("role '{role}' may not {operation}")]
    RoleNotAllowed { role: Role, operation: Operation },
}

/// Decide whether `actor` may perform `operation` on a grid owned by
/// `company_id`.
///
/// Ownership is checked before role, so a client of another company is
/// told the grid is not theirs rather than which actions clients may take.
///
/// # Errors
///
/// Returns the reason the operation is denied.
pub fn authorize(actor: &Actor, company_id: &str, operation: Operation) -> Result<(), Denied> {
    if !actor.is_active {
        return Err(Denied::Inactive);
    }
    if actor.role == Role::Client && !actor.belongs_to(company_id) {
        return Err(Denied::OtherCompany);
    }

    let allowed = match (actor.role, operation) {
        (_, Operation::View | Operation::Comment) => true,
        (Role::Admin, _) => true,
        (
            Role::Designer,
            Operation::CreateGrid | Operation::EditItems | Operation::Transition(GridAction::Send),
        ) => true,
        (
            Role::Client,
            Operation::Transition(GridAction::Approve | GridAction::RequestChanges),
        ) => true,
        _ => false,
    };

    if allowed {
        Ok(())
    } else {
        Err(Denied::RoleNotAllowed {
            role: actor.role,
            operation,
        })
    }
}
