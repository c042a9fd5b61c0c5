use crate::domain::customer::CustomerId;
use crate::error::{Result, ShopError};
use std::collections::HashSet;
use tracing::warn;

/// Proof that the caller passed the operator allow-list.
///
/// Only [`OperatorAccess::authorize`] can build one, so every engine method
/// that takes an `&Operator` is gated by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operator {
    id: CustomerId,
}

impl Operator {
    pub fn id(&self) -> CustomerId {
        self.id
    }
}

/// Static allow-list of operator identities.
#[derive(Debug, Clone, Default)]
pub struct OperatorAccess {
    operators: HashSet<CustomerId>,
}

impl OperatorAccess {
    pub fn new(operators: impl IntoIterator<Item = CustomerId>) -> Self {
        Self {
            operators: operators.into_iter().collect(),
        }
    }

    pub fn is_operator(&self, id: CustomerId) -> bool {
        self.operators.contains(&id)
    }

    pub fn authorize(&self, id: CustomerId) -> Result<Operator> {
        if self.is_operator(id) {
            Ok(Operator { id })
        } else {
            warn!(target: "security", actor = %id, "Operator command denied");
            Err(ShopError::PermissionDenied(id))
        }
    }
}
