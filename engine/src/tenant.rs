use uuid::Uuid;

/// Identifies whose data a trigger is operating on.
///
/// Passed explicitly by the caller firing a domain event. When a trigger is
/// raised outside any tenant scope (system jobs, console commands), callers
/// pass `None` and the engine skips workflow dispatch without failing the
/// surrounding operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: Uuid,
    /// The acting user, when the event was caused by one.
    pub user_id: Option<Uuid>,
}

impl TenantContext {
    pub fn new(tenant_id: Uuid) -> Self {
        Self {
            tenant_id,
            user_id: None,
        }
    }

    pub fn acting_as(tenant_id: Uuid, user_id: Uuid) -> Self {
        Self {
            tenant_id,
            user_id: Some(user_id),
        }
    }
}
