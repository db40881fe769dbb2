/// Standard event types (namespace-prefixed)
///
/// Event types follow the format: `<category>.<action>`.
/// The bus and `POST /api/events` accept any non-empty string. Apart from
/// [`EventKind::WILDCARD`] these are a shared vocabulary for producers and
/// tests, not an allow-list.
pub struct EventKind;

impl EventKind {
    /// Subscribe to every event type
    pub const WILDCARD: &'static str = "*";

    // ========================================================================
    // Users
    // ========================================================================
    pub const USER_CREATED: &'static str = "user.created";
    pub const USER_UPDATED: &'static str = "user.updated";
    pub const USER_DELETED: &'static str = "user.deleted";

    // ========================================================================
    // Tasks
    // ========================================================================
    pub const TASK_CREATED: &'static str = "task.created";
    pub const TASK_UPDATED: &'static str = "task.updated";
    pub const TASK_COMPLETED: &'static str = "task.completed";
    pub const TASK_DELETED: &'static str = "task.deleted";

    // ========================================================================
    // Orders
    // ========================================================================
    pub const ORDER_CREATED: &'static str = "order.created";
    pub const ORDER_SHIPPED: &'static str = "order.shipped";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kinds_format() {
        // Verify all event kinds follow the namespace.action format
        assert!(EventKind::USER_CREATED.contains('.'));
        assert!(EventKind::TASK_COMPLETED.contains('.'));
        assert!(EventKind::ORDER_SHIPPED.contains('.'));
    }
}
