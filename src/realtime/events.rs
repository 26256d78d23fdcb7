//! Event names pushed to connected clients.

pub const PROPERTY_UPDATED: &str = "property:updated";
pub const UNIT_UPDATED: &str = "unit:updated";
pub const LEASE_UPDATED: &str = "lease:updated";
pub const MAINTENANCE_CREATED: &str = "maintenance:created";
pub const MAINTENANCE_REASSIGNED: &str = "maintenance:reassigned";
pub const MANAGER_ASSIGNED: &str = "manager:assigned";
pub const MANAGER_ASSIGNMENT_CHANGED: &str = "manager:assignment_changed";
pub const MANAGER_PERMISSIONS_UPDATED: &str = "manager:permissions_updated";
pub const PAYMENT_SUCCEEDED: &str = "payment:succeeded";
pub const PAYMENT_FAILED: &str = "payment:failed";
