//! Row-level access scoping.
//!
//! Every route that touches a customer-owned table first turns the caller's
//! identity into an [`AccessPredicate`] and hands it to the repository. The
//! predicate is rebuilt on every request: manager assignments and their
//! permission toggles change underneath a live session and must apply on the
//! very next call, so nothing here is memoized.

use serde::Serialize;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::Lease;
use crate::roles::Role;

/// The resource tables a predicate can be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Property,
    Unit,
    Lease,
    Document,
    MaintenanceTicket,
    Payment,
    Key,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::Property,
        ResourceKind::Unit,
        ResourceKind::Lease,
        ResourceKind::Document,
        ResourceKind::MaintenanceTicket,
        ResourceKind::Payment,
        ResourceKind::Key,
    ];

    /// Column holding the owning property's id, relative to the `r` alias.
    fn property_column(&self) -> &'static str {
        match self {
            ResourceKind::Property => "r.id",
            _ => "r.property_id",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Read,
    Write,
}

/// Assignment permission toggles an owner can grant a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentRequirement {
    ViewFinancials,
    ManageLeases,
}

/// AccessScope
///
/// The authorization boundary for one role against one resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccessScope {
    /// Internal staff: every row.
    Unrestricted,
    /// Rows whose owning property has `owner_id = owner_id`.
    OwnedBy { owner_id: Uuid },
    /// Rows whose property is reachable through an active assignment of this manager.
    AssignedTo {
        manager_id: Uuid,
        requires: Option<AssignmentRequirement>,
    },
    /// Rows tied to the tenant directly, or to a unit under one of the tenant's active leases.
    Occupant { tenant_id: Uuid },
    /// Nothing. Writes answer 403, reads answer with an empty result.
    Denied,
}

/// AccessPredicate
///
/// A request-scoped filter: the scope plus the resource it applies to and,
/// for customer accounts, the customer the rows must belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessPredicate {
    pub resource: ResourceKind,
    pub action: Action,
    pub scope: AccessScope,
    pub customer_id: Option<Uuid>,
}

/// build_predicate
///
/// Maps `{role, subject, customer}` onto the predicate for `resource`.
/// Role strings are canonicalized first; an unrecognized role gets `Denied`.
pub fn build_predicate(
    role: &str,
    subject_id: Uuid,
    customer_id: Option<Uuid>,
    resource: ResourceKind,
    action: Action,
) -> AccessPredicate {
    let (scope, customer_id) = match Role::canonicalize(role) {
        Some(role) if role.is_internal() => (AccessScope::Unrestricted, None),
        Some(role) => (scope_for(role, subject_id, resource, action), customer_id),
        None => {
            tracing::debug!(role, "unrecognized role, denying access");
            (AccessScope::Denied, customer_id)
        }
    };

    AccessPredicate {
        resource,
        action,
        scope,
        customer_id,
    }
}

fn scope_for(role: Role, subject_id: Uuid, resource: ResourceKind, action: Action) -> AccessScope {
    match role {
        Role::SuperAdmin | Role::Admin => AccessScope::Unrestricted,
        Role::Owner => AccessScope::OwnedBy { owner_id: subject_id },
        Role::Manager => {
            let requires = match (resource, action) {
                (ResourceKind::Payment, Action::Write) => return AccessScope::Denied,
                (ResourceKind::Payment, Action::Read) => {
                    Some(AssignmentRequirement::ViewFinancials)
                }
                (ResourceKind::Lease, Action::Write) => Some(AssignmentRequirement::ManageLeases),
                _ => None,
            };
            AccessScope::AssignedTo {
                manager_id: subject_id,
                requires,
            }
        }
        Role::Tenant => match (resource, action) {
            (_, Action::Read) | (ResourceKind::MaintenanceTicket, Action::Write) => {
                AccessScope::Occupant { tenant_id: subject_id }
            }
            _ => AccessScope::Denied,
        },
    }
}

// --- In-memory evaluation ---

/// RowFacts
///
/// The columns of a row that scoping looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowFacts {
    pub customer_id: Option<Uuid>,
    pub property_id: Uuid,
    pub unit_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub reported_by: Option<Uuid>,
    pub holder_id: Option<Uuid>,
}

/// Implemented by every model a predicate can filter.
pub trait Scoped {
    fn facts(&self) -> RowFacts;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AssignmentGrant {
    pub can_view_financials: bool,
    pub can_manage_leases: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeasedUnit {
    pub property_id: Uuid,
    pub unit_id: Uuid,
}

/// ScopeLookup
///
/// The joins a predicate needs, answered from whatever holds the data.
pub trait ScopeLookup {
    fn property_owner(&self, property_id: Uuid) -> Option<Uuid>;
    /// Only active assignments are returned.
    fn active_assignment(&self, manager_id: Uuid, property_id: Uuid) -> Option<AssignmentGrant>;
    /// Units under the tenant's currently active leases.
    fn active_leases(&self, tenant_id: Uuid) -> Vec<LeasedUnit>;
}

impl AccessPredicate {
    pub fn is_denied(&self) -> bool {
        matches!(self.scope, AccessScope::Denied)
    }

    /// permits
    ///
    /// Evaluates the predicate against one row. Must agree with [`Self::push_sql`].
    pub fn permits(&self, row: &RowFacts, lookup: &dyn ScopeLookup) -> bool {
        if let Some(customer_id) = self.customer_id {
            if row.customer_id != Some(customer_id) {
                return false;
            }
        }

        match &self.scope {
            AccessScope::Unrestricted => true,
            AccessScope::Denied => false,
            AccessScope::OwnedBy { owner_id } => {
                lookup.property_owner(row.property_id) == Some(*owner_id)
            }
            AccessScope::AssignedTo { manager_id, requires } => {
                match lookup.active_assignment(*manager_id, row.property_id) {
                    Some(grant) => match requires {
                        None => true,
                        Some(AssignmentRequirement::ViewFinancials) => grant.can_view_financials,
                        Some(AssignmentRequirement::ManageLeases) => grant.can_manage_leases,
                    },
                    None => false,
                }
            }
            AccessScope::Occupant { tenant_id } => {
                let leased = lookup.active_leases(*tenant_id);
                let on_leased_unit = row
                    .unit_id
                    .is_some_and(|unit| leased.iter().any(|l| l.unit_id == unit));

                match self.resource {
                    ResourceKind::Property => {
                        leased.iter().any(|l| l.property_id == row.property_id)
                    }
                    ResourceKind::Unit => on_leased_unit,
                    ResourceKind::Lease | ResourceKind::Payment => {
                        row.tenant_id == Some(*tenant_id)
                    }
                    ResourceKind::Document => {
                        row.tenant_id == Some(*tenant_id) || on_leased_unit
                    }
                    ResourceKind::MaintenanceTicket => {
                        row.reported_by == Some(*tenant_id) || on_leased_unit
                    }
                    ResourceKind::Key => row.holder_id == Some(*tenant_id) || on_leased_unit,
                }
            }
        }
    }

    // --- SQL rendering ---

    /// push_sql
    ///
    /// Appends the predicate as a parenthesized boolean expression over the
    /// row alias `r`. All values are bound, never interpolated.
    pub fn push_sql(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        builder.push("(");

        if let Some(customer_id) = self.customer_id {
            builder.push("r.customer_id = ");
            builder.push_bind(customer_id);
            builder.push(" AND ");
        }

        let property_column = self.resource.property_column();

        match &self.scope {
            AccessScope::Unrestricted => {
                builder.push("TRUE");
            }
            AccessScope::Denied => {
                builder.push("FALSE");
            }
            AccessScope::OwnedBy { owner_id } => {
                if self.resource == ResourceKind::Property {
                    builder.push("r.owner_id = ");
                    builder.push_bind(*owner_id);
                } else {
                    builder.push(
                        "r.property_id IN (SELECT p.id FROM properties p WHERE p.owner_id = ",
                    );
                    builder.push_bind(*owner_id);
                    builder.push(")");
                }
            }
            AccessScope::AssignedTo { manager_id, requires } => {
                builder.push(property_column);
                builder.push(
                    " IN (SELECT ma.property_id FROM manager_assignments ma WHERE ma.manager_id = ",
                );
                builder.push_bind(*manager_id);
                builder.push(" AND ma.is_active = TRUE");
                match requires {
                    Some(AssignmentRequirement::ViewFinancials) => {
                        builder.push(" AND ma.can_view_financials = TRUE");
                    }
                    Some(AssignmentRequirement::ManageLeases) => {
                        builder.push(" AND ma.can_manage_leases = TRUE");
                    }
                    None => {}
                }
                builder.push(")");
            }
            AccessScope::Occupant { tenant_id } => {
                let tenant_id = *tenant_id;
                match self.resource {
                    ResourceKind::Property => {
                        builder.push(
                            "r.id IN (SELECT l.property_id FROM leases l WHERE l.tenant_id = ",
                        );
                        builder.push_bind(tenant_id);
                        builder.push(" AND l.status = ");
                        builder.push_bind(Lease::ACTIVE);
                        builder.push(")");
                    }
                    ResourceKind::Unit => {
                        builder.push("r.id IN ");
                        push_leased_units(builder, tenant_id);
                    }
                    ResourceKind::Lease | ResourceKind::Payment => {
                        builder.push("r.tenant_id = ");
                        builder.push_bind(tenant_id);
                    }
                    ResourceKind::Document
                    | ResourceKind::MaintenanceTicket
                    | ResourceKind::Key => {
                        let identity_column = match self.resource {
                            ResourceKind::Document => "r.tenant_id",
                            ResourceKind::MaintenanceTicket => "r.reported_by",
                            _ => "r.holder_id",
                        };
                        builder.push("(");
                        builder.push(identity_column);
                        builder.push(" = ");
                        builder.push_bind(tenant_id);
                        builder.push(" OR r.unit_id IN ");
                        push_leased_units(builder, tenant_id);
                        builder.push(")");
                    }
                }
            }
        }

        builder.push(")");
    }
}

fn push_leased_units(builder: &mut QueryBuilder<'_, Postgres>, tenant_id: Uuid) {
    builder.push("(SELECT l.unit_id FROM leases l WHERE l.tenant_id = ");
    builder.push_bind(tenant_id);
    builder.push(" AND l.status = ");
    builder.push_bind(Lease::ACTIVE);
    builder.push(")");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(predicate: &AccessPredicate) -> String {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT * FROM t r WHERE ");
        predicate.push_sql(&mut builder);
        builder.sql().to_string()
    }

    #[test]
    fn admins_are_unrestricted_and_drop_the_customer_filter() {
        let p = build_predicate(
            "super_admin",
            Uuid::new_v4(),
            Some(Uuid::new_v4()),
            ResourceKind::Payment,
            Action::Write,
        );
        assert_eq!(p.scope, AccessScope::Unrestricted);
        assert_eq!(p.customer_id, None);
        assert!(render(&p).ends_with("(TRUE)"));
    }

    #[test]
    fn unknown_role_is_denied() {
        let p =
            build_predicate("janitor", Uuid::new_v4(), None, ResourceKind::Property, Action::Read);
        assert!(p.is_denied());
        assert!(render(&p).ends_with("(FALSE)"));
    }

    #[test]
    fn owner_synonyms_produce_the_same_scope() {
        let subject = Uuid::new_v4();
        let customer = Some(Uuid::new_v4());
        let a = build_predicate("owner", subject, customer, ResourceKind::Unit, Action::Read);
        let b =
            build_predicate("Property Owner", subject, customer, ResourceKind::Unit, Action::Read);
        assert_eq!(a, b);
        assert_eq!(a.scope, AccessScope::OwnedBy { owner_id: subject });
    }

    #[test]
    fn manager_sql_joins_only_active_assignments() {
        let p = build_predicate(
            "manager",
            Uuid::new_v4(),
            Some(Uuid::new_v4()),
            ResourceKind::MaintenanceTicket,
            Action::Read,
        );
        let sql = render(&p);
        assert!(sql.contains("r.customer_id = $1"));
        assert!(sql.contains(
            "r.property_id IN (SELECT ma.property_id FROM manager_assignments ma \
             WHERE ma.manager_id = $2 AND ma.is_active = TRUE)"
        ));
    }

    #[test]
    fn manager_payment_reads_require_financial_permission() {
        let p =
            build_predicate("manager", Uuid::new_v4(), None, ResourceKind::Payment, Action::Read);
        assert!(render(&p).contains("ma.can_view_financials = TRUE"));
        let w =
            build_predicate("manager", Uuid::new_v4(), None, ResourceKind::Payment, Action::Write);
        assert!(w.is_denied());
    }

    #[test]
    fn tenant_writes_only_maintenance_tickets() {
        let tenant = Uuid::new_v4();
        for resource in ResourceKind::ALL {
            let p = build_predicate("tenant", tenant, None, resource, Action::Write);
            assert_eq!(p.is_denied(), resource != ResourceKind::MaintenanceTicket, "{resource:?}");
        }
    }

    #[test]
    fn tenant_ticket_sql_falls_back_to_reporter() {
        let p = build_predicate(
            "tenant",
            Uuid::new_v4(),
            None,
            ResourceKind::MaintenanceTicket,
            Action::Read,
        );
        let sql = render(&p);
        assert!(sql.contains(
            "(r.reported_by = $1 OR r.unit_id IN (SELECT l.unit_id FROM leases l \
             WHERE l.tenant_id = $2 AND l.status = $3))"
        ));
    }
}
