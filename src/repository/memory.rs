use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::access::{AccessPredicate, AssignmentGrant, LeasedUnit, ScopeLookup, Scoped};
use crate::errors::RepositoryError;
use crate::models::{
    AccountKind, AccountRecord, AdminDashboardStats, AssignmentPermissionsRequest, Document,
    Lease, MaintenanceTicket, ManagerAssignment, Payment, Property, PropertyKey, Unit,
    UpdatePropertyRequest, UpdateUnitRequest,
};
use crate::roles::Role;

use super::Repository;

#[derive(Default)]
struct Tables {
    admins: HashMap<Uuid, AccountRecord>,
    users: HashMap<Uuid, AccountRecord>,
    properties: Vec<Property>,
    units: Vec<Unit>,
    leases: Vec<Lease>,
    documents: Vec<Document>,
    tickets: Vec<MaintenanceTicket>,
    payments: Vec<Payment>,
    keys: Vec<PropertyKey>,
    assignments: Vec<ManagerAssignment>,
}

impl ScopeLookup for Tables {
    fn property_owner(&self, property_id: Uuid) -> Option<Uuid> {
        self.properties
            .iter()
            .find(|p| p.id == property_id)
            .map(|p| p.owner_id)
    }

    fn active_assignment(&self, manager_id: Uuid, property_id: Uuid) -> Option<AssignmentGrant> {
        self.assignments
            .iter()
            .find(|a| a.manager_id == manager_id && a.property_id == property_id && a.is_active)
            .map(|a| AssignmentGrant {
                can_view_financials: a.can_view_financials,
                can_manage_leases: a.can_manage_leases,
            })
    }

    fn active_leases(&self, tenant_id: Uuid) -> Vec<LeasedUnit> {
        self.leases
            .iter()
            .filter(|l| l.tenant_id == tenant_id && l.status == Lease::ACTIVE)
            .map(|l| LeasedUnit {
                property_id: l.property_id,
                unit_id: l.unit_id,
            })
            .collect()
    }
}

impl Tables {
    fn visible<T: Scoped + Clone>(&self, rows: &[T], predicate: &AccessPredicate) -> Vec<T> {
        rows.iter()
            .filter(|row| predicate.permits(&row.facts(), self))
            .cloned()
            .collect()
    }
}

/// InMemoryRepository
///
/// A `Repository` held entirely in process memory. Scoped calls evaluate the
/// same [`AccessPredicate`] the Postgres implementation renders to SQL, via
/// [`AccessPredicate::permits`]. Used by the test suites and for running the
/// API without a database.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
    // When set, account lookups fail as if the data store were down.
    unavailable: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<(), RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("in-memory store marked unavailable".into()));
        }
        Ok(())
    }

    /// Simulates the data store going down (or coming back) for account lookups.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    // --- Seeding ---

    /// Inserts an account into the table its role belongs to.
    pub fn insert_account(&self, mut record: AccountRecord) {
        let internal = Role::canonicalize(&record.role).is_some_and(|r| r.is_internal());
        let mut tables = self.write();
        if internal {
            record.kind = AccountKind::Admin;
            tables.admins.insert(record.id, record);
        } else {
            record.kind = AccountKind::User;
            tables.users.insert(record.id, record);
        }
    }

    /// Applies `change` to an account and stamps `updated_at = at`.
    pub fn modify_account(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        change: impl FnOnce(&mut AccountRecord),
    ) {
        let mut tables = self.write();
        let tables = &mut *tables;
        let record = match tables.admins.get_mut(&id) {
            Some(record) => Some(record),
            None => tables.users.get_mut(&id),
        };
        if let Some(record) = record {
            change(record);
            record.updated_at = at;
        }
    }

    pub fn insert_property(&self, property: Property) {
        self.write().properties.push(property);
    }

    pub fn insert_unit(&self, unit: Unit) {
        self.write().units.push(unit);
    }

    pub fn insert_lease(&self, lease: Lease) {
        self.write().leases.push(lease);
    }

    pub fn insert_document(&self, document: Document) {
        self.write().documents.push(document);
    }

    pub fn insert_ticket(&self, ticket: MaintenanceTicket) {
        self.write().tickets.push(ticket);
    }

    pub fn insert_payment(&self, payment: Payment) {
        self.write().payments.push(payment);
    }

    pub fn insert_key(&self, key: PropertyKey) {
        self.write().keys.push(key);
    }

    pub fn insert_assignment(&self, assignment: ManagerAssignment) {
        self.write().assignments.push(assignment);
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    // --- ACCOUNTS ---

    async fn find_admin_account(&self, id: Uuid) -> Result<Option<AccountRecord>, RepositoryError> {
        self.check_available()?;
        Ok(self.read().admins.get(&id).cloned())
    }

    async fn find_user_account(&self, id: Uuid) -> Result<Option<AccountRecord>, RepositoryError> {
        self.check_available()?;
        Ok(self.read().users.get(&id).cloned())
    }

    async fn find_admin_by_email(
        &self,
        email: &str,
    ) -> Result<Option<AccountRecord>, RepositoryError> {
        self.check_available()?;
        Ok(self.read().admins.values().find(|a| a.email == email).cloned())
    }

    async fn find_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<AccountRecord>, RepositoryError> {
        self.check_available()?;
        Ok(self.read().users.values().find(|a| a.email == email).cloned())
    }

    async fn record_login(&self, kind: AccountKind, id: Uuid) -> Result<(), RepositoryError> {
        self.check_available()?;
        let now = Utc::now();
        let mut tables = self.write();
        let table = match kind {
            AccountKind::Admin => &mut tables.admins,
            AccountKind::User => &mut tables.users,
        };
        if let Some(record) = table.get_mut(&id) {
            record.last_login = Some(now);
            record.updated_at = now;
        }
        Ok(())
    }

    async fn create_manager(
        &self,
        customer_id: Uuid,
        email: &str,
        password_hash: &str,
    ) -> Result<AccountRecord, RepositoryError> {
        let mut tables = self.write();
        let taken = tables.users.values().chain(tables.admins.values()).any(|a| a.email == email);
        if taken {
            return Err(RepositoryError::Conflict("account already exists".into()));
        }

        let record = AccountRecord {
            id: Uuid::new_v4(),
            email: email.to_string(),
            role: Role::Manager.as_str().to_string(),
            customer_id: Some(customer_id),
            is_active: true,
            updated_at: Utc::now(),
            last_login: None,
            password_hash: password_hash.to_string(),
            kind: AccountKind::User,
        };
        tables.users.insert(record.id, record.clone());
        Ok(record)
    }

    // --- PROPERTIES & UNITS ---

    async fn list_properties(&self, predicate: &AccessPredicate) -> Vec<Property> {
        let tables = self.read();
        tables.visible(&tables.properties, predicate)
    }

    async fn get_property(&self, id: Uuid, predicate: &AccessPredicate) -> Option<Property> {
        let tables = self.read();
        tables
            .properties
            .iter()
            .find(|p| p.id == id && predicate.permits(&p.facts(), &*tables))
            .cloned()
    }

    async fn update_property(
        &self,
        id: Uuid,
        predicate: &AccessPredicate,
        req: UpdatePropertyRequest,
    ) -> Option<Property> {
        let mut tables = self.write();
        let index = tables
            .properties
            .iter()
            .position(|p| p.id == id && predicate.permits(&p.facts(), &*tables))?;

        let property = &mut tables.properties[index];
        if let Some(name) = req.name {
            property.name = name;
        }
        if let Some(address) = req.address {
            property.address = address;
        }
        property.updated_at = Utc::now();
        Some(property.clone())
    }

    async fn list_units(
        &self,
        predicate: &AccessPredicate,
        property_id: Option<Uuid>,
    ) -> Vec<Unit> {
        let tables = self.read();
        tables
            .visible(&tables.units, predicate)
            .into_iter()
            .filter(|u| property_id.is_none_or(|p| u.property_id == p))
            .collect()
    }

    async fn update_unit(
        &self,
        id: Uuid,
        predicate: &AccessPredicate,
        req: UpdateUnitRequest,
    ) -> Option<Unit> {
        let mut tables = self.write();
        let index = tables
            .units
            .iter()
            .position(|u| u.id == id && predicate.permits(&u.facts(), &*tables))?;

        let unit = &mut tables.units[index];
        if let Some(label) = req.label {
            unit.label = label;
        }
        if let Some(rent_cents) = req.rent_cents {
            unit.rent_cents = rent_cents;
        }
        Some(unit.clone())
    }

    // --- LEASES, DOCUMENTS, PAYMENTS, KEYS ---

    async fn list_leases(&self, predicate: &AccessPredicate) -> Vec<Lease> {
        let tables = self.read();
        tables.visible(&tables.leases, predicate)
    }

    async fn update_lease_status(
        &self,
        id: Uuid,
        predicate: &AccessPredicate,
        status: &str,
    ) -> Option<Lease> {
        let mut tables = self.write();
        let index = tables
            .leases
            .iter()
            .position(|l| l.id == id && predicate.permits(&l.facts(), &*tables))?;

        let lease = &mut tables.leases[index];
        lease.status = status.to_string();
        Some(lease.clone())
    }

    async fn list_documents(&self, predicate: &AccessPredicate) -> Vec<Document> {
        let tables = self.read();
        tables.visible(&tables.documents, predicate)
    }

    async fn list_payments(&self, predicate: &AccessPredicate) -> Vec<Payment> {
        let tables = self.read();
        tables.visible(&tables.payments, predicate)
    }

    async fn list_keys(&self, predicate: &AccessPredicate) -> Vec<PropertyKey> {
        let tables = self.read();
        tables.visible(&tables.keys, predicate)
    }

    async fn apply_payment_status(
        &self,
        reference: &str,
        status: &str,
    ) -> Result<Option<Payment>, RepositoryError> {
        let mut tables = self.write();
        Ok(tables
            .payments
            .iter_mut()
            .find(|p| p.provider_reference == reference)
            .map(|payment| {
                payment.status = status.to_string();
                payment.updated_at = Utc::now();
                payment.clone()
            }))
    }

    // --- MAINTENANCE ---

    async fn list_maintenance_tickets(
        &self,
        predicate: &AccessPredicate,
    ) -> Vec<MaintenanceTicket> {
        let tables = self.read();
        tables.visible(&tables.tickets, predicate)
    }

    async fn get_maintenance_ticket(
        &self,
        id: Uuid,
        predicate: &AccessPredicate,
    ) -> Option<MaintenanceTicket> {
        let tables = self.read();
        tables
            .tickets
            .iter()
            .find(|t| t.id == id && predicate.permits(&t.facts(), &*tables))
            .cloned()
    }

    async fn create_maintenance_ticket(
        &self,
        mut ticket: MaintenanceTicket,
    ) -> Result<MaintenanceTicket, RepositoryError> {
        let now = Utc::now();
        ticket.created_at = now;
        ticket.updated_at = now;
        self.write().tickets.push(ticket.clone());
        Ok(ticket)
    }

    async fn assign_maintenance_ticket(
        &self,
        id: Uuid,
        predicate: &AccessPredicate,
        assigned_to: Option<Uuid>,
    ) -> Option<MaintenanceTicket> {
        let mut tables = self.write();
        let index = tables
            .tickets
            .iter()
            .position(|t| t.id == id && predicate.permits(&t.facts(), &*tables))?;

        let ticket = &mut tables.tickets[index];
        ticket.assigned_to = assigned_to;
        ticket.updated_at = Utc::now();
        Some(ticket.clone())
    }

    // --- MANAGER ASSIGNMENTS ---

    async fn upsert_assignment(
        &self,
        assignment: ManagerAssignment,
    ) -> Result<ManagerAssignment, RepositoryError> {
        let now = Utc::now();
        let mut tables = self.write();

        if let Some(existing) = tables
            .assignments
            .iter_mut()
            .find(|a| {
                a.manager_id == assignment.manager_id && a.property_id == assignment.property_id
            })
        {
            existing.is_active = true;
            existing.can_view_financials = assignment.can_view_financials;
            existing.can_manage_leases = assignment.can_manage_leases;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let created = ManagerAssignment {
            is_active: true,
            created_at: now,
            updated_at: now,
            ..assignment
        };
        tables.assignments.push(created.clone());
        Ok(created)
    }

    async fn find_assignment(&self, id: Uuid) -> Option<ManagerAssignment> {
        self.read().assignments.iter().find(|a| a.id == id).cloned()
    }

    async fn set_assignment_active(&self, id: Uuid, is_active: bool) -> Option<ManagerAssignment> {
        let mut tables = self.write();
        let assignment = tables.assignments.iter_mut().find(|a| a.id == id)?;
        assignment.is_active = is_active;
        assignment.updated_at = Utc::now();
        Some(assignment.clone())
    }

    async fn update_assignment_permissions(
        &self,
        id: Uuid,
        req: AssignmentPermissionsRequest,
    ) -> Option<ManagerAssignment> {
        let mut tables = self.write();
        let assignment = tables.assignments.iter_mut().find(|a| a.id == id)?;
        if let Some(v) = req.can_view_financials {
            assignment.can_view_financials = v;
        }
        if let Some(v) = req.can_manage_leases {
            assignment.can_manage_leases = v;
        }
        assignment.updated_at = Utc::now();
        Some(assignment.clone())
    }

    // --- ADMIN ---

    async fn get_stats(&self) -> AdminDashboardStats {
        let tables = self.read();
        AdminDashboardStats {
            total_properties: tables.properties.len() as i64,
            total_units: tables.units.len() as i64,
            active_leases: tables
                .leases
                .iter()
                .filter(|l| l.status == Lease::ACTIVE)
                .count() as i64,
            open_tickets: tables.tickets.iter().filter(|t| t.status != "resolved").count() as i64,
        }
    }
}
