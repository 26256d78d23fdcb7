use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::access::AccessPredicate;
use crate::errors::RepositoryError;
use crate::models::{
    AccountKind, AccountRecord, AdminDashboardStats, AssignmentPermissionsRequest, Document,
    Lease, MaintenanceTicket, ManagerAssignment, Payment, Property, PropertyKey, Unit,
    UpdatePropertyRequest, UpdateUnitRequest,
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

/// Repository Trait
///
/// The persistence contract the handlers and the auth extractor work against.
///
/// Scoped reads and writes take an [`AccessPredicate`] and must apply it
/// before returning or mutating rows; they never widen it. Listings follow the
/// "log and return empty" convention, single-row writes return `None` when
/// the row does not exist or sits outside the predicate. Account lookups
/// return `Result` because the auth layer treats "store unavailable"
/// differently from "no such account".
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Accounts ---
    async fn find_admin_account(&self, id: Uuid) -> Result<Option<AccountRecord>, RepositoryError>;
    async fn find_user_account(&self, id: Uuid) -> Result<Option<AccountRecord>, RepositoryError>;
    async fn find_admin_by_email(&self, email: &str)
    -> Result<Option<AccountRecord>, RepositoryError>;
    async fn find_user_by_email(&self, email: &str)
    -> Result<Option<AccountRecord>, RepositoryError>;
    // Stamps `last_login`. This also bumps `updated_at`.
    async fn record_login(&self, kind: AccountKind, id: Uuid) -> Result<(), RepositoryError>;
    async fn create_manager(
        &self,
        customer_id: Uuid,
        email: &str,
        password_hash: &str,
    ) -> Result<AccountRecord, RepositoryError>;

    // --- Properties & Units ---
    async fn list_properties(&self, predicate: &AccessPredicate) -> Vec<Property>;
    async fn get_property(&self, id: Uuid, predicate: &AccessPredicate) -> Option<Property>;
    async fn update_property(
        &self,
        id: Uuid,
        predicate: &AccessPredicate,
        req: UpdatePropertyRequest,
    ) -> Option<Property>;
    async fn list_units(&self, predicate: &AccessPredicate, property_id: Option<Uuid>) -> Vec<Unit>;
    async fn update_unit(
        &self,
        id: Uuid,
        predicate: &AccessPredicate,
        req: UpdateUnitRequest,
    ) -> Option<Unit>;

    // --- Leases, Documents, Payments, Keys ---
    async fn list_leases(&self, predicate: &AccessPredicate) -> Vec<Lease>;
    async fn update_lease_status(
        &self,
        id: Uuid,
        predicate: &AccessPredicate,
        status: &str,
    ) -> Option<Lease>;
    async fn list_documents(&self, predicate: &AccessPredicate) -> Vec<Document>;
    async fn list_payments(&self, predicate: &AccessPredicate) -> Vec<Payment>;
    async fn list_keys(&self, predicate: &AccessPredicate) -> Vec<PropertyKey>;
    // Provider callbacks are matched on the provider reference, not scoped.
    async fn apply_payment_status(
        &self,
        reference: &str,
        status: &str,
    ) -> Result<Option<Payment>, RepositoryError>;

    // --- Maintenance ---
    async fn list_maintenance_tickets(&self, predicate: &AccessPredicate) -> Vec<MaintenanceTicket>;
    async fn get_maintenance_ticket(
        &self,
        id: Uuid,
        predicate: &AccessPredicate,
    ) -> Option<MaintenanceTicket>;
    async fn create_maintenance_ticket(
        &self,
        ticket: MaintenanceTicket,
    ) -> Result<MaintenanceTicket, RepositoryError>;
    async fn assign_maintenance_ticket(
        &self,
        id: Uuid,
        predicate: &AccessPredicate,
        assigned_to: Option<Uuid>,
    ) -> Option<MaintenanceTicket>;

    // --- Manager Assignments ---
    // Upserts on (manager_id, property_id); an existing row is reactivated.
    async fn upsert_assignment(
        &self,
        assignment: ManagerAssignment,
    ) -> Result<ManagerAssignment, RepositoryError>;
    async fn find_assignment(&self, id: Uuid) -> Option<ManagerAssignment>;
    async fn set_assignment_active(&self, id: Uuid, is_active: bool) -> Option<ManagerAssignment>;
    async fn update_assignment_permissions(
        &self,
        id: Uuid,
        req: AssignmentPermissionsRequest,
    ) -> Option<ManagerAssignment>;

    // --- Admin ---
    async fn get_stats(&self) -> AdminDashboardStats;
}

/// RepositoryState
///
/// The shared handle to the persistence layer held in `AppState`.
pub type RepositoryState = Arc<dyn Repository>;

/// find_account
///
/// Resolves an account the way the auth layer does: administrative accounts
/// first, then general users.
pub async fn find_account(
    repo: &dyn Repository,
    id: Uuid,
) -> Result<Option<AccountRecord>, RepositoryError> {
    if let Some(admin) = repo.find_admin_account(id).await? {
        return Ok(Some(admin));
    }
    repo.find_user_account(id).await
}

/// find_account_by_email
///
/// Same lookup order as [`find_account`], keyed by email for login.
pub async fn find_account_by_email(
    repo: &dyn Repository,
    email: &str,
) -> Result<Option<AccountRecord>, RepositoryError> {
    if let Some(admin) = repo.find_admin_by_email(email).await? {
        return Ok(Some(admin));
    }
    repo.find_user_by_email(email).await
}
