use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::access::{RowFacts, Scoped};

// --- Accounts ---

/// AccountKind
///
/// Which table an account record was resolved from. Internal staff live in
/// `admin_accounts`; owners, managers and tenants live in `users`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Admin,
    #[default]
    User,
}

/// AccountRecord
///
/// The live state of an account, looked up on every authenticated request to
/// decide whether the presented token is still fresh.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default)]
pub struct AccountRecord {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    pub customer_id: Option<Uuid>,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub password_hash: String,
    #[sqlx(skip)]
    pub kind: AccountKind,
}

// --- Property Tree ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Property {
    pub id: Uuid,
    pub customer_id: Uuid,
    // The owning user. Owner scoping compares against this column.
    pub owner_id: Uuid,
    pub name: String,
    pub address: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Unit {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub property_id: Uuid,
    pub label: String,
    pub rent_cents: i64,
}

/// Lease
///
/// Only leases with `status = "active"` extend a tenant's scope to the unit.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Lease {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub property_id: Uuid,
    pub unit_id: Uuid,
    pub tenant_id: Uuid,
    pub status: String,
    #[ts(type = "string")]
    pub starts_on: NaiveDate,
    #[ts(type = "string | null")]
    pub ends_on: Option<NaiveDate>,
}

impl Lease {
    pub const ACTIVE: &'static str = "active";
    pub const STATUSES: [&'static str; 3] = ["pending", Lease::ACTIVE, "ended"];
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Document {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub property_id: Uuid,
    pub unit_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub title: String,
    pub storage_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct MaintenanceTicket {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub property_id: Uuid,
    pub unit_id: Option<Uuid>,
    // The account that opened the ticket. Tenants without a lease still see these.
    pub reported_by: Uuid,
    pub assigned_to: Option<Uuid>,
    pub title: String,
    pub status: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl MaintenanceTicket {
    pub const OPEN: &'static str = "open";
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Payment {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub property_id: Uuid,
    pub lease_id: Uuid,
    pub tenant_id: Uuid,
    pub amount_cents: i64,
    pub status: String,
    // Reference assigned by the payment provider; webhooks are matched on it.
    pub provider_reference: String,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// PropertyKey
///
/// A physical key or fob handed out for a property or unit.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct PropertyKey {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub property_id: Uuid,
    pub unit_id: Option<Uuid>,
    pub holder_id: Option<Uuid>,
    pub label: String,
}

/// ManagerAssignment
///
/// Grants a manager access to one property. Only rows with `is_active = true`
/// count; deactivation is a soft toggle so it can be reversed later.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct ManagerAssignment {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub property_id: Uuid,
    pub manager_id: Uuid,
    pub is_active: bool,
    pub can_view_financials: bool,
    pub can_manage_leases: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

// --- Scoping facts ---

impl Scoped for Property {
    fn facts(&self) -> RowFacts {
        RowFacts {
            customer_id: Some(self.customer_id),
            property_id: self.id,
            ..RowFacts::default()
        }
    }
}

impl Scoped for Unit {
    fn facts(&self) -> RowFacts {
        RowFacts {
            customer_id: Some(self.customer_id),
            property_id: self.property_id,
            unit_id: Some(self.id),
            ..RowFacts::default()
        }
    }
}

impl Scoped for Lease {
    fn facts(&self) -> RowFacts {
        RowFacts {
            customer_id: Some(self.customer_id),
            property_id: self.property_id,
            unit_id: Some(self.unit_id),
            tenant_id: Some(self.tenant_id),
            ..RowFacts::default()
        }
    }
}

impl Scoped for Document {
    fn facts(&self) -> RowFacts {
        RowFacts {
            customer_id: Some(self.customer_id),
            property_id: self.property_id,
            unit_id: self.unit_id,
            tenant_id: self.tenant_id,
            ..RowFacts::default()
        }
    }
}

impl Scoped for MaintenanceTicket {
    fn facts(&self) -> RowFacts {
        RowFacts {
            customer_id: Some(self.customer_id),
            property_id: self.property_id,
            unit_id: self.unit_id,
            reported_by: Some(self.reported_by),
            ..RowFacts::default()
        }
    }
}

impl Scoped for Payment {
    fn facts(&self) -> RowFacts {
        RowFacts {
            customer_id: Some(self.customer_id),
            property_id: self.property_id,
            tenant_id: Some(self.tenant_id),
            ..RowFacts::default()
        }
    }
}

impl Scoped for PropertyKey {
    fn facts(&self) -> RowFacts {
        RowFacts {
            customer_id: Some(self.customer_id),
            property_id: self.property_id,
            unit_id: self.unit_id,
            holder_id: self.holder_id,
            ..RowFacts::default()
        }
    }
}

// --- Request Payloads ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// UpdatePropertyRequest
///
/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdatePropertyRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateUnitRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rent_cents: Option<i64>,
}

/// UpdateLeaseRequest
///
/// Moves a lease between `pending`, `active` and `ended`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateLeaseRequest {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateTicketRequest {
    pub property_id: Uuid,
    pub unit_id: Option<Uuid>,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AssignTicketRequest {
    pub assigned_to: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateManagerRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AssignManagerRequest {
    pub manager_id: Uuid,
    #[serde(default)]
    pub can_view_financials: bool,
    #[serde(default)]
    pub can_manage_leases: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SetAssignmentActiveRequest {
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AssignmentPermissionsRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_view_financials: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_manage_leases: Option<bool>,
}

/// PaymentWebhookRequest
///
/// Body of the payment provider callback. The raw bytes are signed, so the
/// handler parses this only after the signature check passes.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentWebhookRequest {
    pub reference: String,
    pub status: String,
}

// --- Response Payloads ---

/// UserProfile
///
/// The identity a token resolves to, as returned by login, `/me` and `/auth/session`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    pub customer_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SessionStatus {
    pub valid: bool,
    pub user: UserProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AdminDashboardStats {
    pub total_properties: i64,
    pub total_units: i64,
    pub active_leases: i64,
    pub open_tickets: i64,
}
