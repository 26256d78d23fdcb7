use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, postgres::PgRow, query_builder::QueryBuilder};
use uuid::Uuid;

use crate::access::AccessPredicate;
use crate::errors::RepositoryError;
use crate::models::{
    AccountKind, AccountRecord, AdminDashboardStats, AssignmentPermissionsRequest, Document,
    Lease, MaintenanceTicket, ManagerAssignment, Payment, Property, PropertyKey, Unit,
    UpdatePropertyRequest, UpdateUnitRequest,
};

use super::Repository;

const PROPERTY_COLUMNS: &str =
    "r.id, r.customer_id, r.owner_id, r.name, r.address, r.created_at, r.updated_at";
const UNIT_COLUMNS: &str = "r.id, r.customer_id, r.property_id, r.label, r.rent_cents";
const LEASE_COLUMNS: &str =
    "r.id, r.customer_id, r.property_id, r.unit_id, r.tenant_id, r.status, r.starts_on, r.ends_on";
const DOCUMENT_COLUMNS: &str =
    "r.id, r.customer_id, r.property_id, r.unit_id, r.tenant_id, r.title, r.storage_key";
const TICKET_COLUMNS: &str = "r.id, r.customer_id, r.property_id, r.unit_id, r.reported_by, \
     r.assigned_to, r.title, r.status, r.created_at, r.updated_at";
const PAYMENT_COLUMNS: &str = "r.id, r.customer_id, r.property_id, r.lease_id, r.tenant_id, \
     r.amount_cents, r.status, r.provider_reference, r.updated_at";
const KEY_COLUMNS: &str = "r.id, r.customer_id, r.property_id, r.unit_id, r.holder_id, r.label";
const ASSIGNMENT_COLUMNS: &str = "id, customer_id, property_id, manager_id, is_active, \
     can_view_financials, can_manage_leases, created_at, updated_at";

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL. Scoped queries are
/// assembled with `QueryBuilder` so predicate values are always bound.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// scoped_select
    ///
    /// `SELECT <columns> FROM <table> r WHERE <predicate> ORDER BY <order>`.
    async fn scoped_select<T>(
        &self,
        label: &str,
        columns: &str,
        table: &str,
        predicate: &AccessPredicate,
        order_by: &str,
    ) -> Vec<T>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        if predicate.is_denied() {
            return vec![];
        }

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {columns} FROM {table} r WHERE "));
        predicate.push_sql(&mut builder);
        builder.push(format!(" ORDER BY {order_by}"));

        match builder.build_query_as::<T>().fetch_all(&self.pool).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!("{} error: {:?}", label, e);
                vec![]
            }
        }
    }

    async fn find_account(
        &self,
        kind: AccountKind,
        key: AccountKey<'_>,
    ) -> Result<Option<AccountRecord>, RepositoryError> {
        let table = match kind {
            AccountKind::Admin => "admin_accounts",
            AccountKind::User => "users",
        };
        let key_column = match key {
            AccountKey::Id(_) => "id",
            AccountKey::Email(_) => "email",
        };
        // admin_accounts has no customer column; internal staff never belong to a customer.
        let customer_column = match kind {
            AccountKind::Admin => "NULL::uuid AS customer_id",
            AccountKind::User => "customer_id",
        };
        let sql = format!(
            "SELECT id, email, role, {customer_column}, is_active, updated_at, last_login, \
             password_hash FROM {table} WHERE {key_column} = $1"
        );

        let query = sqlx::query_as::<_, AccountRecord>(&sql);
        let query = match key {
            AccountKey::Id(id) => query.bind(id),
            AccountKey::Email(email) => query.bind(email),
        };
        let record = query.fetch_optional(&self.pool).await?;

        Ok(record.map(|mut r| {
            r.kind = kind;
            r
        }))
    }
}

#[derive(Clone, Copy)]
enum AccountKey<'a> {
    Id(Uuid),
    Email(&'a str),
}

fn conflict_or_database(e: sqlx::Error, what: &str) -> RepositoryError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::Conflict(format!("{what} already exists"))
        }
        _ => RepositoryError::Database(e),
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    // --- ACCOUNTS ---

    async fn find_admin_account(&self, id: Uuid) -> Result<Option<AccountRecord>, RepositoryError> {
        self.find_account(AccountKind::Admin, AccountKey::Id(id)).await
    }

    async fn find_user_account(&self, id: Uuid) -> Result<Option<AccountRecord>, RepositoryError> {
        self.find_account(AccountKind::User, AccountKey::Id(id)).await
    }

    async fn find_admin_by_email(
        &self,
        email: &str,
    ) -> Result<Option<AccountRecord>, RepositoryError> {
        self.find_account(AccountKind::Admin, AccountKey::Email(email)).await
    }

    async fn find_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<AccountRecord>, RepositoryError> {
        self.find_account(AccountKind::User, AccountKey::Email(email)).await
    }

    async fn record_login(&self, kind: AccountKind, id: Uuid) -> Result<(), RepositoryError> {
        let table = match kind {
            AccountKind::Admin => "admin_accounts",
            AccountKind::User => "users",
        };
        sqlx::query(&format!(
            "UPDATE {table} SET last_login = NOW(), updated_at = NOW() WHERE id = $1"
        ))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_manager(
        &self,
        customer_id: Uuid,
        email: &str,
        password_hash: &str,
    ) -> Result<AccountRecord, RepositoryError> {
        let mut record = sqlx::query_as::<_, AccountRecord>(
            r#"
            INSERT INTO users (id, email, role, customer_id, is_active, password_hash, updated_at)
            VALUES ($1, $2, 'manager', $3, true, $4, NOW())
            RETURNING id, email, role, customer_id, is_active, updated_at, last_login, password_hash
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(customer_id)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or_database(e, "account"))?;

        record.kind = AccountKind::User;
        Ok(record)
    }

    // --- PROPERTIES & UNITS ---

    async fn list_properties(&self, predicate: &AccessPredicate) -> Vec<Property> {
        self.scoped_select(
            "list_properties",
            PROPERTY_COLUMNS,
            "properties",
            predicate,
            "r.created_at DESC",
        )
        .await
    }

    async fn get_property(&self, id: Uuid, predicate: &AccessPredicate) -> Option<Property> {
        if predicate.is_denied() {
            return None;
        }

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {PROPERTY_COLUMNS} FROM properties r WHERE r.id = "));
        builder.push_bind(id);
        builder.push(" AND ");
        predicate.push_sql(&mut builder);

        builder
            .build_query_as::<Property>()
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_property error: {:?}", e);
                None
            })
    }

    /// update_property
    ///
    /// Partial update via `COALESCE`; only rows inside the write predicate are touched.
    async fn update_property(
        &self,
        id: Uuid,
        predicate: &AccessPredicate,
        req: UpdatePropertyRequest,
    ) -> Option<Property> {
        if predicate.is_denied() {
            return None;
        }

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("UPDATE properties AS r SET name = COALESCE(");
        builder.push_bind(req.name);
        builder.push(", r.name), address = COALESCE(");
        builder.push_bind(req.address);
        builder.push(", r.address), updated_at = NOW() WHERE r.id = ");
        builder.push_bind(id);
        builder.push(" AND ");
        predicate.push_sql(&mut builder);
        builder.push(format!(" RETURNING {PROPERTY_COLUMNS}"));

        builder
            .build_query_as::<Property>()
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("update_property error: {:?}", e);
                None
            })
    }

    async fn list_units(
        &self,
        predicate: &AccessPredicate,
        property_id: Option<Uuid>,
    ) -> Vec<Unit> {
        if predicate.is_denied() {
            return vec![];
        }

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {UNIT_COLUMNS} FROM units r WHERE "));
        predicate.push_sql(&mut builder);
        if let Some(property_id) = property_id {
            builder.push(" AND r.property_id = ");
            builder.push_bind(property_id);
        }
        builder.push(" ORDER BY r.label ASC");

        match builder.build_query_as::<Unit>().fetch_all(&self.pool).await {
            Ok(units) => units,
            Err(e) => {
                tracing::error!("list_units error: {:?}", e);
                vec![]
            }
        }
    }

    async fn update_unit(
        &self,
        id: Uuid,
        predicate: &AccessPredicate,
        req: UpdateUnitRequest,
    ) -> Option<Unit> {
        if predicate.is_denied() {
            return None;
        }

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("UPDATE units AS r SET label = COALESCE(");
        builder.push_bind(req.label);
        builder.push(", r.label), rent_cents = COALESCE(");
        builder.push_bind(req.rent_cents);
        builder.push(", r.rent_cents) WHERE r.id = ");
        builder.push_bind(id);
        builder.push(" AND ");
        predicate.push_sql(&mut builder);
        builder.push(format!(" RETURNING {UNIT_COLUMNS}"));

        builder
            .build_query_as::<Unit>()
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("update_unit error: {:?}", e);
                None
            })
    }

    // --- LEASES, DOCUMENTS, PAYMENTS, KEYS ---

    async fn list_leases(&self, predicate: &AccessPredicate) -> Vec<Lease> {
        self.scoped_select("list_leases", LEASE_COLUMNS, "leases", predicate, "r.starts_on DESC")
            .await
    }

    async fn update_lease_status(
        &self,
        id: Uuid,
        predicate: &AccessPredicate,
        status: &str,
    ) -> Option<Lease> {
        if predicate.is_denied() {
            return None;
        }

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("UPDATE leases AS r SET status = ");
        builder.push_bind(status.to_string());
        builder.push(" WHERE r.id = ");
        builder.push_bind(id);
        builder.push(" AND ");
        predicate.push_sql(&mut builder);
        builder.push(format!(" RETURNING {LEASE_COLUMNS}"));

        builder
            .build_query_as::<Lease>()
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("update_lease_status error: {:?}", e);
                None
            })
    }

    async fn list_documents(&self, predicate: &AccessPredicate) -> Vec<Document> {
        self.scoped_select(
            "list_documents",
            DOCUMENT_COLUMNS,
            "documents",
            predicate,
            "r.title ASC",
        )
            .await
    }

    async fn list_payments(&self, predicate: &AccessPredicate) -> Vec<Payment> {
        self.scoped_select(
            "list_payments",
            PAYMENT_COLUMNS,
            "payments",
            predicate,
            "r.updated_at DESC",
        )
            .await
    }

    async fn list_keys(&self, predicate: &AccessPredicate) -> Vec<PropertyKey> {
        self.scoped_select("list_keys", KEY_COLUMNS, "property_keys", predicate, "r.label ASC")
            .await
    }

    async fn apply_payment_status(
        &self,
        reference: &str,
        status: &str,
    ) -> Result<Option<Payment>, RepositoryError> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "UPDATE payments AS r SET status = $1, updated_at = NOW() \
             WHERE r.provider_reference = $2 RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(status)
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;
        Ok(payment)
    }

    // --- MAINTENANCE ---

    async fn list_maintenance_tickets(
        &self,
        predicate: &AccessPredicate,
    ) -> Vec<MaintenanceTicket> {
        self.scoped_select(
            "list_maintenance_tickets",
            TICKET_COLUMNS,
            "maintenance_tickets",
            predicate,
            "r.created_at DESC",
        )
        .await
    }

    async fn get_maintenance_ticket(
        &self,
        id: Uuid,
        predicate: &AccessPredicate,
    ) -> Option<MaintenanceTicket> {
        if predicate.is_denied() {
            return None;
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {TICKET_COLUMNS} FROM maintenance_tickets r WHERE r.id = "
        ));
        builder.push_bind(id);
        builder.push(" AND ");
        predicate.push_sql(&mut builder);

        builder
            .build_query_as::<MaintenanceTicket>()
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_maintenance_ticket error: {:?}", e);
                None
            })
    }

    async fn create_maintenance_ticket(
        &self,
        ticket: MaintenanceTicket,
    ) -> Result<MaintenanceTicket, RepositoryError> {
        let created = sqlx::query_as::<_, MaintenanceTicket>(&format!(
            "INSERT INTO maintenance_tickets AS r \
             (id, customer_id, property_id, unit_id, reported_by, assigned_to, title, status, \
             created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW()) RETURNING {TICKET_COLUMNS}"
        ))
        .bind(ticket.id)
        .bind(ticket.customer_id)
        .bind(ticket.property_id)
        .bind(ticket.unit_id)
        .bind(ticket.reported_by)
        .bind(ticket.assigned_to)
        .bind(ticket.title)
        .bind(ticket.status)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn assign_maintenance_ticket(
        &self,
        id: Uuid,
        predicate: &AccessPredicate,
        assigned_to: Option<Uuid>,
    ) -> Option<MaintenanceTicket> {
        if predicate.is_denied() {
            return None;
        }

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("UPDATE maintenance_tickets AS r SET assigned_to = ");
        builder.push_bind(assigned_to);
        builder.push(", updated_at = NOW() WHERE r.id = ");
        builder.push_bind(id);
        builder.push(" AND ");
        predicate.push_sql(&mut builder);
        builder.push(format!(" RETURNING {TICKET_COLUMNS}"));

        builder
            .build_query_as::<MaintenanceTicket>()
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("assign_maintenance_ticket error: {:?}", e);
                None
            })
    }

    // --- MANAGER ASSIGNMENTS ---

    async fn upsert_assignment(
        &self,
        assignment: ManagerAssignment,
    ) -> Result<ManagerAssignment, RepositoryError> {
        let saved = sqlx::query_as::<_, ManagerAssignment>(&format!(
            r#"
            INSERT INTO manager_assignments
                (id, customer_id, property_id, manager_id, is_active,
                 can_view_financials, can_manage_leases, created_at, updated_at)
            VALUES ($1, $2, $3, $4, true, $5, $6, NOW(), NOW())
            ON CONFLICT (manager_id, property_id) DO UPDATE
                SET is_active = true,
                    can_view_financials = EXCLUDED.can_view_financials,
                    can_manage_leases = EXCLUDED.can_manage_leases,
                    updated_at = NOW()
            RETURNING {ASSIGNMENT_COLUMNS}
            "#
        ))
        .bind(assignment.id)
        .bind(assignment.customer_id)
        .bind(assignment.property_id)
        .bind(assignment.manager_id)
        .bind(assignment.can_view_financials)
        .bind(assignment.can_manage_leases)
        .fetch_one(&self.pool)
        .await?;
        Ok(saved)
    }

    async fn find_assignment(&self, id: Uuid) -> Option<ManagerAssignment> {
        sqlx::query_as::<_, ManagerAssignment>(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM manager_assignments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("find_assignment error: {:?}", e);
            None
        })
    }

    async fn set_assignment_active(&self, id: Uuid, is_active: bool) -> Option<ManagerAssignment> {
        sqlx::query_as::<_, ManagerAssignment>(&format!(
            "UPDATE manager_assignments SET is_active = $1, updated_at = NOW() \
             WHERE id = $2 RETURNING {ASSIGNMENT_COLUMNS}"
        ))
        .bind(is_active)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("set_assignment_active error: {:?}", e);
            None
        })
    }

    async fn update_assignment_permissions(
        &self,
        id: Uuid,
        req: AssignmentPermissionsRequest,
    ) -> Option<ManagerAssignment> {
        sqlx::query_as::<_, ManagerAssignment>(&format!(
            "UPDATE manager_assignments \
             SET can_view_financials = COALESCE($1, can_view_financials), \
                 can_manage_leases = COALESCE($2, can_manage_leases), \
                 updated_at = NOW() \
             WHERE id = $3 RETURNING {ASSIGNMENT_COLUMNS}"
        ))
        .bind(req.can_view_financials)
        .bind(req.can_manage_leases)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("update_assignment_permissions error: {:?}", e);
            None
        })
    }

    // --- ADMIN ---

    async fn get_stats(&self) -> AdminDashboardStats {
        async fn count(pool: &PgPool, sql: &str) -> i64 {
            sqlx::query_scalar::<_, i64>(sql)
                .fetch_one(pool)
                .await
                .unwrap_or_else(|e| {
                    tracing::error!("get_stats error: {:?}", e);
                    0
                })
        }

        AdminDashboardStats {
            total_properties: count(&self.pool, "SELECT COUNT(*) FROM properties").await,
            total_units: count(&self.pool, "SELECT COUNT(*) FROM units").await,
            active_leases: count(
                &self.pool,
                "SELECT COUNT(*) FROM leases WHERE status = 'active'",
            )
            .await,
            open_tickets: count(
                &self.pool,
                "SELECT COUNT(*) FROM maintenance_tickets WHERE status <> 'resolved'",
            )
            .await,
        }
    }
}
