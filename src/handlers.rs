use crate::{
    AppState,
    access::{AccessPredicate, Action, ResourceKind},
    auth::{
        AuthUser, SessionIdentity, dummy_password_hash, hash_password, issue_token,
        validate_session, verify_password,
    },
    errors::{AppError, Result},
    models::{
        AdminDashboardStats, AssignManagerRequest, AssignTicketRequest,
        AssignmentPermissionsRequest, CreateManagerRequest, CreateTicketRequest, Document, Lease,
        LoginRequest, LoginResponse, MaintenanceTicket, ManagerAssignment, Payment,
        PaymentWebhookRequest, Property, PropertyKey, SessionStatus, SetAssignmentActiveRequest,
        Unit, UpdateLeaseRequest, UpdatePropertyRequest, UpdateUnitRequest, UserProfile,
    },
    payments::{self, PaymentStatus},
    realtime::{Room, events},
    repository::{find_account, find_account_by_email},
    roles::Role,
};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

// --- Filter Structs ---

/// UnitFilter
///
/// Optional narrowing for `GET /units`. Applied on top of the caller's scope, never instead of it.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct UnitFilter {
    pub property_id: Option<Uuid>,
}

// --- Helpers ---

/// Write predicate for `resource`, or 403 when the role may not write it at all.
fn write_scope(identity: &SessionIdentity, resource: ResourceKind) -> Result<AccessPredicate> {
    let predicate = identity.predicate(resource, Action::Write);
    if predicate.is_denied() {
        return Err(AppError::Forbidden);
    }
    Ok(predicate)
}

/// Managing assignments is an owner (or internal staff) operation, even though
/// managers hold write scope on the properties themselves.
fn require_assignment_admin(identity: &SessionIdentity) -> Result<()> {
    match identity.role() {
        Some(Role::Owner | Role::Admin | Role::SuperAdmin) => Ok(()),
        _ => Err(AppError::Forbidden),
    }
}

/// Reassigning tickets is staff work. Tenants hold write scope on tickets only
/// so they can open them.
fn require_ticket_staff(identity: &SessionIdentity) -> Result<()> {
    match identity.role() {
        Some(Role::Owner | Role::Manager | Role::Admin | Role::SuperAdmin) => Ok(()),
        _ => Err(AppError::Forbidden),
    }
}

/// Loads an assignment and checks the caller may write the property it belongs to.
async fn managed_assignment(
    state: &AppState,
    identity: &SessionIdentity,
    id: Uuid,
) -> Result<ManagerAssignment> {
    require_assignment_admin(identity)?;
    let predicate = write_scope(identity, ResourceKind::Property)?;

    let assignment = state.repo.find_assignment(id).await.ok_or(AppError::NotFound)?;
    state
        .repo
        .get_property(assignment.property_id, &predicate)
        .await
        .ok_or(AppError::NotFound)?;
    Ok(assignment)
}

fn notify_assignment(state: &AppState, assignment: &ManagerAssignment, event: &str) {
    state.hub.emit_to_rooms(
        [Room::User(assignment.manager_id), Room::Customer(assignment.customer_id)],
        event,
        assignment,
    );
}

// --- Session ---

/// login
///
/// [Public Route] Exchanges email and password for a signed session token.
/// Administrative accounts are matched before general users. A successful
/// login stamps `last_login`.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = LoginResponse),
        (status = 401, description = "Bad credentials or deactivated account")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let email = payload.email.trim().to_lowercase();
    let record = find_account_by_email(state.repo.as_ref(), &email)
        .await
        .map_err(|e| AppError::Unavailable(e.to_string()))?;

    let hash = record
        .as_ref()
        .map_or(dummy_password_hash(), |r| r.password_hash.as_str());
    let matched = verify_password(&payload.password, hash);
    let record = match record {
        Some(record) if matched => record,
        Some(record) => {
            tracing::debug!(account = %record.id, "password mismatch");
            return Err(AppError::Unauthorized);
        }
        None => return Err(AppError::Unauthorized),
    };
    if !record.is_active {
        return Err(AppError::AccountDeactivated);
    }

    state.repo.record_login(record.kind, record.id).await?;

    let identity = SessionIdentity::from_record(&record, Utc::now());
    let token = issue_token(&state.config, &identity)?;
    tracing::info!(account = %record.id, role = %identity.role, "login succeeded");

    Ok(Json(LoginResponse {
        token,
        user: identity.to_profile(),
    }))
}

/// get_session
///
/// [Authenticated Route] Strict session check. Unlike the per-request
/// freshness check, this fails closed: if the account cannot be read the
/// answer is 503, not a pass.
#[utoipa::path(
    get,
    path = "/auth/session",
    responses(
        (status = 200, description = "Session valid", body = SessionStatus),
        (status = 401, description = "Deactivated account or changed role"),
        (status = 503, description = "Account store unavailable")
    )
)]
pub async fn get_session(
    AuthUser { identity, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<SessionStatus>> {
    let record = find_account(state.repo.as_ref(), identity.subject_id)
        .await
        .map_err(|e| AppError::Unavailable(e.to_string()))?
        .ok_or(AppError::Unauthorized)?;

    validate_session(&identity, &record).into_result()?;

    Ok(Json(SessionStatus {
        valid: true,
        user: identity.to_profile(),
    }))
}

/// get_me
///
/// [Authenticated Route] The identity the presented token resolves to.
#[utoipa::path(
    get,
    path = "/me",
    responses((status = 200, description = "Profile", body = UserProfile))
)]
pub async fn get_me(AuthUser { identity, .. }: AuthUser) -> Json<UserProfile> {
    Json(identity.to_profile())
}

// --- Properties & Units ---

#[utoipa::path(
    get,
    path = "/properties",
    responses((status = 200, description = "Properties in scope", body = [Property]))
)]
pub async fn list_properties(
    AuthUser { identity, .. }: AuthUser,
    State(state): State<AppState>,
) -> Json<Vec<Property>> {
    let predicate = identity.predicate(ResourceKind::Property, Action::Read);
    Json(state.repo.list_properties(&predicate).await)
}

/// get_property
///
/// [Authenticated Route] A property outside the caller's scope is indistinguishable
/// from one that does not exist.
#[utoipa::path(
    get,
    path = "/properties/{id}",
    params(("id" = Uuid, Path, description = "Property ID")),
    responses(
        (status = 200, description = "Found", body = Property),
        (status = 404, description = "Not found or out of scope")
    )
)]
pub async fn get_property(
    AuthUser { identity, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Property>> {
    let predicate = identity.predicate(ResourceKind::Property, Action::Read);
    state
        .repo
        .get_property(id, &predicate)
        .await
        .map(Json)
        .ok_or(AppError::NotFound)
}

#[utoipa::path(
    put,
    path = "/properties/{id}",
    params(("id" = Uuid, Path, description = "Property ID")),
    request_body = UpdatePropertyRequest,
    responses(
        (status = 200, description = "Updated", body = Property),
        (status = 403, description = "Role may not edit properties"),
        (status = 404, description = "Not found or out of scope")
    )
)]
pub async fn update_property(
    AuthUser { identity, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePropertyRequest>,
) -> Result<Json<Property>> {
    let predicate = write_scope(&identity, ResourceKind::Property)?;
    let property = state
        .repo
        .update_property(id, &predicate, payload)
        .await
        .ok_or(AppError::NotFound)?;

    state
        .hub
        .emit_to_customer(property.customer_id, events::PROPERTY_UPDATED, &property);
    Ok(Json(property))
}

#[utoipa::path(
    get,
    path = "/units",
    params(UnitFilter),
    responses((status = 200, description = "Units in scope", body = [Unit]))
)]
pub async fn list_units(
    AuthUser { identity, .. }: AuthUser,
    State(state): State<AppState>,
    Query(filter): Query<UnitFilter>,
) -> Json<Vec<Unit>> {
    let predicate = identity.predicate(ResourceKind::Unit, Action::Read);
    Json(state.repo.list_units(&predicate, filter.property_id).await)
}

#[utoipa::path(
    put,
    path = "/units/{id}",
    params(("id" = Uuid, Path, description = "Unit ID")),
    request_body = UpdateUnitRequest,
    responses(
        (status = 200, description = "Updated", body = Unit),
        (status = 403, description = "Role may not edit units"),
        (status = 404, description = "Not found or out of scope")
    )
)]
pub async fn update_unit(
    AuthUser { identity, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUnitRequest>,
) -> Result<Json<Unit>> {
    if payload.rent_cents.is_some_and(|rent| rent < 0) {
        return Err(AppError::BadRequest("rent_cents must not be negative".into()));
    }
    let predicate = write_scope(&identity, ResourceKind::Unit)?;
    let unit = state
        .repo
        .update_unit(id, &predicate, payload)
        .await
        .ok_or(AppError::NotFound)?;

    state.hub.emit_to_customer(unit.customer_id, events::UNIT_UPDATED, &unit);
    Ok(Json(unit))
}

// --- Leases, Documents, Payments, Keys ---

#[utoipa::path(
    get,
    path = "/leases",
    responses((status = 200, description = "Leases in scope", body = [Lease]))
)]
pub async fn list_leases(
    AuthUser { identity, .. }: AuthUser,
    State(state): State<AppState>,
) -> Json<Vec<Lease>> {
    let predicate = identity.predicate(ResourceKind::Lease, Action::Read);
    Json(state.repo.list_leases(&predicate).await)
}

/// update_lease
///
/// [Authenticated Route] Changes a lease's status. Managers need the
/// `can_manage_leases` toggle on their assignment; without it the lease is
/// simply outside their write scope.
#[utoipa::path(
    put,
    path = "/leases/{id}",
    params(("id" = Uuid, Path, description = "Lease ID")),
    request_body = UpdateLeaseRequest,
    responses(
        (status = 200, description = "Updated", body = Lease),
        (status = 400, description = "Unknown status"),
        (status = 403, description = "Role may not edit leases"),
        (status = 404, description = "Not found or out of scope")
    )
)]
pub async fn update_lease(
    AuthUser { identity, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLeaseRequest>,
) -> Result<Json<Lease>> {
    let status = payload.status.trim().to_ascii_lowercase();
    if !Lease::STATUSES.contains(&status.as_str()) {
        return Err(AppError::BadRequest(format!("unknown lease status `{}`", payload.status)));
    }

    let predicate = write_scope(&identity, ResourceKind::Lease)?;
    let lease = state
        .repo
        .update_lease_status(id, &predicate, &status)
        .await
        .ok_or(AppError::NotFound)?;

    state.hub.emit_to_rooms(
        [Room::Customer(lease.customer_id), Room::User(lease.tenant_id)],
        events::LEASE_UPDATED,
        &lease,
    );
    Ok(Json(lease))
}

#[utoipa::path(
    get,
    path = "/documents",
    responses((status = 200, description = "Documents in scope", body = [Document]))
)]
pub async fn list_documents(
    AuthUser { identity, .. }: AuthUser,
    State(state): State<AppState>,
) -> Json<Vec<Document>> {
    let predicate = identity.predicate(ResourceKind::Document, Action::Read);
    Json(state.repo.list_documents(&predicate).await)
}

/// list_payments
///
/// [Authenticated Route] Managers only see payments for properties where their
/// assignment carries `can_view_financials`.
#[utoipa::path(
    get,
    path = "/payments",
    responses((status = 200, description = "Payments in scope", body = [Payment]))
)]
pub async fn list_payments(
    AuthUser { identity, .. }: AuthUser,
    State(state): State<AppState>,
) -> Json<Vec<Payment>> {
    let predicate = identity.predicate(ResourceKind::Payment, Action::Read);
    Json(state.repo.list_payments(&predicate).await)
}

#[utoipa::path(
    get,
    path = "/keys",
    responses((status = 200, description = "Keys in scope", body = [PropertyKey]))
)]
pub async fn list_keys(
    AuthUser { identity, .. }: AuthUser,
    State(state): State<AppState>,
) -> Json<Vec<PropertyKey>> {
    let predicate = identity.predicate(ResourceKind::Key, Action::Read);
    Json(state.repo.list_keys(&predicate).await)
}

// --- Maintenance ---

#[utoipa::path(
    get,
    path = "/maintenance",
    responses((status = 200, description = "Tickets in scope", body = [MaintenanceTicket]))
)]
pub async fn list_maintenance(
    AuthUser { identity, .. }: AuthUser,
    State(state): State<AppState>,
) -> Json<Vec<MaintenanceTicket>> {
    let predicate = identity.predicate(ResourceKind::MaintenanceTicket, Action::Read);
    Json(state.repo.list_maintenance_tickets(&predicate).await)
}

/// create_maintenance
///
/// [Authenticated Route] Opens a ticket against a property the caller can see.
/// The ticket inherits the property's customer; the caller is recorded as reporter.
#[utoipa::path(
    post,
    path = "/maintenance",
    request_body = CreateTicketRequest,
    responses(
        (status = 201, description = "Created", body = MaintenanceTicket),
        (status = 400, description = "Invalid ticket"),
        (status = 403, description = "Role may not open tickets"),
        (status = 404, description = "Property or unit not found or out of scope")
    )
)]
pub async fn create_maintenance(
    AuthUser { identity, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateTicketRequest>,
) -> Result<(StatusCode, Json<MaintenanceTicket>)> {
    write_scope(&identity, ResourceKind::MaintenanceTicket)?;

    let title = payload.title.trim();
    if title.is_empty() {
        return Err(AppError::BadRequest("title is required".into()));
    }

    let property = state
        .repo
        .get_property(
            payload.property_id,
            &identity.predicate(ResourceKind::Property, Action::Read),
        )
        .await
        .ok_or(AppError::NotFound)?;

    if let Some(unit_id) = payload.unit_id {
        let units = state
            .repo
            .list_units(&identity.predicate(ResourceKind::Unit, Action::Read), Some(property.id))
            .await;
        if !units.iter().any(|u| u.id == unit_id) {
            return Err(AppError::NotFound);
        }
    }

    let ticket = MaintenanceTicket {
        id: Uuid::new_v4(),
        customer_id: property.customer_id,
        property_id: property.id,
        unit_id: payload.unit_id,
        reported_by: identity.subject_id,
        assigned_to: None,
        title: title.to_string(),
        status: MaintenanceTicket::OPEN.to_string(),
        ..Default::default()
    };
    let created = state.repo.create_maintenance_ticket(ticket).await?;

    state
        .hub
        .emit_to_customer(created.customer_id, events::MAINTENANCE_CREATED, &created);
    Ok((StatusCode::CREATED, Json(created)))
}

/// assign_maintenance
///
/// [Authenticated Route] Hands a ticket to an owner or manager of the ticket's
/// own customer, or clears the assignee. The assignee is notified in their user room.
#[utoipa::path(
    put,
    path = "/maintenance/{id}/assign",
    params(("id" = Uuid, Path, description = "Ticket ID")),
    request_body = AssignTicketRequest,
    responses(
        (status = 200, description = "Reassigned", body = MaintenanceTicket),
        (status = 400, description = "Assignee is not active staff of the ticket's customer"),
        (status = 403, description = "Role may not reassign tickets"),
        (status = 404, description = "Not found or out of scope")
    )
)]
pub async fn assign_maintenance(
    AuthUser { identity, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignTicketRequest>,
) -> Result<Json<MaintenanceTicket>> {
    require_ticket_staff(&identity)?;
    let predicate = write_scope(&identity, ResourceKind::MaintenanceTicket)?;
    let current = state
        .repo
        .get_maintenance_ticket(id, &predicate)
        .await
        .ok_or(AppError::NotFound)?;

    if let Some(assignee) = payload.assigned_to {
        let account = find_account(state.repo.as_ref(), assignee)
            .await
            .map_err(|e| AppError::Unavailable(e.to_string()))?;
        let eligible = account.is_some_and(|a| {
            a.is_active
                && a.customer_id == Some(current.customer_id)
                && matches!(Role::canonicalize(&a.role), Some(Role::Owner | Role::Manager))
        });
        if !eligible {
            return Err(AppError::BadRequest(
                "assignee must be an active owner or manager of this customer".into(),
            ));
        }
    }

    let ticket = state
        .repo
        .assign_maintenance_ticket(id, &predicate, payload.assigned_to)
        .await
        .ok_or(AppError::NotFound)?;

    let mut rooms = vec![Room::Customer(ticket.customer_id)];
    rooms.extend(ticket.assigned_to.map(Room::User));
    state
        .hub
        .emit_to_rooms(rooms, events::MAINTENANCE_REASSIGNED, &ticket);
    Ok(Json(ticket))
}

// --- Managers & Assignments ---

/// create_manager
///
/// [Authenticated Route] An owner adds a manager account to their own customer.
#[utoipa::path(
    post,
    path = "/managers",
    request_body = CreateManagerRequest,
    responses(
        (status = 201, description = "Created", body = UserProfile),
        (status = 403, description = "Only owners create managers"),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn create_manager(
    AuthUser { identity, .. }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateManagerRequest>,
) -> Result<(StatusCode, Json<UserProfile>)> {
    let customer_id = match (identity.role(), identity.customer_id) {
        (Some(Role::Owner), Some(customer_id)) => customer_id,
        _ => return Err(AppError::Forbidden),
    };

    let email = payload.email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(AppError::BadRequest("a valid email is required".into()));
    }
    if payload.password.len() < 8 {
        return Err(AppError::BadRequest("password must be at least 8 characters".into()));
    }

    let password_hash = hash_password(&payload.password)?;
    let manager = state
        .repo
        .create_manager(customer_id, &email, &password_hash)
        .await?;
    tracing::info!(manager = %manager.id, customer = %customer_id, "manager account created");

    Ok((
        StatusCode::CREATED,
        Json(UserProfile {
            id: manager.id,
            email: manager.email,
            role: manager.role,
            customer_id: manager.customer_id,
        }),
    ))
}

/// assign_manager
///
/// [Authenticated Route] Grants a manager access to a property. Assigning an
/// already-assigned manager reactivates the assignment with the new toggles.
#[utoipa::path(
    post,
    path = "/properties/{id}/managers",
    params(("id" = Uuid, Path, description = "Property ID")),
    request_body = AssignManagerRequest,
    responses(
        (status = 201, description = "Assigned", body = ManagerAssignment),
        (status = 400, description = "Not a manager of this customer"),
        (status = 403, description = "Only owners manage assignments"),
        (status = 404, description = "Property not found or out of scope")
    )
)]
pub async fn assign_manager(
    AuthUser { identity, .. }: AuthUser,
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
    Json(payload): Json<AssignManagerRequest>,
) -> Result<(StatusCode, Json<ManagerAssignment>)> {
    require_assignment_admin(&identity)?;
    let predicate = write_scope(&identity, ResourceKind::Property)?;
    let property = state
        .repo
        .get_property(property_id, &predicate)
        .await
        .ok_or(AppError::NotFound)?;

    let manager = find_account(state.repo.as_ref(), payload.manager_id)
        .await
        .map_err(|e| AppError::Unavailable(e.to_string()))?;
    let eligible = manager.is_some_and(|m| {
        Role::canonicalize(&m.role) == Some(Role::Manager)
            && m.customer_id == Some(property.customer_id)
    });
    if !eligible {
        return Err(AppError::BadRequest("not a manager of this customer".into()));
    }

    let assignment = state
        .repo
        .upsert_assignment(ManagerAssignment {
            id: Uuid::new_v4(),
            customer_id: property.customer_id,
            property_id: property.id,
            manager_id: payload.manager_id,
            is_active: true,
            can_view_financials: payload.can_view_financials,
            can_manage_leases: payload.can_manage_leases,
            ..Default::default()
        })
        .await?;

    notify_assignment(&state, &assignment, events::MANAGER_ASSIGNED);
    Ok((StatusCode::CREATED, Json(assignment)))
}

/// set_assignment_active
///
/// [Authenticated Route] Deactivating an assignment removes the manager's
/// access to the property on their very next request.
#[utoipa::path(
    put,
    path = "/assignments/{id}/active",
    params(("id" = Uuid, Path, description = "Assignment ID")),
    request_body = SetAssignmentActiveRequest,
    responses(
        (status = 200, description = "Updated", body = ManagerAssignment),
        (status = 403, description = "Only owners manage assignments"),
        (status = 404, description = "Not found or out of scope")
    )
)]
pub async fn set_assignment_active(
    AuthUser { identity, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetAssignmentActiveRequest>,
) -> Result<Json<ManagerAssignment>> {
    managed_assignment(&state, &identity, id).await?;
    let assignment = state
        .repo
        .set_assignment_active(id, payload.is_active)
        .await
        .ok_or(AppError::NotFound)?;

    notify_assignment(&state, &assignment, events::MANAGER_ASSIGNMENT_CHANGED);
    Ok(Json(assignment))
}

#[utoipa::path(
    put,
    path = "/assignments/{id}/permissions",
    params(("id" = Uuid, Path, description = "Assignment ID")),
    request_body = AssignmentPermissionsRequest,
    responses(
        (status = 200, description = "Updated", body = ManagerAssignment),
        (status = 403, description = "Only owners manage assignments"),
        (status = 404, description = "Not found or out of scope")
    )
)]
pub async fn update_assignment_permissions(
    AuthUser { identity, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignmentPermissionsRequest>,
) -> Result<Json<ManagerAssignment>> {
    managed_assignment(&state, &identity, id).await?;
    let assignment = state
        .repo
        .update_assignment_permissions(id, payload)
        .await
        .ok_or(AppError::NotFound)?;

    notify_assignment(&state, &assignment, events::MANAGER_PERMISSIONS_UPDATED);
    Ok(Json(assignment))
}

// --- Webhooks ---

/// payment_webhook
///
/// [Public Route] Payment provider callback. The signature is checked over the
/// raw body before anything is parsed.
#[utoipa::path(
    post,
    path = "/webhooks/payments",
    request_body = PaymentWebhookRequest,
    responses(
        (status = 200, description = "Applied", body = Payment),
        (status = 400, description = "Malformed body or unknown status"),
        (status = 401, description = "Bad signature"),
        (status = 404, description = "Unknown payment reference")
    )
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Payment>> {
    let signature = headers
        .get(payments::SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::Unauthorized)?;
    if !payments::verify_signature(&state.config.payment_webhook_secret, &body, signature) {
        tracing::warn!("payment webhook with bad signature");
        return Err(AppError::Unauthorized);
    }

    let payload: PaymentWebhookRequest =
        serde_json::from_slice(&body).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let status = PaymentStatus::parse(&payload.status)
        .ok_or_else(|| {
            AppError::BadRequest(format!("unknown payment status `{}`", payload.status))
        })?;

    let payment = state
        .repo
        .apply_payment_status(&payload.reference, status.as_str())
        .await?
        .ok_or(AppError::NotFound)?;
    tracing::info!(payment = %payment.id, %status, "payment status applied");

    let event = match status {
        PaymentStatus::Succeeded => Some(events::PAYMENT_SUCCEEDED),
        PaymentStatus::Failed => Some(events::PAYMENT_FAILED),
        PaymentStatus::Pending => None,
    };
    if let Some(event) = event {
        state.hub.emit_to_rooms(
            [Room::Customer(payment.customer_id), Room::User(payment.tenant_id)],
            event,
            &payment,
        );
    }

    Ok(Json(payment))
}

// --- Admin ---

/// get_admin_stats
///
/// [Admin Route] Platform-wide counts. Internal staff only.
#[utoipa::path(
    get,
    path = "/admin/stats",
    responses(
        (status = 200, description = "Stats", body = AdminDashboardStats),
        (status = 403, description = "Not internal staff")
    )
)]
pub async fn get_admin_stats(
    AuthUser { identity, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<AdminDashboardStats>> {
    if !identity.is_internal() {
        return Err(AppError::Forbidden);
    }
    Ok(Json(state.repo.get_stats().await))
}
