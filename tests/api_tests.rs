use chrono::{NaiveDate, TimeDelta, Utc};
use futures::{SinkExt, StreamExt};
use property_portal::{
    AppConfig, AppState, InMemoryRepository, RealtimeHub, create_router,
    auth::SessionIdentity,
    config::Env,
    errors::{ACCOUNT_DEACTIVATED, REAUTH_REQUIRED, ROLE_CHANGED},
    models::{
        AccountRecord, AdminDashboardStats, Lease, LoginResponse, MaintenanceTicket,
        ManagerAssignment, Payment, Property, Unit, UserProfile,
    },
    payments,
    realtime::{Connection, events},
    repository::RepositoryState,
};
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{self, Message, client::IntoClientRequest, http::HeaderValue},
};
use uuid::Uuid;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const PASSWORD: &str = "correct horse battery";

pub struct TestApp {
    pub address: String,
    pub repo: Arc<InMemoryRepository>,
    pub hub: RealtimeHub,
    pub config: AppConfig,
    pub client: reqwest::Client,
}

/// One customer with an owner, a property with one unit, and a tenant holding
/// an active lease on that unit.
pub struct Seed {
    pub customer_id: Uuid,
    pub owner: AccountRecord,
    pub tenant: AccountRecord,
    pub property: Property,
    pub unit: Unit,
    pub lease: Lease,
}

async fn spawn_app() -> TestApp {
    let repo = Arc::new(InMemoryRepository::new());
    let hub = RealtimeHub::new();
    hub.init(None, Duration::from_millis(100)).await;

    let mut config = AppConfig::default();
    config.env = Env::Production;

    let state = AppState {
        repo: repo.clone() as RepositoryState,
        hub: hub.clone(),
        config: config.clone(),
    };
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp {
        address,
        repo,
        hub,
        config,
        client: reqwest::Client::new(),
    }
}

fn account(role: &str, email: &str, customer_id: Option<Uuid>) -> AccountRecord {
    AccountRecord {
        id: Uuid::new_v4(),
        email: email.to_string(),
        role: role.to_string(),
        customer_id,
        is_active: true,
        updated_at: Utc::now() - chrono::TimeDelta::days(1),
        // Low cost keeps the suite fast; verification reads the cost from the hash.
        password_hash: bcrypt::hash(PASSWORD, 4).unwrap(),
        ..Default::default()
    }
}

fn seed(app: &TestApp, tag: &str) -> Seed {
    let customer_id = Uuid::new_v4();
    let owner = account("property_owner", &format!("owner-{tag}@example.com"), Some(customer_id));
    let tenant = account("tenant", &format!("tenant-{tag}@example.com"), Some(customer_id));

    let property = Property {
        id: Uuid::new_v4(),
        customer_id,
        owner_id: owner.id,
        name: "Harbour View".into(),
        address: "1 Quay Street".into(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    let unit = Unit {
        id: Uuid::new_v4(),
        customer_id,
        property_id: property.id,
        label: "1A".into(),
        rent_cents: 95_000,
    };
    let lease = Lease {
        id: Uuid::new_v4(),
        customer_id,
        property_id: property.id,
        unit_id: unit.id,
        tenant_id: tenant.id,
        status: Lease::ACTIVE.into(),
        starts_on: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        ends_on: None,
    };

    app.repo.insert_account(owner.clone());
    app.repo.insert_account(tenant.clone());
    app.repo.insert_property(property.clone());
    app.repo.insert_unit(unit.clone());
    app.repo.insert_lease(lease.clone());

    Seed {
        customer_id,
        owner,
        tenant,
        property,
        unit,
        lease,
    }
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    async fn login(&self, email: &str) -> String {
        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(&json!({ "email": email, "password": PASSWORD }))
            .send()
            .await
            .expect("login request failed");
        assert_eq!(response.status(), 200, "login as {email}");
        response.json::<LoginResponse>().await.unwrap().token
    }

    async fn get(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("get failed")
    }

    async fn send_json(
        &self,
        method: reqwest::Method,
        path: &str,
        token: &str,
        body: Value,
    ) -> reqwest::Response {
        self.client
            .request(method, self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("request failed")
    }

    fn ws_url(&self, query: &str) -> String {
        format!("{}/ws{}", self.address.replacen("http", "ws", 1), query)
    }

    /// Opens a WebSocket over the wire with the token in the query string.
    async fn open_socket(&self, token: &str) -> Socket {
        let (socket, response) = connect_async(self.ws_url(&format!("?token={token}")))
            .await
            .expect("socket handshake failed");
        assert_eq!(response.status(), 101);
        socket
    }

    /// Registers a hub connection for the account behind `token` without a
    /// socket, for tests that only care which events arrive.
    async fn connect(&self, token: &str) -> Connection {
        let profile: UserProfile = self.get("/me", token).await.json().await.unwrap();
        let identity = SessionIdentity {
            subject_id: profile.id,
            email: profile.email,
            role: profile.role,
            customer_id: profile.customer_id,
            issued_at: Utc::now(),
        };
        self.hub.join(&identity).unwrap()
    }
}

/// Next JSON text frame, skipping control frames.
async fn next_frame(socket: &mut Socket) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("no frame within 2s")
            .expect("socket closed")
            .expect("socket error");
        if message.is_text() {
            return serde_json::from_str(message.to_text().unwrap()).unwrap();
        }
    }
}

async fn assert_silent(socket: &mut Socket) {
    let next = tokio::time::timeout(Duration::from_millis(200), socket.next()).await;
    assert!(next.is_err(), "unexpected frame: {next:?}");
}

async fn wait_for_connections(hub: &RealtimeHub, expected: usize) {
    for _ in 0..40 {
        if hub.connection_count() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(hub.connection_count(), expected);
}

async fn drain(connection: &mut Connection) -> Vec<String> {
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut seen = Vec::new();
    while let Some(event) = connection.try_recv() {
        seen.push(event.event.clone());
    }
    seen
}

// --- Public Surface ---

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let response = app.client.get(app.url("/health")).send().await.expect("req fail");
    assert!(response.status().is_success());
}

#[tokio::test]
async fn test_login_matches_email_case_insensitively() {
    let app = spawn_app().await;
    let s = seed(&app, "login");

    let response = app
        .client
        .post(app.url("/auth/login"))
        .json(&json!({ "email": "  OWNER-login@Example.com ", "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: LoginResponse = response.json().await.unwrap();
    assert_eq!(body.user.id, s.owner.id);
    // Stored synonyms are returned canonicalized.
    assert_eq!(body.user.role, "owner");
    assert_eq!(body.user.customer_id, Some(s.customer_id));
}

#[tokio::test]
async fn test_login_rejections() {
    let app = spawn_app().await;
    let s = seed(&app, "reject");

    let wrong = app
        .client
        .post(app.url("/auth/login"))
        .json(&json!({ "email": s.owner.email, "password": "nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), 401);

    let unknown = app
        .client
        .post(app.url("/auth/login"))
        .json(&json!({ "email": "nobody@example.com", "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), 401);

    app.repo.modify_account(s.tenant.id, Utc::now(), |r| r.is_active = false);
    let deactivated = app
        .client
        .post(app.url("/auth/login"))
        .json(&json!({ "email": s.tenant.email, "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(deactivated.status(), 401);
    let body: Value = deactivated.json().await.unwrap();
    assert_eq!(body["code"], ACCOUNT_DEACTIVATED);
}

#[tokio::test]
async fn test_protected_routes_require_a_token() {
    let app = spawn_app().await;
    let response = app.client.get(app.url("/properties")).send().await.unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_session_endpoint_reports_role_change() {
    let app = spawn_app().await;
    let s = seed(&app, "session");
    let token = app.login(&s.tenant.email).await;

    let ok = app.get("/auth/session", &token).await;
    assert_eq!(ok.status(), 200);
    assert_eq!(ok.json::<Value>().await.unwrap()["valid"], true);

    // Changed inside the freshness grace window, so only the strict check notices.
    app.repo.modify_account(s.tenant.id, Utc::now(), |r| r.role = "owner".into());
    let changed = app.get("/auth/session", &token).await;
    assert_eq!(changed.status(), 401);
    assert_eq!(changed.json::<Value>().await.unwrap()["code"], ROLE_CHANGED);
}

// --- Real-time Handshake ---

#[tokio::test]
async fn test_socket_handshake_rejects_missing_and_bad_tokens() {
    let app = spawn_app().await;
    let s = seed(&app, "socket");

    let missing = app.client.get(app.url("/ws")).send().await.unwrap();
    assert_eq!(missing.status(), 401);

    let forged = app.client.get(app.url("/ws?token=not-a-jwt")).send().await.unwrap();
    assert_eq!(forged.status(), 401);

    assert_eq!(app.hub.connection_count(), 0);

    // Nothing leaks to a rejected handshake; there is no connection to deliver to.
    let mut owner = app.connect(&app.login(&s.owner.email).await).await;
    app.hub.emit_to_customer(s.customer_id, events::PROPERTY_UPDATED, json!({}));
    assert_eq!(app.hub.connection_count(), 1);
    assert_eq!(drain(&mut owner).await, vec![events::PROPERTY_UPDATED.to_string()]);
}

#[tokio::test]
async fn test_socket_delivers_events_and_answers_ping() {
    let app = spawn_app().await;
    let s = seed(&app, "wire");
    let token = app.login(&s.owner.email).await;

    let mut socket = app.open_socket(&token).await;
    assert_eq!(app.hub.connection_count(), 1);

    let updated = app
        .send_json(
            reqwest::Method::PUT,
            &format!("/properties/{}", s.property.id),
            &token,
            json!({ "name": "Harbour View South" }),
        )
        .await;
    assert_eq!(updated.status(), 200);

    let frame = next_frame(&mut socket).await;
    assert_eq!(frame["type"], "event");
    assert_eq!(frame["event"], events::PROPERTY_UPDATED);
    assert_eq!(frame["payload"]["name"], "Harbour View South");

    socket.send(Message::text(r#"{"type":"ping"}"#)).await.unwrap();
    let pong = next_frame(&mut socket).await;
    assert_eq!(pong["type"], "pong");
    assert!(pong["ts"].is_i64());

    // Unknown client frames are ignored.
    socket.send(Message::text(r#"{"type":"subscribe","room":"admins"}"#)).await.unwrap();
    assert_silent(&mut socket).await;

    socket.close(None).await.unwrap();
    wait_for_connections(&app.hub, 0).await;
}

#[tokio::test]
async fn test_socket_accepts_bearer_header() {
    let app = spawn_app().await;
    let s = seed(&app, "header");
    let token = app.login(&s.tenant.email).await;

    let mut request = app.ws_url("").into_client_request().unwrap();
    request.headers_mut().insert(
        "authorization",
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    );
    let (mut socket, response) = connect_async(request).await.expect("socket handshake failed");
    assert_eq!(response.status(), 101);
    assert_eq!(app.hub.connection_count(), 1);

    app.hub.emit_to_user(s.tenant.id, events::PAYMENT_SUCCEEDED, json!({ "amount_cents": 1 }));
    assert_eq!(next_frame(&mut socket).await["event"], events::PAYMENT_SUCCEEDED);
}

#[tokio::test]
async fn test_socket_rejects_stale_token() {
    let app = spawn_app().await;
    let s = seed(&app, "stale");
    let token = app.login(&s.tenant.email).await;

    // The account changed well after the token was issued.
    app.repo
        .modify_account(s.tenant.id, Utc::now() + TimeDelta::minutes(2), |r| {
            r.role = "owner".into()
        });

    match connect_async(app.ws_url(&format!("?token={token}"))).await {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 401),
        Err(e) => panic!("unexpected handshake error: {e}"),
        Ok(_) => panic!("stale token was upgraded"),
    }
    assert_eq!(app.hub.connection_count(), 0);

    let plain = app
        .client
        .get(app.url(&format!("/ws?token={token}")))
        .send()
        .await
        .unwrap();
    assert_eq!(plain.status(), 401);
    assert_eq!(plain.json::<Value>().await.unwrap()["code"], REAUTH_REQUIRED);
}

// --- Scoping ---

#[tokio::test]
async fn test_tenant_writes_are_forbidden() {
    let app = spawn_app().await;
    let s = seed(&app, "tenantwrite");
    let token = app.login(&s.tenant.email).await;

    let response = app
        .send_json(
            reqwest::Method::PUT,
            &format!("/properties/{}", s.property.id),
            &token,
            json!({ "name": "Mine now" }),
        )
        .await;
    assert_eq!(response.status(), 403);

    let lease = app
        .send_json(
            reqwest::Method::PUT,
            &format!("/leases/{}", s.lease.id),
            &token,
            json!({ "status": "ended" }),
        )
        .await;
    assert_eq!(lease.status(), 403);
}

#[tokio::test]
async fn test_other_customers_property_is_not_found() {
    let app = spawn_app().await;
    let mine = seed(&app, "mine");
    let theirs = seed(&app, "theirs");
    let token = app.login(&mine.owner.email).await;

    let read = app.get(&format!("/properties/{}", theirs.property.id), &token).await;
    assert_eq!(read.status(), 404);

    let write = app
        .send_json(
            reqwest::Method::PUT,
            &format!("/properties/{}", theirs.property.id),
            &token,
            json!({ "name": "Annexed" }),
        )
        .await;
    assert_eq!(write.status(), 404);

    let listed: Vec<Property> = app.get("/properties", &token).await.json().await.unwrap();
    assert_eq!(listed.iter().map(|p| p.id).collect::<Vec<_>>(), vec![mine.property.id]);
}

#[tokio::test]
async fn test_unknown_role_lists_are_empty_not_errors() {
    let app = spawn_app().await;
    let s = seed(&app, "unknown");
    let stranger = account("janitor", "janitor@example.com", Some(s.customer_id));
    app.repo.insert_account(stranger.clone());
    let token = app.login(&stranger.email).await;

    let lists = [
        "/properties",
        "/units",
        "/leases",
        "/documents",
        "/payments",
        "/keys",
        "/maintenance",
    ];
    for path in lists {
        let response = app.get(path, &token).await;
        assert_eq!(response.status(), 200, "{path}");
        assert_eq!(response.json::<Value>().await.unwrap(), json!([]), "{path}");
    }
}

#[tokio::test]
async fn test_tenant_opens_ticket_on_leased_unit() {
    let app = spawn_app().await;
    let s = seed(&app, "ticket");
    let tenant_token = app.login(&s.tenant.email).await;
    let mut owner = app.connect(&app.login(&s.owner.email).await).await;

    let response = app
        .send_json(
            reqwest::Method::POST,
            "/maintenance",
            &tenant_token,
            json!({ "property_id": s.property.id, "unit_id": s.unit.id, "title": "Boiler out" }),
        )
        .await;
    assert_eq!(response.status(), 201);
    let ticket: MaintenanceTicket = response.json().await.unwrap();
    assert_eq!(ticket.reported_by, s.tenant.id);
    assert_eq!(ticket.customer_id, s.customer_id);

    assert_eq!(drain(&mut owner).await, vec![events::MAINTENANCE_CREATED.to_string()]);

    let blank = app
        .send_json(
            reqwest::Method::POST,
            "/maintenance",
            &tenant_token,
            json!({ "property_id": s.property.id, "title": "   " }),
        )
        .await;
    assert_eq!(blank.status(), 400);
}

#[tokio::test]
async fn test_ticket_reassignment_stays_inside_the_customer() {
    let app = spawn_app().await;
    let mine = seed(&app, "reassign-mine");
    let theirs = seed(&app, "reassign-theirs");
    let manager = account("manager", "reassign-manager@example.com", Some(mine.customer_id));
    app.repo.insert_account(manager.clone());

    let tenant_token = app.login(&mine.tenant.email).await;
    let owner_token = app.login(&mine.owner.email).await;
    let ticket: MaintenanceTicket = app
        .send_json(
            reqwest::Method::POST,
            "/maintenance",
            &tenant_token,
            json!({ "property_id": mine.property.id, "title": "Boiler" }),
        )
        .await
        .json()
        .await
        .unwrap();
    let assign_path = format!("/maintenance/{}/assign", ticket.id);

    let mut outsider = app.open_socket(&app.login(&theirs.owner.email).await).await;
    let foreign = app
        .send_json(
            reqwest::Method::PUT,
            &assign_path,
            &owner_token,
            json!({ "assigned_to": theirs.owner.id }),
        )
        .await;
    assert_eq!(foreign.status(), 400);
    assert_silent(&mut outsider).await;

    let by_tenant = app
        .send_json(
            reqwest::Method::PUT,
            &assign_path,
            &tenant_token,
            json!({ "assigned_to": mine.owner.id }),
        )
        .await;
    assert_eq!(by_tenant.status(), 403);

    let mut assignee = app.open_socket(&app.login(&manager.email).await).await;
    let assigned = app
        .send_json(
            reqwest::Method::PUT,
            &assign_path,
            &owner_token,
            json!({ "assigned_to": manager.id }),
        )
        .await;
    assert_eq!(assigned.status(), 200);
    assert_eq!(assigned.json::<MaintenanceTicket>().await.unwrap().assigned_to, Some(manager.id));

    // User room and customer room overlap; one frame.
    assert_eq!(next_frame(&mut assignee).await["event"], events::MAINTENANCE_REASSIGNED);
    assert_silent(&mut assignee).await;
    assert_silent(&mut outsider).await;
}

#[tokio::test]
async fn test_admin_stats_are_staff_only() {
    let app = spawn_app().await;
    let s = seed(&app, "stats");
    let admin = account("admin", "ops@example.com", None);
    app.repo.insert_account(admin.clone());

    let owner_token = app.login(&s.owner.email).await;
    assert_eq!(app.get("/admin/stats", &owner_token).await.status(), 403);

    let admin_token = app.login(&admin.email).await;
    let response = app.get("/admin/stats", &admin_token).await;
    assert_eq!(response.status(), 200);
    let stats: AdminDashboardStats = response.json().await.unwrap();
    assert_eq!(stats.total_properties, 1);
    assert_eq!(stats.active_leases, 1);
}

// --- Payments Webhook ---

#[tokio::test]
async fn test_payment_webhook_requires_signature_and_notifies_tenant() {
    let app = spawn_app().await;
    let s = seed(&app, "webhook");
    app.repo.insert_payment(Payment {
        id: Uuid::new_v4(),
        customer_id: s.customer_id,
        property_id: s.property.id,
        lease_id: s.lease.id,
        tenant_id: s.tenant.id,
        amount_cents: 95_000,
        status: "pending".into(),
        provider_reference: "pi_webhook_1".into(),
        updated_at: Utc::now(),
    });
    let mut tenant = app.connect(&app.login(&s.tenant.email).await).await;

    let body = r#"{"reference":"pi_webhook_1","status":"succeeded"}"#;

    let unsigned = app
        .client
        .post(app.url("/webhooks/payments"))
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(unsigned.status(), 401);

    let forged = app
        .client
        .post(app.url("/webhooks/payments"))
        .header(payments::SIGNATURE_HEADER, payments::sign("wrong-secret", body.as_bytes()))
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(forged.status(), 401);
    assert!(drain(&mut tenant).await.is_empty());

    let signed = app
        .client
        .post(app.url("/webhooks/payments"))
        .header(
            payments::SIGNATURE_HEADER,
            payments::sign(&app.config.payment_webhook_secret, body.as_bytes()),
        )
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(signed.status(), 200);
    let payment: Payment = signed.json().await.unwrap();
    assert_eq!(payment.status, "succeeded");

    // Customer room and the tenant's own room overlap; one delivery.
    assert_eq!(drain(&mut tenant).await, vec![events::PAYMENT_SUCCEEDED.to_string()]);

    let unknown = r#"{"reference":"pi_missing","status":"failed"}"#;
    let response = app
        .client
        .post(app.url("/webhooks/payments"))
        .header(
            payments::SIGNATURE_HEADER,
            payments::sign(&app.config.payment_webhook_secret, unknown.as_bytes()),
        )
        .body(unknown)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

// --- Manager Lifecycle ---

#[tokio::test]
async fn test_manager_assignment_lifecycle() {
    let app = spawn_app().await;
    let s = seed(&app, "lifecycle");
    let owner_token = app.login(&s.owner.email).await;

    // Owner creates the manager account.
    let created = app
        .send_json(
            reqwest::Method::POST,
            "/managers",
            &owner_token,
            json!({ "email": "Manager-Lifecycle@Example.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(created.status(), 201);
    let manager: UserProfile = created.json().await.unwrap();
    assert_eq!(manager.email, "manager-lifecycle@example.com");
    assert_eq!(manager.customer_id, Some(s.customer_id));

    let duplicate = app
        .send_json(
            reqwest::Method::POST,
            "/managers",
            &owner_token,
            json!({ "email": "manager-lifecycle@example.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(duplicate.status(), 409);

    // ...assigns them to the property.
    let assigned = app
        .send_json(
            reqwest::Method::POST,
            &format!("/properties/{}/managers", s.property.id),
            &owner_token,
            json!({ "manager_id": manager.id }),
        )
        .await;
    assert_eq!(assigned.status(), 201);
    let assignment: ManagerAssignment = assigned.json().await.unwrap();
    assert!(assignment.is_active);

    // The manager signs in and connects.
    let manager_token = app.login(&manager.email).await;
    let mut socket = app.connect(&manager_token).await;

    let units: Vec<Unit> = app.get("/units", &manager_token).await.json().await.unwrap();
    assert_eq!(units.iter().map(|u| u.id).collect::<Vec<_>>(), vec![s.unit.id]);
    let payments: Vec<Payment> = app.get("/payments", &manager_token).await.json().await.unwrap();
    assert!(payments.is_empty(), "financials are off by default");

    // Managers cannot manage assignments themselves.
    let self_service = app
        .send_json(
            reqwest::Method::PUT,
            &format!("/assignments/{}/active", assignment.id),
            &manager_token,
            json!({ "is_active": true }),
        )
        .await;
    assert_eq!(self_service.status(), 403);

    // One update, one event.
    let updated = app
        .send_json(
            reqwest::Method::PUT,
            &format!("/properties/{}", s.property.id),
            &owner_token,
            json!({ "name": "Harbour View East" }),
        )
        .await;
    assert_eq!(updated.status(), 200);
    assert_eq!(drain(&mut socket).await, vec![events::PROPERTY_UPDATED.to_string()]);

    // Deactivation applies on the manager's next request, with the same token.
    let deactivated = app
        .send_json(
            reqwest::Method::PUT,
            &format!("/assignments/{}/active", assignment.id),
            &owner_token,
            json!({ "is_active": false }),
        )
        .await;
    assert_eq!(deactivated.status(), 200);
    assert_eq!(
        drain(&mut socket).await,
        vec![events::MANAGER_ASSIGNMENT_CHANGED.to_string()]
    );

    let units: Vec<Unit> = app.get("/units", &manager_token).await.json().await.unwrap();
    assert!(units.is_empty());
    let property = app.get(&format!("/properties/{}", s.property.id), &manager_token).await;
    assert_eq!(property.status(), 404);

    // The customer-room broadcast still reaches the socket; listings are the boundary.
    app.send_json(
        reqwest::Method::PUT,
        &format!("/properties/{}", s.property.id),
        &owner_token,
        json!({ "address": "2 Quay Street" }),
    )
    .await;
    assert_eq!(drain(&mut socket).await, vec![events::PROPERTY_UPDATED.to_string()]);

    // Reactivating restores access.
    let reactivated = app
        .send_json(
            reqwest::Method::PUT,
            &format!("/assignments/{}/active", assignment.id),
            &owner_token,
            json!({ "is_active": true }),
        )
        .await;
    assert_eq!(reactivated.status(), 200);
    let units: Vec<Unit> = app.get("/units", &manager_token).await.json().await.unwrap();
    assert_eq!(units.len(), 1);
}

#[tokio::test]
async fn test_manager_lease_updates_need_the_lease_toggle() {
    let app = spawn_app().await;
    let s = seed(&app, "leasetoggle");
    let manager = account("manager", "lease-manager@example.com", Some(s.customer_id));
    app.repo.insert_account(manager.clone());
    let assignment = ManagerAssignment {
        id: Uuid::new_v4(),
        customer_id: s.customer_id,
        property_id: s.property.id,
        manager_id: manager.id,
        is_active: true,
        ..Default::default()
    };
    app.repo.insert_assignment(assignment.clone());

    let owner_token = app.login(&s.owner.email).await;
    let manager_token = app.login(&manager.email).await;
    let lease_path = format!("/leases/{}", s.lease.id);

    let denied = app
        .send_json(reqwest::Method::PUT, &lease_path, &manager_token, json!({ "status": "ended" }))
        .await;
    assert_eq!(denied.status(), 404);

    let granted = app
        .send_json(
            reqwest::Method::PUT,
            &format!("/assignments/{}/permissions", assignment.id),
            &owner_token,
            json!({ "can_manage_leases": true }),
        )
        .await;
    assert_eq!(granted.status(), 200);

    let bogus = app
        .send_json(
            reqwest::Method::PUT,
            &lease_path,
            &manager_token,
            json!({ "status": "evicted" }),
        )
        .await;
    assert_eq!(bogus.status(), 400);

    let ended = app
        .send_json(reqwest::Method::PUT, &lease_path, &manager_token, json!({ "status": "ended" }))
        .await;
    assert_eq!(ended.status(), 200);
    let lease: Lease = ended.json().await.unwrap();
    assert_eq!(lease.status, "ended");
}
