use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use rentdesk::backend::{Endpoints, HttpBackend};
use rentdesk::fleet::{Car, FleetSummary};
use rentdesk::listener::Backoff;
use rentdesk::model::{ReservationStatus, StatusSet, ViewFilter};
use rentdesk::notify::{Notice, NoticeHub};
use rentdesk::push::{WsTransport, socket_io_url};
use rentdesk::sync::{ErrorKind, ReservationSync, SyncError};
use rentdesk::view::ReservationView;

// ── Test infrastructure ──────────────────────────────────────

const OPEN_PACKET: &str = r#"0{"sid":"eio1","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

/// In-process stand-in for the rental API: reservation documents, the
/// status update endpoints of both profiles, the fleet and profile write
/// endpoints, and a socket.io push channel.
#[derive(Clone)]
struct FakeApi {
    docs: Arc<Mutex<Vec<Value>>>,
    queries: Arc<Mutex<Vec<Vec<(String, String)>>>>,
    updates: Arc<Mutex<Vec<(Method, String, Value)>>>,
    /// Method, raw request path and body of every fleet or profile write.
    fleet_writes: Arc<Mutex<Vec<(Method, String, Value)>>>,
    push: broadcast::Sender<String>,
    joined: Arc<AtomicUsize>,
    pongs: Arc<AtomicUsize>,
}

impl FakeApi {
    fn new(docs: Vec<Value>) -> Self {
        let (push, _) = broadcast::channel(16);
        Self {
            docs: Arc::new(Mutex::new(docs)),
            queries: Arc::default(),
            updates: Arc::default(),
            fleet_writes: Arc::default(),
            push,
            joined: Arc::default(),
            pongs: Arc::default(),
        }
    }

    fn add(&self, doc: Value) {
        self.docs.lock().unwrap().push(doc);
    }

    fn emit(&self, packet: String) {
        self.push.send(packet).unwrap();
    }

    fn emit_new_reservation(&self, doc: &Value) {
        self.emit(format!("42{}", json!(["newReservation", doc])));
    }

    fn joined(&self) -> usize {
        self.joined.load(Ordering::SeqCst)
    }
}

async fn start_test_server(api: FakeApi) -> String {
    let app = Router::new()
        .route("/reservations", get(list))
        .route("/car-rental/reservations", get(list))
        .route("/reservations/:id", patch(update))
        .route("/update-reservations/:id", put(update))
        .route("/companies/:id", get(company))
        .route("/update-company/:id", put(fleet_write))
        .route("/api/cars", post(fleet_write))
        .route("/api/cars/:id", put(fleet_write))
        .route("/socket.io/", get(socket_io))
        .with_state(api);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

fn field<'a>(doc: &'a Value, keys: &[&str]) -> &'a str {
    keys.iter().find_map(|k| doc[*k].as_str()).unwrap_or_default()
}

async fn list(State(api): State<FakeApi>, Query(params): Query<Vec<(String, String)>>) -> Json<Value> {
    let company = params
        .iter()
        .find(|(k, _)| k == "companyId")
        .map(|(_, v)| v.clone())
        .unwrap_or_default();
    let statuses: Vec<&str> = params
        .iter()
        .filter(|(k, _)| k == "status" || k == "status[]")
        .map(|(_, v)| v.as_str())
        .collect();

    let docs = api.docs.lock().unwrap().clone();
    let legacy = docs.first().is_some_and(|d| d.get("_id").is_some());
    let matching: Vec<Value> = docs
        .into_iter()
        .filter(|d| field(d, &["companyId", "rentCarCompany"]) == company)
        .filter(|d| statuses.contains(&field(d, &["status", "reservationStatus"])))
        .collect();
    api.queries.lock().unwrap().push(params);

    // The legacy backend answers with a bare array.
    if legacy {
        Json(Value::Array(matching))
    } else {
        Json(json!({ "data": matching }))
    }
}

async fn update(
    State(api): State<FakeApi>,
    method: Method,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    api.updates.lock().unwrap().push((method, id.clone(), body.clone()));
    if id == "locked" {
        return (StatusCode::CONFLICT, "reservation already handled").into_response();
    }
    let mut docs = api.docs.lock().unwrap();
    let Some(doc) = docs.iter_mut().find(|d| field(d, &["id", "_id"]) == id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let key = if doc.get("_id").is_some() { "reservationStatus" } else { "status" };
    doc[key] = body["status"].clone();
    Json(json!({ "ok": true })).into_response()
}

async fn company(Path(id): Path<String>) -> Json<Value> {
    Json(json!({
        "_id": id,
        "name": "Rent A Ride",
        "contact_email": "ops@rentaride.pk",
        "contact_phone": "042-111-222",
        "total_cars": 3,
        "location": { "address": "12 Main Blvd", "city": "Lahore" },
        "cars": [
            { "model": "Corolla", "registration_number": "LEA-1", "available": true },
            { "model": "Civic", "registration_number": "LEB-2", "available": false },
            { "model": "Corolla", "registration_number": "LEC-3", "available": true }
        ]
    }))
}

async fn fleet_write(
    State(api): State<FakeApi>,
    method: Method,
    uri: Uri,
    Json(body): Json<Value>,
) -> Response {
    api.fleet_writes
        .lock()
        .unwrap()
        .push((method, uri.path().to_string(), body.clone()));
    if body["registration_number"] == "TAKEN" {
        return (StatusCode::CONFLICT, "registration number in use").into_response();
    }
    Json(json!({ "ok": true })).into_response()
}

async fn socket_io(State(api): State<FakeApi>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| engine_io(socket, api))
}

/// Server half of the engine.io v4 / socket.io v5 handshake, then relays
/// every emitted packet.
async fn engine_io(mut socket: WebSocket, api: FakeApi) {
    let mut packets = api.push.subscribe();
    if socket.send(Message::Text(OPEN_PACKET.into())).await.is_err() {
        return;
    }
    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => match text.as_str() {
                    "40" => {
                        if socket.send(Message::Text(r#"40{"sid":"ns1"}"#.into())).await.is_err() {
                            return;
                        }
                        api.joined.fetch_add(1, Ordering::SeqCst);
                        let _ = socket.send(Message::Text("2".into())).await;
                    }
                    "3" => {
                        api.pongs.fetch_add(1, Ordering::SeqCst);
                    }
                    _ => {}
                },
                Some(Ok(_)) => {}
                _ => return,
            },
            packet = packets.recv() => match packet {
                Ok(packet) => {
                    if socket.send(Message::Text(packet)).await.is_err() {
                        return;
                    }
                }
                Err(_) => return,
            },
        }
    }
}

fn canonical(id: &str, company: &str, status: &str) -> Value {
    json!({
        "id": id,
        "companyId": company,
        "car": { "model": "Civic", "registrationNumber": "LEB-22" },
        "renter": {
            "userId": "u7",
            "email": "renter@example.com",
            "nationalId": "35202-7654321-3",
            "contactNumber": "0321-7654321"
        },
        "window": { "start": "2025-04-02T09:00:00Z", "end": "2025-04-04T09:00:00Z" },
        "paymentMethod": "CARD",
        "status": status,
        "createdAt": "2025-04-01T08:00:00Z",
        "updatedAt": "2025-04-01T08:00:00Z"
    })
}

fn legacy(id: &str, company: &str, status: &str) -> Value {
    json!({
        "_id": id,
        "cnic": "35202-1234567-1",
        "contactNumber": "0300-1234567",
        "fromDate": "2025-04-02",
        "endDate": "2025-04-05",
        "carModel": "Corolla",
        "registrationNumber": "LEA-1234",
        "paymentMethod": "CASH",
        "reservationStatus": status,
        "rentCarCompany": company,
        "user": { "_id": "u1", "email": "renter@example.com" },
        "createdAt": "2025-04-01T08:00:00.000Z",
        "updatedAt": "2025-04-01T08:00:00.000Z",
        "__v": 0
    })
}

fn pending_filter() -> ViewFilter {
    ViewFilter::new("c1", StatusSet::only(ReservationStatus::Pending)).unwrap()
}

async fn mount(base: &str, endpoints: Endpoints, notices: Arc<NoticeHub>) -> ReservationView {
    let timeout = Duration::from_secs(2);
    let backend = Arc::new(HttpBackend::new(base, endpoints, timeout).unwrap());
    let transport = Arc::new(WsTransport::new(socket_io_url(base).unwrap()));
    let sync = Arc::new(ReservationSync::new(backend, notices, timeout));
    let backoff = Backoff::new(Duration::from_millis(20), Duration::from_millis(100));
    ReservationView::mount_with_backoff(sync, transport, pending_filter(), backoff).await
}

fn shown(view: &ReservationView) -> Vec<String> {
    view.reservations().iter().map(|r| r.id.clone()).collect()
}

async fn eventually(what: &str, cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for: {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn recv_notice(rx: &mut broadcast::Receiver<Notice>) -> Notice {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no notice within 5s")
        .unwrap()
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn push_event_refreshes_view() {
    let api = FakeApi::new(vec![
        canonical("r1", "c1", "PENDING"),
        canonical("r2", "c1", "CONFIRMED"),
        canonical("r3", "c2", "PENDING"),
    ]);
    let base = start_test_server(api.clone()).await;
    let notices = Arc::new(NoticeHub::new());
    let mut rx = notices.subscribe();

    let view = mount(&base, Endpoints::default(), notices).await;
    assert_eq!(shown(&view), vec!["r1"]);
    assert_eq!(
        api.queries.lock().unwrap()[0],
        vec![
            ("companyId".to_string(), "c1".to_string()),
            ("status".to_string(), "PENDING".to_string()),
        ]
    );

    eventually("socket.io namespace joined", || api.joined() == 1).await;
    eventually("ping answered", || api.pongs.load(Ordering::SeqCst) >= 1).await;

    let r4 = canonical("r4", "c1", "PENDING");
    api.add(r4.clone());
    api.emit_new_reservation(&r4);

    eventually("r4 shown", || view.reservations().len() == 2).await;
    assert_eq!(shown(&view), vec!["r1", "r4"]);
    match recv_notice(&mut rx).await {
        Notice::NewReservation { id, car_model } => {
            assert_eq!(id, "r4");
            assert_eq!(car_model, "Civic");
        }
        other => panic!("unexpected notice {other:?}"),
    }
    view.unmount().await;
}

#[tokio::test]
async fn push_for_other_company_does_not_refetch() {
    let api = FakeApi::new(vec![canonical("r1", "c1", "PENDING")]);
    let base = start_test_server(api.clone()).await;
    let view = mount(&base, Endpoints::default(), Arc::new(NoticeHub::new())).await;
    eventually("socket.io namespace joined", || api.joined() == 1).await;

    api.emit_new_reservation(&canonical("r9", "c2", "PENDING"));
    api.emit(r#"42["carReturned",{"id":"k1"}]"#.to_string());
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(api.queries.lock().unwrap().len(), 1);
    view.unmount().await;
}

#[tokio::test]
async fn confirm_patches_and_removes() {
    let api = FakeApi::new(vec![canonical("r1", "c1", "PENDING"), canonical("r2", "c1", "PENDING")]);
    let base = start_test_server(api.clone()).await;
    let notices = Arc::new(NoticeHub::new());
    let mut rx = notices.subscribe();
    let view = mount(&base, Endpoints::default(), notices).await;

    view.confirm("r1").await.unwrap();
    assert_eq!(shown(&view), vec!["r2"]);
    {
        let updates = api.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0], (Method::PATCH, "r1".to_string(), json!({ "status": "CONFIRMED" })));
    }
    let notice = recv_notice(&mut rx).await;
    assert_eq!((notice.title(), notice.message().as_str()), ("Success", "Reservation confirmed"));

    // The backend agrees on a fresh load.
    view.refresh().await.unwrap();
    assert_eq!(shown(&view), vec!["r2"]);
    view.unmount().await;
}

#[tokio::test]
async fn rejected_update_keeps_record() {
    let api = FakeApi::new(vec![canonical("locked", "c1", "PENDING")]);
    let base = start_test_server(api.clone()).await;
    let view = mount(&base, Endpoints::default(), Arc::new(NoticeHub::new())).await;

    let err = view.cancel("locked").await.unwrap_err();
    assert_eq!(
        err,
        SyncError::Backend {
            status: 409,
            message: "reservation already handled".into(),
        }
    );
    assert_eq!(shown(&view), vec!["locked"]);
    view.unmount().await;
}

#[tokio::test]
async fn legacy_profile_round_trip() {
    let api = FakeApi::new(vec![
        legacy("64a1", "c1", "PENDING"),
        legacy("64a2", "c1", "CANCELLED"),
    ]);
    let base = start_test_server(api.clone()).await;
    let view = mount(&base, Endpoints::legacy(), Arc::new(NoticeHub::new())).await;

    assert_eq!(shown(&view), vec!["64a1"]);
    let first = view.reservations()[0].clone();
    assert_eq!(first.company_id, "c1");
    assert_eq!(first.car.model, "Corolla");
    assert_eq!(first.window.start.to_rfc3339(), "2025-04-02T00:00:00+00:00");
    assert_eq!(api.queries.lock().unwrap()[0][1].0, "status[]");

    eventually("socket.io namespace joined", || api.joined() == 1).await;
    let fresh = legacy("64a3", "c1", "PENDING");
    api.add(fresh.clone());
    api.emit_new_reservation(&fresh);
    eventually("64a3 shown", || view.reservations().len() == 2).await;

    view.confirm("64a1").await.unwrap();
    assert_eq!(api.updates.lock().unwrap()[0].0, Method::PUT);
    assert_eq!(shown(&view), vec!["64a3"]);
    view.unmount().await;
}

#[tokio::test]
async fn listener_reconnects_after_server_disconnect() {
    let api = FakeApi::new(vec![canonical("r1", "c1", "PENDING")]);
    let base = start_test_server(api.clone()).await;
    let notices = Arc::new(NoticeHub::new());
    let mut rx = notices.subscribe();
    let view = mount(&base, Endpoints::default(), notices).await;
    eventually("socket.io namespace joined", || api.joined() == 1).await;

    api.emit("41".to_string());
    assert!(matches!(recv_notice(&mut rx).await, Notice::ConnectionLost { .. }));
    assert_eq!(recv_notice(&mut rx).await, Notice::Reconnected);
    eventually("namespace joined again", || api.joined() == 2).await;

    let r2 = canonical("r2", "c1", "PENDING");
    api.add(r2.clone());
    api.emit_new_reservation(&r2);
    eventually("r2 shown", || view.reservations().len() == 2).await;
    view.unmount().await;
}

#[tokio::test]
async fn unreachable_backend_is_a_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    drop(listener);

    let notices = Arc::new(NoticeHub::new());
    let mut rx = notices.subscribe();
    let backend = Arc::new(HttpBackend::new(format!("http://{addr}"), Endpoints::default(), Duration::from_secs(2)).unwrap());
    let sync = ReservationSync::new(backend, notices, Duration::from_secs(2));

    let err = sync.fetch(&pending_filter()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
    assert!(sync.store().is_empty());
    assert!(matches!(recv_notice(&mut rx).await, Notice::FetchFailed { .. }));
}

#[tokio::test]
async fn company_profile_summarises_fleet() {
    let base = start_test_server(FakeApi::new(vec![])).await;
    let backend = HttpBackend::new(base.as_str(), Endpoints::default(), Duration::from_secs(2)).unwrap();

    let company = backend.fetch_company("c1").await.unwrap();
    assert_eq!(company.id, "c1");
    assert_eq!(company.location.city, "Lahore");

    let summary = FleetSummary::from_company(&company);
    assert_eq!(summary.total_cars, 3);
    assert_eq!(summary.available_cars, 2);
    assert_eq!(summary.by_model.get("Corolla"), Some(&2));
}

#[tokio::test]
async fn partial_push_payload_still_refreshes() {
    let api = FakeApi::new(vec![canonical("r1", "c1", "PENDING")]);
    let base = start_test_server(api.clone()).await;
    let notices = Arc::new(NoticeHub::new());
    let mut rx = notices.subscribe();
    let view = mount(&base, Endpoints::default(), notices).await;
    eventually("socket.io namespace joined", || api.joined() == 1).await;

    api.add(canonical("r9", "c1", "PENDING"));
    api.emit(r#"42["newReservation",{"_id":"r9","rentCarCompany":"c1"}]"#.to_string());

    eventually("r9 shown", || view.reservations().len() == 2).await;
    assert_eq!(shown(&view), vec!["r1", "r9"]);
    assert_eq!(api.queries.lock().unwrap().len(), 2);
    match recv_notice(&mut rx).await {
        Notice::NewReservation { id, .. } => assert_eq!(id, "r9"),
        other => panic!("unexpected notice {other:?}"),
    }
    view.unmount().await;
}

#[tokio::test]
async fn punctuated_id_is_sent_as_one_path_segment() {
    let api = FakeApi::new(vec![canonical("a:b/c", "c1", "PENDING"), canonical("r.1", "c1", "PENDING")]);
    let base = start_test_server(api.clone()).await;
    let view = mount(&base, Endpoints::default(), Arc::new(NoticeHub::new())).await;

    view.confirm("a:b/c").await.unwrap();
    view.cancel("r.1").await.unwrap();
    {
        let updates = api.updates.lock().unwrap();
        assert_eq!(updates[0].1, "a:b/c");
        assert_eq!(updates[1].1, "r.1");
    }
    assert!(view.reservations().is_empty());
    view.unmount().await;
}

fn civic(registration_number: &str) -> Car {
    Car {
        id: None,
        model: "Civic".into(),
        registration_number: registration_number.into(),
        kind: Some("sedan".into()),
        rent_per_day: Some(7000.0),
        available: true,
    }
}

#[tokio::test]
async fn company_profile_is_written_back() {
    let api = FakeApi::new(vec![]);
    let base = start_test_server(api.clone()).await;
    let backend = HttpBackend::new(base.as_str(), Endpoints::default(), Duration::from_secs(2)).unwrap();

    let mut company = backend.fetch_company("c1").await.unwrap();
    company.name = "Rent A Ride Lahore".into();
    company.contact_phone = "042-333-444".into();
    backend.update_company(&company).await.unwrap();

    let writes = api.fleet_writes.lock().unwrap();
    assert_eq!(writes.len(), 1);
    let (method, path, body) = &writes[0];
    assert_eq!((method, path.as_str()), (&Method::PUT, "/update-company/c1"));
    assert_eq!(body["_id"], "c1");
    assert_eq!(body["name"], "Rent A Ride Lahore");
    assert_eq!(body["contact_phone"], "042-333-444");
    assert_eq!(body["cars"].as_array().map(Vec::len), Some(3));
}

#[tokio::test]
async fn cars_are_added_and_updated() {
    let api = FakeApi::new(vec![]);
    let base = start_test_server(api.clone()).await;
    let backend = HttpBackend::new(base.as_str(), Endpoints::default(), Duration::from_secs(2)).unwrap();

    backend.add_car("c1", &civic("LEB 22")).await.unwrap();
    let mut rented = civic("LEB 22");
    rented.available = false;
    backend.update_car("LEB 22", &rented).await.unwrap();

    let writes = api.fleet_writes.lock().unwrap();
    assert_eq!(writes.len(), 2);
    assert_eq!((&writes[0].0, writes[0].1.as_str()), (&Method::POST, "/api/cars"));
    assert_eq!(writes[0].2["companyId"], "c1");
    assert_eq!(writes[0].2["type"], "sedan");
    assert_eq!((&writes[1].0, writes[1].1.as_str()), (&Method::PUT, "/api/cars/LEB%2022"));
    assert_eq!(writes[1].2["available"], false);
    assert!(writes[1].2.get("companyId").is_none());
}

#[tokio::test]
async fn rejected_car_write_is_a_backend_error() {
    let api = FakeApi::new(vec![]);
    let base = start_test_server(api.clone()).await;
    let backend = HttpBackend::new(base.as_str(), Endpoints::default(), Duration::from_secs(2)).unwrap();

    let err = backend.add_car("c1", &civic("TAKEN")).await.unwrap_err();
    assert_eq!(
        err,
        SyncError::Backend {
            status: 409,
            message: "registration number in use".into(),
        }
    );

    let err = backend.update_car(" ", &civic("LEB-22")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Input);
    assert_eq!(api.fleet_writes.lock().unwrap().len(), 1);
}
