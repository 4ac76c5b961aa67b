//! Stub users API for integration testing
//!
//! Serves `/users` the way the public demo API does, so scenarios can be
//! exercised without network access. Prints `listening at: ADDR` on stdout
//! once the listener is bound.

use std::io::Write;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use serde_json::{json, Map, Value};

/// How the stub answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Writes echo the submitted fields (a real store)
    Strict,
    /// Writes only acknowledge with an id (a stub-like store)
    Lenient,
    /// Every request answers 500
    Failing,
    /// The first N requests answer 503, then behave like `Strict`
    Flaky(u32),
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" => Ok(Mode::Strict),
            "lenient" => Ok(Mode::Lenient),
            "failing" => Ok(Mode::Failing),
            _ => match s.strip_prefix("flaky:") {
                Some(n) => n
                    .parse()
                    .map(Mode::Flaky)
                    .map_err(|e| format!("invalid flaky count '{}': {}", n, e)),
                None => Err(format!(
                    "unknown mode '{}' (expected strict, lenient, failing or flaky:N)",
                    s
                )),
            },
        }
    }
}

#[derive(Parser)]
#[command(name = "stub_api")]
#[command(about = "Stub users API for integration tests")]
struct Args {
    /// Port to listen on (0 picks a free port)
    #[arg(long, default_value = "0")]
    port: u16,

    /// strict, lenient, failing or flaky:N
    #[arg(long, default_value = "strict")]
    mode: Mode,

    /// Wrap every record in an object under this key
    #[arg(long)]
    envelope: Option<String>,
}

struct Stub {
    mode: Mode,
    envelope: Option<String>,
    requests: AtomicU32,
}

type Shared = Arc<Stub>;

const USER_IDS: std::ops::RangeInclusive<u64> = 1..=10;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let args = Args::parse();
    let stub = Arc::new(Stub {
        mode: args.mode,
        envelope: args.envelope,
        requests: AtomicU32::new(0),
    });

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", args.port)).await?;
    println!("listening at: {}", listener.local_addr()?);
    std::io::stdout().flush()?;

    axum::serve(listener, router(stub)).await
}

fn router(stub: Shared) -> Router {
    Router::new()
        .route("/users", axum::routing::post(create_user))
        .route(
            "/users/{id}",
            get(get_user).put(update_user).patch(update_user),
        )
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(stub.clone(), inject_faults))
        .with_state(stub)
}

/// Answer `failing` and `flaky` requests before they reach a route
async fn inject_faults(State(stub): State<Shared>, request: Request, next: Next) -> Response {
    let seen = stub.requests.fetch_add(1, Ordering::SeqCst);
    match stub.mode {
        Mode::Failing => error(StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        Mode::Flaky(n) if seen < n => error(StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
        _ => next.run(request).await,
    }
}

async fn get_user(State(stub): State<Shared>, Path(id): Path<u64>) -> Response {
    if !USER_IDS.contains(&id) {
        return not_found().await;
    }
    (StatusCode::OK, Json(stub.wrap(user(id)))).into_response()
}

async fn create_user(State(stub): State<Shared>, Json(body): Json<Value>) -> Response {
    (StatusCode::CREATED, Json(stub.wrap(stub.write(11, &body)))).into_response()
}

async fn update_user(
    State(stub): State<Shared>,
    Path(id): Path<u64>,
    Json(body): Json<Value>,
) -> Response {
    if !USER_IDS.contains(&id) {
        return not_found().await;
    }
    (StatusCode::OK, Json(stub.wrap(stub.write(id, &body)))).into_response()
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({}))).into_response()
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

impl Stub {
    /// The record a write answers with
    fn write(&self, id: u64, body: &Value) -> Value {
        let mut record = Map::new();
        if self.mode != Mode::Lenient {
            if let Value::Object(fields) = body {
                record.extend(fields.clone());
            }
        }
        record.insert("id".to_string(), json!(id));
        Value::Object(record)
    }

    fn wrap(&self, record: Value) -> Value {
        match &self.envelope {
            Some(key) => json!({ key.as_str(): record }),
            None => record,
        }
    }
}

fn user(id: u64) -> Value {
    json!({
        "id": id,
        "name": format!("User {}", id),
        "username": format!("user{}", id),
        "email": format!("user{}@example.com", id),
    })
}
