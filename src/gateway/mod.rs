//! HTTP Gateway
//!
//! Thin axum boundary over [`crate::intake::Intake`] and the ledger.
//!
//! | Route | Auth | |
//! |---|---|---|
//! | `POST /transfer` | Bearer | form fields `to`, `amount` |
//! | `GET /transaction/{id}` | Bearer | sender or receiver only |
//! | `GET /health` | none | ledger ping |

pub mod handlers;
pub mod state;
pub mod types;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::{Next, from_fn_with_state},
    response::Response,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::GatewayConfig;
use crate::error::TransferError;
use crate::ledger::LedgerError;
use state::AppState;

/// Resolve `Authorization: Bearer <token>` to a client and inject it
async fn bearer_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, TransferError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(TransferError::MissingAuthorization)?
        .to_str()
        .map_err(|_| TransferError::InvalidAuthorization)?;

    let token = parse_bearer(auth_header)?;

    let client = match state.ledger.client_by_token(token).await {
        Ok(client) => client,
        Err(LedgerError::ClientNotFound) => return Err(TransferError::InvalidToken),
        Err(e) => {
            error!(error = %e, "Token lookup failed");
            return Err(e.into());
        }
    };

    request.extensions_mut().insert(client);
    Ok(next.run(request).await)
}

fn parse_bearer(header_value: &str) -> Result<&str, TransferError> {
    let mut parts = header_value.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme == "Bearer" => Ok(token),
        _ => Err(TransferError::InvalidAuthorization),
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let private_routes = Router::new()
        .route("/transfer", post(handlers::create_transfer))
        .route("/transaction/{id}", get(handlers::get_transaction))
        .layer(from_fn_with_state(state.clone(), bearer_auth_middleware));

    Router::new()
        .route("/health", get(handlers::health_check))
        .merge(private_routes)
        .with_state(state)
}

/// Serve until `shutdown` is cancelled
pub async fn run_server(
    config: &GatewayConfig,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;

    info!(addr = %addr, "Gateway listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::Intake;
    use crate::ledger::{Client, InMemoryLedger, LedgerStore, Transaction, TransactionStatus};
    use crate::sequencer::{DispatchReceiver, Sequencer, SequencerConfig};
    use crate::stats::EngineStats;
    use crate::gateway::types::{ApiResponse, TransferAccepted};
    use axum::http::StatusCode;
    use rust_decimal::Decimal;
    use tower::ServiceExt;

    struct Fixture {
        ledger: Arc<InMemoryLedger>,
        app: Router,
        _sequencer: Sequencer,
        _dispatch_rx: DispatchReceiver,
    }

    /// Gateway over an in-memory ledger; the sequencer loop is not running
    fn fixture() -> Fixture {
        let ledger = Arc::new(InMemoryLedger::with_clients([
            Client::new(1, "alice", "alice-token", Decimal::new(100, 0)),
            Client::new(2, "bob", "bob-token", Decimal::ZERO),
            Client::new(3, "carol", "carol-token", Decimal::ZERO),
        ]));
        let shutdown = CancellationToken::new();
        let (sequencer, handle, dispatch_rx) = Sequencer::new(
            &SequencerConfig::default(),
            ledger.clone(),
            Arc::new(EngineStats::new()),
            shutdown.clone(),
        );
        let intake = Intake::new(ledger.clone(), handle, shutdown);
        let state = Arc::new(AppState::new(ledger.clone(), intake));
        Fixture {
            ledger,
            app: router(state),
            _sequencer: sequencer,
            _dispatch_rx: dispatch_rx,
        }
    }

    fn transfer_request(auth: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/transfer")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, auth: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, auth)
            .body(Body::empty())
            .unwrap()
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_parse_bearer() {
        assert_eq!(parse_bearer("Bearer abc"), Ok("abc"));
        assert_eq!(
            parse_bearer("Basic abc"),
            Err(TransferError::InvalidAuthorization)
        );
        assert_eq!(parse_bearer("Bearer"), Err(TransferError::InvalidAuthorization));
        assert_eq!(
            parse_bearer("Bearer a b"),
            Err(TransferError::InvalidAuthorization)
        );
    }

    #[tokio::test]
    async fn test_transfer_accepted() {
        let f = fixture();
        let response = f
            .app
            .oneshot(transfer_request(Some("Bearer alice-token"), "to=2&amount=30"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: ApiResponse<TransferAccepted> =
            serde_json::from_value(json(response).await).unwrap();
        assert_eq!(body.code, 0);
        let data = body.data.unwrap();
        assert_eq!(data.status, TransactionStatus::Pending);
        let tx = f.ledger.transaction(&data.transaction_id).await.unwrap();
        assert_eq!(tx.amount, Decimal::new(30, 0));
        assert_eq!(tx.receiver_id, 2);
    }

    #[tokio::test]
    async fn test_auth_failures() {
        let f = fixture();
        for auth in [None, Some("Token alice-token"), Some("Bearer nobody")] {
            let response = f
                .app
                .clone()
                .oneshot(transfer_request(auth, "to=2&amount=1"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "auth: {:?}", auth);
        }
        assert_eq!(f.ledger.transaction_count(), 0);
    }

    #[tokio::test]
    async fn test_validation_statuses() {
        let f = fixture();
        let cases = [
            ("amount=1", StatusCode::BAD_REQUEST),
            ("to=x&amount=1", StatusCode::BAD_REQUEST),
            ("to=2&amount=abc", StatusCode::BAD_REQUEST),
            ("to=2&amount=0", StatusCode::BAD_REQUEST),
            ("to=2&amount=0.001", StatusCode::BAD_REQUEST),
            ("to=1&amount=1", StatusCode::BAD_REQUEST),
            ("to=2&amount=150", StatusCode::UNPROCESSABLE_ENTITY),
            ("to=42&amount=1", StatusCode::UNPROCESSABLE_ENTITY),
        ];
        for (body, expected) in cases {
            let response = f
                .app
                .clone()
                .oneshot(transfer_request(Some("Bearer alice-token"), body))
                .await
                .unwrap();
            assert_eq!(response.status(), expected, "body: {}", body);
        }
        assert_eq!(f.ledger.transaction_count(), 0);
    }

    #[tokio::test]
    async fn test_storage_failure_is_500() {
        let f = fixture();
        let response = f
            .app
            .clone()
            .oneshot(get_request("/health", "Bearer alice-token"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        f.ledger.set_available(false);
        let response = f
            .app
            .clone()
            .oneshot(transfer_request(Some("Bearer alice-token"), "to=2&amount=1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = f
            .app
            .oneshot(get_request("/health", "Bearer alice-token"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_get_transaction_visibility() {
        let f = fixture();
        let tx = Transaction::pending("t-1".into(), 1, 2, Decimal::ONE);
        f.ledger.create_transaction(&tx).await.unwrap();

        for token in ["alice-token", "bob-token"] {
            let response = f
                .app
                .clone()
                .oneshot(get_request("/transaction/t-1", &format!("Bearer {}", token)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = json(response).await;
            assert_eq!(body["data"]["status"], "pending");
            assert_eq!(body["data"]["amount"], "1");
        }

        let response = f
            .app
            .clone()
            .oneshot(get_request("/transaction/t-1", "Bearer carol-token"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = f
            .app
            .oneshot(get_request("/transaction/missing", "Bearer alice-token"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
