//! JSON-over-HTTP RPC binding for the resource cache.
//!
//! Calls are `POST /rpc` with `{"method": "<service>.<Method>", "params": ...}`
//! and answer `{"result": ..., "error": ...}`. `GET /health` lists the
//! registered service names so a client can tell which implementation is
//! listening before it issues calls.

use crate::error::{CacheError, RpcError};
use crate::store::ResourceStore;
use crate::types::{ResourceRecord, WatchFilter};
use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, warn};

/// Name the production cache registers under.
pub const SERVICE_NAME: &str = "WatchCache";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait CacheService: Send + Sync {
    async fn resources(&self, filter: WatchFilter) -> Result<Vec<ResourceRecord>, CacheError>;
    async fn status(&self, context: String) -> Result<usize, CacheError>;
}

#[async_trait]
impl CacheService for ResourceStore {
    async fn resources(&self, filter: WatchFilter) -> Result<Vec<ResourceRecord>, CacheError> {
        self.query(&filter).await
    }

    async fn status(&self, context: String) -> Result<usize, CacheError> {
        if context.trim().is_empty() {
            return Err(CacheError::InvalidArgument(
                "context must not be blank".to_string(),
            ));
        }
        self.status_count(&context).await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<CacheError>,
}

impl RpcResponse {
    fn ok(result: Value) -> Self {
        Self {
            result: Some(result),
            error: None,
        }
    }

    fn err(error: CacheError) -> Self {
        Self {
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub services: Vec<String>,
}

/// Routes calls to handlers registered by explicit name.
#[derive(Clone, Default)]
pub struct RpcServer {
    handlers: HashMap<String, Arc<dyn CacheService>>,
}

impl RpcServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: &str, handler: Arc<dyn CacheService>) -> Self {
        self.handlers.insert(name.to_string(), handler);
        self
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/rpc", post(rpc_handler))
            .route("/health", get(health_handler))
            .with_state(Arc::new(self))
    }

    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    async fn dispatch(&self, request: RpcRequest) -> (StatusCode, RpcResponse) {
        let Some((service, method)) = request.method.rsplit_once('.') else {
            return (
                StatusCode::NOT_FOUND,
                RpcResponse::err(CacheError::UnknownMethod(request.method.clone())),
            );
        };
        let Some(handler) = self.handlers.get(service) else {
            return (
                StatusCode::NOT_FOUND,
                RpcResponse::err(CacheError::UnknownMethod(request.method.clone())),
            );
        };

        let outcome = match method {
            "Resources" => match serde_json::from_value::<WatchFilter>(request.params) {
                Ok(filter) => handler.resources(filter).await.and_then(to_value),
                Err(e) => return bad_params(e),
            },
            "Status" => match serde_json::from_value::<String>(request.params) {
                Ok(context) => handler.status(context).await.and_then(to_value),
                Err(e) => return bad_params(e),
            },
            _ => {
                return (
                    StatusCode::NOT_FOUND,
                    RpcResponse::err(CacheError::UnknownMethod(request.method.clone())),
                );
            }
        };

        match outcome {
            Ok(value) => (StatusCode::OK, RpcResponse::ok(value)),
            Err(e) => {
                debug!(method = %request.method, error = %e, "call failed");
                (StatusCode::OK, RpcResponse::err(e))
            }
        }
    }
}

fn to_value<T: Serialize>(value: T) -> Result<Value, CacheError> {
    serde_json::to_value(value).map_err(|e| {
        warn!(error = %e, "failed to encode result");
        CacheError::Internal(e.to_string())
    })
}

fn bad_params(e: serde_json::Error) -> (StatusCode, RpcResponse) {
    (
        StatusCode::BAD_REQUEST,
        RpcResponse::err(CacheError::InvalidArgument(e.to_string())),
    )
}

/// Decodes the body itself so malformed requests still get an `RpcResponse`.
async fn rpc_handler(
    State(server): State<Arc<RpcServer>>,
    body: Bytes,
) -> (StatusCode, Json<RpcResponse>) {
    let (status, response) = match serde_json::from_slice::<RpcRequest>(&body) {
        Ok(request) => server.dispatch(request).await,
        Err(e) => {
            debug!(error = %e, "malformed request");
            bad_params(e)
        }
    };
    (status, Json(response))
}

async fn health_handler(State(server): State<Arc<RpcServer>>) -> Json<HealthResponse> {
    let mut services: Vec<String> = server.handlers.keys().cloned().collect();
    services.sort();
    Json(HealthResponse { services })
}

/// Client side of the protocol, bound to one registered service name.
#[derive(Debug, Clone)]
pub struct WatchClient {
    http: reqwest::Client,
    base_url: String,
    service: String,
}

impl WatchClient {
    /// Reach the server and check `service` is registered there.
    pub async fn connect(address: &str, service: &str) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let base_url = format!("http://{}", address);

        let response = http
            .get(format!("{}/health", base_url))
            .send()
            .await
            .map_err(|e| classify(e, address))?;
        let health: HealthResponse = response.error_for_status()?.json().await?;
        if !health.services.iter().any(|s| s == service) {
            return Err(RpcError::UnknownService(service.to_string()));
        }

        Ok(Self {
            http,
            base_url,
            service: service.to_string(),
        })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub async fn resources(&self, filter: &WatchFilter) -> Result<Vec<ResourceRecord>, RpcError> {
        self.call("Resources", filter).await
    }

    pub async fn status(&self, context: &str) -> Result<usize, RpcError> {
        self.call("Status", &context).await
    }

    async fn call<P, R>(&self, method: &str, params: &P) -> Result<R, RpcError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let request = RpcRequest {
            method: format!("{}.{}", self.service, method),
            params: serde_json::to_value(params).map_err(|e| RpcError::Protocol(e.to_string()))?,
        };
        let response = self
            .http
            .post(format!("{}/rpc", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| classify(e, &self.base_url))?;

        let status = response.status();
        let body: RpcResponse = response.json().await.map_err(|e| {
            warn!(method = %request.method, %status, "undecodable rpc response");
            RpcError::Protocol(e.to_string())
        })?;
        if let Some(err) = body.error {
            return Err(RpcError::Remote(err));
        }
        let result = body
            .result
            .ok_or_else(|| RpcError::Protocol(format!("{} returned no result", request.method)))?;
        serde_json::from_value(result).map_err(|e| RpcError::Protocol(e.to_string()))
    }
}

fn classify(err: reqwest::Error, address: &str) -> RpcError {
    if is_connection_refused(&err) {
        RpcError::ConnectionRefused(address.to_string())
    } else {
        RpcError::Transport(err)
    }
}

/// Nothing listening on the other end, as opposed to any other failure.
fn is_connection_refused(err: &reqwest::Error) -> bool {
    if !err.is_connect() {
        return false;
    }
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            return io.kind() == std::io::ErrorKind::ConnectionRefused;
        }
        if cause.to_string().to_lowercase().contains("connection refused") {
            return true;
        }
        source = cause.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn start(server: RpcServer) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(server.serve(listener));
        address
    }

    async fn seeded_store() -> Arc<ResourceStore> {
        let store = Arc::new(ResourceStore::new());
        for ctx in ["ctx1", "ctx2"] {
            for ns in ["ns1", "ns2"] {
                store
                    .upsert(
                        ctx,
                        ResourceRecord::new("pod", &format!("{}-{}", ctx, ns), ns)
                            .with_status("Running"),
                    )
                    .await;
            }
        }
        store
    }

    #[tokio::test]
    async fn test_resources_over_http() {
        let store = seeded_store().await;
        let address = start(RpcServer::new().register(SERVICE_NAME, store)).await;
        let client = WatchClient::connect(&address, SERVICE_NAME).await.unwrap();

        let pods = client
            .resources(&WatchFilter::new("", "ns1", "POD"))
            .await
            .unwrap();
        let names: Vec<&str> = pods.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["ctx1-ns1", "ctx2-ns1"]);

        assert_eq!(client.status("ctx1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_errors_surface_verbatim() {
        let store = seeded_store().await;
        let address = start(RpcServer::new().register(SERVICE_NAME, store)).await;
        let client = WatchClient::connect(&address, SERVICE_NAME).await.unwrap();

        match client
            .resources(&WatchFilter::new("context_other", "", "pod"))
            .await
        {
            Err(RpcError::Remote(CacheError::UnknownContext(ctx))) => {
                assert_eq!(ctx, "context_other")
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(matches!(
            client.status("unknown-ctx").await,
            Err(RpcError::Remote(CacheError::UnknownContext(_)))
        ));
        assert!(matches!(
            client.status("").await,
            Err(RpcError::Remote(CacheError::InvalidArgument(_)))
        ));
        assert!(matches!(
            client.status("   ").await,
            Err(RpcError::Remote(CacheError::InvalidArgument(_)))
        ));
    }

    #[tokio::test]
    async fn test_named_handlers_share_one_listener() {
        let production = seeded_store().await;
        let double = Arc::new(ResourceStore::new());
        double
            .upsert("ctx1", ResourceRecord::new("pod", "double", "ns1"))
            .await;
        let address = start(
            RpcServer::new()
                .register(SERVICE_NAME, production)
                .register("TestCache", double),
        )
        .await;

        let real = WatchClient::connect(&address, SERVICE_NAME).await.unwrap();
        let fake = WatchClient::connect(&address, "TestCache").await.unwrap();
        assert_eq!(fake.service(), "TestCache");
        assert_eq!(real.status("ctx1").await.unwrap(), 2);
        assert_eq!(fake.status("ctx1").await.unwrap(), 1);

        assert!(matches!(
            WatchClient::connect(&address, "Missing").await,
            Err(RpcError::UnknownService(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let server = RpcServer::new().register(SERVICE_NAME, Arc::new(ResourceStore::new()));
        let (status, response) = server
            .dispatch(RpcRequest {
                method: "WatchCache.Drop".to_string(),
                params: Value::Null,
            })
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(matches!(response.error, Some(CacheError::UnknownMethod(_))));

        let (status, response) = server
            .dispatch(RpcRequest {
                method: "WatchCache.Status".to_string(),
                params: serde_json::json!({"not": "a string"}),
            })
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(matches!(
            response.error,
            Some(CacheError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_body_gets_rpc_error() {
        let server = RpcServer::new().register(SERVICE_NAME, Arc::new(ResourceStore::new()));
        let address = start(server).await;
        let http = reqwest::Client::new();

        for body in ["not json", r#"{"params": "prod"}"#] {
            let response = http
                .post(format!("http://{}/rpc", address))
                .body(body)
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
            let reply: RpcResponse = response.json().await.unwrap();
            assert!(reply.result.is_none());
            assert!(
                matches!(reply.error, Some(CacheError::InvalidArgument(_))),
                "body {:?} got {:?}",
                body,
                reply.error
            );
        }
    }

    #[test]
    fn test_unencodable_result_is_an_error() {
        let mut weird = HashMap::new();
        weird.insert((1, 2), "pair keys are not json object keys");
        assert!(matches!(to_value(&weird), Err(CacheError::Internal(_))));
        assert_eq!(to_value(3usize), Ok(serde_json::json!(3)));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = WatchClient::connect(&address, SERVICE_NAME)
            .await
            .unwrap_err();
        assert!(err.is_connection_refused(), "got {:?}", err);
    }

    #[test]
    fn test_error_wire_format() {
        let json = serde_json::to_value(CacheError::UnknownContext("prod".into())).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"code": "unknown_context", "message": "prod"})
        );
    }
}
