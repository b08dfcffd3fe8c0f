//! RPC server assembly.
//!
//! # Responsibilities
//! - Build the interceptor chain from the registry's quota manager
//! - Load transport security material (both files or neither)
//! - Collect method registrations and caller-supplied options
//! - Serve on an already-bound listener until the handle stops it

use std::future::Future;
use std::mem;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::Uri;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::ServerConfig;
use crate::error::{BoxError, Error};
use crate::net::tls::load_tls_config;
use crate::registry::Registry;
use crate::rpc::interceptor::{method_name, InterceptorChain, RpcStats};
use crate::rpc::reflection::{self, ListServicesRequest};
use crate::rpc::status::{tag, Code, RpcError, Status};
use crate::rpc::MethodKind;

/// An opaque transform applied to the finished router, outside the
/// interceptor chain (extra tower layers, limits, timeouts...).
pub type ServerOption = Box<dyn FnOnce(Router) -> Router + Send>;

/// Capability used by the orchestrator to attach domain RPC methods.
pub trait RegisterServer: Send + Sync {
    fn register(&self, server: &mut RpcServer, registry: &Registry) -> Result<(), BoxError>;
}

impl<F> RegisterServer for F
where
    F: Fn(&mut RpcServer, &Registry) -> Result<(), BoxError> + Send + Sync,
{
    fn register(&self, server: &mut RpcServer, registry: &Registry) -> Result<(), BoxError> {
        self(server, registry)
    }
}

/// An assembled, not yet listening, RPC server.
pub struct RpcServer {
    router: Router,
    methods: Arc<DashMap<String, MethodKind>>,
    chain: InterceptorChain,
    tls: Option<RustlsConfig>,
    options: Vec<ServerOption>,
}

impl RpcServer {
    /// Assemble a server. Reading the certificate material is the only I/O.
    pub async fn new(
        config: &ServerConfig,
        registry: &Registry,
        options: Vec<ServerOption>,
    ) -> Result<Self, Error> {
        let methods = Arc::new(DashMap::new());
        let chain = InterceptorChain::new(
            &config.stats_prefix,
            &config.quota,
            registry.quota_manager.clone(),
            methods.clone(),
        );
        let tls = load_tls_config(&config.tls).await?;

        Ok(Self {
            router: Router::new().fallback(unknown_method),
            methods,
            chain,
            tls,
            options,
        })
    }

    /// Register `service/method`, served at `POST /service/method`.
    ///
    /// Request and response bodies are JSON. An empty request body decodes
    /// as `{}`.
    pub fn add_method<Req, Resp, F, Fut>(
        &mut self,
        service: &str,
        method: &str,
        kind: MethodKind,
        handler: F,
    ) -> Result<(), Error>
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(Req) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, RpcError>> + Send + 'static,
    {
        let name = format!("{service}/{method}");
        if self.methods.contains_key(&name) {
            return Err(Error::DuplicateMethod(name));
        }

        let route = move |body: Bytes| {
            let handler = handler.clone();
            async move {
                let body: &[u8] = if body.is_empty() { b"{}" } else { &body };
                let request: Req = match serde_json::from_slice(body) {
                    Ok(request) => request,
                    Err(e) => return RpcError::from(e).into_response(),
                };
                match handler(request).await {
                    Ok(response) => ok_response(response),
                    Err(e) => e.into_response(),
                }
            }
        };

        self.router = mem::take(&mut self.router).route(&format!("/{name}"), post(route));
        tracing::debug!(method = %name, kind = ?kind, "RPC method registered");
        self.methods.insert(name, kind);
        Ok(())
    }

    /// Register the reflection service. It reports every method registered
    /// before serving, including ones added after this call.
    pub fn enable_reflection(&mut self) -> Result<(), Error> {
        let methods = self.methods.clone();
        self.add_method(
            reflection::SERVICE,
            reflection::LIST_SERVICES,
            MethodKind::Admin,
            move |_: ListServicesRequest| {
                let methods = methods.clone();
                async move { Ok::<_, RpcError>(reflection::describe(&methods)) }
            },
        )
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    /// Statistics captured by the interceptor chain.
    pub fn stats(&self) -> Arc<RpcStats> {
        self.chain.stats()
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// TLS material loaded at construction, shared with the HTTP side-channel.
    pub fn tls_config(&self) -> Option<RustlsConfig> {
        self.tls.clone()
    }

    /// Finish assembly: interceptor chain around the methods, extra options
    /// around the chain.
    pub fn into_router(self) -> Router {
        let mut router = self.chain.apply(self.router);
        for option in self.options {
            router = option(router);
        }
        router
    }

    /// Serve on `listener` until `handle` is shut down.
    pub async fn serve(self, listener: std::net::TcpListener, handle: Handle) -> std::io::Result<()> {
        let tls = self.tls.clone();
        let app = self.into_router().into_make_service();
        match tls {
            Some(tls) => {
                axum_server::from_tcp_rustls(listener, tls)
                    .handle(handle)
                    .serve(app)
                    .await
            }
            None => axum_server::from_tcp(listener).handle(handle).serve(app).await,
        }
    }
}

fn ok_response<T: Serialize>(body: T) -> Response {
    let mut response = Json(body).into_response();
    if response.status().is_success() {
        tag(&mut response, Code::Ok);
    }
    response
}

async fn unknown_method(uri: Uri) -> Status {
    Status::unimplemented(format!("unknown method {}", method_name(uri.path())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DryRunStats;
    use crate::quota::{QuotaError, QuotaManager, Spec};
    use crate::rpc::interceptor::{DRY_RUN_REJECTED, TREE_ID_HEADER, UNKNOWN_METHOD};
    use crate::rpc::STATUS_HEADER;
    use crate::storage::MemoryStorage;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{HeaderValue, Request, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    #[derive(Default)]
    struct FakeQuota {
        reject: bool,
        gets: AtomicUsize,
        puts: AtomicUsize,
    }

    #[async_trait]
    impl QuotaManager for FakeQuota {
        async fn get_tokens(&self, _num: u32, specs: &[Spec]) -> Result<(), QuotaError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            if self.reject {
                Err(QuotaError::Exhausted(specs[0].to_string()))
            } else {
                Ok(())
            }
        }

        async fn put_tokens(&self, _num: u32, _specs: &[Spec]) -> Result<(), QuotaError> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn server_with(config: &ServerConfig, quota: Arc<FakeQuota>) -> RpcServer {
        let registry = Registry::new(Arc::new(MemoryStorage::new()), quota);
        RpcServer::new(config, &registry, Vec::new()).await.unwrap()
    }

    fn call(path: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(path)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_status(response: Response) -> Status {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[derive(serde::Deserialize, Serialize)]
    struct Echo {
        text: String,
    }

    #[tokio::test]
    async fn serves_registered_method() {
        let mut server = server_with(&ServerConfig::default(), Arc::default()).await;
        server
            .add_method("test.Echo", "Say", MethodKind::Read, |req: Echo| async move {
                Ok::<_, RpcError>(req)
            })
            .unwrap();
        let stats = server.stats();

        let response = server
            .into_router()
            .oneshot(call("/test.Echo/Say", r#"{"text":"hi"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[STATUS_HEADER], "ok");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let echoed: Echo = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(echoed.text, "hi");
        assert_eq!(stats.count("test.Echo/Say", Code::Ok), 1);
    }

    #[tokio::test]
    async fn duplicate_registration_fails() {
        let mut server = server_with(&ServerConfig::default(), Arc::default()).await;
        let handler = |req: Echo| async move { Ok::<_, RpcError>(req) };
        server.add_method("s", "M", MethodKind::Read, handler).unwrap();
        let err = server.add_method("s", "M", MethodKind::Read, handler).unwrap_err();
        assert!(matches!(err, Error::DuplicateMethod(ref name) if name == "s/M"));
    }

    #[tokio::test]
    async fn unknown_method_is_unimplemented() {
        let server = server_with(&ServerConfig::default(), Arc::default()).await;
        let stats = server.stats();
        let response = server.into_router().oneshot(call("/nope/Missing", "{}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
        assert_eq!(body_status(response).await.code, Code::Unimplemented);
        assert_eq!(stats.count(UNKNOWN_METHOD, Code::Unimplemented), 1);
        assert_eq!(stats.total("nope/Missing"), 0);
    }

    #[tokio::test]
    async fn unregistered_paths_share_one_stats_entry() {
        let mut server = server_with(&ServerConfig::default(), Arc::default()).await;
        server
            .add_method("test.Echo", "Say", MethodKind::Read, |req: Echo| async move {
                Ok::<_, RpcError>(req)
            })
            .unwrap();
        let stats = server.stats();
        let router = server.into_router();

        for i in 0..200 {
            let path = format!("/junk{i}/x");
            let response = router.clone().oneshot(call(&path, "{}")).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
        }
        router
            .oneshot(call("/test.Echo/Say", r#"{"text":"hi"}"#))
            .await
            .unwrap();

        assert_eq!(stats.count(UNKNOWN_METHOD, Code::Unimplemented), 200);
        assert_eq!(stats.count("test.Echo/Say", Code::Ok), 1);
        assert_eq!(stats.methods_seen(), 2);
    }

    #[tokio::test]
    async fn malformed_request_is_invalid_argument() {
        let mut server = server_with(&ServerConfig::default(), Arc::default()).await;
        server
            .add_method("test.Echo", "Say", MethodKind::Read, |req: Echo| async move {
                Ok::<_, RpcError>(req)
            })
            .unwrap();
        let response = server
            .into_router()
            .oneshot(call("/test.Echo/Say", "{not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_status(response).await.code, Code::InvalidArgument);
    }

    #[tokio::test]
    async fn internal_errors_are_normalized() {
        let mut server = server_with(&ServerConfig::default(), Arc::default()).await;
        server
            .add_method("test.Fail", "Boom", MethodKind::Read, |_: Echo| async move {
                Err::<Echo, _>(RpcError::Internal("disk on fire".into()))
            })
            .unwrap();
        let response = server
            .into_router()
            .oneshot(call("/test.Fail/Boom", r#"{"text":""}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[STATUS_HEADER], "internal");
        let status = body_status(response).await;
        assert_eq!(status.code, Code::Internal);
        assert_eq!(status.message, "disk on fire");
    }

    #[tokio::test]
    async fn quota_rejection_is_recorded_once_before_handler_runs() {
        let quota = Arc::new(FakeQuota {
            reject: true,
            ..Default::default()
        });
        let invoked = Arc::new(AtomicUsize::new(0));
        let mut server = server_with(&ServerConfig::default(), quota.clone()).await;
        let seen = invoked.clone();
        server
            .add_method("test.Fail", "Write", MethodKind::Write, move |_: Echo| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Err::<Echo, _>(RpcError::Internal("would fail".into()))
                }
            })
            .unwrap();
        let stats = server.stats();

        let mut request = call("/test.Fail/Write", r#"{"text":""}"#);
        request
            .headers_mut()
            .insert(TREE_ID_HEADER, HeaderValue::from_static("7"));
        let response = server.into_router().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let status = body_status(response).await;
        assert_eq!(status.code, Code::ResourceExhausted);
        assert!(status.message.contains("trees/7/write"));

        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(stats.count("test.Fail/Write", Code::ResourceExhausted), 1);
        assert_eq!(stats.count("test.Fail/Write", Code::Internal), 0);
        assert_eq!(stats.total("test.Fail/Write"), 1);
        // Nothing was charged, so nothing is returned.
        assert_eq!(quota.puts.load(Ordering::SeqCst), 0);
    }

    async fn dry_run_call(policy: DryRunStats) -> (Response, Arc<RpcStats>) {
        let mut config = ServerConfig::default();
        config.quota.dry_run = true;
        config.quota.dry_run_stats = policy;
        let quota = Arc::new(FakeQuota {
            reject: true,
            ..Default::default()
        });
        let mut server = server_with(&config, quota).await;
        server
            .add_method("test.Echo", "Say", MethodKind::Read, |req: Echo| async move {
                Ok::<_, RpcError>(req)
            })
            .unwrap();
        let stats = server.stats();
        let response = server
            .into_router()
            .oneshot(call("/test.Echo/Say", r#"{"text":"hi"}"#))
            .await
            .unwrap();
        (response, stats)
    }

    #[tokio::test]
    async fn dry_run_never_blocks() {
        let (response, stats) = dry_run_call(DryRunStats::RecordOutcome).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[DRY_RUN_REJECTED], "true");
        assert_eq!(stats.count("test.Echo/Say", Code::Ok), 1);
        assert_eq!(stats.count("test.Echo/Say", Code::ResourceExhausted), 0);
    }

    #[tokio::test]
    async fn dry_run_can_be_recorded_as_rejection() {
        let (response, stats) = dry_run_call(DryRunStats::RecordRejection).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(stats.count("test.Echo/Say", Code::ResourceExhausted), 1);
        assert_eq!(stats.count("test.Echo/Say", Code::Ok), 0);
    }

    #[tokio::test]
    async fn failed_write_returns_tokens() {
        let quota = Arc::new(FakeQuota::default());
        let mut server = server_with(&ServerConfig::default(), quota.clone()).await;
        server
            .add_method("test.Fail", "Write", MethodKind::Write, |_: Echo| async move {
                Err::<Echo, _>(RpcError::Internal("boom".into()))
            })
            .unwrap();
        server
            .add_method("test.Fail", "Read", MethodKind::Read, |_: Echo| async move {
                Err::<Echo, _>(RpcError::Internal("boom".into()))
            })
            .unwrap();
        let router = server.into_router();

        router
            .clone()
            .oneshot(call("/test.Fail/Write", r#"{"text":""}"#))
            .await
            .unwrap();
        router
            .oneshot(call("/test.Fail/Read", r#"{"text":""}"#))
            .await
            .unwrap();
        assert_eq!(quota.gets.load(Ordering::SeqCst), 2);
        assert_eq!(quota.puts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn admin_methods_skip_quota() {
        let quota = Arc::new(FakeQuota {
            reject: true,
            ..Default::default()
        });
        let mut server = server_with(&ServerConfig::default(), quota.clone()).await;
        server.enable_reflection().unwrap();
        server
            .add_method("test.Echo", "Say", MethodKind::Read, |req: Echo| async move {
                Ok::<_, RpcError>(req)
            })
            .unwrap();

        let response = server
            .into_router()
            .oneshot(call("/logserver.reflection.ServerReflection/ListServices", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(quota.gets.load(Ordering::SeqCst), 0);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let listing: reflection::ListServicesResponse = serde_json::from_slice(&bytes).unwrap();
        let names: Vec<&str> = listing.services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["logserver.reflection.ServerReflection", "test.Echo"]);
    }

    #[tokio::test]
    async fn extra_options_wrap_the_chain() {
        let registry = Registry::with_storage(Arc::new(MemoryStorage::new()));
        let option: ServerOption = Box::new(|router: Router| {
            router.layer(tower_http::set_header::SetResponseHeaderLayer::overriding(
                axum::http::header::SERVER,
                HeaderValue::from_static("logserver"),
            ))
        });
        let server = RpcServer::new(&ServerConfig::default(), &registry, vec![option])
            .await
            .unwrap();
        let response = server.into_router().oneshot(call("/x/Y", "{}")).await.unwrap();
        assert_eq!(response.headers()[axum::http::header::SERVER], "logserver");
    }

    #[tokio::test]
    async fn half_tls_configuration_fails_construction() {
        let mut config = ServerConfig::default();
        config.tls.cert_file = Some("server.crt".to_string());
        let registry = Registry::with_storage(Arc::new(MemoryStorage::new()));

        let err = RpcServer::new(&config, &registry, Vec::new()).await.err().unwrap();
        assert!(matches!(err, Error::Tls(_)));
    }

    #[tokio::test]
    async fn plaintext_without_tls_files() {
        let server = server_with(&ServerConfig::default(), Arc::default()).await;
        assert!(!server.is_tls());
    }
}
