pub mod engine;
pub mod lock;
pub mod money;
pub mod monitor_eval;
pub mod notifier;
pub mod orchestrator;
pub mod queue;
pub mod routes;
pub mod scheduler;
pub mod store;
pub mod telemetry;
pub mod time;

use actix_cors::Cors;
use actix_web::dev::Server;
use actix_web::{App, HttpServer, web};
use redis::aio::ConnectionManager;
use secrecy::SecretBox;
use sqlx::PgPool;
use std::net::TcpListener;
use std::sync::Arc;

use crate::lock::DistributedLock;
use crate::orchestrator::Orchestrator;
use crate::queue::TaskQueue;
use crate::scheduler::Scheduler;
use crate::time::TimeSource;

/// Build the HTTP server and the background scheduler that drains its task
/// queues, but don't run either yet.
///
/// Returns the port that the server has bound to by modifying the config.
#[tracing::instrument(skip(config, time_source))]
pub async fn build(
    config: &mut Config,
    time_source: TimeSource,
) -> std::io::Result<(Server, Scheduler)> {
    let db_pool = PgPool::connect(&config.database_url)
        .await
        .expect("failed to connect to postgres");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("failed to run migrations");

    crate::store::ledger::ensure_general_ledger(&time_source, &db_pool)
        .await
        .expect("failed to provision general ledger");

    let redis_client =
        redis::Client::open(config.redis_url.clone()).expect("invalid REDIS_URL");
    let redis_conn = ConnectionManager::new(redis_client)
        .await
        .expect("failed to connect to redis");

    let lock = DistributedLock::new(redis_conn.clone());
    let queue = TaskQueue::new(redis_conn, config.queue_shard_count);
    let orchestrator = Orchestrator::new(
        db_pool.clone(),
        lock.clone(),
        queue.clone(),
        time_source.clone(),
        config.transaction_max_retries,
    );

    let scheduler = Scheduler::new(
        time_source.clone(),
        std::time::Duration::from_millis(config.scheduler_tick_ms),
        orchestrator.clone(),
        queue.clone(),
        config.webhook_signing_key.clone(),
    );

    let db_pool = web::Data::new(db_pool);
    let time_source = web::Data::new(time_source);
    let orchestrator = web::Data::new(orchestrator);
    let queue = web::Data::new(queue);
    let app_config = web::Data::new(AppConfig {
        webhook_signing_key: config.webhook_signing_key.clone(),
    });

    let allowed_origins = config.allowed_origins.clone();

    let listener = TcpListener::bind(format!("{}:{}", config.ip, config.port))?;
    config.port = listener.local_addr()?.port();
    let server = HttpServer::new(move || {
        let cors = if allowed_origins.contains(&"*".to_string()) {
            Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
        } else {
            let mut cors = Cors::default().allow_any_method().allow_any_header();
            for origin in &allowed_origins {
                cors = cors.allowed_origin(origin);
            }
            cors
        };

        App::new()
            .wrap(cors)
            .wrap(SecurityHeadersMiddleware)
            .service(routes::api_services())
            .app_data(db_pool.clone())
            .app_data(time_source.clone())
            .app_data(orchestrator.clone())
            .app_data(queue.clone())
            .app_data(app_config.clone())
    })
    .listen(listener)?
    .run();
    Ok((server, scheduler))
}

/// Configuration loaded from environment variables at startup.
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    /// set to "0.0.0.0" for public access, "127.0.0.1" for local dev
    pub ip: String,
    /// set to 0 to get an os-assigned port
    pub port: u16,
    /// List of allowed CORS origins. Use "*" to allow any origin (development only)
    pub allowed_origins: Vec<String>,
    /// Signing secret for the `X-Ledger-Signature` webhook HMAC.
    pub webhook_signing_key: Arc<SecretBox<String>>,
    /// TTL, in seconds, for the distributed lock held while applying a
    /// transaction against its source balance.
    pub lock_ttl_seconds: u64,
    /// Number of shard queues transactions are sharded across.
    pub queue_shard_count: u32,
    /// How many times the worker retries a balance update after an
    /// optimistic version conflict before surfacing the failure.
    pub transaction_max_retries: u32,
    /// Poll interval, in milliseconds, for each scheduler loop (shard
    /// workers, the expiry timer and the webhook dispatcher).
    pub scheduler_tick_ms: u64,
}

/// Runtime configuration shared across the application as app_data.
pub struct AppConfig {
    pub webhook_signing_key: Arc<SecretBox<String>>,
}

impl Config {
    pub fn from_env() -> Self {
        use std::env::var;

        let allowed_origins = var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Config {
            database_url: var("DATABASE_URL").expect("DATABASE_URL must be set"),
            redis_url: var("REDIS_URL").expect("REDIS_URL must be set"),
            ip: var("IP_ADDRESS").expect("IP_ADDRESS must be set"),
            port: var("PORT")
                .expect("PORT must be set")
                .parse()
                .expect("PORT must be a valid u16"),
            allowed_origins,
            webhook_signing_key: Arc::new(SecretBox::new(Box::new(
                var("WEBHOOK_SIGNING_KEY")
                    .expect("WEBHOOK_SIGNING_KEY must be set"),
            ))),
            lock_ttl_seconds: var("LOCK_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30 * 60),
            queue_shard_count: var("QUEUE_SHARD_COUNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(crate::queue::DEFAULT_SHARD_COUNT),
            transaction_max_retries: var("TRANSACTION_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            scheduler_tick_ms: var("SCHEDULER_TICK_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(200),
        }
    }
}

/// Middleware to add security headers to API responses
use actix_web::{
    Error,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header::{CACHE_CONTROL, EXPIRES, HeaderValue, PRAGMA},
};
use std::{
    future::{Ready, ready},
    pin::Pin,
    rc::Rc,
};

type LocalBoxFuture<T> = Pin<Box<dyn std::future::Future<Output = T>>>;

pub struct SecurityHeadersMiddleware;

impl<S, B> Transform<S, ServiceRequest> for SecurityHeadersMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>
        + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = SecurityHeadersMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SecurityHeadersMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct SecurityHeadersMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for SecurityHeadersMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>
        + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();

        Box::pin(async move {
            let is_api_endpoint = req.path().starts_with("/api")
                && req.path() != "/api/health_check";

            let res = service.call(req).await?;

            if is_api_endpoint {
                let (req, mut res) = res.into_parts();

                res.headers_mut().insert(
                    CACHE_CONTROL,
                    HeaderValue::from_static(
                        "no-store, no-cache, must-revalidate, private",
                    ),
                );
                res.headers_mut()
                    .insert(PRAGMA, HeaderValue::from_static("no-cache"));
                res.headers_mut()
                    .insert(EXPIRES, HeaderValue::from_static("0"));

                Ok(ServiceResponse::new(req, res))
            } else {
                Ok(res)
            }
        })
    }
}
