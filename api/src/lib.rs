pub mod attack;
pub mod password;
pub mod routes;
pub mod scheduler;
pub mod solved_ac;
pub mod store;
pub mod telemetry;
pub mod time;

use actix_cors::Cors;
use actix_identity::IdentityMiddleware;
use actix_session::{
    SessionMiddleware, config::BrowserSession, storage::CookieSessionStore,
};
use actix_web::cookie::{Key, time::Duration};
use actix_web::dev::Server;
use actix_web::{App, HttpServer, web};
use anyhow::Context;
use sqlx::PgPool;
use std::collections::HashSet;
use std::net::TcpListener;

use crate::solved_ac::SolveChecker;
use crate::time::TimeSource;

pub const DEFAULT_SOLVED_AC_URL: &str = "https://solved.ac/api/v3";

/// Build the server, but not await it.
///
/// Returns the port that the server has bound to by modifying the config.
pub async fn build(
    config: &mut Config,
    time_source: TimeSource,
    checker: SolveChecker,
) -> anyhow::Result<Server> {
    let secret_key = Key::generate(); // key for signing session cookies
    let db_pool = web::Data::new(
        PgPool::connect(&config.database_url)
            .await
            .context("Failed to connect to the database")?,
    );
    let time_source = web::Data::new(time_source);
    let checker = web::Data::new(checker);
    let admins = web::Data::new(AdminPolicy::new(&config.admin_handles));

    let allowed_origins = config.allowed_origins.clone();

    // OS assigns the port if binding to 0
    let listener = TcpListener::bind(format!("{}:{}", config.ip, config.port))?;
    config.port = listener.local_addr()?.port();
    let server = HttpServer::new(move || {
        let cors = if allowed_origins.iter().any(|origin| origin == "*") {
            Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .supports_credentials()
        } else {
            allowed_origins.iter().fold(
                Cors::default()
                    .allow_any_method()
                    .allow_any_header()
                    .supports_credentials(),
                |cors, origin| cors.allowed_origin(origin),
            )
        };

        App::new()
            .wrap(cors)
            // Use signed cookie to track user id
            .wrap(IdentityMiddleware::default())
            .wrap(
                SessionMiddleware::builder(
                    CookieSessionStore::default(),
                    secret_key.clone(),
                )
                .cookie_name("raidboard".into())
                .session_lifecycle(
                    BrowserSession::default().state_ttl(Duration::days(30)),
                )
                .build(),
            )
            .service(routes::api_services())
            .app_data(db_pool.clone())
            .app_data(time_source.clone())
            .app_data(checker.clone())
            .app_data(admins.clone())
    })
    .listen(listener)?
    .run();
    Ok(server)
}

/// Which users may manage raids. Injected at startup rather than compared
/// against a fixed identity inside the routes.
#[derive(Debug, Clone, Default)]
pub struct AdminPolicy {
    handles: HashSet<String>,
}

impl AdminPolicy {
    pub fn new(handles: &[String]) -> Self {
        Self {
            handles: handles.iter().cloned().collect(),
        }
    }

    pub fn is_admin(&self, user: &store::User) -> bool {
        self.handles.contains(&user.handle)
    }
}

pub struct Config {
    pub database_url: String,
    /// set to "0.0.0.0" for public access, "127.0.0.1" for local dev
    pub ip: String,
    /// set to 0 to get an os-assigned port
    pub port: u16,
    /// List of allowed CORS origins. Use "*" to allow any origin (development only)
    pub allowed_origins: Vec<String>,
    /// Judge handles with administrator access
    pub admin_handles: Vec<String>,
    pub solved_ac_url: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        use std::env::var;

        Ok(Config {
            database_url: var("DATABASE_URL").context("DATABASE_URL")?,
            ip: var("IP_ADDRESS").context("IP_ADDRESS")?,
            port: var("PORT")
                .context("PORT")?
                .parse()
                .context("PORT must be a port number")?,
            // default to any origin for development
            allowed_origins: split_list(
                &var("ALLOWED_ORIGINS").unwrap_or_else(|_| "*".to_string()),
            ),
            admin_handles: split_list(
                &var("ADMIN_HANDLES").unwrap_or_default(),
            ),
            solved_ac_url: var("SOLVED_AC_URL")
                .unwrap_or_else(|_| DEFAULT_SOLVED_AC_URL.to_string()),
        })
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
