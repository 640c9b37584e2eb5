use anyhow::{Context, anyhow};
use sqlx::{Pool, Postgres};

/// Shared database connection type for the project.
pub type Connection = Pool<Postgres>;

fn synthesize_pg_url_from_hostlike(host_like: &str) -> String {
    // Accept formats: "host", "host:port"
    let parts: Vec<&str> = host_like.split(':').collect();
    let (host, port) = match parts.as_slice() {
        [h, p] => (*h, *p),
        [h] => (*h, "5432"),
        _ => ("127.0.0.1", "5432"),
    };
    let user = std::env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string());
    let pass = std::env::var("POSTGRES_PASSWORD").unwrap_or_else(|_| "postgres".to_string());
    let db = std::env::var("DX_DB").unwrap_or_else(|_| "deal_data_db".to_string());
    format!("postgres://{}:{}@{}:{}/{}", user, pass, host, port, db)
}

/// Best-effort: load environment variables from .env if present.
fn load_env_best_effort() {
    let _ = dotenvy::from_filename(".env").or_else(|_| dotenvy::from_filename(".env.example"));
}

/// Build a lazy Postgres pool from the environment.
///
/// `DATABASE_URL` may be a full postgres URL or a short host-like form such
/// as "127.0.0.1:5432"; in the latter case the full URL is synthesized from
/// `POSTGRES_USER`, `POSTGRES_PASSWORD` and `DX_DB`.
pub fn pool_from_env() -> anyhow::Result<Connection> {
    load_env_best_effort();

    let raw = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow!("DATABASE_URL not set. Ensure .env exists or export it."))?;

    let url = if raw.contains("://") {
        raw
    } else {
        synthesize_pg_url_from_hostlike(&raw)
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(
            std::env::var("DX_DB_MAX_CONNS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8),
        )
        .connect_lazy(&url)
        .with_context(|| format!("failed to create Postgres pool (lazy) for URL '{}'", url))?;
    Ok(pool)
}
