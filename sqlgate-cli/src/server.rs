use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sqlgate_server::{create_pool_with_options, run_server, PoolOptions, ServerConfig};
use tracing::info;

#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind the HTTP server to
    #[arg(long, env = "SQLGATE_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to bind the HTTP server to
    #[arg(long, env = "SQLGATE_PORT", default_value_t = 8080)]
    pub port: u16,

    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    /// Maximum number of pooled connections
    #[arg(long, env = "SQLGATE_MAX_CONNECTIONS", default_value_t = 10)]
    pub max_connections: u32,

    /// Seconds a request may wait for a free connection
    #[arg(long, env = "SQLGATE_ACQUIRE_TIMEOUT", default_value_t = 30)]
    pub acquire_timeout: u64,

    /// Seconds before a request is abandoned with 408
    #[arg(long, env = "SQLGATE_REQUEST_TIMEOUT", default_value_t = 60)]
    pub request_timeout: u64,

    /// Allow cross-origin requests from any origin
    #[arg(long, env = "SQLGATE_CORS_PERMISSIVE")]
    pub cors_permissive: bool,
}

impl ServeArgs {
    fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            max_connections: self.max_connections,
            acquire_timeout: Duration::from_secs(self.acquire_timeout),
        }
    }

    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_addr: SocketAddr::new(self.host, self.port),
            cors_permissive: self.cors_permissive,
            request_timeout: Duration::from_secs(self.request_timeout),
        }
    }
}

pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let options = args.pool_options();
    let pool = create_pool_with_options(&args.database_url, &options)
        .context("invalid DATABASE_URL")?;
    info!(
        max_connections = options.max_connections,
        acquire_timeout_secs = args.acquire_timeout,
        "Connection pool ready (connects on first use)"
    );

    run_server(Arc::new(pool), args.server_config()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_listener() {
        let args = ServeArgs::try_parse_from(["serve", "--database-url", "postgres://localhost/db"])
            .unwrap();
        let config = args.server_config();
        assert_eq!(config.bind_addr, SocketAddr::from(([0, 0, 0, 0], 8080)));
        assert_eq!(args.pool_options().max_connections, 10);
        assert_eq!(config.request_timeout, Duration::from_secs(60));
    }

    #[test]
    fn flags_override_defaults() {
        let args = ServeArgs::try_parse_from([
            "serve",
            "--database-url",
            "postgres://localhost/db",
            "--host",
            "127.0.0.1",
            "--port",
            "9000",
            "--max-connections",
            "2",
            "--acquire-timeout",
            "5",
        ])
        .unwrap();

        assert_eq!(
            args.server_config().bind_addr,
            SocketAddr::from(([127, 0, 0, 1], 9000))
        );
        let options = args.pool_options();
        assert_eq!(options.max_connections, 2);
        assert_eq!(options.acquire_timeout, Duration::from_secs(5));
    }
}
