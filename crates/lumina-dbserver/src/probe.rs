//! Bounded wait for the just-launched server to accept connections.

use crate::process::ServerHandle;
use crate::transport::ConnectTransport;
use crate::{DATABASE_NAME, ServerError, ServerResult};

use std::panic::Location;
use std::time::Duration;

use async_trait::async_trait;
use error_location::ErrorLocation;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{ConnectOptions, Connection};
use tracing::{debug, info};

const PROBE_ATTEMPTS: u32 = 120;
const PROBE_WAIT: Duration = Duration::from_millis(500);

/// Waits for the server to accept client connections and makes sure
/// the application database exists.
#[async_trait]
pub trait ConnectionProbe: Send + Sync {
    async fn wait_and_prepare(
        &self,
        transport: &ConnectTransport,
        handle: &mut dyn ServerHandle,
    ) -> ServerResult<()>;
}

/// Production probe using a short-lived administrative MySQL
/// connection with no database selected.
#[derive(Debug, Clone)]
pub struct MysqlProbe {
    pub database: String,
    pub attempts: u32,
}

impl Default for MysqlProbe {
    fn default() -> Self {
        Self {
            database: DATABASE_NAME.to_string(),
            attempts: PROBE_ATTEMPTS,
        }
    }
}

impl MysqlProbe {
    fn connect_options(transport: &ConnectTransport) -> MySqlConnectOptions {
        let options = MySqlConnectOptions::new().username("root");

        match transport {
            ConnectTransport::Socket(path) => options.socket(path),
            ConnectTransport::Tcp(port) => options.host("localhost").port(*port),
        }
    }

    /// Select the application database, creating it on first start.
    async fn ensure_database(&self, conn: &mut MySqlConnection) -> ServerResult<()> {
        let use_error = match sqlx::query(&format!("USE `{}`;", self.database))
            .execute(&mut *conn)
            .await
        {
            Ok(_) => return Ok(()),
            Err(err) => err,
        };

        debug!("Failed to select database {}: {use_error}", self.database);
        info!("Trying to create database {} now", self.database);

        match sqlx::query(&format!("CREATE DATABASE `{}`;", self.database))
            .execute(&mut *conn)
            .await
        {
            Ok(_) => {
                info!("Database {} was successfully created", self.database);
                Ok(())
            }
            Err(create_error) => Err(ServerError::CreateDatabaseFailed {
                database: self.database.clone(),
                query_error: create_error.to_string(),
                server_error: use_error.to_string(),
                location: ErrorLocation::from(Location::caller()),
            }),
        }
    }
}

#[async_trait]
impl ConnectionProbe for MysqlProbe {
    /// Retry the connection with a bounded budget, aborting early when
    /// the server process itself exits during the wait. The per-attempt
    /// process wait doubles as the retry delay.
    async fn wait_and_prepare(
        &self,
        transport: &ConnectTransport,
        handle: &mut dyn ServerHandle,
    ) -> ServerResult<()> {
        let options = Self::connect_options(transport);
        let mut last_error = String::new();

        for attempt in 0..self.attempts {
            match options.connect().await {
                Ok(mut conn) => {
                    debug!("Server accepted connections after {attempt} attempts");

                    let prepared = self.ensure_database(&mut conn).await;
                    conn.close().await.ok();

                    return prepared;
                }
                Err(err) => last_error = err.to_string(),
            }

            if let Some(output) = handle.wait_exit(PROBE_WAIT).await {
                return Err(ServerError::ServerExited {
                    context: "Database process exited unexpectedly during initial connection.",
                    report: output.report(),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        }

        Err(ServerError::ConnectTimeout {
            seconds: (u64::from(self.attempts) * PROBE_WAIT.as_millis() as u64) / 1000,
            last_error,
            location: ErrorLocation::from(Location::caller()),
        })
    }
}
