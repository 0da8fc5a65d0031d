use std::time::Duration;

use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Error as ConnectionError, Pool};
use diesel::RunQueryDsl;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

/// Pins every session to UTC so memo dates and order windows agree.
#[derive(Debug)]
struct UtcSession;

impl CustomizeConnection<PgConnection, ConnectionError> for UtcSession {
    fn on_acquire(&self, conn: &mut PgConnection) -> Result<(), ConnectionError> {
        diesel::sql_query("SET TIME ZONE 'UTC'")
            .execute(conn)
            .map(|_| ())
            .map_err(ConnectionError::QueryError)
    }
}

pub fn create_pool(database_url: &str) -> DbPool {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder()
        .connection_timeout(Duration::from_secs(10))
        .connection_customizer(Box::new(UtcSession))
        .build(manager)
        .expect("Failed to create database connection pool")
}
