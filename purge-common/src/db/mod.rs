use diesel_async::pooled_connection::bb8::Pool as AsyncPool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;
use std::fmt;

pub mod audit;
pub mod auth;
pub mod connected_platform;
pub mod deletion_request;
pub mod erasure;
pub mod job_registry;
pub mod throttle;

pub type DbAsyncPool = AsyncPool<AsyncPgConnection>;
pub type DbAsyncConnection =
    bb8::PooledConnection<'static, AsyncDieselConnectionManager<AsyncPgConnection>>;

pub async fn create_db_async_pool(database_uri: &str, max_db_connections: u32) -> DbAsyncPool {
    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_uri);
    AsyncPool::builder()
        .max_size(max_db_connections)
        .build(config)
        .await
        .expect("Failed to create async DB pool")
}

#[derive(Debug)]
pub enum DaoError {
    DbAsyncPoolFailure(String),
    QueryFailure(diesel::result::Error),
    CannotRunQuery(&'static str),
    WontRunQuery, // This error indicates that the DAO refuses to run a query
}

impl std::error::Error for DaoError {}

impl fmt::Display for DaoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaoError::DbAsyncPoolFailure(e) => {
                write!(f, "DaoError: Failed to obtain async DB connection: {e}")
            }
            DaoError::QueryFailure(e) => {
                write!(f, "DaoError: Query failed: {e}")
            }
            DaoError::CannotRunQuery(msg) => {
                write!(f, "DaoError: Cannot run query: {msg}")
            }
            DaoError::WontRunQuery => {
                write!(f, "DaoError: DAO will not run query")
            }
        }
    }
}

impl<E: std::error::Error + Send + Sync + 'static> From<bb8::RunError<E>> for DaoError {
    fn from(error: bb8::RunError<E>) -> Self {
        DaoError::DbAsyncPoolFailure(error.to_string())
    }
}

impl From<diesel::result::Error> for DaoError {
    fn from(error: diesel::result::Error) -> Self {
        DaoError::QueryFailure(error)
    }
}

#[cfg(test)]
pub mod test_utils {
    use once_cell::sync::Lazy;
    use std::time::SystemTime;
    use uuid::Uuid;

    use diesel::{dsl, ExpressionMethods, QueryDsl};
    use diesel_async::RunQueryDsl;

    use crate::db::{create_db_async_pool, DbAsyncConnection, DbAsyncPool};
    use crate::schema::profiles as profile_fields;
    use crate::schema::profiles::dsl::profiles;
    use crate::schema::users as user_fields;
    use crate::schema::users::dsl::users;
    use crate::threadrand::SecureRng;

    const DB_USERNAME_VAR: &str = "PURGE_DB_USERNAME";
    const DB_PASSWORD_VAR: &str = "PURGE_DB_PASSWORD";
    const DB_HOSTNAME_VAR: &str = "PURGE_DB_HOSTNAME";
    const DB_PORT_VAR: &str = "PURGE_DB_PORT";
    const DB_NAME_VAR: &str = "PURGE_DB_NAME";
    const DB_MAX_CONNECTIONS_VAR: &str = "PURGE_DB_MAX_CONNECTIONS";

    pub static DB_ASYNC_POOL: Lazy<DbAsyncPool> = Lazy::new(|| {
        let username = env_or_panic(DB_USERNAME_VAR);
        let password = env_or_panic(DB_PASSWORD_VAR);
        let hostname = env_or_panic(DB_HOSTNAME_VAR);
        let port = env_or_panic(DB_PORT_VAR);
        let db_name = env_or_panic(DB_NAME_VAR);

        let max_connections = env_or_parse(DB_MAX_CONNECTIONS_VAR, 48u32);

        let db_uri = format!(
            "postgres://{}:{}@{}:{}/{}",
            username, password, hostname, port, db_name
        );

        futures::executor::block_on(create_db_async_pool(&db_uri, max_connections))
    });

    pub fn db_async_pool() -> &'static DbAsyncPool {
        &DB_ASYNC_POOL
    }

    pub async fn db_async_conn() -> DbAsyncConnection {
        DB_ASYNC_POOL
            .get()
            .await
            .expect("Failed to obtain pooled DB connection for tests")
    }

    pub fn unique_email() -> String {
        format!("db-test-{}@purge.test", SecureRng::next_u128())
    }

    pub async fn insert_user(password_hash: Option<&str>, auth_provider: &str) -> Uuid {
        let user_id = Uuid::now_v7();
        let mut conn = db_async_conn().await;

        dsl::insert_into(users)
            .values((
                user_fields::id.eq(user_id),
                user_fields::email.eq(unique_email()),
                user_fields::password_hash.eq(password_hash),
                user_fields::auth_provider.eq(auth_provider),
                user_fields::auth_providers.eq(vec![auth_provider.to_string()]),
                user_fields::created_timestamp.eq(SystemTime::now()),
            ))
            .execute(&mut conn)
            .await
            .expect("Failed to insert test user");

        dsl::insert_into(profiles)
            .values((
                profile_fields::id.eq(user_id),
                profile_fields::display_name.eq(Some("Test User")),
                profile_fields::modified_timestamp.eq(SystemTime::now()),
            ))
            .execute(&mut conn)
            .await
            .expect("Failed to insert test profile");

        user_id
    }

    pub async fn delete_user(user_id: Uuid) {
        if let Ok(mut conn) = db_async_pool().get().await {
            let _ = diesel::delete(profiles.find(user_id))
                .execute(&mut conn)
                .await;
            let _ = diesel::delete(users.find(user_id)).execute(&mut conn).await;
        }
    }

    fn env_or_panic(key: &str) -> String {
        std::env::var(key).unwrap_or_else(|_| panic!("Environment variable {key} must be set"))
    }

    fn env_or_parse<T>(key: &str, default: T) -> T
    where
        T: std::str::FromStr,
    {
        std::env::var(key)
            .ok()
            .and_then(|val| val.parse().ok())
            .unwrap_or(default)
    }
}
