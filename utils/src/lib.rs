use sqlx::postgres::PgPoolOptions;

/// Default size of the Postgres connection pool used by [`init_pool`].
const DEFAULT_POOL_SIZE: u32 = 10;

/// Build a Postgres connection pool from the `DATABASE_URL` environment variable.
///
/// # Panics
/// This function panics if:
/// - `DATABASE_URL` is not set.
/// - A connection to the database cannot be established.
pub async fn init_pool() -> sqlx::PgPool {
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set to connect to Postgres.");

    PgPoolOptions::new()
        .max_connections(DEFAULT_POOL_SIZE)
        .connect(&database_url)
        .await
        .expect("Connecting to the database should not throw an error.")
}

/// Run database migrations on the database.
///
/// # Panics
/// This method panics if running the migrations throws an error.
pub async fn migrate(pool: &sqlx::PgPool) {
    sqlx::migrate!("../search-core/migrations")
        .run(pool)
        .await
        .expect("Database migrations should not throw an error.");
}
