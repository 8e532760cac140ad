//! Database Test Utilities
//!
//! Testcontainer management for PostgreSQL integration tests, plus seed and
//! inspection helpers for the ledger tables. Tests using these helpers need a
//! Docker daemon and are marked `#[ignore]`.

use chrono::NaiveDate;
use core_kernel::{ClientRecordId, Email};
use infra_db::ClientRow;
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};
use tokio::sync::OnceCell;

/// Default PostgreSQL image for testing
const POSTGRES_IMAGE: &str = "postgres";
const POSTGRES_TAG: &str = "16-alpine";
const POSTGRES_USER: &str = "test_user";
const POSTGRES_PASSWORD: &str = "test_password";
const POSTGRES_DB: &str = "ledger_test";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Configuration for test database
#[derive(Debug, Clone)]
pub struct TestDatabaseConfig {
    pub user: String,
    pub password: String,
    pub database: String,
    pub host: String,
    pub port: u16,
}

impl Default for TestDatabaseConfig {
    fn default() -> Self {
        Self {
            user: POSTGRES_USER.to_string(),
            password: POSTGRES_PASSWORD.to_string(),
            database: POSTGRES_DB.to_string(),
            host: "localhost".to_string(),
            port: 5432,
        }
    }
}

impl TestDatabaseConfig {
    /// Creates the database connection URL
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

/// A wrapper around a PostgreSQL test container
pub struct TestDatabase {
    _container: ContainerAsync<GenericImage>,
    pub config: TestDatabaseConfig,
    pub pool: PgPool,
}

impl TestDatabase {
    /// Starts a new PostgreSQL container with the ledger schema applied
    pub async fn new() -> Result<Self, BoxError> {
        let container = GenericImage::new(POSTGRES_IMAGE, POSTGRES_TAG)
            .with_exposed_port(5432.tcp())
            .with_wait_for(WaitFor::message_on_stderr(
                "database system is ready to accept connections",
            ))
            .with_env_var("POSTGRES_USER", POSTGRES_USER)
            .with_env_var("POSTGRES_PASSWORD", POSTGRES_PASSWORD)
            .with_env_var("POSTGRES_DB", POSTGRES_DB)
            .start()
            .await?;

        let port = container.get_host_port_ipv4(5432).await?;
        let host = container.get_host().await?.to_string();

        let config = TestDatabaseConfig {
            host,
            port,
            ..TestDatabaseConfig::default()
        };

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&config.connection_url())
            .await?;

        let test_db = Self {
            _container: container,
            config,
            pool,
        };
        test_db.init_schema().await?;

        Ok(test_db)
    }

    async fn init_schema(&self) -> Result<(), BoxError> {
        let schema = include_str!("../../../migrations/20240101_000001_initial_schema.sql");
        sqlx::raw_sql(schema).execute(&self.pool).await?;
        Ok(())
    }

    /// Returns a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Opens a new pool bound to the calling test's runtime
    ///
    /// Each `#[tokio::test]` runs its own runtime, so tests using the shared
    /// database must not reuse the pool created by whichever test started it.
    pub async fn connect(&self) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&self.config.connection_url())
            .await
    }

    /// Clears all ledger data and resets id sequences
    pub async fn clear_data(&self) -> Result<(), BoxError> {
        sqlx::query(
            "TRUNCATE TABLE client_advisor_association, clients, advisors RESTART IDENTITY CASCADE",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Global test database for shared integration tests
static SHARED_TEST_DB: OnceCell<Arc<TestDatabase>> = OnceCell::const_new();

/// Gets or creates a shared test database instance
///
/// Tests sharing it must use distinct identities
/// (see [`EmailFixtures::unique_payer`](crate::fixtures::EmailFixtures::unique_payer)).
///
/// # Panics
///
/// Panics if the database fails to initialize
pub async fn get_shared_test_database() -> Arc<TestDatabase> {
    SHARED_TEST_DB
        .get_or_init(|| async {
            Arc::new(
                TestDatabase::new()
                    .await
                    .expect("Failed to create shared test database"),
            )
        })
        .await
        .clone()
}

/// Creates an isolated test database for a single test
pub async fn create_isolated_test_database() -> Result<TestDatabase, BoxError> {
    TestDatabase::new().await
}

/// A `clients` row to seed
#[derive(Debug, Clone)]
pub struct SeedClient {
    pub email: Email,
    pub payment_choice: String,
    pub client_name_first: Option<String>,
    pub client_name_last: Option<String>,
    pub total_billing_amount: Decimal,
    pub total_payment_amount_received: Decimal,
    pub payment_start_date: Option<NaiveDate>,
}

impl SeedClient {
    /// An obligation on the "Monthly" plan
    pub fn obligation(
        email: &Email,
        billing: Decimal,
        received: Decimal,
        start: Option<NaiveDate>,
    ) -> Self {
        Self {
            email: email.clone(),
            payment_choice: "Monthly".to_string(),
            client_name_first: Some("Ada".to_string()),
            client_name_last: Some("Lovelace".to_string()),
            total_billing_amount: billing,
            total_payment_amount_received: received,
            payment_start_date: start,
        }
    }

    /// An overflow record holding `received`
    pub fn overflow(email: &Email, received: Decimal) -> Self {
        Self {
            payment_choice: domain_billing::OVERFLOW_PAYMENT_CHOICE.to_string(),
            total_billing_amount: Decimal::ZERO,
            payment_start_date: None,
            ..Self::obligation(email, Decimal::ZERO, received, None)
        }
    }
}

/// Inserts a client row and returns its id
pub async fn seed_client(
    pool: &PgPool,
    client: &SeedClient,
) -> Result<ClientRecordId, sqlx::Error> {
    let id = sqlx::query_scalar::<_, i32>(
        r#"
        INSERT INTO clients (
            client_name_first, client_name_last, payment_choice, total_billing_amount,
            total_payment_amount_received, payment_start_date, email
        ) VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(&client.client_name_first)
    .bind(&client.client_name_last)
    .bind(&client.payment_choice)
    .bind(client.total_billing_amount)
    .bind(client.total_payment_amount_received)
    .bind(client.payment_start_date)
    .bind(client.email.as_str())
    .fetch_one(pool)
    .await?;
    Ok(ClientRecordId::new(id))
}

/// Inserts an advisor and returns its id
pub async fn seed_advisor(pool: &PgPool, name: &str) -> Result<i32, sqlx::Error> {
    sqlx::query_scalar::<_, i32>("INSERT INTO advisors (advisor_name) VALUES ($1) RETURNING id")
        .bind(name)
        .fetch_one(pool)
        .await
}

/// Associates an advisor with a client
pub async fn seed_association(
    pool: &PgPool,
    client_id: ClientRecordId,
    advisor_id: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO client_advisor_association (client_id, advisor_id) VALUES ($1, $2)")
        .bind(client_id.get())
        .bind(advisor_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Returns every client row of an identity, ordered by id
pub async fn fetch_clients(pool: &PgPool, email: &Email) -> Result<Vec<ClientRow>, sqlx::Error> {
    sqlx::query_as::<_, ClientRow>(
        r#"
        SELECT id, email, payment_choice, client_name_first, client_name_last,
               total_billing_amount, total_payment_amount_received, payment_start_date
        FROM clients
        WHERE email = $1
        ORDER BY id
        "#,
    )
    .bind(email.as_str())
    .fetch_all(pool)
    .await
}

/// Returns the advisor ids associated with a client
pub async fn fetch_advisor_ids(
    pool: &PgPool,
    client_id: ClientRecordId,
) -> Result<Vec<i32>, sqlx::Error> {
    sqlx::query_scalar::<_, i32>(
        r#"
        SELECT advisor_id FROM client_advisor_association
        WHERE client_id = $1
        ORDER BY advisor_id
        "#,
    )
    .bind(client_id.get())
    .fetch_all(pool)
    .await
}
