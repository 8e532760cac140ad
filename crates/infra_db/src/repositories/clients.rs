//! Client record queries
//!
//! Every function runs on a borrowed connection so the caller can compose
//! them inside one transaction. Queries are checked at runtime; rows are
//! decoded through [`sqlx::FromRow`].

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgConnection;

use core_kernel::{ClientRecordId, Email};
use domain_billing::{NewOverflowRecord, ObligationRecord, PaymentChoice};

use crate::error::DatabaseError;

/// Ledger-relevant columns of a `clients` row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClientRow {
    pub id: i32,
    pub email: String,
    pub payment_choice: Option<String>,
    pub client_name_first: Option<String>,
    pub client_name_last: Option<String>,
    pub total_billing_amount: Decimal,
    pub total_payment_amount_received: Decimal,
    pub payment_start_date: Option<NaiveDate>,
}

impl TryFrom<ClientRow> for ObligationRecord {
    type Error = DatabaseError;

    fn try_from(row: ClientRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            DatabaseError::QueryFailed(format!("client {} has an invalid email: {}", row.id, e))
        })?;

        Ok(ObligationRecord {
            id: ClientRecordId::new(row.id),
            email,
            payment_choice: PaymentChoice::from_stored(row.payment_choice.as_deref()),
            client_name_first: row.client_name_first,
            client_name_last: row.client_name_last,
            total_billing_amount: row.total_billing_amount,
            total_payment_amount_received: row.total_payment_amount_received,
            payment_start_date: row.payment_start_date,
        })
    }
}

/// Bounds lock waits for the rest of the current transaction
pub async fn set_lock_timeout(
    conn: &mut PgConnection,
    timeout_ms: u64,
) -> Result<(), DatabaseError> {
    sqlx::query("SELECT set_config('lock_timeout', $1, true)")
        .bind(format!("{}ms", timeout_ms))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Takes the transaction-scoped advisory lock for an identity
///
/// Held until commit or rollback. Serializes every ledger operation on the
/// identity, including ones that find no rows to lock.
pub async fn lock_identity(conn: &mut PgConnection, email: &Email) -> Result<(), DatabaseError> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(email.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Reads every record of an identity, overflow included, under row locks
pub async fn select_for_update(
    conn: &mut PgConnection,
    email: &Email,
) -> Result<Vec<ClientRow>, DatabaseError> {
    let rows = sqlx::query_as::<_, ClientRow>(
        r#"
        SELECT id, email, payment_choice, client_name_first, client_name_last,
               total_billing_amount, total_payment_amount_received, payment_start_date
        FROM clients
        WHERE email = $1
        ORDER BY payment_start_date ASC NULLS LAST, id ASC
        FOR UPDATE
        "#,
    )
    .bind(email.as_str())
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

/// Adds `delta` to a record's received total; returns the rows updated
pub async fn add_to_received(
    conn: &mut PgConnection,
    client_id: i32,
    delta: Decimal,
) -> Result<u64, DatabaseError> {
    let result = sqlx::query(
        r#"
        UPDATE clients
        SET total_payment_amount_received = total_payment_amount_received + $2
        WHERE id = $1
        "#,
    )
    .bind(client_id)
    .bind(delta)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Inserts an overflow record and returns its id
pub async fn insert_overflow(
    conn: &mut PgConnection,
    record: &NewOverflowRecord,
) -> Result<i32, DatabaseError> {
    let id = sqlx::query_scalar::<_, i32>(
        r#"
        INSERT INTO clients (
            client_name_first, client_name_last, payment_choice,
            total_billing_amount, total_payment_amount_received, email,
            paying_by_check, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, FALSE, NOW())
        RETURNING id
        "#,
    )
    .bind(&record.client_name_first)
    .bind(&record.client_name_last)
    .bind(record.payment_choice().as_stored())
    .bind(record.total_billing_amount())
    .bind(record.total_payment_amount_received)
    .bind(record.email.as_str())
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

/// Returns the advisor ids associated with a client
pub async fn advisor_ids(
    conn: &mut PgConnection,
    client_id: i32,
) -> Result<Vec<i32>, DatabaseError> {
    let ids = sqlx::query_scalar::<_, i32>(
        r#"
        SELECT advisor_id FROM client_advisor_association
        WHERE client_id = $1
        ORDER BY advisor_id
        "#,
    )
    .bind(client_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(ids)
}

pub async fn insert_association(
    conn: &mut PgConnection,
    client_id: i32,
    advisor_id: i32,
) -> Result<(), DatabaseError> {
    sqlx::query("INSERT INTO client_advisor_association (client_id, advisor_id) VALUES ($1, $2)")
        .bind(client_id)
        .bind(advisor_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Deletes a client's associations, then the client row
///
/// Returns (associations removed, client rows removed).
pub async fn delete_client(
    conn: &mut PgConnection,
    client_id: i32,
) -> Result<(u64, u64), DatabaseError> {
    let associations = sqlx::query("DELETE FROM client_advisor_association WHERE client_id = $1")
        .bind(client_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    let clients = sqlx::query("DELETE FROM clients WHERE id = $1")
        .bind(client_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    Ok((associations, clients))
}
