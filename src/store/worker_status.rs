use sqlx::PgPool;

pub async fn record_success(pool: &PgPool, worker_name: &str) -> Result<(), sqlx::Error> {
    sqlx::query!(
        r#"
        INSERT INTO worker_status (worker_name, last_run_at, consecutive_failures)
        VALUES ($1, now(), 0)
        ON CONFLICT (worker_name) DO UPDATE SET
            last_run_at = now(),
            last_error = NULL,
            consecutive_failures = 0
        "#,
        worker_name
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn record_failure(
    pool: &PgPool,
    worker_name: &str,
    error: &str,
) -> Result<i32, sqlx::Error> {
    let row = sqlx::query!(
        r#"
        INSERT INTO worker_status (worker_name, last_run_at, last_error, consecutive_failures)
        VALUES ($1, now(), $2, 1)
        ON CONFLICT (worker_name) DO UPDATE SET
            last_run_at = now(),
            last_error = $2,
            consecutive_failures = worker_status.consecutive_failures + 1
        RETURNING consecutive_failures
        "#,
        worker_name,
        error
    )
    .fetch_one(pool)
    .await?;
    Ok(row.consecutive_failures)
}
