use anyhow::Result;
use sqlx::Executor;

use crate::init::Connection;

/// Ensure the task and deal tables exist. Idempotent.
///
/// The `(date, start_time, end_time)` uniqueness lives here as a table
/// constraint so duplicate task creation fails atomically inside the
/// insert, never as a check-then-insert race. The deals FK carries
/// ON DELETE CASCADE as a safety net, but large deletions go through the
/// batched path in `delete` so a single statement never has to cascade
/// over an unbounded row set.
pub async fn ensure_schema(pool: &Connection) -> Result<()> {
    let create_tasks = r#"
    CREATE TABLE IF NOT EXISTS deal_tasks (
        id         BIGSERIAL    PRIMARY KEY,
        date       DATE         NOT NULL,
        start_time TIME         NOT NULL,
        end_time   TIME         NOT NULL,
        status     TEXT         NOT NULL DEFAULT 'PENDING'
            CHECK (status IN ('PENDING', 'PROCESSING', 'SUCCESS', 'FAILED')),
        created_at TIMESTAMPTZ  NOT NULL DEFAULT NOW(),
        CONSTRAINT uq_task_period UNIQUE (date, start_time, end_time),
        CONSTRAINT ck_task_window CHECK (start_time < end_time)
    );
    "#;

    // Vendor identifiers that can exceed 32-bit range are BIGINT.
    let create_deals = r#"
    CREATE TABLE IF NOT EXISTS deals (
        deal_id            BIGINT           PRIMARY KEY,
        action             INTEGER          NOT NULL,
        comment            VARCHAR(32)      NOT NULL,
        commission         DOUBLE PRECISION NOT NULL,
        contract_size      DOUBLE PRECISION NOT NULL,
        dealer             BIGINT           NOT NULL,
        digits             INTEGER          NOT NULL,
        digits_currency    INTEGER          NOT NULL,
        entry              INTEGER          NOT NULL,
        expert_id          BIGINT           NOT NULL,
        external_id        VARCHAR(32)      NOT NULL,
        fee                DOUBLE PRECISION NOT NULL,
        flags              BIGINT           NOT NULL,
        gateway            VARCHAR(16)      NOT NULL,
        login              BIGINT           NOT NULL,
        market_ask         DOUBLE PRECISION NOT NULL,
        market_bid         DOUBLE PRECISION NOT NULL,
        market_last        DOUBLE PRECISION NOT NULL,
        modification_flags INTEGER          NOT NULL,
        obsolete_value     DOUBLE PRECISION NOT NULL,
        order_id           BIGINT,
        position_id        BIGINT           NOT NULL,
        price              DOUBLE PRECISION NOT NULL,
        price_gateway      DOUBLE PRECISION NOT NULL,
        price_position     DOUBLE PRECISION NOT NULL,
        price_sl           DOUBLE PRECISION NOT NULL,
        price_tp           DOUBLE PRECISION NOT NULL,
        profit             DOUBLE PRECISION NOT NULL,
        profit_raw         DOUBLE PRECISION NOT NULL,
        rate_margin        DOUBLE PRECISION NOT NULL,
        rate_profit        DOUBLE PRECISION NOT NULL,
        reason             INTEGER          NOT NULL,
        storage            DOUBLE PRECISION NOT NULL,
        symbol             VARCHAR(32)      NOT NULL,
        tick_size          DOUBLE PRECISION NOT NULL,
        tick_value         DOUBLE PRECISION NOT NULL,
        time               TIMESTAMP        NOT NULL,
        time_msc           BIGINT           NOT NULL,
        value              DOUBLE PRECISION NOT NULL,
        volume             BIGINT           NOT NULL,
        volume_closed      BIGINT           NOT NULL,
        volume_closed_ext  BIGINT           NOT NULL,
        volume_ext         BIGINT           NOT NULL,
        task_id            BIGINT           NOT NULL
            REFERENCES deal_tasks(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS ix_deals_login_time ON deals (login, time);
    CREATE INDEX IF NOT EXISTS ix_deals_task ON deals (task_id);
    "#;

    pool.execute(create_tasks).await?;
    pool.execute(create_deals).await?;
    Ok(())
}
