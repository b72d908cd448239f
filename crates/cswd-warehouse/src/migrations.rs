use ::duckdb::Connection;

struct Migration {
    version: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_series_tables",
        sql: r#"
CREATE TABLE IF NOT EXISTS stock_daily (
    code TEXT NOT NULL,
    date DATE NOT NULL,
    short_name TEXT,
    open DOUBLE,
    high DOUBLE,
    low DOUBLE,
    close DOUBLE,
    prev_close DOUBLE,
    change_pct DOUBLE,
    volume BIGINT,
    amount DOUBLE,
    turnover DOUBLE,
    tmv DOUBLE,
    cmv DOUBLE,
    last_updated TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY(code, date)
);

CREATE TABLE IF NOT EXISTS index_daily (
    code TEXT NOT NULL,
    date DATE NOT NULL,
    open DOUBLE,
    high DOUBLE,
    low DOUBLE,
    close DOUBLE,
    volume BIGINT,
    amount DOUBLE,
    change_pct DOUBLE,
    last_updated TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY(code, date)
);

CREATE TABLE IF NOT EXISTS adjustments (
    code TEXT NOT NULL,
    date DATE NOT NULL,
    annual TEXT,
    amount DOUBLE,
    ratio DOUBLE,
    record_date DATE,
    pay_date DATE,
    listing_date DATE,
    last_updated TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY(code, date)
);

CREATE TABLE IF NOT EXISTS finance_reports (
    code TEXT NOT NULL,
    date DATE NOT NULL,
    announcement_date DATE,
    A001 DOUBLE,
    A025 DOUBLE,
    A052 DOUBLE,
    A094 DOUBLE,
    A108 DOUBLE,
    B001 DOUBLE,
    B027 DOUBLE,
    C025 DOUBLE,
    D001 DOUBLE,
    D010 DOUBLE,
    last_updated TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY(code, date)
);
"#,
    },
    Migration {
        version: "0002_reference_tables",
        sql: r#"
CREATE TABLE IF NOT EXISTS trading_calendar (
    date DATE PRIMARY KEY,
    is_trading BOOLEAN NOT NULL,
    last_updated TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS instruments (
    code TEXT NOT NULL,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    status SMALLINT NOT NULL,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY(code, kind)
);

CREATE SEQUENCE IF NOT EXISTS refresh_log_seq;

CREATE TABLE IF NOT EXISTS refresh_log (
    id BIGINT PRIMARY KEY DEFAULT nextval('refresh_log_seq'),
    table_name TEXT NOT NULL,
    code TEXT,
    outcome TEXT NOT NULL,
    row_count BIGINT NOT NULL,
    start_date DATE,
    end_date DATE,
    message TEXT,
    logged_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    },
    Migration {
        version: "0003_indexes",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_stock_daily_date ON stock_daily(date);
CREATE INDEX IF NOT EXISTS idx_index_daily_date ON index_daily(date);
CREATE INDEX IF NOT EXISTS idx_finance_reports_date ON finance_reports(date);
CREATE INDEX IF NOT EXISTS idx_refresh_log_table ON refresh_log(table_name, code);
"#,
    },
];

pub fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        let applied_count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
            [migration.version],
            |row| row.get(0),
        )?;

        if applied_count == 0 {
            connection.execute_batch(migration.sql)?;
            connection.execute(
                "INSERT INTO schema_migrations (version) VALUES (?)",
                [migration.version],
            )?;
            tracing::debug!(version = migration.version, "applied migration");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CATALOGUE;

    #[test]
    fn migrations_are_idempotent() {
        let connection = Connection::open_in_memory().expect("in-memory db");
        apply_migrations(&connection).expect("first run");
        apply_migrations(&connection).expect("second run");

        let count: i64 = connection
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, MIGRATIONS.len() as i64);
    }

    #[test]
    fn tables_match_the_catalogue() {
        let connection = Connection::open_in_memory().expect("in-memory db");
        apply_migrations(&connection).expect("migrate");

        for schema in CATALOGUE {
            for column in schema.columns {
                let found: i64 = connection
                    .query_row(
                        "SELECT COUNT(*) FROM information_schema.columns \
                         WHERE table_name = ? AND lower(column_name) = lower(?)",
                        [schema.name, column.code],
                        |row| row.get(0),
                    )
                    .expect("lookup");
                assert_eq!(found, 1, "{}.{} missing", schema.name, column.code);
            }
        }
    }
}
