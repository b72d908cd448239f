//! Incremental reads and writes over the tables keyed by `(code, date)`.

use std::collections::{BTreeMap, BTreeSet};

use ::duckdb::types::Value as DuckValue;
use ::duckdb::{params_from_iter, Connection};
use time::macros::format_description;
use time::{Date, Duration, PrimitiveDateTime};

use crate::row::validate_batch;
use crate::schema::{ColumnDef, ColumnKind, TableSchema};
use crate::{parse_iso_date, EntityCode, FieldValue, SeriesRow, Warehouse, WarehouseError};

/// Date predicate applied by the chunked queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowFilter {
    Any,
    /// Inclusive on both ends.
    Between(Date, Date),
    Through(Date),
    /// Rows within `tolerance_days` of any listed date.
    Near {
        dates: Vec<Date>,
        tolerance_days: i64,
    },
}

impl RowFilter {
    fn clause(&self, params: &mut Vec<DuckValue>) -> Option<String> {
        match self {
            Self::Any => None,
            Self::Between(start, end) => {
                params.push(date_param(*start));
                params.push(date_param(*end));
                Some(String::from("date BETWEEN CAST(? AS DATE) AND CAST(? AS DATE)"))
            }
            Self::Through(end) => {
                params.push(date_param(*end));
                Some(String::from("date <= CAST(? AS DATE)"))
            }
            Self::Near {
                dates,
                tolerance_days,
            } => {
                if dates.is_empty() {
                    return Some(String::from("FALSE"));
                }
                let tolerance = Duration::days(*tolerance_days);
                let windows = dates
                    .iter()
                    .map(|day| {
                        params.push(date_param(day.saturating_sub(tolerance)));
                        params.push(date_param(day.saturating_add(tolerance)));
                        "date BETWEEN CAST(? AS DATE) AND CAST(? AS DATE)"
                    })
                    .collect::<Vec<_>>();
                Some(format!("({})", windows.join(" OR ")))
            }
        }
    }
}

/// First and last stored dates of one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRange {
    pub code: EntityCode,
    pub first: Date,
    pub last: Date,
}

/// Day an incremental refresh starts from: the day after the last stored
/// date, or `epoch` when nothing is stored yet.
pub fn resume_date(last: Option<Date>, epoch: Date) -> Date {
    last.map_or(epoch, |day| day.next_day().unwrap_or(day))
}

impl Warehouse {
    /// Latest stored date at or before `cutoff` for every requested code.
    /// Codes without data map to `None`.
    pub fn last_dates_before(
        &self,
        schema: &TableSchema,
        codes: &[EntityCode],
        cutoff: Date,
    ) -> Result<BTreeMap<EntityCode, Option<Date>>, WarehouseError> {
        self.collect_last_dates(schema, codes, Some(cutoff))
    }

    /// Latest stored date of every requested code, rows dated in the
    /// future included.
    pub fn last_dates(
        &self,
        schema: &TableSchema,
        codes: &[EntityCode],
    ) -> Result<BTreeMap<EntityCode, Option<Date>>, WarehouseError> {
        self.collect_last_dates(schema, codes, None)
    }

    fn collect_last_dates(
        &self,
        schema: &TableSchema,
        codes: &[EntityCode],
        cutoff: Option<Date>,
    ) -> Result<BTreeMap<EntityCode, Option<Date>>, WarehouseError> {
        let codes = distinct(codes);
        let mut last_dates: BTreeMap<EntityCode, Option<Date>> =
            codes.iter().map(|code| (code.clone(), None)).collect();

        for chunk in codes.chunks(self.chunk_size()) {
            let mut params = code_params(chunk);
            let mut sql = format!(
                "SELECT code, CAST(MAX(date) AS VARCHAR) FROM {table} WHERE code IN ({placeholders})",
                table = schema.name,
                placeholders = placeholders(chunk.len()),
            );
            if let Some(cutoff) = cutoff {
                sql.push_str(" AND date <= CAST(? AS DATE)");
                params.push(date_param(cutoff));
            }
            sql.push_str(" GROUP BY code");

            let mut statement = self.connection().prepare(&sql)?;
            let mut rows = statement.query(params_from_iter(params.iter()))?;
            while let Some(row) = rows.next()? {
                let code = EntityCode::parse(&row.get::<_, String>(0)?)?;
                let last = parse_iso_date(schema.name, "date", &row.get::<_, String>(1)?)?;
                last_dates.insert(code, Some(last));
            }
        }

        Ok(last_dates)
    }

    pub fn last_date(
        &self,
        schema: &TableSchema,
        code: &EntityCode,
    ) -> Result<Option<Date>, WarehouseError> {
        let sql = format!(
            "SELECT CAST(MAX(date) AS VARCHAR) FROM {} WHERE code = ?",
            schema.name
        );
        let raw: Option<String> =
            self.connection()
                .query_row(&sql, [code.as_str()], |row| row.get(0))?;
        raw.map(|raw| parse_iso_date(schema.name, "date", &raw))
            .transpose()
    }

    /// Append a batch in one transaction. Keys already stored are never
    /// overwritten: the batch fails with `KeyExists` and nothing is written.
    pub fn write(&self, schema: &TableSchema, rows: &[SeriesRow]) -> Result<usize, WarehouseError> {
        if rows.is_empty() {
            return Ok(0);
        }
        validate_batch(schema, rows)?;

        let written = self.transaction(|connection| insert_rows(connection, schema, rows))?;
        tracing::debug!(table = schema.name, rows = written, "rows appended");
        Ok(written)
    }

    /// Delete `[start, end]` for one code and insert `rows` in the same
    /// transaction. Used for corrections of already stored history.
    pub fn replace(
        &self,
        schema: &TableSchema,
        code: &EntityCode,
        start: Date,
        end: Date,
        rows: &[SeriesRow],
    ) -> Result<usize, WarehouseError> {
        validate_batch(schema, rows)?;

        let (deleted, written) = self.transaction(|connection| {
            let deleted = delete_code_between(connection, schema, code, start, end)?;
            let written = insert_rows(connection, schema, rows)?;
            Ok((deleted, written))
        })?;
        tracing::info!(
            table = schema.name,
            code = %code,
            start = %start,
            end = %end,
            deleted,
            rows = written,
            "rows replaced"
        );
        Ok(written)
    }

    pub fn query_by_code(
        &self,
        schema: &TableSchema,
        code: &EntityCode,
    ) -> Result<Vec<SeriesRow>, WarehouseError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE code = ? ORDER BY date",
            select_list(schema),
            schema.name
        );
        self.collect_rows(schema, &sql, &[DuckValue::Text(code.to_string())])
    }

    pub fn query_by_date(
        &self,
        schema: &TableSchema,
        date: Date,
    ) -> Result<Vec<SeriesRow>, WarehouseError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE date = CAST(? AS DATE) ORDER BY code",
            select_list(schema),
            schema.name
        );
        self.collect_rows(schema, &sql, &[date_param(date)])
    }

    /// Rows of one code inside `[start, end]`, ascending by date.
    pub fn query_window(
        &self,
        schema: &TableSchema,
        code: &EntityCode,
        start: Date,
        end: Date,
    ) -> Result<Vec<SeriesRow>, WarehouseError> {
        self.chunked_query(
            schema,
            std::slice::from_ref(code),
            &RowFilter::Between(start, end),
        )
    }

    /// Query many codes at once, splitting the code list into batches of the
    /// configured chunk size. Rows come back ordered by code, then date.
    pub fn chunked_query(
        &self,
        schema: &TableSchema,
        codes: &[EntityCode],
        filter: &RowFilter,
    ) -> Result<Vec<SeriesRow>, WarehouseError> {
        let codes = distinct(codes);
        let mut collected = Vec::new();

        for chunk in codes.chunks(self.chunk_size()) {
            let mut params = code_params(chunk);
            let mut predicates = vec![format!("code IN ({})", placeholders(chunk.len()))];
            predicates.extend(filter.clause(&mut params));
            let sql = format!(
                "SELECT {} FROM {} WHERE {} ORDER BY code, date",
                select_list(schema),
                schema.name,
                predicates.join(" AND ")
            );
            collected.extend(self.collect_rows(schema, &sql, &params)?);
        }

        Ok(collected)
    }

    pub fn delete_between(
        &self,
        schema: &TableSchema,
        code: &EntityCode,
        start: Date,
        end: Date,
    ) -> Result<usize, WarehouseError> {
        let deleted = delete_code_between(self.connection(), schema, code, start, end)?;
        tracing::info!(table = schema.name, code = %code, deleted, "rows deleted");
        Ok(deleted)
    }

    pub fn delete_entity(
        &self,
        schema: &TableSchema,
        code: &EntityCode,
    ) -> Result<usize, WarehouseError> {
        let sql = format!("DELETE FROM {} WHERE code = ?", schema.name);
        let deleted = self.connection().execute(&sql, [code.as_str()])?;
        tracing::info!(table = schema.name, code = %code, deleted, "entity deleted");
        Ok(deleted)
    }

    /// Drop every row dated strictly after `date`, across all codes.
    pub fn delete_after(&self, schema: &TableSchema, date: Date) -> Result<usize, WarehouseError> {
        let sql = format!("DELETE FROM {} WHERE date > CAST(? AS DATE)", schema.name);
        let deleted = self.connection().execute(&sql, [date.to_string()])?;
        tracing::info!(table = schema.name, after = %date, deleted, "rows deleted");
        Ok(deleted)
    }

    /// Most recent write stamp of a table, or of one code within it.
    pub fn last_updated(
        &self,
        schema: &TableSchema,
        code: Option<&EntityCode>,
    ) -> Result<Option<PrimitiveDateTime>, WarehouseError> {
        let raw: Option<String> = match code {
            Some(code) => self.connection().query_row(
                &format!(
                    "SELECT CAST(MAX(last_updated) AS VARCHAR) FROM {} WHERE code = ?",
                    schema.name
                ),
                [code.as_str()],
                |row| row.get(0),
            )?,
            None => self.connection().query_row(
                &format!(
                    "SELECT CAST(MAX(last_updated) AS VARCHAR) FROM {}",
                    schema.name
                ),
                [],
                |row| row.get(0),
            )?,
        };

        raw.map(|raw| parse_timestamp(schema.name, &raw)).transpose()
    }

    /// First and last stored dates per code, ordered by code.
    pub fn date_ranges(&self, schema: &TableSchema) -> Result<Vec<DateRange>, WarehouseError> {
        let sql = format!(
            "SELECT code, CAST(MIN(date) AS VARCHAR), CAST(MAX(date) AS VARCHAR) \
             FROM {} GROUP BY code ORDER BY code",
            schema.name
        );
        let mut statement = self.connection().prepare(&sql)?;
        let mut rows = statement.query([])?;
        let mut ranges = Vec::new();
        while let Some(row) = rows.next()? {
            ranges.push(DateRange {
                code: EntityCode::parse(&row.get::<_, String>(0)?)?,
                first: parse_iso_date(schema.name, "date", &row.get::<_, String>(1)?)?,
                last: parse_iso_date(schema.name, "date", &row.get::<_, String>(2)?)?,
            });
        }
        Ok(ranges)
    }

    /// Long-format `(code, date, value)` triples of one numeric column.
    /// `codes = None` reads every code in the table.
    pub(crate) fn field_values(
        &self,
        schema: &TableSchema,
        column: &ColumnDef,
        codes: Option<&[EntityCode]>,
        filter: &RowFilter,
    ) -> Result<Vec<(EntityCode, Date, Option<f64>)>, WarehouseError> {
        let codes = codes.map(distinct);
        let chunks: Vec<Option<&[EntityCode]>> = match codes.as_deref() {
            Some(codes) => codes.chunks(self.chunk_size()).map(Some).collect(),
            None => vec![None],
        };

        let mut values = Vec::new();
        for chunk in chunks {
            let mut params = Vec::new();
            let mut predicates = Vec::new();
            if let Some(chunk) = chunk {
                params.extend(code_params(chunk));
                predicates.push(format!("code IN ({})", placeholders(chunk.len())));
            }
            predicates.extend(filter.clause(&mut params));
            let where_clause = if predicates.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", predicates.join(" AND "))
            };

            let sql = format!(
                "SELECT code, CAST(date AS VARCHAR), CAST({column} AS DOUBLE) FROM {table} \
                 {where_clause} ORDER BY date, code",
                column = column.code,
                table = schema.name,
            );
            let mut statement = self.connection().prepare(&sql)?;
            let mut rows = statement.query(params_from_iter(params.iter()))?;
            while let Some(row) = rows.next()? {
                values.push((
                    EntityCode::parse(&row.get::<_, String>(0)?)?,
                    parse_iso_date(schema.name, "date", &row.get::<_, String>(1)?)?,
                    row.get::<_, Option<f64>>(2)?,
                ));
            }
        }

        Ok(values)
    }

    fn collect_rows(
        &self,
        schema: &TableSchema,
        sql: &str,
        params: &[DuckValue],
    ) -> Result<Vec<SeriesRow>, WarehouseError> {
        let mut statement = self.connection().prepare(sql)?;
        let mut rows = statement.query(params_from_iter(params.iter()))?;
        let mut collected = Vec::new();
        while let Some(row) = rows.next()? {
            collected.push(read_series_row(schema, row)?);
        }
        Ok(collected)
    }
}

fn insert_rows(
    connection: &Connection,
    schema: &TableSchema,
    rows: &[SeriesRow],
) -> Result<usize, WarehouseError> {
    let mut columns = vec!["code", "date"];
    let mut values = vec!["?", "CAST(? AS DATE)"];
    for column in schema.columns {
        columns.push(column.code);
        values.push(match column.kind {
            ColumnKind::Date => "CAST(? AS DATE)",
            _ => "?",
        });
    }
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        schema.name,
        columns.join(", "),
        values.join(", ")
    );

    reject_stored_keys(connection, schema, rows)?;

    let mut statement = connection.prepare(&sql)?;
    for row in rows {
        let mut params = Vec::with_capacity(schema.width() + 2);
        params.push(DuckValue::Text(row.code.to_string()));
        params.push(date_param(row.date));
        params.extend(row.values.iter().map(FieldValue::to_duck));
        statement.execute(params_from_iter(params.iter()))?;
    }
    Ok(rows.len())
}

fn reject_stored_keys(
    connection: &Connection,
    schema: &TableSchema,
    rows: &[SeriesRow],
) -> Result<(), WarehouseError> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE code = ? AND date = CAST(? AS DATE)",
        schema.name
    );
    let mut statement = connection.prepare(&sql)?;
    for row in rows {
        let params = [DuckValue::Text(row.code.to_string()), date_param(row.date)];
        let stored: i64 = statement.query_row(params_from_iter(params.iter()), |found| found.get(0))?;
        if stored > 0 {
            return Err(WarehouseError::KeyExists {
                table: schema.name.to_string(),
                code: row.code.to_string(),
                date: row.date,
            });
        }
    }
    Ok(())
}

fn delete_code_between(
    connection: &Connection,
    schema: &TableSchema,
    code: &EntityCode,
    start: Date,
    end: Date,
) -> Result<usize, WarehouseError> {
    let sql = format!(
        "DELETE FROM {} WHERE code = ? AND date BETWEEN CAST(? AS DATE) AND CAST(? AS DATE)",
        schema.name
    );
    let params = [
        DuckValue::Text(code.to_string()),
        date_param(start),
        date_param(end),
    ];
    Ok(connection.execute(&sql, params_from_iter(params.iter()))?)
}

fn read_series_row(
    schema: &TableSchema,
    row: &::duckdb::Row<'_>,
) -> Result<SeriesRow, WarehouseError> {
    let code = EntityCode::parse(&row.get::<_, String>(0)?)?;
    let date = parse_iso_date(schema.name, "date", &row.get::<_, String>(1)?)?;

    let mut values = Vec::with_capacity(schema.width());
    for (offset, column) in schema.columns.iter().enumerate() {
        let index = offset + 2;
        let value = match column.kind {
            ColumnKind::Double => FieldValue::from(row.get::<_, Option<f64>>(index)?),
            ColumnKind::BigInt => FieldValue::from(row.get::<_, Option<i64>>(index)?),
            ColumnKind::Text => FieldValue::from(row.get::<_, Option<String>>(index)?),
            ColumnKind::Date => match row.get::<_, Option<String>>(index)? {
                Some(raw) => FieldValue::Date(parse_iso_date(schema.name, column.code, &raw)?),
                None => FieldValue::Null,
            },
        };
        values.push(value);
    }

    Ok(SeriesRow::new(code, date, values))
}

fn select_list(schema: &TableSchema) -> String {
    let mut parts = vec![String::from("code"), String::from("CAST(date AS VARCHAR)")];
    for column in schema.columns {
        parts.push(match column.kind {
            ColumnKind::Date => format!("CAST({} AS VARCHAR)", column.code),
            _ => column.code.to_string(),
        });
    }
    parts.join(", ")
}

fn parse_timestamp(table: &str, raw: &str) -> Result<PrimitiveDateTime, WarehouseError> {
    let whole_seconds = raw.split('.').next().unwrap_or(raw);
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    PrimitiveDateTime::parse(whole_seconds, format).map_err(|_| WarehouseError::InvalidValue {
        table: table.to_string(),
        column: String::from("last_updated"),
        value: raw.to_string(),
    })
}

fn distinct(codes: &[EntityCode]) -> Vec<EntityCode> {
    codes
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn code_params(codes: &[EntityCode]) -> Vec<DuckValue> {
    codes
        .iter()
        .map(|code| DuckValue::Text(code.to_string()))
        .collect()
}

fn date_param(date: Date) -> DuckValue {
    DuckValue::Text(date.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ADJUSTMENTS, INDEX_DAILY};
    use proptest::prelude::*;
    use time::macros::date;

    fn code(raw: &str) -> EntityCode {
        EntityCode::parse(raw).expect("code")
    }

    fn index_row(raw: &str, day: Date, close: f64) -> SeriesRow {
        SeriesRow::new(
            code(raw),
            day,
            vec![
                close.into(),
                (close + 0.5).into(),
                (close - 0.5).into(),
                close.into(),
                1_000_i64.into(),
                (close * 1_000.0).into(),
                0.0.into(),
            ],
        )
    }

    fn seeded() -> Warehouse {
        let warehouse = Warehouse::open_in_memory().expect("open");
        warehouse
            .write(
                &INDEX_DAILY,
                &[
                    index_row("000001", date!(2024 - 01 - 02), 10.0),
                    index_row("000001", date!(2024 - 01 - 03), 10.2),
                    index_row("000001", date!(2024 - 01 - 04), 10.4),
                    index_row("399001", date!(2024 - 01 - 03), 20.0),
                ],
            )
            .expect("seed");
        warehouse
    }

    #[test]
    fn empty_write_is_a_no_op() {
        let warehouse = Warehouse::open_in_memory().expect("open");
        assert_eq!(warehouse.write(&INDEX_DAILY, &[]).expect("write"), 0);
        assert_eq!(warehouse.last_updated(&INDEX_DAILY, None).expect("stamp"), None);
    }

    #[test]
    fn existing_key_is_never_overwritten() {
        let warehouse = seeded();
        let clash = [
            index_row("000001", date!(2024 - 01 - 05), 11.0),
            index_row("000001", date!(2024 - 01 - 04), 99.0),
        ];
        assert!(matches!(
            warehouse.write(&INDEX_DAILY, &clash),
            Err(WarehouseError::KeyExists { date, .. }) if date == date!(2024 - 01 - 04)
        ));

        let rows = warehouse
            .query_by_code(&INDEX_DAILY, &code("000001"))
            .expect("query");
        assert_eq!(rows.len(), 3, "failed batch must leave no partial rows");
        assert_eq!(rows[2].number(&INDEX_DAILY, "close"), Some(10.4));
    }

    #[test]
    fn last_dates_respect_cutoff_and_missing_codes() {
        let warehouse = seeded();
        let last = warehouse
            .last_dates_before(
                &INDEX_DAILY,
                &[code("000001"), code("399001"), code("600000")],
                date!(2024 - 01 - 03),
            )
            .expect("last dates");

        assert_eq!(last[&code("000001")], Some(date!(2024 - 01 - 03)));
        assert_eq!(last[&code("399001")], Some(date!(2024 - 01 - 03)));
        assert_eq!(last[&code("600000")], None);
        assert_eq!(
            warehouse.last_date(&INDEX_DAILY, &code("000001")).expect("last"),
            Some(date!(2024 - 01 - 04))
        );

        let uncapped = warehouse
            .last_dates(&INDEX_DAILY, &[code("000001"), code("600000")])
            .expect("last dates");
        assert_eq!(uncapped[&code("000001")], Some(date!(2024 - 01 - 04)));
        assert_eq!(uncapped[&code("600000")], None);
    }

    #[test]
    fn resume_date_is_day_after_last_or_epoch() {
        let epoch = date!(1990 - 12 - 10);
        assert_eq!(resume_date(None, epoch), epoch);
        assert_eq!(
            resume_date(Some(date!(2024 - 02 - 28)), epoch),
            date!(2024 - 02 - 29)
        );
    }

    #[test]
    fn reads_rows_back_in_date_order_with_types() {
        let warehouse = Warehouse::open_in_memory().expect("open");
        let event = SeriesRow::new(
            code("600000"),
            date!(2016 - 06 - 16),
            vec![
                "2015".into(),
                1.5.into(),
                FieldValue::Null,
                date!(2016 - 06 - 15).into(),
                FieldValue::Null,
                date!(2016 - 06 - 17).into(),
            ],
        );
        warehouse.write(&ADJUSTMENTS, &[event.clone()]).expect("write");

        let rows = warehouse.query_by_code(&ADJUSTMENTS, &code("600000")).expect("query");
        assert_eq!(rows, vec![event]);

        let by_date = warehouse
            .query_by_date(&ADJUSTMENTS, date!(2016 - 06 - 16))
            .expect("by date");
        assert_eq!(by_date.len(), 1);
    }

    #[test]
    fn filters_and_deletes() {
        let warehouse = seeded();
        let window = warehouse
            .query_window(
                &INDEX_DAILY,
                &code("000001"),
                date!(2024 - 01 - 03),
                date!(2024 - 01 - 04),
            )
            .expect("window");
        assert_eq!(window.len(), 2);

        let near = warehouse
            .chunked_query(
                &INDEX_DAILY,
                &[code("000001")],
                &RowFilter::Near {
                    dates: vec![date!(2024 - 01 - 01)],
                    tolerance_days: 1,
                },
            )
            .expect("near");
        assert_eq!(near.len(), 1);

        assert_eq!(warehouse.delete_after(&INDEX_DAILY, date!(2024 - 01 - 03)).expect("delete"), 1);
        assert_eq!(
            warehouse.delete_between(&INDEX_DAILY, &code("000001"), date!(2024 - 01 - 01), date!(2024 - 01 - 02)).expect("delete"),
            1
        );
        assert_eq!(warehouse.delete_entity(&INDEX_DAILY, &code("399001")).expect("delete"), 1);
        assert_eq!(
            warehouse.date_ranges(&INDEX_DAILY).expect("ranges"),
            vec![DateRange {
                code: code("000001"),
                first: date!(2024 - 01 - 03),
                last: date!(2024 - 01 - 03),
            }]
        );
    }

    #[test]
    fn replace_swaps_a_range_atomically() {
        let warehouse = seeded();
        let corrected = [
            index_row("000001", date!(2024 - 01 - 03), 10.3),
            index_row("000001", date!(2024 - 01 - 04), 10.5),
        ];
        warehouse
            .replace(
                &INDEX_DAILY,
                &code("000001"),
                date!(2024 - 01 - 03),
                date!(2024 - 01 - 04),
                &corrected,
            )
            .expect("replace");

        let closes: Vec<Option<f64>> = warehouse
            .query_by_code(&INDEX_DAILY, &code("000001"))
            .expect("query")
            .iter()
            .map(|row| row.number(&INDEX_DAILY, "close"))
            .collect();
        assert_eq!(closes, vec![Some(10.0), Some(10.3), Some(10.5)]);
        assert!(warehouse
            .last_updated(&INDEX_DAILY, Some(&code("000001")))
            .expect("stamp")
            .is_some());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn last_date_never_passes_cutoff(
            offsets in proptest::collection::btree_set(0_i64..60, 1..12),
            cutoff_offset in 0_i64..60,
        ) {
            let warehouse = Warehouse::open_in_memory().expect("open");
            let base = date!(2024 - 01 - 01);
            let rows: Vec<SeriesRow> = offsets
                .iter()
                .map(|offset| index_row("000001", base + Duration::days(*offset), 10.0))
                .collect();
            warehouse.write(&INDEX_DAILY, &rows).expect("write");

            let cutoff = base + Duration::days(cutoff_offset);
            let last = warehouse
                .last_dates_before(&INDEX_DAILY, &[code("000001")], cutoff)
                .expect("last");
            let expected = offsets
                .iter()
                .filter(|offset| **offset <= cutoff_offset)
                .max()
                .map(|offset| base + Duration::days(*offset));
            prop_assert_eq!(last[&code("000001")], expected);
        }
    }
}
