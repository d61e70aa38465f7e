// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use quoter_app::{Calculation, CalculationId, Category, CategoryId, ItemInput, TableModel};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};
use tracing::{debug, info};

pub const APP_NAME: &str = "quoter";

const DEFAULT_CATEGORIES: [(&str, &str); 5] = [
    ("100", "Material"),
    ("200", "Labour"),
    ("300", "Subcontractors"),
    ("400", "Equipment"),
    ("900", "Other"),
];

const REQUIRED_SCHEMA: &[(&str, &[&str])] = &[
    (
        "categories",
        &["id", "code", "description", "created_at", "updated_at"],
    ),
    (
        "calculations",
        &[
            "id",
            "customer",
            "description",
            "date",
            "user_margin",
            "created_at",
            "updated_at",
        ],
    ),
    (
        "calculation_items",
        &[
            "id",
            "calculation_id",
            "category_id",
            "position",
            "description",
            "unit",
            "price",
            "quantity",
            "total",
        ],
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RequiredIndex {
    name: &'static str,
    create_sql: &'static str,
}

const REQUIRED_INDEXES: &[RequiredIndex] = &[
    RequiredIndex {
        name: "idx_calculation_items_calculation_id",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_calculation_items_calculation_id ON calculation_items (calculation_id, category_id, position);",
    },
    RequiredIndex {
        name: "idx_calculations_updated_at",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_calculations_updated_at ON calculations (updated_at);",
    },
];

#[derive(Debug, Clone, PartialEq)]
pub struct NewCalculation {
    pub customer: String,
    pub description: String,
    pub date: Date,
    pub user_margin: f64,
}

impl NewCalculation {
    pub fn validate(&self) -> Result<()> {
        if self.customer.trim().is_empty() {
            bail!("customer is required -- enter a customer name and retry");
        }
        if !self.user_margin.is_finite() || self.user_margin <= 0.0 {
            bail!(
                "user margin must be a positive number, got {} -- enter a margin like 1.15",
                self.user_margin
            );
        }
        Ok(())
    }
}

/// SQLite draft storage for categories and calculations.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let printable = path.to_string_lossy().to_string();
        validate_db_path(&printable)?;
        let conn = Connection::open(path)
            .with_context(|| format!("open database at {}", path.display()))?;
        configure_connection(&conn)?;
        debug!(path = %path.display(), "opened database");
        Ok(Self { conn })
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory database")?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn raw_connection(&self) -> &Connection {
        &self.conn
    }

    pub fn bootstrap(&self) -> Result<()> {
        if has_user_tables(&self.conn)? {
            validate_schema(&self.conn)?;
        } else {
            self.conn
                .execute_batch(include_str!("sql/schema.sql"))
                .context("create schema")?;
            info!("created database schema");
        }

        ensure_required_indexes(&self.conn)?;

        self.seed_defaults()?;
        Ok(())
    }

    pub fn seed_defaults(&self) -> Result<()> {
        let now = now_rfc3339()?;
        for (code, description) in DEFAULT_CATEGORIES {
            self.conn
                .execute(
                    "
                    INSERT OR IGNORE INTO categories (code, description, created_at, updated_at)
                    VALUES (?, ?, ?, ?)
                    ",
                    params![code, description, now, now],
                )
                .with_context(|| format!("insert default category {code}"))?;
        }
        Ok(())
    }

    pub fn list_categories(&self) -> Result<Vec<Category>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, code, description FROM categories ORDER BY code ASC")
            .context("prepare categories query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Category {
                    id: CategoryId::new(row.get(0)?),
                    code: row.get(1)?,
                    description: row.get(2)?,
                })
            })
            .context("query categories")?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect categories")
    }

    pub fn create_category(&self, code: &str, description: &str) -> Result<CategoryId> {
        let code = code.trim();
        if code.is_empty() {
            bail!("category code is required -- enter a code and retry");
        }
        let exists = self
            .conn
            .query_row(
                "SELECT id FROM categories WHERE code = ?",
                params![code],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .context("check category code")?;
        if exists.is_some() {
            bail!("category {code:?} already exists -- choose another code and retry");
        }

        let now = now_rfc3339()?;
        self.conn
            .execute(
                "
                INSERT INTO categories (code, description, created_at, updated_at)
                VALUES (?, ?, ?, ?)
                ",
                params![code, description.trim(), now, now],
            )
            .context("insert category")?;
        Ok(CategoryId::new(self.conn.last_insert_rowid()))
    }

    pub fn create_calculation(&self, calculation: &NewCalculation) -> Result<CalculationId> {
        calculation.validate()?;
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "
                INSERT INTO calculations (
                  customer, description, date, user_margin, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?)
                ",
                params![
                    calculation.customer.trim(),
                    calculation.description.trim(),
                    format_date(calculation.date),
                    calculation.user_margin,
                    now,
                    now,
                ],
            )
            .context("insert calculation")?;
        Ok(CalculationId::new(self.conn.last_insert_rowid()))
    }

    pub fn get_calculation(&self, calculation_id: CalculationId) -> Result<Calculation> {
        self.conn
            .query_row(
                "
                SELECT id, customer, description, date, user_margin, created_at, updated_at
                FROM calculations
                WHERE id = ?
                ",
                params![calculation_id.get()],
                calculation_from_row,
            )
            .optional()
            .with_context(|| format!("load calculation {}", calculation_id.get()))?
            .ok_or_else(|| {
                anyhow!(
                    "calculation {} not found -- run with --demo or pick an existing id",
                    calculation_id.get()
                )
            })
    }

    pub fn list_calculations(&self) -> Result<Vec<Calculation>> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT id, customer, description, date, user_margin, created_at, updated_at
                FROM calculations
                ORDER BY updated_at DESC, id DESC
                ",
            )
            .context("prepare calculations query")?;
        let rows = stmt
            .query_map([], calculation_from_row)
            .context("query calculations")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect calculations")
    }

    /// Rebuilds the editable table of a calculation, groups ordered by
    /// category code and rows by stored position.
    pub fn load_table(&self, calculation_id: CalculationId) -> Result<TableModel> {
        self.get_calculation(calculation_id)?;
        let categories = self
            .list_categories()?
            .into_iter()
            .map(|category| (category.id, category))
            .collect::<BTreeMap<_, _>>();

        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT i.category_id, i.description, i.unit, i.price, i.quantity
                FROM calculation_items i
                JOIN categories c ON c.id = i.category_id
                WHERE i.calculation_id = ?
                ORDER BY c.code ASC, i.position ASC, i.id ASC
                ",
            )
            .context("prepare calculation items query")?;
        let rows = stmt
            .query_map(params![calculation_id.get()], |row| {
                Ok((
                    CategoryId::new(row.get(0)?),
                    ItemInput {
                        description: row.get(1)?,
                        unit: row.get(2)?,
                        price: row.get(3)?,
                        quantity: row.get(4)?,
                    },
                ))
            })
            .context("query calculation items")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("collect calculation items")?;

        let mut table = TableModel::new();
        for (category_id, input) in rows {
            let category = categories.get(&category_id).ok_or_else(|| {
                anyhow!(
                    "calculation {} references unknown category {}",
                    calculation_id.get(),
                    category_id.get()
                )
            })?;
            table
                .append_row(category, input)
                .with_context(|| format!("load calculation {}", calculation_id.get()))?;
        }
        debug!(
            calculation = calculation_id.get(),
            items = table.item_count(),
            "loaded calculation table"
        );
        Ok(table)
    }

    /// Replaces the stored rows of a calculation with the table's rows.
    pub fn save_table(&self, calculation_id: CalculationId, table: &TableModel) -> Result<()> {
        table.verify().context("refusing to save out-of-order rows")?;
        let now = now_rfc3339()?;
        let tx = self
            .conn
            .unchecked_transaction()
            .context("begin save transaction")?;

        let updated = tx
            .execute(
                "UPDATE calculations SET updated_at = ? WHERE id = ?",
                params![now, calculation_id.get()],
            )
            .context("touch calculation")?;
        if updated == 0 {
            bail!(
                "calculation {} not found -- reload and retry",
                calculation_id.get()
            );
        }

        tx.execute(
            "DELETE FROM calculation_items WHERE calculation_id = ?",
            params![calculation_id.get()],
        )
        .context("clear calculation items")?;

        {
            let mut insert = tx
                .prepare(
                    "
                    INSERT INTO calculation_items (
                      calculation_id, category_id, position,
                      description, unit, price, quantity, total
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    ",
                )
                .context("prepare item insert")?;
            for group in table.groups() {
                for (position, item) in group.items.iter().enumerate() {
                    insert
                        .execute(params![
                            calculation_id.get(),
                            group.category_id.get(),
                            position as i64,
                            item.description,
                            item.unit,
                            item.price,
                            item.quantity,
                            item.total(),
                        ])
                        .with_context(|| format!("insert item {:?}", item.description))?;
                }
            }
        }

        tx.commit().context("commit save transaction")?;
        info!(
            calculation = calculation_id.get(),
            items = table.item_count(),
            "saved calculation"
        );
        Ok(())
    }

    /// Creates a sample calculation when none exist and returns the first one.
    pub fn seed_demo_data(&self) -> Result<CalculationId> {
        if let Some(existing) = self.list_calculations()?.first() {
            return Ok(existing.id);
        }

        let today = OffsetDateTime::now_utc().date();
        let calculation_id = self.create_calculation(&NewCalculation {
            customer: "Muster AG".to_owned(),
            description: "Office renovation".to_owned(),
            date: today,
            user_margin: 1.15,
        })?;

        let categories = self.list_categories()?;
        let by_code = |code: &str| {
            categories
                .iter()
                .find(|category| category.code == code)
                .ok_or_else(|| anyhow!("default category {code} is missing -- rerun bootstrap"))
        };

        let mut table = TableModel::new();
        let demo_rows = [
            ("100", "Drywall panels", "m2", 12.5, 48.0),
            ("100", "Paint, white", "l", 8.9, 30.0),
            ("100", "Screws", "box", 6.2, 4.0),
            ("200", "Drywall installation", "h", 65.0, 24.0),
            ("200", "Painting", "h", 58.0, 16.0),
            ("400", "Scaffolding rental", "day", 45.0, 3.0),
        ];
        for (code, description, unit, price, quantity) in demo_rows {
            table.append_row(
                by_code(code)?,
                ItemInput {
                    description: description.to_owned(),
                    unit: unit.to_owned(),
                    price,
                    quantity,
                },
            )?;
        }
        self.save_table(calculation_id, &table)?;
        Ok(calculation_id)
    }
}

pub fn default_db_path() -> Result<PathBuf> {
    if let Some(override_path) = env::var_os("QUOTER_DB_PATH") {
        return Ok(PathBuf::from(override_path));
    }

    let data_root = dirs::data_local_dir().ok_or_else(|| {
        anyhow!("cannot resolve data directory; set QUOTER_DB_PATH to a writable database path")
    })?;

    let app_dir = data_root.join(APP_NAME);
    fs::create_dir_all(&app_dir)
        .with_context(|| format!("create data directory {}", app_dir.display()))?;
    Ok(app_dir.join("quoter.db"))
}

pub fn validate_db_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("database path must not be empty");
    }
    if path == ":memory:" {
        return Ok(());
    }

    if let Some(index) = path.find("://")
        && index > 0
    {
        let scheme = &path[..index];
        if scheme.chars().all(char::is_alphabetic) {
            bail!(
                "database path {path:?} looks like a URI ({scheme}://); pass a filesystem path instead"
            );
        }
    }

    if path.starts_with("file:") {
        bail!("database path {path:?} uses file: URI syntax; pass a plain filesystem path");
    }

    if path.contains('?') {
        bail!(
            "database path {path:?} contains '?'; remove query parameters and use a plain file path"
        );
    }

    Ok(())
}

fn calculation_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Calculation> {
    let date_raw: String = row.get(3)?;
    let created_at_raw: String = row.get(5)?;
    let updated_at_raw: String = row.get(6)?;
    Ok(Calculation {
        id: CalculationId::new(row.get(0)?),
        customer: row.get(1)?,
        description: row.get(2)?,
        date: parse_date(&date_raw).map_err(to_sql_error)?,
        user_margin: row.get(4)?,
        created_at: parse_datetime(&created_at_raw).map_err(to_sql_error)?,
        updated_at: parse_datetime(&updated_at_raw).map_err(to_sql_error)?,
    })
}

fn has_user_tables(conn: &Connection) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "
            SELECT COUNT(*)
            FROM sqlite_master
            WHERE type = 'table'
              AND name NOT LIKE 'sqlite_%'
            ",
            [],
            |row| row.get(0),
        )
        .context("count user tables")?;
    Ok(count > 0)
}

fn validate_schema(conn: &Connection) -> Result<()> {
    for (table, required_columns) in REQUIRED_SCHEMA {
        if !table_exists(conn, table)? {
            bail!(
                "database is missing required table `{table}`; point storage.db_path at a quoter database"
            );
        }

        let columns = table_columns(conn, table)?;
        let missing: Vec<&str> = required_columns
            .iter()
            .copied()
            .filter(|column| !columns.contains(*column))
            .collect();

        if !missing.is_empty() {
            bail!(
                "table `{table}` is missing required columns: {}; run migration before launching",
                missing.join(", ")
            );
        }
    }

    Ok(())
}

fn ensure_required_indexes(conn: &Connection) -> Result<()> {
    for index in REQUIRED_INDEXES {
        conn.execute_batch(index.create_sql)
            .with_context(|| format!("ensure required index `{}`", index.name))?;
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "
            SELECT EXISTS(
              SELECT 1
              FROM sqlite_master
              WHERE type = 'table' AND name = ?
            )
            ",
            params![table],
            |row| row.get::<_, i64>(0),
        )
        .with_context(|| format!("check table existence for {table}"))?;
    Ok(exists == 1)
}

fn table_columns(conn: &Connection, table: &str) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .with_context(|| format!("inspect columns for {table}"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .with_context(|| format!("query column info for {table}"))?;

    rows.collect::<rusqlite::Result<BTreeSet<_>>>()
        .with_context(|| format!("collect columns for {table}"))
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .context("configure sqlite pragmas")
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("format current timestamp")
}

fn parse_datetime(raw: &str) -> Result<OffsetDateTime> {
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(value);
    }

    if let Ok(value) = PrimitiveDateTime::parse(
        raw,
        &format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    ) {
        return Ok(value.assume_utc());
    }

    bail!("unsupported datetime format {raw:?}")
}

fn parse_date(raw: &str) -> Result<Date> {
    if let Ok(value) = Date::parse(raw, &format_description!("[year]-[month]-[day]")) {
        return Ok(value);
    }
    Ok(parse_datetime(raw)?.date())
}

fn to_sql_error(error: anyhow::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            error.to_string(),
        )),
    )
}

fn format_date(value: Date) -> String {
    value
        .format(&format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| "1970-01-01".to_owned())
}

#[cfg(test)]
mod tests {
    use super::{NewCalculation, Store, parse_date, parse_datetime};
    use anyhow::Result;
    use time::{Date, Month};

    #[test]
    fn parse_datetime_accepts_rfc3339_and_sqlite_forms() -> Result<()> {
        let rfc = parse_datetime("2026-03-01T10:15:00Z")?;
        let plain = parse_datetime("2026-03-01 10:15:00")?;
        assert_eq!(rfc, plain);
        assert!(parse_datetime("yesterday").is_err());
        Ok(())
    }

    #[test]
    fn parse_date_normalizes_timestamps() -> Result<()> {
        let expected = Date::from_calendar_date(2026, Month::March, 1)?;
        assert_eq!(parse_date("2026-03-01")?, expected);
        assert_eq!(parse_date("2026-03-01T23:59:00Z")?, expected);
        Ok(())
    }

    #[test]
    fn new_calculation_requires_customer_and_positive_margin() -> Result<()> {
        let date = Date::from_calendar_date(2026, Month::March, 1)?;
        let mut calculation = NewCalculation {
            customer: " ".to_owned(),
            description: String::new(),
            date,
            user_margin: 1.0,
        };
        assert!(calculation.validate().is_err());
        calculation.customer = "Muster AG".to_owned();
        calculation.user_margin = 0.0;
        let error = calculation
            .validate()
            .expect_err("zero margin should be rejected");
        assert!(error.to_string().contains("margin"));
        Ok(())
    }

    #[test]
    fn seed_demo_data_is_idempotent() -> Result<()> {
        let store = Store::open_memory()?;
        store.bootstrap()?;
        let first = store.seed_demo_data()?;
        let second = store.seed_demo_data()?;
        assert_eq!(first, second);
        assert_eq!(store.list_calculations()?.len(), 1);
        assert_eq!(store.load_table(first)?.item_count(), 6);
        Ok(())
    }
}
