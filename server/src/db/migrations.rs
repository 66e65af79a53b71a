use sqlx::SqlitePool;
use tracing::{debug, error, info};

use crate::db::models::ColumnInfo;
use crate::error::StoreError;

/// Current table shapes. Existing tables are left alone and brought forward by `SCHEMA_DELTAS`.
const BASE_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS servers (\
        id            VARCHAR(32)  PRIMARY KEY NOT NULL, \
        prefix        VARCHAR(32)  NOT NULL DEFAULT '!tr', \
        lang          VARCHAR(8)   NOT NULL DEFAULT 'en', \
        count         INTEGER      NOT NULL DEFAULT 0, \
        active        BOOLEAN      NOT NULL DEFAULT 1, \
        embedstyle    VARCHAR(8)   NOT NULL DEFAULT 'on', \
        bot2botstyle  VARCHAR(8)   NOT NULL DEFAULT 'off', \
        webhookid     VARCHAR(32), \
        webhooktoken  VARCHAR(255), \
        webhookactive BOOLEAN      NOT NULL DEFAULT 0\
    )",
    "CREATE TABLE IF NOT EXISTS tasks (\
        id       INTEGER     PRIMARY KEY AUTOINCREMENT, \
        origin   VARCHAR(32) NOT NULL, \
        dest     VARCHAR(32) NOT NULL, \
        reply    VARCHAR(32) NOT NULL, \
        server   VARCHAR(32) NOT NULL, \
        active   BOOLEAN     NOT NULL DEFAULT 1, \
        LangTo   VARCHAR(8)  NOT NULL DEFAULT 'en', \
        LangFrom VARCHAR(8)  NOT NULL DEFAULT 'en'\
    )",
    "CREATE TABLE IF NOT EXISTS schema_version (\
        version     INTEGER PRIMARY KEY, \
        applied_at  TEXT NOT NULL DEFAULT (datetime('now'))\
    )",
];

/// A single, self-describing schema change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaChange {
    AddColumn {
        table: &'static str,
        column: &'static str,
        sql_type: &'static str,
        /// SQL literal, e.g. `'!tr'` or `0`.
        default: Option<&'static str>,
    },
    CreateIndex {
        name: &'static str,
        table: &'static str,
        columns: &'static [&'static str],
        unique: bool,
    },
    DropIndex {
        name: &'static str,
    },
    /// Make `columns` nullable with `default`. SQLite cannot change a column
    /// constraint in place, so the table is rebuilt.
    RelaxColumns {
        table: &'static str,
        columns: &'static [&'static str],
        /// SQL expression, e.g. `CURRENT_TIMESTAMP`.
        default: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaDelta {
    pub version: i64,
    pub change: SchemaChange,
}

impl SchemaChange {
    /// Human-readable label used in logs and `MigrationError`.
    pub fn describe(&self) -> String {
        match self {
            SchemaChange::AddColumn { table, column, .. } => {
                format!("add column {table}.{column}")
            }
            SchemaChange::CreateIndex { name, table, .. } => {
                format!("create index {name} on {table}")
            }
            SchemaChange::DropIndex { name } => format!("drop index {name}"),
            SchemaChange::RelaxColumns { table, columns, .. } => {
                format!("relax {} on {table}", columns.join(", "))
            }
        }
    }

    /// Single statement applying the change, if it has one.
    fn to_sql(self) -> Option<String> {
        let sql = match self {
            SchemaChange::AddColumn {
                table,
                column,
                sql_type,
                default: Some(default),
            } => format!("ALTER TABLE {table} ADD COLUMN {column} {sql_type} DEFAULT {default}"),
            SchemaChange::AddColumn {
                table,
                column,
                sql_type,
                default: None,
            } => format!("ALTER TABLE {table} ADD COLUMN {column} {sql_type}"),
            SchemaChange::CreateIndex {
                name,
                table,
                columns,
                unique,
            } => format!(
                "CREATE {}INDEX IF NOT EXISTS {name} ON {table} ({})",
                if unique { "UNIQUE " } else { "" },
                columns.join(", ")
            ),
            SchemaChange::DropIndex { name } => format!("DROP INDEX IF EXISTS {name}"),
            SchemaChange::RelaxColumns { .. } => return None,
        };
        Some(sql)
    }
}

/// Every change an older store may be missing, in application order.
pub const SCHEMA_DELTAS: &[SchemaDelta] = &[
    SchemaDelta {
        version: 1,
        change: SchemaChange::AddColumn {
            table: "servers",
            column: "prefix",
            sql_type: "VARCHAR(32)",
            default: Some("'!tr'"),
        },
    },
    SchemaDelta {
        version: 2,
        change: SchemaChange::AddColumn {
            table: "servers",
            column: "embedstyle",
            sql_type: "VARCHAR(8)",
            default: Some("'on'"),
        },
    },
    SchemaDelta {
        version: 3,
        change: SchemaChange::AddColumn {
            table: "servers",
            column: "bot2botstyle",
            sql_type: "VARCHAR(8)",
            default: Some("'off'"),
        },
    },
    SchemaDelta {
        version: 4,
        change: SchemaChange::AddColumn {
            table: "servers",
            column: "webhookid",
            sql_type: "VARCHAR(32)",
            default: None,
        },
    },
    SchemaDelta {
        version: 5,
        change: SchemaChange::AddColumn {
            table: "servers",
            column: "webhooktoken",
            sql_type: "VARCHAR(255)",
            default: None,
        },
    },
    SchemaDelta {
        version: 6,
        change: SchemaChange::AddColumn {
            table: "servers",
            column: "webhookactive",
            sql_type: "BOOLEAN",
            default: Some("0"),
        },
    },
    SchemaDelta {
        version: 7,
        change: SchemaChange::CreateIndex {
            name: "ux_index_1",
            table: "tasks",
            columns: &["origin", "dest", "LangTo", "LangFrom"],
            unique: true,
        },
    },
    SchemaDelta {
        version: 8,
        change: SchemaChange::DropIndex {
            name: "tasks_origin_dest",
        },
    },
    // ORM-created stores carry mandatory timestamp columns no write here fills in.
    SchemaDelta {
        version: 9,
        change: SchemaChange::RelaxColumns {
            table: "servers",
            columns: ORM_TIMESTAMPS,
            default: "CURRENT_TIMESTAMP",
        },
    },
    SchemaDelta {
        version: 10,
        change: SchemaChange::RelaxColumns {
            table: "tasks",
            columns: ORM_TIMESTAMPS,
            default: "CURRENT_TIMESTAMP",
        },
    },
];

const ORM_TIMESTAMPS: &[&str] = &["createdAt", "updatedAt"];

/// Live column definitions of `table`. Empty if the table does not exist.
pub async fn describe_table(
    pool: &SqlitePool,
    table: &str,
) -> Result<Vec<ColumnInfo>, sqlx::Error> {
    sqlx::query_as::<_, ColumnInfo>(
        "SELECT cid, name, type AS col_type, \"notnull\", dflt_value, pk \
         FROM pragma_table_info(?) ORDER BY cid",
    )
    .bind(table)
    .fetch_all(pool)
    .await
}

async fn index_exists(pool: &SqlitePool, name: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'index' AND name = ?")
        .bind(name)
        .fetch_one(pool)
        .await
}

/// Whether the change still has to be applied against the live schema.
async fn is_pending(pool: &SqlitePool, change: &SchemaChange) -> Result<bool, sqlx::Error> {
    match change {
        SchemaChange::AddColumn { table, column, .. } => {
            let columns = describe_table(pool, table).await?;
            Ok(!columns.iter().any(|c| c.name.eq_ignore_ascii_case(column)))
        }
        SchemaChange::CreateIndex { name, .. } => Ok(!index_exists(pool, name).await?),
        SchemaChange::DropIndex { name } => index_exists(pool, name).await,
        SchemaChange::RelaxColumns { table, columns, .. } => {
            let live = describe_table(pool, table).await?;
            Ok(live.iter().any(|c| {
                columns.iter().any(|name| c.name.eq_ignore_ascii_case(name))
                    && c.notnull != 0
                    && c.dflt_value.is_none()
            }))
        }
    }
}

async fn apply(pool: &SqlitePool, change: SchemaChange) -> Result<(), sqlx::Error> {
    match change {
        SchemaChange::RelaxColumns {
            table,
            columns,
            default,
        } => rebuild_table(pool, table, columns, default).await,
        simple => {
            if let Some(sql) = simple.to_sql() {
                sqlx::query(&sql).execute(pool).await?;
            }
            Ok(())
        }
    }
}

/// `CREATE TABLE` for `name` with the live column definitions, `relaxed` columns
/// turned nullable with `default`.
fn rebuilt_table_sql(
    name: &str,
    columns: &[ColumnInfo],
    relaxed: &[&str],
    default: &str,
    autoincrement: bool,
) -> String {
    let mut keys: Vec<&ColumnInfo> = columns.iter().filter(|c| c.pk > 0).collect();
    keys.sort_by_key(|c| c.pk);
    let inline_key = keys.len() == 1;

    let mut defs: Vec<String> = columns
        .iter()
        .map(|column| {
            let mut def = format!("\"{}\" {}", column.name, column.col_type);
            if inline_key && column.pk > 0 {
                def.push_str(" PRIMARY KEY");
                if autoincrement {
                    def.push_str(" AUTOINCREMENT");
                }
            }
            if relaxed.iter().any(|r| column.name.eq_ignore_ascii_case(r)) {
                def.push_str(&format!(" DEFAULT {default}"));
            } else {
                if column.notnull != 0 {
                    def.push_str(" NOT NULL");
                }
                if let Some(value) = &column.dflt_value {
                    def.push_str(&format!(" DEFAULT ({value})"));
                }
            }
            def
        })
        .collect();

    if keys.len() > 1 {
        let names: Vec<String> = keys.iter().map(|c| format!("\"{}\"", c.name)).collect();
        defs.push(format!("PRIMARY KEY ({})", names.join(", ")));
    }
    format!("CREATE TABLE {name} ({})", defs.join(", "))
}

/// Copy `table` into a new definition, swap it in and restore its indexes and triggers.
async fn rebuild_table(
    pool: &SqlitePool,
    table: &str,
    relaxed: &[&str],
    default: &str,
) -> Result<(), sqlx::Error> {
    let columns = describe_table(pool, table).await?;
    let table_sql: String =
        sqlx::query_scalar("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table)
            .fetch_one(pool)
            .await?;
    let dependents: Vec<String> = sqlx::query_scalar(
        "SELECT sql FROM sqlite_master \
         WHERE type IN ('index', 'trigger') AND tbl_name = ? AND sql IS NOT NULL",
    )
    .bind(table)
    .fetch_all(pool)
    .await?;

    let staging = format!("{table}_rebuild");
    let autoincrement = table_sql.to_ascii_uppercase().contains("AUTOINCREMENT");
    let create = rebuilt_table_sql(&staging, &columns, relaxed, default, autoincrement);
    let names = columns
        .iter()
        .map(|c| format!("\"{}\"", c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let copy = format!("INSERT INTO {staging} ({names}) SELECT {names} FROM {table}");
    let drop_old = format!("DROP TABLE {table}");
    let rename = format!("ALTER TABLE {staging} RENAME TO {table}");

    let mut tx = pool.begin().await?;
    for statement in [&create, &copy, &drop_old, &rename] {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    for statement in &dependents {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;

    debug!(%table, restored = dependents.len(), "table rebuilt");
    Ok(())
}

/// Create any missing tables.
pub async fn create_schema(pool: &SqlitePool) -> Result<(), StoreError> {
    for statement in BASE_SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|source| StoreError::Migration {
                operation: "create base schema".into(),
                source,
            })?;
    }
    Ok(())
}

/// Bring an existing store up to the current shape. Returns the number of deltas applied.
///
/// Every delta is guarded by a live existence check, so this is safe on a freshly
/// created schema and running it twice is a no-op. Any failure leaves the schema in
/// an unknown state and must abort startup.
pub async fn upgrade(pool: &SqlitePool) -> Result<usize, StoreError> {
    let mut applied = 0;

    for delta in SCHEMA_DELTAS {
        let operation = delta.change.describe();
        let fail = |source: sqlx::Error| {
            error!(version = delta.version, %operation, error = %source, "schema upgrade failed");
            StoreError::Migration {
                operation: operation.clone(),
                source,
            }
        };

        if is_pending(pool, &delta.change).await.map_err(fail)? {
            info!(version = delta.version, %operation, "applying schema delta");
            apply(pool, delta.change).await.map_err(fail)?;
            applied += 1;
        } else {
            debug!(version = delta.version, %operation, "schema delta already present");
        }

        sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
            .bind(delta.version)
            .execute(pool)
            .await
            .map_err(fail)?;
    }

    info!(applied, "schema upgrade complete");
    Ok(applied)
}

/// Create missing tables then apply pending deltas.
pub async fn run_migrations(pool: &SqlitePool) -> Result<usize, StoreError> {
    create_schema(pool).await?;
    upgrade(pool).await
}
