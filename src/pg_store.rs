//! Postgres tables for the host link graph and resolved researchers.

use tokio_postgres::{Client, NoTls, Transaction};
use tracing::{debug, error};

use crate::error::{ConfigurationError, PersistenceError};
use crate::page::SiteAggregate;
use crate::store::SiteSink;

/// Fully-qualified Postgres table name (schema + table).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    schema: String,
    table: String,
}

impl TableName {
    /// Builds a new table identifier.
    pub fn new<S, T>(schema: S, table: T) -> Result<Self, ConfigurationError>
    where
        S: Into<String>,
        T: Into<String>,
    {
        let schema = schema.into();
        let table = table.into();
        if schema.trim().is_empty() {
            return Err(ConfigurationError::Invalid("schema name is required".to_string()));
        }
        if table.trim().is_empty() {
            return Err(ConfigurationError::Invalid("table name is required".to_string()));
        }
        Ok(Self { schema, table })
    }

    /// Fully-qualified table reference with quoted identifiers.
    pub fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }
}

/// Quotes Postgres identifiers, escaping embedded quotes.
pub fn quote_ident(input: &str) -> String {
    let escaped = input.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

/// A parent table keyed by host and the child table hanging off it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TablePair {
    parent: TableName,
    child: TableName,
    parent_key: &'static str,
    child_column: &'static str,
}

impl TablePair {
    fn parent_ddl(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                host TEXT NOT NULL,
                tier SMALLINT,
                recorded_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            self.parent.qualified()
        )
    }

    fn child_ddl(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                {} BIGINT NOT NULL REFERENCES {} (id) ON DELETE CASCADE,
                {} TEXT NOT NULL
            )",
            self.child.qualified(),
            self.parent_key,
            self.parent.qualified(),
            self.child_column
        )
    }

    fn insert_parent_sql(&self) -> String {
        format!(
            "INSERT INTO {} (host, tier) VALUES ($1, $2) RETURNING id",
            self.parent.qualified()
        )
    }

    fn insert_child_sql(&self) -> String {
        format!(
            "INSERT INTO {} ({}, {}) VALUES ($1, $2)",
            self.child.qualified(),
            self.parent_key,
            self.child_column
        )
    }
}

/// Relational sink for link edges and resolved researchers.
///
/// Each site is written in one transaction. A parent row (`link_sources`,
/// `researcher_domains`) is only inserted when it has at least one child row.
pub struct PgGraphStore {
    client: Client,
    links: TablePair,
    researchers: TablePair,
}

impl PgGraphStore {
    /// Connects to `database_url` and optionally creates the output tables.
    pub async fn connect(
        database_url: &str,
        schema: &str,
        prepare_tables: bool,
    ) -> Result<Self, ConfigurationError> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .map_err(|err| ConfigurationError::Store(format!("failed to connect to Postgres: {err}")))?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!(error = %err, "postgres connection error");
            }
        });

        let store = Self {
            client,
            links: TablePair {
                parent: TableName::new(schema, "link_sources")?,
                child: TableName::new(schema, "link_targets")?,
                parent_key: "source_id",
                child_column: "host",
            },
            researchers: TablePair {
                parent: TableName::new(schema, "researcher_domains")?,
                child: TableName::new(schema, "researchers")?,
                parent_key: "domain_id",
                child_column: "name",
            },
        };
        if prepare_tables {
            store.ensure_tables().await?;
        }
        Ok(store)
    }

    async fn ensure_tables(&self) -> Result<(), ConfigurationError> {
        for pair in [&self.links, &self.researchers] {
            for ddl in [pair.parent_ddl(), pair.child_ddl()] {
                self.client.execute(&ddl, &[]).await.map_err(|err| {
                    ConfigurationError::Store(format!("failed to create output tables: {err}"))
                })?;
            }
        }
        Ok(())
    }
}

impl SiteSink for PgGraphStore {
    async fn commit_site(&mut self, site: &SiteAggregate) -> Result<(), PersistenceError> {
        if site.destinations.is_empty() && site.researchers.is_empty() {
            return Ok(());
        }
        let tier = site.tier.map(i16::from);
        let transaction = self.client.transaction().await?;
        insert_family(&transaction, &self.links, &site.host, tier, &site.destinations).await?;
        insert_family(&transaction, &self.researchers, &site.host, tier, &site.researchers).await?;
        transaction.commit().await?;
        debug!(
            host = %site.host,
            edges = site.destinations.len(),
            researchers = site.researchers.len(),
            "committed site to postgres"
        );
        Ok(())
    }
}

async fn insert_family<'a, I>(
    transaction: &Transaction<'_>,
    tables: &TablePair,
    host: &str,
    tier: Option<i16>,
    children: I,
) -> Result<(), PersistenceError>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut children = children.into_iter().peekable();
    if children.peek().is_none() {
        return Ok(());
    }
    let row = transaction
        .query_one(&tables.insert_parent_sql(), &[&host, &tier])
        .await?;
    let parent_id: i64 = row.get(0);
    let statement = transaction.prepare(&tables.insert_child_sql()).await?;
    for child in children {
        transaction.execute(&statement, &[&parent_id, child]).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn links(schema: &str) -> TablePair {
        TablePair {
            parent: TableName::new(schema, "link_sources").unwrap(),
            child: TableName::new(schema, "link_targets").unwrap(),
            parent_key: "source_id",
            child_column: "host",
        }
    }

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        let table = TableName::new("eco map", "link_sources").unwrap();
        assert_eq!(table.qualified(), "\"eco map\".\"link_sources\"");
    }

    #[test]
    fn rejects_blank_names() {
        assert!(TableName::new(" ", "researchers").is_err());
        assert!(TableName::new("public", "").is_err());
    }

    #[test]
    fn child_table_references_parent() {
        let ddl = links("public").child_ddl();
        assert!(ddl.contains("source_id BIGINT NOT NULL"));
        assert!(ddl.contains("REFERENCES \"public\".\"link_sources\" (id)"));
    }

    #[test]
    fn insert_statements_target_schema() {
        let pair = links("crawl");
        assert_eq!(
            pair.insert_parent_sql(),
            "INSERT INTO \"crawl\".\"link_sources\" (host, tier) VALUES ($1, $2) RETURNING id"
        );
        assert_eq!(
            pair.insert_child_sql(),
            "INSERT INTO \"crawl\".\"link_targets\" (source_id, host) VALUES ($1, $2)"
        );
    }
}
