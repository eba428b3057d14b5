//! Tablespace layout of the source cluster: derived once from the catalog,
//! written to the mapping file that `pg_upgrade` consumes, and kept in
//! memory keyed by dbid for building the per-segment upgrade requests.

use std::collections::BTreeMap;
use std::io::Write;

use anyhow::Context;
use camino::Utf8Path;
use tokio_postgres::Client;
use upgrade_api::tablespace::TablespaceInfo;

/// The catalog only carries tablespaces in this form on Greenplum 5;
/// `pg_filespace_entry` is gone in later majors.
const SUPPORTED_SOURCE_MAJOR_VERSION: u32 = 5;

/// Joins the tablespace and filespace-entry catalogs. A tablespace is
/// user-defined iff its name is neither the default nor the global shared
/// tablespace; user-defined locations get their oid appended so each
/// tablespace maps to a distinct directory.
const TABLESPACES_QUERY: &str = "
    SELECT
        fsedbid::int AS dbid,
        upgrade_tablespace.oid AS oid,
        spcname::text AS name,
        (CASE WHEN is_user_defined_tablespace THEN location_with_oid ELSE fselocation END)::text AS location,
        is_user_defined_tablespace::int AS user_defined
    FROM (
            SELECT
                pg_tablespace.oid,
                *,
                (fselocation || '/' || pg_tablespace.oid) AS location_with_oid,
                (spcname NOT IN ('pg_default', 'pg_global')) AS is_user_defined_tablespace
            FROM pg_tablespace
            INNER JOIN pg_filespace_entry
            ON fsefsoid = spcfsoid
        ) upgrade_tablespace";

/// One row of the catalog query, in mapping-file field order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablespaceTuple {
    pub dbid: i32,
    pub oid: u32,
    pub name: String,
    pub location: String,
    pub user_defined: i32,
}

/// dbid -> oid -> layout, for every segment of the cluster.
pub type Tablespaces = BTreeMap<i32, BTreeMap<u32, TablespaceInfo>>;

#[derive(thiserror::Error, Debug)]
pub enum TablespaceError {
    #[error("source cluster version {version:?} is not supported to retrieve tablespace information")]
    UnsupportedVersion { version: String },
}

/// Query the source coordinator for the cluster-wide tablespace tuples.
/// Fails with [`TablespaceError::UnsupportedVersion`] on any other major.
pub async fn tablespace_tuples(client: &Client) -> anyhow::Result<Vec<TablespaceTuple>> {
    let row = client
        .query_one("SELECT version()", &[])
        .await
        .context("querying source cluster version")?;
    let version: String = row.get(0);
    if greenplum_major_version(&version) != Some(SUPPORTED_SOURCE_MAJOR_VERSION) {
        return Err(TablespaceError::UnsupportedVersion { version }.into());
    }

    let rows = client
        .query(TABLESPACES_QUERY, &[])
        .await
        .context("querying tablespaces")?;

    Ok(rows
        .into_iter()
        .map(|row| TablespaceTuple {
            dbid: row.get("dbid"),
            oid: row.get("oid"),
            name: row.get("name"),
            location: row.get("location"),
            user_defined: row.get("user_defined"),
        })
        .collect())
}

fn greenplum_major_version(version: &str) -> Option<u32> {
    let rest = version.split("Greenplum Database ").nth(1)?;
    rest.split(|c: char| c == '.' || c.is_whitespace())
        .next()?
        .parse()
        .ok()
}

/// Write the tuples in the CSV form `pg_upgrade` consumes:
/// `dbid,oid,name,location,user_defined`, one row per tuple, insertion
/// order. Flushes before returning on both the success and the error path,
/// so a mid-loop failure never leaves buffered rows unwritten.
pub fn write_tuples<W: Write>(writer: W, tuples: &[TablespaceTuple]) -> anyhow::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let write_result = tuples.iter().try_for_each(|tuple| {
        let record = [
            tuple.dbid.to_string(),
            tuple.oid.to_string(),
            tuple.name.clone(),
            tuple.location.clone(),
            tuple.user_defined.to_string(),
        ];
        csv_writer
            .write_record(&record)
            .with_context(|| format!("write tablespace record {record:?}"))
    });
    let flush_result = csv_writer.flush().context("flush tablespace mapping file");

    write_result.and(flush_result)
}

/// Group the tuple sequence into the in-memory map.
pub fn tablespaces_from_tuples(tuples: &[TablespaceTuple]) -> Tablespaces {
    let mut cluster_tablespaces = Tablespaces::new();
    for tuple in tuples {
        cluster_tablespaces.entry(tuple.dbid).or_default().insert(
            tuple.oid,
            TablespaceInfo {
                location: tuple.location.clone().into(),
                user_defined: tuple.user_defined != 0,
            },
        );
    }
    cluster_tablespaces
}

/// Query the source cluster, persist the mapping file, and return the
/// in-memory map. The mapping file either contains every queried tuple or
/// the whole operation fails and upgrade does not proceed.
pub async fn tablespaces_from_db(
    client: &Client,
    mapping_file: &Utf8Path,
) -> anyhow::Result<Tablespaces> {
    let tuples = tablespace_tuples(client)
        .await
        .context("couldn't retrieve tablespace information")?;

    let file = std::fs::File::create(mapping_file)
        .with_context(|| format!("create tablespace mapping file {mapping_file:?}"))?;
    write_tuples(file, &tuples).context("populate the tablespace mapping file")?;

    Ok(tablespaces_from_tuples(&tuples))
}
