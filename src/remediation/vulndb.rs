//! # Vulnerability Store
//!
//! SQLite-backed store of vulnerabilities and their known countermeasures.
//! Consumed through three lookups: vulnerability by CVE, patches for a
//! vulnerability, and IDS rules for a vulnerability. A missing row is an
//! empty answer, never an error; the remediation synthesizer turns empty
//! answers into "this leaf has no alternatives".

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::VantageResult;

/// A vulnerability row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub id: i64,
    pub cve: String,
    pub description: Option<String>,
}

/// A patch that closes a vulnerability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub id: i64,
    /// Where to obtain the patch.
    pub link: String,
    pub description: Option<String>,
}

/// An IDS (snort) rule that detects or blocks exploitation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnortRule {
    pub id: i64,
    pub rule: String,
    pub description: Option<String>,
    pub sid: Option<i64>,
    pub gid: Option<i64>,
}

/// Persistent vulnerability/countermeasure store backed by SQLite.
pub struct VulnerabilityStore {
    conn: Connection,
}

impl VulnerabilityStore {
    /// Open (or create) a store at the given path.
    pub fn open(path: &Path) -> VantageResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.create_schema()?;
        Ok(store)
    }

    /// Open an in-memory store. Used by tests and dry runs.
    pub fn open_in_memory() -> VantageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.create_schema()?;
        Ok(store)
    }

    /// Create the schema if it does not exist yet.
    fn create_schema(&self) -> VantageResult<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS vulnerability (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                cve TEXT UNIQUE,
                description TEXT,
                cvss_id INTEGER
            );
            CREATE TABLE IF NOT EXISTS patchs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                link TEXT,
                description TEXT
            );
            CREATE TABLE IF NOT EXISTS patchs_vulnerability (
                id_patch INTEGER,
                id_vulnerability INTEGER
            );
            CREATE UNIQUE INDEX IF NOT EXISTS index_patchs_vulnerability
                ON patchs_vulnerability (id_patch ASC, id_vulnerability ASC);
            CREATE TABLE IF NOT EXISTS rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                rule TEXT,
                description TEXT,
                sid INTEGER,
                gid INTEGER
            );
            CREATE TABLE IF NOT EXISTS rules_vulnerability (
                id_rule INTEGER,
                id_vulnerability INTEGER
            );
            CREATE UNIQUE INDEX IF NOT EXISTS index_rules_vulnerability
                ON rules_vulnerability (id_rule ASC, id_vulnerability ASC);
            CREATE TABLE IF NOT EXISTS cvss (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                score REAL,
                access_vector TEXT,
                access_complexity TEXT,
                authentication TEXT,
                confidentiality_impact TEXT,
                integrity_impact TEXT,
                availability_impact TEXT
            );",
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lookups (the consumed contract)
    // -----------------------------------------------------------------------

    /// Look a vulnerability up by CVE identifier.
    pub fn vulnerability_by_cve(&self, cve: &str) -> VantageResult<Option<Vulnerability>> {
        let result = self
            .conn
            .query_row(
                "SELECT id, cve, description FROM vulnerability WHERE cve = ?1",
                params![cve],
                |row| {
                    Ok(Vulnerability {
                        id: row.get(0)?,
                        cve: row.get(1)?,
                        description: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(result)
    }

    /// All patches linked to a vulnerability.
    pub fn patches_for(&self, vulnerability_id: i64) -> VantageResult<Vec<Patch>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.id, p.link, p.description
             FROM patchs p
             JOIN patchs_vulnerability pv ON pv.id_patch = p.id
             WHERE pv.id_vulnerability = ?1
             ORDER BY p.id",
        )?;
        let rows = stmt.query_map(params![vulnerability_id], |row| {
            Ok(Patch {
                id: row.get(0)?,
                link: row.get(1)?,
                description: row.get(2)?,
            })
        })?;
        let mut result = Vec::new();
        for patch in rows {
            result.push(patch?);
        }
        Ok(result)
    }

    /// All IDS rules linked to a vulnerability.
    pub fn rules_for(&self, vulnerability_id: i64) -> VantageResult<Vec<SnortRule>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.id, r.rule, r.description, r.sid, r.gid
             FROM rules r
             JOIN rules_vulnerability rv ON rv.id_rule = r.id
             WHERE rv.id_vulnerability = ?1
             ORDER BY r.id",
        )?;
        let rows = stmt.query_map(params![vulnerability_id], |row| {
            Ok(SnortRule {
                id: row.get(0)?,
                rule: row.get(1)?,
                description: row.get(2)?,
                sid: row.get(3)?,
                gid: row.get(4)?,
            })
        })?;
        let mut result = Vec::new();
        for rule in rows {
            result.push(rule?);
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Population (import tooling and tests)
    // -----------------------------------------------------------------------

    /// Insert a vulnerability, returning its row id. Idempotent on CVE.
    pub fn insert_vulnerability(&self, cve: &str, description: &str) -> VantageResult<i64> {
        if let Some(existing) = self.vulnerability_by_cve(cve)? {
            return Ok(existing.id);
        }
        self.conn.execute(
            "INSERT INTO vulnerability (cve, description) VALUES (?1, ?2)",
            params![cve, description],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Insert a patch and link it to a vulnerability.
    pub fn insert_patch(
        &self,
        vulnerability_id: i64,
        link: &str,
        description: &str,
    ) -> VantageResult<i64> {
        self.conn.execute(
            "INSERT INTO patchs (link, description) VALUES (?1, ?2)",
            params![link, description],
        )?;
        let patch_id = self.conn.last_insert_rowid();
        self.conn.execute(
            "INSERT OR IGNORE INTO patchs_vulnerability (id_patch, id_vulnerability)
             VALUES (?1, ?2)",
            params![patch_id, vulnerability_id],
        )?;
        Ok(patch_id)
    }

    /// Insert an IDS rule and link it to a vulnerability.
    pub fn insert_rule(
        &self,
        vulnerability_id: i64,
        rule: &str,
        description: &str,
        sid: Option<i64>,
        gid: Option<i64>,
    ) -> VantageResult<i64> {
        self.conn.execute(
            "INSERT INTO rules (rule, description, sid, gid) VALUES (?1, ?2, ?3, ?4)",
            params![rule, description, sid, gid],
        )?;
        let rule_id = self.conn.last_insert_rowid();
        self.conn.execute(
            "INSERT OR IGNORE INTO rules_vulnerability (id_rule, id_vulnerability)
             VALUES (?1, ?2)",
            params![rule_id, vulnerability_id],
        )?;
        Ok(rule_id)
    }
}
