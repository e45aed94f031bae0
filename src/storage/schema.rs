//! Table and index definitions for the four stores
//!
//! Each store has one declared column list which drives both initial
//! creation and the additive migration: columns present in the
//! declaration but missing from an existing file are added with
//! ALTER TABLE. Columns are never renamed or dropped.

use rusqlite::Connection;
use std::collections::HashSet;

pub struct TableSpec {
    pub table: &'static str,
    /// (column name, declaration) in insertion order
    pub columns: &'static [(&'static str, &'static str)],
    /// Table-level primary key clause, when the key is composite
    pub primary_key: Option<&'static str>,
    /// (index name, indexed expression)
    pub indexes: &'static [(&'static str, &'static str)],
    /// Indexes skipped under GALDEX_SKIP_EXPENSIVE_INDEXES
    pub expensive_indexes: &'static [(&'static str, &'static str)],
}

impl TableSpec {
    /// Create the table if needed, add any missing columns, create indexes
    pub fn init(&self, conn: &Connection, skip_expensive_indexes: bool) -> rusqlite::Result<()> {
        conn.execute(&self.create_sql(), [])?;
        self.migrate_additive(conn)?;

        for (name, expr) in self.indexes {
            conn.execute(
                &format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                    name, self.table, expr
                ),
                [],
            )?;
        }

        if !skip_expensive_indexes {
            for (name, expr) in self.expensive_indexes {
                conn.execute(
                    &format!(
                        "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                        name, self.table, expr
                    ),
                    [],
                )?;
            }
        }

        Ok(())
    }

    fn create_sql(&self) -> String {
        let mut defs: Vec<String> = self
            .columns
            .iter()
            .map(|(name, decl)| format!("{} {}", name, decl))
            .collect();
        if let Some(pk) = self.primary_key {
            defs.push(format!("PRIMARY KEY ({})", pk));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.table,
            defs.join(", ")
        )
    }

    /// Add declared columns missing from an existing file
    fn migrate_additive(&self, conn: &Connection) -> rusqlite::Result<()> {
        let existing = existing_columns(conn, self.table)?;
        for (name, decl) in self.columns {
            if !existing.contains(*name) {
                log::info!("🔧 Adding column {}.{}", self.table, name);
                conn.execute(
                    &format!("ALTER TABLE {} ADD COLUMN {} {}", self.table, name, decl),
                    [],
                )?;
            }
        }
        Ok(())
    }
}

fn existing_columns(conn: &Connection, table: &str) -> rusqlite::Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    names.collect()
}

pub const SYSTEMS_TABLE: TableSpec = TableSpec {
    table: "systems",
    columns: &[
        ("systemAddress", "INTEGER PRIMARY KEY"),
        ("systemName", "TEXT COLLATE NOCASE"),
        ("systemX", "REAL"),
        ("systemY", "REAL"),
        ("systemZ", "REAL"),
        ("systemSector", "TEXT"),
        ("updatedAt", "TEXT"),
    ],
    primary_key: None,
    indexes: &[("idx_systems_name", "systemName COLLATE NOCASE")],
    expensive_indexes: &[
        ("idx_systems_sector", "systemSector"),
        ("idx_systems_coords", "systemX, systemY, systemZ"),
    ],
};

pub const LOCATIONS_TABLE: TableSpec = TableSpec {
    table: "locations",
    columns: &[
        ("locationId", "TEXT PRIMARY KEY"),
        ("locationName", "TEXT COLLATE NOCASE"),
        ("systemAddress", "INTEGER"),
        ("systemName", "TEXT COLLATE NOCASE"),
        ("systemX", "REAL"),
        ("systemY", "REAL"),
        ("systemZ", "REAL"),
        ("bodyId", "INTEGER"),
        ("bodyName", "TEXT"),
        ("latitude", "REAL"),
        ("longitude", "REAL"),
        ("updatedAt", "TEXT"),
    ],
    primary_key: None,
    indexes: &[("idx_locations_system", "systemAddress")],
    expensive_indexes: &[("idx_locations_name", "locationName COLLATE NOCASE")],
};

/// Station service flags, in the order they appear in upstream payloads
pub const STATION_SERVICES: &[&str] = &[
    "shipyard",
    "outfitting",
    "blackMarket",
    "repair",
    "refuel",
    "restock",
    "contacts",
    "interstellarFactors",
    "materialTrader",
    "missions",
    "searchAndRescue",
    "technologyBroker",
    "tuning",
    "universalCartographics",
    "engineer",
    "frontlineSolutions",
    "apexInterstellar",
    "vistaGenomics",
    "pioneerSupplies",
    "bartender",
    "crewLounge",
];

pub const STATIONS_TABLE: TableSpec = TableSpec {
    table: "stations",
    columns: &[
        ("marketId", "INTEGER PRIMARY KEY"),
        ("stationName", "TEXT COLLATE NOCASE"),
        ("distanceToArrival", "REAL"),
        ("stationType", "TEXT"),
        ("allegiance", "TEXT"),
        ("government", "TEXT"),
        ("controllingFaction", "TEXT"),
        ("primaryEconomy", "TEXT"),
        ("secondaryEconomy", "TEXT"),
        ("shipyard", "INTEGER"),
        ("outfitting", "INTEGER"),
        ("blackMarket", "INTEGER"),
        ("repair", "INTEGER"),
        ("refuel", "INTEGER"),
        ("restock", "INTEGER"),
        ("contacts", "INTEGER"),
        ("interstellarFactors", "INTEGER"),
        ("materialTrader", "INTEGER"),
        ("missions", "INTEGER"),
        ("searchAndRescue", "INTEGER"),
        ("technologyBroker", "INTEGER"),
        ("tuning", "INTEGER"),
        ("universalCartographics", "INTEGER"),
        ("engineer", "INTEGER"),
        ("frontlineSolutions", "INTEGER"),
        ("apexInterstellar", "INTEGER"),
        ("vistaGenomics", "INTEGER"),
        ("pioneerSupplies", "INTEGER"),
        ("bartender", "INTEGER"),
        ("crewLounge", "INTEGER"),
        ("bodyId", "INTEGER"),
        ("bodyName", "TEXT"),
        ("latitude", "REAL"),
        ("longitude", "REAL"),
        ("systemAddress", "INTEGER"),
        ("systemName", "TEXT COLLATE NOCASE"),
        ("systemX", "REAL"),
        ("systemY", "REAL"),
        ("systemZ", "REAL"),
        ("maxLandingPadSize", "TEXT"),
        ("prohibited", "TEXT"),
        ("carrierDockingAccess", "TEXT"),
        ("updatedAt", "TEXT"),
    ],
    primary_key: None,
    indexes: &[
        ("idx_stations_name", "stationName COLLATE NOCASE"),
        ("idx_stations_system", "systemAddress"),
    ],
    expensive_indexes: &[
        ("idx_stations_coords", "systemX, systemY, systemZ"),
        ("idx_stations_type", "stationType"),
        ("idx_stations_updated", "updatedAt"),
    ],
};

pub const TRADE_TABLE: TableSpec = TableSpec {
    table: "commodities",
    columns: &[
        ("commodityName", "TEXT COLLATE NOCASE NOT NULL"),
        ("marketId", "INTEGER NOT NULL"),
        ("buyPrice", "INTEGER"),
        ("sellPrice", "INTEGER"),
        ("meanPrice", "INTEGER"),
        ("stock", "INTEGER"),
        ("demand", "INTEGER"),
        ("stockBracket", "INTEGER"),
        ("demandBracket", "INTEGER"),
        ("updatedAt", "TEXT"),
        ("updatedAtDay", "TEXT"),
    ],
    primary_key: Some("commodityName, marketId"),
    indexes: &[
        ("idx_commodities_name", "commodityName COLLATE NOCASE"),
        ("idx_commodities_market", "marketId"),
    ],
    expensive_indexes: &[
        ("idx_commodities_day", "updatedAtDay"),
        ("idx_commodities_updated", "updatedAt"),
    ],
};
