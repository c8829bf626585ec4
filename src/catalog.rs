//! Catalog snapshot: tables, columns, relations and types.
//!
//! The snapshot is produced by an external introspection layer and is
//! immutable for the lifetime of a schema build. It can be deserialized
//! from JSON so snapshots can be captured and replayed in tests.

use postgres::types::Type;
use serde::{Deserialize, Serialize};

use crate::error::PgAggregatesError;
use crate::fragment::Fragment;

/// Type OIDs of the built-in types the aggregate rules refer to.
pub mod oid {
    pub const BOOL: u32 = 16;
    pub const NAME: u32 = 19;
    pub const INT8: u32 = 20;
    pub const INT2: u32 = 21;
    pub const INT4: u32 = 23;
    pub const TEXT: u32 = 25;
    pub const OID: u32 = 26;
    pub const JSON: u32 = 114;
    pub const XML: u32 = 142;
    pub const POINT: u32 = 600;
    pub const LSEG: u32 = 601;
    pub const PATH: u32 = 602;
    pub const BOX: u32 = 603;
    pub const POLYGON: u32 = 604;
    pub const LINE: u32 = 628;
    pub const FLOAT4: u32 = 700;
    pub const FLOAT8: u32 = 701;
    pub const CIRCLE: u32 = 718;
    pub const MONEY: u32 = 790;
    pub const BPCHAR: u32 = 1042;
    pub const VARCHAR: u32 = 1043;
    pub const DATE: u32 = 1082;
    pub const TIME: u32 = 1083;
    pub const TIMESTAMP: u32 = 1114;
    pub const TIMESTAMPTZ: u32 = 1184;
    pub const INTERVAL: u32 = 1186;
    pub const TIMETZ: u32 = 1266;
    pub const NUMERIC: u32 = 1700;
    pub const UUID: u32 = 2950;
    pub const JSONB: u32 = 3802;
}

/// Coarse type classification, mirroring `pg_type.typcategory`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeCategory {
    /// `N`: integers, floats, numeric, money.
    Numeric,
    /// `D`: date, time, timestamp.
    Datetime,
    /// `T`: interval.
    Timespan,
    /// `S`: text-like.
    String,
    /// `B`
    Boolean,
    Other,
}

/// A resolved SQL type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeInfo {
    pub oid: u32,
    pub name: String,
    pub category: TypeCategory,
}

impl TypeInfo {
    /// Resolve a built-in type by OID.
    pub fn builtin(type_oid: u32) -> Option<TypeInfo> {
        let ty = Type::from_oid(type_oid)?;
        Some(TypeInfo {
            oid: type_oid,
            name: ty.name().to_string(),
            category: builtin_category(type_oid),
        })
    }

    pub fn is_number_like(&self) -> bool {
        self.category == TypeCategory::Numeric
    }

    /// Numbers `avg`, `stddev_*` and `var_*` accept; money has none of them.
    pub fn is_arithmetic(&self) -> bool {
        self.is_number_like() && self.oid != oid::MONEY
    }

    /// False for types without a default equality operator, which
    /// `count(DISTINCT ...)` needs.
    pub fn has_equality(&self) -> bool {
        !lacks_equality(self.oid)
    }

    pub fn is_interval(&self) -> bool {
        self.category == TypeCategory::Timespan
    }

    pub fn is_datetime(&self) -> bool {
        self.category == TypeCategory::Datetime
    }

    /// True for `timestamp` and `timestamptz`, the inputs `date_trunc` preserves.
    pub fn is_timestamp(&self) -> bool {
        self.oid == oid::TIMESTAMP || self.oid == oid::TIMESTAMPTZ
    }
}

fn builtin_category(type_oid: u32) -> TypeCategory {
    match type_oid {
        oid::INT2 | oid::INT4 | oid::INT8 | oid::FLOAT4 | oid::FLOAT8 | oid::NUMERIC
        | oid::MONEY => TypeCategory::Numeric,
        oid::DATE | oid::TIME | oid::TIMETZ | oid::TIMESTAMP | oid::TIMESTAMPTZ => {
            TypeCategory::Datetime
        }
        oid::INTERVAL => TypeCategory::Timespan,
        oid::TEXT | oid::VARCHAR | oid::BPCHAR | oid::NAME => TypeCategory::String,
        oid::BOOL => TypeCategory::Boolean,
        _ => TypeCategory::Other,
    }
}

/// A table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub type_oid: u32,
    pub is_nullable: bool,
}

/// A foreign-key relation as seen from one side.
///
/// `is_referencee` is true when this table is the *referenced* side, i.e.
/// the relation points at many rows of `remote_table` (one-to-many).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub name: String,
    pub is_referencee: bool,
    /// Columns on this table, paired positionally with `remote_columns`.
    pub local_columns: Vec<String>,
    pub remote_columns: Vec<String>,
    pub remote_schema: String,
    pub remote_table: String,
}

/// A table snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub schema: String,
    pub name: String,
    pub columns: Vec<Column>,
    /// Column sets of primary key and unique constraints.
    #[serde(default)]
    pub unique_keys: Vec<Vec<String>>,
    #[serde(default)]
    pub relations: Vec<Relation>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// True when `column` alone forms a unique key.
    pub fn is_single_column_unique(&self, column: &str) -> bool {
        self.unique_keys
            .iter()
            .any(|key| key.len() == 1 && key[0] == column)
    }

    /// True when `columns`, as a set, matches one of the unique keys.
    pub fn has_unique_key(&self, columns: &[String]) -> bool {
        self.unique_keys.iter().any(|key| {
            key.len() == columns.len() && key.iter().all(|k| columns.contains(k))
        })
    }

    /// The schema-qualified table reference.
    pub fn sql_name(&self) -> Result<Fragment, PgAggregatesError> {
        Fragment::qualified(&[self.schema.as_str(), self.name.as_str()])
    }
}

/// Immutable catalog snapshot for one schema build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// Non-built-in types (domains, enums, extension types).
    #[serde(default)]
    pub types: Vec<TypeInfo>,
    pub tables: Vec<Table>,
}

impl Catalog {
    pub fn new(tables: Vec<Table>) -> Self {
        Catalog {
            types: Vec::new(),
            tables,
        }
    }

    /// Parse a snapshot from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn table(&self, schema: &str, name: &str) -> Option<&Table> {
        self.tables
            .iter()
            .find(|t| t.schema == schema && t.name == name)
    }

    /// Resolve a type OID, preferring catalog-registered types over built-ins.
    pub fn resolve_type(&self, type_oid: u32) -> Option<TypeInfo> {
        self.types
            .iter()
            .find(|t| t.oid == type_oid)
            .cloned()
            .or_else(|| TypeInfo::builtin(type_oid))
    }

    /// The table a relation points at.
    pub fn remote_table(&self, relation: &Relation) -> Option<&Table> {
        self.table(&relation.remote_schema, &relation.remote_table)
    }

    /// True when the relation reaches at most one remote row.
    pub fn is_relation_unique(&self, relation: &Relation) -> bool {
        match self.remote_table(relation) {
            Some(remote) => remote.has_unique_key(&relation.remote_columns),
            None => false,
        }
    }

    /// A relation can be aggregated when it is a backward (one-to-many),
    /// non-unique relation whose remote table is in the snapshot.
    pub fn is_aggregatable(&self, relation: &Relation) -> bool {
        relation.is_referencee
            && !relation.local_columns.is_empty()
            && relation.local_columns.len() == relation.remote_columns.len()
            && self.remote_table(relation).is_some()
            && !self.is_relation_unique(relation)
    }
}

/// Capability query gating eligibility beyond type suitability.
pub trait ColumnCapabilities: Send + Sync {
    fn is_orderable(&self, table: &Table, column: &Column) -> bool;
    fn is_filterable(&self, table: &Table, column: &Column) -> bool;
}

/// Treats json, jsonb, xml and geometric columns as neither orderable nor filterable.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCapabilities;

fn lacks_equality(type_oid: u32) -> bool {
    matches!(
        type_oid,
        oid::JSON
            | oid::XML
            | oid::POINT
            | oid::LSEG
            | oid::PATH
            | oid::BOX
            | oid::POLYGON
            | oid::LINE
            | oid::CIRCLE
    )
}

fn is_opaque_type(type_oid: u32) -> bool {
    type_oid == oid::JSONB || lacks_equality(type_oid)
}

impl ColumnCapabilities for DefaultCapabilities {
    fn is_orderable(&self, _table: &Table, column: &Column) -> bool {
        !is_opaque_type(column.type_oid)
    }

    fn is_filterable(&self, _table: &Table, column: &Column) -> bool {
        !is_opaque_type(column.type_oid)
    }
}
