//! Top-level commands.

use std::collections::BTreeMap;
use std::fmt;

use quill_core::{DataType, Value};
use serde::{Deserialize, Serialize};

use super::{Condition, JoinCondition, SelectQuery};

/// Column declaration of CREATE TABLE.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Command category, as reported to presentation layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Create,
    Insert,
    Select,
    Update,
    Delete,
    Join,
    Alter,
    Rename,
    Drop,
    Describe,
    Show,
    Begin,
    Commit,
    Rollback,
}

impl CommandKind {
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::Create => "CREATE",
            CommandKind::Insert => "INSERT",
            CommandKind::Select => "SELECT",
            CommandKind::Update => "UPDATE",
            CommandKind::Delete => "DELETE",
            CommandKind::Join => "JOIN",
            CommandKind::Alter => "ALTER",
            CommandKind::Rename => "RENAME",
            CommandKind::Drop => "DROP",
            CommandKind::Describe => "DESCRIBE",
            CommandKind::Show => "SHOW",
            CommandKind::Begin => "BEGIN",
            CommandKind::Commit => "COMMIT",
            CommandKind::Rollback => "ROLLBACK",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A structured command produced by an external parser.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Command {
    CreateTable {
        table: String,
        columns: Vec<ColumnDef>,
        #[serde(default)]
        primary_key: Option<String>,
        #[serde(default)]
        unique: Vec<String>,
        /// column -> "referenced_table.referenced_column"
        #[serde(default)]
        foreign_keys: BTreeMap<String, String>,
    },
    /// Positional values, or named ones when `columns` is given. Either
    /// way every column of the table must receive a value.
    Insert {
        table: String,
        #[serde(default)]
        columns: Option<Vec<String>>,
        values: Vec<Value>,
    },
    Select(SelectQuery),
    Join {
        left: String,
        right: String,
        on: JoinCondition,
        /// Output columns; empty keeps all of them.
        #[serde(default)]
        columns: Vec<String>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Value)>,
        #[serde(default)]
        condition: Option<Condition>,
    },
    Delete {
        table: String,
        #[serde(default)]
        condition: Option<Condition>,
    },
    AlterAddColumn {
        table: String,
        column: String,
        data_type: DataType,
    },
    AlterDropColumn {
        table: String,
        column: String,
    },
    AlterRenameColumn {
        table: String,
        from: String,
        to: String,
    },
    RenameTable {
        table: String,
        to: String,
    },
    DropTable {
        table: String,
    },
    Describe {
        table: String,
    },
    ShowTables,
    Begin,
    Commit,
    Rollback,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::CreateTable { .. } => CommandKind::Create,
            Command::Insert { .. } => CommandKind::Insert,
            Command::Select(_) => CommandKind::Select,
            Command::Join { .. } => CommandKind::Join,
            Command::Update { .. } => CommandKind::Update,
            Command::Delete { .. } => CommandKind::Delete,
            Command::AlterAddColumn { .. } | Command::AlterDropColumn { .. } | Command::AlterRenameColumn { .. } => {
                CommandKind::Alter
            }
            Command::RenameTable { .. } => CommandKind::Rename,
            Command::DropTable { .. } => CommandKind::Drop,
            Command::Describe { .. } => CommandKind::Describe,
            Command::ShowTables => CommandKind::Show,
            Command::Begin => CommandKind::Begin,
            Command::Commit => CommandKind::Commit,
            Command::Rollback => CommandKind::Rollback,
        }
    }

    /// The table a single-table command targets.
    pub fn table(&self) -> Option<&str> {
        match self {
            Command::CreateTable { table, .. }
            | Command::Insert { table, .. }
            | Command::Update { table, .. }
            | Command::Delete { table, .. }
            | Command::AlterAddColumn { table, .. }
            | Command::AlterDropColumn { table, .. }
            | Command::AlterRenameColumn { table, .. }
            | Command::RenameTable { table, .. }
            | Command::DropTable { table }
            | Command::Describe { table } => Some(table),
            Command::Select(query) => Some(&query.table),
            Command::Join { .. } | Command::ShowTables | Command::Begin | Command::Commit | Command::Rollback => None,
        }
    }

    /// Whether the command changes a table's schema or the table set.
    pub fn is_ddl(&self) -> bool {
        matches!(
            self.kind(),
            CommandKind::Create | CommandKind::Alter | CommandKind::Rename | CommandKind::Drop
        )
    }

    /// Whether the command writes rows.
    pub fn is_write(&self) -> bool {
        matches!(self.kind(), CommandKind::Insert | CommandKind::Update | CommandKind::Delete)
    }
}
