//! Declared model metadata
//!
//! Tables registered here are what `create_all_tables` / `drop_all_tables`
//! operate on. Creation follows declaration order, dropping runs in reverse
//! so referencing tables go first.

use std::fmt;

/// A model type that declares its table
pub trait Model {
    fn table() -> Table;
}

/// Column declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    /// Type and constraints, e.g. `BIGINT PRIMARY KEY`
    pub definition: String,
}

/// Table declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    constraints: Vec<String>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            constraints: Vec::new(),
        }
    }

    pub fn column(mut self, name: impl Into<String>, definition: impl Into<String>) -> Self {
        self.columns.push(Column {
            name: name.into(),
            definition: definition.into(),
        });
        self
    }

    /// Table-level constraint, e.g. `UNIQUE (email)`
    pub fn constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraints.push(constraint.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn create_statement(&self) -> String {
        let body: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.definition))
            .chain(self.constraints.iter().cloned())
            .collect();
        format!("CREATE TABLE IF NOT EXISTS {} ({})", self.name, body.join(", "))
    }

    pub fn drop_statement(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", self.name)
    }
}

/// Registry of declared tables
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ModelMetadata {
    tables: Vec<Table>,
}

impl ModelMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a table; a table with the same name is replaced in place.
    pub fn add_table(&mut self, table: Table) {
        match self.tables.iter_mut().find(|t| t.name == table.name) {
            Some(existing) => *existing = table,
            None => self.tables.push(table),
        }
    }

    pub fn with_table(mut self, table: Table) -> Self {
        self.add_table(table);
        self
    }

    /// Declare the table of a model type.
    pub fn register<M: Model>(mut self) -> Self {
        self.add_table(M::table());
        self
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn create_statements(&self) -> Vec<String> {
        self.tables.iter().map(Table::create_statement).collect()
    }

    pub fn drop_statements(&self) -> Vec<String> {
        self.tables.iter().rev().map(Table::drop_statement).collect()
    }
}

impl fmt::Debug for ModelMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.tables.iter().map(|t| t.name.as_str()))
            .finish()
    }
}
