//! Ordered row operations produced by the cascade engines.
//!
//! The engines never execute SQL; they compute the minimal set of row
//! operations and their order, and hand the plan to the caller's SQL
//! executor. Plan order is part of the contract: it is chosen so that
//! referential-integrity constraints hold at every intermediate step.

use relmap_mapping::{ColumnValues, UpdatePayload};

/// One row operation.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Insert a row.
    Insert {
        /// Table name.
        table: String,
        /// Column values to insert.
        values: ColumnValues,
    },
    /// Update rows matching the payload's WHERE entries.
    Update {
        /// Table name.
        table: String,
        /// SET and WHERE entries.
        values: UpdatePayload,
    },
    /// Delete rows matching the predicate (ANDed column equalities).
    Delete {
        /// Table name.
        table: String,
        /// Column equalities selecting the rows to delete.
        predicate: ColumnValues,
    },
}

impl WriteOp {
    /// The table this operation touches.
    pub fn table(&self) -> &str {
        match self {
            WriteOp::Insert { table, .. } => table,
            WriteOp::Update { table, .. } => table,
            WriteOp::Delete { table, .. } => table,
        }
    }

    /// Whether this is an insert.
    pub fn is_insert(&self) -> bool {
        matches!(self, WriteOp::Insert { .. })
    }

    /// Whether this is an update.
    pub fn is_update(&self) -> bool {
        matches!(self, WriteOp::Update { .. })
    }

    /// Whether this is a delete.
    pub fn is_delete(&self) -> bool {
        matches!(self, WriteOp::Delete { .. })
    }
}

/// An ordered list of row operations.
#[derive(Debug, Clone, Default)]
pub struct WritePlan {
    ops: Vec<WriteOp>,
}

impl WritePlan {
    /// An empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one operation.
    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    /// Append every operation of another plan, in order.
    pub fn extend(&mut self, other: WritePlan) {
        self.ops.extend(other.ops);
    }

    /// The operations, in execution order.
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Consume the plan into its operations.
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the plan is empty.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of inserts.
    pub fn insert_count(&self) -> usize {
        self.ops.iter().filter(|op| op.is_insert()).count()
    }

    /// Number of updates.
    pub fn update_count(&self) -> usize {
        self.ops.iter().filter(|op| op.is_update()).count()
    }

    /// Number of deletes.
    pub fn delete_count(&self) -> usize {
        self.ops.iter().filter(|op| op.is_delete()).count()
    }
}
