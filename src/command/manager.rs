// UndoStack - Transaction-based undo/redo history

use crate::command::factory::create_action_by_tag;
use crate::command::state::ProjectState;
use crate::command::trait_def::UndoAction;
use crate::project::error::ProjectError;
use crate::project::serialization::{SerializedData, keys};
use serde::{Deserialize, Serialize};

/// Caller-chosen id of a transaction (e.g. "dragging notes of track X")
pub type TransactionId = u64;

/// History limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UndoStackConfig {
    /// Total action size above which the oldest transactions get dropped
    pub max_units: usize,
    /// Never trim below this many transactions, whatever their size
    pub min_transactions: usize,
    /// How many recent transactions `serialize` keeps
    pub max_transactions_to_serialize: usize,
}

impl Default for UndoStackConfig {
    fn default() -> Self {
        Self {
            max_units: 30000,
            min_transactions: 30,
            max_transactions_to_serialize: 10,
        }
    }
}

/// A checkpoint-bounded group of actions, undone and redone as one step
struct Transaction {
    id: Option<TransactionId>,
    actions: Vec<Box<dyn UndoAction>>,
}

impl Transaction {
    fn new(id: Option<TransactionId>) -> Self {
        Self {
            id,
            actions: Vec::new(),
        }
    }

    fn perform(&mut self, state: &mut ProjectState) -> bool {
        self.actions.iter_mut().all(|action| action.perform(state))
    }

    fn undo(&mut self, state: &mut ProjectState) -> bool {
        self.actions.iter_mut().rev().all(|action| action.undo(state))
    }

    fn total_size(&self) -> usize {
        self.actions.iter().map(|a| a.size_in_units()).sum()
    }

    fn description(&self) -> String {
        self.actions
            .iter()
            .map(|a| a.description())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn serialize(&self) -> SerializedData {
        SerializedData::new(keys::TRANSACTION)
            .with_children(self.actions.iter().map(|a| a.serialize()))
    }

    /// Actions with tags this version doesn't know are skipped
    fn deserialize(data: &SerializedData) -> Result<Self, ProjectError> {
        data.expect_tag(keys::TRANSACTION)?;

        let mut transaction = Self::new(None);
        for child in &data.children {
            match create_action_by_tag(child) {
                Ok(action) => transaction.actions.push(action),
                Err(ProjectError::UnknownAction(tag)) => {
                    log::warn!(target: "undo", "Skipping unknown undo action <{}>", tag);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(transaction)
    }
}

/// Linear undo history
///
/// Actions are recorded into the current transaction until `begin_new_transaction`
/// (a checkpoint) opens the next one. Within one transaction, an action may
/// coalesce with the one recorded right before it. Recording anything while
/// there are undone transactions discards them: there is no branching.
///
/// The stack is the only way actions reach the project, and every entry point
/// takes `&mut self`, so an action can never call back into the stack while it runs.
pub struct UndoStack {
    transactions: Vec<Transaction>,
    /// Transactions before this index are done, the rest are undone (the redo tail)
    next_index: usize,
    total_units: usize,
    has_new_empty_transaction: bool,
    new_transaction_id: Option<TransactionId>,
    config: UndoStackConfig,
}

impl UndoStack {
    pub fn new() -> Self {
        Self::with_config(UndoStackConfig::default())
    }

    pub fn with_config(config: UndoStackConfig) -> Self {
        Self {
            transactions: Vec::new(),
            next_index: 0,
            total_units: 0,
            has_new_empty_transaction: false,
            new_transaction_id: None,
            config,
        }
    }

    pub fn config(&self) -> &UndoStackConfig {
        &self.config
    }

    /// Perform an action and record it
    ///
    /// An action that fails to perform is dropped and nothing is recorded.
    pub fn perform(&mut self, mut action: Box<dyn UndoAction>, state: &mut ProjectState) -> bool {
        if !action.perform(state) {
            log::debug!(target: "undo", "Action '{}' failed, not recorded", action.description());
            return false;
        }

        let extends_current = self.next_index > 0 && !self.has_new_empty_transaction;

        if extends_current {
            let transaction = &mut self.transactions[self.next_index - 1];
            let coalesced = transaction
                .actions
                .last()
                .and_then(|last| last.create_coalesced_action(action.as_ref()));

            if let Some(coalesced) = coalesced {
                if let Some(last) = transaction.actions.pop() {
                    self.total_units -= last.size_in_units();
                }
                action = coalesced;
            }
        } else {
            // The redo tail goes before anything new is pushed
            self.clear_future_transactions();
            self.transactions
                .push(Transaction::new(self.new_transaction_id));
            self.next_index += 1;
        }

        self.total_units += action.size_in_units();
        self.transactions[self.next_index - 1].actions.push(action);
        self.has_new_empty_transaction = false;

        self.trim_history();
        true
    }

    /// Perform an action and tag its transaction with an id
    pub fn perform_with_id(
        &mut self,
        action: Box<dyn UndoAction>,
        transaction_id: TransactionId,
        state: &mut ProjectState,
    ) -> bool {
        if self.perform(action, state) {
            self.set_current_transaction_id(transaction_id);
            true
        } else {
            false
        }
    }

    fn clear_future_transactions(&mut self) {
        while self.transactions.len() > self.next_index {
            if let Some(transaction) = self.transactions.pop() {
                self.total_units = self.total_units.saturating_sub(transaction.total_size());
            }
        }
    }

    fn trim_history(&mut self) {
        while self.next_index > 0
            && self.total_units > self.config.max_units
            && self.transactions.len() > self.config.min_transactions
        {
            let oldest = self.transactions.remove(0);
            self.total_units = self.total_units.saturating_sub(oldest.total_size());
            self.next_index -= 1;
        }
    }

    /// Close the current transaction; the next action starts a new one
    pub fn begin_new_transaction(&mut self, transaction_id: Option<TransactionId>) {
        self.has_new_empty_transaction = true;
        self.new_transaction_id = transaction_id;
    }

    /// Tag the open transaction (or the one about to start) with an id
    pub fn set_current_transaction_id(&mut self, transaction_id: TransactionId) {
        if self.has_new_empty_transaction {
            self.new_transaction_id = Some(transaction_id);
        } else if let Some(transaction) = self.current_transaction_mut() {
            transaction.id = Some(transaction_id);
        }
    }

    fn current_transaction(&self) -> Option<&Transaction> {
        self.next_index
            .checked_sub(1)
            .and_then(|index| self.transactions.get(index))
    }

    fn current_transaction_mut(&mut self) -> Option<&mut Transaction> {
        self.next_index
            .checked_sub(1)
            .and_then(|index| self.transactions.get_mut(index))
    }

    fn next_transaction(&self) -> Option<&Transaction> {
        self.transactions.get(self.next_index)
    }

    pub fn can_undo(&self) -> bool {
        self.current_transaction().is_some()
    }

    pub fn can_redo(&self) -> bool {
        self.next_transaction().is_some()
    }

    /// Undo the most recent transaction
    ///
    /// If one of its actions fails, the project no longer matches the history;
    /// the whole history is dropped then. Returns `false` if there was nothing to undo.
    pub fn undo(&mut self, state: &mut ProjectState) -> bool {
        let Some(index) = self.next_index.checked_sub(1) else {
            return false;
        };

        if self.transactions[index].undo(state) {
            self.next_index -= 1;
            log::debug!(target: "undo", "Undo, {} transactions left", self.next_index);
        } else {
            log::warn!(target: "undo", "Undo failed, clearing history");
            self.clear_undo_history();
        }

        self.begin_new_transaction(None);
        true
    }

    /// Redo the most recently undone transaction
    pub fn redo(&mut self, state: &mut ProjectState) -> bool {
        if self.next_index >= self.transactions.len() {
            return false;
        }

        if self.transactions[self.next_index].perform(state) {
            self.next_index += 1;
            log::debug!(target: "undo", "Redo, {} transactions done", self.next_index);
        } else {
            log::warn!(target: "undo", "Redo failed, clearing history");
            self.clear_undo_history();
        }

        self.begin_new_transaction(None);
        true
    }

    /// Undo only if the open transaction has actions in it
    pub fn undo_current_transaction_only(&mut self, state: &mut ProjectState) -> bool {
        if self.has_new_empty_transaction {
            false
        } else {
            self.undo(state)
        }
    }

    pub fn undo_transaction_id(&self) -> Option<TransactionId> {
        self.current_transaction().and_then(|t| t.id)
    }

    pub fn redo_transaction_id(&self) -> Option<TransactionId> {
        self.next_transaction().and_then(|t| t.id)
    }

    pub fn undo_description(&self) -> Option<String> {
        self.current_transaction().map(Transaction::description)
    }

    pub fn redo_description(&self) -> Option<String> {
        self.next_transaction().map(Transaction::description)
    }

    pub fn actions_in_current_transaction_count(&self) -> usize {
        if self.has_new_empty_transaction {
            return 0;
        }
        self.current_transaction().map_or(0, |t| t.actions.len())
    }

    /// Fold every done transaction after the one tagged `transaction_id` into it
    ///
    /// Returns `false` if no such transaction exists or it is already the latest.
    pub fn merge_transactions_up_to(&mut self, transaction_id: TransactionId) -> bool {
        let Some(target) = self.transactions[..self.next_index]
            .iter()
            .rposition(|t| t.id == Some(transaction_id))
        else {
            log::warn!(target: "undo", "No transaction with id {} to merge into", transaction_id);
            return false;
        };

        if target == self.next_index - 1 {
            return false;
        }

        log::debug!(
            target: "undo",
            "Merging {} transactions",
            self.next_index - target
        );

        let merged: Vec<Transaction> = self.transactions.drain(target + 1..self.next_index).collect();
        self.next_index = target + 1;
        for transaction in merged {
            self.transactions[target].actions.extend(transaction.actions);
        }
        true
    }

    pub fn clear_undo_history(&mut self) {
        self.transactions.clear();
        self.total_units = 0;
        self.next_index = 0;
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn undo_count(&self) -> usize {
        self.next_index
    }

    pub fn redo_count(&self) -> usize {
        self.transactions.len() - self.next_index
    }

    //===------------------------------------------------------------------===//
    // Serialization
    //===------------------------------------------------------------------===//

    /// The most recent done transactions, oldest first; the redo tail is not kept
    pub fn serialize(&self) -> SerializedData {
        let start = self
            .next_index
            .saturating_sub(self.config.max_transactions_to_serialize);

        SerializedData::new(keys::UNDO_STACK)
            .with_children(self.transactions[start..self.next_index].iter().map(Transaction::serialize))
    }

    /// Replace the history; accepts the `undoStack` node itself or a parent holding it
    pub fn deserialize(&mut self, data: &SerializedData) -> Result<(), ProjectError> {
        let root = if data.has_tag(keys::UNDO_STACK) {
            data
        } else {
            match data.child_with_tag(keys::UNDO_STACK) {
                Some(root) => root,
                None => return Ok(()),
            }
        };

        let transactions = root
            .children_with_tag(keys::TRANSACTION)
            .map(Transaction::deserialize)
            .collect::<Result<Vec<_>, _>>()?;

        self.clear_undo_history();
        self.total_units = transactions.iter().map(Transaction::total_size).sum();
        self.next_index = transactions.len();
        self.transactions = transactions;
        self.begin_new_transaction(None);

        log::debug!(target: "undo", "Loaded {} transactions", self.next_index);
        Ok(())
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}
