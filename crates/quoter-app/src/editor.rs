// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow};

use crate::{
    Category, CategoryId, Change, DialogOutcome, DialogState, EditDialog, ItemId, NumberFormat,
    SyncApplied, SyncOutcome, SyncState, SyncTicket, TableModel,
};

const READ_ONLY_STATUS: &str = "form disabled -- dismiss the notification and retry";

#[derive(Debug, Clone, PartialEq)]
pub enum EditorCommand {
    SelectNext,
    SelectPrev,
    OpenAdd,
    OpenEdit,
    DialogInput(char),
    DialogBackspace,
    DialogNextField,
    DialogPrevField,
    DialogCycleCategory(isize),
    SubmitDialog,
    CancelDialog,
    DeleteFromDialog,
    DeleteSelected,
    MoveUp,
    MoveDown,
    SortGroup,
    SortAll,
    Duplicate,
    PickUp,
    DropHere,
    RequestAdjust,
    DismissNotification,
    SetStatus(String),
    ClearStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    SelectionChanged(Option<ItemId>),
    DialogOpened(DialogState),
    DialogChanged,
    DialogBlocked,
    DialogClosed,
    TableChanged(Change),
    PickedUp(ItemId),
    SyncRequested { adjust: bool },
    TotalsUpdated,
    FormDisabled(String),
    NotificationDismissed,
    StatusUpdated(String),
    StatusCleared,
}

/// One open calculation: its rows, the item dialog, and the totals sync
/// bookkeeping, driven by [`EditorCommand`]s.
#[derive(Debug, Clone)]
pub struct Editor {
    categories: Vec<Category>,
    table: TableModel,
    dialog: EditDialog,
    sync: SyncState,
    format: NumberFormat,
    selected: Option<ItemId>,
    picked: Option<ItemId>,
    dirty: bool,
    status_line: Option<String>,
}

impl Editor {
    pub fn new(categories: Vec<Category>, table: TableModel, format: NumberFormat) -> Self {
        let selected = table.item_ids().first().copied();
        Self {
            categories,
            table,
            dialog: EditDialog::new(format),
            sync: SyncState::new(),
            format,
            selected,
            picked: None,
            dirty: false,
            status_line: None,
        }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn table(&self) -> &TableModel {
        &self.table
    }

    pub fn dialog(&self) -> &EditDialog {
        &self.dialog
    }

    pub fn sync(&self) -> &SyncState {
        &self.sync
    }

    pub fn format(&self) -> NumberFormat {
        self.format
    }

    pub fn selected(&self) -> Option<ItemId> {
        self.selected
    }

    pub fn picked(&self) -> Option<ItemId> {
        self.picked
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    pub fn status_line(&self) -> Option<&str> {
        self.status_line.as_deref()
    }

    pub fn is_read_only(&self) -> bool {
        self.sync.is_read_only()
    }

    pub fn category(&self, id: CategoryId) -> Option<&Category> {
        self.categories.iter().find(|category| category.id == id)
    }

    pub fn dispatch(&mut self, command: EditorCommand) -> Vec<EditorEvent> {
        match command {
            EditorCommand::SelectNext => self.move_selection(1),
            EditorCommand::SelectPrev => self.move_selection(-1),
            EditorCommand::DismissNotification => {
                if self.sync.dismiss() {
                    vec![EditorEvent::NotificationDismissed]
                } else {
                    Vec::new()
                }
            }
            EditorCommand::SetStatus(status) => vec![self.set_status(status)],
            EditorCommand::ClearStatus => {
                self.status_line = None;
                vec![EditorEvent::StatusCleared]
            }
            EditorCommand::CancelDialog => {
                if !self.dialog.is_open() {
                    return Vec::new();
                }
                self.dialog.cancel();
                vec![EditorEvent::DialogClosed]
            }
            _ if self.sync.is_read_only() => vec![self.set_status(READ_ONLY_STATUS)],
            command => match self.mutate(command) {
                Ok(events) => events,
                Err(error) => vec![self.set_status(format!("{error:#}"))],
            },
        }
    }

    /// Registers a new totals request for the current rows.
    pub fn begin_sync(&mut self) -> SyncTicket {
        self.sync.begin()
    }

    pub fn cancel_sync(&mut self) -> Option<u64> {
        self.sync.cancel()
    }

    pub fn finish_sync(&mut self, request_id: u64, outcome: SyncOutcome) -> Vec<EditorEvent> {
        match self.sync.finish(request_id, outcome) {
            SyncApplied::Updated => vec![EditorEvent::TotalsUpdated],
            SyncApplied::Failed => {
                let message = self.sync.notification().unwrap_or_default().to_owned();
                vec![EditorEvent::FormDisabled(message)]
            }
            SyncApplied::Ignored => Vec::new(),
        }
    }

    fn mutate(&mut self, command: EditorCommand) -> Result<Vec<EditorEvent>> {
        match command {
            EditorCommand::OpenAdd => {
                let preselect = self
                    .selected
                    .and_then(|item| self.table.category_of(item));
                self.dialog.open_add(&self.categories, preselect)?;
                Ok(vec![EditorEvent::DialogOpened(self.dialog.state())])
            }
            EditorCommand::OpenEdit => {
                let item = self.require_selection()?;
                self.dialog.open_edit(&self.table, item)?;
                Ok(vec![EditorEvent::DialogOpened(self.dialog.state())])
            }
            EditorCommand::DialogInput(ch) => Ok(self.in_dialog(|dialog| dialog.input_char(ch))),
            EditorCommand::DialogBackspace => Ok(self.in_dialog(EditDialog::backspace)),
            EditorCommand::DialogNextField => Ok(self.in_dialog(EditDialog::next_field)),
            EditorCommand::DialogPrevField => Ok(self.in_dialog(EditDialog::prev_field)),
            EditorCommand::DialogCycleCategory(delta) => {
                let categories = &self.categories;
                let dialog = &mut self.dialog;
                if !dialog.is_open() {
                    return Ok(Vec::new());
                }
                dialog.cycle_category(categories, delta);
                Ok(vec![EditorEvent::DialogChanged])
            }
            EditorCommand::SubmitDialog => {
                let outcome = self.dialog.submit(&mut self.table, &self.categories)?;
                Ok(self.dialog_outcome(outcome))
            }
            EditorCommand::DeleteFromDialog => {
                let index = self.selection_index();
                let outcome = self.dialog.delete(&mut self.table)?;
                if matches!(outcome, DialogOutcome::Deleted { .. }) {
                    self.reselect_near(index);
                }
                Ok(self.dialog_outcome(outcome))
            }
            EditorCommand::DeleteSelected => {
                let item = self.require_selection()?;
                let index = self.selection_index();
                let change = self.table.remove_item(item)?;
                if self.picked == Some(item) {
                    self.picked = None;
                }
                self.reselect_near(index);
                Ok(self.table_changed(change, "row deleted"))
            }
            EditorCommand::MoveUp | EditorCommand::MoveDown => {
                let item = self.require_selection()?;
                let change = if command == EditorCommand::MoveUp {
                    self.table.move_up(item)?
                } else {
                    self.table.move_down(item)?
                };
                if change.is_noop() {
                    return Ok(vec![self.set_status("row is already at the edge of its group")]);
                }
                Ok(self.table_changed(change, "row moved"))
            }
            EditorCommand::SortGroup => {
                let item = self.require_selection()?;
                let category = self
                    .table
                    .category_of(item)
                    .ok_or_else(|| anyhow!("item {} has no group", item.get()))?;
                let change = self.table.sort_group_items(category)?;
                Ok(self.table_changed(change, "group sorted"))
            }
            EditorCommand::SortAll => {
                let change = self.table.sort_all_groups();
                Ok(self.table_changed(change, "all groups sorted"))
            }
            EditorCommand::Duplicate => {
                let item = self.require_selection()?;
                let (copy, change) = self.table.duplicate_row(item)?;
                self.selected = Some(copy);
                let mut events = vec![EditorEvent::SelectionChanged(self.selected)];
                events.extend(self.table_changed(change, "row duplicated"));
                Ok(events)
            }
            EditorCommand::PickUp => {
                let item = self.require_selection()?;
                self.picked = Some(item);
                Ok(vec![
                    EditorEvent::PickedUp(item),
                    self.set_status("row picked up -- select a target and drop"),
                ])
            }
            EditorCommand::DropHere => self.drop_picked(),
            EditorCommand::RequestAdjust => Ok(vec![EditorEvent::SyncRequested { adjust: true }]),
            EditorCommand::SelectNext
            | EditorCommand::SelectPrev
            | EditorCommand::CancelDialog
            | EditorCommand::DismissNotification
            | EditorCommand::SetStatus(_)
            | EditorCommand::ClearStatus => Ok(Vec::new()),
        }
    }

    fn drop_picked(&mut self) -> Result<Vec<EditorEvent>> {
        let Some(picked) = self.picked.take() else {
            return Ok(vec![self.set_status("nothing picked up -- pick up a row first")]);
        };
        let target = self.require_selection()?;
        if target == picked {
            return Ok(vec![self.set_status("drop cancelled")]);
        }

        let (group_index, mut position) = self
            .table
            .locate(target)
            .ok_or_else(|| anyhow!("item {} is not in this calculation", target.get()))?;
        // Within one group the picked row is removed first, shifting the target up.
        if let Some((picked_group, picked_index)) = self.table.locate(picked)
            && picked_group == group_index
            && picked_index < position
        {
            position -= 1;
        }
        let category_id = self.table.groups()[group_index].category_id;
        let category = self
            .category(category_id)
            .cloned()
            .ok_or_else(|| anyhow!("category {} is not defined", category_id.get()))?;

        let change = self.table.move_item(picked, &category, position)?;
        self.selected = Some(picked);
        let mut events = vec![EditorEvent::SelectionChanged(self.selected)];
        events.extend(self.table_changed(change, "row dropped"));
        Ok(events)
    }

    fn dialog_outcome(&mut self, outcome: DialogOutcome) -> Vec<EditorEvent> {
        match outcome {
            DialogOutcome::Blocked => vec![
                EditorEvent::DialogBlocked,
                self.set_status("fix the highlighted fields and retry"),
            ],
            DialogOutcome::Cancelled => vec![EditorEvent::DialogClosed],
            DialogOutcome::Added { item, change } => {
                self.selected = Some(item);
                let mut events = vec![
                    EditorEvent::DialogClosed,
                    EditorEvent::SelectionChanged(self.selected),
                ];
                events.extend(self.table_changed(change, "row added"));
                events
            }
            DialogOutcome::Updated { change, .. } => {
                let mut events = vec![EditorEvent::DialogClosed];
                events.extend(self.table_changed(change, "row updated"));
                events
            }
            DialogOutcome::Deleted { item, change } => {
                if self.picked == Some(item) {
                    self.picked = None;
                }
                let mut events = vec![
                    EditorEvent::DialogClosed,
                    EditorEvent::SelectionChanged(self.selected),
                ];
                events.extend(self.table_changed(change, "row deleted"));
                events
            }
        }
    }

    fn table_changed(&mut self, change: Change, status: &str) -> Vec<EditorEvent> {
        self.dirty = true;
        vec![
            EditorEvent::TableChanged(change),
            EditorEvent::SyncRequested { adjust: false },
            self.set_status(status),
        ]
    }

    fn in_dialog(&mut self, apply: impl FnOnce(&mut EditDialog)) -> Vec<EditorEvent> {
        if !self.dialog.is_open() {
            return Vec::new();
        }
        apply(&mut self.dialog);
        vec![EditorEvent::DialogChanged]
    }

    fn move_selection(&mut self, delta: isize) -> Vec<EditorEvent> {
        if self.dialog.is_open() {
            return Vec::new();
        }
        let ids = self.table.item_ids();
        if ids.is_empty() {
            self.selected = None;
            return vec![EditorEvent::SelectionChanged(None)];
        }
        let next = match self.selection_index() {
            Some(index) => (index as isize + delta).clamp(0, ids.len() as isize - 1) as usize,
            None => 0,
        };
        self.selected = Some(ids[next]);
        vec![EditorEvent::SelectionChanged(self.selected)]
    }

    fn selection_index(&self) -> Option<usize> {
        let selected = self.selected?;
        self.table.item_ids().iter().position(|id| *id == selected)
    }

    fn reselect_near(&mut self, index: Option<usize>) {
        let ids = self.table.item_ids();
        self.selected = match index {
            Some(index) if !ids.is_empty() => Some(ids[index.min(ids.len() - 1)]),
            _ => ids.first().copied(),
        };
    }

    fn require_selection(&self) -> Result<ItemId> {
        self.selected
            .filter(|item| self.table.item(*item).is_some())
            .ok_or_else(|| anyhow!("no row selected -- select a row and retry"))
    }

    fn set_status(&mut self, status: impl Into<String>) -> EditorEvent {
        let status = status.into();
        self.status_line = Some(status.clone());
        EditorEvent::StatusUpdated(status)
    }
}
