// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow, bail};
use std::collections::BTreeMap;

use crate::{
    Category, CategoryId, Change, ItemId, ItemInput, NumberFormat, TableModel, ValidationError,
    round_amount,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogState {
    Closed,
    Adding { category: CategoryId },
    Editing { item: ItemId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DialogField {
    Category,
    Description,
    Unit,
    Price,
    Quantity,
}

impl DialogField {
    pub const ORDER: [Self; 5] = [
        Self::Category,
        Self::Description,
        Self::Unit,
        Self::Price,
        Self::Quantity,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Category => "Category",
            Self::Description => "Description",
            Self::Unit => "Unit",
            Self::Price => "Price",
            Self::Quantity => "Quantity",
        }
    }

    pub const fn accepts_text(self) -> bool {
        !matches!(self, Self::Category)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogForm {
    pub category: CategoryId,
    pub description: String,
    pub unit: String,
    pub price: String,
    pub quantity: String,
}

impl DialogForm {
    fn blank(category: CategoryId) -> Self {
        Self {
            category,
            description: String::new(),
            unit: String::new(),
            price: String::new(),
            quantity: String::new(),
        }
    }

    fn text_mut(&mut self, field: DialogField) -> Option<&mut String> {
        match field {
            DialogField::Category => None,
            DialogField::Description => Some(&mut self.description),
            DialogField::Unit => Some(&mut self.unit),
            DialogField::Price => Some(&mut self.price),
            DialogField::Quantity => Some(&mut self.quantity),
        }
    }

    pub fn text(&self, field: DialogField) -> &str {
        match field {
            DialogField::Category => "",
            DialogField::Description => &self.description,
            DialogField::Unit => &self.unit,
            DialogField::Price => &self.price,
            DialogField::Quantity => &self.quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DialogOutcome {
    /// Validation failed; the dialog stays open and nothing was committed.
    Blocked,
    Added { item: ItemId, change: Change },
    Updated { item: ItemId, change: Change },
    Deleted { item: ItemId, change: Change },
    Cancelled,
}

/// Modal add/edit form for a single item row.
#[derive(Debug, Clone)]
pub struct EditDialog {
    state: DialogState,
    form: DialogForm,
    focus: DialogField,
    errors: BTreeMap<DialogField, ValidationError>,
    format: NumberFormat,
}

impl EditDialog {
    pub fn new(format: NumberFormat) -> Self {
        Self {
            state: DialogState::Closed,
            form: DialogForm::blank(CategoryId::new(0)),
            focus: DialogField::Description,
            errors: BTreeMap::new(),
            format,
        }
    }

    pub fn state(&self) -> DialogState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state != DialogState::Closed
    }

    /// Row highlighted while it is being edited.
    pub fn highlighted(&self) -> Option<ItemId> {
        match self.state {
            DialogState::Editing { item } => Some(item),
            _ => None,
        }
    }

    pub fn form(&self) -> &DialogForm {
        &self.form
    }

    pub fn focus(&self) -> DialogField {
        self.focus
    }

    pub fn errors(&self) -> &BTreeMap<DialogField, ValidationError> {
        &self.errors
    }

    pub fn error_for(&self, field: DialogField) -> Option<ValidationError> {
        self.errors.get(&field).copied()
    }

    pub fn open_add(
        &mut self,
        categories: &[Category],
        preselect: Option<CategoryId>,
    ) -> Result<()> {
        let category = preselect
            .filter(|wanted| categories.iter().any(|category| category.id == *wanted))
            .or_else(|| categories.first().map(|category| category.id))
            .ok_or_else(|| anyhow!("no categories defined -- add a category and retry"))?;

        self.form = DialogForm::blank(category);
        self.form.quantity = self.format.format_input(1.0);
        self.state = DialogState::Adding { category };
        self.focus = DialogField::Description;
        self.errors.clear();
        Ok(())
    }

    pub fn open_edit(&mut self, table: &TableModel, item: ItemId) -> Result<()> {
        let input = table
            .get_row_item(item)
            .ok_or_else(|| anyhow!("item {} is not in this calculation", item.get()))?;
        let category = table
            .category_of(item)
            .ok_or_else(|| anyhow!("item {} has no group", item.get()))?;

        self.form = DialogForm {
            category,
            description: input.description,
            unit: input.unit,
            price: self.format.format_input(input.price),
            quantity: self.format.format_input(input.quantity),
        };
        self.state = DialogState::Editing { item };
        self.focus = DialogField::Description;
        self.errors.clear();
        Ok(())
    }

    pub fn next_field(&mut self) {
        self.shift_focus(1);
    }

    pub fn prev_field(&mut self) {
        self.shift_focus(-1);
    }

    pub fn set_focus(&mut self, field: DialogField) {
        self.focus = field;
    }

    /// Replaces a text field and re-validates it, as on every keystroke.
    pub fn set_field(&mut self, field: DialogField, value: &str) {
        if let Some(text) = self.form.text_mut(field) {
            value.clone_into(text);
            self.revalidate(field);
        }
    }

    pub fn input_char(&mut self, ch: char) {
        let field = self.focus;
        if let Some(text) = self.form.text_mut(field) {
            text.push(ch);
            self.revalidate(field);
        }
    }

    pub fn backspace(&mut self) {
        let field = self.focus;
        if let Some(text) = self.form.text_mut(field) {
            text.pop();
            self.revalidate(field);
        }
    }

    pub fn cycle_category(&mut self, categories: &[Category], delta: isize) {
        if categories.is_empty() {
            return;
        }
        let current = categories
            .iter()
            .position(|category| category.id == self.form.category)
            .unwrap_or(0) as isize;
        let next = (current + delta).rem_euclid(categories.len() as isize) as usize;
        self.form.category = categories[next].id;
    }

    /// Read-only total, present only while price and quantity both parse.
    pub fn total(&self) -> Option<f64> {
        let price = self.format.parse_amount(&self.form.price).ok()?;
        let quantity = self.format.parse_amount(&self.form.quantity).ok()?;
        Some(round_amount(price * quantity))
    }

    pub fn total_text(&self) -> String {
        self.total()
            .map(|total| self.format.format_amount(total))
            .unwrap_or_default()
    }

    pub fn validate(&mut self) -> bool {
        for field in DialogField::ORDER {
            self.revalidate(field);
        }
        self.errors.is_empty()
    }

    /// Commits the form through the table model. Invalid input keeps the
    /// dialog open and returns [`DialogOutcome::Blocked`].
    pub fn submit(
        &mut self,
        table: &mut TableModel,
        categories: &[Category],
    ) -> Result<DialogOutcome> {
        if self.state == DialogState::Closed {
            bail!("no item dialog is open");
        }
        if !self.validate() {
            if let Some(field) = self.errors.keys().next() {
                self.focus = *field;
            }
            return Ok(DialogOutcome::Blocked);
        }

        let category = categories
            .iter()
            .find(|category| category.id == self.form.category)
            .ok_or_else(|| {
                anyhow!("selected category no longer exists -- choose a category and retry")
            })?;
        let input = self.input()?;

        let outcome = match self.state {
            DialogState::Adding { .. } => {
                let (item, change) = table.append_row(category, input)?;
                DialogOutcome::Added { item, change }
            }
            DialogState::Editing { item } => {
                let change = table.update_row(item, category, input)?;
                DialogOutcome::Updated { item, change }
            }
            DialogState::Closed => return Ok(DialogOutcome::Cancelled),
        };
        self.close();
        Ok(outcome)
    }

    pub fn cancel(&mut self) -> DialogOutcome {
        self.close();
        DialogOutcome::Cancelled
    }

    /// Deletes the edited row; while adding, this just discards the form.
    pub fn delete(&mut self, table: &mut TableModel) -> Result<DialogOutcome> {
        let DialogState::Editing { item } = self.state else {
            return Ok(self.cancel());
        };
        let change = table.remove_item(item)?;
        self.close();
        Ok(DialogOutcome::Deleted { item, change })
    }

    fn input(&self) -> Result<ItemInput> {
        let price = self
            .format
            .parse_amount(&self.form.price)
            .map_err(|error| anyhow!("price: {error}"))?;
        let quantity = self
            .format
            .parse_amount(&self.form.quantity)
            .map_err(|error| anyhow!("quantity: {error}"))?;
        Ok(ItemInput {
            description: self.form.description.trim().to_owned(),
            unit: self.form.unit.trim().to_owned(),
            price,
            quantity,
        })
    }

    fn revalidate(&mut self, field: DialogField) {
        let result = match field {
            DialogField::Category | DialogField::Unit => Ok(()),
            DialogField::Description => {
                if self.form.description.trim().is_empty() {
                    Err(ValidationError::Required)
                } else {
                    Ok(())
                }
            }
            DialogField::Price | DialogField::Quantity => self
                .format
                .parse_amount(self.form.text(field))
                .map(|_| ()),
        };
        match result {
            Ok(()) => {
                self.errors.remove(&field);
            }
            Err(error) => {
                self.errors.insert(field, error);
            }
        }
    }

    fn shift_focus(&mut self, delta: isize) {
        let order = DialogField::ORDER;
        let current = order
            .iter()
            .position(|field| *field == self.focus)
            .unwrap_or(0) as isize;
        let next = (current + delta).rem_euclid(order.len() as isize) as usize;
        self.focus = order[next];
    }

    fn close(&mut self) {
        self.state = DialogState::Closed;
        self.errors.clear();
    }
}
