// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::ids::*;

/// Rounds a monetary amount to two decimals, half away from zero.
pub fn round_amount(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub code: String,
    pub description: String,
}

impl Category {
    pub fn label(&self) -> String {
        if self.description.trim().is_empty() {
            self.code.clone()
        } else {
            format!("{} - {}", self.code, self.description)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub description: String,
    pub unit: String,
    pub price: f64,
    pub quantity: f64,
}

impl Item {
    pub fn total(&self) -> f64 {
        round_amount(self.price * self.quantity)
    }

    pub fn input(&self) -> ItemInput {
        ItemInput {
            description: self.description.clone(),
            unit: self.unit.clone(),
            price: self.price,
            quantity: self.quantity,
        }
    }

    pub(crate) fn apply(&mut self, input: ItemInput) {
        self.description = input.description;
        self.unit = input.unit;
        self.price = input.price;
        self.quantity = input.quantity;
    }
}

/// Editable values of one item line, as read from or written to a row.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemInput {
    pub description: String,
    pub unit: String,
    pub price: f64,
    pub quantity: f64,
}

impl ItemInput {
    pub fn total(&self) -> f64 {
        round_amount(self.price * self.quantity)
    }

    pub fn validate(&self) -> Result<()> {
        if self.description.trim().is_empty() {
            bail!("item description is required -- enter a description and retry");
        }
        if !self.price.is_finite() {
            bail!("item price must be a number");
        }
        if !self.quantity.is_finite() {
            bail!("item quantity must be a number");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub category_id: CategoryId,
    pub code: String,
    pub items: Vec<Item>,
}

impl Group {
    pub fn new(category: &Category) -> Self {
        Self {
            category_id: category.id,
            code: category.code.clone(),
            items: Vec::new(),
        }
    }

    pub fn total(&self) -> f64 {
        round_amount(self.items.iter().map(Item::total).sum())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn position_of(&self, item: ItemId) -> Option<usize> {
        self.items.iter().position(|candidate| candidate.id == item)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calculation {
    pub id: CalculationId,
    pub customer: String,
    pub description: String,
    pub date: Date,
    pub user_margin: f64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Calculation {
    pub fn title(&self) -> String {
        if self.description.trim().is_empty() {
            format!("#{} {}", self.id.get(), self.customer)
        } else {
            format!("#{} {} ({})", self.id.get(), self.customer, self.description)
        }
    }
}
