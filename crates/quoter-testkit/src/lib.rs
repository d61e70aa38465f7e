// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use quoter_app::{Category, CategoryId, ItemInput, TableModel};
use std::path::PathBuf;
use time::{Date, Month};

const CATEGORIES: [(&str, &str); 4] = [
    ("100", "Material"),
    ("200", "Labour"),
    ("300", "Subcontractors"),
    ("400", "Equipment"),
];

const MATERIALS: [&str; 10] = [
    "Drywall panels",
    "Screws",
    "Paint",
    "Primer",
    "Insulation",
    "Cable",
    "Conduit",
    "Tiles",
    "Grout",
    "Sealant",
];

const TASKS: [&str; 8] = [
    "Installation",
    "Painting",
    "Wiring",
    "Demolition",
    "Cleanup",
    "Tiling",
    "Inspection",
    "Planning",
];

const UNITS: [&str; 6] = ["pcs", "m", "m2", "h", "l", "day"];

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }
}

/// Seeded generator of plausible calculation rows.
#[derive(Debug, Clone)]
pub struct QuoteFaker {
    rng: DeterministicRng,
}

impl QuoteFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
        }
    }

    pub fn int_n(&mut self, n: usize) -> usize {
        self.rng.int_n(n)
    }

    pub fn category<'a>(&mut self, categories: &'a [Category]) -> Option<&'a Category> {
        if categories.is_empty() {
            return None;
        }
        categories.get(self.rng.int_n(categories.len()))
    }

    pub fn item_input(&mut self) -> ItemInput {
        let labour = self.rng.int_n(3) == 0;
        let description = if labour {
            self.pick(&TASKS)
        } else {
            self.pick(&MATERIALS)
        };
        let unit = if labour { "h" } else { self.pick(&UNITS) };
        // Quarter steps keep totals exact in binary floating point.
        let price = (self.rng.int_n(40_000) as f64) / 4.0 + 0.25;
        let quantity = (self.rng.int_n(200) as f64) / 4.0 + 0.25;
        ItemInput {
            description: description.to_owned(),
            unit: unit.to_owned(),
            price,
            quantity,
        }
    }

    fn pick<'a>(&mut self, values: &[&'a str]) -> &'a str {
        values[self.rng.int_n(values.len())]
    }
}

/// Categories with ids 1.. in code order.
pub fn categories() -> Vec<Category> {
    CATEGORIES
        .iter()
        .enumerate()
        .map(|(index, (code, description))| Category {
            id: CategoryId::new(index as i64 + 1),
            code: (*code).to_owned(),
            description: (*description).to_owned(),
        })
        .collect()
}

pub fn item(description: &str, unit: &str, price: f64, quantity: f64) -> ItemInput {
    ItemInput {
        description: description.to_owned(),
        unit: unit.to_owned(),
        price,
        quantity,
    }
}

/// Two material rows, one labour row, one equipment row.
pub fn sample_table(categories: &[Category]) -> Result<TableModel> {
    let mut table = TableModel::new();
    let rows = [
        (0, item("Drywall panels", "m2", 12.5, 48.0)),
        (0, item("Screws", "box", 6.2, 4.0)),
        (1, item("Installation", "h", 65.0, 24.0)),
        (3, item("Scaffolding", "day", 45.0, 3.0)),
    ];
    for (category_index, input) in rows {
        let category = categories
            .get(category_index)
            .with_context(|| format!("fixture category {category_index} missing"))?;
        table.append_row(category, input)?;
    }
    Ok(table)
}

pub fn temp_db_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let db_path = dir.path().join("quoter.db");
    Ok((dir, db_path))
}

pub fn fixture_date() -> Result<Date> {
    Date::from_calendar_date(2026, Month::February, 19).context("build fixture date")
}

#[cfg(test)]
mod tests {
    use super::{QuoteFaker, categories, sample_table};
    use anyhow::Result;

    #[test]
    fn faker_is_deterministic_per_seed() {
        let mut left = QuoteFaker::new(42);
        let mut right = QuoteFaker::new(42);
        for _ in 0..10 {
            assert_eq!(left.item_input(), right.item_input());
        }
    }

    #[test]
    fn faker_inputs_validate() {
        let mut faker = QuoteFaker::new(7);
        for _ in 0..50 {
            let input = faker.item_input();
            assert!(input.validate().is_ok(), "{input:?}");
            assert!(input.price > 0.0);
            assert!(input.quantity > 0.0);
        }
    }

    #[test]
    fn sample_table_has_three_groups() -> Result<()> {
        let categories = categories();
        let table = sample_table(&categories)?;
        assert_eq!(table.groups().len(), 3);
        assert_eq!(table.item_count(), 4);
        table.verify()?;
        Ok(())
    }
}
