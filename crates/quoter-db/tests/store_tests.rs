// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use quoter_app::{CalculationId, ItemInput};
use quoter_db::{NewCalculation, Store, validate_db_path};
use quoter_testkit::{QuoteFaker, fixture_date, sample_table, temp_db_path};

fn new_calculation() -> Result<NewCalculation> {
    Ok(NewCalculation {
        customer: "Muster AG".to_owned(),
        description: "Office renovation".to_owned(),
        date: fixture_date()?,
        user_margin: 1.15,
    })
}

#[test]
fn validate_db_path_rejects_uri_forms() {
    assert!(validate_db_path("file:test.db").is_err());
    assert!(validate_db_path("https://example.com/db.sqlite").is_err());
    assert!(validate_db_path("db.sqlite?mode=ro").is_err());
    assert!(validate_db_path("").is_err());
    assert!(validate_db_path("/tmp/quoter.db").is_ok());
}

#[test]
fn bootstrap_creates_schema_and_seed_categories() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;

    let categories = store.list_categories()?;
    assert_eq!(categories.len(), 5);
    let codes: Vec<&str> = categories.iter().map(|c| c.code.as_str()).collect();
    assert_eq!(codes, vec!["100", "200", "300", "400", "900"]);

    store.bootstrap()?;
    assert_eq!(store.list_categories()?.len(), 5);
    Ok(())
}

#[test]
fn bootstrap_rejects_schema_missing_required_column() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;

    store.raw_connection().execute_batch(
        "
        DROP TABLE calculation_items;
        CREATE TABLE calculation_items (
          id INTEGER PRIMARY KEY,
          calculation_id INTEGER NOT NULL,
          category_id INTEGER NOT NULL,
          description TEXT NOT NULL,
          price REAL NOT NULL,
          quantity REAL NOT NULL,
          total REAL NOT NULL
        );
        ",
    )?;

    let error = store
        .bootstrap()
        .expect_err("schema without position column should be rejected");
    let message = error.to_string();
    assert!(message.contains("calculation_items"));
    assert!(message.contains("position"));
    Ok(())
}

#[test]
fn create_category_rejects_duplicates() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;

    let id = store.create_category("500", "Transport")?;
    assert!(store.list_categories()?.iter().any(|c| c.id == id));

    let error = store
        .create_category("500", "Again")
        .expect_err("duplicate code should be rejected");
    assert!(error.to_string().contains("already exists"));
    assert!(store.create_category("  ", "Blank").is_err());
    Ok(())
}

#[test]
fn calculations_round_trip() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;

    let id = store.create_calculation(&new_calculation()?)?;
    let calculation = store.get_calculation(id)?;
    assert_eq!(calculation.customer, "Muster AG");
    assert_eq!(calculation.date, fixture_date()?);
    assert_eq!(calculation.user_margin, 1.15);
    assert_eq!(store.list_calculations()?.len(), 1);

    let error = store
        .get_calculation(CalculationId::new(999))
        .expect_err("missing calculation should fail");
    assert!(error.to_string().contains("not found"));
    Ok(())
}

#[test]
fn save_and_load_table_preserves_group_and_row_order() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;
    let categories = store.list_categories()?;
    let id = store.create_calculation(&new_calculation()?)?;

    let mut table = sample_table(&categories)?;
    let screws = table.item_ids()[1];
    table.move_up(screws)?;
    store.save_table(id, &table)?;

    let loaded = store.load_table(id)?;
    assert_eq!(loaded.groups().len(), table.groups().len());
    for (saved, restored) in table.groups().iter().zip(loaded.groups()) {
        assert_eq!(saved.category_id, restored.category_id);
        let saved_rows: Vec<ItemInput> = saved.items.iter().map(|item| item.input()).collect();
        let restored_rows: Vec<ItemInput> =
            restored.items.iter().map(|item| item.input()).collect();
        assert_eq!(saved_rows, restored_rows);
    }
    assert_eq!(loaded.groups()[0].items[0].description, "Screws");
    assert_eq!(loaded.grand_total(), table.grand_total());
    loaded.verify()?;
    Ok(())
}

#[test]
fn save_table_replaces_previous_rows() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;
    let categories = store.list_categories()?;
    let id = store.create_calculation(&new_calculation()?)?;

    let mut table = sample_table(&categories)?;
    store.save_table(id, &table)?;

    let first = table.item_ids()[0];
    table.remove_item(first)?;
    store.save_table(id, &table)?;

    assert_eq!(store.load_table(id)?.item_count(), 3);
    Ok(())
}

#[test]
fn save_table_requires_existing_calculation() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;
    let table = sample_table(&store.list_categories()?)?;

    let error = store
        .save_table(CalculationId::new(42), &table)
        .expect_err("saving into a missing calculation should fail");
    assert!(error.to_string().contains("not found"));
    Ok(())
}

#[test]
fn file_backed_store_persists_generated_rows() -> Result<()> {
    let (_dir, path) = temp_db_path()?;
    let mut faker = QuoteFaker::new(11);
    let id;
    let expected_total;
    {
        let store = Store::open(&path)?;
        store.bootstrap()?;
        let categories = store.list_categories()?;
        id = store.create_calculation(&new_calculation()?)?;

        let mut table = quoter_app::TableModel::new();
        for _ in 0..25 {
            let category = faker
                .category(&categories)
                .expect("seeded categories exist");
            table.append_row(category, faker.item_input())?;
        }
        expected_total = table.grand_total();
        store.save_table(id, &table)?;
    }

    let reopened = Store::open(&path)?;
    reopened.bootstrap()?;
    let table = reopened.load_table(id)?;
    assert_eq!(table.item_count(), 25);
    assert_eq!(table.grand_total(), expected_total);
    Ok(())
}
