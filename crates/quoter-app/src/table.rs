// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow, bail};

use crate::model::round_amount;
use crate::{
    Category, CategoryId, FieldPath, Group, Item, ItemId, ItemInput, ReorderEngine, Rename,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    Item {
        item: ItemId,
        category_id: CategoryId,
    },
    Group {
        category_id: CategoryId,
        code: String,
    },
}

/// Structural side effects of one table mutation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Change {
    pub renames: Vec<Rename>,
    pub removed: Option<Removal>,
}

impl Change {
    pub fn is_noop(&self) -> bool {
        self.renames.is_empty() && self.removed.is_none()
    }

    fn renamed(renames: Vec<Rename>) -> Self {
        Self {
            renames,
            removed: None,
        }
    }
}

/// Groups of item rows ordered by category code, with the form-field
/// bindings of every row kept contiguous after each mutation.
#[derive(Debug, Clone, Default)]
pub struct TableModel {
    groups: Vec<Group>,
    engine: ReorderEngine,
    next_item_id: i64,
}

impl TableModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn group(&self, category_id: CategoryId) -> Option<&Group> {
        self.groups
            .iter()
            .find(|group| group.category_id == category_id)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn item_count(&self) -> usize {
        self.groups.iter().map(Group::len).sum()
    }

    pub fn item(&self, item: ItemId) -> Option<&Item> {
        let (group, index) = self.locate(item)?;
        self.groups[group].items.get(index)
    }

    /// Group position and item position of a row in display order.
    pub fn locate(&self, item: ItemId) -> Option<(usize, usize)> {
        self.groups
            .iter()
            .enumerate()
            .find_map(|(group_index, group)| {
                group
                    .position_of(item)
                    .map(|item_index| (group_index, item_index))
            })
    }

    pub fn category_of(&self, item: ItemId) -> Option<CategoryId> {
        self.locate(item)
            .map(|(group, _)| self.groups[group].category_id)
    }

    pub fn path_of(&self, item: ItemId) -> Option<FieldPath> {
        self.engine.path_of(item)
    }

    /// Item ids in display order, across all groups.
    pub fn item_ids(&self) -> Vec<ItemId> {
        self.groups
            .iter()
            .flat_map(|group| group.items.iter().map(|item| item.id))
            .collect()
    }

    pub fn get_row_item(&self, item: ItemId) -> Option<ItemInput> {
        self.item(item).map(Item::input)
    }

    pub fn group_total(&self, category_id: CategoryId) -> f64 {
        self.group(category_id).map_or(0.0, Group::total)
    }

    pub fn grand_total(&self) -> f64 {
        round_amount(self.groups.iter().map(Group::total).sum())
    }

    pub fn append_row(
        &mut self,
        category: &Category,
        input: ItemInput,
    ) -> Result<(ItemId, Change)> {
        input.validate()?;
        let group_index = self.append_group(category);
        let id = self.allocate_id();
        self.groups[group_index].items.push(Item {
            id,
            description: input.description,
            unit: input.unit,
            price: input.price,
            quantity: input.quantity,
        });
        Ok((id, Change::renamed(self.renumber())))
    }

    /// Writes new values into a row; a different category moves the row to the
    /// end of that category's group.
    pub fn update_row(
        &mut self,
        item: ItemId,
        category: &Category,
        input: ItemInput,
    ) -> Result<Change> {
        input.validate()?;
        let (group_index, item_index) = self.require(item)?;

        if self.groups[group_index].category_id == category.id {
            self.groups[group_index].items[item_index].apply(input);
            return Ok(Change::default());
        }

        let (mut row, removed) = self.detach(group_index, item_index);
        row.apply(input);
        let target = self.append_group(category);
        self.groups[target].items.push(row);
        Ok(Change {
            renames: self.renumber(),
            removed,
        })
    }

    /// Removes a row; removing the last row of a group removes the group.
    pub fn remove_item(&mut self, item: ItemId) -> Result<Change> {
        let (group_index, item_index) = self.require(item)?;
        let category_id = self.groups[group_index].category_id;
        let (_, removed) = self.detach(group_index, item_index);
        Ok(Change {
            renames: self.renumber(),
            removed: removed.or(Some(Removal::Item { item, category_id })),
        })
    }

    pub fn remove_group(&mut self, category_id: CategoryId) -> Result<Change> {
        let index = self
            .groups
            .iter()
            .position(|group| group.category_id == category_id)
            .ok_or_else(|| missing_group(category_id))?;
        let group = self.groups.remove(index);
        Ok(Change {
            renames: self.renumber(),
            removed: Some(Removal::Group {
                category_id,
                code: group.code,
            }),
        })
    }

    /// Stable sort of a group's rows by description.
    pub fn sort_group_items(&mut self, category_id: CategoryId) -> Result<Change> {
        let group = self
            .groups
            .iter_mut()
            .find(|group| group.category_id == category_id)
            .ok_or_else(|| missing_group(category_id))?;
        group
            .items
            .sort_by_cached_key(|item| item.description.to_lowercase());
        Ok(Change::renamed(self.renumber()))
    }

    pub fn sort_all_groups(&mut self) -> Change {
        for group in &mut self.groups {
            group
                .items
                .sort_by_cached_key(|item| item.description.to_lowercase());
        }
        Change::renamed(self.renumber())
    }

    /// Moves a row one place up within its group; a no-op for the first row.
    pub fn move_up(&mut self, item: ItemId) -> Result<Change> {
        let (group_index, item_index) = self.require(item)?;
        if item_index == 0 {
            return Ok(Change::default());
        }
        Ok(self.swap_rows(group_index, item_index - 1, item_index))
    }

    /// Moves a row one place down within its group; a no-op for the last row.
    pub fn move_down(&mut self, item: ItemId) -> Result<Change> {
        let (group_index, item_index) = self.require(item)?;
        if item_index + 1 >= self.groups[group_index].len() {
            return Ok(Change::default());
        }
        Ok(self.swap_rows(group_index, item_index, item_index + 1))
    }

    /// Drag-and-drop: places a row at `position` inside the group of
    /// `category`, possibly a different group than its current one.
    pub fn move_item(
        &mut self,
        item: ItemId,
        category: &Category,
        position: usize,
    ) -> Result<Change> {
        let (group_index, item_index) = self.require(item)?;
        if self.groups[group_index].category_id == category.id {
            let items = &mut self.groups[group_index].items;
            let row = items.remove(item_index);
            let position = position.min(items.len());
            items.insert(position, row);
            return Ok(Change::renamed(self.renumber()));
        }

        let (row, removed) = self.detach(group_index, item_index);
        let target = self.append_group(category);
        let items = &mut self.groups[target].items;
        let position = position.min(items.len());
        items.insert(position, row);
        Ok(Change {
            renames: self.renumber(),
            removed,
        })
    }

    /// Inserts a copy of a row directly below it.
    pub fn duplicate_row(&mut self, item: ItemId) -> Result<(ItemId, Change)> {
        let (group_index, item_index) = self.require(item)?;
        let id = self.allocate_id();
        let mut copy = self.groups[group_index].items[item_index].clone();
        copy.id = id;
        self.groups[group_index].items.insert(item_index + 1, copy);
        Ok((id, Change::renamed(self.renumber())))
    }

    pub fn serialize_form(&self) -> Vec<(String, String)> {
        self.engine.serialize_form(&self.groups)
    }

    pub fn verify(&self) -> Result<()> {
        if let Some(group) = self.groups.iter().find(|group| group.items.is_empty()) {
            bail!("group {} has no rows", group.code);
        }
        self.engine.verify_contiguous(&self.groups)
    }

    fn require(&self, item: ItemId) -> Result<(usize, usize)> {
        match self.locate(item) {
            Some(found) => Ok(found),
            None => bail!(
                "item {} is not in this calculation -- select an existing row and retry",
                item.get()
            ),
        }
    }

    /// Locates the group for `category`, creating it at its sorted-by-code
    /// position when absent. Callers must push a row into it before
    /// renumbering.
    fn append_group(&mut self, category: &Category) -> usize {
        if let Some(index) = self
            .groups
            .iter()
            .position(|group| group.category_id == category.id)
        {
            return index;
        }

        let index = self
            .groups
            .partition_point(|group| group.code.as_str() <= category.code.as_str());
        self.groups.insert(index, Group::new(category));
        index
    }

    fn allocate_id(&mut self) -> ItemId {
        self.next_item_id += 1;
        ItemId::new(self.next_item_id)
    }

    fn detach(&mut self, group_index: usize, item_index: usize) -> (Item, Option<Removal>) {
        let row = self.groups[group_index].items.remove(item_index);
        if !self.groups[group_index].is_empty() {
            return (row, None);
        }
        let group = self.groups.remove(group_index);
        (
            row,
            Some(Removal::Group {
                category_id: group.category_id,
                code: group.code,
            }),
        )
    }

    fn swap_rows(&mut self, group_index: usize, upper: usize, lower: usize) -> Change {
        let items = &mut self.groups[group_index].items;
        items.swap(upper, lower);
        let renames = self.engine.swap(items[upper].id, items[lower].id);
        debug_assert!(self.verify().is_ok());
        Change::renamed(renames)
    }

    fn renumber(&mut self) -> Vec<Rename> {
        let renames = self.engine.renumber(&self.groups);
        debug_assert!(self.verify().is_ok());
        renames
    }
}

fn missing_group(category_id: CategoryId) -> anyhow::Error {
    anyhow!(
        "category {} has no rows in this calculation",
        category_id.get()
    )
}

#[cfg(test)]
mod tests {
    use super::{Removal, TableModel};
    use crate::{Category, CategoryId, FieldPath, Group, ItemId, ItemInput};
    use anyhow::Result;

    fn category(id: i64, code: &str) -> Category {
        Category {
            id: CategoryId::new(id),
            code: code.to_owned(),
            description: String::new(),
        }
    }

    fn input(description: &str, price: f64, quantity: f64) -> ItemInput {
        ItemInput {
            description: description.to_owned(),
            unit: "pcs".to_owned(),
            price,
            quantity,
        }
    }

    fn descriptions(table: &TableModel, category_id: CategoryId) -> Vec<String> {
        table
            .group(category_id)
            .map(|group| {
                group
                    .items
                    .iter()
                    .map(|item| item.description.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn groups_are_inserted_in_code_order() -> Result<()> {
        let mut table = TableModel::new();
        table.append_row(&category(1, "C"), input("c", 1.0, 1.0))?;
        table.append_row(&category(2, "A"), input("a", 1.0, 1.0))?;
        table.append_row(&category(3, "B"), input("b", 1.0, 1.0))?;

        let codes: Vec<&str> = table.groups().iter().map(|g| g.code.as_str()).collect();
        assert_eq!(codes, vec!["A", "B", "C"]);
        table.verify()
    }

    #[test]
    fn groups_exist_only_while_they_hold_rows() -> Result<()> {
        let mut table = TableModel::new();
        let cat = category(1, "A");
        let (only, _) = table.append_row(&cat, input("only", 1.0, 1.0))?;
        let (again, _) = table.append_row(&cat, input("again", 1.0, 1.0))?;
        assert_eq!(table.groups().len(), 1);

        table.remove_item(only)?;
        table.remove_item(again)?;
        assert!(table.groups().is_empty());
        assert!(table.serialize_form().is_empty());
        table.verify()?;

        table.groups.push(Group::new(&cat));
        let error = table.verify().expect_err("empty group should fail verification");
        assert!(error.to_string().contains("group A has no rows"));
        Ok(())
    }

    #[test]
    fn new_group_in_front_renumbers_later_groups() -> Result<()> {
        let mut table = TableModel::new();
        let (late, _) = table.append_row(&category(1, "B"), input("late", 1.0, 1.0))?;
        let (_, change) = table.append_row(&category(2, "A"), input("early", 1.0, 1.0))?;

        assert_eq!(table.path_of(late), Some(FieldPath::new(1, 0)));
        assert!(change.renames.iter().any(|rename| rename.item == late));
        Ok(())
    }

    #[test]
    fn row_total_is_rounded_product() -> Result<()> {
        let mut table = TableModel::new();
        let (id, _) = table.append_row(&category(1, "A"), input("Labour", 10.0, 3.0))?;
        let item = table.item(id).expect("row exists");
        assert_eq!(item.total(), 30.0);
        assert_eq!(table.grand_total(), 30.0);
        Ok(())
    }

    #[test]
    fn update_row_with_extracted_values_is_idempotent() -> Result<()> {
        let mut table = TableModel::new();
        let cat = category(1, "A");
        let (id, _) = table.append_row(&cat, input("Tiles", 12.345, 7.5))?;
        let before = table.item(id).expect("row exists").total();

        let extracted = table.get_row_item(id).expect("row exists");
        let change = table.update_row(id, &cat, extracted.clone())?;

        assert!(change.is_noop());
        assert_eq!(table.item(id).expect("row exists").total(), before);
        assert_eq!(table.get_row_item(id), Some(extracted));
        Ok(())
    }

    #[test]
    fn update_row_to_other_category_moves_and_cleans_up() -> Result<()> {
        let mut table = TableModel::new();
        let source = category(1, "A");
        let target = category(2, "B");
        let (id, _) = table.append_row(&source, input("Pipe", 4.0, 2.0))?;
        table.append_row(&target, input("Valve", 9.0, 1.0))?;

        let change = table.update_row(id, &target, input("Pipe", 4.0, 2.0))?;
        assert_eq!(
            change.removed,
            Some(Removal::Group {
                category_id: source.id,
                code: "A".to_owned(),
            })
        );
        assert_eq!(descriptions(&table, target.id), vec!["Valve", "Pipe"]);
        assert_eq!(table.path_of(id), Some(FieldPath::new(0, 1)));
        table.verify()
    }

    #[test]
    fn removing_only_item_removes_group() -> Result<()> {
        let mut table = TableModel::new();
        let cat = category(1, "A");
        let (id, _) = table.append_row(&cat, input("Solo", 1.0, 1.0))?;

        let change = table.remove_item(id)?;
        assert_eq!(
            change.removed,
            Some(Removal::Group {
                category_id: cat.id,
                code: "A".to_owned(),
            })
        );
        assert!(table.is_empty());
        assert!(table.group(cat.id).is_none());
        Ok(())
    }

    #[test]
    fn remove_group_shifts_later_groups_down() -> Result<()> {
        let mut table = TableModel::new();
        let first = category(1, "A");
        let second = category(2, "B");
        table.append_row(&first, input("Bolts", 1.0, 1.0))?;
        table.append_row(&first, input("Nuts", 1.0, 1.0))?;
        let (moved, _) = table.append_row(&second, input("Labour", 50.0, 2.0))?;

        let change = table.remove_group(first.id)?;
        assert_eq!(
            change.removed,
            Some(Removal::Group {
                category_id: first.id,
                code: "A".to_owned(),
            })
        );
        assert_eq!(change.renames.len(), 1);
        assert_eq!(change.renames[0].item, moved);
        assert_eq!(table.path_of(moved), Some(FieldPath::new(0, 0)));
        assert_eq!(table.item_count(), 1);
        assert_eq!(table.grand_total(), 100.0);
        table.verify()?;

        assert!(table.remove_group(first.id).is_err());
        Ok(())
    }

    #[test]
    fn removing_item_renumbers_followers() -> Result<()> {
        let mut table = TableModel::new();
        let cat = category(1, "A");
        let (first, _) = table.append_row(&cat, input("one", 1.0, 1.0))?;
        let (second, _) = table.append_row(&cat, input("two", 1.0, 1.0))?;
        let (third, _) = table.append_row(&cat, input("three", 1.0, 1.0))?;

        let change = table.remove_item(first)?;
        assert_eq!(
            change.removed,
            Some(Removal::Item {
                item: first,
                category_id: cat.id,
            })
        );
        assert_eq!(table.path_of(second), Some(FieldPath::new(0, 0)));
        assert_eq!(table.path_of(third), Some(FieldPath::new(0, 1)));
        assert_eq!(table.path_of(first), None);
        table.verify()
    }

    #[test]
    fn moving_first_row_up_is_noop() -> Result<()> {
        let mut table = TableModel::new();
        let cat = category(1, "A");
        let (first, _) = table.append_row(&cat, input("one", 1.0, 1.0))?;
        let (last, _) = table.append_row(&cat, input("two", 1.0, 1.0))?;

        assert!(table.move_up(first)?.is_noop());
        assert!(table.move_down(last)?.is_noop());
        assert_eq!(descriptions(&table, cat.id), vec!["one", "two"]);
        Ok(())
    }

    #[test]
    fn move_down_swaps_bindings() -> Result<()> {
        let mut table = TableModel::new();
        let cat = category(1, "A");
        let (first, _) = table.append_row(&cat, input("one", 1.0, 1.0))?;
        let (second, _) = table.append_row(&cat, input("two", 1.0, 1.0))?;

        let change = table.move_down(first)?;
        assert_eq!(change.renames.len(), 2);
        assert_eq!(table.path_of(first), Some(FieldPath::new(0, 1)));
        assert_eq!(table.path_of(second), Some(FieldPath::new(0, 0)));
        table.verify()
    }

    #[test]
    fn sort_group_items_is_stable_and_minimal() -> Result<()> {
        let mut table = TableModel::new();
        let cat = category(1, "A");
        let (alpha, _) = table.append_row(&cat, input("alpha", 1.0, 1.0))?;
        let (zulu, _) = table.append_row(&cat, input("zulu", 1.0, 1.0))?;
        let (beta, _) = table.append_row(&cat, input("beta", 1.0, 1.0))?;
        let (beta_again, _) = table.append_row(&cat, input("beta", 2.0, 1.0))?;

        let change = table.sort_group_items(cat.id)?;
        assert_eq!(
            descriptions(&table, cat.id),
            vec!["alpha", "beta", "beta", "zulu"]
        );
        assert_eq!(table.locate(beta), Some((0, 1)));
        assert_eq!(table.locate(beta_again), Some((0, 2)));
        assert!(change.renames.iter().all(|rename| rename.item != alpha));
        assert_eq!(change.renames.len(), 3);
        assert_eq!(table.path_of(zulu), Some(FieldPath::new(0, 3)));
        Ok(())
    }

    #[test]
    fn sorts_ignore_description_case() -> Result<()> {
        let mut table = TableModel::new();
        let first = category(1, "A");
        let second = category(2, "B");
        for description in ["Zinc", "anchor", "Bolt"] {
            table.append_row(&first, input(description, 1.0, 1.0))?;
            table.append_row(&second, input(description, 1.0, 1.0))?;
        }

        table.sort_group_items(first.id)?;
        assert_eq!(descriptions(&table, first.id), vec!["anchor", "Bolt", "Zinc"]);
        assert_eq!(descriptions(&table, second.id), vec!["Zinc", "anchor", "Bolt"]);

        table.sort_all_groups();
        assert_eq!(descriptions(&table, second.id), vec!["anchor", "Bolt", "Zinc"]);
        table.verify()
    }

    #[test]
    fn move_item_across_groups_renumbers_destination_and_drops_source() -> Result<()> {
        let mut table = TableModel::new();
        let source = category(1, "A");
        let target = category(2, "B");
        let (moved, _) = table.append_row(&source, input("moved", 1.0, 1.0))?;
        let (head, _) = table.append_row(&target, input("head", 1.0, 1.0))?;
        let (tail, _) = table.append_row(&target, input("tail", 1.0, 1.0))?;

        let change = table.move_item(moved, &target, 1)?;
        assert!(matches!(change.removed, Some(Removal::Group { .. })));
        assert_eq!(descriptions(&table, target.id), vec!["head", "moved", "tail"]);
        assert_eq!(table.path_of(head), Some(FieldPath::new(0, 0)));
        assert_eq!(table.path_of(moved), Some(FieldPath::new(0, 1)));
        assert_eq!(table.path_of(tail), Some(FieldPath::new(0, 2)));
        table.verify()
    }

    #[test]
    fn move_item_within_group_clamps_position() -> Result<()> {
        let mut table = TableModel::new();
        let cat = category(1, "A");
        let (first, _) = table.append_row(&cat, input("one", 1.0, 1.0))?;
        table.append_row(&cat, input("two", 1.0, 1.0))?;

        table.move_item(first, &cat, 99)?;
        assert_eq!(descriptions(&table, cat.id), vec!["two", "one"]);
        assert!(table.move_item(first, &cat, 1)?.is_noop());
        table.verify()
    }

    #[test]
    fn duplicate_row_inserts_copy_below() -> Result<()> {
        let mut table = TableModel::new();
        let cat = category(1, "A");
        let (first, _) = table.append_row(&cat, input("one", 2.0, 2.0))?;
        let (last, _) = table.append_row(&cat, input("two", 1.0, 1.0))?;

        let (copy, change) = table.duplicate_row(first)?;
        assert_ne!(copy, first);
        assert_eq!(table.locate(copy), Some((0, 1)));
        assert_eq!(table.item(copy).expect("copy exists").total(), 4.0);
        assert!(change.renames.iter().any(|rename| rename.item == last));
        table.verify()
    }

    #[test]
    fn unknown_item_is_an_actionable_error() {
        let mut table = TableModel::new();
        let error = table
            .remove_item(ItemId::new(42))
            .expect_err("unknown item should fail");
        assert!(error.to_string().contains("select an existing row"));
    }

    #[test]
    fn random_operation_sequences_keep_indices_contiguous() -> Result<()> {
        let categories = [category(1, "A"), category(2, "B"), category(3, "C")];
        let mut table = TableModel::new();
        let mut seed = 0x2545_f491_u64;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };

        for step in 0..500 {
            let ids = table.item_ids();
            let roll = next();
            let cat = &categories[(roll % 3) as usize];
            let pick = |n: u64| ids[(n % ids.len() as u64) as usize];
            match (roll / 3) % 7 {
                0 | 1 => {
                    table.append_row(cat, input(&format!("row {step}"), 1.5, 2.0))?;
                }
                2 if !ids.is_empty() => {
                    table.remove_item(pick(next()))?;
                }
                3 if !ids.is_empty() => {
                    table.move_up(pick(next()))?;
                }
                4 if !ids.is_empty() => {
                    table.move_down(pick(next()))?;
                }
                5 if !ids.is_empty() => {
                    let position = (next() % 5) as usize;
                    table.move_item(pick(next()), cat, position)?;
                }
                6 => {
                    table.sort_all_groups();
                }
                _ => {}
            }

            table.verify()?;
            assert!(table.groups().iter().all(|group| !group.is_empty()));
            for (group_index, group) in table.groups().iter().enumerate() {
                for (item_index, item) in group.items.iter().enumerate() {
                    assert_eq!(
                        table.path_of(item.id),
                        Some(FieldPath::new(group_index, item_index))
                    );
                }
            }
        }
        Ok(())
    }
}
