// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Keeps the array indices of posted form fields in step with display order.
//!
//! Every item is bound to a [`FieldPath`] (group index, item index). Field
//! names such as `calculation[groups][1][items][0][price]` are derived from
//! that binding, so after any structural change the bindings are rewritten
//! until each group's items read `0..N-1` again.

use anyhow::{Result, bail};
use std::collections::BTreeMap;

use crate::{Group, ItemId};

pub const GROUP_INDEX_PLACEHOLDER: &str = "__groupIndex__";
pub const ITEM_INDEX_PLACEHOLDER: &str = "__itemIndex__";

pub const GROUP_NAME_TEMPLATE: &str = "calculation[groups][__groupIndex__]";
pub const ITEM_NAME_TEMPLATE: &str = "calculation[groups][__groupIndex__][items][__itemIndex__]";
pub const ITEM_ID_TEMPLATE: &str = "calculation_groups___groupIndex___items___itemIndex__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath {
    pub group: usize,
    pub item: usize,
}

impl FieldPath {
    pub const fn new(group: usize, item: usize) -> Self {
        Self { group, item }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemField {
    Description,
    Unit,
    Price,
    Quantity,
    Total,
}

impl ItemField {
    pub const ALL: [Self; 5] = [
        Self::Description,
        Self::Unit,
        Self::Price,
        Self::Quantity,
        Self::Total,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Description => "description",
            Self::Unit => "unit",
            Self::Price => "price",
            Self::Quantity => "quantity",
            Self::Total => "total",
        }
    }
}

/// A binding change; `from` is `None` when the item had no binding yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rename {
    pub item: ItemId,
    pub from: Option<FieldPath>,
    pub to: FieldPath,
}

pub fn expand_template(template: &str, path: FieldPath) -> String {
    template
        .replace(GROUP_INDEX_PLACEHOLDER, &path.group.to_string())
        .replace(ITEM_INDEX_PLACEHOLDER, &path.item.to_string())
}

pub fn field_name(path: FieldPath, field: ItemField) -> String {
    format!(
        "{}[{}]",
        expand_template(ITEM_NAME_TEMPLATE, path),
        field.as_str()
    )
}

pub fn field_id(path: FieldPath, field: ItemField) -> String {
    format!(
        "{}_{}",
        expand_template(ITEM_ID_TEMPLATE, path),
        field.as_str()
    )
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReorderEngine {
    bindings: BTreeMap<ItemId, FieldPath>,
}

impl ReorderEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path_of(&self, item: ItemId) -> Option<FieldPath> {
        self.bindings.get(&item).copied()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Exchanges the bindings of two rows that traded places.
    pub fn swap(&mut self, first: ItemId, second: ItemId) -> Vec<Rename> {
        if first == second {
            return Vec::new();
        }
        let (Some(first_path), Some(second_path)) = (self.path_of(first), self.path_of(second))
        else {
            return Vec::new();
        };

        self.bindings.insert(first, second_path);
        self.bindings.insert(second, first_path);
        vec![
            Rename {
                item: first,
                from: Some(first_path),
                to: second_path,
            },
            Rename {
                item: second,
                from: Some(second_path),
                to: first_path,
            },
        ]
    }

    /// Rebinds every item whose path differs from its display position and
    /// drops bindings of items no longer displayed. Rows already in place are
    /// left alone.
    pub fn renumber(&mut self, groups: &[Group]) -> Vec<Rename> {
        let mut renames = Vec::new();
        let mut live = BTreeMap::new();

        for (group_index, group) in groups.iter().enumerate() {
            for (item_index, item) in group.items.iter().enumerate() {
                let wanted = FieldPath::new(group_index, item_index);
                let current = self.bindings.get(&item.id).copied();
                if current != Some(wanted) {
                    renames.push(Rename {
                        item: item.id,
                        from: current,
                        to: wanted,
                    });
                }
                live.insert(item.id, wanted);
            }
        }

        self.bindings = live;
        renames
    }

    pub fn verify_contiguous(&self, groups: &[Group]) -> Result<()> {
        let mut seen = 0usize;
        for (group_index, group) in groups.iter().enumerate() {
            for (item_index, item) in group.items.iter().enumerate() {
                let wanted = FieldPath::new(group_index, item_index);
                match self.path_of(item.id) {
                    Some(path) if path == wanted => {}
                    Some(path) => bail!(
                        "group {} has item bound to [{}][{}] at display position [{}][{}]",
                        group.code,
                        path.group,
                        path.item,
                        group_index,
                        item_index
                    ),
                    None => bail!(
                        "group {} has an unbound item at position {}",
                        group.code,
                        item_index
                    ),
                }
                seen += 1;
            }
        }
        if seen != self.bindings.len() {
            bail!(
                "{} stale field bindings remain after renumbering",
                self.bindings.len() - seen
            );
        }
        Ok(())
    }

    /// Builds the `(name, value)` pairs posted for the whole table.
    pub fn serialize_form(&self, groups: &[Group]) -> Vec<(String, String)> {
        let mut fields = Vec::new();
        for (group_index, group) in groups.iter().enumerate() {
            let group_name = expand_template(GROUP_NAME_TEMPLATE, FieldPath::new(group_index, 0));
            fields.push((
                format!("{group_name}[category]"),
                group.category_id.get().to_string(),
            ));

            for (item_index, item) in group.items.iter().enumerate() {
                let path = self
                    .path_of(item.id)
                    .unwrap_or(FieldPath::new(group_index, item_index));
                for field in ItemField::ALL {
                    let value = match field {
                        ItemField::Description => item.description.clone(),
                        ItemField::Unit => item.unit.clone(),
                        ItemField::Price => item.price.to_string(),
                        ItemField::Quantity => item.quantity.to_string(),
                        ItemField::Total => format!("{:.2}", item.total()),
                    };
                    fields.push((field_name(path, field), value));
                }
            }
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::{
        FieldPath, ITEM_ID_TEMPLATE, ItemField, ReorderEngine, Rename, expand_template, field_id,
        field_name,
    };
    use crate::{CategoryId, Group, Item, ItemId};

    fn group(code: &str, ids: &[i64]) -> Group {
        Group {
            category_id: CategoryId::new(ids.first().copied().unwrap_or(0) + 100),
            code: code.to_owned(),
            items: ids
                .iter()
                .map(|id| Item {
                    id: ItemId::new(*id),
                    description: format!("item {id}"),
                    unit: "pcs".to_owned(),
                    price: 2.0,
                    quantity: *id as f64,
                })
                .collect(),
        }
    }

    #[test]
    fn templates_expand_both_placeholders() {
        let path = FieldPath::new(2, 7);
        assert_eq!(
            expand_template(ITEM_ID_TEMPLATE, path),
            "calculation_groups_2_items_7"
        );
        assert_eq!(
            field_name(path, ItemField::Price),
            "calculation[groups][2][items][7][price]"
        );
        assert_eq!(
            field_id(path, ItemField::Quantity),
            "calculation_groups_2_items_7_quantity"
        );
    }

    #[test]
    fn renumber_binds_new_items_and_skips_unchanged() {
        let mut engine = ReorderEngine::new();
        let groups = vec![group("A", &[1, 2]), group("B", &[3])];

        let first = engine.renumber(&groups);
        assert_eq!(first.len(), 3);
        assert!(first.iter().all(|rename| rename.from.is_none()));

        let second = engine.renumber(&groups);
        assert!(second.is_empty());
        assert!(engine.verify_contiguous(&groups).is_ok());
    }

    #[test]
    fn renumber_only_touches_shifted_rows() {
        let mut engine = ReorderEngine::new();
        let mut groups = vec![group("A", &[1, 2, 3, 4])];
        engine.renumber(&groups);

        groups[0].items.remove(1);
        let renames = engine.renumber(&groups);
        assert_eq!(
            renames,
            vec![
                Rename {
                    item: ItemId::new(3),
                    from: Some(FieldPath::new(0, 2)),
                    to: FieldPath::new(0, 1),
                },
                Rename {
                    item: ItemId::new(4),
                    from: Some(FieldPath::new(0, 3)),
                    to: FieldPath::new(0, 2),
                },
            ]
        );
        assert_eq!(engine.len(), 3);
    }

    #[test]
    fn swap_exchanges_bindings() {
        let mut engine = ReorderEngine::new();
        let mut groups = vec![group("A", &[1, 2])];
        engine.renumber(&groups);

        groups[0].items.swap(0, 1);
        let renames = engine.swap(ItemId::new(1), ItemId::new(2));
        assert_eq!(renames.len(), 2);
        assert_eq!(engine.path_of(ItemId::new(2)), Some(FieldPath::new(0, 0)));
        assert!(engine.verify_contiguous(&groups).is_ok());
    }

    #[test]
    fn verify_reports_out_of_step_bindings() {
        let mut engine = ReorderEngine::new();
        let mut groups = vec![group("A", &[1, 2])];
        engine.renumber(&groups);

        groups[0].items.swap(0, 1);
        let error = engine
            .verify_contiguous(&groups)
            .expect_err("swapped rows without rebinding should fail");
        assert!(error.to_string().contains("group A"));
    }

    #[test]
    fn serialize_form_emits_group_and_item_fields() {
        let mut engine = ReorderEngine::new();
        let groups = vec![group("A", &[1]), group("B", &[2])];
        engine.renumber(&groups);

        let fields = engine.serialize_form(&groups);
        assert_eq!(fields.len(), 2 + 2 * 5);
        assert_eq!(fields[0].0, "calculation[groups][0][category]");
        assert_eq!(fields[0].1, "101");
        assert!(fields.contains(&(
            "calculation[groups][1][items][0][total]".to_owned(),
            "4.00".to_owned()
        )));
    }
}
