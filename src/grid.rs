use crate::errors::{ShelfError, ShelfResult};
use crate::models::{Category, Slot};
use std::collections::{BTreeMap, HashSet};

/// Keeps category grid slots consistent.
#[derive(Debug, Clone, Copy)]
pub struct GridPositionAllocator {
    search_limit: usize,
}

impl GridPositionAllocator {
    pub fn new(search_limit: usize) -> Self {
        Self {
            search_limit: search_limit.max(1),
        }
    }

    pub fn search_limit(&self) -> usize {
        self.search_limit
    }

    /// First free slot scanning columns left to right, positions top down.
    ///
    /// Falls back to `(column_count - 1, 0)` when every probed slot is taken; that slot may
    /// already be occupied and callers must check before placing a category there.
    pub fn find_first_available_slot(&self, categories: &[Category], column_count: usize) -> Slot {
        let occupied: HashSet<Slot> = categories.iter().map(Category::slot).collect();
        for column in 0..column_count {
            for position in 0..self.search_limit {
                let slot = Slot::new(column, position);
                if !occupied.contains(&slot) {
                    return slot;
                }
            }
        }

        let fallback = Slot::new(column_count.saturating_sub(1), 0);
        tracing::warn!(
            column = fallback.column,
            search_limit = self.search_limit,
            "no free grid slot within search limit, falling back"
        );
        fallback
    }

    /// Moves `category_id` to the target slot, opening room there and closing the gap it
    /// left behind. Returns the slot the category actually landed in.
    pub fn move_category(
        &self,
        categories: &mut [Category],
        column_count: usize,
        category_id: &str,
        target_column: usize,
        target_position: usize,
    ) -> ShelfResult<Slot> {
        if target_column >= column_count {
            return Err(ShelfError::InvalidReference(format!(
                "column {} out of range (0..{})",
                target_column, column_count
            )));
        }
        let moved_index = categories
            .iter()
            .position(|category| category.id == category_id)
            .ok_or_else(|| ShelfError::unknown("category", category_id))?;

        let old = categories[moved_index].slot();
        if Slot::new(target_column, target_position) == old {
            return Ok(old);
        }

        // One past the last other category once the gap is closed; holes are left alone.
        let append_at = categories
            .iter()
            .enumerate()
            .filter(|(index, category)| *index != moved_index && category.column == target_column)
            .map(|(_, category)| {
                if category.column == old.column && category.position > old.position {
                    category.position
                } else {
                    category.position + 1
                }
            })
            .max()
            .unwrap_or(0);
        let target = Slot::new(target_column, target_position.min(append_at));

        if target == old {
            return Ok(old);
        }

        categories[moved_index].column = target.column;
        categories[moved_index].position = target.position;

        for (index, category) in categories.iter_mut().enumerate() {
            if index == moved_index {
                continue;
            }
            // Close the gap first so the open pass sees post-removal positions.
            if category.column == old.column && category.position > old.position {
                category.position -= 1;
            }
            if category.column == target.column && category.position >= target.position {
                category.position += 1;
            }
        }

        tracing::debug!(
            category_id = %category_id,
            from_column = old.column,
            from_position = old.position,
            to_column = target.column,
            to_position = target.position,
            "moved category"
        );
        Ok(target)
    }

    /// Renumbers each column contiguously from 0, keeping relative order.
    /// Returns how many categories changed slot.
    pub fn compact(&self, categories: &mut [Category]) -> usize {
        let mut by_column: BTreeMap<usize, Vec<(usize, usize)>> = BTreeMap::new();
        for (index, category) in categories.iter().enumerate() {
            by_column
                .entry(category.column)
                .or_default()
                .push((category.position, index));
        }

        let mut changed = 0usize;
        for entries in by_column.values_mut() {
            entries.sort();
            for (position, (_, index)) in entries.iter().enumerate() {
                if categories[*index].position != position {
                    categories[*index].position = position;
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Moves every category in a column at or beyond `column_count` to the end of the last
    /// remaining column, in (column, position) order.
    pub fn fold_columns(&self, categories: &mut [Category], column_count: usize) -> usize {
        let last = column_count.saturating_sub(1);
        let mut overflow: Vec<usize> = categories
            .iter()
            .enumerate()
            .filter(|(_, category)| category.column > last)
            .map(|(index, _)| index)
            .collect();
        if overflow.is_empty() {
            return 0;
        }
        overflow.sort_by_key(|index| categories[*index].slot());

        let mut next = categories
            .iter()
            .filter(|category| category.column == last)
            .map(|category| category.position + 1)
            .max()
            .unwrap_or(0);
        for index in &overflow {
            categories[*index].column = last;
            categories[*index].position = next;
            next += 1;
        }
        overflow.len()
    }
}

impl Default for GridPositionAllocator {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_SLOT_SEARCH_LIMIT)
    }
}

/// First pair of categories sharing a slot, if any.
pub fn find_slot_collision(categories: &[Category]) -> Option<(&Category, &Category)> {
    let mut seen: BTreeMap<Slot, &Category> = BTreeMap::new();
    for category in categories {
        if let Some(previous) = seen.insert(category.slot(), category) {
            return Some((previous, category));
        }
    }
    None
}

/// Whether each column's positions run 0..n without holes.
pub fn is_contiguous(categories: &[Category]) -> bool {
    let mut by_column: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for category in categories {
        by_column.entry(category.column).or_default().push(category.position);
    }
    by_column.values_mut().all(|positions| {
        positions.sort_unstable();
        positions.iter().enumerate().all(|(expected, actual)| expected == *actual)
    })
}
