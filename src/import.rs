use crate::errors::{ShelfError, ShelfResult};
use crate::grid::GridPositionAllocator;
use crate::models::{Category, ImportPayload, Shelf};
use std::collections::HashSet;

/// Decodes an import collaborator's JSON. Shape problems are validation failures, not
/// persistence ones.
pub fn parse_import(raw: &str) -> ShelfResult<ImportPayload> {
    serde_json::from_str(raw).map_err(|error| ShelfError::Validation(format!("malformed import: {}", error)))
}

/// Checks ids and display settings of an incoming payload against the shelf it will join.
/// The inbox is kept across an import, so its ids take part in the uniqueness check.
pub fn validate_import(payload: &ImportPayload, current: &Shelf, max_column_count: usize) -> ShelfResult<()> {
    if payload.column_count == 0 || payload.column_count > max_column_count {
        return Err(ShelfError::Validation(format!(
            "columnCount {} must be between 1 and {}",
            payload.column_count, max_column_count
        )));
    }

    for category in &payload.categories {
        require_id(&category.id, "category")?;
        check_name(&category.name, "category", &category.id)?;
        for link in &category.links {
            require_id(&link.id, "link")?;
        }
        for sub in &category.subcategories {
            require_id(&sub.id, "subcategory")?;
            check_name(&sub.name, "subcategory", &sub.id)?;
            for link in &sub.links {
                require_id(&link.id, "link")?;
            }
        }
    }
    for fav in &payload.favourites {
        require_id(&fav.id, "favourite")?;
    }

    let mut seen: HashSet<&str> = current.inbox.iter().map(|item| item.id.as_str()).collect();
    for id in payload_ids(&payload.categories).chain(payload.favourites.iter().map(|fav| fav.id.as_str())) {
        if !seen.insert(id) {
            return Err(ShelfError::Validation(format!("duplicate id {} in import", id)));
        }
    }
    Ok(())
}

fn require_id(id: &str, what: &str) -> ShelfResult<()> {
    if id.trim().is_empty() {
        return Err(ShelfError::Validation(format!("imported {} without an id", what)));
    }
    Ok(())
}

fn check_name(name: &str, what: &str, id: &str) -> ShelfResult<()> {
    if name.trim().is_empty() {
        return Err(ShelfError::Validation(format!("imported {} {} has an empty name", what, id)));
    }
    Ok(())
}

fn payload_ids(categories: &[Category]) -> impl Iterator<Item = &str> {
    categories.iter().flat_map(|category| {
        std::iter::once(category.id.as_str())
            .chain(category.links.iter().map(|link| link.id.as_str()))
            .chain(category.subcategories.iter().flat_map(|sub| {
                std::iter::once(sub.id.as_str()).chain(sub.links.iter().map(|link| link.id.as_str()))
            }))
    })
}

/// Brings imported slots in line with the grid: out-of-range columns fold into the last
/// column and every column is renumbered from 0 in its existing order.
pub fn normalize_grid(categories: &mut [Category], column_count: usize, allocator: &GridPositionAllocator) -> usize {
    let folded = allocator.fold_columns(categories, column_count);
    let renumbered = allocator.compact(categories);
    folded + renumbered
}
