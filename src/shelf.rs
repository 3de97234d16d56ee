use crate::config::{merge_json, ShelfConfig};
use crate::errors::{ShelfError, ShelfResult};
use crate::grid::{find_slot_collision, GridPositionAllocator};
use crate::import::{normalize_grid, parse_import, validate_import};
use crate::models::{
    Category, DisplaySettings, ExternalChange, Favourite, ImportPayload, InboxItem, ItemKind, Link, LinkPatch,
    MoveCategoryRequest, MoveRequest, Shelf, Slot, Subcategory,
};
use crate::mover::{MoveOutcome, OrderedCollectionMover};
use crate::persistence::{SaveStatus, WriteBehind};
use crate::store::{decode_shelf, encode_shelf, ShelfStore, StoreEvent, SHELF_KEYS};
use crate::urls::{default_name_for_url, normalize_url};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Aggregate root over a [`Shelf`]. Every mutation is applied to a staged copy and only
/// replaces the live state once it has passed validation and the invariant check, so a
/// rejected call leaves nothing behind.
pub struct ShelfModel {
    shelf: Shelf,
    config: ShelfConfig,
    allocator: GridPositionAllocator,
    mover: OrderedCollectionMover,
    saver: Option<WriteBehind>,
}

impl ShelfModel {
    pub fn new(config: ShelfConfig) -> ShelfResult<Self> {
        let shelf = Shelf::with_column_count(config.default_column_count);
        Self::from_shelf(shelf, config)
    }

    pub fn from_shelf(shelf: Shelf, config: ShelfConfig) -> ShelfResult<Self> {
        config.validate()?;
        check_invariants(&shelf)?;
        Ok(Self {
            allocator: GridPositionAllocator::new(config.slot_search_limit),
            mover: OrderedCollectionMover,
            shelf,
            config,
            saver: None,
        })
    }

    /// Reads the shelf from `store` and keeps it saved there. Must be called from within a
    /// tokio runtime.
    pub fn load(store: Arc<dyn ShelfStore>, config: ShelfConfig) -> ShelfResult<Self> {
        config.validate()?;
        let record = store.get(SHELF_KEYS)?;
        let mut shelf = decode_shelf(&record, config.default_column_count)?;
        if shelf.column_count == 0 {
            shelf.column_count = config.default_column_count;
        }

        let allocator = GridPositionAllocator::new(config.slot_search_limit);
        let out_of_range = shelf.categories.iter().any(|c| c.column >= shelf.column_count);
        if out_of_range || find_slot_collision(&shelf.categories).is_some() {
            let changed = normalize_grid(&mut shelf.categories, shelf.column_count, &allocator);
            tracing::warn!(changed, "stored category slots were inconsistent; renumbered");
        }

        let mut model = Self::from_shelf(shelf, config)?;
        tracing::info!(
            categories = model.shelf.categories.len(),
            inbox = model.shelf.inbox.len(),
            "shelf loaded"
        );
        model.attach_store(store);
        Ok(model)
    }

    /// Starts saving every committed mutation to `store`. Must be called from within a
    /// tokio runtime.
    pub fn attach_store(&mut self, store: Arc<dyn ShelfStore>) {
        self.saver = Some(WriteBehind::spawn(store));
    }

    pub fn shelf(&self) -> &Shelf {
        &self.shelf
    }

    pub fn config(&self) -> &ShelfConfig {
        &self.config
    }

    pub fn save_status(&self) -> Option<SaveStatus> {
        self.saver.as_ref().map(WriteBehind::status)
    }

    /// Waits for the newest committed state to be written. Without a store this is a no-op.
    pub async fn flush(&self) -> ShelfResult<()> {
        match &self.saver {
            Some(saver) => saver.flush().await,
            None => Ok(()),
        }
    }

    pub async fn shutdown(mut self) -> ShelfResult<()> {
        match self.saver.take() {
            Some(saver) => saver.shutdown().await,
            None => Ok(()),
        }
    }

    pub fn subscribe_store(&self) -> Option<broadcast::Receiver<StoreEvent>> {
        self.saver.as_ref().map(|saver| saver.store().subscribe())
    }

    /// Where the next created category would go.
    pub fn next_free_slot(&self) -> Slot {
        self.allocator
            .find_first_available_slot(&self.shelf.categories, self.shelf.column_count)
    }

    // ─── Categories ─────────────────────────────────────────────────────────

    pub fn create_category(&mut self, name: &str) -> ShelfResult<Category> {
        let name = required_text(name, "category name")?;
        let allocator = self.allocator;
        let category = self.mutate("create_category", move |shelf| {
            let slot = allocator.find_first_available_slot(&shelf.categories, shelf.column_count);
            if shelf.categories.iter().any(|existing| existing.slot() == slot) {
                return Err(ShelfError::Validation(format!(
                    "grid is full: no free slot within {} positions per column",
                    allocator.search_limit()
                )));
            }
            let category = Category {
                id: new_id(),
                name,
                column: slot.column,
                position: slot.position,
                links: Vec::new(),
                subcategories: Vec::new(),
            };
            shelf.categories.push(category.clone());
            Ok(category)
        })?;
        tracing::info!(
            category_id = %category.id,
            column = category.column,
            position = category.position,
            "category created"
        );
        Ok(category)
    }

    pub fn rename_category(&mut self, category_id: &str, name: &str) -> ShelfResult<&Shelf> {
        let name = required_text(name, "category name")?;
        self.mutate("rename_category", |shelf| {
            shelf.require_category_mut(category_id)?.name = name;
            Ok(())
        })?;
        Ok(&self.shelf)
    }

    /// Removes the category with everything in it. Other categories keep their slots; the
    /// freed slot stays empty until a move or a new category fills it.
    pub fn delete_category(&mut self, category_id: &str) -> ShelfResult<Category> {
        let removed = self.mutate("delete_category", |shelf| {
            let index = shelf
                .categories
                .iter()
                .position(|category| category.id == category_id)
                .ok_or_else(|| ShelfError::unknown("category", category_id))?;
            Ok(shelf.categories.remove(index))
        })?;
        tracing::info!(
            category_id = %removed.id,
            links = removed.all_links().count(),
            subcategories = removed.subcategories.len(),
            "category deleted"
        );
        Ok(removed)
    }

    pub fn move_category(&mut self, category_id: &str, target_column: usize, target_position: usize) -> ShelfResult<Slot> {
        let allocator = self.allocator;
        self.mutate("move_category", |shelf| {
            let column_count = shelf.column_count;
            allocator.move_category(
                &mut shelf.categories,
                column_count,
                category_id,
                target_column,
                target_position,
            )
        })
    }

    pub fn apply_category_move(&mut self, request: &MoveCategoryRequest) -> ShelfResult<Slot> {
        self.move_category(&request.category_id, request.target_column, request.target_position)
    }

    /// Closes holes left by deletions. Returns how many categories moved.
    pub fn compact_columns(&mut self) -> ShelfResult<usize> {
        let allocator = self.allocator;
        self.mutate("compact_columns", |shelf| Ok(allocator.compact(&mut shelf.categories)))
    }

    // ─── Subcategories ──────────────────────────────────────────────────────

    pub fn create_subcategory(&mut self, category_id: &str, name: &str) -> ShelfResult<Subcategory> {
        let name = required_text(name, "subcategory name")?;
        self.mutate("create_subcategory", |shelf| {
            let subcategory = Subcategory {
                id: new_id(),
                name,
                collapsed: false,
                links: Vec::new(),
            };
            shelf
                .require_category_mut(category_id)?
                .subcategories
                .push(subcategory.clone());
            Ok(subcategory)
        })
    }

    pub fn rename_subcategory(&mut self, subcategory_id: &str, name: &str) -> ShelfResult<&Shelf> {
        let name = required_text(name, "subcategory name")?;
        self.mutate("rename_subcategory", |shelf| {
            subcategory_mut(shelf, subcategory_id)?.name = name;
            Ok(())
        })?;
        Ok(&self.shelf)
    }

    pub fn delete_subcategory(&mut self, subcategory_id: &str) -> ShelfResult<Subcategory> {
        self.mutate("delete_subcategory", |shelf| {
            for category in shelf.categories.iter_mut() {
                if let Some(index) = category.subcategories.iter().position(|sub| sub.id == subcategory_id) {
                    return Ok(category.subcategories.remove(index));
                }
            }
            Err(ShelfError::unknown("subcategory", subcategory_id))
        })
    }

    /// Flips the collapsed flag and returns the new value.
    pub fn toggle_subcategory_collapsed(&mut self, subcategory_id: &str) -> ShelfResult<bool> {
        self.mutate("toggle_subcategory_collapsed", |shelf| {
            let sub = subcategory_mut(shelf, subcategory_id)?;
            sub.collapsed = !sub.collapsed;
            Ok(sub.collapsed)
        })
    }

    // ─── Links ──────────────────────────────────────────────────────────────

    pub fn add_link(
        &mut self,
        category_id: &str,
        subcategory_id: Option<&str>,
        name: &str,
        url: &str,
    ) -> ShelfResult<Link> {
        let name = required_text(name, "link name")?;
        let url = required_text(url, "link url")?;
        self.mutate("add_link", |shelf| {
            let link = Link {
                id: new_id(),
                name,
                url,
                favicon_data: None,
                custom_favicon_url: None,
            };
            links_mut(shelf, category_id, subcategory_id)?.push(link.clone());
            Ok(link)
        })
    }

    pub fn update_link(&mut self, link_id: &str, patch: LinkPatch) -> ShelfResult<Link> {
        let name = patch.name.as_deref().map(|name| required_text(name, "link name")).transpose()?;
        let url = patch.url.as_deref().map(|url| required_text(url, "link url")).transpose()?;
        self.mutate("update_link", |shelf| {
            let link = find_link_mut(shelf, link_id)?;
            if let Some(name) = name {
                link.name = name;
            }
            if let Some(url) = url {
                link.url = url;
            }
            if let Some(custom) = patch.custom_favicon_url {
                link.custom_favicon_url = custom.filter(|value| !value.trim().is_empty());
            }
            Ok(link.clone())
        })
    }

    /// Removes a link from the category itself, or from one of its subcategories when
    /// `subcategory_id` is given.
    pub fn delete_link(&mut self, category_id: &str, subcategory_id: Option<&str>, link_id: &str) -> ShelfResult<Link> {
        self.mutate("delete_link", |shelf| {
            let links = links_mut(shelf, category_id, subcategory_id)?;
            let index = links
                .iter()
                .position(|link| link.id == link_id)
                .ok_or_else(|| ShelfError::unknown("link", link_id))?;
            Ok(links.remove(index))
        })
    }

    // ─── Favourites and inbox ───────────────────────────────────────────────

    pub fn add_favourite(&mut self, url: &str) -> ShelfResult<Favourite> {
        let url = required_text(url, "favourite url")?;
        self.mutate("add_favourite", |shelf| {
            let favourite = Favourite {
                id: new_id(),
                url,
                favicon_data: None,
                custom_favicon_url: None,
            };
            shelf.favourites.push(favourite.clone());
            Ok(favourite)
        })
    }

    pub fn delete_favourite(&mut self, favourite_id: &str) -> ShelfResult<Favourite> {
        self.mutate("delete_favourite", |shelf| {
            let index = shelf
                .favourites
                .iter()
                .position(|fav| fav.id == favourite_id)
                .ok_or_else(|| ShelfError::unknown("favourite", favourite_id))?;
            Ok(shelf.favourites.remove(index))
        })
    }

    /// Saves a URL to the inbox. A blank name is replaced by one derived from the URL host.
    pub fn add_inbox_item(&mut self, name: &str, url: &str) -> ShelfResult<InboxItem> {
        let url = required_text(url, "inbox item url")?;
        let name = match name.trim() {
            "" => default_name_for_url(&url),
            trimmed => trimmed.to_string(),
        };
        self.mutate("add_inbox_item", |shelf| {
            let normalized = normalize_url(&url);
            if let Some(existing) = shelf.inbox.iter().find(|item| normalize_url(&item.url) == normalized) {
                return Err(ShelfError::DuplicateEntry(format!(
                    "inbox already holds {} as {}",
                    url, existing.id
                )));
            }
            let item = InboxItem {
                id: new_id(),
                name,
                url,
                favicon_data: None,
                custom_favicon_url: None,
            };
            shelf.inbox.push(item.clone());
            Ok(item)
        })
    }

    pub fn delete_inbox_item(&mut self, item_id: &str) -> ShelfResult<InboxItem> {
        self.mutate("delete_inbox_item", |shelf| {
            let index = shelf
                .inbox
                .iter()
                .position(|item| item.id == item_id)
                .ok_or_else(|| ShelfError::unknown("inbox item", item_id))?;
            Ok(shelf.inbox.remove(index))
        })
    }

    /// Stores fetched favicon data on whichever link, favourite or inbox item has `item_id`.
    pub fn set_favicon(&mut self, item_id: &str, favicon_data: Option<String>) -> ShelfResult<ItemKind> {
        self.mutate("set_favicon", |shelf| {
            if let Ok(link) = find_link_mut(shelf, item_id) {
                link.favicon_data = favicon_data;
                return Ok(ItemKind::Link);
            }
            if let Some(fav) = shelf.favourites.iter_mut().find(|fav| fav.id == item_id) {
                fav.favicon_data = favicon_data;
                return Ok(ItemKind::Favourite);
            }
            if let Some(item) = shelf.inbox.iter_mut().find(|item| item.id == item_id) {
                item.favicon_data = favicon_data;
                return Ok(ItemKind::InboxItem);
            }
            Err(ShelfError::unknown("item", item_id))
        })
    }

    // ─── Moves ──────────────────────────────────────────────────────────────

    /// Moves a link, favourite, inbox item or subcategory. The item is found by id in the
    /// current source list, never by an index captured earlier.
    pub fn move_item(&mut self, request: &MoveRequest) -> ShelfResult<MoveOutcome> {
        let mover = self.mover;
        self.mutate("move_item", |shelf| mover.move_item(shelf, request))
    }

    // ─── Settings, import, external changes ─────────────────────────────────

    /// Merges a partial `{columnCount, showFavourites, openLinksInNewTab}` patch. Shrinking
    /// the column count moves categories from dropped columns to the end of the last one.
    pub fn update_settings(&mut self, patch: serde_json::Value) -> ShelfResult<DisplaySettings> {
        let max_columns = self.config.max_column_count;
        let allocator = self.allocator;
        self.mutate("update_settings", move |shelf| {
            let mut merged = serde_json::to_value(shelf.settings())?;
            merge_json(&mut merged, patch);
            let next: DisplaySettings = serde_json::from_value(merged)
                .map_err(|error| ShelfError::Validation(format!("invalid settings: {}", error)))?;
            if next.column_count == 0 || next.column_count > max_columns {
                return Err(ShelfError::Validation(format!(
                    "columnCount must be between 1 and {}",
                    max_columns
                )));
            }
            if next.column_count < shelf.column_count {
                let moved = allocator.fold_columns(&mut shelf.categories, next.column_count);
                tracing::info!(
                    from = shelf.column_count,
                    to = next.column_count,
                    moved,
                    "column count reduced"
                );
            }
            shelf.column_count = next.column_count;
            shelf.show_favourites = next.show_favourites;
            shelf.open_links_in_new_tab = next.open_links_in_new_tab;
            Ok(next)
        })
    }

    /// Replaces categories, favourites and display settings with an imported shelf. The
    /// inbox is kept.
    pub fn import(&mut self, payload: ImportPayload) -> ShelfResult<&Shelf> {
        validate_import(&payload, &self.shelf, self.config.max_column_count)?;
        let allocator = self.allocator;
        self.mutate("import", move |shelf| {
            let mut categories = payload.categories;
            let renumbered = normalize_grid(&mut categories, payload.column_count, &allocator);
            if renumbered > 0 {
                tracing::debug!(renumbered, "imported category slots renumbered");
            }
            shelf.categories = categories;
            shelf.favourites = payload.favourites;
            shelf.column_count = payload.column_count;
            shelf.show_favourites = payload.show_favourites;
            shelf.open_links_in_new_tab = payload.open_links_in_new_tab;
            Ok(())
        })?;
        tracing::info!(categories = self.shelf.categories.len(), "shelf imported");
        Ok(&self.shelf)
    }

    pub fn import_json(&mut self, raw: &str) -> ShelfResult<&Shelf> {
        let payload = parse_import(raw)?;
        self.import(payload)
    }

    /// Takes another writer's inbox wholesale. Local inbox edits that have not reached the
    /// store yet are lost; that case is logged rather than merged.
    pub fn apply_external_change(&mut self, change: ExternalChange) -> ShelfResult<&Shelf> {
        if change.inbox == self.shelf.inbox {
            return Ok(&self.shelf);
        }
        let unsaved_local_edits = self.saver.as_ref().is_some_and(WriteBehind::has_unsaved);
        tracing::warn!(
            local = self.shelf.inbox.len(),
            incoming = change.inbox.len(),
            unsaved_local_edits,
            "replacing local inbox with external change"
        );

        self.transact("external_inbox", false, move |shelf| {
            shelf.inbox = change.inbox;
            Ok(())
        })?;
        Ok(&self.shelf)
    }

    /// Applies a store event unless it echoes this model's own write. Returns whether the
    /// inbox was considered.
    pub fn handle_store_event(&mut self, event: StoreEvent) -> ShelfResult<bool> {
        let own = self
            .saver
            .as_ref()
            .map(|saver| saver.store().origin() == event.origin)
            .unwrap_or(false);
        if own {
            return Ok(false);
        }
        self.apply_external_change(event.change)?;
        Ok(true)
    }

    fn mutate<T>(&mut self, action: &'static str, apply: impl FnOnce(&mut Shelf) -> ShelfResult<T>) -> ShelfResult<T> {
        self.transact(action, true, apply)
    }

    fn transact<T>(
        &mut self,
        action: &'static str,
        persist: bool,
        apply: impl FnOnce(&mut Shelf) -> ShelfResult<T>,
    ) -> ShelfResult<T> {
        let mut staged = self.shelf.clone();
        let value = apply(&mut staged).and_then(|value| check_invariants(&staged).map(|()| value));
        let value = match value {
            Ok(value) => value,
            Err(error) => {
                tracing::debug!(action, kind = error.kind(), error = %error, "mutation rejected");
                return Err(error);
            }
        };

        self.shelf = staged;
        if persist {
            self.schedule_save(action);
        }
        Ok(value)
    }

    fn schedule_save(&self, action: &'static str) {
        let Some(saver) = &self.saver else {
            return;
        };
        match encode_shelf(&self.shelf) {
            Ok(record) => {
                let generation = saver.schedule(record);
                tracing::trace!(action, generation, "save scheduled");
            }
            Err(error) => {
                tracing::warn!(action, error = %error, "failed to encode shelf for saving");
            }
        }
    }
}

/// Structural checks every committed state must pass: distinct slots inside the grid and
/// shelf-wide unique, non-empty ids.
pub fn check_invariants(shelf: &Shelf) -> ShelfResult<()> {
    if let Some((first, second)) = find_slot_collision(&shelf.categories) {
        return Err(ShelfError::Validation(format!(
            "categories {} and {} share slot ({}, {})",
            first.id, second.id, first.column, first.position
        )));
    }
    if let Some(category) = shelf.categories.iter().find(|c| c.column >= shelf.column_count) {
        return Err(ShelfError::Validation(format!(
            "category {} sits in column {} beyond column count {}",
            category.id, category.column, shelf.column_count
        )));
    }

    let mut seen = HashSet::new();
    for id in shelf.all_ids() {
        if id.trim().is_empty() {
            return Err(ShelfError::Validation("entity without an id".to_string()));
        }
        if !seen.insert(id) {
            return Err(ShelfError::Validation(format!("duplicate id {}", id)));
        }
    }
    Ok(())
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn required_text(value: &str, what: &str) -> ShelfResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ShelfError::Validation(format!("{} cannot be empty", what)));
    }
    Ok(trimmed.to_string())
}

fn subcategory_mut<'a>(shelf: &'a mut Shelf, subcategory_id: &str) -> ShelfResult<&'a mut Subcategory> {
    shelf
        .categories
        .iter_mut()
        .flat_map(|category| category.subcategories.iter_mut())
        .find(|sub| sub.id == subcategory_id)
        .ok_or_else(|| ShelfError::unknown("subcategory", subcategory_id))
}

fn links_mut<'a>(shelf: &'a mut Shelf, category_id: &str, subcategory_id: Option<&str>) -> ShelfResult<&'a mut Vec<Link>> {
    let category = shelf.require_category_mut(category_id)?;
    match subcategory_id {
        None => Ok(&mut category.links),
        Some(sub_id) => category
            .subcategory_mut(sub_id)
            .map(|sub| &mut sub.links)
            .ok_or_else(|| ShelfError::unknown("subcategory", sub_id)),
    }
}

fn find_link_mut<'a>(shelf: &'a mut Shelf, link_id: &str) -> ShelfResult<&'a mut Link> {
    for category in shelf.categories.iter_mut() {
        if let Some(link) = category.links.iter_mut().find(|link| link.id == link_id) {
            return Ok(link);
        }
        for sub in category.subcategories.iter_mut() {
            if let Some(link) = sub.links.iter_mut().find(|link| link.id == link_id) {
                return Ok(link);
            }
        }
    }
    Err(ShelfError::unknown("link", link_id))
}
