use crate::errors::{ShelfError, ShelfResult};
use crate::models::{
    Category, ContainerAddress, Favourite, InboxItem, ItemKind, Link, MoveRequest, Shelf, Subcategory,
    TargetIndex,
};
use crate::urls::normalize_url;
use serde::{Deserialize, Serialize};

pub trait Identified {
    fn id(&self) -> &str;
}

impl Identified for Link {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for Favourite {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for InboxItem {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for Subcategory {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for Category {
    fn id(&self) -> &str {
        &self.id
    }
}

pub fn position_of<T: Identified>(items: &[T], id: &str) -> Option<usize> {
    items.iter().position(|item| item.id() == id)
}

/// Reorders one element inside a single list. Indices are gaps in the list as it stands
/// before the element is lifted out, so `target` ranges over `0..=len`.
pub fn reorder<T>(items: &mut Vec<T>, source_index: usize, target: TargetIndex) -> ShelfResult<usize> {
    let len = items.len();
    check_source(source_index, len)?;
    check_target(target, len)?;
    let item = items.remove(source_index);
    let index = landing_index(target, items.len(), Some(source_index));
    items.insert(index, item);
    Ok(index)
}

fn check_source(source_index: usize, len: usize) -> ShelfResult<()> {
    if source_index >= len {
        return Err(ShelfError::InvalidReference(format!(
            "source index {} out of range (len {})",
            source_index, len
        )));
    }
    Ok(())
}

fn check_target(target: TargetIndex, len_before: usize) -> ShelfResult<()> {
    match target {
        TargetIndex::At(index) if index > len_before => Err(ShelfError::InvalidReference(format!(
            "target index {} out of range (len {})",
            index, len_before
        ))),
        _ => Ok(()),
    }
}

/// `same_list_source` is the removed index when source and target are the same list.
fn landing_index(target: TargetIndex, len_after_removal: usize, same_list_source: Option<usize>) -> usize {
    match target {
        TargetIndex::Append => len_after_removal,
        TargetIndex::At(index) => match same_list_source {
            Some(source) if source < index => index - 1,
            _ => index,
        },
    }
}

/// An entry lifted out of its container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CarriedItem {
    Link(Link),
    Favourite(Favourite),
    InboxItem(InboxItem),
    Subcategory(Subcategory),
}

impl CarriedItem {
    pub fn id(&self) -> &str {
        match self {
            Self::Link(link) => &link.id,
            Self::Favourite(fav) => &fav.id,
            Self::InboxItem(item) => &item.id,
            Self::Subcategory(sub) => &sub.id,
        }
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            Self::Link(_) => ItemKind::Link,
            Self::Favourite(_) => ItemKind::Favourite,
            Self::InboxItem(_) => ItemKind::InboxItem,
            Self::Subcategory(_) => ItemKind::Subcategory,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Link(link) => Some(&link.url),
            Self::Favourite(fav) => Some(&fav.url),
            Self::InboxItem(item) => Some(&item.url),
            Self::Subcategory(_) => None,
        }
    }

    /// Maps fields explicitly into the shape `target` holds. `name` is only consulted when
    /// the source kind never carried one (favourites).
    pub fn convert(self, target: ItemKind, name: Option<&str>) -> ShelfResult<Self> {
        if self.kind() == target {
            return Ok(self);
        }
        match (self, target) {
            (Self::InboxItem(item), ItemKind::Link) => Ok(Self::Link(Link {
                id: item.id,
                name: item.name,
                url: item.url,
                favicon_data: item.favicon_data,
                custom_favicon_url: item.custom_favicon_url,
            })),
            (Self::Link(link), ItemKind::InboxItem) => Ok(Self::InboxItem(InboxItem {
                id: link.id,
                name: link.name,
                url: link.url,
                favicon_data: link.favicon_data,
                custom_favicon_url: link.custom_favicon_url,
            })),
            (Self::Link(link), ItemKind::Favourite) => Ok(Self::Favourite(Favourite {
                id: link.id,
                url: link.url,
                favicon_data: link.favicon_data,
                custom_favicon_url: link.custom_favicon_url,
            })),
            (Self::InboxItem(item), ItemKind::Favourite) => Ok(Self::Favourite(Favourite {
                id: item.id,
                url: item.url,
                favicon_data: item.favicon_data,
                custom_favicon_url: item.custom_favicon_url,
            })),
            (Self::Favourite(fav), ItemKind::Link) => {
                let name = required_name(name, &fav.id)?;
                Ok(Self::Link(Link {
                    id: fav.id,
                    name,
                    url: fav.url,
                    favicon_data: fav.favicon_data,
                    custom_favicon_url: fav.custom_favicon_url,
                }))
            }
            (Self::Favourite(fav), ItemKind::InboxItem) => {
                let name = required_name(name, &fav.id)?;
                Ok(Self::InboxItem(InboxItem {
                    id: fav.id,
                    name,
                    url: fav.url,
                    favicon_data: fav.favicon_data,
                    custom_favicon_url: fav.custom_favicon_url,
                }))
            }
            (item, target) => Err(ShelfError::InvalidReference(format!(
                "cannot move {} {} into a {} container",
                item.kind().as_str(),
                item.id(),
                target.as_str()
            ))),
        }
    }
}

fn required_name(name: Option<&str>, id: &str) -> ShelfResult<String> {
    match name.map(str::trim) {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(ShelfError::Validation(format!(
            "favourite {} needs a name to become a link or inbox item",
            id
        ))),
    }
}

/// Mutable view over one addressed ordered list.
enum ListMut<'a> {
    Links(&'a mut Vec<Link>),
    Favourites(&'a mut Vec<Favourite>),
    Inbox(&'a mut Vec<InboxItem>),
    Subcategories(&'a mut Vec<Subcategory>),
}

impl ListMut<'_> {
    fn len(&self) -> usize {
        match self {
            Self::Links(items) => items.len(),
            Self::Favourites(items) => items.len(),
            Self::Inbox(items) => items.len(),
            Self::Subcategories(items) => items.len(),
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        match self {
            Self::Links(items) => position_of(items, id),
            Self::Favourites(items) => position_of(items, id),
            Self::Inbox(items) => position_of(items, id),
            Self::Subcategories(items) => position_of(items, id),
        }
    }

    fn get(&self, index: usize) -> Option<CarriedItem> {
        match self {
            Self::Links(items) => items.get(index).cloned().map(CarriedItem::Link),
            Self::Favourites(items) => items.get(index).cloned().map(CarriedItem::Favourite),
            Self::Inbox(items) => items.get(index).cloned().map(CarriedItem::InboxItem),
            Self::Subcategories(items) => items.get(index).cloned().map(CarriedItem::Subcategory),
        }
    }

    fn remove(&mut self, index: usize) -> CarriedItem {
        match self {
            Self::Links(items) => CarriedItem::Link(items.remove(index)),
            Self::Favourites(items) => CarriedItem::Favourite(items.remove(index)),
            Self::Inbox(items) => CarriedItem::InboxItem(items.remove(index)),
            Self::Subcategories(items) => CarriedItem::Subcategory(items.remove(index)),
        }
    }

    fn insert(&mut self, index: usize, item: CarriedItem) -> ShelfResult<()> {
        match (self, item) {
            (Self::Links(items), CarriedItem::Link(link)) => items.insert(index, link),
            (Self::Favourites(items), CarriedItem::Favourite(fav)) => items.insert(index, fav),
            (Self::Inbox(items), CarriedItem::InboxItem(entry)) => items.insert(index, entry),
            (Self::Subcategories(items), CarriedItem::Subcategory(sub)) => items.insert(index, sub),
            (_, item) => {
                return Err(ShelfError::InvalidReference(format!(
                    "{} {} does not fit the target container",
                    item.kind().as_str(),
                    item.id()
                )))
            }
        }
        Ok(())
    }
}

fn resolve<'a>(shelf: &'a mut Shelf, address: &ContainerAddress) -> ShelfResult<ListMut<'a>> {
    match address {
        ContainerAddress::CategoryLinks { category_id } => {
            Ok(ListMut::Links(&mut shelf.require_category_mut(category_id)?.links))
        }
        ContainerAddress::SubcategoryLinks {
            category_id,
            subcategory_id,
        } => {
            let category = shelf.require_category_mut(category_id)?;
            let sub = category
                .subcategory_mut(subcategory_id)
                .ok_or_else(|| ShelfError::unknown("subcategory", subcategory_id))?;
            Ok(ListMut::Links(&mut sub.links))
        }
        ContainerAddress::Favourites => Ok(ListMut::Favourites(&mut shelf.favourites)),
        ContainerAddress::Inbox => Ok(ListMut::Inbox(&mut shelf.inbox)),
        ContainerAddress::SubcategoryList { category_id } => Ok(ListMut::Subcategories(
            &mut shelf.require_category_mut(category_id)?.subcategories,
        )),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveOutcome {
    pub item_id: String,
    pub kind: ItemKind,
    pub target: ContainerAddress,
    pub index: usize,
}

/// Moves one item between (or within) addressed ordered lists, converting it when the
/// containers hold different kinds.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderedCollectionMover;

impl OrderedCollectionMover {
    /// Current index of `item_id` in the addressed list.
    pub fn index_of(&self, shelf: &mut Shelf, address: &ContainerAddress, item_id: &str) -> ShelfResult<usize> {
        resolve(shelf, address)?
            .position(item_id)
            .ok_or_else(|| ShelfError::unknown(address.item_kind().as_str(), item_id))
    }

    /// Resolves the request's item id against the lists as they are now, then moves it.
    pub fn move_item(&self, shelf: &mut Shelf, request: &MoveRequest) -> ShelfResult<MoveOutcome> {
        let source_index = self.index_of(shelf, &request.source, &request.item_id)?;
        self.move_at(
            shelf,
            &request.source,
            source_index,
            &request.target,
            request.target_index,
            request.name.as_deref(),
        )
    }

    /// Everything is checked before the source list is touched, so a rejected move leaves
    /// the shelf as it was.
    pub fn move_at(
        &self,
        shelf: &mut Shelf,
        source: &ContainerAddress,
        source_index: usize,
        target: &ContainerAddress,
        target_index: TargetIndex,
        name: Option<&str>,
    ) -> ShelfResult<MoveOutcome> {
        let same_list = source == target;

        let (source_len, item) = {
            let list = resolve(shelf, source)?;
            check_source(source_index, list.len())?;
            (list.len(), list.get(source_index))
        };
        let item = item.ok_or_else(|| {
            ShelfError::InvalidReference(format!("source index {} out of range", source_index))
        })?;
        let target_len = if same_list {
            source_len
        } else {
            resolve(shelf, target)?.len()
        };
        check_target(target_index, target_len)?;

        let converted = item.convert(target.item_kind(), name)?;
        if matches!(target, ContainerAddress::Inbox) && !same_list {
            reject_inbox_duplicate(&shelf.inbox, &converted)?;
        }

        resolve(shelf, source)?.remove(source_index);
        let len_after_removal = if same_list { source_len - 1 } else { target_len };
        let index = landing_index(target_index, len_after_removal, same_list.then_some(source_index));

        let outcome = MoveOutcome {
            item_id: converted.id().to_string(),
            kind: converted.kind(),
            target: target.clone(),
            index,
        };
        resolve(shelf, target)?.insert(index, converted)?;

        tracing::debug!(
            item_id = %outcome.item_id,
            from = source.kind().as_str(),
            to = target.kind().as_str(),
            index,
            "moved item"
        );
        Ok(outcome)
    }
}

fn reject_inbox_duplicate(inbox: &[InboxItem], incoming: &CarriedItem) -> ShelfResult<()> {
    let Some(url) = incoming.url() else {
        return Ok(());
    };
    let normalized = normalize_url(url);
    if let Some(existing) = inbox.iter().find(|item| normalize_url(&item.url) == normalized) {
        return Err(ShelfError::DuplicateEntry(format!(
            "inbox already holds {} as {}",
            url, existing.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(id: &str, url: &str) -> Link {
        Link {
            id: id.to_string(),
            name: id.to_uppercase(),
            url: url.to_string(),
            favicon_data: Some(format!("data:{}", id)),
            custom_favicon_url: None,
        }
    }

    fn sample_shelf() -> Shelf {
        let mut shelf = Shelf::default();
        shelf.categories.push(Category {
            id: "dev".to_string(),
            name: "Dev".to_string(),
            column: 0,
            position: 0,
            links: vec![
                link("l1", "https://one.test"),
                link("l2", "https://two.test"),
                link("l3", "https://three.test"),
            ],
            subcategories: vec![
                Subcategory {
                    id: "s1".to_string(),
                    name: "Docs".to_string(),
                    collapsed: false,
                    links: vec![link("l4", "https://four.test")],
                },
                Subcategory {
                    id: "s2".to_string(),
                    name: "Tools".to_string(),
                    collapsed: true,
                    links: Vec::new(),
                },
            ],
        });
        shelf.categories.push(Category {
            id: "news".to_string(),
            name: "News".to_string(),
            column: 1,
            position: 0,
            links: Vec::new(),
            subcategories: Vec::new(),
        });
        shelf.favourites.push(Favourite {
            id: "f1".to_string(),
            url: "https://fav.test".to_string(),
            favicon_data: None,
            custom_favicon_url: Some("https://fav.test/icon.png".to_string()),
        });
        shelf.inbox.push(InboxItem {
            id: "i1".to_string(),
            name: "GitHub".to_string(),
            url: "https://github.com".to_string(),
            favicon_data: Some("data:gh".to_string()),
            custom_favicon_url: Some("https://gh.test/icon.png".to_string()),
        });
        shelf
    }

    fn link_ids(shelf: &Shelf, category: &str) -> Vec<String> {
        shelf
            .category(category)
            .expect("category")
            .links
            .iter()
            .map(|l| l.id.clone())
            .collect()
    }

    #[test]
    fn reorder_compensates_for_downward_moves() {
        let mut items = vec!["l1", "l2", "l3"];
        assert_eq!(reorder(&mut items, 0, TargetIndex::At(2)).expect("reorder"), 1);
        assert_eq!(items, vec!["l2", "l1", "l3"]);

        let mut items = vec!["l1", "l2", "l3"];
        reorder(&mut items, 0, TargetIndex::At(3)).expect("reorder");
        assert_eq!(items, vec!["l2", "l3", "l1"]);

        let mut items = vec!["l1", "l2", "l3"];
        reorder(&mut items, 2, TargetIndex::At(0)).expect("reorder");
        assert_eq!(items, vec!["l3", "l1", "l2"]);
    }

    #[test]
    fn reorder_to_own_index_is_identity() {
        for index in 0..3 {
            let mut items = vec![1, 2, 3];
            reorder(&mut items, index, TargetIndex::At(index)).expect("reorder");
            assert_eq!(items, vec![1, 2, 3]);
        }
    }

    #[test]
    fn reorder_rejects_out_of_bounds() {
        let mut items = vec![1, 2];
        assert!(matches!(
            reorder(&mut items, 2, TargetIndex::At(0)),
            Err(ShelfError::InvalidReference(_))
        ));
        assert!(matches!(
            reorder(&mut items, 0, TargetIndex::At(3)),
            Err(ShelfError::InvalidReference(_))
        ));
        assert_eq!(items, vec![1, 2]);
    }

    #[test]
    fn same_list_move_matches_primitive() {
        let mut shelf = sample_shelf();
        let address = ContainerAddress::category_links("dev");
        let outcome = OrderedCollectionMover
            .move_at(&mut shelf, &address, 0, &address, TargetIndex::Append, None)
            .expect("move");
        assert_eq!(outcome.index, 2);
        assert_eq!(link_ids(&shelf, "dev"), vec!["l2", "l3", "l1"]);
    }

    #[test]
    fn moves_link_between_category_and_subcategory() {
        let mut shelf = sample_shelf();
        let request = MoveRequest {
            source: ContainerAddress::category_links("dev"),
            item_id: "l2".to_string(),
            target: ContainerAddress::subcategory_links("dev", "s1"),
            target_index: TargetIndex::At(0),
            name: None,
        };
        OrderedCollectionMover.move_item(&mut shelf, &request).expect("move");
        assert_eq!(link_ids(&shelf, "dev"), vec!["l1", "l3"]);
        let docs = shelf.category("dev").and_then(|c| c.subcategory("s1")).expect("docs");
        let ids: Vec<_> = docs.links.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["l2", "l4"]);
    }

    #[test]
    fn moves_subcategory_to_other_category() {
        let mut shelf = sample_shelf();
        let request = MoveRequest {
            source: ContainerAddress::subcategory_list("dev"),
            item_id: "s2".to_string(),
            target: ContainerAddress::subcategory_list("news"),
            target_index: TargetIndex::Append,
            name: None,
        };
        OrderedCollectionMover.move_item(&mut shelf, &request).expect("move");
        assert_eq!(shelf.category("dev").expect("dev").subcategories.len(), 1);
        let news = shelf.category("news").expect("news");
        assert_eq!(news.subcategories[0].id, "s2");
        assert!(news.subcategories[0].collapsed);
    }

    #[test]
    fn subcategory_cannot_become_a_link() {
        let mut shelf = sample_shelf();
        let before = shelf.clone();
        let request = MoveRequest {
            source: ContainerAddress::subcategory_list("dev"),
            item_id: "s1".to_string(),
            target: ContainerAddress::category_links("news"),
            target_index: TargetIndex::Append,
            name: None,
        };
        assert!(matches!(
            OrderedCollectionMover.move_item(&mut shelf, &request),
            Err(ShelfError::InvalidReference(_))
        ));
        assert_eq!(shelf, before);
    }

    #[test]
    fn inbox_item_becomes_link_verbatim() {
        let mut shelf = sample_shelf();
        let original = shelf.inbox[0].clone();
        let request = MoveRequest {
            source: ContainerAddress::Inbox,
            item_id: "i1".to_string(),
            target: ContainerAddress::category_links("dev"),
            target_index: TargetIndex::Append,
            name: None,
        };
        let outcome = OrderedCollectionMover.move_item(&mut shelf, &request).expect("move");
        assert_eq!(outcome.index, 3);
        assert!(shelf.inbox.is_empty());
        let moved = shelf.category("dev").and_then(|c| c.links.last()).expect("moved link");
        assert_eq!(moved.id, original.id);
        assert_eq!(moved.name, original.name);
        assert_eq!(moved.url, original.url);
        assert_eq!(moved.favicon_data, original.favicon_data);
        assert_eq!(moved.custom_favicon_url, original.custom_favicon_url);
    }

    #[test]
    fn link_into_inbox_rejects_normalized_duplicate() {
        let mut shelf = sample_shelf();
        shelf.categories[0].links[0].url = "https://WWW.github.com/".to_string();
        let before = shelf.clone();
        let request = MoveRequest {
            source: ContainerAddress::category_links("dev"),
            item_id: "l1".to_string(),
            target: ContainerAddress::Inbox,
            target_index: TargetIndex::Append,
            name: None,
        };
        assert!(matches!(
            OrderedCollectionMover.move_item(&mut shelf, &request),
            Err(ShelfError::DuplicateEntry(_))
        ));
        assert_eq!(shelf, before);
    }

    #[test]
    fn inbox_reorder_skips_duplicate_check() {
        let mut shelf = sample_shelf();
        shelf.inbox.push(InboxItem {
            id: "i2".to_string(),
            name: "Other".to_string(),
            url: "https://other.test".to_string(),
            favicon_data: None,
            custom_favicon_url: None,
        });
        let request = MoveRequest {
            source: ContainerAddress::Inbox,
            item_id: "i2".to_string(),
            target: ContainerAddress::Inbox,
            target_index: TargetIndex::At(0),
            name: None,
        };
        OrderedCollectionMover.move_item(&mut shelf, &request).expect("move");
        assert_eq!(shelf.inbox[0].id, "i2");
    }

    #[test]
    fn link_into_favourites_drops_name() {
        let mut shelf = sample_shelf();
        let request = MoveRequest {
            source: ContainerAddress::category_links("dev"),
            item_id: "l3".to_string(),
            target: ContainerAddress::Favourites,
            target_index: TargetIndex::At(0),
            name: None,
        };
        OrderedCollectionMover.move_item(&mut shelf, &request).expect("move");
        let fav = &shelf.favourites[0];
        assert_eq!(fav.id, "l3");
        assert_eq!(fav.url, "https://three.test");
        assert_eq!(fav.favicon_data.as_deref(), Some("data:l3"));
    }

    #[test]
    fn favourite_into_category_needs_a_name() {
        let mut shelf = sample_shelf();
        let mut request = MoveRequest {
            source: ContainerAddress::Favourites,
            item_id: "f1".to_string(),
            target: ContainerAddress::category_links("news"),
            target_index: TargetIndex::Append,
            name: Some("   ".to_string()),
        };
        assert!(matches!(
            OrderedCollectionMover.move_item(&mut shelf, &request),
            Err(ShelfError::Validation(_))
        ));
        assert_eq!(shelf.favourites.len(), 1);

        request.name = Some("Fav site".to_string());
        OrderedCollectionMover.move_item(&mut shelf, &request).expect("move");
        let moved = &shelf.category("news").expect("news").links[0];
        assert_eq!(moved.name, "Fav site");
        assert_eq!(moved.custom_favicon_url.as_deref(), Some("https://fav.test/icon.png"));
        assert!(shelf.favourites.is_empty());
    }

    #[test]
    fn unknown_addresses_are_invalid_references() {
        let mut shelf = sample_shelf();
        let request = MoveRequest {
            source: ContainerAddress::category_links("dev"),
            item_id: "l1".to_string(),
            target: ContainerAddress::subcategory_links("dev", "missing"),
            target_index: TargetIndex::Append,
            name: None,
        };
        assert!(matches!(
            OrderedCollectionMover.move_item(&mut shelf, &request),
            Err(ShelfError::InvalidReference(_))
        ));
        assert_eq!(link_ids(&shelf, "dev"), vec!["l1", "l2", "l3"]);

        let stale = MoveRequest {
            item_id: "gone".to_string(),
            target: ContainerAddress::category_links("news"),
            ..request
        };
        assert!(matches!(
            OrderedCollectionMover.move_item(&mut shelf, &stale),
            Err(ShelfError::InvalidReference(_))
        ));
    }

    #[test]
    fn cross_list_target_bounds_use_target_length() {
        let mut shelf = sample_shelf();
        let result = OrderedCollectionMover.move_at(
            &mut shelf,
            &ContainerAddress::category_links("dev"),
            0,
            &ContainerAddress::category_links("news"),
            TargetIndex::At(1),
            None,
        );
        assert!(matches!(result, Err(ShelfError::InvalidReference(_))));
        assert_eq!(link_ids(&shelf, "dev"), vec!["l1", "l2", "l3"]);
    }
}
