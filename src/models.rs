use crate::errors::{ShelfError, ShelfResult};
use serde::{Deserialize, Serialize};

pub const DEFAULT_COLUMN_COUNT: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub favicon_data: Option<String>,
    #[serde(default)]
    pub custom_favicon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subcategory {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub collapsed: bool,
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub column: usize,
    pub position: usize,
    pub links: Vec<Link>,
    pub subcategories: Vec<Subcategory>,
}

impl Category {
    pub fn slot(&self) -> Slot {
        Slot {
            column: self.column,
            position: self.position,
        }
    }

    pub fn subcategory(&self, subcategory_id: &str) -> Option<&Subcategory> {
        self.subcategories.iter().find(|sub| sub.id == subcategory_id)
    }

    pub fn subcategory_mut(&mut self, subcategory_id: &str) -> Option<&mut Subcategory> {
        self.subcategories.iter_mut().find(|sub| sub.id == subcategory_id)
    }

    /// Links held directly and inside every subcategory, in display order.
    pub fn all_links(&self) -> impl Iterator<Item = &Link> {
        self.links
            .iter()
            .chain(self.subcategories.iter().flat_map(|sub| sub.links.iter()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Favourite {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub favicon_data: Option<String>,
    #[serde(default)]
    pub custom_favicon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxItem {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub favicon_data: Option<String>,
    #[serde(default)]
    pub custom_favicon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shelf {
    pub categories: Vec<Category>,
    pub favourites: Vec<Favourite>,
    pub inbox: Vec<InboxItem>,
    pub column_count: usize,
    pub show_favourites: bool,
    pub open_links_in_new_tab: bool,
}

impl Default for Shelf {
    fn default() -> Self {
        Self {
            categories: Vec::new(),
            favourites: Vec::new(),
            inbox: Vec::new(),
            column_count: DEFAULT_COLUMN_COUNT,
            show_favourites: true,
            open_links_in_new_tab: false,
        }
    }
}

impl Shelf {
    pub fn with_column_count(column_count: usize) -> Self {
        Self {
            column_count,
            ..Self::default()
        }
    }

    pub fn category(&self, category_id: &str) -> Option<&Category> {
        self.categories.iter().find(|category| category.id == category_id)
    }

    pub fn category_mut(&mut self, category_id: &str) -> Option<&mut Category> {
        self.categories.iter_mut().find(|category| category.id == category_id)
    }

    pub fn require_category(&self, category_id: &str) -> ShelfResult<&Category> {
        self.category(category_id)
            .ok_or_else(|| ShelfError::unknown("category", category_id))
    }

    pub fn require_category_mut(&mut self, category_id: &str) -> ShelfResult<&mut Category> {
        self.category_mut(category_id)
            .ok_or_else(|| ShelfError::unknown("category", category_id))
    }

    /// Display settings without the collections.
    pub fn settings(&self) -> DisplaySettings {
        DisplaySettings {
            column_count: self.column_count,
            show_favourites: self.show_favourites,
            open_links_in_new_tab: self.open_links_in_new_tab,
        }
    }

    /// Every id held anywhere on the shelf, categories and subcategories included.
    pub fn all_ids(&self) -> Vec<&str> {
        let mut ids = Vec::new();
        for category in &self.categories {
            ids.push(category.id.as_str());
            ids.extend(category.links.iter().map(|link| link.id.as_str()));
            for sub in &category.subcategories {
                ids.push(sub.id.as_str());
                ids.extend(sub.links.iter().map(|link| link.id.as_str()));
            }
        }
        ids.extend(self.favourites.iter().map(|fav| fav.id.as_str()));
        ids.extend(self.inbox.iter().map(|item| item.id.as_str()));
        ids
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub column: usize,
    pub position: usize,
}

impl Slot {
    pub fn new(column: usize, position: usize) -> Self {
        Self { column, position }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplaySettings {
    pub column_count: usize,
    pub show_favourites: bool,
    pub open_links_in_new_tab: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContainerKind {
    CategoryLinks,
    SubcategoryLinks,
    Favourites,
    Inbox,
    SubcategoryList,
}

impl ContainerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CategoryLinks => "category-links",
            Self::SubcategoryLinks => "subcategory-links",
            Self::Favourites => "favourites",
            Self::Inbox => "inbox",
            Self::SubcategoryList => "subcategory-list",
        }
    }
}

/// What kind of entity an ordered container holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemKind {
    Link,
    Favourite,
    InboxItem,
    Subcategory,
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::Favourite => "favourite",
            Self::InboxItem => "inbox-item",
            Self::Subcategory => "subcategory",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ContainerAddress {
    #[serde(rename_all = "camelCase")]
    CategoryLinks { category_id: String },
    #[serde(rename_all = "camelCase")]
    SubcategoryLinks {
        category_id: String,
        subcategory_id: String,
    },
    Favourites,
    Inbox,
    #[serde(rename_all = "camelCase")]
    SubcategoryList { category_id: String },
}

impl ContainerAddress {
    pub fn category_links(category_id: impl Into<String>) -> Self {
        Self::CategoryLinks {
            category_id: category_id.into(),
        }
    }

    pub fn subcategory_links(category_id: impl Into<String>, subcategory_id: impl Into<String>) -> Self {
        Self::SubcategoryLinks {
            category_id: category_id.into(),
            subcategory_id: subcategory_id.into(),
        }
    }

    pub fn subcategory_list(category_id: impl Into<String>) -> Self {
        Self::SubcategoryList {
            category_id: category_id.into(),
        }
    }

    /// Category-level links, or the links of `subcategory_id` when given.
    pub fn links_of(category_id: impl Into<String>, subcategory_id: Option<&str>) -> Self {
        match subcategory_id {
            Some(sub) => Self::subcategory_links(category_id, sub),
            None => Self::category_links(category_id),
        }
    }

    pub fn kind(&self) -> ContainerKind {
        match self {
            Self::CategoryLinks { .. } => ContainerKind::CategoryLinks,
            Self::SubcategoryLinks { .. } => ContainerKind::SubcategoryLinks,
            Self::Favourites => ContainerKind::Favourites,
            Self::Inbox => ContainerKind::Inbox,
            Self::SubcategoryList { .. } => ContainerKind::SubcategoryList,
        }
    }

    pub fn item_kind(&self) -> ItemKind {
        match self {
            Self::CategoryLinks { .. } | Self::SubcategoryLinks { .. } => ItemKind::Link,
            Self::Favourites => ItemKind::Favourite,
            Self::Inbox => ItemKind::InboxItem,
            Self::SubcategoryList { .. } => ItemKind::Subcategory,
        }
    }
}

/// Insertion point in a target list. Serialized as a raw index where `-1` appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum TargetIndex {
    At(usize),
    Append,
}

impl TargetIndex {
    pub const APPEND_SENTINEL: i64 = -1;

    pub fn from_raw(raw: i64) -> ShelfResult<Self> {
        if raw == Self::APPEND_SENTINEL {
            return Ok(Self::Append);
        }
        usize::try_from(raw)
            .map(Self::At)
            .map_err(|_| ShelfError::InvalidReference(format!("target index {} out of range", raw)))
    }
}

impl TryFrom<i64> for TargetIndex {
    type Error = ShelfError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::from_raw(value)
    }
}

impl From<TargetIndex> for i64 {
    fn from(value: TargetIndex) -> Self {
        match value {
            TargetIndex::At(index) => index as i64,
            TargetIndex::Append => TargetIndex::APPEND_SENTINEL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub source: ContainerAddress,
    pub item_id: String,
    pub target: ContainerAddress,
    pub target_index: TargetIndex,
    /// Required when a favourite becomes a link or inbox item.
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveCategoryRequest {
    pub category_id: String,
    pub target_column: usize,
    pub target_position: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkPatch {
    pub name: Option<String>,
    pub url: Option<String>,
    /// `Some(None)` clears the custom favicon.
    #[serde(default, with = "double_option")]
    pub custom_favicon_url: Option<Option<String>>,
}

/// Payload delivered by the persistence collaborator when another writer touched the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalChange {
    pub inbox: Vec<InboxItem>,
}

/// Shelf state supplied by the import collaborator. The inbox is not part of an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportPayload {
    pub categories: Vec<Category>,
    #[serde(default)]
    pub favourites: Vec<Favourite>,
    pub column_count: usize,
    #[serde(default = "default_true")]
    pub show_favourites: bool,
    #[serde(default)]
    pub open_links_in_new_tab: bool,
}

fn default_true() -> bool {
    true
}

mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<Option<String>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_index_uses_minus_one_as_append() {
        assert_eq!(TargetIndex::from_raw(-1).expect("append"), TargetIndex::Append);
        assert_eq!(TargetIndex::from_raw(3).expect("index"), TargetIndex::At(3));
        assert!(matches!(
            TargetIndex::from_raw(-2),
            Err(ShelfError::InvalidReference(_))
        ));

        let request: MoveRequest = serde_json::from_value(serde_json::json!({
            "source": {"kind": "inbox"},
            "itemId": "i1",
            "target": {"kind": "category-links", "categoryId": "c1"},
            "targetIndex": -1
        }))
        .expect("move request");
        assert_eq!(request.target_index, TargetIndex::Append);
        assert_eq!(request.target, ContainerAddress::category_links("c1"));
        assert_eq!(request.name, None);
    }

    #[test]
    fn category_requires_links_and_subcategories() {
        let missing = serde_json::from_value::<Category>(serde_json::json!({
            "id": "c1",
            "name": "Dev",
            "column": 0,
            "position": 0,
            "links": []
        }));
        assert!(missing.is_err());
    }

    #[test]
    fn link_patch_distinguishes_clear_from_absent() {
        let absent: LinkPatch = serde_json::from_value(serde_json::json!({"name": "x"})).expect("patch");
        assert_eq!(absent.custom_favicon_url, None);

        let cleared: LinkPatch =
            serde_json::from_value(serde_json::json!({"customFaviconUrl": null})).expect("patch");
        assert_eq!(cleared.custom_favicon_url, Some(None));
    }
}
