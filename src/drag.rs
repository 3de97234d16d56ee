use crate::errors::{ShelfError, ShelfResult};
use crate::models::{ContainerAddress, ItemKind, MoveRequest, Shelf, TargetIndex};
use crate::mover::position_of;
use serde::{Deserialize, Serialize};

/// What is being dragged and where it came from, captured when the gesture starts and
/// handed back when it ends. Only the id is kept; the index is looked up again on drop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DragSession {
    pub source: ContainerAddress,
    pub item_id: String,
    pub kind: ItemKind,
}

impl DragSession {
    pub fn begin(shelf: &Shelf, source: ContainerAddress, item_id: impl Into<String>) -> ShelfResult<Self> {
        let item_id = item_id.into();
        let found = match &source {
            ContainerAddress::CategoryLinks { category_id } => {
                position_of(&shelf.require_category(category_id)?.links, &item_id)
            }
            ContainerAddress::SubcategoryLinks {
                category_id,
                subcategory_id,
            } => {
                let sub = shelf
                    .require_category(category_id)?
                    .subcategory(subcategory_id)
                    .ok_or_else(|| ShelfError::unknown("subcategory", subcategory_id))?;
                position_of(&sub.links, &item_id)
            }
            ContainerAddress::Favourites => position_of(&shelf.favourites, &item_id),
            ContainerAddress::Inbox => position_of(&shelf.inbox, &item_id),
            ContainerAddress::SubcategoryList { category_id } => {
                position_of(&shelf.require_category(category_id)?.subcategories, &item_id)
            }
        };
        if found.is_none() {
            return Err(ShelfError::unknown(source.item_kind().as_str(), &item_id));
        }

        let kind = source.item_kind();
        Ok(Self {
            source,
            item_id,
            kind,
        })
    }

    /// Whether dropping into `target` can succeed kind-wise. A favourite dropped on a link
    /// container still needs a name at drop time.
    pub fn accepts(&self, target: &ContainerAddress) -> bool {
        match (self.kind, target.item_kind()) {
            (ItemKind::Subcategory, to) => to == ItemKind::Subcategory,
            (_, ItemKind::Subcategory) => false,
            _ => true,
        }
    }

    pub fn into_request(self, target: ContainerAddress, target_index: TargetIndex, name: Option<String>) -> MoveRequest {
        MoveRequest {
            source: self.source,
            item_id: self.item_id,
            target,
            target_index,
            name,
        }
    }
}
