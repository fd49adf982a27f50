//! # Collection Items
//!
//! References to the requests and folders of a collection as the engine
//! reports them. Items are shared (`Arc`) so the same reference can travel
//! through events, the summary and reporters without copying.
//!
//! The hierarchy is walked upwards only: every item knows its container,
//! every folder knows its own container, and the collection sits at the top.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Shared reference to an item, as carried by event payloads.
pub type ItemRef = Arc<Item>;

/// Shared reference to a folder or the collection root.
pub type GroupRef = Arc<ItemGroup>;

/// A folder, or the collection itself at the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemGroup {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip)]
    pub parent: Option<GroupRef>,
}

/// A runnable request item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip)]
    pub parent: Option<GroupRef>,
}

impl ItemGroup {
    pub fn root(id: impl Into<String>, name: impl Into<String>) -> GroupRef {
        Arc::new(Self {
            id: id.into(),
            name: Some(name.into()),
            parent: None,
        })
    }

    pub fn folder(id: impl Into<String>, name: impl Into<String>, parent: &GroupRef) -> GroupRef {
        Arc::new(Self {
            id: id.into(),
            name: Some(name.into()),
            parent: Some(Arc::clone(parent)),
        })
    }
}

impl Item {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        parent: Option<&GroupRef>,
    ) -> ItemRef {
        Arc::new(Self {
            id: id.into(),
            name: Some(name.into()),
            parent: parent.map(Arc::clone),
        })
    }

    /// Display name, falling back to the id.
    pub fn label(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.id)
    }

    /// The container of this item's container.
    ///
    /// Assumes the usual item-in-folder-in-collection nesting: for an item
    /// directly in a folder this is the collection, for an item at the
    /// collection root it is `None`. Deeper or shallower trees are not
    /// re-interpreted.
    pub fn grandparent(&self) -> Option<GroupRef> {
        self.parent.as_ref().and_then(|parent| parent.parent.clone())
    }
}
