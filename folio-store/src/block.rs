//! Block-domain convenience over record stores.
//!
//! A block's persisted value carries `type`, an ordered `content` id list,
//! rich-text `title` segments and a `parent_id` back-link. `BlockStore`
//! exposes the fixed-path projections the editing surface works with.

use std::sync::Arc;

use folio_core::{segments_from_value, BlockType, Pointer, Segment};

use crate::cache::RecordCacheStore;
use crate::record::RecordStore;

/// A record store specialized for tree-structured document blocks.
#[derive(Clone)]
pub struct BlockStore {
    record: Arc<RecordStore>,
}

impl BlockStore {
    pub fn new(record: Arc<RecordStore>) -> Self {
        Self { record }
    }

    /// A root view over a block record.
    pub fn open(
        cache: Arc<RecordCacheStore>,
        id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self::new(RecordStore::new(cache, Pointer::block(id), user_id))
    }

    pub fn record(&self) -> &Arc<RecordStore> {
        &self.record
    }

    pub fn id(&self) -> &str {
        &self.record.pointer().id
    }

    pub fn pointer(&self) -> &Pointer {
        self.record.pointer()
    }

    /// The ordered child-id list projection (path `["content"]`).
    pub fn content_store(&self) -> Arc<RecordStore> {
        self.record.property_store("content")
    }

    /// The rich-text title projection (path `["title"]`).
    pub fn title_store(&self) -> Arc<RecordStore> {
        self.record.property_store("title")
    }

    /// Whether the viewing user may mutate this block. The text-editing core
    /// consults this before accepting keystrokes.
    pub fn can_edit(&self) -> bool {
        self.record.get_role().can_edit()
    }

    pub fn block_type(&self) -> Option<BlockType> {
        let value = self.record.get_value()?;
        BlockType::parse(value.get("type")?.as_str()?)
    }

    pub fn parent_id(&self) -> Option<String> {
        let value = self.record.get_value()?;
        Some(value.get("parent_id")?.as_str()?.to_string())
    }

    /// Decoded title segments; empty when unloaded or untitled.
    pub fn title(&self) -> Vec<Segment> {
        self.title_store()
            .get_value()
            .map(|v| segments_from_value(&v))
            .unwrap_or_default()
    }

    /// Decoded child-id list; empty when unloaded or childless.
    pub fn content(&self) -> Vec<String> {
        self.content_store()
            .get_value()
            .and_then(|v| match v {
                serde_json::Value::Array(items) => Some(
                    items
                        .iter()
                        .filter_map(|item| item.as_str().map(str::to_string))
                        .collect(),
                ),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// The memoized store for one child block, homed under this block.
    pub fn child(&self, id: impl Into<String>) -> BlockStore {
        BlockStore::new(self.record.store_for(Pointer::block(id)))
    }

    /// Stores for every child named in the content list, in order.
    pub fn children(&self) -> Vec<BlockStore> {
        self.content().into_iter().map(|id| self.child(id)).collect()
    }
}
