//! High-level document edits.
//!
//! Each helper expands one user-visible gesture (create a block, move it,
//! retype it, retitle it) into the low-level operations of a caller-owned
//! transaction, so a whole gesture lands in the cache atomically and ships
//! to the server as one batch.

use std::sync::Arc;

use folio_core::{segments_to_value, BlockType, Pointer, Segment, Table};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::block::BlockStore;
use crate::record::RecordStore;
use crate::transaction::{Command, Transaction, TransactionError};

/// Allocate a fresh block and issue the `Set` that establishes it.
///
/// The block is not attached to any parent yet; pair with
/// [`append_child`]/[`prepend_child`]/the insert helpers.
pub fn create_block(
    tx: &mut Transaction,
    block_type: BlockType,
) -> Result<BlockStore, TransactionError> {
    let id = Uuid::new_v4().to_string();
    let store = RecordStore::new(tx.cache().clone(), Pointer::block(id.clone()), tx.user_id());
    let block = BlockStore::new(store);
    tx.add_operation(
        block.record(),
        Command::Set(json!({
            "id": id,
            "type": block_type.as_str(),
            "version": 1,
        })),
    )?;
    Ok(block)
}

/// Allocate a fresh record in an arbitrary table (spaces, collections) and
/// issue the establishing `Set`. Object values get the generated id stamped
/// into their `id` field.
pub fn create_record(
    tx: &mut Transaction,
    table: Table,
    mut value: Value,
) -> Result<Arc<RecordStore>, TransactionError> {
    let id = Uuid::new_v4().to_string();
    if let Value::Object(fields) = &mut value {
        fields.insert("id".into(), Value::String(id.clone()));
    }
    let store = RecordStore::new(tx.cache().clone(), Pointer::new(table, id), tx.user_id());
    tx.add_operation(&store, Command::Set(value))?;
    Ok(store)
}

/// Add `child` at the end of `parent`'s content list.
pub fn append_child(
    tx: &mut Transaction,
    parent: &BlockStore,
    child: &BlockStore,
) -> Result<(), TransactionError> {
    attach(tx, parent, child, Command::ListAfter { id: child.id().to_string(), after: None })
}

/// Add `child` at the front of `parent`'s content list.
pub fn prepend_child(
    tx: &mut Transaction,
    parent: &BlockStore,
    child: &BlockStore,
) -> Result<(), TransactionError> {
    attach(tx, parent, child, Command::ListBefore { id: child.id().to_string(), before: None })
}

/// Insert `child` immediately after the sibling named `target`.
pub fn insert_child_after(
    tx: &mut Transaction,
    parent: &BlockStore,
    child: &BlockStore,
    target: &str,
) -> Result<(), TransactionError> {
    attach(
        tx,
        parent,
        child,
        Command::ListAfter { id: child.id().to_string(), after: Some(target.to_string()) },
    )
}

/// Insert `child` immediately before the sibling named `target`.
pub fn insert_child_before(
    tx: &mut Transaction,
    parent: &BlockStore,
    child: &BlockStore,
    target: &str,
) -> Result<(), TransactionError> {
    attach(
        tx,
        parent,
        child,
        Command::ListBefore { id: child.id().to_string(), before: Some(target.to_string()) },
    )
}

/// Unlink `child` from `parent` and evict it from the local cache.
///
/// Eviction only drops the working-set copy; durable deletion is the
/// server's call.
pub fn remove_child(
    tx: &mut Transaction,
    parent: &BlockStore,
    child: &BlockStore,
) -> Result<(), TransactionError> {
    tx.add_operation(
        &parent.content_store(),
        Command::ListRemove { id: child.id().to_string() },
    )?;
    tx.cache().delete_record(child.pointer(), tx.user_id());
    Ok(())
}

/// Change a block's type. Already the requested type: a no-op that issues
/// zero operations.
pub fn turn_into(
    tx: &mut Transaction,
    block: &BlockStore,
    new_type: BlockType,
) -> Result<(), TransactionError> {
    if block.block_type() == Some(new_type) {
        return Ok(());
    }
    tx.add_operation(block.record(), Command::Update(json!({"type": new_type.as_str()})))
}

/// Replace a block's title with the given segments.
pub fn set_title(
    tx: &mut Transaction,
    block: &BlockStore,
    segments: &[Segment],
) -> Result<(), TransactionError> {
    tx.add_operation(&block.title_store(), Command::Set(segments_to_value(segments)))
}

/// Generic `Set` on any store — the text-editing core's write entry point.
pub fn set_value(
    tx: &mut Transaction,
    store: &RecordStore,
    value: Value,
) -> Result<(), TransactionError> {
    tx.add_operation(store, Command::Set(value))
}

/// Generic `Update` on any store.
pub fn update_value(
    tx: &mut Transaction,
    store: &RecordStore,
    value: Value,
) -> Result<(), TransactionError> {
    tx.add_operation(store, Command::Update(value))
}

/// One list op on the parent, plus a `parent_id` update on the child when it
/// actually changes parents — both inside the caller's transaction.
fn attach(
    tx: &mut Transaction,
    parent: &BlockStore,
    child: &BlockStore,
    command: Command,
) -> Result<(), TransactionError> {
    tx.add_operation(&parent.content_store(), command)?;
    if child.parent_id().as_deref() != Some(parent.id()) {
        tx.add_operation(child.record(), Command::Update(json!({"parent_id": parent.id()})))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, RecordCacheStore};
    use std::sync::Arc;

    fn cache() -> Arc<RecordCacheStore> {
        Arc::new(RecordCacheStore::new(CacheConfig::default()))
    }

    fn tx(cache: &Arc<RecordCacheStore>) -> Transaction {
        Transaction::begin(cache.clone(), "alice")
    }

    #[test]
    fn test_create_block_is_unattached() {
        let cache = cache();
        let mut tx = tx(&cache);

        let block = create_block(&mut tx, BlockType::Text).unwrap();

        assert_eq!(block.block_type(), Some(BlockType::Text));
        assert_eq!(block.parent_id(), None);
        assert!(block.content().is_empty());
        assert_eq!(tx.operations().len(), 1);
        // Fresh v4 id.
        assert!(Uuid::parse_str(block.id()).is_ok());
    }

    #[test]
    fn test_append_and_prepend_order() {
        let cache = cache();
        let mut tx = tx(&cache);

        let page = create_block(&mut tx, BlockType::Page).unwrap();
        let first = create_block(&mut tx, BlockType::Text).unwrap();
        let second = create_block(&mut tx, BlockType::Text).unwrap();
        let opener = create_block(&mut tx, BlockType::Header).unwrap();

        append_child(&mut tx, &page, &first).unwrap();
        append_child(&mut tx, &page, &second).unwrap();
        prepend_child(&mut tx, &page, &opener).unwrap();

        assert_eq!(
            page.content(),
            vec![opener.id().to_string(), first.id().to_string(), second.id().to_string()]
        );
        assert_eq!(first.parent_id().as_deref(), Some(page.id()));
        assert_eq!(opener.parent_id().as_deref(), Some(page.id()));
    }

    #[test]
    fn test_insert_relative_to_sibling() {
        let cache = cache();
        let mut tx = tx(&cache);

        let page = create_block(&mut tx, BlockType::Page).unwrap();
        let a = create_block(&mut tx, BlockType::Text).unwrap();
        let c = create_block(&mut tx, BlockType::Text).unwrap();
        append_child(&mut tx, &page, &a).unwrap();
        append_child(&mut tx, &page, &c).unwrap();

        let b = create_block(&mut tx, BlockType::Text).unwrap();
        insert_child_after(&mut tx, &page, &b, a.id()).unwrap();
        assert_eq!(
            page.content(),
            vec![a.id().to_string(), b.id().to_string(), c.id().to_string()]
        );

        let zero = create_block(&mut tx, BlockType::Text).unwrap();
        insert_child_before(&mut tx, &page, &zero, a.id()).unwrap();
        assert_eq!(page.content().first().map(String::as_str), Some(zero.id()));
    }

    #[test]
    fn test_reattach_to_same_parent_skips_parent_id_update() {
        let cache = cache();
        let mut tx = tx(&cache);

        let page = create_block(&mut tx, BlockType::Page).unwrap();
        let child = create_block(&mut tx, BlockType::Text).unwrap();
        append_child(&mut tx, &page, &child).unwrap();

        let before = tx.operations().len();
        // Re-ordering under the same parent: list op only, no parent_id op.
        insert_child_before(&mut tx, &page, &child, "whatever").unwrap();
        assert_eq!(tx.operations().len(), before + 1);
    }

    #[test]
    fn test_move_between_parents_relinks() {
        let cache = cache();
        let mut tx = tx(&cache);

        let from = create_block(&mut tx, BlockType::Page).unwrap();
        let to = create_block(&mut tx, BlockType::Page).unwrap();
        let child = create_block(&mut tx, BlockType::Text).unwrap();
        append_child(&mut tx, &from, &child).unwrap();

        remove_child(&mut tx, &from, &child).unwrap();
        // The evicted record is re-established by the move's parent_id update.
        append_child(&mut tx, &to, &child).unwrap();

        assert!(from.content().is_empty());
        assert_eq!(to.content(), vec![child.id().to_string()]);
        assert_eq!(child.parent_id().as_deref(), Some(to.id()));
    }

    #[test]
    fn test_remove_child_evicts_from_cache() {
        let cache = cache();
        let mut tx = tx(&cache);

        let page = create_block(&mut tx, BlockType::Page).unwrap();
        let child = create_block(&mut tx, BlockType::Text).unwrap();
        append_child(&mut tx, &page, &child).unwrap();
        assert!(cache.contains(child.pointer(), "alice"));

        remove_child(&mut tx, &page, &child).unwrap();

        assert!(page.content().is_empty());
        assert!(!cache.contains(child.pointer(), "alice"));
    }

    #[test]
    fn test_turn_into_is_idempotent() {
        let cache = cache();
        let mut tx = tx(&cache);

        let block = create_block(&mut tx, BlockType::Text).unwrap();
        let before = tx.operations().len();

        turn_into(&mut tx, &block, BlockType::Quote).unwrap();
        assert_eq!(tx.operations().len(), before + 1);
        assert_eq!(block.block_type(), Some(BlockType::Quote));

        // Second call: type already matches, zero operations issued.
        turn_into(&mut tx, &block, BlockType::Quote).unwrap();
        assert_eq!(tx.operations().len(), before + 1);
    }

    #[test]
    fn test_set_title_round_trips() {
        let cache = cache();
        let mut tx = tx(&cache);

        let block = create_block(&mut tx, BlockType::Page).unwrap();
        let segments =
            vec![Segment::plain("Hello "), Segment::with_marks("there", vec![folio_core::Mark::Bold])];
        set_title(&mut tx, &block, &segments).unwrap();

        assert_eq!(block.title(), segments);
        // Sibling fields survived the targeted title write.
        assert_eq!(block.block_type(), Some(BlockType::Page));
    }

    #[test]
    fn test_create_record_in_another_table() {
        let cache = cache();
        let mut tx = tx(&cache);

        let space = create_record(
            &mut tx,
            folio_core::Table::Space,
            serde_json::json!({"name": "Work"}),
        )
        .unwrap();

        assert_eq!(space.pointer().table, folio_core::Table::Space);
        let value = space.get_value().unwrap();
        assert_eq!(value["name"], "Work");
        assert_eq!(value["id"], space.pointer().id.as_str());
    }

    #[test]
    fn test_gesture_commits_as_one_batch() {
        let cache = cache();
        let mut tx = tx(&cache);

        let page = create_block(&mut tx, BlockType::Page).unwrap();
        let para = create_block(&mut tx, BlockType::Text).unwrap();
        append_child(&mut tx, &page, &para).unwrap();
        set_title(&mut tx, &page, &[Segment::plain("Notes")]).unwrap();

        let payload = tx.commit().unwrap();
        // create + create + (list + parent_id) + title
        assert_eq!(payload.operations.len(), 5);
        assert_eq!(payload.user_id, "alice");
    }
}
