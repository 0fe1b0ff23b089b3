use futures::TryStreamExt;
use object_store::path::Path;
use object_store::ObjectStore;

/// Assert that the object at `key` has exactly `expected` as content.
pub async fn assert_blob_content(store: &dyn ObjectStore, key: &str, expected: &[u8]) {
    let data = store
        .get(&Path::from(key))
        .await
        .unwrap_or_else(|e| panic!("failed to get object at '{key}': {e}"))
        .bytes()
        .await
        .unwrap_or_else(|e| panic!("failed to read object at '{key}': {e}"));
    assert_eq!(
        data.as_ref(),
        expected,
        "object content at '{key}' does not match expected"
    );
}

/// Assert that no object exists at `key`.
pub async fn assert_blob_missing(store: &dyn ObjectStore, key: &str) {
    assert!(
        store.head(&Path::from(key)).await.is_err(),
        "expected object at key '{key}' to NOT exist"
    );
}

/// Keys of every object under `prefix`, sorted.
pub async fn list_keys(store: &dyn ObjectStore, prefix: &str) -> Vec<String> {
    let prefix = Path::from(prefix);
    let mut keys: Vec<String> = store
        .list(Some(&prefix))
        .map_ok(|meta| meta.location.to_string())
        .try_collect()
        .await
        .expect("list should succeed");
    keys.sort();
    keys
}
