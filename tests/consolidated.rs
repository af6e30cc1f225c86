use std::sync::Arc;

use mdzarr::array::{ArrayCreateOptions, DataType, FillValue};
use mdzarr::config::StoreOpenOptions;
use mdzarr::storage::{ByteStore, CountingStore, MemoryStore};
use mdzarr::store::Store;

fn build_hierarchy(memory: &Arc<MemoryStore>) {
    let store =
        Store::create_with_store(memory.clone(), StoreOpenOptions::default()).unwrap();
    let root = store.root_group();
    let group = root.create_group("measurements").unwrap();
    for name in ["temperature", "pressure"] {
        let array = group
            .create_array(
                name,
                &[4, 4],
                ArrayCreateOptions {
                    chunk_shape: Some(vec![2, 2]),
                    data_type: DataType::Float32,
                    fill_value: Some(FillValue::from(0f32)),
                    ..Default::default()
                },
            )
            .unwrap();
        array
            .write_elements::<f32>(&[0, 0], &[4, 4], &[1.5; 16])
            .unwrap();
    }
    root.create_array(
        "index",
        &[4],
        ArrayCreateOptions {
            chunk_shape: Some(vec![4]),
            data_type: DataType::Int64,
            fill_value: Some(FillValue::from(0i64)),
            ..Default::default()
        },
    )
    .unwrap();
    store.consolidate_metadata().unwrap();
    store.close().unwrap();
}

#[test]
fn consolidated_metadata_bypasses_metadata_reads() {
    let memory = Arc::new(MemoryStore::new());
    build_hierarchy(&memory);
    assert!(memory.get(&".zmetadata".try_into().unwrap()).unwrap().is_some());

    // Reopen through a counting wrapper: enumerating and opening every array must read
    // only the consolidated document itself.
    let counting = Arc::new(CountingStore::new(memory));
    let store =
        Store::open_with_store(counting.clone(), StoreOpenOptions::default()).unwrap();
    let root = store.root_group();

    assert_eq!(root.array_names().unwrap(), vec!["index".to_string()]);
    assert_eq!(root.group_names().unwrap(), vec!["measurements".to_string()]);
    let group = root.open_group("measurements").unwrap();
    let mut names = group.array_names().unwrap();
    names.sort();
    assert_eq!(names, vec!["pressure".to_string(), "temperature".to_string()]);
    for name in ["temperature", "pressure"] {
        let array = group.open_array(name).unwrap();
        assert_eq!(array.shape(), vec![4, 4]);
        assert_eq!(array.data_type(), &DataType::Float32);
    }
    root.open_array("index").unwrap();

    // One read for `.zmetadata`, none for per-node metadata, no directory listings.
    assert_eq!(counting.reads(), 1);
    assert_eq!(counting.lists(), 0);
}

#[test]
fn consolidated_metadata_tracks_tree_mutations() {
    let memory = Arc::new(MemoryStore::new());
    build_hierarchy(&memory);

    // Mutate the tree: the consolidated document is rewritten on close.
    let store =
        Store::open_with_store(memory.clone(), StoreOpenOptions::default()).unwrap();
    let root = store.root_group();
    root.create_group("extra").unwrap();
    root.open_group("measurements")
        .unwrap()
        .delete_array("pressure")
        .unwrap();
    store.close().unwrap();

    let document: serde_json::Value = serde_json::from_slice(
        &memory.get(&".zmetadata".try_into().unwrap()).unwrap().unwrap(),
    )
    .unwrap();
    let metadata = document["metadata"].as_object().unwrap();
    assert!(metadata.contains_key("extra/.zgroup"));
    assert!(!metadata.contains_key("measurements/pressure/.zarray"));
    assert!(metadata.contains_key("measurements/temperature/.zarray"));

    // A consolidated-only reopen sees the updated tree.
    let counting = Arc::new(CountingStore::new(memory));
    let store = Store::open_with_store(counting, StoreOpenOptions::default()).unwrap();
    let group = store.root_group().open_group("measurements").unwrap();
    assert_eq!(group.array_names().unwrap(), vec!["temperature".to_string()]);
    assert!(group.open_array("pressure").is_err());
}

#[test]
fn consolidated_metadata_disabled_by_option() {
    let memory = Arc::new(MemoryStore::new());
    build_hierarchy(&memory);

    let counting = Arc::new(CountingStore::new(memory));
    let options = StoreOpenOptions {
        use_consolidated: false,
        ..StoreOpenOptions::default()
    };
    let store = Store::open_with_store(counting.clone(), options).unwrap();
    store.root_group().open_array("index").unwrap();
    // Without consolidated metadata the per-node documents are read.
    assert!(counting.reads() > 1);
}
