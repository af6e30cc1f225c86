use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use mdzarr::array::{ArrayCreateOptions, DataType, FillValue, FillingStatus};
use mdzarr::config::StoreOpenOptions;
use mdzarr::storage::{CountingStore, MemoryStore};
use mdzarr::store::Store;
use mdzarr::version::ZarrVersion;

#[test]
fn advise_read_populates_cache_and_avoids_store_reads() {
    // Scenario: a 64x64 array with 8x8 chunks, a window covering all 64 chunks, and four
    // worker threads.
    let memory = Arc::new(MemoryStore::new());
    let counting = Arc::new(CountingStore::new(memory));
    let options = StoreOpenOptions {
        num_threads: 4,
        ..StoreOpenOptions::default()
    };
    let store = Store::create_with_store(counting.clone(), options).unwrap();
    let array = store
        .root_group()
        .create_array(
            "big",
            &[64, 64],
            ArrayCreateOptions {
                chunk_shape: Some(vec![8, 8]),
                data_type: DataType::Int32,
                fill_value: Some(FillValue::from(0i32)),
                ..Default::default()
            },
        )
        .unwrap();
    let values: Vec<i32> = (0..64 * 64).collect();
    array
        .write_elements::<i32>(&[0, 0], &[64, 64], &values)
        .unwrap();
    array.flush().unwrap();

    array.advise_read(&[0, 0], &[64, 64], None).unwrap();
    assert_eq!(array.cached_chunk_count(), 64);

    // A subsequent read over the window issues zero store requests.
    counting.reset();
    assert_eq!(
        array.read_elements::<i32>(&[0, 0], &[64, 64]).unwrap(),
        values
    );
    assert_eq!(counting.reads(), 0);
    assert_eq!(counting.lists(), 0);
}

#[test]
fn advise_read_equivalence_with_fresh_reads() {
    let store = Store::create_with_store(
        Arc::new(MemoryStore::new()),
        StoreOpenOptions::default(),
    )
    .unwrap();
    let array = store
        .root_group()
        .create_array(
            "mix",
            &[16, 16],
            ArrayCreateOptions {
                chunk_shape: Some(vec![4, 4]),
                data_type: DataType::Float64,
                fill_value: Some(FillValue::from(-0.5f64)),
                ..Default::default()
            },
        )
        .unwrap();
    // Write only a few chunks so some prefetched entries are missing markers.
    array
        .write_elements::<f64>(&[0, 0], &[4, 4], &[1.0; 16])
        .unwrap();
    array
        .write_elements::<f64>(&[8, 4], &[4, 4], &[2.0; 16])
        .unwrap();
    array.flush().unwrap();

    let fresh = array.read_elements::<f64>(&[0, 0], &[16, 16]).unwrap();
    array.clear_chunk_cache();
    array.advise_read(&[0, 0], &[16, 16], None).unwrap();
    assert_eq!(array.cached_chunk_count(), 16);
    let prefetched = array.read_elements::<f64>(&[0, 0], &[16, 16]).unwrap();
    assert_eq!(fresh, prefetched);
}

#[test]
fn advise_read_rejects_oversized_windows() {
    let options = StoreOpenOptions {
        cache_size: 1024, // far below one chunk row
        ..StoreOpenOptions::default()
    };
    let store =
        Store::create_with_store(Arc::new(MemoryStore::new()), options).unwrap();
    let array = store
        .root_group()
        .create_array(
            "budget",
            &[64, 64],
            ArrayCreateOptions {
                chunk_shape: Some(vec![8, 8]),
                data_type: DataType::Float64,
                fill_value: Some(FillValue::from(0f64)),
                ..Default::default()
            },
        )
        .unwrap();
    let err = array.advise_read(&[0, 0], &[64, 64], None).unwrap_err();
    assert!(matches!(err, mdzarr::ZarrError::OutOfMemory(_)), "{err}");
}

#[test]
fn advise_read_progress_abort() {
    let store = Store::create_with_store(
        Arc::new(MemoryStore::new()),
        StoreOpenOptions::default(),
    )
    .unwrap();
    let array = store
        .root_group()
        .create_array(
            "aborted",
            &[32, 32],
            ArrayCreateOptions {
                chunk_shape: Some(vec![4, 4]),
                data_type: DataType::UInt8,
                fill_value: Some(FillValue::from(0u8)),
                ..Default::default()
            },
        )
        .unwrap();
    let calls = AtomicU64::new(0);
    let callback = |_fraction: f64| {
        calls.fetch_add(1, Ordering::Relaxed);
        false
    };
    let err = array
        .advise_read(&[0, 0], &[32, 32], Some(&callback))
        .unwrap_err();
    assert!(matches!(err, mdzarr::ZarrError::Interrupted), "{err}");
    assert!(calls.load(Ordering::Relaxed) > 0);
}

#[test]
fn advise_read_sharded_batches_by_shard() {
    let options = StoreOpenOptions {
        num_threads: 2,
        create_version: ZarrVersion::V3,
        ..StoreOpenOptions::default()
    };
    let store =
        Store::create_with_store(Arc::new(MemoryStore::new()), options).unwrap();
    let array = store
        .root_group()
        .create_array(
            "shards",
            &[8, 8],
            ArrayCreateOptions {
                chunk_shape: Some(vec![4, 4]),
                inner_chunk_shape: Some(vec![2, 2]),
                data_type: DataType::Int16,
                fill_value: Some(FillValue::from(0i16)),
                ..Default::default()
            },
        )
        .unwrap();
    let values: Vec<i16> = (0..64).collect();
    array.write_elements::<i16>(&[0, 0], &[8, 8], &values).unwrap();
    array.flush().unwrap();

    array.advise_read(&[0, 0], &[8, 8], None).unwrap();
    // 16 inner chunks across 4 shards.
    assert_eq!(array.cached_chunk_count(), 16);
    assert_eq!(
        array.read_elements::<i16>(&[0, 0], &[8, 8]).unwrap(),
        values
    );
}

#[test]
fn tile_presence_matches_blob_existence() {
    let store = Store::create_with_store(
        Arc::new(MemoryStore::new()),
        StoreOpenOptions::default(),
    )
    .unwrap();
    let array = store
        .root_group()
        .create_array(
            "presence",
            &[8, 8],
            ArrayCreateOptions {
                chunk_shape: Some(vec![4, 4]),
                data_type: DataType::Int32,
                fill_value: Some(FillValue::from(0i32)),
                ..Default::default()
            },
        )
        .unwrap();
    array
        .write_elements::<i32>(&[0, 0], &[4, 4], &[3; 16])
        .unwrap();
    array
        .write_elements::<i32>(&[4, 4], &[4, 4], &[4; 16])
        .unwrap();
    array.flush().unwrap();

    assert_eq!(
        array.cache_tile_presence().unwrap(),
        FillingStatus::SomeTilesMissing
    );
    // Presence agrees with blob existence for every chunk.
    for indices in [[0u64, 0], [0, 1], [1, 0], [1, 1]] {
        let exists = array.raw_chunk_info(&indices).unwrap().exists;
        let expected = indices == [0, 0] || indices == [1, 1];
        assert_eq!(exists, expected, "{indices:?}");
    }

    // Known-missing chunks short-circuit to fill without store access.
    assert_eq!(
        array.read_elements::<i32>(&[0, 4], &[4, 4]).unwrap(),
        vec![0; 16]
    );
}

#[test]
fn tile_presence_full_and_empty() {
    let store = Store::create_with_store(
        Arc::new(MemoryStore::new()),
        StoreOpenOptions::default(),
    )
    .unwrap();
    let root = store.root_group();
    let empty = root
        .create_array(
            "empty",
            &[4],
            ArrayCreateOptions {
                chunk_shape: Some(vec![2]),
                data_type: DataType::UInt8,
                fill_value: Some(FillValue::from(0u8)),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(
        empty.cache_tile_presence().unwrap(),
        FillingStatus::NoTilePresent
    );

    let full = root
        .create_array(
            "full",
            &[4],
            ArrayCreateOptions {
                chunk_shape: Some(vec![2]),
                data_type: DataType::UInt8,
                fill_value: Some(FillValue::from(9u8)),
                ..Default::default()
            },
        )
        .unwrap();
    full.write_elements::<u8>(&[0], &[4], &[1, 2, 3, 4]).unwrap();
    full.flush().unwrap();
    assert_eq!(
        full.cache_tile_presence().unwrap(),
        FillingStatus::AllTilesPresent
    );
}
