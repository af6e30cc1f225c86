use std::sync::Arc;

use mdzarr::array::{ArrayCreateOptions, DataType, FillValue};
use mdzarr::config::{CompressOption, FilterOption, StoreOpenOptions};
use mdzarr::storage::{ByteStore, MemoryStore};
use mdzarr::store::Store;

fn v2_store(path: &std::path::Path) -> Store {
    Store::create(path, StoreOpenOptions::default()).unwrap()
}

#[test]
fn v2_partial_write_and_full_read() {
    // A 4x6 int32 array with 2x3 chunks and fill -1; write a 2x3 block at [1, 1].
    let tmp = tempfile::TempDir::new().unwrap();
    let store = v2_store(tmp.path());
    let array = store
        .root_group()
        .create_array(
            "a",
            &[4, 6],
            ArrayCreateOptions {
                chunk_shape: Some(vec![2, 3]),
                data_type: DataType::Int32,
                fill_value: Some(FillValue::from(-1i32)),
                ..Default::default()
            },
        )
        .unwrap();
    array
        .write_elements::<i32>(&[1, 1], &[2, 3], &[10, 11, 12, 20, 21, 22])
        .unwrap();

    let full = array.read_elements::<i32>(&[0, 0], &[4, 6]).unwrap();
    #[rustfmt::skip]
    assert_eq!(
        full,
        vec![
            -1, -1, -1, -1, -1, -1,
            -1, 10, 11, 12, -1, -1,
            -1, 20, 21, 22, -1, -1,
            -1, -1, -1, -1, -1, -1,
        ]
    );

    store.close().unwrap();

    // Only the chunks holding written values exist, under the default `.` separator.
    for name in ["0.0", "0.1", "1.0", "1.1"] {
        assert!(tmp.path().join("a").join(name).exists(), "{name} missing");
    }
    assert!(!tmp.path().join("a").join("0.2").exists());
    assert!(tmp.path().join("a").join(".zarray").exists());

    // Reopen and verify.
    let store = Store::open(tmp.path(), StoreOpenOptions::default()).unwrap();
    let array = store.root_group().open_array("a").unwrap();
    assert_eq!(array.data_type(), &DataType::Int32);
    assert_eq!(array.shape(), vec![4, 6]);
    let row = array.read_elements::<i32>(&[1, 0], &[1, 6]).unwrap();
    assert_eq!(row, vec![-1, 10, 11, 12, -1, -1]);
}

#[test]
fn v2_shuffle_filter_then_gzip_compressor() {
    // Scenario: shuffle (elementsize 4) filter, gzip compressor, 1024 ascending int32.
    let tmp = tempfile::TempDir::new().unwrap();
    let store = v2_store(tmp.path());
    let array = store
        .root_group()
        .create_array(
            "shuffled",
            &[1024],
            ArrayCreateOptions {
                chunk_shape: Some(vec![256]),
                data_type: DataType::Int32,
                fill_value: Some(FillValue::from(0i32)),
                compressor: CompressOption::Gzip,
                filter: FilterOption::Shuffle,
                ..Default::default()
            },
        )
        .unwrap();
    let values: Vec<i32> = (0..1024).collect();
    array.write_elements::<i32>(&[0], &[1024], &values).unwrap();
    store.close().unwrap();

    // The filters array on disk names shuffle first; the compressor is gzip.
    let document: serde_json::Value = serde_json::from_slice(
        &std::fs::read(tmp.path().join("shuffled").join(".zarray")).unwrap(),
    )
    .unwrap();
    assert_eq!(document["filters"][0]["id"], "shuffle");
    assert_eq!(document["filters"][0]["elementsize"], 4);
    assert_eq!(document["compressor"]["id"], "gzip");

    let store = Store::open(tmp.path(), StoreOpenOptions::default()).unwrap();
    let array = store.root_group().open_array("shuffled").unwrap();
    assert_eq!(
        array.read_elements::<i32>(&[0], &[1024]).unwrap(),
        values
    );
}

#[test]
fn fill_invariance_without_declared_fill() {
    // An unwritten chunk of an array with no fill value reads as zero.
    let store = Store::create_with_store(
        Arc::new(MemoryStore::new()),
        StoreOpenOptions::default(),
    )
    .unwrap();
    let array = store
        .root_group()
        .create_array(
            "zeros",
            &[6],
            ArrayCreateOptions {
                chunk_shape: Some(vec![3]),
                data_type: DataType::Float64,
                fill_value: None,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(
        array.read_elements::<f64>(&[0], &[6]).unwrap(),
        vec![0.0; 6]
    );
}

#[test]
fn read_after_write_strided() {
    let store = Store::create_with_store(
        Arc::new(MemoryStore::new()),
        StoreOpenOptions::default(),
    )
    .unwrap();
    let array = store
        .root_group()
        .create_array(
            "grid",
            &[8, 8],
            ArrayCreateOptions {
                chunk_shape: Some(vec![3, 3]),
                data_type: DataType::UInt16,
                fill_value: Some(FillValue::from(9999u16)),
                ..Default::default()
            },
        )
        .unwrap();

    // Write every second element of every second row.
    let values: Vec<u16> = (0..16).collect();
    let buffer: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
    array
        .write(&[0, 0], &[4, 4], &[2, 2], &[4, 1], &DataType::UInt16, &buffer)
        .unwrap();

    let mut out = vec![0u8; 16 * 2];
    array
        .read(&[0, 0], &[4, 4], &[2, 2], &[4, 1], &DataType::UInt16, &mut out)
        .unwrap();
    let out: Vec<u16> = out
        .chunks_exact(2)
        .map(|b| u16::from_ne_bytes(b.try_into().unwrap()))
        .collect();
    assert_eq!(out, values);

    // The skipped elements are fill.
    assert_eq!(array.read_elements::<u16>(&[0, 1], &[1, 1]).unwrap(), vec![9999]);
    assert_eq!(array.read_elements::<u16>(&[1, 0], &[1, 1]).unwrap(), vec![9999]);
}

#[test]
fn negative_step_equivalence() {
    let store = Store::create_with_store(
        Arc::new(MemoryStore::new()),
        StoreOpenOptions::default(),
    )
    .unwrap();
    let array = store
        .root_group()
        .create_array(
            "steps",
            &[16],
            ArrayCreateOptions {
                chunk_shape: Some(vec![5]),
                data_type: DataType::Int64,
                fill_value: Some(FillValue::from(-7i64)),
                ..Default::default()
            },
        )
        .unwrap();
    let values: Vec<i64> = (0..16).map(|v| v * v).collect();
    array.write_elements::<i64>(&[0], &[16], &values).unwrap();

    // read(origin, count, +step) forwards equals read(origin + (count-1)*step, -step)
    // into the reversed buffer.
    for (origin, count, step) in [(1u64, 5u64, 3i64), (0, 8, 2), (2, 7, 1)] {
        let mut forward = vec![0u8; count as usize * 8];
        array
            .read(&[origin], &[count], &[step], &[1], &DataType::Int64, &mut forward)
            .unwrap();
        let forward: Vec<i64> = forward
            .chunks_exact(8)
            .map(|b| i64::from_ne_bytes(b.try_into().unwrap()))
            .collect();

        let reverse_origin = origin + (count - 1) * step.unsigned_abs();
        let mut reverse = vec![0u8; count as usize * 8];
        array
            .read(
                &[reverse_origin],
                &[count],
                &[-step],
                &[1],
                &DataType::Int64,
                &mut reverse,
            )
            .unwrap();
        let mut reverse: Vec<i64> = reverse
            .chunks_exact(8)
            .map(|b| i64::from_ne_bytes(b.try_into().unwrap()))
            .collect();
        reverse.reverse();
        assert_eq!(forward, reverse, "origin {origin} count {count} step {step}");
    }
}

#[test]
fn data_type_conversion_on_read() {
    let store = Store::create_with_store(
        Arc::new(MemoryStore::new()),
        StoreOpenOptions::default(),
    )
    .unwrap();
    let array = store
        .root_group()
        .create_array(
            "converted",
            &[4],
            ArrayCreateOptions {
                chunk_shape: Some(vec![4]),
                data_type: DataType::Int16,
                fill_value: Some(FillValue::from(-1i16)),
                ..Default::default()
            },
        )
        .unwrap();
    array
        .write_elements::<i16>(&[0], &[4], &[-300, 0, 300, 42])
        .unwrap();

    // Widening conversion.
    assert_eq!(
        array.read_elements::<f64>(&[0], &[4]).unwrap(),
        vec![-300.0, 0.0, 300.0, 42.0]
    );
    // Narrowing conversion clamps.
    assert_eq!(
        array.read_elements::<u8>(&[0], &[4]).unwrap(),
        vec![0, 0, 255, 42]
    );
}

#[test]
fn resize_preserves_data() {
    let tmp = tempfile::TempDir::new().unwrap();
    let store = v2_store(tmp.path());
    let array = store
        .root_group()
        .create_array(
            "growing",
            &[4],
            ArrayCreateOptions {
                chunk_shape: Some(vec![2]),
                data_type: DataType::Int32,
                fill_value: Some(FillValue::from(0i32)),
                ..Default::default()
            },
        )
        .unwrap();
    array.write_elements::<i32>(&[0], &[4], &[1, 2, 3, 4]).unwrap();

    array.resize(&[8]).unwrap();
    assert_eq!(array.shape(), vec![8]);
    assert_eq!(
        array.read_elements::<i32>(&[0], &[8]).unwrap(),
        vec![1, 2, 3, 4, 0, 0, 0, 0]
    );
    array.write_elements::<i32>(&[6], &[2], &[7, 8]).unwrap();
    assert_eq!(
        array.read_elements::<i32>(&[0], &[8]).unwrap(),
        vec![1, 2, 3, 4, 0, 0, 7, 8]
    );

    // Shrinking is rejected.
    assert!(array.resize(&[4]).is_err());

    store.close().unwrap();
    let document: serde_json::Value = serde_json::from_slice(
        &std::fs::read(tmp.path().join("growing").join(".zarray")).unwrap(),
    )
    .unwrap();
    assert_eq!(document["shape"][0], 8);
}

#[test]
fn v2_string_arrays() {
    let store = Store::create_with_store(
        Arc::new(MemoryStore::new()),
        StoreOpenOptions::default(),
    )
    .unwrap();
    let array = store
        .root_group()
        .create_array(
            "names",
            &[3],
            ArrayCreateOptions {
                chunk_shape: Some(vec![3]),
                data_type: DataType::Ascii(8),
                ..Default::default()
            },
        )
        .unwrap();
    array
        .write_string_elements(
            &[0],
            &[3],
            &["alpha".to_string(), "beta".to_string(), String::new()],
        )
        .unwrap();
    assert_eq!(
        array.read_string_elements(&[0], &[3]).unwrap(),
        vec!["alpha".to_string(), "beta".to_string(), String::new()]
    );

    let unicode = store
        .root_group()
        .create_array(
            "unicode",
            &[2],
            ArrayCreateOptions {
                chunk_shape: Some(vec![2]),
                data_type: DataType::Unicode(4),
                ..Default::default()
            },
        )
        .unwrap();
    unicode
        .write_string_elements(&[0], &[2], &["héllo".to_string(), "zàrr".to_string()])
        .unwrap();
    // "héllo" truncates to the 4 code unit width.
    assert_eq!(
        unicode.read_string_elements(&[0], &[2]).unwrap(),
        vec!["héll".to_string(), "zàrr".to_string()]
    );
}

#[test]
fn raw_chunk_info_unsharded() {
    let store = Store::create_with_store(
        Arc::new(MemoryStore::new()),
        StoreOpenOptions::default(),
    )
    .unwrap();
    let array = store
        .root_group()
        .create_array(
            "raw",
            &[4],
            ArrayCreateOptions {
                chunk_shape: Some(vec![2]),
                data_type: DataType::UInt8,
                fill_value: Some(FillValue::from(0u8)),
                ..Default::default()
            },
        )
        .unwrap();
    array.write_elements::<u8>(&[0], &[2], &[1, 2]).unwrap();
    array.flush().unwrap();

    let info = array.raw_chunk_info(&[0]).unwrap();
    assert!(info.exists);
    assert_eq!(info.key.as_str(), "raw/0");
    assert_eq!(info.offset, 0);
    assert_eq!(info.length, 2);

    let info = array.raw_chunk_info(&[1]).unwrap();
    assert!(!info.exists);
}

#[test]
fn fill_valued_chunk_is_erased() {
    let memory = Arc::new(MemoryStore::new());
    let store =
        Store::create_with_store(memory.clone(), StoreOpenOptions::default()).unwrap();
    let array = store
        .root_group()
        .create_array(
            "erased",
            &[4],
            ArrayCreateOptions {
                chunk_shape: Some(vec![2]),
                data_type: DataType::Int32,
                fill_value: Some(FillValue::from(-1i32)),
                ..Default::default()
            },
        )
        .unwrap();
    array.write_elements::<i32>(&[0], &[2], &[5, 6]).unwrap();
    array.flush().unwrap();
    let key = "erased/0".try_into().unwrap();
    assert!(memory.get(&key).unwrap().is_some());

    // Overwriting with the fill value removes the blob.
    array.write_elements::<i32>(&[0], &[2], &[-1, -1]).unwrap();
    array.flush().unwrap();
    assert!(memory.get(&key).unwrap().is_none());
    assert_eq!(
        array.read_elements::<i32>(&[0], &[2]).unwrap(),
        vec![-1, -1]
    );
}
