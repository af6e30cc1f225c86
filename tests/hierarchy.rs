use std::sync::Arc;

use mdzarr::array::{ArrayCreateOptions, DataType, FillValue};
use mdzarr::config::StoreOpenOptions;
use mdzarr::dimension::{DimensionDirection, DimensionType};
use mdzarr::storage::{ByteStore, MemoryStore};
use mdzarr::store::Store;

fn memory_store() -> (Arc<MemoryStore>, Store) {
    let memory = Arc::new(MemoryStore::new());
    let store =
        Store::create_with_store(memory.clone(), StoreOpenOptions::default()).unwrap();
    (memory, store)
}

fn simple_options(data_type: DataType, chunk: Vec<u64>) -> ArrayCreateOptions {
    ArrayCreateOptions {
        chunk_shape: Some(chunk),
        data_type,
        ..Default::default()
    }
}

#[test]
fn group_tree_create_and_enumerate() {
    let (_, store) = memory_store();
    let root = store.root_group();
    let child = root.create_group("child").unwrap();
    child.create_group("nested").unwrap();
    child
        .create_array("data", &[4], simple_options(DataType::Int32, vec![2]))
        .unwrap();

    assert_eq!(root.group_names().unwrap(), vec!["child".to_string()]);
    assert_eq!(child.group_names().unwrap(), vec!["nested".to_string()]);
    assert_eq!(child.array_names().unwrap(), vec!["data".to_string()]);
    assert_eq!(child.path().as_str(), "/child");
    assert_eq!(
        child.open_array("data").unwrap().path().as_str(),
        "/child/data"
    );
    assert!(child.parent().unwrap().path().as_str() == "/");
}

#[test]
fn names_must_be_valid_and_unique() {
    let (_, store) = memory_store();
    let root = store.root_group();
    root.create_group("taken").unwrap();

    // Collisions across groups and arrays.
    assert!(root.create_group("taken").is_err());
    assert!(
        root.create_array("taken", &[2], simple_options(DataType::UInt8, vec![2]))
            .is_err()
    );

    // Validity: empty, slashes, backslashes, colons, `.z` prefix.
    for name in ["", "a/b", "a\\b", "a:b", ".zarray", ".zfoo"] {
        assert!(root.create_group(name).is_err(), "{name:?} accepted");
    }
}

#[test]
fn delete_invalidates_handles() {
    let (memory, store) = memory_store();
    let root = store.root_group();
    let array = root
        .create_array("doomed", &[4], simple_options(DataType::Int32, vec![2]))
        .unwrap();
    array.write_elements::<i32>(&[0], &[4], &[1, 2, 3, 4]).unwrap();
    array.flush().unwrap();

    root.delete_array("doomed").unwrap();
    let err = array.read_elements::<i32>(&[0], &[4]).unwrap_err();
    assert!(matches!(err, mdzarr::ZarrError::NotFound(_)), "{err}");
    assert!(root.open_array("doomed").is_err());
    assert!(memory.get(&"doomed/.zarray".try_into().unwrap()).unwrap().is_none());

    // Deleting a group invalidates its whole subtree.
    let group = root.create_group("tree").unwrap();
    let nested = group
        .create_array("leaf", &[2], simple_options(DataType::UInt8, vec![2]))
        .unwrap();
    root.delete_group("tree").unwrap();
    assert!(matches!(
        nested.read_elements::<u8>(&[0], &[2]).unwrap_err(),
        mdzarr::ZarrError::NotFound(_)
    ));
    assert!(group.open_array("leaf").is_err());
}

#[test]
fn rename_array_moves_data() {
    let (memory, store) = memory_store();
    let root = store.root_group();
    let array = root
        .create_array("before", &[4], simple_options(DataType::Int32, vec![2]))
        .unwrap();
    array.write_elements::<i32>(&[0], &[4], &[9, 8, 7, 6]).unwrap();
    array.flush().unwrap();

    root.rename_array("before", "after").unwrap();
    assert!(memory.get(&"before/.zarray".try_into().unwrap()).unwrap().is_none());
    assert!(memory.get(&"after/.zarray".try_into().unwrap()).unwrap().is_some());

    let renamed = root.open_array("after").unwrap();
    assert_eq!(
        renamed.read_elements::<i32>(&[0], &[4]).unwrap(),
        vec![9, 8, 7, 6]
    );
    assert!(root.open_array("before").is_err());

    // Renaming onto an existing name is rejected.
    root.create_array("occupied", &[2], simple_options(DataType::UInt8, vec![2]))
        .unwrap();
    assert!(root.rename_array("after", "occupied").is_err());
}

#[test]
fn dimensions_and_indexing_variables() {
    let (_, store) = memory_store();
    let root = store.root_group();
    let dim = root
        .create_dimension("x", Some(DimensionType::HorizontalX), Some(DimensionDirection::East), 4)
        .unwrap();
    assert_eq!(dim.read().name(), "x");
    assert_eq!(dim.read().size(), 4);
    assert!(dim.read().indexing_variable().is_none());

    // A same-named rank-1 array of matching size auto-attaches as the indexing variable.
    let coords = root
        .create_array("x", &[4], simple_options(DataType::Float64, vec![4]))
        .unwrap();
    coords
        .write_elements::<f64>(&[0], &[4], &[0.0, 0.5, 1.0, 1.5])
        .unwrap();
    let indexing = dim.read().indexing_variable().unwrap();
    assert_eq!(indexing.path().as_str(), "/x");

    // Duplicate dimension names are rejected.
    assert!(root.create_dimension("x", None, None, 9).is_err());
}

#[test]
fn xarray_dimensions_rename_carries_through_arrays() {
    let (memory, store) = memory_store();
    let root = store.root_group();
    root.create_array(
        "data",
        &[3, 5],
        ArrayCreateOptions {
            chunk_shape: Some(vec![3, 5]),
            data_type: DataType::Int32,
            fill_value: Some(FillValue::from(0i32)),
            dimension_names: Some(vec!["row".to_string(), "col".to_string()]),
            ..Default::default()
        },
    )
    .unwrap();
    store.flush().unwrap();

    // `_ARRAY_DIMENSIONS` is written for V2 arrays with named dimensions.
    let attrs: serde_json::Value = serde_json::from_slice(
        &memory.get(&"data/.zattrs".try_into().unwrap()).unwrap().unwrap(),
    )
    .unwrap();
    assert_eq!(attrs["_ARRAY_DIMENSIONS"][0], "row");
    assert_eq!(attrs["_ARRAY_DIMENSIONS"][1], "col");

    // Renaming the dimension carries through the array metadata on the next flush.
    root.rename_dimension("row", "y").unwrap();
    store.flush().unwrap();
    let attrs: serde_json::Value = serde_json::from_slice(
        &memory.get(&"data/.zattrs".try_into().unwrap()).unwrap().unwrap(),
    )
    .unwrap();
    assert_eq!(attrs["_ARRAY_DIMENSIONS"][0], "y");

    // Local (synthesized) dimensions cannot be renamed.
    let plain = root
        .create_array("plain", &[2], simple_options(DataType::UInt8, vec![2]))
        .unwrap();
    assert!(plain.dimensions()[0].write().rename("t").is_err());
}

#[test]
fn xarray_dimensions_bind_on_open() {
    let (memory, store) = memory_store();
    {
        let root = store.root_group();
        root.create_array(
            "a",
            &[4, 6],
            ArrayCreateOptions {
                chunk_shape: Some(vec![2, 3]),
                data_type: DataType::Int16,
                fill_value: Some(FillValue::from(0i16)),
                dimension_names: Some(vec!["y".to_string(), "x".to_string()]),
                ..Default::default()
            },
        )
        .unwrap();
        store.close().unwrap();
    }

    let store = Store::open_with_store(memory, StoreOpenOptions::default()).unwrap();
    let root = store.root_group();
    let array = root.open_array("a").unwrap();
    assert!(array.is_xarray_named());
    assert_eq!(array.dimensions()[0].read().name(), "y");
    assert_eq!(array.dimensions()[1].read().name(), "x");
    // The dimensions registered with the group.
    assert!(root.dimension("y").is_some());
    assert!(root.dimension("x").is_some());
    // `_ARRAY_DIMENSIONS` was consumed from the user attributes.
    assert!(!array.attributes().contains_key("_ARRAY_DIMENSIONS"));
}

#[test]
fn cf_attributes_are_lifted_and_consumed() {
    let memory = Arc::new(MemoryStore::new());
    {
        let store =
            Store::create_with_store(memory.clone(), StoreOpenOptions::default()).unwrap();
        let mut attributes = serde_json::Map::new();
        attributes.insert("units".to_string(), serde_json::json!("K"));
        attributes.insert("add_offset".to_string(), serde_json::json!(273.15));
        attributes.insert("scale_factor".to_string(), serde_json::json!(0.01));
        attributes.insert("comment".to_string(), serde_json::json!("kept"));
        store
            .root_group()
            .create_array(
                "temp",
                &[4],
                ArrayCreateOptions {
                    chunk_shape: Some(vec![2]),
                    data_type: DataType::Int16,
                    fill_value: Some(FillValue::from(0i16)),
                    attributes,
                    ..Default::default()
                },
            )
            .unwrap();
        store.close().unwrap();
    }

    let store = Store::open_with_store(memory, StoreOpenOptions::default()).unwrap();
    let array = store.root_group().open_array("temp").unwrap();
    assert_eq!(array.unit(), Some("K".to_string()));
    assert_eq!(array.offset(), Some(273.15));
    assert_eq!(array.scale(), Some(0.01));
    // Consumed tags are hidden; user attributes remain.
    let attributes = array.attributes();
    assert!(!attributes.contains_key("units"));
    assert!(!attributes.contains_key("add_offset"));
    assert!(!attributes.contains_key("scale_factor"));
    assert_eq!(attributes["comment"], "kept");
}

#[test]
fn cf_axis_attributes_type_dimensions() {
    let memory = Arc::new(MemoryStore::new());
    {
        let store =
            Store::create_with_store(memory.clone(), StoreOpenOptions::default()).unwrap();
        let mut attributes = serde_json::Map::new();
        attributes.insert("axis".to_string(), serde_json::json!("T"));
        store
            .root_group()
            .create_array(
                "time",
                &[8],
                ArrayCreateOptions {
                    chunk_shape: Some(vec![8]),
                    data_type: DataType::Float64,
                    dimension_names: Some(vec!["time".to_string()]),
                    attributes,
                    ..Default::default()
                },
            )
            .unwrap();
        store.close().unwrap();
    }

    let store = Store::open_with_store(memory, StoreOpenOptions::default()).unwrap();
    let array = store.root_group().open_array("time").unwrap();
    assert_eq!(
        array.dimensions()[0].read().dim_type(),
        Some(DimensionType::Temporal)
    );
}

#[test]
fn geo_conventions_lift_crs_and_transform() {
    let memory = Arc::new(MemoryStore::new());
    {
        let store =
            Store::create_with_store(memory.clone(), StoreOpenOptions::default()).unwrap();
        let mut attributes = serde_json::Map::new();
        attributes.insert("proj:epsg".to_string(), serde_json::json!(32633));
        attributes.insert(
            "spatial:transform".to_string(),
            serde_json::json!([440720.0, 60.0, 0.0, 3751320.0, 0.0, -60.0]),
        );
        store
            .root_group()
            .create_array(
                "raster",
                &[4, 6],
                ArrayCreateOptions {
                    chunk_shape: Some(vec![4, 6]),
                    data_type: DataType::UInt16,
                    dimension_names: Some(vec!["y".to_string(), "x".to_string()]),
                    attributes,
                    ..Default::default()
                },
            )
            .unwrap();
        store.close().unwrap();
    }

    let store = Store::open_with_store(memory, StoreOpenOptions::default()).unwrap();
    let array = store.root_group().open_array("raster").unwrap();
    assert_eq!(
        array.crs(),
        Some(mdzarr::array::CrsDefinition::Epsg(32633))
    );
    assert_eq!(
        array.geotransform(),
        Some([440_720.0, 60.0, 0.0, 3_751_320.0, 0.0, -60.0])
    );
    // Regular pixel-center coordinates synthesized on the X/Y dimensions.
    let x = array.dimensions()[1].read();
    assert_eq!(x.regular_coordinates(), Some((440_750.0, 60.0)));
    assert_eq!(x.dim_type(), Some(DimensionType::HorizontalX));
    let y = array.dimensions()[0].read();
    assert_eq!(y.regular_coordinates(), Some((3_751_290.0, -60.0)));
}

#[test]
fn statistics_write_back_actual_range() {
    let (memory, store) = memory_store();
    let array = store
        .root_group()
        .create_array("stats", &[4], simple_options(DataType::Float32, vec![4]))
        .unwrap();
    array.set_statistics(-4.0, 19.5).unwrap();
    store.flush().unwrap();

    let attrs: serde_json::Value = serde_json::from_slice(
        &memory.get(&"stats/.zattrs".try_into().unwrap()).unwrap().unwrap(),
    )
    .unwrap();
    assert_eq!(attrs["actual_range"][0], -4.0);
    assert_eq!(attrs["actual_range"][1], 19.5);
}

#[test]
fn complex_and_half_float_roundtrip() {
    let (_, store) = memory_store();
    let root = store.root_group();

    let complex = root
        .create_array(
            "complex",
            &[3],
            ArrayCreateOptions {
                chunk_shape: Some(vec![3]),
                data_type: DataType::Complex128,
                fill_value: Some(FillValue::from(num_complex::Complex64::new(f64::NAN, 1.0))),
                ..Default::default()
            },
        )
        .unwrap();
    let values = [
        num_complex::Complex64::new(1.0, -2.0),
        num_complex::Complex64::new(0.5, 0.25),
        num_complex::Complex64::new(-3.0, 4.0),
    ];
    complex
        .write_elements::<num_complex::Complex64>(&[0], &[3], &values)
        .unwrap();
    assert_eq!(
        complex
            .read_elements::<num_complex::Complex64>(&[0], &[3])
            .unwrap(),
        values
    );
    // Complex to real conversion takes the real component.
    assert_eq!(
        complex.read_elements::<f64>(&[0], &[3]).unwrap(),
        vec![1.0, 0.5, -3.0]
    );

    let half = root
        .create_array(
            "half",
            &[4],
            ArrayCreateOptions {
                chunk_shape: Some(vec![2]),
                data_type: DataType::Float16,
                fill_value: Some(FillValue::from(half::f16::from_f32(-1.0))),
                ..Default::default()
            },
        )
        .unwrap();
    let values: Vec<half::f16> = [0.5f32, 1.5, -2.0, 8.0]
        .iter()
        .map(|&v| half::f16::from_f32(v))
        .collect();
    half.write_elements::<half::f16>(&[0], &[4], &values).unwrap();
    assert_eq!(
        half.read_elements::<half::f16>(&[0], &[4]).unwrap(),
        values
    );
    assert_eq!(
        half.read_elements::<f32>(&[0], &[4]).unwrap(),
        vec![0.5, 1.5, -2.0, 8.0]
    );
}

#[test]
fn group_attributes_roundtrip() {
    let (memory, store) = memory_store();
    let root = store.root_group();
    let group = root.create_group("annotated").unwrap();
    group
        .set_attribute("description", serde_json::json!("measurements"))
        .unwrap();
    group.set_attribute("version", serde_json::json!(3)).unwrap();
    assert!(group.delete_attribute("version").unwrap());
    assert!(!group.delete_attribute("version").unwrap());
    store.close().unwrap();

    let store = Store::open_with_store(memory, StoreOpenOptions::default()).unwrap();
    let group = store.root_group().open_group("annotated").unwrap();
    assert_eq!(group.attributes()["description"], "measurements");
    assert!(!group.attributes().contains_key("version"));
}

#[test]
fn coordinate_regularity_is_memoized() {
    let (_, store) = memory_store();
    let root = store.root_group();
    let coords = root
        .create_array("lon", &[5], simple_options(DataType::Float64, vec![5]))
        .unwrap();
    coords
        .write_elements::<f64>(&[0], &[5], &[10.0, 10.5, 11.0, 11.5, 12.0])
        .unwrap();
    let regularity = coords.coordinate_regularity().unwrap();
    assert!(regularity.regular);
    assert_eq!(regularity.start, 10.0);
    assert_eq!(regularity.step, 0.5);

    // Memoized: mutating the values does not change the cached answer until cleared.
    coords
        .write_elements::<f64>(&[0], &[5], &[0.0, 1.0, 5.0, 6.0, 7.0])
        .unwrap();
    assert!(coords.coordinate_regularity().unwrap().regular);
    store.context().clear_coordinate_regularity();
    assert!(!coords.coordinate_regularity().unwrap().regular);

    let irregular = root
        .create_array("t", &[3], simple_options(DataType::Float32, vec![3]))
        .unwrap();
    irregular
        .write_elements::<f32>(&[0], &[3], &[0.0, 1.0, 10.0])
        .unwrap();
    assert!(!irregular.coordinate_regularity().unwrap().regular);

    // Not a coordinate array.
    let grid = root
        .create_array("grid2", &[2, 2], simple_options(DataType::Int32, vec![2, 2]))
        .unwrap();
    assert!(grid.coordinate_regularity().is_err());
}
