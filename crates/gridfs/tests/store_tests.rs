// Storing files: chunk layout, metadata merge and argument checks.

mod common;

use bytes::Bytes;
use common::{chunk_lengths, count_chunks, memory_store, seeded_bytes};
use gridstore_core::{FileStoreConfig, Value, doc};
use gridstore_docstore::Database;
use gridstore_gridfs::{GridFsError, StoreOptions};

#[tokio::test]
async fn test_store_600000_bytes_default_chunk_size() {
    let (db, store) = memory_store(FileStoreConfig::default());
    let data = seeded_bytes(1, 600_000);

    let id = store
        .store_bytes(data.clone(), doc! { "filename" => "big.bin" }, &StoreOptions::default())
        .await
        .expect("store failed");

    assert_eq!(
        chunk_lengths(db.as_ref(), "fs", &id).await,
        vec![262_144, 262_144, 75_712]
    );

    let file = store.get(id).await.unwrap().expect("file missing");
    assert_eq!(file.size(), Some(600_000));
    assert_eq!(file.chunk_size(), Some(262_144));
    assert_eq!(file.name(), Some("big.bin"));
    assert_eq!(file.read_all_bytes().await.unwrap(), data);
}

#[tokio::test]
async fn test_round_trip_across_lengths_and_chunk_sizes() {
    let (db, store) = memory_store(FileStoreConfig::default());

    for (len, chunk_size) in [(0usize, 4u32), (1, 4), (4, 4), (5, 4), (1000, 7), (4096, 1024)] {
        let data = seeded_bytes(len as u64, len);
        let id = store
            .store_bytes(data.clone(), doc! {}, &StoreOptions::with_chunk_size(chunk_size))
            .await
            .expect("store failed");

        let lengths = chunk_lengths(db.as_ref(), "fs", &id).await;
        let expected_chunks = (len as u64).div_ceil(u64::from(chunk_size)) as usize;
        assert_eq!(lengths.len(), expected_chunks, "len={len} chunk_size={chunk_size}");
        assert!(lengths.iter().all(|l| *l <= chunk_size as usize));
        assert_eq!(lengths.iter().sum::<usize>(), len);

        let file = store.get(id).await.unwrap().unwrap();
        assert_eq!(file.read_all_bytes().await.unwrap(), data);
    }
}

#[tokio::test]
async fn test_system_fields_and_extra_fields() {
    let (_db, store) = memory_store(FileStoreConfig::default());

    let id = store
        .store_bytes(
            Bytes::from_static(b"hello world"),
            doc! { "filename" => "hello.txt", "owner" => "alice", "tags" => vec![Value::from("a")] },
            &StoreOptions::default(),
        )
        .await
        .unwrap();
    assert!(matches!(id, Value::ObjectId(_)));

    let file = store.get(id.clone()).await.unwrap().unwrap();
    let metadata = file.metadata().unwrap();
    assert_eq!(metadata.id, id);
    assert_eq!(metadata.length, 11);
    assert_eq!(metadata.md5.as_deref(), Some("5eb63bbbe01eeed093cb22bb8f5acdc3"));
    assert!(metadata.upload_date.is_some());
    assert_eq!(metadata.extra.get_str("owner"), Some("alice"));
    assert!(metadata.extra.contains_key("tags"));
}

#[tokio::test]
async fn test_caller_md5_is_never_recomputed() {
    let (_db, store) = memory_store(FileStoreConfig::default());

    let id = store
        .store_bytes(
            Bytes::from_static(b"payload"),
            doc! { "md5" => "caller-supplied" },
            &StoreOptions::default(),
        )
        .await
        .unwrap();

    let file = store.get(id).await.unwrap().unwrap();
    assert_eq!(file.md5(), Some("caller-supplied"));
}

#[tokio::test]
async fn test_caller_id_and_chunk_size_are_kept() {
    let (db, store) = memory_store(FileStoreConfig::default());

    let id = store
        .store_bytes(
            seeded_bytes(3, 10),
            doc! { "_id" => "report-2024", "chunkSize" => 4 },
            &StoreOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(id, Value::from("report-2024"));
    assert_eq!(chunk_lengths(db.as_ref(), "fs", &id).await, vec![4, 4, 2]);
}

#[tokio::test]
async fn test_duplicate_caller_id_is_rejected_without_writes() {
    let (db, store) = memory_store(FileStoreConfig::default());
    let id = Value::from("taken");

    store
        .store_bytes(seeded_bytes(1, 8), doc! { "_id" => "taken" }, &StoreOptions::with_chunk_size(4))
        .await
        .unwrap();

    let err = store
        .store_bytes(seeded_bytes(2, 100), doc! { "_id" => "taken" }, &StoreOptions::with_chunk_size(4))
        .await
        .unwrap_err();

    assert!(matches!(err, GridFsError::InvalidArgument(_)), "got {err:?}");
    // The first file is untouched.
    assert_eq!(count_chunks(db.as_ref(), "fs", &id).await, 2);
    let file = store.get(id).await.unwrap().unwrap();
    assert_eq!(file.read_all_bytes().await.unwrap(), seeded_bytes(1, 8));
}

#[tokio::test]
async fn test_too_large_fails_before_any_write() {
    let config = FileStoreConfig {
        max_file_length: 16,
        ..FileStoreConfig::default()
    };
    let (db, store) = memory_store(config);

    let err = store
        .store_bytes(seeded_bytes(1, 16), doc! { "_id" => "big" }, &StoreOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, GridFsError::TooLarge { length: 16, max: 16 }));
    assert_eq!(
        db.collection("fs.chunks").count(doc! {}).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn test_custom_prefix_and_default_chunk_size() {
    let config = FileStoreConfig {
        prefix: "media".to_string(),
        default_chunk_size: 1024,
        ..FileStoreConfig::default()
    };
    let (db, store) = memory_store(config);

    let id = store
        .store_bytes(seeded_bytes(5, 2500), doc! {}, &StoreOptions::default())
        .await
        .unwrap();

    assert_eq!(
        chunk_lengths(db.as_ref(), "media", &id).await,
        vec![1024, 1024, 452]
    );
    assert_eq!(db.collection("fs.chunks").count(doc! {}).await.unwrap(), 0);
    assert_eq!(db.collection("media.files").count(doc! {}).await.unwrap(), 1);
}

#[tokio::test]
async fn test_chunk_index_is_ensured_once() {
    let (db, store) = memory_store(FileStoreConfig::default());

    for seed in 0..3 {
        store
            .store_bytes(seeded_bytes(seed, 10), doc! {}, &StoreOptions::default())
            .await
            .unwrap();
    }

    let indexes = db.collection("fs.chunks").list_indexes().await.unwrap();
    let chunk_indexes: Vec<_> = indexes
        .iter()
        .filter(|index| index.name == "files_id_1_n_1")
        .collect();
    assert_eq!(chunk_indexes.len(), 1);
    assert!(chunk_indexes[0].unique);
}
