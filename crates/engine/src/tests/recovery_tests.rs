use super::*;
use crate::MEMTABLE_MAX;
use rand::prelude::*;
use tempfile::tempdir;

// --------------------- Durability round-trip ---------------------

#[test]
fn sync_then_reopen_recovers_everything() {
    let dir = tempdir().unwrap();
    let n = 100_000u64;

    {
        let engine = open_engine(dir.path(), MEMTABLE_MAX);
        for i in 0..n {
            let key = format!("key{:08}", i).into_bytes();
            let val = format!("val-{:012}", i).into_bytes(); // 16 bytes
            engine.set(key, val).unwrap();
        }
        engine.sync().unwrap();
    }

    let engine = open_engine(dir.path(), MEMTABLE_MAX);
    let mut rng = rand::thread_rng();
    for _ in 0..100 {
        let i = rng.gen_range(0..n);
        let key = format!("key{:08}", i).into_bytes();
        let expected = format!("val-{:012}", i).into_bytes();
        assert_eq!(engine.get(&key).unwrap(), Some(expected), "key {} lost", i);
    }
}

#[test]
fn abrupt_termination_recovers_from_wal() {
    let dir = tempdir().unwrap();
    let n = 50_000u64;

    {
        let engine = open_engine(dir.path(), MEMTABLE_MAX);
        for i in 0..n {
            let key = format!("key{:08}", i).into_bytes();
            engine.set(key, b"payload".to_vec()).unwrap();
        }
        // Simulate a crash: no sync, no orderly shutdown.
        std::mem::forget(engine);
    }

    let engine = open_engine(dir.path(), MEMTABLE_MAX);
    for i in 0..n {
        let key = format!("key{:08}", i).into_bytes();
        assert_eq!(
            engine.get(&key).unwrap(),
            Some(b"payload".to_vec()),
            "acknowledged write {} lost",
            i
        );
    }
}

#[test]
fn clean_shutdown_flushes_the_memtable() {
    let dir = tempdir().unwrap();

    {
        let engine = open_engine(dir.path(), MEMTABLE_MAX);
        engine.set(b"a".to_vec(), b"1".to_vec()).unwrap();
        engine.set(b"b".to_vec(), b"2".to_vec()).unwrap();
        engine.del(b"a".to_vec()).unwrap();
        // Drop drains both slots to disk.
    }

    let engine = open_engine(dir.path(), MEMTABLE_MAX);
    assert_eq!(engine.get(b"a").unwrap(), None);
    assert_eq!(engine.get(b"b").unwrap(), Some(b"2".to_vec()));
    assert!(engine.level_table_count(0) >= 1);
}

// --------------------- Sequence seeding ---------------------

#[test]
fn restart_seeds_sequence_above_loaded_tables() {
    let dir = tempdir().unwrap();

    let seq_before = {
        let engine = open_engine(dir.path(), MEMTABLE_MAX);
        engine.set(b"old".to_vec(), b"v1".to_vec()).unwrap();
        engine.sync().unwrap();
        engine.seq()
    };

    let engine = open_engine(dir.path(), MEMTABLE_MAX);
    assert!(
        engine.seq() >= seq_before,
        "counter must resume above persisted sequences"
    );

    // A new write must shadow the recovered version of the same key.
    engine.set(b"old".to_vec(), b"v2".to_vec()).unwrap();
    assert_eq!(engine.get(b"old").unwrap(), Some(b"v2".to_vec()));
}

#[test]
fn replay_preserves_operation_order() {
    let dir = tempdir().unwrap();

    {
        let engine = open_engine(dir.path(), MEMTABLE_MAX);
        engine.set(b"k".to_vec(), b"v1".to_vec()).unwrap();
        engine.del(b"k".to_vec()).unwrap();
        engine.set(b"k".to_vec(), b"v2".to_vec()).unwrap();
        engine.set(b"gone".to_vec(), b"x".to_vec()).unwrap();
        engine.del(b"gone".to_vec()).unwrap();
        std::mem::forget(engine);
    }

    let engine = open_engine(dir.path(), MEMTABLE_MAX);
    assert_eq!(engine.get(b"k").unwrap(), Some(b"v2".to_vec()));
    assert_eq!(engine.get(b"gone").unwrap(), None);
}

// --------------------- Damage tolerance ---------------------

#[test]
fn corrupt_table_index_is_skipped_not_fatal() {
    let dir = tempdir().unwrap();

    {
        let engine = open_engine(dir.path(), MEMTABLE_MAX);
        engine.set(b"k".to_vec(), b"v".to_vec()).unwrap();
        engine.sync().unwrap();
    }

    // Mangle the index of the only L0 table.
    let l0 = dir.path().join("L0");
    let index_file = std::fs::read_dir(&l0)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| p.to_string_lossy().ends_with(".sst.index"))
        .expect("flushed table must have an index");
    std::fs::write(&index_file, b"garbage").unwrap();

    let engine = open_engine(dir.path(), MEMTABLE_MAX);
    assert_eq!(engine.level_table_count(0), 0, "damaged table is quarantined");
    assert_eq!(engine.get(b"k").unwrap(), None);

    // The data file is kept for forensics.
    let data_files = std::fs::read_dir(&l0)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map_or(false, |x| x == "sst"))
        .count();
    assert_eq!(data_files, 1);
}

#[test]
fn torn_wal_tail_keeps_earlier_records() {
    let dir = tempdir().unwrap();

    {
        let engine = open_engine(dir.path(), MEMTABLE_MAX);
        engine.set(b"safe".to_vec(), b"yes".to_vec()).unwrap();
        std::mem::forget(engine);
    }

    // Crash mid-append: garbage half-record at the end of the log.
    let wal = dir.path().join("wal.log");
    let mut bytes = std::fs::read(&wal).unwrap();
    bytes.push(1); // SET tag
    bytes.extend_from_slice(&[7, 0]); // partial key length
    std::fs::write(&wal, &bytes).unwrap();

    let engine = open_engine(dir.path(), MEMTABLE_MAX);
    assert_eq!(engine.get(b"safe").unwrap(), Some(b"yes".to_vec()));
}

#[test]
fn leftover_tmp_files_are_cleaned_on_open() {
    let dir = tempdir().unwrap();
    let l0 = dir.path().join("L0");
    std::fs::create_dir_all(&l0).unwrap();

    let tmp = l0.join("table_9.sst.tmp");
    std::fs::write(&tmp, b"interrupted flush").unwrap();

    let _engine = open_engine(dir.path(), MEMTABLE_MAX);
    assert!(!tmp.exists(), "interrupted-flush leftovers must be removed");
}

#[test]
fn recovery_after_compaction_sees_only_merged_tables() {
    let dir = tempdir().unwrap();

    {
        let engine = open_engine(dir.path(), 512);
        for i in 0..120u64 {
            engine
                .set(format!("k{:04}", i).into_bytes(), vec![b'v'; 32])
                .unwrap();
        }
        engine.sync().unwrap();
        engine.compact().unwrap();
        assert_eq!(engine.level_table_count(0), 0);
        assert_eq!(engine.level_table_count(1), 1);
    }

    let engine = open_engine(dir.path(), 512);
    assert_eq!(engine.level_table_count(0), 0);
    assert_eq!(engine.level_table_count(1), 1);
    for i in 0..120u64 {
        let key = format!("k{:04}", i).into_bytes();
        assert!(engine.get(&key).unwrap().is_some(), "k{:04} lost", i);
    }
}
