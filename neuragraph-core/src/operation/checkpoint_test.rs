use super::*;
use rayon::prelude::*;

#[test]
fn test_store_restore_release() -> Result<(), NeuraGraphError> {
    let store: CheckpointStore<Vec<f64>> = CheckpointStore::new();
    let run = RunId::from(7);
    store.store(run, vec![1.0, 2.0])?;
    assert!(store.contains(run));
    assert_eq!(store.restore(run, "test")?, vec![1.0, 2.0]);
    assert_eq!(store.release(run), Some(vec![1.0, 2.0]));
    assert!(store.is_empty());
    Ok(())
}

#[test]
fn test_restore_unknown_run_is_missing_checkpoint() {
    let store: CheckpointStore<u8> = CheckpointStore::new();
    match store.restore(RunId::from(42), "Sigmoid") {
        Err(NeuraGraphError::MissingCheckpoint { run_id, operation }) => {
            assert_eq!(run_id, RunId::from(42));
            assert_eq!(operation, "Sigmoid");
        }
        other => panic!("Expected MissingCheckpoint, got {:?}", other),
    }
}

#[test]
fn test_guard_releases_on_drop_unless_kept() -> Result<(), NeuraGraphError> {
    let store: CheckpointStore<i32> = CheckpointStore::new();
    let a = RunId::next();
    let b = RunId::next();
    assert_ne!(a, b);
    {
        let _guard = store.scoped(a, 1)?;
        assert!(store.contains(a));
    }
    assert!(!store.contains(a));

    let kept = store.scoped(b, 2)?.keep();
    assert_eq!(kept, b);
    assert_eq!(store.restore(b, "test")?, 2);
    Ok(())
}

#[test]
fn test_concurrent_inserts() {
    let store: CheckpointStore<usize> = CheckpointStore::new();
    (0..64u64).into_par_iter().for_each(|i| {
        store.store(RunId::from(i), i as usize).expect("store failed");
    });
    assert_eq!(store.len(), 64);
    assert_eq!(store.run_ids().first(), Some(&RunId::from(0)));
}

#[test]
fn test_clone_is_independent() -> Result<(), NeuraGraphError> {
    let store: CheckpointStore<i32> = CheckpointStore::new();
    store.store(RunId::from(1), 10)?;
    let copy = store.clone();
    store.release(RunId::from(1));
    assert_eq!(copy.restore(RunId::from(1), "test")?, 10);
    Ok(())
}
