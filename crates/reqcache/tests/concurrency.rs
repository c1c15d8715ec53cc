//! Concurrent sessions sharing one manager.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, bail, ensure};
use reqcache::{BoxError, ObjectRef};

use common::{Record, key, new_session, record_cache};

const SESSIONS: usize = 64;
const OBJECTS: usize = 100;

#[test]
fn test_parallel_sessions_do_not_interfere() -> Result<()> {
    let cache = record_cache(OBJECTS, OBJECTS)?;

    std::thread::scope(|s| -> Result<()> {
        let handles: Vec<_> = (0..SESSIONS)
            .map(|session_no| {
                let cache = &cache;
                s.spawn(move || -> Result<()> {
                    let ctx = new_session()?;

                    let mut objects = Vec::with_capacity(OBJECTS);
                    for k in 0..OBJECTS {
                        let obj = cache.new_object(&ctx)?;
                        {
                            let mut record = obj.write();
                            record.id = k;
                            record.payload = format!("session-{session_no}");
                        }
                        cache.put(&ctx, key(k), obj.clone())?;
                        objects.push(obj);
                    }

                    for (k, expected) in objects.iter().enumerate() {
                        let Some(found) = cache.get(&ctx, &key(k))? else {
                            bail!("value not found, expected {k}");
                        };
                        ensure!(ObjectRef::ptr_eq(&found, expected), "object mismatch for {k}");

                        let record = found.read();
                        ensure!(record.id == k, "id mismatch: expected {k}, got {}", record.id);
                        ensure!(record.payload == format!("session-{session_no}"));
                    }

                    let stats = cache.session_stats(&ctx)?;
                    ensure!(stats.cached_entries == OBJECTS);
                    ensure!(stats.objects_taken == OBJECTS);

                    cache.end_session(&ctx)?;
                    Ok(())
                })
            })
            .collect();

        for handle in handles {
            match handle.join() {
                Ok(result) => result?,
                Err(_) => bail!("session thread panicked"),
            }
        }
        Ok(())
    })?;

    let stats = cache.stats();
    assert_eq!(stats.active_arenas, 0, "arena map should be empty");
    assert_eq!(stats.active_caches, 0, "cache map should be empty");
    assert!(stats.idle_arenas > 0);
    assert!(stats.idle_caches > 0);

    Ok(())
}

#[test]
fn test_fan_out_within_one_session() -> Result<()> {
    const WORKERS: usize = 8;

    let cache = record_cache(WORKERS, WORKERS * 2)?;
    let ctx = new_session()?;
    let fetches = AtomicUsize::new(0);

    std::thread::scope(|s| {
        for worker in 0..WORKERS {
            let (cache, ctx, fetches) = (&cache, &ctx, &fetches);
            s.spawn(move || {
                // Shared key: every worker may race on the first fetch
                let shared = cache
                    .get_or_fetch(ctx, "shared".to_string(), |_| {
                        fetches.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, BoxError>(ObjectRef::new(Record {
                            id: worker,
                            payload: "shared".to_string(),
                        }))
                    })
                    .unwrap();
                assert_eq!(shared.read().payload, "shared");

                let own = cache.new_object(ctx).unwrap();
                own.write().id = worker;
                cache.put(ctx, key(worker), own).unwrap();
            });
        }
    });

    let fetched = fetches.load(Ordering::SeqCst);
    assert!((1..=WORKERS).contains(&fetched));

    for worker in 0..WORKERS {
        let found = cache.get(&ctx, &key(worker))?.expect("worker entry");
        assert_eq!(found.read().id, worker);
    }

    let stats = cache.session_stats(&ctx)?;
    assert_eq!(stats.objects_taken, WORKERS);
    assert_eq!(stats.cached_entries, WORKERS + 1);

    cache.end_session(&ctx)?;
    assert_eq!(cache.stats().active_caches, 0);
    Ok(())
}

#[test]
fn test_recycled_structures_serve_later_sessions() -> Result<()> {
    let cache = record_cache(16, 16)?;

    for round in 0..10 {
        let ctx = new_session()?;
        for k in 0..16 {
            let obj = cache.new_object(&ctx)?;
            assert_eq!(*obj.read(), Record::default(), "round {round}: slot not cleared");
            obj.write().id = k + 1;
            cache.put(&ctx, key(k), obj)?;
        }
        cache.end_session(&ctx)?;
    }

    let stats = cache.stats();
    assert_eq!(stats.idle_arenas, 1);
    assert_eq!(stats.idle_caches, 1);
    Ok(())
}
