//! Tests for the host heap and its collector modes

use super::*;
use crate::error::FinalizeError;
use std::sync::atomic::AtomicUsize;
use std::thread;
use std::time::Duration;

fn counting_callback(counter: &Arc<AtomicUsize>) -> ReclaimCallback {
    let counter = Arc::clone(counter);
    Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

fn heap_with_mode(mode: CollectorMode) -> Heap {
    Heap::with_config(&FinalizeConfig {
        collector_mode: mode,
        collector_thread_name: format!("test-{mode:?}").to_lowercase(),
        ..FinalizeConfig::default()
    })
}

#[test]
fn inline_mode_delivers_on_last_drop() {
    let heap = Heap::new();
    let counter = Arc::new(AtomicUsize::new(0));
    let obj = heap.alloc("payload");
    let second = obj.clone();

    heap.observe(obj.id(), counting_callback(&counter)).unwrap();
    assert_eq!(heap.observer_count(obj.id()), 1);

    drop(obj);
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    drop(second);
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    let stats = heap.stats();
    assert_eq!(stats.allocated, 1);
    assert_eq!(stats.reclaimed, 1);
    assert_eq!(stats.live, 0);
}

#[test]
fn deferred_mode_waits_for_collect() {
    let heap = heap_with_mode(CollectorMode::Deferred);
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..5 {
        let obj = heap.alloc(0u64);
        heap.observe(obj.id(), counting_callback(&counter)).unwrap();
    }

    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert_eq!(heap.stats().pending_notifications, 5);

    assert_eq!(heap.collect(), 5);
    assert_eq!(counter.load(Ordering::SeqCst), 5);
    assert_eq!(heap.stats().pending_notifications, 0);
    assert_eq!(heap.collect(), 0);
}

#[test]
fn deferred_collect_reaches_fixpoint() {
    let heap = heap_with_mode(CollectorMode::Deferred);
    let counter = Arc::new(AtomicUsize::new(0));

    // The outer callback owns the inner object, so reclaiming the outer one
    // makes the inner one unreachable during the same collection.
    let inner = heap.alloc(1u8);
    heap.observe(inner.id(), counting_callback(&counter)).unwrap();

    let outer = heap.alloc(2u8);
    let counter_clone = Arc::clone(&counter);
    heap.observe(
        outer.id(),
        Box::new(move || {
            drop(inner);
            counter_clone.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .unwrap();
    drop(outer);

    assert_eq!(heap.collect(), 2);
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[test]
fn background_mode_delivers_off_thread() {
    let heap = heap_with_mode(CollectorMode::Background);
    assert_eq!(heap.mode(), CollectorMode::Background);

    let delivered_on = Arc::new(parking_lot::Mutex::new(None));
    let obj = heap.alloc(());
    let slot = Arc::clone(&delivered_on);
    heap.observe(
        obj.id(),
        Box::new(move || {
            *slot.lock() = thread::current().name().map(str::to_string);
        }),
    )
    .unwrap();

    drop(obj);
    heap.flush();

    assert_eq!(delivered_on.lock().as_deref(), Some("test-background"));
    assert_eq!(heap.stats().pending_notifications, 0);
}

#[test]
fn background_shutdown_falls_back_to_inline() {
    let heap = heap_with_mode(CollectorMode::Background);
    let counter = Arc::new(AtomicUsize::new(0));

    heap.shutdown();

    let obj = heap.alloc(());
    heap.observe(obj.id(), counting_callback(&counter)).unwrap();
    drop(obj);

    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn observe_reclaimed_object_fails() {
    let heap = Heap::new();
    let obj = heap.alloc(5i32);
    let id = obj.id();
    drop(obj);

    assert!(!heap.is_tracked(id));
    let err = heap.observe(id, Box::new(|| {})).unwrap_err();
    assert!(matches!(err, FinalizeError::UnknownObject { .. }));
}

#[test]
fn forget_prevents_delivery() {
    let heap = Heap::new();
    let counter = Arc::new(AtomicUsize::new(0));
    let obj = heap.alloc(());

    heap.observe(obj.id(), counting_callback(&counter)).unwrap();
    assert_eq!(heap.forget(obj.id()), 1);
    drop(obj);

    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert_eq!(heap.stats().total_forgotten, 1);
}

#[test]
fn forget_releases_captured_objects_of_same_heap() {
    let heap = Heap::new();
    let captured: Vec<Gc<u8>> = (0..=255u8).map(|i| heap.alloc(i)).collect();
    let captured_ids: Vec<ObjectId> = captured.iter().map(Gc::id).collect();
    let target = heap.alloc(());
    let id = target.id();
    heap.observe(id, Box::new(move || drop(captured))).unwrap();

    // Dropping the forgotten callback reclaims all 256 captured objects,
    // which needs the observer table while `forget` is still on the stack.
    let (done_tx, done_rx) = flume::bounded(1);
    let worker_heap = heap.clone();
    thread::spawn(move || {
        let _ = done_tx.send(worker_heap.forget(id));
    });

    let forgotten = done_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("forget did not return");
    assert_eq!(forgotten, 1);
    assert!(captured_ids.iter().all(|id| !heap.is_tracked(*id)));
    assert_eq!(heap.stats().reclaimed, 256);

    drop(target);
    assert_eq!(heap.stats().live, 0);
}

#[test]
fn objects_keep_their_heap_alive() {
    let counter = Arc::new(AtomicUsize::new(0));
    let obj = {
        let heap = heap_with_mode(CollectorMode::Deferred);
        let obj = heap.alloc(());
        heap.observe(obj.id(), counting_callback(&counter)).unwrap();
        obj
    };

    // Last handle to the heap goes with the object; pending work is drained.
    drop(obj);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn concurrent_drops_deliver_each_callback_once() {
    let heap = heap_with_mode(CollectorMode::Background);
    let counter = Arc::new(AtomicUsize::new(0));

    let objects: Vec<_> = (0..64)
        .map(|_| {
            let obj = heap.alloc(0usize);
            heap.observe(obj.id(), counting_callback(&counter)).unwrap();
            obj
        })
        .collect();

    let handles: Vec<_> = objects
        .chunks(16)
        .map(|chunk| {
            let chunk = chunk.to_vec();
            thread::spawn(move || drop(chunk))
        })
        .collect();
    drop(objects);
    for handle in handles {
        handle.join().unwrap();
    }

    heap.flush();
    assert_eq!(counter.load(Ordering::SeqCst), 64);
    assert_eq!(heap.stats().live, 0);
}
