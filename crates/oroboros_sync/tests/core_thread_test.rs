//! Integration test for the core thread hand-off.

use oroboros_sync::{
    AsyncResult, BreakpointKey, BreakpointRegistry, CoreThread, CoreThreadConfig,
    LocalCommandQueue, SharedCommandQueue, SyncError,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

#[test]
fn test_many_frames_in_order() {
    let core = CoreThread::spawn(CoreThreadConfig::default()).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));

    for frame in 0..20_u32 {
        for i in 0..50_u32 {
            let log = Arc::clone(&log);
            core.queue_command(move || log.lock().push(frame * 1000 + i));
        }
        core.submit(false).unwrap();
    }
    core.submit(true).unwrap();

    let log = log.lock();
    assert_eq!(log.len(), 1000);
    assert!(log.windows(2).all(|w| w[0] < w[1]));
    // 20 frames plus the final empty fence frame
    assert_eq!(core.frames_executed(), 21);
}

#[test]
fn test_multi_producer_throughput() {
    let core = Arc::new(CoreThread::spawn(CoreThreadConfig::production()).unwrap());
    let total = Arc::new(AtomicUsize::new(0));
    let producers = 8;
    let per_producer = 2_000;

    let start = Instant::now();
    let handles: Vec<_> = (0..producers)
        .map(|_| {
            let core = Arc::clone(&core);
            let total = Arc::clone(&total);
            thread::spawn(move || {
                for _ in 0..per_producer {
                    let total = Arc::clone(&total);
                    core.queue_command(move || {
                        total.fetch_add(1, Ordering::Relaxed);
                    });
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    core.submit(true).unwrap();
    let elapsed = start.elapsed();

    assert_eq!(total.load(Ordering::Relaxed), producers * per_producer);
    println!(
        "{} commands from {producers} producers in {elapsed:?}",
        producers * per_producer
    );
}

#[test]
fn test_block_until_complete_from_other_thread() {
    let core = CoreThread::spawn(CoreThreadConfig::default()).unwrap();
    let result = core
        .queue_return_command(
            |result| {
                let _ = result.resolve(String::from("uploaded"));
            },
            false,
        )
        .unwrap();

    let waiter = {
        let result = result.clone();
        thread::spawn(move || {
            result.block_until_complete().unwrap();
            result.return_value::<String>()
        })
    };

    core.submit(false).unwrap();
    assert_eq!(waiter.join().unwrap(), "uploaded");
}

#[test]
fn test_blocking_inside_command_is_refused() {
    let core = CoreThread::spawn(CoreThreadConfig::default()).unwrap();
    let never = AsyncResult::new();
    let inner = never.clone();

    let outcome = core
        .queue_return_command(
            move |result| {
                let _ = result.resolve(inner.block_until_complete());
            },
            true,
        )
        .unwrap();

    assert_eq!(
        outcome.try_return_value::<Result<(), SyncError>>().unwrap(),
        Err(SyncError::WouldDeadlock)
    );
    assert!(!never.is_resolved());
}

#[test]
fn test_local_queue_played_back_elsewhere() {
    let registry = Arc::new(BreakpointRegistry::new());
    let queue = LocalCommandQueue::for_current_thread().with_breakpoints(Arc::clone(&registry));
    registry.add(BreakpointKey::new(queue.queue_id(), 1));

    let ran = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let ran = Arc::clone(&ran);
        queue.enqueue(move || {
            ran.fetch_add(1, Ordering::Relaxed);
        });
    }

    let batch = queue.flush();
    let report = thread::spawn(move || batch.playback(|_| {}))
        .join()
        .unwrap();

    assert_eq!(report.executed, 3);
    assert_eq!(ran.load(Ordering::Relaxed), 3);
    assert_eq!(
        registry.hits(),
        vec![BreakpointKey::new(queue.queue_id(), 1)]
    );
}

#[test]
fn test_shared_queue_manual_consumer() {
    let queue = Arc::new(SharedCommandQueue::for_current_thread());
    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            let mut results = Vec::new();
            for i in 0..10_u64 {
                results.push(queue.enqueue_with_result(move |result| {
                    let _ = result.resolve(i * i);
                }));
            }
            results
        })
    };
    let results = producer.join().unwrap();

    let report = SharedCommandQueue::playback(queue.flush(), |_| {});
    assert!(report.is_clean());

    let squares: Vec<u64> = results.iter().map(AsyncResult::return_value).collect();
    assert_eq!(squares, (0..10).map(|i| i * i).collect::<Vec<_>>());
}
