//! End-to-end tests for submission, ordering, and paced delivery.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use dispatch_core::scheduler::{Job, WorkSpawner};
use dispatch_core::{
    Category, DispatchError, Dispatcher, DispatcherConfig, DrainOutcome, Priority, SubmitOptions,
    WorkError, WorkState, WorkerConfig,
};

/// Runs each job on the submitting thread so results are ready on return.
struct InlineSpawner;

impl WorkSpawner for InlineSpawner {
    fn spawn(&self, job: Job) -> Result<(), DispatchError> {
        (job.run)();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "inline"
    }
}

fn inline_dispatcher() -> Dispatcher {
    Dispatcher::with_spawner(DispatcherConfig::default(), Box::new(InlineSpawner)).unwrap()
}

fn opts(category: Category, priority: Priority) -> SubmitOptions {
    SubmitOptions::new().category(category).priority(priority)
}

fn wait_for_ready(dispatcher: &Dispatcher, expected: usize) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while dispatcher.ready_count() < expected {
        assert!(Instant::now() < deadline, "timed out waiting for workers");
        thread::sleep(Duration::from_millis(2));
    }
}

type Log = Arc<Mutex<Vec<&'static str>>>;

fn recorder(log: &Log, name: &'static str) -> impl FnOnce(Result<(), WorkError>) + Send + 'static {
    let log = Arc::clone(log);
    move |_| log.lock().unwrap().push(name)
}

#[test]
fn test_categories_then_priorities_one_per_tick() {
    let dispatcher = inline_dispatcher();
    let log: Log = Arc::default();

    dispatcher
        .submit_with(|| (), recorder(&log, "A"), opts(Category::Terrain, Priority::Low))
        .unwrap();
    dispatcher
        .submit_with(|| (), recorder(&log, "B"), opts(Category::Entity, Priority::High))
        .unwrap();
    dispatcher
        .submit_with(|| (), recorder(&log, "C"), opts(Category::Terrain, Priority::High))
        .unwrap();
    assert_eq!(dispatcher.ready_count(), 3);

    assert!(!dispatcher.drain_tick().is_idle());
    assert_eq!(*log.lock().unwrap(), vec!["C"]);
    assert!(!dispatcher.drain_tick().is_idle());
    assert_eq!(*log.lock().unwrap(), vec!["C", "A"]);
    assert!(!dispatcher.drain_tick().is_idle());
    assert_eq!(*log.lock().unwrap(), vec!["C", "A", "B"]);
    assert_eq!(dispatcher.drain_tick(), DrainOutcome::Idle);
}

#[test]
fn test_fifo_within_a_queue() {
    let dispatcher = inline_dispatcher();
    let seen = Arc::new(Mutex::new(Vec::new()));

    for i in 0..5u32 {
        let seen = Arc::clone(&seen);
        dispatcher
            .submit_with(
                move || i,
                move |outcome| seen.lock().unwrap().push(outcome.unwrap()),
                opts(Category::Entity, Priority::Medium),
            )
            .unwrap();
    }

    while !dispatcher.drain_tick().is_idle() {}
    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_default_routing() {
    let dispatcher = inline_dispatcher();
    let handle = dispatcher.submit(|| 1, |_| {}).unwrap();
    assert_eq!(handle.category(), Category::Default);
    assert_eq!(handle.priority(), Priority::High);
    assert!(dispatcher.is_ready(&handle));
}

#[test]
fn test_tick_delivers_handle_and_forgets_it() {
    let dispatcher = inline_dispatcher();
    let handle = dispatcher.submit(|| "mesh", |_| {}).unwrap();

    assert_eq!(dispatcher.state(&handle), Some(WorkState::Ready));
    assert!(dispatcher.still_pending(&handle));
    assert_eq!(dispatcher.drain_tick(), DrainOutcome::Delivered(handle));
    assert_eq!(dispatcher.state(&handle), None);
    assert!(!dispatcher.still_pending(&handle));
    assert!(!dispatcher.is_ready(&handle));
}

#[test]
fn test_empty_tick_is_idle() {
    let dispatcher = inline_dispatcher();
    assert_eq!(dispatcher.drain_tick(), DrainOutcome::Idle);
    assert_eq!(dispatcher.stats().delivered, 0);
}

#[test]
fn test_threaded_round_trip_delivers_each_once_on_drain_thread() {
    const N: usize = 40;
    let dispatcher = Dispatcher::new(DispatcherConfig::default()).unwrap();
    let drain_thread = thread::current().id();
    let results = Arc::new(Mutex::new(Vec::new()));

    for i in 0..N {
        let results = Arc::clone(&results);
        let options = opts(Category::ALL[i % 3], Priority::ALL[i % 3]);
        dispatcher
            .submit_with(
                move || i * 10,
                move |outcome| {
                    assert_eq!(thread::current().id(), drain_thread);
                    results.lock().unwrap().push(outcome.unwrap());
                },
                options,
            )
            .unwrap();
    }

    wait_for_ready(&dispatcher, N);
    for _ in 0..N {
        assert!(!dispatcher.drain_tick().is_idle());
    }
    assert!(dispatcher.drain_tick().is_idle());

    let mut results = results.lock().unwrap().clone();
    results.sort_unstable();
    assert_eq!(results, (0..N).map(|i| i * 10).collect::<Vec<_>>());

    let stats = dispatcher.stats();
    assert_eq!(stats.submitted, N as u64);
    assert_eq!(stats.delivered, N as u64);
    assert_eq!(stats.pending, 0);
}

#[test]
fn test_generators_run_off_the_submitting_thread() {
    let dispatcher = Dispatcher::new(DispatcherConfig::default()).unwrap();
    let caller = thread::current().id();
    let (tx, rx) = mpsc::channel();

    dispatcher
        .submit(move || tx.send(thread::current().id() != caller).unwrap(), |_| {})
        .unwrap();
    assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
}

#[test]
fn test_pooled_workers_round_trip() {
    let config = DispatcherConfig {
        workers: WorkerConfig::pooled(2),
        ..DispatcherConfig::default()
    };
    let dispatcher = Dispatcher::new(config).unwrap();
    let total = Arc::new(AtomicUsize::new(0));

    for i in 1..=10 {
        let total = Arc::clone(&total);
        dispatcher
            .submit(move || i, move |outcome| {
                total.fetch_add(outcome.unwrap(), Ordering::SeqCst);
            })
            .unwrap();
    }

    wait_for_ready(&dispatcher, 10);
    while !dispatcher.drain_tick().is_idle() {}
    assert_eq!(total.load(Ordering::SeqCst), 55);
}

#[test]
fn test_running_then_ready_then_gone() {
    let dispatcher = Dispatcher::new(DispatcherConfig::default()).unwrap();
    let (gate_tx, gate_rx) = mpsc::channel::<()>();

    let handle = dispatcher
        .submit(move || gate_rx.recv().unwrap(), |_| {})
        .unwrap();
    assert_eq!(dispatcher.state(&handle), Some(WorkState::Running));
    assert!(dispatcher.still_pending(&handle));
    assert!(!dispatcher.is_ready(&handle));
    assert!(dispatcher.drain_tick().is_idle());

    gate_tx.send(()).unwrap();
    wait_for_ready(&dispatcher, 1);
    assert_eq!(dispatcher.state(&handle), Some(WorkState::Ready));

    assert_eq!(dispatcher.drain_tick(), DrainOutcome::Delivered(handle));
    assert_eq!(dispatcher.state(&handle), None);
}

#[test]
fn test_generator_error_is_delivered_and_isolated() {
    let dispatcher = inline_dispatcher();
    let outcomes = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&outcomes);
    dispatcher
        .try_submit_with(
            || Err::<u32, _>("heightmap missing"),
            move |outcome| sink.lock().unwrap().push(outcome),
            SubmitOptions::new(),
        )
        .unwrap();
    let sink = Arc::clone(&outcomes);
    dispatcher
        .submit(|| 9u32, move |outcome| sink.lock().unwrap().push(outcome))
        .unwrap();

    while !dispatcher.drain_tick().is_idle() {}

    let outcomes = outcomes.lock().unwrap();
    assert_eq!(
        outcomes[0],
        Err(WorkError::GeneratorFailed("heightmap missing".to_string()))
    );
    assert_eq!(outcomes[1], Ok(9));
    assert_eq!(dispatcher.stats().failed, 1);
}

#[test]
fn test_generator_panic_becomes_failure() {
    let dispatcher = Dispatcher::new(DispatcherConfig::default()).unwrap();
    let outcome = Arc::new(Mutex::new(None));

    let sink = Arc::clone(&outcome);
    dispatcher
        .submit(
            || -> u32 { panic!("voxel overflow") },
            move |result| *sink.lock().unwrap() = Some(result),
        )
        .unwrap();

    wait_for_ready(&dispatcher, 1);
    dispatcher.drain_tick();

    let outcome = outcome.lock().unwrap().clone().unwrap();
    match outcome {
        Err(err @ WorkError::GeneratorPanicked(_)) => {
            assert!(err.to_string().contains("voxel overflow"));
            assert!(err.is_generator_fault());
        }
        other => panic!("expected panic failure, got {other:?}"),
    }
}

#[test]
fn test_callback_panic_does_not_stop_delivery() {
    let dispatcher = inline_dispatcher();
    let ran = Arc::new(AtomicUsize::new(0));

    dispatcher
        .submit(|| (), |_| panic!("callback exploded"))
        .unwrap();
    let counter = Arc::clone(&ran);
    dispatcher
        .submit(|| (), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    assert!(!dispatcher.drain_tick().is_idle());
    assert!(!dispatcher.drain_tick().is_idle());
    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert_eq!(dispatcher.stats().delivered, 2);
}

#[test]
fn test_clear_category_only_touches_that_category() {
    let dispatcher = inline_dispatcher();
    let log: Log = Arc::default();

    let t1 = dispatcher
        .submit_with(|| (), recorder(&log, "t1"), opts(Category::Terrain, Priority::High))
        .unwrap();
    let t2 = dispatcher
        .submit_with(|| (), recorder(&log, "t2"), opts(Category::Terrain, Priority::Low))
        .unwrap();
    let entity = dispatcher
        .submit_with(|| (), recorder(&log, "e1"), opts(Category::Entity, Priority::Low))
        .unwrap();

    assert_eq!(dispatcher.clear_category(Category::Terrain), 2);
    assert_eq!(dispatcher.clear_category(Category::Terrain), 0);
    assert!(!dispatcher.still_pending(&t1));
    assert!(!dispatcher.still_pending(&t2));
    assert_eq!(dispatcher.state(&t1), None);
    assert!(dispatcher.still_pending(&entity));

    while !dispatcher.drain_tick().is_idle() {}
    assert_eq!(*log.lock().unwrap(), vec!["e1"]);
    assert_eq!(dispatcher.stats().cancelled, 2);
}

#[test]
fn test_clear_category_drops_running_results() {
    let dispatcher = Dispatcher::new(DispatcherConfig::default()).unwrap();
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    let called = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&called);
    let running = dispatcher
        .submit_with(
            move || gate_rx.recv().unwrap(),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            opts(Category::Terrain, Priority::Medium),
        )
        .unwrap();

    assert_eq!(dispatcher.clear_category(Category::Terrain), 1);
    assert!(!dispatcher.still_pending(&running));
    assert_eq!(dispatcher.state(&running), None);
    gate_tx.send(()).unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while dispatcher.stats().discarded < 1 {
        assert!(Instant::now() < deadline, "worker never finished");
        thread::sleep(Duration::from_millis(2));
    }
    assert!(dispatcher.drain_tick().is_idle());
    assert_eq!(called.load(Ordering::SeqCst), 0);
}

#[test]
fn test_concurrent_submitters() {
    let dispatcher = Arc::new(Dispatcher::new(DispatcherConfig::default()).unwrap());
    let delivered = Arc::new(AtomicUsize::new(0));

    let submitters: Vec<_> = (0..4)
        .map(|t| {
            let dispatcher = Arc::clone(&dispatcher);
            let delivered = Arc::clone(&delivered);
            thread::spawn(move || {
                for i in 0..10 {
                    let delivered = Arc::clone(&delivered);
                    dispatcher
                        .submit_with(
                            move || t * 100 + i,
                            move |_| {
                                delivered.fetch_add(1, Ordering::SeqCst);
                            },
                            opts(Category::ALL[t % 3], Priority::ALL[i % 3]),
                        )
                        .unwrap();
                }
            })
        })
        .collect();
    for submitter in submitters {
        submitter.join().unwrap();
    }

    wait_for_ready(&dispatcher, 40);
    while !dispatcher.drain_tick().is_idle() {}
    assert_eq!(delivered.load(Ordering::SeqCst), 40);
}
