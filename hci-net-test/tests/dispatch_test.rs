//! Task dispatcher tests with injected fake binders.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use hci_net::TransportError;
use hci_net::api::Errno;
use hci_net::runtime::{
    Dispatcher, DispatcherConfig, PollerConfig, ServiceTable, Task, TaskKind, TaskPayload,
};
use hci_net::transport::BindRequest;
use hci_net_test::init_tracing;
use hci_net_test::loopback::{CollectSink, FailingBinder, LoopbackBinder, PanickingBinder};

const WAIT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_init_failure_is_classified_and_leaves_nothing_registered() {
    init_tracing();
    let binder = Arc::new(FailingBinder {
        error: TransportError::SocketCreateFailed(Errno::EPERM),
    });
    let dispatcher = Dispatcher::new(binder, CollectSink::new());

    let completion = dispatcher.run(Task::Init(BindRequest::raw())).await;
    assert_eq!(completion.kind, TaskKind::Init);
    assert_eq!(
        completion.result,
        Err(TransportError::SocketCreateFailed(Errno::EPERM))
    );

    // no session, no reactor registration
    assert!(dispatcher.session().await.is_none());
    assert!(!dispatcher.is_polling().await);

    // dependent lifecycle tasks report the missing session
    let completion = dispatcher.run(Task::StartAdvertising).await;
    assert_eq!(completion.result, Err(TransportError::SessionNotBound));
}

#[tokio::test]
async fn test_exactly_one_completion_per_task() {
    init_tracing();
    let dispatcher = Dispatcher::new(LoopbackBinder::new(), CollectSink::new());

    let tasks = [
        Task::RunLoop,
        Task::SetServices(ServiceTable(vec![1, 2, 3])),
        Task::RunLoop,
        Task::SetServices(ServiceTable(vec![4])),
        Task::RunLoop,
    ];
    let expected: Vec<TaskKind> = tasks.iter().map(|t| t.kind()).collect();

    let receivers: Vec<_> = tasks.into_iter().map(|t| dispatcher.submit(t)).collect();
    let mut kinds = Vec::new();
    for rx in receivers {
        let completion = rx.await.expect("completion record");
        assert!(completion.result.is_ok());
        kinds.push(completion.kind);
    }

    // no duplicates, no drops; each record carries its originating kind
    assert_eq!(kinds.len(), expected.len());
    let count = |ks: &[TaskKind], k: TaskKind| ks.iter().filter(|&&x| x == k).count();
    assert_eq!(count(&kinds, TaskKind::RunLoop), count(&expected, TaskKind::RunLoop));
    assert_eq!(
        count(&kinds, TaskKind::SetServices),
        count(&expected, TaskKind::SetServices)
    );

    // each SetServices fully replaced the table; one of them is installed
    let table = dispatcher.service_table().await.expect("service table");
    assert!(table == ServiceTable(vec![1, 2, 3]) || table == ServiceTable(vec![4]));
}

#[tokio::test]
async fn test_init_start_stop_flow() {
    init_tracing();
    let binder = LoopbackBinder::new();
    let sink = CollectSink::new();
    let dispatcher = Dispatcher::new(binder.clone(), sink.clone());

    let completion = dispatcher.run(Task::Init(BindRequest::raw())).await;
    assert_eq!(completion.kind, TaskKind::Init);
    assert_eq!(
        completion.result,
        Ok(TaskPayload::Bound {
            device_id: 0,
            address: [0u8; 6],
            address_type: 0,
        })
    );
    let mut peer = binder.take_peer();
    assert!(!dispatcher.is_polling().await);

    let completion = dispatcher.run(Task::StartAdvertising).await;
    assert!(completion.result.is_ok());
    assert!(dispatcher.is_polling().await);

    peer.write_all(b"inbound").unwrap();
    assert!(sink.wait_for_bytes(7, WAIT).await);

    let completion = dispatcher.run(Task::StopAdvertising).await;
    assert!(completion.result.is_ok());
    assert!(!dispatcher.is_polling().await);

    // silent while stopped
    let count = sink.packet_count();
    peer.write_all(b"ignored").unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(sink.packet_count(), count);

    // restart resumes delivery
    let completion = dispatcher.run(Task::StartAdvertising).await;
    assert!(completion.result.is_ok());
    assert!(sink.wait_for_bytes(14, WAIT).await);
}

#[tokio::test]
async fn test_device_info_failure_is_surfaced_not_swallowed() {
    init_tracing();
    let binder =
        LoopbackBinder::with_info_error(TransportError::DeviceInfoUnavailable(Errno::EIO));
    let dispatcher = Dispatcher::new(binder, CollectSink::new());

    let completion = dispatcher.run(Task::Init(BindRequest::raw())).await;
    assert_eq!(
        completion.result,
        Err(TransportError::DeviceInfoUnavailable(Errno::EIO))
    );

    // the session is still bound, with a zeroed identity
    let session = dispatcher.session().await.expect("bound session");
    assert_eq!(session.address(), [0u8; 6]);
    assert_eq!(session.address_type(), 0);
}

#[tokio::test]
async fn test_bounded_wait_times_out() {
    init_tracing();
    let binder = LoopbackBinder::with_bind_delay(Duration::from_millis(500));
    let dispatcher = Dispatcher::with_config(
        binder,
        CollectSink::new(),
        DispatcherConfig {
            task_timeout: Duration::from_millis(50),
            ..DispatcherConfig::default()
        },
    );

    let completion = dispatcher.run(Task::Init(BindRequest::raw())).await;
    assert_eq!(completion.kind, TaskKind::Init);
    assert_eq!(
        completion.result,
        Err(TransportError::WorkerTimeout(Duration::from_millis(50)))
    );
}

#[tokio::test]
async fn test_worker_panic_is_reported_as_task_failure() {
    init_tracing();
    let dispatcher = Dispatcher::new(Arc::new(PanickingBinder), CollectSink::new());

    // the worker died before publishing; this is the one failure with no
    // inner classified error
    let completion = dispatcher.run(Task::Init(BindRequest::raw())).await;
    assert_eq!(completion.kind, TaskKind::Init);
    assert!(matches!(
        completion.result,
        Err(TransportError::WorkerTaskFailed { .. })
    ));
    assert!(dispatcher.session().await.is_none());
    assert!(!dispatcher.is_polling().await);
}

#[tokio::test]
async fn test_start_after_descriptor_death_fails_the_task() {
    init_tracing();
    let binder = LoopbackBinder::new();
    let sink = CollectSink::new();
    let dispatcher = Dispatcher::new(binder.clone(), sink.clone());

    assert!(dispatcher.run(Task::Init(BindRequest::raw())).await.result.is_ok());
    let peer = binder.take_peer();
    assert!(dispatcher.run(Task::StartAdvertising).await.result.is_ok());

    drop(peer);
    assert!(sink.wait_for_fatal(WAIT).await);
    assert!(!dispatcher.is_polling().await);

    // the completion must carry the failure, not report success
    let completion = dispatcher.run(Task::StartAdvertising).await;
    assert_eq!(completion.result, Err(TransportError::DescriptorInvalidated));
}

#[tokio::test]
async fn test_reinit_stops_previous_poller() {
    init_tracing();
    let binder = LoopbackBinder::new();
    let sink = CollectSink::new();
    let dispatcher = Dispatcher::with_config(
        binder.clone(),
        sink.clone(),
        DispatcherConfig {
            poller: PollerConfig { read_capacity: 1024 },
            ..DispatcherConfig::default()
        },
    );

    assert!(dispatcher.run(Task::Init(BindRequest::raw())).await.result.is_ok());
    let _first_peer = binder.take_peer();
    assert!(dispatcher.run(Task::StartAdvertising).await.result.is_ok());
    assert!(dispatcher.is_polling().await);

    // a fresh Init replaces the session; the old poller is stopped first
    assert!(dispatcher.run(Task::Init(BindRequest::raw())).await.result.is_ok());
    let mut second_peer = binder.take_peer();
    assert!(!dispatcher.is_polling().await);

    assert!(dispatcher.run(Task::StartAdvertising).await.result.is_ok());
    second_peer.write_all(b"fresh").unwrap();
    assert!(sink.wait_for_bytes(5, WAIT).await);
}
