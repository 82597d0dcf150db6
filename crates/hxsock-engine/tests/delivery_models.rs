//! PUSH / PULL 交付契约
//!
//! # 教案级注释概览
//! - **核心目标 (Why)**：验证两种基础交付模型在同一套缓冲块链上的行为差异：
//!   PUSH 收到即回调字节，PULL 只通知长度并由调用方 `fetch`/`peek`；
//! - **覆盖面 (How)**：握手前缓存、暂停与恢复、背压自动恢复、过期标识、回调内重入；
//! - **前置条件 (What)**：使用 `DetachedHandle` 或 `CountingHandle`，由测试线程直接驱动 `on_received`。

mod support;

use std::sync::Arc;

use hxsock_core::{CloseCode, DeliveryModel, OverflowPolicy, SocketOperation};
use hxsock_engine::{
    ConnState, DetachedHandle, EngineError, FetchResult, HandleResult, Origin, ReceiveOutcome,
};

use support::{CountingHandle, Event, Recorder, accept, small_config, started};

#[test]
fn push_delivers_each_receive_event() {
    let recorder = Recorder::new();
    let engine = started(small_config(), &recorder);
    let id = accept(&engine, &CountingHandle::new());

    assert_eq!(
        engine.on_received(id, b"hello").expect("接收失败"),
        ReceiveOutcome::Continue
    );
    engine.on_received(id, b"").expect("空事件应被忽略");
    engine.on_received(id, b"world").expect("接收失败");

    assert_eq!(
        recorder.received(id),
        vec![b"hello".to_vec(), b"world".to_vec()]
    );
    assert_eq!(
        &recorder.events()[..2],
        &[Event::Accept(id), Event::Handshake(id)]
    );
    let mut dest = [0u8; 1];
    assert_eq!(engine.fetch(id, &mut dest), FetchResult::InsufficientData);
    assert!(engine.as_pull().is_none());
}

#[test]
fn secure_connections_buffer_until_handshake_completes() {
    let recorder = Recorder::new();
    let engine = started(small_config().with_secure(true), &recorder);
    let handle = CountingHandle::new();
    let id = accept(&engine, &handle);
    assert_eq!(engine.state(id), Some(ConnState::HandshakeStarting));

    engine.on_received(id, b"early ").expect("接收失败");
    engine.on_received(id, b"bytes").expect("接收失败");
    assert!(recorder.received(id).is_empty(), "握手完成前不得交付");
    assert!(engine.send(id, b"x").is_err(), "握手完成前不得发送");

    engine.handshake_completed(id).expect("握手完成失败");
    assert_eq!(engine.state(id), Some(ConnState::Active));
    assert_eq!(recorder.received(id), vec![b"early bytes".to_vec()]);
    assert_eq!(handle.resumes(), 1);
    assert!(matches!(
        engine.handshake_completed(id),
        Err(EngineError::InvalidState { .. })
    ));
}

#[test]
fn pull_announces_lengths_and_serves_fetch_and_peek() {
    let recorder = Recorder::new();
    let engine = started(small_config().with_delivery(DeliveryModel::Pull), &recorder);
    let id = accept(&engine, &CountingHandle::new());

    let payload: Vec<u8> = (0..100u8).collect();
    engine.on_received(id, &payload[..40]).expect("接收失败");
    engine.on_received(id, &payload[40..]).expect("接收失败");
    assert!(recorder.events().contains(&Event::ReceiveLen(id, 40)));
    assert!(recorder.events().contains(&Event::ReceiveLen(id, 60)));
    assert_eq!(engine.pending_len(id).expect("查询失败"), 100);

    let pull = engine.as_pull().expect("PULL 配置必须暴露拉取能力");
    let mut first = [0u8; 30];
    let mut again = [0u8; 30];
    assert_eq!(pull.peek(id, &mut first), FetchResult::Ok);
    assert_eq!(pull.peek(id, &mut again), FetchResult::Ok);
    assert_eq!(first, again);
    let mut fetched = [0u8; 30];
    assert_eq!(pull.fetch(id, &mut fetched), FetchResult::Ok);
    assert_eq!(fetched, first);
    assert_eq!(&fetched[..], &payload[..30]);

    let mut rest = [0u8; 71];
    assert_eq!(pull.fetch(id, &mut rest), FetchResult::InsufficientData);
    assert_eq!(engine.pending_len(id).expect("查询失败"), 70);
    let mut rest = [0u8; 70];
    assert_eq!(pull.fetch(id, &mut rest), FetchResult::Ok);
    assert_eq!(&rest[..], &payload[30..]);
}

#[test]
fn pull_callback_may_fetch_reentrantly() {
    let recorder = Recorder::new();
    let engine = started(small_config().with_delivery(DeliveryModel::Pull), &recorder);
    let collected = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&collected);
    recorder.set_receive_len_hook(move |engine, id, len| {
        let mut buf = vec![0u8; len];
        if !engine.fetch(id, &mut buf).is_ok() {
            return HandleResult::Error;
        }
        sink.lock().expect("收集锁中毒").extend_from_slice(&buf);
        HandleResult::Ok
    });
    let id = accept(&engine, &CountingHandle::new());
    engine.on_received(id, b"abc").expect("接收失败");
    engine.on_received(id, b"defgh").expect("接收失败");
    assert_eq!(&*collected.lock().expect("收集锁中毒"), b"abcdefgh");
    assert_eq!(engine.pending_len(id).expect("查询失败"), 0);
}

#[test]
fn user_pause_suppresses_delivery_until_resumed() {
    let recorder = Recorder::new();
    let engine = started(small_config(), &recorder);
    let handle = CountingHandle::new();
    let id = accept(&engine, &handle);
    let resumes_after_accept = handle.resumes();

    engine.pause_receive(id, true).expect("暂停失败");
    assert!(engine.is_receive_paused(id).expect("查询失败"));
    assert_eq!(
        engine.on_received(id, b"held").expect("接收失败"),
        ReceiveOutcome::Paused
    );
    assert!(recorder.received(id).is_empty());

    engine.pause_receive(id, false).expect("恢复失败");
    assert_eq!(recorder.received(id), vec![b"held".to_vec()]);
    assert_eq!(handle.resumes(), resumes_after_accept + 1);
    assert!(!engine.is_receive_paused(id).expect("查询失败"));
}

#[test]
fn backpressure_pauses_pull_and_resumes_after_fetch() {
    let recorder = Recorder::new();
    let config = small_config()
        .with_delivery(DeliveryModel::Pull)
        .with_receive_limit(100);
    let engine = started(config, &recorder);
    let handle = CountingHandle::new();
    let id = accept(&engine, &handle);

    assert_eq!(
        engine.on_received(id, &[1u8; 60]).expect("接收失败"),
        ReceiveOutcome::Continue
    );
    assert_eq!(
        engine.on_received(id, &[2u8; 60]).expect("接收失败"),
        ReceiveOutcome::Paused
    );
    assert_eq!(engine.state(id), Some(ConnState::Paused));
    assert_eq!(
        engine.on_received(id, &[3u8; 10]).expect("暂停期间仍可缓存"),
        ReceiveOutcome::Paused
    );
    assert_eq!(engine.pending_len(id).expect("查询失败"), 130);

    let resumes = handle.resumes();
    let mut chunk = [0u8; 40];
    assert_eq!(engine.fetch(id, &mut chunk), FetchResult::Ok);
    assert_eq!(engine.state(id), Some(ConnState::Paused), "未降到一半以下前保持暂停");
    let mut more = [0u8; 50];
    assert_eq!(engine.fetch(id, &mut more), FetchResult::Ok);
    assert_eq!(engine.state(id), Some(ConnState::Active));
    assert_eq!(handle.resumes(), resumes + 1);
    assert!(recorder.events().contains(&Event::ReceiveLen(id, 10)));
}

#[test]
fn close_overflow_policy_terminates_connection() {
    let recorder = Recorder::new();
    let config = small_config()
        .with_delivery(DeliveryModel::Pull)
        .with_receive_limit(64)
        .with_overflow_policy(OverflowPolicy::Close);
    let engine = started(config, &recorder);
    let id = accept(&engine, &CountingHandle::new());

    assert_eq!(
        engine.on_received(id, &[0u8; 64]).expect("接收失败"),
        ReceiveOutcome::Closed
    );
    assert_eq!(
        recorder.closes(id),
        vec![(SocketOperation::Receive, CloseCode::ReceiveOverflow)]
    );
    assert_eq!(engine.state(id), None);
}

/// 用户暂停不豁免上限检查：`Close` 策略下暂停期间越过上限同样关闭连接。
#[test]
fn close_overflow_policy_applies_while_user_paused() {
    let recorder = Recorder::new();
    let config = small_config()
        .with_delivery(DeliveryModel::Pull)
        .with_receive_limit(64)
        .with_overflow_policy(OverflowPolicy::Close);
    let engine = started(config, &recorder);
    let id = accept(&engine, &CountingHandle::new());

    engine.pause_receive(id, true).expect("暂停失败");
    assert_eq!(
        engine.on_received(id, &[0u8; 32]).expect("接收失败"),
        ReceiveOutcome::Paused
    );
    assert_eq!(
        engine.on_received(id, &[0u8; 32]).expect("接收失败"),
        ReceiveOutcome::Closed
    );
    assert_eq!(
        recorder.closes(id),
        vec![(SocketOperation::Receive, CloseCode::ReceiveOverflow)]
    );
    assert_eq!(
        engine.on_received(id, &[0u8; 64]),
        Err(EngineError::InvalidConnection(id))
    );
}

/// 暂停期间传输层若仍持续入链，缓冲到达上限两倍即以溢出关闭，内存保持有界。
#[test]
fn backpressure_ceiling_bounds_buffer_while_paused() {
    let recorder = Recorder::new();
    let config = small_config()
        .with_delivery(DeliveryModel::Pull)
        .with_receive_limit(64);
    let engine = started(config, &recorder);
    let id = accept(&engine, &CountingHandle::new());

    engine.pause_receive(id, true).expect("暂停失败");
    for _ in 0..3 {
        assert_eq!(
            engine.on_received(id, &[7u8; 32]).expect("接收失败"),
            ReceiveOutcome::Paused
        );
    }
    assert_eq!(engine.pending_len(id).expect("查询失败"), 96);
    assert!(recorder.closes(id).is_empty(), "未达两倍上限前保留连接");

    assert_eq!(
        engine.on_received(id, &[7u8; 32]).expect("接收失败"),
        ReceiveOutcome::Closed
    );
    assert_eq!(
        recorder.closes(id),
        vec![(SocketOperation::Receive, CloseCode::ReceiveOverflow)]
    );
    assert_eq!(engine.state(id), None);
}

#[test]
fn stale_identifiers_are_rejected() {
    let recorder = Recorder::new();
    let engine = started(small_config().with_delivery(DeliveryModel::Pull), &recorder);
    let id = engine
        .attach(Arc::new(DetachedHandle), Origin::Inbound)
        .expect("接入失败");
    engine.disconnect(id, true).expect("断开失败");

    let mut dest = [0u8; 4];
    assert_eq!(engine.fetch(id, &mut dest), FetchResult::InvalidConnection);
    assert_eq!(engine.peek(id, &mut dest), FetchResult::InvalidConnection);
    assert_eq!(
        engine.on_received(id, b"late"),
        Err(EngineError::InvalidConnection(id))
    );
    assert_eq!(
        engine.send(id, b"late"),
        Err(EngineError::InvalidConnection(id))
    );

    let next = engine
        .attach(Arc::new(DetachedHandle), Origin::Inbound)
        .expect("接入失败");
    assert!(next > id, "标识单调递增且不复用");
}

#[test]
fn listener_error_on_receive_closes_connection() {
    let recorder = Recorder::new();
    recorder.set_receive_hook(|_, _, data| {
        if data == b"quit" {
            HandleResult::Error
        } else {
            HandleResult::Ignore
        }
    });
    let engine = started(small_config(), &recorder);
    let id = accept(&engine, &CountingHandle::new());
    engine.on_received(id, b"stay").expect("接收失败");
    assert_eq!(
        engine.on_received(id, b"quit").expect("接收失败"),
        ReceiveOutcome::Closed
    );
    assert_eq!(
        recorder.closes(id),
        vec![(SocketOperation::Receive, CloseCode::ListenerAborted)]
    );
}
