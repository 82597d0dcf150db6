//! 集成测试共享的监听器与传输句柄替身。
//!
//! - `Recorder`：按顺序记录全部回调，并允许按事件类型预设返回值；
//! - `CountingHandle`：统计引擎对传输句柄的调用次数；
//! - `frame`：按指定布局构造一个 PACK 数据包。

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use hxsock_core::{CloseCode, EngineConfig, HeaderLayout, PoolConfig, SocketOperation};
use hxsock_engine::framing::MAX_HEADER_LEN;
use hxsock_engine::{
    ConnId, HandleResult, Listener, Origin, PackHeader, SocketEngine, TransportHandle,
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Event {
    Accept(ConnId),
    PrepareConnect(ConnId),
    Connect(ConnId),
    Handshake(ConnId),
    Receive(ConnId, Vec<u8>),
    ReceiveLen(ConnId, usize),
    Send(ConnId, usize),
    Close(ConnId, SocketOperation, CloseCode),
    Shutdown,
}

type ReceiveHook = Box<dyn Fn(&SocketEngine, ConnId, &[u8]) -> HandleResult + Send + Sync>;
type LenHook = Box<dyn Fn(&SocketEngine, ConnId, usize) -> HandleResult + Send + Sync>;
type CloseHook = Box<dyn Fn(&SocketEngine, ConnId) + Send + Sync>;

#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
    pub accept_result: Mutex<Option<HandleResult>>,
    pub handshake_result: Mutex<Option<HandleResult>>,
    pub on_receive_hook: Mutex<Option<ReceiveHook>>,
    pub on_receive_len_hook: Mutex<Option<LenHook>>,
    pub on_close_hook: Mutex<Option<CloseHook>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("事件锁中毒").clone()
    }

    pub fn received(&self, id: ConnId) -> Vec<Vec<u8>> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Receive(owner, bytes) if owner == id => Some(bytes),
                _ => None,
            })
            .collect()
    }

    pub fn closes(&self, id: ConnId) -> Vec<(SocketOperation, CloseCode)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Close(owner, op, code) if owner == id => Some((op, code)),
                _ => None,
            })
            .collect()
    }

    pub fn set_receive_hook(
        &self,
        hook: impl Fn(&SocketEngine, ConnId, &[u8]) -> HandleResult + Send + Sync + 'static,
    ) {
        *self.on_receive_hook.lock().expect("钩子锁中毒") = Some(Box::new(hook));
    }

    pub fn set_receive_len_hook(
        &self,
        hook: impl Fn(&SocketEngine, ConnId, usize) -> HandleResult + Send + Sync + 'static,
    ) {
        *self.on_receive_len_hook.lock().expect("钩子锁中毒") = Some(Box::new(hook));
    }

    pub fn set_close_hook(&self, hook: impl Fn(&SocketEngine, ConnId) + Send + Sync + 'static) {
        *self.on_close_hook.lock().expect("钩子锁中毒") = Some(Box::new(hook));
    }

    fn push(&self, event: Event) {
        self.events.lock().expect("事件锁中毒").push(event);
    }
}

impl Listener for Recorder {
    fn on_accept(&self, _engine: &SocketEngine, id: ConnId) -> HandleResult {
        self.push(Event::Accept(id));
        self.accept_result
            .lock()
            .expect("结果锁中毒")
            .unwrap_or(HandleResult::Ok)
    }

    fn on_prepare_connect(&self, _engine: &SocketEngine, id: ConnId) -> HandleResult {
        self.push(Event::PrepareConnect(id));
        HandleResult::Ok
    }

    fn on_connect(&self, _engine: &SocketEngine, id: ConnId) -> HandleResult {
        self.push(Event::Connect(id));
        HandleResult::Ok
    }

    fn on_handshake(&self, _engine: &SocketEngine, id: ConnId) -> HandleResult {
        self.push(Event::Handshake(id));
        self.handshake_result
            .lock()
            .expect("结果锁中毒")
            .unwrap_or(HandleResult::Ok)
    }

    fn on_receive(&self, engine: &SocketEngine, id: ConnId, data: &[u8]) -> HandleResult {
        self.push(Event::Receive(id, data.to_vec()));
        match self.on_receive_hook.lock().expect("钩子锁中毒").as_ref() {
            Some(hook) => hook(engine, id, data),
            None => HandleResult::Ok,
        }
    }

    fn on_receive_len(&self, engine: &SocketEngine, id: ConnId, len: usize) -> HandleResult {
        self.push(Event::ReceiveLen(id, len));
        match self.on_receive_len_hook.lock().expect("钩子锁中毒").as_ref() {
            Some(hook) => hook(engine, id, len),
            None => HandleResult::Ok,
        }
    }

    fn on_send(&self, _engine: &SocketEngine, id: ConnId, len: usize) -> HandleResult {
        self.push(Event::Send(id, len));
        HandleResult::Error
    }

    fn on_close(
        &self,
        engine: &SocketEngine,
        id: ConnId,
        operation: SocketOperation,
        code: CloseCode,
    ) -> HandleResult {
        self.push(Event::Close(id, operation, code));
        if let Some(hook) = self.on_close_hook.lock().expect("钩子锁中毒").as_ref() {
            hook(engine, id);
        }
        HandleResult::Ok
    }

    fn on_shutdown(&self, _engine: &SocketEngine) -> HandleResult {
        self.push(Event::Shutdown);
        HandleResult::Error
    }
}

/// 统计引擎回调传输句柄的次数。
#[derive(Debug, Default)]
pub struct CountingHandle {
    pub resumes: AtomicUsize,
    pub flushes: AtomicUsize,
    pub closes: AtomicUsize,
    pub forced: AtomicUsize,
}

impl CountingHandle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn resumes(&self) -> usize {
        self.resumes.load(Ordering::SeqCst)
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl TransportHandle for CountingHandle {
    fn resume_receive(&self) {
        self.resumes.fetch_add(1, Ordering::SeqCst);
    }

    fn flush(&self) {
        self.flushes.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&self, force: bool) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if force {
            self.forced.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// 小块、零冷却期的测试配置，便于观察池与链的行为。
pub fn small_config() -> EngineConfig {
    EngineConfig::default()
        .with_chunk_capacity(64)
        .with_buffer_pool(PoolConfig::new(4, 64, std::time::Duration::ZERO))
        .with_connection_pool(PoolConfig::new(2, 16, std::time::Duration::ZERO))
        .with_receive_limit(4096)
}

pub fn started(config: EngineConfig, recorder: &Arc<Recorder>) -> SocketEngine {
    let engine = SocketEngine::new(config, recorder.clone()).expect("构造引擎失败");
    engine.start().expect("启动引擎失败");
    engine
}

pub fn accept(engine: &SocketEngine, handle: &Arc<CountingHandle>) -> ConnId {
    engine
        .attach(handle.clone(), Origin::Inbound)
        .expect("接入连接失败")
}

pub fn frame(layout: HeaderLayout, flag: u16, body: &[u8]) -> Vec<u8> {
    let mut raw = [0u8; MAX_HEADER_LEN];
    let n = PackHeader::new(flag, body.len() as u32).encode(layout, &mut raw);
    let mut out = raw[..n].to_vec();
    out.extend_from_slice(body);
    out
}
