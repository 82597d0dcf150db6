use hxsock_core::EngineConfig;
use tokio::runtime::{Builder, Runtime};

use crate::error::TcpError;

/// 按 `worker_threads` 构建多线程运行时，作为全部连接读写任务的固定工作线程池。
pub fn build_runtime(config: &EngineConfig) -> Result<Runtime, TcpError> {
    Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .thread_name("hxsock-worker")
        .enable_all()
        .build()
        .map_err(TcpError::Runtime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_uses_configured_workers() {
        let config = EngineConfig::default().with_worker_threads(2);
        let runtime = build_runtime(&config).expect("构建运行时失败");
        assert_eq!(runtime.metrics().num_workers(), 2);
    }
}
