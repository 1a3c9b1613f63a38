use crate::runtime::context::Context;
use anyhow::Result;
use serde_json::Value;
use std::fmt::Debug;

/// 节点完成情况：本帧完成 / 若干秒后完成 / 永不自行完成
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WaitSpec {
    /// The operation finished within this time-slice.
    Done,
    /// Still running; the playback re-invokes `run` next frame. The
    /// seconds value is the payload's own estimate of remaining time and
    /// is advisory only.
    DoneAfter(f32),
    /// Never completes on its own (modal, input-driven operations).
    /// Only `skip` can terminate it; the playback polls once per tick.
    Forever,
}

/// 载荷接口：节点的具体操作实现
pub trait Payload: Send + Sync + Debug {
    /// 运行一个时间片
    /// Called every frame until it returns `Done`. A payload that spans
    /// frames must track its own first-invocation/continuation state and
    /// clear it on completion.
    fn run(&mut self, ctx: &Context, dt: f32) -> Result<WaitSpec>;

    /// Force semantic completion without the time cost. Must be
    /// idempotent, and must not replay side effects `run` already began.
    fn skip(&mut self, _ctx: &Context) -> Result<()> {
        Ok(())
    }
}

/// 载荷工厂/定义接口
pub trait PayloadDefinition: Send + Sync {
    fn name(&self) -> &str;
    fn validate(&self, params: &Value) -> Result<()>;
    fn prepare(&self, params: Value) -> Result<Box<dyn Payload>>;
}
