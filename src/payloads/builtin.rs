use crate::runtime::condition::eval_expression;
use crate::runtime::context::Context;
use crate::runtime::node::{Payload, PayloadDefinition, WaitSpec};
use anyhow::{Result, anyhow};
use serde_json::Value;
use tracing::info;

// Resolve a "${var}" reference against the context. Only whole-string
// references are substituted.
fn resolve_ref(raw: &str, ctx: &Context) -> Value {
    if raw.starts_with("${") && raw.ends_with('}') {
        let var_name = &raw[2..raw.len() - 1];
        if let Some(val) = ctx.get_var(var_name) {
            return val;
        }
    }
    Value::String(raw.to_string())
}

// --- LOG ---

#[derive(Debug)]
pub struct LogPayload {
    message: String,
}

impl Payload for LogPayload {
    fn run(&mut self, ctx: &Context, _dt: f32) -> Result<WaitSpec> {
        match resolve_ref(&self.message, ctx) {
            Value::String(s) => info!("[CUE] {}", s),
            other => info!("[CUE] {}", other),
        }
        Ok(WaitSpec::Done)
    }
}

pub struct LogDefinition;

impl PayloadDefinition for LogDefinition {
    fn name(&self) -> &str {
        "log"
    }

    fn validate(&self, params: &Value) -> Result<()> {
        params
            .get("msg")
            .and_then(|v| v.as_str())
            .map(|_| ())
            .ok_or_else(|| anyhow!("Missing msg"))
    }

    fn prepare(&self, params: Value) -> Result<Box<dyn Payload>> {
        let message = params
            .get("msg")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("Missing msg"))?
            .to_string();
        Ok(Box::new(LogPayload { message }))
    }
}

// --- ASSIGN ---

/// 变量写入：字面值或 evalexpr 表达式 ("key = value" 或 "expression")
#[derive(Debug)]
pub struct AssignPayload {
    key: String,
    value: Option<Value>,
    expression: Option<String>,
}

impl Payload for AssignPayload {
    fn run(&mut self, ctx: &Context, _dt: f32) -> Result<WaitSpec> {
        if let Some(value) = &self.value {
            let resolved = match value {
                Value::String(s) => resolve_ref(s, ctx),
                other => other.clone(),
            };
            ctx.set_var(&self.key, resolved);
        } else if let Some(expr) = &self.expression {
            if let Some(result) = eval_expression(expr, ctx) {
                ctx.set_var(&self.key, result);
            }
        }
        Ok(WaitSpec::Done)
    }
}

pub struct AssignDefinition;

impl PayloadDefinition for AssignDefinition {
    fn name(&self) -> &str {
        "assign"
    }

    fn validate(&self, params: &Value) -> Result<()> {
        if params.get("key").and_then(|v| v.as_str()).is_none() {
            return Err(anyhow!("Missing key"));
        }
        if params.get("value").is_none() && params.get("expression").is_none() {
            return Err(anyhow!("Need value or expression"));
        }
        Ok(())
    }

    fn prepare(&self, params: Value) -> Result<Box<dyn Payload>> {
        let key = params
            .get("key")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("Missing key"))?
            .to_string();
        let value = params.get("value").cloned();
        let expression = params
            .get("expression")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        if value.is_none() && expression.is_none() {
            return Err(anyhow!("Need value or expression"));
        }
        Ok(Box::new(AssignPayload {
            key,
            value,
            expression,
        }))
    }
}

// --- WAIT ---

/// 定时等待：跨帧载荷的基本形态
/// `remaining` 记录首次调用/续跑状态，完成或被跳过时清除。
#[derive(Debug)]
pub struct WaitPayload {
    seconds: f32,
    remaining: Option<f32>,
}

impl Payload for WaitPayload {
    fn run(&mut self, _ctx: &Context, dt: f32) -> Result<WaitSpec> {
        let left = match self.remaining {
            // first invocation arms the countdown
            None => self.seconds,
            Some(r) => r - dt,
        };
        if left <= 0.0 {
            self.remaining = None;
            Ok(WaitSpec::Done)
        } else {
            self.remaining = Some(left);
            Ok(WaitSpec::DoneAfter(left))
        }
    }

    fn skip(&mut self, _ctx: &Context) -> Result<()> {
        self.remaining = None;
        Ok(())
    }
}

pub struct WaitDefinition;

impl PayloadDefinition for WaitDefinition {
    fn name(&self) -> &str {
        "wait"
    }

    fn validate(&self, params: &Value) -> Result<()> {
        params
            .get("seconds")
            .and_then(|v| v.as_f64())
            .map(|_| ())
            .ok_or_else(|| anyhow!("Missing seconds"))
    }

    fn prepare(&self, params: Value) -> Result<Box<dyn Payload>> {
        let seconds = params
            .get("seconds")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| anyhow!("Missing seconds"))? as f32;
        Ok(Box::new(WaitPayload {
            seconds,
            remaining: None,
        }))
    }
}

// --- AWAIT FLAG ---

/// 模态等待：每帧轮询一个上下文标志，永不自行完成
/// 输入驱动的节点就是这种形态，只有 skip 能强行结束它。
#[derive(Debug)]
pub struct AwaitFlagPayload {
    flag: String,
}

impl Payload for AwaitFlagPayload {
    fn run(&mut self, ctx: &Context, _dt: f32) -> Result<WaitSpec> {
        if ctx.is_truthy(&self.flag) {
            Ok(WaitSpec::Done)
        } else {
            Ok(WaitSpec::Forever)
        }
    }
}

pub struct AwaitFlagDefinition;

impl PayloadDefinition for AwaitFlagDefinition {
    fn name(&self) -> &str {
        "await_flag"
    }

    fn validate(&self, params: &Value) -> Result<()> {
        params
            .get("flag")
            .and_then(|v| v.as_str())
            .map(|_| ())
            .ok_or_else(|| anyhow!("Missing flag"))
    }

    fn prepare(&self, params: Value) -> Result<Box<dyn Payload>> {
        let flag = params
            .get("flag")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("Missing flag"))?
            .to_string();
        Ok(Box::new(AwaitFlagPayload { flag }))
    }
}
