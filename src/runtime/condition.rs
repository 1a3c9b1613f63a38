use crate::runtime::context::Context;
use crate::runtime::error::RegieError;
use evalexpr::{
    ContextWithMutableVariables, DefaultNumericTypes, HashMapContext, Node as EvalNode,
    build_operator_tree, eval_with_context,
};
use serde_json::{Value, json};
use tracing::error;

/// 预编译的分支条件
/// 表达式在构建期编译一次，运行期逐帧求值。求值失败视为 false 并记录日志。
#[derive(Debug)]
pub struct Condition {
    compiled: EvalNode,
    raw: String,
}

impl Condition {
    pub fn compile(expr: &str) -> Result<Self, RegieError> {
        let compiled = build_operator_tree(expr).map_err(|e| RegieError::BadCondition {
            expr: expr.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            compiled,
            raw: expr.to_string(),
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn eval(&self, ctx: &Context) -> bool {
        let eval_ctx = build_eval_context(ctx);
        self.compiled
            .eval_boolean_with_context(&eval_ctx)
            .unwrap_or_else(|e| {
                error!(condition = %self.raw, error = %e, "Condition evaluation failed, treating as false");
                false
            })
    }
}

/// Evaluate a free-form expression against the context, returning a JSON
/// value. Used by the `assign` payload's expression form.
pub fn eval_expression(expr: &str, ctx: &Context) -> Option<Value> {
    let eval_ctx = build_eval_context(ctx);
    match eval_with_context(expr, &eval_ctx) {
        Ok(result) => match result {
            evalexpr::Value::String(s) => Some(Value::String(s)),
            evalexpr::Value::Int(i) => Some(json!(i)),
            evalexpr::Value::Float(f) => Some(json!(f)),
            evalexpr::Value::Boolean(b) => Some(Value::Bool(b)),
            _ => None,
        },
        Err(e) => {
            error!(expression = expr, error = %e, "Expression evaluation failed");
            None
        }
    }
}

fn build_eval_context(ctx: &Context) -> HashMapContext<DefaultNumericTypes> {
    let mut eval_ctx = HashMapContext::<DefaultNumericTypes>::new();
    for (k, v) in ctx.all_vars() {
        let eval_val = match v {
            Value::String(s) => Some(evalexpr::Value::String(s)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(evalexpr::Value::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Some(evalexpr::Value::Float(f))
                } else {
                    None
                }
            }
            Value::Bool(b) => Some(evalexpr::Value::Boolean(b)),
            _ => None,
        };
        if let Some(ev) = eval_val {
            let _ = eval_ctx.set_value(k, ev);
        }
    }
    eval_ctx
}
