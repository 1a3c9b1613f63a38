use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;

/// 运行时上下文 (Runtime Context)
/// 所有播放共享的全局变量表：分支条件读取它，载荷读写它。
/// 过场脚本检查的是游戏状态标志，其生命周期长于任何一次播放，
/// 因此作用域是全局的而不是按实例划分的。
pub struct Context {
    vars: DashMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            vars: DashMap::new(),
        }
    }

    pub fn get_var(&self, key: &str) -> Option<Value> {
        self.vars.get(key).map(|v| v.value().clone())
    }

    pub fn set_var(&self, key: &str, value: Value) {
        self.vars.insert(key.to_string(), value);
    }

    pub fn seed(&self, initial: HashMap<String, Value>) {
        for (k, v) in initial {
            self.vars.insert(k, v);
        }
    }

    /// Truthiness used by flag-gated payloads: present, and not
    /// false/null/0/"".
    pub fn is_truthy(&self, key: &str) -> bool {
        match self.get_var(key) {
            Some(Value::Bool(b)) => b,
            Some(Value::Null) | None => false,
            Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }

    pub fn all_vars(&self) -> HashMap<String, Value> {
        let mut map = HashMap::new();
        for item in self.vars.iter() {
            map.insert(item.key().clone(), item.value().clone());
        }
        map
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
