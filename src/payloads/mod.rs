use crate::runtime::error::RegieError;
use crate::runtime::node::{Payload, PayloadDefinition};
use serde_json::Value;
use std::collections::HashMap;

pub mod builtin;

/// 载荷工厂注册表：按 kind 名称实例化节点载荷
pub struct PayloadRegistry {
    defs: HashMap<String, Box<dyn PayloadDefinition>>,
}

impl PayloadRegistry {
    pub fn new() -> Self {
        Self {
            defs: HashMap::new(),
        }
    }

    pub fn register(&mut self, def: Box<dyn PayloadDefinition>) {
        self.defs.insert(def.name().to_string(), def);
    }

    pub fn get(&self, kind: &str) -> Option<&dyn PayloadDefinition> {
        self.defs.get(kind).map(|d| d.as_ref())
    }

    pub fn prepare(&self, kind: &str, params: Value) -> Result<Box<dyn Payload>, RegieError> {
        let def = self
            .defs
            .get(kind)
            .ok_or_else(|| RegieError::UnknownPayload(kind.to_string()))?;
        def.prepare(params).map_err(|e| RegieError::PayloadPrepare {
            kind: kind.to_string(),
            source: e,
        })
    }
}

impl Default for PayloadRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Register the builtin payload set (log, assign, wait, await_flag).
pub fn register_builtins(registry: &mut PayloadRegistry) {
    registry.register(Box::new(builtin::LogDefinition));
    registry.register(Box::new(builtin::AssignDefinition));
    registry.register(Box::new(builtin::WaitDefinition));
    registry.register(Box::new(builtin::AwaitFlagDefinition));
}
