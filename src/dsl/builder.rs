use crate::dsl::{ArmDoc, BranchDoc, CutsceneDoc, NodeDoc, TransitionDoc};
use crate::runtime::sheet::Classification;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// 流式构建创作文档，测试与程序化编排共用
pub struct CutsceneBuilder {
    id: String,
    name: Option<String>,
    classification: Classification,
    skippable: bool,
    variables: HashMap<String, Value>,
    nodes: Vec<NodeDoc>,
}

impl CutsceneBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            classification: Classification::Blocking,
            skippable: true,
            variables: HashMap::new(),
            nodes: Vec::new(),
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn background(mut self) -> Self {
        self.classification = Classification::Background;
        self
    }

    pub fn blocking(mut self) -> Self {
        self.classification = Classification::Blocking;
        self
    }

    pub fn skippable(mut self, skippable: bool) -> Self {
        self.skippable = skippable;
        self
    }

    pub fn var(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.variables.insert(key.to_string(), value.into());
        self
    }

    pub fn node(self, id: &str, payload: &str) -> NodeBuilder {
        NodeBuilder {
            owner: self,
            id: id.to_string(),
            payload: payload.to_string(),
            params: Map::new(),
            enabled: true,
            breakpoint: false,
            branch: BranchDoc::default(),
        }
    }

    pub fn build(self) -> CutsceneDoc {
        CutsceneDoc {
            id: self.id,
            name: self.name,
            classification: self.classification,
            skippable: self.skippable,
            variables: self.variables,
            nodes: self.nodes,
        }
    }
}

/// 单个节点的子构建器；build() 返回外层构建器
pub struct NodeBuilder {
    owner: CutsceneBuilder,
    id: String,
    payload: String,
    params: Map<String, Value>,
    enabled: bool,
    breakpoint: bool,
    branch: BranchDoc,
}

impl NodeBuilder {
    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn breakpoint(mut self) -> Self {
        self.breakpoint = true;
        self
    }

    pub fn halt(mut self) -> Self {
        self.branch = BranchDoc::Single {
            next: TransitionDoc::Halt,
        };
        self
    }

    pub fn jump_to(mut self, target: &str) -> Self {
        self.branch = BranchDoc::Single {
            next: TransitionDoc::jump(target),
        };
        self
    }

    pub fn invoke(mut self, sheet: &str) -> Self {
        self.branch = BranchDoc::Single {
            next: TransitionDoc::invoke(sheet),
        };
        self
    }

    pub fn binary(mut self, condition: &str, on_true: TransitionDoc, on_false: TransitionDoc) -> Self {
        self.branch = BranchDoc::Binary {
            condition: condition.to_string(),
            on_true,
            on_false,
        };
        self
    }

    pub fn multi(mut self, arms: Vec<ArmDoc>) -> Self {
        self.branch = BranchDoc::Multi { arms };
        self
    }

    pub fn fanout(mut self, branches: Vec<TransitionDoc>) -> Self {
        self.branch = BranchDoc::Fanout { branches };
        self
    }

    pub fn build(mut self) -> CutsceneBuilder {
        let params = if self.params.is_empty() {
            Value::Null
        } else {
            Value::Object(self.params)
        };
        self.owner.nodes.push(NodeDoc {
            id: self.id,
            payload: self.payload,
            params,
            enabled: self.enabled,
            breakpoint: self.breakpoint,
            branch: self.branch,
        });
        self.owner
    }
}
