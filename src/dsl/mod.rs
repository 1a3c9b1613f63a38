pub mod builder;

use crate::runtime::sheet::Classification;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// 原始编排文档：过场的创作格式 (非规范性，运行时核心不依赖它)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CutsceneDoc {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub classification: Classification,
    #[serde(default = "default_true")]
    pub skippable: bool,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    pub nodes: Vec<NodeDoc>,
}

/// 文档中的一个节点
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeDoc {
    pub id: String,
    /// 载荷类型名称 (e.g. "log", "wait", "await_flag")
    pub payload: String,
    /// 传给 PayloadDefinition::prepare 的配置参数
    #[serde(default)]
    pub params: Value,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub breakpoint: bool,
    #[serde(default)]
    pub branch: BranchDoc,
}

/// 文档中的分支形态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum BranchDoc {
    Single {
        #[serde(default)]
        next: TransitionDoc,
    },
    Binary {
        condition: String,
        on_true: TransitionDoc,
        on_false: TransitionDoc,
    },
    Multi {
        arms: Vec<ArmDoc>,
    },
    Fanout {
        branches: Vec<TransitionDoc>,
    },
}

impl Default for BranchDoc {
    fn default() -> Self {
        BranchDoc::Single {
            next: TransitionDoc::Advance,
        }
    }
}

/// 多路分支的一个出口；condition 缺省时按顺序充当默认出口
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArmDoc {
    pub label: String,
    #[serde(default)]
    pub condition: Option<String>,
    pub then: TransitionDoc,
}

/// 文档中的转移，目标以创作 id 引用
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum TransitionDoc {
    Halt,
    Advance,
    JumpTo { target: String },
    Invoke { sheet: String },
}

impl Default for TransitionDoc {
    fn default() -> Self {
        TransitionDoc::Advance
    }
}

impl TransitionDoc {
    pub fn jump(target: &str) -> Self {
        TransitionDoc::JumpTo {
            target: target.to_string(),
        }
    }

    pub fn invoke(sheet: &str) -> Self {
        TransitionDoc::Invoke {
            sheet: sheet.to_string(),
        }
    }
}

fn default_true() -> bool {
    true
}
