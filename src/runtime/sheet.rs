use crate::runtime::condition::Condition;
use crate::runtime::context::Context;
use crate::runtime::node::Payload;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// 节点的稳定标识
/// 每张 Cutscene 内单调分配、永不复用；原始索引只是缓存，身份才是事实来源。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(u64);

/// 某个出口触发时的去向
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// This path stops advancing.
    Halt,
    /// Proceed to the next node in container order.
    Advance,
    /// Proceed to an explicit node of the same cutscene. If the target
    /// has been removed, the transition degrades to `Halt` at the moment
    /// it is taken.
    JumpTo(NodeId),
    /// Fire-and-forget start of a separate cutscene; this path halts.
    Invoke(String),
}

/// 多路检查的一个出口分支。条件为 None 的分支按顺序充当默认出口。
#[derive(Debug)]
pub struct CheckArm {
    pub label: String,
    pub condition: Option<Condition>,
    pub transition: Transition,
}

/// 节点的分支形态 (封闭枚举，所有调用点必须穷尽匹配)
#[derive(Debug)]
pub enum Branching {
    /// One outcome, one transition.
    Single { next: Transition },
    /// Boolean check with independent true/false transitions.
    Binary {
        condition: Condition,
        on_true: Transition,
        on_false: Transition,
    },
    /// Ordered labeled outcomes; the first matching arm is taken.
    Multi { arms: Vec<CheckArm> },
    /// Unconditional fan-out: every branch starts a concurrent playback
    /// over the same node collection.
    Fanout { branches: Vec<Transition> },
}

impl Branching {
    pub fn socket_count(&self) -> usize {
        match self {
            Branching::Single { .. } => 1,
            Branching::Binary { .. } => 2,
            Branching::Multi { arms } => arms.len(),
            Branching::Fanout { branches } => branches.len(),
        }
    }

    /// Evaluates which outcome occurs. `None` means no arm matched
    /// (multi-check only); fan-out nodes never resolve through here.
    pub fn resolve_outcome(&self, ctx: &Context) -> Option<usize> {
        match self {
            Branching::Single { .. } => Some(0),
            Branching::Binary { condition, .. } => {
                if condition.eval(ctx) { Some(0) } else { Some(1) }
            }
            Branching::Multi { arms } => arms.iter().position(|arm| match &arm.condition {
                Some(cond) => cond.eval(ctx),
                None => true,
            }),
            Branching::Fanout { .. } => Some(0),
        }
    }

    pub fn transition(&self, outcome: usize) -> Option<&Transition> {
        match self {
            Branching::Single { next } => (outcome == 0).then_some(next),
            Branching::Binary {
                on_true, on_false, ..
            } => match outcome {
                0 => Some(on_true),
                1 => Some(on_false),
                _ => None,
            },
            Branching::Multi { arms } => arms.get(outcome).map(|a| &a.transition),
            Branching::Fanout { branches } => branches.get(outcome),
        }
    }
}

/// 图中的一个节点：原子操作载荷 + 分支形态
#[derive(Debug)]
pub struct Node {
    pub id: NodeId,
    pub label: String,
    /// Disabled nodes are passed through without running their payload.
    pub enabled: bool,
    /// Debugging aid: playback pauses before running this node.
    pub breakpoint: bool,
    pub payload: Box<dyn Payload>,
    pub branching: Branching,
}

/// 图是否冻结常规玩法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// A cutscene: freezes ordinary gameplay while running.
    Blocking,
    /// Runs alongside normal play.
    Background,
}

impl Default for Classification {
    fn default() -> Self {
        Classification::Blocking
    }
}

/// Shared handle: fan-out playbacks traverse the same node collection,
/// and authoring edits go through the same lock.
pub type SheetHandle = Arc<RwLock<Cutscene>>;

/// 一张过场编排表：有序节点序列 + 身份索引
pub struct Cutscene {
    pub id: String,
    pub name: String,
    pub classification: Classification,
    pub skippable: bool,
    nodes: Vec<Node>,
    // NodeId -> current index, rebuilt on every structural edit
    index: HashMap<NodeId, usize>,
    next_id: u64,
}

impl Cutscene {
    pub fn new(id: impl Into<String>, classification: Classification, skippable: bool) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            classification,
            skippable,
            nodes: Vec::new(),
            index: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn push(&mut self, label: &str, payload: Box<dyn Payload>, branching: Branching) -> NodeId {
        let at = self.nodes.len();
        self.insert(at, label, payload, branching)
    }

    /// Insert a node at `at` (clamped to the container length). Existing
    /// jumps are unaffected: they target identities, and the index cache
    /// is rebuilt here.
    pub fn insert(
        &mut self,
        at: usize,
        label: &str,
        payload: Box<dyn Payload>,
        branching: Branching,
    ) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        let at = at.min(self.nodes.len());
        self.nodes.insert(
            at,
            Node {
                id,
                label: label.to_string(),
                enabled: true,
                breakpoint: false,
                payload,
                branching,
            },
        );
        self.reindex();
        id
    }

    /// Remove a node. Jumps that target it degrade to `Halt` when taken;
    /// jumps elsewhere keep resolving through the rebuilt cache.
    pub fn remove(&mut self, id: NodeId) -> bool {
        match self.index.get(&id).copied() {
            Some(at) => {
                self.nodes.remove(at);
                self.reindex();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Identity of the entry node, if any.
    pub fn entry(&self) -> Option<NodeId> {
        self.nodes.first().map(|n| n.id)
    }

    pub fn index_of(&self, id: NodeId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn id_at(&self, at: usize) -> Option<NodeId> {
        self.nodes.get(at).map(|n| n.id)
    }

    pub fn node(&self, at: usize) -> Option<&Node> {
        self.nodes.get(at)
    }

    pub fn node_mut(&mut self, at: usize) -> Option<&mut Node> {
        self.nodes.get_mut(at)
    }

    pub fn node_by_id(&self, id: NodeId) -> Option<&Node> {
        self.index_of(id).and_then(|at| self.node(at))
    }

    pub fn node_by_id_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.index_of(id).and_then(|at| self.nodes.get_mut(at))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn into_shared(self) -> SheetHandle {
        Arc::new(RwLock::new(self))
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (at, node) in self.nodes.iter().enumerate() {
            self.index.insert(node.id, at);
        }
    }
}

impl std::fmt::Debug for Cutscene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cutscene")
            .field("id", &self.id)
            .field("classification", &self.classification)
            .field("skippable", &self.skippable)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}
