use crate::dsl::{BranchDoc, CutsceneDoc, NodeDoc, TransitionDoc};
use crate::payloads::PayloadRegistry;
use crate::runtime::condition::Condition;
use crate::runtime::error::RegieError;
use crate::runtime::sheet::{Branching, CheckArm, Cutscene, NodeId, Transition};
use std::collections::HashMap;

/// 两遍编译：先为所有节点分配身份并建立创作 id 索引，
/// 再在目标全部已知的前提下落实分支转移。
pub struct Compiler {
    id_map: HashMap<String, NodeId>,
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            id_map: HashMap::new(),
        }
    }

    pub fn compile(
        &mut self,
        doc: CutsceneDoc,
        registry: &PayloadRegistry,
    ) -> Result<Cutscene, RegieError> {
        if doc.nodes.is_empty() {
            return Err(RegieError::EmptySheet(doc.id));
        }

        let mut sheet = Cutscene::new(doc.id.clone(), doc.classification, doc.skippable);
        if let Some(name) = doc.name {
            sheet.name = name;
        }

        // Pass 1: instantiate payloads, assign identities
        for node_doc in &doc.nodes {
            if self.id_map.contains_key(&node_doc.id) {
                return Err(RegieError::DuplicateNodeId {
                    sheet: sheet.id.clone(),
                    node: node_doc.id.clone(),
                });
            }
            let payload = registry.prepare(&node_doc.payload, node_doc.params.clone())?;
            let id = sheet.push(
                &node_doc.id,
                payload,
                Branching::Single {
                    next: Transition::Halt,
                },
            );
            if let Some(node) = sheet.node_by_id_mut(id) {
                node.enabled = node_doc.enabled;
                node.breakpoint = node_doc.breakpoint;
            }
            self.id_map.insert(node_doc.id.clone(), id);
        }

        // Pass 2: lower branches now that every target resolves
        for node_doc in &doc.nodes {
            let branching = self.lower_branch(node_doc)?;
            let id = self.id_map[&node_doc.id];
            if let Some(node) = sheet.node_by_id_mut(id) {
                node.branching = branching;
            }
        }

        Ok(sheet)
    }

    fn lower_branch(&self, node_doc: &NodeDoc) -> Result<Branching, RegieError> {
        match &node_doc.branch {
            BranchDoc::Single { next } => Ok(Branching::Single {
                next: self.lower_transition(&node_doc.id, next)?,
            }),
            BranchDoc::Binary {
                condition,
                on_true,
                on_false,
            } => Ok(Branching::Binary {
                condition: Condition::compile(condition)?,
                on_true: self.lower_transition(&node_doc.id, on_true)?,
                on_false: self.lower_transition(&node_doc.id, on_false)?,
            }),
            BranchDoc::Multi { arms } => {
                let mut lowered = Vec::with_capacity(arms.len());
                for arm in arms {
                    lowered.push(CheckArm {
                        label: arm.label.clone(),
                        condition: arm.condition.as_deref().map(Condition::compile).transpose()?,
                        transition: self.lower_transition(&node_doc.id, &arm.then)?,
                    });
                }
                Ok(Branching::Multi { arms: lowered })
            }
            BranchDoc::Fanout { branches } => {
                let mut lowered = Vec::with_capacity(branches.len());
                for branch in branches {
                    lowered.push(self.lower_transition(&node_doc.id, branch)?);
                }
                Ok(Branching::Fanout { branches: lowered })
            }
        }
    }

    fn lower_transition(
        &self,
        source: &str,
        doc: &TransitionDoc,
    ) -> Result<Transition, RegieError> {
        Ok(match doc {
            TransitionDoc::Halt => Transition::Halt,
            TransitionDoc::Advance => Transition::Advance,
            TransitionDoc::JumpTo { target } => Transition::JumpTo(
                *self
                    .id_map
                    .get(target)
                    .ok_or_else(|| RegieError::UnknownTarget {
                        from_node: source.to_string(),
                        target: target.clone(),
                    })?,
            ),
            TransitionDoc::Invoke { sheet } => Transition::Invoke(sheet.clone()),
        })
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
