use crate::runtime::context::Context;
use crate::runtime::director::DialogueToken;
use crate::runtime::node::WaitSpec;
use crate::runtime::sheet::{Branching, Classification, Cutscene, NodeId, SheetHandle, Transition};
use std::sync::RwLockReadGuard;
use tracing::{error, info, warn};
use uuid::Uuid;

/// 单帧内节点链的步数上限
/// 同时约束 tick 的零时长链和 skip_to_end 的快进链，
/// 因此必须大于任何一张合法编排表的节点数。
pub const MAX_CHAIN_STEPS: usize = 256;

/// 播放状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Not started, or finished.
    Idle,
    Running,
    /// Stopped before a breakpointed node, waiting for `resume`.
    Paused,
    /// Fast-forward in progress.
    Skipping,
}

/// 游标在一轮推进中产生的调度副作用
/// Director 在整轮 tick 结束后统一落实 (节点不直接触碰调度器，
/// 与 Engine 收集 pending tasks 再 flush 的做法一致)。
#[derive(Default)]
pub struct TickEffects {
    pub spawns: Vec<Spawn>,
}

pub enum Spawn {
    /// A fan-out branch: a new playback over the same node collection,
    /// entering at `entry`.
    Branch { sheet: SheetHandle, entry: NodeId },
    /// Fire-and-forget start of a separately installed cutscene.
    Invoke { sheet_id: String },
}

enum Step {
    Continue,
    Wait,
    Pause,
    Finish,
}

/// 图游标 ("List")：沿着一张 Cutscene 的一次实时遍历
/// 游标只属于本播放；并发来自多个 Playback 各持独立游标，绝不共享。
pub struct Playback {
    id: Uuid,
    sheet: SheetHandle,
    cursor: Option<usize>,
    state: PlaybackState,
    parked_dialogue: Option<DialogueToken>,
    // breakpoint already acknowledged at this node; cleared on movement
    bp_released: Option<NodeId>,
}

impl Playback {
    pub fn new(sheet: SheetHandle) -> Self {
        Self {
            id: Uuid::new_v4(),
            sheet,
            cursor: None,
            state: PlaybackState::Idle,
            parked_dialogue: None,
            bp_released: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn sheet(&self) -> &SheetHandle {
        &self.sheet
    }

    pub fn sheet_id(&self) -> String {
        self.sheet_read().id.clone()
    }

    pub fn classification(&self) -> Classification {
        self.sheet_read().classification
    }

    pub fn is_skippable(&self) -> bool {
        self.sheet_read().skippable
    }

    /// Attach a dialogue session to resume when this playback finishes
    /// normally.
    pub fn park_dialogue(&mut self, token: DialogueToken) {
        self.parked_dialogue = Some(token);
    }

    pub fn take_parked_dialogue(&mut self) -> Option<DialogueToken> {
        self.parked_dialogue.take()
    }

    /// `Idle -> Running`: cursor moves to the entry node.
    pub fn start(&mut self) {
        if self.state != PlaybackState::Idle {
            return;
        }
        if self.sheet_read().is_empty() {
            warn!(playback_id = %self.id, sheet = %self.sheet_id(), "Cutscene has no nodes, nothing to run");
            return;
        }
        self.cursor = Some(0);
        self.state = PlaybackState::Running;
    }

    /// Start at an explicit node (fan-out branches enter mid-sheet).
    pub fn start_at(&mut self, entry: NodeId) {
        if self.state != PlaybackState::Idle {
            return;
        }
        let resolved = self.sheet_read().index_of(entry);
        match resolved {
            Some(at) => {
                self.cursor = Some(at);
                self.state = PlaybackState::Running;
            }
            None => {
                warn!(playback_id = %self.id, target = ?entry, "Entry node no longer in cutscene, branch dropped");
            }
        }
    }

    /// Continue past a breakpoint pause.
    pub fn resume(&mut self) {
        if self.state == PlaybackState::Paused {
            self.state = PlaybackState::Running;
        }
    }

    /// Advance one frame: runs the node under the cursor and chains
    /// through zero-duration nodes until one reports it is still waiting,
    /// the path halts, or the step cap trips.
    pub fn tick(&mut self, ctx: &Context, dt: f32, effects: &mut TickEffects) {
        if self.state != PlaybackState::Running {
            return;
        }
        let mut steps = 0;
        loop {
            steps += 1;
            if steps > MAX_CHAIN_STEPS {
                self.kill_on_overflow();
                return;
            }
            match self.step_once(ctx, dt, false, effects) {
                Step::Continue => continue,
                Step::Wait => return,
                Step::Pause => {
                    self.state = PlaybackState::Paused;
                    info!(playback_id = %self.id, sheet = %self.sheet_id(), "Paused at breakpoint");
                    return;
                }
                Step::Finish => {
                    self.finish();
                    return;
                }
            }
        }
    }

    /// Fast-forward to the terminal state: every remaining node is
    /// `skip`ped instead of run, with no frame waits. Breakpoints are
    /// ignored. Bounded by the same step cap as `tick`.
    pub fn skip_to_end(&mut self, ctx: &Context, effects: &mut TickEffects) {
        if self.state == PlaybackState::Idle {
            return;
        }
        self.state = PlaybackState::Skipping;
        let mut steps = 0;
        loop {
            steps += 1;
            if steps > MAX_CHAIN_STEPS {
                self.kill_on_overflow();
                return;
            }
            match self.step_once(ctx, 0.0, true, effects) {
                Step::Continue => continue,
                Step::Finish => {
                    self.finish();
                    return;
                }
                // skip mode never yields these; keep draining if it does
                Step::Wait | Step::Pause => continue,
            }
        }
    }

    /// Hard stop: clears the cursor and releases any parked dialogue
    /// session without resuming it. Used for kills and scene teardown.
    pub fn halt_and_reset(&mut self) {
        if self.parked_dialogue.take().is_some() {
            info!(playback_id = %self.id, "Released parked dialogue session without resuming");
        }
        self.finish();
    }

    // Normal completion: parked dialogue stays attached for the
    // director's end-of-pass hand-off.
    fn finish(&mut self) {
        self.cursor = None;
        self.bp_released = None;
        self.state = PlaybackState::Idle;
    }

    fn kill_on_overflow(&mut self) {
        error!(
            playback_id = %self.id,
            sheet = %self.sheet_id(),
            cap = MAX_CHAIN_STEPS,
            "Node chain exceeded the step cap (zero-duration cycle?), killing playback"
        );
        self.halt_and_reset();
    }

    /// Runs (or skips) the node under the cursor and applies the outcome
    /// -> cursor update rule once.
    fn step_once(
        &mut self,
        ctx: &Context,
        dt: f32,
        skipping: bool,
        effects: &mut TickEffects,
    ) -> Step {
        let Some(cur) = self.cursor else {
            return Step::Finish;
        };

        // Run the payload under the write lock. The lock is taken through
        // the field directly so the guard borrows only `self.sheet`,
        // leaving the breakpoint bookkeeping writable.
        let wait = {
            let mut sheet = self.sheet.write().expect("cutscene lock poisoned");
            let Some(node) = sheet.node_mut(cur) else {
                // node vanished under us (authoring edit)
                return Step::Finish;
            };
            let node_id = node.id;

            if node.breakpoint && !skipping && self.bp_released != Some(node_id) {
                self.bp_released = Some(node_id);
                return Step::Pause;
            }

            if !node.enabled {
                None
            } else if skipping {
                if let Err(e) = node.payload.skip(ctx) {
                    error!(playback_id = %self.id, node = %node.label, error = ?e, "Payload fault during skip, halting path");
                    return Step::Finish;
                }
                Some(WaitSpec::Done)
            } else {
                match node.payload.run(ctx, dt) {
                    Ok(w) => Some(w),
                    Err(e) => {
                        error!(playback_id = %self.id, node = %node.label, error = ?e, "Payload fault, halting path");
                        return Step::Finish;
                    }
                }
            }
        };

        match wait {
            Some(WaitSpec::DoneAfter(_)) | Some(WaitSpec::Forever) => return Step::Wait,
            Some(WaitSpec::Done) => {}
            // disabled node: no-op pass-through to the next in order
            None => return self.apply(cur, Transition::Advance, effects),
        }

        // Resolve the outcome and its transition.
        let transition = {
            let sheet = self.sheet_read();
            let Some(node) = sheet.node(cur) else {
                return Step::Finish;
            };
            match &node.branching {
                Branching::Fanout { branches } => {
                    self.fan_out(&sheet, cur, branches, effects);
                    // fan-out is plural: every branch became its own
                    // playback, this path is done
                    return Step::Finish;
                }
                branching => {
                    let Some(outcome) = branching.resolve_outcome(ctx) else {
                        warn!(playback_id = %self.id, node = %node.label, "No outcome matched, halting path");
                        return Step::Finish;
                    };
                    match branching.transition(outcome) {
                        Some(t) => t.clone(),
                        None => return Step::Finish,
                    }
                }
            }
        };

        self.apply(cur, transition, effects)
    }

    fn apply(&mut self, cur: usize, transition: Transition, effects: &mut TickEffects) -> Step {
        match transition {
            Transition::Halt => Step::Finish,
            Transition::Advance => {
                if cur + 1 < self.sheet_read().len() {
                    self.move_cursor(cur + 1)
                } else {
                    Step::Finish
                }
            }
            Transition::JumpTo(target) => {
                let resolved = self.sheet_read().index_of(target);
                match resolved {
                    Some(at) => self.move_cursor(at),
                    None => {
                        warn!(playback_id = %self.id, target = ?target, "Jump target no longer in cutscene, halting path");
                        Step::Finish
                    }
                }
            }
            Transition::Invoke(sheet_id) => {
                effects.spawns.push(Spawn::Invoke { sheet_id });
                Step::Finish
            }
        }
    }

    fn fan_out(
        &self,
        sheet: &Cutscene,
        cur: usize,
        branches: &[Transition],
        effects: &mut TickEffects,
    ) {
        for branch in branches {
            match branch {
                Transition::Halt => {}
                Transition::Advance => match sheet.id_at(cur + 1) {
                    Some(entry) => effects.spawns.push(Spawn::Branch {
                        sheet: self.sheet.clone(),
                        entry,
                    }),
                    None => {
                        warn!(playback_id = %self.id, "Fan-out branch advances past the last node, branch dropped");
                    }
                },
                Transition::JumpTo(target) => {
                    if sheet.index_of(*target).is_some() {
                        effects.spawns.push(Spawn::Branch {
                            sheet: self.sheet.clone(),
                            entry: *target,
                        });
                    } else {
                        warn!(playback_id = %self.id, target = ?target, "Fan-out target no longer in cutscene, branch dropped");
                    }
                }
                Transition::Invoke(sheet_id) => effects.spawns.push(Spawn::Invoke {
                    sheet_id: sheet_id.clone(),
                }),
            }
        }
    }

    fn move_cursor(&mut self, at: usize) -> Step {
        self.cursor = Some(at);
        self.bp_released = None;
        Step::Continue
    }

    fn sheet_read(&self) -> RwLockReadGuard<'_, Cutscene> {
        self.sheet.read().expect("cutscene lock poisoned")
    }
}

impl std::fmt::Debug for Playback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Playback")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("cursor", &self.cursor)
            .finish()
    }
}
