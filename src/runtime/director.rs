use crate::compiler::core::Compiler;
use crate::dsl::CutsceneDoc;
use crate::payloads::PayloadRegistry;
use crate::runtime::context::Context;
use crate::runtime::error::RegieError;
use crate::runtime::node::PayloadDefinition;
use crate::runtime::playback::{Playback, PlaybackState, Spawn, TickEffects};
use crate::runtime::sheet::{Classification, Cutscene, SheetHandle};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// skip_all_blocking 的轮数上限 (跳过一张表可能连锁启动/结束其它表)
pub const MAX_SKIP_PASSES: usize = 20;

/// 全局执行模式：由当前活跃播放集合推导，永不单独存储
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    /// At least one blocking cutscene is live.
    Cutscene,
    /// The pause menu is on-screen.
    Paused,
    /// A dialogue choice session is active.
    DialogChoice,
}

/// 对话会话令牌：由对话系统发放，过场结束时原样交还
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialogueToken(pub Uuid);

/// 对话/暂停界面协作方的窄接口
pub trait DialogueHost: Send + Sync {
    fn is_choice_active(&self) -> bool;
    fn is_pause_menu_on(&self) -> bool;
    /// Hands control back to a parked dialogue session.
    fn resume_session(&self, token: DialogueToken);
}

/// 调度器/登记表 ("Manager")
/// 唯一拥有"哪些播放存活"这一事实；每帧由宿主循环调用一次 tick_all。
pub struct Director {
    registry: PayloadRegistry,
    // Installed cutscenes by id (invoke targets resolve here)
    library: DashMap<String, SheetHandle>,
    active: Vec<Playback>,
    context: Arc<Context>,
    dialogue: Option<Arc<dyn DialogueHost>>,
}

impl Director {
    pub fn new() -> Self {
        Self {
            registry: PayloadRegistry::new(),
            library: DashMap::new(),
            active: Vec::new(),
            context: Arc::new(Context::new()),
            dialogue: None,
        }
    }

    pub fn register_payload(&mut self, def: Box<dyn PayloadDefinition>) {
        self.registry.register(def);
    }

    pub fn payload_registry(&self) -> &PayloadRegistry {
        &self.registry
    }

    pub fn payload_registry_mut(&mut self) -> &mut PayloadRegistry {
        &mut self.registry
    }

    pub fn set_dialogue_host(&mut self, host: Arc<dyn DialogueHost>) {
        self.dialogue = Some(host);
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Compile an authoring document and add it to the library.
    pub fn install(&self, doc: CutsceneDoc) -> Result<SheetHandle, RegieError> {
        let sheet = Compiler::new().compile(doc, &self.registry)?;
        Ok(self.add_sheet(sheet))
    }

    /// Add an already-built cutscene to the library.
    pub fn add_sheet(&self, sheet: Cutscene) -> SheetHandle {
        let id = sheet.id.clone();
        let handle = sheet.into_shared();
        self.library.insert(id, handle.clone());
        handle
    }

    pub fn sheet(&self, sheet_id: &str) -> Option<SheetHandle> {
        self.library.get(sheet_id).map(|s| s.value().clone())
    }

    /// Start an installed cutscene by id.
    pub fn start(&mut self, sheet_id: &str) -> Result<Uuid, RegieError> {
        let sheet = self
            .library
            .get(sheet_id)
            .map(|s| s.value().clone())
            .ok_or_else(|| RegieError::SheetNotFound(sheet_id.to_string()))?;
        Ok(self.start_sheet(sheet))
    }

    /// Start a playback over an arbitrary sheet handle.
    pub fn start_sheet(&mut self, sheet: SheetHandle) -> Uuid {
        let mut playback = Playback::new(sheet);
        playback.start();
        self.register(playback)
    }

    // Set membership by identity; re-registering a live playback is a
    // no-op.
    fn register(&mut self, playback: Playback) -> Uuid {
        let id = playback.id();
        if self.active.iter().any(|p| p.id() == id) {
            return id;
        }
        self.active.push(playback);
        id
    }

    /// Advance every running playback by one frame, in registration
    /// order. Playbacks that finish during the pass are removed after the
    /// full pass completes, and branches/invocations they spawned join
    /// the registry for the next frame.
    pub fn tick_all(&mut self, dt: f32) {
        let ctx = self.context.clone();
        let mut effects = TickEffects::default();
        for playback in self.active.iter_mut() {
            playback.tick(&ctx, dt, &mut effects);
        }
        self.prune_finished();
        self.flush(effects);
    }

    /// 推导全局模式：纯函数，按需重算，绝不缓存过期值
    pub fn compute_mode(&self) -> Mode {
        let any_blocking = self
            .active
            .iter()
            .any(|p| p.state() != PlaybackState::Idle && p.classification() == Classification::Blocking);
        if any_blocking {
            return Mode::Cutscene;
        }
        if let Some(host) = &self.dialogue {
            if host.is_pause_menu_on() {
                return Mode::Paused;
            }
            if host.is_choice_active() {
                return Mode::DialogChoice;
            }
        }
        Mode::Normal
    }

    /// Fast-forward every blocking, skippable cutscene. Skipping one can
    /// chain-start others, so passes repeat until the mode leaves
    /// `Cutscene` or the pass cap trips (logged, non-fatal).
    pub fn skip_all_blocking(&mut self) {
        let ctx = self.context.clone();
        for _ in 0..MAX_SKIP_PASSES {
            if self.compute_mode() != Mode::Cutscene {
                return;
            }
            let mut effects = TickEffects::default();
            let mut skipped = 0usize;
            for playback in self.active.iter_mut() {
                if playback.classification() == Classification::Blocking
                    && playback.is_skippable()
                    && playback.state() != PlaybackState::Idle
                {
                    playback.skip_to_end(&ctx, &mut effects);
                    skipped += 1;
                }
            }
            self.prune_finished();
            self.flush(effects);
            if skipped == 0 {
                // only non-skippable blocking cutscenes remain
                return;
            }
        }
        warn!(
            cap = MAX_SKIP_PASSES,
            "skip_all_blocking reached the pass cap with blocking cutscenes still live"
        );
    }

    /// Kill one playback: hard reset, no dialogue resume. Unknown ids are
    /// a no-op (lifecycle calls may race scene teardown).
    pub fn kill(&mut self, id: Uuid) {
        if let Some(at) = self.active.iter().position(|p| p.id() == id) {
            let mut playback = self.active.remove(at);
            playback.halt_and_reset();
        }
    }

    /// Scene teardown / load path: hard-reset everything and clear the
    /// registry.
    pub fn kill_all(&mut self) {
        for playback in self.active.iter_mut() {
            playback.halt_and_reset();
        }
        self.active.clear();
    }

    /// Attach a dialogue session to a live playback; the session resumes
    /// when that playback finishes normally.
    pub fn attach_dialogue(&mut self, id: Uuid, token: DialogueToken) -> bool {
        match self.active.iter_mut().find(|p| p.id() == id) {
            Some(playback) => {
                playback.park_dialogue(token);
                true
            }
            None => false,
        }
    }

    /// Continue a playback paused at a breakpoint.
    pub fn resume(&mut self, id: Uuid) -> bool {
        match self.active.iter_mut().find(|p| p.id() == id) {
            Some(playback) => {
                playback.resume();
                true
            }
            None => false,
        }
    }

    /// Persistence probe: snapshotting is only safe with nothing running.
    pub fn on_before_save(&self) -> bool {
        self.compute_mode() == Mode::Normal
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, id: Uuid) -> bool {
        self.active.iter().any(|p| p.id() == id)
    }

    pub fn active_ids(&self) -> Vec<Uuid> {
        self.active.iter().map(|p| p.id()).collect()
    }

    pub fn playback(&self, id: Uuid) -> Option<&Playback> {
        self.active.iter().find(|p| p.id() == id)
    }

    // Deferred removal: drop finished playbacks only between passes, and
    // hand parked dialogue sessions back on the way out.
    fn prune_finished(&mut self) {
        let (finished, alive): (Vec<_>, Vec<_>) = std::mem::take(&mut self.active)
            .into_iter()
            .partition(|p| p.state() == PlaybackState::Idle);
        self.active = alive;
        for mut playback in finished {
            self.end_chain(&mut playback);
        }
    }

    // A finished graph with a parked dialogue session hands control back
    // to that session instead of falling through to normal play.
    fn end_chain(&self, playback: &mut Playback) {
        if let Some(token) = playback.take_parked_dialogue() {
            match &self.dialogue {
                Some(host) => {
                    info!(playback_id = %playback.id(), "Cutscene finished, resuming parked dialogue session");
                    host.resume_session(token);
                }
                None => {
                    warn!(playback_id = %playback.id(), "Parked dialogue session but no dialogue host registered");
                }
            }
        }
    }

    fn flush(&mut self, effects: TickEffects) {
        for spawn in effects.spawns {
            match spawn {
                Spawn::Branch { sheet, entry } => {
                    let mut playback = Playback::new(sheet);
                    playback.start_at(entry);
                    if playback.state() == PlaybackState::Running {
                        self.register(playback);
                    }
                }
                Spawn::Invoke { sheet_id } => {
                    let sheet = self.library.get(&sheet_id).map(|s| s.value().clone());
                    match sheet {
                        Some(sheet) => {
                            self.start_sheet(sheet);
                        }
                        None => {
                            warn!(sheet_id = %sheet_id, "Invoked cutscene is not installed, ignoring");
                        }
                    }
                }
            }
        }
    }
}

impl Default for Director {
    fn default() -> Self {
        Self::new()
    }
}
