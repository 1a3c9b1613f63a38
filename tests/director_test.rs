use regie::payloads::builtin::{AwaitFlagDefinition, WaitDefinition};
use regie::payloads::register_builtins;
use regie::runtime::director::{DialogueHost, DialogueToken, Director, Mode};
use regie::runtime::node::PayloadDefinition;
use regie::runtime::sheet::{Branching, Classification, Cutscene, Transition};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Default)]
struct StubDialogue {
    choice_active: AtomicBool,
    pause_on: AtomicBool,
    resumed: Mutex<Vec<DialogueToken>>,
}

impl DialogueHost for StubDialogue {
    fn is_choice_active(&self) -> bool {
        self.choice_active.load(Ordering::SeqCst)
    }

    fn is_pause_menu_on(&self) -> bool {
        self.pause_on.load(Ordering::SeqCst)
    }

    fn resume_session(&self, token: DialogueToken) {
        self.resumed.lock().unwrap().push(token);
    }
}

// A sheet that stays live until `flag` is set.
fn gated_sheet(id: &str, classification: Classification, skippable: bool, flag: &str) -> Cutscene {
    let mut sheet = Cutscene::new(id, classification, skippable);
    sheet.push(
        "gate",
        AwaitFlagDefinition.prepare(json!({ "flag": flag })).unwrap(),
        Branching::Single {
            next: Transition::Halt,
        },
    );
    sheet
}

#[test]
fn test_mode_is_cutscene_iff_a_blocking_sheet_is_live() {
    let mut director = Director::new();
    assert_eq!(director.compute_mode(), Mode::Normal);

    let bg = director.start_sheet(
        gated_sheet("ambient", Classification::Background, true, "never").into_shared(),
    );
    director.tick_all(0.016);
    assert_eq!(director.compute_mode(), Mode::Normal);

    let blocking = director.start_sheet(
        gated_sheet("intro", Classification::Blocking, true, "never").into_shared(),
    );
    director.tick_all(0.016);
    assert_eq!(director.compute_mode(), Mode::Cutscene);

    director.kill(blocking);
    assert_eq!(director.compute_mode(), Mode::Normal);
    assert!(director.is_active(bg));
}

#[test]
fn test_mode_priority_over_dialogue_probes() {
    let host = Arc::new(StubDialogue::default());
    let mut director = Director::new();
    director.set_dialogue_host(host.clone());

    assert_eq!(director.compute_mode(), Mode::Normal);

    host.choice_active.store(true, Ordering::SeqCst);
    assert_eq!(director.compute_mode(), Mode::DialogChoice);

    // the pause menu outranks the choice session
    host.pause_on.store(true, Ordering::SeqCst);
    assert_eq!(director.compute_mode(), Mode::Paused);

    // a live blocking cutscene outranks both
    director.start_sheet(
        gated_sheet("intro", Classification::Blocking, true, "never").into_shared(),
    );
    assert_eq!(director.compute_mode(), Mode::Cutscene);
}

#[test]
fn test_kill_all_empties_registry() {
    let mut director = Director::new();
    for i in 0..3 {
        director.start_sheet(
            gated_sheet(&format!("s{}", i), Classification::Blocking, true, "never")
                .into_shared(),
        );
    }
    director.tick_all(0.016);
    assert_eq!(director.active_count(), 3);
    assert_eq!(director.compute_mode(), Mode::Cutscene);

    director.kill_all();

    assert_eq!(director.active_count(), 0);
    assert_eq!(director.compute_mode(), Mode::Normal);
}

#[test]
fn test_kill_is_idempotent() {
    let mut director = Director::new();
    let id = director.start_sheet(
        gated_sheet("solo", Classification::Blocking, true, "never").into_shared(),
    );

    director.kill(id);
    director.kill(id);
    director.kill(Uuid::new_v4());
    director.kill_all();

    assert_eq!(director.active_count(), 0);
}

#[test]
fn test_finished_cutscene_resumes_parked_dialogue() {
    let host = Arc::new(StubDialogue::default());
    let mut director = Director::new();
    director.set_dialogue_host(host.clone());

    let id = director.start_sheet(
        gated_sheet("talk", Classification::Blocking, true, "spoke").into_shared(),
    );
    let token = DialogueToken(Uuid::new_v4());
    assert!(director.attach_dialogue(id, token));

    director.tick_all(0.016);
    assert!(host.resumed.lock().unwrap().is_empty());

    director.context().set_var("spoke", json!(true));
    director.tick_all(0.016);

    assert_eq!(director.active_count(), 0);
    assert_eq!(*host.resumed.lock().unwrap(), vec![token]);
}

#[test]
fn test_killed_cutscene_releases_dialogue_without_resume() {
    let host = Arc::new(StubDialogue::default());
    let mut director = Director::new();
    director.set_dialogue_host(host.clone());

    let id = director.start_sheet(
        gated_sheet("talk", Classification::Blocking, true, "never").into_shared(),
    );
    assert!(director.attach_dialogue(id, DialogueToken(Uuid::new_v4())));

    director.kill_all();

    assert_eq!(director.active_count(), 0);
    assert!(
        host.resumed.lock().unwrap().is_empty(),
        "hard reset must not hand control back to dialogue"
    );
}

#[test]
fn test_skip_all_blocking_follows_invoke_chains() {
    let mut director = Director::new();
    register_builtins(director.payload_registry_mut());

    // finishing "first" invokes "second"; both must be skipped in one call
    let mut first = Cutscene::new("first", Classification::Blocking, true);
    first.push(
        "gate",
        AwaitFlagDefinition.prepare(json!({ "flag": "never" })).unwrap(),
        Branching::Single {
            next: Transition::Invoke("second".to_string()),
        },
    );
    director.add_sheet(first);
    director.add_sheet(gated_sheet("second", Classification::Blocking, true, "never"));

    director.start("first").unwrap();
    director.tick_all(0.016);
    assert_eq!(director.compute_mode(), Mode::Cutscene);

    director.skip_all_blocking();

    assert_eq!(director.active_count(), 0);
    assert_eq!(director.compute_mode(), Mode::Normal);
}

#[test]
fn test_skip_all_blocking_leaves_unskippable_sheets() {
    let mut director = Director::new();
    let stubborn = director.start_sheet(
        gated_sheet("locked", Classification::Blocking, false, "never").into_shared(),
    );
    let soft = director.start_sheet(
        gated_sheet("soft", Classification::Blocking, true, "never").into_shared(),
    );
    director.tick_all(0.016);

    director.skip_all_blocking();

    assert!(director.is_active(stubborn));
    assert!(!director.is_active(soft));
    assert_eq!(director.compute_mode(), Mode::Cutscene);
}

#[test]
fn test_on_before_save_tracks_mode() {
    let mut director = Director::new();
    assert!(director.on_before_save());

    director.start_sheet(
        gated_sheet("busy", Classification::Blocking, true, "done").into_shared(),
    );
    director.tick_all(0.016);
    assert!(!director.on_before_save());

    director.context().set_var("done", json!(true));
    director.tick_all(0.016);
    assert!(director.on_before_save());
}

#[test]
fn test_invoke_of_missing_sheet_is_non_fatal() {
    let mut director = Director::new();
    let mut sheet = Cutscene::new("caller", Classification::Blocking, true);
    sheet.push(
        "pause",
        WaitDefinition.prepare(json!({ "seconds": 0.01 })).unwrap(),
        Branching::Single {
            next: Transition::Invoke("ghost".to_string()),
        },
    );
    let id = director.start_sheet(sheet.into_shared());

    for _ in 0..5 {
        director.tick_all(0.016);
    }

    assert!(!director.is_active(id));
    assert_eq!(director.active_count(), 0);
    assert_eq!(director.compute_mode(), Mode::Normal);
}

#[test]
fn test_start_unknown_sheet_fails() {
    let mut director = Director::new();
    assert!(director.start("missing").is_err());
}

#[test]
fn test_tick_order_is_registration_order() {
    // determinism: repeated runs over the same graphs and conditions
    // visit nodes in the same order
    fn run_once() -> Vec<String> {
        let trace: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        #[derive(Debug)]
        struct Tag {
            name: &'static str,
            trace: Arc<Mutex<Vec<String>>>,
        }
        impl regie::runtime::node::Payload for Tag {
            fn run(
                &mut self,
                _ctx: &regie::runtime::context::Context,
                _dt: f32,
            ) -> anyhow::Result<regie::runtime::node::WaitSpec> {
                self.trace.lock().unwrap().push(self.name.to_string());
                Ok(regie::runtime::node::WaitSpec::Done)
            }
        }

        let mut director = Director::new();
        for name in ["one", "two", "three"] {
            let mut sheet = Cutscene::new(name, Classification::Background, true);
            sheet.push(
                name,
                Box::new(Tag {
                    name,
                    trace: trace.clone(),
                }),
                Branching::Single {
                    next: Transition::Halt,
                },
            );
            director.start_sheet(sheet.into_shared());
        }
        director.tick_all(0.016);
        let out = trace.lock().unwrap().clone();
        out
    }

    let first = run_once();
    assert_eq!(first, vec!["one", "two", "three"]);
    assert_eq!(first, run_once());
}
