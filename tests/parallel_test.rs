use anyhow::Result;
use regie::payloads::builtin::{AwaitFlagDefinition, WaitDefinition};
use regie::runtime::context::Context;
use regie::runtime::director::{Director, Mode};
use regie::runtime::node::{Payload, PayloadDefinition, WaitSpec};
use regie::runtime::sheet::{Branching, Classification, Cutscene, Transition};
use serde_json::json;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct Probe {
    tag: &'static str,
    trace: Arc<Mutex<Vec<String>>>,
}

impl Payload for Probe {
    fn run(&mut self, _ctx: &Context, _dt: f32) -> Result<WaitSpec> {
        self.trace.lock().unwrap().push(self.tag.to_string());
        Ok(WaitSpec::Done)
    }
}

fn probe(tag: &'static str, trace: &Arc<Mutex<Vec<String>>>) -> Box<dyn Payload> {
    Box::new(Probe {
        tag,
        trace: trace.clone(),
    })
}

fn halt() -> Branching {
    Branching::Single {
        next: Transition::Halt,
    }
}

fn advance() -> Branching {
    Branching::Single {
        next: Transition::Advance,
    }
}

#[test]
fn test_fanout_spawns_one_playback_per_branch() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let mut sheet = Cutscene::new("fanout", Classification::Blocking, true);
    let fan = sheet.push("fan", probe("fan", &trace), halt());
    let x = sheet.push("x", probe("x", &trace), halt());
    let y = sheet.push("y", probe("y", &trace), halt());
    let z = sheet.push("z", probe("z", &trace), halt());
    sheet.node_by_id_mut(fan).unwrap().branching = Branching::Fanout {
        branches: vec![
            Transition::JumpTo(x),
            Transition::JumpTo(y),
            Transition::JumpTo(z),
        ],
    };

    let mut director = Director::new();
    let origin = director.start_sheet(sheet.into_shared());

    // frame 1: the fan-out node runs, its own path halts, branches are
    // registered for the next frame
    director.tick_all(0.016);
    assert_eq!(trace.lock().unwrap().clone(), vec!["fan"]);
    assert!(!director.is_active(origin));
    assert_eq!(director.active_count(), 3);

    // frame 2: every branch advances independently
    director.tick_all(0.016);
    let seen = trace.lock().unwrap().clone();
    assert_eq!(seen, vec!["fan", "x", "y", "z"]);
    assert_eq!(director.active_count(), 0);
}

#[test]
fn test_fanout_branches_have_independent_cursors() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let mut sheet = Cutscene::new("staggered", Classification::Blocking, true);
    let fan = sheet.push("fan", probe("fan", &trace), halt());
    let slow = sheet.push(
        "slow",
        WaitDefinition.prepare(json!({ "seconds": 0.05 })).unwrap(),
        advance(),
    );
    sheet.push("slow_done", probe("slow_done", &trace), halt());
    let fast = sheet.push("fast", probe("fast", &trace), halt());
    sheet.node_by_id_mut(fan).unwrap().branching = Branching::Fanout {
        branches: vec![Transition::JumpTo(slow), Transition::JumpTo(fast)],
    };

    let mut director = Director::new();
    director.start_sheet(sheet.into_shared());

    director.tick_all(0.016); // fan
    director.tick_all(0.016); // fast finishes, slow starts waiting
    assert_eq!(trace.lock().unwrap().clone(), vec!["fan", "fast"]);
    assert_eq!(director.active_count(), 1);

    let mut frames = 0;
    while director.active_count() > 0 && frames < 20 {
        director.tick_all(0.016);
        frames += 1;
    }
    assert_eq!(
        trace.lock().unwrap().clone(),
        vec!["fan", "fast", "slow_done"]
    );
}

#[test]
fn test_killing_one_branch_leaves_the_others() {
    let mut sheet = Cutscene::new("brood", Classification::Blocking, true);
    let fan = sheet.push(
        "fan",
        WaitDefinition.prepare(json!({ "seconds": 0.0 })).unwrap(),
        halt(),
    );
    let a = sheet.push(
        "a",
        AwaitFlagDefinition.prepare(json!({ "flag": "go" })).unwrap(),
        halt(),
    );
    let b = sheet.push(
        "b",
        AwaitFlagDefinition.prepare(json!({ "flag": "go" })).unwrap(),
        halt(),
    );
    let c = sheet.push(
        "c",
        AwaitFlagDefinition.prepare(json!({ "flag": "go" })).unwrap(),
        halt(),
    );
    sheet.node_by_id_mut(fan).unwrap().branching = Branching::Fanout {
        branches: vec![
            Transition::JumpTo(a),
            Transition::JumpTo(b),
            Transition::JumpTo(c),
        ],
    };

    let mut director = Director::new();
    director.start_sheet(sheet.into_shared());
    director.tick_all(0.016);
    director.tick_all(0.016);
    assert_eq!(director.active_count(), 3);

    let victim = director.active_ids()[0];
    director.kill(victim);
    assert_eq!(director.active_count(), 2);

    director.tick_all(0.016);
    assert_eq!(director.active_count(), 2, "siblings keep running");

    director.context().set_var("go", json!(true));
    director.tick_all(0.016);
    assert_eq!(director.active_count(), 0);
}

#[test]
fn test_fanout_advance_branch_enters_next_node() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let mut sheet = Cutscene::new("mixed", Classification::Blocking, true);
    let fan = sheet.push("fan", probe("fan", &trace), halt());
    sheet.push("next_in_order", probe("next_in_order", &trace), halt());
    let far = sheet.push("far", probe("far", &trace), halt());
    sheet.node_by_id_mut(fan).unwrap().branching = Branching::Fanout {
        branches: vec![Transition::Advance, Transition::JumpTo(far)],
    };

    let mut director = Director::new();
    director.start_sheet(sheet.into_shared());
    director.tick_all(0.016);
    director.tick_all(0.016);

    assert_eq!(
        trace.lock().unwrap().clone(),
        vec!["fan", "next_in_order", "far"]
    );
}

#[test]
fn test_invoked_background_sheet_does_not_block() {
    let trace = Arc::new(Mutex::new(Vec::new()));

    let mut ambient = Cutscene::new("ambient", Classification::Background, true);
    ambient.push(
        "hum",
        AwaitFlagDefinition.prepare(json!({ "flag": "quiet" })).unwrap(),
        halt(),
    );

    let mut intro = Cutscene::new("intro", Classification::Blocking, true);
    intro.push("say", probe("say", &trace), advance());
    intro.push(
        "kickoff",
        probe("kickoff", &trace),
        Branching::Single {
            next: Transition::Invoke("ambient".to_string()),
        },
    );

    let mut director = Director::new();
    director.add_sheet(ambient);
    director.add_sheet(intro);
    director.start("intro").unwrap();

    assert_eq!(director.compute_mode(), Mode::Cutscene);
    director.tick_all(0.016);

    // the blocking sheet ended; the invoked one runs in the background
    assert_eq!(director.active_count(), 1);
    assert_eq!(director.compute_mode(), Mode::Normal);
}
