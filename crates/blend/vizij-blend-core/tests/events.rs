use std::cell::RefCell;
use std::rc::Rc;

use vizij_blend_core::{BlendEvent, ClipData, Config, GraphHost};

fn recorder() -> (Rc<RefCell<Vec<f32>>>, impl FnMut(&BlendEvent) + 'static) {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    let listener = move |ev: &BlendEvent| {
        if let BlendEvent::ScheduledEvent { time, .. } = ev {
            sink.borrow_mut().push(*time);
        }
    };
    (log, listener)
}

/// it should fire a scheduled event exactly once even when one step jumps far past it
#[test]
fn large_step_fires_once() {
    let mut host = GraphHost::headless(Config::default());
    let clip = host.load_clip(ClipData::new("walk", 4.0, true));
    let node = host.layer(0).play_clip(clip, 0.0, false).unwrap();
    let (log, listener) = recorder();
    host.layer(0).add_scheduled_event(node, 0.5, listener).unwrap();

    host.manual_update(0.2);
    assert!(log.borrow().is_empty());
    let out = host.manual_update(3.0);
    assert_eq!(out.events.len(), 1);
    host.manual_update(0.2);
    assert_eq!(*log.borrow(), vec![0.5]);
}

/// it should not re-fire a consumed key after the cursor is rebuilt to zero
#[test]
fn rebuild_does_not_refire_consumed_key() {
    let mut host = GraphHost::headless(Config::default());
    let clip = host.load_clip(ClipData::new("walk", 4.0, true));
    let node = host.layer(0).play_clip(clip, 0.0, false).unwrap();
    let (log, listener) = recorder();
    host.layer(0).add_scheduled_event(node, 0.3, listener).unwrap();

    host.manual_update(0.4);
    assert_eq!(log.borrow().len(), 1);

    // Force a restart from time 0 and run through the key again.
    host.layer(0).play_clip(clip, 0.0, true);
    assert_eq!(host.layer(0).node_time(node), 0.0);
    host.manual_update(0.4);
    assert_eq!(log.borrow().len(), 1);
}

/// it should fire a key registered before a rebuild once the reset cursor reaches it
#[test]
fn key_armed_before_rebuild_fires_after_reset() {
    let mut host = GraphHost::headless(Config::default());
    let clip = host.load_clip(ClipData::new("walk", 4.0, true));
    let node = host.layer(0).play_clip(clip, 0.0, false).unwrap();
    host.manual_update(1.0);

    let (log, listener) = recorder();
    host.layer(0).play_clip(clip, 0.0, true);
    host.layer(0).add_scheduled_event(node, 0.5, listener).unwrap();
    host.manual_update(0.25);
    assert!(log.borrow().is_empty());
    host.manual_update(0.25);
    assert_eq!(*log.borrow(), vec![0.5]);
}

/// it should multicast listeners sharing one key and remove them individually or together
#[test]
fn shared_keys_and_removal() {
    let mut host = GraphHost::headless(Config::default());
    let clip = host.load_clip(ClipData::new("walk", 4.0, true));
    let node = host.layer(0).play_clip(clip, 0.0, false).unwrap();

    let (log, first) = recorder();
    let (_, second) = recorder();
    let (log3, third) = recorder();
    let mut layer = host.layer(0);
    layer.add_scheduled_event(node, 1.0, first).unwrap();
    let t2 = layer.add_scheduled_event(node, 1.0, second).unwrap();
    layer.add_scheduled_event(node, 2.0, third).unwrap();
    assert_eq!(layer.add_scheduled_event(node, -1.0, |_| {}), None);

    assert!(layer.remove_scheduled_event(node, 1.0, t2));
    assert!(!layer.remove_scheduled_event(node, 1.0, t2));
    assert_eq!(layer.remove_scheduled_events(node, 2.0), 1);

    host.manual_update(3.0);
    assert_eq!(*log.borrow(), vec![1.0]);
    assert!(log3.borrow().is_empty());
}

/// it should run on-finished once for a one-shot clip and then clear it
#[test]
fn on_finished_fires_once() {
    let mut host = GraphHost::headless(Config::default());
    let clip = host.load_clip(ClipData::new("jump", 0.5, false));
    let node = host.layer(0).play_clip(clip, 0.0, false).unwrap();

    let hits = Rc::new(RefCell::new(0));
    let h = hits.clone();
    host.layer(0)
        .on_finished(node, move |_| *h.borrow_mut() += 1)
        .unwrap();

    let mut finished = 0;
    for _ in 0..10 {
        let out = host.manual_update(0.1);
        finished += out
            .events
            .iter()
            .filter(|e| matches!(e, BlendEvent::NodeFinished { .. }))
            .count();
    }
    assert_eq!(*hits.borrow(), 1);
    assert_eq!(finished, 1);
    assert!(!host.layer(0).is_playing(node));
    assert_eq!(host.layer(0).node(node).unwrap().finished_listener_count(), 0);
}

/// it should report events of composite children with their child index
#[test]
fn composite_children_report_their_index() {
    let mut host = GraphHost::headless(Config::default());
    let walk = host.load_clip(ClipData::new("walk", 1.0, true));
    let wave = host.load_clip(ClipData::new("wave", 0.3, false));
    let mut layer = host.layer(0);
    let mixer = layer.create_mixer();
    layer.add_mixer_child(mixer, walk, 1.0);
    layer.add_mixer_child(mixer, wave, 1.0);
    layer.play(mixer, 0.0, false);

    let out = host.manual_update(0.5);
    assert!(out.events.contains(&BlendEvent::NodeFinished {
        layer: 0,
        node: mixer,
        child: Some(1),
    }));
}

/// it should not tick paused nodes, so their events wait
#[test]
fn paused_nodes_hold_events() {
    let mut host = GraphHost::headless(Config::default());
    let clip = host.load_clip(ClipData::new("walk", 4.0, true));
    let node = host.layer(0).play_clip(clip, 0.0, false).unwrap();
    let (log, listener) = recorder();
    host.layer(0).add_scheduled_event(node, 0.5, listener).unwrap();
    assert!(host.layer(0).pause(node));
    host.manual_update(1.0);
    assert!(log.borrow().is_empty());
    assert!(host.layer(0).is_paused(node));
    host.layer(0).resume(node);
    host.manual_update(0.6);
    assert_eq!(log.borrow().len(), 1);
}
