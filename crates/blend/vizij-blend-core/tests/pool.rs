use vizij_blend_core::{BlendEvent, ClipData, ClipId, Config, GraphHost};

fn run(host: &mut GraphHost, seconds: f32) -> Vec<BlendEvent> {
    let mut events = Vec::new();
    let steps = (seconds / 0.1).round() as usize;
    for _ in 0..steps {
        events.extend(host.manual_update(0.1).events.iter().cloned());
    }
    events
}

fn two_clips(cfg: Config) -> (GraphHost, ClipId, ClipId) {
    let mut host = GraphHost::headless(cfg);
    let a = host.load_clip(ClipData::new("a", 1.0, true));
    let b = host.load_clip(ClipData::new("b", 1.0, true));
    (host, a, b)
}

/// it should hand back the same pooled node, rewound to time zero
#[test]
fn pool_round_trip_preserves_identity() {
    let (mut host, a, b) = two_clips(Config::default());
    let first = host.layer(0).play_clip(a, 0.0, false).unwrap();
    run(&mut host, 0.5);
    host.layer(0).play_clip(b, 0.3, false);

    // Still waiting out the cleanup delay.
    run(&mut host, 1.0);
    assert!(host.layer(0).is_pending_cleanup(first));
    assert!(!host.layer(0).is_pooled(first));

    let events = run(&mut host, 2.0);
    assert!(events.contains(&BlendEvent::NodeRecycled {
        layer: 0,
        node: first,
        clip: a,
    }));
    assert!(host.layer(0).is_pooled(first));
    assert_eq!(host.layer(0).port_of(first), None);
    assert_eq!(host.layer(0).pooled_count_for(a), 1);

    let again = host.layer(0).play_clip(a, 0.3, false).unwrap();
    assert_eq!(again, first);
    assert_eq!(host.layer(0).node_time(again), 0.0);
    assert_eq!(host.layer(0).pooled_count(), 0);
    assert!(host.layer(0).port_of(again).is_some());
}

/// it should cancel pending cleanup when a node is played again inside the delay
#[test]
fn replay_inside_delay_cancels_cleanup() {
    let (mut host, a, b) = two_clips(Config::default());
    let na = host.layer(0).play_clip(a, 0.0, false).unwrap();
    host.layer(0).play_clip(b, 0.0, false);
    assert!(host.layer(0).is_pending_cleanup(na));
    run(&mut host, 1.0);
    host.layer(0).play_clip(a, 0.2, false);
    assert!(!host.layer(0).is_pending_cleanup(na));
    run(&mut host, 3.0);
    let layer = host.layer_ref(0).unwrap();
    assert_eq!(layer.target(), Some(na));
    assert!(!layer.is_pooled(na));
    assert_eq!(layer.node_weight(na), 1.0);
}

/// it should destroy nodes that overflow the per-clip pool capacity
#[test]
fn overflow_is_destroyed() {
    let cfg = Config {
        pool_capacity: 0,
        ..Config::default()
    };
    let (mut host, a, b) = two_clips(cfg);
    let na = host.layer(0).play_clip(a, 0.0, false).unwrap();
    host.layer(0).play_clip(b, 0.0, false);
    let live_before = host.backend().live_count();
    let events = run(&mut host, 2.5);
    assert!(events.contains(&BlendEvent::NodeDestroyed { layer: 0, node: na }));
    assert!(!host.layer(0).contains(na));
    assert!(host.backend().live_count() < live_before);

    // A fresh node is created for the clip; the stale id stays dead.
    let fresh = host.layer(0).play_clip(a, 0.0, false).unwrap();
    assert_ne!(fresh, na);
    assert_eq!(fresh.index, na.index);
    assert!(!host.layer(0).contains(na));
}

/// it should never pool explicitly created composites; they idle and stay addressable
#[test]
fn composites_idle_instead_of_pooling() {
    let (mut host, a, b) = two_clips(Config::default());
    let mut layer = host.layer(0);
    let mixer = layer.create_mixer();
    layer.add_mixer_child(mixer, a, 1.0);
    layer.add_mixer_child(mixer, b, 1.0);
    layer.play(mixer, 0.0, false);
    layer.play_clip(a, 0.0, false);

    run(&mut host, 3.0);
    let layer = host.layer_ref(0).unwrap();
    assert!(layer.contains(mixer));
    assert!(!layer.is_pooled(mixer));
    assert_eq!(layer.port_of(mixer), None);
    assert_eq!(layer.pooled_count(), 0);

    let replay = host.layer(0).play(mixer, 0.0, false);
    assert_eq!(replay, Some(mixer));
    assert_eq!(host.layer(0).node_weight(mixer), 1.0);
}

/// it should reuse freed root-mixer ports before growing the input array
#[test]
fn ports_stay_bounded_under_switching() {
    let mut host = GraphHost::headless(Config::default());
    let clips: Vec<ClipId> = (0..6)
        .map(|i| host.load_clip(ClipData::new(format!("c{i}"), 1.0, true)))
        .collect();
    for round in 0..60 {
        host.layer(0).play_clip(clips[round % clips.len()], 0.1, false);
        run(&mut host, 0.5);
    }
    // Every clip switch waits 2s in cleanup, so at most ~6 ports are ever live at once.
    assert!(host.layer(0).port_count() <= 6);
}

/// it should release the backend handle of hard-destroyed nodes
#[test]
fn destroy_node_releases_handles() {
    let (mut host, a, _) = two_clips(Config::default());
    let node = host.layer(0).create_clip_node(a).unwrap();
    host.layer(0).play(node, 0.0, false);
    let handle = host.layer(0).node(node).unwrap().handle().unwrap();
    assert!(host.backend().is_alive(handle));
    assert!(host.layer(0).destroy_node(node));
    assert!(!host.backend().is_alive(handle));
    assert_eq!(host.layer(0).target(), None);
    assert_eq!(host.layer(0).free_port_count(), 1);
}
