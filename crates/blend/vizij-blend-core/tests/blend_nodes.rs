use approx::assert_relative_eq;
use vizij_blend_core::{idw_weights, linear_weights, ClipData, Config, GraphHost, Vec2};

fn nonzero(weights: &[f32]) -> Vec<usize> {
    weights
        .iter()
        .enumerate()
        .filter(|(_, w)| **w > 0.0)
        .map(|(i, _)| i)
        .collect()
}

/// it should shift nonzero weights monotonically rightward as the parameter grows
#[test]
fn linear_threshold_monotonicity() {
    let thresholds = [-1.0, 0.0, 0.5, 2.0, 3.5];
    let mut prev_max = 0usize;
    let mut prev_min = 0usize;
    let mut out = [0.0; 5];
    let mut value = -2.0f32;
    while value <= 4.0 {
        linear_weights(&thresholds, value, &mut out);
        assert_relative_eq!(out.iter().sum::<f32>(), 1.0, epsilon = 1e-5);
        let idx = nonzero(&out);
        let (min, max) = (idx[0], *idx.last().unwrap());
        assert!(max >= prev_max, "value={value} weights={out:?}");
        assert!(min >= prev_min, "value={value} weights={out:?}");
        prev_max = max;
        prev_min = min;
        value += 0.05;
    }
}

/// it should snap to a single child when the parameter sits on its position
#[test]
fn blend2d_exact_match() {
    let positions = [
        Vec2::new(0.0, 0.0),
        Vec2::new(1.0, 0.0),
        Vec2::new(0.0, 1.0),
        Vec2::new(-1.0, -1.0),
    ];
    for (i, p) in positions.iter().enumerate() {
        let mut out = [0.0; 4];
        idw_weights(&positions, *p, 1e-5, &mut out);
        for (j, w) in out.iter().enumerate() {
            assert_eq!(*w, if i == j { 1.0 } else { 0.0 });
        }
    }
}

/// it should keep linear children sorted and rewired when inserted out of order
#[test]
fn linear_mixer_through_host() {
    let mut host = GraphHost::headless(Config::default());
    let walk = host.load_clip(ClipData::new("walk", 1.0, true));
    let jog = host.load_clip(ClipData::new("jog", 0.8, true));
    let run = host.load_clip(ClipData::new("run", 0.6, true));

    let mut layer = host.layer(0);
    let locomotion = layer.create_linear_mixer();
    assert_eq!(layer.add_linear_child(locomotion, run, 2.0), Some(0));
    assert_eq!(layer.add_linear_child(locomotion, walk, 0.0), Some(0));
    assert_eq!(layer.add_linear_child(locomotion, jog, 1.0), Some(1));
    assert_eq!(layer.add_linear_child(locomotion, jog, f32::NAN), None);
    assert!(layer.set_linear_parameter(locomotion, 1.25));
    layer.play(locomotion, 0.0, false);

    let node = host.layer_ref(0).unwrap().node(locomotion).unwrap();
    let linear = node.as_linear().unwrap();
    assert_eq!(linear.thresholds(), &[0.0, 1.0, 2.0]);
    let clips: Vec<_> = node.children().iter().filter_map(|c| c.clip_id()).collect();
    assert_eq!(clips, vec![walk, jog, run]);
    assert_relative_eq!(linear.weights()[1], 0.75, epsilon = 1e-6);
    assert_relative_eq!(linear.weights()[2], 0.25, epsilon = 1e-6);

    // The backend mixer mirrors child order and weights.
    let handle = node.handle().unwrap();
    for (port, child) in node.children().iter().enumerate() {
        assert_eq!(host.backend().input(handle, port), child.handle());
        assert_relative_eq!(
            host.backend().input_weight(handle, port),
            linear.weights()[port],
            epsilon = 1e-6
        );
    }
}

/// it should leave weights at zero until a parameter is set
#[test]
fn blend2d_without_parameter_has_no_weight() {
    let mut host = GraphHost::headless(Config::default());
    let a = host.load_clip(ClipData::new("a", 1.0, true));
    let b = host.load_clip(ClipData::new("b", 1.0, true));
    let mut layer = host.layer(0);
    let blend = layer.create_blend2d();
    layer.add_blend2d_child(blend, a, Vec2::new(-1.0, 0.0));
    layer.add_blend2d_child(blend, b, Vec2::new(1.0, 0.0));
    assert_eq!(
        layer.node(blend).unwrap().as_blend2d().unwrap().weights(),
        &[0.0, 0.0]
    );

    assert!(layer.set_blend2d_parameter(blend, Vec2::new(0.5, 0.0)));
    let weights = layer.node(blend).unwrap().as_blend2d().unwrap().weights().to_vec();
    // distances 1.5 and 0.5
    assert_relative_eq!(weights[0], 0.25, epsilon = 1e-6);
    assert_relative_eq!(weights[1], 0.75, epsilon = 1e-6);

    assert!(!layer.set_linear_parameter(blend, 0.3));
}

/// it should normalize generic mixer weights and spread evenly when they sum to zero
#[test]
fn mixer_weights_are_normalized() {
    let mut host = GraphHost::headless(Config::default());
    let a = host.load_clip(ClipData::new("a", 1.0, true));
    let b = host.load_clip(ClipData::new("b", 1.0, true));
    let mut layer = host.layer(0);
    let mixer = layer.create_mixer();
    layer.add_mixer_child(mixer, a, 3.0);
    // The new child's weight is relative to the existing children's total of 1.
    layer.add_mixer_child(mixer, b, 1.0);
    assert_eq!(
        layer.node(mixer).unwrap().as_mixer().unwrap().weights(),
        &[0.5, 0.5]
    );
    assert!(layer.set_mixer_weights(mixer, &[3.0, 1.0]));
    assert_eq!(
        layer.node(mixer).unwrap().as_mixer().unwrap().weights(),
        &[0.75, 0.25]
    );
    assert!(layer.set_mixer_weights(mixer, &[0.0, 0.0]));
    assert_eq!(
        layer.node(mixer).unwrap().as_mixer().unwrap().weights(),
        &[0.5, 0.5]
    );
}
