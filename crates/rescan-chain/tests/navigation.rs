//! Integration test: drive a chain through source changes and stage
//! navigation, checking exactly which stages recompute and that every
//! displayed stage reflects the current source and parameters.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::{Arc, Mutex};

use image::Rgba;
use rescan_chain::{
    ChainConfig, Corner, Filter, FilterChain, FilterError, FilterParams, KeystoneParams,
    RecomputeMode, RecomputePlan, RgbaImage, RotationParams,
};

type Log = Arc<Mutex<Vec<usize>>>;

/// Wraps a real filter and records the stage index on every apply.
struct Recorded {
    index: usize,
    inner: Box<dyn Filter>,
    log: Log,
}

impl Filter for Recorded {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn apply(&self, input: &RgbaImage) -> Result<RgbaImage, FilterError> {
        self.log.lock().unwrap().push(self.index);
        self.inner.apply(input)
    }

    fn params(&self) -> Option<FilterParams> {
        self.inner.params()
    }

    fn set_params(&mut self, params: &FilterParams) -> Result<(), FilterError> {
        self.inner.set_params(params)
    }
}

fn recorded_chain(stages: &[FilterParams]) -> (FilterChain, Log) {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let filters = stages
        .iter()
        .enumerate()
        .map(|(i, params)| {
            Box::new(Recorded {
                index: i + 1,
                inner: params.build().unwrap(),
                log: Arc::clone(&log),
            }) as Box<dyn Filter>
        })
        .collect();
    (FilterChain::new(filters), log)
}

fn take(log: &Log) -> Vec<usize> {
    std::mem::take(&mut *log.lock().unwrap())
}

fn rotate_then_keystone() -> Vec<FilterParams> {
    vec![
        FilterParams::Rotation(RotationParams { degrees: 3.0 }),
        FilterParams::Keystone(KeystoneParams {
            corners: [
                Corner::new(0.1, 0.05),
                Corner::new(0.9, 0.0),
                Corner::new(1.0, 1.0),
                Corner::new(0.0, 0.95),
            ],
        }),
    ]
}

/// A page with a gradient so rotations and warps change most pixels.
fn scan(seed: u8) -> RgbaImage {
    RgbaImage::from_fn(32, 24, |x, y| {
        #[allow(clippy::cast_possible_truncation)]
        let v = ((x * 7 + y * 3) as u8).wrapping_add(seed);
        Rgba([v, v / 2, 255 - v, 255])
    })
}

/// Check `output[i] == f_i(output[i - 1])` for every stage up to the
/// active one.
fn assert_chain_invariant(chain: &FilterChain, stages: &[FilterParams]) {
    if chain.stage_output(0).is_none() {
        // Nothing can be derived before the first scan arrives.
        return;
    }
    let active = usize::try_from(chain.active_index()).unwrap_or(0);
    for i in 1..=active {
        let upstream = chain
            .stage_output(isize::try_from(i - 1).unwrap())
            .expect("upstream of an active stage must be computed");
        let expected = stages[i - 1].build().unwrap().apply(upstream).unwrap();
        let actual = chain
            .stage_output(isize::try_from(i).unwrap())
            .expect("stage up to active must be computed");
        assert_eq!(actual, &expected, "stage {i} is stale");
    }
}

#[test]
fn three_stage_scenario() {
    let stages = rotate_then_keystone();
    let (mut chain, log) = recorded_chain(&stages);
    assert_eq!(chain.len(), 3);

    chain.set_source(scan(0)).unwrap();
    assert!(take(&log).is_empty());

    // Forward to keystone: rotation then keystone.
    chain.select_stage(2).unwrap();
    assert_eq!(take(&log), vec![1, 2]);
    assert_chain_invariant(&chain, &stages);

    // Backward to rotation: nothing runs, cached output is returned.
    let cached = chain.stage_output(1).unwrap().clone();
    let shown = chain.select_stage(1).unwrap().unwrap().clone();
    assert!(take(&log).is_empty());
    assert_eq!(shown, cached);

    // Forward again from rotation: [1, 2] re-runs.
    chain.select_stage(2).unwrap();
    assert_eq!(take(&log), vec![1, 2]);
    assert_eq!(
        chain.last_recompute().unwrap().plan,
        RecomputePlan::Run { from: 1, to: 2 }
    );
    assert_chain_invariant(&chain, &stages);
}

#[test]
fn source_only_chain_never_invokes_anything() {
    let (mut chain, log) = recorded_chain(&[]);
    assert_eq!(chain.len(), 1);
    chain.set_source(scan(1)).unwrap();
    assert!(chain.select_stage(0).unwrap().is_none());
    assert_eq!(chain.active_output(), Some(&scan(1)));
    assert!(chain.select_stage(-1).unwrap().is_none());
    assert!(chain.active_output().is_none());
    // Clamps to the source stage, which selection never returns.
    assert!(chain.select_stage(5).unwrap().is_none());
    assert_eq!(chain.active_index(), 0);
    assert_eq!(chain.stage_output(0), Some(&scan(1)));
    assert!(take(&log).is_empty());
    assert_eq!(
        chain.last_recompute().unwrap().plan,
        RecomputePlan::Idle
    );
}

#[test]
fn selecting_source_or_nothing_never_recomputes() {
    let stages = rotate_then_keystone();
    let (mut chain, log) = recorded_chain(&stages);
    chain.set_source(scan(2)).unwrap();
    for requested in [0, -1, -7, 0] {
        chain.select_stage(requested).unwrap();
    }
    assert!(take(&log).is_empty());
}

#[test]
fn repeated_selection_is_bit_identical() {
    let stages = rotate_then_keystone();
    let (mut chain, log) = recorded_chain(&stages);
    chain.set_source(scan(3)).unwrap();

    let first = chain.select_stage(2).unwrap().unwrap().clone();
    take(&log);
    let second = chain.select_stage(2).unwrap().unwrap().clone();
    assert_eq!(take(&log), vec![2]);
    assert_eq!(first, second);
}

#[test]
fn invariant_holds_across_mixed_sequence() {
    let stages = rotate_then_keystone();
    let (mut chain, _log) = recorded_chain(&stages);

    // A fixed walk mixing navigation and source swaps.
    let steps: &[(Option<u8>, isize)] = &[
        (None, 1),
        (Some(4), 2),
        (None, 0),
        (None, 2),
        (Some(9), 1),
        (None, 2),
        (None, -1),
        (Some(17), 2),
        (None, 1),
        (None, 2),
    ];
    for &(source, select) in steps {
        if let Some(seed) = source {
            chain.set_source(scan(seed)).unwrap();
            assert_chain_invariant(&chain, &stages);
        }
        chain.select_stage(select).unwrap();
        assert_chain_invariant(&chain, &stages);
    }
}

#[test]
fn parameter_edit_propagates_downstream_only_to_active() {
    let stages = rotate_then_keystone();
    let (mut chain, log) = recorded_chain(&stages);
    chain.set_source(scan(5)).unwrap();
    chain.select_stage(2).unwrap();
    take(&log);

    let edited = FilterParams::Rotation(RotationParams { degrees: -2.0 });
    chain.set_stage_params(1, &edited).unwrap();
    assert_eq!(take(&log), vec![1, 2]);

    let mut expected_stages = stages;
    expected_stages[0] = edited;
    assert_chain_invariant(&chain, &expected_stages);
}

#[test]
fn parameter_edit_past_active_waits_for_selection() {
    let stages = rotate_then_keystone();
    let (mut chain, log) = recorded_chain(&stages);
    chain.set_source(scan(6)).unwrap();
    chain.select_stage(2).unwrap();
    chain.select_stage(1).unwrap();
    take(&log);

    let edited = FilterParams::Keystone(KeystoneParams::default());
    chain.set_stage_params(2, &edited).unwrap();
    assert!(take(&log).is_empty());
    assert!(chain.stage_output(2).is_none());

    chain.select_stage(2).unwrap();
    assert_eq!(take(&log), vec![1, 2]);
    assert_eq!(chain.stage_output(2), chain.stage_output(1));
}

#[test]
fn dirty_mode_from_config_skips_unchanged_stages() {
    let config = ChainConfig {
        recompute: RecomputeMode::Dirty,
        ..ChainConfig::default()
    };
    let mut chain = FilterChain::from_config(&config).unwrap();
    chain.set_source(scan(7)).unwrap();
    chain.select_stage(2).unwrap();
    assert_eq!(chain.last_recompute().unwrap().ran(), vec![1, 2]);
    chain.select_stage(1).unwrap();
    chain.select_stage(2).unwrap();
    let diag = chain.last_recompute().unwrap();
    assert!(diag.runs.is_empty());
    assert_eq!(diag.skipped, vec![1, 2]);
}
