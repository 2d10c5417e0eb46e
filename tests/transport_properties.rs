// End-to-end transport behavior through the public API

use loopflip::audio::{SinkResult, sink::ScheduledTrigger};
use loopflip::{
    AudioSink, GridResolution, LoopWindow, Pattern, PatternBank, RolePool, RoleResolver,
    StepEvent, Transport, TransportError,
};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Default)]
struct SinkState {
    time: f64,
    scheduled: Vec<ScheduledTrigger>,
}

#[derive(Clone, Default)]
struct CollectingSink {
    state: Rc<RefCell<SinkState>>,
}

impl CollectingSink {
    fn advance(&self, seconds: f64) {
        self.state.borrow_mut().time += seconds;
    }

    fn scheduled(&self) -> Vec<ScheduledTrigger> {
        self.state.borrow().scheduled.clone()
    }
}

impl AudioSink for CollectingSink {
    fn clock_time(&self) -> SinkResult<f64> {
        Ok(self.state.borrow().time)
    }

    fn schedule(&mut self, trigger: ScheduledTrigger) -> SinkResult<()> {
        self.state.borrow_mut().scheduled.push(trigger);
        Ok(())
    }

    fn cancel_all(&mut self) {
        self.state.borrow_mut().scheduled.clear();
    }
}

fn roles() -> RoleResolver {
    RoleResolver::new(
        RolePool::new(vec![0, 8]),
        RolePool::new(vec![4]),
        RolePool::new(vec![2, 6]),
        RolePool::new(vec![]),
    )
}

/// Two-bar loop, 4 seconds, so the natural rate is 120 BPM and a sixteenth
/// step lasts 0.125s
fn setup() -> (Transport<CollectingSink>, CollectingSink) {
    let sink = CollectingSink::default();
    let mut bank = PatternBank::new();
    bank.insert(Pattern::main(1, "main", (0..32).map(StepEvent::slice).collect()));
    bank.insert(Pattern::fill(
        9,
        "fill",
        (0..16).map(|i| StepEvent::slice(200 + i)).collect(),
    ));
    let window = LoopWindow::new(0.0, 4.0, 2.0).unwrap();
    let transport = Transport::new(sink.clone(), bank, roles(), window);
    (transport, sink)
}

fn run(transport: &mut Transport<CollectingSink>, sink: &CollectingSink, seconds: f64) {
    let ticks = (seconds / 0.025).ceil() as usize;
    for _ in 0..ticks {
        transport.tick().unwrap();
        sink.advance(0.025);
    }
}

#[test]
fn fill_requested_mid_phrase_lands_on_the_next_phrase_line() {
    // Playing a two-bar loop at sixteenth resolution, a fill requested
    // while step 5 sounds begins at step 32, spans one bar, and the main
    // pattern resumes at step 48
    let (mut transport, sink) = setup();
    transport.start(1).unwrap();
    run(&mut transport, &sink, 0.7); // roughly step 5
    transport.request_fill(9).unwrap();
    run(&mut transport, &sink, 6.0);

    let scheduled = sink.scheduled();
    for (step, trig) in scheduled.iter().enumerate() {
        match step {
            32..=47 => assert!(
                trig.slice_index >= 200,
                "step {} should belong to the fill",
                step
            ),
            _ => assert!(
                trig.slice_index < 200,
                "step {} should belong to the main pattern",
                step
            ),
        }
    }
}

#[test]
fn tempo_change_never_tears_the_grid() {
    let (mut transport, sink) = setup();
    transport.start(1).unwrap();
    run(&mut transport, &sink, 0.5);
    transport.request_tempo(180.0).unwrap();
    run(&mut transport, &sink, 1.0);

    // Every consecutive gap is one of the two legal step durations; the
    // switch happens once and the grid never stutters around it
    let times: Vec<f64> = sink.scheduled().iter().map(|t| t.start_time).collect();
    let old_dur = 0.125;
    let new_dur = 60.0 / 180.0 / 4.0; // 180 BPM sixteenth
    let mut switches = 0;
    let mut previous_gap = old_dur;
    for pair in times.windows(2) {
        let gap = pair[1] - pair[0];
        let is_old = (gap - old_dur).abs() < 1e-9;
        let is_new = (gap - new_dur).abs() < 1e-9;
        assert!(is_old || is_new, "irregular gap {}", gap);
        if (gap - previous_gap).abs() > 1e-9 {
            switches += 1;
            previous_gap = gap;
        }
    }
    assert_eq!(switches, 1);
}

#[test]
fn later_request_in_a_category_supersedes_the_earlier_one() {
    let (mut transport, sink) = setup();
    transport.start(1).unwrap();
    transport.tick().unwrap();
    transport.request_tempo(60.0).unwrap();
    transport.request_tempo(240.0).unwrap();
    run(&mut transport, &sink, 1.0);

    let times: Vec<f64> = sink.scheduled().iter().map(|t| t.start_time).collect();
    let slow = 60.0 / 60.0 / 4.0; // 0.25s
    for pair in times.windows(2).skip(3) {
        let gap = pair[1] - pair[0];
        assert!(
            (gap - slow).abs() > 1e-9,
            "superseded tempo still reached the grid"
        );
    }
}

#[test]
fn fill_length_is_captured_at_activation() {
    let (mut transport, sink) = setup();
    transport.start(1).unwrap();
    transport.tick().unwrap();
    transport.request_fill(9).unwrap();
    // Let the fill activate at step 32, then retime mid-fill
    run(&mut transport, &sink, 4.3);
    transport.request_tempo(240.0).unwrap();
    run(&mut transport, &sink, 3.0);

    // Still exactly sixteen fill steps, whatever the clock now says
    let fill_steps = sink
        .scheduled()
        .iter()
        .filter(|t| t.slice_index >= 200)
        .count();
    assert_eq!(fill_steps, 16);
}

#[test]
fn main_swap_requested_during_a_fill_lands_when_the_fill_ends() {
    let (mut transport, sink) = setup();
    transport.bank_mut().insert(Pattern::main(
        2,
        "next",
        (0..32).map(|_| StepEvent::slice(99)).collect(),
    ));
    transport.start(1).unwrap();
    transport.tick().unwrap();
    transport.request_fill(9).unwrap();
    run(&mut transport, &sink, 4.3);
    transport.request_main(2).unwrap();
    run(&mut transport, &sink, 4.0);

    let scheduled = sink.scheduled();
    let fill_end = 48;
    assert!(scheduled[fill_end - 1].slice_index >= 200);
    assert_eq!(scheduled[fill_end].slice_index, 99);
    assert!(scheduled[..32].iter().all(|t| t.slice_index < 99));
}

#[test]
fn retrig_sub_triggers_tile_their_step_exactly() {
    let (mut transport, sink) = setup();
    transport.bank_mut().insert(Pattern::main(
        3,
        "stutter",
        (0..32)
            .map(|_| StepEvent::Slice {
                index: 0,
                retrig: 3,
                gain: 1.0,
            })
            .collect(),
    ));
    transport.start(3).unwrap();
    run(&mut transport, &sink, 0.5);

    let scheduled = sink.scheduled();
    assert_eq!(scheduled.len() % 3, 0);
    for step in scheduled.chunks(3) {
        let total: f64 = step.iter().map(|t| t.duration).sum();
        assert!((total - 0.125).abs() < 1e-9);
        assert!((step[1].start_time - step[0].end_time()).abs() < 1e-9);
        assert!((step[2].start_time - step[1].end_time()).abs() < 1e-9);
        assert!(step.iter().all(|t| t.fade_out));
    }
}

#[test]
fn loop_swap_waits_for_the_bar_line_and_retimes_naturally() {
    let (mut transport, sink) = setup();
    transport.start(1).unwrap();
    run(&mut transport, &sink, 0.5);
    // A one-bar window of 1s: natural rate 240 BPM, sixteenth = 0.0625s
    transport.request_loop(LoopWindow::new(0.0, 1.0, 1.0).unwrap());
    run(&mut transport, &sink, 2.5);

    let times: Vec<f64> = sink.scheduled().iter().map(|t| t.start_time).collect();
    // First sixteen steps keep the old 0.125 grid (the swap waits for the
    // bar line at step 16), everything after runs at the new rate
    for pair in times[..16].windows(2) {
        assert!((pair[1] - pair[0] - 0.125).abs() < 1e-9);
    }
    for pair in times[16..].windows(2) {
        assert!((pair[1] - pair[0] - 0.0625).abs() < 1e-9);
    }
}

#[test]
fn invalid_requests_are_rejected_up_front() {
    let (mut transport, _sink) = setup();
    assert!(matches!(
        transport.start(77),
        Err(TransportError::InvalidPattern(77))
    ));
    assert!(matches!(
        transport.request_resolution(5),
        Err(TransportError::InvalidResolution(5))
    ));
    assert!(matches!(
        transport.request_tempo(5.0),
        Err(TransportError::InvalidTempo(_))
    ));
    assert!(LoopWindow::new(2.0, 1.0, 1.0).is_err());
    assert!(GridResolution::new(7).is_err());
}

#[test]
fn role_preview_is_idempotent_until_someone_sounds() {
    use loopflip::SliceRole;
    use loopflip::StepResolver;
    use loopflip::sequencer::resolve::{ResolveMode, ResolveRequest};

    let pattern = Pattern::main(
        1,
        "roled",
        (0..16)
            .map(|_| StepEvent::role(SliceRole::PercussiveLow))
            .collect(),
    );
    let mut resolver = StepResolver::new(roles());
    let request = ResolveRequest {
        pattern: &pattern,
        base_step: 0,
        anchor: 0,
        total_base_steps: 16,
    };

    // Display can ask as often as it likes without changing what plays
    let shown_a = resolver.resolve(request, ResolveMode::Preview).unwrap();
    let shown_b = resolver.resolve(request, ResolveMode::Preview).unwrap();
    assert_eq!(shown_a.slice_index, shown_b.slice_index);

    let played = resolver.resolve(request, ResolveMode::Sounding).unwrap();
    assert_eq!(played.slice_index, shown_a.slice_index);
    let shown_c = resolver.resolve(request, ResolveMode::Preview).unwrap();
    assert_ne!(shown_c.slice_index, shown_a.slice_index);
}

#[test]
fn repeat_hold_freezes_and_releases_cleanly() {
    let (mut transport, sink) = setup();
    transport.start(1).unwrap();
    run(&mut transport, &sink, 0.5);
    let frozen = sink
        .scheduled()
        .last()
        .map(|t| t.slice_index)
        .expect("nothing sounded before the hold");
    let before = sink.scheduled().len();

    transport.set_repeat_hold(true);
    run(&mut transport, &sink, 0.5);
    let scheduled = sink.scheduled();
    assert!(scheduled[before..].iter().all(|t| t.slice_index == frozen));

    transport.set_repeat_hold(false);
    run(&mut transport, &sink, 0.5);
    let scheduled = sink.scheduled();
    assert!(scheduled.last().map(|t| t.slice_index) != Some(frozen));
}
