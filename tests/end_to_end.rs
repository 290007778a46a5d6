use std::rc::Rc;

use gridseq::{
    Clock, Command, Config, Controller, GridError, GridPos, InputEvent, MockClock, Mode, ParamKind,
    MAX_LOCKS, STEPS, TRACKS,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct Rig {
    clock: Rc<MockClock>,
    controller: Controller<Rc<MockClock>>,
}

impl Rig {
    fn new(config: Config) -> Self {
        init_logger();
        let clock = Rc::new(MockClock::new(0));
        let controller = Controller::with_config(Rc::clone(&clock), config);
        Self { clock, controller }
    }

    fn press_release(&mut self, button: u8, held_ms: u32) -> Result<Vec<Command>, GridError> {
        let mut commands = self.controller.handle_event(InputEvent::Press { button })?;
        self.clock.advance(held_ms);
        commands.extend(
            self.controller
                .handle_event(InputEvent::Release { button, held_ms })?,
        );
        self.clock.advance(20);
        Ok(commands)
    }

    fn tap(&mut self, button: u8) -> Vec<Command> {
        self.press_release(button, 60).unwrap()
    }

    fn hold(&mut self, button: u8) -> Vec<Command> {
        self.press_release(button, 650).unwrap()
    }
}

#[test]
fn editing_session_changes_playback() {
    let mut rig = Rig::new(Config::default());

    assert_eq!(rig.tap(5), vec![Command::ToggleStep { track: 0, step: 5 }]);
    assert_eq!(rig.hold(5), vec![Command::EnterParamLock { track: 0, step: 5 }]);
    assert_eq!(rig.controller.mode(), Mode::ParameterLock);

    // held step sits on the right half, so the controls are on the left
    assert!(rig.controller.is_in_control_region(0));
    assert!(!rig.controller.is_in_control_region(5));

    // top row: note down three times
    assert_eq!(rig.tap(0), vec![Command::AdjustParameter { kind: 1, delta: -1 }]);
    rig.tap(0);
    rig.tap(0);
    // third row: length down once
    assert_eq!(rig.tap(16), vec![Command::AdjustParameter { kind: 3, delta: -1 }]);

    assert_eq!(rig.tap(5), vec![Command::ExitParamLock]);
    assert_eq!(rig.controller.mode(), Mode::Normal);

    rig.controller.prepare_step_column(5);
    let params = rig.controller.trigger(0, 5).unwrap();
    assert_eq!(params.note, 57);
    assert_eq!(params.length, 11);
    assert_eq!(params.velocity, 100);

    // the held step keeps its on state, inactive steps never trigger
    assert!(rig.controller.pattern().get(0, 5).unwrap().active);
    assert!(rig.controller.trigger(1, 5).is_none());
}

#[test]
fn hold_threshold_comes_from_config() {
    let mut rig = Rig::new(Config::default().with_hold_threshold(200));
    assert_eq!(
        rig.press_release(7, 250).unwrap(),
        vec![Command::EnterParamLock { track: 0, step: 7 }]
    );
}

#[test]
fn abandoned_session_times_out() {
    let mut rig = Rig::new(Config::default().with_lock_timeout(1000));
    rig.hold(30);
    assert!(!rig.controller.tick());

    rig.clock.advance(1000);
    assert!(rig.controller.tick());
    assert_eq!(rig.controller.mode(), Mode::Normal);

    // releasing the former lock button is a plain tap again
    assert_eq!(rig.tap(30), vec![Command::ToggleStep { track: 3, step: 6 }]);
}

#[test]
fn adjustments_without_session_are_impossible() {
    let mut rig = Rig::new(Config::default());
    rig.hold(3);
    rig.tap(3);
    // after the exit, presses are taps again and never adjust
    for button in 0..8 {
        for command in rig.tap(button) {
            assert!(matches!(command, Command::ToggleStep { .. }));
        }
    }
    assert!(rig.controller.pool().is_empty());
}

#[test]
fn locks_on_every_step_fit_in_the_pool() {
    let mut rig = Rig::new(Config::default());
    for track in 0..TRACKS as u8 {
        for step in 0..STEPS as u8 {
            let button = track * STEPS as u8 + step;
            let control = if step < 4 { 7 } else { 0 };
            rig.hold(button);
            rig.tap(control);
            rig.tap(button);
        }
    }

    let pool = rig.controller.pool();
    assert_eq!(pool.used_count(), TRACKS * STEPS);
    assert!(pool.used_count() < MAX_LOCKS);
    assert!(pool.validate_integrity());
    assert!(pool.iter().all(|(_, record)| record.has(ParamKind::Note)));

    rig.controller
        .copy_step_locks(GridPos::new(0, 0).unwrap(), GridPos::new(3, 7).unwrap())
        .unwrap();
    assert_eq!(rig.controller.pool().used_count(), TRACKS * STEPS);

    rig.controller.clear_all_locks();
    assert!(rig.controller.pool().is_empty());
    assert_eq!(rig.controller.pool().stats().total_allocations, (TRACKS * STEPS) as u32);
}

#[test]
fn cache_serves_hits_between_edits() {
    let mut rig = Rig::new(Config::default());
    rig.tap(0);

    rig.controller.prepare_step_column(0);
    rig.controller.prepare_step_column(0);
    let stats = rig.controller.cache().stats();
    assert_eq!(stats.misses, TRACKS as u32);
    assert_eq!(stats.hits, TRACKS as u32);

    rig.clock.advance(Config::DEFAULT_CACHE_LIFETIME_MS + 1);
    rig.controller.prepare_step_column(0);
    assert_eq!(rig.controller.cache().stats().misses, 2 * TRACKS as u32);
    assert_eq!(
        rig.controller.cache().get_parameters(0, 0).resolved_at,
        rig.clock.now_ms()
    );
    assert!(rig.controller.cache().validate_cache());
}
