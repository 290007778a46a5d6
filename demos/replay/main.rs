//! Replays a scripted performance through the controller and prints what comes out
//!
//! Run with `RUST_LOG=debug cargo run --example replay` to also see the pipeline's log output.

use gridseq::{Clock as _, Controller, GridError, InputEvent, MockClock, STEPS, TRACKS};

enum Action {
    Tap(u8),
    Hold(u8),
    Wait(u32),
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let clock = MockClock::new(0);
    let mut controller = Controller::new(&clock);

    let script = [
        // a four on the floor kick on track 0 and an offbeat on track 1
        Action::Tap(0),
        Action::Tap(2),
        Action::Tap(4),
        Action::Tap(6),
        Action::Tap(9),
        Action::Tap(13),
        // hold step 1/5 and push its velocity up twice, then its note down once
        Action::Hold(13),
        Action::Tap(14),
        Action::Tap(15),
        Action::Tap(1),
        Action::Tap(13),
        // open another lock and let it time out
        Action::Hold(2),
        Action::Wait(11_000),
        Action::Tap(3),
    ];

    for action in &script {
        match *action {
            Action::Tap(button) => press(&mut controller, &clock, button, 60)?,
            Action::Hold(button) => press(&mut controller, &clock, button, 700)?,
            Action::Wait(ms) => {
                clock.advance(ms);
                if controller.tick() {
                    println!("[{:>6}ms] lock session timed out", clock.now_ms());
                }
            }
        }
    }

    println!();
    for step in 0..STEPS as u8 {
        controller.prepare_step_column(step);
        for track in 0..TRACKS as u8 {
            if let Some(params) = controller.trigger(track, step) {
                println!(
                    "step {} track {}: note {:>3} velocity {:>3} length {:>3}",
                    step, track, params.note, params.velocity, params.length
                );
            }
        }
    }

    let stats = controller.cache().stats();
    println!();
    println!(
        "{} locks in use, cache hit rate {:.0}%, slowest resolution {}us",
        controller.pool().used_count(),
        stats.hit_rate * 100.0,
        stats.max_resolve_us,
    );

    Ok(())
}

fn press(
    controller: &mut Controller<&MockClock>,
    clock: &MockClock,
    button: u8,
    held_ms: u32,
) -> Result<(), GridError> {
    for event in [InputEvent::Press { button }, InputEvent::Release { button, held_ms }] {
        for command in controller.handle_event(event)? {
            println!("[{:>6}ms] {:?}", clock.now_ms(), command);
        }
    }
    clock.advance(held_ms + 40);
    Ok(())
}
