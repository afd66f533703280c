#![no_main]
use libfuzzer_sys::fuzz_target;

use scalelog::session::SessionState;

// Feeds each input line to the gate in turn and checks the one-way
// invariant: once recording, no later command may disarm it (and the
// transition fires at most once).
fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let mut state = SessionState::new();
    let mut transitions = 0;
    for command in input.lines() {
        let was_recording = state.is_recording();
        if state.observe_command(command.trim()) {
            transitions += 1;
        }
        assert!(!was_recording || state.is_recording());
    }
    assert!(transitions <= 1);
});
