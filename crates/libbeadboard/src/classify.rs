//! Pane-text heuristics: an ordered list of pure predicate -> state rules
//! evaluated top to bottom against a captured tail. Unit-testable against
//! text fixtures, no live process required.

use beadboard_proto::SessionState;

/// Markers the multiplexer prints when a session or pane is gone.
const DEAD_PANE_MARKERS: &[&str] = &[
    "no server running",
    "can't find session",
    "can't find pane",
    "pane is dead",
    "session not found",
];

/// Agent-side completion markers.
const DONE_MARKERS: &[&str] = &[
    "bead complete",
    "all tasks complete",
    "nothing left to do",
    "work is done",
];

/// Phrases that mean the agent is blocked on a human answer.
const WAITING_MARKERS: &[&str] = &[
    "(y/n)",
    "[y/n]",
    "awaiting input",
    "awaiting your input",
    "waiting for input",
    "do you want to proceed",
    "press enter to continue",
];

struct Rule {
    state: SessionState,
    matches: fn(&str) -> bool,
}

const RULES: &[Rule] = &[
    Rule {
        state: SessionState::Error,
        matches: pane_dead,
    },
    Rule {
        state: SessionState::Done,
        matches: completed,
    },
    Rule {
        state: SessionState::Waiting,
        matches: awaiting_input,
    },
];

/// Classify a captured pane tail. `None` means the capture itself failed
/// (process gone, command error), which is evidence for `Error`, not a
/// reason to skip the poll.
pub fn classify(capture: Option<&str>) -> SessionState {
    let Some(text) = capture else {
        return SessionState::Error;
    };
    let lower = text.to_lowercase();
    for rule in RULES {
        if (rule.matches)(&lower) {
            return rule.state;
        }
    }
    SessionState::Busy
}

fn pane_dead(text: &str) -> bool {
    DEAD_PANE_MARKERS.iter().any(|marker| text.contains(marker))
}

fn completed(text: &str) -> bool {
    DONE_MARKERS.iter().any(|marker| text.contains(marker))
}

fn awaiting_input(text: &str) -> bool {
    if WAITING_MARKERS.iter().any(|marker| text.contains(marker)) {
        return true;
    }
    // A bare trailing question is the agent asking, not working.
    text.lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .is_some_and(|line| line.trim_end().ends_with('?'))
}
