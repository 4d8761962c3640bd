//! Fuzz target for the argument overlay
//!
//! Feeds arbitrary operator lines through tokenize → parse → merge.
//!
//! # Invariants
//!
//! - NEVER panic on any input line
//! - A failed merge leaves the overlay unchanged
//! - Interactive mode never changes after startup
//! - Merge never removes a key the partial set does not name
//! - A sentinel value removes exactly its key

#![no_main]

use arbitrary::Arbitrary;
use courier_core::{ArgumentOverlay, DELETION_SENTINEL, OptionKey, OptionSet};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    interactive: bool,
    lines: Vec<String>,
}

fuzz_target!(|input: FuzzInput| {
    let start = if input.interactive { "true" } else { "false" };
    let Ok(mut overlay) = ArgumentOverlay::from_args(["-int", start, "-eid", "client-1"]) else {
        panic!("startup arguments rejected");
    };

    for line in input.lines {
        let Ok(partial) = OptionSet::from_line(&line) else {
            continue;
        };

        let before = overlay.clone();
        if overlay.merge(partial.clone()).is_err() {
            assert_eq!(overlay, before, "failed merge mutated overlay");
            continue;
        }

        assert_eq!(overlay.is_interactive(), input.interactive);
        for key in OptionKey::ALL {
            match partial.get(key) {
                Some(DELETION_SENTINEL) => assert_eq!(overlay.get(key), None),
                Some(value) => assert_eq!(overlay.get(key), Some(value)),
                None => assert_eq!(overlay.get(key), before.get(key)),
            }
        }
    }
});
