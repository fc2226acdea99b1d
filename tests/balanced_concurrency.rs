//! Many threads hammering the same locks in a consistent global order:
//! the verifier must stay coherent under contention and report nothing.

mod common;

use locksmith::hooks;
use std::thread;

const OUTER: usize = 0xe000;
const INNER: usize = 0xe100;
const THREADS: usize = 8;
const ROUNDS: usize = 50;

#[test]
fn consistent_ordering_under_contention_is_silent() {
    let harness = common::start_verifier();

    thread::scope(|s| {
        for t in 0..THREADS {
            s.spawn(move || {
                let private = 0xf000 + t * 0x10;
                for _ in 0..ROUNDS {
                    // Shared pair, always outer then inner.
                    hooks::pre_lock(OUTER, true).unwrap();
                    hooks::post_lock(OUTER, 0);
                    hooks::pre_lock(INNER, true).unwrap();
                    hooks::post_lock(INNER, 0);
                    // Plus a lock nobody else touches.
                    hooks::pre_lock(private, true).unwrap();
                    hooks::post_lock(private, 0);

                    hooks::pre_unlock(private).unwrap();
                    hooks::post_unlock(private);
                    hooks::pre_unlock(INNER).unwrap();
                    hooks::post_unlock(INNER);
                    hooks::pre_unlock(OUTER).unwrap();
                    hooks::post_unlock(OUTER);
                }
            });
        }
    });

    harness.assert_clean();
}
