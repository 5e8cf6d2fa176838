//! Test-only utilities (§8 "Ambient stack").
//!
//! `virtual_time` is a thin façade over `tokio::time`'s paused-clock
//! support, grounded in the same idea as Boon's `platform/cli/clock.rs`
//! `TestClock`: give tests a named, advance-on-demand clock instead of
//! sprinkling real `sleep`s through seed-scenario tests (spec.md §8 items
//! 4–5 talk about 1s/5s/30s delays that should run instantly).
//!
//! Every test using this module must run under `#[tokio::test(start_paused
//! = true)]` inside a `tokio::task::LocalSet` (async cells use
//! `spawn_local`).

#[cfg(test)]
pub mod virtual_time {
    use std::time::Duration;

    /// Suspend until the virtual clock has advanced by at least `duration`.
    pub async fn sleep(duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Advance the virtual clock by `duration`, running any timers that
    /// become due.
    pub async fn advance(duration: Duration) {
        tokio::time::advance(duration).await;
    }
}
