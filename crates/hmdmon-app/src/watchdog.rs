//! Keepalive watchdog
//!
//! Periodically checks that the supervised app is in the foreground and
//! relaunches it when it is not. Repeated relaunches back off exponentially
//! so a crash-looping app does not get hammered; a healthy check or a dark
//! screen resets the backoff. Failed queries skip the cycle without
//! touching the counter, since a flaky bridge says nothing about the app.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use hmdmon_adb::DeviceBridge;
use hmdmon_core::device::normalize_package;
use hmdmon_core::prelude::*;

/// Delay before the first check.
pub const FIRST_CHECK_DELAY: Duration = Duration::from_millis(1000);

/// Ceiling for the check backoff.
pub const CHECK_DELAY_CAP: Duration = Duration::from_millis(10_000);

/// Delay before the next check after `relaunches` consecutive relaunches.
pub(crate) fn check_delay(relaunches: u32) -> Duration {
    let factor = 1u64.checked_shl(relaunches).unwrap_or(u64::MAX);
    let millis = 1000u64.saturating_mul(factor);
    CHECK_DELAY_CAP.min(Duration::from_millis(millis))
}

enum CheckOutcome {
    /// App was missing and a relaunch was issued.
    Relaunched,
    /// App is running or the screen is off.
    Healthy,
    /// A query or the launch failed, nothing can be concluded.
    Unknown,
}

/// Watches over the app on one device until cancelled.
pub async fn run_watchdog<B>(token: CancellationToken, bridge: Arc<B>, target: String, package: String)
where
    B: DeviceBridge + Send + Sync + 'static,
{
    let package = normalize_package(&package).to_string();
    info!("keepalive watchdog started for {} on {}", package, target);

    let mut relaunches: u32 = 0;
    let mut delay = FIRST_CHECK_DELAY;

    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }

        let outcome = tokio::select! {
            _ = token.cancelled() => return,
            outcome = check_once(&*bridge, &target, &package, relaunches) => outcome,
        };

        match outcome {
            CheckOutcome::Relaunched => relaunches += 1,
            CheckOutcome::Healthy => relaunches = 0,
            CheckOutcome::Unknown => {}
        }
        delay = check_delay(relaunches);
    }
}

async fn check_once<B>(bridge: &B, target: &str, package: &str, relaunches: u32) -> CheckOutcome
where
    B: DeviceBridge + Send + Sync,
{
    let screen_on = match bridge.is_screen_on(target).await {
        Ok(screen_on) => screen_on,
        Err(e) => {
            debug!("screen state query for {} failed: {}", target, e);
            return CheckOutcome::Unknown;
        }
    };

    // Headsets blank the screen when taken off. Not a reason to relaunch.
    if !screen_on {
        return CheckOutcome::Healthy;
    }

    let running = match bridge.is_running(target, package).await {
        Ok(running) => running,
        Err(e) => {
            debug!("process query for {} on {} failed: {}", package, target, e);
            return CheckOutcome::Unknown;
        }
    };
    if running {
        return CheckOutcome::Healthy;
    }

    info!(
        "{} not running on {}, relaunching (attempt {})",
        package,
        target,
        relaunches + 1
    );
    match bridge.launch_app(target, package).await {
        Ok(()) => CheckOutcome::Relaunched,
        Err(e) => {
            warn!("relaunch of {} on {} failed: {}", package, target, e);
            CheckOutcome::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBridge;
    use tokio::time::Instant;

    fn start_watchdog(
        bridge: Arc<FakeBridge>,
        token: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(run_watchdog(
            token,
            bridge,
            "10.0.0.5:5555".into(),
            "com.example.app/MainActivity".into(),
        ))
    }

    #[test]
    fn test_check_delay_doubles_and_caps() {
        assert_eq!(check_delay(0), Duration::from_millis(1000));
        assert_eq!(check_delay(1), Duration::from_millis(2000));
        assert_eq!(check_delay(2), Duration::from_millis(4000));
        assert_eq!(check_delay(3), Duration::from_millis(8000));
        assert_eq!(check_delay(4), Duration::from_millis(10_000));
        assert_eq!(check_delay(30), Duration::from_millis(10_000));
        assert_eq!(check_delay(200), Duration::from_millis(10_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_relaunch_backs_off_and_healthy_check_resets() {
        let bridge = Arc::new(FakeBridge::new());
        bridge.set_screen_on(Ok(true));
        // Dead, dead, then running again.
        bridge.push_running_result(Ok(false));
        bridge.push_running_result(Ok(false));
        bridge.push_running_result(Ok(true));
        bridge.push_running_result(Ok(false));
        let token = CancellationToken::new();

        let start = Instant::now();
        let handle = start_watchdog(bridge.clone(), token.clone());
        tokio::time::sleep(Duration::from_secs(30)).await;
        token.cancel();
        handle.await.unwrap();

        // Launched with the canonical package, slash suffix stripped.
        assert_eq!(bridge.launch_calls(), vec!["com.example.app".to_string(); 3]);

        let checks: Vec<Duration> = bridge
            .screen_query_times()
            .into_iter()
            .map(|t| t - start)
            .collect();
        // 1s first check, then backoff 2s, 4s, reset to 1s after the
        // healthy check.
        assert_eq!(checks[0], Duration::from_millis(1000));
        assert_eq!(checks[1], Duration::from_millis(3000));
        assert_eq!(checks[2], Duration::from_millis(7000));
        assert_eq!(checks[3], Duration::from_millis(8000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_screen_off_counts_as_healthy() {
        let bridge = Arc::new(FakeBridge::new());
        bridge.set_screen_on(Ok(false));
        let token = CancellationToken::new();

        let handle = start_watchdog(bridge.clone(), token.clone());
        tokio::time::sleep(Duration::from_secs(10)).await;
        token.cancel();
        handle.await.unwrap();

        assert!(bridge.launch_calls().is_empty());
        assert!(bridge.running_query_count() == 0);
        // Steady one-second cadence, counter never moved.
        let times = bridge.screen_query_times();
        assert!(times.len() >= 9);
        assert_eq!(times[1] - times[0], Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_failure_skips_cycle_without_touching_counter() {
        let bridge = Arc::new(FakeBridge::new());
        bridge.set_screen_on(Ok(true));
        bridge.push_running_result(Ok(false)); // relaunch, counter 1
        bridge.push_running_result(Err(Error::adb("bridge flaked"))); // skip
        bridge.push_running_result(Ok(false)); // relaunch, counter 2
        bridge.push_running_result(Ok(true));
        let token = CancellationToken::new();

        let start = Instant::now();
        let handle = start_watchdog(bridge.clone(), token.clone());
        tokio::time::sleep(Duration::from_secs(30)).await;
        token.cancel();
        handle.await.unwrap();

        let checks: Vec<Duration> = bridge
            .screen_query_times()
            .into_iter()
            .map(|t| t - start)
            .collect();
        // Counter stays at 1 across the failed query: 2s delay twice.
        assert_eq!(checks[0], Duration::from_millis(1000));
        assert_eq!(checks[1], Duration::from_millis(3000));
        assert_eq!(checks[2], Duration::from_millis(5000));
        assert_eq!(checks[3], Duration::from_millis(9000));
        assert_eq!(bridge.launch_calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_checks() {
        let bridge = Arc::new(FakeBridge::new());
        bridge.set_screen_on(Ok(true));
        let token = CancellationToken::new();

        let handle = start_watchdog(bridge.clone(), token.clone());
        tokio::time::sleep(Duration::from_millis(1500)).await;
        token.cancel();
        handle.await.unwrap();

        let checks = bridge.screen_query_times().len();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(bridge.screen_query_times().len(), checks);
    }
}
