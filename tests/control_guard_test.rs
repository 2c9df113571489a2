mod common;

use chrono::Utc;
use common::{StubPlug, temp_store, test_config};
use soteria::control::{
    Authorizer, Caller, ControlAction, ControlGuard, ControlReject, ControlRequest,
    ControlVerdict, Role,
};
use soteria::store::{LogAction, StateStore};
use soteria::switchbot::PlugState;
use std::sync::Arc;

struct TestAuth {
    caller: Option<Caller>,
    step_up: bool,
}

impl TestAuth {
    fn admin() -> Self {
        Self {
            caller: Some(Caller {
                id: "alice".to_string(),
                role: Role::Admin,
            }),
            step_up: true,
        }
    }

    fn admin_without_pin() -> Self {
        Self {
            step_up: false,
            ..Self::admin()
        }
    }

    fn viewer() -> Self {
        Self {
            caller: Some(Caller {
                id: "bob".to_string(),
                role: Role::Viewer,
            }),
            step_up: true,
        }
    }

    fn anonymous() -> Self {
        Self {
            caller: None,
            step_up: false,
        }
    }
}

impl Authorizer for TestAuth {
    fn authorize(&self) -> Option<Caller> {
        self.caller.clone()
    }

    fn verify_step_up(&self) -> bool {
        self.step_up
    }
}

fn request(action: ControlAction) -> ControlRequest {
    ControlRequest {
        action,
        reason: None,
        override_low_soc: false,
    }
}

fn rejected(verdict: ControlVerdict) -> ControlReject {
    match verdict {
        ControlVerdict::Rejected(reject) => reject,
        ControlVerdict::Accepted(_) => panic!("expected rejection"),
    }
}

/// Guard over a fresh store with a plug and a seeded SoC reading
async fn guard_with_soc(
    soc: Option<u8>,
    mins_ago: i64,
) -> (tempfile::TempDir, ControlGuard, Arc<StubPlug>) {
    let (dir, store) = temp_store();
    if let Some(soc) = soc {
        store
            .record_poll_success(Utc::now() - chrono::Duration::minutes(mins_ago), soc)
            .await
            .unwrap();
    }
    let plug = Arc::new(StubPlug::new(PlugState::On));
    let guard = ControlGuard::new(test_config(), store, plug.clone());
    (dir, guard, plug)
}

#[tokio::test]
async fn anonymous_caller_is_unauthorized() {
    let (_dir, guard, plug) = guard_with_soc(Some(80), 1).await;
    let verdict = guard
        .handle(&TestAuth::anonymous(), request(ControlAction::ChargeOn))
        .await
        .unwrap();
    assert_eq!(rejected(verdict), ControlReject::Unauthorized);
    assert_eq!(plug.command_count(), 0);
}

#[tokio::test]
async fn viewer_is_forbidden() {
    let (_dir, guard, plug) = guard_with_soc(Some(80), 1).await;
    let verdict = guard
        .handle(&TestAuth::viewer(), request(ControlAction::ChargeOn))
        .await
        .unwrap();
    assert_eq!(rejected(verdict), ControlReject::Forbidden);
    assert_eq!(plug.command_count(), 0);
}

#[tokio::test]
async fn admin_charge_on_is_unconditional_and_audited() {
    // Stale SoC does not matter for charge_on
    let (_dir, store) = temp_store();
    let plug = Arc::new(StubPlug::new(PlugState::Off));
    let guard = ControlGuard::new(test_config(), store.clone(), plug.clone());

    let verdict = guard
        .handle(&TestAuth::admin_without_pin(), request(ControlAction::ChargeOn))
        .await
        .unwrap();

    match verdict {
        ControlVerdict::Accepted(outcome) => {
            assert_eq!(outcome.action, LogAction::ChargeOn);
            assert!(outcome.actuation_ok);
        }
        ControlVerdict::Rejected(r) => panic!("unexpected rejection: {:?}", r),
    }
    assert_eq!(*plug.commands.lock().unwrap(), vec![("plug-1".to_string(), true)]);

    let logs = store.operation_logs().await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].actor_id, "alice");
    assert!(!logs[0].is_auto);
    assert_eq!(logs[0].reason, "Manual charge ON");
}

#[tokio::test]
async fn charge_off_without_step_up_is_rejected() {
    let (_dir, guard, plug) = guard_with_soc(Some(80), 1).await;
    let verdict = guard
        .handle(&TestAuth::admin_without_pin(), request(ControlAction::ChargeOff))
        .await
        .unwrap();
    assert_eq!(rejected(verdict), ControlReject::StepUpRequired);
    assert_eq!(plug.command_count(), 0);
}

#[tokio::test]
async fn stale_soc_forbids_charge_off_even_with_override() {
    // Last reading is 10 minutes old, past the 5-minute freshness window
    let (_dir, guard, plug) = guard_with_soc(Some(80), 10).await;
    let verdict = guard
        .handle(
            &TestAuth::admin(),
            ControlRequest {
                action: ControlAction::ChargeOff,
                reason: Some("maintenance".to_string()),
                override_low_soc: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(rejected(verdict), ControlReject::SocUnknown);
    assert_eq!(plug.command_count(), 0);
}

#[tokio::test]
async fn never_polled_forbids_charge_off() {
    let (_dir, guard, _plug) = guard_with_soc(None, 0).await;
    let verdict = guard
        .handle(&TestAuth::admin(), request(ControlAction::ChargeOff))
        .await
        .unwrap();
    assert_eq!(rejected(verdict), ControlReject::SocUnknown);
}

#[tokio::test]
async fn below_critical_rejects_charge_off_unconditionally() {
    // Default bands: critical 25, safe 40
    let (_dir, guard, plug) = guard_with_soc(Some(24), 1).await;
    let verdict = guard
        .handle(
            &TestAuth::admin(),
            ControlRequest {
                action: ControlAction::ChargeOff,
                reason: Some("I know what I am doing".to_string()),
                override_low_soc: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(
        rejected(verdict),
        ControlReject::SocBelowCritical { soc: 24, min: 25 }
    );
    assert_eq!(plug.command_count(), 0);
}

#[tokio::test]
async fn between_critical_and_safe_needs_override_with_reason() {
    let (_dir, guard, plug) = guard_with_soc(Some(30), 1).await;

    // No override: rejected with the safe-minimum reason
    let verdict = guard
        .handle(&TestAuth::admin(), request(ControlAction::ChargeOff))
        .await
        .unwrap();
    assert_eq!(
        rejected(verdict),
        ControlReject::SocBelowSafe { soc: 30, min: 40 }
    );
    assert_eq!(plug.command_count(), 0);
}

#[tokio::test]
async fn override_with_reason_allows_charge_off_between_bands() {
    let (_dir, store) = temp_store();
    store.record_poll_success(Utc::now(), 30).await.unwrap();
    let plug = Arc::new(StubPlug::new(PlugState::On));
    let guard = ControlGuard::new(test_config(), store.clone(), plug.clone());

    let verdict = guard
        .handle(
            &TestAuth::admin(),
            ControlRequest {
                action: ControlAction::ChargeOff,
                reason: Some("battery calibration".to_string()),
                override_low_soc: true,
            },
        )
        .await
        .unwrap();

    match verdict {
        ControlVerdict::Accepted(outcome) => assert_eq!(outcome.action, LogAction::ChargeOff),
        ControlVerdict::Rejected(r) => panic!("unexpected rejection: {:?}", r),
    }
    assert_eq!(*plug.commands.lock().unwrap(), vec![("plug-1".to_string(), false)]);

    let logs = store.operation_logs().await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].reason, "battery calibration");
    assert_eq!(logs[0].details["override_low_soc"], true);
    assert_eq!(logs[0].details["override_reason"], "battery calibration");
}

#[tokio::test]
async fn override_without_reason_is_malformed() {
    // Checked before any SoC policy, so it fires even with a healthy SoC
    let (_dir, guard, _plug) = guard_with_soc(Some(90), 1).await;
    let verdict = guard
        .handle(
            &TestAuth::admin(),
            ControlRequest {
                action: ControlAction::ChargeOff,
                reason: None,
                override_low_soc: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(rejected(verdict), ControlReject::OverrideRequiresReason);
}

#[tokio::test]
async fn healthy_soc_allows_plain_charge_off() {
    let (_dir, guard, plug) = guard_with_soc(Some(55), 1).await;
    let verdict = guard
        .handle(&TestAuth::admin(), request(ControlAction::ChargeOff))
        .await
        .unwrap();
    assert!(matches!(verdict, ControlVerdict::Accepted(_)));
    assert_eq!(plug.command_count(), 1);
}

#[tokio::test]
async fn missing_plug_config_is_rejected_after_policy() {
    let (_dir, store) = temp_store();
    store.record_poll_success(Utc::now(), 80).await.unwrap();
    let mut config = test_config();
    config.switchbot.plug_device_id = String::new();
    let plug = Arc::new(StubPlug::new(PlugState::On));
    let guard = ControlGuard::new(config, store, plug.clone());

    let verdict = guard
        .handle(&TestAuth::admin(), request(ControlAction::ChargeOn))
        .await
        .unwrap();
    assert_eq!(rejected(verdict), ControlReject::PlugNotConfigured);
    assert_eq!(plug.command_count(), 0);
}

#[tokio::test]
async fn rejecting_plug_still_audits_with_api_not_ok() {
    let (_dir, store) = temp_store();
    let plug = Arc::new(StubPlug::rejecting(PlugState::Off));
    let guard = ControlGuard::new(test_config(), store.clone(), plug.clone());

    let verdict = guard
        .handle(&TestAuth::admin(), request(ControlAction::ChargeOn))
        .await
        .unwrap();

    match verdict {
        ControlVerdict::Accepted(outcome) => assert!(!outcome.actuation_ok),
        ControlVerdict::Rejected(r) => panic!("unexpected rejection: {:?}", r),
    }
    let logs = store.operation_logs().await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].details["api_ok"], false);
}
