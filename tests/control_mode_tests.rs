use fanbus::driver::{FanDriver, MUX_ADDRESSES};
use fanbus::{ControlMode, FanState, SimulatedBus};

/// A bus with one controller on mux 0 / channel 0, already selected so the
/// state machine can drive it directly.
fn selected_bus() -> SimulatedBus {
    let mut bus = SimulatedBus::new().with_device(0, 0);
    assert!(bus.select_channel(MUX_ADDRESSES[0], 0));
    bus
}

#[cfg(test)]
mod duty_cycle_tests {
    use super::*;

    #[test]
    fn test_nonzero_duty_enters_manual() {
        let mut bus = selected_bus();
        let mut state = FanState::new();

        state.apply_duty_cycle(&mut bus, 60);

        assert_eq!(state.mode, ControlMode::Manual { duty_cycle: 60 });
        let device = bus.device(0, 0).unwrap();
        assert!(!device.curve_enabled);
        assert_eq!(device.duty_cycle, 60);
    }

    #[test]
    fn test_full_duty_pins_at_100() {
        let mut bus = selected_bus();
        let mut state = FanState::new();

        state.apply_duty_cycle(&mut bus, 100);

        assert_eq!(state.mode, ControlMode::Manual { duty_cycle: 100 });
        let device = bus.device(0, 0).unwrap();
        assert!(!device.curve_enabled);
        assert_eq!(device.duty_cycle, 100);
    }

    #[test]
    fn test_zero_duty_reverts_to_automatic() {
        let mut bus = selected_bus();
        let mut state = FanState::new();

        state.apply_duty_cycle(&mut bus, 60);
        state.apply_duty_cycle(&mut bus, 0);

        assert_eq!(state.mode, ControlMode::Automatic);
        let device = bus.device(0, 0).unwrap();
        assert!(device.curve_enabled);
        assert_eq!(device.duty_cycle, 0);
    }

    #[test]
    fn test_duty_does_not_touch_override_timestamp() {
        let mut bus = selected_bus();
        let mut state = FanState::new();

        state.apply_external_temperature(&mut bus, 45, 1_000);
        state.apply_duty_cycle(&mut bus, 75);

        assert_eq!(state.mode, ControlMode::Manual { duty_cycle: 75 });
        assert_eq!(state.last_external_temp_ms, Some(1_000));
    }

    #[test]
    fn test_zero_duty_with_armed_override_follows_forced_source() {
        let mut bus = selected_bus();
        let mut state = FanState::new();

        state.apply_external_temperature(&mut bus, 45, 1_000);
        state.apply_duty_cycle(&mut bus, 75);
        state.apply_duty_cycle(&mut bus, 0);

        // Curve re-enabled while the forced register still feeds it.
        assert_eq!(state.mode, ControlMode::ForcedExternal);
        assert!(bus.device(0, 0).unwrap().curve_enabled);
        assert!(bus.device(0, 0).unwrap().forced_enabled);
    }
}

#[cfg(test)]
mod external_temperature_tests {
    use super::*;

    #[test]
    fn test_report_arms_override() {
        let mut bus = selected_bus();
        let mut state = FanState::new();

        state.apply_external_temperature(&mut bus, 45, 2_000);

        assert_eq!(state.mode, ControlMode::ForcedExternal);
        assert_eq!(state.last_external_temp_ms, Some(2_000));
        let device = bus.device(0, 0).unwrap();
        assert!(device.forced_enabled);
        assert_eq!(device.forced_temperature_c, 45);
    }

    #[test]
    fn test_repeat_report_refreshes_timestamp() {
        let mut bus = selected_bus();
        let mut state = FanState::new();

        state.apply_external_temperature(&mut bus, 45, 2_000);
        state.apply_external_temperature(&mut bus, 50, 9_000);

        assert_eq!(state.mode, ControlMode::ForcedExternal);
        assert_eq!(state.last_external_temp_ms, Some(9_000));
        assert_eq!(bus.device(0, 0).unwrap().forced_temperature_c, 50);
    }

    #[test]
    fn test_zero_report_cancels_override() {
        let mut bus = selected_bus();
        let mut state = FanState::new();

        state.apply_external_temperature(&mut bus, 45, 2_000);
        state.apply_external_temperature(&mut bus, 0, 3_000);

        assert_eq!(state.mode, ControlMode::Automatic);
        assert_eq!(state.last_external_temp_ms, None);
        assert!(!bus.device(0, 0).unwrap().forced_enabled);
    }

    #[test]
    fn test_report_does_not_disturb_manual_mode() {
        let mut bus = selected_bus();
        let mut state = FanState::new();

        state.apply_duty_cycle(&mut bus, 70);
        state.apply_external_temperature(&mut bus, 45, 2_000);

        // The forced register is written but the pinned duty cycle wins.
        assert_eq!(state.mode, ControlMode::Manual { duty_cycle: 70 });
        assert_eq!(state.last_external_temp_ms, Some(2_000));
        assert!(bus.device(0, 0).unwrap().forced_enabled);
        assert_eq!(bus.device(0, 0).unwrap().duty_cycle, 70);
    }
}

#[cfg(test)]
mod expiry_tests {
    use super::*;

    #[test]
    fn test_expiry_is_strictly_greater_than() {
        let mut bus = selected_bus();
        let mut state = FanState::new();
        state.external_temp_timeout_ms = 90_000;
        state.apply_external_temperature(&mut bus, 45, 1_000);

        assert!(!state.override_expired(1_000 + 89_999));
        assert!(!state.override_expired(1_000 + 90_000));
        assert!(state.override_expired(1_000 + 90_001));
    }

    #[test]
    fn test_zero_timeout_never_expires() {
        let mut bus = selected_bus();
        let mut state = FanState::new();
        state.external_temp_timeout_ms = 0;
        state.apply_external_temperature(&mut bus, 45, 1_000);

        assert!(!state.override_expired(u64::MAX));
    }

    #[test]
    fn test_unarmed_state_never_expires() {
        let state = FanState::new();
        assert!(!state.override_expired(u64::MAX));
    }

    #[test]
    fn test_revert_restores_automatic() {
        let mut bus = selected_bus();
        let mut state = FanState::new();
        state.apply_external_temperature(&mut bus, 45, 1_000);

        state.revert_to_onboard(&mut bus);

        assert_eq!(state.mode, ControlMode::Automatic);
        assert_eq!(state.last_external_temp_ms, None);
        assert!(!bus.device(0, 0).unwrap().forced_enabled);
    }

    #[test]
    fn test_revert_leaves_manual_mode_alone() {
        let mut bus = selected_bus();
        let mut state = FanState::new();
        state.apply_external_temperature(&mut bus, 45, 1_000);
        state.apply_duty_cycle(&mut bus, 40);

        state.revert_to_onboard(&mut bus);

        assert_eq!(state.mode, ControlMode::Manual { duty_cycle: 40 });
        assert_eq!(state.last_external_temp_ms, None);
        assert!(!bus.device(0, 0).unwrap().forced_enabled);
    }
}
