#![allow(dead_code, unused_imports)]
use ecuflash::gate::{GuardKind, GuardRequest, OperationKind, OperatorContext, WriteGate};
use ecuflash::policy::{OperatorMode, OperatorModePolicy, PolicyConfig, OPERATOR_MODE_ENV};
use strum::IntoEnumIterator;

#[test]
#[serial_test::serial]
fn mode_from_environment() {
    std::env::set_var(OPERATOR_MODE_ENV, "Workshop");
    assert_eq!(PolicyConfig::from_env().mode, OperatorMode::Workshop);

    std::env::set_var(OPERATOR_MODE_ENV, "bogus");
    assert_eq!(PolicyConfig::from_env().mode, OperatorMode::Dev);

    std::env::remove_var(OPERATOR_MODE_ENV);
    assert_eq!(PolicyConfig::from_env().mode, OperatorMode::Dev);
}

#[test]
fn validate_ecu_write_by_mode() {
    let (policy, controller) = OperatorModePolicy::new(OperatorMode::Dev);

    for mode in OperatorMode::iter() {
        controller.set_mode(mode);
        for operation in OperationKind::iter() {
            let result = policy.validate_ecu_write(operation.as_ref());
            assert_eq!(result.allowed, mode != OperatorMode::Dev, "{} {}", mode, operation);
            assert_eq!(result.reason.is_some(), mode == OperatorMode::Dev);
        }
    }
}

#[test]
fn gate_follows_mode_changes() {
    let (policy, controller) = OperatorModePolicy::from_config(&PolicyConfig {
        mode: OperatorMode::Lab,
    });
    let gate = WriteGate::new(policy.clone());
    let context = OperatorContext::anonymous().confirmed();
    let request = GuardRequest {
        operation: OperationKind::Flash,
        context: &context,
        hardware: None,
    };

    assert!(gate.authorize(&request).is_ok());

    controller.set_mode(OperatorMode::Workshop);
    assert_eq!(gate.authorize(&request).unwrap_err().guard(), Some(GuardKind::RealHardware));

    controller.set_mode(OperatorMode::Dev);
    assert_eq!(gate.authorize(&request).unwrap_err().guard(), Some(GuardKind::WriteProtection));
}

#[test]
fn concurrent_readers_see_whole_tables() {
    let (policy, controller) = OperatorModePolicy::new(OperatorMode::Dev);

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let policy = policy.clone();
            std::thread::spawn(move || {
                for _ in 0..10_000 {
                    let config = policy.mode_config();
                    assert_eq!(config, config.mode.config());
                }
            })
        })
        .collect();

    for i in 0..10_000 {
        let mode = [OperatorMode::Dev, OperatorMode::Workshop, OperatorMode::Lab][i % 3];
        controller.set_mode(mode);
    }

    for reader in readers {
        reader.join().unwrap();
    }
}
