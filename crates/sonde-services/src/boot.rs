//! Boot sequence helpers: radio bring-up, boot-mode restore and the
//! configuration report printed once the node is up.

use sonde_core::{KvStore, NodeParams, ParamKey, TxPower};

use crate::arbiter::{RoleArbiter, SubsystemState};
use crate::discovery::Discovery;
use crate::radio::{RadioError, RangingRadio};

/// Initialize the radio and push the live channel and power to it.
/// Any failure here is fatal to boot.
pub fn bring_up_radio<R: RangingRadio>(radio: &R, params: &NodeParams) -> Result<(), RadioError> {
    radio.initialize()?;
    radio.set_channel(params.channel)?;
    radio.set_tx_power(params.tx_power)?;
    radio.enter_responder_mode();
    Ok(())
}

/// Advertise the stored identity and start whatever the boot mode asks for.
pub fn apply_boot_mode<D: Discovery>(params: &NodeParams, arbiter: &RoleArbiter, discovery: &D) {
    if let Some(id) = params.identity {
        discovery.set_identity(id);
    }
    if params.boot_mode.starts_discovery() {
        discovery.start();
        arbiter.set_discovery(SubsystemState::Running);
    }
    if params.boot_mode.starts_ranging() {
        arbiter.enable_ranging();
    }
    tracing::info!(
        identity = params.identity.map(|id| id.get()),
        boot_mode = params.boot_mode.code(),
        "boot mode applied"
    );
}

/// Console lines describing every stored parameter, in store key order.
/// Entries absent from the store are left out.
pub fn config_report(store: &dyn KvStore, params: &NodeParams) -> Vec<String> {
    let mut lines = vec!["Flash Configuration:".to_string()];
    for key in ParamKey::ALL {
        if !matches!(store.read(key), Ok(Some(_))) {
            continue;
        }
        let line = match key {
            ParamKey::Identity => match params.identity {
                Some(id) => format!("  Node ID: {id}"),
                None => continue,
            },
            ParamKey::BootMode => format!("  Boot Mode: {}", params.boot_mode.code()),
            ParamKey::PollingRate => format!("  UWB Polling Rate: {}", params.polling_rate),
            ParamKey::Channel => format!("  UWB Channel: {}", params.channel),
            ParamKey::EvictionTimeout => format!("  BLE Timeout: {}", params.eviction_timeout),
            ParamKey::TxPower => match params.tx_power {
                TxPower::Max => "  TX Power: Max".to_string(),
                TxPower::Default => "  TX Power: Default".to_string(),
            },
            ParamKey::StreamMode => format!("  Stream Mode: {}", params.stream_mode.code()),
        };
        lines.push(line);
    }
    lines
}
