//! Semantic inverses of executed actions.
//!
//! The table is deliberately small: actions without a safe inverse return
//! `None` and are left alone by the undo pass.

use serde_json::{json, Value};

use crate::types::{arg_f64, arg_str, ActionKind, RollbackAction};

/// Thermostat target used when the prior setting is unknown.
const DEFAULT_TEMPERATURE: f64 = 20.0;

/// Inverse of `function(args)`, if one exists.
pub fn inverse(function: &str, args: &Value) -> Option<RollbackAction> {
    let kind = ActionKind::from_name(function)?;
    let (function, arguments) = match kind {
        ActionKind::TurnLight => {
            let room = arg_str(args, "room")?;
            let state = match arg_str(args, "state")? {
                "on" => "off",
                "off" => "on",
                _ => return None,
            };
            ("turn_light", json!({"room": room, "state": state}))
        }
        ActionKind::SetBrightness => {
            let room = arg_str(args, "room")?;
            match arg_f64(args, "previous_brightness") {
                Some(prev) => ("set_brightness", json!({"room": room, "brightness": prev})),
                None => ("turn_light", json!({"room": room, "state": "off"})),
            }
        }
        ActionKind::SetTemperature => {
            let room = arg_str(args, "room")?;
            let prev = arg_f64(args, "previous_temperature").unwrap_or(DEFAULT_TEMPERATURE);
            ("set_temperature", json!({"room": room, "temperature": prev}))
        }
        ActionKind::SetCover => {
            let entity = arg_str(args, "entity_id")?;
            if let Some(prev) = arg_f64(args, "previous_position") {
                ("set_cover", json!({"entity_id": entity, "position": prev}))
            } else {
                let action = opposite_cover_action(arg_str(args, "action")?)?;
                ("set_cover", json!({"entity_id": entity, "action": action}))
            }
        }
        ActionKind::SetAllCovers => {
            let action = opposite_cover_action(arg_str(args, "action")?)?;
            ("set_all_covers", json!({"action": action}))
        }
        ActionKind::UnlockDoor => {
            let entity = arg_str(args, "entity_id")?;
            ("lock_door", json!({"entity_id": entity}))
        }
        ActionKind::SetVolume => {
            let entity = arg_str(args, "entity_id")?;
            let prev = arg_f64(args, "previous_volume")?;
            ("set_volume", json!({"entity_id": entity, "volume": prev}))
        }
        // Undoing a lock would leave the home less secure.
        ActionKind::LockDoor => return None,
        ActionKind::ActivateScene => return None,
    };

    Some(RollbackAction {
        function: function.to_string(),
        arguments,
    })
}

fn opposite_cover_action(action: &str) -> Option<&'static str> {
    match action {
        "open" => Some("close"),
        "close" => Some("open"),
        _ => None,
    }
}
