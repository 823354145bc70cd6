//! Argument validation against per-function domain rules.
//!
//! Rules are declared in a table keyed by action kind. Unknown function
//! names never reach the table and are rejected outright.

use serde_json::Value;

use crate::types::{arg_f64, arg_str, ActionKind};

/// Outcome of validating one proposed action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// Proceed to the trust gate.
    Ok,
    /// Hard stop, no confirmation path.
    Blocked(String),
    /// Pause the step until the same identity confirms.
    NeedsConfirmation(String),
}

impl Validation {
    pub fn ok(&self) -> bool {
        matches!(self, Validation::Ok)
    }

    pub fn needs_confirmation(&self) -> bool {
        matches!(self, Validation::NeedsConfirmation(_))
    }

    pub fn reason(&self) -> &str {
        match self {
            Validation::Ok => "",
            Validation::Blocked(r) | Validation::NeedsConfirmation(r) => r,
        }
    }
}

/// One declarative constraint on an action's arguments.
#[derive(Debug)]
enum Rule {
    /// Non-empty string argument.
    Required(&'static str),
    /// At least one of the keys must be present.
    AnyOf(&'static [&'static str]),
    /// String argument, if present, must be one of the values.
    OneOf(&'static str, &'static [&'static str]),
    /// Numeric argument within bounds (inclusive); `required` when it must exist.
    Range {
        key: &'static str,
        min: f64,
        max: f64,
        required: bool,
    },
    /// Numeric argument above `threshold` needs confirmation.
    ConfirmAbove {
        key: &'static str,
        threshold: f64,
        reason: &'static str,
    },
    /// The action always needs confirmation.
    AlwaysConfirm(&'static str),
}

fn rules(kind: ActionKind) -> &'static [Rule] {
    match kind {
        ActionKind::TurnLight => &[
            Rule::Required("room"),
            Rule::Required("state"),
            Rule::OneOf("state", &["on", "off"]),
        ],
        ActionKind::SetBrightness => &[
            Rule::Required("room"),
            Rule::Range { key: "brightness", min: 0.0, max: 100.0, required: true },
            Rule::Range { key: "previous_brightness", min: 0.0, max: 100.0, required: false },
        ],
        ActionKind::SetTemperature => &[
            Rule::Required("room"),
            Rule::Range { key: "temperature", min: 5.0, max: 35.0, required: true },
            Rule::Range { key: "previous_temperature", min: 5.0, max: 35.0, required: false },
            Rule::ConfirmAbove {
                key: "temperature",
                threshold: 28.0,
                reason: "temperature above 28C",
            },
        ],
        ActionKind::SetCover => &[
            Rule::Required("entity_id"),
            Rule::AnyOf(&["action", "position"]),
            Rule::OneOf("action", &["open", "close"]),
            Rule::Range { key: "position", min: 0.0, max: 100.0, required: false },
            Rule::Range { key: "previous_position", min: 0.0, max: 100.0, required: false },
        ],
        ActionKind::SetAllCovers => &[
            Rule::Required("action"),
            Rule::OneOf("action", &["open", "close"]),
        ],
        ActionKind::LockDoor => &[Rule::Required("entity_id")],
        ActionKind::UnlockDoor => &[
            Rule::Required("entity_id"),
            Rule::AlwaysConfirm("unlocking a door"),
        ],
        ActionKind::ActivateScene => &[Rule::Required("scene")],
        ActionKind::SetVolume => &[
            Rule::Required("entity_id"),
            Rule::Range { key: "volume", min: 0.0, max: 100.0, required: true },
            Rule::Range { key: "previous_volume", min: 0.0, max: 100.0, required: false },
            Rule::ConfirmAbove {
                key: "volume",
                threshold: 80.0,
                reason: "volume above 80",
            },
        ],
    }
}

/// Side-effect-free argument validator.
#[derive(Debug, Default, Clone, Copy)]
pub struct Validator;

impl Validator {
    /// Validate a call by function name.
    pub fn validate(&self, function: &str, args: &Value) -> Validation {
        match ActionKind::from_name(function) {
            Some(kind) => self.validate_kind(kind, args),
            None => Validation::Blocked(format!("unknown function '{}'", function)),
        }
    }

    /// Validate a call whose kind is already resolved.
    ///
    /// Hard violations win over confirmation requirements regardless of
    /// rule order.
    pub fn validate_kind(&self, kind: ActionKind, args: &Value) -> Validation {
        if !args.is_object() && !args.is_null() {
            return Validation::Blocked("arguments must be an object".to_string());
        }

        let mut confirmation: Option<String> = None;
        for rule in rules(kind) {
            match check(rule, args) {
                Validation::Ok => {}
                Validation::Blocked(reason) => {
                    return Validation::Blocked(format!("{}: {}", kind, reason))
                }
                Validation::NeedsConfirmation(reason) => {
                    confirmation.get_or_insert(format!("{}: {}", kind, reason));
                }
            }
        }

        match confirmation {
            Some(reason) => Validation::NeedsConfirmation(reason),
            None => Validation::Ok,
        }
    }
}

fn check(rule: &Rule, args: &Value) -> Validation {
    match rule {
        Rule::Required(key) => match arg_str(args, key) {
            Some(v) if !v.trim().is_empty() => Validation::Ok,
            _ => Validation::Blocked(format!("'{}' is required", key)),
        },
        Rule::AnyOf(keys) => {
            if keys.iter().any(|k| args.get(*k).is_some_and(|v| !v.is_null())) {
                Validation::Ok
            } else {
                Validation::Blocked(format!("one of {} is required", keys.join(", ")))
            }
        }
        Rule::OneOf(key, allowed) => match args.get(*key) {
            None | Some(Value::Null) => Validation::Ok,
            Some(v) => match v.as_str() {
                Some(s) if allowed.contains(&s) => Validation::Ok,
                _ => Validation::Blocked(format!(
                    "'{}' must be one of {}",
                    key,
                    allowed.join(", ")
                )),
            },
        },
        Rule::Range {
            key,
            min,
            max,
            required,
        } => match args.get(*key) {
            None | Some(Value::Null) if !required => Validation::Ok,
            None | Some(Value::Null) => Validation::Blocked(format!("'{}' is required", key)),
            Some(_) => match arg_f64(args, key) {
                Some(n) if n >= *min && n <= *max => Validation::Ok,
                Some(n) => Validation::Blocked(format!(
                    "'{}' = {} is outside {}..={}",
                    key, n, min, max
                )),
                None => Validation::Blocked(format!("'{}' must be a number", key)),
            },
        },
        Rule::ConfirmAbove {
            key,
            threshold,
            reason,
        } => match arg_f64(args, key) {
            Some(n) if n > *threshold => Validation::NeedsConfirmation(reason.to_string()),
            _ => Validation::Ok,
        },
        Rule::AlwaysConfirm(reason) => Validation::NeedsConfirmation(reason.to_string()),
    }
}
