//! The process-wide parameters registry: a name -> tagged-slot map the UCI
//! front uses to advertise `option name ...` lines and to dispatch
//! `setoption` calls, each slot with an optional on-change callback (e.g.
//! `Hash` resizes the transposition table; `Clear Hash` zeroes it;
//! `Threads` resizes the worker tree).
//!
//! This is deliberately the *only* process-wide mutable state the search
//! core reaches into outside of the transposition table and the worker
//! tree's own communicators: everything else a search needs is either
//! passed in explicitly or lives in per-worker scratch space.
use std::collections::HashMap;
use std::fmt::Display;

use uci::options::{OptionType, UciOption};

/// The value currently held by a parameter slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Spin(i32),
    Check(bool),
    Combo(String),
    Button,
    String(String),
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Spin(v) => write!(f, "{v}"),
            Value::Check(v) => write!(f, "{v}"),
            Value::Combo(v) | Value::String(v) => write!(f, "{v}"),
            Value::Button => write!(f, ""),
        }
    }
}

/// A registered on-change callback, invoked after a slot's value has been
/// updated with the new value already parsed to its native type.
pub enum OnChange {
    Spin(Box<dyn FnMut(i32) + Send>),
    Check(Box<dyn FnMut(bool) + Send>),
    Combo(Box<dyn FnMut(&str) + Send>),
    Button(Box<dyn FnMut() + Send>),
    String(Box<dyn FnMut(&str) + Send>),
}

struct Slot {
    option_type: OptionType,
    value: Value,
    on_change: Option<OnChange>,
}

/// The registry itself. Not `Sync`/shared directly — the engine front owns
/// one behind whatever synchronization its own state already uses, the same
/// way it owns the worker tree and the transposition table.
#[derive(Default)]
pub struct Parameters {
    slots: HashMap<&'static str, Slot>,
    order: Vec<&'static str>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    fn declare(&mut self, name: &'static str, option_type: OptionType, value: Value, on_change: Option<OnChange>) {
        self.slots.insert(name, Slot { option_type, value, on_change });
        self.order.push(name);
    }

    pub fn declare_spin(&mut self, name: &'static str, default: i32, min: i32, max: i32) {
        self.declare(name, OptionType::Spin { min, max, default }, Value::Spin(default), None);
    }

    pub fn declare_spin_on_change(
        &mut self,
        name: &'static str,
        default: i32,
        min: i32,
        max: i32,
        on_change: impl FnMut(i32) + Send + 'static,
    ) {
        self.declare(
            name,
            OptionType::Spin { min, max, default },
            Value::Spin(default),
            Some(OnChange::Spin(Box::new(on_change))),
        );
    }

    pub fn declare_check(&mut self, name: &'static str, default: bool) {
        self.declare(name, OptionType::Check { default }, Value::Check(default), None);
    }

    pub fn declare_check_on_change(
        &mut self,
        name: &'static str,
        default: bool,
        on_change: impl FnMut(bool) + Send + 'static,
    ) {
        self.declare(
            name,
            OptionType::Check { default },
            Value::Check(default),
            Some(OnChange::Check(Box::new(on_change))),
        );
    }

    pub fn declare_combo(&mut self, name: &'static str, default: &str, allowed: &[&str]) {
        self.declare(
            name,
            OptionType::Combo { default: default.to_string(), allowed: allowed.iter().map(|s| s.to_string()).collect() },
            Value::Combo(default.to_string()),
            None,
        );
    }

    pub fn declare_button(&mut self, name: &'static str, on_change: impl FnMut() + Send + 'static) {
        self.declare(name, OptionType::Button, Value::Button, Some(OnChange::Button(Box::new(on_change))));
    }

    pub fn declare_string(&mut self, name: &'static str, default: &str) {
        self.declare(name, OptionType::String { default: default.to_string() }, Value::String(default.to_string()), None);
    }

    /// Apply a `setoption name <name> value <value>` command. Unknown names
    /// are ignored (the UCI protocol has no error channel for this). A
    /// value that fails to parse for its slot's type is also ignored rather
    /// than propagated as an error, matching the rest of the registry's
    /// "never brings down the core" stance.
    pub fn set(&mut self, name: &str, raw_value: &str) {
        let Some(slot) = self.slots.get_mut(name) else { return };

        match &slot.option_type {
            OptionType::Spin { min, max, .. } => {
                if let Ok(parsed) = raw_value.trim().parse::<i32>() {
                    let clamped = parsed.clamp(*min, *max);
                    slot.value = Value::Spin(clamped);
                    if let Some(OnChange::Spin(f)) = &mut slot.on_change {
                        f(clamped);
                    }
                }
            }

            OptionType::Check { .. } => {
                if let Ok(parsed) = raw_value.trim().parse::<bool>() {
                    slot.value = Value::Check(parsed);
                    if let Some(OnChange::Check(f)) = &mut slot.on_change {
                        f(parsed);
                    }
                }
            }

            OptionType::Combo { allowed, .. } => {
                let value = raw_value.trim();
                if allowed.iter().any(|a| a == value) {
                    slot.value = Value::Combo(value.to_string());
                    if let Some(OnChange::Combo(f)) = &mut slot.on_change {
                        f(value);
                    }
                }
            }

            OptionType::Button => {
                if let Some(OnChange::Button(f)) = &mut slot.on_change {
                    f();
                }
            }

            OptionType::String { .. } => {
                slot.value = Value::String(raw_value.to_string());
                if let Some(OnChange::String(f)) = &mut slot.on_change {
                    f(raw_value);
                }
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.slots.get(name).map(|s| &s.value)
    }

    pub fn get_spin(&self, name: &str) -> Option<i32> {
        match self.get(name) {
            Some(Value::Spin(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_check(&self, name: &str) -> Option<bool> {
        match self.get(name) {
            Some(Value::Check(v)) => Some(*v),
            _ => None,
        }
    }

    /// All declared options, in declaration order, for emitting `option
    /// name ...` lines at UCI handshake.
    pub fn uci_options(&self) -> Vec<UciOption> {
        self.order
            .iter()
            .filter_map(|&name| self.slots.get(name).map(|s| UciOption { name, option_type: s.option_type.clone() }))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    #[test]
    fn spin_values_clamp_to_declared_range() {
        let mut params = Parameters::new();
        params.declare_spin("Threads", 1, 1, 512);
        params.set("Threads", "9999");
        assert_eq!(params.get_spin("Threads"), Some(512));
    }

    #[test]
    fn on_change_callback_fires_with_the_clamped_value() {
        let seen = Arc::new(AtomicI32::new(-1));
        let seen_in_closure = seen.clone();

        let mut params = Parameters::new();
        params.declare_spin_on_change("Hash", 16, 1, 1 << 20, move |v| {
            seen_in_closure.store(v, Ordering::SeqCst);
        });

        params.set("Hash", "64");

        assert_eq!(seen.load(Ordering::SeqCst), 64);
    }

    #[test]
    fn unknown_option_name_is_silently_ignored() {
        let mut params = Parameters::new();
        params.set("NotARealOption", "1");
        assert!(params.get("NotARealOption").is_none());
    }

    #[test]
    fn button_fires_its_callback_regardless_of_value() {
        let fired = Arc::new(AtomicI32::new(0));
        let fired_in_closure = fired.clone();

        let mut params = Parameters::new();
        params.declare_button("Clear Hash", move || {
            fired_in_closure.fetch_add(1, Ordering::SeqCst);
        });

        params.set("Clear Hash", "");

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
