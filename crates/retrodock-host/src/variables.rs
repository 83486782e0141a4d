//! Core-defined configuration variables.
//!
//! Cores declare their options once through `SET_VARIABLES` as
//! `key -> "description; choice1|choice2|..."` pairs and read them back one
//! key at a time through `GET_VARIABLE`. The frontend updates values through
//! the control channel; a dirty flag tells the core that something changed,
//! reported exactly once per change batch.

use std::collections::BTreeMap;
use std::ffi::{CString, c_char};

use crate::error::HostError;

#[derive(Debug)]
pub struct Variable {
    pub description: String,
    pub choices: Vec<String>,
    pub chosen: String,
    /// NUL-terminated copy of `chosen`, kept stable so the pointer handed to
    /// the core through GET_VARIABLE stays valid until the next update.
    chosen_c: CString,
}

#[derive(Debug, Default)]
pub struct VariableTable {
    vars: BTreeMap<String, Variable>,
    dirty: bool,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a variable from the core's `"description; a|b|c"` encoding.
    ///
    /// Declarations are insert-only: a key the table already holds keeps its
    /// current value so user configuration survives re-declaration on
    /// restart. The first listed choice becomes the default.
    pub fn declare(&mut self, key: &str, raw: &str) {
        if key.is_empty() || self.vars.contains_key(key) {
            return;
        }

        let (description, choice_list) = match raw.split_once(';') {
            Some((d, c)) => (d.trim(), c.trim()),
            None => ("", raw.trim()),
        };
        let choices: Vec<String> = choice_list
            .split('|')
            .map(|c| c.trim().to_owned())
            .filter(|c| !c.is_empty())
            .collect();
        let Some(default) = choices.first().cloned() else {
            tracing::warn!(key, raw, "core declared a variable without choices");
            return;
        };

        tracing::debug!(key, default, choices = choices.len(), "variable declared");
        let chosen_c = c_string_lossy(&default);
        self.vars.insert(
            key.to_owned(),
            Variable {
                description: description.to_owned(),
                choices,
                chosen: default,
                chosen_c,
            },
        );
    }

    /// Applies an external update and raises the dirty flag.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), HostError> {
        let var = self
            .vars
            .get_mut(key)
            .ok_or_else(|| HostError::UnknownVariable(key.to_owned()))?;

        if !var.choices.iter().any(|c| c == value) {
            tracing::warn!(key, value, "variable set to a value outside its declared choices");
        }
        var.chosen = value.to_owned();
        var.chosen_c = c_string_lossy(value);
        self.dirty = true;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|v| v.chosen.as_str())
    }

    /// Pointer to the chosen value's raw bytes, for GET_VARIABLE.
    pub(crate) fn value_ptr(&self, key: &str) -> Option<*const c_char> {
        self.vars.get(key).map(|v| v.chosen_c.as_ptr())
    }

    /// One-shot edge-triggered change signal: returns the dirty flag and
    /// clears it.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn describe(&self, key: &str) -> Option<&Variable> {
        self.vars.get(key)
    }
}

fn c_string_lossy(value: &str) -> CString {
    // Interior NULs cannot come from well-formed core declarations; strip
    // them rather than fail an infallible path.
    CString::new(value.replace('\0', "")).unwrap_or_default()
}
