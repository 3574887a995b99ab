//! Flat statistics export.
//!
//! Every component reports a [`Stats`] block: a type name plus a list of
//! named values. Composite components nest the blocks of their parts.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatElement {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub type_name: String,
    pub elements: Vec<StatElement>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Stats>,
}

impl Stats {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            elements: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style append.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl std::fmt::Display) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: &str, value: impl std::fmt::Display) {
        self.elements.push(StatElement {
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    #[must_use]
    pub fn with_child(mut self, child: Stats) -> Self {
        self.children.push(child);
        self
    }

    /// Look up a value by name in this block (not its children).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.elements
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.value.as_str())
    }

    /// Find a nested block by type name, depth first.
    #[must_use]
    pub fn child(&self, type_name: &str) -> Option<&Stats> {
        for c in &self.children {
            if c.type_name == type_name {
                return Some(c);
            }
            if let Some(found) = c.child(type_name) {
                return Some(found);
            }
        }
        None
    }

    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    fn fmt_indented(&self, f: &mut std::fmt::Formatter<'_>, depth: usize) -> std::fmt::Result {
        let pad = "  ".repeat(depth);
        writeln!(f, "{}{}", pad, self.type_name)?;
        for e in &self.elements {
            writeln!(f, "{}  {} = {}", pad, e.name, e.value)?;
        }
        for c in &self.children {
            c.fmt_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for Stats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.fmt_indented(f, 0)
    }
}
