// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Line buffer for frr configuration text.

use std::fmt::Display;
use std::ops::AddAssign;

/// Separator between frr stanzas.
pub const MARKER: &str = "!";

/// Lines of frr configuration, in order. Runs of [`MARKER`] lines are kept to one.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    lines: Vec<String>,
}

impl Display for ConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.lines.iter().try_for_each(|line| writeln!(f, "{line}"))
    }
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    fn push(&mut self, line: impl Into<String>) {
        let line = line.into();
        let repeated_marker =
            line == MARKER && self.lines.last().is_some_and(|last| last == MARKER);
        if !repeated_marker {
            self.lines.push(line);
        }
    }
}

impl AddAssign<Self> for ConfigBuilder {
    fn add_assign(&mut self, rhs: Self) {
        rhs.lines.into_iter().for_each(|line| self.push(line));
    }
}
impl AddAssign<String> for ConfigBuilder {
    fn add_assign(&mut self, rhs: String) {
        self.push(rhs);
    }
}
impl AddAssign<&str> for ConfigBuilder {
    fn add_assign(&mut self, rhs: &str) {
        self.push(rhs);
    }
}

/// Turn a model object into frr configuration.
pub trait Render {
    /// Whatever else the object needs to know to render itself.
    type Context;
    type Output;
    fn render(&self, ctx: &Self::Context) -> Self::Output;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers_collapse() {
        let mut cfg = ConfigBuilder::new();
        cfg += "hostname r1";
        cfg += MARKER;
        cfg += MARKER;
        let mut other = ConfigBuilder::new();
        other += MARKER;
        other += "vrf red".to_string();
        cfg += other;
        assert_eq!(cfg.lines().len(), 3);
        assert_eq!(cfg.to_string(), "hostname r1\n!\nvrf red\n");
    }
}
