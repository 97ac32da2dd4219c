// SPDX-FileCopyrightText: 2025 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Minimal builder for the edify installer scripts run by recovery. Only
//! statement accumulation is supported. The language itself is not modelled.

use std::fmt;

/// Quote a string as an edify string literal.
fn quote(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 2);
    result.push('"');

    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            c => result.push(c),
        }
    }

    result.push('"');
    result
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EdifyScript {
    statements: Vec<String>,
}

impl EdifyScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// Show a message in the recovery UI.
    pub fn print(&mut self, message: &str) {
        self.statements
            .push(format!("ui_print({});", quote(message)));
    }

    /// Append a raw statement verbatim.
    pub fn append_extra(&mut self, statement: impl Into<String>) {
        self.statements.push(statement.into());
    }

    /// Extract a file from the update package to `dest`, which is usually a
    /// block device.
    pub fn package_extract_file(&mut self, name: &str, dest: &str) {
        self.append_extra(format!(
            "package_extract_file({}, {});",
            quote(name),
            quote(dest),
        ));
    }
}

impl fmt::Display for EdifyScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for statement in &self.statements {
            writeln!(f, "{statement}")?;
        }

        Ok(())
    }
}
