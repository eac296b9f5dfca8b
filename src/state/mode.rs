//! Execution modes and the confirmation hook consulted before tool dispatch.

use crate::types::ToolCallRequest;
use crate::util::read_line;
use std::io::{Read, Write};

/// A named bundle of execution-policy flags. The built-in table is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeConfig {
    pub name: &'static str,
    pub description: &'static str,
    pub auto_execute: bool,
    pub show_plan: bool,
    pub require_confirmation: bool,
}

const BUILTIN_MODES: [ModeConfig; 4] = [
    ModeConfig {
        name: "normal",
        description: "Standard mode with confirmations",
        auto_execute: false,
        show_plan: true,
        require_confirmation: true,
    },
    ModeConfig {
        name: "plan",
        description: "Plan first, then ask before executing anything",
        auto_execute: false,
        show_plan: true,
        require_confirmation: true,
    },
    ModeConfig {
        name: "yolo",
        description: "Execute tool calls immediately without confirmation",
        auto_execute: true,
        show_plan: false,
        require_confirmation: false,
    },
    ModeConfig {
        name: "build",
        description: "Show the plan, then execute without confirmation",
        auto_execute: true,
        show_plan: true,
        require_confirmation: false,
    },
];

impl ModeConfig {
    pub fn builtin(name: &str) -> Option<&'static ModeConfig> {
        BUILTIN_MODES.iter().find(|mode| mode.name == name)
    }

    pub fn all() -> &'static [ModeConfig] {
        &BUILTIN_MODES
    }

    pub fn names() -> Vec<&'static str> {
        BUILTIN_MODES.iter().map(|mode| mode.name).collect()
    }
}

/// Holds the active mode. Switching swaps one reference, so readers never
/// observe a mix of two modes' flags.
#[derive(Debug, Clone, Copy)]
pub struct ModeController {
    active: &'static ModeConfig,
}

impl Default for ModeController {
    fn default() -> Self {
        Self {
            active: &BUILTIN_MODES[0],
        }
    }
}

impl ModeController {
    pub fn new(name: &str) -> Option<Self> {
        ModeConfig::builtin(name).map(|active| Self { active })
    }

    /// Returns false and leaves the active mode alone for undeclared names.
    pub fn switch_mode(&mut self, name: &str) -> bool {
        match ModeConfig::builtin(name) {
            Some(mode) => {
                tracing::info!(from = self.active.name, to = mode.name, "mode switched");
                self.active = mode;
                true
            }
            None => false,
        }
    }

    pub fn active(&self) -> &'static ModeConfig {
        self.active
    }

    pub fn name(&self) -> &'static str {
        self.active.name
    }

    pub fn auto_execute(&self) -> bool {
        self.active.auto_execute
    }

    pub fn show_plan(&self) -> bool {
        self.active.show_plan
    }

    pub fn require_confirmation(&self) -> bool {
        self.active.require_confirmation
    }

    pub fn get_mode_info(&self) -> String {
        format!("Mode: {} - {}", self.active.name, self.active.description)
    }

    pub fn list_modes(&self) -> String {
        ModeConfig::all()
            .iter()
            .map(|mode| {
                let marker = if mode.name == self.active.name { "→" } else { " " };
                format!("{marker} {}: {}", mode.name, mode.description)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Decides whether a requested tool call may run. Consulted once per request,
/// immediately before dispatch.
pub trait ConfirmationGate: Send {
    fn approve(&mut self, mode: &ModeConfig, request: &ToolCallRequest) -> bool;
}

/// Approves everything regardless of mode flags.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprove;

impl ConfirmationGate for AutoApprove {
    fn approve(&mut self, _mode: &ModeConfig, _request: &ToolCallRequest) -> bool {
        true
    }
}

/// Asks on `output` and reads the answer from `input`, but only when the
/// active mode requires confirmation. Anything but `y`/`yes` denies.
pub struct PromptConfirmation<R, W> {
    input: R,
    output: W,
}

impl<R, W> PromptConfirmation<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R, W> ConfirmationGate for PromptConfirmation<R, W>
where
    R: Read + Send,
    W: Write + Send,
{
    fn approve(&mut self, mode: &ModeConfig, request: &ToolCallRequest) -> bool {
        if !mode.require_confirmation {
            return true;
        }

        let asked = write!(
            self.output,
            "Allow tool '{}' with {}? [y/N] ",
            request.name,
            request.arguments_json()
        )
        .and_then(|_| self.output.flush());
        if asked.is_err() {
            return false;
        }

        let mut answer = String::new();
        match read_line(&mut self.input, &mut answer) {
            Ok(0) | Err(_) => false,
            Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn test_builtin_flags_match_table() {
        let expected = [
            ("normal", false, true, true),
            ("plan", false, true, true),
            ("yolo", true, false, false),
            ("build", true, true, false),
        ];
        let mut controller = ModeController::default();
        for (name, auto_execute, show_plan, require_confirmation) in expected {
            assert!(controller.switch_mode(name));
            assert_eq!(controller.name(), name);
            assert_eq!(controller.auto_execute(), auto_execute);
            assert_eq!(controller.show_plan(), show_plan);
            assert_eq!(controller.require_confirmation(), require_confirmation);
        }
    }

    #[test]
    fn test_unknown_mode_leaves_active_mode_unchanged() {
        let mut controller = ModeController::new("yolo").unwrap();
        assert!(!controller.switch_mode("turbo"));
        assert!(!controller.switch_mode("YOLO"));
        assert_eq!(controller.name(), "yolo");
        assert!(ModeController::new("turbo").is_none());
    }

    #[test]
    fn test_mode_info_and_listing() {
        let mut controller = ModeController::default();
        assert!(controller.get_mode_info().starts_with("Mode: normal"));

        controller.switch_mode("build");
        let listing = controller.list_modes();
        assert_eq!(listing.lines().count(), 4);
        assert!(listing.contains("→ build:"));
        assert!(listing.contains("  normal:"));
    }

    #[test]
    fn test_prompt_confirmation_only_asks_when_required() {
        let request = ToolCallRequest::from_value("toolu_1", "run_bash", json!({"command": "ls"}));
        let yolo = ModeConfig::builtin("yolo").unwrap();
        let normal = ModeConfig::builtin("normal").unwrap();

        let mut output = Vec::new();
        let mut gate = PromptConfirmation::new(Cursor::new("n\n"), &mut output);
        assert!(gate.approve(yolo, &request));
        assert!(!gate.approve(normal, &request));
        drop(gate);
        let prompt = String::from_utf8(output).unwrap();
        assert_eq!(prompt, "Allow tool 'run_bash' with {\"command\":\"ls\"}? [y/N] ");

        let mut gate = PromptConfirmation::new(Cursor::new("Yes\n"), Vec::new());
        assert!(gate.approve(normal, &request));
        assert!(!gate.approve(normal, &request));
    }
}
