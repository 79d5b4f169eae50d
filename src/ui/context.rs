//! Terminal detection

use std::io::IsTerminal;

/// Environment variables set by CI systems and service managers
const NON_INTERACTIVE_MARKERS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "JENKINS_URL",
    "BUILDKITE",
    "TF_BUILD",
    "INVOCATION_ID",
    "XPC_SERVICE_NAME",
];

/// Decides between decorated and plain output
#[derive(Debug, Clone, Copy)]
pub struct UiContext {
    interactive: bool,
}

impl UiContext {
    /// Inspect stdout and the environment
    pub fn detect() -> Self {
        let marked = NON_INTERACTIVE_MARKERS
            .iter()
            .any(|var| std::env::var_os(var).is_some_and(|v| !v.is_empty() && v != "0"));

        Self {
            interactive: std::io::stdout().is_terminal() && !marked,
        }
    }

    /// Plain output regardless of the environment
    pub fn non_interactive() -> Self {
        Self { interactive: false }
    }

    pub fn use_fancy_output(&self) -> bool {
        self.interactive
    }
}
