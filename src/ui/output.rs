//! Status lines for the `status` and `config` commands

use super::context::UiContext;
use console::style;

/// Outcome attached to a status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Ok,
    Warn,
    Fail,
}

impl Mark {
    fn plain_tag(self) -> String {
        match self {
            Mark::Ok => style("[OK]").green().to_string(),
            Mark::Warn => style("[WARN]").yellow().to_string(),
            Mark::Fail => style("[FAIL]").red().to_string(),
        }
    }
}

/// Title banner
pub fn intro(ctx: &UiContext, title: &str) {
    if ctx.use_fancy_output() {
        cliclack::intro(style(title).cyan().bold()).ok();
    } else {
        println!("{}", style(title).cyan().bold());
    }
}

/// Group heading
pub fn section(ctx: &UiContext, title: &str) {
    println!();
    if ctx.use_fancy_output() {
        cliclack::log::info(style(title).bold()).ok();
    } else {
        println!("{}", style(title).bold());
    }
}

/// One checked item, with optional detail after a dash
pub fn check(ctx: &UiContext, mark: Mark, message: &str, detail: Option<&str>) {
    let text = match detail {
        Some(detail) if ctx.use_fancy_output() => format!("{} - {}", message, style(detail).dim()),
        Some(detail) => format!("{} - {}", message, detail),
        None => message.to_string(),
    };

    if ctx.use_fancy_output() {
        match mark {
            Mark::Ok => cliclack::log::success(text),
            Mark::Warn => cliclack::log::warning(text),
            Mark::Fail => cliclack::log::error(text),
        }
        .ok();
    } else {
        println!("  {} {}", mark.plain_tag(), text);
    }
}

/// Aligned key/value line
pub fn key_value(ctx: &UiContext, key: &str, value: &str) {
    if ctx.use_fancy_output() {
        println!("  {}: {}", style(key).dim(), value);
    } else {
        println!("  {}: {}", key, value);
    }
}

/// Closing summary line
pub fn outro(ctx: &UiContext, mark: Mark, message: &str) {
    if ctx.use_fancy_output() {
        let styled = match mark {
            Mark::Ok => style(message).green().bold(),
            Mark::Warn => style(message).yellow().bold(),
            Mark::Fail => style(message).red().bold(),
        };
        cliclack::outro(styled).ok();
    } else {
        println!();
        println!("{} {}", mark.plain_tag(), message);
    }
}
