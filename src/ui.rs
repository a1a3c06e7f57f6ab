use colored::Colorize;
use inquire::ui::{Color, RenderConfig, StyleSheet, Styled};
use std::sync::atomic::{AtomicBool, Ordering};
use supports_color::Stream;

use crate::command_name;
use crate::{
    CANCELLED_MESSAGE, UI_CURRENT_BADGE, UI_ERROR_PREFIX, UI_INFO_PREFIX, UI_UNKNOWN_ACCOUNT,
    UI_WARNING_PREFIX,
};

static PLAIN: AtomicBool = AtomicBool::new(false);

pub fn set_plain(value: bool) {
    PLAIN.store(value, Ordering::Relaxed);
}

pub fn is_plain() -> bool {
    PLAIN.load(Ordering::Relaxed)
}

pub fn use_color_stdout() -> bool {
    supports_color(Stream::Stdout)
}

pub fn use_color_stderr() -> bool {
    supports_color(Stream::Stderr)
}

fn supports_color(stream: Stream) -> bool {
    if is_plain() {
        return false;
    }
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    supports_color::on(stream).is_some()
}

pub fn style_text<F>(text: &str, use_color: bool, style: F) -> String
where
    F: FnOnce(colored::ColoredString) -> colored::ColoredString,
{
    if use_color && !is_plain() {
        style(text.normal()).to_string()
    } else {
        text.to_string()
    }
}

pub fn format_cmd(command: &str, use_color: bool) -> String {
    let text = format!("`{command}`");
    style_text(&text, use_color, |text| text.yellow().bold())
}

pub fn format_command(cmd: &str, use_color: bool) -> String {
    let name = command_name();
    let full = if cmd.is_empty() {
        name.to_string()
    } else {
        format!("{name} {cmd}")
    };
    format_cmd(&full, use_color)
}

pub fn format_action(message: &str, use_color: bool) -> String {
    let text = format!("✅ {message}");
    style_text(&text, use_color, |text| text.green().bold())
}

pub fn format_warning(message: &str, use_color: bool) -> String {
    let prefix = UI_WARNING_PREFIX;
    let mut lines = message.lines();
    let first = lines.next().unwrap_or_default();
    let mut text = format!("{prefix}{first}");
    let indent = " ".repeat(prefix.len());
    for line in lines {
        text.push('\n');
        text.push_str(&indent);
        text.push_str(line);
    }
    style_text(&text, use_color, |text| text.yellow().dimmed().italic())
}

pub fn format_cancel(use_color: bool) -> String {
    style_text(CANCELLED_MESSAGE, use_color, |text| text.dimmed().italic())
}

pub fn format_hint(message: &str, use_color: bool) -> String {
    if is_plain() {
        crate::msg1(UI_INFO_PREFIX, message)
    } else {
        style_text(message, use_color, |text| text.italic())
    }
}

pub fn format_error(message: &str) -> String {
    let message = message
        .strip_prefix(&format!("{UI_ERROR_PREFIX} "))
        .unwrap_or(message);
    let use_color = use_color_stderr();
    let prefix = if use_color {
        UI_ERROR_PREFIX.red().bold().to_string()
    } else {
        UI_ERROR_PREFIX.to_string()
    };
    let mut lines = message.lines();
    let first = lines.next().unwrap_or_default();
    let mut text = format!("{prefix} {first}");
    for line in lines {
        text.push('\n');
        text.push_str(&style_text(line, use_color, |text| text.dimmed().italic()));
    }
    text
}

/// Header for one credential: position, optional plan badge, email, current marker.
pub fn format_account_display(
    position: usize,
    email: Option<&str>,
    plan: Option<&str>,
    is_current: bool,
    use_color: bool,
) -> String {
    let index = format!("[{position}]");
    let badge = plan
        .map(|plan| format!(" {}", format_plan_badge(plan, use_color)))
        .unwrap_or_default();
    let email = email.unwrap_or(UI_UNKNOWN_ACCOUNT);
    let email = if use_color {
        format_email_badge(email, is_current)
    } else {
        format!(" {email}")
    };
    let current = if is_current {
        format!(" {}", style_text(UI_CURRENT_BADGE, use_color, |text| text.green().bold()))
    } else {
        String::new()
    };
    format!("{index}{badge}{email}{current}")
}

pub fn format_entry_header(display: &str, use_color: bool) -> String {
    if use_color {
        display.bold().to_string()
    } else {
        display.to_string()
    }
}

fn format_plan_badge(plan: &str, use_color: bool) -> String {
    let plan_upper = plan.to_uppercase();
    if use_color {
        format!(" {plan_upper} ").white().on_bright_black().to_string()
    } else {
        format!("[{plan_upper}]")
    }
}

fn format_email_badge(email: &str, is_current: bool) -> String {
    if is_current {
        format!(" {email} ").white().on_green().to_string()
    } else {
        format!(" {email} ").white().on_magenta().to_string()
    }
}

pub fn inquire_select_render_config() -> RenderConfig<'static> {
    let mut config = if use_color_stderr() {
        let mut config = RenderConfig::default_colored();
        config.help_message = StyleSheet::new().with_fg(Color::DarkGrey);
        config
    } else {
        RenderConfig::empty()
    };
    config.prompt_prefix = Styled::new("");
    config.answered_prompt_prefix = Styled::new("");
    config
}

pub fn is_inquire_cancel(err: &inquire::error::InquireError) -> bool {
    matches!(
        err,
        inquire::error::InquireError::OperationCanceled
            | inquire::error::InquireError::OperationInterrupted
    )
}

const OUTPUT_INDENT: &str = " ";

pub fn print_output_block(message: &str) {
    let message = if is_plain() {
        message.to_string()
    } else {
        indent_output(message)
    };
    println!("\n{message}\n");
}

fn indent_output(message: &str) -> String {
    message
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{OUTPUT_INDENT}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
