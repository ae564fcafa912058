use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{Attribute, Cell, Color as TableColor, Table};
use ridesync::FriendsOverview;
use ridesync::feed::FeedEntry;
use ridesync::types::{Notification, UserProfile};
use serde::Serialize;

use crate::theme::{ICONS, THEME};

/// Output format options for CLI commands
#[derive(Clone, Debug, ValueEnum, Default, PartialEq)]
pub enum OutputFormat {
    /// Formatted table output (default)
    #[default]
    Table,
    /// JSON output for scripting
    Json,
    /// Compact single-line output
    Compact,
}

/// Global CLI options that affect output
#[derive(Clone, Debug, Default)]
pub struct GlobalOptions {
    pub output_format: OutputFormat,
    pub quiet: bool,
    pub no_color: bool,
}

/// Data that can be rendered as a table or a single line
pub trait TableDisplay {
    fn to_table(&self, options: &GlobalOptions) -> Table;
    fn to_compact(&self) -> String;
}

pub struct OutputManager {
    pub options: GlobalOptions,
}

impl OutputManager {
    pub fn new(options: GlobalOptions) -> Self {
        Self { options }
    }

    /// Display data according to the configured output format
    pub fn display<T>(&self, data: &T) -> Result<()>
    where
        T: Serialize + TableDisplay,
    {
        if self.options.quiet {
            return Ok(());
        }

        match self.options.output_format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                println!("{json}");
            }
            OutputFormat::Table => {
                let table = data.to_table(&self.options);
                println!("{table}");
            }
            OutputFormat::Compact => {
                println!("{}", data.to_compact());
            }
        }
        Ok(())
    }

    pub fn success(&self, message: &str) {
        if !self.options.quiet {
            println!("{}", self.decorate(ICONS.success, message, THEME.success));
        }
    }

    pub fn error(&self, message: &str) {
        eprintln!("{}", self.decorate(ICONS.error, message, THEME.error));
    }

    pub fn warning(&self, message: &str) {
        if !self.options.quiet {
            println!("{}", self.decorate(ICONS.warning, message, THEME.warning));
        }
    }

    pub fn info(&self, message: &str) {
        if !self.options.quiet && self.options.output_format != OutputFormat::Json {
            println!("{}", self.decorate(ICONS.info, message, THEME.info));
        }
    }

    pub fn heading(&self, text: &str) {
        if self.options.quiet || self.options.output_format == OutputFormat::Json {
            return;
        }
        if self.options.no_color {
            println!("\n{text}\n{}", "=".repeat(text.chars().count()));
        } else {
            println!("\n{}", text.color(THEME.primary).bold());
        }
    }

    fn decorate(&self, icon: &str, message: &str, color: colored::Color) -> String {
        if self.options.no_color {
            format!("{icon} {message}")
        } else {
            format!("{} {}", icon.color(color), message.color(color))
        }
    }
}

fn themed_table(options: &GlobalOptions, headers: &[&str]) -> Table {
    let mut table = Table::new();
    if options.no_color {
        table.load_preset(comfy_table::presets::ASCII_FULL);
    } else {
        table.load_preset(comfy_table::presets::UTF8_FULL_CONDENSED);
    }
    let cells: Vec<Cell> = headers
        .iter()
        .map(|h| {
            let cell = Cell::new(h).add_attribute(Attribute::Bold);
            if options.no_color { cell } else { cell.fg(TableColor::Cyan) }
        })
        .collect();
    table.set_header(cells);
    table
}

fn like_marker(liked: bool) -> &'static str {
    if liked { ICONS.liked } else { ICONS.not_liked }
}

impl TableDisplay for Vec<FeedEntry> {
    fn to_table(&self, options: &GlobalOptions) -> Table {
        let mut table = themed_table(options, &["Route", "Rider", "Title", "Likes", "Comments", "Posted"]);
        if self.is_empty() {
            table.add_row(vec![Cell::new("Feed is empty")]);
            return table;
        }
        for entry in self {
            let likes = format!("{} {}", like_marker(entry.viewer_has_liked), entry.likes);
            let likes = if entry.viewer_has_liked && !options.no_color {
                Cell::new(likes).fg(TableColor::Red)
            } else {
                Cell::new(likes)
            };
            table.add_row(vec![
                Cell::new(&entry.id),
                Cell::new(&entry.creator.display_name),
                Cell::new(&entry.title),
                likes,
                Cell::new(entry.comments),
                Cell::new(entry.created_at.format("%Y-%m-%d %H:%M")),
            ]);
        }
        table
    }

    fn to_compact(&self) -> String {
        self.iter()
            .map(|entry| {
                format!(
                    "{} \"{}\" by {} {}{} {}c",
                    entry.id,
                    entry.title,
                    entry.creator.display_name,
                    like_marker(entry.viewer_has_liked),
                    entry.likes,
                    entry.comments
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl TableDisplay for FriendsOverview {
    fn to_table(&self, options: &GlobalOptions) -> Table {
        let mut table = themed_table(options, &["", "Friend", "Last message", "Time"]);
        if self.friends.is_empty() {
            table.add_row(vec![Cell::new(""), Cell::new("No friends yet")]);
        }
        for friend in &self.friends {
            let marker = if friend.unread {
                let cell = Cell::new(ICONS.unread);
                if options.no_color { cell } else { cell.fg(TableColor::Magenta) }
            } else {
                Cell::new("")
            };
            table.add_row(vec![
                marker,
                Cell::new(&friend.counterpart.display_name),
                Cell::new(&friend.last_message_text),
                Cell::new(&friend.time_label),
            ]);
        }
        table.add_row(vec![
            Cell::new(""),
            Cell::new("Pending requests").add_attribute(Attribute::Italic),
            Cell::new(self.pending_requests),
            Cell::new(""),
        ]);
        table
    }

    fn to_compact(&self) -> String {
        let unread = self.friends.iter().filter(|f| f.unread).count();
        format!(
            "friends={} unread={} pending={}",
            self.friends.len(),
            unread,
            self.pending_requests
        )
    }
}

impl TableDisplay for Vec<UserProfile> {
    fn to_table(&self, options: &GlobalOptions) -> Table {
        let mut table = themed_table(options, &["User", "Name", "City", "Motorcycle"]);
        for profile in self {
            let bike = profile
                .motorcycle
                .as_ref()
                .map(|m| format!("{} {}", m.brand, m.model))
                .unwrap_or_default();
            table.add_row(vec![
                Cell::new(&profile.id),
                Cell::new(&profile.display_name),
                Cell::new(profile.city.as_deref().unwrap_or("")),
                Cell::new(bike),
            ]);
        }
        table
    }

    fn to_compact(&self) -> String {
        self.iter().map(|p| p.id.as_str()).collect::<Vec<_>>().join(" ")
    }
}

impl TableDisplay for Vec<Notification> {
    fn to_table(&self, options: &GlobalOptions) -> Table {
        let mut table = themed_table(options, &["Message", "Route", "When"]);
        if self.is_empty() {
            table.add_row(vec![Cell::new("No unread notifications")]);
        }
        for notification in self {
            table.add_row(vec![
                Cell::new(&notification.message),
                Cell::new(notification.content_id.as_deref().unwrap_or("")),
                Cell::new(notification.created_at.format("%Y-%m-%d %H:%M")),
            ]);
        }
        table
    }

    fn to_compact(&self) -> String {
        format!("unread={}", self.len())
    }
}
