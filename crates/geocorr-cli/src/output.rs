use console::style;
use serde::Serialize;
use std::fmt::Display;
use tabled::{settings::Style, Table, Tabled};

/// Output format mode
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Terminal output for the commands.
///
/// Commands branch on [`OutputWriter::is_json`]: JSON mode prints a single
/// [`OutputWriter::result`] object on stdout, human mode uses the section,
/// key-value and table printers. Warnings and errors go to stderr in both.
pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    pub fn new(json: bool) -> Self {
        Self {
            format: if json {
                OutputFormat::Json
            } else {
                OutputFormat::Human
            },
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    pub fn success(&self, message: impl Display) {
        println!("{} {}", style("✓").green().bold(), message);
    }

    pub fn info(&self, message: impl Display) {
        println!("{} {}", style("ℹ").blue().bold(), message);
    }

    pub fn warning(&self, message: impl Display) {
        self.status("warning", style("⚠").yellow().bold(), message);
    }

    pub fn error(&self, message: impl Display) {
        self.status("error", style("✗").red().bold(), message);
    }

    fn status(&self, status: &str, symbol: impl Display, message: impl Display) {
        match self.format {
            OutputFormat::Human => eprintln!("{} {}", symbol, message),
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "status": status,
                    "message": message.to_string(),
                });
                eprintln!("{}", serde_json::to_string_pretty(&output).unwrap_or_else(|_| output.to_string()));
            }
        }
    }

    pub fn table<T: Tabled>(&self, data: Vec<T>) {
        if data.is_empty() {
            println!("{}", style("(no data)").dim());
        } else {
            let mut table = Table::new(data);
            table.with(Style::rounded());
            println!("{}", table);
        }
    }

    /// Print the command's result wrapped in a success envelope
    pub fn result<T: Serialize>(&self, data: T) -> anyhow::Result<()> {
        let output = serde_json::json!({
            "status": "success",
            "data": data,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }

    pub fn kv(&self, key: impl Display, value: impl Display) {
        println!("{}: {}", style(key).bold(), value);
    }

    pub fn section(&self, title: impl Display) {
        println!("\n{}", style(title).bold().underlined());
    }
}

/// Format a value in metres with two decimals
pub fn metres(value: f64) -> String {
    format!("{:.2}", value)
}
