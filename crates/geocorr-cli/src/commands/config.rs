//! Config command implementation

use crate::cli::ConfigArgs;
use crate::commands::load_config;
use crate::output::OutputWriter;
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tabled::Tabled;

#[derive(Debug, Serialize)]
struct ConfigEntry {
    value: String,
    source: String,
}

pub fn execute(args: ConfigArgs, config_file: Option<&Path>, output: &OutputWriter) -> Result<()> {
    let config = load_config(config_file, args.params.overrides()?)?;

    // Fail early on values the pipeline would reject
    let validation = config.params().and_then(|_| config.settings());

    let entries: BTreeMap<String, ConfigEntry> = config
        .to_inspection_map()
        .into_iter()
        .map(|(key, (value, source))| (key, ConfigEntry { value, source: format!("{:?}", source) }))
        .collect();

    if output.is_json() {
        output.result(&entries)?;
    } else {
        output.section("Configuration Values");

        #[derive(Tabled)]
        struct ConfigRow {
            #[tabled(rename = "Key")]
            key: String,
            #[tabled(rename = "Value")]
            value: String,
            #[tabled(rename = "Source")]
            source: String,
        }

        let rows: Vec<ConfigRow> = entries
            .into_iter()
            .map(|(key, entry)| ConfigRow { key, value: entry.value, source: entry.source })
            .collect();
        output.table(rows);

        output.section("Configuration Precedence");
        output.info("CLI arguments > Environment variables > Config file > Defaults");
    }

    if let Err(e) = validation {
        output.warning(format!("Configuration is not usable: {}", e));
    }

    Ok(())
}
