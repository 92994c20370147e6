use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use mavprims_frame::ids;
use mavprims_system::{ParamValue, SystemEvent};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct EventOutput {
    schema_id: &'static str,
    event: &'static str,
    uuid: u64,
    system_id: Option<u8>,
    component_id: Option<u8>,
    component: Option<&'static str>,
    timestamp: String,
}

pub fn print_event(event: &SystemEvent, format: OutputFormat) {
    let (name, system_id, component_id) = match *event {
        SystemEvent::Discovered {
            system_id,
            component_id,
            ..
        } => ("discovered", Some(system_id), Some(component_id)),
        SystemEvent::ConnectionLost { .. } => ("connection-lost", None, None),
        SystemEvent::Reconnected { .. } => ("reconnected", None, None),
    };
    let out = EventOutput {
        schema_id: "https://schemas.3leaps.dev/mavprims/cli/v1/system-event.schema.json",
        event: name,
        uuid: event.uuid(),
        system_id,
        component_id,
        component: component_id.map(ids::component_name),
        timestamp: now_unix_seconds(),
    };

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EVENT", "UUID", "SYSTEM", "COMPONENT"])
                .add_row(vec![
                    out.event.to_string(),
                    format!("{:#018x}", out.uuid),
                    optional(out.system_id),
                    out.component.unwrap_or("-").to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => match (out.system_id, out.component) {
            (Some(system_id), Some(component)) => println!(
                "{} uuid={:#x} system={} component={}",
                out.event, out.uuid, system_id, component
            ),
            _ => println!("{} uuid={:#x}", out.event, out.uuid),
        },
    }
}

#[derive(Serialize)]
struct CommandOutput {
    schema_id: &'static str,
    command: u16,
    system_id: u8,
    result: &'static str,
}

pub fn print_command_result(command: u16, system_id: u8, format: OutputFormat) {
    let out = CommandOutput {
        schema_id: "https://schemas.3leaps.dev/mavprims/cli/v1/command-result.schema.json",
        command,
        system_id,
        result: "accepted",
    };
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!(
                "command {} to system {}: {}",
                out.command, out.system_id, out.result
            );
        }
    }
}

#[derive(Serialize)]
struct ParamOutput<'a> {
    schema_id: &'static str,
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    value: serde_json::Value,
    system_id: u8,
}

pub fn print_param(name: &str, value: ParamValue, system_id: u8, format: OutputFormat) {
    let (kind, json_value) = match value {
        ParamValue::Float(v) => ("float", serde_json::json!(v)),
        ParamValue::Int32(v) => ("int32", serde_json::json!(v)),
    };
    let out = ParamOutput {
        schema_id: "https://schemas.3leaps.dev/mavprims/cli/v1/param-value.schema.json",
        name,
        kind,
        value: json_value,
        system_id,
    };

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["NAME", "TYPE", "VALUE"])
                .add_row(vec![name.to_string(), kind.to_string(), value.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{name} = {value} ({kind})"),
    }
}

fn print_json(out: &impl Serialize) {
    println!(
        "{}",
        serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
    );
}

fn optional(value: Option<u8>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
