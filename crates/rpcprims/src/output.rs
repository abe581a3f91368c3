use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use rpcprims_rpc::MethodDescriptor;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
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

/// One reply value as printed by `call`.
#[derive(Debug, Serialize)]
pub struct ReplyOutput<'a> {
    pub method: &'a str,
    pub seq: u64,
    /// Position within a streamed call; absent for unary calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u64>,
    pub reply: &'a Value,
}

pub fn print_reply(out: &ReplyOutput<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", to_json_line(out)),
        OutputFormat::Table => {
            let mut table = new_table(vec!["METHOD", "SEQ", "INDEX", "REPLY"]);
            table.add_row(vec![
                out.method.to_string(),
                out.seq.to_string(),
                out.index.map(|i| i.to_string()).unwrap_or_else(|| "-".into()),
                out.reply.to_string(),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let body = serde_json::to_string_pretty(out.reply)
                .unwrap_or_else(|_| out.reply.to_string());
            match out.index {
                Some(index) => println!("{} #{} [{}] {}", out.method, out.seq, index, body),
                None => println!("{} #{} {}", out.method, out.seq, body),
            }
        }
    }
}

/// Summary line printed after a streamed call ends.
#[derive(Debug, Serialize)]
pub struct StreamSummary<'a> {
    pub method: &'a str,
    pub seq: u64,
    pub delivered: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a str>,
}

pub fn print_stream_summary(summary: &StreamSummary<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", to_json_line(summary)),
        OutputFormat::Table | OutputFormat::Pretty => {
            let status = summary.error.unwrap_or("ok");
            println!(
                "{} #{}: {} replies, {}",
                summary.method, summary.seq, summary.delivered, status
            );
        }
    }
}

#[derive(Debug, Serialize)]
struct MethodOutput<'a> {
    name: &'a str,
    kind: String,
    argument: &'a str,
    reply: &'a str,
}

pub fn print_methods(methods: &[&MethodDescriptor], format: OutputFormat) {
    let rows: Vec<MethodOutput<'_>> = methods
        .iter()
        .map(|m| MethodOutput {
            name: m.name(),
            kind: m.kind().to_string(),
            argument: m.argument_shape(),
            reply: m.reply_shape(),
        })
        .collect();

    match format {
        OutputFormat::Json => {
            for row in &rows {
                println!("{}", to_json_line(row));
            }
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["METHOD", "KIND", "ARGUMENT", "REPLY"]);
            for row in &rows {
                table.add_row(vec![row.name, row.kind.as_str(), row.argument, row.reply]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in &rows {
                println!("{} ({}) {} -> {}", row.name, row.kind, row.argument, row.reply);
            }
        }
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn to_json_line<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn unary_reply_omits_index() {
        let reply = json!({"Quo": 3, "Rem": 1});
        let out = ReplyOutput {
            method: "Arith.Divide",
            seq: 1,
            index: None,
            reply: &reply,
        };
        assert_eq!(
            to_json_line(&out),
            r#"{"method":"Arith.Divide","seq":1,"reply":{"Quo":3,"Rem":1}}"#
        );
    }

    #[test]
    fn failed_stream_summary_carries_error() {
        let summary = StreamSummary {
            method: "Arith.Thrive",
            seq: 2,
            delivered: 2,
            error: Some("triggered error in middle"),
        };
        let value: Value = serde_json::from_str(&to_json_line(&summary)).unwrap();
        assert_eq!(value["delivered"], 2);
        assert_eq!(value["error"], "triggered error in middle");
    }
}
