//! Deterministic serializer from the block tree to Alloy configuration text.

pub mod syntax;

use std::fmt::Write;

use crate::core::error::{MigrateError, MigrateResult};
use crate::core::registry::is_identifier;
use crate::translate::block::{TargetBlock, Value};
use crate::translate::graph::ComponentGraph;

const INDENT: &str = "\t";

/// Render a component graph. Top-level blocks are separated by a blank line
/// and the text ends with a newline.
pub fn render(graph: &ComponentGraph) -> MigrateResult<String> {
    render_blocks(&graph.blocks)
}

pub fn render_blocks(blocks: &[TargetBlock]) -> MigrateResult<String> {
    let mut out = String::new();

    for (idx, block) in blocks.iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        write_block(&mut out, block, 0)?;
    }

    Ok(out)
}

/// Render, then parse the result back to make sure it is well formed.
pub fn render_checked(graph: &ComponentGraph) -> MigrateResult<String> {
    let text = render(graph)?;
    syntax::parse(&text)?;
    Ok(text)
}

fn write_block(out: &mut String, block: &TargetBlock, depth: usize) -> MigrateResult<()> {
    indent(out, depth);
    out.push_str(&block.kind.name());
    if let Some(label) = &block.label {
        out.push(' ');
        write_string(out, label);
    }

    if block.attributes.is_empty() && block.blocks.is_empty() {
        out.push_str(" { }\n");
        return Ok(());
    }
    out.push_str(" {\n");

    for (key, value) in &block.attributes {
        if !is_identifier(key) {
            return Err(MigrateError::render(format!(
                "attribute name '{}' in '{}' is not an identifier",
                key,
                block.kind.name()
            )));
        }
        indent(out, depth + 1);
        out.push_str(key);
        out.push_str(" = ");
        write_value(out, value, depth + 1)?;
        out.push('\n');
    }

    for nested in &block.blocks {
        write_block(out, nested, depth + 1)?;
    }

    indent(out, depth);
    out.push_str("}\n");
    Ok(())
}

fn write_value(out: &mut String, value: &Value, depth: usize) -> MigrateResult<()> {
    match value {
        Value::String(s) => write_string(out, s),
        Value::Int(n) => {
            let _ = write!(out, "{}", n);
        }
        Value::Float(f) => {
            if !f.is_finite() {
                return Err(MigrateError::render(format!(
                    "number {} cannot be represented",
                    f
                )));
            }
            let _ = write!(out, "{:?}", f);
        }
        Value::Bool(b) => {
            let _ = write!(out, "{}", b);
        }
        Value::Ref(reference) => {
            let _ = write!(out, "{}", reference);
        }
        Value::List(items) => write_list(out, items, depth)?,
        Value::Object(entries) => {
            if entries.is_empty() {
                out.push_str("{}");
                return Ok(());
            }
            out.push_str("{\n");
            for (key, item) in entries {
                indent(out, depth + 1);
                if is_identifier(key) {
                    out.push_str(key);
                } else {
                    write_string(out, key);
                }
                out.push_str(" = ");
                write_value(out, item, depth + 1)?;
                out.push_str(",\n");
            }
            indent(out, depth);
            out.push('}');
        }
    }
    Ok(())
}

/// Scalar lists stay on one line; lists holding objects or lists open each
/// element on the bracket line, e.g. `[{ ... }, { ... }]`.
fn write_list(out: &mut String, items: &[Value], depth: usize) -> MigrateResult<()> {
    out.push('[');
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            out.push_str(", ");
        }
        write_value(out, item, depth)?;
    }
    out.push(']');
    Ok(())
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::block::{ComponentKind, Export, Reference};
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_component() {
        let block = TargetBlock::component(ComponentKind::FileSource, "system")
            .attr(
                "targets",
                Reference::new(ComponentKind::FileMatch, "system", Export::Targets),
            )
            .attr(
                "forward_to",
                Value::refs(vec![Reference::receiver(ComponentKind::Connection, "default")]),
            );

        assert_eq!(
            render_blocks(&[block]).unwrap(),
            "loki.source.file \"system\" {\n\
             \ttargets = local.file_match.system.targets\n\
             \tforward_to = [loki.write.default.receiver]\n\
             }\n"
        );
    }

    #[test]
    fn test_render_nested_and_objects() {
        let block = TargetBlock::component(ComponentKind::Process, "app").block(
            TargetBlock::stage("labels").attr(
                "values",
                Value::Object(IndexMap::from([
                    ("level".to_string(), Value::string("level")),
                    ("app.kubernetes.io/name".to_string(), Value::string("name")),
                ])),
            ),
        );

        assert_eq!(
            render_blocks(&[block]).unwrap(),
            "loki.process \"app\" {\n\
             \tstage.labels {\n\
             \t\tvalues = {\n\
             \t\t\tlevel = \"level\",\n\
             \t\t\t\"app.kubernetes.io/name\" = \"name\",\n\
             \t\t}\n\
             \t}\n\
             }\n"
        );
    }

    #[test]
    fn test_render_list_of_objects() {
        let block = TargetBlock::component(ComponentKind::FileMatch, "system").attr(
            "path_targets",
            Value::List(vec![
                Value::Object(IndexMap::from([(
                    "__address__".to_string(),
                    Value::string("localhost"),
                )])),
                Value::Object(IndexMap::from([(
                    "__address__".to_string(),
                    Value::string("remote"),
                )])),
            ]),
        );

        assert_eq!(
            render_blocks(&[block]).unwrap(),
            "local.file_match \"system\" {\n\
             \tpath_targets = [{\n\
             \t\t__address__ = \"localhost\",\n\
             \t}, {\n\
             \t\t__address__ = \"remote\",\n\
             \t}]\n\
             }\n"
        );
    }

    #[test]
    fn test_render_scalars() {
        let block = TargetBlock::section("metric.histogram")
            .attr("buckets", Value::List(vec![Value::Float(0.1), Value::Float(1.0)]))
            .attr("max_lines", Value::Int(128))
            .attr("match_all", true)
            .attr("external_labels", Value::Object(IndexMap::new()));

        assert_eq!(
            render_blocks(&[block]).unwrap(),
            "metric.histogram {\n\
             \tbuckets = [0.1, 1.0]\n\
             \tmax_lines = 128\n\
             \tmatch_all = true\n\
             \texternal_labels = {}\n\
             }\n"
        );
    }

    #[test]
    fn test_string_escaping() {
        let mut out = String::new();
        write_string(&mut out, "a\"b\\c\nd\te\r\u{1}");
        assert_eq!(out, r#""a\"b\\c\nd\te\r\u0001""#);
    }

    #[test]
    fn test_non_finite_float_rejected() {
        let block = TargetBlock::section("x").attr("n", Value::Float(f64::NAN));
        assert!(matches!(render_blocks(&[block]), Err(MigrateError::Render(_))));
    }

    #[test]
    fn test_blocks_separated_by_blank_line() {
        let text = render_blocks(&[
            TargetBlock::component(ComponentKind::Connection, "default"),
            TargetBlock::component(ComponentKind::Connection, "client_1"),
        ])
        .unwrap();
        assert_eq!(
            text,
            "loki.write \"default\" { }\n\nloki.write \"client_1\" { }\n"
        );
    }

    #[test]
    fn test_render_checked_roundtrip() {
        let mut graph = ComponentGraph::new();
        graph.push(
            TargetBlock::component(ComponentKind::Process, "app").block(
                TargetBlock::stage("regex").attr("expression", r#"^(?P<ip>\S+) "(?P<m>\w+)"$"#),
            ),
        );
        let text = render_checked(&graph).unwrap();
        assert!(text.ends_with("}\n"));
    }
}
