//! node_exporter command line to `prometheus.exporter.unix`.
//!
//! The exporter is configured entirely through flags on its `ExecStart=`
//! line. Each recognised flag maps to an attribute or nested block of the
//! unix exporter component; the result is wired to a scrape component and a
//! remote write endpoint.

use regex::Regex;
use tracing::debug;

use crate::core::error::{MigrateError, MigrateResult};
use crate::core::strategy::Warnings;
use crate::translate::block::{ComponentKind, Export, Reference, TargetBlock, Value};
use crate::translate::graph::ComponentGraph;

const EXPORTER_LABEL: &str = "node_exporter";
const REMOTE_WRITE_LABEL: &str = "default";
const EXEC_START_RE: &str = r"(?m)^[ \t]*ExecStart[ \t]*=[ \t]*(.*)$";

/// Collector settings recovered from the exporter flags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExporterFlags {
    pub enabled: Vec<String>,
    pub disabled: Vec<String>,
    pub disable_defaults: bool,
    pub textfile_directory: Option<String>,
    pub systemd_unit_include: Option<String>,
    pub systemd_unit_exclude: Option<String>,
    pub systemd_enable_restarts: bool,
    pub mount_points_exclude: Option<String>,
    pub fs_types_exclude: Option<String>,
    pub netdev_device_include: Option<String>,
    pub netdev_device_exclude: Option<String>,
    pub disk_device_include: Option<String>,
    pub disk_device_exclude: Option<String>,
    pub procfs_path: Option<String>,
    pub sysfs_path: Option<String>,
    pub rootfs_path: Option<String>,
}

impl ExporterFlags {
    /// Parse the arguments of an `ExecStart=` line. The line may still carry
    /// the `ExecStart=` prefix; the first token is the binary when it is not
    /// a flag.
    pub fn parse(exec_start: &str, warnings: &mut Warnings) -> MigrateResult<Self> {
        let line = exec_start.trim();
        let line = line.strip_prefix("ExecStart=").unwrap_or(line);

        let mut args = split_args(line)?.into_iter().peekable();
        if args.peek().is_some_and(|first| !first.starts_with('-')) {
            args.next();
        }

        let mut flags = ExporterFlags::default();

        while let Some(arg) = args.next() {
            let Some(flag) = arg.strip_prefix("--") else {
                warnings.push(format!("node_exporter argument '{}' skipped", arg));
                continue;
            };

            let (name, inline) = match flag.split_once('=') {
                Some((name, value)) => (name.to_string(), Some(value.to_string())),
                None => (flag.to_string(), None),
            };

            // Flags without a value are switches. For everything else the
            // value is either inline or the next token.
            let mut value = || -> MigrateResult<String> {
                if let Some(v) = &inline {
                    return Ok(v.clone());
                }
                match args.next_if(|next| !next.starts_with("--")) {
                    Some(v) => Ok(v),
                    None => Err(MigrateError::malformed(
                        format!("--{}", name),
                        "flag requires a value",
                    )),
                }
            };

            match name.as_str() {
                "collector.disable-defaults" => flags.disable_defaults = true,
                "collector.textfile.directory" => {
                    flags.textfile_directory = Some(value()?);
                    push_unique(&mut flags.enabled, "textfile");
                }
                "collector.systemd.unit-include" | "collector.systemd.unit-whitelist" => {
                    flags.systemd_unit_include = Some(value()?)
                }
                "collector.systemd.unit-exclude" | "collector.systemd.unit-blacklist" => {
                    flags.systemd_unit_exclude = Some(value()?)
                }
                "collector.systemd.enable-restarts-metrics" => flags.systemd_enable_restarts = true,
                "collector.filesystem.mount-points-exclude"
                | "collector.filesystem.ignored-mount-points" => {
                    flags.mount_points_exclude = Some(value()?)
                }
                "collector.filesystem.fs-types-exclude" | "collector.filesystem.ignored-fs-types" => {
                    flags.fs_types_exclude = Some(value()?)
                }
                "collector.netdev.device-include" => flags.netdev_device_include = Some(value()?),
                "collector.netdev.device-exclude" => flags.netdev_device_exclude = Some(value()?),
                "collector.diskstats.device-include" => flags.disk_device_include = Some(value()?),
                "collector.diskstats.device-exclude" | "collector.diskstats.ignored-devices" => {
                    flags.disk_device_exclude = Some(value()?)
                }
                "path.procfs" => flags.procfs_path = Some(value()?),
                "path.sysfs" => flags.sysfs_path = Some(value()?),
                "path.rootfs" => flags.rootfs_path = Some(value()?),
                other if other.starts_with("web.") || other.starts_with("log.") => {
                    // Value-less switches such as --web.disable-exporter-metrics
                    // leave the next flag alone.
                    let _ = args.next_if(|next| inline.is_none() && !next.starts_with("--"));
                    debug!("Ignoring node_exporter flag --{}", other);
                }
                other => match other.strip_prefix("collector.") {
                    Some(collector) if !collector.contains('.') && inline.is_none() => {
                        push_unique(&mut flags.enabled, collector)
                    }
                    _ => match other.strip_prefix("no-collector.") {
                        Some(collector) if !collector.contains('.') => {
                            push_unique(&mut flags.disabled, collector)
                        }
                        _ => warnings.push(format!(
                            "node_exporter flag --{} has no equivalent and was skipped",
                            other
                        )),
                    },
                },
            }
        }

        Ok(flags)
    }
}

/// Find the `ExecStart=` command of a systemd unit, joining `\` continuation
/// lines.
pub fn extract_exec_start(unit: &str) -> MigrateResult<String> {
    let pattern = Regex::new(EXEC_START_RE)?;

    let captures = pattern
        .captures(unit)
        .ok_or_else(|| MigrateError::malformed("ExecStart", "no ExecStart= line found in unit"))?;
    let first = captures.get(0).map(|m| m.end()).unwrap_or(unit.len());
    let mut command = captures[1].trim_end().to_string();

    let mut rest = unit[first..].lines().skip(1);
    while command.ends_with('\\') {
        command.pop();
        match rest.next() {
            Some(line) => {
                command.push(' ');
                command.push_str(line.trim());
            }
            None => break,
        }
    }

    let command = command.trim().to_string();
    if command.is_empty() {
        return Err(MigrateError::malformed("ExecStart", "command is empty"));
    }
    Ok(command)
}

/// Build the exporter, scrape and remote write components.
pub fn build_exporter_graph(flags: &ExporterFlags, remote_write_url: &str) -> MigrateResult<ComponentGraph> {
    let mut graph = ComponentGraph::new();

    graph.push(exporter_block(flags));
    graph.push(
        TargetBlock::component(ComponentKind::Scrape, EXPORTER_LABEL)
            .attr(
                "targets",
                Reference::new(ComponentKind::UnixExporter, EXPORTER_LABEL, Export::Targets),
            )
            .attr(
                "forward_to",
                Value::refs(vec![Reference::receiver(
                    ComponentKind::RemoteWrite,
                    REMOTE_WRITE_LABEL,
                )]),
            ),
    );
    graph.push(
        TargetBlock::component(ComponentKind::RemoteWrite, REMOTE_WRITE_LABEL)
            .block(TargetBlock::section("endpoint").attr("url", remote_write_url)),
    );

    graph.validate()?;
    Ok(graph)
}

fn exporter_block(flags: &ExporterFlags) -> TargetBlock {
    let mut block = TargetBlock::component(ComponentKind::UnixExporter, EXPORTER_LABEL);

    if flags.disable_defaults {
        block = block.attr("set_collectors", Value::string_list(&flags.enabled));
    } else if !flags.enabled.is_empty() {
        block = block.attr("enable_collectors", Value::string_list(&flags.enabled));
    }
    if !flags.disabled.is_empty() {
        block = block.attr("disable_collectors", Value::string_list(&flags.disabled));
    }

    block = block
        .opt_attr("procfs_path", flags.procfs_path.as_ref())
        .opt_attr("sysfs_path", flags.sysfs_path.as_ref())
        .opt_attr("rootfs_path", flags.rootfs_path.as_ref());

    if let Some(directory) = &flags.textfile_directory {
        block = block.block(TargetBlock::section("textfile").attr("directory", directory));
    }

    let systemd_enabled = flags.enabled.iter().any(|c| c == "systemd");
    if systemd_enabled
        || flags.systemd_enable_restarts
        || flags.systemd_unit_include.is_some()
        || flags.systemd_unit_exclude.is_some()
    {
        block = block.block(
            TargetBlock::section("systemd")
                .opt_attr("unit_include", flags.systemd_unit_include.as_ref())
                .opt_attr("unit_exclude", flags.systemd_unit_exclude.as_ref())
                .opt_attr(
                    "enable_restarts",
                    (systemd_enabled || flags.systemd_enable_restarts).then_some(true),
                ),
        );
    }

    if flags.mount_points_exclude.is_some() || flags.fs_types_exclude.is_some() {
        block = block.block(
            TargetBlock::section("filesystem")
                .opt_attr("mount_points_exclude", flags.mount_points_exclude.as_ref())
                .opt_attr("fs_types_exclude", flags.fs_types_exclude.as_ref()),
        );
    }

    if flags.netdev_device_include.is_some() || flags.netdev_device_exclude.is_some() {
        block = block.block(
            TargetBlock::section("netdev")
                .opt_attr("device_include", flags.netdev_device_include.as_ref())
                .opt_attr("device_exclude", flags.netdev_device_exclude.as_ref()),
        );
    }

    if flags.disk_device_include.is_some() || flags.disk_device_exclude.is_some() {
        block = block.block(
            TargetBlock::section("disk")
                .opt_attr("device_include", flags.disk_device_include.as_ref())
                .opt_attr("device_exclude", flags.disk_device_exclude.as_ref()),
        );
    }

    block
}

fn push_unique(list: &mut Vec<String>, item: &str) {
    if !list.iter().any(|existing| existing == item) {
        list.push(item.to_string());
    }
}

/// Split a command line on whitespace, honouring single and double quotes.
fn split_args(line: &str) -> MigrateResult<Vec<String>> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    args.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if quote.is_some() {
        return Err(MigrateError::malformed("ExecStart", "unbalanced quote"));
    }
    if in_token {
        args.push(current);
    }
    Ok(args)
}
