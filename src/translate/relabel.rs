use crate::core::error::{MigrateError, MigrateResult};
use crate::source::RelabelRule;
use crate::translate::block::{BlockKind, TargetBlock, Value};

/// Translate relabel rules into `rule` blocks, one per rule, in order.
pub fn translate_rules(rules: &[RelabelRule], job: &str) -> MigrateResult<Vec<TargetBlock>> {
    rules
        .iter()
        .enumerate()
        .map(|(idx, rule)| translate_rule(rule, idx, job))
        .collect()
}

fn translate_rule(rule: &RelabelRule, idx: usize, job: &str) -> MigrateResult<TargetBlock> {
    let action = rule.action.unwrap_or_default();

    if rule.source_labels.is_empty() && !action.acts_on_label_names() {
        return Err(MigrateError::missing_field(
            "source_labels",
            format!("relabel rule {} of job '{}'", idx, job),
        ));
    }

    let mut block = TargetBlock::new(BlockKind::RelabelGroup);
    if !rule.source_labels.is_empty() {
        block = block.attr("source_labels", Value::string_list(&rule.source_labels));
    }

    Ok(block
        .opt_attr("separator", rule.separator.as_ref())
        .opt_attr("regex", rule.regex.as_ref())
        .opt_attr("modulus", rule.modulus)
        .opt_attr("target_label", rule.target_label.as_ref())
        .opt_attr("replacement", rule.replacement.as_ref())
        .opt_attr("action", rule.action.map(|a| a.as_str())))
}
