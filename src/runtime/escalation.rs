//! Escalation comparison (C7): evaluates a `PromptSpec`'s `escalate if <op>
//! "<value>"` clause against a prompt's rendered output.
//!
//! Three operators compare text directly (`==`, `!=`, `contains`); `~` is
//! the "normalized" comparison used for free-form model text where markdown
//! emphasis and whitespace differences shouldn't cause a false escalation.

use crate::dsl::ast::EscalationOp;

/// Strip ASCII markdown emphasis markers (`*`, `_`, `` ` ``) and Unicode
/// whitespace, then lowercase. Resolution of the `~` normalization Open
/// Question (see DESIGN.md): favors simple, explicit character-class
/// checks over pulling in a markdown parser for a single comparison.
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '*' | '_' | '`') && !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

/// Evaluate `actual <op> expected`, where `op` comes from a DSL escalation
/// clause.
pub fn evaluate(op: EscalationOp, actual: &str, expected: &str) -> bool {
    match op {
        EscalationOp::Normalized => normalize(actual) == normalize(expected),
        EscalationOp::Eq => actual == expected,
        EscalationOp::NotEq => actual != expected,
        EscalationOp::Contains => actual.contains(expected),
    }
}
