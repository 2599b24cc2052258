//! Declarative escalation rules.
//!
//! An ordered table of `(predicate, reason)` pairs evaluated top to bottom;
//! the first match wins and later rules are not evaluated.

use crate::domain::models::{EscalationReason, Instruction, InstructionStatus};

/// Everything a rule may look at.
#[derive(Debug, Clone)]
pub struct RuleContext<'a> {
    pub instruction: &'a Instruction,
    /// Current reasoning-loop iteration, absent outside the loop
    pub loop_count: Option<u32>,
    pub tool_used: Option<&'a str>,
    /// Required checkpoint tags without an approved checkpoint
    pub unapproved_checkpoints: Vec<String>,
    /// Required reflection tags without a reflection
    pub missing_reflections: Vec<String>,
}

/// Returns escalation details when the rule matches.
pub type RulePredicate = fn(&RuleContext<'_>) -> Option<String>;

#[derive(Clone)]
pub struct EscalationRule {
    pub name: &'static str,
    pub reason: EscalationReason,
    pub predicate: RulePredicate,
}

impl std::fmt::Debug for EscalationRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscalationRule")
            .field("name", &self.name)
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

/// A rule that fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub rule: &'static str,
    pub reason: EscalationReason,
    pub details: String,
}

#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<EscalationRule>,
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::standard()
    }
}

fn loop_exceeded(ctx: &RuleContext<'_>) -> Option<String> {
    let count = ctx.loop_count?;
    (count > ctx.instruction.loop_enforcement).then(|| {
        format!(
            "loop count {count} exceeds limit {}",
            ctx.instruction.loop_enforcement
        )
    })
}

fn tool_violation(ctx: &RuleContext<'_>) -> Option<String> {
    let tool = ctx.tool_used?;
    (!ctx.instruction.permits_tool(tool)).then(|| format!("tool '{tool}' is not permitted"))
}

fn unapproved_checkpoints(ctx: &RuleContext<'_>) -> Option<String> {
    (ctx.instruction.status == InstructionStatus::InProgress
        && !ctx.unapproved_checkpoints.is_empty())
    .then(|| {
        format!(
            "required checkpoints not approved: {}",
            ctx.unapproved_checkpoints.join(", ")
        )
    })
}

fn missing_reflections(ctx: &RuleContext<'_>) -> Option<String> {
    (ctx.instruction.status == InstructionStatus::InProgress
        && !ctx.missing_reflections.is_empty())
    .then(|| {
        format!(
            "required reflections missing: {}",
            ctx.missing_reflections.join(", ")
        )
    })
}

fn failed_instruction(ctx: &RuleContext<'_>) -> Option<String> {
    (ctx.instruction.status == InstructionStatus::Failed && ctx.instruction.escalate_on_failure)
        .then(|| "instruction failed and requires escalation".to_string())
}

impl RuleTable {
    pub const fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// The standard priority order.
    pub fn standard() -> Self {
        Self::empty()
            .with_rule("loop_limit", EscalationReason::LoopExceeded, loop_exceeded)
            .with_rule("tool_allowlist", EscalationReason::ToolViolation, tool_violation)
            .with_rule(
                "checkpoint_approval",
                EscalationReason::ValidationFailed,
                unapproved_checkpoints,
            )
            .with_rule(
                "reflection_presence",
                EscalationReason::MissingOutputs,
                missing_reflections,
            )
            .with_rule(
                "failure_escalation",
                EscalationReason::ValidationFailed,
                failed_instruction,
            )
    }

    /// Append a rule at the lowest priority.
    pub fn with_rule(
        mut self,
        name: &'static str,
        reason: EscalationReason,
        predicate: RulePredicate,
    ) -> Self {
        self.rules.push(EscalationRule {
            name,
            reason,
            predicate,
        });
        self
    }

    pub fn rules(&self) -> &[EscalationRule] {
        &self.rules
    }

    pub fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<RuleMatch> {
        self.rules.iter().find_map(|rule| {
            (rule.predicate)(ctx).map(|details| RuleMatch {
                rule: rule.name,
                reason: rule.reason,
                details,
            })
        })
    }
}
