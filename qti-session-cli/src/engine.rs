// qti-session-cli/src/engine.rs
// ============================================================================
// Module: Fixture Expression Engine
// Description: A small literal-expression evaluator for CLI fixture data,
//              standing in for the (out-of-scope) QTI expression language.
// Purpose: Let `qti-session run` drive a real TestSessionDriver without
//          pulling in a full expression-language implementation.
// Dependencies: qti-session-core
// ============================================================================

//! ## Overview
//! Fixture expressions are plain, comma-separated function calls rather than
//! QTI's XML expression tree: `literal(true)`, `matches(RESPONSE,CORRECT)`,
//! `scoreResponse(RESPONSE,CORRECT,SCORE)`, `sumOutcome(SCORE)`. This keeps
//! fixture authoring legible without implying the engine bundles a general
//! rule language, which the core does not.

use qti_session_core::core::model::ExpressionRef;
use qti_session_core::core::variable::QtiValue;
use qti_session_core::core::variable::SingleValue;
use qti_session_core::core::variable::State;
use qti_session_core::interfaces::EvaluationContext;
use qti_session_core::interfaces::ExpressionEngine;
use qti_session_core::item::CompletionStatus;
use qti_session_core::item::ItemSessionStore;

/// Evaluates the small fixture expression dialect described above.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureExpressionEngine;

/// Splits a call of the form `name(arg1,arg2)` into its name and arguments.
fn parse_call(body: &str) -> Option<(&str, Vec<&str>)> {
    let open = body.find('(')?;
    let name = &body[..open];
    let close = body.rfind(')')?;
    if close < open {
        return None;
    }
    let args_text = &body[open + 1..close];
    let args = if args_text.is_empty() {
        Vec::new()
    } else {
        args_text.split(',').map(str::trim).collect()
    };
    Some((name.trim(), args))
}

/// Reads a response's identifier-valued single response as an owned string.
fn identifier_value(state: &State, identifier: &str) -> Option<String> {
    match state.get_variable(identifier)?.value.as_ref()? {
        QtiValue::Single(SingleValue::Identifier(value)) => Some(value.clone()),
        _ => None,
    }
}

/// Sums an integer outcome across every item session into a global outcome.
fn sum_outcome(global_outcomes: &mut State, item_sessions: &ItemSessionStore, outcome_identifier: &str) {
    let total: i32 = item_sessions
        .iter()
        .filter_map(|session| session.variables().get_variable(outcome_identifier))
        .filter_map(|variable| variable.value.as_ref())
        .filter_map(|value| match value {
            QtiValue::Single(SingleValue::Integer(score)) => Some(*score),
            _ => None,
        })
        .sum();
    global_outcomes.set_variable(outcome_identifier, QtiValue::Single(SingleValue::Integer(total)));
}

impl ExpressionEngine for FixtureExpressionEngine {
    fn evaluate(&self, expression: &ExpressionRef, context: &EvaluationContext<'_>) -> Option<QtiValue> {
        let (name, args) = parse_call(&expression.0)?;
        match name {
            "literal" => match args.first().copied() {
                Some("true") => Some(QtiValue::Single(SingleValue::Boolean(true))),
                Some("false") => Some(QtiValue::Single(SingleValue::Boolean(false))),
                _ => None,
            },
            "matches" => {
                let [response_id, expected] = args.as_slice() else {
                    return None;
                };
                let item = context.current_item?;
                let actual = identifier_value(item, response_id)?;
                Some(QtiValue::Single(SingleValue::Boolean(actual == *expected)))
            }
            _ => None,
        }
    }

    fn run_response_processing(
        &self,
        expression: &ExpressionRef,
        item_variables: &mut State,
    ) -> Result<CompletionStatus, String> {
        let (name, args) = parse_call(&expression.0)
            .ok_or_else(|| format!("malformed response processing expression {}", expression.0))?;
        if name != "scoreResponse" {
            return Err(format!("unsupported response processing call {name}"));
        }
        let [response_id, expected, outcome_id] = args.as_slice() else {
            return Err("scoreResponse requires exactly three arguments".to_string());
        };
        let actual = identifier_value(item_variables, response_id);
        let score = i32::from(actual.as_deref() == Some(*expected));
        item_variables.set_variable(outcome_id, QtiValue::Single(SingleValue::Integer(score)));
        Ok(CompletionStatus::Completed)
    }

    fn run_outcome_processing(
        &self,
        expression: &ExpressionRef,
        global_outcomes: &mut State,
        item_sessions: &ItemSessionStore,
    ) -> Result<(), String> {
        let (name, args) =
            parse_call(&expression.0).ok_or_else(|| format!("malformed outcome processing expression {}", expression.0))?;
        if name != "sumOutcome" {
            return Err(format!("unsupported outcome processing call {name}"));
        }
        let [outcome_id] = args.as_slice() else {
            return Err("sumOutcome requires exactly one argument".to_string());
        };
        sum_outcome(global_outcomes, item_sessions, outcome_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qti_session_core::core::variable::BaseType;
    use qti_session_core::core::variable::Cardinality;
    use qti_session_core::core::variable::Variable;
    use qti_session_core::core::variable::VariableKind;

    fn response_state(value: &str) -> State {
        let mut state = State::new();
        let mut variable = Variable::from_declaration(
            "RESPONSE".to_string(),
            VariableKind::Response,
            Cardinality::Single,
            BaseType::Identifier,
            None,
        );
        variable.value = Some(QtiValue::Single(SingleValue::Identifier(value.to_string())));
        state.declare(variable);
        state
    }

    #[test]
    fn literal_true_evaluates_to_boolean_true() {
        let engine = FixtureExpressionEngine;
        let outcomes = State::new();
        let context = EvaluationContext::test_scoped(&outcomes);
        assert_eq!(
            engine.evaluate(&ExpressionRef("literal(true)".to_string()), &context),
            Some(QtiValue::Single(SingleValue::Boolean(true)))
        );
    }

    #[test]
    fn matches_compares_response_identifier() {
        let engine = FixtureExpressionEngine;
        let outcomes = State::new();
        let item = response_state("CORRECT");
        let context = EvaluationContext::item_scoped(&outcomes, &item);
        assert_eq!(
            engine.evaluate(&ExpressionRef("matches(RESPONSE,CORRECT)".to_string()), &context),
            Some(QtiValue::Single(SingleValue::Boolean(true)))
        );
    }

    #[test]
    fn score_response_sets_outcome_and_completes() {
        let engine = FixtureExpressionEngine;
        let mut item = response_state("WRONG");
        let status = engine
            .run_response_processing(&ExpressionRef("scoreResponse(RESPONSE,CORRECT,SCORE)".to_string()), &mut item)
            .expect("score response");
        assert_eq!(status, CompletionStatus::Completed);
        assert_eq!(
            item.get_variable("SCORE").and_then(|variable| variable.value.clone()),
            Some(QtiValue::Single(SingleValue::Integer(0)))
        );
    }
}
