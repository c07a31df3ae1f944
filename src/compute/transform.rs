//! transform.rs
//! The per-kind node capability: turn input tables into one output table,
//! or report why that was not possible.

use crate::config::EngineConfig;
use crate::error::{NodeError, NodeErrorType};
use crate::expr::{ExprError, Expression};
use crate::graph::{Node, NodeKind, PROP_FILE_PATH, PROP_FILTER_CONDITION, PROP_FORMULA};
use crate::table::{read_csv, TableValue};
use std::sync::Arc;

/// Evaluates `node` against `inputs`, given in declared input-port order.
///
/// Pure with respect to the graph: reads only the node's own properties and
/// the tables handed to it. Inputs are never modified.
pub(crate) fn evaluate(node: &Node, inputs: &[Arc<TableValue>], config: &EngineConfig) -> Result<TableValue, NodeError> {
    let expected = node.kind().input_ports().len();
    if inputs.len() != expected {
        return Err(NodeError::at_node(
            node,
            NodeErrorType::MissingInput,
            format!("expected {expected} input table(s), got {}", inputs.len()),
        ));
    }

    match node.kind() {
        NodeKind::Input => produce(node, config),
        NodeKind::Filter => filter(node, &inputs[0], config),
        NodeKind::Calculation => calculate(node, &inputs[0], config),
        NodeKind::Concat => Ok(inputs[0].concat(&inputs[1])),
    }
}

fn produce(node: &Node, config: &EngineConfig) -> Result<TableValue, NodeError> {
    let path = match node.property(PROP_FILE_PATH).map(str::trim) {
        Some(path) if !path.is_empty() => path,
        _ => return Err(NodeError::at_node(node, NodeErrorType::SourceRead, "no source file selected")),
    };
    read_csv(path, &config.csv).map_err(|e| NodeError::source_read(node, &e))
}

fn filter(node: &Node, input: &TableValue, config: &EngineConfig) -> Result<TableValue, NodeError> {
    let expr = parse_property(node, PROP_FILTER_CONDITION, config)?;
    let bound = expr.bind(input).map_err(|e| NodeError::expression(node, &e))?;

    let mut keep = Vec::with_capacity(input.row_count());
    for (idx, row) in input.rows().iter().enumerate() {
        keep.push(bound.matches(row).map_err(|e| row_error(node, idx, &e))?);
    }
    Ok(input.filter_rows(&keep))
}

fn calculate(node: &Node, input: &TableValue, config: &EngineConfig) -> Result<TableValue, NodeError> {
    let expr = parse_property(node, PROP_FORMULA, config)?;
    let bound = expr.bind(input).map_err(|e| NodeError::expression(node, &e))?;

    let mut cells = Vec::with_capacity(input.row_count());
    for (idx, row) in input.rows().iter().enumerate() {
        cells.push(bound.eval_row(row).map_err(|e| row_error(node, idx, &e))?);
    }
    input
        .with_column(config.result_column.as_str(), cells)
        .map_err(|e| NodeError::at_node(node, NodeErrorType::Expression, e.to_string()))
}

/// A missing property parses as empty text, which is a syntax error.
fn parse_property(node: &Node, key: &str, config: &EngineConfig) -> Result<Expression, NodeError> {
    let text = node.property(key).unwrap_or_default();
    Expression::parse(text, &config.frame_identifier).map_err(|e| NodeError::expression(node, &e))
}

fn row_error(node: &Node, row: usize, err: &ExprError) -> NodeError {
    NodeError::at_node(node, NodeErrorType::Expression, format!("row {row}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NodeId, Position};
    use crate::table::Cell;
    use rstest::rstest;

    fn node(kind: NodeKind, props: &[(&str, &str)]) -> Node {
        let mut node = Node::new(NodeId(7), kind, kind.display_name().to_string(), Position::default());
        for (k, v) in props {
            node.properties.insert(k.to_string(), v.to_string());
        }
        node
    }

    fn table() -> Arc<TableValue> {
        Arc::new(
            TableValue::new(
                vec!["a".into(), "b".into()],
                vec![
                    vec![1.0.into(), 2.0.into()],
                    vec![3.0.into(), 4.0.into()],
                    vec![5.0.into(), 6.0.into()],
                ],
            )
            .unwrap(),
        )
    }

    fn run(node: &Node, inputs: &[Arc<TableValue>]) -> Result<TableValue, NodeError> {
        evaluate(node, inputs, &EngineConfig::default())
    }

    #[test]
    fn test_filter_keeps_matching_rows_in_order() {
        let input = table();
        let out = run(&node(NodeKind::Filter, &[(PROP_FILTER_CONDITION, "a > 3 or b == 2")]), &[input.clone()]).unwrap();
        assert_eq!(out.columns(), input.columns());
        assert_eq!(out.rows(), &[vec![Cell::from(1.0), Cell::from(2.0)], vec![Cell::from(5.0), Cell::from(6.0)]]);
    }

    #[test]
    fn test_unsatisfiable_filter_is_an_empty_table() {
        let out = run(&node(NodeKind::Filter, &[(PROP_FILTER_CONDITION, "a > 100")]), &[table()]).unwrap();
        assert!(out.is_empty());
        assert_eq!(out.column_count(), 2);
    }

    #[test]
    fn test_calculation_appends_result_without_touching_input() {
        let input = table();
        let out = run(&node(NodeKind::Calculation, &[(PROP_FORMULA, "a * b")]), &[input.clone()]).unwrap();
        assert_eq!(out.columns(), &["a", "b", "Result"]);
        assert_eq!(out.row_count(), 3);
        assert_eq!(out.cell(2, 2), Some(&Cell::Number(30.0)));
        assert_eq!(out.cell(2, 0), input.cell(2, 0));
        assert_eq!(input.column_count(), 2);
    }

    #[test]
    fn test_result_column_name_is_configurable() {
        let config = EngineConfig { result_column: "Total".into(), ..EngineConfig::default() };
        let out = evaluate(&node(NodeKind::Calculation, &[(PROP_FORMULA, "a + b")]), &[table()], &config).unwrap();
        assert_eq!(out.columns().last().map(String::as_str), Some("Total"));
    }

    #[rstest]
    #[case(NodeKind::Filter, PROP_FILTER_CONDITION, "c > 1", "unknown column 'c'")]
    #[case(NodeKind::Filter, PROP_FILTER_CONDITION, "a + 1", "row 0: condition must evaluate to a boolean")]
    #[case(NodeKind::Filter, PROP_FILTER_CONDITION, "  ", "empty expression")]
    #[case(NodeKind::Calculation, PROP_FORMULA, "a / (b - 4)", "row 1: division by zero")]
    #[case(NodeKind::Calculation, PROP_FORMULA, "a +", "syntax error")]
    #[case(NodeKind::Calculation, PROP_FORMULA, "__import__('os')", "unknown function")]
    fn test_expression_failures(#[case] kind: NodeKind, #[case] key: &str, #[case] text: &str, #[case] fragment: &str) {
        let err = run(&node(kind, &[(key, text)]), &[table()]).unwrap_err();
        assert_eq!(err.error_type, NodeErrorType::Expression);
        assert_eq!(err.node_id, NodeId(7));
        assert!(err.message.contains(fragment), "{}", err.message);
    }

    #[test]
    fn test_deeply_nested_condition_fails_the_node() {
        let condition = format!("{}a > 1{}", "(".repeat(1000), ")".repeat(1000));
        let err = run(&node(NodeKind::Filter, &[(PROP_FILTER_CONDITION, &condition)]), &[table()]).unwrap_err();
        assert_eq!(err.error_type, NodeErrorType::Expression);
        assert!(err.message.contains("nested too deeply"), "{}", err.message);
    }

    #[test]
    fn test_input_without_path_is_a_source_error() {
        let err = run(&node(NodeKind::Input, &[]), &[]).unwrap_err();
        assert_eq!(err.error_type, NodeErrorType::SourceRead);
    }

    #[test]
    fn test_input_reads_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();
        let out = run(&node(NodeKind::Input, &[(PROP_FILE_PATH, path.to_str().unwrap())]), &[]).unwrap();
        assert_eq!(out.columns(), &["a", "b"]);
        assert_eq!(out.row_count(), 1);
    }

    #[test]
    fn test_concat_stacks_rows() {
        let out = run(&node(NodeKind::Concat, &[]), &[table(), table()]).unwrap();
        assert_eq!(out.row_count(), 6);
    }

    #[test]
    fn test_wrong_input_count() {
        let err = run(&node(NodeKind::Filter, &[(PROP_FILTER_CONDITION, "a > 1")]), &[]).unwrap_err();
        assert_eq!(err.error_type, NodeErrorType::MissingInput);
    }
}
