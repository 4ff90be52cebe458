//! Enumerates the cases of a study: every point of the parameter grid together
//! with the expression values resolved for it.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::error::StudyError;
use crate::expressions::ExpressionGraph;
use crate::parameters::ParameterSpace;
use crate::value::{describe_assignment, Scalar, Scope};

/// A point of the parameter grid.
#[derive(Debug, Clone, PartialEq)]
pub struct CasePoint {
    /// Row-major position in the result array.
    pub index: usize,
    /// Per-parameter value indices in declaration order.
    pub coordinate: Vec<usize>,
    /// Parameter values in declaration order.
    pub parameters: Vec<(String, Scalar)>,
}

impl CasePoint {
    pub fn scope(&self) -> Scope {
        self.parameters.iter().cloned().collect()
    }

    /// `name=value, ...` rendering used in diagnostics.
    pub fn describe(&self) -> String {
        describe_assignment(self.parameters.iter().map(|(name, value)| (name, value)))
    }
}

/// A fully resolved case.
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    pub point: CasePoint,
    pub expressions: BTreeMap<String, Scalar>,
}

impl Case {
    pub fn index(&self) -> usize {
        self.point.index
    }

    pub fn coordinate(&self) -> &[usize] {
        &self.point.coordinate
    }

    /// Parameters and expressions, the names visible to templates and commands.
    pub fn scope(&self) -> Scope {
        let mut scope = self.point.scope();
        scope.extend(
            self.expressions
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );
        scope
    }
}

/// Expression resolution failed for one point. The point is kept so the case
/// can still be recorded with its parameters.
#[derive(Error, Debug)]
#[error("case {} ({}): {source}", .point.index, .point.describe())]
pub struct CaseResolutionError {
    pub point: CasePoint,
    #[source]
    pub source: StudyError,
}

/// Random-access view over all cases of a study in row-major order.
#[derive(Debug, Clone, Copy)]
pub struct CaseEnumerator<'a> {
    space: &'a ParameterSpace,
    graph: &'a ExpressionGraph,
}

impl<'a> CaseEnumerator<'a> {
    pub fn new(space: &'a ParameterSpace, graph: &'a ExpressionGraph) -> Self {
        Self { space, graph }
    }

    /// Number of cases, the product of all parameter cardinalities.
    pub fn len(&self) -> usize {
        self.space.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn point_at(&self, index: usize) -> Option<CasePoint> {
        let (coordinate, parameters) = self.space.assignment_at(index)?;
        Some(CasePoint {
            index,
            coordinate,
            parameters,
        })
    }

    /// Resolve the case at a row-major index. `None` past the end.
    pub fn case_at(&self, index: usize) -> Option<Result<Case, CaseResolutionError>> {
        let point = self.point_at(index)?;
        Some(match self.graph.resolve(&point.parameters) {
            Ok(expressions) => Ok(Case { point, expressions }),
            Err(source) => Err(CaseResolutionError { point, source }),
        })
    }

    /// Iterate over every case. The iterator is lazy and can be recreated at
    /// any time to start over.
    pub fn enumerate(&self) -> Cases<'a> {
        Cases {
            enumerator: *self,
            next: 0,
            end: self.len(),
        }
    }
}

/// Iterator returned by [`CaseEnumerator::enumerate`].
#[derive(Debug, Clone)]
pub struct Cases<'a> {
    enumerator: CaseEnumerator<'a>,
    next: usize,
    end: usize,
}

impl Iterator for Cases<'_> {
    type Item = Result<Case, CaseResolutionError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let case = self.enumerator.case_at(self.next);
        self.next += 1;
        case
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end.saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Cases<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expressions::ExpressionDef;

    fn space() -> ParameterSpace {
        ParameterSpace::grid()
            .values("a", vec![Scalar::Int(1), Scalar::Int(2)])
            .values("b", vec![Scalar::Int(0), Scalar::Int(5), Scalar::Int(10)])
            .build()
            .expect("space should build")
    }

    #[test]
    fn enumerates_in_row_major_order() {
        let space = space();
        let graph = ExpressionGraph::new(space.names());
        let enumerator = CaseEnumerator::new(&space, &graph);

        let cases = enumerator.enumerate();
        assert_eq!(cases.len(), 6);
        let coordinates: Vec<Vec<usize>> = cases
            .map(|case| case.expect("case should resolve").point.coordinate)
            .collect();
        assert_eq!(
            coordinates,
            vec![
                vec![0, 0],
                vec![0, 1],
                vec![0, 2],
                vec![1, 0],
                vec![1, 1],
                vec![1, 2]
            ]
        );
    }

    #[test]
    fn resolution_failures_keep_the_point() {
        let space = space();
        let mut graph = ExpressionGraph::new(space.names());
        graph
            .register("ratio", ExpressionDef::Formula("a / b".into()))
            .expect("formula should register");
        graph.check().expect("graph should be acyclic");
        let enumerator = CaseEnumerator::new(&space, &graph);

        let failures: Vec<CaseResolutionError> = enumerator
            .enumerate()
            .filter_map(Result::err)
            .collect();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].point.index, 0);
        assert_eq!(failures[1].point.coordinate, vec![1, 0]);
        assert!(failures[0].to_string().contains("a=1, b=0"));

        let resolved = enumerator
            .case_at(4)
            .expect("index 4 should exist")
            .expect("case should resolve");
        assert_eq!(resolved.expressions["ratio"], Scalar::Float(0.4));
        assert_eq!(resolved.scope().len(), 3);
    }

    #[test]
    fn case_at_past_the_end_is_none() {
        let space = space();
        let graph = ExpressionGraph::new(space.names());
        let enumerator = CaseEnumerator::new(&space, &graph);
        assert!(enumerator.case_at(6).is_none());
        assert_eq!(enumerator.enumerate().count(), enumerator.len());
    }
}
