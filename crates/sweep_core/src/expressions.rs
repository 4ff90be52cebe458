//! Derived quantities computed from the parameters of each case.
//!
//! Expressions are either literal constants or formulas in a small, pure
//! arithmetic language. Their free names form a dependency graph that is
//! checked once, before any case runs; every case then evaluates the
//! expressions in the cached topological order.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Result, StudyError};
use crate::value::{describe_assignment, Scalar, Scope};

mod ast;
mod eval;
mod parser;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use eval::{builtin_constant, evaluate, EvalFault, BUILTIN_CONSTANTS, BUILTIN_FUNCTIONS};
pub use parser::{parse, ParseError};

/// How an expression is declared.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionDef {
    Constant(Scalar),
    Formula(String),
}

#[derive(Debug, Clone)]
struct ExpressionNode {
    definition: ExpressionDef,
    ast: Option<Expr>,
    free_names: BTreeSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ExpressionGraph {
    parameters: BTreeSet<String>,
    nodes: BTreeMap<String, ExpressionNode>,
    declared: Vec<String>,
    order: Option<Vec<String>>,
}

impl ExpressionGraph {
    pub fn new<I, S>(parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            parameters: parameters.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Add an expression. Formulas are parsed immediately; unknown functions
    /// and syntax errors are configuration errors.
    pub fn register(&mut self, name: impl Into<String>, definition: ExpressionDef) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(StudyError::config("expression names must be non-empty strings"));
        }
        if self.parameters.contains(&name) {
            return Err(StudyError::config(format!(
                "expression '{name}' has the same name as a parameter"
            )));
        }
        if self.nodes.contains_key(&name) {
            return Err(StudyError::config(format!(
                "expression '{name}' is declared more than once"
            )));
        }

        let (ast, free_names) = match &definition {
            ExpressionDef::Constant(_) => (None, BTreeSet::new()),
            ExpressionDef::Formula(source) => {
                let ast = parse(source).map_err(|error| {
                    StudyError::config(format!("expression '{name}' = '{source}': {error}"))
                })?;
                if let Some(function) = ast
                    .called_functions()
                    .into_iter()
                    .find(|function| !BUILTIN_FUNCTIONS.contains(&function.as_str()))
                {
                    return Err(StudyError::config(format!(
                        "expression '{name}' calls unknown function '{function}'"
                    )));
                }
                let free_names = ast.free_names();
                (Some(ast), free_names)
            }
        };

        self.nodes.insert(
            name.clone(),
            ExpressionNode {
                definition,
                ast,
                free_names,
            },
        );
        self.declared.push(name);
        self.order = None;
        Ok(())
    }

    /// Expression names in declaration order.
    pub fn names(&self) -> &[String] {
        &self.declared
    }

    pub fn definition(&self, name: &str) -> Option<&ExpressionDef> {
        self.nodes.get(name).map(|node| &node.definition)
    }

    /// Other expressions the named expression reads.
    pub fn dependencies(&self, name: &str) -> Option<BTreeSet<&str>> {
        let node = self.nodes.get(name)?;
        Some(
            node.free_names
                .iter()
                .filter(|dependency| self.nodes.contains_key(*dependency))
                .map(String::as_str)
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Validate the graph and cache the evaluation order.
    pub fn check(&mut self) -> Result<&[String]> {
        let order = self.evaluation_order()?;
        let order = self.order.insert(order);
        Ok(order.as_slice())
    }

    /// Topological order of all expressions (Kahn's algorithm). Among the
    /// expressions that are ready at the same time the smallest name goes first.
    pub fn evaluation_order(&self) -> Result<Vec<String>> {
        let mut pending: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for (name, node) in &self.nodes {
            let mut edges = 0;
            for dependency in &node.free_names {
                if self.nodes.contains_key(dependency) {
                    edges += 1;
                    dependents
                        .entry(dependency.as_str())
                        .or_default()
                        .push(name.as_str());
                } else if !self.parameters.contains(dependency)
                    && builtin_constant(dependency).is_none()
                {
                    return Err(StudyError::UnknownName {
                        expression: name.clone(),
                        name: dependency.clone(),
                    });
                }
            }
            pending.insert(name.as_str(), edges);
        }

        let mut ready: BTreeSet<&str> = pending
            .iter()
            .filter(|(_, edges)| **edges == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(name) = ready.pop_first() {
            order.push(name.to_string());
            for dependent in dependents.get(name).into_iter().flatten() {
                if let Some(edges) = pending.get_mut(dependent) {
                    *edges -= 1;
                    if *edges == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }

        if order.len() < self.nodes.len() {
            let resolved: BTreeSet<&str> = order.iter().map(String::as_str).collect();
            return Err(StudyError::Cycle(self.find_cycle(&resolved)));
        }
        Ok(order)
    }

    /// Walk unresolved dependencies from the smallest unresolved name until a
    /// node repeats; the repeated segment is a cycle.
    fn find_cycle(&self, resolved: &BTreeSet<&str>) -> Vec<String> {
        let unresolved = |name: &str| self.nodes.contains_key(name) && !resolved.contains(name);
        let Some(start) = self.nodes.keys().find(|name| unresolved(name)) else {
            return Vec::new();
        };

        let mut path: Vec<&str> = vec![start.as_str()];
        loop {
            let current = path[path.len() - 1];
            let next = self.nodes[current]
                .free_names
                .iter()
                .map(String::as_str)
                .find(|dependency| unresolved(dependency));
            let Some(next) = next else {
                return path.into_iter().map(str::to_string).collect();
            };
            if let Some(position) = path.iter().position(|seen| *seen == next) {
                let mut cycle: Vec<String> = path[position..].iter().map(|name| name.to_string()).collect();
                cycle.push(next.to_string());
                return cycle;
            }
            path.push(next);
        }
    }

    /// Evaluate every expression for one parameter assignment.
    pub fn resolve(&self, assignment: &[(String, Scalar)]) -> Result<BTreeMap<String, Scalar>> {
        let computed;
        let order = match &self.order {
            Some(order) => order,
            None => {
                computed = self.evaluation_order()?;
                &computed
            }
        };

        let mut scope: Scope = assignment.iter().cloned().collect();
        let mut values = BTreeMap::new();
        for name in order {
            let node = &self.nodes[name];
            let value = match (&node.definition, &node.ast) {
                (ExpressionDef::Constant(value), _) => value.clone(),
                (ExpressionDef::Formula(_), Some(ast)) => {
                    evaluate(ast, &scope).map_err(|source| StudyError::Eval {
                        expression: name.clone(),
                        parameters: describe_assignment(assignment.iter().map(|(n, v)| (n, v))),
                        source,
                    })?
                }
                (ExpressionDef::Formula(source), None) => {
                    return Err(StudyError::config(format!(
                        "expression '{name}' = '{source}' was not parsed"
                    )))
                }
            };
            scope.insert(name.clone(), value.clone());
            values.insert(name.clone(), value);
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(parameters: &[&str], expressions: &[(&str, &str)]) -> ExpressionGraph {
        let mut graph = ExpressionGraph::new(parameters.iter().copied());
        for (name, formula) in expressions {
            graph
                .register(*name, ExpressionDef::Formula(formula.to_string()))
                .expect("expression should register");
        }
        graph
    }

    #[test]
    fn resolves_in_dependency_order() {
        let mut graph = graph(&["n"], &[("c", "b * 2"), ("b", "a + 1"), ("a", "n * 10")]);
        let order = graph.check().expect("graph should be acyclic").to_vec();
        assert_eq!(order, vec!["a", "b", "c"]);

        let values = graph
            .resolve(&[("n".to_string(), Scalar::Int(3))])
            .expect("expressions should resolve");
        assert_eq!(values["a"], Scalar::Int(30));
        assert_eq!(values["b"], Scalar::Int(31));
        assert_eq!(values["c"], Scalar::Int(62));
    }

    #[test]
    fn ready_expressions_are_taken_in_name_order() {
        let mut forward = graph(&["n"], &[("z", "n"), ("m", "n"), ("a", "z + m")]);
        let mut backward = graph(&["n"], &[("a", "z + m"), ("m", "n"), ("z", "n")]);
        let forward = forward.check().expect("graph should be acyclic").to_vec();
        let backward = backward.check().expect("graph should be acyclic").to_vec();
        assert_eq!(forward, vec!["m", "z", "a"]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn detects_cycles() {
        let mut graph = graph(&["n"], &[("a", "b + n"), ("b", "c"), ("c", "a")]);
        let error = graph.check().expect_err("cycle should be detected");
        match error {
            StudyError::Cycle(path) => assert_eq!(path, vec!["a", "b", "c", "a"]),
            other => panic!("expected cycle, got {other}"),
        }

        let mut selfish = ExpressionGraph::new(["n"]);
        selfish
            .register("x", ExpressionDef::Formula("x + 1".into()))
            .expect("expression should register");
        assert!(matches!(selfish.check(), Err(StudyError::Cycle(_))));
    }

    #[test]
    fn rejects_unknown_names_and_functions() {
        let mut graph = graph(&["n"], &[("a", "n + missing")]);
        match graph.check().expect_err("unknown name should fail") {
            StudyError::UnknownName { expression, name } => {
                assert_eq!(expression, "a");
                assert_eq!(name, "missing");
            }
            other => panic!("expected unknown name, got {other}"),
        }

        let mut graph = ExpressionGraph::new(["n"]);
        let error = graph
            .register("a", ExpressionDef::Formula("__import__('os')".into()))
            .expect_err("unknown function should fail");
        assert!(matches!(error, StudyError::Config(_)));
    }

    #[test]
    fn rejects_bad_declarations() {
        let mut graph = ExpressionGraph::new(["n"]);
        assert!(graph.register("n", ExpressionDef::Constant(Scalar::Int(1))).is_err());
        graph
            .register("k", ExpressionDef::Constant(Scalar::Int(1)))
            .expect("constant should register");
        assert!(graph.register("k", ExpressionDef::Constant(Scalar::Int(2))).is_err());
        assert!(graph.register("f", ExpressionDef::Formula("1 +".into())).is_err());
    }

    #[test]
    fn eval_failures_name_the_case_parameters() {
        let mut graph = graph(&["n", "m"], &[("ratio", "m / n")]);
        graph.check().expect("graph should be acyclic");
        let error = graph
            .resolve(&[("n".into(), Scalar::Int(0)), ("m".into(), Scalar::Int(4))])
            .expect_err("division by zero should fail");
        assert!(!error.is_fatal());
        assert_eq!(
            error.to_string(),
            "failed to evaluate 'ratio' for (n=0, m=4): division by zero"
        );
    }

    #[test]
    fn constants_and_builtins_resolve_without_parameters() {
        let mut graph = ExpressionGraph::new(Vec::<String>::new());
        graph
            .register("radius", ExpressionDef::Constant(Scalar::Float(2.0)))
            .expect("constant should register");
        graph
            .register("area", ExpressionDef::Formula("pi * radius ** 2".into()))
            .expect("formula should register");
        let values = graph.resolve(&[]).expect("expressions should resolve");
        assert_eq!(values["area"], Scalar::Float(std::f64::consts::PI * 4.0));
    }
}
