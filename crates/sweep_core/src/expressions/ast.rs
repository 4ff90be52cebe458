use std::collections::BTreeSet;
use std::fmt;

use crate::value::Scalar;

/// Parsed expression. Only arithmetic, comparison, name references and calls
/// to the fixed builtin function table are representable.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Scalar),
    Name(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        function: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "**",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge
        )
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl Expr {
    /// Identifiers the expression reads. Function names in call position are
    /// not included.
    pub fn free_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_names(&mut names);
        names
    }

    /// Names used in call position.
    pub fn called_functions(&self) -> BTreeSet<String> {
        let mut functions = BTreeSet::new();
        self.collect_functions(&mut functions);
        functions
    }

    fn collect_functions(&self, functions: &mut BTreeSet<String>) {
        match self {
            Self::Literal(_) | Self::Name(_) => {}
            Self::Unary { operand, .. } => operand.collect_functions(functions),
            Self::Binary { lhs, rhs, .. } => {
                lhs.collect_functions(functions);
                rhs.collect_functions(functions);
            }
            Self::Call { function, args } => {
                functions.insert(function.clone());
                for arg in args {
                    arg.collect_functions(functions);
                }
            }
        }
    }

    fn collect_names(&self, names: &mut BTreeSet<String>) {
        match self {
            Self::Literal(_) => {}
            Self::Name(name) => {
                names.insert(name.clone());
            }
            Self::Unary { operand, .. } => operand.collect_names(names),
            Self::Binary { lhs, rhs, .. } => {
                lhs.collect_names(names);
                rhs.collect_names(names);
            }
            Self::Call { args, .. } => {
                for arg in args {
                    arg.collect_names(names);
                }
            }
        }
    }
}
