//! Placeholder substitution for staged files, command lines and log paths.

use thiserror::Error;

use crate::expressions::{evaluate, parse};
use crate::value::Scope;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("unterminated placeholder starting at offset {0}")]
    Unterminated(usize),

    #[error("invalid placeholder '${{{placeholder}}}': {message}")]
    Invalid { placeholder: String, message: String },
}

/// Renders text against the scope of one case.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, text: &str, scope: &Scope) -> Result<String, RenderError>;
}

/// `${expression}` is replaced by the value of the expression; `$$` is a
/// literal dollar sign. Any other `$` is copied as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderRenderer;

impl TemplateRenderer for PlaceholderRenderer {
    fn render(&self, text: &str, scope: &Scope) -> Result<String, RenderError> {
        let mut output = String::with_capacity(text.len());
        let mut rest = text;
        let mut offset = 0;

        while let Some(position) = rest.find('$') {
            output.push_str(&rest[..position]);
            let after = &rest[position + 1..];

            if let Some(tail) = after.strip_prefix('$') {
                output.push('$');
                offset += position + 2;
                rest = tail;
            } else if let Some(body) = after.strip_prefix('{') {
                let close = body
                    .find('}')
                    .ok_or(RenderError::Unterminated(offset + position))?;
                let placeholder = body[..close].trim();
                let value = parse(placeholder)
                    .map_err(|error| error.to_string())
                    .and_then(|expr| evaluate(&expr, scope).map_err(|fault| fault.to_string()))
                    .map_err(|message| RenderError::Invalid {
                        placeholder: placeholder.to_string(),
                        message,
                    })?;
                output.push_str(&value.to_string());
                let consumed = position + 2 + close + 1;
                offset += consumed;
                rest = &rest[consumed..];
            } else {
                output.push('$');
                offset += position + 1;
                rest = after;
            }
        }

        output.push_str(rest);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Scalar;

    fn scope() -> Scope {
        Scope::from([
            ("n".to_string(), Scalar::Int(4)),
            ("dt".to_string(), Scalar::Float(0.5)),
            ("mesh".to_string(), Scalar::from("coarse")),
        ])
    }

    #[test]
    fn substitutes_names_and_expressions() {
        let rendered = PlaceholderRenderer
            .render("run ${mesh} -n ${n} --steps ${n * 2} --dt=${dt}", &scope())
            .expect("template should render");
        assert_eq!(rendered, "run coarse -n 4 --steps 8 --dt=0.5");
    }

    #[test]
    fn dollar_escapes_are_preserved() {
        let rendered = PlaceholderRenderer
            .render("cost $$${n} and $HOME", &scope())
            .expect("template should render");
        assert_eq!(rendered, "cost $4 and $HOME");
    }

    #[test]
    fn reports_bad_placeholders() {
        assert_eq!(
            PlaceholderRenderer.render("a ${n", &scope()),
            Err(RenderError::Unterminated(2))
        );
        let error = PlaceholderRenderer
            .render("${unknown}", &scope())
            .expect_err("unknown name should fail");
        assert!(error.to_string().contains("'unknown' is not defined"));
    }
}
