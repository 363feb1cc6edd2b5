use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    VariableMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
    UnbalancedBrace {
        position: usize,
    },
    UnknownVariable {
        name: String,
    },
}

impl Display for TemplateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VariableMismatch {
                missing,
                unexpected,
            } => write!(
                f,
                "template variables do not match placeholders (missing: [{}], unexpected: [{}])",
                missing.join(", "),
                unexpected.join(", ")
            ),
            Self::UnbalancedBrace { position } => {
                write!(f, "unbalanced brace in template at byte {position}")
            }
            Self::UnknownVariable { name } => {
                write!(f, "template has no variable named '{name}'")
            }
        }
    }
}

impl Error for TemplateError {}

/// Text template with `{name}` placeholders and `{{`/`}}` escapes. The
/// declared variable list must exactly match the placeholder set, and
/// rendering must be given exactly the remaining variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
    variables: Vec<String>,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>, variables: &[&str]) -> Result<Self, TemplateError> {
        let template = template.into();
        let placeholders = scan_placeholders(&template)?;
        let declared: BTreeSet<&str> = variables.iter().copied().collect();

        let missing: Vec<String> = placeholders
            .iter()
            .filter(|name| !declared.contains(name.as_str()))
            .cloned()
            .collect();
        let unexpected: Vec<String> = declared
            .iter()
            .filter(|name| !placeholders.contains(**name))
            .map(ToString::to_string)
            .collect();
        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(TemplateError::VariableMismatch {
                missing,
                unexpected,
            });
        }

        Ok(Self {
            template,
            variables: variables.iter().map(ToString::to_string).collect(),
        })
    }

    pub fn text(&self) -> &str {
        &self.template
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn requires(&self, name: &str) -> bool {
        self.variables.iter().any(|variable| variable == name)
    }

    /// Binds one variable ahead of render time. The substituted value is
    /// brace-escaped so it can never introduce new placeholders.
    pub fn partial(self, name: &str, value: &str) -> Result<Self, TemplateError> {
        if !self.requires(name) {
            return Err(TemplateError::UnknownVariable {
                name: name.to_string(),
            });
        }

        let template = substitute(&self.template, Escapes::Keep, &|placeholder| {
            if placeholder == name {
                Some(escape_braces(value))
            } else {
                None
            }
        })?;
        let variables = self
            .variables
            .into_iter()
            .filter(|variable| variable != name)
            .collect();

        Ok(Self {
            template,
            variables,
        })
    }

    pub fn render(&self, values: &[(&str, &str)]) -> Result<String, TemplateError> {
        let supplied: BTreeSet<&str> = values.iter().map(|(name, _)| *name).collect();
        let required: BTreeSet<&str> = self.variables.iter().map(String::as_str).collect();

        let missing: Vec<String> = required
            .difference(&supplied)
            .map(ToString::to_string)
            .collect();
        let unexpected: Vec<String> = supplied
            .difference(&required)
            .map(ToString::to_string)
            .collect();
        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(TemplateError::VariableMismatch {
                missing,
                unexpected,
            });
        }

        substitute(&self.template, Escapes::Resolve, &|placeholder| {
            values
                .iter()
                .find(|(name, _)| *name == placeholder)
                .map(|(_, value)| (*value).to_string())
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Escapes {
    /// `{{` stays `{{` — the output is still a template.
    Keep,
    /// `{{` becomes `{` — the output is final text.
    Resolve,
}

fn scan_placeholders(template: &str) -> Result<BTreeSet<String>, TemplateError> {
    let mut placeholders = BTreeSet::new();
    walk(template, Escapes::Keep, |position, name| {
        if name.contains('{') {
            return Err(TemplateError::UnbalancedBrace { position });
        }
        placeholders.insert(name.to_string());
        Ok(None)
    })?;
    Ok(placeholders)
}

fn substitute(
    template: &str,
    escapes: Escapes,
    resolve: &dyn Fn(&str) -> Option<String>,
) -> Result<String, TemplateError> {
    walk(template, escapes, |_, name| Ok(resolve(name)))
}

/// Walks a template. The callback sees each placeholder and may replace it;
/// `None` keeps the placeholder as written. Substituted values are never
/// rescanned.
fn walk(
    template: &str,
    escapes: Escapes,
    mut on_placeholder: impl FnMut(usize, &str) -> Result<Option<String>, TemplateError>,
) -> Result<String, TemplateError> {
    let mut output = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' if bytes.get(i + 1) == Some(&b'{') => {
                output.push_str(if escapes == Escapes::Resolve { "{" } else { "{{" });
                i += 2;
            }
            b'{' => {
                let end = template[i + 1..]
                    .find('}')
                    .map(|offset| i + 1 + offset)
                    .ok_or(TemplateError::UnbalancedBrace { position: i })?;
                let name = &template[i + 1..end];
                match on_placeholder(i, name)? {
                    Some(replacement) => output.push_str(&replacement),
                    None => {
                        output.push('{');
                        output.push_str(name);
                        output.push('}');
                    }
                }
                i = end + 1;
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => {
                output.push_str(if escapes == Escapes::Resolve { "}" } else { "}}" });
                i += 2;
            }
            b'}' => return Err(TemplateError::UnbalancedBrace { position: i }),
            _ => {
                let next = template[i..]
                    .find(['{', '}'])
                    .map_or(template.len(), |offset| i + offset);
                output.push_str(&template[i..next]);
                i = next;
            }
        }
    }

    Ok(output)
}

fn escape_braces(value: &str) -> String {
    value.replace('{', "{{").replace('}', "}}")
}
