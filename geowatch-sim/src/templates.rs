use std::sync::Arc;

use geowatch_logic::{Fragment, StateStore, TemplateEngine};
use serde_json::Value;

use crate::prelude::*;

/// Bare-bones story markup: `$name` and `$name.prop.prop` are replaced with the
/// stored value, everything else is copied as-is. Undefined variables are left
/// untouched like naked variables in story passages.
pub struct VariableTemplates {
    store: Arc<dyn StateStore>,
}

fn ident_len(s: &str) -> usize {
    let mut chars = s.char_indices();
    match chars.next() {
        Some((_, c)) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return 0,
    }
    chars
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Split the variable path at the start of `s`, `"a.b c"` gives `["a", "b"]`
fn parse_path(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = s;
    loop {
        let len = ident_len(rest);
        if len == 0 {
            break;
        }
        parts.push(&rest[..len]);
        rest = &rest[len..];
        match rest.strip_prefix('.') {
            Some(next) if ident_len(next) > 0 => rest = next,
            _ => break,
        }
    }
    parts
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl VariableTemplates {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    fn lookup(&self, path: &[&str]) -> Result<Option<Value>> {
        let Some((root, props)) = path.split_first() else {
            return Ok(None);
        };
        let Some(mut value) = self.store.get(root) else {
            return Ok(None);
        };

        for (i, prop) in props.iter().enumerate() {
            value = match value {
                Value::Object(mut map) => match map.remove(*prop) {
                    Some(v) => v,
                    None => return Ok(None),
                },
                _ => bail!(
                    "Cannot read property \"{prop}\" of ${}",
                    path[..=i].join(".")
                ),
            };
        }

        Ok(Some(value))
    }
}

impl TemplateEngine for VariableTemplates {
    fn evaluate(&self, body: &str, target: &mut Fragment) -> Result {
        let mut out = String::with_capacity(body.len());
        let mut rest = body;

        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];
            let path = parse_path(after);

            if path.is_empty() {
                out.push('$');
                rest = after;
                continue;
            }

            let consumed = path.iter().map(|p| p.len()).sum::<usize>() + path.len() - 1;
            match self.lookup(&path)? {
                Some(value) => out.push_str(&display(&value)),
                None => out.push_str(&rest[pos..=pos + consumed]),
            }
            rest = &after[consumed..];
        }

        out.push_str(rest);
        target.push_text(out);
        Ok(())
    }
}
