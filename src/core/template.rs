// src/core/template.rs

//! Field substitution for installer-script templates.

use std::collections::HashMap;

/// Substitutes `{field}` placeholders in `template` from `bindings`.
///
/// Only placeholders whose name matches a binding are replaced. Everything
/// else, including unknown `{...}` placeholders and shell `${...}` syntax,
/// passes through verbatim, so templates can freely contain shell parameter
/// expansions. Substituted values are not re-scanned.
pub fn render(template: &str, bindings: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        // A `${` is shell syntax, never one of our placeholders.
        if open > 0 && rest.as_bytes()[open - 1] == b'$' {
            out.push_str(&rest[..=open]);
            rest = &rest[open + 1..];
            continue;
        }
        out.push_str(&rest[..open]);
        rest = &rest[open..];

        match rest[1..].find('}') {
            Some(close) => {
                let key = &rest[1..close + 1];
                if let Some(value) = bindings.get(key) {
                    out.push_str(value);
                } else {
                    out.push_str(&rest[..close + 2]);
                }
                rest = &rest[close + 2..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_known_fields() {
        let rendered = render(
            "master is {master_host}",
            &bindings(&[("master_host", "ec2-1.example.com")]),
        );
        assert_eq!(rendered, "master is ec2-1.example.com");
    }

    #[test]
    fn preserves_unknown_placeholders() {
        let rendered = render("export DIR={no_such_field}", &bindings(&[]));
        assert_eq!(rendered, "export DIR={no_such_field}");
    }

    #[test]
    fn leaves_shell_expansions_alone() {
        let script = "echo \"${SPARK_HOME}/bin\" {scratch}";
        let rendered = render(script, &bindings(&[("scratch", "/mnt/spark")]));
        assert_eq!(rendered, "echo \"${SPARK_HOME}/bin\" /mnt/spark");
    }
}
