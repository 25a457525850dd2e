//! Building the context handed to the agent runner for one task.

use std::collections::BTreeMap;

/// Merge, in increasing precedence: execution input, task context, then each
/// dependency output under its task id.
pub fn merge_context<'a>(
    input_variables: &BTreeMap<String, String>,
    task_context: &BTreeMap<String, String>,
    dependency_outputs: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> BTreeMap<String, String> {
    let mut merged = input_variables.clone();
    merged.extend(task_context.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged.extend(
        dependency_outputs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string())),
    );
    merged
}

/// Replace `{name}` placeholders with values from `vars`.
///
/// Unknown names and anything that is not a plain identifier are left as written.
pub fn interpolate(template: &str, vars: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let name = &after[..close];
        match vars.get(name) {
            Some(value) if is_placeholder_name(name) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}
