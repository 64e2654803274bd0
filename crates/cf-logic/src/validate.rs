//! Token-stream validation, run at expression registration

use log::error;

use cf_plugin::PluginRegistry;

use crate::token::{is_logical_operator, MAX_EXPRESSION_LEN, OP_COLON, OP_UNCUT};

/// Check a token stream for well-formedness against the registry.
///
/// Rejects: empty or oversized streams, leading operators, trailing
/// operators or `~`, adjacent operators, adjacent uids, colon targets that
/// are not effect plugins, uncut prefixes not closed by an effect chain, and
/// uids missing from the registry.
pub fn validate_tokens(tokens: &[String], registry: &PluginRegistry) -> bool {
    if tokens.is_empty() {
        error!("empty expression");
        return false;
    }

    if tokens.len() > MAX_EXPRESSION_LEN {
        error!("expression too long: {}", tokens.len());
        return false;
    }

    let begin = tokens.first().map(String::as_str).unwrap_or_default();
    let end = tokens.last().map(String::as_str).unwrap_or_default();

    // Must begin with a plugin or an uncut prefix.
    if is_logical_operator(begin) {
        error!("expression begins with operator: {begin}");
        return false;
    }

    // Must end with a plugin.
    if is_logical_operator(end) || end == OP_UNCUT {
        error!("expression ends with operator: {end}");
        return false;
    }

    let mut prev = "";
    // An uncut node is only meaningful with an effect chain; this flips
    // false at `~` and back once an effect uid closes the chain.
    let mut uncut_closed = true;

    for token in tokens {
        let token = token.as_str();

        if is_logical_operator(token) {
            if is_logical_operator(prev) {
                error!("adjacent operators: {prev} {token}");
                return false;
            }
            if !uncut_closed && token != OP_COLON {
                break;
            }
            prev = token;
            continue;
        }

        // A plugin must follow an operator or an uncut prefix.
        if !prev.is_empty() && !is_logical_operator(prev) && prev != OP_UNCUT {
            error!("missing operator between {prev} and {token}");
            return false;
        }

        if token == OP_UNCUT {
            if !uncut_closed {
                break;
            }
            prev = token;
            uncut_closed = false;
            continue;
        }

        let Ok(plugin) = registry.find(token) else {
            error!("unknown plugin in expression: {token}");
            return false;
        };

        if prev == OP_COLON && !plugin.plugin_type.is_effect() {
            error!("colon target is not an effect: {token}");
            return false;
        }

        if plugin.plugin_type.is_effect() {
            uncut_closed = true;
        }

        prev = token;
    }

    if !uncut_closed {
        error!("uncut prefix without an effect chain");
        return false;
    }

    true
}
