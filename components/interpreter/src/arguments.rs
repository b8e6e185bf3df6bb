//! Argument matching.
//!
//! Matches supplied call arguments against a function's formal signature:
//! exact names first, then positions, with everything left over collected
//! by a variadic formal. The same matcher serves the call protocol and
//! `match.call`.

use std::rc::Rc;

use core_types::{Node, RResult, RuntimeError, Signature, Value, VARARG_NAME};

/// What a supplied argument carries: an expression from the call site, or
/// an already-created value (a forwarded variadic promise).
#[derive(Debug, Clone)]
pub enum SuppliedPayload {
    /// An argument expression.
    Expr(Rc<Node>),
    /// A runtime value, forwarded as-is.
    Value(Value),
}

/// One supplied argument after variadic expansion.
#[derive(Debug, Clone)]
pub struct SuppliedArg {
    /// User-supplied name, if any.
    pub name: Option<Rc<str>>,
    /// The argument itself.
    pub payload: SuppliedPayload,
}

/// The match for one formal parameter.
#[derive(Debug, Clone)]
pub enum MatchedArg {
    /// No supplied argument matched.
    Missing,
    /// One supplied argument matched.
    Supplied(SuppliedArg),
    /// The leftovers collected by the variadic formal, in supplied order.
    Varargs(Vec<SuppliedArg>),
}

/// Match `supplied` against `signature`.
///
/// Returns one entry per formal, in formal order. Exactly-named arguments
/// bind first, then unnamed arguments fill remaining formals positionally
/// (the variadic marker is never filled positionally). Leftovers go to the
/// variadic formal; with no variadic formal they are an error.
pub fn match_arguments(signature: &Signature, supplied: &[SuppliedArg]) -> RResult<Vec<MatchedArg>> {
    let vararg_index = signature.vararg_index();
    let mut matched: Vec<Option<SuppliedArg>> = vec![None; signature.len()];
    let mut used = vec![false; supplied.len()];

    // Exact name matching.
    for (si, arg) in supplied.iter().enumerate() {
        let Some(name) = &arg.name else { continue };
        for fi in 0..signature.len() {
            let formal = signature.name(fi);
            if &**formal == VARARG_NAME || &**formal != &**name {
                continue;
            }
            if matched[fi].is_some() {
                return Err(RuntimeError::invalid_argument(name));
            }
            matched[fi] = Some(arg.clone());
            used[si] = true;
            break;
        }
    }

    // Positional matching. Formals past the variadic marker can only be
    // matched by name.
    let positional_limit = vararg_index.unwrap_or(signature.len());
    let mut next_formal = 0;
    for (si, arg) in supplied.iter().enumerate() {
        if used[si] || arg.name.is_some() {
            continue;
        }
        while next_formal < positional_limit && matched[next_formal].is_some() {
            next_formal += 1;
        }
        if next_formal >= positional_limit {
            continue;
        }
        matched[next_formal] = Some(arg.clone());
        used[si] = true;
    }

    // Leftovers go to the variadic formal.
    let leftovers: Vec<SuppliedArg> = supplied
        .iter()
        .zip(used.iter())
        .filter(|(_, used)| !**used)
        .map(|(arg, _)| arg.clone())
        .collect();
    if !leftovers.is_empty() && vararg_index.is_none() {
        return Err(RuntimeError::invalid_argument("unused argument"));
    }

    let mut result = Vec::with_capacity(signature.len());
    for fi in 0..signature.len() {
        if Some(fi) == vararg_index {
            result.push(MatchedArg::Varargs(leftovers.clone()));
        } else {
            match matched[fi].take() {
                Some(arg) => result.push(MatchedArg::Supplied(arg)),
                None => result.push(MatchedArg::Missing),
            }
        }
    }
    Ok(result)
}
