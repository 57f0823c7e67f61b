//! The Breakpad CFI/`STACK WIN` postfix expression language.
//!
//! Both `STACK CFI` rules and `STACK WIN` `FrameData` programs are written
//! as whitespace-separated postfix (RPN) expressions: operands are pushed,
//! operators pop their arguments and push a result, and a rule is complete
//! once its expression leaves exactly one value on the stack. `STACK WIN`
//! programs are just several such rules concatenated with `=` as the
//! assignment marker instead of this crate's `name: expr` pairing.

use std::collections::HashMap;

/// The operand stack is bounded; a rule whose expression would need more
/// depth than this is almost certainly corrupt or adversarial, not a real
/// compiler-generated CFI program.
const MAX_STACK_DEPTH: usize = 100;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CfiEvalError {
    #[error("operand stack overflowed (depth > {MAX_STACK_DEPTH})")]
    StackOverflow,
    #[error("operand stack underflowed")]
    StackUnderflow,
    #[error("division or alignment by zero")]
    DivisionByZero,
    #[error("unknown identifier `{0}`")]
    UnknownIdentifier(String),
    #[error("dereferenced an address that isn't mapped")]
    BadDereference,
    #[error("expression left the stack with more than one value")]
    TrailingOperands,
    #[error("expression left nothing on the stack")]
    EmptyExpression,
}

/// Evaluate a single postfix expression.
///
/// `values` supplies named values already known (either previously
/// assigned pseudo-registers like `.cfa`, or real callee register values
/// looked up lazily via `lookup`). `deref` reads a word of stack memory at
/// a computed address, for the `^` operator.
pub fn eval_postfix(
    expr: &str,
    values: &HashMap<String, i64>,
    lookup: &dyn Fn(&str) -> Option<i64>,
    deref: &dyn Fn(u64) -> Option<i64>,
) -> Result<i64, CfiEvalError> {
    let mut stack: Vec<i64> = Vec::new();
    let push = |stack: &mut Vec<i64>, v: i64| -> Result<(), CfiEvalError> {
        if stack.len() >= MAX_STACK_DEPTH {
            return Err(CfiEvalError::StackOverflow);
        }
        stack.push(v);
        Ok(())
    };
    let pop = |stack: &mut Vec<i64>| stack.pop().ok_or(CfiEvalError::StackUnderflow);

    for tok in expr.split_whitespace() {
        match tok {
            "+" => {
                let b = pop(&mut stack)?;
                let a = pop(&mut stack)?;
                push(&mut stack, a.wrapping_add(b))?;
            }
            "-" => {
                let b = pop(&mut stack)?;
                let a = pop(&mut stack)?;
                push(&mut stack, a.wrapping_sub(b))?;
            }
            "*" => {
                let b = pop(&mut stack)?;
                let a = pop(&mut stack)?;
                push(&mut stack, a.wrapping_mul(b))?;
            }
            "/" => {
                let b = pop(&mut stack)?;
                let a = pop(&mut stack)?;
                if b == 0 {
                    return Err(CfiEvalError::DivisionByZero);
                }
                push(&mut stack, a.wrapping_div(b))?;
            }
            "%" => {
                let b = pop(&mut stack)?;
                let a = pop(&mut stack)?;
                if b == 0 {
                    return Err(CfiEvalError::DivisionByZero);
                }
                push(&mut stack, a.wrapping_rem(b))?;
            }
            "@" => {
                // align: truncate a to the nearest lower multiple of b.
                let b = pop(&mut stack)?;
                let a = pop(&mut stack)?;
                if b == 0 {
                    return Err(CfiEvalError::DivisionByZero);
                }
                push(&mut stack, b.wrapping_mul(a.wrapping_div(b)))?;
            }
            "^" => {
                let addr = pop(&mut stack)?;
                let val = deref(addr as u64).ok_or(CfiEvalError::BadDereference)?;
                push(&mut stack, val)?;
            }
            _ => {
                if let Some(v) = values.get(tok) {
                    push(&mut stack, *v)?;
                } else if let Some(n) = parse_literal(tok) {
                    push(&mut stack, n)?;
                } else if let Some(v) = lookup(tok) {
                    push(&mut stack, v)?;
                } else {
                    return Err(CfiEvalError::UnknownIdentifier(tok.to_string()));
                }
            }
        }
    }

    match stack.len() {
        0 => Err(CfiEvalError::EmptyExpression),
        1 => Ok(stack[0]),
        _ => Err(CfiEvalError::TrailingOperands),
    }
}

fn parse_literal(tok: &str) -> Option<i64> {
    if let Some(hex) = tok.strip_prefix("0x").or_else(|| tok.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).ok();
    }
    if let Some(hex) = tok.strip_prefix("-0x").or_else(|| tok.strip_prefix("-0X")) {
        return i64::from_str_radix(hex, 16).ok().map(|v: i64| -v);
    }
    tok.parse::<i64>().ok()
}

/// Apply a sequence of `(name, expr)` rules in order, threading a running
/// `values` map so later rules can reference pseudo-registers assigned by
/// earlier ones (as `.cfa` rules always precede register rules in valid
/// Breakpad output).
pub fn eval_rules(
    rules: &[(String, String)],
    mut values: HashMap<String, i64>,
    lookup: &dyn Fn(&str) -> Option<i64>,
    deref: &dyn Fn(u64) -> Option<i64>,
) -> Result<HashMap<String, i64>, CfiEvalError> {
    for (name, expr) in rules {
        let v = eval_postfix(expr, &values, lookup, deref)?;
        values.insert(name.clone(), v);
    }
    Ok(values)
}

/// Parse a `STACK WIN` `FrameData` program string into the same
/// `(name, expr)` rule shape `eval_rules` expects. The program is a
/// sequence of `<dest> <rpn tokens...> =` assignments; Breakpad's own
/// dumper always separates assignments with a single `=` token.
pub fn parse_assignment_program(program: &str) -> Vec<(String, String)> {
    let mut rules = Vec::new();
    for segment in program.split('=') {
        let mut tokens = segment.split_whitespace();
        let Some(dest) = tokens.next() else { continue };
        let expr: Vec<&str> = tokens.collect();
        if expr.is_empty() {
            continue;
        }
        rules.push((dest.trim_start_matches('$').to_string(), expr.join(" ")));
    }
    rules
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_lookup(_: &str) -> Option<i64> {
        None
    }

    #[test]
    fn simple_arithmetic() {
        let values = HashMap::new();
        let result = eval_postfix("4 2 +", &values, &no_lookup, &|_| None).unwrap();
        assert_eq!(result, 6);
    }

    #[test]
    fn align_operator_truncates() {
        let values = HashMap::new();
        // 19 @ 4 == 4 * (19 / 4) == 16
        let result = eval_postfix("19 4 @", &values, &no_lookup, &|_| None).unwrap();
        assert_eq!(result, 16);
    }

    #[test]
    fn dereference_reads_memory() {
        let values = HashMap::new();
        let result = eval_postfix("4096 ^", &values, &no_lookup, &|addr| {
            assert_eq!(addr, 4096);
            Some(0xdead)
        })
        .unwrap();
        assert_eq!(result, 0xdead);
    }

    #[test]
    fn references_prior_pseudo_register() {
        let mut values = HashMap::new();
        values.insert(".cfa".to_string(), 100);
        let result = eval_postfix(".cfa 4 -", &values, &no_lookup, &|_| None).unwrap();
        assert_eq!(result, 96);
    }

    #[test]
    fn division_by_zero_errors() {
        let values = HashMap::new();
        let err = eval_postfix("1 0 /", &values, &no_lookup, &|_| None).unwrap_err();
        assert_eq!(err, CfiEvalError::DivisionByZero);
    }

    #[test]
    fn stack_overflow_rejected() {
        let pushes: Vec<String> = (0..=MAX_STACK_DEPTH).map(|i| i.to_string()).collect();
        let expr = pushes.join(" ");
        let values = HashMap::new();
        let err = eval_postfix(&expr, &values, &no_lookup, &|_| None).unwrap_err();
        assert_eq!(err, CfiEvalError::StackOverflow);
    }

    #[test]
    fn unknown_identifier_falls_back_to_lookup() {
        let values = HashMap::new();
        let result = eval_postfix("$ebp", &values, &|tok| {
            assert_eq!(tok, "$ebp");
            Some(42)
        }, &|_| None)
        .unwrap();
        assert_eq!(result, 42);
    }

    #[test]
    fn cfi_rules_thread_pseudo_registers() {
        let rules = vec![
            (".cfa".to_string(), "$esp 4 +".to_string()),
            (".ra".to_string(), ".cfa 4 - ^".to_string()),
        ];
        let mut values = HashMap::new();
        let result = eval_rules(&rules, std::mem::take(&mut values), &|tok| {
            if tok == "$esp" {
                Some(0x1000)
            } else {
                None
            }
        }, &|addr| {
            assert_eq!(addr, 0x1000);
            Some(0xcafe)
        })
        .unwrap();
        assert_eq!(result[".cfa"], 0x1004);
        assert_eq!(result[".ra"], 0xcafe);
    }

    #[test]
    fn win_program_string_parses_into_rules() {
        let program = "$T0 $ebp = $eip $T0 4 + ^ = $ebp $T0 ^ = $esp $T0 8 + =";
        let rules = parse_assignment_program(program);
        assert_eq!(rules.len(), 4);
        assert_eq!(rules[0], ("T0".to_string(), "$ebp".to_string()));
        assert_eq!(rules[1], ("eip".to_string(), "$T0 4 + ^".to_string()));
    }
}
