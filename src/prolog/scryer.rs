//! [`SymbolicEngine`] backed by an embedded Scryer Prolog machine.
//!
//! Scryer machines are single-threaded, so the engine itself only holds the
//! consulted program text. Each [`solve`](SymbolicEngine::solve) builds a
//! fresh machine, loads the program and runs the goal under an inference
//! limit. Parse checks reuse one machine per thread: they never touch the
//! program, only the reader.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use scryer_prolog::{LeafAnswer, Machine, MachineBuilder, Term};

use super::{Binding, EngineLimits, PrologError, PrologResult, Solution, SymbolicEngine};
use crate::ontology::parse_clause_shape;

/// Helpers loaded into every machine.
const SUPPORT: &str = r#"
:- use_module(library(charsio)).
:- use_module(library(iso_ext)).
:- set_prolog_flag(occurs_check, true).

mcr_check(Atom, Verdict) :-
    catch(( atom_chars(Atom, Chars),
            read_from_chars(Chars, Term),
            (   callable(Term) -> Verdict = ok
            ;   Verdict = not_callable
            )
          ),
          error(Error, _),
          Verdict = Error).
"#;

const SUPPORT_MODULE: &str = "mcr_support";
const PROGRAM_MODULE: &str = "mcr_program";

/// Query variable that reports whether the inference limit was hit.
const LIMIT_VAR: &str = "McrInferenceLimit__";
const LIMIT_EXCEEDED: &str = "inference_limit_exceeded";

static VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z_][A-Za-z0-9_]*").expect("valid regex"));
static PLAIN_ATOM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][A-Za-z0-9_]*$").expect("valid regex"));
static SYMBOL_ATOM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+\-*/\\^<>=~:.?@#&$]+$").expect("valid regex"));

thread_local! {
    static READER: RefCell<Option<Machine>> = const { RefCell::new(None) };
}

fn support_machine() -> Machine {
    let mut machine = MachineBuilder::default().build();
    machine.load_module_string(SUPPORT_MODULE, SUPPORT);
    machine
}

/// Scryer Prolog behind the [`SymbolicEngine`] seam.
#[derive(Debug, Clone, Default)]
pub struct ScryerEngine {
    program: String,
    clauses: usize,
    limits: EngineLimits,
}

impl ScryerEngine {
    pub fn new(limits: EngineLimits) -> Self {
        Self {
            limits,
            ..Default::default()
        }
    }

    /// Number of clauses in the current theory.
    pub fn clause_count(&self) -> usize {
        self.clauses
    }

    pub fn limits(&self) -> EngineLimits {
        self.limits
    }
}

impl SymbolicEngine for ScryerEngine {
    fn consult(&mut self, program: &str) -> PrologResult<()> {
        let (clauses, rest) = split_clauses(program);
        if !rest.trim().is_empty() {
            return Err(unterminated(rest));
        }
        for clause in &clauses {
            read_check(clause)?;
        }
        self.program = layout_program(&clauses);
        self.clauses = clauses.len();
        tracing::debug!(clauses = self.clauses, "consulted program");
        Ok(())
    }

    fn solve(&self, query: &str) -> PrologResult<Vec<Solution>> {
        let goal = query.trim();
        self.check_query(goal)?;

        let mut machine = support_machine();
        if !self.program.is_empty() {
            machine.load_module_string(PROGRAM_MODULE, self.program.clone());
        }

        let order = variable_order(goal);
        let text = format!(
            "call_with_inference_limit(({goal}), {}, {LIMIT_VAR}).",
            self.limits.max_inferences
        );
        let mut solutions = Vec::new();
        for answer in machine.run_query(text) {
            let answer = match answer {
                Ok(answer) => answer,
                Err(term) => return fault(term, solutions),
            };
            match answer {
                LeafAnswer::True => solutions.push(Solution::default()),
                LeafAnswer::False => break,
                LeafAnswer::Exception(term) => return fault(term, solutions),
                LeafAnswer::LeafAnswer { mut bindings, .. } => {
                    if let Some(Term::Atom(verdict)) = bindings.remove(LIMIT_VAR) {
                        if verdict == LIMIT_EXCEEDED {
                            tracing::warn!(
                                goal,
                                limit = self.limits.max_inferences,
                                found = solutions.len(),
                                "inference limit reached, search cut off"
                            );
                            break;
                        }
                    }
                    solutions.push(solution(bindings, &order));
                }
                #[allow(unreachable_patterns)]
                _ => break,
            }
            if solutions.len() >= self.limits.max_solutions {
                break;
            }
        }
        Ok(solutions)
    }

    fn check_program(&self, text: &str) -> PrologResult<()> {
        let (clauses, rest) = split_clauses(text);
        if !rest.trim().is_empty() {
            return Err(unterminated(rest));
        }
        if clauses.is_empty() {
            return Err(PrologError::Parse {
                message: "empty program".into(),
            });
        }
        clauses.iter().try_for_each(|clause| read_check(clause))
    }

    fn check_query(&self, text: &str) -> PrologResult<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PrologError::Parse {
                message: "empty query".into(),
            });
        }
        let (clauses, _) = split_clauses(text);
        if !clauses.is_empty() {
            return Err(PrologError::Parse {
                message: format!("a query must not contain a clause terminator: {text}"),
            });
        }
        read_check(&format!("{text} ."))
    }
}

/// Run one term through the Prolog reader.
fn read_check(clause: &str) -> PrologResult<()> {
    let query = format!("mcr_check({}, Verdict).", quote_atom(clause));
    READER.with(|cell| {
        let mut slot = cell.borrow_mut();
        let machine = slot.get_or_insert_with(support_machine);
        let verdict = machine.run_query(query).next();
        match verdict {
            Some(Ok(LeafAnswer::LeafAnswer { bindings, .. })) => match bindings.get("Verdict") {
                Some(Term::Atom(ok)) if ok == "ok" => Ok(()),
                Some(other) => Err(PrologError::Parse {
                    message: format!("{}: {}", render(other), clause.trim()),
                }),
                None => Err(PrologError::Parse {
                    message: format!("unreadable: {}", clause.trim()),
                }),
            },
            _ => Err(PrologError::Parse {
                message: format!("unreadable: {}", clause.trim()),
            }),
        }
    })
}

fn unterminated(rest: &str) -> PrologError {
    PrologError::Parse {
        message: format!("clause is missing its terminating '.': {}", rest.trim()),
    }
}

/// Map an uncaught Prolog exception. Calls to undefined procedures are plain
/// failure, so the solutions found so far stand.
fn fault(term: Term, solutions: Vec<Solution>) -> PrologResult<Vec<Solution>> {
    if let Term::Compound(name, args) = &term {
        if name == "error" {
            match args.first() {
                Some(Term::Compound(kind, detail))
                    if kind == "existence_error"
                        && matches!(detail.first(), Some(Term::Atom(a)) if a == "procedure") =>
                {
                    tracing::debug!(procedure = %render(&term), "undefined procedure fails");
                    return Ok(solutions);
                }
                Some(Term::Compound(kind, _)) if kind == "syntax_error" => {
                    return Err(PrologError::Parse {
                        message: render(&term),
                    });
                }
                _ => {}
            }
        }
    }
    Err(PrologError::Exception {
        message: render(&term),
    })
}

fn solution(bindings: BTreeMap<String, Term>, order: &[String]) -> Solution {
    let mut bindings: Vec<Binding> = bindings
        .into_iter()
        .filter(|(var, _)| !var.starts_with('_'))
        .map(|(var, value)| Binding {
            value: render(&value),
            var,
        })
        .collect();
    bindings.sort_by_key(|b| {
        order
            .iter()
            .position(|v| *v == b.var)
            .unwrap_or(usize::MAX)
    });
    Solution { bindings }
}

/// Named variables of `goal` in order of first appearance.
fn variable_order(goal: &str) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    for m in VARIABLE.find_iter(goal) {
        let name = m.as_str();
        if !name.starts_with('_') && !order.iter().any(|v| v == name) {
            order.push(name.to_string());
        }
    }
    order
}

/// Render a term the way a Prolog toplevel would print it.
fn render(term: &Term) -> String {
    match term {
        Term::Integer(n) => n.to_string(),
        Term::Rational(r) => r.to_string(),
        Term::Float(f) => f.to_string(),
        Term::Atom(a) => render_atom(a),
        Term::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        Term::List(items) => format!("[{}]", render_all(items)),
        Term::Compound(name, args) => format!("{}({})", render_atom(name), render_all(args)),
        Term::Var(v) => v.clone(),
        #[allow(unreachable_patterns)]
        other => format!("{other:?}"),
    }
}

fn render_all(terms: &[Term]) -> String {
    terms.iter().map(render).collect::<Vec<_>>().join(", ")
}

fn render_atom(atom: &str) -> String {
    let solo = matches!(atom, "[]" | "{}" | "!" | ";" | ",");
    if solo || PLAIN_ATOM.is_match(atom) || SYMBOL_ATOM.is_match(atom) {
        atom.to_string()
    } else {
        quote_atom(atom)
    }
}

/// Quote `text` as a Prolog atom.
fn quote_atom(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Split program text at end tokens: a `.` followed by layout, `%` or the end
/// of input, outside quotes and comments, and not part of a symbol-char
/// operator such as `=..`. Returns the complete clauses (with their `.`) and
/// whatever trails the last one.
fn split_clauses(text: &str) -> (Vec<&str>, &str) {
    let bytes = text.as_bytes();
    let mut clauses = Vec::new();
    let mut start = 0;
    let mut i = 0;
    let mut quote: Option<u8> = None;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'0' if bytes.get(i + 1) == Some(&b'\'') => {
                // 0'c character code
                i += if bytes.get(i + 2) == Some(&b'\\') { 4 } else { 3 };
                continue;
            }
            b'\'' | b'"' | b'`' => quote = Some(b),
            b'%' => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i += 2;
                continue;
            }
            b'.' => {
                let prev_symbol = i > 0 && is_symbol_char(bytes[i - 1]);
                let ends = match bytes.get(i + 1) {
                    None => true,
                    Some(n) => n.is_ascii_whitespace() || *n == b'%',
                };
                if ends && !prev_symbol {
                    clauses.push(text[start..=i].trim());
                    start = i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    (clauses, text.get(start..).unwrap_or(""))
}

fn is_symbol_char(b: u8) -> bool {
    b"+-*/\\^<>=~:.?@#&$".contains(&b)
}

/// Declare every predicate the program mentions as dynamic, so a call to
/// one without clauses fails instead of raising, then list each predicate's
/// clauses together in their original relative order.
fn layout_program(clauses: &[&str]) -> String {
    let mut declared: Vec<String> = Vec::new();
    let mut groups: Vec<(String, Vec<&str>)> = Vec::new();
    for &clause in clauses {
        let key = match parse_clause_shape(clause) {
            Ok(shape) => {
                let literals = std::iter::once(&shape.head).chain(shape.body.iter().flatten());
                for lit in literals {
                    let indicator = format!("{}/{}", render_atom(&lit.name), lit.args.len());
                    if !declared.contains(&indicator) {
                        declared.push(indicator);
                    }
                }
                format!("{}/{}", shape.head.name, shape.head.args.len())
            }
            Err(_) => clause.to_string(),
        };
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(clause),
            None => groups.push((key, vec![clause])),
        }
    }
    declared
        .iter()
        .map(|indicator| format!(":- dynamic({indicator})."))
        .chain(
            groups
                .into_iter()
                .flat_map(|(_, members)| members)
                .map(str::to_string),
        )
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(program: &str) -> ScryerEngine {
        let mut e = ScryerEngine::default();
        e.consult(program).unwrap();
        e
    }

    fn answers(e: &ScryerEngine, query: &str) -> Vec<String> {
        e.solve(query)
            .unwrap()
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn fact_lookup_binds_variable() {
        let e = engine("bird(tweety).\nbird(polly).");
        assert_eq!(answers(&e, "bird(X)"), vec!["X = tweety", "X = polly"]);
    }

    #[test]
    fn ground_success_has_no_bindings() {
        let e = engine("can_migrate(tweety).");
        let solutions = e.solve("can_migrate(tweety)").unwrap();
        assert_eq!(solutions.len(), 1);
        assert!(solutions[0].bindings.is_empty());
        assert!(e.solve("can_migrate(polly)").unwrap().is_empty());
    }

    #[test]
    fn rules_and_negation() {
        let e = engine(
            "canary(tweety).\nbird(X) :- canary(X).\nbird(pingu).\npenguin(pingu).\n\
             flies(X) :- bird(X), \\+ penguin(X).",
        );
        assert_eq!(answers(&e, "flies(W)"), vec!["W = tweety"]);
    }

    #[test]
    fn bindings_follow_query_order() {
        let e = engine("a(1).");
        assert_eq!(answers(&e, "Y = z, X = f(Y)"), vec!["Y = z, X = f(z)"]);
        assert_eq!(answers(&e, "X is 2 + 3 * 4"), vec!["X = 14"]);
    }

    #[test]
    fn interleaved_clauses_are_regrouped() {
        let e = engine("bird(tweety).\nfish(nemo).\nbird(polly).");
        assert_eq!(answers(&e, "bird(X)"), vec!["X = tweety", "X = polly"]);
        assert_eq!(e.clause_count(), 3);
    }

    #[test]
    fn unknown_predicate_fails() {
        let e = engine("bird(tweety).");
        assert!(e.solve("fish(X)").unwrap().is_empty());

        let e = engine("flies(X) :- penguin(X).\nflies(X) :- bird(X).\nbird(tweety).");
        assert_eq!(answers(&e, "flies(X)"), vec!["X = tweety"]);
    }

    #[test]
    fn runtime_errors_surface() {
        let e = engine("a(1).");
        let err = e.solve("X is Y + 1").unwrap_err();
        assert!(matches!(err, PrologError::Exception { .. }));
        assert!(err.to_string().contains("instantiation"));
    }

    #[test]
    fn cyclic_unification_fails_instead_of_crashing() {
        let e = engine("a(1).");
        assert!(e.solve("X = f(X)").unwrap().is_empty());
    }

    #[test]
    fn long_conjunctions_are_solved() {
        let e = engine("bird(tweety).");
        let goal = vec!["bird(tweety)"; 300].join(", ");
        assert_eq!(e.solve(&goal).unwrap().len(), 1);
    }

    #[test]
    fn deep_recursion_keeps_correct_answers() {
        let mut program = String::new();
        for i in 0..200 {
            program.push_str(&format!("parent(p{i}, p{}).\n", i + 1));
        }
        program.push_str("anc(X, Y) :- parent(X, Y).\n");
        program.push_str("anc(X, Z) :- parent(X, Y), anc(Y, Z).\n");
        let e = engine(&program);
        assert_eq!(e.solve("anc(p0, p2)").unwrap().len(), 1);
        assert_eq!(e.solve("anc(p0, X)").unwrap().len(), 100);
    }

    #[test]
    fn inference_limit_cuts_runaway_search() {
        let mut e = ScryerEngine::new(EngineLimits {
            max_inferences: 10_000,
            ..Default::default()
        });
        e.consult("loop(X) :- loop(X).\nloop(done).").unwrap();
        assert!(e.solve("loop(a)").unwrap().is_empty());
    }

    #[test]
    fn solution_limit_is_respected() {
        let mut e = ScryerEngine::new(EngineLimits {
            max_solutions: 2,
            ..Default::default()
        });
        e.consult("n(1).\nn(2).\nn(3).").unwrap();
        assert_eq!(e.solve("n(X)").unwrap().len(), 2);
    }

    #[test]
    fn reconsult_replaces_theory() {
        let mut e = engine("bird(tweety).");
        e.consult("fish(nemo).").unwrap();
        assert!(e.solve("bird(X)").unwrap().is_empty());
        assert_eq!(e.clause_count(), 1);
    }

    #[test]
    fn parse_checks() {
        let e = ScryerEngine::default();
        assert!(e.check_program("bird(tweety).").is_ok());
        assert!(e.check_program("says(alice, ':-').").is_ok());
        assert!(e.check_program("a(x). b(y).").is_ok());
        assert!(e.check_program("bird(tweety").is_err());
        assert!(e.check_program("has_wings(X) :- .").is_err());
        assert!(e.check_query("bird(X)").is_ok());
        assert!(e.check_query("bird(X). fish(Y)").is_err());
        assert!(e.check_query("Tweety is a bird").is_err());
    }

    #[test]
    fn end_tokens() {
        let (clauses, rest) = split_clauses("a('x. y'). b(X) :- X =.. [f]. c(1.5).\nd");
        assert_eq!(clauses, vec!["a('x. y').", "b(X) :- X =.. [f].", "c(1.5)."]);
        assert_eq!(rest, "\nd");
    }

    #[test]
    fn atoms_are_quoted_when_needed() {
        assert_eq!(render_atom("tweety"), "tweety");
        assert_eq!(render_atom("[]"), "[]");
        assert_eq!(render_atom("Tweety Bird"), "'Tweety Bird'");
        assert_eq!(quote_atom("it's"), "'it\\'s'");
    }
}
