//! Tab completion over the menu tree.
//!
//! Completion mirrors dispatch: the words before the cursor are walked left to
//! right and every word naming a child moves completion into that child, so
//! `services network sh<TAB>` completes against the network menu. The first
//! word that is not a child ends the walk; if it is a command with its own
//! completer, that completer gets the rest of the line.

use crate::command::Category;
use crate::env::Environment;
use crate::node::MenuNode;
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

/// One completion result. The category is for display only.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Candidate {
    pub text: String,
    pub category: Category,
}

/// Complete the last word of `line` (the buffer up to the cursor) at `node`.
///
/// Nodes first built here keep their construction reports until the next
/// dispatched line, so nothing is written over the line being edited.
///
/// Returns the byte offset where the completed word starts and the
/// candidates, sorted and de-duplicated by text and category.
pub fn complete(env: &mut Environment, node: &Rc<MenuNode>, line: &str) -> (usize, Vec<Candidate>) {
    let start = line
        .rfind(char::is_whitespace)
        .map(|i| i + line[i..].chars().next().map_or(1, char::len_utf8))
        .unwrap_or(0);
    let (typed, partial) = line.split_at(start);

    let mut owner = node.clone();
    let words: Vec<&str> = typed.split_whitespace().collect();
    for (i, word) in words.iter().enumerate() {
        if let Some(command) = owner.command(word) {
            if !command.has_completer() {
                return (start, Vec::new());
            }
            let args = words[i + 1..].join(" ");
            let mut found: Vec<Candidate> = command
                .complete(env, &args, partial)
                .into_iter()
                .filter(|text| !text.trim().is_empty())
                .map(|text| Candidate {
                    text,
                    category: command.category(),
                })
                .collect();
            found.sort();
            found.dedup();
            return (start, found);
        }
        let Some(link) = owner.child(word) else {
            return (start, Vec::new());
        };
        owner = match env.get_or_create_muted(&link.type_name) {
            Ok(child) => child,
            Err(e) => {
                tracing::debug!(error = %e, "completion stopped");
                return (start, Vec::new());
            }
        };
    }

    let found: BTreeSet<Candidate> = owner
        .entries()
        .into_iter()
        .filter(|e| !e.name.trim().is_empty() && e.name.starts_with(partial))
        .map(|e| Candidate {
            text: e.name.to_string(),
            category: e.category,
        })
        .collect();
    (start, found.into_iter().collect())
}

/// Line-editor helper completing against the active node.
pub struct ShellHelper {
    env: Rc<RefCell<Environment>>,
    node: Rc<MenuNode>,
}

impl ShellHelper {
    /// A helper completing at `node`.
    pub fn new(env: Rc<RefCell<Environment>>, node: Rc<MenuNode>) -> Self {
        Self { env, node }
    }

    /// Follow the active node after navigation.
    pub fn set_node(&mut self, node: Rc<MenuNode>) {
        self.node = node;
    }
}

impl Completer for ShellHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let Ok(mut env) = self.env.try_borrow_mut() else {
            return Ok((pos, Vec::new()));
        };
        let (start, found) = complete(&mut env, &self.node, &line[..pos]);
        let pairs = found
            .into_iter()
            .map(|c| Pair {
                display: match c.category {
                    Category::Submenu => format!("{}/", c.text),
                    _ => c.text.clone(),
                },
                replacement: format!("{} ", c.text),
            })
            .collect();
        Ok((start, pairs))
    }
}

impl Hinter for ShellHelper {
    type Hint = String;

    fn hint(&self, _line: &str, _pos: usize, _ctx: &Context<'_>) -> Option<Self::Hint> {
        None
    }
}

impl Highlighter for ShellHelper {}

impl Validator for ShellHelper {}

impl Helper for ShellHelper {}
