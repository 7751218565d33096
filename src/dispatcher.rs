//! Line dispatch and navigation state.
//!
//! The dispatcher owns the active path from the root to the current node.
//! Entering a child pushes it, `back` pops, `home` resets to the root. A line
//! of the form `child rest...` runs `rest` in the child under a temporary
//! trail and leaves the active path alone.

use crate::builtin;
use crate::command::{Command, Context, Flow};
use crate::env::Environment;
use crate::error::ShellError;
use crate::node::MenuNode;
use crate::parser::{Parsed, parse_line};
use std::rc::Rc;

/// Result of dispatching one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Quit,
}

/// Navigation requested by a line dispatched under some trail.
enum Transition {
    Stay,
    Quit,
    Back(Vec<Rc<MenuNode>>),
    Home(Vec<Rc<MenuNode>>),
    Enter(Vec<Rc<MenuNode>>),
}

/// `names` joined by the path delimiter, then the prompt terminator.
pub fn render_prompt(env: &Environment, names: &[&str]) -> String {
    format!(
        "{}{}",
        names.join(env.path_delimiter()),
        env.prompt_terminator()
    )
}

/// Append `node` to `trail`. A node already on the trail is not pushed again;
/// the trail is cut back to its first occurrence instead.
fn push_unique(trail: &mut Vec<Rc<MenuNode>>, node: Rc<MenuNode>) {
    match trail.iter().position(|n| Rc::ptr_eq(n, &node)) {
        Some(first) => trail.truncate(first + 1),
        None => trail.push(node),
    }
}

/// Rebuild `trail` so that no node appears twice.
fn normalized(trail: Vec<Rc<MenuNode>>) -> Vec<Rc<MenuNode>> {
    let mut unique = Vec::with_capacity(trail.len());
    for node in trail {
        push_unique(&mut unique, node);
    }
    unique
}

/// Owns the active path and routes each input line along it.
///
/// The path always starts at the root and never names a node twice.
pub struct Dispatcher {
    path: Vec<Rc<MenuNode>>,
}

impl Dispatcher {
    /// A dispatcher whose active node is `root`.
    pub fn new(root: Rc<MenuNode>) -> Self {
        Self { path: vec![root] }
    }

    /// Nodes from the root to the active node.
    pub fn path(&self) -> &[Rc<MenuNode>] {
        &self.path
    }

    /// Names along [`Dispatcher::path`].
    pub fn path_names(&self) -> Vec<&str> {
        self.path.iter().map(|n| n.name()).collect()
    }

    /// The first node of the path.
    pub fn root(&self) -> &Rc<MenuNode> {
        &self.path[0]
    }

    /// The active node.
    pub fn current(&self) -> &Rc<MenuNode> {
        &self.path[self.path.len() - 1]
    }

    /// Prompt for the active path, e.g. `home>services#`.
    pub fn prompt(&self, env: &Environment) -> String {
        render_prompt(env, &self.path_names())
    }

    /// Dispatch `line` at the current node.
    pub fn dispatch(&mut self, env: &mut Environment, line: &str) -> Step {
        env.flush_deferred();
        let trail = self.path.clone();
        let transition = dispatch_at(env, &trail, line);
        self.apply(env, transition)
    }

    /// Run `rest` in `child` of the current node without entering it.
    pub fn execute_once(
        &mut self,
        env: &mut Environment,
        child: Rc<MenuNode>,
        rest: &str,
    ) -> Step {
        let mut trail = self.path.clone();
        push_unique(&mut trail, child);
        let transition = dispatch_at(env, &trail, rest);
        self.apply(env, transition)
    }

    /// Make `child` of the current node the active node.
    pub fn enter(&mut self, env: &mut Environment, child: Rc<MenuNode>) {
        let mut trail = self.path.clone();
        push_unique(&mut trail, child);
        self.enter_trail(env, trail);
    }

    /// Go up one level. No-op at the root.
    pub fn back(&mut self, env: &mut Environment) {
        let trail = self.path.clone();
        self.back_from(env, trail);
    }

    /// Return to the root.
    pub fn home(&mut self, env: &mut Environment) {
        let trail = self.path.clone();
        self.home_from(env, trail);
    }

    fn apply(&mut self, env: &mut Environment, transition: Transition) -> Step {
        match transition {
            Transition::Stay => {}
            Transition::Quit => return Step::Quit,
            Transition::Back(trail) => self.back_from(env, normalized(trail)),
            Transition::Home(trail) => self.home_from(env, normalized(trail)),
            Transition::Enter(trail) => self.enter_trail(env, normalized(trail)),
        }
        Step::Continue
    }

    fn enter_trail(&mut self, env: &mut Environment, trail: Vec<Rc<MenuNode>>) {
        self.path = trail;
        let intro = self.current().intro().to_string();
        tracing::debug!(path = ?self.path_names(), "entered menu");
        say(env, &intro);
    }

    fn back_from(&mut self, env: &mut Environment, mut trail: Vec<Rc<MenuNode>>) {
        if trail.len() <= 1 {
            return;
        }
        trail.pop();
        self.path = trail;
        self.announce(env);
    }

    fn home_from(&mut self, env: &mut Environment, trail: Vec<Rc<MenuNode>>) {
        if trail.len() == 1 && self.path.len() == 1 {
            say(env, "Currently at home menu");
            return;
        }
        self.path.truncate(1);
        self.announce(env);
    }

    fn announce(&self, env: &mut Environment) {
        let banner = format!("**** {} MENU ****", self.current().name().to_uppercase());
        tracing::debug!(path = ?self.path_names(), "returned to menu");
        say(env, &banner);
    }
}

fn say(env: &mut Environment, text: &str) {
    if let Err(e) = env.print(text) {
        tracing::warn!(error = %e, "failed to write output");
    }
}

/// Dispatch `line` at the last node of `trail`.
fn dispatch_at(env: &mut Environment, trail: &[Rc<MenuNode>], line: &str) -> Transition {
    let node = trail[trail.len() - 1].clone();
    match parse_line(line) {
        Parsed::Empty => Transition::Stay,
        Parsed::Summary => {
            say(env, &node.render_summary());
            Transition::Stay
        }
        Parsed::Help(word) => {
            let mut ctx = Context {
                env: &mut *env,
                node: &node,
                path: trail,
            };
            if let Err(err) = builtin::show_help(&mut ctx, Some(word.as_str())) {
                env.report(line, &err);
            }
            Transition::Stay
        }
        Parsed::Invoke { word, rest } => {
            if let Some(command) = node.command(word).cloned() {
                return invoke(env, trail, &node, &command, rest, line);
            }
            if let Some(link) = node.child(word).cloned() {
                let child = match env.get_or_create(&link.type_name) {
                    Ok(child) => child,
                    Err(err) => {
                        env.report(line, &anyhow::Error::from(err));
                        return Transition::Stay;
                    }
                };
                let mut sub = trail.to_vec();
                push_unique(&mut sub, child);
                return if rest.is_empty() {
                    Transition::Enter(sub)
                } else {
                    dispatch_at(env, &sub, rest)
                };
            }
            tracing::debug!(word, menu = node.name(), "unrecognized input");
            if let Err(e) = env.eprint("Command or syntax not recognized") {
                tracing::warn!(error = %e, "failed to write output");
            }
            say(env, &node.render_summary());
            Transition::Stay
        }
    }
}

fn invoke(
    env: &mut Environment,
    trail: &[Rc<MenuNode>],
    node: &Rc<MenuNode>,
    command: &Command,
    rest: &str,
    line: &str,
) -> Transition {
    let mut ctx = Context {
        env: &mut *env,
        node,
        path: trail,
    };
    match command.invoke(&mut ctx, rest) {
        Ok(Flow::Continue) => Transition::Stay,
        Ok(Flow::Quit) => Transition::Quit,
        Ok(Flow::Back) => Transition::Back(trail.to_vec()),
        Ok(Flow::Home) => Transition::Home(trail.to_vec()),
        Err(err) => {
            match err.downcast_ref::<ShellError>() {
                Some(ShellError::UserInput(msg)) => {
                    let msg = format!("ERROR: {msg}");
                    if let Err(e) = env.eprint(&msg) {
                        tracing::warn!(error = %e, "failed to write output");
                    }
                    let mut ctx = Context {
                        env: &mut *env,
                        node,
                        path: trail,
                    };
                    if let Err(err) = builtin::show_help(&mut ctx, Some(command.name())) {
                        env.report(line, &err);
                    }
                }
                _ => env.report(line, &err),
            }
            Transition::Stay
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use crate::env::tests::{Captured, test_env, test_env_with};
    use crate::env::{SHELL_SECTION, shell_defaults};
    use crate::node::NodeType;

    fn tree() -> (Environment, Captured, Dispatcher) {
        let (mut env, io) = test_env();
        env.register_type(NodeType::new("HomeMenu", "home").child("ServicesMenu"))
            .unwrap();
        env.register_type(
            NodeType::new("ServicesMenu", "services")
                .child("NetworkMenu")
                .command(Command::new("show_services", "Show services", |ctx, _| {
                    ctx.print("all services up")
                })),
        )
        .unwrap();
        env.register_type(
            NodeType::new("NetworkMenu", "network")
                .child("HomeMenu")
                .command(Command::new("show", "Show network state", |ctx, args| {
                    ctx.print(&format!("network is up [{args}]"))
                }))
                .command(Command::new("fail", "Always fails", |_, _| {
                    Err(anyhow::anyhow!("backend exploded"))
                }))
                .command(Command::new("strict", "Needs an argument", |_, args| {
                    if args.is_empty() {
                        return Err(ShellError::input("strict: missing argument").into());
                    }
                    Ok(())
                })),
        )
        .unwrap();
        let root = env.get_or_create("HomeMenu").unwrap();
        (env, io, Dispatcher::new(root))
    }

    #[test]
    fn test_empty_line_is_a_no_op() {
        let (mut env, io, mut d) = tree();
        assert_eq!(d.dispatch(&mut env, ""), Step::Continue);
        assert_eq!(d.dispatch(&mut env, "   "), Step::Continue);
        assert_eq!(d.path_names(), vec!["home"]);
        assert_eq!(io.out(), "");
        assert_eq!(io.err(), "");
    }

    #[test]
    fn test_prompt_follows_path() {
        let (mut env, _io, mut d) = tree();
        assert_eq!(d.prompt(&env), "home#");
        d.dispatch(&mut env, "services");
        assert_eq!(d.prompt(&env), "home>services#");
    }

    #[test]
    fn test_back_restores_previous_path() {
        let (mut env, io, mut d) = tree();
        d.dispatch(&mut env, "services");
        let after_a = d.path_names().join("/");
        d.dispatch(&mut env, "network");
        assert_eq!(d.path_names(), vec!["home", "services", "network"]);
        d.dispatch(&mut env, "back");
        assert_eq!(d.path_names().join("/"), after_a);
        assert!(io.out().contains("**** SERVICES MENU ****"));
    }

    #[test]
    fn test_back_and_home_at_root() {
        let (mut env, io, mut d) = tree();
        d.back(&mut env);
        assert_eq!(d.path_names(), vec!["home"]);
        assert_eq!(io.out(), "");
        d.home(&mut env);
        assert!(io.out().contains("Currently at home menu"));
    }

    #[test]
    fn test_home_resets_path() {
        let (mut env, io, mut d) = tree();
        d.dispatch(&mut env, "services");
        d.dispatch(&mut env, "network");
        io.clear();
        d.dispatch(&mut env, "home");
        assert_eq!(d.path_names(), vec!["home"]);
        assert!(io.out().contains("**** HOME MENU ****"));
    }

    #[test]
    fn test_enter_prints_intro_and_reuses_nodes() {
        let (mut env, io, mut d) = tree();
        d.dispatch(&mut env, "services");
        assert!(io.out().contains("*** services ***"));
        let first = d.current().clone();
        d.dispatch(&mut env, "back");
        d.dispatch(&mut env, "services");
        assert!(Rc::ptr_eq(&first, d.current()));
    }

    #[test]
    fn test_one_shot_forwarding_keeps_active_node() {
        let (mut env, io, mut d) = tree();
        assert_eq!(d.dispatch(&mut env, "services network show eth0"), Step::Continue);
        assert!(io.out().contains("network is up [eth0]"));
        assert_eq!(d.path_names(), vec!["home"]);
        assert_eq!(d.prompt(&env), "home#");
    }

    #[test]
    fn test_forwarding_that_ends_on_a_child_enters_it() {
        let (mut env, _io, mut d) = tree();
        d.dispatch(&mut env, "services network");
        assert_eq!(d.path_names(), vec!["home", "services", "network"]);
    }

    #[test]
    fn test_execute_once_and_enter() {
        let (mut env, io, mut d) = tree();
        let services = env.get_or_create("ServicesMenu").unwrap();
        d.execute_once(&mut env, services.clone(), "show_services");
        assert!(io.out().contains("all services up"));
        assert_eq!(d.path_names(), vec!["home"]);

        d.enter(&mut env, services);
        assert_eq!(d.path_names(), vec!["home", "services"]);
    }

    #[test]
    fn test_cycle_keeps_each_node_once() {
        let (mut env, _io, mut d) = tree();
        d.dispatch(&mut env, "services");
        d.dispatch(&mut env, "network");
        // network lists HomeMenu as a child, also named "home"
        let home = env.get_or_create("HomeMenu").unwrap();
        d.enter(&mut env, home);
        assert_eq!(d.path_names(), vec!["home"]);
        assert!(Rc::ptr_eq(d.current(), d.root()));
    }

    #[test]
    fn test_forwarded_back_through_a_self_loop() {
        let (mut env, io) = test_env();
        env.register_type(NodeType::new("HomeMenu", "home").child("LoopMenu"))
            .unwrap();
        env.register_type(
            NodeType::new("LoopMenu", "loop")
                .child("LoopMenu")
                .command(Command::new("where", "Print the trail", |ctx, _| {
                    let names: Vec<&str> = ctx.path.iter().map(|n| n.name()).collect();
                    ctx.print(&names.join(","))
                })),
        )
        .unwrap();
        let mut d = Dispatcher::new(env.get_or_create("HomeMenu").unwrap());

        d.dispatch(&mut env, "loop loop loop where");
        assert!(io.out().contains("home,loop\n"));
        assert_eq!(d.path_names(), vec!["home"]);

        d.dispatch(&mut env, "loop loop loop back");
        assert_eq!(d.path_names(), vec!["home"]);

        d.dispatch(&mut env, "loop loop");
        assert_eq!(d.path_names(), vec!["home", "loop"]);
        d.dispatch(&mut env, "loop");
        assert_eq!(d.path_names(), vec!["home", "loop"]);
        assert_eq!(d.prompt(&env), "home>loop#");
    }

    #[test]
    fn test_help_shorthand_never_runs_the_command() {
        let (mut env, io, mut d) = tree();
        d.dispatch(&mut env, "services");
        d.dispatch(&mut env, "show_services?");
        let out = io.out();
        assert!(out.contains("Show services"));
        assert!(!out.contains("all services up"));
    }

    #[test]
    fn test_summary_and_unknown_word() {
        let (mut env, io, mut d) = tree();
        d.dispatch(&mut env, "?");
        assert!(io.out().contains("*** HOME OPTIONS ***"));
        io.clear();
        d.dispatch(&mut env, "bogus");
        assert!(io.err().contains("Command or syntax not recognized"));
        assert!(io.out().contains("*** HOME OPTIONS ***"));
        io.clear();
        d.dispatch(&mut env, "? nothing");
        assert!(io.out().contains("*** No help on nothing"));
    }

    #[test]
    fn test_handler_errors_are_reported_and_recovered() {
        let (mut env, io, mut d) = tree();
        assert_eq!(d.dispatch(&mut env, "services network fail"), Step::Continue);
        assert!(io.err().contains("backend exploded"));

        io.clear();
        d.dispatch(&mut env, "services network strict");
        assert!(io.err().contains("ERROR: strict: missing argument"));
        assert!(io.out().contains("Needs an argument"));
    }

    #[test]
    fn test_quit_words() {
        let (mut env, io, mut d) = tree();
        assert_eq!(d.dispatch(&mut env, "quit sideways"), Step::Continue);
        assert!(io.err().contains("unknown option 'sideways'"));
        assert_eq!(d.dispatch(&mut env, "quit"), Step::Quit);
        assert_eq!(d.dispatch(&mut env, "services network quit force"), Step::Quit);
    }

    #[test]
    fn test_quit_refused_with_unsaved_config() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.json");
        let mut store = ConfigStore::open(&path);
        store.load_section(SHELL_SECTION, shell_defaults())?;
        let (mut env, io) = test_env_with(store);
        env.register_type(NodeType::new("HomeMenu", "home"))?;
        let mut d = Dispatcher::new(env.get_or_create("HomeMenu")?);

        // nothing changed yet: defaults count as saved
        assert_eq!(env.config_diff()?, "");

        env.set_debug(true);
        assert_eq!(d.dispatch(&mut env, "quit"), Step::Continue);
        assert!(io.err().contains("Configuration has not been saved"));
        assert!(!path.exists());

        assert_eq!(d.dispatch(&mut env, "quit force saveall"), Step::Quit);
        assert!(!path.exists());

        assert_eq!(d.dispatch(&mut env, "quit saveall"), Step::Quit);
        assert!(path.exists());
        assert_eq!(env.config_diff()?, "");
        assert_eq!(d.dispatch(&mut env, "quit"), Step::Quit);
        Ok(())
    }
}
