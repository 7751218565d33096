//! Menu node definitions and live node instances.
//!
//! A [`NodeType`] is the declarative description of a node: its identity,
//! display strings, static commands, child node types and an optional setup
//! hook. The registry turns a type into a [`MenuNode`] the first time the
//! node is needed and keeps that instance for the rest of the process.

use crate::command::{Category, Command, CommandTable};
use crate::env::Environment;
use console::style;
use std::fmt;
use std::rc::Rc;

/// Hook run while a node is constructed, after its static commands are
/// registered and before children are attached.
pub type SetupHook = Rc<dyn Fn(&mut CommandTable, &mut Environment) -> anyhow::Result<()>>;

/// Declarative definition of a menu node type.
///
/// ```
/// use menu_shell::{Command, NodeType};
/// let services = NodeType::new("ServicesMenu", "services_menu")
///     .summary("Services Menu")
///     .child("NetworkMenu")
///     .command(Command::new("show_services", "Prints the current state of services", |ctx, _| {
///         ctx.print("all services up")
///     }));
/// assert_eq!(services.name(), "services_menu");
/// ```
#[derive(Clone)]
pub struct NodeType {
    type_name: String,
    name: String,
    summary: Option<String>,
    description: Option<String>,
    intro: Option<String>,
    children: Vec<String>,
    commands: Vec<Command>,
    setup: Option<SetupHook>,
}

impl NodeType {
    /// `type_name` identifies the type in the registry and in `class:`
    /// attachment descriptors; `name` is what the user types.
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            name: name.into(),
            summary: None,
            description: None,
            intro: None,
            children: Vec::new(),
            commands: Vec::new(),
            setup: None,
        }
    }

    /// One-line text shown next to the node in its parent's summary.
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Heading of the node's own summary.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Text printed when the node is entered.
    pub fn intro(mut self, intro: impl Into<String>) -> Self {
        self.intro = Some(intro.into());
        self
    }

    /// Declare a child node type. Order is preserved for display.
    pub fn child(mut self, type_name: impl Into<String>) -> Self {
        self.children.push(type_name.into());
        self
    }

    /// Add a command local to nodes of this type.
    pub fn command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    /// Hook run once, when the node is first constructed. It may add
    /// commands computed at runtime.
    pub fn setup<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut CommandTable, &mut Environment) -> anyhow::Result<()> + 'static,
    {
        self.setup = Some(Rc::new(hook));
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared child type names.
    pub fn children(&self) -> &[String] {
        &self.children
    }

    pub(crate) fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub(crate) fn setup_hook(&self) -> Option<&SetupHook> {
        self.setup.as_ref()
    }

    pub(crate) fn summary_or_default(&self) -> String {
        self.summary
            .clone()
            .unwrap_or_else(|| format!("LOADS {} MENU", self.name))
    }
}

impl fmt::Debug for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeType")
            .field("type_name", &self.type_name)
            .field("name", &self.name)
            .field("children", &self.children)
            .finish()
    }
}

/// A resolved link from a node to one of its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildLink {
    pub name: String,
    pub type_name: String,
    pub summary: String,
}

/// One name offered by a node: a command or a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry<'a> {
    pub name: &'a str,
    pub doc: &'a str,
    pub category: Category,
}

/// A live vertex of the navigation tree.
#[derive(Debug)]
pub struct MenuNode {
    type_name: String,
    name: String,
    summary: String,
    description: String,
    intro: String,
    commands: CommandTable,
    children: Vec<ChildLink>,
}

impl MenuNode {
    pub(crate) fn new(ty: &NodeType, commands: CommandTable, children: Vec<ChildLink>) -> Self {
        let name = ty.name.clone();
        Self {
            type_name: ty.type_name.clone(),
            summary: ty.summary_or_default(),
            description: ty
                .description
                .clone()
                .unwrap_or_else(|| format!("{name} MENU")),
            intro: ty.intro.clone().unwrap_or_else(|| format!("*** {name} ***")),
            name,
            commands,
            children,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// One-line summary shown by the parent.
    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Text printed on entry.
    pub fn intro(&self) -> &str {
        &self.intro
    }

    /// Base and local commands of this node.
    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    /// Look up a command by exact name.
    pub fn command(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    /// Linked children, static ones first, then plugin children.
    pub fn children(&self) -> &[ChildLink] {
        &self.children
    }

    /// Look up a child by node name.
    pub fn child(&self, name: &str) -> Option<&ChildLink> {
        self.children.iter().find(|c| c.name == name)
    }

    pub(crate) fn set_children(&mut self, children: Vec<ChildLink>) {
        self.children = children;
    }

    /// Every visible command and child. A command and a child sharing a name
    /// yield two entries.
    pub fn entries(&self) -> Vec<Entry<'_>> {
        let commands = self.commands.visible().map(|c| Entry {
            name: c.name(),
            doc: c.summary_line(),
            category: c.category(),
        });
        let children = self.children.iter().map(|c| Entry {
            name: &c.name,
            doc: &c.summary,
            category: Category::Submenu,
        });
        commands.chain(children).collect()
    }

    /// Full summary: local commands, sub-menus, then base commands.
    pub fn render_summary(&self) -> String {
        let entries = self.entries();
        let width = entries.iter().map(|e| e.name.len()).max().unwrap_or(0);
        let rows = |category: Category| -> String {
            let mut out = String::new();
            for entry in entries.iter().filter(|e| e.category == category) {
                let name = format!("{:<width$}", entry.name);
                let name = match category {
                    Category::Submenu => style(name).blue().bold().underlined(),
                    _ => style(name).yellow().bold(),
                };
                out.push_str(&format!("\t{}  {}\n", name, entry.doc));
            }
            out
        };

        let header = format!("*** {} OPTIONS ***", self.name.to_uppercase());
        let mut buf = format!("{}\n", style(header).cyan().bold());
        buf.push_str(&rows(Category::Local));
        buf.push_str(&rows(Category::Submenu));
        let base = rows(Category::Base);
        if !base.is_empty() {
            buf.push_str(&format!("{}\n", style("*** BASE COMMANDS ***").cyan().bold()));
            buf.push_str(&base);
        }
        buf
    }

    /// Help text for `word`, or `None` when the node knows no such name.
    pub fn help_for(&self, word: &str) -> Option<String> {
        if let Some(cmd) = self.commands.get(word) {
            let doc = cmd.doc().trim();
            return Some(if doc.is_empty() {
                format!("{word}: no description")
            } else {
                doc.lines().map(str::trim).collect::<Vec<_>>().join("\n")
            });
        }
        self.child(word)
            .map(|child| format!("{}: {}", child.name, child.summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MenuNode {
        let ty = NodeType::new("HomeMenu", "home_menu").summary("Home Menu");
        let mut commands = CommandTable::new();
        commands.insert(Command::new("show", "Show things\nUsage: show", |_, _| Ok(())));
        commands.insert(Command::new("quit", "Quits the program.", |_, _| Ok(())).base());
        commands.insert(Command::new("ls", "alias", |_, _| Ok(())).base().hidden());
        commands.insert(Command::new("tests", "local tests cmd", |_, _| Ok(())));
        let children = vec![ChildLink {
            name: "tests".into(),
            type_name: "TestsMenu".into(),
            summary: "Tests Menu".into(),
        }];
        MenuNode::new(&ty, commands, children)
    }

    #[test]
    fn test_defaults_for_display_strings() {
        let node = MenuNode::new(
            &NodeType::new("X", "x_menu"),
            CommandTable::new(),
            Vec::new(),
        );
        assert_eq!(node.summary(), "LOADS x_menu MENU");
        assert_eq!(node.description(), "x_menu MENU");
        assert_eq!(node.intro(), "*** x_menu ***");
    }

    #[test]
    fn test_entries_keep_colliding_names_apart() {
        let node = sample();
        let tests: Vec<Category> = node
            .entries()
            .iter()
            .filter(|e| e.name == "tests")
            .map(|e| e.category)
            .collect();
        assert_eq!(tests, vec![Category::Local, Category::Submenu]);
        assert!(node.entries().iter().all(|e| e.name != "ls"));
    }

    #[test]
    fn test_summary_groups_sections() {
        let text = node_summary_plain(&sample());
        let options = text.find("*** HOME_MENU OPTIONS ***").unwrap();
        let show = text.find("show").unwrap();
        let base = text.find("*** BASE COMMANDS ***").unwrap();
        let quit = text.find("quit").unwrap();
        assert!(options < show && show < base && base < quit);
        assert!(text.contains("Show things"));
        assert!(!text.contains("Usage: show"));
    }

    #[test]
    fn test_help_for_command_and_child() {
        let node = sample();
        assert_eq!(node.help_for("show").unwrap(), "Show things\nUsage: show");
        assert_eq!(node.help_for("nope"), None);
        let ty = NodeType::new("A", "a");
        let only_child = MenuNode::new(
            &ty,
            CommandTable::new(),
            vec![ChildLink {
                name: "net".into(),
                type_name: "Net".into(),
                summary: "Network".into(),
            }],
        );
        assert_eq!(only_child.help_for("net").unwrap(), "net: Network");
    }

    fn node_summary_plain(node: &MenuNode) -> String {
        console::strip_ansi_codes(&node.render_summary()).into_owned()
    }
}
