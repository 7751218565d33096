use crate::env::Environment;
use crate::node::MenuNode;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// What the dispatcher should do after a handler returns.
///
/// `Quit` is the controlled unwind out of every nested context; it is not an
/// error and never goes through error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Back,
    Home,
    Quit,
}

/// Where an entry of a node's table comes from. Only used for display
/// grouping; it never changes which names dispatch or complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    /// Declared by the node itself.
    Local,
    /// Present in every node (`back`, `home`, `quit`, ...).
    Base,
    /// Loads a child node.
    Submenu,
}

/// Everything a handler may touch while it runs.
///
/// `path` is the breadcrumb the command was dispatched under; for one-shot
/// forwarding it ends at the forwarded-to node rather than the active one.
pub struct Context<'a> {
    pub env: &'a mut Environment,
    pub node: &'a Rc<MenuNode>,
    pub path: &'a [Rc<MenuNode>],
}

impl Context<'_> {
    /// Write `text` to the shell output, paginating when enabled.
    pub fn print(&mut self, text: &str) -> anyhow::Result<()> {
        Ok(self.env.print(text)?)
    }

    /// Write `text` to the shell error stream.
    pub fn eprint(&mut self, text: &str) -> anyhow::Result<()> {
        Ok(self.env.eprint(text)?)
    }
}

/// Command handler. Receives the untyped remainder of the input line.
pub type Handler = Rc<dyn Fn(&mut Context<'_>, &str) -> anyhow::Result<Flow>>;

/// Dedicated completer for a command's arguments.
///
/// Called with the argument text typed so far (without the word under the
/// cursor) and the partial word itself; returns replacement candidates.
pub type Completer = Rc<dyn Fn(&Environment, &str, &str) -> Vec<String>>;

/// A single named entry in a node's command table.
#[derive(Clone)]
pub struct Command {
    name: String,
    doc: String,
    category: Category,
    hidden: bool,
    handler: Handler,
    completer: Option<Completer>,
}

impl Command {
    /// Create a local command whose handler never changes navigation state.
    pub fn new<F>(name: impl Into<String>, doc: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut Context<'_>, &str) -> anyhow::Result<()> + 'static,
    {
        Self::with_flow(name, doc, move |ctx, args| {
            handler(ctx, args)?;
            Ok(Flow::Continue)
        })
    }

    /// Create a local command whose handler decides the resulting [`Flow`].
    pub fn with_flow<F>(name: impl Into<String>, doc: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut Context<'_>, &str) -> anyhow::Result<Flow> + 'static,
    {
        Self {
            name: name.into(),
            doc: doc.into(),
            category: Category::Local,
            hidden: false,
            handler: Rc::new(handler),
            completer: None,
        }
    }

    /// Attach a dedicated argument completer.
    pub fn completer<F>(mut self, completer: F) -> Self
    where
        F: Fn(&Environment, &str, &str) -> Vec<String> + 'static,
    {
        self.completer = Some(Rc::new(completer));
        self
    }

    /// Keep the command out of summaries and completion.
    /// Keep the command out of summaries and completion. It can still be run.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub(crate) fn base(mut self) -> Self {
        self.category = Category::Base;
        self
    }

    /// The word that invokes the command.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full help text.
    pub fn doc(&self) -> &str {
        &self.doc
    }

    /// First non-empty line of the doc, used in summaries.
    pub fn summary_line(&self) -> &str {
        first_line(&self.doc)
    }

    /// Whether the command is a base command or local to its node.
    pub fn category(&self) -> Category {
        self.category
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Whether argument completion is available.
    pub fn has_completer(&self) -> bool {
        self.completer.is_some()
    }

    pub(crate) fn complete(&self, env: &Environment, args: &str, partial: &str) -> Vec<String> {
        match &self.completer {
            Some(completer) => completer(env, args, partial),
            None => Vec::new(),
        }
    }

    pub(crate) fn invoke(&self, ctx: &mut Context<'_>, args: &str) -> anyhow::Result<Flow> {
        (self.handler)(ctx, args)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("hidden", &self.hidden)
            .field("completer", &self.completer.is_some())
            .finish()
    }
}

pub(crate) fn first_line(text: &str) -> &str {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
}

/// Per-node mapping from command name to [`Command`].
///
/// Inserting a name that already exists replaces the previous entry, so a
/// node can override a base command with its own local one.
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    commands: BTreeMap<String, Command>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `command`, replacing any command with the same name.
    pub fn insert(&mut self, command: Command) {
        self.commands.insert(command.name.clone(), command);
    }

    /// Look up a command by exact name.
    pub fn get(&self, name: &str) -> Option<&Command> {
        self.commands.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Commands that are listed and completed, sorted by name.
    pub fn visible(&self) -> impl Iterator<Item = &Command> {
        self.commands.values().filter(|c| !c.hidden)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
